//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server Reflection
//! Protocol (`grpc.reflection.v1`).
//!
//! It enables the bridge to query a server for its own Protobuf schema at runtime, so
//! services can be mounted and invoked without pre-compiled descriptors.
pub mod client;
