//! # Generic gRPC Transport
//!
//! Low-level building blocks for performing unary gRPC calls with message types that
//! are only known at runtime.
//!
//! Unlike standard `tonic` clients which are strongly typed (e.g., `HelloRequest`),
//! the components here work with [`prost_reflect::DynamicMessage`] values, serialized
//! against descriptors resolved through reflection or a local descriptor store.
pub mod client;
pub mod codec;
