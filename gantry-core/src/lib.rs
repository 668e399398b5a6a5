//! # Gantry Core
//!
//! `gantry-core` bridges two representations of a remote procedure call: the binary,
//! schema-typed Protobuf form that travels over gRPC, and a loosely-typed JSON form
//! consumed by HTTP clients and generic tooling. It never requires the generated
//! bindings of the target service; schemas are resolved at runtime, either from a
//! locally registered descriptor set or by querying a reflection-enabled server.
//!
//! ## Key Components
//!
//! * **[`store::DescriptorStore`]:** A process-scoped cache of resolved service schemas,
//!   keyed by endpoint and fully-qualified service name. All other components read
//!   descriptors through it.
//! * **[`reflection::client::ReflectionClient`]:** A `grpc.reflection.v1` client that
//!   assembles the full `FileDescriptorSet` for a named service, following transitive
//!   file dependencies.
//! * **[`json`]:** The value half of the dynamic codec: lossless, fail-closed conversion
//!   between `serde_json::Value` and `prost_reflect::DynamicMessage`.
//! * **[`mount::mount`]:** Registers one JSON-over-HTTP `POST` route per unary method of
//!   a service on an `axum::Router`, dispatching to caller-supplied handlers.
//! * **[`client::GenericClient`]:** A callable-by-name client for any unary method of a
//!   reflection-enabled service, with per-call timeout, metadata, credentials and
//!   compression options.
//!
//! ## DynamicCodec
//!
//! [`grpc::codec::DynamicCodec`] is an implementation of `tonic::codec::Codec` that
//! carries [`prost_reflect::DynamicMessage`] values on the wire, so requests can be
//! serialized against a descriptor resolved at runtime instead of a compiled type.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod client;
pub mod grpc;
pub mod json;
pub mod mount;
pub mod reflection;
pub mod store;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
