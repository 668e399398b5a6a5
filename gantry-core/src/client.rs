//! # Generic Client
//!
//! A callable-by-name client for any unary method of a service, built without the
//! service's generated bindings.
//!
//! [`GenericClient::build`] resolves the service descriptor once (through the
//! [`DescriptorStore`], so repeated builds against the same endpoint are cache hits)
//! and turns it into a dispatch table from method name to [`MethodDescriptor`]. Each
//! call validates its JSON argument against the input descriptor, performs one unary
//! exchange over the generic transport, and maps the response back to JSON.
//!
//! Transport-level errors are propagated verbatim as [`CallError::Rpc`]; the client
//! never retries.
use crate::BoxError;
use crate::grpc::client::{CallOptions, GrpcClient, RequestError};
use crate::json::{self, ConvertError};
use crate::reflection::client::{ReflectionClient, ResolveError};
use crate::store::DescriptorStore;
use http_body::Body as HttpBody;
use prost_reflect::{MethodDescriptor, ServiceDescriptor};
use std::collections::HashMap;
use tonic::{
    client::GrpcService,
    transport::{Channel, Endpoint},
};

pub use crate::grpc::client::CallCredentials;

/// Errors that can occur while building a [`GenericClient`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, #[source] tonic::transport::Error),

    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),

    #[error("Schema resolution failed: '{0}'")]
    Resolve(#[from] ResolveError),

    #[error("method '{service}/{method}' is streaming; the generic client only supports unary methods")]
    UnsupportedStreaming { service: String, method: String },
}

/// Errors that can occur while invoking a method by name.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The method name does not exist on the resolved service. Raised before any
    /// network activity.
    #[error("method '{0}' not found on service '{1}'")]
    MethodNotFound(String, String),

    /// The JSON argument does not match the method's input schema. Raised before any
    /// network activity.
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("gRPC request error: '{0}'")]
    Request(#[from] RequestError),

    /// The server (or the transport) answered with an RPC status, propagated verbatim.
    #[error("rpc failed: '{0}'")]
    Rpc(#[source] tonic::Status),
}

/// A dynamic client bound to one service of one endpoint.
///
/// The dispatch table is built once at construction; invocations are plain map lookups
/// followed by one unary exchange.
#[derive(Debug, Clone)]
pub struct GenericClient<S = Channel> {
    service: ServiceDescriptor,
    methods: HashMap<String, MethodDescriptor>,
    transport: GrpcClient<S>,
}

impl GenericClient<Channel> {
    /// Connects to `url` and builds a client for `service_name`, resolving the schema
    /// over server reflection.
    pub async fn connect(
        url: &str,
        service_name: &str,
        store: &DescriptorStore,
    ) -> Result<Self, BuildError> {
        let endpoint = Endpoint::new(url.to_string())
            .map_err(|e| BuildError::InvalidUrl(url.to_string(), e))?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| BuildError::ConnectionFailed(url.to_string(), e))?;
        Self::build(channel, url, service_name, store).await
    }
}

impl<S> GenericClient<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Builds a client over an existing transport.
    ///
    /// `authority` identifies the endpoint in the descriptor store's cache key, so
    /// rebuilding against the same endpoint reuses the already-resolved schema.
    pub async fn build(
        service: S,
        authority: &str,
        service_name: &str,
        store: &DescriptorStore,
    ) -> Result<Self, BuildError> {
        let mut reflection = ReflectionClient::new(service.clone());
        let descriptor = store.resolve(authority, service_name, &mut reflection).await?;

        let mut methods = HashMap::new();
        for method in descriptor.methods() {
            if method.is_client_streaming() || method.is_server_streaming() {
                return Err(BuildError::UnsupportedStreaming {
                    service: descriptor.full_name().to_string(),
                    method: method.name().to_string(),
                });
            }
            methods.insert(method.name().to_string(), method);
        }

        Ok(Self {
            service: descriptor,
            methods,
            transport: GrpcClient::new(service),
        })
    }

    /// Invokes `method` with a JSON-compatible argument and per-call options.
    pub async fn call(
        &mut self,
        method: &str,
        argument: &serde_json::Value,
        options: CallOptions,
    ) -> Result<serde_json::Value, CallError> {
        let descriptor = self.methods.get(method).cloned().ok_or_else(|| {
            CallError::MethodNotFound(method.to_string(), self.service.full_name().to_string())
        })?;

        let request = json::from_generic(argument, &descriptor.input())?;

        tracing::debug!(
            service = self.service.full_name(),
            method,
            "dispatching unary call"
        );
        match self.transport.unary(&descriptor, request, options).await? {
            Ok(response) => Ok(json::to_generic(&response)),
            Err(status) => Err(CallError::Rpc(status)),
        }
    }

    /// The resolved service descriptor this client dispatches against.
    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    /// The names of the methods that can be invoked, in no particular order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}
