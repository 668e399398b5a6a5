//! # Generic Unary Client
//!
//! This module wraps a standard `tonic` client to provide a generic interface for
//! unary gRPC calls. It is agnostic to the specific Protobuf messages being exchanged:
//! requests and responses are [`DynamicMessage`] values serialized through
//! [`super::codec::DynamicCodec`].
//!
//! ## Features
//!
//! * **Dynamic Pathing**: Constructs the HTTP/2 path (e.g., `/package.Service/Method`) at runtime.
//! * **Call Options**: Applies per-call timeout, metadata, credentials and compression
//!   from a [`CallOptions`] record.
use super::codec::DynamicCodec;
use crate::BoxError;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::str::FromStr;
use std::time::Duration;
use tonic::{
    client::GrpcService,
    codec::CompressionEncoding,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

/// Per-call options, mirroring the standard gRPC call-option set.
///
/// All fields are optional; absent fields defer to the transport's defaults.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Call deadline, sent as the `grpc-timeout` header.
    pub timeout: Option<Duration>,
    /// Additional metadata (headers) attached to the call.
    pub metadata: Vec<(String, String)>,
    /// Per-call auth override, attached as the `authorization` metadata entry.
    pub credentials: Option<CallCredentials>,
    /// Whether to wait for the channel to become ready instead of failing fast.
    /// The generic transport always drives the service to readiness before
    /// dispatching; channels that distinguish queued from fail-fast calls may
    /// honor this hint.
    pub wait_for_ready: bool,
    /// Wire compression applied to the request body for this call.
    pub compression: Option<CompressionEncoding>,
}

/// An opaque per-call credential, passed through as metadata and never interpreted.
#[derive(Debug, Clone)]
pub struct CallCredentials {
    token: String,
}

impl CallCredentials {
    /// A bearer token, sent as `authorization: Bearer <token>`.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    fn header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// A generic client able to invoke any unary method described by a [`MethodDescriptor`].
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    inner: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let inner = tonic::client::Grpc::new(service);
        Self { inner }
    }

    /// Performs a unary gRPC call (single request -> single response).
    ///
    /// # Returns
    /// * `Ok(Ok(message))` - Successful RPC execution.
    /// * `Ok(Err(status))` - RPC executed, but the server returned an error.
    /// * `Err(RequestError)` - The request could not be built or dispatched.
    pub async fn unary(
        &mut self,
        method: &MethodDescriptor,
        message: DynamicMessage,
        options: CallOptions,
    ) -> Result<Result<DynamicMessage, tonic::Status>, RequestError> {
        self.inner
            .ready()
            .await
            .map_err(|e| RequestError::ClientNotReady(e.into()))?;

        let codec = DynamicCodec::new(method.input(), method.output());
        let path = rpc_path(method);
        let request = build_request(message, &options)?;

        let mut grpc = self.inner.clone();
        if let Some(encoding) = options.compression {
            grpc = grpc.send_compressed(encoding);
        }

        match grpc.unary(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }
}

fn rpc_path(method: &MethodDescriptor) -> http::uri::PathAndQuery {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).expect("valid gRPC path")
}

fn build_request(
    message: DynamicMessage,
    options: &CallOptions,
) -> Result<tonic::Request<DynamicMessage>, RequestError> {
    let mut request = tonic::Request::new(message);

    if let Some(timeout) = options.timeout {
        request.set_timeout(timeout);
    }

    for (k, v) in &options.metadata {
        let key =
            MetadataKey::from_str(k).map_err(|source| RequestError::InvalidMetadataKey {
                key: k.clone(),
                source,
            })?;
        let val = MetadataValue::from_str(v).map_err(|source| {
            RequestError::InvalidMetadataValue {
                key: k.clone(),
                source,
            }
        })?;
        request.metadata_mut().insert(key, val);
    }

    if let Some(credentials) = &options.credentials {
        let val = MetadataValue::from_str(&credentials.header_value()).map_err(|source| {
            RequestError::InvalidMetadataValue {
                key: "authorization".to_string(),
                source,
            }
        })?;
        request.metadata_mut().insert("authorization", val);
    }

    Ok(request)
}
