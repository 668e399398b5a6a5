//! # Endpoint Mounter
//!
//! Exposes the unary methods of a service as JSON-over-HTTP endpoints on an
//! [`axum::Router`]: one `POST {base_path}/{MethodName}` route per method.
//!
//! The "local service implementation" is a [`ServiceHandlers`] value: an explicit map
//! from method name to handler, built once at mount time. Each request decodes the
//! JSON body against the method's input descriptor, invokes the handler with a
//! schema-typed request, and encodes the schema-typed response back to JSON.
//!
//! Mounting is all-or-nothing: streaming methods and methods without a handler are
//! rejected before any route is registered.
use crate::json::{self, ConvertError};
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use prost_reflect::{DynamicMessage, MessageDescriptor, ServiceDescriptor};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tonic::{Code, Status, metadata::MetadataMap};

/// Errors raised while mounting a service, before any route is registered.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("method '{service}/{method}' is streaming; only unary-unary methods can be mounted")]
    UnsupportedStreaming { service: String, method: String },

    #[error("no handler registered for method '{0}'")]
    MissingHandler(String),
}

/// One operation of a local service implementation.
///
/// The request carries the decoded message plus the inbound HTTP headers as call
/// metadata; the handler returns a schema-typed response or an RPC status error.
#[async_trait]
pub trait UnaryHandler: Send + Sync {
    async fn handle(
        &self,
        request: tonic::Request<DynamicMessage>,
    ) -> Result<tonic::Response<DynamicMessage>, Status>;
}

#[async_trait]
impl<F, Fut> UnaryHandler for F
where
    F: Fn(tonic::Request<DynamicMessage>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<tonic::Response<DynamicMessage>, Status>> + Send,
{
    async fn handle(
        &self,
        request: tonic::Request<DynamicMessage>,
    ) -> Result<tonic::Response<DynamicMessage>, Status> {
        (self)(request).await
    }
}

/// The local service implementation handed to [`mount`]: one handler per method name.
#[derive(Clone, Default)]
pub struct ServiceHandlers {
    handlers: HashMap<String, Arc<dyn UnaryHandler>>,
}

impl ServiceHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for a method name, replacing any previous one.
    #[must_use]
    pub fn handle(mut self, method: impl Into<String>, handler: impl UnaryHandler + 'static) -> Self {
        self.handlers.insert(method.into(), Arc::new(handler));
        self
    }

    fn get(&self, method: &str) -> Option<Arc<dyn UnaryHandler>> {
        self.handlers.get(method).cloned()
    }
}

/// Mounts every method of `service` under `base_path` on the router.
///
/// Validation happens up front: if any method is streaming or lacks a handler, an error
/// is returned and the router is left untouched.
pub fn mount(
    router: Router,
    service: &ServiceDescriptor,
    handlers: &ServiceHandlers,
    base_path: &str,
) -> Result<Router, MountError> {
    let base = base_path.trim_end_matches('/');

    let mut routes = Vec::new();
    for method in service.methods() {
        if method.is_client_streaming() || method.is_server_streaming() {
            return Err(MountError::UnsupportedStreaming {
                service: service.full_name().to_string(),
                method: method.name().to_string(),
            });
        }
        let handler = handlers
            .get(method.name())
            .ok_or_else(|| MountError::MissingHandler(method.name().to_string()))?;
        routes.push((format!("{base}/{}", method.name()), method.input(), handler));
    }

    let mut router = router;
    for (path, input, handler) in routes {
        tracing::debug!(%path, "mounting unary method");
        router = router.route(
            &path,
            post(move |headers: HeaderMap, body: Bytes| {
                let input = input.clone();
                let handler = handler.clone();
                async move { serve_unary(input, handler, headers, body).await }
            }),
        );
    }
    tracing::info!(service = service.full_name(), base, "mounted service");
    Ok(router)
}

async fn serve_unary(
    input: MessageDescriptor,
    handler: Arc<dyn UnaryHandler>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_json",
                &format!("request body is not valid JSON: {err}"),
            );
        }
    };

    let message = match json::from_generic(&payload, &input) {
        Ok(message) => message,
        Err(err) => return convert_error_response(&err),
    };

    let mut request = tonic::Request::new(message);
    *request.metadata_mut() = MetadataMap::from_headers(headers);

    match handler.handle(request).await {
        Ok(response) => {
            (StatusCode::OK, Json(json::to_generic(response.get_ref()))).into_response()
        }
        Err(status) => error_response(
            http_status(status.code()),
            code_kind(status.code()),
            status.message(),
        ),
    }
}

fn convert_error_response(err: &ConvertError) -> Response {
    error_response(StatusCode::BAD_REQUEST, err.kind(), &err.to_string())
}

fn error_response(status: StatusCode, kind: &str, message: &str) -> Response {
    (status, Json(json!({ "error": kind, "message": message }))).into_response()
}

/// Maps an RPC status code onto the nearest HTTP status.
fn http_status(code: Code) -> StatusCode {
    match code {
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn code_kind(code: Code) -> &'static str {
    match code {
        Code::Ok => "ok",
        Code::Cancelled => "cancelled",
        Code::Unknown => "unknown",
        Code::InvalidArgument => "invalid_argument",
        Code::DeadlineExceeded => "deadline_exceeded",
        Code::NotFound => "not_found",
        Code::AlreadyExists => "already_exists",
        Code::PermissionDenied => "permission_denied",
        Code::ResourceExhausted => "resource_exhausted",
        Code::FailedPrecondition => "failed_precondition",
        Code::Aborted => "aborted",
        Code::OutOfRange => "out_of_range",
        Code::Unimplemented => "unimplemented",
        Code::Internal => "internal",
        Code::Unauthenticated => "unauthenticated",
        Code::DataLoss => "data_loss",
        Code::Unavailable => "unavailable",
    }
}
