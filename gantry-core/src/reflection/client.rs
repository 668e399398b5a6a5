//! # Reflection Client
//!
//! A client for `grpc.reflection.v1` that builds a complete `FileDescriptorSet` for a
//! named symbol. It asks the server for the file containing the symbol, inspects the
//! imports of every file it receives, and keeps requesting missing files until the
//! whole dependency closure is collected. Files are deduplicated by name, so import
//! cycles terminate instead of expanding forever.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use crate::BoxError;
use futures_util::stream::once;
use http_body::Body as HttpBody;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Code, Status, Streaming, client::GrpcService, transport::Channel};
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, ServerReflectionResponse,
    server_reflection_client::ServerReflectionClient, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};

/// Errors raised while resolving descriptors over the reflection sub-protocol.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The endpoint does not expose reflection, or does not know the requested symbol.
    #[error("service '{0}' not found: the endpoint lacks reflection support or does not know the symbol")]
    ServiceNotFound(String),

    /// The reflection payload contained bytes that do not decode as a descriptor proto.
    #[error("malformed reflection response: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// The collected descriptor set was rejected when building a descriptor pool.
    #[error("invalid descriptor set: {0}")]
    InvalidDescriptorSet(#[from] prost_reflect::DescriptorError),

    #[error("reflection transport failure: '{0}'")]
    Transport(#[source] Status),

    #[error("reflection stream closed before resolution finished")]
    StreamClosed,

    #[error("internal error: failed to send a request on the reflection stream")]
    SendFailed,

    #[error("unexpected reflection response: {0}")]
    Protocol(String),
}

// The host field of reflection requests is undocumented and servers ignore it,
// so it is not surfaced to callers.
const EMPTY_HOST: &str = "";

/// A client for the gRPC Server Reflection Protocol.
#[derive(Debug, Clone)]
pub struct ReflectionClient<S = Channel> {
    inner: ServerReflectionClient<S>,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(channel: S) -> Self {
        Self {
            inner: ServerReflectionClient::new(channel),
        }
    }

    /// Fetches the file containing `symbol` (e.g. `my.package.MyService`) plus the
    /// transitive closure of its imports, as one deduplicated `FileDescriptorSet`.
    pub async fn file_descriptor_set_by_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<FileDescriptorSet, ResolveError> {
        let (tx, rx) = mpsc::channel(16);

        let mut responses = self
            .inner
            .server_reflection_info(ReceiverStream::new(rx))
            .await
            .map_err(|status| stream_init_error(status, symbol))?
            .into_inner();

        let initial = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::FileContainingSymbol(symbol.to_string())),
        };
        tx.send(initial).await.map_err(|_| ResolveError::SendFailed)?;

        let files = collect_files(&mut responses, tx, symbol).await?;
        tracing::debug!(symbol, files = files.len(), "assembled file descriptor set");

        Ok(FileDescriptorSet {
            file: files.into_values().collect(),
        })
    }

    /// Lists all services exposed by the server.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ResolveError> {
        let request = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::ListServices(String::new())),
        };

        let mut responses = self
            .inner
            .server_reflection_info(once(async { request }))
            .await
            .map_err(ResolveError::Transport)?
            .into_inner();

        let response = responses
            .message()
            .await
            .map_err(ResolveError::Transport)?
            .ok_or(ResolveError::StreamClosed)?;

        match response.message_response {
            Some(MessageResponse::ListServicesResponse(list)) => {
                Ok(list.service.into_iter().map(|s| s.name).collect())
            }
            Some(MessageResponse::ErrorResponse(e)) => Err(ResolveError::Protocol(format!(
                "server returned reflection error code {}: {}",
                e.error_code, e.error_message
            ))),
            other => Err(unexpected(other)),
        }
    }
}

fn stream_init_error(status: Status, symbol: &str) -> ResolveError {
    // An endpoint without the reflection service answers the very first frame
    // with UNIMPLEMENTED.
    if status.code() == Code::Unimplemented {
        ResolveError::ServiceNotFound(symbol.to_string())
    } else {
        ResolveError::Transport(status)
    }
}

/// Drains the reflection stream, requesting every not-yet-seen dependency of every
/// received file, until no request is outstanding.
async fn collect_files(
    responses: &mut Streaming<ServerReflectionResponse>,
    requests: mpsc::Sender<ServerReflectionRequest>,
    symbol: &str,
) -> Result<BTreeMap<String, FileDescriptorProto>, ResolveError> {
    let mut collected: BTreeMap<String, FileDescriptorProto> = BTreeMap::new();
    let mut requested: HashSet<String> = HashSet::new();
    let mut outstanding = 1usize;

    while outstanding > 0 {
        let response = responses
            .message()
            .await
            .map_err(|status| stream_error(status, symbol))?
            .ok_or(ResolveError::StreamClosed)?;

        outstanding -= 1;

        let payload = match response.message_response {
            Some(MessageResponse::FileDescriptorResponse(payload)) => payload,
            Some(MessageResponse::ErrorResponse(e)) => {
                return Err(if e.error_code == Code::NotFound as i32 {
                    ResolveError::ServiceNotFound(symbol.to_string())
                } else {
                    ResolveError::Protocol(format!(
                        "server returned reflection error code {}: {}",
                        e.error_code, e.error_message
                    ))
                });
            }
            other => return Err(unexpected(other)),
        };

        for raw in payload.file_descriptor_proto {
            let file = FileDescriptorProto::decode(raw.as_ref())?;
            let Some(name) = file.name.clone() else {
                return Err(ResolveError::Protocol(
                    "received a file descriptor without a name".to_string(),
                ));
            };
            if collected.contains_key(&name) {
                continue;
            }

            for dependency in &file.dependency {
                if !collected.contains_key(dependency) && requested.insert(dependency.clone()) {
                    let request = ServerReflectionRequest {
                        host: EMPTY_HOST.to_string(),
                        message_request: Some(MessageRequest::FileByFilename(dependency.clone())),
                    };
                    requests
                        .send(request)
                        .await
                        .map_err(|_| ResolveError::SendFailed)?;
                    outstanding += 1;
                }
            }

            collected.insert(name, file);
        }
    }

    Ok(collected)
}

fn stream_error(status: Status, symbol: &str) -> ResolveError {
    if status.code() == Code::NotFound {
        ResolveError::ServiceNotFound(symbol.to_string())
    } else {
        ResolveError::Transport(status)
    }
}

fn unexpected(response: Option<MessageResponse>) -> ResolveError {
    match response {
        Some(other) => ResolveError::Protocol(format!("unexpected response type: {other:?}")),
        None => ResolveError::Protocol("empty reflection response".to_string()),
    }
}
