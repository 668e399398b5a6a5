//! Shared test fixtures: a hand-assembled `helloworld.Greeter` schema, an in-process
//! gRPC server for it, and a call-counting service wrapper.
//!
//! The descriptors are built from `prost_types` structs directly, so the test suite
//! needs neither `protoc` nor a build script.
#![allow(dead_code)]

use gantry_core::grpc::codec::DynamicCodec;
use prost_reflect::{DescriptorPool, DynamicMessage, MethodDescriptor, ServiceDescriptor, Value};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tonic::{Status, server::NamedService};

fn string_field(name: &str, number: i32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::String as i32),
        json_name: Some(name.to_string()),
        ..Default::default()
    }
}

/// The schema of the classic `helloworld.Greeter` service, with a single unary
/// `SayHello(HelloRequest) -> HelloReply` method.
pub fn greeter_file_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("helloworld.proto".to_string()),
            package: Some("helloworld".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![
                DescriptorProto {
                    name: Some("HelloRequest".to_string()),
                    field: vec![string_field("name", 1)],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("HelloReply".to_string()),
                    field: vec![string_field("message", 1)],
                    ..Default::default()
                },
            ],
            service: vec![ServiceDescriptorProto {
                name: Some("Greeter".to_string()),
                method: vec![MethodDescriptorProto {
                    name: Some("SayHello".to_string()),
                    input_type: Some(".helloworld.HelloRequest".to_string()),
                    output_type: Some(".helloworld.HelloReply".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// A schema with a server-streaming method, for exercising streaming rejection.
pub fn streaming_file_descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("feed.proto".to_string()),
            package: Some("feed".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![
                DescriptorProto {
                    name: Some("Topic".to_string()),
                    field: vec![string_field("name", 1)],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("Event".to_string()),
                    field: vec![string_field("payload", 1)],
                    ..Default::default()
                },
            ],
            service: vec![ServiceDescriptorProto {
                name: Some("Feed".to_string()),
                method: vec![MethodDescriptorProto {
                    name: Some("Subscribe".to_string()),
                    input_type: Some(".feed.Topic".to_string()),
                    output_type: Some(".feed.Event".to_string()),
                    server_streaming: Some(true),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

pub fn greeter_pool() -> DescriptorPool {
    DescriptorPool::from_file_descriptor_set(greeter_file_descriptor_set())
        .expect("Failed to build greeter descriptor pool")
}

pub fn greeter_service() -> ServiceDescriptor {
    greeter_pool()
        .get_service_by_name("helloworld.Greeter")
        .expect("Greeter service missing from pool")
}

pub fn streaming_service() -> ServiceDescriptor {
    DescriptorPool::from_file_descriptor_set(streaming_file_descriptor_set())
        .expect("Failed to build streaming descriptor pool")
        .get_service_by_name("feed.Feed")
        .expect("Feed service missing from pool")
}

/// A reflection server publishing the greeter and streaming schemas, usable directly
/// as an in-process transport.
pub fn reflection_server()
-> tonic_reflection::server::v1::ServerReflectionServer<impl tonic_reflection::server::v1::ServerReflection>
{
    tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(greeter_file_descriptor_set())
        .register_file_descriptor_set(streaming_file_descriptor_set())
        .build_v1()
        .expect("Failed to setup Reflection Service")
}

/// An in-process gRPC server for `helloworld.Greeter`, speaking the dynamic codec.
///
/// `SayHello` replies with `Hello, {name}`. Any other path is answered with
/// `UNIMPLEMENTED`, like a real tonic router would.
#[derive(Clone)]
pub struct GreeterGrpc {
    method: MethodDescriptor,
}

impl GreeterGrpc {
    pub fn new() -> Self {
        let method = greeter_service()
            .methods()
            .find(|m| m.name() == "SayHello")
            .expect("SayHello missing from Greeter");
        Self { method }
    }
}

impl NamedService for GreeterGrpc {
    const NAME: &'static str = "helloworld.Greeter";
}

impl tower::Service<http::Request<tonic::body::Body>> for GreeterGrpc {
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<tonic::body::Body>) -> Self::Future {
        if req.uri().path() != "/helloworld.Greeter/SayHello" {
            let mut response = http::Response::new(tonic::body::Body::empty());
            response.headers_mut().insert(
                "grpc-status",
                http::HeaderValue::from_static("12"), // UNIMPLEMENTED
            );
            response.headers_mut().insert(
                "content-type",
                http::HeaderValue::from_static("application/grpc"),
            );
            return Box::pin(async move { Ok(response) });
        }

        // Server direction: decode requests, encode replies, so the descriptors are
        // handed to the codec in the opposite order from a client.
        let codec = DynamicCodec::new(self.method.output(), self.method.input());
        let mut grpc = tonic::server::Grpc::new(codec);
        let svc = SayHelloSvc {
            output: self.method.output(),
        };
        Box::pin(async move { Ok(grpc.unary(svc, req).await) })
    }
}

struct SayHelloSvc {
    output: prost_reflect::MessageDescriptor,
}

impl tonic::server::UnaryService<DynamicMessage> for SayHelloSvc {
    type Response = DynamicMessage;
    type Future = std::future::Ready<Result<tonic::Response<DynamicMessage>, Status>>;

    fn call(&mut self, request: tonic::Request<DynamicMessage>) -> Self::Future {
        let name = request
            .get_ref()
            .get_field_by_name("name")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let mut reply = DynamicMessage::new(self.output.clone());
        reply.set_field_by_name("message", Value::String(format!("Hello, {name}")));
        std::future::ready(Ok(tonic::Response::new(reply)))
    }
}

/// Wraps a transport and counts how many requests pass through it.
#[derive(Clone)]
pub struct CountingService<S> {
    inner: S,
    calls: Arc<AtomicUsize>,
}

impl<S> CountingService<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<S, Req> tower::Service<Req> for CountingService<S>
where
    S: tower::Service<Req>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.call(req)
    }
}
