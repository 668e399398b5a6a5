use gantry_core::reflection::client::{ReflectionClient, ResolveError};
use greeter::{GreeterGrpc, reflection_server};
use prost_reflect::DescriptorPool;

mod greeter;

#[tokio::test]
async fn fetches_the_file_descriptor_set_for_a_symbol() {
    let mut client = ReflectionClient::new(reflection_server());

    let fd_set = client
        .file_descriptor_set_by_symbol("helloworld.Greeter")
        .await
        .expect("Failed to fetch file descriptor set by symbol");

    let pool =
        DescriptorPool::from_file_descriptor_set(fd_set).expect("Failed to build descriptor pool");

    let service = pool
        .get_service_by_name("helloworld.Greeter")
        .expect("Failed to find service in file descriptor");

    let say_hello = service
        .methods()
        .find(|m| m.name() == "SayHello")
        .expect("SayHello missing");

    assert_eq!(say_hello.input().full_name(), "helloworld.HelloRequest");
    assert_eq!(say_hello.output().full_name(), "helloworld.HelloReply");
    assert!(!say_hello.is_client_streaming());
    assert!(!say_hello.is_server_streaming());
}

#[tokio::test]
async fn streaming_flags_survive_resolution() {
    let mut client = ReflectionClient::new(reflection_server());

    let fd_set = client
        .file_descriptor_set_by_symbol("feed.Feed")
        .await
        .expect("Failed to fetch file descriptor set by symbol");

    let pool =
        DescriptorPool::from_file_descriptor_set(fd_set).expect("Failed to build descriptor pool");

    let subscribe = pool
        .get_service_by_name("feed.Feed")
        .expect("Failed to find service in file descriptor")
        .methods()
        .find(|m| m.name() == "Subscribe")
        .expect("Subscribe missing");

    assert!(subscribe.is_server_streaming());
    assert!(!subscribe.is_client_streaming());
}

#[tokio::test]
async fn unknown_symbol_maps_to_service_not_found() {
    let mut client = ReflectionClient::new(reflection_server());

    let result = client
        .file_descriptor_set_by_symbol("non.existent.Service")
        .await;

    assert!(matches!(
        result,
        Err(ResolveError::ServiceNotFound(name)) if name == "non.existent.Service"
    ));
}

#[tokio::test]
async fn endpoint_without_reflection_maps_to_service_not_found() {
    // This server hosts only the Greeter; the reflection stream itself is answered
    // with UNIMPLEMENTED.
    let mut client = ReflectionClient::new(GreeterGrpc::new());

    let result = client
        .file_descriptor_set_by_symbol("helloworld.Greeter")
        .await;

    assert!(matches!(
        result,
        Err(ResolveError::ServiceNotFound(name)) if name == "helloworld.Greeter"
    ));
}

#[tokio::test]
async fn lists_the_services_exposed_by_the_server() {
    let mut client = ReflectionClient::new(reflection_server());

    let services = client.list_services().await.unwrap();
    assert!(services.contains(&"helloworld.Greeter".to_string()));
    assert!(services.contains(&"feed.Feed".to_string()));
}
