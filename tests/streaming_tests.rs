mod common;

use common::{status_response, ScriptedTransport, Step};
use routebind::{CallArgs, Client, Error, RouteSpec, StreamMode};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn file_client(base_url: &str, mode: StreamMode) -> Client {
    Client::builder("downloads")
        .base_url(base_url)
        .unwrap()
        .route(RouteSpec::new("get_archive", "/archive.bin").stream(mode))
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn streams_response_body_to_a_file() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/archive.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"binary payload".to_vec()))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("archive.bin");
    let client = file_client(&mock_server.uri(), StreamMode::ToFile);

    let reply = client
        .call(
            "get_archive",
            CallArgs::new().stream_to_file(&destination),
        )
        .await
        .unwrap();

    let response = reply.response().unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
    assert_eq!(std::fs::read(&destination).unwrap(), b"binary payload");
}

#[tokio::test]
async fn append_mode_extends_an_existing_file() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/archive.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"chunk".to_vec()))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("log.txt");
    let client = file_client(&mock_server.uri(), StreamMode::ToFile);

    client
        .call(
            "get_archive",
            CallArgs::new().stream_append_to_file(&destination),
        )
        .await
        .unwrap();
    client
        .call(
            "get_archive",
            CallArgs::new().stream_append_to_file(&destination),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(&destination).unwrap(), b"chunkchunk");
}

#[tokio::test]
async fn streams_chunks_to_a_writer() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/archive.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"written out".to_vec()))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("sink.bin");
    let writer = std::fs::File::create(&destination).unwrap();
    let client = file_client(&mock_server.uri(), StreamMode::ToWriter);

    client
        .call(
            "get_archive",
            CallArgs::new().stream_to_writer(Box::new(writer)),
        )
        .await
        .unwrap();
    assert_eq!(std::fs::read(&destination).unwrap(), b"written out");
}

#[tokio::test]
async fn callback_mode_hands_over_each_chunk() {
    let transport = Arc::new(ScriptedTransport::new([Step::Respond(status_response(
        200,
        "hello chunks",
    ))]));
    let client = Client::builder("downloads")
        .base_url("http://example.com")
        .unwrap()
        .route(RouteSpec::new("get_archive", "/archive.bin").stream(StreamMode::ToCallback))
        .unwrap()
        .with_transport(transport)
        .build()
        .unwrap();

    let seen: Arc<Mutex<Vec<(u16, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client
        .call(
            "get_archive",
            CallArgs::new().stream_with(move |head, chunk| {
                sink.lock().unwrap().push((head.status, chunk.to_vec()));
                Ok(())
            }),
        )
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    // The scripted transport splits the body into two chunks.
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|(status, _)| *status == 200));
    let reassembled: Vec<u8> = seen.iter().flat_map(|(_, c)| c.clone()).collect();
    assert_eq!(reassembled, b"hello chunks");
}

#[tokio::test]
async fn unexpected_status_aborts_before_writing_chunks() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/archive.bin"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("partial.bin");
    let client = file_client(&mock_server.uri(), StreamMode::ToFile);

    let err = client
        .call(
            "get_archive",
            CallArgs::new().stream_to_file(&destination),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnexpectedResponse { .. }));
    assert_eq!(err.response().unwrap().status, 500);
    assert_eq!(std::fs::read(&destination).unwrap(), b"");
}

#[tokio::test]
async fn missing_stream_target_is_reported() {
    let client = Client::builder("downloads")
        .base_url("http://example.com")
        .unwrap()
        .route(RouteSpec::new("get_archive", "/archive.bin").stream(StreamMode::ToFile))
        .unwrap()
        .build()
        .unwrap();

    let err = client.call("get_archive", CallArgs::new()).await.unwrap_err();
    assert!(matches!(err, Error::MissingStreamTarget { .. }));
}

#[tokio::test]
async fn parent_traversal_in_stream_path_is_rejected() {
    let transport = Arc::new(ScriptedTransport::new([]));
    let client = Client::builder("downloads")
        .base_url("http://example.com")
        .unwrap()
        .route(RouteSpec::new("get_archive", "/archive.bin").stream(StreamMode::ToFile))
        .unwrap()
        .with_transport(transport.clone())
        .build()
        .unwrap();

    let err = client
        .call(
            "get_archive",
            CallArgs::new().stream_to_file("../outside.bin"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(transport.calls(), 0);
}
