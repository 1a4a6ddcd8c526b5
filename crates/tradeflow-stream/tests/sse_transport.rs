//! SSE transport against a local HTTP server

use std::sync::Arc;
use std::time::Duration;
use tradeflow_stream::transport::{
    ChannelHandle, ChannelRequest, ReadyState, Transport, TransportEvent,
};
use tradeflow_stream::{
    MessageStatus, ReconnectConfig, SseTransport, StaticCredentials, StreamClient, StreamConfig,
    StreamError,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_BODY: &str = concat!(
    "data: {\"type\":\"connection\",\"content\":\"ready\"}\n\n",
    ": keep-alive\n\n",
    "event: status\ndata: ignored\n\n",
    "data: {\"type\":\"message_chunk\",\"messageId\":\"m1\",\"content\":\"Hello \"}\r\n\r\n",
    "data: {\"type\":\"message_chunk\",\"messageId\":\"m1\",\"content\":\"world\"}\n\n",
    "data: {\"type\":\"heartbeat\"}\n\n",
    "data: {\"type\":\"message_complete\",\"messageId\":\"m1\"}\n\n",
);

fn config_for(server: &MockServer) -> StreamConfig {
    StreamConfig {
        base_url: format!("{}/api/v1", server.uri()),
        reconnect: ReconnectConfig {
            auto_reconnect: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn mount_stream(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/stream"))
        .and(query_param("session_id", "s1"))
        .and(query_param("token", "tok"))
        .and(header("authorization", "Bearer tok"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn next(events: &mut tokio::sync::mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no transport event")
        .expect("channel dropped")
}

#[tokio::test]
async fn test_forwards_default_frames_until_stream_ends() {
    let server = MockServer::start().await;
    mount_stream(&server, 200, STREAM_BODY).await;

    let transport = SseTransport::new().unwrap();
    let request = ChannelRequest::new(&config_for(&server), "s1", "tok").unwrap();
    let mut channel = transport.open(request).unwrap();

    assert_eq!(next(&mut channel.events).await, TransportEvent::Open);

    let mut payloads = Vec::new();
    let reason = loop {
        match next(&mut channel.events).await {
            TransportEvent::Message(payload) => payloads.push(payload),
            TransportEvent::Error(reason) => break reason,
            TransportEvent::Open => panic!("opened twice"),
        }
    };

    assert_eq!(payloads.len(), 5);
    assert_eq!(payloads[0], r#"{"type":"connection","content":"ready"}"#);
    assert!(payloads.iter().all(|p| !p.contains("ignored")));
    assert_eq!(reason, "server closed the stream");
    assert_eq!(channel.handle.ready_state(), ReadyState::Closed);
}

#[tokio::test]
async fn test_http_error_status_fails_channel() {
    let server = MockServer::start().await;
    mount_stream(&server, 401, "").await;

    let transport = SseTransport::new().unwrap();
    let request = ChannelRequest::new(&config_for(&server), "s1", "tok").unwrap();
    let mut channel = transport.open(request).unwrap();

    match next(&mut channel.events).await {
        TransportEvent::Error(reason) => assert!(reason.contains("401"), "{}", reason),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(channel.handle.ready_state(), ReadyState::Closed);
}

#[tokio::test]
async fn test_close_stops_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(STREAM_BODY),
        )
        .mount(&server)
        .await;

    let transport = SseTransport::new().unwrap();
    let request = ChannelRequest::new(&config_for(&server), "s1", "tok").unwrap();
    let mut channel = transport.open(request).unwrap();
    channel.handle.close();
    channel.handle.close();

    assert_eq!(channel.handle.ready_state(), ReadyState::Closed);
    let delivered = tokio::time::timeout(Duration::from_secs(5), channel.events.recv())
        .await
        .expect("reader task did not stop");
    assert!(!matches!(delivered, Some(TransportEvent::Error(_))));
}

#[tokio::test]
async fn test_client_reassembles_over_sse() {
    let server = MockServer::start().await;
    mount_stream(&server, 200, STREAM_BODY).await;

    let client = StreamClient::new(
        config_for(&server),
        Arc::new(SseTransport::new().unwrap()),
        Arc::new(StaticCredentials::new("tok")),
    );
    client.connect("s1").await.unwrap();

    // the body ends after the last frame, which fails the channel
    let mut status = client.subscribe_status();
    let status = tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.is_error()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert!(matches!(
        status.state,
        tradeflow_stream::ConnectionState::Error(StreamError::Transport { .. })
    ));

    let messages = client.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "Hello world");
    assert_eq!(messages[0].status, MessageStatus::Sent);

    let kinds: Vec<&str> = client.history().iter().map(|r| r.event.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "connection",
            "connection",
            "message_chunk",
            "message_chunk",
            "message_complete"
        ]
    );
}
