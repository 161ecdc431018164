use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use smart_bookmarks::{config::Config, services::ChangeFeedService};

fn config_for(backend_url: &str) -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 3000,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        backend_url: backend_url.to_string(),
        backend_anon_key: "anon-key".to_string(),
        auth_provider: "google".to_string(),
        auth_theme: "default".to_string(),
        site_origin: "http://localhost:3000".to_string(),
        bookmark_collection: "bookmarks".to_string(),
        cors_allowed_origins: "http://localhost:3000".to_string(),
    }
}

async fn bind_feed_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

type ServerSocket = WebSocketStream<tokio::net::TcpStream>;

/// Accept one connection and read the subscribe frame it opens with.
async fn accept_subscriber(listener: &TcpListener) -> (serde_json::Value, ServerSocket) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut socket = accept_async(stream).await.unwrap();
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                return (serde_json::from_str(&text).unwrap(), socket);
            }
            Some(Ok(_)) => continue,
            other => panic!("expected subscribe frame, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_subscribe_opens_owner_scoped_stream() {
    let (listener, url) = bind_feed_server().await;
    let server = tokio::spawn(async move { accept_subscriber(&listener).await });

    let feed = ChangeFeedService::new(&config_for(&url));
    let subscription = feed.subscribe("token", "user_1").await.unwrap();

    let (frame, _socket) = server.await.unwrap();
    assert_eq!(frame["action"], "subscribe");
    assert_eq!(frame["collection"], "bookmarks");
    assert_eq!(frame["events"], json!(["insert", "delete"]));
    assert_eq!(frame["filter"], json!({ "user_id": "user_1" }));
    assert_eq!(frame["access_token"], "token");
    assert_eq!(subscription.user_id(), "user_1");
}

#[tokio::test]
async fn test_events_flow_through_and_non_event_frames_are_skipped() {
    let (listener, url) = bind_feed_server().await;
    let server = tokio::spawn(async move {
        let (_frame, mut socket) = accept_subscriber(&listener).await;
        // acks and heartbeats share the socket with events
        socket
            .send(Message::Text(r#"{"type":"ack","ref":1}"#.to_string()))
            .await
            .unwrap();
        socket
            .send(Message::Text(
                json!({
                    "event_type": "insert",
                    "new_record": { "id": "bm_1", "title": "Example" }
                })
                .to_string(),
            ))
            .await
            .unwrap();
        socket
    });

    let feed = ChangeFeedService::new(&config_for(&url));
    let mut subscription = feed.subscribe("token", "user_1").await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), subscription.next_event())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.new_record.unwrap()["id"], "bm_1");

    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_unsubscribe_closes_the_connection() {
    let (listener, url) = bind_feed_server().await;
    let server = tokio::spawn(async move { accept_subscriber(&listener).await });

    let feed = ChangeFeedService::new(&config_for(&url));
    let subscription = feed.subscribe("token", "user_1").await.unwrap();
    let (_frame, mut socket) = server.await.unwrap();

    subscription.unsubscribe();

    // The reader task owned the client side; releasing the handle tears the
    // stream down and the server observes the close.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server never observed the close");
}

#[tokio::test]
async fn test_subscriptions_are_scoped_per_user() {
    let (listener, url) = bind_feed_server().await;
    let server = tokio::spawn(async move {
        let first = accept_subscriber(&listener).await;
        let second = accept_subscriber(&listener).await;
        (first, second)
    });

    let feed = ChangeFeedService::new(&config_for(&url));
    let first = feed.subscribe("token-a", "user_1").await.unwrap();
    let mut second = feed.subscribe("token-b", "user_2").await.unwrap();

    let ((first_frame, mut first_socket), (second_frame, mut second_socket)) =
        server.await.unwrap();
    assert_eq!(first_frame["filter"], json!({ "user_id": "user_1" }));
    assert_eq!(second_frame["filter"], json!({ "user_id": "user_2" }));

    // Tearing the first stream down leaves the second delivering.
    first.unsubscribe();
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first_socket.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "first stream never closed");

    second_socket
        .send(Message::Text(
            json!({
                "event_type": "delete",
                "old_record": { "id": "bm_9" }
            })
            .to_string(),
        ))
        .await
        .unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), second.next_event())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.old_record.unwrap()["id"], "bm_9");
}
