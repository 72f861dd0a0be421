//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, StatusCode},
    Router,
};
use prost::Message;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use gcp_events_convert::codec::{PubsubMessage, ReceivedMessage};
use gcp_events_convert::config::ProxyConfig;
use gcp_events_convert::http::HttpServer;
use gcp_events_convert::lifecycle::Shutdown;

pub const MARKER: &str = "application/grpc+cloudevent+json";

/// A request as the mock upstream saw it.
#[derive(Debug, Clone)]
pub struct Captured {
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Start a mock upstream that records every request and answers with a
/// fixed status and body.
pub async fn start_mock_backend(
    status: StatusCode,
    response: &'static str,
) -> (SocketAddr, Arc<Mutex<Vec<Captured>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();

    let app = Router::new().fallback(move |headers: HeaderMap, body: Bytes| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(Captured { headers, body });
            (status, response)
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, captured)
}

/// Start a mock upstream that streams `chunks` as separate body frames.
pub async fn start_streaming_backend(status: StatusCode, chunks: Vec<Bytes>) -> SocketAddr {
    let app = Router::new().fallback(move || {
        let chunks = chunks.clone();
        async move {
            let frames = chunks.into_iter().map(Ok::<_, std::convert::Infallible>);
            (status, Body::from_stream(futures_util::stream::iter(frames)))
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

/// Start the proxy in front of `upstream`. Dropping the returned
/// [`Shutdown`] leaves the server running; call `trigger` to stop it.
pub async fn start_proxy(
    upstream: SocketAddr,
    configure: impl FnOnce(&mut ProxyConfig),
) -> (SocketAddr, Shutdown, mpsc::UnboundedSender<ProxyConfig>) {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.address = upstream.to_string();
    configure(&mut config);

    let shutdown = Shutdown::new();
    let (updates_tx, config_updates) = mpsc::unbounded_channel();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, shutdown, updates_tx)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Encode a push envelope carrying a binary-mode CloudEvent.
pub fn envelope(ack_id: &str, attributes: &[(&str, &str)], data: &[u8]) -> Vec<u8> {
    ReceivedMessage {
        ack_id: ack_id.to_string(),
        message: Some(PubsubMessage {
            data: Bytes::copy_from_slice(data),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            message_id: "m-1".to_string(),
            ..Default::default()
        }),
        delivery_attempt: 1,
    }
    .encode_to_vec()
}

pub const EVENT_ATTRIBUTES: &[(&str, &str)] = &[
    ("ce-specversion", "1.0"),
    ("ce-id", "evt-42"),
    ("ce-source", "//pubsub.googleapis.com/projects/demo/topics/orders"),
    ("ce-type", "com.example.order.created"),
    ("ce-datacontenttype", "application/json"),
    ("ce-region", "eu"),
];
