//! Common test utilities for bellite-client integration tests
//!
//! A mock Bellite host speaking NUL-framed JSON-RPC over TCP, modelled on
//! the reference host used to test Bellite clients.

#![allow(dead_code)]

use bellite_client::{Bellite, ClientBuilder};
use bellite_core::codec::FrameBuffer;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Token the default host accepts
pub const TOKEN: &str = "0123456789abcdef";

/// Short reactor tick for tests
pub const POLL: Duration = Duration::from_millis(20);

/// Upper bound for anything a test waits on
pub const LIMIT: Duration = Duration::from_secs(2);

/// What the host does in answer to one message
pub enum Action {
    /// Write a frame (the delimiter is appended)
    Send(String),
    /// Hang up
    Close,
}

type Handler = Arc<dyn Fn(&Value) -> Vec<Action> + Send + Sync>;

/// Mock Bellite host
///
/// Every message the host receives is forwarded to the test through
/// [`MockBelliteServer::wait_for_message`].
pub struct MockBelliteServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    message_rx: mpsc::UnboundedReceiver<Value>,
}

impl MockBelliteServer {
    /// A host that behaves like the reference host and accepts [`TOKEN`]
    pub async fn start() -> Self {
        Self::with_handler(bellite_host(TOKEN)).await
    }

    /// A host answering with a custom handler
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Vec<Action> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Handler = Arc::new(handler);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, msg_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        if let Ok((stream, _)) = accepted {
                            tokio::spawn(serve(stream, Arc::clone(&handler), msg_tx.clone()));
                        }
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            message_rx: msg_rx,
        }
    }

    /// `host:port/token` for this host
    pub fn credentials(&self) -> String {
        self.credentials_with_token(TOKEN)
    }

    pub fn credentials_with_token(&self, token: &str) -> String {
        format!("{}:{}/{}", self.addr.ip(), self.addr.port(), token)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Next message received by the host, if one arrives in time
    pub async fn wait_for_message(&mut self) -> Option<Value> {
        tokio::time::timeout(LIMIT, self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Skip ahead to the next message calling `method`
    pub async fn wait_for_method(&mut self, method: &str) -> Option<Value> {
        loop {
            let message = self.wait_for_message().await?;
            if message["method"] == method {
                return Some(message);
            }
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn serve(stream: TcpStream, handler: Handler, messages: mpsc::UnboundedSender<Value>) {
    let (mut reader, mut writer) = stream.into_split();
    let mut frames = FrameBuffer::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        for frame in frames.push(&chunk[..n]) {
            let Ok(message) = serde_json::from_slice::<Value>(&frame) else {
                continue;
            };
            let _ = messages.send(message.clone());

            for action in handler(&message) {
                match action {
                    Action::Send(text) => {
                        let mut bytes = text.into_bytes();
                        bytes.push(0);
                        if writer.write_all(&bytes).await.is_err() {
                            return;
                        }
                    }
                    Action::Close => {
                        let _ = writer.shutdown().await;
                        return;
                    }
                }
            }
        }
    }
}

/// Handler mirroring the reference host
///
/// Accepts `token`; answers `ping`, `version`, `bindEvent`, `unbindEvent`
/// and `perform`. `perform` of `testEvent` answers, then pushes a
/// `testEvent` event carrying the ctx given to `bindEvent`. `perform` of
/// `shutdown` hangs up without answering. Other commands echo their args.
pub fn bellite_host(token: &str) -> impl Fn(&Value) -> Vec<Action> + Send + Sync + 'static {
    let token = token.to_string();
    let contexts: Arc<Mutex<HashMap<String, Value>>> = Arc::default();

    move |msg: &Value| {
        let id = msg["id"].as_u64();
        let params = &msg["params"];

        match msg["method"].as_str() {
            Some("auth") => {
                if params[0] == token.as_str() {
                    answer(id, json!([null, true, "authorized"]))
                } else {
                    let mut actions = error(id, 401, "Unauthorized");
                    actions.push(Action::Close);
                    actions
                }
            }
            Some("ping") => answer(id, json!([null, true, "pong"])),
            Some("version") => answer(
                id,
                json!([null, {"server": "bellite", "version": "1.4.3", "platform": "rust/test"}]),
            ),
            Some("bindEvent") => {
                if let Some(evt_type) = params[1].as_str() {
                    contexts
                        .lock()
                        .unwrap()
                        .insert(evt_type.to_string(), params[3].clone());
                }
                answer(id, json!([null, true]))
            }
            Some("unbindEvent") => answer(id, json!([null, true])),
            Some("perform") => match params[1].as_str() {
                Some("testEvent") => {
                    let ctx = contexts
                        .lock()
                        .unwrap()
                        .get("testEvent")
                        .cloned()
                        .unwrap_or(Value::Null);
                    let mut actions = answer(id, json!([null, true, "firingTestEvent"]));
                    actions.push(Action::Send(mock_event("testEvent", 0, json!("dyn_1"), ctx)));
                    actions
                }
                Some("shutdown") => vec![Action::Close],
                _ => answer(id, json!([null, params[2].clone()])),
            },
            _ => answer(id, json!(["unknown method ", null])),
        }
    }
}

/// Reply actions for a call; notifications get nothing
pub fn answer(id: Option<u64>, result: Value) -> Vec<Action> {
    match id {
        Some(id) => vec![Action::Send(mock_response(id, result))],
        None => Vec::new(),
    }
}

pub fn error(id: Option<u64>, code: i64, message: &str) -> Vec<Action> {
    match id {
        Some(id) => vec![Action::Send(mock_error_response(id, code, message))],
        None => Vec::new(),
    }
}

/// Helper to create a mock JSON-RPC response
pub fn mock_response(id: u64, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
    .to_string()
}

/// Helper to create a mock JSON-RPC error response
pub fn mock_error_response(id: u64, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
    .to_string()
}

/// Helper to create a host pushed event
pub fn mock_event(evt_type: &str, self_id: i64, evt: Value, ctx: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "event",
        "params": {
            "evtType": evt_type,
            "selfId": self_id,
            "evt": evt,
            "ctx": ctx
        }
    })
    .to_string()
}

/// Builder pointed at `server` with a short poll tick
pub fn builder_for(server: &MockBelliteServer) -> ClientBuilder {
    ClientBuilder::new()
        .with_credentials(server.credentials())
        .poll_timeout(POLL)
        .log_traffic(true)
}

/// Connect to `server` and wait until the session is ready
pub async fn connect_ready(server: &MockBelliteServer) -> Bellite {
    let client = builder_for(server).connect().await.unwrap();
    client.run_until_settled(&client.ready(), LIMIT).await.unwrap();
    client
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_response_format() {
        let response: Value = serde_json::from_str(&mock_response(100, json!([0]))).unwrap();
        assert_eq!(response["id"], 100);
        assert_eq!(response["result"], json!([0]));
    }

    #[test]
    fn test_mock_event_format() {
        let event: Value =
            serde_json::from_str(&mock_event("testEvent", 0, json!("x"), Value::Null)).unwrap();
        assert_eq!(event["method"], "event");
        assert_eq!(event["params"]["evtType"], "testEvent");
        assert!(event.get("id").is_none());
    }
}
