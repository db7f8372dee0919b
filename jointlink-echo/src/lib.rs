//! JointLink Echo
//!
//! A WebSocket listener that logs every message it receives. It plays the
//! device's role on a workstation, so the bridge can be exercised without
//! hardware.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:8765";

/// How a received text message was understood.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// JSON carrying an `angles` field.
    Angles { data: Value, angles: Value },
    /// Any other JSON.
    Json(Value),
    /// Not JSON.
    Invalid,
}

/// Classify one text message.
pub fn classify(text: &str) -> Received {
    match serde_json::from_str::<Value>(text) {
        Ok(data) => match data.get("angles").cloned() {
            Some(angles) => Received::Angles { data, angles },
            None => Received::Json(data),
        },
        Err(_) => Received::Invalid,
    }
}

/// Accepts WebSocket clients and logs their messages.
pub struct EchoServer {
    listener: TcpListener,
    clients: Arc<AtomicUsize>,
    observer: Option<mpsc::UnboundedSender<String>>,
}

impl EchoServer {
    /// Bind to `addr`, e.g. `"0.0.0.0:8765"` or `"127.0.0.1:0"`.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener))
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listener,
            clients: Arc::new(AtomicUsize::new(0)),
            observer: None,
        }
    }

    /// Forward every received text message to `observer` as well.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<String>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the number of currently connected clients.
    pub fn client_count(&self) -> Arc<AtomicUsize> {
        self.clients.clone()
    }

    /// Accept clients forever, one task per client.
    pub async fn run(self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "WebSocket listener started");

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let clients = self.clients.clone();
            let observer = self.observer.clone();
            tokio::spawn(async move {
                handle_client(stream, addr, clients, observer).await;
            });
        }
    }
}

/// Decrements the client count when the client task ends.
struct ClientGuard {
    clients: Arc<AtomicUsize>,
    addr: SocketAddr,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let remaining = self.clients.fetch_sub(1, Ordering::SeqCst) - 1;
        info!(client = %self.addr, connected = remaining, "Client removed");
    }
}

async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<AtomicUsize>,
    observer: Option<mpsc::UnboundedSender<String>>,
) {
    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(client = %addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let connected = clients.fetch_add(1, Ordering::SeqCst) + 1;
    let _guard = ClientGuard { clients, addr };
    info!(client = %addr, connected, "Client connected");

    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Text(text)) => {
                log_text(addr, &text);
                if let Some(observer) = &observer {
                    // A dropped observer only stops the forwarding.
                    let _ = observer.send(text);
                }
            }
            Ok(Message::Binary(data)) => {
                debug!(client = %addr, bytes = data.len(), "Binary message ignored");
            }
            Ok(Message::Close(frame)) => {
                info!(client = %addr, ?frame, "Client disconnected cleanly");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(client = %addr, error = %e, "Connection error");
                return;
            }
        }
    }

    info!(client = %addr, "Client disconnected");
}

fn log_text(addr: SocketAddr, text: &str) {
    match classify(text) {
        Received::Angles { data, angles } => {
            info!(client = %addr, data = %data, "Data received");
            info!(client = %addr, angles = %angles, "Angles received");
        }
        Received::Json(data) => {
            info!(client = %addr, data = %data, "Data received");
        }
        Received::Invalid => {
            warn!(client = %addr, message = %text, "Invalid message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use std::time::Duration;

    #[test]
    fn test_classify_angles() {
        let received = classify(r#"{"type":"joint_angles","angles":[1.0,2.0]}"#);
        let Received::Angles { data, angles } = received else {
            panic!("expected angles, got {:?}", received);
        };
        assert_eq!(data["type"], "joint_angles");
        assert_eq!(angles, serde_json::json!([1.0, 2.0]));
    }

    #[test]
    fn test_classify_other_json() {
        assert_eq!(
            classify(r#"{"hello":"device"}"#),
            Received::Json(serde_json::json!({"hello": "device"}))
        );
    }

    #[test]
    fn test_classify_invalid() {
        assert_eq!(classify("not json"), Received::Invalid);
        assert_eq!(classify(""), Received::Invalid);
    }

    async fn wait_for_clients(clients: &AtomicUsize, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while clients.load(Ordering::SeqCst) != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_server_forwards_and_counts_clients() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = EchoServer::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_observer(tx);
        let addr = server.local_addr().unwrap();
        let clients = server.client_count();
        let task = tokio::spawn(server.run());

        let url = format!("ws://{}/ws", addr);
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        wait_for_clients(&clients, 1).await;

        ws.send(Message::Text("not json".to_string())).await.unwrap();
        ws.send(Message::Text(r#"{"angles":[0.0]}"#.to_string()))
            .await
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, "not json");
        assert_eq!(second, r#"{"angles":[0.0]}"#);

        ws.close(None).await.unwrap();
        wait_for_clients(&clients, 0).await;

        task.abort();
    }
}
