use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::{net::SocketAddr, net::TcpListener, process::Command, sync::Arc, time::Duration};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use pokercrab::auth::{Anonymous, Authenticator};
use pokercrab::config::SessionSettings;
use pokercrab::{Gateway, Server, SessionStore};

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

// -----------------------------------------------------------------------------
// ----- Binary ----------------------------------------------------------------

#[allow(dead_code)]
pub fn reserve_port(host: &str) -> u16 {
    let addr = format!("{host}:0");
    let listener = TcpListener::bind(&addr).expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

#[allow(dead_code)]
pub fn spawn_pokercrab(host: &str, port: u16) -> std::process::Child {
    let exe = env!("CARGO_BIN_EXE_pokercrab");

    Command::new(exe)
        .env("POKERCRAB_HOST", host)
        .env("POKERCRAB_PORT", port.to_string())
        .env("POKERCRAB_LOG", "warn")
        .env_remove("POKERCRAB_CONFIG_FILE")
        .env_remove("POKERCRAB_TOKENS_FILE")
        .spawn()
        .expect("spawn pokercrab")
}

#[allow(dead_code)]
pub async fn wait_for_listen(host: &str, port: u16) {
    let addr = format!("{host}:{port}");
    for _ in 0..50 {
        if std::net::TcpStream::connect(&addr).is_ok() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("pokercrab did not start listening on {addr}");
}

// -----------------------------------------------------------------------------
// ----- In-process server -----------------------------------------------------

#[allow(dead_code)]
pub async fn start_server() -> SocketAddr {
    start_server_with(SessionStore::new(), Arc::new(Anonymous)).await
}

#[allow(dead_code)]
pub async fn start_server_with(store: SessionStore, authenticator: Arc<dyn Authenticator>) -> SocketAddr {
    let (gateway, _task) = Gateway::spawn(store, SessionSettings::default());

    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = Server::bind(addr, gateway, authenticator).expect("bind server");
    let local = server.local_addr().unwrap();

    tokio::spawn(server.run_until(std::future::pending()));
    local
}

// -----------------------------------------------------------------------------
// ----- Client ----------------------------------------------------------------

pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[allow(dead_code)]
impl Client {
    pub async fn connect(addr: SocketAddr) -> Client {
        Self::connect_url(&format!("ws://{addr}/")).await
    }

    pub async fn connect_url(url: &str) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("websocket connect");
        Client { ws }
    }

    pub async fn connect_with_bearer(addr: SocketAddr, token: &str) -> Client {
        let mut request = format!("ws://{addr}/").into_client_request().unwrap();
        request
            .headers_mut()
            .insert("authorization", format!("Bearer {token}").parse().unwrap());

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .expect("websocket connect");
        Client { ws }
    }

    pub async fn send(&mut self, frame: Value) {
        self.ws
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("send frame");
    }

    /// Next JSON frame, or a panic after a few seconds.
    pub async fn recv(&mut self) -> Value {
        timeout(RECV_TIMEOUT, self.next_json())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
    }

    /// Skips frames until one with the given event name arrives.
    pub async fn recv_event(&mut self, event: &str) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["event"] == event {
                return frame;
            }
        }
    }

    /// Asserts nothing arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(frame)) = timeout(window, self.next_json()).await {
            panic!("expected no frame, got {frame}");
        }
    }

    /// True once the server has closed the socket.
    pub async fn closed(&mut self) -> bool {
        let deadline = timeout(RECV_TIMEOUT, async {
            loop {
                match self.ws.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                    Some(Ok(_)) => continue,
                }
            }
        });

        deadline.await.is_ok()
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }

    async fn next_json(&mut self) -> Option<Value> {
        while let Some(msg) = self.ws.next().await {
            match msg.ok()? {
                Message::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).expect("server sent JSON"));
                }
                Message::Close(_) => return None,
                _ => continue,
            }
        }
        None
    }
}

// -----------------------------------------------------------------------------
// ----- Scenario helpers ------------------------------------------------------

/// Creates a session and returns its id after draining the creator's
/// join frames.
#[allow(dead_code)]
pub async fn create_session(client: &mut Client, username: &str) -> String {
    client
        .send(serde_json::json!({
            "event": "join-session",
            "data": { "username": username, "create": true },
            "ack": 1
        }))
        .await;

    let ack = client.recv().await;
    assert_eq!(ack["ack"], 1);
    assert_eq!(ack["data"]["success"], true);

    client.recv_event("participants-updated").await;
    ack["data"]["sessionId"].as_str().unwrap().to_string()
}

/// Joins an existing session and drains the late-join frames up to the chat
/// history.
#[allow(dead_code)]
pub async fn join_session(client: &mut Client, username: &str, session: &str) -> Value {
    client
        .send(serde_json::json!({
            "event": "join-session",
            "data": { "username": username, "sessionId": session },
            "ack": 2
        }))
        .await;

    let ack = client.recv().await;
    assert_eq!(ack["ack"], 2);

    if ack["data"]["success"] == true {
        client.recv_event("chat-history").await;
    }
    ack
}
