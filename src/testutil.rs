//! Scripted WebSocket server for end-to-end tests.
//!
//! Binds an ephemeral localhost port, accepts exactly one connection,
//! and runs a test-provided async script against it. Tests drive the
//! real client stack (`Connection::connect` and everything above it)
//! while the script plays the server side frame by frame.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// MockServer
// ============================================================================

/// Handle to a running scripted server.
pub(crate) struct MockServer {
    /// URL for `Connection::connect`.
    pub url: String,
}

/// Starts a server that runs `script` against the first connection.
pub(crate) async fn spawn<F, Fut>(script: F) -> MockServer
where
    F: FnOnce(ServerPeer) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let port = listener.local_addr().expect("local addr").port();
    let url = format!("ws://127.0.0.1:{port}");

    tokio::spawn(async move {
        let (stream, _addr) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("WebSocket upgrade");
        script(ServerPeer { ws }).await;
    });

    MockServer { url }
}

// ============================================================================
// ServerPeer
// ============================================================================

/// The server's side of the scripted connection.
pub(crate) struct ServerPeer {
    ws: WebSocketStream<TcpStream>,
}

impl ServerPeer {
    /// Receives the next JSON text frame from the client.
    ///
    /// Panics if the connection ends first; scripts only read frames
    /// they expect to arrive.
    pub(crate) async fn recv(&mut self) -> Value {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).expect("client sent valid JSON");
                }
                Some(Ok(Message::Close(_))) | None => {
                    panic!("connection closed while the script awaited a frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => panic!("mock server read error: {e}"),
            }
        }
    }

    /// Sends one JSON event frame to the client.
    pub(crate) async fn send(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .expect("mock server send");
    }
}
