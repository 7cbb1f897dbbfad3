//! WebSocket connection and event dispatch.
//!
//! This module owns the client side of the wire: one WebSocket, one
//! event-loop task, and the two demultiplexers that route inbound
//! events.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming events from the server (completions, stream chunks)
//! - Outgoing frames queued by caller-driven commands
//! - Opening-waiter resolution by cid (no sequence exists yet)
//! - Sequence-event routing by seq_id
//!
//! The two waiter tables are deliberately separate: opening waiters live
//! on the connection because their sequence does not exist until the
//! server acknowledges it; every other command is correlated inside the
//! sequence that issued it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::config;
use crate::error::{Error, Result};
use crate::identifiers::{Cid, SeqId};
use crate::protocol::{Event, EventKind, Request, SeqOpenData};
use crate::seq::{OpenOptions, Sequence};

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream type.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal commands for the event loop.
enum LoopCommand {
    /// Write one serialized frame.
    Send {
        /// JSON text of the frame.
        frame: String,
    },
    /// Close the transport and exit the loop.
    Shutdown,
}

/// Waiter for a `seq_open` acknowledgement.
///
/// Carries the open parameters so the dispatch handler can construct and
/// register the sequence before resolving the caller; a server event for
/// the new sequence can then never race its registration.
struct OpenWaiter {
    /// Resolves the `open` call.
    tx: oneshot::Sender<Result<Sequence>>,
    /// Model the sequence was opened on.
    model: String,
    /// Whether the sequence accepts tool calls.
    tools_enabled: bool,
}

// ============================================================================
// Connection
// ============================================================================

/// A multiplexed connection to a ModelSocket server.
///
/// One connection carries any number of sequences. Cloning is cheap and
/// every clone drives the same transport.
///
/// # Example
///
/// ```no_run
/// use modelsocket::{Connection, OpenOptions, Result};
///
/// # async fn example() -> Result<()> {
/// let conn = Connection::connect("ws://localhost:7000/ws").await?;
/// let seq = conn.open("llama-3-8b", OpenOptions::new()).await?;
/// seq.append("The capital of France is").await?;
/// println!("{}", seq.gen()?.text().await);
/// conn.close();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    /// Shared inner state.
    inner: Arc<ConnectionInner>,
}

/// Shared state between the handle clones and the event loop.
struct ConnectionInner {
    /// Channel into the event loop.
    command_tx: mpsc::UnboundedSender<LoopCommand>,
    /// Live sequences by server-assigned id.
    sequences: Mutex<FxHashMap<SeqId, Sequence>>,
    /// Waiters for sequences that are still opening, by cid.
    open_waiters: Mutex<FxHashMap<Cid, OpenWaiter>>,
    /// Monotone source for correlation ids.
    next_cid: AtomicU64,
    /// Set once `close()` has run.
    closed: AtomicBool,
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Connects to a ModelSocket server.
    ///
    /// When `MODELSOCKET_API_KEY` is set, it is attached to the handshake
    /// as an `Authorization: Bearer` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the URL is invalid or the
    /// handshake fails before the channel opens.
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let mut request = url
            .as_ref()
            .into_client_request()
            .map_err(|e| Error::connection(format!("invalid WebSocket URL: {e}")))?;

        if let Some(secret) = config::api_key() {
            let value = HeaderValue::from_str(&format!("Bearer {secret}")).map_err(|_| {
                Error::connection(format!("{} is not a valid header value", config::API_KEY_ENV))
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(url = url.as_ref(), "WebSocket connection established");

        Ok(Self::new(ws_stream))
    }

    /// Creates a connection over an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    fn new(ws_stream: WsStream) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                command_tx,
                sequences: Mutex::new(FxHashMap::default()),
                open_waiters: Mutex::new(FxHashMap::default()),
                next_cid: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        };

        tokio::spawn(connection.clone().run_event_loop(ws_stream, command_rx));

        connection
    }
}

// ============================================================================
// Connection - Public API
// ============================================================================

impl Connection {
    /// Opens a new sequence on the given model.
    ///
    /// # Errors
    ///
    /// - [`Error::Open`] if the server rejects the request
    /// - [`Error::ConnectionClosed`] if the connection goes away first
    pub async fn open(&self, model: impl Into<String>, options: OpenOptions) -> Result<Sequence> {
        let model = model.into();
        let cid = self.next_cid();
        let (tx, rx) = oneshot::channel();

        self.inner.open_waiters.lock().insert(
            cid.clone(),
            OpenWaiter {
                tx,
                model: model.clone(),
                tools_enabled: options.tools,
            },
        );

        let request = Request::seq_open(
            cid.clone(),
            SeqOpenData {
                model,
                tools_enabled: options.tools,
                tool_prompt: options.tool_prompt,
                skip_prelude: options.skip_prelude,
            },
        );

        if let Err(e) = self.send(&request) {
            self.inner.open_waiters.lock().remove(&cid);
            return Err(e);
        }

        debug!(cid = %cid, "sequence open requested");

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::connection_closed("websocket closed")),
        }
    }

    /// Closes the connection.
    ///
    /// Every live sequence fans out *seq closed* to its pending commands
    /// and every outstanding opening waiter rejects. Idempotent; safe to
    /// call from any clone.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("closing connection");
        let _ = self.inner.command_tx.send(LoopCommand::Shutdown);
        self.teardown("websocket closed by client");
    }

    /// Returns the number of live sequences.
    #[inline]
    #[must_use]
    pub fn sequence_count(&self) -> usize {
        self.inner.sequences.lock().len()
    }

    /// Returns the number of sequences still waiting on the server.
    #[inline]
    #[must_use]
    pub fn pending_open_count(&self) -> usize {
        self.inner.open_waiters.lock().len()
    }
}

// ============================================================================
// Connection - Internal
// ============================================================================

impl Connection {
    /// Allocates the next correlation id.
    pub(crate) fn next_cid(&self) -> Cid {
        Cid::from_index(self.inner.next_cid.fetch_add(1, Ordering::Relaxed))
    }

    /// Serializes a request and queues it for the writer.
    ///
    /// Synchronous: the frame is handed to the event loop, which owns
    /// the only write half.
    pub(crate) fn send(&self, request: &Request) -> Result<()> {
        let frame = serde_json::to_string(request)?;
        trace!(cid = %request.cid, "frame queued");

        self.inner
            .command_tx
            .send(LoopCommand::Send { frame })
            .map_err(|_| Error::connection_closed("websocket closed"))
    }

    /// Inserts a sequence into the live table.
    pub(crate) fn register_seq(&self, seq: Sequence) {
        let seq_id = seq.seq_id().clone();
        debug!(seq_id = %seq_id, "sequence registered");
        self.inner.sequences.lock().insert(seq_id, seq);
    }

    /// Looks up a live sequence.
    pub(crate) fn get_seq(&self, seq_id: &SeqId) -> Option<Sequence> {
        self.inner.sequences.lock().get(seq_id).cloned()
    }
}

// ============================================================================
// Connection - Event Loop
// ============================================================================

impl Connection {
    /// Event loop that owns the WebSocket I/O.
    async fn run_event_loop(
        self,
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<LoopCommand>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.dispatch(&text) {
                                warn!(error = %e, "failed to dispatch frame");
                            }
                        }

                        Some(Ok(Message::Binary(_))) => {
                            warn!("non-text frame dropped");
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Ping, Pong
                        _ => {}
                    }
                }

                // Outbound frames and shutdown from the API side
                command = command_rx.recv() => {
                    match command {
                        Some(LoopCommand::Send { frame }) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                error!(error = %e, "WebSocket send failed");
                                break;
                            }
                        }

                        Some(LoopCommand::Shutdown) => {
                            debug!("shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.teardown("websocket closed");

        debug!("event loop terminated");
    }

    /// Routes one inbound frame.
    ///
    /// Errors are reported to the loop and logged there; they never take
    /// the connection down.
    fn dispatch(&self, text: &str) -> Result<()> {
        let event: Event = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("malformed frame: {e}")))?;

        trace!(cid = %event.cid, kind = ?event.event, "event received");

        match event.event {
            EventKind::SeqOpened => {
                let seq_id = event
                    .seq_id
                    .clone()
                    .ok_or_else(|| Error::state("seq_opened event missing seq_id"))?;

                let Some(waiter) = self.inner.open_waiters.lock().remove(&event.cid) else {
                    warn!(cid = %event.cid, "seq_opened for unknown cid");
                    return Ok(());
                };

                let seq = Sequence::new(
                    self.clone(),
                    seq_id,
                    waiter.model,
                    waiter.tools_enabled,
                    Vec::new(),
                );
                self.register_seq(seq.clone());
                let _ = waiter.tx.send(Ok(seq));
            }

            EventKind::Error => {
                let waiter = self.inner.open_waiters.lock().remove(&event.cid);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter
                            .tx
                            .send(Err(Error::open(event.message.unwrap_or_default())));
                    }
                    None => {
                        warn!(
                            cid = %event.cid,
                            server_message = event.message.as_deref().unwrap_or(""),
                            "server error event",
                        );
                    }
                }
            }

            EventKind::SeqClosed => {
                let seq_id = event
                    .seq_id
                    .clone()
                    .ok_or_else(|| Error::state("seq_closed event missing seq_id"))?;

                let seq = self
                    .inner
                    .sequences
                    .lock()
                    .remove(&seq_id)
                    .ok_or_else(|| {
                        Error::state(format!("seq_closed for unknown sequence {seq_id}"))
                    })?;

                seq.on_close(Some(event));
            }

            EventKind::SeqText => self.live_seq(&event)?.on_text(event),
            EventKind::SeqAppendFinish => self.live_seq(&event)?.on_append_finished(event),
            EventKind::SeqGenFinish => self.live_seq(&event)?.on_gen_finished(event),
            EventKind::SeqForkFinish => self.live_seq(&event)?.on_fork_finished(event),
            EventKind::SeqToolCall => self.live_seq(&event)?.on_tool_call(event)?,

            EventKind::Unknown => {
                debug!(cid = %event.cid, "unknown event kind dropped");
            }
        }

        Ok(())
    }

    /// Resolves the sequence an event belongs to.
    fn live_seq(&self, event: &Event) -> Result<Sequence> {
        let seq_id = event.seq_id.as_ref().ok_or_else(|| {
            Error::state(format!("{:?} event missing seq_id", event.event))
        })?;

        self.get_seq(seq_id).ok_or_else(|| {
            Error::state(format!(
                "{:?} event for unknown sequence {seq_id}",
                event.event
            ))
        })
    }

    /// Fans teardown out to every waiter and empties both tables.
    ///
    /// Runs once from `close()` and once when the event loop exits;
    /// draining makes the second run a no-op.
    fn teardown(&self, reason: &str) {
        let sequences: Vec<Sequence> = {
            let mut table = self.inner.sequences.lock();
            table.drain().map(|(_, seq)| seq).collect()
        };
        for seq in &sequences {
            seq.on_close(None);
        }

        let waiters: Vec<OpenWaiter> = {
            let mut table = self.inner.open_waiters.lock();
            table.drain().map(|(_, waiter)| waiter).collect()
        };
        let open_count = waiters.len();
        for waiter in waiters {
            let _ = waiter.tx.send(Err(Error::connection_closed(reason)));
        }

        if !sequences.is_empty() || open_count > 0 {
            debug!(
                sequences = sequences.len(),
                opens = open_count,
                "connection teardown"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
