//! Sequence handles and their command/event bookkeeping.
//!
//! A [`Sequence`] is one stateful conversational context on the server.
//! Each command it issues gets a fresh cid, a pending waiter, and one
//! outbound frame; the connection's dispatch loop feeds the terminal
//! event back through the handlers at the bottom of this file.
//!
//! The one non-obvious piece is the tool-call re-entry loop: when the
//! server interrupts a generation with `seq_tool_call`, the tools run
//! client-side and their results go back in a `tool_return` carrying the
//! **same cid** as the generation, so the pending waiter and the stream
//! slot stay bound to the resumed generation.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::{Cid, SeqId};
use crate::protocol::{Event, GenOpts, Request, SeqCommand, ToolCallResult};
use crate::transport::Connection;

use super::options::{AppendInput, AppendOptions};
use super::stream::{Chunk, GenStream};
use super::tool::Tool;

// ============================================================================
// Types
// ============================================================================

/// Waiters for in-flight commands, resolved by the terminal event.
type PendingMap = FxHashMap<Cid, oneshot::Sender<Result<Event>>>;

/// Writable halves of active generation streams.
type GenSlotMap = FxHashMap<Cid, mpsc::UnboundedSender<Chunk>>;

// ============================================================================
// Sequence
// ============================================================================

/// A handle to one server-side sequence.
///
/// Cloning is cheap; all clones drive the same sequence. The handle stays
/// usable until the sequence closes (locally, by server decision, or by
/// connection teardown), after which every command fails with
/// [`Error::SeqClosed`].
#[derive(Clone)]
pub struct Sequence {
    /// Shared inner state.
    inner: Arc<SequenceInner>,
}

/// State shared between handle clones and the dispatch handlers.
struct SequenceInner {
    /// Owning connection.
    conn: Connection,
    /// Server-assigned id.
    seq_id: SeqId,
    /// Model the sequence runs on.
    model: String,
    /// Whether the server may emit tool calls for this sequence.
    tools_enabled: bool,
    /// In-flight commands by cid.
    pending: Mutex<PendingMap>,
    /// Active generation stream, keyed by the generating cid.
    gen_slots: Mutex<GenSlotMap>,
    /// Options of the in-flight generation, echoed on `tool_return`.
    cur_gen_opts: Mutex<Option<GenOpts>>,
    /// Installed tools, in install order.
    tools: Mutex<Vec<Tool>>,
    /// Set once the sequence has closed for any reason.
    closed: AtomicBool,
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("seq_id", &self.inner.seq_id)
            .field("model", &self.inner.model)
            .field("tools_enabled", &self.inner.tools_enabled)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Sequence - Constructor
// ============================================================================

impl Sequence {
    /// Creates a sequence handle.
    ///
    /// Forked children receive a snapshot of the parent's tool table;
    /// freshly opened sequences start empty.
    pub(crate) fn new(
        conn: Connection,
        seq_id: SeqId,
        model: String,
        tools_enabled: bool,
        tools: Vec<Tool>,
    ) -> Self {
        Self {
            inner: Arc::new(SequenceInner {
                conn,
                seq_id,
                model,
                tools_enabled,
                pending: Mutex::new(PendingMap::default()),
                gen_slots: Mutex::new(GenSlotMap::default()),
                cur_gen_opts: Mutex::new(None),
                tools: Mutex::new(tools),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// Sequence - Accessors
// ============================================================================

impl Sequence {
    /// Returns the server-assigned sequence id.
    #[inline]
    #[must_use]
    pub fn seq_id(&self) -> &SeqId {
        &self.inner.seq_id
    }

    /// Returns the model this sequence runs on.
    #[inline]
    #[must_use]
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Returns `true` if the server may emit tool calls here.
    #[inline]
    #[must_use]
    pub fn tools_enabled(&self) -> bool {
        self.inner.tools_enabled
    }

    /// Returns the number of in-flight commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns the number of installed tools.
    #[inline]
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.inner.tools.lock().len()
    }
}

// ============================================================================
// Sequence - Commands
// ============================================================================

impl Sequence {
    /// Appends text or tokens to the sequence context.
    ///
    /// Completes when the server acknowledges the append.
    pub async fn append(&self, input: impl Into<AppendInput>) -> Result<()> {
        self.append_with(input, AppendOptions::new()).await
    }

    /// Appends with an explicit role or hidden marker.
    pub async fn append_with(
        &self,
        input: impl Into<AppendInput>,
        options: AppendOptions,
    ) -> Result<()> {
        let (text, tokens) = input.into().into_parts();
        self.command(SeqCommand::Append {
            text,
            tokens,
            role: options.role,
            hidden: options.hidden,
        })
        .await
        .map(|_| ())
    }

    /// Starts a generation with server-default parameters.
    ///
    /// Does not suspend: the command is queued and the stream returned
    /// immediately. See [`Sequence::gen_with`].
    pub fn r#gen(&self) -> Result<GenStream> {
        self.gen_with(GenOpts::new())
    }

    /// Starts a generation with explicit parameters.
    ///
    /// The returned stream yields chunks until the server finishes the
    /// generation. Issuing a second `gen` while one is in flight is a
    /// caller error.
    pub fn gen_with(&self, opts: GenOpts) -> Result<GenStream> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::SeqClosed);
        }

        let cid = self.inner.conn.next_cid();
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();

        {
            let mut slots = self.inner.gen_slots.lock();
            debug_assert!(slots.is_empty(), "gen issued while a generation is in flight");
            slots.insert(cid.clone(), chunk_tx);
        }
        *self.inner.cur_gen_opts.lock() = Some(opts.clone());

        // The generation cid stays pending until seq_gen_finish; completion
        // is observed through the stream, so the receiving half is unused.
        let (tx, _rx) = oneshot::channel();
        self.inner.pending.lock().insert(cid.clone(), tx);

        let request = Request::command(
            cid.clone(),
            self.inner.seq_id.clone(),
            SeqCommand::Gen { opts },
        );

        if let Err(e) = self.inner.conn.send(&request) {
            self.inner.pending.lock().remove(&cid);
            self.inner.gen_slots.lock().remove(&cid);
            *self.inner.cur_gen_opts.lock() = None;
            return Err(e);
        }

        debug!(seq_id = %self.inner.seq_id, cid = %cid, "generation started");

        Ok(GenStream::new(chunk_rx))
    }

    /// Forks the sequence into an independent child.
    ///
    /// The child shares the parent's server-side context at the fork
    /// point and inherits the model, the tools flag, and a copy of the
    /// tool table.
    pub async fn create_fork(&self) -> Result<Sequence> {
        let event = self.command(SeqCommand::Fork).await?;

        let child_id = event
            .child_seq_id
            .ok_or_else(|| Error::protocol("child seq id missing"))?;

        // Registered by the dispatch handler before the waiter resolved.
        self.inner.conn.get_seq(&child_id).ok_or_else(|| {
            Error::state(format!("forked sequence {child_id} is not registered"))
        })
    }

    /// Runs `f` against a fresh fork, then closes the fork.
    ///
    /// The fork close is requested whether or not `f` succeeds, and is
    /// not awaited; close failures are logged.
    pub async fn with_fork<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Sequence) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let child = self.create_fork().await?;
        let result = f(child.clone()).await;

        tokio::spawn(async move {
            if let Err(e) = child.close().await {
                warn!(seq_id = %child.seq_id(), error = %e, "fork close failed");
            }
        });

        result
    }

    /// Closes the sequence.
    ///
    /// Completes on the server's `seq_closed` acknowledgement. Calling
    /// `close` on an already-closed sequence is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.command(SeqCommand::Close).await.map(|_| ())
    }

    /// Installs a tool and announces it to the model.
    ///
    /// Requires the sequence to have been opened with tools enabled.
    /// The definition is validated and checked against already-installed
    /// names before anything is sent.
    pub async fn install(&self, tool: Tool) -> Result<()> {
        if !self.inner.tools_enabled {
            return Err(Error::invalid_tool(
                "tools are not enabled for this sequence",
            ));
        }

        tool.validate()?;

        if self
            .inner
            .tools
            .lock()
            .iter()
            .any(|t| t.name() == tool.name())
        {
            return Err(Error::invalid_tool(format!(
                "tool '{}' is already installed",
                tool.name()
            )));
        }

        let announcement = tool.announcement()?;
        self.append_with(
            announcement,
            AppendOptions::new().with_role("system").with_hidden(),
        )
        .await?;

        debug!(seq_id = %self.inner.seq_id, tool = tool.name(), "tool installed");
        self.inner.tools.lock().push(tool);

        Ok(())
    }

    /// Issues one command: fresh cid, pending waiter, one frame, and the
    /// terminal event as the result.
    async fn command(&self, command: SeqCommand) -> Result<Event> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::SeqClosed);
        }

        let cid = self.inner.conn.next_cid();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(cid.clone(), tx);

        let request = Request::command(cid.clone(), self.inner.seq_id.clone(), command);

        if let Err(e) = self.inner.conn.send(&request) {
            self.inner.pending.lock().remove(&cid);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::SeqClosed),
        }
    }
}

// ============================================================================
// Sequence - Inbound Handlers
// ============================================================================

impl Sequence {
    /// Handles a `seq_text` chunk.
    ///
    /// Chunks without a matching generation slot are append echoes and
    /// are dropped silently.
    pub(crate) fn on_text(&self, event: Event) {
        let Some(slot) = self.inner.gen_slots.lock().get(&event.cid).cloned() else {
            return;
        };

        let chunk = Chunk {
            text: event.text.unwrap_or_default(),
            tokens: event.tokens,
            hidden: event.hidden.unwrap_or(false),
        };

        // The caller may have dropped the stream; that just discards output.
        let _ = slot.send(chunk);
    }

    /// Handles `seq_append_finish`.
    pub(crate) fn on_append_finished(&self, event: Event) {
        self.resolve_pending(event);
    }

    /// Handles `seq_gen_finish`: ends the stream, clears the stored
    /// generation options, and resolves the generation's waiter.
    pub(crate) fn on_gen_finished(&self, event: Event) {
        if self.inner.gen_slots.lock().remove(&event.cid).is_none() {
            warn!(
                seq_id = %self.inner.seq_id,
                cid = %event.cid,
                "gen finish without an active stream",
            );
        }
        *self.inner.cur_gen_opts.lock() = None;

        self.resolve_pending(event);
    }

    /// Handles `seq_fork_finish`: registers the child, then resolves the
    /// fork waiter.
    pub(crate) fn on_fork_finished(&self, event: Event) {
        if let Some(child_id) = event.child_seq_id.clone() {
            let tools = self.inner.tools.lock().clone();
            let child = Sequence::new(
                self.inner.conn.clone(),
                child_id,
                self.inner.model.clone(),
                self.inner.tools_enabled,
                tools,
            );
            self.inner.conn.register_seq(child);
        }

        self.resolve_pending(event);
    }

    /// Handles `seq_closed` or connection teardown (no event).
    ///
    /// Resolves a pending close command when the event identifies one,
    /// then rejects every remaining waiter with *seq closed* and drops
    /// the generation slots. Idempotent.
    pub(crate) fn on_close(&self, event: Option<Event>) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(event) = event
            && let Some(tx) = self.inner.pending.lock().remove(&event.cid)
        {
            let _ = tx.send(Ok(event));
        }

        let drained: Vec<_> = {
            let mut pending = self.inner.pending.lock();
            pending.drain().collect()
        };
        for (_cid, tx) in drained {
            let _ = tx.send(Err(Error::SeqClosed));
        }

        self.inner.gen_slots.lock().clear();
        *self.inner.cur_gen_opts.lock() = None;

        debug!(seq_id = %self.inner.seq_id, "sequence closed");
    }

    /// Handles `seq_tool_call`: runs the requested tools and sends their
    /// results back under the generation's cid.
    pub(crate) fn on_tool_call(&self, event: Event) -> Result<()> {
        let calls = event
            .tool_calls
            .ok_or_else(|| Error::protocol("seq_tool_call missing tool_calls"))?;

        let tools = self.inner.tools.lock().clone();
        let gen_opts = self.inner.cur_gen_opts.lock().clone();
        let conn = self.inner.conn.clone();
        let seq_id = self.inner.seq_id.clone();
        let cid = event.cid;

        // Invocations are async; run them off the dispatch loop. Calls run
        // sequentially, in the order the server requested them.
        tokio::spawn(async move {
            let mut results = Vec::with_capacity(calls.len());

            for call in calls {
                let args: Value = serde_json::from_str(&call.args)
                    .unwrap_or_else(|_| Value::String(call.args.clone()));

                let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
                    warn!(tool = %call.name, "tool call for uninstalled tool");
                    continue;
                };

                match tool.call(args).await {
                    Ok(value) => match serde_json::to_string(&value) {
                        Ok(result) => results.push(ToolCallResult {
                            name: call.name,
                            result,
                        }),
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "tool result not serializable");
                        }
                    },
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "tool invocation failed");
                    }
                }
            }

            let request = Request::command(
                cid,
                seq_id,
                SeqCommand::ToolReturn { gen_opts, results },
            );

            if let Err(e) = conn.send(&request) {
                warn!(error = %e, "failed to send tool return");
            }
        });

        Ok(())
    }

    /// Removes and resolves the waiter the event completes.
    fn resolve_pending(&self, event: Event) {
        match self.inner.pending.lock().remove(&event.cid) {
            Some(tx) => {
                let _ = tx.send(Ok(event));
            }
            None => {
                warn!(
                    seq_id = %self.inner.seq_id,
                    cid = %event.cid,
                    kind = ?event.event,
                    "terminal event for unknown cid",
                );
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::OpenOptions;
    use crate::seq::tool::ToolError;
    use crate::testutil::{self, ServerPeer};

    use futures_util::StreamExt;
    use serde_json::json;

    /// Accepts the first `seq_open` and acknowledges it as sequence `S`.
    async fn accept_open(peer: &mut ServerPeer) {
        let open = peer.recv().await;
        assert_eq!(open["request"], "seq_open");
        peer.send(json!({
            "cid": open["cid"],
            "event": "seq_opened",
            "seq_id": "S",
        }))
        .await;
    }

    /// Acknowledges one command with the given terminal event kind.
    async fn finish(peer: &mut ServerPeer, frame: &serde_json::Value, kind: &str) {
        peer.send(json!({
            "cid": frame["cid"],
            "event": kind,
            "seq_id": frame["seq_id"],
        }))
        .await;
    }

    #[tokio::test]
    async fn test_append_then_gen_streams_text() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;

            let append = peer.recv().await;
            assert_eq!(append["data"]["command"], "append");
            assert_eq!(append["data"]["text"], "Say hello.");
            assert!(append["data"].get("tokens").is_none());
            finish(&mut peer, &append, "seq_append_finish").await;

            let generate = peer.recv().await;
            assert_eq!(generate["data"]["command"], "gen");
            for text in ["Hel", "lo"] {
                peer.send(json!({
                    "cid": generate["cid"],
                    "event": "seq_text",
                    "seq_id": "S",
                    "text": text,
                }))
                .await;
            }
            finish(&mut peer, &generate, "seq_gen_finish").await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn.open("llama", OpenOptions::new()).await.expect("open");

        seq.append("Say hello.").await.expect("append");
        let text = seq.r#gen().expect("gen").text().await;

        assert_eq!(text, "Hello");
        assert_eq!(seq.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_append_tokens_dispatch() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;

            let append = peer.recv().await;
            assert_eq!(append["data"]["tokens"], json!([1, 2]));
            assert!(append["data"].get("text").is_none());
            finish(&mut peer, &append, "seq_append_finish").await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn.open("llama", OpenOptions::new()).await.expect("open");

        seq.append(vec![1_u32, 2]).await.expect("append tokens");
    }

    #[tokio::test]
    async fn test_hidden_chunks_stay_on_raw_stream() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;

            let generate = peer.recv().await;
            peer.send(json!({
                "cid": generate["cid"],
                "event": "seq_text",
                "seq_id": "S",
                "text": "Hel",
            }))
            .await;
            peer.send(json!({
                "cid": generate["cid"],
                "event": "seq_text",
                "seq_id": "S",
                "text": "<think>",
                "hidden": true,
            }))
            .await;
            peer.send(json!({
                "cid": generate["cid"],
                "event": "seq_text",
                "seq_id": "S",
                "text": "lo",
            }))
            .await;
            finish(&mut peer, &generate, "seq_gen_finish").await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn.open("llama", OpenOptions::new()).await.expect("open");

        let chunks: Vec<Chunk> = seq.r#gen().expect("gen").collect().await;
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].hidden);
        assert_eq!(chunks[1].text, "<think>");

        let visible: String = chunks
            .iter()
            .filter(|c| !c.hidden)
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(visible, "Hello");
    }

    #[tokio::test]
    async fn test_tool_call_resumes_with_same_cid() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;

            // Tool announcement arrives as a hidden system append.
            let announce = peer.recv().await;
            assert_eq!(announce["data"]["command"], "append");
            assert_eq!(announce["data"]["role"], "system");
            assert_eq!(announce["data"]["hidden"], true);
            let text = announce["data"]["text"].as_str().expect("text");
            assert!(text.starts_with("Use the function 'get_time' to: "));
            finish(&mut peer, &announce, "seq_append_finish").await;

            let generate = peer.recv().await;
            peer.send(json!({
                "cid": generate["cid"],
                "event": "seq_tool_call",
                "seq_id": "S",
                "tool_calls": [ { "name": "get_time", "args": "{\"tz\":\"UTC\"}" } ],
            }))
            .await;

            let tool_return = peer.recv().await;
            assert_eq!(tool_return["cid"], generate["cid"]);
            assert_eq!(tool_return["data"]["command"], "tool_return");
            assert_eq!(
                tool_return["data"]["gen_opts"],
                json!({ "role": "assistant", "temperature": 0.7 })
            );
            assert_eq!(
                tool_return["data"]["results"],
                json!([ { "name": "get_time", "result": "\"12:00\"" } ])
            );

            peer.send(json!({
                "cid": generate["cid"],
                "event": "seq_text",
                "seq_id": "S",
                "text": "It is 12:00.",
            }))
            .await;
            finish(&mut peer, &generate, "seq_gen_finish").await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn
            .open("llama", OpenOptions::new().with_tools())
            .await
            .expect("open");

        let tool = Tool::new("get_time", "Get the current time", |args| async move {
            assert_eq!(args, json!({ "tz": "UTC" }));
            Ok::<_, ToolError>(json!("12:00"))
        });
        seq.install(tool).await.expect("install");

        let stream = seq
            .gen_with(GenOpts::new().with_role("assistant").with_temperature(0.7))
            .expect("gen");
        assert_eq!(stream.text().await, "It is 12:00.");
    }

    #[tokio::test]
    async fn test_malformed_tool_args_pass_through_raw() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;

            let announce = peer.recv().await;
            finish(&mut peer, &announce, "seq_append_finish").await;

            let generate = peer.recv().await;
            peer.send(json!({
                "cid": generate["cid"],
                "event": "seq_tool_call",
                "seq_id": "S",
                "tool_calls": [ { "name": "echo", "args": "not json" } ],
            }))
            .await;

            let tool_return = peer.recv().await;
            assert_eq!(
                tool_return["data"]["results"],
                json!([ { "name": "echo", "result": "\"not json\"" } ])
            );

            finish(&mut peer, &generate, "seq_gen_finish").await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn
            .open("llama", OpenOptions::new().with_tools())
            .await
            .expect("open");

        let tool = Tool::new("echo", "Echo the arguments", |args| async move {
            assert_eq!(args, Value::String("not json".to_string()));
            Ok::<_, ToolError>(args)
        });
        seq.install(tool).await.expect("install");

        let stream = seq.r#gen().expect("gen");
        assert_eq!(stream.text().await, "");
    }

    #[tokio::test]
    async fn test_with_fork_returns_text_and_closes_child() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;

            let fork = peer.recv().await;
            assert_eq!(fork["data"]["command"], "fork");
            peer.send(json!({
                "cid": fork["cid"],
                "event": "seq_fork_finish",
                "seq_id": "S",
                "child_seq_id": "C",
            }))
            .await;

            let generate = peer.recv().await;
            assert_eq!(generate["seq_id"], "C");
            peer.send(json!({
                "cid": generate["cid"],
                "event": "seq_text",
                "seq_id": "C",
                "text": "from the fork",
            }))
            .await;
            finish(&mut peer, &generate, "seq_gen_finish").await;

            // The fork is closed afterwards, success or not.
            let close = peer.recv().await;
            assert_eq!(close["data"]["command"], "close");
            assert_eq!(close["seq_id"], "C");
            peer.send(json!({
                "cid": close["cid"],
                "event": "seq_closed",
                "seq_id": "C",
            }))
            .await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn.open("llama", OpenOptions::new()).await.expect("open");

        let text = seq
            .with_fork(|child| async move { Ok(child.r#gen()?.text().await) })
            .await
            .expect("with_fork");

        assert_eq!(text, "from the fork");

        // The fork close runs in the background; wait until the child's
        // seq_closed lands and it drops out of the live table.
        for _ in 0..100 {
            if conn.sequence_count() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(conn.sequence_count(), 1);
    }

    #[tokio::test]
    async fn test_fork_inherits_model_tools_and_table() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;

            let announce = peer.recv().await;
            finish(&mut peer, &announce, "seq_append_finish").await;

            let fork = peer.recv().await;
            peer.send(json!({
                "cid": fork["cid"],
                "event": "seq_fork_finish",
                "seq_id": "S",
                "child_seq_id": "C",
            }))
            .await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn
            .open("llama", OpenOptions::new().with_tools())
            .await
            .expect("open");

        let tool = Tool::new("get_time", "Get the current time", |_args| async move {
            Ok::<_, ToolError>(Value::Null)
        });
        seq.install(tool).await.expect("install");

        let child = seq.create_fork().await.expect("fork");
        assert_eq!(child.seq_id().as_str(), "C");
        assert_eq!(child.model(), "llama");
        assert!(child.tools_enabled());
        assert_eq!(child.tool_count(), 1);
        assert_eq!(conn.sequence_count(), 2);
    }

    #[tokio::test]
    async fn test_connection_close_rejects_pending_append() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();

        let server = testutil::spawn(move |mut peer| async move {
            accept_open(&mut peer).await;
            let _append = peer.recv().await;
            let _ = seen_tx.send(());
            futures_util::future::pending::<()>().await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn.open("llama", OpenOptions::new()).await.expect("open");

        let pending_append = {
            let seq = seq.clone();
            tokio::spawn(async move { seq.append("never acknowledged").await })
        };

        seen_rx.await.expect("server saw the append");
        conn.close();

        let err = pending_append
            .await
            .expect("join")
            .expect_err("append should fail");
        assert!(matches!(err, Error::SeqClosed));
        assert_eq!(seq.pending_count(), 0);
        assert_eq!(conn.sequence_count(), 0);
    }

    #[tokio::test]
    async fn test_close_completes_and_is_idempotent() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;

            let close = peer.recv().await;
            assert_eq!(close["data"]["command"], "close");
            finish(&mut peer, &close, "seq_closed").await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn.open("llama", OpenOptions::new()).await.expect("open");

        seq.close().await.expect("close");
        assert_eq!(conn.sequence_count(), 0);
        assert_eq!(seq.pending_count(), 0);

        // Second close is a no-op; other commands fail.
        seq.close().await.expect("close again");
        let err = seq.append("too late").await.expect_err("append after close");
        assert!(matches!(err, Error::SeqClosed));
    }

    #[tokio::test]
    async fn test_install_validation_happens_before_io() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn.open("llama", OpenOptions::new()).await.expect("open");

        // Tools were not enabled at open time; nothing reaches the wire.
        let tool = Tool::new("get_time", "Get the current time", |_args| async move {
            Ok::<_, ToolError>(Value::Null)
        });
        let err = seq.install(tool).await.expect_err("install should fail");
        assert!(matches!(err, Error::InvalidTool { .. }));
        assert_eq!(seq.tool_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_tool_rejected() {
        let server = testutil::spawn(|mut peer| async move {
            accept_open(&mut peer).await;

            let announce = peer.recv().await;
            finish(&mut peer, &announce, "seq_append_finish").await;
        })
        .await;

        let conn = Connection::connect(&server.url).await.expect("connect");
        let seq = conn
            .open("llama", OpenOptions::new().with_tools())
            .await
            .expect("open");

        let make = || {
            Tool::new("get_time", "Get the current time", |_args| async move {
                Ok::<_, ToolError>(Value::Null)
            })
        };

        seq.install(make()).await.expect("first install");
        let err = seq.install(make()).await.expect_err("duplicate install");
        assert!(matches!(err, Error::InvalidTool { .. }));
        assert_eq!(seq.tool_count(), 1);
    }
}
