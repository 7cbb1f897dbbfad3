//! Inbound event frames.
//!
//! Events are notifications from the server, each a single JSON object
//! with an `event` discriminator and the cid of the request it completes
//! (or, for streamed text, the cid of the generation it belongs to):
//!
//! ```json
//! { "cid": "cid_2", "event": "seq_text", "seq_id": "S", "text": "Hel" }
//! ```
//!
//! # Event Kinds
//!
//! | Kind | Routed to |
//! |------|-----------|
//! | `seq_opened` | Opening waiter on the connection, by cid |
//! | `error` | Opening waiter on the connection, by cid |
//! | `seq_closed`, `seq_text`, `seq_append_finish`, `seq_gen_finish`, `seq_fork_finish`, `seq_tool_call` | Owning sequence, by seq_id |
//!
//! Anything else deserializes to [`EventKind::Unknown`] and is dropped.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

use crate::identifiers::{Cid, SeqId};

// ============================================================================
// Event
// ============================================================================

/// One inbound frame from server to client.
///
/// All payload fields are optional at the wire level; each handler
/// requires the ones its event kind is defined to carry.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Correlation id of the originating request.
    pub cid: Cid,

    /// Event discriminator.
    pub event: EventKind,

    /// Owning sequence, absent on connection-level events.
    pub seq_id: Option<SeqId>,

    /// Streamed text for `seq_text`.
    pub text: Option<String>,

    /// Streamed token ids for `seq_text`.
    pub tokens: Option<Vec<u32>>,

    /// Marks content excluded from derived text views.
    pub hidden: Option<bool>,

    /// Failure description on `error`.
    pub message: Option<String>,

    /// Newly forked sequence on `seq_fork_finish`.
    pub child_seq_id: Option<SeqId>,

    /// Requested invocations on `seq_tool_call`.
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

// ============================================================================
// EventKind
// ============================================================================

/// Event discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Sequence open acknowledged; carries the server-chosen seq_id.
    SeqOpened,
    /// Sequence is gone; pending commands must be drained.
    SeqClosed,
    /// One generation chunk.
    SeqText,
    /// Append completed.
    SeqAppendFinish,
    /// Generation completed; the stream ends.
    SeqGenFinish,
    /// Fork completed; carries `child_seq_id`.
    SeqForkFinish,
    /// Generation paused awaiting tool results.
    SeqToolCall,
    /// Server-reported request failure.
    Error,
    /// Unrecognized event kind; logged and dropped.
    #[serde(other)]
    Unknown,
}

// ============================================================================
// ToolCallRequest
// ============================================================================

/// One requested tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolCallRequest {
    /// Tool name as installed on the sequence.
    pub name: String,

    /// Argument payload. Nominally JSON; passed through verbatim when it
    /// does not parse.
    pub args: String,
}

// ============================================================================
// Tests
// ============================================================================
