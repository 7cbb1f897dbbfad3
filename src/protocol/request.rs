//! Outbound request frames.
//!
//! Every caller operation becomes exactly one JSON text frame:
//!
//! ```json
//! {
//!   "cid": "cid_3",
//!   "request": "seq_command",
//!   "seq_id": "S",
//!   "data": { "command": "append", "text": "Hello" }
//! }
//! ```
//!
//! `request` is either `seq_open` (no `seq_id` yet) or `seq_command`
//! (targets a live sequence). The `data` payload for `seq_command` is
//! tagged by its `command` field.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

use crate::identifiers::{Cid, SeqId};

// ============================================================================
// Request
// ============================================================================

/// One outbound frame from client to server.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Correlation id echoed by the server on the completion event.
    pub cid: Cid,

    /// Target sequence; absent for `seq_open`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_id: Option<SeqId>,

    /// Request kind plus its `data` payload.
    #[serde(flatten)]
    pub body: RequestBody,
}

impl Request {
    /// Creates a sequence-open request.
    #[inline]
    #[must_use]
    pub fn seq_open(cid: Cid, data: SeqOpenData) -> Self {
        Self {
            cid,
            seq_id: None,
            body: RequestBody::SeqOpen(data),
        }
    }

    /// Creates a command request targeting a live sequence.
    #[inline]
    #[must_use]
    pub fn command(cid: Cid, seq_id: SeqId, command: SeqCommand) -> Self {
        Self {
            cid,
            seq_id: Some(seq_id),
            body: RequestBody::SeqCommand(command),
        }
    }
}

// ============================================================================
// RequestBody
// ============================================================================

/// Request kind discriminator with its payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "request", content = "data", rename_all = "snake_case")]
pub enum RequestBody {
    /// Open a new sequence on the server.
    SeqOpen(SeqOpenData),
    /// Drive an existing sequence.
    SeqCommand(SeqCommand),
}

// ============================================================================
// SeqOpenData
// ============================================================================

/// Payload of a `seq_open` request.
#[derive(Debug, Clone, Serialize)]
pub struct SeqOpenData {
    /// Model the sequence runs on.
    pub model: String,

    /// Whether the sequence may receive tool calls.
    pub tools_enabled: bool,

    /// Server-side prompt describing how tools are exposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_prompt: Option<String>,

    /// Suppresses the server's initial system context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_prelude: Option<bool>,
}

// ============================================================================
// SeqCommand
// ============================================================================

/// `seq_command` payloads, tagged by `command`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SeqCommand {
    /// Append text or raw tokens to the sequence context.
    ///
    /// Exactly one of `text`/`tokens` is populated.
    Append {
        /// UTF-8 text to append.
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Raw token ids to append.
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens: Option<Vec<u32>>,
        /// Role the appended content is attributed to.
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        /// Hides the content from derived text views on echo.
        #[serde(skip_serializing_if = "Option::is_none")]
        hidden: Option<bool>,
    },

    /// Start a generation.
    Gen {
        /// Generation parameters.
        #[serde(flatten)]
        opts: GenOpts,
    },

    /// Duplicate the sequence's server-side state.
    Fork,

    /// Close the sequence.
    Close,

    /// Return tool results so an interrupted generation resumes.
    ///
    /// Sent with the **same cid** as the triggering tool-call event.
    ToolReturn {
        /// Parameters of the interrupted generation, echoed back so the
        /// server resumes with identical settings.
        #[serde(skip_serializing_if = "Option::is_none")]
        gen_opts: Option<GenOpts>,
        /// One entry per successful tool invocation, in call order.
        results: Vec<ToolCallResult>,
    },
}

// ============================================================================
// GenOpts
// ============================================================================

/// Generation parameters.
///
/// Built with `with_*` methods; unset fields are omitted from the frame.
///
/// ```
/// use modelsocket::GenOpts;
///
/// let opts = GenOpts::new().with_role("assistant").with_temperature(0.7);
/// assert_eq!(opts.temperature, Some(0.7));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenOpts {
    /// Role the generated content is attributed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl GenOpts {
    /// Creates empty generation options (server defaults).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            role: None,
            tokens: None,
            temperature: None,
        }
    }

    /// Sets the role.
    #[inline]
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Sets the maximum number of tokens to generate.
    #[inline]
    #[must_use]
    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Sets the sampling temperature.
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

// ============================================================================
// ToolCallResult
// ============================================================================

/// One tool invocation result carried in a `tool_return`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallResult {
    /// Name of the invoked tool.
    pub name: String,
    /// JSON-serialized return value.
    pub result: String,
}

// ============================================================================
// Tests
// ============================================================================
