//! Error types for the ModelSocket client.
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use modelsocket::{Result, Sequence};
//!
//! async fn example(seq: &Sequence) -> Result<String> {
//!     seq.append("Say hello.").await?;
//!     Ok(seq.gen()?.text().await)
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Transport | [`Error::Connection`], [`Error::WebSocket`] |
//! | Protocol | [`Error::Protocol`], [`Error::Json`] |
//! | State | [`Error::State`] |
//! | Server | [`Error::Open`] |
//! | Caller | [`Error::InvalidTool`] |
//! | Lifecycle | [`Error::SeqClosed`], [`Error::ConnectionClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// WebSocket handshake or channel failure.
    ///
    /// Returned when the connection cannot be established or the
    /// transport errors mid-flight.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection no longer accepts commands.
    ///
    /// Injected into every outstanding opening waiter when the
    /// connection tears down.
    #[error("{reason}")]
    ConnectionClosed {
        /// Why the connection is gone.
        reason: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or unexpected frame.
    ///
    /// The connection stays up; the frame is dropped.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Event references state the client does not hold.
    ///
    /// Typically an event for an unknown sequence id; a bug indicator
    /// on one side of the connection.
    #[error("State error: {message}")]
    State {
        /// Description of the state mismatch.
        message: String,
    },

    // ========================================================================
    // Server Errors
    // ========================================================================
    /// The server rejected a sequence open request.
    #[error("open error: {message}")]
    Open {
        /// Server-provided failure message.
        message: String,
    },

    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// A tool failed validation before any network I/O.
    ///
    /// Covers malformed names, missing descriptions, non-object
    /// parameter schemas, duplicate installs, and installing on a
    /// sequence opened without tools.
    #[error("invalid tool: {message}")]
    InvalidTool {
        /// What was wrong with the tool.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The owning sequence closed while the command was pending.
    #[error("seq closed")]
    SeqClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a state error.
    #[inline]
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Creates a server open error.
    #[inline]
    pub fn open(message: impl Into<String>) -> Self {
        Self::Open {
            message: message.into(),
        }
    }

    /// Creates an invalid tool error.
    #[inline]
    pub fn invalid_tool(message: impl Into<String>) -> Self {
        Self::InvalidTool {
            message: message.into(),
        }
    }

    /// Creates the lifecycle error injected by a local `close()`.
    #[inline]
    pub fn closed_by_client() -> Self {
        Self::ConnectionClosed {
            reason: "websocket closed by client".to_string(),
        }
    }

    /// Creates the lifecycle error for a connection that went away.
    #[inline]
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error was injected by a teardown
    /// (sequence close or connection close).
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::SeqClosed | Self::ConnectionClosed { .. })
    }

    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::WebSocket(_))
    }

    /// Returns `true` if this error was caught before any I/O happened.
    #[inline]
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidTool { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
