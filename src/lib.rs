//! ModelSocket client runtime.
//!
//! This library multiplexes any number of language-model *sequences* over
//! one full-duplex WebSocket connection, streams generated text back to
//! callers, and transparently services model-initiated tool invocations.
//!
//! # Architecture
//!
//! The runtime follows a client-server model:
//!
//! - **Client (this crate)**: opens sequences, sends commands, routes
//!   events by correlation id
//! - **Server**: hosts the sequences, streams generation output, emits
//!   tool-call interruptions
//!
//! Key design principles:
//!
//! - One [`Connection`] owns: WebSocket + event loop + live-sequence table
//! - Every request carries a fresh cid; the server echoes it on the
//!   completion event
//! - A tool call interrupts a generation and resumes it under the same
//!   cid once results are returned
//! - Event-driven throughout (no polling)
//!
//! # Quick Start
//!
//! ```no_run
//! use modelsocket::{Connection, OpenOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // MODELSOCKET_API_KEY is attached to the handshake when set.
//!     let conn = Connection::connect("ws://localhost:7000/ws").await?;
//!
//!     let seq = conn.open("llama-3-8b", OpenOptions::new()).await?;
//!     seq.append("The capital of France is").await?;
//!
//!     // gen() returns the stream synchronously; text() drains it.
//!     let answer = seq.gen()?.text().await;
//!     println!("{answer}");
//!
//!     conn.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Ambient environment configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types (internal) |
//! | [`seq`] | Sequence entities: [`Sequence`], [`GenStream`], [`Tool`] |
//! | [`transport`] | WebSocket transport layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Ambient environment configuration.
///
/// `MODELSOCKET_API_KEY` and the `MODELSOCKET_LOG` log gate.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for protocol entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire message types.
///
/// Internal module defining request and event frame structures.
pub mod protocol;

/// Sequence entities: [`Sequence`], [`GenStream`], [`Tool`].
pub mod seq;

/// WebSocket transport layer.
///
/// Internal module handling the connection and event dispatch.
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

// Sequence types
pub use seq::{
    AppendInput, AppendOptions, Chunk, GenStream, OpenOptions, Sequence, TextAndTokens,
    TextStream, Tool, ToolError,
};

// Transport types
pub use transport::Connection;

// Protocol types used in the public API
pub use protocol::GenOpts;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{Cid, SeqId};
