//! Sequence entities.
//!
//! This module provides the caller-facing types for driving sequences:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Sequence`] | One server-side conversational context |
//! | [`GenStream`] | Readable half of one generation |
//! | [`Tool`] | Client-side function the model may invoke |
//!
//! # Example
//!
//! ```no_run
//! use modelsocket::{Connection, OpenOptions, Result};
//!
//! # async fn example() -> Result<()> {
//! let conn = Connection::connect("ws://localhost:7000/ws").await?;
//! let seq = conn.open("llama-3-8b", OpenOptions::new()).await?;
//!
//! seq.append("Q: What is the tallest mountain?\nA:").await?;
//! let answer = seq.gen()?.text().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Options for opening, appending, and generating.
pub mod options;

/// Sequence handles and command bookkeeping.
pub mod sequence;

/// Generation output streams.
pub mod stream;

/// Client-side tool definitions.
pub mod tool;

// ============================================================================
// Re-exports
// ============================================================================

pub use options::{AppendInput, AppendOptions, OpenOptions};
pub use sequence::Sequence;
pub use stream::{Chunk, GenStream, TextAndTokens, TextStream};
pub use tool::{Tool, ToolError, ToolHandler};
