//! WebSocket transport layer.
//!
//! One [`Connection`] owns one WebSocket and multiplexes every sequence
//! over it:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 Connection                    │
//! │               (single socket)                 │
//! │  ┌───────────────────────────────────────┐    │
//! │  │ SeqId="a" → Sequence a                │    │
//! │  │ SeqId="b" → Sequence b                │    │
//! │  │ cid_4     → opening waiter            │    │
//! │  └───────────────────────────────────────┘    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Inbound events route by kind: sequence events by `seq_id` to the
//! owning [`Sequence`](crate::seq::Sequence), open acknowledgements and
//! open failures by cid to the waiter recorded by `open`.

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event dispatch.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
