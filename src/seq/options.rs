//! Caller-facing options for sequence operations.
//!
//! Plain option structs with `with_*` builder methods:
//!
//! ```
//! use modelsocket::{AppendOptions, OpenOptions};
//!
//! let open = OpenOptions::new().with_tools().with_skip_prelude(true);
//! let append = AppendOptions::new().with_role("system").with_hidden();
//! assert!(open.tools);
//! assert_eq!(append.hidden, Some(true));
//! ```

// ============================================================================
// OpenOptions
// ============================================================================

/// Options for opening a sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Enables model-initiated tool calls on the sequence.
    pub tools: bool,

    /// Server-side prompt describing how tools are exposed to the model.
    pub tool_prompt: Option<String>,

    /// Suppresses the server's initial system context.
    pub skip_prelude: Option<bool>,
}

impl OpenOptions {
    /// Creates options with server defaults (tools disabled).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tools: false,
            tool_prompt: None,
            skip_prelude: None,
        }
    }

    /// Enables tool calls.
    #[inline]
    #[must_use]
    pub fn with_tools(mut self) -> Self {
        self.tools = true;
        self
    }

    /// Sets the tool prompt.
    #[inline]
    #[must_use]
    pub fn with_tool_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.tool_prompt = Some(prompt.into());
        self
    }

    /// Controls prelude suppression.
    #[inline]
    #[must_use]
    pub fn with_skip_prelude(mut self, skip: bool) -> Self {
        self.skip_prelude = Some(skip);
        self
    }
}

// ============================================================================
// AppendOptions
// ============================================================================

/// Options for appending content to a sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOptions {
    /// Role the content is attributed to.
    pub role: Option<String>,

    /// Hides the content from derived text views.
    pub hidden: Option<bool>,
}

impl AppendOptions {
    /// Creates options with server defaults.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            role: None,
            hidden: None,
        }
    }

    /// Sets the role.
    #[inline]
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Marks the content hidden.
    #[inline]
    #[must_use]
    pub fn with_hidden(mut self) -> Self {
        self.hidden = Some(true);
        self
    }
}

// ============================================================================
// AppendInput
// ============================================================================

/// Content accepted by `append`: UTF-8 text or raw token ids.
///
/// Exactly one of the two is serialized into the command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendInput {
    /// UTF-8 text.
    Text(String),
    /// Raw token ids.
    Tokens(Vec<u32>),
}

impl AppendInput {
    /// Splits into the `(text, tokens)` pair for the wire frame.
    #[inline]
    #[must_use]
    pub(crate) fn into_parts(self) -> (Option<String>, Option<Vec<u32>>) {
        match self {
            Self::Text(text) => (Some(text), None),
            Self::Tokens(tokens) => (None, Some(tokens)),
        }
    }
}

impl From<&str> for AppendInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for AppendInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u32>> for AppendInput {
    fn from(tokens: Vec<u32>) -> Self {
        Self::Tokens(tokens)
    }
}

impl From<&[u32]> for AppendInput {
    fn from(tokens: &[u32]) -> Self {
        Self::Tokens(tokens.to_vec())
    }
}

// ============================================================================
// Tests
// ============================================================================
