//! Client-side tool definitions.
//!
//! A [`Tool`] is a named async function the model may invoke mid-generation.
//! Installing one on a sequence announces it to the model; when the server
//! emits a tool call, the sequence invokes the handler and returns the
//! result so the paused generation resumes.
//!
//! ```
//! use modelsocket::{Tool, ToolError};
//! use serde_json::json;
//!
//! let tool = Tool::new("get_time", "Get the current time in a timezone", |args| async move {
//!     let tz = args.get("tz").and_then(|v| v.as_str()).unwrap_or("UTC");
//!     Ok::<_, ToolError>(json!(format!("12:00 {tz}")))
//! })
//! .with_parameters(json!({
//!     "type": "object",
//!     "properties": { "tz": { "type": "string" } }
//! }));
//!
//! assert_eq!(tool.name(), "get_time");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Error type tool handlers may return.
pub type ToolError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed async tool handler: JSON arguments in, JSON value out.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, std::result::Result<Value, ToolError>> + Send + Sync>;

// ============================================================================
// Tool
// ============================================================================

/// A named client-side function the model may invoke.
#[derive(Clone)]
pub struct Tool {
    /// Tool name; ASCII letters, digits, and underscores only.
    name: String,
    /// Human-readable description announced to the model.
    description: String,
    /// JSON-schema object describing the arguments.
    parameters: Option<Value>,
    /// The invocation handler.
    handler: ToolHandler,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tool - Constructor
// ============================================================================

impl Tool {
    /// Creates a tool from a name, description, and async handler.
    ///
    /// Validation happens at install time, not here.
    pub fn new<F, Fut, E>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, E>> + Send + 'static,
        E: Into<ToolError>,
    {
        let handler: ToolHandler = Arc::new(move |args| {
            let fut = handler(args);
            Box::pin(async move { fut.await.map_err(Into::into) })
        });

        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
            handler,
        }
    }

    /// Attaches a JSON-schema object describing the arguments.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

// ============================================================================
// Tool - Accessors
// ============================================================================

impl Tool {
    /// Returns the tool name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the parameter schema, if any.
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> Option<&Value> {
        self.parameters.as_ref()
    }
}

// ============================================================================
// Tool - Internal
// ============================================================================

/// Announcement rendered into the hidden system append at install time.
#[derive(Serialize)]
struct Announcement<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<&'a Value>,
}

impl Tool {
    /// Validates the definition before any network I/O.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_tool("name must not be empty"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::invalid_tool(format!(
                "name '{}' must contain only ASCII letters, digits, and underscores",
                self.name
            )));
        }
        if self.description.is_empty() {
            return Err(Error::invalid_tool("description must not be empty"));
        }
        if let Some(parameters) = &self.parameters
            && !parameters.is_object()
        {
            return Err(Error::invalid_tool("parameters must be a JSON object"));
        }
        Ok(())
    }

    /// Renders the text announced to the model when the tool is installed.
    pub(crate) fn announcement(&self) -> Result<String> {
        let descriptor = serde_json::to_string_pretty(&Announcement {
            name: &self.name,
            description: &self.description,
            parameters: self.parameters.as_ref(),
        })?;

        Ok(format!(
            "Use the function '{}' to: {}\n{}\n\n",
            self.name, self.description, descriptor
        ))
    }

    /// Invokes the handler.
    pub(crate) fn call(&self, args: Value) -> BoxFuture<'static, std::result::Result<Value, ToolError>> {
        (self.handler)(args)
    }
}

// ============================================================================
// Tests
// ============================================================================
