//! Error types for template mapping

use thiserror::Error;

/// Failures that abort an entire mapping call.
///
/// Absence of data (zero matches, a missing attribute, a failed coercion) is
/// not an error; it is represented as `serde_json::Value::Null` so pipes like
/// `default` can react to it. Anything below terminates the call with no
/// partial result.
#[derive(Debug, Error)]
pub enum MapError {
    /// Template was supplied as text and is not valid JSON
    #[error("invalid template JSON: {0}")]
    TemplateSyntax(#[from] serde_json::Error),

    /// A pipe chain referenced a name missing from the registry
    #[error("pipe function not found: {0}")]
    PipeNotFound(String),

    /// The selector engine rejected a selector string
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },

    /// A pipe function reported a failure of its own
    #[error("pipe `{pipe}` failed: {message}")]
    Pipe { pipe: String, message: String },
}

impl MapError {
    /// Convenience constructor for custom pipe implementations.
    pub fn pipe(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pipe {
            pipe: name.into(),
            message: message.into(),
        }
    }
}
