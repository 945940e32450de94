//! Error types for pgport.

use thiserror::Error;

use crate::tree::NodeId;

/// The main error type for tree conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A node was attached while it still had a parent.
    #[error("Node {child} is already attached to {parent}")]
    AlreadyAttached { child: NodeId, parent: NodeId },

    /// A positional operation referenced a node that is not a child of the parent.
    #[error("Node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    /// Attaching the node would make it its own ancestor.
    #[error("Attaching {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    /// A rewrite found a construct without a part it relies on.
    #[error("Unexpected tree shape: {0}")]
    Shape(String),

    /// A pass of the pipeline failed.
    #[error("Pass '{pass}' failed: {source}")]
    Pass {
        pass: &'static str,
        #[source]
        source: Box<ConvertError>,
    },

    /// Failed to read the tree notation.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// A tag name outside the vocabulary.
    #[error("Unknown tag: '{0}'")]
    UnknownTag(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Create an unexpected-shape error.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }

    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Wrap an error with the name of the pass that raised it.
    pub fn in_pass(self, pass: &'static str) -> Self {
        Self::Pass {
            pass,
            source: Box::new(self),
        }
    }
}

/// Result type alias for pgport operations.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Turns a missing node into a [`ConvertError::Shape`].
pub trait Expected<T> {
    fn expected(self, what: &str) -> ConvertResult<T>;
}

impl<T> Expected<T> for Option<T> {
    fn expected(self, what: &str) -> ConvertResult<T> {
        self.ok_or_else(|| ConvertError::shape(format!("expected {what}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConvertError::parse(5, "unexpected character");
        assert_eq!(
            err.to_string(),
            "Parse error at position 5: unexpected character"
        );
    }

    #[test]
    fn test_pass_error_names_pass() {
        let err = ConvertError::shape("expected select clause").in_pass("select");
        assert_eq!(
            err.to_string(),
            "Pass 'select' failed: Unexpected tree shape: expected select clause"
        );
    }

    #[test]
    fn test_expected_on_none() {
        let missing: Option<u8> = None;
        let err = missing.expected("a comma").unwrap_err();
        assert!(matches!(err, ConvertError::Shape(ref m) if m == "expected a comma"));
    }
}
