//! Error handling for screenflow
//!
//! This module defines the crate error type and a Result alias. Failures that
//! happen *inside* a pipeline run (recognition misses, failed actions, error
//! loops) are not errors in this sense: they are reported as a
//! [`RunOutcome`](crate::runtime::RunOutcome) and recorded in the runtime cache.

use thiserror::Error;

/// Main error type for screenflow operations
#[derive(Error, Debug)]
pub enum FlowError {
    /// A node name could not be resolved in the (overridden) graph
    #[error("Node not found: {0}")]
    GraphLookup(String),

    /// A pipeline document was structurally invalid
    #[error("Pipeline parse error: {0}")]
    GraphParse(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tasker has no valid resource or no connected controller
    #[error("Tasker is not initialized")]
    NotInited,

    /// A stop request is still draining
    #[error("Tasker is stopping")]
    Stopping,

    /// Errors reported by a controller implementation
    #[error("Controller error: {0}")]
    Controller(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decoding errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FlowError>,
    },
}

impl FlowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FlowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for screenflow operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<FlowError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowError::GraphLookup("StartUp".to_string());
        assert_eq!(err.to_string(), "Node not found: StartUp");
    }

    #[test]
    fn test_error_with_context() {
        let err = FlowError::GraphParse("expected object".to_string());
        let with_ctx = err.with_context("Failed to load main.json");
        assert!(with_ctx.to_string().contains("Failed to load main.json"));
        assert!(with_ctx.to_string().contains("expected object"));
    }

    #[test]
    fn test_result_ext_converts_foreign_errors() {
        let parsed: std::result::Result<serde_json::Value, serde_json::Error> =
            serde_json::from_str("{ not json");
        let err = parsed.context("override").unwrap_err();
        assert!(matches!(err, FlowError::WithContext { .. }));
        assert!(err.to_string().starts_with("override: JSON error"));
    }
}
