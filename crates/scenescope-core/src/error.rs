/// Core error types for scenescope.
use std::path::PathBuf;

/// A specialized Result type for scenescope operations.
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Top-level error type encompassing all scenescope subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("parse error: {message} at {file}:{line}:{column}")]
    Parse {
        message: String,
        file: String,
        line: usize,
        column: usize,
    },

    #[error("config error: {message} ({path:?})")]
    Config { message: String, path: PathBuf },

    #[error("generation error: {0}")]
    Generation(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ScopeError {
    /// Create a parse error with source location.
    pub fn parse(
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        ScopeError::Parse {
            message: message.into(),
            file: file.into(),
            line,
            column,
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        ScopeError::Config {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Whether this error came from the lexer or parser.
    pub fn is_parse(&self) -> bool {
        matches!(self, ScopeError::Parse { .. })
    }
}
