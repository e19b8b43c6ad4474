use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors produced by the action policy.
///
/// Every variant becomes a failed [`crate::action::ActionResult`] at the
/// executor boundary; none of them is ever raised past it.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Path escapes sandbox root: `{path}`")]
    PathEscape { path: PathBuf },

    #[error("Missing required parameter `{name}`")]
    MissingParam { name: &'static str },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("Requested {requested} bytes exceeds policy limit of {limit}")]
    SizeLimitExceeded { requested: usize, limit: usize },

    #[error("Command not allowed: `{program}`")]
    CommandNotAllowed { program: String },

    #[error("Shell execution is disabled by policy")]
    ShellDisabled,

    #[error("Requested timeout {requested}s exceeds policy ceiling of {limit}s")]
    TimeoutExceedsPolicy { requested: u64, limit: u64 },

    #[error("Unknown action `{name}`")]
    UnknownAction { name: String },
}

/// Errors from the chat-completion transport.
///
/// The model-client boundary converts these into `ModelTurn::Exhausted`;
/// they never cross into the control loops.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Endpoint returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Response contained no choices")]
    EmptyResponse,
}
