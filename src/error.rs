use thiserror::Error;

#[derive(Error, Debug)]
pub enum NanonisError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("IO error ({context}): {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
    #[error("Connection to {address} failed: {source}")]
    Connection {
        address: String,
        source: std::io::Error,
    },
    #[error("Connection timeout")]
    Timeout,
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Type error: {0}")]
    Type(String),
    #[error("Command mismatch: expected {expected}, got {actual}")]
    CommandMismatch { expected: String, actual: String },
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Server error {code}: {message}")]
    ServerError { code: u32, message: String },
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Session is broken after an earlier failure, reconnect required")]
    SessionBroken,
    #[error("Session is closed")]
    SessionClosed,
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<std::io::Error> for NanonisError {
    fn from(source: std::io::Error) -> Self {
        NanonisError::Io {
            source,
            context: "Transport".to_string(),
        }
    }
}

impl NanonisError {
    /// Whether the session that produced this error can no longer be used.
    ///
    /// Transport failures and framing desyncs are fatal. Server-side command
    /// errors and local argument errors leave the session intact.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NanonisError::Io { .. }
                | NanonisError::Connection { .. }
                | NanonisError::Timeout
                | NanonisError::Protocol(_)
                | NanonisError::CommandMismatch { .. }
                | NanonisError::SessionBroken
                | NanonisError::SessionClosed
        )
    }
}
