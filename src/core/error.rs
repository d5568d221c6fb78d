use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown metric identity: {id}")]
    UnknownMetric { id: u32 },

    #[error("Unsupported aggregation kind: {0}")]
    UnsupportedKind(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Consumer '{writer}' faulted: {reason}")]
    ConsumerFault { writer: String, reason: String },

    #[error("Writer '{0}' not found, it may not be registered")]
    WriterNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new invalid operation error
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Creates a new consumer fault
    pub fn consumer_fault<W: Into<String>, R: Into<String>>(writer: W, reason: R) -> Self {
        Self::ConsumerFault {
            writer: writer.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if a writer may retry the failed operation
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::WriterNotFound(_) => "config",
            Self::UnknownMetric { .. } | Self::NotFound(_) => "not_found",
            Self::UnsupportedKind(_) | Self::InvalidOperation(_) => "validation",
            Self::ConsumerFault { .. } => "consumer",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
        }
    }
}
