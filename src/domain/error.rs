//! Domain error types.

/// Top-level error type for candlecross.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("candle at {timestamp} is out of order (last accepted {last})")]
    OutOfOrder { timestamp: i64, last: i64 },

    #[error("invalid stop distance {distance}: must be positive")]
    InvalidStopDistance { distance: f64 },

    #[error("insufficient cash: balance is {cash:.2} after settlement")]
    InsufficientCash { cash: f64 },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("malformed candle data: {reason}")]
    MalformedData { reason: String },

    #[error("giving up after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether a failed fetch is worth another attempt.
    pub fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            EngineError::DataSource { .. } => true,
            EngineError::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::DataSource { .. }
            | EngineError::MalformedData { .. }
            | EngineError::RetriesExhausted { .. } => 3,
            EngineError::OutOfOrder { .. } => 4,
            EngineError::InvalidStopDistance { .. } | EngineError::InsufficientCash { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
