use thiserror::Error;

/// Reasons a mix refuses to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown output strategy: {0}")]
    UnknownStrategy(String),
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cannot read settings: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
