use thiserror::Error;

pub type HbResult<T> = Result<T, HbError>;

#[derive(Debug, Error)]
pub enum HbError {
    /// The state MAC did not match; the state must not be used.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// A single-use, budgeted resource was requested beyond its capacity.
    #[error("exhausted: {0}")]
    Exhaustion(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HbError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, HbError::Authentication(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, HbError::Config(_))
    }
}
