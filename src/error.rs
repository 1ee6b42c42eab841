use std::error::Error as StdError;

use thiserror::Error;

/// voxgate's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// voxgate's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// The capture device is absent, went away, or produced no data in time.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A configuration value is outside the range the detector accepts.
    #[error("invalid detector config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn device(reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable(reason.into())
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Whether this error means the capture device can no longer be read.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_are_classified() {
        assert!(Error::device("gone").is_device_unavailable());
        assert!(!Error::config("bad").is_device_unavailable());
    }

    #[test]
    fn anyhow_errors_keep_their_context_chain() {
        let err = anyhow::anyhow!("root cause").context("while loading");
        let err = Error::from(err);
        assert_eq!(err.to_string(), "while loading: root cause");
    }
}
