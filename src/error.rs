//! # Error Types
//!
//! Every failure in the data pipeline falls into one of three kinds, and the
//! kind decides who handles it:
//!
//! - [`HavvarselError::Configuration`]: bad coordinates or depth. Detected
//!   before any I/O and returned straight to whoever set the station up.
//! - [`HavvarselError::Network`]: the service could not be reached or answered
//!   with a non-2xx status.
//! - [`HavvarselError::Parse`]: the service answered, but the body does not
//!   have the expected shape.
//!
//! The coordinator swallows the last two during scheduled refreshes and turns
//! them into stale/unavailable sensor state.

use thiserror::Error;

/// Errors raised by location validation and the API client.
#[derive(Error, Debug)]
pub enum HavvarselError {
    /// Invalid longitude, latitude or depth
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Transport failure, timeout or non-2xx status
    #[error("service unavailable: {0}")]
    Network(String),

    /// Response body did not match the expected schema
    #[error("malformed response: {0}")]
    Parse(String),
}

impl HavvarselError {
    /// True for failures that a later refresh may recover from.
    pub fn is_transient(&self) -> bool {
        !matches!(self, HavvarselError::Configuration(_))
    }
}

impl From<reqwest::Error> for HavvarselError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HavvarselError::Parse(err.to_string())
        } else {
            HavvarselError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HavvarselError {
    fn from(err: serde_json::Error) -> Self {
        HavvarselError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(HavvarselError::Network("timeout".into()).is_transient());
        assert!(HavvarselError::Parse("missing data".into()).is_transient());
        assert!(!HavvarselError::Configuration("depth".into()).is_transient());
    }

    #[test]
    fn test_json_errors_are_parse_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(HavvarselError::from(err), HavvarselError::Parse(_)));
    }
}
