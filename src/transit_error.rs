// Error type shared by the upstream client and configuration loading.
// The commute-plan normalizer itself never fails: malformed rides are skipped.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransitError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Upstream returned status {0}")]
    StatusError(u16),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for TransitError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => TransitError::StatusError(status.as_u16()),
            None => TransitError::NetworkError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransitError {
    fn from(e: serde_json::Error) -> Self {
        TransitError::ParseError(format!("Invalid JSON response: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, TransitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(TransitError::StatusError(503).to_string(), "Upstream returned status 503");
        assert_eq!(
            TransitError::ConfigError("bad zone".to_string()).to_string(),
            "Config error: bad zone"
        );
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        match TransitError::from(err) {
            TransitError::ParseError(msg) => assert!(msg.starts_with("Invalid JSON response")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
