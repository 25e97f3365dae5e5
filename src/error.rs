use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} responded with status code {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Failed to decode response from {url}: {message}")]
    Decode {
        url: String,
        message: String,
        body: String,
    },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} was already saved during this run", .0.display())]
    AlreadyPersisted(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fetch task did not complete: {0}")]
    Task(String),
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures of the network layer, including non-accepted status codes.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::UnexpectedStatus { .. })
    }
}

impl From<tokio::task::JoinError> for ExtractError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_names_url_and_code() {
        let err = ExtractError::UnexpectedStatus {
            url: "http://api/api/pipelines/group/app/builds".to_string(),
            status: 500,
        };

        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "http://api/api/pipelines/group/app/builds responded with status code 500"
        );
    }

    #[test]
    fn test_decode_error_is_not_transport() {
        let err = ExtractError::Decode {
            url: "http://api/api/pipelines/x".to_string(),
            message: "expected value".to_string(),
            body: "<html>".to_string(),
        };

        assert!(!err.is_transport());
        assert!(err.to_string().contains("http://api/api/pipelines/x"));
    }
}
