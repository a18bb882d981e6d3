use std::path::PathBuf;
use std::time::Duration;

/// Terminal failure states for a single generate invocation. None of these
/// are retried internally; a retry must re-sign with a fresh timestamp.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("access key and secret key must both be non-empty")]
    InvalidCredentials,
    #[error("cannot sign request: {0}")]
    MalformedRequest(String),
    #[error("{stage} transport failure: {source}")]
    Transport {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{stage} timed out after {}s", .timeout.as_secs())]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },
    #[error("{stage} failed ({status}): {body}")]
    Api {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[error("unexpected response shape: {body}")]
    MalformedResponse { body: String },
    #[error("no image data in response: {body}")]
    NoImageData { body: String },
    #[error("inline image base64 decode failed: {0}")]
    DecodeFailed(#[from] base64::DecodeError),
    #[error("failed writing image to {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Classifies a reqwest failure, keeping timeouts distinct from other
    /// transport errors.
    pub(crate) fn from_transport(
        stage: &'static str,
        timeout: Duration,
        source: reqwest::Error,
    ) -> Self {
        if source.is_timeout() {
            Error::Timeout { stage, timeout }
        } else {
            Error::Transport { stage, source }
        }
    }

    pub(crate) fn write_failed(path: &std::path::Path, source: std::io::Error) -> Self {
        Error::WriteFailed {
            path: path.to_path_buf(),
            source,
        }
    }
}
