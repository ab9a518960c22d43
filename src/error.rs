//! Error taxonomy for the fetch → submit → poll → download pipeline

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Submit,
    Poll,
    Download,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Submit => "submit",
            Stage::Poll => "poll",
            Stage::Download => "download",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum NarrationError {
    /// Transport-level failure (connect, reset, request timeout)
    #[error("{stage}: network error: {source}")]
    Network {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },

    /// Remote answered with a non-2xx status
    #[error("{stage}: remote returned HTTP {status}: {message}")]
    RemoteUnavailable {
        stage: Stage,
        status: u16,
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("{stage}: could not decode response: {message}")]
    Decode { stage: Stage, message: String },

    #[error("poll: job {job_id} did not reach a terminal status within {waited:?}")]
    PollTimeout { job_id: String, waited: Duration },

    #[error("poll: status query for job {job_id} failed after {attempts} attempt(s): {source}")]
    StatusQuery {
        job_id: String,
        attempts: u32,
        #[source]
        source: Box<NarrationError>,
    },

    #[error("poll: job {job_id} reported {count} unrecognized status value(s) in a row (last: {last:?})")]
    UnexpectedStatus {
        job_id: String,
        count: u32,
        last: String,
    },

    #[error("download: transfer of {url} exceeded {timeout:?}")]
    TransferTimeout { url: String, timeout: Duration },

    #[error("download: filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage}: cancelled")]
    Cancelled { stage: Stage },

    #[error("fetch: post #{index} requested but the listing only has {len} post(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NarrationError>;

impl NarrationError {
    pub fn network(stage: Stage, source: reqwest::Error) -> Self {
        Self::Network { stage, source }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Build a `RemoteUnavailable` from a failed response, keeping a short body snippet
    pub async fn from_response(stage: Stage, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            "<empty body>".to_string()
        } else {
            body.chars().take(300).collect()
        };
        Self::RemoteUnavailable {
            stage,
            status,
            message,
        }
    }

    /// Read a success body and deserialize it. A body cut off mid-read is a
    /// `Network` error; only a complete body of the wrong shape is `Decode`.
    pub async fn read_json<T: DeserializeOwned>(stage: Stage, response: reqwest::Response) -> Result<T> {
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::network(stage, e))?;
        serde_json::from_slice(&body).map_err(|e| Self::Decode {
            stage,
            message: e.to_string(),
        })
    }

    /// Whether repeating the same request may succeed without caller intervention
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::RemoteUnavailable { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Network { stage, .. }
            | Self::RemoteUnavailable { stage, .. }
            | Self::Decode { stage, .. }
            | Self::Cancelled { stage } => Some(*stage),
            Self::PollTimeout { .. } | Self::StatusQuery { .. } | Self::UnexpectedStatus { .. } => {
                Some(Stage::Poll)
            }
            Self::TransferTimeout { .. } | Self::Filesystem { .. } => Some(Stage::Download),
            Self::IndexOutOfRange { .. } => Some(Stage::Fetch),
            Self::InvalidArgument(_) | Self::Config(_) => None,
        }
    }
}
