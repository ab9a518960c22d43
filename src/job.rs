use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NarrationError, Result};

/// Opaque identifier of a remote rendering job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(NarrationError::InvalidArgument("job id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form usable as a file stem: anything outside `[A-Za-z0-9_-]` becomes `_`
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl TryFrom<String> for JobId {
    type Error = NarrationError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
    /// Any value the video API returned that is not one of the above
    Unknown,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "IN_PROGRESS" => Self::InProgress,
            "COMPLETE" => Self::Complete,
            "FAILED" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by a single status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Status string exactly as the service sent it
    pub raw_status: String,
    /// Only ever set when `status` is `Complete`
    pub download_url: Option<String>,
}

impl PollResult {
    pub fn new(job_id: JobId, raw_status: impl Into<String>, download_url: Option<String>) -> Self {
        let raw_status = raw_status.into();
        let status = JobStatus::parse(&raw_status);
        let download_url = download_url
            .filter(|url| status == JobStatus::Complete && !url.trim().is_empty());
        Self {
            job_id,
            status,
            raw_status,
            download_url,
        }
    }
}

/// A job tracked for the lifetime of one workflow run
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub artifact_url: Option<String>,
}

impl Job {
    pub fn submitted(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            artifact_url: None,
        }
    }

    /// Apply a poll snapshot. Terminal jobs and unknown statuses are left untouched.
    /// Returns whether the job changed.
    pub fn observe(&mut self, snapshot: &PollResult) -> bool {
        if self.status.is_terminal() || snapshot.status == JobStatus::Unknown {
            return false;
        }
        let changed = self.status != snapshot.status;
        self.status = snapshot.status;
        self.artifact_url = snapshot.download_url.clone();
        changed
    }
}

/// Observability event emitted when a job moves between statuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub job_id: JobId,
    /// `None` for the first status seen
    pub from: Option<JobStatus>,
    pub to: JobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> JobId {
        JobId::new("job-1").unwrap()
    }

    #[test]
    fn empty_job_ids_are_rejected() {
        assert!(JobId::new("").is_err());
        assert!(JobId::new("   ").is_err());
        assert_eq!(JobId::new(" abc ").unwrap().as_str(), "abc");
    }

    #[test]
    fn file_stem_replaces_path_characters() {
        let id = JobId::new("../a b/c").unwrap();
        assert_eq!(id.file_stem(), "___a_b_c");
    }

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(JobStatus::parse("IN_PROGRESS"), JobStatus::InProgress);
        assert_eq!(JobStatus::parse("complete"), JobStatus::Complete);
        assert_eq!(JobStatus::parse("rendering"), JobStatus::Unknown);
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn download_url_only_kept_for_complete() {
        let url = Some("https://cdn/video.mp4".to_string());
        assert_eq!(PollResult::new(id(), "IN_PROGRESS", url.clone()).download_url, None);
        assert_eq!(PollResult::new(id(), "COMPLETE", url.clone()).download_url, url);
    }

    #[test]
    fn job_ignores_observations_after_terminal_status() {
        let mut job = Job::submitted(id());
        assert!(job.observe(&PollResult::new(id(), "IN_PROGRESS", None)));
        assert!(!job.observe(&PollResult::new(id(), "mystery", None)));
        assert!(job.observe(&PollResult::new(id(), "FAILED", None)));
        assert!(!job.observe(&PollResult::new(id(), "COMPLETE", Some("u".into()))));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.artifact_url, None);
    }
}
