//! Artifact retriever
//!
//! Streams a finished render into `{root}/{YYYY-MM-DD}/{job_id}.{ext}`. The body is
//! written to a hidden `.part` file next to the destination and only renamed into
//! place once fully flushed, so an interrupted transfer never leaves something that
//! looks like a finished video.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Url};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{NarrationError, Result, Stage};
use crate::job::JobId;

const DEFAULT_EXTENSION: &str = "mp4";

pub struct ArtifactRetriever {
    http: Client,
    timeout: Duration,
}

/// Directory for artifacts retrieved on `date`
pub fn artifact_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(date.format("%Y-%m-%d").to_string())
}

/// File name for a job's artifact, extension taken from the URL path
pub fn artifact_file_name(job_id: &JobId, url: &str) -> String {
    let ext = Url::parse(url)
        .ok()
        .and_then(|u| {
            let last = u.path_segments()?.last()?.to_string();
            let (_, ext) = last.rsplit_once('.')?;
            let ok = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
            ok.then(|| ext.to_ascii_lowercase())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    format!("{}.{}", job_id.file_stem(), ext)
}

impl ArtifactRetriever {
    pub fn new(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Download `url` into `dest_dir/file_name`, creating `dest_dir` as needed.
    pub async fn retrieve(&self, url: &str, dest_dir: &Path, file_name: &str) -> Result<PathBuf> {
        let url = url.trim();
        if url.is_empty() {
            return Err(NarrationError::InvalidArgument("artifact url must not be empty".into()));
        }
        let parsed = Url::parse(url)
            .map_err(|e| NarrationError::InvalidArgument(format!("artifact url {url:?}: {e}")))?;
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(NarrationError::InvalidArgument(format!(
                "artifact file name {file_name:?} is not a plain file name"
            )));
        }

        fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| NarrationError::filesystem(dest_dir, e))?;

        let dest = dest_dir.join(file_name);
        match tokio::time::timeout(self.timeout, self.transfer(parsed, dest_dir, &dest)).await {
            Ok(result) => result,
            // the dropped transfer future takes its partial file with it
            Err(_) => Err(NarrationError::TransferTimeout {
                url: url.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    async fn transfer(&self, url: Url, dest_dir: &Path, dest: &Path) -> Result<PathBuf> {
        let mut resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| NarrationError::network(Stage::Download, e))?;

        if !resp.status().is_success() {
            return Err(NarrationError::from_response(Stage::Download, resp).await);
        }

        let partial = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(dest_dir)
            .map_err(|e| NarrationError::filesystem(dest_dir, e))?;
        let (std_file, partial_path) = partial.into_parts();
        let mut file = fs::File::from_std(std_file);

        let mut written: u64 = 0;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| NarrationError::network(Stage::Download, e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| NarrationError::filesystem(&*partial_path, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| NarrationError::filesystem(&*partial_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| NarrationError::filesystem(&*partial_path, e))?;
        drop(file);
        debug!(bytes = written, partial = %partial_path.display(), "artifact body received");

        partial_path
            .persist(dest)
            .map_err(|e| NarrationError::filesystem(dest, e.error))?;

        info!(bytes = written, path = %dest.display(), "artifact saved");
        Ok(dest.to_path_buf())
    }
}
