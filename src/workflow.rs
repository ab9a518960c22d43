use crate::api::reddit::{self, PostQuery, TimeHorizon};
use crate::api::synthesia::{DEFAULT_ACTOR, DEFAULT_BACKGROUND, VideoJobClient, VideoRequest};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{NarrationError, Result, Stage};
use crate::job::{Job, JobStatus};
use crate::poller::JobStatusPoller;
use crate::retriever::{self, ArtifactRetriever};
use crate::{logi, logok, logw};
use chrono::{Local, NaiveDate};
use std::future::Future;
use std::path::PathBuf;

/// Per-run choices; everything process-wide lives in [`Config`]
#[derive(Debug, Clone)]
pub struct RunParams {
    pub subreddit: String,
    pub horizon: TimeHorizon,
    pub index: usize,
    pub actor: String,
    pub background: String,
    pub test: bool,
    /// When false the download link is only reported
    pub download: bool,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            subreddit: "TwoSentenceComedy".to_string(),
            horizon: TimeHorizon::Day,
            index: 3,
            actor: DEFAULT_ACTOR.to_string(),
            background: DEFAULT_BACKGROUND.to_string(),
            test: true,
            download: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Downloaded(PathBuf),
    /// Rendered, but nothing was downloaded (disabled, or no link returned)
    Completed { download_url: Option<String> },
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub job: Job,
    pub script: String,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Downloaded(_) | RunOutcome::Completed { .. } => 0,
            RunOutcome::Failed => 1,
        }
    }
}

/// Exit code for a run that ended in an error
pub fn error_exit_code(err: &NarrationError) -> i32 {
    if err.is_cancelled() { 130 } else { 1 }
}

async fn cancellable<T, F>(stage: Stage, cancel: &CancelToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(NarrationError::Cancelled { stage });
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(NarrationError::Cancelled { stage }),
        result = fut => result,
    }
}

pub async fn run_workflow(cfg: &Config, params: &RunParams, cancel: &CancelToken) -> Result<RunReport> {
    run_workflow_on(cfg, params, cancel, Local::now().date_naive()).await
}

/// Same as [`run_workflow`] with the artifact date fixed by the caller
pub async fn run_workflow_on(
    cfg: &Config,
    params: &RunParams,
    cancel: &CancelToken,
    date: NaiveDate,
) -> Result<RunReport> {
    let client = reqwest::Client::builder()
        .user_agent(cfg.user_agent.as_str())
        .build()
        .map_err(|e| NarrationError::Config(format!("failed to build HTTP client: {e}")))?;

    let query = PostQuery {
        subreddit: params.subreddit.clone(),
        horizon: params.horizon,
        index: params.index,
    };
    let post = cancellable(Stage::Fetch, cancel, reddit::fetch_top_post(&client, cfg, &query)).await?;
    let script = post.narration();
    logok(format!("Post #{} text ({} chars): {}", params.index, script.len(), script));

    let videos = VideoJobClient::new(client.clone(), cfg);
    let request = VideoRequest {
        script: script.clone(),
        actor: params.actor.clone(),
        background: params.background.clone(),
        test: params.test,
    };
    logi(format!("Submitting video (actor={}, test={})...", request.actor, request.test));
    let job_id = cancellable(Stage::Submit, cancel, videos.create_video(&request)).await?;
    logok(format!("Video ID: {}", job_id));
    let mut job = Job::submitted(job_id);

    let poller = JobStatusPoller::new(cfg.poll_config());
    let last = poller.wait_for_terminal(&videos, &job.id, cancel).await?;
    job.observe(&last);

    if job.status == JobStatus::Failed {
        logw(format!("Video {} failed to render (status {})", job.id, last.raw_status));
        return Ok(RunReport {
            job,
            script,
            outcome: RunOutcome::Failed,
        });
    }

    let Some(url) = job.artifact_url.clone() else {
        logw(format!("Video {} completed without a download link", job.id));
        return Ok(RunReport {
            job,
            script,
            outcome: RunOutcome::Completed { download_url: None },
        });
    };

    if !params.download {
        logok(format!("Download link: {}", url));
        return Ok(RunReport {
            job,
            script,
            outcome: RunOutcome::Completed {
                download_url: Some(url),
            },
        });
    }

    let dest_dir = retriever::artifact_dir(&cfg.output_dir, date);
    let file_name = retriever::artifact_file_name(&job.id, &url);
    let artifacts = ArtifactRetriever::new(client, cfg.download_timeout());
    logi(format!("Downloading {} -> {}", url, dest_dir.join(&file_name).display()));
    let path = cancellable(
        Stage::Download,
        cancel,
        artifacts.retrieve(&url, &dest_dir, &file_name),
    )
    .await?;
    logok(format!("Saved video: {}", path.display()));

    Ok(RunReport {
        job,
        script,
        outcome: RunOutcome::Downloaded(path),
    })
}
