use crate::config::Config;
use crate::error::{NarrationError, Result, Stage};
use crate::job::{JobId, PollResult};
use crate::poller::StatusSource;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Stock avatars: (display name, actor id)
pub const STOCK_ACTORS: &[(&str, &str)] = &[
    ("Anna", "anna_costume1_cameraA"),
    ("Bridget", "bridget_costume1_cameraA"),
    ("Dave", "dave_costume1_cameraA"),
    ("Howard", "howard_costume1_cameraA"),
    ("Isabella", "isabella_costume1_cameraA"),
    ("Santa", "santa_costume1_cameraA"),
];

pub const DEFAULT_ACTOR: &str = "santa_costume1_cameraA";
pub const DEFAULT_BACKGROUND: &str = "green_screen";

#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub script: String,
    pub actor: String,
    pub background: String,
    /// Watermarked test render, not billed
    pub test: bool,
}

#[derive(Debug, Serialize)]
struct CreateVideoBody<'a> {
    test: bool,
    input: [VideoInput<'a>; 1],
}

#[derive(Debug, Serialize)]
struct VideoInput<'a> {
    script: &'a str,
    actor: &'a str,
    background: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateVideoResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct VideoStatusResponse {
    status: String,
    #[serde(default)]
    download: Option<String>,
}

/// Client for the video-job API: submits renders and reports their status
#[derive(Debug, Clone)]
pub struct VideoJobClient {
    http: Client,
    root: String,
    api_key: String,
}

impl VideoJobClient {
    pub fn new(http: Client, cfg: &Config) -> Self {
        Self {
            http,
            root: cfg.synthesia_root.trim_end_matches('/').to_string(),
            api_key: cfg.synthesia_key.clone(),
        }
    }

    pub fn status_url(&self, job_id: &JobId) -> String {
        format!("{}/{}", self.root, job_id)
    }

    pub async fn create_video(&self, req: &VideoRequest) -> Result<JobId> {
        if req.script.trim().is_empty() {
            return Err(NarrationError::InvalidArgument("video script must not be empty".into()));
        }

        let body = CreateVideoBody {
            test: req.test,
            input: [VideoInput {
                script: &req.script,
                actor: &req.actor,
                background: &req.background,
            }],
        };

        let resp = self
            .http
            .post(&self.root)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NarrationError::network(Stage::Submit, e))?;

        if !resp.status().is_success() {
            return Err(NarrationError::from_response(Stage::Submit, resp).await);
        }

        let created: CreateVideoResponse = NarrationError::read_json(Stage::Submit, resp).await?;

        JobId::new(created.id).map_err(|_| NarrationError::Decode {
            stage: Stage::Submit,
            message: "response carried an empty video id".into(),
        })
    }

    pub async fn video_status(&self, job_id: &JobId) -> Result<PollResult> {
        let resp = self
            .http
            .get(self.status_url(job_id))
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| NarrationError::network(Stage::Poll, e))?;

        if !resp.status().is_success() {
            return Err(NarrationError::from_response(Stage::Poll, resp).await);
        }

        let status: VideoStatusResponse = NarrationError::read_json(Stage::Poll, resp).await?;

        Ok(PollResult::new(job_id.clone(), status.status, status.download))
    }
}

#[async_trait]
impl StatusSource for VideoJobClient {
    async fn query_status(&self, job_id: &JobId) -> Result<PollResult> {
        self.video_status(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::job::JobStatus;
    use crate::poller::{JobStatusPoller, PollConfig};
    use httpmock::MockServer;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn client(server: &MockServer) -> VideoJobClient {
        let cfg = Config::new("secret-key", &server.url("/v1/videos"), &server.base_url());
        VideoJobClient::new(Client::new(), &cfg)
    }

    fn request() -> VideoRequest {
        VideoRequest {
            script: "Two sentences walk into a bar. They order drinks.".into(),
            actor: DEFAULT_ACTOR.into(),
            background: DEFAULT_BACKGROUND.into(),
            test: true,
        }
    }

    #[tokio::test]
    async fn create_posts_script_and_returns_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/v1/videos")
                    .header("Authorization", "secret-key")
                    .json_body(serde_json::json!({
                        "test": true,
                        "input": [{
                            "script": "Two sentences walk into a bar. They order drinks.",
                            "actor": "santa_costume1_cameraA",
                            "background": "green_screen"
                        }]
                    }));
                then.status(201)
                    .header("content-type", "application/json")
                    .body(r#"{"id":"abc-123"}"#);
            })
            .await;

        let id = client(&server).create_video(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(id.as_str(), "abc-123");
    }

    #[tokio::test]
    async fn create_rejection_is_remote_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/v1/videos");
                then.status(401).body(r#"{"error":"bad key"}"#);
            })
            .await;

        let err = client(&server).create_video(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            NarrationError::RemoteUnavailable { stage: Stage::Submit, status: 401, .. }
        ));
    }

    #[tokio::test]
    async fn status_reports_download_link_when_complete() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/v1/videos/abc-123")
                    .header("Authorization", "secret-key");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"id":"abc-123","status":"COMPLETE","download":"https://cdn/x.mp4"}"#);
            })
            .await;

        let id = JobId::new("abc-123").unwrap();
        let snapshot = client(&server).query_status(&id).await.unwrap();

        mock.assert_async().await;
        assert_eq!(snapshot.status, JobStatus::Complete);
        assert_eq!(snapshot.download_url.as_deref(), Some("https://cdn/x.mp4"));
    }

    #[tokio::test]
    async fn status_server_error_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/v1/videos/abc-123");
                then.status(502);
            })
            .await;

        let id = JobId::new("abc-123").unwrap();
        let err = client(&server).video_status(&id).await.unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    async fn read_request_head(socket: &mut TcpStream) {
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            head.extend_from_slice(&buf[..n]);
        }
    }

    /// Serves `bodies` in order, one per connection. Each entry is the
    /// advertised content length and the bytes actually sent before closing.
    async fn raw_status_server(bodies: Vec<(usize, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = Arc::new(AtomicUsize::new(0));
        let counter = served.clone();
        tokio::spawn(async move {
            for (advertised, body) in bodies {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                read_request_head(&mut socket).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {advertised}\r\nconnection: close\r\n\r\n"
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(body.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        (format!("http://{addr}/v1/videos"), served)
    }

    fn raw_client(root: &str) -> VideoJobClient {
        let cfg = Config::new("secret-key", root, "http://127.0.0.1:9");
        VideoJobClient::new(Client::new(), &cfg)
    }

    const COMPLETE_BODY: &str = r#"{"status":"COMPLETE","download":"https://cdn/x.mp4"}"#;

    #[tokio::test]
    async fn truncated_status_body_is_transient() {
        let (root, _) = raw_status_server(vec![(200, r#"{"status":"IN_PR"#)]).await;

        let id = JobId::new("abc-123").unwrap();
        let err = raw_client(&root).video_status(&id).await.unwrap_err();

        assert!(
            matches!(err, NarrationError::Network { stage: Stage::Poll, .. }),
            "{err}"
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn poller_recovers_from_truncated_status_body() {
        let (root, served) = raw_status_server(vec![
            (200, r#"{"status":"IN_PR"#),
            (COMPLETE_BODY.len(), COMPLETE_BODY),
        ])
        .await;

        let poller = JobStatusPoller::new(PollConfig {
            interval: Duration::from_millis(10),
            max_wait: Some(Duration::from_secs(10)),
            max_query_retries: 2,
            retry_delay: Duration::from_millis(10),
            max_unknown_statuses: 5,
        });
        let id = JobId::new("abc-123").unwrap();
        let result = poller
            .wait_for_terminal(&raw_client(&root), &id, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Complete);
        assert_eq!(result.download_url.as_deref(), Some("https://cdn/x.mp4"));
        assert_eq!(served.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_status_body_is_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/v1/videos/abc-123");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"state":"COMPLETE"}"#);
            })
            .await;

        let id = JobId::new("abc-123").unwrap();
        let err = client(&server).video_status(&id).await.unwrap_err();
        assert!(matches!(err, NarrationError::Decode { stage: Stage::Poll, .. }), "{err}");
        assert!(!err.is_transient());
    }
}
