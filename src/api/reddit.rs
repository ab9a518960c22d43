use crate::config::Config;
use crate::error::{NarrationError, Result, Stage};
use crate::logi;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time window of a subreddit's top listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeHorizon {
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeHorizon {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeHorizon::Day => "day",
            TimeHorizon::Week => "week",
            TimeHorizon::Month => "month",
            TimeHorizon::Year => "year",
            TimeHorizon::All => "all",
        }
    }
}

impl fmt::Display for TimeHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PostQuery {
    pub subreddit: String,
    pub horizon: TimeHorizon,
    /// Zero-based position in the ranked listing
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub title: String,
    pub body: String,
}

impl Post {
    pub fn narration(&self) -> String {
        compose_narration(&self.title, &self.body)
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: ChildData,
}

#[derive(Debug, Deserialize)]
struct ChildData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
}

/// Title and body joined into one script; the title always ends with a period.
pub fn compose_narration(title: &str, body: &str) -> String {
    let mut text = title.trim_end().to_string();
    if !text.ends_with('.') {
        text.push('.');
    }
    let body = body.trim();
    if !body.is_empty() {
        text.push(' ');
        text.push_str(body);
    }
    text
}

/// Accepts `Name`, `r/Name` or `/r/Name`
pub fn normalize_subreddit(subreddit: &str) -> String {
    let s = subreddit.trim().trim_matches('/');
    s.strip_prefix("r/").unwrap_or(s).to_string()
}

pub fn listing_url(reddit_root: &str, subreddit: &str) -> String {
    format!(
        "{}/r/{}/top.json",
        reddit_root.trim_end_matches('/'),
        normalize_subreddit(subreddit)
    )
}

pub async fn fetch_top_post(client: &Client, cfg: &Config, query: &PostQuery) -> Result<Post> {
    let name = normalize_subreddit(&query.subreddit);
    if name.is_empty() {
        return Err(NarrationError::InvalidArgument("subreddit must not be empty".into()));
    }

    let url = listing_url(&cfg.reddit_root, &name);
    logi(format!("Fetching top posts of r/{} ({})...", name, query.horizon));

    let resp = client
        .get(&url)
        .query(&[("t", query.horizon.as_str())])
        .header("User-Agent", &cfg.user_agent)
        .send()
        .await
        .map_err(|e| NarrationError::network(Stage::Fetch, e))?;

    if !resp.status().is_success() {
        return Err(NarrationError::from_response(Stage::Fetch, resp).await);
    }

    let listing: Listing = NarrationError::read_json(Stage::Fetch, resp).await?;

    let len = listing.data.children.len();
    let child = listing
        .data
        .children
        .into_iter()
        .nth(query.index)
        .ok_or(NarrationError::IndexOutOfRange { index: query.index, len })?;

    Ok(Post {
        title: child.data.title,
        body: child.data.selftext,
    })
}
