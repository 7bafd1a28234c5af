use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use tora_reconcile::{
    Lookup, Page, RemoteSubmissionStore, StoreError, Submission, SubmissionFilter, SubmissionId,
    Transcription, VolunteerId,
};

use crate::wire::{
    normalize_submission, normalize_transcription, RawList, RawListing, RawSubmission,
    RawTranscription, RawVolunteer,
};

pub const DEFAULT_BASE_URL: &str = "https://grafeas.org/api/";

/// Connection settings for [`BlossomClient`].
///
/// Credentials arrive already issued; obtaining them is not our job.
#[derive(Clone)]
pub struct BlossomConfig {
    pub base_url: String,
    pub api_key: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl BlossomConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl fmt::Debug for BlossomConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlossomConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Tracking-service adapter over its REST API.
#[derive(Clone)]
pub struct BlossomClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    token: Option<String>,
}

impl fmt::Debug for BlossomClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlossomClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BlossomClient {
    pub fn new(cfg: BlossomConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("build blossom http client failed")?;
        Ok(Self {
            http,
            base_url: cfg.base_url,
            api_key: cfg.api_key,
            token: cfg.token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut rb = self
            .http
            .request(method, self.url(path))
            .header("X-Api-Key", &self.api_key)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            rb = rb.bearer_auth(token);
        }
        rb
    }

    async fn send(&self, rb: RequestBuilder) -> Result<Response, StoreError> {
        let resp = rb
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = retry_after_header(&resp);
        let body = resp.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "blossom returned an error status");
        Err(StoreError::from_status(
            status.as_u16(),
            retry_after,
            error_message(&body),
        ))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, StoreError> {
        let resp = self.send(self.request(Method::GET, path).query(query)).await?;
        resp.json::<T>()
            .await
            .map_err(|e| StoreError::Decode(format!("{path}: {e}")))
    }

    async fn patch(&self, path: &str, body: Option<Value>) -> Result<(), StoreError> {
        let mut rb = self.request(Method::PATCH, path);
        if let Some(body) = body {
            rb = rb.json(&body);
        }
        self.send(rb).await.map(|_| ())
    }

    /// Decode a list of raw submissions, dropping malformed entries.
    fn submissions_from(values: Vec<Value>) -> Vec<Submission> {
        values
            .into_iter()
            .filter_map(|value| {
                let decoded = serde_json::from_value::<RawSubmission>(value)
                    .map_err(|e| StoreError::Decode(e.to_string()))
                    .and_then(normalize_submission);
                match decoded {
                    Ok(sub) => Some(sub),
                    Err(err) => {
                        warn!(error = %err, "skipping malformed submission record");
                        None
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl RemoteSubmissionStore for BlossomClient {
    async fn find_by_url(&self, tor_url: &str) -> Result<Lookup<Submission>, StoreError> {
        let listing: RawListing<RawSubmission> = self
            .get_json("submission/", &[("tor_url", tor_url.to_string())])
            .await?;

        match listing.results.into_iter().next() {
            Some(raw) => normalize_submission(raw).map(Lookup::Found),
            None => Ok(Lookup::NotFound),
        }
    }

    async fn mark_removed(&self, id: SubmissionId) -> Result<(), StoreError> {
        self.patch(&format!("submission/{id}/remove/"), None).await
    }

    async fn mark_approved(&self, id: SubmissionId) -> Result<(), StoreError> {
        self.patch(&format!("submission/{id}/approve/"), None).await
    }

    async fn mark_nsfw(&self, id: SubmissionId) -> Result<(), StoreError> {
        self.patch(&format!("submission/{id}/nsfw/"), None).await
    }

    async fn file_report(&self, id: SubmissionId, reason: &str) -> Result<(), StoreError> {
        self.patch(
            &format!("submission/{id}/report/"),
            Some(json!({ "reason": reason })),
        )
        .await
    }

    async fn list_page(
        &self,
        filter: &SubmissionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Submission>, StoreError> {
        let mut query = vec![
            ("page_size", page_size.to_string()),
            ("page", page.to_string()),
        ];
        if filter.unclaimed {
            query.push(("claimed_by__isnull", "true".to_string()));
        }
        if filter.not_removed {
            query.push(("removed_from_queue", "false".to_string()));
        }
        if let Some(after) = filter.created_after {
            query.push(("create_time__gte", after.to_rfc3339()));
        }

        let listing: RawListing<Value> = self.get_json("submission/", &query).await?;
        Ok(Page {
            has_next: listing.next.is_some(),
            fetched: listing.results.len(),
            items: Self::submissions_from(listing.results),
        })
    }

    async fn mark_archived(&self, id: SubmissionId) -> Result<(), StoreError> {
        self.patch(&format!("submission/{id}/archive/"), None).await
    }

    async fn expired_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let list: RawList<Value> = self.get_json("submission/expired/", &[]).await?;
        Ok(Self::submissions_from(list.into_items()))
    }

    async fn unarchived_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let list: RawList<Value> = self.get_json("submission/unarchived/", &[]).await?;
        Ok(Self::submissions_from(list.into_items()))
    }

    async fn human_transcription(
        &self,
        id: SubmissionId,
        exclude_author: Option<VolunteerId>,
    ) -> Result<Lookup<Transcription>, StoreError> {
        let list: RawList<RawTranscription> = self
            .get_json("transcription/search/", &[("submission_id", id.to_string())])
            .await?;

        let found = list
            .into_items()
            .into_iter()
            .map(normalize_transcription)
            .find(|t| exclude_author.is_none() || t.author_id != exclude_author);
        Ok(found.map_or(Lookup::NotFound, Lookup::Found))
    }

    async fn volunteer_id(&self, username: &str) -> Result<Lookup<VolunteerId>, StoreError> {
        let list: RawList<RawVolunteer> = self
            .get_json("volunteer/", &[("username", username.to_string())])
            .await?;
        Ok(list
            .into_items()
            .first()
            .map_or(Lookup::NotFound, |v| Lookup::Found(VolunteerId(v.id))))
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after_header(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("detail")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        _ => body.trim().to_string(),
    }
}
