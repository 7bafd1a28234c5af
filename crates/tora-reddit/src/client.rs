use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use tora_reconcile::{
    Lookup, PartnerLookup, QueueItem, RemovalEvent, SourceQueueStore, StoreError,
};

use crate::listing::{
    normalize_link, normalize_removal, partner_from_link, post_id_from_url, JsonEnvelope,
    Listing, RawLink, RawModAction,
};
use crate::ratelimit;

pub const DEFAULT_BASE_URL: &str = "https://oauth.reddit.com";
pub const DEFAULT_USER_AGENT: &str = concat!("tora-archivist/", env!("CARGO_PKG_VERSION"));

/// Largest page the listing endpoints hand out.
const MAX_PAGE: usize = 100;

/// Connection settings for [`RedditClient`].
#[derive(Clone)]
pub struct RedditConfig {
    pub base_url: String,
    /// Already-issued OAuth bearer token.
    pub token: String,
    pub user_agent: String,
    /// Area whose moderation queue and log we sync.
    pub subreddit: String,
    /// Area receiving links to finished transcriptions.
    pub archive_subreddit: String,
    pub timeout: Duration,
}

impl RedditConfig {
    pub fn new(
        token: impl Into<String>,
        subreddit: impl Into<String>,
        archive_subreddit: impl Into<String>,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            subreddit: subreddit.into(),
            archive_subreddit: archive_subreddit.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl fmt::Debug for RedditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("subreddit", &self.subreddit)
            .field("archive_subreddit", &self.archive_subreddit)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Moderation-queue adapter over the platform's OAuth API.
#[derive(Clone)]
pub struct RedditClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    subreddit: String,
    archive_subreddit: String,
}

impl fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditClient")
            .field("base_url", &self.base_url)
            .field("subreddit", &self.subreddit)
            .finish_non_exhaustive()
    }
}

impl RedditClient {
    pub fn new(cfg: RedditConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent)
            .timeout(cfg.timeout)
            .build()
            .context("build reddit http client failed")?;
        Ok(Self {
            http,
            base_url: cfg.base_url,
            token: cfg.token,
            subreddit: cfg.subreddit,
            archive_subreddit: cfg.archive_subreddit,
        })
    }

    pub fn subreddit(&self) -> &str {
        &self.subreddit
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .query(&[("raw_json", "1")])
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

        let header_delay = ratelimit::from_headers(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "reddit returned an error status");

        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            header_delay.or_else(|| ratelimit::parse_message(&body))
        } else {
            None
        };
        Err(StoreError::from_status(status.as_u16(), retry_after, body.trim()))
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

    /// POST a form to a `/api/...` endpoint. A RATELIMIT error in the JSON
    /// envelope is mapped to [`StoreError::RateLimited`].
    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut fields = form.to_vec();
        fields.push(("api_type", "json"));

        let resp = self
            .send(self.request(Method::POST, path).form(&fields))
            .await?;

        let text = resp.text().await.unwrap_or_default();
        let envelope: JsonEnvelope = serde_json::from_str(&text).unwrap_or_default();
        match envelope.first_error() {
            None => Ok(()),
            Some((code, message)) if code.eq_ignore_ascii_case("RATELIMIT") => {
                warn!(message = %message, "ratelimit - artificially limited by reddit");
                Err(StoreError::RateLimited {
                    retry_after: ratelimit::parse_message(&message),
                })
            }
            Some((code, message)) => Err(StoreError::Api {
                status: 200,
                message: format!("{code}: {message}"),
            }),
        }
    }

    /// Fetch a single post by its base-36 id.
    async fn post_by_id(&self, id: &str) -> Result<Lookup<RawLink>, StoreError> {
        let listing: Listing<RawLink> = self
            .get_json("api/info", &[("id", format!("t3_{id}"))])
            .await?;
        Ok(listing
            .into_data()
            .next()
            .map_or(Lookup::NotFound, Lookup::Found))
    }
}

#[async_trait]
impl SourceQueueStore for RedditClient {
    async fn removal_log(&self, limit: usize) -> Result<Vec<RemovalEvent>, StoreError> {
        let path = format!("r/{}/about/log", self.subreddit);
        let listing: Listing<RawModAction> = self
            .get_json(
                &path,
                &[
                    ("type", "removelink".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(listing
            .into_data()
            .filter_map(|raw| match normalize_removal(raw) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(error = %err, "skipping malformed mod log entry");
                    None
                }
            })
            .collect())
    }

    async fn report_queue(&self) -> Result<Vec<QueueItem>, StoreError> {
        let path = format!("r/{}/about/modqueue", self.subreddit);
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![
                ("only", "links".to_string()),
                ("limit", MAX_PAGE.to_string()),
            ];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let listing: Listing<Value> = self.get_json(&path, &query).await?;
            let next = listing.data.after.clone();
            for value in listing.into_data() {
                match serde_json::from_value::<RawLink>(value) {
                    Ok(raw) => items.push(normalize_link(raw)),
                    Err(err) => warn!(error = %err, "skipping malformed mod queue entry"),
                }
            }

            match next {
                Some(cursor) if after.as_deref() != Some(cursor.as_str()) => after = Some(cursor),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn item_by_url(&self, url: &str) -> Result<Lookup<QueueItem>, StoreError> {
        let Some(id) = post_id_from_url(url) else {
            warn!(url = %url, "no post id in queue url");
            return Ok(Lookup::NotFound);
        };
        Ok(match self.post_by_id(&id).await? {
            Lookup::Found(raw) => Lookup::Found(normalize_link(raw)),
            Lookup::NotFound => Lookup::NotFound,
        })
    }

    async fn remove(&self, item: &QueueItem) -> Result<(), StoreError> {
        self.post_form("api/remove", &[("id", item.fullname.as_str()), ("spam", "false")])
            .await?;
        info!(url = %item.url, "removed submission from reddit");
        Ok(())
    }

    /// Approve and stop further reports from resurfacing the item.
    async fn approve(&self, item: &QueueItem) -> Result<(), StoreError> {
        self.post_form("api/approve", &[("id", item.fullname.as_str())])
            .await?;
        self.post_form("api/ignore_reports", &[("id", item.fullname.as_str())])
            .await?;
        info!(url = %item.url, "approved submission on reddit");
        Ok(())
    }

    async fn mark_nsfw(&self, item: &QueueItem) -> Result<(), StoreError> {
        self.post_form("api/marknsfw", &[("id", item.fullname.as_str())])
            .await?;
        info!(url = %item.url, "submission marked as NSFW on reddit");
        Ok(())
    }

    async fn resolve_partner(&self, item: &QueueItem) -> Result<PartnerLookup, StoreError> {
        let id = post_id_from_url(&item.url)
            .ok_or_else(|| StoreError::Decode(format!("no post id in partner url {}", item.url)))?;

        let path = format!("comments/{id}");
        let resp = self
            .send(
                self.request(Method::GET, &path)
                    .query(&[("limit", "1")]),
            )
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(StoreError::Api { status: 403, .. }) => return Ok(PartnerLookup::Forbidden),
            Err(err) => return Err(err),
        };

        // `[post listing, comment listing]`
        let (post, _comments): (Listing<RawLink>, Value) = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
        let raw = post
            .into_data()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("{path}: empty post listing")))?;
        Ok(PartnerLookup::Found(partner_from_link(raw)))
    }

    async fn submit_archive_link(&self, title: &str, url: &str) -> Result<(), StoreError> {
        self.post_form(
            "api/submit",
            &[
                ("sr", self.archive_subreddit.as_str()),
                ("kind", "link"),
                ("title", title),
                ("url", url),
                ("resubmit", "true"),
            ],
        )
        .await
    }
}
