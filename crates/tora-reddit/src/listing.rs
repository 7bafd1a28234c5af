//! Listing payloads of the moderation platform and their normalization.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tora_reconcile::{PartnerPost, QueueItem, RemovalEvent, Report, StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData<T> {
    #[serde(default)]
    pub after: Option<String>,
    pub children: Vec<Thing<T>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: T,
}

impl<T> Listing<T> {
    pub fn into_data(self) -> impl Iterator<Item = T> {
        self.data.children.into_iter().map(|t| t.data)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawModAction {
    #[serde(rename = "mod")]
    pub moderator: String,
    #[serde(default)]
    pub target_permalink: Option<String>,
    pub created_utc: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLink {
    pub name: String,
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub ignore_reports: bool,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub approved_at_utc: Option<f64>,
    #[serde(default)]
    pub over_18: bool,
    /// `[[reason, moderator], ...]`
    #[serde(default)]
    pub mod_reports: Vec<Vec<Value>>,
    /// `[[reason, count, snoozed, can_snooze], ...]`
    #[serde(default)]
    pub user_reports: Vec<Vec<Value>>,
    #[serde(default)]
    pub removed_by_category: Option<String>,
}

/// `{"json": {"errors": [[code, message, field], ...]}}` from form endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonEnvelope {
    #[serde(default)]
    pub json: JsonErrors,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonErrors {
    #[serde(default)]
    pub errors: Vec<Vec<Value>>,
}

impl JsonEnvelope {
    /// First `(code, message)` pair, if the call was refused.
    pub fn first_error(&self) -> Option<(String, String)> {
        self.json.errors.first().map(|e| {
            let field = |i: usize| e.get(i).and_then(Value::as_str).unwrap_or("").to_string();
            (field(0), field(1))
        })
    }
}

pub fn normalize_removal(raw: RawModAction) -> Result<RemovalEvent, StoreError> {
    let target_permalink = raw
        .target_permalink
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| StoreError::Decode("mod action has no target permalink".into()))?;
    Ok(RemovalEvent {
        moderator: raw.moderator,
        target_permalink,
        created_utc: epoch(raw.created_utc)?,
    })
}

pub fn normalize_link(raw: RawLink) -> QueueItem {
    QueueItem {
        fullname: raw.name,
        permalink: raw.permalink,
        url: raw.url,
        title: raw.title,
        removed: raw.removed,
        ignore_reports: raw.ignore_reports,
        approved: raw.approved || raw.approved_at_utc.is_some(),
        nsfw: raw.over_18,
        mod_reports: reports(&raw.mod_reports),
        user_reports: reports(&raw.user_reports),
        removed_by_category: raw.removed_by_category,
    }
}

pub fn partner_from_link(raw: RawLink) -> PartnerPost {
    PartnerPost {
        url: raw.url,
        over_18: raw.over_18,
        removed_by_category: raw.removed_by_category,
    }
}

/// Entries whose reason is missing or null are dropped.
fn reports(raw: &[Vec<Value>]) -> Vec<Report> {
    raw.iter()
        .filter_map(|entry| {
            let reason = entry.first()?.as_str()?;
            let reporter = match entry.get(1) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            Some(Report::new(reason, reporter))
        })
        .collect()
}

fn epoch(secs: f64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .ok_or_else(|| StoreError::Decode(format!("timestamp out of range: {secs}")))
}

/// Base-36 post id from a post URL (`.../comments/<id>/...` or `redd.it/<id>`).
pub fn post_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let mut segs = path.split('/').filter(|s| !s.is_empty());

    let id = if path.contains("redd.it/") {
        segs.last()
    } else {
        segs.skip_while(|s| *s != "comments").nth(1)
    }?;

    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| id.to_ascii_lowercase())
}
