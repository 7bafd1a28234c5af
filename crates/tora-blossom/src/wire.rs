//! Wire-level payloads of the tracking service and their normalization.
//!
//! Raw structs mirror the JSON the service returns; unknown fields are
//! ignored. `normalize_*` turns them into the typed model and is the only
//! place a malformed record is detected.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tora_reconcile::{StoreError, Submission, SubmissionId, Transcription, VolunteerId};

#[derive(Debug, Clone, Deserialize)]
pub struct RawSubmission {
    pub id: i64,
    #[serde(default)]
    pub tor_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub original_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub removed_from_queue: Option<bool>,
    // Not exposed by every deployment of the API yet.
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub report_reason: Option<String>,
    #[serde(default)]
    pub nsfw: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
}

/// Paginated listing envelope: `{ "results": [...], "next": <url|null> }`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawListing<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Some endpoints answer with a bare array, others with a listing envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawList<T> {
    Listing(RawListing<T>),
    Bare(Vec<T>),
}

impl<T> RawList<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            RawList::Listing(l) => l.results,
            RawList::Bare(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTranscription {
    pub id: i64,
    /// Either a volunteer id or a hyperlinked volunteer URL.
    #[serde(default)]
    pub author: Value,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVolunteer {
    pub id: i64,
}

pub fn normalize_submission(raw: RawSubmission) -> Result<Submission, StoreError> {
    let tor_url = raw
        .tor_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| StoreError::Decode(format!("submission {} has no tor_url", raw.id)))?;

    Ok(Submission {
        id: SubmissionId(raw.id),
        tor_url,
        url: raw.url,
        original_id: raw.original_id,
        title: raw.title,
        removed_from_queue: raw.removed_from_queue.unwrap_or(false),
        approved: raw.approved.unwrap_or(false),
        report_reason: raw.report_reason,
        nsfw: raw.nsfw.unwrap_or(false),
        archived: raw.archived.unwrap_or(false),
        create_time: raw.create_time,
    })
}

pub fn normalize_transcription(raw: RawTranscription) -> Transcription {
    Transcription {
        id: raw.id,
        author_id: author_id(&raw.author),
        url: raw.url,
    }
}

/// Volunteer id from either a bare integer or a URL ending in `/<id>/`.
pub fn author_id(author: &Value) -> Option<VolunteerId> {
    match author {
        Value::Number(n) => n.as_i64().map(VolunteerId),
        Value::String(s) => id_from_url(s).map(VolunteerId),
        _ => None,
    }
}

/// Last non-empty path segment of `url`, parsed as an integer.
pub fn id_from_url(url: &str) -> Option<i64> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .last()
        .and_then(|seg| seg.parse().ok())
}
