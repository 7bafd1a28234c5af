//! Wiring from typed settings to a running engine.
//!
//! Shared by the daemon binary and the operator CLI.

use anyhow::{bail, Context};
use tracing::info;

use tora_blossom::{BlossomClient, BlossomConfig};
use tora_config::secrets::ResolvedSecrets;
use tora_config::ArchivistSettings;
use tora_reconcile::{Lookup, ReconcileEngine, RemoteSubmissionStore, VolunteerId};
use tora_reddit::{RedditClient, RedditConfig};

pub type LiveEngine = ReconcileEngine<BlossomClient, RedditClient>;

/// Build both HTTP clients and the engine over them.
///
/// With `allow_missing` set (noop mode) empty credentials are accepted,
/// since nothing calls out.
pub fn build_engine(
    settings: &ArchivistSettings,
    secrets: &ResolvedSecrets,
    subreddit: &str,
    allow_missing: bool,
) -> anyhow::Result<LiveEngine> {
    let api_key = secrets.blossom_api_key.clone().unwrap_or_default();
    let token = secrets.reddit_token.clone().unwrap_or_default();
    if !allow_missing && (api_key.is_empty() || token.is_empty()) {
        bail!("SECRETS_MISSING: store credentials resolved empty");
    }

    let mut blossom_cfg = BlossomConfig::new(api_key).with_base_url(&settings.blossom.base_url);
    blossom_cfg.timeout = settings.blossom.timeout;
    if let Some(bearer) = &secrets.blossom_token {
        blossom_cfg = blossom_cfg.with_token(bearer);
    }
    let blossom = BlossomClient::new(blossom_cfg).context("build blossom client")?;

    let mut reddit_cfg = RedditConfig::new(token, subreddit, &settings.reddit.archive_subreddit)
        .with_base_url(&settings.reddit.base_url);
    reddit_cfg.timeout = settings.reddit.timeout;
    if let Some(ua) = &settings.reddit.user_agent {
        reddit_cfg.user_agent = ua.clone();
    }
    let reddit = RedditClient::new(reddit_cfg).context("build reddit client")?;

    Ok(ReconcileEngine::new(blossom, reddit, settings.sync.clone()))
}

/// Volunteer id of the OCR bot, whose transcriptions completed archival
/// must skip. A missing account is fatal.
pub async fn resolve_ocr_bot(
    remote: &impl RemoteSubmissionStore,
    username: &str,
) -> anyhow::Result<Option<VolunteerId>> {
    match remote.volunteer_id(username).await {
        Ok(Lookup::Found(id)) => {
            info!(username, volunteer_id = %id, "resolved OCR bot account");
            Ok(Some(id))
        }
        Ok(Lookup::NotFound) => bail!("OCR bot account {username:?} not found in Blossom"),
        Err(err) => Err(anyhow::Error::new(err)).context("look up OCR bot account"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tora_reconcile::StoreError;
    use tora_testkit::{MemoryBlossom, RemoteOp};

    #[tokio::test]
    async fn ocr_bot_is_resolved_by_username() {
        let blossom = MemoryBlossom::new();
        blossom.add_volunteer("transcribot", VolunteerId(3));
        let id = resolve_ocr_bot(&blossom, "transcribot").await.unwrap();
        assert_eq!(id, Some(VolunteerId(3)));
    }

    #[tokio::test]
    async fn missing_ocr_bot_is_fatal() {
        let blossom = MemoryBlossom::new();
        let err = resolve_ocr_bot(&blossom, "transcribot").await.unwrap_err();
        assert!(err.to_string().contains("transcribot"), "{err}");

        blossom.fail_once(RemoteOp::VolunteerId, StoreError::Transport("down".into()));
        assert!(resolve_ocr_bot(&blossom, "transcribot").await.is_err());
    }

    #[test]
    fn empty_credentials_are_rejected_outside_noop() {
        let settings =
            ArchivistSettings::from_config_json(&serde_json::json!({})).unwrap();
        let secrets = ResolvedSecrets {
            reddit_token: None,
            blossom_api_key: None,
            blossom_token: None,
        };
        let err = build_engine(&settings, &secrets, "ModsOfToR", false)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("SECRETS_MISSING"), "{err}");
        assert!(build_engine(&settings, &secrets, "ModsOfToR", true).is_ok());
    }
}
