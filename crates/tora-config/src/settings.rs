use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;
use tora_reconcile::SyncSettings;

/// Moderation area used instead of the live one in debug mode.
pub const DEFAULT_DEBUG_SUBREDDIT: &str = "ModsOfToR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditSettings {
    pub base_url: String,
    pub user_agent: Option<String>,
    pub subreddit: String,
    pub debug_subreddit: String,
    pub archive_subreddit: String,
    pub timeout: Duration,
}

impl RedditSettings {
    /// Area to sync: the debug area when `debug` is set.
    pub fn effective_subreddit(&self, debug: bool) -> &str {
        if debug {
            &self.debug_subreddit
        } else {
            &self.subreddit
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlossomSettings {
    pub base_url: String,
    /// Volunteer whose transcriptions never count as the human one.
    pub ocr_bot_username: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub cycle_interval: Duration,
    /// How often the loop wakes up to check the deadline and shutdown flag.
    pub idle_poll: Duration,
    pub transient_backoff: Duration,
    /// Archival steps run on every n-th cycle; report syncing runs every cycle.
    pub archive_every_n_cycles: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(30 * 60),
            idle_poll: Duration::from_secs(5),
            transient_backoff: Duration::from_secs(60),
            archive_every_n_cycles: 1,
        }
    }
}

/// Per-step switches plus the two run modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureToggles {
    pub archive_completed: bool,
    pub archive_expired: bool,
    pub track_removals: bool,
    pub track_reports: bool,
    pub full_sweep: bool,
    /// Run cycles back to back instead of waiting for the interval.
    pub clear_the_queue: bool,
    /// Do nothing but log a heartbeat.
    pub noop: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            archive_completed: true,
            archive_expired: true,
            track_removals: true,
            track_reports: true,
            full_sweep: true,
            clear_the_queue: false,
            noop: false,
        }
    }
}

/// Typed view of the merged config. Missing keys take defaults; present keys
/// of the wrong type are an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivistSettings {
    pub reddit: RedditSettings,
    pub blossom: BlossomSettings,
    pub sync: SyncSettings,
    pub schedule: ScheduleSettings,
    pub features: FeatureToggles,
}

impl ArchivistSettings {
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let sync_defaults = SyncSettings::default();
        let schedule_defaults = ScheduleSettings::default();
        let feature_defaults = FeatureToggles::default();

        let reddit = RedditSettings {
            base_url: str_at(config, "/reddit/base_url")?
                .unwrap_or_else(|| "https://oauth.reddit.com".to_string()),
            user_agent: str_at(config, "/reddit/user_agent")?,
            subreddit: str_at(config, "/reddit/subreddit")?
                .unwrap_or_else(|| "TranscribersOfReddit".to_string()),
            debug_subreddit: str_at(config, "/reddit/debug_subreddit")?
                .unwrap_or_else(|| DEFAULT_DEBUG_SUBREDDIT.to_string()),
            archive_subreddit: str_at(config, "/reddit/archive_subreddit")?
                .unwrap_or_else(|| "ToR_Archive".to_string()),
            timeout: Duration::from_secs(u64_at(config, "/reddit/timeout_secs", 30)?),
        };

        let blossom = BlossomSettings {
            base_url: str_at(config, "/blossom/base_url")?
                .unwrap_or_else(|| "https://grafeas.org/api/".to_string()),
            ocr_bot_username: str_at(config, "/blossom/ocr_bot_username")?
                .unwrap_or_else(|| "transcribot".to_string()),
            timeout: Duration::from_secs(u64_at(config, "/blossom/timeout_secs", 30)?),
        };

        let sweep_window_hours = u64_at(
            config,
            "/sync/sweep_window_hours",
            sync_defaults.sweep_window.num_hours() as u64,
        )?;
        let sweep_page_size = u64_at(
            config,
            "/sync/sweep_page_size",
            u64::from(sync_defaults.sweep_page_size),
        )?;
        if sweep_page_size == 0 || sweep_page_size > u64::from(u32::MAX) {
            bail!("CONFIG_INVALID /sync/sweep_page_size: must be between 1 and {}", u32::MAX);
        }
        let sync = SyncSettings {
            service_accounts: str_list_at(config, "/sync/service_accounts")?
                .unwrap_or(sync_defaults.service_accounts),
            removal_log_limit: u64_at(
                config,
                "/sync/removal_log_limit",
                sync_defaults.removal_log_limit as u64,
            )? as usize,
            sweep_window: chrono::Duration::hours(sweep_window_hours as i64),
            sweep_page_size: sweep_page_size as u32,
            sweep_pacing: Duration::from_millis(u64_at(
                config,
                "/sync/sweep_pacing_ms",
                sync_defaults.sweep_pacing.as_millis() as u64,
            )?),
        };

        let archive_every_n_cycles = u64_at(
            config,
            "/schedule/archive_every_n_cycles",
            u64::from(schedule_defaults.archive_every_n_cycles),
        )?;
        if archive_every_n_cycles == 0 || archive_every_n_cycles > u64::from(u32::MAX) {
            bail!("CONFIG_INVALID /schedule/archive_every_n_cycles: must be at least 1");
        }
        let schedule = ScheduleSettings {
            cycle_interval: Duration::from_secs(u64_at(
                config,
                "/schedule/cycle_interval_secs",
                schedule_defaults.cycle_interval.as_secs(),
            )?),
            idle_poll: Duration::from_secs(u64_at(
                config,
                "/schedule/idle_poll_secs",
                schedule_defaults.idle_poll.as_secs(),
            )?),
            transient_backoff: Duration::from_secs(u64_at(
                config,
                "/schedule/transient_backoff_secs",
                schedule_defaults.transient_backoff.as_secs(),
            )?),
            archive_every_n_cycles: archive_every_n_cycles as u32,
        };

        let features = FeatureToggles {
            archive_completed: bool_at(
                config,
                "/features/archive_completed",
                feature_defaults.archive_completed,
            )?,
            archive_expired: bool_at(
                config,
                "/features/archive_expired",
                feature_defaults.archive_expired,
            )?,
            track_removals: bool_at(
                config,
                "/features/track_removals",
                feature_defaults.track_removals,
            )?,
            track_reports: bool_at(
                config,
                "/features/track_reports",
                feature_defaults.track_reports,
            )?,
            full_sweep: bool_at(config, "/features/full_sweep", feature_defaults.full_sweep)?,
            clear_the_queue: bool_at(
                config,
                "/features/clear_the_queue",
                feature_defaults.clear_the_queue,
            )?,
            noop: bool_at(config, "/features/noop", feature_defaults.noop)?,
        };

        Ok(Self {
            reddit,
            blossom,
            sync,
            schedule,
            features,
        })
    }
}

fn str_at(config: &Value, pointer: &str) -> Result<Option<String>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => bail!("CONFIG_INVALID {pointer}: expected string, got {other}"),
    }
}

fn u64_at(config: &Value, pointer: &str, default: u64) -> Result<u64> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => match v.as_u64() {
            Some(n) => Ok(n),
            None => bail!("CONFIG_INVALID {pointer}: expected non-negative integer, got {v}"),
        },
    }
}

fn bool_at(config: &Value, pointer: &str, default: bool) -> Result<bool> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => bail!("CONFIG_INVALID {pointer}: expected bool, got {other}"),
    }
}

fn str_list_at(config: &Value, pointer: &str) -> Result<Option<Vec<String>>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item.as_str() {
                Some(s) => Ok(s.trim().to_string()),
                None => bail!("CONFIG_INVALID {pointer}: expected list of strings, got {item}"),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        Some(other) => bail!("CONFIG_INVALID {pointer}: expected list of strings, got {other}"),
    }
}
