//! tora-config
//!
//! Layered YAML configuration for the archivist.
//!
//! Layers are deep-merged in order (later wins), checked for secret-looking
//! literals, rendered to canonical JSON and hashed. The hash is logged at
//! startup so two runs can be compared by config identity.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;

pub mod secrets;
mod settings;

pub use settings::{
    ArchivistSettings, BlossomSettings, FeatureToggles, RedditSettings, ScheduleSettings,
    DEFAULT_DEBUG_SUBREDDIT,
};

/// A string leaf starting with one of these aborts loading with
/// CONFIG_SECRET_DETECTED. Config names env vars; it never holds credentials.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "Bearer ",
    "bearer ",
    "-----BEGIN",
    "ghp_",
    "AKIA",
];

/// Shorter strings are never treated as credentials.
const MIN_SECRET_LEN: usize = 8;

/// JSON-pointer prefixes the binaries actually read.
///
/// A leaf under any of these is consumed; everything else is reported by
/// [`report_unused_keys`]. Keep this in step with `ArchivistSettings` and
/// `secrets::resolve_secrets`.
pub const CONSUMED_POINTERS: &[&str] = &[
    // RedditSettings
    "/reddit/base_url",
    "/reddit/user_agent",
    "/reddit/subreddit",
    "/reddit/debug_subreddit",
    "/reddit/archive_subreddit",
    "/reddit/timeout_secs",
    // BlossomSettings
    "/blossom/base_url",
    "/blossom/ocr_bot_username",
    "/blossom/timeout_secs",
    // tora_reconcile::SyncSettings
    "/sync/service_accounts",
    "/sync/removal_log_limit",
    "/sync/sweep_window_hours",
    "/sync/sweep_page_size",
    "/sync/sweep_pacing_ms",
    // ScheduleSettings
    "/schedule/cycle_interval_secs",
    "/schedule/idle_poll_secs",
    "/schedule/transient_backoff_secs",
    "/schedule/archive_every_n_cycles",
    // FeatureToggles
    "/features",
    // secrets::resolve_secrets
    "/reddit/keys_env/token",
    "/blossom/keys_env/api_key",
    "/blossom/keys_env/token",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Sorted, deduplicated registry the report was computed against.
    pub consumed_prefixes: Vec<String>,
    /// Sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Report config leaves nothing reads. Under `Fail` a non-empty report is
/// an error (CONFIG_UNUSED_KEYS).
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut consumed_prefixes: Vec<String> = CONSUMED_POINTERS
        .iter()
        .map(|p| p.trim().trim_end_matches('/').to_string())
        .map(|p| if p.starts_with('/') { p } else { format!("/{p}") })
        .collect();
    consumed_prefixes.sort();
    consumed_prefixes.dedup();

    let mut unused: Vec<String> = leaves(config_json)
        .into_iter()
        .map(|(pointer, _)| pointer)
        .filter(|leaf| !consumed_prefixes.iter().any(|c| consumes(c, leaf)))
        .collect();
    unused.sort();
    unused.dedup();

    if policy == UnusedKeyPolicy::Fail && !unused.is_empty() {
        let shown: Vec<&str> = unused.iter().take(12).map(String::as_str).collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} config key(s) are not read by anything: {}",
            unused.len(),
            shown.join(", ")
        );
    }

    Ok(UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    })
}

/// `/a/b` consumes `/a/b` and `/a/b/c`, never `/a/bc`. The bare root
/// (normalized to an empty prefix) consumes everything.
fn consumes(prefix: &str, leaf: &str) -> bool {
    match leaf.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Every scalar leaf with its JSON pointer, in map order.
fn leaves(root: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];
    while let Some((pointer, value)) = stack.pop() {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter().rev() {
                    let token = key.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{pointer}/{token}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate().rev() {
                    stack.push((format!("{pointer}/{i}"), child));
                }
            }
            scalar => {
                let pointer = if pointer.is_empty() { "/".to_string() } else { pointer };
                out.push((pointer, scalar));
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

/// Read and merge YAML layers from disk, first path lowest precedence.
pub fn load_layered_yaml<P: AsRef<str>>(paths: &[P]) -> Result<LoadedConfig> {
    let layers = paths
        .iter()
        .map(|p| {
            let path = p.as_ref();
            fs::read_to_string(path).with_context(|| format!("read config layer {path}"))
        })
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = layers.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (i, doc) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(doc).with_context(|| format!("config layer {i} is not valid yaml"))?;
        // An empty layer parses as null.
        if layer.is_null() {
            continue;
        }
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("config layer {i} has no json representation"))?;
        merge_into(&mut merged, layer);
    }

    reject_secret_literals(&merged)?;

    // serde_json's default map is key-sorted, so compact output is canonical.
    let canonical_json = serde_json::to_string(&merged).context("serialize merged config")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other value replaces what was there.
fn merge_into(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn reject_secret_literals(config: &Value) -> Result<()> {
    for (pointer, value) in leaves(config) {
        if value.as_str().is_some_and(looks_like_secret) {
            bail!("CONFIG_SECRET_DETECTED leaf={pointer} value=REDACTED");
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let s = s.trim();
    s.len() >= MIN_SECRET_LEN && SECRET_PREFIXES.iter().any(|p| s.starts_with(p))
}
