//! Command handler modules for tora-cli.
//!
//! Shared loading helpers live here; command logic lives in the submodules.

pub mod config;
pub mod sync;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::Value;

use tora_config::{ArchivistSettings, UnusedKeyPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SyncPass {
    Removals,
    Reports,
    Sweep,
    /// removals, then reports, then sweep
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ArchivePass {
    Expired,
    Completed,
}

/// Merged config plus its typed view.
pub struct LoadedSettings {
    pub config_json: Value,
    pub config_hash: String,
    pub settings: ArchivistSettings,
}

/// Load layers, warn about unused keys, and build typed settings.
pub fn load_settings(paths: &[String]) -> Result<LoadedSettings> {
    let loaded = tora_config::load_layered_yaml(paths).context("load config")?;
    let report = tora_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &report.unused_leaf_pointers {
        tracing::warn!(pointer = %pointer, "config key is not used");
    }
    let settings = ArchivistSettings::from_config_json(&loaded.config_json)?;
    Ok(LoadedSettings {
        config_json: loaded.config_json,
        config_hash: loaded.config_hash,
        settings,
    })
}
