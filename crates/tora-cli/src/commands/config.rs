use anyhow::Result;

use tora_config::secrets::SecretEnvNames;
use tora_config::{ArchivistSettings, UnusedKeyPolicy};

pub fn hash(paths: &[String]) -> Result<()> {
    let loaded = tora_config::load_layered_yaml(paths)?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

/// Validate the layers without contacting any remote. Secret env vars are
/// reported as set or unset, never printed.
pub fn check(paths: &[String], strict: bool) -> Result<()> {
    let loaded = tora_config::load_layered_yaml(paths)?;
    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = tora_config::report_unused_keys(&loaded.config_json, policy)?;
    let settings = ArchivistSettings::from_config_json(&loaded.config_json)?;

    println!("config_hash={}", loaded.config_hash);
    println!("subreddit={}", settings.reddit.subreddit);
    println!("archive_subreddit={}", settings.reddit.archive_subreddit);
    println!("unused_keys={}", report.unused_leaf_pointers.len());
    for pointer in &report.unused_leaf_pointers {
        println!("unused={pointer}");
    }

    let names = SecretEnvNames::from_config_json(&loaded.config_json);
    for (what, var) in [
        ("reddit_token", &names.reddit_token),
        ("blossom_api_key", &names.blossom_api_key),
        ("blossom_token", &names.blossom_token),
    ] {
        let set = std::env::var(var).is_ok_and(|v| !v.trim().is_empty());
        println!("secret {what} env={var} set={set}");
    }
    Ok(())
}
