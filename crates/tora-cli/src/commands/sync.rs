//! One-shot engine passes.

use anyhow::{Context, Result};

use tora_config::secrets::resolve_secrets;
use tora_daemon::bootstrap::{build_engine, resolve_ocr_bot, LiveEngine};
use tora_reconcile::{archive_completed, process_expired, PassSummary, SyncError};

use super::{load_settings, ArchivePass, SyncPass};

fn engine(config_paths: &[String], debug: bool) -> Result<(LiveEngine, String)> {
    let loaded = load_settings(config_paths)?;
    let secrets = resolve_secrets(&loaded.config_json, true)?;
    let subreddit = loaded.settings.reddit.effective_subreddit(debug).to_string();
    tracing::info!(
        config_hash = %loaded.config_hash,
        subreddit = %subreddit,
        "running one-shot pass"
    );
    let engine = build_engine(&loaded.settings, &secrets, &subreddit, false)?;
    Ok((engine, loaded.settings.blossom.ocr_bot_username))
}

pub async fn run(pass: SyncPass, config_paths: &[String], debug: bool) -> Result<()> {
    let (engine, _) = engine(config_paths, debug)?;

    let steps: &[SyncPass] = match pass {
        SyncPass::All => &[SyncPass::Removals, SyncPass::Reports, SyncPass::Sweep],
        _ => std::slice::from_ref(&pass),
    };

    for step in steps {
        let result = match step {
            SyncPass::Removals => engine.track_removals().await,
            SyncPass::Reports => engine.track_reports().await,
            SyncPass::Sweep => engine.full_sweep().await,
            SyncPass::All => continue,
        };
        emit(result)?;
    }
    Ok(())
}

pub async fn archive(pass: ArchivePass, config_paths: &[String], debug: bool) -> Result<()> {
    let (engine, ocr_bot_username) = engine(config_paths, debug)?;

    let result = match pass {
        ArchivePass::Expired => process_expired(&engine).await,
        ArchivePass::Completed => {
            let ocr_bot = resolve_ocr_bot(engine.remote(), &ocr_bot_username).await?;
            archive_completed(&engine, ocr_bot).await
        }
    };
    emit(result)
}

/// Print a pass summary as one JSON line; a failed pass prints its error
/// line and fails the command.
fn emit(result: Result<PassSummary, SyncError>) -> Result<()> {
    match result {
        Ok(summary) => {
            let line = serde_json::to_string(&summary).context("encode summary")?;
            println!("{line}");
            Ok(())
        }
        Err(err) => {
            let line = serde_json::json!({ "error": err.to_string() });
            println!("{line}");
            Err(anyhow::Error::new(err)).context("pass failed")
        }
    }
}
