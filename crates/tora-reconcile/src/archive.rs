//! Archival passes.
//!
//! Expired submissions (claim window ran out) and completed submissions are
//! pulled from the moderation queue and marked archived on the tracking
//! service. Completed ones additionally get a link to their human
//! transcription posted into the archive area.

use tracing::{info, warn};

use crate::{
    Lookup, PassKind, PassSummary, ReconcileEngine, RemoteSubmissionStore, SourceQueueStore,
    Submission, SyncError, VolunteerId, REDDIT_BASE_URL,
};

/// Absolute link for a transcription URL; relative permalinks get the
/// reddit host prepended.
pub fn transcription_link(url: &str) -> String {
    if url.contains("reddit.com") {
        url.to_string()
    } else {
        format!("{REDDIT_BASE_URL}{url}")
    }
}

/// Remove expired submissions from the queue and archive them.
pub async fn process_expired<R, Q>(
    engine: &ReconcileEngine<R, Q>,
) -> Result<PassSummary, SyncError>
where
    R: RemoteSubmissionStore,
    Q: SourceQueueStore,
{
    let pass = PassKind::ExpiredArchival;
    let mut summary = PassSummary::new(pass);

    let submissions = engine
        .remote()
        .expired_submissions()
        .await
        .map_err(|source| SyncError::Enumeration { pass, source })?;

    for submission in submissions {
        if engine.should_stop() {
            summary.interrupted = true;
            break;
        }
        summary.examined += 1;

        if !remove_from_queue(engine, &submission, &mut summary).await?.0 {
            continue;
        }

        let result = engine.remote().mark_archived(submission.id).await;
        if engine.settle("archive", &submission, result, &mut summary)? {
            info!(
                submission_id = %submission.id,
                original_id = submission.original_id.as_deref().unwrap_or("-"),
                "archived expired submission"
            );
        }
    }

    Ok(summary)
}

/// Archive completed submissions and post their transcription to the
/// archive area. Transcriptions by `exclude_author` (the OCR bot) are
/// ignored when picking the link target.
pub async fn archive_completed<R, Q>(
    engine: &ReconcileEngine<R, Q>,
    exclude_author: Option<VolunteerId>,
) -> Result<PassSummary, SyncError>
where
    R: RemoteSubmissionStore,
    Q: SourceQueueStore,
{
    let pass = PassKind::CompletedArchival;
    let mut summary = PassSummary::new(pass);

    let submissions = engine
        .remote()
        .unarchived_submissions()
        .await
        .map_err(|source| SyncError::Enumeration { pass, source })?;

    for submission in submissions {
        if engine.should_stop() {
            summary.interrupted = true;
            break;
        }
        summary.examined += 1;

        let (proceed, queue_title) = remove_from_queue(engine, &submission, &mut summary).await?;
        if !proceed {
            continue;
        }

        let result = engine.remote().mark_archived(submission.id).await;
        engine.settle("archive", &submission, result, &mut summary)?;

        let transcription = match engine
            .remote()
            .human_transcription(submission.id, exclude_author)
            .await
        {
            Ok(Lookup::Found(t)) => t,
            Ok(Lookup::NotFound) => {
                // Nothing to link to, so nothing goes into the archive area.
                warn!(
                    submission_id = %submission.id,
                    "completed submission has no valid transcriptions"
                );
                summary.not_found += 1;
                continue;
            }
            Err(err) => {
                engine.lookup_failed(&submission.tor_url, err, &mut summary)?;
                continue;
            }
        };

        let Some(url) = transcription.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            warn!(
                transcription_id = transcription.id,
                "transcription does not have a URL; skipping"
            );
            summary.skipped += 1;
            continue;
        };

        let Some(title) = queue_title.or_else(|| submission.title.clone()) else {
            warn!(submission_id = %submission.id, "no title to archive under; skipping");
            summary.skipped += 1;
            continue;
        };

        let link = transcription_link(url);
        let result = engine.queue().submit_archive_link(&title, &link).await;
        if engine.settle("archive_link", &submission, result, &mut summary)? {
            info!(
                submission_id = %submission.id,
                original_id = submission.original_id.as_deref().unwrap_or("-"),
                "submission archived"
            );
        }
    }

    Ok(summary)
}

/// Remove the queue item behind `submission`.
///
/// Returns whether archiving should proceed, plus the queue item's title.
/// A queue item that no longer exists does not block archiving; a failed
/// lookup does, so the submission is retried next cycle.
async fn remove_from_queue<R, Q>(
    engine: &ReconcileEngine<R, Q>,
    submission: &Submission,
    summary: &mut PassSummary,
) -> Result<(bool, Option<String>), SyncError>
where
    R: RemoteSubmissionStore,
    Q: SourceQueueStore,
{
    match engine.queue().item_by_url(&submission.tor_url).await {
        Ok(Lookup::Found(item)) => {
            if !item.is_removed() {
                let result = engine.queue().remove(&item).await;
                engine.settle("remove_queue", submission, result, summary)?;
            }
            Ok((true, Some(item.title)))
        }
        Ok(Lookup::NotFound) => {
            warn!(
                submission_id = %submission.id,
                tor_url = %submission.tor_url,
                "queue item is gone; archiving anyway"
            );
            summary.not_found += 1;
            Ok((true, None))
        }
        Err(err) => {
            engine.lookup_failed(&submission.tor_url, err, summary)?;
            Ok((false, None))
        }
    }
}
