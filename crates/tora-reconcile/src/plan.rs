//! Auto-resolution planner.
//!
//! Given a queue item, its tracking-side twin, the partner-post lookup and
//! the filed report reason, decide which writes bring both sides in line and
//! whether that settles the report. Pure and deterministic: no IO, no clock.
//!
//! Evaluation order:
//!
//! ```text
//! Forbidden partner        -> remove both sides            (handled)
//! partner over_18          -> nsfw on each side not yet flagged
//! partner removed          -> remove on each side not yet removed (handled)
//! else queue item removed  -> remove on tracking side if needed   (handled)
//! else NSFW-sentinel reason-> approve both sides                  (handled)
//! otherwise                -> not handled, caller files the report
//! ```

use serde::{Deserialize, Serialize};

use crate::{PartnerLookup, QueueItem, Submission, NSFW_REPORT_REASON};

/// A single write the engine issues while executing a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    NsfwQueue,
    NsfwRemote,
    RemoveQueue,
    RemoveRemote,
    ApproveQueue,
    ApproveRemote,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::NsfwQueue => "nsfw_queue",
            SyncAction::NsfwRemote => "nsfw_remote",
            SyncAction::RemoveQueue => "remove_queue",
            SyncAction::RemoveRemote => "remove_remote",
            SyncAction::ApproveQueue => "approve_queue",
            SyncAction::ApproveRemote => "approve_remote",
        }
    }
}

/// Why a report counts as handled without a report write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandledBy {
    /// The partner's area is private; the item cannot be validated.
    ForbiddenPartner,
    PartnerRemoved,
    /// A moderator removed the queue item directly.
    QueueRemoved,
    /// NSFW report on a post whose flags already agree.
    NsfwApproved,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    /// Writes to issue, in order.
    pub actions: Vec<SyncAction>,
    pub handled_by: Option<HandledBy>,
}

impl ResolutionPlan {
    pub(crate) fn not_handled(actions: Vec<SyncAction>) -> Self {
        Self {
            actions,
            handled_by: None,
        }
    }

    pub fn is_handled(&self) -> bool {
        self.handled_by.is_some()
    }

    pub fn contains(&self, action: SyncAction) -> bool {
        self.actions.contains(&action)
    }
}

/// Plan the auto-resolution of one queue item.
///
/// `reason` is the filed report reason; full sweeps pass `None`.
pub fn plan_auto_resolution(
    item: &QueueItem,
    submission: &Submission,
    partner: &PartnerLookup,
    reason: Option<&str>,
) -> ResolutionPlan {
    let partner = match partner {
        PartnerLookup::Forbidden => {
            return ResolutionPlan {
                actions: vec![SyncAction::RemoveQueue, SyncAction::RemoveRemote],
                handled_by: Some(HandledBy::ForbiddenPartner),
            };
        }
        PartnerLookup::Found(p) => p,
    };

    let mut actions = Vec::new();

    if partner.over_18 {
        if !item.nsfw {
            actions.push(SyncAction::NsfwQueue);
        }
        if !submission.nsfw {
            actions.push(SyncAction::NsfwRemote);
        }
    }

    if partner.is_removed() {
        if !item.is_removed() {
            actions.push(SyncAction::RemoveQueue);
        }
        if !submission.removed_from_queue {
            actions.push(SyncAction::RemoveRemote);
        }
        return ResolutionPlan {
            actions,
            handled_by: Some(HandledBy::PartnerRemoved),
        };
    }

    if item.is_removed() {
        if !submission.removed_from_queue {
            actions.push(SyncAction::RemoveRemote);
        }
        return ResolutionPlan {
            actions,
            handled_by: Some(HandledBy::QueueRemoved),
        };
    }

    if reason == Some(NSFW_REPORT_REASON) {
        actions.push(SyncAction::ApproveQueue);
        actions.push(SyncAction::ApproveRemote);
        return ResolutionPlan {
            actions,
            handled_by: Some(HandledBy::NsfwApproved),
        };
    }

    ResolutionPlan::not_handled(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PartnerPost;

    fn item() -> QueueItem {
        QueueItem::new(
            "t3_q1",
            "/r/TranscribersOfReddit/comments/q1/post/",
            "https://reddit.com/r/origin/comments/p1/post/",
        )
    }

    fn sub() -> Submission {
        Submission::new(7, "https://reddit.com/r/TranscribersOfReddit/comments/q1/post/")
    }

    fn partner(over_18: bool, removed: Option<&str>) -> PartnerLookup {
        PartnerLookup::Found(PartnerPost {
            url: "https://reddit.com/r/origin/comments/p1/post/".to_string(),
            over_18,
            removed_by_category: removed.map(str::to_string),
        })
    }

    #[test]
    fn clean_partner_and_plain_reason_is_not_handled() {
        let plan = plan_auto_resolution(&item(), &sub(), &partner(false, None), Some("spam"));
        assert!(plan.actions.is_empty());
        assert!(!plan.is_handled());
    }

    #[test]
    fn nsfw_skips_sides_that_are_already_flagged() {
        let mut it = item();
        it.nsfw = true;
        let plan = plan_auto_resolution(&it, &sub(), &partner(true, None), None);
        assert_eq!(plan.actions, vec![SyncAction::NsfwRemote]);

        let mut s = sub();
        s.nsfw = true;
        let plan = plan_auto_resolution(&item(), &s, &partner(true, None), None);
        assert_eq!(plan.actions, vec![SyncAction::NsfwQueue]);
    }

    #[test]
    fn partner_removed_already_mirrored_is_still_handled() {
        let mut it = item();
        it.removed = true;
        let mut s = sub();
        s.removed_from_queue = true;
        let plan = plan_auto_resolution(&it, &s, &partner(false, Some("deleted")), None);
        assert!(plan.actions.is_empty());
        assert_eq!(plan.handled_by, Some(HandledBy::PartnerRemoved));
    }

    #[test]
    fn queue_removal_propagates_to_tracking_side() {
        let mut it = item();
        it.removed = true;
        let plan = plan_auto_resolution(&it, &sub(), &partner(false, None), Some("spam"));
        assert_eq!(plan.actions, vec![SyncAction::RemoveRemote]);
        assert_eq!(plan.handled_by, Some(HandledBy::QueueRemoved));
    }

    #[test]
    fn item_deleted_upstream_counts_as_queue_removal() {
        let mut it = item();
        it.removed_by_category = Some("deleted".to_string());
        let plan = plan_auto_resolution(&it, &sub(), &partner(false, None), None);
        assert_eq!(plan.actions, vec![SyncAction::RemoveRemote]);
        assert_eq!(plan.handled_by, Some(HandledBy::QueueRemoved));
    }

    #[test]
    fn partner_removed_skips_queue_removal_when_item_is_gone_upstream() {
        let mut it = item();
        it.removed_by_category = Some("moderator".to_string());
        let plan = plan_auto_resolution(&it, &sub(), &partner(false, Some("deleted")), None);
        assert_eq!(plan.actions, vec![SyncAction::RemoveRemote]);
        assert_eq!(plan.handled_by, Some(HandledBy::PartnerRemoved));
    }

    #[test]
    fn queue_removal_beats_nsfw_sentinel() {
        let mut it = item();
        it.removed = true;
        let plan = plan_auto_resolution(
            &it,
            &sub(),
            &partner(false, None),
            Some(NSFW_REPORT_REASON),
        );
        assert!(!plan.contains(SyncAction::ApproveQueue));
        assert_eq!(plan.handled_by, Some(HandledBy::QueueRemoved));
    }

    #[test]
    fn sentinel_with_nsfw_mismatch_flags_and_approves() {
        let plan = plan_auto_resolution(
            &item(),
            &sub(),
            &partner(true, None),
            Some(NSFW_REPORT_REASON),
        );
        assert_eq!(
            plan.actions,
            vec![
                SyncAction::NsfwQueue,
                SyncAction::NsfwRemote,
                SyncAction::ApproveQueue,
                SyncAction::ApproveRemote
            ]
        );
        assert_eq!(plan.handled_by, Some(HandledBy::NsfwApproved));
    }

    #[test]
    fn sentinel_is_matched_exactly() {
        let plan = plan_auto_resolution(
            &item(),
            &sub(),
            &partner(false, None),
            Some("post should be marked as nsfw"),
        );
        assert!(!plan.is_handled());
    }
}
