//! A/B case voting.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StorageResult;
use crate::profile::ProfileService;
use crate::storage::{Choice, ProfileStore, ReactionLedger, VoteLedger};

/// Acknowledgement returned by `/vote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotReceipt {
    pub ok: bool,
    /// Distinct cases the visitor has now completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trials_completed: Option<i64>,
}

/// Records case votes and keeps the voter's profile in step.
#[derive(Clone)]
pub struct BallotService<S> {
    storage: S,
    profiles: ProfileService<S>,
}

impl<S> BallotService<S>
where
    S: VoteLedger + ProfileStore + ReactionLedger + Clone,
{
    /// Create a new ballot service
    pub fn new(storage: S, visit_offset: FixedOffset) -> Self {
        Self {
            profiles: ProfileService::new(storage.clone(), visit_offset),
            storage,
        }
    }

    /// Upsert the visitor's choice, mark the case completed, and recompute the profile.
    pub async fn cast(
        &self,
        visitor_id: &str,
        case_id: &str,
        choice: Choice,
        now: DateTime<Utc>,
    ) -> StorageResult<BallotReceipt> {
        self.storage.record_vote(visitor_id, case_id, choice).await?;
        self.storage.record_completion(visitor_id, case_id).await?;

        let profile = self.profiles.refresh_after_vote(visitor_id, now).await?;

        info!(
            visitor_id = %visitor_id,
            case_id = %case_id,
            choice = %choice,
            trials_completed = profile.trials_completed,
            "Vote recorded"
        );

        Ok(BallotReceipt {
            ok: true,
            trials_completed: Some(profile.trials_completed),
        })
    }
}
