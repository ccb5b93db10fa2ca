// Durable storage seam for draft sessions.
//
// Every mutating call is a single transaction guarded by the session's
// `version`: the write only lands if the stored version still equals
// `expected_version`, and it leaves the stored version at the snapshot's.

use chrono::{DateTime, Utc};

use crate::draft::budget::TeamBudget;
use crate::draft::pick::{DraftPick, DraftStatus};
use crate::draft::session::{DraftSession, DraftSettings};
use crate::draft::turn::DrafterSlot;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stored session moved on since it was read, or a guarded budget
    /// update found less money than the commit expected.
    #[error("draft {draft_id} changed underneath the commit")]
    Conflict { draft_id: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// One committed pick and everything it touches.
#[derive(Debug)]
pub struct PickCommit<'a> {
    /// Session state after the pick, with its version already bumped.
    pub session: &'a DraftSession,
    pub expected_version: u64,
    pub pick: &'a DraftPick,
    /// Position of the drafted player.
    pub position: &'a str,
    /// Roster slot label the player was placed in.
    pub slot: &'a str,
}

/// Reversal of the most recent pick.
#[derive(Debug)]
pub struct PickRevert<'a> {
    /// Session state after the undo, with its version already bumped.
    pub session: &'a DraftSession,
    pub expected_version: u64,
    pub pick: &'a DraftPick,
    /// Position of the player being returned to the pool.
    pub position: &'a str,
}

/// A player on a team's roster as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub team_id: String,
    pub player_id: String,
    pub position: String,
    pub slot: String,
    pub price: Option<u32>,
}

/// Everything the store knows about a draft, before it is turned back into
/// a live session.
#[derive(Debug, Clone)]
pub struct StoredDraft {
    pub id: String,
    pub league_id: String,
    pub season: i32,
    pub settings: DraftSettings,
    pub status: DraftStatus,
    pub current_pick: u32,
    pub current_round: u32,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_pick_at: Option<DateTime<Utc>>,
    pub version: u64,
    /// (team_id, team_name) in league order.
    pub teams: Vec<(String, String)>,
    pub order: Vec<DrafterSlot>,
    /// Picks in commit order.
    pub picks: Vec<DraftPick>,
    pub roster_entries: Vec<RosterEntry>,
    pub budgets: Vec<TeamBudget>,
}

pub trait DraftStore: Send + Sync {
    /// Persist a freshly created session together with its teams and
    /// budgets.
    fn insert_draft(&self, session: &DraftSession) -> Result<(), StoreError>;

    /// Persist session-level changes (status, schedule, drafter order).
    fn update_draft(&self, session: &DraftSession, expected_version: u64) -> Result<(), StoreError>;

    /// Append a pick, its roster entry and (auction) the budget debit.
    fn commit_pick(&self, commit: &PickCommit<'_>) -> Result<(), StoreError>;

    /// Remove a pick, its roster entry and (auction) refund the budget.
    fn revert_pick(&self, revert: &PickRevert<'_>) -> Result<(), StoreError>;

    fn load_draft(&self, draft_id: &str) -> Result<Option<DraftSession>, StoreError>;

    /// IDs of drafts that are IN_PROGRESS or PAUSED.
    fn active_draft_ids(&self) -> Result<Vec<String>, StoreError>;
}
