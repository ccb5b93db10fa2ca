// Error taxonomy for draft operations.

use thiserror::Error;

use crate::draft::pick::{DraftMode, DraftStatus};
use crate::store::StoreError;

/// Every way a draft operation can be rejected.
///
/// Validation and state errors are returned to the caller as-is and are
/// never retried by the engine. `Storage` and `VersionConflict` mean the
/// store refused the commit; the in-memory session is untouched when they
/// are returned.
#[derive(Debug, Error)]
pub enum DraftError {
    // -- state errors --
    #[error("draft {draft_id} not found")]
    DraftNotFound { draft_id: String },

    #[error("draft is not in progress")]
    DraftNotInProgress,

    #[error("cannot {action} a draft that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: DraftStatus,
    },

    // -- pick validation --
    #[error("team {team_id} is not on the clock")]
    NotYourTurn { team_id: String },

    #[error("player {player_id} has already been drafted")]
    PlayerAlreadyDrafted { player_id: String },

    #[error("team {team_id} cannot spend {amount} (at most {available} available)")]
    InsufficientBudget {
        team_id: String,
        amount: u32,
        available: u32,
    },

    #[error("unknown player {player_id}")]
    UnknownPlayer { player_id: String },

    #[error("unknown team {team_id}")]
    UnknownTeam { team_id: String },

    #[error("team {team_id} has no open roster slot for a {position}")]
    NoOpenRosterSlot { team_id: String, position: String },

    #[error("no pick to undo")]
    NothingToUndo,

    // -- auction validation --
    #[error("team {team_id} is not the current nominator")]
    NotYourTurnToNominate { team_id: String },

    #[error("bid of {amount} is below the minimum of {minimum}")]
    MinimumBidNotMet { amount: u32, minimum: u32 },

    #[error("no player is currently up for bids")]
    NoActiveNomination,

    #[error("a nomination is already open for bidding")]
    NotInNominationPhase,

    #[error("team {team_id} already holds the high bid")]
    AlreadyHighBidder { team_id: String },

    #[error("team {team_id} has a full roster")]
    RosterFull { team_id: String },

    // -- configuration --
    #[error("{operation} is not supported in {mode} drafts")]
    UnsupportedForMode {
        operation: &'static str,
        mode: DraftMode,
    },

    #[error("invalid draft configuration: {0}")]
    InvalidConfiguration(String),

    // -- consistency --
    #[error("draft {draft_id} was modified concurrently")]
    VersionConflict { draft_id: String },

    #[error("storage failure: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl DraftError {
    /// Stable machine-readable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            DraftError::DraftNotFound { .. } => "DRAFT_NOT_FOUND",
            DraftError::DraftNotInProgress => "DRAFT_NOT_IN_PROGRESS",
            DraftError::InvalidTransition { .. } => "INVALID_TRANSITION",
            DraftError::NotYourTurn { .. } => "NOT_YOUR_TURN",
            DraftError::PlayerAlreadyDrafted { .. } => "PLAYER_ALREADY_DRAFTED",
            DraftError::InsufficientBudget { .. } => "INSUFFICIENT_BUDGET",
            DraftError::UnknownPlayer { .. } => "UNKNOWN_PLAYER",
            DraftError::UnknownTeam { .. } => "UNKNOWN_TEAM",
            DraftError::NoOpenRosterSlot { .. } => "NO_OPEN_ROSTER_SLOT",
            DraftError::NothingToUndo => "NOTHING_TO_UNDO",
            DraftError::NotYourTurnToNominate { .. } => "NOT_YOUR_TURN_TO_NOMINATE",
            DraftError::MinimumBidNotMet { .. } => "MINIMUM_BID_NOT_MET",
            DraftError::NoActiveNomination => "NO_ACTIVE_NOMINATION",
            DraftError::NotInNominationPhase => "NOT_IN_NOMINATION_PHASE",
            DraftError::AlreadyHighBidder { .. } => "ALREADY_HIGH_BIDDER",
            DraftError::RosterFull { .. } => "ROSTER_FULL",
            DraftError::UnsupportedForMode { .. } => "UNSUPPORTED_FOR_MODE",
            DraftError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            DraftError::VersionConflict { .. } => "VERSION_CONFLICT",
            DraftError::Storage(_) => "STORAGE_FAILURE",
        }
    }

    /// Whether this is a state error (draft missing or not accepting
    /// actions) rather than a rejection of the action's content.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            DraftError::DraftNotFound { .. }
                | DraftError::DraftNotInProgress
                | DraftError::InvalidTransition { .. }
        )
    }
}

impl From<StoreError> for DraftError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { draft_id } => DraftError::VersionConflict { draft_id },
            StoreError::Backend(e) => DraftError::Storage(e),
        }
    }
}
