// Pick records and the draft mode/status enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag attached to picks made by the auto-pick scheduler.
pub const AUTO_PICK_TAG: &str = "auto";

/// How a draft allocates players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftMode {
    /// Serpentine turn order, one pick per turn.
    Snake,
    /// Nomination and open bidding against per-team budgets.
    Auction,
    /// Offline draft; the engine only stores keepers.
    None,
}

impl DraftMode {
    /// Parse a mode string (case-insensitive).
    pub fn from_str_mode(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SNAKE" => Some(DraftMode::Snake),
            "AUCTION" => Some(DraftMode::Auction),
            "NONE" | "OFFLINE" => Some(DraftMode::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DraftMode::Snake => "SNAKE",
            DraftMode::Auction => "AUCTION",
            DraftMode::None => "NONE",
        }
    }
}

impl fmt::Display for DraftMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a draft session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftStatus {
    Scheduled,
    InProgress,
    Paused,
    Completed,
}

impl DraftStatus {
    pub fn from_str_status(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SCHEDULED" => Some(DraftStatus::Scheduled),
            "IN_PROGRESS" => Some(DraftStatus::InProgress),
            "PAUSED" => Some(DraftStatus::Paused),
            "COMPLETED" => Some(DraftStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Scheduled => "SCHEDULED",
            DraftStatus::InProgress => "IN_PROGRESS",
            DraftStatus::Paused => "PAUSED",
            DraftStatus::Completed => "COMPLETED",
        }
    }

    /// Whether the draft has started and not yet finished.
    pub fn is_live(&self) -> bool {
        matches!(self, DraftStatus::InProgress | DraftStatus::Paused)
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single committed draft pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPick {
    /// Sequential pick number (1-indexed). Keepers use negative numbers.
    pub pick_number: i32,
    /// Round the pick was made in (0 for keepers).
    pub round: u32,
    /// Team that received the player.
    pub team_id: String,
    /// Catalog player ID.
    pub player_id: String,
    /// Auction price paid, if any.
    #[serde(default)]
    pub amount: Option<u32>,
    /// Whether the scheduler made this pick after a deadline expired.
    #[serde(default)]
    pub is_auto_pick: bool,
    /// Optional qualitative annotation.
    #[serde(default)]
    pub tag: Option<String>,
    /// When the pick was committed.
    pub picked_at: DateTime<Utc>,
}

impl DraftPick {
    /// Keeper picks are pre-assigned before the draft and carry negative
    /// pick numbers.
    pub fn is_keeper(&self) -> bool {
        self.pick_number < 0
    }
}
