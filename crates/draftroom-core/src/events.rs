// Draft events published to per-draft broadcast topics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::draft::pick::DraftPick;
use crate::draft::turn::DrafterSlot;

/// Default capacity of the broadcast channel. Slow subscribers that fall
/// further behind than this see `RecvError::Lagged`.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Topic name for a draft's events.
pub fn draft_topic(draft_id: &str) -> String {
    format!("draft:{draft_id}")
}

/// Everything the engine tells connected clients.
///
/// Serialized as `{"event": "pick-committed", ...fields}` with camelCase
/// field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum DraftEvent {
    DraftScheduled {
        draft_id: String,
        scheduled_for: DateTime<Utc>,
    },
    DraftStarted {
        draft_id: String,
        order: Vec<DrafterSlot>,
        on_the_clock: Option<String>,
        deadline: Option<DateTime<Utc>>,
    },
    PickCommitted {
        draft_id: String,
        pick: DraftPick,
        current_pick: u32,
        current_round: u32,
        is_complete: bool,
        next_drafter: Option<String>,
        deadline: Option<DateTime<Utc>>,
    },
    PickUndone {
        draft_id: String,
        pick: DraftPick,
        current_pick: u32,
        current_round: u32,
        on_the_clock: Option<String>,
        deadline: Option<DateTime<Utc>>,
    },
    DraftPaused {
        draft_id: String,
    },
    DraftResumed {
        draft_id: String,
        deadline: Option<DateTime<Utc>>,
    },
    DraftCompleted {
        draft_id: String,
        end_time: DateTime<Utc>,
    },
    AuctionNextNominator {
        draft_id: String,
        team_id: String,
    },
    AuctionNomination {
        draft_id: String,
        player_id: String,
        nominated_by: String,
        current_bid: u32,
        bid_deadline: Option<DateTime<Utc>>,
    },
    AuctionBid {
        draft_id: String,
        player_id: String,
        current_bid: u32,
        current_bidder_team_id: String,
        bid_deadline: Option<DateTime<Utc>>,
    },
}

impl DraftEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            DraftEvent::DraftScheduled { .. } => "draft-scheduled",
            DraftEvent::DraftStarted { .. } => "draft-started",
            DraftEvent::PickCommitted { .. } => "pick-committed",
            DraftEvent::PickUndone { .. } => "pick-undone",
            DraftEvent::DraftPaused { .. } => "draft-paused",
            DraftEvent::DraftResumed { .. } => "draft-resumed",
            DraftEvent::DraftCompleted { .. } => "draft-completed",
            DraftEvent::AuctionNextNominator { .. } => "auction-next-nominator",
            DraftEvent::AuctionNomination { .. } => "auction-nomination",
            DraftEvent::AuctionBid { .. } => "auction-bid",
        }
    }
}

/// An event addressed to a draft topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEvent {
    pub topic: String,
    #[serde(flatten)]
    pub event: DraftEvent,
}

/// Fan-out of draft events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TopicEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        EventBus { tx }
    }

    /// Publish to the draft's topic. Having no subscribers is not an error.
    pub fn publish(&self, draft_id: &str, event: DraftEvent) {
        trace!("publishing {} for draft {}", event.name(), draft_id);
        let _ = self.tx.send(TopicEvent {
            topic: draft_topic(draft_id),
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopicEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
