// Wire protocol between draft clients and the server.
//
// Every frame is JSON `{"type": "...", "payload": {...}}`. Client frames may
// carry a `requestId` that is echoed on the reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use draftroom_core::draft::pick::DraftMode;
use draftroom_core::draft::session::{DraftSettings, DraftView};
use draftroom_core::events::TopicEvent;
use draftroom_core::DraftError;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// A client frame: an optional correlation id plus the request itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub message: ClientMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    CreateDraft {
        #[serde(default)]
        draft_id: Option<String>,
        league_id: String,
        season: i32,
        teams: Vec<TeamEntry>,
        mode: DraftMode,
        /// Falls back to the server's configured rules for `mode`.
        #[serde(default)]
        settings: Option<DraftSettings>,
    },
    ScheduleDraft {
        draft_id: String,
        scheduled_for: DateTime<Utc>,
    },
    AddKeeper {
        draft_id: String,
        team_id: String,
        player_id: String,
        #[serde(default)]
        amount: Option<u32>,
    },
    StartDraft {
        draft_id: String,
        /// Team IDs in draft order; shuffled by the server when absent.
        #[serde(default)]
        order: Option<Vec<String>>,
    },
    SubmitPick {
        draft_id: String,
        team_id: String,
        player_id: String,
        #[serde(default)]
        tag: Option<String>,
    },
    Nominate {
        draft_id: String,
        team_id: String,
        player_id: String,
        starting_bid: u32,
    },
    PlaceBid {
        draft_id: String,
        team_id: String,
        amount: u32,
    },
    PauseDraft {
        draft_id: String,
    },
    ResumeDraft {
        draft_id: String,
    },
    UndoLastPick {
        draft_id: String,
    },
    GetDraft {
        draft_id: String,
    },
    /// Receive the draft's events; replies with the current view.
    Subscribe {
        draft_id: String,
    },
    Unsubscribe {
        draft_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamEntry {
    pub team_id: String,
    pub team_name: String,
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        draft: Option<DraftView>,
    },
    Rejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        code: String,
        message: String,
    },
    Event(TopicEvent),
}

impl ServerMessage {
    pub fn rejected(request_id: Option<String>, err: &DraftError) -> Self {
        ServerMessage::Rejected {
            request_id,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Frames that never reached the engine (bad JSON, unknown type).
    pub fn malformed(message: String) -> Self {
        ServerMessage::Rejected {
            request_id: None,
            code: "MALFORMED_MESSAGE".to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftroom_core::events::DraftEvent;

    #[test]
    fn submit_pick_parses_with_request_id() {
        let json = r#"{"type":"SUBMIT_PICK","requestId":"r1","payload":{"draftId":"d1","teamId":"t1","playerId":"ff_001"}}"#;
        let envelope: ClientEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.request_id.as_deref(), Some("r1"));
        assert_eq!(
            envelope.message,
            ClientMessage::SubmitPick {
                draft_id: "d1".into(),
                team_id: "t1".into(),
                player_id: "ff_001".into(),
                tag: None,
            }
        );
    }

    #[test]
    fn create_draft_without_settings() {
        let json = r#"{"type":"CREATE_DRAFT","payload":{"leagueId":"l1","season":2026,"mode":"AUCTION","teams":[{"teamId":"a","teamName":"Alpha"}]}}"#;
        let envelope: ClientEnvelope = serde_json::from_str(json).unwrap();
        assert!(envelope.request_id.is_none());
        match envelope.message {
            ClientMessage::CreateDraft {
                mode,
                settings,
                teams,
                draft_id,
                ..
            } => {
                assert_eq!(mode, DraftMode::Auction);
                assert!(settings.is_none());
                assert!(draft_id.is_none());
                assert_eq!(teams[0].team_name, "Alpha");
            }
            other => panic!("expected CREATE_DRAFT, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        let json = r#"{"type":"STEAL_PLAYER","payload":{"draftId":"d1"}}"#;
        assert!(serde_json::from_str::<ClientEnvelope>(json).is_err());
    }

    #[test]
    fn rejected_carries_error_code() {
        let msg = ServerMessage::rejected(
            Some("r9".into()),
            &DraftError::NotYourTurn {
                team_id: "t2".into(),
            },
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "REJECTED");
        assert_eq!(value["payload"]["requestId"], "r9");
        assert_eq!(value["payload"]["code"], "NOT_YOUR_TURN");
        assert_eq!(value["payload"]["message"], "team t2 is not on the clock");
    }

    #[test]
    fn event_frame_keeps_topic_and_event_name() {
        let msg = ServerMessage::Event(TopicEvent {
            topic: "draft:d1".into(),
            event: DraftEvent::DraftPaused {
                draft_id: "d1".into(),
            },
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "EVENT");
        assert_eq!(value["payload"]["topic"], "draft:d1");
        assert_eq!(value["payload"]["event"], "draft-paused");
        assert_eq!(value["payload"]["draftId"], "d1");
    }
}
