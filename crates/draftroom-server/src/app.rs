// Application event loop: routes client requests to the draft coordinator
// and fans draft events out to subscribed connections.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use draftroom_core::draft::session::DraftView;
use draftroom_core::events::{draft_topic, TopicEvent};
use draftroom_core::{DraftCoordinator, DraftError, NewDraft};

use crate::config::Config;
use crate::protocol::{ClientEnvelope, ClientMessage, ServerMessage};
use crate::ws_server::WsEvent;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// A connected client.
#[derive(Debug)]
pub struct Connection {
    pub addr: String,
    outbound: mpsc::Sender<String>,
    /// Topics (`draft:<id>`) this client receives events for.
    pub topics: HashSet<String>,
}

impl Connection {
    /// Queue a frame. A client that cannot keep up loses frames rather than
    /// stalling the loop.
    fn send(&self, conn_id: u64, msg: &ServerMessage) {
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize reply for connection {conn_id}: {e}");
                return;
            }
        };
        if let Err(e) = self.outbound.try_send(text) {
            warn!("Dropping frame for connection {conn_id}: {e}");
        }
    }
}

pub struct AppState {
    pub config: Config,
    pub coordinator: Arc<DraftCoordinator>,
    pub connections: HashMap<u64, Connection>,
}

impl AppState {
    pub fn new(config: Config, coordinator: Arc<DraftCoordinator>) -> Self {
        AppState {
            config,
            coordinator,
            connections: HashMap::new(),
        }
    }

    fn reply(&self, conn_id: u64, msg: &ServerMessage) {
        match self.connections.get(&conn_id) {
            Some(conn) => conn.send(conn_id, msg),
            None => debug!("Reply for departed connection {conn_id} dropped"),
        }
    }

    /// Deliver an event to every connection subscribed to its topic.
    fn fan_out(&self, event: TopicEvent) {
        let topic = event.topic.clone();
        let msg = ServerMessage::Event(event);
        for (conn_id, conn) in &self.connections {
            if conn.topics.contains(&topic) {
                conn.send(*conn_id, &msg);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the main application event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. WebSocket events from clients
/// 2. Draft events from the coordinator's event bus
///
/// Returns when the WebSocket channel closes.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut events: broadcast::Receiver<TopicEvent>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    // When the bus closes, stop polling it so select! never spins.
    let mut events_open = true;

    loop {
        tokio::select! {
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(WsEvent::Connected { conn_id, addr, outbound }) => {
                        info!("Client {} connected from {}", conn_id, addr);
                        state.connections.insert(conn_id, Connection {
                            addr,
                            outbound,
                            topics: HashSet::new(),
                        });
                    }
                    Some(WsEvent::Disconnected { conn_id }) => {
                        if let Some(conn) = state.connections.remove(&conn_id) {
                            info!("Client {} ({}) disconnected", conn_id, conn.addr);
                        }
                    }
                    Some(WsEvent::Message { conn_id, text }) => {
                        handle_ws_message(&mut state, conn_id, &text).await;
                    }
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            event = events.recv(), if events_open => {
                match event {
                    Ok(event) => state.fan_out(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event fan-out lagged; {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("Event bus closed");
                        events_open = false;
                    }
                }
            }
        }
    }

    info!("Application event loop exiting");
    Ok(())
}

/// Parse one client frame, run it, and reply to the sender.
async fn handle_ws_message(state: &mut AppState, conn_id: u64, text: &str) {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Failed to parse message from connection {}: {}", conn_id, e);
            state.reply(conn_id, &ServerMessage::malformed(e.to_string()));
            return;
        }
    };

    let request_id = envelope.request_id;
    let reply = match dispatch(state, conn_id, envelope.message).await {
        Ok(draft) => ServerMessage::Ack { request_id, draft },
        Err(e) => {
            debug!("Request from connection {} rejected: {}", conn_id, e);
            ServerMessage::rejected(request_id, &e)
        }
    };
    state.reply(conn_id, &reply);
}

/// Route a request to the coordinator. Subscriptions are handled here since
/// they only touch the connection table.
pub async fn dispatch(
    state: &mut AppState,
    conn_id: u64,
    message: ClientMessage,
) -> Result<Option<DraftView>, DraftError> {
    let coordinator = Arc::clone(&state.coordinator);
    let view = match message {
        ClientMessage::CreateDraft {
            draft_id,
            league_id,
            season,
            teams,
            mode,
            settings,
        } => {
            let mut settings = settings.unwrap_or_else(|| state.config.draft_settings(mode));
            settings.mode = mode;
            coordinator
                .create_draft(NewDraft {
                    draft_id,
                    league_id,
                    season,
                    teams: teams.into_iter().map(|t| (t.team_id, t.team_name)).collect(),
                    settings,
                })
                .await?
        }
        ClientMessage::ScheduleDraft {
            draft_id,
            scheduled_for,
        } => coordinator.schedule_draft_date(&draft_id, scheduled_for).await?,
        ClientMessage::AddKeeper {
            draft_id,
            team_id,
            player_id,
            amount,
        } => {
            coordinator
                .add_keeper(&draft_id, &team_id, &player_id, amount)
                .await?
        }
        ClientMessage::StartDraft { draft_id, order } => {
            coordinator.start_draft(&draft_id, order).await?
        }
        ClientMessage::SubmitPick {
            draft_id,
            team_id,
            player_id,
            tag,
        } => {
            coordinator
                .submit_pick(&draft_id, &team_id, &player_id, tag)
                .await?
        }
        ClientMessage::Nominate {
            draft_id,
            team_id,
            player_id,
            starting_bid,
        } => {
            coordinator
                .nominate(&draft_id, &team_id, &player_id, starting_bid)
                .await?
        }
        ClientMessage::PlaceBid {
            draft_id,
            team_id,
            amount,
        } => coordinator.place_bid(&draft_id, &team_id, amount).await?,
        ClientMessage::PauseDraft { draft_id } => coordinator.pause_draft(&draft_id).await?,
        ClientMessage::ResumeDraft { draft_id } => coordinator.resume_draft(&draft_id).await?,
        ClientMessage::UndoLastPick { draft_id } => coordinator.undo_last_pick(&draft_id).await?,
        ClientMessage::GetDraft { draft_id } => coordinator.view(&draft_id).await?,
        ClientMessage::Subscribe { draft_id } => {
            let view = coordinator.view(&draft_id).await?;
            if let Some(conn) = state.connections.get_mut(&conn_id) {
                conn.topics.insert(draft_topic(&draft_id));
            }
            debug!("Connection {} subscribed to {}", conn_id, draft_id);
            view
        }
        ClientMessage::Unsubscribe { draft_id } => {
            if let Some(conn) = state.connections.get_mut(&conn_id) {
                conn.topics.remove(&draft_topic(&draft_id));
            }
            return Ok(None);
        }
    };
    Ok(Some(view))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use draftroom_core::catalog::{CatalogPlayer, RankedCatalog};
    use draftroom_core::db::Database;
    use draftroom_core::draft::pick::DraftMode;
    use draftroom_core::events::EventBus;

    use crate::config::DraftRules;
    use crate::protocol::TeamEntry;

    fn config() -> Config {
        Config {
            ws_port: 9100,
            db_path: PathBuf::from(":memory:"),
            players_path: PathBuf::from("data/players.csv"),
            draft: DraftRules {
                total_rounds: 2,
                time_per_pick_seconds: 60,
                grace_period_seconds: 2,
                bid_timer_seconds: 30,
                min_bid_increment: 1,
                reserve_per_open_slot: 1,
                salary_cap: 100,
            },
            roster: [("BE".to_string(), 2)].into_iter().collect(),
        }
    }

    fn state() -> AppState {
        let players = (1..=10)
            .map(|i| CatalogPlayer {
                player_id: format!("p{i}"),
                name: format!("Player {i}"),
                position: "WR".into(),
                rank: i,
            })
            .collect();
        let coordinator = DraftCoordinator::new(
            Arc::new(Database::open(":memory:").unwrap()),
            Arc::new(RankedCatalog::new(players).unwrap()),
            EventBus::default(),
            Duration::from_secs(2),
        );
        AppState::new(config(), coordinator)
    }

    fn connect(state: &mut AppState, conn_id: u64) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(32);
        state.connections.insert(
            conn_id,
            Connection {
                addr: format!("test-{conn_id}"),
                outbound: tx,
                topics: HashSet::new(),
            },
        );
        rx
    }

    fn create_message() -> ClientMessage {
        ClientMessage::CreateDraft {
            draft_id: Some("d1".into()),
            league_id: "l1".into(),
            season: 2026,
            teams: vec![
                TeamEntry {
                    team_id: "a".into(),
                    team_name: "Alpha".into(),
                },
                TeamEntry {
                    team_id: "b".into(),
                    team_name: "Bravo".into(),
                },
            ],
            mode: DraftMode::Snake,
            settings: None,
        }
    }

    fn frame(rx: &mut mpsc::Receiver<String>) -> serde_json::Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn create_draft_uses_configured_rules() {
        let mut state = state();
        let view = dispatch(&mut state, 1, create_message()).await.unwrap().unwrap();
        assert_eq!(view.draft_id, "d1");
        assert_eq!(view.mode, DraftMode::Snake);
        assert_eq!(view.total_rounds, 2);
    }

    #[tokio::test]
    async fn malformed_frame_is_rejected() {
        let mut state = state();
        let mut rx = connect(&mut state, 1);
        handle_ws_message(&mut state, 1, "{not json").await;
        let reply = frame(&mut rx);
        assert_eq!(reply["type"], "REJECTED");
        assert_eq!(reply["payload"]["code"], "MALFORMED_MESSAGE");
    }

    #[tokio::test]
    async fn engine_errors_become_rejections_with_request_id() {
        let mut state = state();
        let mut rx = connect(&mut state, 1);
        handle_ws_message(
            &mut state,
            1,
            r#"{"type":"GET_DRAFT","requestId":"q1","payload":{"draftId":"nope"}}"#,
        )
        .await;
        let reply = frame(&mut rx);
        assert_eq!(reply["type"], "REJECTED");
        assert_eq!(reply["payload"]["requestId"], "q1");
        assert_eq!(reply["payload"]["code"], "DRAFT_NOT_FOUND");
    }

    #[tokio::test]
    async fn subscribers_receive_their_draft_events_only() {
        let mut state = state();
        let mut events = state.coordinator.events().subscribe();
        let mut watcher = connect(&mut state, 1);
        let mut bystander = connect(&mut state, 2);

        dispatch(&mut state, 1, create_message()).await.unwrap();
        handle_ws_message(
            &mut state,
            1,
            r#"{"type":"SUBSCRIBE","requestId":"s1","payload":{"draftId":"d1"}}"#,
        )
        .await;
        let ack = frame(&mut watcher);
        assert_eq!(ack["type"], "ACK");
        assert_eq!(ack["payload"]["draft"]["draftId"], "d1");

        dispatch(
            &mut state,
            2,
            ClientMessage::PauseDraft {
                draft_id: "d1".into(),
            },
        )
        .await
        .unwrap_err();

        dispatch(
            &mut state,
            2,
            ClientMessage::StartDraft {
                draft_id: "d1".into(),
                order: Some(vec!["a".into(), "b".into()]),
            },
        )
        .await
        .unwrap();
        while let Ok(event) = events.try_recv() {
            state.fan_out(event);
        }

        let event = frame(&mut watcher);
        assert_eq!(event["type"], "EVENT");
        assert_eq!(event["payload"]["topic"], "draft:d1");
        assert_eq!(event["payload"]["event"], "draft-started");
        assert_eq!(event["payload"]["onTheClock"], "a");
        assert!(bystander.try_recv().is_err());

        dispatch(
            &mut state,
            1,
            ClientMessage::Unsubscribe {
                draft_id: "d1".into(),
            },
        )
        .await
        .unwrap();
        assert!(state.connections[&1].topics.is_empty());
    }

    #[tokio::test]
    async fn run_exits_when_ws_channel_closes() {
        let state = state();
        let events = state.coordinator.events().subscribe();
        let (ws_tx, ws_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        ws_tx
            .send(WsEvent::Connected {
                conn_id: 1,
                addr: "test".into(),
                outbound: out_tx,
            })
            .await
            .unwrap();
        ws_tx
            .send(WsEvent::Message {
                conn_id: 1,
                text: r#"{"type":"GET_DRAFT","payload":{"draftId":"nope"}}"#.into(),
            })
            .await
            .unwrap();
        ws_tx.send(WsEvent::Disconnected { conn_id: 1 }).await.unwrap();
        drop(ws_tx);

        run(ws_rx, events, state).await.unwrap();
        let reply: serde_json::Value = serde_json::from_str(&out_rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply["payload"]["code"], "DRAFT_NOT_FOUND");
    }
}
