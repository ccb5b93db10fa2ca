// Pick validation and commit.
//
// Every pick, whether a client's snake pick, an auto-pick, an auction
// settlement or a keeper, goes through `PickExecutor`. Changes are applied
// to a copy of the session, committed to the store, and only then swapped
// into the live session, so a rejected commit leaves memory untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::pick::{DraftMode, DraftPick, DraftStatus};
use super::session::DraftSession;
use crate::catalog::PlayerCatalog;
use crate::error::DraftError;
use crate::events::{DraftEvent, EventBus};
use crate::store::{DraftStore, PickCommit, PickRevert};

/// A request to commit one pick.
#[derive(Debug, Clone, PartialEq)]
pub struct PickRequest {
    pub team_id: String,
    pub player_id: String,
    /// Auction price.
    pub amount: Option<u32>,
    pub tag: Option<String>,
    pub is_auto_pick: bool,
}

impl PickRequest {
    pub fn new(team_id: &str, player_id: &str) -> Self {
        PickRequest {
            team_id: team_id.to_string(),
            player_id: player_id.to_string(),
            amount: None,
            tag: None,
            is_auto_pick: false,
        }
    }
}

/// Result of a committed pick.
#[derive(Debug, Clone, PartialEq)]
pub struct PickOutcome {
    pub pick: DraftPick,
    /// Roster slot the player landed in.
    pub slot: String,
    pub completed: bool,
}

pub struct PickExecutor {
    store: Arc<dyn DraftStore>,
    catalog: Arc<dyn PlayerCatalog>,
    events: EventBus,
}

impl PickExecutor {
    pub fn new(store: Arc<dyn DraftStore>, catalog: Arc<dyn PlayerCatalog>, events: EventBus) -> Self {
        PickExecutor {
            store,
            catalog,
            events,
        }
    }

    /// Validate and commit a live pick.
    ///
    /// Checks run in a fixed order and the first failure wins: draft in
    /// progress, requester on the clock, player available, amount within
    /// budget, player known, roster slot open.
    pub fn execute(
        &self,
        session: &mut DraftSession,
        request: PickRequest,
        now: DateTime<Utc>,
    ) -> Result<PickOutcome, DraftError> {
        if session.status != DraftStatus::InProgress {
            return Err(DraftError::DraftNotInProgress);
        }
        if session.pick_owner() != Some(request.team_id.as_str()) {
            return Err(DraftError::NotYourTurn {
                team_id: request.team_id,
            });
        }
        if session.is_drafted(&request.player_id) {
            return Err(DraftError::PlayerAlreadyDrafted {
                player_id: request.player_id,
            });
        }
        let amount = match session.mode() {
            DraftMode::Auction => Some(request.amount.unwrap_or(0)),
            _ => None,
        };
        if let Some(amount) = amount {
            check_budget(session, &request.team_id, amount)?;
        }
        let position = self.position_of(&request.player_id)?;

        let pick = DraftPick {
            pick_number: session.current_pick as i32,
            round: session.current_round,
            team_id: request.team_id,
            player_id: request.player_id,
            amount,
            is_auto_pick: request.is_auto_pick,
            tag: request.tag,
            picked_at: now,
        };

        let mut next = session.clone();
        let slot = next.record_pick(pick.clone(), &position)?;
        next.advance(now, self.catalog.as_ref());
        next.version += 1;

        self.store.commit_pick(&PickCommit {
            session: &next,
            expected_version: session.version,
            pick: &pick,
            position: &position,
            slot: &slot,
        })?;
        *session = next;

        let completed = session.status == DraftStatus::Completed;
        info!(
            "Draft {}: pick {} (round {}) {} -> {}{}{}",
            session.id,
            pick.pick_number,
            pick.round,
            pick.player_id,
            pick.team_id,
            pick.amount.map(|a| format!(" for ${a}")).unwrap_or_default(),
            if pick.is_auto_pick { " [auto]" } else { "" },
        );

        self.events.publish(
            &session.id,
            DraftEvent::PickCommitted {
                draft_id: session.id.clone(),
                pick: pick.clone(),
                current_pick: session.current_pick,
                current_round: session.current_round,
                is_complete: completed,
                next_drafter: session.on_the_clock().map(str::to_string),
                deadline: session.deadline,
            },
        );
        if completed {
            info!("Draft {} completed after {} picks", session.id, session.live_pick_count());
            self.events.publish(
                &session.id,
                DraftEvent::DraftCompleted {
                    draft_id: session.id.clone(),
                    end_time: session.end_time.unwrap_or(now),
                },
            );
        } else {
            self.announce_nominator(session);
        }

        Ok(PickOutcome {
            pick,
            slot,
            completed,
        })
    }

    /// Record a keeper before the draft starts. Keepers take negative pick
    /// numbers and never move the live counters.
    pub fn add_keeper(
        &self,
        session: &mut DraftSession,
        team_id: &str,
        player_id: &str,
        amount: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<PickOutcome, DraftError> {
        if session.status != DraftStatus::Scheduled {
            return Err(DraftError::InvalidTransition {
                action: "add a keeper to",
                status: session.status,
            });
        }
        if session.team(team_id).is_none() {
            return Err(DraftError::UnknownTeam {
                team_id: team_id.to_string(),
            });
        }
        if session.is_drafted(player_id) {
            return Err(DraftError::PlayerAlreadyDrafted {
                player_id: player_id.to_string(),
            });
        }
        let amount = match session.mode() {
            DraftMode::Auction => amount,
            _ => None,
        };
        if let Some(amount) = amount {
            check_budget(session, team_id, amount)?;
        }
        let position = self.position_of(player_id)?;

        let pick = DraftPick {
            pick_number: -(session.keeper_count() as i32 + 1),
            round: 0,
            team_id: team_id.to_string(),
            player_id: player_id.to_string(),
            amount,
            is_auto_pick: false,
            tag: Some("keeper".to_string()),
            picked_at: now,
        };

        let mut next = session.clone();
        let slot = next.record_pick(pick.clone(), &position)?;
        next.version += 1;

        self.store.commit_pick(&PickCommit {
            session: &next,
            expected_version: session.version,
            pick: &pick,
            position: &position,
            slot: &slot,
        })?;
        *session = next;

        info!(
            "Draft {}: keeper {} -> {} ({})",
            session.id, pick.player_id, pick.team_id, slot
        );
        Ok(PickOutcome {
            pick,
            slot,
            completed: false,
        })
    }

    /// Revert the most recent non-keeper pick: counters, roster entry and
    /// budget. In auction drafts the open nomination is dropped and the
    /// nominator re-derived. The caller re-arms timers from the returned
    /// session's `deadline`.
    pub fn undo_last(
        &self,
        session: &mut DraftSession,
        now: DateTime<Utc>,
    ) -> Result<DraftPick, DraftError> {
        if !session.status.is_live() {
            return Err(DraftError::InvalidTransition {
                action: "undo a pick in",
                status: session.status,
            });
        }

        let mut next = session.clone();
        let (pick, position) = next.revert_last_pick()?;
        next.deadline = next.turn_deadline(now);
        next.version += 1;

        self.store.revert_pick(&PickRevert {
            session: &next,
            expected_version: session.version,
            pick: &pick,
            position: &position,
        })?;
        *session = next;

        info!(
            "Draft {}: undid pick {} ({} from {})",
            session.id, pick.pick_number, pick.player_id, pick.team_id
        );
        self.events.publish(
            &session.id,
            DraftEvent::PickUndone {
                draft_id: session.id.clone(),
                pick: pick.clone(),
                current_pick: session.current_pick,
                current_round: session.current_round,
                on_the_clock: session.on_the_clock().map(str::to_string),
                deadline: session.deadline,
            },
        );
        self.announce_nominator(session);
        Ok(pick)
    }

    /// Publish the next auction nominator, if the draft is an auction.
    pub fn announce_nominator(&self, session: &DraftSession) {
        if session.mode() != DraftMode::Auction {
            return;
        }
        if let Some(team_id) = session.nominator() {
            self.events.publish(
                &session.id,
                DraftEvent::AuctionNextNominator {
                    draft_id: session.id.clone(),
                    team_id: team_id.to_string(),
                },
            );
        }
    }

    fn position_of(&self, player_id: &str) -> Result<String, DraftError> {
        self.catalog
            .player(player_id)
            .map(|p| p.position.clone())
            .ok_or_else(|| DraftError::UnknownPlayer {
                player_id: player_id.to_string(),
            })
    }
}

fn check_budget(session: &DraftSession, team_id: &str, amount: u32) -> Result<(), DraftError> {
    let team = session.team(team_id).ok_or_else(|| DraftError::UnknownTeam {
        team_id: team_id.to_string(),
    })?;
    let available = team.budget.as_ref().map_or(0, |b| b.remaining);
    if amount > available {
        return Err(DraftError::InsufficientBudget {
            team_id: team_id.to_string(),
            amount,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogPlayer, RankedCatalog};
    use crate::db::Database;
    use crate::draft::auction::AuctionEngine;
    use crate::draft::session::DraftSettings;
    use crate::draft::turn;
    use crate::store::StoreError;
    use std::collections::HashMap;

    fn catalog() -> Arc<RankedCatalog> {
        let players = (1..=20)
            .map(|i| CatalogPlayer {
                player_id: format!("p{i}"),
                name: format!("Player {i}"),
                position: if i % 2 == 0 { "RB".into() } else { "WR".into() },
                rank: i,
            })
            .collect();
        Arc::new(RankedCatalog::new(players).unwrap())
    }

    fn roster() -> HashMap<String, usize> {
        [("RB".to_string(), 1), ("WR".to_string(), 1), ("BE".to_string(), 1)]
            .into_iter()
            .collect()
    }

    struct Harness {
        executor: PickExecutor,
        db: Arc<Database>,
        events: EventBus,
    }

    fn harness() -> Harness {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let events = EventBus::default();
        let executor = PickExecutor::new(db.clone(), catalog(), events.clone());
        Harness {
            executor,
            db,
            events,
        }
    }

    fn session(h: &Harness, mode: DraftMode) -> DraftSession {
        let settings = DraftSettings {
            mode,
            total_rounds: 3,
            roster: roster(),
            salary_cap: 20,
            ..Default::default()
        };
        let teams = vec![
            ("team_1".to_string(), "One".to_string()),
            ("team_2".to_string(), "Two".to_string()),
        ];
        let mut session = DraftSession::new("d1", "league", 2026, settings, teams).unwrap();
        h.db.insert_draft(&session).unwrap();
        session.order = turn::slots_from_order(&["team_1".into(), "team_2".into()]);
        session.status = DraftStatus::InProgress;
        if mode == DraftMode::Auction {
            session.auction = Some(AuctionEngine::new(session.order_team_ids(), 1));
        }
        h.db.update_draft(&bumped(&session), session.version).unwrap();
        session.version += 1;
        session
    }

    fn bumped(session: &DraftSession) -> DraftSession {
        let mut next = session.clone();
        next.version += 1;
        next
    }

    #[test]
    fn commits_pick_and_advances() {
        let h = harness();
        let mut s = session(&h, DraftMode::Snake);
        let mut rx = h.events.subscribe();

        let outcome = h
            .executor
            .execute(&mut s, PickRequest::new("team_1", "p1"), Utc::now())
            .unwrap();
        assert_eq!(outcome.slot, "WR");
        assert_eq!(outcome.pick.pick_number, 1);
        assert_eq!(s.current_pick, 2);
        assert_eq!(s.snake_drafter(), Some("team_2"));
        assert!(s.deadline.is_some());

        let event = rx.try_recv().unwrap();
        match event.event {
            DraftEvent::PickCommitted {
                next_drafter,
                is_complete,
                ..
            } => {
                assert_eq!(next_drafter.as_deref(), Some("team_2"));
                assert!(!is_complete);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let stored = h.db.load_draft("d1").unwrap().unwrap();
        assert_eq!(stored.picks.len(), 1);
        assert_eq!(stored.version, s.version);
    }

    #[test]
    fn validation_order_first_failure_wins() {
        let h = harness();
        let mut s = session(&h, DraftMode::Snake);
        h.executor
            .execute(&mut s, PickRequest::new("team_1", "p1"), Utc::now())
            .unwrap();

        // Wrong team and drafted player: turn check wins.
        let err = h
            .executor
            .execute(&mut s, PickRequest::new("team_1", "p1"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::NotYourTurn { .. }));

        let err = h
            .executor
            .execute(&mut s, PickRequest::new("team_2", "p1"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::PlayerAlreadyDrafted { .. }));

        let err = h
            .executor
            .execute(&mut s, PickRequest::new("team_2", "nobody"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::UnknownPlayer { .. }));

        s.status = DraftStatus::Paused;
        let err = h
            .executor
            .execute(&mut s, PickRequest::new("team_2", "p2"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::DraftNotInProgress));
    }

    #[test]
    fn rejected_commit_leaves_session_untouched() {
        let h = harness();
        let mut s = session(&h, DraftMode::Snake);
        // Another writer moved the stored version on.
        h.db.update_draft(&bumped(&s), s.version).unwrap();

        let before = s.current_pick;
        let err = h
            .executor
            .execute(&mut s, PickRequest::new("team_1", "p1"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::VersionConflict { .. }));
        assert_eq!(s.current_pick, before);
        assert!(s.picks.is_empty());
        assert!(!s.team("team_1").unwrap().roster.has_player("p1"));
    }

    #[test]
    fn no_open_slot_rejected() {
        let h = harness();
        let mut s = session(&h, DraftMode::Snake);
        // team_1 takes WRs at picks 1 and 4; the third WR has nowhere to go.
        for (team, player) in [("team_1", "p1"), ("team_2", "p2"), ("team_2", "p4"), ("team_1", "p3")] {
            h.executor
                .execute(&mut s, PickRequest::new(team, player), Utc::now())
                .unwrap();
        }
        let err = h
            .executor
            .execute(&mut s, PickRequest::new("team_1", "p5"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::NoOpenRosterSlot { .. }));
    }

    #[test]
    fn auction_settlement_debits_budget() {
        let h = harness();
        let mut s = session(&h, DraftMode::Auction);
        s.nominate("team_1", "p2", "RB", 1, None).unwrap();
        s.place_bid("team_2", 5, None).unwrap();

        let mut request = PickRequest::new("team_2", "p2");
        request.amount = Some(5);
        h.executor.execute(&mut s, request, Utc::now()).unwrap();

        let budget = s.team("team_2").unwrap().budget.clone().unwrap();
        assert_eq!((budget.spent, budget.remaining), (5, 15));
        assert_eq!(budget.spent_by_position.get("RB"), Some(&5));
        assert_eq!(s.nominator(), Some("team_2"));

        let stored = h.db.load_draft("d1").unwrap().unwrap();
        let stored_budget = stored.team("team_2").unwrap().budget.clone().unwrap();
        assert_eq!(stored_budget, budget);
    }

    #[test]
    fn auction_pick_over_budget_rejected() {
        let h = harness();
        let mut s = session(&h, DraftMode::Auction);
        s.nominate("team_1", "p2", "RB", 1, None).unwrap();
        let mut request = PickRequest::new("team_1", "p2");
        request.amount = Some(21);
        let err = h.executor.execute(&mut s, request, Utc::now()).unwrap_err();
        assert!(matches!(err, DraftError::InsufficientBudget { available: 20, .. }));
    }

    #[test]
    fn undo_reverts_everything() {
        let h = harness();
        let mut s = session(&h, DraftMode::Auction);
        s.nominate("team_1", "p2", "RB", 3, None).unwrap();
        let mut request = PickRequest::new("team_1", "p2");
        request.amount = Some(3);
        h.executor.execute(&mut s, request, Utc::now()).unwrap();

        let undone = h.executor.undo_last(&mut s, Utc::now()).unwrap();
        assert_eq!(undone.player_id, "p2");
        assert_eq!(s.current_pick, 1);
        let budget = s.team("team_1").unwrap().budget.clone().unwrap();
        assert!(budget.is_balanced());
        assert_eq!(budget.spent, 0);
        assert_eq!(s.nominator(), Some("team_1"));

        let stored = h.db.load_draft("d1").unwrap().unwrap();
        assert!(stored.picks.is_empty());
        assert_eq!(stored.team("team_1").unwrap().budget.as_ref().unwrap().spent, 0);
        assert!(matches!(
            h.executor.undo_last(&mut s, Utc::now()).unwrap_err(),
            DraftError::NothingToUndo
        ));
    }

    #[test]
    fn keepers_only_before_start() {
        let h = harness();
        let settings = DraftSettings {
            total_rounds: 3,
            roster: roster(),
            ..Default::default()
        };
        let teams = vec![("team_1".to_string(), "One".to_string())];
        let mut s = DraftSession::new("d2", "league", 2026, settings, teams).unwrap();
        h.db.insert_draft(&s).unwrap();

        let outcome = h
            .executor
            .add_keeper(&mut s, "team_1", "p1", None, Utc::now())
            .unwrap();
        assert_eq!(outcome.pick.pick_number, -1);
        assert_eq!(s.current_pick, 1);
        let second = h
            .executor
            .add_keeper(&mut s, "team_1", "p2", None, Utc::now())
            .unwrap();
        assert_eq!(second.pick.pick_number, -2);

        s.status = DraftStatus::InProgress;
        let err = h
            .executor
            .add_keeper(&mut s, "team_1", "p3", None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DraftError::InvalidTransition { .. }));
    }

    #[test]
    fn store_conflict_converts() {
        let err: DraftError = StoreError::Conflict {
            draft_id: "d1".into(),
        }
        .into();
        assert!(matches!(err, DraftError::VersionConflict { .. }));
    }
}
