// Draft coordinator: owns every live session and is the single entry point
// for draft operations.
//
// Each session sits behind its own async mutex. Client actions and timer
// firings take that lock before touching the session, so the loser of a race
// sees the winner's state. Timers are armed from `DraftSession::deadline`
// after every change and cancelled whenever the draft stops accepting picks.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogPlayer, PlayerCatalog};
use crate::draft::auction::{AuctionEngine, AuctionPhase};
use crate::draft::executor::{PickExecutor, PickRequest};
use crate::draft::pick::{DraftMode, DraftStatus, AUTO_PICK_TAG};
use crate::draft::session::{DraftSession, DraftSettings, DraftView};
use crate::draft::turn;
use crate::error::DraftError;
use crate::events::{DraftEvent, EventBus};
use crate::scheduler::{AutoPickScheduler, TimerSet};
use crate::store::DraftStore;

type SessionHandle = Arc<AsyncMutex<DraftSession>>;

/// Parameters for a new draft.
#[derive(Debug, Clone)]
pub struct NewDraft {
    /// Generated when absent.
    pub draft_id: Option<String>,
    pub league_id: String,
    pub season: i32,
    /// (team_id, team_name) pairs in league order.
    pub teams: Vec<(String, String)>,
    pub settings: DraftSettings,
}

/// Generate a draft ID from the current time plus a random suffix.
///
/// Format: `draft_YYYYMMDD_HHMMSS_SSS_xxxx`.
pub fn generate_draft_id() -> String {
    format!(
        "{}_{:04x}",
        Utc::now().format("draft_%Y%m%d_%H%M%S_%3f"),
        rand::random::<u16>()
    )
}

pub struct DraftCoordinator {
    this: Weak<DraftCoordinator>,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    store: Arc<dyn DraftStore>,
    catalog: Arc<dyn PlayerCatalog>,
    executor: PickExecutor,
    events: EventBus,
    autopick: AutoPickScheduler,
    bid_timers: TimerSet,
}

impl DraftCoordinator {
    /// `grace` is added to every snake deadline before the auto-pick fires.
    pub fn new(
        store: Arc<dyn DraftStore>,
        catalog: Arc<dyn PlayerCatalog>,
        events: EventBus,
        grace: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| DraftCoordinator {
            this: this.clone(),
            sessions: Mutex::new(HashMap::new()),
            executor: PickExecutor::new(store.clone(), catalog.clone(), events.clone()),
            store,
            catalog,
            events,
            autopick: AutoPickScheduler::new(grace),
            bid_timers: TimerSet::new("bid"),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Number of drafts held in memory.
    pub fn live_drafts(&self) -> usize {
        self.registry().len()
    }

    /// When the pending auto-pick for a draft fires, if one is armed.
    pub fn pending_autopick(&self, draft_id: &str) -> Option<DateTime<Utc>> {
        self.autopick.pending(draft_id)
    }

    /// When the open auction nomination closes, if a bid timer is armed.
    pub fn pending_bid_close(&self, draft_id: &str) -> Option<DateTime<Utc>> {
        self.bid_timers.pending(draft_id)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.lock().expect("session registry mutex poisoned")
    }

    /// Find a session in memory, falling back to the store. Completed drafts
    /// are served from the store but never re-registered; a live draft
    /// loaded here gets its deadline re-derived and its timers armed.
    fn session(&self, draft_id: &str) -> Result<SessionHandle, DraftError> {
        let cached = self.registry().get(draft_id).cloned();
        if let Some(handle) = cached {
            return Ok(handle);
        }

        let mut session = self
            .store
            .load_draft(draft_id)?
            .ok_or_else(|| DraftError::DraftNotFound {
                draft_id: draft_id.to_string(),
            })?;
        if session.status == DraftStatus::Completed {
            return Ok(Arc::new(AsyncMutex::new(session)));
        }

        let mut registry = self.registry();
        if let Some(handle) = registry.get(draft_id) {
            return Ok(handle.clone());
        }
        if session.status.is_live() {
            self.resume_clock(&mut session);
            info!(
                "Loaded live draft {} ({}, pick {})",
                draft_id, session.status, session.current_pick
            );
        }
        let handle = Arc::new(AsyncMutex::new(session));
        registry.insert(draft_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Re-derive the deadline of a session just read from the store and
    /// arm its timers. Snake deadlines run from the last pick (or the start
    /// time), so time spent offline counts against the team on the clock.
    fn resume_clock(&self, session: &mut DraftSession) {
        let anchor = session
            .last_pick_at
            .or(session.start_time)
            .unwrap_or_else(Utc::now);
        session.deadline = session.turn_deadline(anchor);
        self.arm_timers(session);
    }

    /// Apply a session-level change (status, schedule, order) to a copy,
    /// persist it, then swap it in.
    fn persist(
        &self,
        session: &mut DraftSession,
        change: impl FnOnce(&mut DraftSession),
    ) -> Result<(), DraftError> {
        let mut next = session.clone();
        change(&mut next);
        next.version += 1;
        self.store.update_draft(&next, session.version)?;
        *session = next;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn create_draft(&self, new: NewDraft) -> Result<DraftView, DraftError> {
        let draft_id = new.draft_id.unwrap_or_else(generate_draft_id);
        if self.registry().contains_key(&draft_id) || self.store.load_draft(&draft_id)?.is_some() {
            return Err(DraftError::InvalidConfiguration(format!(
                "draft {draft_id} already exists"
            )));
        }

        let session = DraftSession::new(&draft_id, &new.league_id, new.season, new.settings, new.teams)?;
        self.store.insert_draft(&session)?;
        info!(
            "Created {} draft {} for league {} ({} teams)",
            session.mode(),
            draft_id,
            session.league_id,
            session.teams.len()
        );

        let view = session.view();
        self.registry()
            .insert(draft_id, Arc::new(AsyncMutex::new(session)));
        Ok(view)
    }

    pub async fn schedule_draft_date(
        &self,
        draft_id: &str,
        when: DateTime<Utc>,
    ) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let mut session = handle.lock().await;
        if session.status != DraftStatus::Scheduled {
            return Err(DraftError::InvalidTransition {
                action: "schedule",
                status: session.status,
            });
        }

        self.persist(&mut session, |next| next.scheduled_for = Some(when))?;
        info!("Draft {} scheduled for {}", draft_id, when);
        self.events.publish(
            draft_id,
            DraftEvent::DraftScheduled {
                draft_id: draft_id.to_string(),
                scheduled_for: when,
            },
        );
        Ok(session.view())
    }

    pub async fn add_keeper(
        &self,
        draft_id: &str,
        team_id: &str,
        player_id: &str,
        amount: Option<u32>,
    ) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let mut session = handle.lock().await;
        self.executor
            .add_keeper(&mut session, team_id, player_id, amount, Utc::now())?;
        Ok(session.view())
    }

    /// Fix the drafter order and open the draft. Without an explicit order
    /// the league's teams are shuffled.
    pub async fn start_draft(
        &self,
        draft_id: &str,
        order: Option<Vec<String>>,
    ) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let mut session = handle.lock().await;
        if session.mode() == DraftMode::None {
            return Err(DraftError::UnsupportedForMode {
                operation: "start_draft",
                mode: session.mode(),
            });
        }
        if session.status != DraftStatus::Scheduled {
            return Err(DraftError::InvalidTransition {
                action: "start",
                status: session.status,
            });
        }

        let league: Vec<String> = session.teams.iter().map(|t| t.team_id.clone()).collect();
        let team_ids = match order {
            Some(order) => {
                validate_order(&order, &league)?;
                order
            }
            None => {
                let mut shuffled = league;
                shuffled.shuffle(&mut rand::rng());
                shuffled
            }
        };

        let now = Utc::now();
        self.persist(&mut session, |next| {
            next.order = turn::slots_from_order(&team_ids);
            next.status = DraftStatus::InProgress;
            next.start_time = Some(now);
            next.current_pick = 1;
            next.current_round = 1;
            if next.mode() == DraftMode::Snake {
                next.skip_full_rosters();
                if next.current_round > next.settings.total_rounds {
                    next.status = DraftStatus::Completed;
                    next.end_time = Some(now);
                }
            }
            if next.mode() == DraftMode::Auction {
                next.auction = Some(AuctionEngine::new(
                    team_ids.clone(),
                    next.settings.min_bid_increment,
                ));
            }
            next.deadline = next.turn_deadline(now);
        })?;

        info!(
            "Draft {} started: {} mode, order [{}]",
            draft_id,
            session.mode(),
            team_ids.join(", ")
        );
        self.events.publish(
            draft_id,
            DraftEvent::DraftStarted {
                draft_id: draft_id.to_string(),
                order: session.order.clone(),
                on_the_clock: session.on_the_clock().map(str::to_string),
                deadline: session.deadline,
            },
        );
        if session.status == DraftStatus::Completed {
            info!("Draft {} has no open roster slots; completed at start", draft_id);
            self.events.publish(
                draft_id,
                DraftEvent::DraftCompleted {
                    draft_id: draft_id.to_string(),
                    end_time: session.end_time.unwrap_or(now),
                },
            );
        } else {
            self.executor.announce_nominator(&session);
        }
        self.after_change(&session);
        Ok(session.view())
    }

    pub async fn pause_draft(&self, draft_id: &str) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let mut session = handle.lock().await;
        if session.status != DraftStatus::InProgress {
            return Err(DraftError::InvalidTransition {
                action: "pause",
                status: session.status,
            });
        }

        self.persist(&mut session, |next| {
            next.status = DraftStatus::Paused;
            next.deadline = None;
        })?;
        self.cancel_timers(draft_id);
        info!("Draft {} paused", draft_id);
        self.events.publish(
            draft_id,
            DraftEvent::DraftPaused {
                draft_id: draft_id.to_string(),
            },
        );
        Ok(session.view())
    }

    /// Resume a paused draft. Deadlines restart from now; an open auction
    /// nomination gets a fresh bid timer.
    pub async fn resume_draft(&self, draft_id: &str) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let mut session = handle.lock().await;
        if session.status != DraftStatus::Paused {
            return Err(DraftError::InvalidTransition {
                action: "resume",
                status: session.status,
            });
        }

        let now = Utc::now();
        self.persist(&mut session, |next| {
            next.status = DraftStatus::InProgress;
            next.deadline = next.turn_deadline(now);
            let bid_deadline = now + next.settings.bid_timer();
            if let Some(engine) = next.auction.as_mut() {
                if engine.phase() == AuctionPhase::Bidding {
                    engine.set_bid_deadline(Some(bid_deadline));
                    next.deadline = Some(bid_deadline);
                }
            }
        })?;

        info!("Draft {} resumed", draft_id);
        self.events.publish(
            draft_id,
            DraftEvent::DraftResumed {
                draft_id: draft_id.to_string(),
                deadline: session.deadline,
            },
        );
        self.arm_timers(&session);
        Ok(session.view())
    }

    // ------------------------------------------------------------------
    // Picks
    // ------------------------------------------------------------------

    /// A client's snake pick.
    pub async fn submit_pick(
        &self,
        draft_id: &str,
        team_id: &str,
        player_id: &str,
        tag: Option<String>,
    ) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let mut session = handle.lock().await;
        if session.mode() != DraftMode::Snake {
            return Err(DraftError::UnsupportedForMode {
                operation: "submit_pick",
                mode: session.mode(),
            });
        }

        let mut request = PickRequest::new(team_id, player_id);
        request.tag = tag;
        self.executor.execute(&mut session, request, Utc::now())?;
        self.after_change(&session);
        Ok(session.view())
    }

    pub async fn undo_last_pick(&self, draft_id: &str) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let mut session = handle.lock().await;
        self.executor.undo_last(&mut session, Utc::now())?;
        self.arm_timers(&session);
        Ok(session.view())
    }

    // ------------------------------------------------------------------
    // Auction
    // ------------------------------------------------------------------

    pub async fn nominate(
        &self,
        draft_id: &str,
        team_id: &str,
        player_id: &str,
        starting_bid: u32,
    ) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let mut session = handle.lock().await;
        self.check_auction_live(&session, "nominate")?;
        let position = self
            .catalog
            .player(player_id)
            .map(|p| p.position.clone())
            .ok_or_else(|| DraftError::UnknownPlayer {
                player_id: player_id.to_string(),
            })?;

        let bid_deadline = Utc::now() + session.settings.bid_timer();
        let nomination = session.nominate(
            team_id,
            player_id,
            &position,
            starting_bid,
            Some(bid_deadline),
        )?;
        info!(
            "Draft {}: {} nominated {} at ${}",
            draft_id, team_id, player_id, starting_bid
        );
        self.events.publish(
            draft_id,
            DraftEvent::AuctionNomination {
                draft_id: draft_id.to_string(),
                player_id: nomination.player_id,
                nominated_by: nomination.nominated_by,
                current_bid: nomination.current_bid,
                bid_deadline: nomination.bid_deadline,
            },
        );
        self.arm_timers(&session);
        Ok(session.view())
    }

    pub async fn place_bid(
        &self,
        draft_id: &str,
        team_id: &str,
        amount: u32,
    ) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let mut session = handle.lock().await;
        self.check_auction_live(&session, "place_bid")?;

        let bid_deadline = Utc::now() + session.settings.bid_timer();
        let nomination = session.place_bid(team_id, amount, Some(bid_deadline))?;
        debug!("Draft {}: {} bid ${} on {}", draft_id, team_id, amount, nomination.player_id);
        self.events.publish(
            draft_id,
            DraftEvent::AuctionBid {
                draft_id: draft_id.to_string(),
                player_id: nomination.player_id,
                current_bid: nomination.current_bid,
                current_bidder_team_id: nomination.current_bidder_team_id,
                bid_deadline: nomination.bid_deadline,
            },
        );
        self.arm_timers(&session);
        Ok(session.view())
    }

    fn check_auction_live(
        &self,
        session: &DraftSession,
        operation: &'static str,
    ) -> Result<(), DraftError> {
        if session.status != DraftStatus::InProgress {
            return Err(DraftError::DraftNotInProgress);
        }
        if session.mode() != DraftMode::Auction {
            return Err(DraftError::UnsupportedForMode {
                operation,
                mode: session.mode(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries and recovery
    // ------------------------------------------------------------------

    pub async fn view(&self, draft_id: &str) -> Result<DraftView, DraftError> {
        let handle = self.session(draft_id)?;
        let session = handle.lock().await;
        Ok(session.view())
    }

    /// Load every IN_PROGRESS or PAUSED draft from the store and re-arm its
    /// timers. Snake deadlines are re-derived from the last pick (or the
    /// start time). Returns the number of drafts recovered.
    pub async fn recover(&self) -> Result<usize, DraftError> {
        let mut recovered = 0;
        for draft_id in self.store.active_draft_ids()? {
            if self.registry().contains_key(&draft_id) {
                continue;
            }
            let Some(mut session) = self.store.load_draft(&draft_id)? else {
                continue;
            };
            self.resume_clock(&mut session);
            info!(
                "Recovered draft {} ({}, pick {})",
                draft_id, session.status, session.current_pick
            );
            self.registry()
                .insert(draft_id, Arc::new(AsyncMutex::new(session)));
            recovered += 1;
        }
        Ok(recovered)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Follow-up after a committed pick: retire a completed draft, or arm
    /// the timer for the next turn.
    fn after_change(&self, session: &DraftSession) {
        if session.status == DraftStatus::Completed {
            self.cancel_timers(&session.id);
            self.registry().remove(&session.id);
            debug!("Draft {} retired from the registry", session.id);
        } else {
            self.arm_timers(session);
        }
    }

    fn cancel_timers(&self, draft_id: &str) {
        self.autopick.cancel(draft_id);
        self.bid_timers.cancel(draft_id);
    }

    /// Make the pending timers match the session: at most one auto-pick
    /// timer for a running snake draft, at most one bid timer for an
    /// auction in the bidding phase.
    fn arm_timers(&self, session: &DraftSession) {
        if session.status != DraftStatus::InProgress {
            self.cancel_timers(&session.id);
            return;
        }
        let deadline = session.deadline;
        match session.mode() {
            DraftMode::Snake => match deadline {
                Some(deadline) => self.arm_autopick(&session.id, deadline),
                None => {
                    self.autopick.cancel(&session.id);
                }
            },
            DraftMode::Auction => {
                self.autopick.cancel(&session.id);
                let bidding = session
                    .auction
                    .as_ref()
                    .is_some_and(|a| a.phase() == AuctionPhase::Bidding);
                match deadline {
                    Some(deadline) if bidding => self.arm_bid_timer(&session.id, deadline),
                    _ => {
                        self.bid_timers.cancel(&session.id);
                    }
                }
            }
            DraftMode::None => self.cancel_timers(&session.id),
        }
    }

    fn arm_autopick(&self, draft_id: &str, deadline: DateTime<Utc>) {
        let this = self.this.clone();
        let id = draft_id.to_string();
        self.autopick
            .schedule(draft_id, deadline, Utc::now(), move |token| async move {
                if let Some(coordinator) = this.upgrade() {
                    coordinator.fire_autopick(&id, token).await;
                }
            });
    }

    fn arm_bid_timer(&self, draft_id: &str, deadline: DateTime<Utc>) {
        let this = self.this.clone();
        let id = draft_id.to_string();
        let delay = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.bid_timers
            .schedule(draft_id, delay, deadline, move |token| async move {
                if let Some(coordinator) = this.upgrade() {
                    coordinator.fire_bid_timer(&id, token).await;
                }
            });
    }

    /// Auto-pick for the team on the clock: best-ranked available player
    /// that fits its roster.
    async fn fire_autopick(&self, draft_id: &str, token: u64) {
        let cached = self.registry().get(draft_id).cloned();
        let Some(handle) = cached else {
            return;
        };
        let mut session = handle.lock().await;
        if !self.autopick.claim(draft_id, token) {
            debug!("Draft {}: stale auto-pick timer {} ignored", draft_id, token);
            return;
        }
        if session.status != DraftStatus::InProgress || session.mode() != DraftMode::Snake {
            warn!(
                "Draft {}: auto-pick abandoned, draft is {}",
                draft_id, session.status
            );
            return;
        }
        let Some(team_id) = session.snake_drafter().map(str::to_string) else {
            return;
        };

        let choice = self
            .catalog
            .best_available(&|id: &str| session.is_drafted(id), &|p: &CatalogPlayer| {
                session.has_slot_for(&team_id, &p.position)
            })
            .map(|p| p.player_id.clone());
        let Some(player_id) = choice else {
            error!(
                "Draft {}: no eligible player for {} on pick {}; leaving the team on the clock",
                draft_id, team_id, session.current_pick
            );
            return;
        };

        let request = PickRequest {
            team_id: team_id.clone(),
            player_id,
            amount: None,
            tag: Some(AUTO_PICK_TAG.to_string()),
            is_auto_pick: true,
        };
        match self.executor.execute(&mut session, request, Utc::now()) {
            Ok(outcome) => {
                info!(
                    "Draft {}: auto-picked {} for {}",
                    draft_id, outcome.pick.player_id, team_id
                );
                self.after_change(&session);
            }
            Err(e) => warn!("Draft {}: auto-pick for {} abandoned: {}", draft_id, team_id, e),
        }
    }

    /// Close the open nomination and award the player to the high bidder.
    async fn fire_bid_timer(&self, draft_id: &str, token: u64) {
        let cached = self.registry().get(draft_id).cloned();
        let Some(handle) = cached else {
            return;
        };
        let mut session = handle.lock().await;
        if !self.bid_timers.claim(draft_id, token) {
            debug!("Draft {}: stale bid timer {} ignored", draft_id, token);
            return;
        }
        if session.status != DraftStatus::InProgress {
            warn!(
                "Draft {}: settlement abandoned, draft is {}",
                draft_id, session.status
            );
            return;
        }
        let settlement = match session.auction.as_ref().map(|a| a.settlement()) {
            Some(Ok(settlement)) => settlement,
            _ => {
                warn!("Draft {}: bid timer fired with no open nomination", draft_id);
                return;
            }
        };

        let request = PickRequest {
            team_id: settlement.team_id.clone(),
            player_id: settlement.player_id.clone(),
            amount: Some(settlement.amount),
            tag: None,
            is_auto_pick: false,
        };
        match self.executor.execute(&mut session, request, Utc::now()) {
            Ok(_) => {
                info!(
                    "Draft {}: {} won {} for ${}",
                    draft_id, settlement.team_id, settlement.player_id, settlement.amount
                );
                self.after_change(&session);
            }
            Err(e) => {
                error!(
                    "Draft {}: could not award {} to {}: {}; nomination discarded",
                    draft_id, settlement.player_id, settlement.team_id, e
                );
                if let Some(engine) = session.auction.as_mut() {
                    engine.discard_nomination();
                }
                session.deadline = None;
                self.executor.announce_nominator(&session);
            }
        }
    }
}

/// An explicit draft order must list every league team exactly once.
fn validate_order(order: &[String], league: &[String]) -> Result<(), DraftError> {
    let known: HashSet<&str> = league.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    for team_id in order {
        if !known.contains(team_id.as_str()) {
            return Err(DraftError::UnknownTeam {
                team_id: team_id.clone(),
            });
        }
        if !seen.insert(team_id.as_str()) {
            return Err(DraftError::InvalidConfiguration(format!(
                "team {team_id} appears twice in the draft order"
            )));
        }
    }
    if seen.len() != known.len() {
        return Err(DraftError::InvalidConfiguration(format!(
            "draft order lists {} of {} teams",
            seen.len(),
            known.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn order_must_be_permutation_of_league() {
        let league = ids(&["a", "b", "c"]);
        assert!(validate_order(&ids(&["c", "a", "b"]), &league).is_ok());
        assert!(matches!(
            validate_order(&ids(&["a", "b", "z"]), &league).unwrap_err(),
            DraftError::UnknownTeam { .. }
        ));
        assert!(matches!(
            validate_order(&ids(&["a", "a", "b"]), &league).unwrap_err(),
            DraftError::InvalidConfiguration(_)
        ));
        assert!(matches!(
            validate_order(&ids(&["a", "b"]), &league).unwrap_err(),
            DraftError::InvalidConfiguration(_)
        ));
    }

    #[test]
    fn generated_ids_have_fixed_shape() {
        let a = generate_draft_id();
        let b = generate_draft_id();
        assert!(a.starts_with("draft_"));
        assert_eq!(a.len(), "draft_20260228_143022_123_abcd".len());
        assert_eq!(b.len(), a.len());
    }
}
