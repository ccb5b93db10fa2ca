// Draft session: the aggregate root for one draft.
//
// Holds counters, status, drafter order, team rosters and budgets, the pick
// log and (auction) the live nomination state. Mutation helpers here assume
// the caller already validated the action; `PickExecutor` and
// `DraftCoordinator` own the validation order.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::auction::{AuctionEngine, AuctionLedger, AuctionPhase, Nomination};
use super::budget::TeamBudget;
use super::pick::{DraftMode, DraftPick, DraftStatus};
use super::roster::{Roster, RosteredPlayer, INJURED_SLOT};
use super::turn::{self, DrafterSlot};
use crate::catalog::{CatalogPlayer, PlayerCatalog};
use crate::error::DraftError;
use crate::store::StoredDraft;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Rules fixed when the draft is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftSettings {
    pub mode: DraftMode,
    /// Snake rounds. Auction drafts use the number of draftable roster
    /// slots.
    pub total_rounds: u32,
    /// Seconds each snake drafter has before the auto-pick fires.
    pub time_per_pick_seconds: u64,
    /// Auction budget per team.
    pub salary_cap: u32,
    /// Position -> slot count.
    pub roster: HashMap<String, usize>,
    /// Seconds of silence that close an auction nomination.
    pub bid_timer_seconds: u64,
    pub min_bid_increment: u32,
    /// Dollars held back for every open roster slot other than the one
    /// being bid on.
    pub reserve_per_open_slot: u32,
}

impl Default for DraftSettings {
    fn default() -> Self {
        let roster = [
            ("QB", 1),
            ("RB", 2),
            ("WR", 2),
            ("TE", 1),
            ("FLEX", 1),
            ("K", 1),
            ("DEF", 1),
            ("BE", 6),
        ]
        .into_iter()
        .map(|(pos, n)| (pos.to_string(), n))
        .collect();

        DraftSettings {
            mode: DraftMode::Snake,
            total_rounds: 15,
            time_per_pick_seconds: 90,
            salary_cap: 200,
            roster,
            bid_timer_seconds: 30,
            min_bid_increment: 1,
            reserve_per_open_slot: 1,
        }
    }
}

impl DraftSettings {
    /// Roster slots a team can draft into (everything but IL).
    pub fn draftable_slots(&self) -> usize {
        self.roster
            .iter()
            .filter(|(pos, _)| !pos.eq_ignore_ascii_case(INJURED_SLOT))
            .map(|(_, &n)| n)
            .sum()
    }

    pub fn time_per_pick(&self) -> Duration {
        Duration::seconds(self.time_per_pick_seconds as i64)
    }

    pub fn bid_timer(&self) -> Duration {
        Duration::seconds(self.bid_timer_seconds as i64)
    }

    pub fn validate(&self, team_count: usize) -> Result<(), DraftError> {
        let invalid = |msg: String| Err(DraftError::InvalidConfiguration(msg));

        if team_count == 0 {
            return invalid("a draft needs at least one team".into());
        }
        let draftable = self.draftable_slots();
        if draftable == 0 {
            return invalid("roster has no draftable slots".into());
        }
        match self.mode {
            DraftMode::Snake => {
                if self.total_rounds == 0 {
                    return invalid("total_rounds must be at least 1".into());
                }
                if self.total_rounds as usize > draftable {
                    return invalid(format!(
                        "total_rounds ({}) exceeds draftable roster slots ({draftable})",
                        self.total_rounds
                    ));
                }
                if self.time_per_pick_seconds == 0 {
                    return invalid("time_per_pick_seconds must be at least 1".into());
                }
            }
            DraftMode::Auction => {
                if team_count < 2 {
                    return invalid("an auction needs at least two teams".into());
                }
                if self.bid_timer_seconds == 0 {
                    return invalid("bid_timer_seconds must be at least 1".into());
                }
                if self.min_bid_increment == 0 {
                    return invalid("min_bid_increment must be at least 1".into());
                }
                let needed = (draftable as u32).saturating_mul(self.reserve_per_open_slot.max(1));
                if self.salary_cap < needed {
                    return invalid(format!(
                        "salary_cap ({}) cannot fill {draftable} slots",
                        self.salary_cap
                    ));
                }
            }
            DraftMode::None => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamState {
    pub team_id: String,
    pub team_name: String,
    pub roster: Roster,
    /// Present in auction drafts only.
    pub budget: Option<TeamBudget>,
}

/// Auction rules' view of the teams and pick log.
struct TeamLedger<'a> {
    teams: &'a [TeamState],
    picks: &'a [DraftPick],
    reserve_per_open_slot: u32,
}

impl AuctionLedger for TeamLedger<'_> {
    fn is_drafted(&self, player_id: &str) -> bool {
        self.picks.iter().any(|p| p.player_id == player_id)
    }

    fn max_bid(&self, team_id: &str) -> Option<u32> {
        let team = self.teams.iter().find(|t| t.team_id == team_id)?;
        let remaining = team.budget.as_ref().map_or(0, |b| b.remaining);
        Some(team.roster.max_bid(remaining, self.reserve_per_open_slot))
    }

    fn roster_full(&self, team_id: &str) -> bool {
        self.teams
            .iter()
            .find(|t| t.team_id == team_id)
            .map_or(true, |t| t.roster.is_full())
    }

    fn has_slot_for(&self, team_id: &str, position: &str) -> bool {
        self.teams
            .iter()
            .find(|t| t.team_id == team_id)
            .is_some_and(|t| t.roster.slot_for(position).is_some())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DraftSession {
    pub id: String,
    pub league_id: String,
    pub season: i32,
    pub settings: DraftSettings,
    pub status: DraftStatus,
    /// Next non-keeper pick number (1-based).
    pub current_pick: u32,
    pub current_round: u32,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_pick_at: Option<DateTime<Utc>>,
    /// When the current turn (snake) or open nomination (auction) times
    /// out. Never persisted.
    pub deadline: Option<DateTime<Utc>>,
    /// Fixed at start. Doubles as the auction nomination order.
    pub order: Vec<DrafterSlot>,
    pub teams: Vec<TeamState>,
    /// Every committed pick, keepers included, in commit order.
    pub picks: Vec<DraftPick>,
    pub auction: Option<AuctionEngine>,
    /// Optimistic-concurrency counter, bumped by every persisted change.
    pub version: u64,
}

impl DraftSession {
    /// Create a SCHEDULED draft.
    ///
    /// `teams` is a list of (team_id, team_name) pairs in league order.
    pub fn new(
        id: &str,
        league_id: &str,
        season: i32,
        mut settings: DraftSettings,
        teams: Vec<(String, String)>,
    ) -> Result<Self, DraftError> {
        let mut seen = HashSet::new();
        if let Some((dup, _)) = teams.iter().find(|(id, _)| !seen.insert(id.as_str())) {
            return Err(DraftError::InvalidConfiguration(format!(
                "team {dup} listed twice"
            )));
        }
        settings.validate(teams.len())?;
        if settings.mode == DraftMode::Auction {
            settings.total_rounds = settings.draftable_slots() as u32;
        }

        let teams = teams
            .into_iter()
            .map(|(team_id, team_name)| TeamState {
                roster: Roster::new(&settings.roster),
                budget: (settings.mode == DraftMode::Auction)
                    .then(|| TeamBudget::new(&team_id, season, settings.salary_cap)),
                team_id,
                team_name,
            })
            .collect();

        Ok(DraftSession {
            id: id.to_string(),
            league_id: league_id.to_string(),
            season,
            settings,
            status: DraftStatus::Scheduled,
            current_pick: 1,
            current_round: 1,
            scheduled_for: None,
            start_time: None,
            end_time: None,
            last_pick_at: None,
            deadline: None,
            order: Vec::new(),
            teams,
            picks: Vec::new(),
            auction: None,
            version: 0,
        })
    }

    /// Rebuild a live session from its persisted form. The auction engine is
    /// re-derived from the pick count; an in-flight nomination is not
    /// recoverable and the engine starts in the nomination phase.
    pub fn restore(stored: StoredDraft) -> Self {
        let StoredDraft {
            id,
            league_id,
            season,
            settings,
            status,
            current_pick,
            current_round,
            scheduled_for,
            start_time,
            end_time,
            last_pick_at,
            version,
            teams,
            order,
            picks,
            roster_entries,
            budgets,
        } = stored;

        let mut budgets: HashMap<String, TeamBudget> = budgets
            .into_iter()
            .map(|b| (b.team_id.clone(), b))
            .collect();

        let mut teams: Vec<TeamState> = teams
            .into_iter()
            .map(|(team_id, team_name)| TeamState {
                roster: Roster::new(&settings.roster),
                budget: budgets.remove(&team_id),
                team_id,
                team_name,
            })
            .collect();

        for entry in roster_entries {
            let Some(team) = teams.iter_mut().find(|t| t.team_id == entry.team_id) else {
                warn!("roster entry for unknown team {} in draft {}", entry.team_id, id);
                continue;
            };
            let player = RosteredPlayer {
                player_id: entry.player_id.clone(),
                position: entry.position,
                price: entry.price,
            };
            if !team.roster.place(&entry.slot, player.clone())
                && team.roster.add_player(player).is_none()
            {
                warn!(
                    "no room to restore {} on team {} in draft {}",
                    entry.player_id, entry.team_id, id
                );
            }
        }

        let mut session = DraftSession {
            id,
            league_id,
            season,
            settings,
            status,
            current_pick,
            current_round,
            scheduled_for,
            start_time,
            end_time,
            last_pick_at,
            deadline: None,
            order,
            teams,
            picks,
            auction: None,
            version,
        };
        if session.settings.mode == DraftMode::Auction && session.status.is_live() {
            session.auction = Some(session.rebuild_auction());
        }
        session
    }

    /// Auction engine re-derived from the pick log: each team's open slots
    /// at the start (after keepers) and the winner of every settled
    /// nomination.
    fn rebuild_auction(&self) -> AuctionEngine {
        let order = self.order_team_ids();
        let open_slots: Vec<usize> = order
            .iter()
            .map(|team_id| {
                let slots = self.team(team_id).map_or(0, |t| t.roster.draftable_count());
                let keepers = self
                    .picks
                    .iter()
                    .filter(|p| p.is_keeper() && p.team_id == *team_id)
                    .count();
                slots.saturating_sub(keepers)
            })
            .collect();
        let winners: Vec<&str> = self
            .picks
            .iter()
            .filter(|p| !p.is_keeper())
            .map(|p| p.team_id.as_str())
            .collect();
        AuctionEngine::rebuild(
            order,
            self.settings.min_bid_increment,
            &open_slots,
            &winners,
        )
    }

    // -- lookups --

    pub fn mode(&self) -> DraftMode {
        self.settings.mode
    }

    pub fn team(&self, team_id: &str) -> Option<&TeamState> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }

    pub fn is_drafted(&self, player_id: &str) -> bool {
        self.picks.iter().any(|p| p.player_id == player_id)
    }

    /// Number of non-keeper picks.
    pub fn live_pick_count(&self) -> usize {
        self.picks.iter().filter(|p| !p.is_keeper()).count()
    }

    pub fn keeper_count(&self) -> usize {
        self.picks.iter().filter(|p| p.is_keeper()).count()
    }

    /// Most recent non-keeper pick.
    pub fn last_live_pick(&self) -> Option<&DraftPick> {
        self.picks.iter().rev().find(|p| !p.is_keeper())
    }

    pub fn order_team_ids(&self) -> Vec<String> {
        self.order.iter().map(|s| s.team_id.clone()).collect()
    }

    /// Whether the team has an open slot a player at `position` fits.
    pub fn has_slot_for(&self, team_id: &str, position: &str) -> bool {
        self.team(team_id)
            .is_some_and(|t| t.roster.slot_for(position).is_some())
    }

    pub fn all_rosters_full(&self) -> bool {
        self.teams.iter().all(|t| t.roster.is_full())
    }

    /// Largest bid the team may place now.
    pub fn max_bid(&self, team_id: &str) -> Option<u32> {
        self.ledger().max_bid(team_id)
    }

    fn ledger(&self) -> TeamLedger<'_> {
        TeamLedger {
            teams: &self.teams,
            picks: &self.picks,
            reserve_per_open_slot: self.settings.reserve_per_open_slot,
        }
    }

    /// Snake team on the clock for `current_pick`.
    pub fn snake_drafter(&self) -> Option<&str> {
        turn::snake_drafter(self.current_pick, &self.order).map(|s| s.team_id.as_str())
    }

    /// Team entitled to the next committed pick: the snake drafter, or the
    /// high bidder of the open nomination.
    pub fn pick_owner(&self) -> Option<&str> {
        match self.settings.mode {
            DraftMode::Snake => self.snake_drafter(),
            DraftMode::Auction => self.auction.as_ref().and_then(|a| a.high_bidder()),
            DraftMode::None => None,
        }
    }

    pub fn nominator(&self) -> Option<&str> {
        let engine = self.auction.as_ref()?;
        engine.nominator(&self.ledger())
    }

    /// Team whose action the draft is waiting on.
    pub fn on_the_clock(&self) -> Option<&str> {
        if self.status == DraftStatus::Completed || self.order.is_empty() {
            return None;
        }
        match self.settings.mode {
            DraftMode::Auction => self.pick_owner().or_else(|| self.nominator()),
            _ => self.pick_owner(),
        }
    }

    // -- auction actions (in-memory only; nothing is persisted until the
    // nomination settles) --

    pub fn nominate(
        &mut self,
        team_id: &str,
        player_id: &str,
        position: &str,
        starting_bid: u32,
        bid_deadline: Option<DateTime<Utc>>,
    ) -> Result<Nomination, DraftError> {
        let ledger = TeamLedger {
            teams: &self.teams,
            picks: &self.picks,
            reserve_per_open_slot: self.settings.reserve_per_open_slot,
        };
        let engine = self.auction.as_mut().ok_or(DraftError::UnsupportedForMode {
            operation: "nominate",
            mode: self.settings.mode,
        })?;
        let nomination = engine
            .nominate(&ledger, team_id, player_id, position, starting_bid, bid_deadline)?
            .clone();
        self.deadline = bid_deadline;
        Ok(nomination)
    }

    pub fn place_bid(
        &mut self,
        team_id: &str,
        amount: u32,
        bid_deadline: Option<DateTime<Utc>>,
    ) -> Result<Nomination, DraftError> {
        let ledger = TeamLedger {
            teams: &self.teams,
            picks: &self.picks,
            reserve_per_open_slot: self.settings.reserve_per_open_slot,
        };
        let engine = self.auction.as_mut().ok_or(DraftError::UnsupportedForMode {
            operation: "place_bid",
            mode: self.settings.mode,
        })?;
        let nomination = engine
            .place_bid(&ledger, team_id, amount, bid_deadline)?
            .clone();
        self.deadline = bid_deadline;
        Ok(nomination)
    }

    // -- pick bookkeeping --

    /// Place the pick's player on the team's roster, debit the budget when
    /// the pick carries an amount, and append the pick. Returns the roster
    /// slot used. Nothing changes on error.
    pub(crate) fn record_pick(
        &mut self,
        pick: DraftPick,
        position: &str,
    ) -> Result<String, DraftError> {
        let team = self
            .teams
            .iter_mut()
            .find(|t| t.team_id == pick.team_id)
            .ok_or_else(|| DraftError::UnknownTeam {
                team_id: pick.team_id.clone(),
            })?;

        if team.roster.slot_for(position).is_none() {
            return Err(DraftError::NoOpenRosterSlot {
                team_id: pick.team_id.clone(),
                position: position.to_string(),
            });
        }
        if let (Some(amount), Some(budget)) = (pick.amount, team.budget.as_mut()) {
            budget.debit(amount, position)?;
        }
        let slot = team
            .roster
            .add_player(RosteredPlayer {
                player_id: pick.player_id.clone(),
                position: position.to_string(),
                price: pick.amount,
            })
            .ok_or_else(|| DraftError::NoOpenRosterSlot {
                team_id: pick.team_id.clone(),
                position: position.to_string(),
            })?;

        self.picks.push(pick);
        Ok(slot)
    }

    /// Move the counters past a committed non-keeper pick and settle what
    /// comes next: completion, or the deadline of the next turn.
    pub(crate) fn advance(&mut self, now: DateTime<Utc>, catalog: &dyn PlayerCatalog) {
        let drafters = self.order.len() as u32;
        self.current_pick += 1;
        self.current_round = turn::round_for_pick(self.current_pick, drafters);
        self.last_pick_at = Some(now);
        if let Some(engine) = self.auction.as_mut() {
            engine.complete_nomination();
        }

        if self.settings.mode == DraftMode::Snake {
            self.skip_full_rosters();
        }

        let complete = match self.settings.mode {
            DraftMode::Snake => self.current_round > self.settings.total_rounds,
            DraftMode::Auction => {
                self.all_rosters_full()
                    || catalog
                        .best_available(&|id: &str| self.is_drafted(id), &|_: &CatalogPlayer| true)
                        .is_none()
            }
            DraftMode::None => false,
        };

        if complete {
            self.status = DraftStatus::Completed;
            self.end_time = Some(now);
            self.deadline = None;
            self.auction = None;
        } else {
            self.deadline = self.turn_deadline(now);
        }
    }

    /// Move a snake draft past turns that belong to teams with no open
    /// slot. Keepers fill rosters early, so such a team forfeits its
    /// remaining turns instead of stalling the draft.
    pub(crate) fn skip_full_rosters(&mut self) {
        let drafters = self.order.len() as u32;
        while self.current_round <= self.settings.total_rounds {
            let full = self
                .snake_drafter()
                .and_then(|team_id| self.team(team_id))
                .is_some_and(|team| team.roster.is_full());
            if !full {
                break;
            }
            debug!(
                "Draft {}: skipping pick {}, roster of {} is full",
                self.id,
                self.current_pick,
                self.snake_drafter().unwrap_or_default()
            );
            self.current_pick += 1;
            self.current_round = turn::round_for_pick(self.current_pick, drafters);
        }
    }

    /// Deadline for a turn that starts at `from`: snake turns are timed,
    /// auction nominations are not.
    pub fn turn_deadline(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match (self.settings.mode, self.status) {
            (DraftMode::Snake, DraftStatus::InProgress) => {
                Some(from + self.settings.time_per_pick())
            }
            _ => None,
        }
    }

    /// Remove the most recent non-keeper pick and roll every counter back
    /// to the moment before it. Returns the pick and its player's position.
    pub(crate) fn revert_last_pick(&mut self) -> Result<(DraftPick, String), DraftError> {
        let idx = self
            .picks
            .iter()
            .rposition(|p| !p.is_keeper())
            .ok_or(DraftError::NothingToUndo)?;
        let pick = self.picks.remove(idx);

        let mut position = String::new();
        if let Some(team) = self.teams.iter_mut().find(|t| t.team_id == pick.team_id) {
            if let Some(removed) = team.roster.remove_player(&pick.player_id) {
                position = removed.position;
            }
            if let (Some(amount), Some(budget)) = (pick.amount, team.budget.as_mut()) {
                budget.credit(amount, &position);
            }
        }

        self.current_pick = pick.pick_number.max(1) as u32;
        self.current_round = pick.round.max(1);
        self.last_pick_at = self.last_live_pick().map(|p| p.picked_at);
        if self.auction.is_some() {
            self.auction = Some(self.rebuild_auction());
        }
        Ok((pick, position))
    }

    // -- projection --

    pub fn view(&self) -> DraftView {
        DraftView {
            draft_id: self.id.clone(),
            league_id: self.league_id.clone(),
            season: self.season,
            mode: self.settings.mode,
            status: self.status,
            current_pick: self.current_pick,
            current_round: self.current_round,
            total_rounds: self.settings.total_rounds,
            on_the_clock: self.on_the_clock().map(str::to_string),
            deadline: self.deadline,
            is_complete: self.status == DraftStatus::Completed,
            scheduled_for: self.scheduled_for,
            order: self.order.clone(),
            picks: self.picks.clone(),
            budgets: self.teams.iter().filter_map(|t| t.budget.clone()).collect(),
            auction: self.auction.as_ref().map(|engine| AuctionView {
                phase: engine.phase(),
                nominator: self.nominator().map(str::to_string),
                nomination: engine.current().cloned(),
                nominations_completed: engine.nominations_completed(),
            }),
            version: self.version,
        }
    }
}

// ---------------------------------------------------------------------------
// Projection types
// ---------------------------------------------------------------------------

/// What callers see after every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    pub draft_id: String,
    pub league_id: String,
    pub season: i32,
    pub mode: DraftMode,
    pub status: DraftStatus,
    pub current_pick: u32,
    pub current_round: u32,
    pub total_rounds: u32,
    pub on_the_clock: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub is_complete: bool,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub order: Vec<DrafterSlot>,
    pub picks: Vec<DraftPick>,
    pub budgets: Vec<TeamBudget>,
    pub auction: Option<AuctionView>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionView {
    pub phase: AuctionPhase,
    pub nominator: Option<String>,
    pub nomination: Option<Nomination>,
    pub nominations_completed: usize,
}
