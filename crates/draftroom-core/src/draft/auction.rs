// Auction nomination/bidding state machine.
//
// The engine only tracks the live nomination and whose turn it is to
// nominate. Budgets, rosters and drafted players live on the session and
// are read through `AuctionLedger`; awarding a player goes through the pick
// executor like any other pick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::turn;
use crate::error::DraftError;

/// Read access to the draft state the auction rules depend on.
pub trait AuctionLedger {
    /// Whether the player already belongs to a team in this draft.
    fn is_drafted(&self, player_id: &str) -> bool;
    /// Largest bid the team may make right now, or `None` for an unknown
    /// team.
    fn max_bid(&self, team_id: &str) -> Option<u32>;
    /// Whether the team's roster has no open draftable slot.
    fn roster_full(&self, team_id: &str) -> bool;
    /// Whether the team has an open slot a player at `position` fits.
    fn has_slot_for(&self, team_id: &str, position: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionPhase {
    Nomination,
    Bidding,
}

/// The player currently up for bids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nomination {
    pub player_id: String,
    pub position: String,
    pub nominated_by: String,
    pub current_bid: u32,
    pub current_bidder_team_id: String,
    pub min_increment: u32,
    /// When bidding closes unless another bid arrives.
    pub bid_deadline: Option<DateTime<Utc>>,
}

impl Nomination {
    /// Smallest bid that beats the current one.
    pub fn minimum_next_bid(&self) -> u32 {
        self.current_bid.saturating_add(self.min_increment.max(1))
    }
}

/// Who wins a closed nomination and for how much.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub player_id: String,
    pub team_id: String,
    pub amount: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionEngine {
    nomination_order: Vec<String>,
    /// Slot after the previous nominator; the next nominator is the first
    /// team at or after this index whose roster still has room.
    nominating_team_index: usize,
    nominations_completed: usize,
    current: Option<Nomination>,
    min_increment: u32,
}

impl AuctionEngine {
    pub fn new(nomination_order: Vec<String>, min_increment: u32) -> Self {
        AuctionEngine {
            nomination_order,
            nominating_team_index: 0,
            nominations_completed: 0,
            current: None,
            min_increment: min_increment.max(1),
        }
    }

    /// Reconstruct the engine from the settled nominations.
    ///
    /// `open_slots[i]` is how many draftable slots team `i` of the order had
    /// when the draft started (keepers already placed). `winners` lists the
    /// team that won each settled nomination, oldest first. The rotation is
    /// replayed against the rosters as they filled, so skipped full rosters
    /// land exactly where they did live. Any in-flight nomination is gone.
    pub fn rebuild(
        nomination_order: Vec<String>,
        min_increment: u32,
        open_slots: &[usize],
        winners: &[&str],
    ) -> Self {
        let len = nomination_order.len();
        let mut open: Vec<usize> = (0..len)
            .map(|idx| open_slots.get(idx).copied().unwrap_or(0))
            .collect();
        let mut next_index = 0;
        for winner in winners {
            if let Some(nominator) = turn::nominator_index(next_index, len, |idx| open[idx] > 0) {
                next_index = (nominator + 1) % len;
            }
            if let Some(idx) = nomination_order.iter().position(|t| t == winner) {
                open[idx] = open[idx].saturating_sub(1);
            }
        }

        let mut engine = Self::new(nomination_order, min_increment);
        engine.nominating_team_index = next_index;
        engine.nominations_completed = winners.len();
        engine
    }

    pub fn phase(&self) -> AuctionPhase {
        if self.current.is_some() {
            AuctionPhase::Bidding
        } else {
            AuctionPhase::Nomination
        }
    }

    pub fn current(&self) -> Option<&Nomination> {
        self.current.as_ref()
    }

    pub fn nomination_order(&self) -> &[String] {
        &self.nomination_order
    }

    pub fn nominating_team_index(&self) -> usize {
        self.nominating_team_index
    }

    pub fn nominations_completed(&self) -> usize {
        self.nominations_completed
    }

    /// The team whose turn it is to nominate, skipping full rosters.
    pub fn nominator<'a>(&'a self, ledger: &impl AuctionLedger) -> Option<&'a str> {
        turn::nominator_index(
            self.nominating_team_index,
            self.nomination_order.len(),
            |idx| !ledger.roster_full(&self.nomination_order[idx]),
        )
        .map(|idx| self.nomination_order[idx].as_str())
    }

    /// Put a player up for bids with the nominator as provisional high
    /// bidder. `position` is the player's catalog position; the nominator
    /// must have a slot for it.
    pub fn nominate(
        &mut self,
        ledger: &impl AuctionLedger,
        team_id: &str,
        player_id: &str,
        position: &str,
        starting_bid: u32,
        bid_deadline: Option<DateTime<Utc>>,
    ) -> Result<&Nomination, DraftError> {
        if self.current.is_some() {
            return Err(DraftError::NotInNominationPhase);
        }
        if self.nominator(ledger) != Some(team_id) {
            return Err(DraftError::NotYourTurnToNominate {
                team_id: team_id.to_string(),
            });
        }
        if ledger.is_drafted(player_id) {
            return Err(DraftError::PlayerAlreadyDrafted {
                player_id: player_id.to_string(),
            });
        }
        if !ledger.has_slot_for(team_id, position) {
            return Err(DraftError::NoOpenRosterSlot {
                team_id: team_id.to_string(),
                position: position.to_string(),
            });
        }
        if starting_bid < 1 {
            return Err(DraftError::MinimumBidNotMet {
                amount: starting_bid,
                minimum: 1,
            });
        }
        let available = ledger.max_bid(team_id).ok_or_else(|| DraftError::UnknownTeam {
            team_id: team_id.to_string(),
        })?;
        if starting_bid > available {
            return Err(DraftError::InsufficientBudget {
                team_id: team_id.to_string(),
                amount: starting_bid,
                available,
            });
        }

        Ok(self.current.insert(Nomination {
            player_id: player_id.to_string(),
            position: position.to_string(),
            nominated_by: team_id.to_string(),
            current_bid: starting_bid,
            current_bidder_team_id: team_id.to_string(),
            min_increment: self.min_increment,
            bid_deadline,
        }))
    }

    /// Raise the high bid on the open nomination.
    pub fn place_bid(
        &mut self,
        ledger: &impl AuctionLedger,
        team_id: &str,
        amount: u32,
        bid_deadline: Option<DateTime<Utc>>,
    ) -> Result<&Nomination, DraftError> {
        let Some(nomination) = self.current.as_mut() else {
            return Err(DraftError::NoActiveNomination);
        };
        if nomination.current_bidder_team_id == team_id {
            return Err(DraftError::AlreadyHighBidder {
                team_id: team_id.to_string(),
            });
        }
        let available = ledger.max_bid(team_id).ok_or_else(|| DraftError::UnknownTeam {
            team_id: team_id.to_string(),
        })?;
        if ledger.roster_full(team_id) {
            return Err(DraftError::RosterFull {
                team_id: team_id.to_string(),
            });
        }
        if !ledger.has_slot_for(team_id, &nomination.position) {
            return Err(DraftError::NoOpenRosterSlot {
                team_id: team_id.to_string(),
                position: nomination.position.clone(),
            });
        }
        let minimum = nomination.minimum_next_bid();
        if amount < minimum {
            return Err(DraftError::MinimumBidNotMet { amount, minimum });
        }
        if amount > available {
            return Err(DraftError::InsufficientBudget {
                team_id: team_id.to_string(),
                amount,
                available,
            });
        }

        nomination.current_bid = amount;
        nomination.current_bidder_team_id = team_id.to_string();
        nomination.bid_deadline = bid_deadline;
        Ok(nomination)
    }

    /// The award owed for the open nomination.
    pub fn settlement(&self) -> Result<Settlement, DraftError> {
        let nomination = self.current.as_ref().ok_or(DraftError::NoActiveNomination)?;
        Ok(Settlement {
            player_id: nomination.player_id.clone(),
            team_id: nomination.current_bidder_team_id.clone(),
            amount: nomination.current_bid,
        })
    }

    /// The team that must receive the open nomination's player, if bidding.
    pub fn high_bidder(&self) -> Option<&str> {
        self.current
            .as_ref()
            .map(|n| n.current_bidder_team_id.as_str())
    }

    /// Close the open nomination after its pick committed and pass the
    /// nomination turn to the team after the one that nominated.
    pub fn complete_nomination(&mut self) {
        let len = self.nomination_order.len();
        let nominated_by = self.current.take().and_then(|n| {
            self.nomination_order
                .iter()
                .position(|t| *t == n.nominated_by)
        });
        self.nominations_completed += 1;
        if len > 0 {
            let last = nominated_by.unwrap_or(self.nominating_team_index);
            self.nominating_team_index = (last + 1) % len;
        }
    }

    /// Move the open nomination's closing time (resume after a pause).
    pub fn set_bid_deadline(&mut self, bid_deadline: Option<DateTime<Utc>>) {
        if let Some(nomination) = self.current.as_mut() {
            nomination.bid_deadline = bid_deadline;
        }
    }

    /// Drop the open nomination without awarding anyone.
    pub fn discard_nomination(&mut self) -> Option<Nomination> {
        self.current.take()
    }
}
