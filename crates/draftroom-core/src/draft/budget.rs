// Auction budget bookkeeping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DraftError;

/// A team's auction budget for one season.
///
/// `spent + remaining == total_budget` holds after every operation; only
/// [`TeamBudget::debit`] and [`TeamBudget::credit`] move money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamBudget {
    pub team_id: String,
    pub season: i32,
    pub total_budget: u32,
    pub spent: u32,
    pub remaining: u32,
    /// Spend broken down by the drafted player's position.
    #[serde(default)]
    pub spent_by_position: BTreeMap<String, u32>,
}

impl TeamBudget {
    pub fn new(team_id: &str, season: i32, total_budget: u32) -> Self {
        TeamBudget {
            team_id: team_id.to_string(),
            season,
            total_budget,
            spent: 0,
            remaining: total_budget,
            spent_by_position: BTreeMap::new(),
        }
    }

    /// Charge `amount` for a player at `position`.
    pub fn debit(&mut self, amount: u32, position: &str) -> Result<(), DraftError> {
        if amount > self.remaining {
            return Err(DraftError::InsufficientBudget {
                team_id: self.team_id.clone(),
                amount,
                available: self.remaining,
            });
        }
        self.spent += amount;
        self.remaining -= amount;
        *self
            .spent_by_position
            .entry(position.to_uppercase())
            .or_insert(0) += amount;
        Ok(())
    }

    /// Refund a previous debit (undo).
    pub fn credit(&mut self, amount: u32, position: &str) {
        let amount = amount.min(self.spent);
        self.spent -= amount;
        self.remaining += amount;
        let key = position.to_uppercase();
        if let Some(by_pos) = self.spent_by_position.get_mut(&key) {
            *by_pos = by_pos.saturating_sub(amount);
            if *by_pos == 0 {
                self.spent_by_position.remove(&key);
            }
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.spent + self.remaining == self.total_budget
    }
}
