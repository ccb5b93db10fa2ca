// Roster construction and slot assignment.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Flex slot labels. A flex slot accepts any position.
pub const FLEX_SLOTS: &[&str] = &["UTIL", "FLEX"];
/// Bench slot label.
pub const BENCH_SLOT: &str = "BE";
/// Injured-list slot label. IL slots are never filled during a draft.
pub const INJURED_SLOT: &str = "IL";

fn is_flex(label: &str) -> bool {
    FLEX_SLOTS.iter().any(|f| f.eq_ignore_ascii_case(label))
}

/// Display ordering: concrete positions, then flex, bench, IL.
fn slot_rank(label: &str) -> u8 {
    if is_flex(label) {
        1
    } else if label == BENCH_SLOT || label == "BN" {
        2
    } else if label == INJURED_SLOT {
        3
    } else {
        0
    }
}

/// A player assigned to a roster slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosteredPlayer {
    pub player_id: String,
    pub position: String,
    pub price: Option<u32>,
}

/// A single slot on a team's roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterSlot {
    /// Slot label (e.g. "QB", "SS", "FLEX", "BE").
    pub position: String,
    pub player: Option<RosteredPlayer>,
}

/// A team's complete roster of slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    pub slots: Vec<RosterSlot>,
}

impl Roster {
    /// Create a roster from a position → slot count map, e.g.
    /// `{"QB": 1, "RB": 2, "FLEX": 1, "BE": 6, "IL": 1}`.
    ///
    /// Slot order is deterministic regardless of map iteration order.
    pub fn new(roster_config: &HashMap<String, usize>) -> Self {
        let mut slots: Vec<RosterSlot> = roster_config
            .iter()
            .flat_map(|(pos, &count)| {
                let label = pos.to_uppercase();
                (0..count).map(move |_| RosterSlot {
                    position: label.clone(),
                    player: None,
                })
            })
            .collect();

        slots.sort_by(|a, b| {
            slot_rank(&a.position)
                .cmp(&slot_rank(&b.position))
                .then_with(|| a.position.cmp(&b.position))
        });

        Roster { slots }
    }

    /// Index of the slot a player at `position` would occupy.
    ///
    /// Priority: exact position slot, then flex, then bench.
    pub fn slot_for(&self, position: &str) -> Option<usize> {
        let position = position.to_uppercase();
        let empty = |pred: &dyn Fn(&str) -> bool| {
            self.slots
                .iter()
                .position(|s| s.player.is_none() && pred(&s.position))
        };

        empty(&|label| label == position && slot_rank(label) == 0)
            .or_else(|| empty(&|label| is_flex(label)))
            .or_else(|| empty(&|label| slot_rank(label) == 2))
    }

    /// Place a player, returning the label of the slot used, or `None` if
    /// no slot accepts the position.
    pub fn add_player(&mut self, player: RosteredPlayer) -> Option<String> {
        let idx = self.slot_for(&player.position)?;
        let slot = &mut self.slots[idx];
        slot.player = Some(player);
        Some(slot.position.clone())
    }

    /// Put a player back into a slot with the given label (restoring a
    /// persisted roster). Returns false when no such slot is empty.
    pub fn place(&mut self, slot_label: &str, player: RosteredPlayer) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|s| s.player.is_none() && s.position.eq_ignore_ascii_case(slot_label))
        {
            Some(slot) => {
                slot.player = Some(player);
                true
            }
            None => false,
        }
    }

    /// Remove a player from whichever slot holds them.
    pub fn remove_player(&mut self, player_id: &str) -> Option<RosteredPlayer> {
        self.slots
            .iter_mut()
            .find(|s| s.player.as_ref().is_some_and(|p| p.player_id == player_id))
            .and_then(|s| s.player.take())
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.player.as_ref().is_some_and(|p| p.player_id == player_id))
    }

    /// Count of empty slots, excluding IL slots.
    pub fn empty_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.position != INJURED_SLOT && s.player.is_none())
            .count()
    }

    pub fn is_full(&self) -> bool {
        self.empty_slots() == 0
    }

    /// Maximum bid a team can make given their remaining budget.
    ///
    /// Reserves `reserve_per_slot` for each empty slot other than the one
    /// being bid on. A full roster can't bid at all.
    pub fn max_bid(&self, budget_remaining: u32, reserve_per_slot: u32) -> u32 {
        let remaining_empty = self.empty_slots();
        if remaining_empty == 0 {
            return 0;
        }
        let reserved = (remaining_empty as u32 - 1).saturating_mul(reserve_per_slot);
        budget_remaining.saturating_sub(reserved)
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.player.is_some()).count()
    }

    /// Total number of draftable slots (excluding IL).
    pub fn draftable_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.position != INJURED_SLOT)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn football_config() -> HashMap<String, usize> {
        let mut config = HashMap::new();
        config.insert("QB".to_string(), 1);
        config.insert("RB".to_string(), 2);
        config.insert("WR".to_string(), 2);
        config.insert("FLEX".to_string(), 1);
        config.insert("BE".to_string(), 2);
        config.insert("IL".to_string(), 1);
        config
    }

    fn player(id: &str, pos: &str) -> RosteredPlayer {
        RosteredPlayer {
            player_id: id.into(),
            position: pos.into(),
            price: None,
        }
    }

    #[test]
    fn slots_created_in_deterministic_order() {
        let roster = Roster::new(&football_config());
        let labels: Vec<&str> = roster.slots.iter().map(|s| s.position.as_str()).collect();
        assert_eq!(
            labels,
            vec!["QB", "RB", "RB", "WR", "WR", "FLEX", "BE", "BE", "IL"]
        );
        assert_eq!(roster.draftable_count(), 8);
    }

    #[test]
    fn exact_then_flex_then_bench() {
        let mut roster = Roster::new(&football_config());
        assert_eq!(roster.add_player(player("q1", "QB")).as_deref(), Some("QB"));
        assert_eq!(roster.add_player(player("q2", "QB")).as_deref(), Some("FLEX"));
        assert_eq!(roster.add_player(player("q3", "QB")).as_deref(), Some("BE"));
        assert_eq!(roster.add_player(player("q4", "QB")).as_deref(), Some("BE"));
        assert_eq!(roster.add_player(player("q5", "QB")), None);
    }

    #[test]
    fn position_match_is_case_insensitive() {
        let mut roster = Roster::new(&football_config());
        assert_eq!(roster.add_player(player("r1", "rb")).as_deref(), Some("RB"));
    }

    #[test]
    fn il_slots_are_never_filled() {
        let mut config = HashMap::new();
        config.insert("IL".to_string(), 2);
        let roster = Roster::new(&config);
        assert!(roster.slot_for("IL").is_none());
        assert!(roster.is_full());
    }

    #[test]
    fn remove_player_frees_slot() {
        let mut roster = Roster::new(&football_config());
        roster.add_player(player("w1", "WR"));
        assert!(roster.has_player("w1"));
        let removed = roster.remove_player("w1").unwrap();
        assert_eq!(removed.player_id, "w1");
        assert!(!roster.has_player("w1"));
        assert_eq!(roster.filled_count(), 0);
        assert!(roster.remove_player("w1").is_none());
    }

    #[test]
    fn place_restores_into_named_slot() {
        let mut roster = Roster::new(&football_config());
        assert!(roster.place("FLEX", player("r9", "RB")));
        assert!(!roster.place("FLEX", player("r8", "RB")));
        assert!(!roster.place("K", player("k1", "K")));
        let flex = roster.slots.iter().find(|s| s.position == "FLEX").unwrap();
        assert_eq!(flex.player.as_ref().unwrap().player_id, "r9");
    }

    #[test]
    fn max_bid_reserves_per_open_slot() {
        let roster = Roster::new(&football_config());
        // 8 draftable slots: reserve 7 for the others.
        assert_eq!(roster.max_bid(200, 1), 193);
        assert_eq!(roster.max_bid(200, 2), 186);
        assert_eq!(roster.max_bid(5, 1), 0);
    }

    #[test]
    fn max_bid_last_slot_uses_whole_budget() {
        let mut config = HashMap::new();
        config.insert("QB".to_string(), 1);
        let roster = Roster::new(&config);
        assert_eq!(roster.max_bid(37, 1), 37);
    }

    #[test]
    fn max_bid_zero_when_full() {
        let mut config = HashMap::new();
        config.insert("QB".to_string(), 1);
        let mut roster = Roster::new(&config);
        roster.add_player(player("q1", "QB"));
        assert_eq!(roster.max_bid(100, 1), 0);
    }
}
