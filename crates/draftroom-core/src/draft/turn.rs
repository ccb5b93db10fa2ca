// Turn order: snake pick order and auction nomination order.
//
// Every caller that needs "who is up" (pick submission, auto-pick, undo,
// auction settlement) goes through these functions.

use serde::{Deserialize, Serialize};

/// A team's fixed position in the draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrafterSlot {
    /// 1-based draft position.
    pub position: u32,
    pub team_id: String,
}

/// Build drafter slots from team IDs in draft order.
pub fn slots_from_order(team_ids: &[String]) -> Vec<DrafterSlot> {
    team_ids
        .iter()
        .enumerate()
        .map(|(i, id)| DrafterSlot {
            position: i as u32 + 1,
            team_id: id.clone(),
        })
        .collect()
}

/// Round containing `pick_number`: `ceil(pick_number / total_drafters)`.
pub fn round_for_pick(pick_number: u32, total_drafters: u32) -> u32 {
    if total_drafters == 0 {
        return 0;
    }
    pick_number.div_ceil(total_drafters)
}

/// Draft position (1-based) on the clock for `pick_number` in `round`.
///
/// Odd rounds run 1..=N, even rounds run N..=1.
pub fn resolve(pick_number: u32, round: u32, total_drafters: u32) -> u32 {
    debug_assert!(pick_number >= 1 && total_drafters >= 1);
    let offset = (pick_number - 1) % total_drafters;
    if round % 2 == 1 {
        offset + 1
    } else {
        total_drafters - offset
    }
}

/// The drafter slot on the clock for `pick_number`, or `None` if the order
/// is empty or the pick number is not a live (positive) pick.
pub fn snake_drafter(pick_number: u32, order: &[DrafterSlot]) -> Option<&DrafterSlot> {
    if order.is_empty() || pick_number == 0 {
        return None;
    }
    let n = order.len() as u32;
    let position = resolve(pick_number, round_for_pick(pick_number, n), n);
    order.iter().find(|s| s.position == position)
}

/// Index into the nomination order of the team that nominates next.
///
/// Starts at `from mod len`, the slot after the previous nominator, and
/// walks forward (with wraparound) past teams for which `can_nominate` is
/// false. Returns `None` when no team can nominate.
pub fn nominator_index(
    from: usize,
    order_len: usize,
    can_nominate: impl Fn(usize) -> bool,
) -> Option<usize> {
    if order_len == 0 {
        return None;
    }
    let start = from % order_len;
    (0..order_len)
        .map(|step| (start + step) % order_len)
        .find(|&idx| can_nominate(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn order(n: usize) -> Vec<DrafterSlot> {
        let ids: Vec<String> = (1..=n).map(|i| format!("team_{i}")).collect();
        slots_from_order(&ids)
    }

    #[test]
    fn round_boundaries() {
        assert_eq!(round_for_pick(1, 8), 1);
        assert_eq!(round_for_pick(8, 8), 1);
        assert_eq!(round_for_pick(9, 8), 2);
        assert_eq!(round_for_pick(120, 8), 15);
        assert_eq!(round_for_pick(121, 8), 16);
    }

    #[test]
    fn odd_rounds_go_forward_even_rounds_reverse() {
        assert_eq!(resolve(1, 1, 4), 1);
        assert_eq!(resolve(4, 1, 4), 4);
        assert_eq!(resolve(5, 2, 4), 4);
        assert_eq!(resolve(8, 2, 4), 1);
        assert_eq!(resolve(9, 3, 4), 1);
    }

    #[test]
    fn turn_boundary_team_picks_twice() {
        let order = order(4);
        assert_eq!(snake_drafter(4, &order).unwrap().team_id, "team_4");
        assert_eq!(snake_drafter(5, &order).unwrap().team_id, "team_4");
        assert_eq!(snake_drafter(8, &order).unwrap().team_id, "team_1");
        assert_eq!(snake_drafter(9, &order).unwrap().team_id, "team_1");
    }

    #[test]
    fn snake_is_bijection_over_all_picks() {
        for n in 1..=12u32 {
            for rounds in 1..=16u32 {
                let mut seen = HashSet::new();
                for pick in 1..=n * rounds {
                    let round = round_for_pick(pick, n);
                    let pos = resolve(pick, round, n);
                    assert!((1..=n).contains(&pos));
                    assert!(seen.insert((round, pos)), "duplicate ({round}, {pos})");
                }
                assert_eq!(seen.len() as u32, n * rounds);
            }
        }
    }

    #[test]
    fn direction_alternates_each_round() {
        let n = 6;
        for round in 1..=10u32 {
            let first = resolve((round - 1) * n + 1, round, n);
            let last = resolve(round * n, round, n);
            if round % 2 == 1 {
                assert_eq!((first, last), (1, n));
            } else {
                assert_eq!((first, last), (n, 1));
            }
        }
    }

    #[test]
    fn snake_drafter_rejects_keeper_and_empty_order() {
        assert!(snake_drafter(0, &order(4)).is_none());
        assert!(snake_drafter(1, &[]).is_none());
    }

    #[test]
    fn nominator_round_robin_wraps() {
        let all = |_: usize| true;
        assert_eq!(nominator_index(0, 3, all), Some(0));
        assert_eq!(nominator_index(2, 3, all), Some(2));
        assert_eq!(nominator_index(3, 3, all), Some(0));
        assert_eq!(nominator_index(7, 3, all), Some(1));
    }

    #[test]
    fn nominator_skips_ineligible_teams() {
        // Team at index 1 has a full roster.
        let eligible = |idx: usize| idx != 1;
        assert_eq!(nominator_index(1, 3, eligible), Some(2));
        assert_eq!(nominator_index(0, 3, |_| false), None);
        assert_eq!(nominator_index(0, 0, |_| true), None);
    }
}
