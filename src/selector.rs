//! C3 — Adaptive Selector.
//!
//! Schedules which dilemma gets presented next. Modeled as a state-carrying
//! struct in the spirit of `BenchmarkRunner`, but every random choice is
//! derived from `(seed, responses_so_far)` through a seeded `StdRng` rather
//! than the thread-local RNG, so a resumed session reproduces the exact
//! same schedule.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{Axis, AxisFlag, AxisScore, ConsistencyGroup, DilemmaItem, RunConfig};

const EXPLORATION_RATE: f64 = 0.2;
const CONSISTENCY_TRAP_MIN_SEPARATION: usize = 30;
const ADVERSARIAL_SE_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Anchors,
    ExploitExplore,
    ConsistencyTraps,
    Adversarial,
    Variants,
}

fn phase_for(item_number: usize) -> Phase {
    match item_number {
        1..=3 => Phase::Anchors,
        4..=6 => Phase::ExploitExplore,
        7..=8 => Phase::ConsistencyTraps,
        9..=12 => Phase::Adversarial,
        _ => Phase::Variants,
    }
}

/// Per-axis progress the selector needs to make its next pick.
pub struct AxisState<'a> {
    pub axis: &'a Axis,
    pub items_presented: usize,
    pub presented_item_ids: HashSet<String>,
    pub current_score: Option<&'a AxisScore>,
}

fn seeded_rng(seed: &str, responses_so_far: usize) -> StdRng {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in seed.as_bytes().iter().chain(responses_so_far.to_le_bytes().iter()) {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    StdRng::seed_from_u64(hash)
}

/// Whether an axis has satisfied its stopping rule.
pub fn axis_is_done(state: &AxisState, config: &RunConfig, groups_for_axis: &[&ConsistencyGroup], presented_group_items: &HashMap<String, usize>) -> bool {
    if state.items_presented >= config.max_items_per_axis {
        return true;
    }
    if state.items_presented < config.min_items_per_axis {
        return false;
    }
    let se_ok = state
        .current_score
        .map(|s| s.se_b <= config.target_se)
        .unwrap_or(false);
    if !se_ok {
        return false;
    }
    if config.is_v2() {
        // v2 additionally requires every consistency group on this axis to
        // have had all of its member items presented.
        let all_groups_complete = groups_for_axis.iter().all(|group| {
            group
                .item_ids
                .iter()
                .all(|id| presented_group_items.contains_key(id))
        });
        if !all_groups_complete {
            return false;
        }
    }
    true
}

/// Picks the axis to administer the next item for: the axis with the
/// fewest items presented so far among those not yet done, ties broken by
/// display order. No randomness here — axis progression stays in lockstep
/// deterministically by construction.
pub fn select_next_axis<'a>(
    axis_states: &'a [AxisState<'a>],
    config: &RunConfig,
    groups_by_axis: &HashMap<String, Vec<&'a ConsistencyGroup>>,
    presented_group_items: &HashMap<String, usize>,
) -> Option<&'a AxisState<'a>> {
    axis_states
        .iter()
        .filter(|s| {
            let groups = groups_by_axis.get(&s.axis.id).map(Vec::as_slice).unwrap_or(&[]);
            !axis_is_done(s, config, groups, presented_group_items)
        })
        .min_by_key(|s| (s.items_presented, s.axis.display_order))
}

/// Picks the next item for a given axis, given the current phase. Returns
/// `None` if every candidate item on the axis has already been presented.
pub fn select_next_item<'a>(
    seed: &str,
    responses_so_far: usize,
    axis_state: &AxisState,
    items: &'a [DilemmaItem],
    groups_for_axis: &[&ConsistencyGroup],
    presented_group_items: &HashMap<String, usize>,
    global_item_index: usize,
) -> Option<&'a DilemmaItem> {
    let item_number = axis_state.items_presented + 1;
    let phase = phase_for(item_number);

    let candidates: Vec<&DilemmaItem> = items
        .iter()
        .filter(|i| !axis_state.presented_item_ids.contains(&i.id))
        .collect();
    if candidates.is_empty() {
        return None;
    }

    match phase {
        Phase::Anchors => select_anchor(item_number, &candidates),

        Phase::ExploitExplore => {
            let mut rng = seeded_rng(seed, responses_so_far);
            if rng.gen::<f64>() < EXPLORATION_RATE {
                let idx = rng.gen_range(0..candidates.len());
                Some(candidates[idx])
            } else {
                let target_b = axis_state.current_score.map(|s| s.b).unwrap_or(0.5);
                closest_by_pressure(&candidates, target_b)
            }
        }

        Phase::ConsistencyTraps => {
            let eligible: Vec<&DilemmaItem> = candidates
                .iter()
                .copied()
                .filter(|i| {
                    i.consistency_group_id.is_some()
                        && is_separation_satisfied(i, groups_for_axis, presented_group_items, global_item_index)
                })
                .collect();
            eligible
                .first()
                .copied()
                .or_else(|| candidates.first().copied())
        }

        Phase::Adversarial => {
            let target = axis_state
                .current_score
                .map(|s| (s.b + ADVERSARIAL_SE_MULTIPLIER * s.se_b).max(0.0).min(1.0))
                .unwrap_or(0.8);
            closest_by_pressure(&candidates, target)
        }

        Phase::Variants => candidates
            .iter()
            .copied()
            .find(|i| i.variant_type.is_some())
            .or_else(|| candidates.first().copied()),
    }
}

/// Phase 1 (anchors): item 1 is the lowest-pressure anchor, item 2 the
/// highest-pressure anchor, item 3 the item closest to pressure 0.5.
/// Prefers `is_anchor` items; falls back to the whole axis when none are
/// marked anchors.
fn select_anchor<'a>(item_number: usize, candidates: &[&'a DilemmaItem]) -> Option<&'a DilemmaItem> {
    let anchors: Vec<&'a DilemmaItem> = candidates.iter().copied().filter(|i| i.is_anchor).collect();
    let source: Vec<&'a DilemmaItem> = if anchors.is_empty() { candidates.to_vec() } else { anchors };
    if source.is_empty() {
        return None;
    }

    match item_number {
        1 => source
            .iter()
            .copied()
            .min_by(|a, b| a.pressure_level.partial_cmp(&b.pressure_level).unwrap()),
        2 => source
            .iter()
            .copied()
            .max_by(|a, b| a.pressure_level.partial_cmp(&b.pressure_level).unwrap()),
        _ => closest_by_pressure(&source, 0.5),
    }
}

fn closest_by_pressure<'a>(candidates: &[&'a DilemmaItem], target: f64) -> Option<&'a DilemmaItem> {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| {
            (a.pressure_level - target)
                .abs()
                .partial_cmp(&(b.pressure_level - target).abs())
                .unwrap()
        })
}

fn is_separation_satisfied(
    item: &DilemmaItem,
    groups_for_axis: &[&ConsistencyGroup],
    presented_group_items: &HashMap<String, usize>,
    global_item_index: usize,
) -> bool {
    let Some(group_id) = &item.consistency_group_id else {
        return true;
    };
    let Some(group) = groups_for_axis.iter().find(|g| &g.id == group_id) else {
        return true;
    };
    group.item_ids.iter().all(|id| {
        presented_group_items
            .get(id)
            .map(|&idx| global_item_index.saturating_sub(idx) >= CONSISTENCY_TRAP_MIN_SEPARATION)
            .unwrap_or(true)
    })
}

/// Run-level completion: every in-scope axis (memory axes only when the
/// run config enables them) has satisfied its stopping rule.
pub fn run_is_complete(
    axis_states: &[AxisState],
    config: &RunConfig,
    groups_by_axis: &HashMap<String, Vec<&ConsistencyGroup>>,
    presented_group_items: &HashMap<String, usize>,
) -> bool {
    axis_states.iter().all(|s| {
        let groups = groups_by_axis.get(&s.axis.id).map(Vec::as_slice).unwrap_or(&[]);
        axis_is_done(s, config, groups, presented_group_items)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AxisCategory, DilemmaOption, DilemmaParams, DilemmaType, Pole, Choice};

    fn axis(id: &str, order: u32) -> Axis {
        Axis {
            id: id.to_string(),
            code: id.to_string(),
            display_name: id.to_string(),
            pole_left: "left".to_string(),
            pole_right: "right".to_string(),
            category: AxisCategory::Moral,
            display_order: order,
            optional: false,
        }
    }

    fn item(id: &str, axis_id: &str, pressure: f64, is_anchor: bool) -> DilemmaItem {
        DilemmaItem {
            id: id.to_string(),
            axis_id: axis_id.to_string(),
            secondary_axis_id: None,
            family_id: "f".to_string(),
            pressure_level: pressure,
            params: DilemmaParams::default(),
            options: [
                DilemmaOption { choice: Choice::A, text: "a".into(), pole: Pole::Left },
                DilemmaOption { choice: Choice::B, text: "b".into(), pole: Pole::Right },
                DilemmaOption { choice: Choice::C, text: "c".into(), pole: Pole::Neutral },
                DilemmaOption { choice: Choice::D, text: "d".into(), pole: Pole::Creative },
            ],
            is_anchor,
            dilemma_type: DilemmaType::Base,
            consistency_group_id: None,
            variant_type: None,
            non_obvious_factors: vec![],
            expert_disagreement: 0.0,
            requires_residue_recognition: false,
            meta_ethical_type: None,
        }
    }

    #[test]
    fn determinism_same_seed_same_pick() {
        let ax = axis("care_justice", 0);
        let items = vec![item("i1", "care_justice", 0.2, false), item("i2", "care_justice", 0.8, false)];
        let state = AxisState {
            axis: &ax,
            items_presented: 3,
            presented_item_ids: HashSet::new(),
            current_score: None,
        };
        let a = select_next_item("seed-1", 3, &state, &items, &[], &HashMap::new(), 3);
        let b = select_next_item("seed-1", 3, &state, &items, &[], &HashMap::new(), 3);
        assert_eq!(a.map(|i| &i.id), b.map(|i| &i.id));
    }

    #[test]
    fn anchors_phase_prefers_anchor_items() {
        let ax = axis("care_justice", 0);
        let items = vec![item("i1", "care_justice", 0.2, false), item("i2", "care_justice", 0.8, true)];
        let state = AxisState {
            axis: &ax,
            items_presented: 0,
            presented_item_ids: HashSet::new(),
            current_score: None,
        };
        let picked = select_next_item("seed-1", 0, &state, &items, &[], &HashMap::new(), 0);
        assert_eq!(picked.unwrap().id, "i2");
    }

    #[test]
    fn max_items_forces_axis_done() {
        let ax = axis("a", 0);
        let cfg = RunConfig::v2_defaults("v2", "seed");
        let state = AxisState {
            axis: &ax,
            items_presented: cfg.max_items_per_axis,
            presented_item_ids: HashSet::new(),
            current_score: None,
        };
        assert!(axis_is_done(&state, &cfg, &[], &HashMap::new()));
    }
}
