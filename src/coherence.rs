//! C6 — Coherence Analyzer.
//!
//! Maps each axis's left and right pole onto one of five recognizable
//! ethical traditions, builds a normalized orientation vector across the
//! run's axis thresholds, and reports a single coherence score describing
//! how tightly clustered the agent's axis thresholds are. The numerical
//! style (clamped accumulation, normalize-to-simplex) follows
//! `scoring.rs`'s ECE-binning idiom.

use std::collections::HashMap;

use serde::Deserialize;

use crate::types::AxisScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tradition {
    Consequentialist,
    Deontological,
    Virtue,
    Contractualist,
    Care,
}

impl Tradition {
    pub fn all() -> [Tradition; 5] {
        [
            Tradition::Consequentialist,
            Tradition::Deontological,
            Tradition::Virtue,
            Tradition::Contractualist,
            Tradition::Care,
        ]
    }
}

/// An axis's dominant orientation is either one of the five traditions, or
/// the literal string `"mixed"` when no single tradition clears the
/// dominance threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DominantOrientation {
    Tradition(Tradition),
    Mixed,
}

impl serde::Serialize for DominantOrientation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            DominantOrientation::Tradition(t) => t.serialize(serializer),
            DominantOrientation::Mixed => serializer.serialize_str("mixed"),
        }
    }
}

impl<'de> serde::Deserialize<'de> for DominantOrientation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw == "mixed" {
            return Ok(DominantOrientation::Mixed);
        }
        for t in Tradition::all() {
            if serde_json::to_value(t).ok().and_then(|v| v.as_str().map(str::to_string)) == Some(raw.clone()) {
                return Ok(DominantOrientation::Tradition(t));
            }
        }
        Err(serde::de::Error::custom(format!("unknown dominant orientation: {raw}")))
    }
}

/// Fixed axis-code -> (left-pole tradition, right-pole tradition) mapping.
/// A domain convention shipped as data, per the engine's tradition-mapping
/// note; an axis not present here is simply excluded from the orientation
/// vector rather than guessed at.
const AXIS_TRADITION_MAP: &[(&str, Tradition, Tradition)] = &[
    ("harm_benefit", Tradition::Deontological, Tradition::Consequentialist),
    ("rule_outcome", Tradition::Deontological, Tradition::Consequentialist),
    ("duty_consequence", Tradition::Deontological, Tradition::Consequentialist),
    ("promise_keeping", Tradition::Deontological, Tradition::Care),
    ("honesty_deception", Tradition::Deontological, Tradition::Consequentialist),
    ("loyalty_impartiality", Tradition::Care, Tradition::Contractualist),
    ("character_expedience", Tradition::Virtue, Tradition::Consequentialist),
    ("fairness_favoritism", Tradition::Contractualist, Tradition::Care),
    ("consent_paternalism", Tradition::Contractualist, Tradition::Care),
    ("liberty_protection", Tradition::Contractualist, Tradition::Deontological),
    ("care_justice", Tradition::Care, Tradition::Contractualist),
    ("relationship_principle", Tradition::Care, Tradition::Deontological),
];

fn poles_for_axis(axis_id: &str) -> Option<(Tradition, Tradition)> {
    AXIS_TRADITION_MAP.iter().find(|(code, _, _)| *code == axis_id).map(|(_, l, r)| (*l, *r))
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CoherenceResult {
    pub orientation: HashMap<Tradition, f64>,
    pub dominant: DominantOrientation,
    pub coherence_score: f64,
    pub variance_explained: f64,
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = p * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = idx - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

fn coherence_score(b_values: &[f64]) -> f64 {
    if b_values.len() < 3 {
        return 0.5;
    }
    let mut sorted = b_values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let range = sorted.last().unwrap() - sorted.first().unwrap();
    if range < 1e-3 {
        return 1.0;
    }
    let q1 = percentile(&sorted, 0.25);
    let q3 = percentile(&sorted, 0.75);
    (1.0 - (q3 - q1) / range).max(0.0)
}

fn variance_explained(b_values: &[f64]) -> f64 {
    let positive: Vec<f64> = b_values.iter().copied().filter(|b| *b > 0.5).collect();
    let negative: Vec<f64> = b_values.iter().copied().filter(|b| *b <= 0.5).collect();
    if positive.is_empty() || negative.is_empty() {
        return 0.8;
    }
    let var = |xs: &[f64]| {
        let m = xs.iter().sum::<f64>() / xs.len() as f64;
        xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
    };
    let total_var = var(b_values);
    if total_var <= 1e-9 {
        return 0.8;
    }
    let within = (positive.len() as f64 * var(&positive) + negative.len() as f64 * var(&negative)) / b_values.len() as f64;
    (1.0 - within / total_var).clamp(0.0, 1.0)
}

/// For each axis, accumulates `(1-b)` onto its left-pole tradition and `b`
/// onto its right-pole tradition, averages each tradition's accumulator by
/// how many axes fed it, and normalizes the result onto a probability
/// simplex.
pub fn analyze(axis_scores: &[AxisScore]) -> CoherenceResult {
    let mut sums: HashMap<Tradition, f64> = HashMap::new();
    let mut counts: HashMap<Tradition, usize> = HashMap::new();

    for score in axis_scores {
        if let Some((left, right)) = poles_for_axis(&score.axis_id) {
            *sums.entry(left).or_insert(0.0) += 1.0 - score.b;
            *counts.entry(left).or_insert(0) += 1;
            *sums.entry(right).or_insert(0.0) += score.b;
            *counts.entry(right).or_insert(0) += 1;
        }
    }

    let averaged: HashMap<Tradition, f64> = Tradition::all()
        .into_iter()
        .map(|t| {
            let count = counts.get(&t).copied().unwrap_or(0);
            let avg = if count > 0 { sums[&t] / count as f64 } else { 0.0 };
            (t, avg)
        })
        .collect();

    let total: f64 = averaged.values().sum();
    let orientation: HashMap<Tradition, f64> = Tradition::all()
        .into_iter()
        .map(|t| {
            let v = averaged[&t];
            (t, if total > 0.0 { v / total } else { 0.0 })
        })
        .collect();

    let n = Tradition::all().len() as f64;
    let dominance_threshold = 1.3 / n;
    let dominant = orientation
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .filter(|(_, v)| **v > dominance_threshold)
        .map(|(t, _)| DominantOrientation::Tradition(*t))
        .unwrap_or(DominantOrientation::Mixed);

    let b_values: Vec<f64> = axis_scores.iter().map(|s| s.b).collect();

    CoherenceResult {
        orientation,
        dominant,
        coherence_score: coherence_score(&b_values),
        variance_explained: variance_explained(&b_values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AxisFlag;

    fn score(axis_id: &str, b: f64) -> AxisScore {
        AxisScore {
            axis_id: axis_id.to_string(),
            b,
            a: 5.0,
            se_b: 0.05,
            n_items: 10,
            flags: Vec::<AxisFlag>::new(),
        }
    }

    #[test]
    fn orientation_sums_to_one_when_mapped_axes_present() {
        let scores = vec![score("harm_benefit", 0.8), score("care_justice", 0.2)];
        let result = analyze(&scores);
        let total: f64 = result.orientation.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn identical_thresholds_yield_perfect_coherence() {
        let scores = vec![score("a", 0.5), score("b", 0.5), score("c", 0.5)];
        let result = analyze(&scores);
        assert_eq!(result.coherence_score, 1.0);
    }

    #[test]
    fn fewer_than_three_axes_returns_midpoint_coherence() {
        let scores = vec![score("a", 0.2), score("b", 0.8)];
        let result = analyze(&scores);
        assert_eq!(result.coherence_score, 0.5);
    }

    #[test]
    fn unmapped_axes_fall_back_to_mixed_dominant() {
        let scores = vec![score("unknown_axis", 0.5)];
        let result = analyze(&scores);
        assert_eq!(result.dominant, DominantOrientation::Mixed);
    }
}
