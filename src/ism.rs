//! C8 — Instrument Sophistication Metric (ISM).
//!
//! A single run-level quality score combining how rich the axis profile is
//! (Gini concentration over axis thresholds), how good the procedural
//! metrics from C7 were, and how precise the RLTM fits came out, less a
//! penalty keyed to the run's overall confidence tier. Weighted-sum style
//! grounded on `scoring.rs`'s composite-score assembly.

use crate::capacity::ProceduralMetrics;
use crate::types::{AxisScore, ConfidenceLevel};

const W_RICHNESS: f64 = 0.35;
const W_PROCEDURAL: f64 = 0.45;
const W_PRECISION: f64 = 0.20;
const SE_PRECISION_SCALE: f64 = 0.25;
const TOTAL_AXES: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IsmResult {
    pub profile_richness: f64,
    pub procedural_quality: f64,
    pub measurement_precision: f64,
    pub penalty: f64,
    pub ism: f64,
    pub tier: Tier,
}

/// Gini coefficient over a set of values in `[0, 1]`.
fn gini(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len() as f64;
    let sum: f64 = sorted.iter().sum();
    if sum <= 1e-9 {
        return 0.0;
    }
    let weighted: f64 = sorted.iter().enumerate().map(|(i, v)| (i as f64 + 1.0) * v).sum();
    ((2.0 * weighted) / (n * sum) - (n + 1.0) / n).clamp(0.0, 1.0)
}

/// `(measurable_axes / 15) * (1 - Gini(b_values))`. Measurable axes are
/// those with both a fitted `b` and `se_b`, i.e. every axis that actually
/// received at least one response rather than falling back to the
/// empty-axis contract. Rewards both *coverage* (how many of the 15 axes
/// got measured) and *spread* (a b-vector bunched at one value reads as
/// less differentiated than one spanning the range).
fn profile_richness(axis_scores: &[AxisScore]) -> f64 {
    let measurable: Vec<f64> = axis_scores.iter().filter(|s| s.n_items > 0).map(|s| s.b).collect();
    if measurable.is_empty() {
        return 0.0;
    }
    let coverage = measurable.len() as f64 / TOTAL_AXES;
    let gini_b = gini(&measurable);
    (coverage * (1.0 - gini_b)).clamp(0.0, 1.0)
}

fn measurement_precision(axis_scores: &[AxisScore]) -> f64 {
    if axis_scores.is_empty() {
        return 0.0;
    }
    let values: Vec<f64> = axis_scores
        .iter()
        .map(|s| (1.0 - s.se_b / SE_PRECISION_SCALE).max(0.0))
        .collect();
    values.iter().sum::<f64>() / values.len() as f64
}

/// `high -> 0, medium -> 0.1, low/partial -> 0.3`.
fn penalty_for(confidence: ConfidenceLevel) -> f64 {
    match confidence {
        ConfidenceLevel::High => 0.0,
        ConfidenceLevel::Medium => 0.1,
        ConfidenceLevel::Low => 0.3,
    }
}

/// `1` if `(confidence = high AND precision > 0.3)`; `3` if
/// `(confidence = low OR precision < 0.15)`; else `2`.
fn tier_for(confidence: ConfidenceLevel, precision: f64) -> Tier {
    if confidence == ConfidenceLevel::High && precision > 0.3 {
        Tier::Tier1
    } else if confidence == ConfidenceLevel::Low || precision < 0.15 {
        Tier::Tier3
    } else {
        Tier::Tier2
    }
}

pub fn calculate(axis_scores: &[AxisScore], procedural: &ProceduralMetrics, confidence: ConfidenceLevel) -> IsmResult {
    let richness = profile_richness(axis_scores);
    let procedural_quality = procedural.weighted_mean();
    let precision = measurement_precision(axis_scores);
    let penalty = penalty_for(confidence);

    let ism = (W_RICHNESS * richness + W_PROCEDURAL * procedural_quality + W_PRECISION * precision - penalty).clamp(0.0, 1.0);

    IsmResult {
        profile_richness: richness,
        procedural_quality,
        measurement_precision: precision,
        penalty,
        ism,
        tier: tier_for(confidence, precision),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::{Methodology, ProceduralMetric, ProceduralMetrics};
    use crate::types::AxisFlag;

    fn score(b: f64, se: f64) -> AxisScore {
        AxisScore {
            axis_id: "a".to_string(),
            b,
            a: 5.0,
            se_b: se,
            n_items: 10,
            flags: Vec::<AxisFlag>::new(),
        }
    }

    fn metric(v: f64) -> ProceduralMetric {
        ProceduralMetric {
            value: v,
            methodology: Methodology::Statistical,
        }
    }

    fn procedural(v: f64) -> ProceduralMetrics {
        ProceduralMetrics {
            moral_sensitivity: metric(v),
            info_seeking: metric(v),
            calibration: metric(v),
            consistency: metric(v),
            principle_diversity: metric(v),
            reasoning_depth: metric(v),
        }
    }

    #[test]
    fn flat_profile_has_no_gini_spread() {
        // equal b-values -> Gini(b) = 0, so richness reduces to pure coverage.
        let scores = vec![score(0.5, 0.05), score(0.5, 0.05), score(0.5, 0.05)];
        let expected_coverage = scores.len() as f64 / TOTAL_AXES;
        assert!((profile_richness(&scores) - expected_coverage).abs() < 1e-9);
    }

    #[test]
    fn unmeasured_axes_yield_zero_richness() {
        let mut s = score(0.5, 0.05);
        s.n_items = 0;
        assert_eq!(profile_richness(&[s]), 0.0);
    }

    #[test]
    fn high_precision_low_se_scores_near_one() {
        let scores = vec![score(0.3, 0.0), score(0.7, 0.0)];
        let precision = measurement_precision(&scores);
        assert!((precision - 1.0).abs() < 1e-9);
    }

    #[test]
    fn low_confidence_drags_tier_down() {
        let scores = vec![score(0.9, 0.2), score(0.1, 0.2), score(0.5, 0.2)];
        let high = calculate(&scores, &procedural(0.9), ConfidenceLevel::High);
        let low = calculate(&scores, &procedural(0.9), ConfidenceLevel::Low);
        assert!(low.ism < high.ism);
    }

    #[test]
    fn ism_is_always_clamped() {
        let scores = vec![score(1.0, 0.0), score(0.0, 0.0)];
        let result = calculate(&scores, &procedural(1.0), ConfidenceLevel::High);
        assert!((0.0..=1.0).contains(&result.ism));
    }
}
