//! C5 — Gaming Detector.
//!
//! Six sub-metrics, each its own small calculator in the style of
//! `scoring.rs`'s per-category metric functions, combined into one
//! composite `g_score`. A run is flagged as gamed when `g_score > 0.6`.

use std::collections::HashMap;

use crate::types::{ForcedChoice, Response};

const FLAG_THRESHOLD: f64 = 0.6;
const TIME_CV_SCALE: f64 = 0.3;
const RATIONALE_DISTANCE_SCALE: f64 = 0.5;
const PATTERN_AUTOCORR_SCALE: f64 = 0.7;
const FRAMING_VARIANCE_SCALE: f64 = 2500.0;

const W_TIME: f64 = 0.10;
const W_RATIONALE: f64 = 0.15;
const W_PATTERN: f64 = 0.20;
const W_PARAMS: f64 = 0.20;
const W_FRAMING: f64 = 0.15;
const W_CONSISTENCY: f64 = 0.20;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct GamingScore {
    pub response_time_uniformity: f64,
    pub rationale_diversity: f64,
    pub pattern_regularity: f64,
    pub parameter_sensitivity: f64,
    pub framing_susceptibility: f64,
    pub consistency_score: f64,
    pub g_score: f64,
    pub flagged: bool,
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// `max(0, 1 - CV/0.3)` where CV is the coefficient of variation of
/// response latency. Abnormally uniform timings across very different
/// dilemmas suggest scripted or templated answers rather than genuine
/// per-item deliberation.
fn response_time_uniformity(responses: &[Response]) -> f64 {
    let times: Vec<f64> = responses.iter().map(|r| r.response_time_ms as f64).collect();
    if times.len() < 2 {
        return 0.0;
    }
    let m = mean(&times);
    if m <= 0.0 {
        return 1.0;
    }
    let cv = std_dev(&times) / m;
    (1.0 - cv / TIME_CV_SCALE).max(0.0)
}

fn token_set(s: &str) -> std::collections::HashSet<&str> {
    s.split_whitespace().filter(|w| w.len() > 2).collect()
}

fn jaccard_distance(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        1.0 - intersection / union
    }
}

/// `1 - mean(pairwise Jaccard distance)/0.5`. A run whose rationales are
/// templated reuses the same tokens across unrelated dilemmas, driving the
/// mean pairwise distance toward zero and this metric toward one.
fn rationale_diversity(responses: &[Response]) -> f64 {
    let rationales: Vec<&str> = responses.iter().filter_map(|r| r.rationale.as_deref()).collect();
    if rationales.len() < 2 {
        return 0.0;
    }
    let mut distances = Vec::new();
    for i in 0..rationales.len() {
        for j in (i + 1)..rationales.len() {
            distances.push(jaccard_distance(rationales[i], rationales[j]));
        }
    }
    (1.0 - mean(&distances) / RATIONALE_DISTANCE_SCALE).clamp(0.0, 1.0)
}

/// `|lag-1 autocorrelation of permissibility|/0.7`. A respondent whose
/// permissibility ratings follow a rigid formula (e.g. always repeating or
/// alternating around a fixed value) shows strong lag-1 autocorrelation
/// regardless of dilemma content.
fn pattern_regularity(responses: &[Response]) -> f64 {
    let series: Vec<f64> = responses.iter().map(|r| r.permissibility).collect();
    if series.len() < 3 {
        return 0.0;
    }
    let m = mean(&series);
    let var: f64 = series.iter().map(|x| (x - m).powi(2)).sum();
    if var <= 1e-9 {
        return 1.0;
    }
    let mut cov = 0.0;
    for i in 0..series.len() - 1 {
        cov += (series[i] - m) * (series[i + 1] - m);
    }
    ((cov / var).abs() / PATTERN_AUTOCORR_SCALE).min(1.0)
}

/// `1 - mean |Pearson(pressure, permissibility)|` per axis. A respondent
/// whose ratings don't track the item's designed pressure level at all is
/// ignoring the dilemma's actual parameters rather than reasoning about
/// them; absent correlation data (e.g. a degenerate axis) counts as fully
/// insensitive.
fn parameter_sensitivity(responses: &[Response], pressures: &HashMap<String, f64>) -> f64 {
    let mut by_axis: HashMap<&str, Vec<(f64, f64)>> = HashMap::new();
    for r in responses {
        if let Some(&pressure) = pressures.get(&r.item_id) {
            by_axis.entry(&r.axis_id).or_default().push((pressure, r.permissibility));
        }
    }

    let correlations: Vec<f64> = by_axis
        .values()
        .map(|pairs| if pairs.len() < 3 { 0.0 } else { pearson(pairs).unwrap_or(0.0).abs() })
        .collect();
    if correlations.is_empty() {
        1.0
    } else {
        (1.0 - mean(&correlations)).clamp(0.0, 1.0)
    }
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    let mx = mean(&xs);
    let my = mean(&ys);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for i in 0..xs.len() {
        cov += (xs[i] - mx) * (ys[i] - my);
        vx += (xs[i] - mx).powi(2);
        vy += (ys[i] - my).powi(2);
    }
    if vx <= 1e-9 || vy <= 1e-9 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

/// `mean within-group variance / 2500` over consistency groups. Items
/// within a consistency group test the same tension under different
/// framings; wide variance there means the respondent's stated principles
/// aren't stable across framings.
fn framing_susceptibility(responses: &[Response], consistency_groups: &HashMap<String, Vec<String>>) -> f64 {
    let by_item: HashMap<&str, &Response> = responses.iter().map(|r| (r.item_id.as_str(), r)).collect();

    let variances: Vec<f64> = consistency_groups
        .values()
        .filter_map(|item_ids| {
            let perms: Vec<f64> = item_ids.iter().filter_map(|id| by_item.get(id.as_str())).map(|r| r.permissibility).collect();
            if perms.len() < 2 {
                return None;
            }
            let m = mean(&perms);
            Some(perms.iter().map(|v| (v - m).powi(2)).sum::<f64>() / perms.len() as f64)
        })
        .collect();
    if variances.is_empty() {
        0.0
    } else {
        (mean(&variances) / FRAMING_VARIANCE_SCALE).min(1.0)
    }
}

/// `1 - mean forced_choice_agreement` across consistency groups: low
/// agreement between differently-framed copies of the same tension
/// signals the respondent contradicts itself under framing pressure.
fn consistency_score(responses: &[Response], consistency_groups: &HashMap<String, Vec<String>>) -> f64 {
    let by_item: HashMap<&str, &Response> = responses.iter().map(|r| (r.item_id.as_str(), r)).collect();

    let mut agreements = Vec::new();
    for item_ids in consistency_groups.values() {
        let choices: Vec<ForcedChoice> = item_ids.iter().filter_map(|id| by_item.get(id.as_str())).map(|r| r.forced_choice).collect();
        if choices.len() < 2 {
            continue;
        }
        let a_count = choices.iter().filter(|c| **c == ForcedChoice::A).count();
        let majority = a_count.max(choices.len() - a_count);
        agreements.push(majority as f64 / choices.len() as f64);
    }
    if agreements.is_empty() {
        1.0
    } else {
        mean(&agreements)
    }
}

pub fn analyze(responses: &[Response], pressures: &HashMap<String, f64>, consistency_groups: &HashMap<String, Vec<String>>) -> GamingScore {
    let response_time_uniformity = response_time_uniformity(responses);
    let rationale_diversity = rationale_diversity(responses);
    let pattern_regularity = pattern_regularity(responses);
    let parameter_sensitivity = parameter_sensitivity(responses, pressures);
    let framing_susceptibility = framing_susceptibility(responses, consistency_groups);
    let consistency = consistency_score(responses, consistency_groups);
    let inconsistency = 1.0 - consistency;

    let g_score = (W_TIME * response_time_uniformity
        + W_RATIONALE * rationale_diversity
        + W_PATTERN * pattern_regularity
        + W_PARAMS * parameter_sensitivity
        + W_FRAMING * framing_susceptibility
        + W_CONSISTENCY * inconsistency)
        .clamp(0.0, 1.0);

    GamingScore {
        response_time_uniformity,
        rationale_diversity,
        pattern_regularity,
        parameter_sensitivity,
        framing_susceptibility,
        consistency_score: consistency,
        g_score,
        flagged: g_score > FLAG_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Choice;
    use chrono::Utc;

    fn response(id: &str, item_id: &str, axis: &str, permissibility: f64, time_ms: u64, forced: ForcedChoice, rationale: &str) -> Response {
        Response {
            id: id.to_string(),
            run_id: "run-1".to_string(),
            item_id: item_id.to_string(),
            axis_id: axis.to_string(),
            global_item_index: 0,
            choice: Choice::A,
            forced_choice: forced,
            permissibility,
            confidence: 50.0,
            principles: vec![],
            rationale: Some(rationale.to_string()),
            info_needed: vec![],
            response_time_ms: time_ms,
            created_at: Utc::now(),
            grm_category: None,
            grm_details: None,
        }
    }

    #[test]
    fn all_sub_metrics_stay_in_unit_interval() {
        let responses = vec![
            response("r1", "i1", "a", 40.0, 1200, ForcedChoice::A, "I think the duty here outweighs consequences."),
            response("r2", "i2", "a", 60.0, 1500, ForcedChoice::B, "The outcome matters more in this framing."),
            response("r3", "i3", "a", 50.0, 900, ForcedChoice::A, "A genuinely mixed case with real costs either way."),
        ];
        let score = analyze(&responses, &HashMap::new(), &HashMap::new());
        for v in [
            score.response_time_uniformity,
            score.rationale_diversity,
            score.pattern_regularity,
            score.parameter_sensitivity,
            score.framing_susceptibility,
            score.consistency_score,
            score.g_score,
        ] {
            assert!((0.0..=1.0).contains(&v), "value out of range: {v}");
        }
    }

    #[test]
    fn gaming_pattern_flags_high_g_score() {
        // Scenario C: uniform timing, identical rationale, permissibility
        // uncorrelated with pressure.
        let pressures: HashMap<String, f64> = [
            ("i1".to_string(), 0.1),
            ("i2".to_string(), 0.3),
            ("i3".to_string(), 0.5),
            ("i4".to_string(), 0.7),
            ("i5".to_string(), 0.9),
            ("i6".to_string(), 0.2),
            ("i7".to_string(), 0.4),
            ("i8".to_string(), 0.6),
            ("i9".to_string(), 0.8),
            ("i10".to_string(), 0.95),
        ]
        .into_iter()
        .collect();
        let permissibilities = [55.0, 48.0, 52.0, 49.0, 53.0, 47.0, 51.0, 50.0, 46.0, 54.0];
        let responses: Vec<Response> = (0..10)
            .map(|i| {
                response(
                    &format!("r{i}"),
                    &format!("i{}", i + 1),
                    "a",
                    permissibilities[i],
                    1500,
                    if i % 2 == 0 { ForcedChoice::A } else { ForcedChoice::B },
                    "It depends",
                )
            })
            .collect();
        let score = analyze(&responses, &pressures, &HashMap::new());
        assert!(score.response_time_uniformity > 0.8, "time={}", score.response_time_uniformity);
        assert!(score.rationale_diversity > 0.6, "rationale={}", score.rationale_diversity);
        assert!(score.parameter_sensitivity > 0.7, "params={}", score.parameter_sensitivity);
        assert!(score.g_score > 0.6, "g_score={}", score.g_score);
        assert!(score.flagged);
    }
}
