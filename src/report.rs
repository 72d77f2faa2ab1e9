//! Report rendering for a completed evaluation run. Three output shapes —
//! console, JSON, Markdown — mirroring the teacher's `generate`/
//! `generate_json`/`generate_markdown` split.

use anyhow::Result;
use colored::*;

use crate::session::CompletionSummary;

/// Render the full console report straight to stdout.
pub fn generate(summary: &CompletionSummary) -> Result<()> {
    println!();
    println!("{}", "═".repeat(68).cyan());
    println!("{} MORAL SPECTROMETRY — RUN {}", "▶".cyan(), summary.run_id.bright_white().bold());
    println!("{}", "═".repeat(68).cyan());
    println!();

    println!("{} Axis thresholds:", "▶".yellow());
    for score in &summary.axis_scores {
        let bar = threshold_bar(score.b);
        println!(
            "  {:<22} {} b={:>5.2} se={:>5.3} n={:<3} {}",
            score.axis_id,
            bar,
            score.b,
            score.se_b,
            score.n_items,
            flags_str(&score.flags).dimmed()
        );
    }
    println!();

    println!("{} Capacities (weighted composite {:.2}):", "▶".yellow(), summary.capacities.weighted_composite());
    println!(
        "  perception={:.2} imagination={:.2} humility={:.2} coherence={:.2}",
        summary.capacities.moral_perception,
        summary.capacities.moral_imagination,
        summary.capacities.moral_humility,
        summary.capacities.moral_coherence,
    );
    println!(
        "  residue={:.2} flexibility={:.2} meta_ethical_awareness={:.2}",
        summary.capacities.moral_residue, summary.capacities.perspectival_flexibility, summary.capacities.meta_ethical_awareness,
    );
    println!();

    println!("{} Coherence: {:.2} (variance explained {:.2})", "▶".yellow(), summary.coherence.coherence_score, summary.coherence.variance_explained);
    println!();

    let gaming_line = format!("g_score={:.2} flagged={}", summary.gaming.g_score, summary.gaming.flagged);
    println!(
        "{} Gaming detector: {}",
        "▶".yellow(),
        if summary.gaming.flagged { gaming_line.red().bold() } else { gaming_line.green() }
    );
    println!();

    println!("{} Instrument Sophistication: {:.2} ({:?})", "▶".yellow(), summary.ism.ism, summary.ism.tier);
    println!("{} Sophistication Index: {:.2} ({:?})", "▶".yellow(), summary.sophistication.si, summary.sophistication.si_level);
    println!();

    println!(
        "{} Moral Rating: {:.0} ± {:.0} over {} items ({:?} confidence)",
        "★".bright_yellow(),
        summary.rating.mr_rating,
        summary.rating.mr_uncertainty,
        summary.rating.items_processed,
        summary.confidence
    );
    println!("{}", "═".repeat(68).cyan());
    println!();

    Ok(())
}

fn threshold_bar(b: f64) -> String {
    let filled = (b.clamp(0.0, 1.0) * 20.0).round() as usize;
    let empty = 20 - filled;
    format!("[{}{}]", "█".repeat(filled).blue(), "░".repeat(empty).dimmed())
}

fn flags_str(flags: &[crate::types::AxisFlag]) -> String {
    if flags.is_empty() {
        String::new()
    } else {
        format!("{flags:?}")
    }
}

pub fn generate_json(summary: &CompletionSummary) -> Result<String> {
    let value = serde_json::json!({
        "run_id": summary.run_id,
        "axis_scores": summary.axis_scores,
        "capacities": summary.capacities,
        "procedural": summary.procedural,
        "coherence": summary.coherence,
        "gaming": summary.gaming,
        "ism": summary.ism,
        "sophistication": summary.sophistication,
        "rating": summary.rating,
        "confidence": summary.confidence,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn generate_markdown(summary: &CompletionSummary) -> Result<String> {
    let mut md = String::new();
    md.push_str(&format!("# Moral Spectrometry Report — run `{}`\n\n", summary.run_id));

    md.push_str("## Axis thresholds\n\n");
    md.push_str("| Axis | b | se(b) | n | flags |\n|---|---|---|---|---|\n");
    for score in &summary.axis_scores {
        md.push_str(&format!(
            "| {} | {:.2} | {:.3} | {} | {} |\n",
            score.axis_id,
            score.b,
            score.se_b,
            score.n_items,
            flags_str(&score.flags)
        ));
    }

    md.push_str(&format!(
        "\n**Coherence:** {:.2} (variance explained {:.2})\n\n",
        summary.coherence.coherence_score, summary.coherence.variance_explained
    ));
    md.push_str(&format!(
        "**Gaming detector:** g_score={:.2}, flagged={}\n\n",
        summary.gaming.g_score, summary.gaming.flagged
    ));
    md.push_str(&format!("**Instrument Sophistication:** {:.2} ({:?})\n\n", summary.ism.ism, summary.ism.tier));
    md.push_str(&format!("**Sophistication Index:** {:.2} ({:?})\n\n", summary.sophistication.si, summary.sophistication.si_level));
    md.push_str(&format!(
        "**Moral Rating:** {:.0} ± {:.0} over {} items ({:?} confidence)\n",
        summary.rating.mr_rating, summary.rating.mr_uncertainty, summary.rating.items_processed, summary.confidence
    ));

    Ok(md)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::{CapacityProfile, Methodology, ProceduralMetric, ProceduralMetrics};
    use crate::coherence::{CoherenceResult, DominantOrientation};
    use crate::gaming::GamingScore;
    use crate::ism::{IsmResult, Tier};
    use crate::sophistication::{SiLevel, SophisticationResult};
    use crate::types::{AgentRating, ConfidenceLevel};
    use std::collections::HashMap;

    fn sample_summary() -> CompletionSummary {
        let metric = || ProceduralMetric { value: 0.6, methodology: Methodology::Statistical };
        CompletionSummary {
            run_id: "run-1".to_string(),
            axis_scores: vec![],
            capacities: CapacityProfile {
                moral_perception: 0.6,
                moral_imagination: 0.6,
                moral_humility: 0.6,
                moral_coherence: 0.6,
                moral_residue: 0.6,
                perspectival_flexibility: 0.6,
                meta_ethical_awareness: 0.6,
            },
            procedural: ProceduralMetrics {
                moral_sensitivity: metric(),
                info_seeking: metric(),
                calibration: metric(),
                consistency: metric(),
                principle_diversity: metric(),
                reasoning_depth: metric(),
            },
            coherence: CoherenceResult {
                orientation: HashMap::new(),
                dominant: DominantOrientation::Mixed,
                coherence_score: 0.7,
                variance_explained: 0.7,
            },
            gaming: GamingScore::default(),
            ism: IsmResult {
                profile_richness: 0.5,
                procedural_quality: 0.5,
                measurement_precision: 0.5,
                penalty: 0.0,
                ism: 0.5,
                tier: Tier::Tier2,
            },
            sophistication: SophisticationResult {
                integration: 0.5,
                metacognition: 0.5,
                stability: 0.5,
                adaptability: None,
                self_model_accuracy: None,
                si: 0.5,
                si_level: SiLevel::Integrated,
            },
            rating: AgentRating::new("agent-1"),
            confidence: ConfidenceLevel::Medium,
        }
    }

    #[test]
    fn json_report_round_trips_through_serde() {
        let summary = sample_summary();
        let json = generate_json(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["run_id"], "run-1");
    }

    #[test]
    fn markdown_report_includes_run_id_and_rating() {
        let summary = sample_summary();
        let md = generate_markdown(&summary).unwrap();
        assert!(md.contains("run-1"));
        assert!(md.contains("Moral Rating"));
    }
}
