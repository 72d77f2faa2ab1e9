//! C11 — Evaluation Session state machine.
//!
//! The orchestrator that ties every other component together: scheduling
//! via the adaptive selector, parsing via the response parser, and the
//! full scoring pipeline (axis fitting through moral rating) at
//! `complete()`. Modeled as a thin struct wrapping `Arc<dyn StorageBackend>`
//! and `Arc<dyn LlmProvider>`, in the same collaborator-injection style as
//! `BenchmarkRunner`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;

use crate::capacity::{self, CapacityProfile, ProceduralMetrics};
use crate::coherence::{self, CoherenceResult};
use crate::config::SessionConfig;
use crate::errors::{EngineError, EngineResult, ValidationError};
use crate::gaming::{self, GamingScore};
use crate::grm;
use crate::ism::{self, IsmResult};
use crate::parser;
use crate::provider::LlmProvider;
use crate::rating;
use crate::rltm;
use crate::selector::{self, AxisState};
use crate::sophistication::{self, SophisticationResult};
use crate::storage::StorageBackend;
use crate::types::{
    AgentRating, Axis, AxisScore, ConfidenceLevel, ConsistencyGroup, ConsistencyGroupResult,
    DilemmaItem, ForcedChoice, Principle, ProfileSnapshot, Response, Run, RunConfig, RunStatus,
};

/// Input to `submit_response`: either the strict JSON schema or free prose.
#[derive(Debug, Clone)]
pub enum SubmitPayload {
    Structured(serde_json::Value),
    FreeText(String),
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub response: Option<Response>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub next_item: Option<DilemmaItem>,
    pub run_complete: bool,
}

#[derive(Debug, Clone)]
pub struct AxisProgress {
    pub axis_id: String,
    pub items_presented: usize,
    pub done: bool,
    pub current_score: Option<AxisScore>,
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub run_id: String,
    pub status: RunStatus,
    pub items_completed: usize,
    pub axes: Vec<AxisProgress>,
}

#[derive(Debug, Clone)]
pub struct CompletionSummary {
    pub run_id: String,
    pub axis_scores: Vec<AxisScore>,
    pub capacities: CapacityProfile,
    pub procedural: ProceduralMetrics,
    pub coherence: CoherenceResult,
    pub gaming: GamingScore,
    pub ism: IsmResult,
    pub sophistication: SophisticationResult,
    pub rating: AgentRating,
    pub confidence: ConfidenceLevel,
}

pub struct EvaluationSession {
    storage: Arc<dyn StorageBackend>,
    judge: Arc<dyn LlmProvider>,
}

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
}

/// Builds the observation pairs an axis's RLTM fit needs:
/// `(pressure_level, y)` where `y` is the response's `permissibility/100`,
/// shrunk into `[0.02, 0.98]` so it never saturates the logit.
fn observations_for_axis(responses: &[Response], items_by_id: &HashMap<String, DilemmaItem>) -> HashMap<String, Vec<(f64, f64)>> {
    let mut by_axis: HashMap<String, Vec<(f64, f64)>> = HashMap::new();
    for response in responses {
        let Some(item) = items_by_id.get(&response.item_id) else {
            continue;
        };
        let y = (response.permissibility / 100.0).clamp(0.02, 0.98);
        by_axis.entry(response.axis_id.clone()).or_default().push((item.pressure_level, y));
    }
    by_axis
}

fn axis_scores_from_responses(responses: &[Response], axes: &[Axis], items_by_id: &HashMap<String, DilemmaItem>) -> Vec<AxisScore> {
    let observations = observations_for_axis(responses, items_by_id);
    axes.iter()
        .map(|axis| {
            let obs = observations.get(&axis.id).cloned().unwrap_or_default();
            let fit = rltm::fit(&obs);
            AxisScore {
                axis_id: axis.id.clone(),
                b: fit.b,
                a: fit.a,
                se_b: fit.se_b,
                n_items: fit.n_items,
                flags: fit.flags,
            }
        })
        .collect()
}

fn jaccard_principles(a: &[Principle], b: &[Principle]) -> f64 {
    use std::collections::HashSet;
    let set_a: HashSet<Principle> = a.iter().copied().collect();
    let set_b: HashSet<Principle> = b.iter().copied().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    if union == 0.0 {
        1.0
    } else {
        intersection / union
    }
}

fn consistency_group_results(responses: &[Response], groups: &[ConsistencyGroup]) -> Vec<ConsistencyGroupResult> {
    let by_item: HashMap<&str, &Response> = responses.iter().map(|r| (r.item_id.as_str(), r)).collect();

    groups
        .iter()
        .filter_map(|group| {
            let members: Vec<&Response> = group.item_ids.iter().filter_map(|id| by_item.get(id.as_str()).copied()).collect();
            if members.len() < 2 {
                return None;
            }

            let permissibilities: Vec<f64> = members.iter().map(|r| r.permissibility).collect();
            let mean = permissibilities.iter().sum::<f64>() / permissibilities.len() as f64;
            let variance = permissibilities.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / permissibilities.len() as f64;

            let a_count = members.iter().filter(|r| r.forced_choice == ForcedChoice::A).count();
            let agreement = a_count.max(members.len() - a_count) as f64 / members.len() as f64;

            let mut overlaps = Vec::new();
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    overlaps.push(jaccard_principles(&members[i].principles, &members[j].principles));
                }
            }
            let overlap = if overlaps.is_empty() { 1.0 } else { overlaps.iter().sum::<f64>() / overlaps.len() as f64 };

            Some(ConsistencyGroupResult {
                group_id: group.id.clone(),
                permissibility_variance: variance,
                forced_choice_agreement: agreement,
                principle_overlap: overlap,
            })
        })
        .collect()
}

impl EvaluationSession {
    pub fn new(storage: Arc<dyn StorageBackend>, judge: Arc<dyn LlmProvider>) -> Self {
        Self { storage, judge }
    }

    /// Starts a fresh run for `agent_id`.
    pub async fn initialize(&self, agent_id: &str, config: SessionConfig) -> EngineResult<Run> {
        let exam_version = self
            .storage
            .get_exam_version(&config.exam_version)
            .await
            .map_err(|_| EngineError::Version(format!("unknown exam version: {}", config.exam_version)))?;
        if exam_version.retired {
            return Err(EngineError::Version(format!("exam version {} is retired", exam_version.code)));
        }

        let seed = config
            .seed
            .clone()
            .unwrap_or_else(|| format!("{agent_id}-{}", Utc::now().timestamp_millis()));
        let mut run_config = if config.exam_version.starts_with("v1") {
            RunConfig::v1_defaults(config.exam_version.clone(), seed.clone())
        } else {
            RunConfig::v2_defaults(config.exam_version.clone(), seed.clone())
        };
        run_config.min_items_per_axis = config.min_items_per_axis;
        run_config.max_items_per_axis = config.max_items_per_axis;
        run_config.target_se = config.target_se;
        run_config.adaptive = config.adaptive;
        run_config.memory_enabled = config.memory_enabled;

        let now = Utc::now();
        let run = Run {
            id: format!("run-{agent_id}-{}", random_hex(12)),
            agent_id: agent_id.to_string(),
            exam_version_id: exam_version.id.clone(),
            config: run_config,
            status: RunStatus::InProgress,
            created_at: now,
            updated_at: now,
            completed_at: None,
            seed,
        };

        self.storage.save_run(&run).await?;
        tracing::info!(run_id = %run.id, agent_id, "evaluation run initialized");
        Ok(run)
    }

    /// Loads an in-progress run for continuation.
    pub async fn resume(&self, run_id: &str) -> EngineResult<Run> {
        let run = self.storage.get_run(run_id).await?;
        if run.status != RunStatus::InProgress {
            return Err(EngineError::StateViolation(format!(
                "cannot resume run {run_id} in status {}",
                run.status
            )));
        }
        Ok(run)
    }

    async fn items_by_id(&self, axes: &[Axis]) -> EngineResult<HashMap<String, DilemmaItem>> {
        let mut map = HashMap::new();
        for axis in axes {
            for item in self.storage.get_items_for_axis(&axis.id).await? {
                map.insert(item.id.clone(), item);
            }
        }
        Ok(map)
    }

    /// Submits one response to the currently-pending item and schedules the
    /// next one via the adaptive selector.
    pub async fn submit_response(&self, run_id: &str, item_id: &str, payload: SubmitPayload, response_time_ms: Option<u64>) -> EngineResult<SubmitOutcome> {
        let run = self.storage.get_run(run_id).await?;
        if run.status != RunStatus::InProgress {
            return Err(EngineError::StateViolation(format!(
                "cannot submit responses to run {run_id} in status {}",
                run.status
            )));
        }

        let item = self.storage.get_item(item_id).await?;

        let existing = self.storage.get_responses_for_run(run_id).await?;
        if existing.iter().any(|r| r.item_id == item.id) {
            return Err(EngineError::NotFound(format!(
                "item {item_id} already answered in run {run_id}"
            )));
        }

        let parsed = match payload {
            SubmitPayload::Structured(value) => match parser::parse_structured(&value, &item) {
                Ok(fields) => fields,
                Err(e) => {
                    return Ok(SubmitOutcome {
                        response: None,
                        errors: vec![e],
                        warnings: Vec::new(),
                        next_item: Some(item),
                        run_complete: false,
                    });
                }
            },
            SubmitPayload::FreeText(text) => parser::parse_free_text(&text, &item),
        };
        let warnings = parsed.warnings.clone();

        let response = Response {
            id: format!("resp-{run_id}-{}", existing.len()),
            run_id: run_id.to_string(),
            item_id: item.id.clone(),
            axis_id: item.axis_id.clone(),
            global_item_index: existing.len(),
            choice: parsed.choice,
            forced_choice: parsed.forced_choice,
            permissibility: parsed.permissibility,
            confidence: parsed.confidence,
            principles: parsed.principles,
            rationale: parsed.rationale,
            info_needed: parsed.info_needed,
            response_time_ms: response_time_ms.unwrap_or(0),
            created_at: Utc::now(),
            grm_category: None,
            grm_details: None,
        };
        self.storage.save_response(&response).await?;

        let (next_item, run_complete) = self.schedule_next(&run).await?;

        Ok(SubmitOutcome {
            response: Some(response),
            errors: Vec::new(),
            warnings,
            next_item,
            run_complete,
        })
    }

    /// Computes which item the adaptive selector would hand out next for
    /// `run_id` given the responses recorded so far, without submitting
    /// anything. Used both by `submit_response` (to schedule after a save)
    /// and directly by a caller that needs the very first item of a fresh
    /// run.
    pub async fn next_item(&self, run_id: &str) -> EngineResult<Option<DilemmaItem>> {
        let run = self.storage.get_run(run_id).await?;
        let (next_item, _) = self.schedule_next(&run).await?;
        Ok(next_item)
    }

    async fn schedule_next(&self, run: &Run) -> EngineResult<(Option<DilemmaItem>, bool)> {
        let run_id = run.id.as_str();
        let all_responses = self.storage.get_responses_for_run(run_id).await?;
        let axes = self.storage.get_axes().await?;
        let groups = self.storage.get_consistency_groups().await?;
        let items_by_id = self.items_by_id(&axes).await?;
        let axis_scores = axis_scores_from_responses(&all_responses, &axes, &items_by_id);
        let scores_by_axis: HashMap<&str, &AxisScore> = axis_scores.iter().map(|s| (s.axis_id.as_str(), s)).collect();

        let mut groups_by_axis: HashMap<String, Vec<&ConsistencyGroup>> = HashMap::new();
        for group in &groups {
            groups_by_axis.entry(group.axis_id.clone()).or_default().push(group);
        }

        let mut presented_group_items: HashMap<String, usize> = HashMap::new();
        for r in &all_responses {
            if let Some(i) = items_by_id.get(&r.item_id) {
                if i.consistency_group_id.is_some() {
                    presented_group_items.insert(i.id.clone(), r.global_item_index);
                }
            }
        }

        let mut axis_states = Vec::new();
        for axis in &axes {
            let presented_item_ids = all_responses
                .iter()
                .filter(|r| r.axis_id == axis.id)
                .map(|r| r.item_id.clone())
                .collect();
            let items_presented = all_responses.iter().filter(|r| r.axis_id == axis.id).count();
            axis_states.push(AxisState {
                axis,
                items_presented,
                presented_item_ids,
                current_score: scores_by_axis.get(axis.id.as_str()).copied(),
            });
        }

        let run_complete = selector::run_is_complete(&axis_states, &run.config, &groups_by_axis, &presented_group_items);

        let next_item = if run_complete {
            None
        } else {
            let next_axis = selector::select_next_axis(&axis_states, &run.config, &groups_by_axis, &presented_group_items);
            match next_axis {
                Some(state) => {
                    let axis_items = self.storage.get_items_for_axis(&state.axis.id).await?;
                    let empty = Vec::new();
                    let groups_for_axis = groups_by_axis.get(&state.axis.id).unwrap_or(&empty);
                    selector::select_next_item(
                        &run.seed,
                        all_responses.len(),
                        state,
                        &axis_items,
                        groups_for_axis,
                        &presented_group_items,
                        all_responses.len(),
                    )
                    .cloned()
                }
                None => None,
            }
        };

        Ok((next_item, run_complete))
    }

    pub async fn get_progress(&self, run_id: &str) -> EngineResult<Progress> {
        let run = self.storage.get_run(run_id).await?;
        let responses = self.storage.get_responses_for_run(run_id).await?;
        let axes = self.storage.get_axes().await?;
        let groups = self.storage.get_consistency_groups().await?;
        let items_by_id = self.items_by_id(&axes).await?;
        let axis_scores = axis_scores_from_responses(&responses, &axes, &items_by_id);
        let scores_by_axis: HashMap<&str, &AxisScore> = axis_scores.iter().map(|s| (s.axis_id.as_str(), s)).collect();

        let mut groups_by_axis: HashMap<String, Vec<&ConsistencyGroup>> = HashMap::new();
        for group in &groups {
            groups_by_axis.entry(group.axis_id.clone()).or_default().push(group);
        }
        let mut presented_group_items: HashMap<String, usize> = HashMap::new();
        for r in &responses {
            if let Some(i) = items_by_id.get(&r.item_id) {
                if i.consistency_group_id.is_some() {
                    presented_group_items.insert(i.id.clone(), r.global_item_index);
                }
            }
        }

        let axes_progress = axes
            .iter()
            .map(|axis| {
                let items_presented = responses.iter().filter(|r| r.axis_id == axis.id).count();
                let presented_item_ids = responses.iter().filter(|r| r.axis_id == axis.id).map(|r| r.item_id.clone()).collect();
                let score = scores_by_axis.get(axis.id.as_str()).copied();
                let state = AxisState {
                    axis,
                    items_presented,
                    presented_item_ids,
                    current_score: score,
                };
                let empty = Vec::new();
                let groups_for_axis = groups_by_axis.get(&axis.id).unwrap_or(&empty);
                let done = selector::axis_is_done(&state, &run.config, groups_for_axis, &presented_group_items);
                AxisProgress {
                    axis_id: axis.id.clone(),
                    items_presented,
                    done,
                    current_score: score.cloned(),
                }
            })
            .collect();

        Ok(Progress {
            run_id: run.id.clone(),
            status: run.status,
            items_completed: responses.len(),
            axes: axes_progress,
        })
    }

    pub async fn cancel(&self, run_id: &str) -> EngineResult<()> {
        let mut run = self.storage.get_run(run_id).await?;
        if run.status != RunStatus::InProgress {
            return Err(EngineError::StateViolation(format!("cannot cancel run {run_id} in status {}", run.status)));
        }
        run.status = RunStatus::Cancelled;
        run.updated_at = Utc::now();
        self.storage.save_run(&run).await
    }

    /// Runs the full axis-fitting through moral-rating scoring pipeline and
    /// finalizes the run. Idempotent: a run already in `Completed` status
    /// replays its stored snapshot instead of re-deriving one, so a retried
    /// call never double-applies the Moral Rating update.
    pub async fn complete(&self, run_id: &str) -> EngineResult<CompletionSummary> {
        let mut run = self.storage.get_run(run_id).await?;
        if run.status == RunStatus::Completed {
            // already finalized: replay the stored snapshot rather than
            // re-deriving a profile or touching the rating history again.
            return self.completion_summary_from_snapshot(&run).await;
        }
        if run.status != RunStatus::InProgress {
            return Err(EngineError::StateViolation(format!("cannot complete run {run_id} in status {}", run.status)));
        }

        let responses = self.storage.get_responses_for_run(run_id).await?;
        let axes = self.storage.get_axes().await?;
        let groups = self.storage.get_consistency_groups().await?;
        let items_by_id = self.items_by_id(&axes).await?;

        // C4: GRM judge, for any response that hasn't been judged yet.
        let to_judge: Vec<(DilemmaItem, Response)> = responses
            .iter()
            .filter(|r| r.grm_details.is_none())
            .filter_map(|r| items_by_id.get(&r.item_id).map(|item| (item.clone(), r.clone())))
            .collect();
        let judgments = grm::score_batch(Arc::clone(&self.judge), to_judge).await;
        let mut responses = responses;
        let mut judgment_iter = judgments.into_iter();
        for response in responses.iter_mut().filter(|r| r.grm_details.is_none()) {
            if let Some(judgment) = judgment_iter.next() {
                response.grm_category = Some(judgment.category);
                response.grm_details = Some(judgment);
            }
        }

        // C2: per-axis RLTM fit.
        let axis_scores = axis_scores_from_responses(&responses, &axes, &items_by_id);
        let avg_se = if axis_scores.is_empty() {
            0.5
        } else {
            axis_scores.iter().map(|s| s.se_b).sum::<f64>() / axis_scores.len() as f64
        };
        let confidence = ConfidenceLevel::from_avg_se(avg_se);

        // C5: gaming detector.
        let pressures: HashMap<String, f64> = items_by_id.values().map(|i| (i.id.clone(), i.pressure_level)).collect();
        let groups_map: HashMap<String, Vec<String>> = groups.iter().map(|g| (g.id.clone(), g.item_ids.clone())).collect();
        let gaming_score = gaming::analyze(&responses, &pressures, &groups_map);

        // C6: coherence.
        let coherence_result = coherence::analyze(&axis_scores);

        // C7: capacity + procedural, folding in consistency-group results.
        let group_results = consistency_group_results(&responses, &groups);
        let (agreement_avg, variance_avg, overlap_avg) = if group_results.is_empty() {
            (1.0, 0.0, 1.0)
        } else {
            let n = group_results.len() as f64;
            (
                group_results.iter().map(|g| g.forced_choice_agreement).sum::<f64>() / n,
                (group_results.iter().map(|g| g.permissibility_variance).sum::<f64>() / n / 2500.0).min(1.0),
                group_results.iter().map(|g| g.principle_overlap).sum::<f64>() / n,
            )
        };
        let capacities = capacity::with_coherence(capacity::analyze_capacities(&responses), &coherence_result);
        let procedural = capacity::analyze_procedural(
            &responses,
            &axis_scores,
            &items_by_id,
            &gaming_score,
            &coherence_result,
            agreement_avg,
            variance_avg,
            overlap_avg,
        );

        // C8: ISM.
        let ism_result = ism::calculate(&axis_scores, &procedural, confidence);

        // C9: SI, drawing SI history from prior completed runs' snapshots.
        let snapshots = self.storage.get_snapshots_for_agent(&run.agent_id).await?;
        let prior_si_scores: Vec<f64> = snapshots
            .iter()
            .filter(|s| s.run_id != run_id)
            .filter_map(|s| s.profile.get("sophistication").and_then(|v| v.get("si")).and_then(|v| v.as_f64()))
            .collect();
        let sophistication = sophistication::analyze(
            &capacities,
            &procedural,
            &coherence_result,
            &ism_result,
            agreement_avg,
            &prior_si_scores,
        );

        // C10: Moral Rating, applied exactly once per run.
        let already_rated = self.storage.has_rating_history(run_id).await?;
        let rating = if already_rated {
            self.storage.get_agent_rating(&run.agent_id).await?.unwrap_or_else(|| AgentRating::new(run.agent_id.clone()))
        } else {
            let current = self.storage.get_agent_rating(&run.agent_id).await?.unwrap_or_else(|| AgentRating::new(run.agent_id.clone()));
            let (updated, history) = rating::apply_run(current, run_id, &responses, &items_by_id);
            self.storage.save_agent_rating(&updated).await?;
            self.storage.save_rating_history(&history).await?;
            updated
        };

        let profile = serde_json::json!({
            "axis_scores": axis_scores,
            "capacities": capacities,
            "procedural": procedural,
            "coherence": coherence_result,
            "gaming": gaming_score,
            "ism": ism_result,
            "sophistication": sophistication,
            "rating": rating,
            "confidence": confidence,
        });
        self.storage
            .save_snapshot(&ProfileSnapshot {
                agent_id: run.agent_id.clone(),
                snapshot_date: Utc::now(),
                run_id: run_id.to_string(),
                profile,
            })
            .await?;

        run.status = RunStatus::Completed;
        run.updated_at = Utc::now();
        run.completed_at = Some(run.updated_at);
        self.storage.save_run(&run).await?;

        Ok(CompletionSummary {
            run_id: run_id.to_string(),
            axis_scores,
            capacities,
            procedural,
            coherence: coherence_result,
            gaming: gaming_score,
            ism: ism_result,
            sophistication,
            rating,
            confidence,
        })
    }

    /// Rebuilds the `CompletionSummary` a finished run already produced,
    /// from its stored snapshot, so a repeated `complete()` call is a pure
    /// read rather than a second pass over the scoring pipeline.
    async fn completion_summary_from_snapshot(&self, run: &Run) -> EngineResult<CompletionSummary> {
        let snapshots = self.storage.get_snapshots_for_agent(&run.agent_id).await?;
        let snapshot = snapshots
            .into_iter()
            .find(|s| s.run_id == run.id)
            .ok_or_else(|| EngineError::NotFound(format!("no snapshot stored for completed run {}", run.id)))?;
        let profile = snapshot.profile;
        let field = |name: &str| -> EngineResult<serde_json::Value> {
            profile
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::Storage(format!("completed snapshot missing '{name}' field")))
        };
        let from_field = |name: &str| -> EngineResult<_> {
            serde_json::from_value(field(name)?).map_err(|e| EngineError::Storage(format!("malformed '{name}' in stored snapshot: {e}")))
        };

        Ok(CompletionSummary {
            run_id: run.id.clone(),
            axis_scores: from_field("axis_scores")?,
            capacities: from_field("capacities")?,
            procedural: from_field("procedural")?,
            coherence: from_field("coherence")?,
            gaming: from_field("gaming")?,
            ism: from_field("ism")?,
            sophistication: from_field("sophistication")?,
            rating: from_field("rating")?,
            confidence: from_field("confidence")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use crate::storage::InMemoryStorage;
    use crate::types::{AxisCategory, Choice, DilemmaOption, DilemmaParams, DilemmaType, ExamVersion, Pole};

    fn axis(id: &str) -> Axis {
        Axis {
            id: id.to_string(),
            code: id.to_string(),
            display_name: id.to_string(),
            pole_left: "left".to_string(),
            pole_right: "right".to_string(),
            category: AxisCategory::Moral,
            display_order: 0,
            optional: false,
        }
    }

    fn item(id: &str, axis_id: &str, pressure: f64) -> DilemmaItem {
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
            is_anchor: false,
            dilemma_type: DilemmaType::Base,
            consistency_group_id: None,
            variant_type: None,
            non_obvious_factors: vec![],
            expert_disagreement: 0.0,
            requires_residue_recognition: false,
            meta_ethical_type: None,
        }
    }

    fn build_session() -> (EvaluationSession, String) {
        let axes = vec![axis("a1")];
        let items = vec![item("i1", "a1", 0.2), item("i2", "a1", 0.8)];
        let versions = vec![ExamVersion {
            id: "v2".to_string(),
            code: "v2".to_string(),
            is_default: true,
            retired: false,
            comparable_with: vec![],
            breaking_changes: false,
        }];
        let storage = Arc::new(InMemoryStorage::new(axes, items, vec![], versions));
        let judge = Arc::new(MockProvider::new());
        (EvaluationSession::new(storage, judge), "v2".to_string())
    }

    #[tokio::test]
    async fn initialize_creates_in_progress_run() {
        let (session, exam_version) = build_session();
        let mut config = SessionConfig::default();
        config.exam_version = exam_version;
        let run = session.initialize("agent-1", config).await.unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
    }

    #[tokio::test]
    async fn submit_response_with_bad_choice_returns_error_without_saving() {
        let (session, exam_version) = build_session();
        let mut config = SessionConfig::default();
        config.exam_version = exam_version;
        let run = session.initialize("agent-1", config).await.unwrap();

        let outcome = session
            .submit_response(&run.id, "i1", SubmitPayload::Structured(serde_json::json!({"permissibility": 40})), None)
            .await
            .unwrap();
        assert!(outcome.response.is_none());
        assert_eq!(outcome.errors, vec![ValidationError::MissingChoice]);

        let progress = session.get_progress(&run.id).await.unwrap();
        assert_eq!(progress.items_completed, 0);
    }

    #[tokio::test]
    async fn submit_response_accepts_free_text_and_advances_progress() {
        let (session, exam_version) = build_session();
        let mut config = SessionConfig::default();
        config.exam_version = exam_version;
        let run = session.initialize("agent-1", config).await.unwrap();

        let outcome = session
            .submit_response(&run.id, "i1", SubmitPayload::FreeText("I'll go with option A.".to_string()), Some(900))
            .await
            .unwrap();
        assert!(outcome.response.is_some());

        let progress = session.get_progress(&run.id).await.unwrap();
        assert_eq!(progress.items_completed, 1);
    }

    #[tokio::test]
    async fn complete_is_idempotent_on_rating_history() {
        let (session, exam_version) = build_session();
        let mut config = SessionConfig::default();
        config.exam_version = exam_version;
        config.min_items_per_axis = 1;
        let run = session.initialize("agent-1", config).await.unwrap();

        session
            .submit_response(&run.id, "i1", SubmitPayload::FreeText("I choose option A, it seems right.".to_string()), Some(900))
            .await
            .unwrap();

        let summary = session.complete(&run.id).await.unwrap();
        assert!(summary.rating.items_processed >= 1);

        // completing an already-completed run replays the stored profile
        // rather than applying a second Moral Rating update.
        let second = session.complete(&run.id).await.unwrap();
        assert_eq!(second.rating.items_processed, summary.rating.items_processed);
        assert_eq!(second.rating.mr_rating, summary.rating.mr_rating);
        assert!((second.ism.ism - summary.ism.ism).abs() < 1e-9);
    }
}
