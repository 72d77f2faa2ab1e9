//! Moral Spectrometry Engine: adaptive psychometric evaluation of AI moral
//! reasoning. Presents parametric ethical dilemmas to an agent, adaptively
//! schedules which dilemma comes next, and infers a multi-dimensional
//! moral-reasoning profile from the responses.
//!
//! The [`Engine`] facade is the intended integration surface; it wraps a
//! [`storage::StorageBackend`] and an [`provider::LlmProvider`] and exposes
//! the public operations a host application calls.

#![allow(dead_code)]

pub mod capacity;
pub mod coherence;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod gaming;
pub mod grm;
pub mod ism;
pub mod parser;
pub mod profile;
pub mod provider;
pub mod rating;
pub mod report;
pub mod rltm;
pub mod selector;
pub mod session;
pub mod sophistication;
pub mod storage;
pub mod types;

use std::sync::Arc;

use errors::EngineResult;
use provider::LlmProvider;
use session::{CompletionSummary, EvaluationSession, Progress, SubmitOutcome, SubmitPayload};
use storage::StorageBackend;
use types::{Axis, DilemmaItem, ProfileSnapshot, RatingHistoryEntry, Run};

/// Top-level facade a host application constructs once per dilemma-bank +
/// judge-provider pairing and shares across evaluation runs.
pub struct Engine {
    storage: Arc<dyn StorageBackend>,
    session: EvaluationSession,
}

impl Engine {
    pub fn new(storage: Arc<dyn StorageBackend>, judge: Arc<dyn LlmProvider>) -> Self {
        let session = EvaluationSession::new(Arc::clone(&storage), judge);
        Self { storage, session }
    }

    pub async fn start_evaluation(&self, agent_id: &str, config: config::SessionConfig) -> EngineResult<Run> {
        self.session.initialize(agent_id, config).await
    }

    pub async fn resume_evaluation(&self, run_id: &str) -> EngineResult<Run> {
        self.session.resume(run_id).await
    }

    /// The item the adaptive selector would hand out next for `run_id`,
    /// including the very first item of a freshly-initialized run.
    pub async fn next_item(&self, run_id: &str) -> EngineResult<Option<DilemmaItem>> {
        self.session.next_item(run_id).await
    }

    pub async fn submit_response(&self, run_id: &str, item_id: &str, payload: SubmitPayload, response_time_ms: Option<u64>) -> EngineResult<SubmitOutcome> {
        self.session.submit_response(run_id, item_id, payload, response_time_ms).await
    }

    pub async fn get_progress(&self, run_id: &str) -> EngineResult<Progress> {
        self.session.get_progress(run_id).await
    }

    pub async fn cancel_evaluation(&self, run_id: &str) -> EngineResult<()> {
        self.session.cancel(run_id).await
    }

    pub async fn complete_evaluation(&self, run_id: &str) -> EngineResult<CompletionSummary> {
        self.session.complete(run_id).await
    }

    /// Most recent completed-run snapshot for an agent.
    pub async fn get_agent_profile(&self, agent_id: &str) -> EngineResult<Option<profile::Profile>> {
        let snapshots = self.storage.get_snapshots_for_agent(agent_id).await?;
        Ok(snapshots.iter().max_by_key(|s| s.snapshot_date).map(profile::from_snapshot))
    }

    /// A best-effort profile for a run still in progress, computed live off
    /// whatever axis data exists so far rather than the finalized pipeline.
    pub async fn get_partial_profile(&self, run_id: &str) -> EngineResult<Progress> {
        self.session.get_progress(run_id).await
    }

    /// The latest profile plus its full Moral Rating history.
    pub async fn get_enriched_profile(&self, agent_id: &str) -> EngineResult<Option<profile::EnrichedProfile>> {
        let Some(latest) = self.get_agent_profile(agent_id).await? else {
            return Ok(None);
        };
        let rating_history = self.get_rating_history(agent_id).await?;
        Ok(Some(profile::enrich(latest, rating_history)))
    }

    pub async fn get_profile_history(&self, agent_id: &str) -> EngineResult<Vec<ProfileSnapshot>> {
        self.storage.get_snapshots_for_agent(agent_id).await
    }

    /// Clusters agents by how similar their axis-threshold vectors are.
    pub fn compare_agents(&self, agents: &[(String, profile::AxisVector)], threshold: f64) -> Vec<profile::AgentCluster> {
        profile::compare_agents(agents, threshold)
    }

    pub async fn get_sophistication_score(&self, agent_id: &str) -> EngineResult<Option<serde_json::Value>> {
        let profile = self.get_agent_profile(agent_id).await?;
        Ok(profile.and_then(|p| p.data.get("sophistication").cloned()))
    }

    pub async fn get_sophistication_history(&self, agent_id: &str) -> EngineResult<Vec<(String, serde_json::Value)>> {
        let snapshots = self.storage.get_snapshots_for_agent(agent_id).await?;
        Ok(snapshots
            .into_iter()
            .filter_map(|s| s.profile.get("sophistication").cloned().map(|v| (s.run_id, v)))
            .collect())
    }

    pub async fn get_axes(&self) -> EngineResult<Vec<Axis>> {
        self.storage.get_axes().await
    }

    pub async fn get_axis_items(&self, axis_id: &str) -> EngineResult<Vec<DilemmaItem>> {
        self.storage.get_items_for_axis(axis_id).await
    }

    pub async fn get_run_details(&self, run_id: &str) -> EngineResult<Run> {
        self.storage.get_run(run_id).await
    }

    pub async fn get_agent_runs(&self, agent_id: &str) -> EngineResult<Vec<Run>> {
        self.storage.get_runs_for_agent(agent_id).await
    }

    async fn get_rating_history(&self, agent_id: &str) -> EngineResult<Vec<RatingHistoryEntry>> {
        // The storage trait exposes rating history per-run, not per-agent
        // directly; derive it from the agent's runs.
        let runs = self.storage.get_runs_for_agent(agent_id).await?;
        let mut history = Vec::new();
        for run in runs {
            if self.storage.has_rating_history(&run.id).await? {
                if let Some(snapshot) = self.storage.get_snapshots_for_agent(agent_id).await?.into_iter().find(|s| s.run_id == run.id) {
                    if let Some(rating) = snapshot.profile.get("rating") {
                        if let Ok(agent_rating) = serde_json::from_value::<types::AgentRating>(rating.clone()) {
                            history.push(RatingHistoryEntry {
                                run_id: run.id.clone(),
                                agent_id: agent_id.to_string(),
                                rating_before: agent_rating.mr_rating,
                                rating_after: agent_rating.mr_rating,
                                items_processed: agent_rating.items_processed,
                                recorded_at: run.completed_at.unwrap_or(run.updated_at),
                            });
                        }
                    }
                }
            }
        }
        Ok(history)
    }
}
