//! Storage adapter. The engine never touches a database directly;
//! it depends on this narrow trait and the rest of the persistence stack
//! (the actual store, migrations, HTTP API) stays out of scope.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::{EngineError, EngineResult};
use crate::types::{
    AgentRating, Axis, ConsistencyGroup, DilemmaItem, ExamVersion, ProfileSnapshot,
    RatingHistoryEntry, Response, Run,
};

/// Read/write capability the session state machine needs. Axes, items,
/// consistency groups and exam versions are read-only from the engine's
/// point of view; everything else is written once per run and never
/// mutated afterward (responses) or updated exactly once at `complete()`
/// (agent ratings).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get_axes(&self) -> EngineResult<Vec<Axis>>;
    async fn get_item(&self, item_id: &str) -> EngineResult<DilemmaItem>;
    async fn get_items_for_axis(&self, axis_id: &str) -> EngineResult<Vec<DilemmaItem>>;
    async fn get_consistency_groups(&self) -> EngineResult<Vec<ConsistencyGroup>>;
    async fn get_exam_version(&self, id: &str) -> EngineResult<ExamVersion>;

    async fn save_run(&self, run: &Run) -> EngineResult<()>;
    async fn get_run(&self, run_id: &str) -> EngineResult<Run>;
    async fn get_runs_for_agent(&self, agent_id: &str) -> EngineResult<Vec<Run>>;

    async fn save_response(&self, response: &Response) -> EngineResult<()>;
    async fn get_responses_for_run(&self, run_id: &str) -> EngineResult<Vec<Response>>;

    async fn get_agent_rating(&self, agent_id: &str) -> EngineResult<Option<AgentRating>>;
    async fn save_agent_rating(&self, rating: &AgentRating) -> EngineResult<()>;
    async fn save_rating_history(&self, entry: &RatingHistoryEntry) -> EngineResult<()>;
    async fn has_rating_history(&self, run_id: &str) -> EngineResult<bool>;

    async fn save_snapshot(&self, snapshot: &ProfileSnapshot) -> EngineResult<()>;
    async fn get_snapshots_for_agent(&self, agent_id: &str) -> EngineResult<Vec<ProfileSnapshot>>;
}

/// Reference in-memory implementation, used by tests and by `mse-bench`
/// when no external store is configured.
#[derive(Default)]
pub struct InMemoryStorage {
    axes: Mutex<Vec<Axis>>,
    items: Mutex<HashMap<String, DilemmaItem>>,
    groups: Mutex<Vec<ConsistencyGroup>>,
    versions: Mutex<HashMap<String, ExamVersion>>,
    runs: Mutex<HashMap<String, Run>>,
    responses: Mutex<HashMap<String, Vec<Response>>>,
    ratings: Mutex<HashMap<String, AgentRating>>,
    rating_history: Mutex<Vec<RatingHistoryEntry>>,
    snapshots: Mutex<HashMap<String, Vec<ProfileSnapshot>>>,
}

impl InMemoryStorage {
    pub fn new(axes: Vec<Axis>, items: Vec<DilemmaItem>, groups: Vec<ConsistencyGroup>, versions: Vec<ExamVersion>) -> Self {
        Self {
            axes: Mutex::new(axes),
            items: Mutex::new(items.into_iter().map(|i| (i.id.clone(), i)).collect()),
            groups: Mutex::new(groups),
            versions: Mutex::new(versions.into_iter().map(|v| (v.id.clone(), v)).collect()),
            runs: Mutex::new(HashMap::new()),
            responses: Mutex::new(HashMap::new()),
            ratings: Mutex::new(HashMap::new()),
            rating_history: Mutex::new(Vec::new()),
            snapshots: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn get_axes(&self) -> EngineResult<Vec<Axis>> {
        Ok(self.axes.lock().unwrap().clone())
    }

    async fn get_item(&self, item_id: &str) -> EngineResult<DilemmaItem> {
        self.items
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("item {item_id}")))
    }

    async fn get_items_for_axis(&self, axis_id: &str) -> EngineResult<Vec<DilemmaItem>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.axis_id == axis_id)
            .cloned()
            .collect())
    }

    async fn get_consistency_groups(&self) -> EngineResult<Vec<ConsistencyGroup>> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn get_exam_version(&self, id: &str) -> EngineResult<ExamVersion> {
        self.versions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("exam version {id}")))
    }

    async fn save_run(&self, run: &Run) -> EngineResult<()> {
        self.runs.lock().unwrap().insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> EngineResult<Run> {
        self.runs
            .lock()
            .unwrap()
            .get(run_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("run {run_id}")))
    }

    async fn get_runs_for_agent(&self, agent_id: &str) -> EngineResult<Vec<Run>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn save_response(&self, response: &Response) -> EngineResult<()> {
        self.responses
            .lock()
            .unwrap()
            .entry(response.run_id.clone())
            .or_default()
            .push(response.clone());
        Ok(())
    }

    async fn get_responses_for_run(&self, run_id: &str) -> EngineResult<Vec<Response>> {
        Ok(self.responses.lock().unwrap().get(run_id).cloned().unwrap_or_default())
    }

    async fn get_agent_rating(&self, agent_id: &str) -> EngineResult<Option<AgentRating>> {
        Ok(self.ratings.lock().unwrap().get(agent_id).cloned())
    }

    async fn save_agent_rating(&self, rating: &AgentRating) -> EngineResult<()> {
        self.ratings.lock().unwrap().insert(rating.agent_id.clone(), rating.clone());
        Ok(())
    }

    async fn save_rating_history(&self, entry: &RatingHistoryEntry) -> EngineResult<()> {
        self.rating_history.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn has_rating_history(&self, run_id: &str) -> EngineResult<bool> {
        Ok(self.rating_history.lock().unwrap().iter().any(|e| e.run_id == run_id))
    }

    async fn save_snapshot(&self, snapshot: &ProfileSnapshot) -> EngineResult<()> {
        self.snapshots
            .lock()
            .unwrap()
            .entry(snapshot.agent_id.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn get_snapshots_for_agent(&self, agent_id: &str) -> EngineResult<Vec<ProfileSnapshot>> {
        Ok(self.snapshots.lock().unwrap().get(agent_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let store = InMemoryStorage::default();
        let result = store.get_run("missing").await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn rating_history_is_keyed_by_run_so_complete_is_idempotent() {
        let store = InMemoryStorage::default();
        assert!(!store.has_rating_history("run-1").await.unwrap());
        store
            .save_rating_history(&RatingHistoryEntry {
                run_id: "run-1".to_string(),
                agent_id: "agent-1".to_string(),
                rating_before: 1000.0,
                rating_after: 1010.0,
                items_processed: 12,
                recorded_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        assert!(store.has_rating_history("run-1").await.unwrap());
    }
}
