//! Profile wire-format builders and the exam-version registry.
//!
//! `Profile`/`EnrichedProfile` wrap a finalized run's stored snapshot for
//! external consumption by a host application. `VersionRegistry` answers
//! whether two exam versions' scores are safe to compare directly, a
//! detail left to the dilemma bank owner to mark. `compare_agents` is the
//! clustering step that groups agents by how similar their axis-threshold
//! vectors are.

use chrono::{DateTime, Utc};

use crate::types::{AxisScore, ExamVersion, ProfileSnapshot, RatingHistoryEntry};

#[derive(Debug, Clone, serde::Serialize)]
pub struct Profile {
    pub agent_id: String,
    pub run_id: String,
    pub snapshot_date: DateTime<Utc>,
    pub data: serde_json::Value,
}

pub fn from_snapshot(snapshot: &ProfileSnapshot) -> Profile {
    Profile {
        agent_id: snapshot.agent_id.clone(),
        run_id: snapshot.run_id.clone(),
        snapshot_date: snapshot.snapshot_date,
        data: snapshot.profile.clone(),
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EnrichedProfile {
    pub profile: Profile,
    pub rating_history: Vec<RatingHistoryEntry>,
}

pub fn enrich(profile: Profile, rating_history: Vec<RatingHistoryEntry>) -> EnrichedProfile {
    EnrichedProfile { profile, rating_history }
}

/// Tracks which exam versions exist and which pairs are safe to compare
/// directly. The dilemma bank owner marks this via each version's
/// `comparable_with` list and `breaking_changes` flag; the engine just
/// consults it, it never infers comparability itself.
pub struct VersionRegistry {
    versions: Vec<ExamVersion>,
}

impl VersionRegistry {
    pub fn new(versions: Vec<ExamVersion>) -> Self {
        Self { versions }
    }

    pub fn get(&self, id: &str) -> Option<&ExamVersion> {
        self.versions.iter().find(|v| v.id == id || v.code == id)
    }

    pub fn default_version(&self) -> Option<&ExamVersion> {
        self.versions.iter().find(|v| v.is_default && !v.retired)
    }

    /// Two versions are comparable when neither carries `breaking_changes`
    /// and each explicitly lists the other (or itself) in `comparable_with`.
    pub fn is_comparable(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let (Some(va), Some(vb)) = (self.get(a), self.get(b)) else {
            return false;
        };
        if va.breaking_changes || vb.breaking_changes {
            return false;
        }
        va.comparable_with.iter().any(|c| c == b) && vb.comparable_with.iter().any(|c| c == a)
    }
}

/// A single agent's axis-threshold vector, keyed by axis id, used as the
/// clustering input for `compare_agents`.
pub type AxisVector = std::collections::HashMap<String, f64>;

#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentCluster {
    pub agent_ids: Vec<String>,
    pub centroid: AxisVector,
}

fn euclidean_distance(a: &AxisVector, b: &AxisVector) -> f64 {
    let mut axes: std::collections::HashSet<&String> = a.keys().collect();
    axes.extend(b.keys());
    let sum_sq: f64 = axes
        .iter()
        .map(|axis| {
            let va = a.get(*axis).copied().unwrap_or(0.5);
            let vb = b.get(*axis).copied().unwrap_or(0.5);
            (va - vb).powi(2)
        })
        .sum();
    sum_sq.sqrt()
}

fn centroid(vectors: &[&AxisVector]) -> AxisVector {
    let mut axes: std::collections::HashSet<&String> = std::collections::HashSet::new();
    for v in vectors {
        axes.extend(v.keys());
    }
    axes.into_iter()
        .map(|axis| {
            let sum: f64 = vectors.iter().map(|v| v.get(axis).copied().unwrap_or(0.5)).sum();
            (axis.clone(), sum / vectors.len() as f64)
        })
        .collect()
}

/// Simple agglomerative (single-linkage) clustering over axis-threshold
/// vectors: starts with every agent in its own cluster and repeatedly
/// merges the closest pair of clusters while their distance stays under
/// `threshold`.
pub fn compare_agents(agents: &[(String, AxisVector)], threshold: f64) -> Vec<AgentCluster> {
    let mut clusters: Vec<Vec<usize>> = (0..agents.len()).map(|i| vec![i]).collect();

    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                let vectors_i: Vec<&AxisVector> = clusters[i].iter().map(|&idx| &agents[idx].1).collect();
                let vectors_j: Vec<&AxisVector> = clusters[j].iter().map(|&idx| &agents[idx].1).collect();
                let ci = centroid(&vectors_i);
                let cj = centroid(&vectors_j);
                let d = euclidean_distance(&ci, &cj);
                if d <= threshold && best.map(|(_, _, bd)| d < bd).unwrap_or(true) {
                    best = Some((i, j, d));
                }
            }
        }
        match best {
            Some((i, j, _)) => {
                let merged = clusters[j].clone();
                clusters[i].extend(merged);
                clusters.remove(j);
            }
            None => break,
        }
    }

    clusters
        .into_iter()
        .map(|indices| {
            let agent_ids: Vec<String> = indices.iter().map(|&idx| agents[idx].0.clone()).collect();
            let vectors: Vec<&AxisVector> = indices.iter().map(|&idx| &agents[idx].1).collect();
            AgentCluster {
                agent_ids,
                centroid: centroid(&vectors),
            }
        })
        .collect()
}

/// Flattens a run's fitted axis scores into the plain `axis_id -> b` shape
/// `compare_agents` expects.
pub fn axis_vector_from_scores(scores: &[AxisScore]) -> AxisVector {
    scores.iter().map(|s| (s.axis_id.clone(), s.b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(id: &str, comparable_with: &[&str], breaking: bool) -> ExamVersion {
        ExamVersion {
            id: id.to_string(),
            code: id.to_string(),
            is_default: id == "v2",
            retired: false,
            comparable_with: comparable_with.iter().map(|s| s.to_string()).collect(),
            breaking_changes: breaking,
        }
    }

    #[test]
    fn same_version_is_always_comparable() {
        let registry = VersionRegistry::new(vec![version("v2", &[], false)]);
        assert!(registry.is_comparable("v2", "v2"));
    }

    #[test]
    fn breaking_changes_block_comparability() {
        let registry = VersionRegistry::new(vec![version("v1", &["v2"], true), version("v2", &["v1"], false)]);
        assert!(!registry.is_comparable("v1", "v2"));
    }

    #[test]
    fn mutually_listed_versions_are_comparable() {
        let registry = VersionRegistry::new(vec![version("v2", &["v2.1"], false), version("v2.1", &["v2"], false)]);
        assert!(registry.is_comparable("v2", "v2.1"));
    }

    #[test]
    fn close_agents_merge_into_one_cluster() {
        let a: AxisVector = [("ax1".to_string(), 0.5), ("ax2".to_string(), 0.6)].into_iter().collect();
        let b: AxisVector = [("ax1".to_string(), 0.52), ("ax2".to_string(), 0.58)].into_iter().collect();
        let c: AxisVector = [("ax1".to_string(), 0.05), ("ax2".to_string(), 0.95)].into_iter().collect();
        let clusters = compare_agents(&[("agent-a".to_string(), a), ("agent-b".to_string(), b), ("agent-c".to_string(), c)], 0.1);
        assert_eq!(clusters.len(), 2);
    }
}
