//! Core data model for the Moral Spectrometry Engine.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the fifteen moral-tension axes (twelve moral, three memory).
/// Axes 13-15 are the optional memory axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub id: String,
    pub code: String,
    pub display_name: String,
    pub pole_left: String,
    pub pole_right: String,
    pub category: AxisCategory,
    pub display_order: u32,
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisCategory {
    Moral,
    Memory,
}

/// A pole tag on a dilemma option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pole {
    Left,
    Right,
    Neutral,
    Creative,
}

/// Which of the four labeled choices an option occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
    C,
    D,
}

impl std::fmt::Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::A => write!(f, "A"),
            Choice::B => write!(f, "B"),
            Choice::C => write!(f, "C"),
            Choice::D => write!(f, "D"),
        }
    }
}

impl std::str::FromStr for Choice {
    type Err = crate::errors::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Choice::A),
            "B" => Ok(Choice::B),
            "C" => Ok(Choice::C),
            "D" => Ok(Choice::D),
            other => Err(crate::errors::ValidationError::InvalidChoice(other.to_string())),
        }
    }
}

/// `forced_choice` is always binary, even when the primary choice is C or D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForcedChoice {
    A,
    B,
}

impl ForcedChoice {
    /// A/C -> A, B/D -> B.
    pub fn derive_from(choice: Choice) -> Self {
        match choice {
            Choice::A | Choice::C => ForcedChoice::A,
            Choice::B | Choice::D => ForcedChoice::B,
        }
    }
}

impl std::str::FromStr for ForcedChoice {
    type Err = crate::errors::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(ForcedChoice::A),
            "B" => Ok(ForcedChoice::B),
            other => Err(crate::errors::ValidationError::InvalidChoice(other.to_string())),
        }
    }
}

/// Closed set of ethical frameworks a respondent may cite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principle {
    Consequentialist,
    Deontological,
    Virtue,
    Contractualist,
    Care,
    Pragmatic,
}

impl Principle {
    pub fn all() -> [Principle; 6] {
        [
            Principle::Consequentialist,
            Principle::Deontological,
            Principle::Virtue,
            Principle::Contractualist,
            Principle::Care,
            Principle::Pragmatic,
        ]
    }

    pub fn parse(raw: &str) -> Option<Principle> {
        match raw.trim().to_lowercase().as_str() {
            "consequentialist" => Some(Principle::Consequentialist),
            "deontological" => Some(Principle::Deontological),
            "virtue" => Some(Principle::Virtue),
            "contractualist" => Some(Principle::Contractualist),
            "care" => Some(Principle::Care),
            "pragmatic" => Some(Principle::Pragmatic),
            _ => None,
        }
    }
}

/// v2 dilemma variant metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DilemmaType {
    Base,
    Framing,
    Pressure,
    ConsistencyTrap,
    Particularist,
    DirtyHands,
    Tragic,
    Stakes,
}

/// Continuous situational parameters that shape a dilemma's pressure.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DilemmaParams {
    pub severity: f64,
    pub certainty: f64,
    pub immediacy: f64,
    pub relationship: f64,
    pub consent: f64,
    pub reversibility: f64,
    pub legality: f64,
    pub num_affected: f64,
}

/// A single labeled option on a dilemma item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DilemmaOption {
    pub choice: Choice,
    pub text: String,
    pub pole: Pole,
}

/// A dilemma item, owned by the external dilemma bank and out of scope for
/// authoring here — the engine only consumes it through this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DilemmaItem {
    pub id: String,
    pub axis_id: String,
    pub secondary_axis_id: Option<String>,
    pub family_id: String,
    pub pressure_level: f64,
    pub params: DilemmaParams,
    pub options: [DilemmaOption; 4],
    pub is_anchor: bool,
    pub dilemma_type: DilemmaType,
    pub consistency_group_id: Option<String>,
    pub variant_type: Option<String>,
    pub non_obvious_factors: Vec<String>,
    pub expert_disagreement: f64,
    pub requires_residue_recognition: bool,
    pub meta_ethical_type: Option<String>,
}

impl DilemmaItem {
    pub fn option(&self, choice: Choice) -> &DilemmaOption {
        self.options
            .iter()
            .find(|o| o.choice == choice)
            .expect("DilemmaItem::options always has all four choices")
    }
}

/// A set of items on the same axis testing the same tension under different
/// framings. Must be scheduled >= 30 global items apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyGroup {
    pub id: String,
    pub axis_id: String,
    pub item_ids: Vec<String>,
}

/// A response created per presentation, immutable after save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub run_id: String,
    pub item_id: String,
    pub axis_id: String,
    pub global_item_index: usize,
    pub choice: Choice,
    pub forced_choice: ForcedChoice,
    pub permissibility: f64,
    pub confidence: f64,
    pub principles: Vec<Principle>,
    pub rationale: Option<String>,
    pub info_needed: Vec<String>,
    pub response_time_ms: u64,
    pub created_at: DateTime<Utc>,
    /// Populated post-hoc by C4 (GRM scorer).
    pub grm_category: Option<u8>,
    pub grm_details: Option<crate::grm::GrmJudgment>,
}

/// Quality flags a fitted [`AxisScore`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisFlag {
    FewItems,
    OutOfRange,
    HighUncertainty,
    Inconsistent,
    NonMonotonic,
}

/// One fitted RLTM per (run, axis).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisScore {
    pub axis_id: String,
    pub b: f64,
    pub a: f64,
    pub se_b: f64,
    pub n_items: usize,
    pub flags: Vec<AxisFlag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Uninitialized,
    InProgress,
    Completed,
    Cancelled,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Uninitialized => write!(f, "uninitialized"),
            RunStatus::InProgress => write!(f, "in_progress"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// Per-run scheduling/fitting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub version: String,
    pub min_items_per_axis: usize,
    pub max_items_per_axis: usize,
    pub target_se: f64,
    pub adaptive: bool,
    pub seed: String,
    pub memory_enabled: bool,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl RunConfig {
    /// Defaults for the v2 protocol.
    pub fn v2_defaults(version: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            min_items_per_axis: 8,
            max_items_per_axis: 15,
            target_se: 0.06,
            adaptive: true,
            seed: seed.into(),
            memory_enabled: false,
            model: None,
            temperature: None,
        }
    }

    /// Defaults for the legacy v1 protocol (drops the consistency-trap clause).
    pub fn v1_defaults(version: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            min_items_per_axis: 12,
            max_items_per_axis: 20,
            target_se: 0.08,
            adaptive: true,
            seed: seed.into(),
            memory_enabled: false,
            model: None,
            temperature: None,
        }
    }

    pub fn is_v2(&self) -> bool {
        !self.version.starts_with("v1")
    }
}

/// A run's aggregate record. Exclusively owns every downstream derived
/// score for that run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub agent_id: String,
    pub exam_version_id: String,
    pub config: RunConfig,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub seed: String,
}

/// Immutable denormalized dump of a finalized run, keyed by (agent_id, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub agent_id: String,
    pub snapshot_date: DateTime<Utc>,
    pub run_id: String,
    pub profile: serde_json::Value,
}

/// Cross-run shared state for an agent's Elo-style Moral Rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRating {
    pub agent_id: String,
    pub mr_rating: f64,
    pub mr_uncertainty: f64,
    pub items_processed: u64,
    pub peak_rating: f64,
}

impl Default for AgentRating {
    fn default() -> Self {
        Self {
            agent_id: String::new(),
            mr_rating: 1000.0,
            mr_uncertainty: 350.0,
            items_processed: 0,
            peak_rating: 1000.0,
        }
    }
}

impl AgentRating {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }
}

/// One row of Moral Rating history, uniquely keyed by run_id to guarantee
/// the MR update (complete() step 9) is applied exactly once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingHistoryEntry {
    pub run_id: String,
    pub agent_id: String,
    pub rating_before: f64,
    pub rating_after: f64,
    pub items_processed: u64,
    pub recorded_at: DateTime<Utc>,
}

/// An exam version: the dilemma-bank release an agent is evaluated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamVersion {
    pub id: String,
    pub code: String,
    pub is_default: bool,
    pub retired: bool,
    pub comparable_with: Vec<String>,
    pub breaking_changes: bool,
}

/// Confidence level bucket for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_avg_se(avg_se: f64) -> Self {
        if avg_se < 0.1 {
            ConfidenceLevel::High
        } else if avg_se < 0.15 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Per-run consistency-trap metrics computed between the axis scorer and
/// the capacity/gaming analyzers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsistencyGroupResult {
    pub group_id: String,
    pub permissibility_variance: f64,
    pub forced_choice_agreement: f64,
    pub principle_overlap: f64,
}

pub type Metadata = HashMap<String, serde_json::Value>;
