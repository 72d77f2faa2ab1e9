//! Dilemma bank loading: reads the axis list, per-axis item files,
//! consistency groups, and exam version registry off disk into the shapes
//! [`crate::storage::StorageBackend`] expects.

#![allow(dead_code)]

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::types::{Axis, ConsistencyGroup, DilemmaItem, ExamVersion};

/// Loader for a directory-shaped dilemma bank:
///
/// ```text
/// <base>/axes.json
/// <base>/consistency_groups.json
/// <base>/exam_versions.json
/// <base>/items/<axis_code>.json
/// ```
pub struct DilemmaBankLoader {
    base_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DilemmaBank {
    pub axes: Vec<Axis>,
    pub items: Vec<DilemmaItem>,
    pub consistency_groups: Vec<ConsistencyGroup>,
    pub exam_versions: Vec<ExamVersion>,
}

impl DilemmaBankLoader {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub async fn load(&self) -> Result<DilemmaBank> {
        let axes = self.load_axes().await?;
        let mut items = Vec::new();
        for axis in &axes {
            items.extend(self.load_items_for_axis(&axis.code).await?);
        }
        let consistency_groups = self.load_consistency_groups().await?;
        let exam_versions = self.load_exam_versions().await?;

        tracing::info!(
            axes = axes.len(),
            items = items.len(),
            groups = consistency_groups.len(),
            "loaded dilemma bank"
        );

        Ok(DilemmaBank {
            axes,
            items,
            consistency_groups,
            exam_versions,
        })
    }

    async fn load_axes(&self) -> Result<Vec<Axis>> {
        let path = self.base_path.join("axes.json");
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {path:?}"))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {path:?}"))
    }

    async fn load_items_for_axis(&self, axis_code: &str) -> Result<Vec<DilemmaItem>> {
        let path = self.base_path.join("items").join(format!("{axis_code}.json"));
        if !path.exists() {
            tracing::debug!(axis = axis_code, "no item file for axis, skipping");
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {path:?}"))?;
        let items: Vec<DilemmaItem> =
            serde_json::from_str(&content).with_context(|| format!("failed to parse {path:?}"))?;
        tracing::debug!(axis = axis_code, count = items.len(), "loaded axis items");
        Ok(items)
    }

    async fn load_consistency_groups(&self) -> Result<Vec<ConsistencyGroup>> {
        let path = self.base_path.join("consistency_groups.json");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {path:?}"))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {path:?}"))
    }

    async fn load_exam_versions(&self) -> Result<Vec<ExamVersion>> {
        let path = self.base_path.join("exam_versions.json");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {path:?}"))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {path:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_bank_errors_clearly() {
        let loader = DilemmaBankLoader::new("/nonexistent/mse-dilemma-bank");
        let result = loader.load().await;
        assert!(result.is_err());
    }
}
