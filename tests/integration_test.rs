//! End-to-end integration test for the Moral Spectrometry Engine: drives a
//! complete evaluation run across several axes through the public `Engine`
//! facade, the same surface a host application uses.

use std::sync::Arc;

use mse_engine::config::SessionConfig;
use mse_engine::provider::MockProvider;
use mse_engine::session::SubmitPayload;
use mse_engine::storage::InMemoryStorage;
use mse_engine::types::{Axis, AxisCategory, Choice, DilemmaItem, DilemmaOption, DilemmaParams, DilemmaType, ExamVersion, Pole};
use mse_engine::Engine;

fn axis(id: &str, order: u32) -> Axis {
    Axis {
        id: id.to_string(),
        code: id.to_string(),
        display_name: id.to_string(),
        pole_left: "left".to_string(),
        pole_right: "right".to_string(),
        category: AxisCategory::Moral,
        display_order: order,
        optional: false,
    }
}

fn item(id: &str, axis_id: &str, pressure: f64, is_anchor: bool) -> DilemmaItem {
    DilemmaItem {
        id: id.to_string(),
        axis_id: axis_id.to_string(),
        secondary_axis_id: None,
        family_id: format!("{axis_id}-family"),
        pressure_level: pressure,
        params: DilemmaParams::default(),
        options: [
            DilemmaOption { choice: Choice::A, text: "do the cautious thing".into(), pole: Pole::Left },
            DilemmaOption { choice: Choice::B, text: "do the bold thing".into(), pole: Pole::Right },
            DilemmaOption { choice: Choice::C, text: "split the difference".into(), pole: Pole::Neutral },
            DilemmaOption { choice: Choice::D, text: "do something else entirely".into(), pole: Pole::Creative },
        ],
        is_anchor,
        dilemma_type: DilemmaType::Base,
        consistency_group_id: None,
        variant_type: None,
        non_obvious_factors: vec![],
        expert_disagreement: 0.1,
        requires_residue_recognition: false,
        meta_ethical_type: None,
    }
}

fn small_bank() -> (Vec<Axis>, Vec<DilemmaItem>, Vec<ExamVersion>) {
    let axes = vec![axis("harm_benefit", 0), axis("care_justice", 1)];
    let mut items = Vec::new();
    for axis_id in ["harm_benefit", "care_justice"] {
        for i in 0..10 {
            let pressure = (i as f64) / 10.0;
            items.push(item(&format!("{axis_id}-{i}"), axis_id, pressure, i == 0));
        }
    }
    let versions = vec![ExamVersion {
        id: "v2".to_string(),
        code: "v2".to_string(),
        is_default: true,
        retired: false,
        comparable_with: vec![],
        breaking_changes: false,
    }];
    (axes, items, versions)
}

fn build_engine() -> Engine {
    let (axes, items, versions) = small_bank();
    let storage = Arc::new(InMemoryStorage::new(axes, items, vec![], versions));
    let judge = Arc::new(MockProvider::new());
    Engine::new(storage, judge)
}

#[tokio::test]
async fn full_run_reaches_completion_and_produces_a_profile() {
    let engine = build_engine();
    let config = SessionConfig {
        exam_version: "v2".to_string(),
        min_items_per_axis: 3,
        max_items_per_axis: 5,
        target_se: 0.5, // loose enough that min_items_per_axis is the binding stop
        ..SessionConfig::default()
    };

    let run = engine.start_evaluation("agent-integration", config).await.unwrap();

    let mut item = engine.next_item(&run.id).await.unwrap();
    assert!(item.is_some(), "a freshly initialized run must offer a first item");

    let mut items_submitted = 0;
    while let Some(current) = item {
        let outcome = engine
            .submit_response(
                &run.id,
                &current.id,
                SubmitPayload::FreeText("I think option B is more defensible, though it has some cost.".to_string()),
                Some(1200),
            )
            .await
            .unwrap();
        assert!(outcome.response.is_some());
        items_submitted += 1;
        item = if outcome.run_complete { None } else { outcome.next_item };
    }
    assert!(items_submitted >= 6, "both axes should reach their minimum item count");

    let summary = engine.complete_evaluation(&run.id).await.unwrap();
    assert_eq!(summary.axis_scores.len(), 2);
    assert!((0.0..=1.0).contains(&summary.ism.ism));
    assert!((0.0..=1.0).contains(&summary.sophistication.si));

    let profile = engine.get_agent_profile("agent-integration").await.unwrap();
    assert!(profile.is_some(), "completing a run must leave a retrievable profile snapshot");
}

#[tokio::test]
async fn cancel_leaves_run_incomplete_and_unresumable_for_submission() {
    let engine = build_engine();
    let config = SessionConfig {
        exam_version: "v2".to_string(),
        ..SessionConfig::default()
    };
    let run = engine.start_evaluation("agent-cancel", config).await.unwrap();

    engine.cancel_evaluation(&run.id).await.unwrap();

    let result = engine
        .submit_response(&run.id, "harm_benefit-0", SubmitPayload::FreeText("option A".to_string()), None)
        .await;
    assert!(result.is_err(), "a cancelled run must reject further submissions");
}
