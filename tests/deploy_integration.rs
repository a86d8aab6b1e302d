//! End-to-end deployment tests
//!
//! A repository layer is written to a temp directory, read through the real
//! filesystem adapter and deployed into the in-memory workspace service.

mod support;

use fabric_deploy::error::DeployError;
use fabric_deploy::model::ArtifactKind;
use fabric_deploy::remote::{Call, InMemoryFabric};
use serde_json::{json, Value};
use std::sync::Arc;
use support::{lifecycle, RepoFixture};

fn sales_repo() -> RepoFixture {
    let repo = RepoFixture::new("Operations");
    repo.lakehouse("Bronze", "LH-BRONZE")
        .notebook("Load Sales", "Bronze")
        .pipeline("Child", "L1", &[], json!({"sink": "LH-BRONZE"}))
        .pipeline("Parent", "L2", &["L1"], json!({}));
    repo
}

fn pipeline_content(fabric: &InMemoryFabric, ws: &str, name: &str) -> Value {
    let definition = fabric
        .definition(ws, &ArtifactKind::DataPipeline, name)
        .expect("pipeline deployed with a definition");
    let part = definition
        .part("pipeline-content.json")
        .expect("pipeline-content.json part");
    serde_json::from_str(&part.payload).unwrap()
}

#[tokio::test]
async fn test_first_deployment_creates_workspace_and_items() {
    let fabric = Arc::new(InMemoryFabric::new());
    let repo = sales_repo();

    let report = lifecycle(&fabric, repo.config("Sales")).run().await.unwrap();

    assert!(report.created);
    let ledger: Vec<(&str, &str)> = report
        .records
        .iter()
        .map(|r| (r.artifact_type.as_str(), r.artifact_name.as_str()))
        .collect();
    assert_eq!(
        ledger,
        vec![
            ("Workspace", "Sales"),
            ("Lakehouse", "Bronze"),
            ("Notebook", "Load Sales"),
            ("DataPipeline", "Child"),
            ("DataPipeline", "Parent"),
        ]
    );
    assert!(report.records[1..]
        .iter()
        .all(|r| r.artifact_location_guid.as_deref() == Some(report.workspace.id.as_str())));
}

#[tokio::test]
async fn test_logical_ids_replaced_with_runtime_ids() {
    let fabric = Arc::new(InMemoryFabric::new());
    let repo = sales_repo();

    let report = lifecycle(&fabric, repo.config("Sales")).run().await.unwrap();
    let ws = &report.workspace.id;

    let child_id = fabric
        .item_id(ws, &ArtifactKind::DataPipeline, "Child")
        .unwrap();
    let lakehouse_id = fabric.item_id(ws, &ArtifactKind::Lakehouse, "Bronze").unwrap();

    let parent = pipeline_content(&fabric, ws, "Parent");
    let invoke = &parent["properties"]["activities"][0]["typeProperties"];
    assert_eq!(invoke["pipelineId"], json!(child_id));
    assert_eq!(invoke["workspaceId"], json!(ws));

    let child = pipeline_content(&fabric, ws, "Child");
    assert_eq!(child["properties"]["sink"], json!(lakehouse_id));
    assert!(!child.to_string().contains("LH-BRONZE"));
}

#[tokio::test]
async fn test_reference_case_must_match_logical_id() {
    let fabric = Arc::new(InMemoryFabric::new());
    let repo = RepoFixture::new("Operations");
    repo.pipeline("Child", "abc-child", &[], json!({}))
        .pipeline("Parent", "abc-parent", &["ABC-CHILD"], json!({}))
        .pipeline("Sibling", "abc-sibling", &["abc-child"], json!({}));

    let report = lifecycle(&fabric, repo.config("Sales")).run().await.unwrap();
    let ws = &report.workspace.id;
    let child_id = fabric
        .item_id(ws, &ArtifactKind::DataPipeline, "Child")
        .unwrap();

    let sibling = pipeline_content(&fabric, ws, "Sibling");
    assert_eq!(
        sibling["properties"]["activities"][0]["typeProperties"]["pipelineId"],
        json!(child_id)
    );
    let names: Vec<&str> = report
        .records
        .iter()
        .map(|r| r.artifact_name.as_str())
        .collect();
    let position = |name: &str| names.iter().position(|n| *n == name).unwrap();
    assert!(position("Child") < position("Sibling"));

    let parent = pipeline_content(&fabric, ws, "Parent");
    assert_eq!(
        parent["properties"]["activities"][0]["typeProperties"]["pipelineId"],
        json!("ABC-CHILD")
    );
}

#[tokio::test]
async fn test_notebook_bound_to_deployed_lakehouse() {
    let fabric = Arc::new(InMemoryFabric::new());
    let repo = sales_repo();

    let report = lifecycle(&fabric, repo.config("Sales")).run().await.unwrap();
    let ws = &report.workspace.id;
    let lakehouse_id = fabric.item_id(ws, &ArtifactKind::Lakehouse, "Bronze").unwrap();

    let notebook = fabric
        .definition(ws, &ArtifactKind::Notebook, "Load Sales")
        .unwrap();
    let source = &notebook.part("notebook-content.py").unwrap().payload;
    assert!(source.contains(&format!("\"default_lakehouse\": \"{}\"", lakehouse_id)));
    assert!(source.contains(&format!("\"default_lakehouse_workspace_id\": \"{}\"", ws)));
    assert!(notebook.part(".platform").is_some());
}

#[tokio::test]
async fn test_redeploy_is_idempotent() {
    let fabric = Arc::new(InMemoryFabric::new());
    let repo = sales_repo();

    let first = lifecycle(&fabric, repo.config("Sales")).run().await.unwrap();
    let creates = fabric.count_calls(|c| matches!(c, Call::CreateItem { .. }));
    let items = fabric.items(&first.workspace.id).len();

    let second = lifecycle(&fabric, repo.config("Sales")).run().await.unwrap();

    assert!(!second.created);
    assert_eq!(second.workspace.id, first.workspace.id);
    assert_eq!(
        fabric.count_calls(|c| matches!(c, Call::CreateItem { .. })),
        creates
    );
    assert_eq!(fabric.items(&second.workspace.id).len(), items);
    assert_eq!(
        fabric.count_calls(|c| matches!(c, Call::CreateWorkspace(_))),
        1
    );
}

#[tokio::test]
async fn test_items_removed_from_repository_are_deleted() {
    let fabric = Arc::new(InMemoryFabric::new());
    let repo = sales_repo();
    let first = lifecycle(&fabric, repo.config("Sales")).run().await.unwrap();
    let ws = first.workspace.id.clone();

    repo.remove("Parent", "DataPipeline");
    repo.remove("Load Sales", "Notebook");
    lifecycle(&fabric, repo.config("Sales")).run().await.unwrap();

    assert!(fabric
        .item_id(&ws, &ArtifactKind::DataPipeline, "Parent")
        .is_none());
    assert!(fabric
        .item_id(&ws, &ArtifactKind::Notebook, "Load Sales")
        .is_none());
    assert!(fabric
        .item_id(&ws, &ArtifactKind::DataPipeline, "Child")
        .is_some());
    assert_eq!(
        fabric.count_calls(|c| matches!(c, Call::DeleteItem { .. })),
        2
    );
}

#[tokio::test]
async fn test_cycle_rolls_back_new_workspace() {
    let fabric = Arc::new(InMemoryFabric::new());
    let repo = RepoFixture::new("Operations");
    repo.lakehouse("Bronze", "LH")
        .pipeline("A", "LA", &["LB"], json!({}))
        .pipeline("B", "LB", &["LA"], json!({}));

    let err = lifecycle(&fabric, repo.config("Sales"))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), DeployError::CycleDetected { .. }));
    let applied: Vec<&str> = err
        .applied_records()
        .iter()
        .map(|r| r.artifact_type.as_str())
        .collect();
    assert_eq!(applied, vec!["Workspace", "Lakehouse"]);
    assert!(fabric.workspaces().is_empty());
}

#[tokio::test]
async fn test_layer_folder_matched_case_insensitively() {
    let fabric = Arc::new(InMemoryFabric::new());
    let repo = RepoFixture::new("operations");
    repo.lakehouse("Bronze", "LH");

    let mut config = repo.config("Sales");
    config.layer = "Operations".to_string();
    let report = lifecycle(&fabric, config).run().await.unwrap();

    assert!(fabric
        .item_id(&report.workspace.id, &ArtifactKind::Lakehouse, "Bronze")
        .is_some());
}

#[tokio::test]
async fn test_create_conflict_resolves_existing_workspace() {
    let fabric = Arc::new(InMemoryFabric::new());
    let existing = fabric.seed_workspace("Sales");
    let repo = sales_repo();
    let config = repo.config("Sales");
    fabric.hide_workspace_lookups(config.lookup_attempts + 1);

    let report = lifecycle(&fabric, config).run().await.unwrap();

    assert!(!report.created);
    assert_eq!(report.workspace.id, existing);
    assert_eq!(fabric.items(&existing).len(), 4);
}

#[tokio::test]
async fn test_remote_failure_keeps_existing_workspace() {
    let fabric = Arc::new(InMemoryFabric::new());
    let existing = fabric.seed_workspace("Sales");
    fabric.fail_item("Parent");
    let repo = sales_repo();

    let err = lifecycle(&fabric, repo.config("Sales"))
        .run()
        .await
        .unwrap_err();

    match &err {
        DeployError::PartialApply { phase, applied, .. } => {
            assert_eq!(phase, "Data Pipelines");
            assert_eq!(applied.last().unwrap().artifact_name, "Child");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fabric.workspaces().len(), 1);
    assert!(fabric
        .item_id(&existing, &ArtifactKind::DataPipeline, "Child")
        .is_some());
    assert!(!fabric
        .calls()
        .iter()
        .any(|c| matches!(c, Call::DeleteWorkspace(_))));
}
