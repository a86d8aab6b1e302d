//! Create-or-update and delete shared by the item phases

use crate::catalog::CatalogEntry;
use crate::error::{DeployError, DeployResult};
use crate::model::{ArtifactKind, DeploymentRecord};
use crate::pipeline::context::ReconcileContext;
use crate::pipeline::phase_trait::PhaseOutcome;
use crate::progress::ProgressEvent;
use crate::remote::{settle_created_item, DefinitionPart, ItemDefinition, ItemMetadata};
use std::path::Path;
use tracing::{debug, info};

const MAX_DESCRIPTION_CHARS: usize = 256;
const PLATFORM_FILE: &str = ".platform";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemAction {
    Created(String),
    Updated(String),
    /// Already present and nothing to upload
    Unchanged(String),
}

impl ItemAction {
    pub fn id(&self) -> &str {
        match self {
            ItemAction::Created(id) | ItemAction::Updated(id) | ItemAction::Unchanged(id) => id,
        }
    }
}

pub fn item_metadata(kind: &ArtifactKind, entry: &CatalogEntry) -> ItemMetadata {
    ItemMetadata {
        kind: kind.clone(),
        display_name: entry.display_name.clone(),
        description: entry
            .description
            .as_ref()
            .map(|d| d.chars().take(MAX_DESCRIPTION_CHARS).collect()),
    }
}

/// Reads the item's files as definition parts, paths relative to the item folder
///
/// `transform` sees the relative path and the text of each file and returns
/// the payload to upload.
pub fn read_definition<F>(
    context: &ReconcileContext,
    entry: &CatalogEntry,
    include_platform: bool,
    mut transform: F,
) -> DeployResult<ItemDefinition>
where
    F: FnMut(&str, String) -> DeployResult<String>,
{
    let fs = &context.services.file_system;
    let mut parts = Vec::with_capacity(entry.source_paths.len());

    for path in &entry.source_paths {
        let relative = relative_part_path(entry.folder.as_deref(), path);
        if !include_platform && relative == PLATFORM_FILE {
            continue;
        }
        let text = fs
            .read_to_string(path)
            .map_err(|e| DeployError::filesystem(path, e))?;
        let payload = transform(&relative, text)?;
        parts.push(DefinitionPart {
            path: relative,
            payload,
        });
    }

    Ok(ItemDefinition::new(parts))
}

fn relative_part_path(folder: Option<&Path>, path: &Path) -> String {
    let relative = folder
        .and_then(|f| path.strip_prefix(f).ok())
        .unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Creates the item, or uploads `definition` onto the existing item of the same kind and name
///
/// A create that collides with an item the deployed catalog did not know
/// about falls back to an update of that item.
pub async fn deploy_item(
    context: &ReconcileContext,
    kind: &ArtifactKind,
    entry: &CatalogEntry,
    definition: Option<ItemDefinition>,
) -> DeployResult<ItemAction> {
    let workspace_id = context.workspace_id();
    let provider = context.services.provider.as_ref();

    if let Some(id) = context.deployed.id_of(kind, &entry.display_name) {
        return update_existing(context, kind, entry, id, definition.as_ref()).await;
    }

    let metadata = item_metadata(kind, entry);
    context.services.limiter.acquire().await;
    let outcome = match provider
        .create_item(workspace_id, &metadata, definition.as_ref())
        .await
    {
        Ok(outcome) => outcome,
        Err(DeployError::RemoteConflict { .. }) => {
            debug!(kind = %kind, item = %entry.display_name, "Item already exists, updating instead");
            let existing = provider
                .list_items(workspace_id)
                .await?
                .into_iter()
                .find(|i| &i.kind == kind && i.display_name == entry.display_name)
                .ok_or_else(|| DeployError::RemoteConflict {
                    operation: format!("create {} '{}'", kind, entry.display_name),
                    message: "name in use but the item is not listed".to_string(),
                })?;
            return update_existing(context, kind, entry, &existing.id, definition.as_ref())
                .await;
        }
        Err(e) => return Err(e),
    };

    let id = settle_created_item(
        provider,
        workspace_id,
        &metadata,
        outcome,
        &context.settings.poll,
    )
    .await?;
    info!(kind = %kind, item = %entry.display_name, id = %id, "Item created");
    Ok(ItemAction::Created(id))
}

async fn update_existing(
    context: &ReconcileContext,
    kind: &ArtifactKind,
    entry: &CatalogEntry,
    id: &str,
    definition: Option<&ItemDefinition>,
) -> DeployResult<ItemAction> {
    let Some(definition) = definition else {
        debug!(kind = %kind, item = %entry.display_name, "Item exists, nothing to update");
        return Ok(ItemAction::Unchanged(id.to_string()));
    };

    context.services.limiter.acquire().await;
    context
        .services
        .provider
        .update_item_definition(context.workspace_id(), id, definition)
        .await?;
    info!(kind = %kind, item = %entry.display_name, id = %id, "Item definition updated");
    Ok(ItemAction::Updated(id.to_string()))
}

/// Records the runtime id in the repository catalog and, for applied changes,
/// appends a ledger record and reports progress
pub fn record_action(
    context: &mut ReconcileContext,
    outcome: &mut PhaseOutcome,
    kind: &ArtifactKind,
    name: &str,
    action: &ItemAction,
) {
    context.repository.record_id(kind, name, action.id());

    let created = match action {
        ItemAction::Created(_) => true,
        ItemAction::Updated(_) => false,
        ItemAction::Unchanged(_) => return,
    };
    outcome.push(DeploymentRecord::item(
        kind,
        name,
        &context.workspace.id,
        &context.workspace.display_name,
        action.id(),
    ));
    context.emit(ProgressEvent::ItemDeployed {
        kind: kind.to_string(),
        name: name.to_string(),
        created,
    });
}

/// Deletes one item and remembers its id for the quiescence wait
pub async fn delete_item(
    context: &mut ReconcileContext,
    kind: &ArtifactKind,
    name: &str,
    id: &str,
) -> DeployResult<()> {
    context.services.limiter.acquire().await;
    context
        .services
        .provider
        .delete_item(context.workspace_id(), id)
        .await
        .map_err(|e| e.for_item(kind.as_str(), name))?;

    info!(kind = %kind, item = %name, id = %id, "Item deleted");
    context.deleted_ids.push(id.to_string());
    context.emit(ProgressEvent::ItemDeleted {
        kind: kind.to_string(),
        name: name.to_string(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::fs::MockFileSystem;
    use crate::model::WorkspaceInfo;
    use crate::pipeline::config::ReconcileSettings;
    use crate::pipeline::context::{ReconcileMode, Services};
    use crate::remote::{Call, InMemoryFabric, PollPolicy};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn context(fabric: &Arc<InMemoryFabric>, ws: &str, fs: MockFileSystem) -> ReconcileContext {
        ReconcileContext::new(
            WorkspaceInfo {
                id: ws.to_string(),
                display_name: "Sales".to_string(),
            },
            ReconcileMode::Full,
            Catalog::new(),
            Catalog::new(),
            Services::new(fabric.clone(), fabric.clone(), Arc::new(fs)),
            ReconcileSettings::new().with_poll(PollPolicy::immediate()),
        )
    }

    fn entry(name: &str) -> CatalogEntry {
        CatalogEntry {
            display_name: name.to_string(),
            description: None,
            logical_id: None,
            id: None,
            folder: None,
            source_paths: Vec::new(),
        }
    }

    #[test]
    fn test_description_truncated() {
        let mut e = entry("Load");
        e.description = Some("x".repeat(300));
        let metadata = item_metadata(&ArtifactKind::Notebook, &e);
        assert_eq!(metadata.description.unwrap().chars().count(), 256);
    }

    #[test]
    fn test_read_definition_relative_paths() {
        let fs = MockFileSystem::new();
        fs.add_file("ARM/Ops/Load.DataPipeline/.platform", "{}");
        fs.add_file("ARM/Ops/Load.DataPipeline/pipeline-content.json", "{\"a\":1}");
        let root = fs.root().to_path_buf();
        let folder = root.join("ARM/Ops/Load.DataPipeline");

        let mut e = entry("Load");
        e.folder = Some(folder.clone());
        e.source_paths = vec![folder.join(".platform"), folder.join("pipeline-content.json")];

        let fabric = Arc::new(InMemoryFabric::new());
        let ctx = context(&fabric, "ws", fs);

        let without = read_definition(&ctx, &e, false, |_, text| Ok(text)).unwrap();
        assert_eq!(without.parts.len(), 1);
        assert_eq!(without.parts[0].path, "pipeline-content.json");

        let with = read_definition(&ctx, &e, true, |path, text| {
            Ok(if path == ".platform" { "P".to_string() } else { text })
        })
        .unwrap();
        assert_eq!(with.part(".platform").unwrap().payload, "P");
    }

    #[test]
    fn test_relative_path_without_folder() {
        assert_eq!(
            relative_part_path(None, &PathBuf::from("a/b.json")),
            "a/b.json"
        );
    }

    #[tokio::test]
    async fn test_conflicting_create_falls_back_to_update() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        let existing = fabric.seed_item(&ws, ArtifactKind::Notebook, "Load");
        let ctx = context(&fabric, &ws, MockFileSystem::new());

        let action = deploy_item(
            &ctx,
            &ArtifactKind::Notebook,
            &entry("Load"),
            Some(ItemDefinition::default()),
        )
        .await
        .unwrap();

        assert_eq!(action, ItemAction::Updated(existing.clone()));
        assert_eq!(
            fabric.count_calls(|c| matches!(c, Call::UpdateDefinition { item_id } if *item_id == existing)),
            1
        );
        assert_eq!(fabric.items(&ws).len(), 1);
    }

    #[tokio::test]
    async fn test_existing_without_definition_is_unchanged() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        let existing = fabric.seed_item(&ws, ArtifactKind::Lakehouse, "Bronze");
        let mut ctx = context(&fabric, &ws, MockFileSystem::new());
        ctx.deployed
            .insert(
                ArtifactKind::Lakehouse,
                CatalogEntry {
                    id: Some(existing.clone()),
                    ..entry("Bronze")
                },
            )
            .unwrap();

        let action = deploy_item(&ctx, &ArtifactKind::Lakehouse, &entry("Bronze"), None)
            .await
            .unwrap();
        assert_eq!(action, ItemAction::Unchanged(existing));
        assert!(fabric.calls().iter().all(|c| !matches!(c, Call::CreateItem { .. })));
    }

    #[tokio::test]
    async fn test_accepted_create_is_settled() {
        let fabric = Arc::new(InMemoryFabric::new());
        let ws = fabric.seed_workspace("Sales");
        fabric.accept_creates(2);
        let ctx = context(&fabric, &ws, MockFileSystem::new());

        let action = deploy_item(&ctx, &ArtifactKind::Eventhouse, &entry("Events"), None)
            .await
            .unwrap();

        assert_eq!(
            Some(action.id().to_string()),
            fabric.item_id(&ws, &ArtifactKind::Eventhouse, "Events")
        );
        assert!(fabric.count_polls() >= 3);
    }

    #[tokio::test]
    async fn test_record_action_skips_unchanged() {
        let fabric = Arc::new(InMemoryFabric::new());
        let mut ctx = context(&fabric, "ws", MockFileSystem::new());
        ctx.repository
            .insert(ArtifactKind::Lakehouse, entry("Bronze"))
            .unwrap();
        let mut outcome = PhaseOutcome::default();

        record_action(
            &mut ctx,
            &mut outcome,
            &ArtifactKind::Lakehouse,
            "Bronze",
            &ItemAction::Unchanged("lh-1".to_string()),
        );
        assert!(outcome.records.is_empty());
        assert_eq!(ctx.repository.id_of(&ArtifactKind::Lakehouse, "Bronze"), Some("lh-1"));

        record_action(
            &mut ctx,
            &mut outcome,
            &ArtifactKind::Lakehouse,
            "Bronze",
            &ItemAction::Created("lh-2".to_string()),
        );
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].artifact_guid, "lh-2");
    }
}
