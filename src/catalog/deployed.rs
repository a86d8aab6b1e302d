use super::{Catalog, CatalogEntry};
use crate::error::DeployResult;
use crate::model::DeployedItem;
use crate::remote::WorkspaceProvider;
use tracing::{debug, warn};

/// Lists the workspace and shapes the result like the repository catalog
pub async fn fetch_deployed(
    provider: &dyn WorkspaceProvider,
    workspace_id: &str,
) -> DeployResult<Catalog> {
    let items = provider.list_items(workspace_id).await?;
    debug!(workspace = %workspace_id, items = items.len(), "Fetched deployed items");
    Ok(catalog_from_items(items))
}

pub fn catalog_from_items(items: Vec<DeployedItem>) -> Catalog {
    let mut catalog = Catalog::new();
    for item in items {
        let kind = item.kind.clone();
        let name = item.display_name.clone();
        if catalog.insert(kind.clone(), CatalogEntry::from(item)).is_err() {
            warn!(kind = %kind, item = %name, "Ignoring second deployed item with the same name");
        }
    }
    catalog
}
