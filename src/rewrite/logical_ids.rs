use crate::catalog::Catalog;
use crate::error::{DeployError, DeployResult};

/// Placeholder standing for "the workspace this definition is deployed into"
pub const ZERO_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// Replaces design-time logical ids with runtime ids in raw definition text
pub struct ReferenceRewriter<'a> {
    catalog: &'a Catalog,
    workspace_id: &'a str,
}

impl<'a> ReferenceRewriter<'a> {
    pub fn new(catalog: &'a Catalog, workspace_id: &'a str) -> Self {
        Self {
            catalog,
            workspace_id,
        }
    }

    /// Fails with `NotYetDeployed` when the text mentions an item whose runtime id
    /// is still unknown.
    pub fn rewrite(&self, text: &str) -> DeployResult<String> {
        let mut output = text.to_string();

        for (kind, entry) in self.catalog.iter() {
            let Some(logical_id) = entry.logical_id.as_deref() else {
                continue;
            };
            if logical_id == ZERO_GUID || !output.contains(logical_id) {
                continue;
            }
            let id = entry
                .id
                .as_deref()
                .ok_or_else(|| DeployError::NotYetDeployed {
                    logical_id: logical_id.to_string(),
                    kind: kind.to_string(),
                    name: entry.display_name.clone(),
                })?;
            output = output.replace(logical_id, id);
        }

        Ok(output.replace(ZERO_GUID, self.workspace_id))
    }
}
