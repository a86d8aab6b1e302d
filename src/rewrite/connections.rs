//! Re-pointing pipeline data-source bindings at the destination workspace

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

pub const BLOB_STORAGE: &str = "Azure Blob Storage";
pub const SQL_SERVER: &str = "SQL Server";

/// Query endpoint and database of the workspace's KQL database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KustoBinding {
    pub endpoint: String,
    pub database_id: String,
}

/// Everything needed to rebind one pipeline definition
#[derive(Debug, Clone, Default)]
pub struct BindingContext {
    pub workspace_id: String,
    /// Connection type (e.g. `"SQL Server"`) to resolved connection id
    pub connections: HashMap<String, String>,
    pub kusto: Option<KustoBinding>,
}

impl BindingContext {
    /// Rewrites bindings in place; returns how many fields changed
    pub fn apply(&self, definition: &mut Value) -> usize {
        let mut changed = 0;
        self.visit(definition, &mut changed);
        changed
    }

    fn visit(&self, node: &mut Value, changed: &mut usize) {
        match node {
            Value::Object(map) => {
                if let Some(Value::Object(dataset)) = map.get_mut("datasetSettings") {
                    self.rebind_dataset(dataset, changed);
                }
                if let Some(Value::Object(linked)) = map.get_mut("linkedService") {
                    self.rebind_kusto(linked, changed);
                }
                for value in map.values_mut() {
                    self.visit(value, changed);
                }
            }
            Value::Array(items) => {
                for value in items {
                    self.visit(value, changed);
                }
            }
            _ => {}
        }
    }

    fn rebind_dataset(&self, dataset: &mut Map<String, Value>, changed: &mut usize) {
        let connection_type = if dataset
            .pointer_str("typeProperties/location/type")
            .is_some_and(|t| t == "AzureBlobStorageLocation")
        {
            Some(BLOB_STORAGE)
        } else if dataset
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| t == "SqlServerTable")
        {
            Some(SQL_SERVER)
        } else {
            None
        };

        if let (Some(connection_type), Some(Value::Object(references))) =
            (connection_type, dataset.get_mut("externalReferences"))
        {
            if let Some(id) = self.connections.get(connection_type) {
                if references.contains_key("connection") {
                    debug!(connection_type, connection = %id, "Rebinding dataset connection");
                    set(references, "connection", id, changed);
                }
            }
        }

        if let Some(Value::Object(type_properties)) = dataset
            .get_mut("linkedService")
            .and_then(|l| l.get_mut("properties"))
            .and_then(|p| p.get_mut("typeProperties"))
        {
            set(type_properties, "workspaceId", &self.workspace_id, changed);
        }
    }

    fn rebind_kusto(&self, linked: &mut Map<String, Value>, changed: &mut usize) {
        let Some(kusto) = &self.kusto else {
            return;
        };
        let Some(Value::Object(properties)) = linked.get_mut("properties") else {
            return;
        };
        let is_kusto = properties
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| t == "KustoDatabase");
        if !is_kusto {
            return;
        }

        let type_properties = properties
            .entry("typeProperties")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(type_properties) = type_properties {
            set(type_properties, "workspaceId", &self.workspace_id, changed);
            set(type_properties, "endpoint", &kusto.endpoint, changed);
            set(type_properties, "database", &kusto.database_id, changed);
        }
    }
}

fn set(map: &mut Map<String, Value>, key: &str, value: &str, changed: &mut usize) {
    if map.get(key).and_then(Value::as_str) != Some(value) {
        map.insert(key.to_string(), Value::String(value.to_string()));
        *changed += 1;
    }
}

trait PointerStr {
    fn pointer_str(&self, path: &str) -> Option<&str>;
}

impl PointerStr for Map<String, Value> {
    fn pointer_str(&self, path: &str) -> Option<&str> {
        let mut segments = path.split('/');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        current.as_str()
    }
}
