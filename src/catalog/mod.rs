//! Item catalogs keyed by kind and display name
//!
//! Two catalogs exist per run: the repository catalog built by
//! [`RepositoryScanner`] (entries carry logical ids, and runtime ids once the
//! item is deployed) and the deployed catalog built from the remote listing
//! (entries carry runtime ids only). Both support the same lookups.

mod deployed;
mod repository;

pub use deployed::{catalog_from_items, fetch_deployed};
pub use repository::RepositoryScanner;

use crate::error::{DeployError, DeployResult};
use crate::model::{ArtifactDescriptor, ArtifactKind, DeployedItem};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Which identifier a reference carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Design-time logical ids, resolved against the repository catalog
    Repository,
    /// Runtime ids, resolved against the deployed catalog
    Deployed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub display_name: String,
    pub description: Option<String>,
    pub logical_id: Option<String>,
    /// Runtime id, known for deployed items and for repository items once published
    pub id: Option<String>,
    pub folder: Option<PathBuf>,
    pub source_paths: Vec<PathBuf>,
}

impl From<ArtifactDescriptor> for CatalogEntry {
    fn from(descriptor: ArtifactDescriptor) -> Self {
        Self {
            display_name: descriptor.display_name,
            description: descriptor.description,
            logical_id: descriptor.logical_id,
            id: None,
            folder: Some(descriptor.folder),
            source_paths: descriptor.source_paths,
        }
    }
}

impl From<DeployedItem> for CatalogEntry {
    fn from(item: DeployedItem) -> Self {
        Self {
            display_name: item.display_name,
            description: item.description,
            logical_id: None,
            id: Some(item.id),
            folder: None,
            source_paths: Vec::new(),
        }
    }
}

impl CatalogEntry {
    pub fn content_path(&self, kind: &ArtifactKind) -> Option<PathBuf> {
        let path = self.folder.as_ref()?.join(kind.content_file()?);
        self.source_paths.contains(&path).then_some(path)
    }

    fn matches(&self, mode: LookupMode, identifier: &str) -> bool {
        let candidate = match mode {
            LookupMode::Repository => self.logical_id.as_deref(),
            LookupMode::Deployed => self.id.as_deref(),
        };
        candidate.is_some_and(|c| c == identifier.trim())
    }
}

/// Mapping kind -> display name -> entry; entries of a kind keep insertion order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    kinds: BTreeMap<ArtifactKind, Vec<CatalogEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, rejecting a second item of the same kind and name
    pub fn insert(&mut self, kind: ArtifactKind, entry: CatalogEntry) -> DeployResult<()> {
        let entries = self.kinds.entry(kind.clone()).or_default();
        if let Some(existing) = entries
            .iter()
            .find(|e| e.display_name == entry.display_name)
        {
            let location = |e: &CatalogEntry| {
                e.folder
                    .as_ref()
                    .map(|f| f.display().to_string())
                    .or_else(|| e.id.clone())
                    .unwrap_or_default()
            };
            return Err(DeployError::validation(format!(
                "duplicate {} display name '{}' ({} and {})",
                kind,
                entry.display_name,
                location(existing),
                location(&entry)
            )));
        }
        entries.push(entry);
        Ok(())
    }

    pub fn get(&self, kind: &ArtifactKind, name: &str) -> Option<&CatalogEntry> {
        self.entries(kind).iter().find(|e| e.display_name == name)
    }

    pub fn contains(&self, kind: &ArtifactKind, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    pub fn entries(&self, kind: &ArtifactKind) -> &[CatalogEntry] {
        self.kinds.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn names(&self, kind: &ArtifactKind) -> Vec<String> {
        self.entries(kind)
            .iter()
            .map(|e| e.display_name.clone())
            .collect()
    }

    /// Runtime id of an item, if known
    pub fn id_of(&self, kind: &ArtifactKind, name: &str) -> Option<&str> {
        self.get(kind, name)?.id.as_deref()
    }

    /// Display name of the item of `kind` whose id (per `mode`) equals `identifier`
    pub fn resolve_name(
        &self,
        kind: &ArtifactKind,
        mode: LookupMode,
        identifier: &str,
    ) -> Option<&str> {
        self.entries(kind)
            .iter()
            .find(|e| e.matches(mode, identifier))
            .map(|e| e.display_name.as_str())
    }

    /// Stores the runtime id assigned to a repository item after it was published
    pub fn record_id(&mut self, kind: &ArtifactKind, name: &str, id: impl Into<String>) -> bool {
        match self
            .kinds
            .get_mut(kind)
            .and_then(|entries| entries.iter_mut().find(|e| e.display_name == name))
        {
            Some(entry) => {
                entry.id = Some(id.into());
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactKind, &CatalogEntry)> {
        self.kinds
            .iter()
            .flat_map(|(kind, entries)| entries.iter().map(move |e| (kind, e)))
    }

    pub fn len(&self) -> usize {
        self.kinds.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
