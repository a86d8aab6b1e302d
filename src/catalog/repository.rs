//! Source tree scanner
//!
//! Items live in folders named `<display name>.<Kind>` somewhere below the
//! layer folder. Each item folder carries a `.platform` descriptor:
//!
//! ```json
//! {
//!   "metadata": { "type": "Notebook", "displayName": "Load", "description": "..." },
//!   "config": { "logicalId": "5b1c..." }
//! }
//! ```

use super::{Catalog, CatalogEntry};
use crate::error::{DeployError, DeployResult};
use crate::fs::FileSystem;
use crate::model::{ArtifactDescriptor, ArtifactKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const PLATFORM_FILE: &str = ".platform";

#[derive(Debug, Deserialize)]
struct PlatformFile {
    metadata: Option<PlatformMetadata>,
    #[serde(default)]
    config: Option<PlatformConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformMetadata {
    #[serde(rename = "type")]
    kind: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformConfig {
    logical_id: Option<String>,
}

pub struct RepositoryScanner {
    fs: Arc<dyn FileSystem>,
}

impl RepositoryScanner {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Locates `root/layer`, falling back to a case-insensitive sibling match
    pub fn resolve_layer_dir(&self, root: &Path, layer: &str) -> Option<PathBuf> {
        let exact = root.join(layer);
        if self.fs.is_dir(&exact) {
            return Some(exact);
        }

        let siblings = self.fs.read_dir(root).ok()?;
        let found = siblings
            .into_iter()
            .find(|entry| entry.is_dir() && entry.file_name().eq_ignore_ascii_case(layer))
            .map(|entry| entry.path);

        if let Some(path) = &found {
            info!(
                requested = %layer,
                found = %path.display(),
                "Layer folder matched case-insensitively"
            );
        }
        found
    }

    /// Scans every deployable kind of one layer into a repository catalog
    ///
    /// A missing layer folder yields an empty catalog and a warning.
    pub fn scan(&self, root: &Path, layer: &str) -> DeployResult<Catalog> {
        let mut catalog = Catalog::new();
        let Some(layer_dir) = self.resolve_layer_dir(root, layer) else {
            warn!(
                root = %root.display(),
                layer = %layer,
                "Layer folder not found, nothing to deploy"
            );
            return Ok(catalog);
        };

        for descriptor in self.scan_dir(&layer_dir)? {
            debug!(
                kind = %descriptor.kind,
                item = %descriptor.display_name,
                "Discovered item"
            );
            catalog.insert(descriptor.kind.clone(), CatalogEntry::from(descriptor))?;
        }

        info!(layer = %layer, items = catalog.len(), "Repository scan complete");
        Ok(catalog)
    }

    /// Scans one kind only; same folder resolution as [`scan`](Self::scan)
    pub fn scan_kind(
        &self,
        root: &Path,
        layer: &str,
        kind: &ArtifactKind,
    ) -> DeployResult<Vec<ArtifactDescriptor>> {
        let Some(layer_dir) = self.resolve_layer_dir(root, layer) else {
            warn!(layer = %layer, kind = %kind, "Layer folder not found");
            return Ok(Vec::new());
        };
        Ok(self
            .scan_dir(&layer_dir)?
            .into_iter()
            .filter(|d| &d.kind == kind)
            .collect())
    }

    fn scan_dir(&self, layer_dir: &Path) -> DeployResult<Vec<ArtifactDescriptor>> {
        let mut found = Vec::new();
        let mut pending = vec![layer_dir.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = self
                .fs
                .read_dir(&dir)
                .map_err(|e| DeployError::filesystem(&dir, e))?;

            let mut subdirs = Vec::new();
            for entry in entries.into_iter().filter(|e| e.is_dir()) {
                match ArtifactKind::from_folder_name(entry.file_name()) {
                    Some(kind) => {
                        if let Some(descriptor) = self.read_item(&entry.path, kind)? {
                            found.push(descriptor);
                        }
                    }
                    None => subdirs.push(entry.path),
                }
            }
            // depth-first, alphabetical
            pending.extend(subdirs.into_iter().rev());
        }

        Ok(found)
    }

    fn read_item(
        &self,
        folder: &Path,
        kind: ArtifactKind,
    ) -> DeployResult<Option<ArtifactDescriptor>> {
        if let Some(content) = kind.content_file() {
            if !self.fs.is_file(&folder.join(content)) {
                warn!(
                    folder = %folder.display(),
                    expected = %content,
                    "Item folder has no definition file, skipping"
                );
                return Ok(None);
            }
        }

        let platform_path = folder.join(PLATFORM_FILE);
        let raw = self
            .fs
            .read_to_string(&platform_path)
            .map_err(|e| DeployError::filesystem(&platform_path, e))?;
        let platform: PlatformFile = serde_json::from_str(&raw)
            .map_err(|e| DeployError::json(platform_path.display().to_string(), e))?;

        let metadata = platform.metadata.ok_or_else(|| {
            DeployError::validation(format!("{} has no metadata", platform_path.display()))
        })?;
        let declared = metadata.kind.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
            DeployError::validation(format!("{} has no metadata.type", platform_path.display()))
        })?;
        let display_name = metadata
            .display_name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                DeployError::validation(format!(
                    "{} has no metadata.displayName",
                    platform_path.display()
                ))
            })?;

        if ArtifactKind::from(declared.as_str()) != kind {
            return Err(DeployError::validation(format!(
                "{} declares type {} but lives in a {} folder",
                platform_path.display(),
                declared,
                kind
            )));
        }

        let source_paths = self
            .fs
            .walk_files(folder)
            .map_err(|e| DeployError::filesystem(folder, e))?;

        Ok(Some(ArtifactDescriptor {
            kind,
            display_name,
            description: metadata.description.filter(|d| !d.is_empty()),
            logical_id: platform
                .config
                .and_then(|c| c.logical_id)
                .filter(|id| !id.is_empty()),
            folder: folder.to_path_buf(),
            source_paths,
        }))
    }
}
