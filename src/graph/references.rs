//! Cross-pipeline references inside pipeline definitions
//!
//! A pipeline calls another through an invoke activity somewhere in its
//! activity tree (possibly nested in ForEach/If/Until containers). Two activity
//! shapes exist:
//!
//! - `ExecutePipeline` (legacy): `typeProperties.pipeline.referenceName`
//! - `InvokePipeline`: `typeProperties.pipelineId`

use crate::catalog::{Catalog, LookupMode};
use crate::model::ArtifactKind;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineActivity<'a> {
    ExecutePipeline {
        name: Option<&'a str>,
        reference: Option<&'a str>,
    },
    InvokePipeline {
        name: Option<&'a str>,
        reference: Option<&'a str>,
    },
}

impl<'a> PipelineActivity<'a> {
    /// Recognises an invoke activity; any other node yields `None`
    pub fn classify(node: &'a Value) -> Option<Self> {
        let object = node.as_object()?;
        let kind = object.get("type")?.as_str()?.trim();
        let name = object.get("name").and_then(Value::as_str);
        let properties = object.get("typeProperties");

        if kind.eq_ignore_ascii_case("ExecutePipeline") {
            let reference = properties
                .and_then(|p| p.get("pipeline"))
                .and_then(|p| p.get("referenceName"))
                .and_then(Value::as_str);
            Some(PipelineActivity::ExecutePipeline { name, reference })
        } else if kind.eq_ignore_ascii_case("InvokePipeline") {
            let reference = properties
                .and_then(|p| p.get("pipelineId"))
                .and_then(Value::as_str);
            Some(PipelineActivity::InvokePipeline { name, reference })
        } else {
            None
        }
    }

    pub fn reference(&self) -> Option<&'a str> {
        match self {
            PipelineActivity::ExecutePipeline { reference, .. }
            | PipelineActivity::InvokePipeline { reference, .. } => {
                reference.map(str::trim).filter(|r| !r.is_empty())
            }
        }
    }

    pub fn name(&self) -> Option<&'a str> {
        match self {
            PipelineActivity::ExecutePipeline { name, .. }
            | PipelineActivity::InvokePipeline { name, .. } => *name,
        }
    }
}

pub trait ActivityVisitor<'a> {
    fn visit(&mut self, activity: PipelineActivity<'a>);
}

/// Depth-first walk calling `visitor` for every invoke activity; the walk does
/// not descend into an activity it has already reported
pub fn walk_activities<'a>(node: &'a Value, visitor: &mut dyn ActivityVisitor<'a>) {
    if let Some(activity) = PipelineActivity::classify(node) {
        visitor.visit(activity);
        return;
    }
    match node {
        Value::Object(map) => {
            for value in map.values() {
                walk_activities(value, visitor);
            }
        }
        Value::Array(items) => {
            for value in items {
                walk_activities(value, visitor);
            }
        }
        _ => {}
    }
}

struct ReferenceCollector<'a> {
    references: Vec<&'a str>,
}

impl<'a> ActivityVisitor<'a> for ReferenceCollector<'a> {
    fn visit(&mut self, activity: PipelineActivity<'a>) {
        match activity.reference() {
            Some(reference) => self.references.push(reference),
            None => warn!(
                activity = activity.name().unwrap_or("<unnamed>"),
                "Invoke activity has no pipeline reference, ignoring"
            ),
        }
    }
}

/// Raw identifiers referenced by invoke activities, in walk order
pub fn raw_references(definition: &Value) -> Vec<&str> {
    let mut collector = ReferenceCollector {
        references: Vec::new(),
    };
    walk_activities(definition, &mut collector);
    collector.references
}

/// Display names of the pipelines referenced by `definition`
///
/// Identifiers are logical ids in [`LookupMode::Repository`] and runtime ids in
/// [`LookupMode::Deployed`]. References that do not resolve are dropped.
/// Duplicates are preserved.
pub fn referenced_pipelines(definition: &Value, catalog: &Catalog, mode: LookupMode) -> Vec<String> {
    raw_references(definition)
        .into_iter()
        .filter_map(|reference| {
            let resolved =
                catalog.resolve_name(&ArtifactKind::DataPipeline, mode, reference);
            if resolved.is_none() {
                debug!(reference = %reference, ?mode, "Unresolved pipeline reference dropped");
            }
            resolved.map(str::to_string)
        })
        .collect()
}
