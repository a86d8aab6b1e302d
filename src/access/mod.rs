//! Workspace membership reconciliation

mod members;

pub use members::{parse_members, validate_unique_roles};

use crate::error::DeployResult;
use crate::remote::{AccessProvider, Member};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Changes needed to make the workspace membership match the declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipPlan {
    pub add: Vec<Member>,
    pub update: Vec<Member>,
    /// Identifiers as reported by the workspace
    pub remove: Vec<String>,
}

impl MembershipPlan {
    /// Identifiers and roles compare case-insensitively
    pub fn compute(desired: &[Member], current: &[Member]) -> Self {
        let mut current_roles: HashMap<String, &Member> = current
            .iter()
            .map(|m| (m.identifier.to_lowercase(), m))
            .collect();

        let mut plan = MembershipPlan::default();
        for member in desired {
            match current_roles.remove(&member.identifier.to_lowercase()) {
                None => plan.add.push(member.clone()),
                Some(existing) if !existing.access.eq_ignore_ascii_case(&member.access) => {
                    plan.update.push(member.clone())
                }
                Some(_) => {}
            }
        }

        let mut remaining: Vec<&Member> = current_roles.into_values().collect();
        remaining.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        plan.remove = remaining.into_iter().map(|m| m.identifier.clone()).collect();
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

/// Brings the workspace membership in line with `desired`
pub async fn reconcile_members(
    provider: &dyn AccessProvider,
    workspace_id: &str,
    desired: &[Member],
) -> DeployResult<MembershipPlan> {
    validate_unique_roles(desired)?;

    let current = provider.list_members(workspace_id).await?;
    let plan = MembershipPlan::compute(desired, &current);
    if plan.is_empty() {
        debug!(workspace = %workspace_id, "Membership already up to date");
        return Ok(plan);
    }

    for member in &plan.add {
        provider
            .add_member(workspace_id, member)
            .await
            .map_err(|e| e.for_item("Member", &member.identifier))?;
    }
    for member in &plan.update {
        provider
            .update_member_role(workspace_id, member)
            .await
            .map_err(|e| e.for_item("Member", &member.identifier))?;
    }
    for identifier in &plan.remove {
        provider
            .remove_member(workspace_id, identifier)
            .await
            .map_err(|e| e.for_item("Member", identifier))?;
    }

    info!(
        workspace = %workspace_id,
        added = plan.add.len(),
        updated = plan.update.len(),
        removed = plan.remove.len(),
        "Membership reconciled"
    );
    Ok(plan)
}
