//! Parsing of the declared member list
//!
//! Members are declared as JSON objects separated by `|`, for example
//! `{'identifier': 'abc', 'principalType': 'Group', 'access': 'Admin'}|{...}`.

use crate::error::{DeployError, DeployResult};
use crate::remote::Member;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

fn required(object: &Map<String, Value>, key: &str, segment: &str) -> DeployResult<String> {
    object
        .iter()
        .find(|(k, _)| k.trim() == key)
        .and_then(|(_, v)| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            DeployError::validation(format!("member '{}' is missing '{}'", segment, key))
        })
}

/// Parses the declaration; exact duplicates (case-insensitive) are collapsed
pub fn parse_members(declaration: &str) -> DeployResult<Vec<Member>> {
    let mut members = Vec::new();
    let mut seen = HashSet::new();

    for segment in declaration.split('|') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let normalized = segment.replace('\'', "\"");
        let value: Value = serde_json::from_str(&normalized)
            .map_err(|e| DeployError::json(format!("member '{}'", segment), e))?;
        let Value::Object(object) = value else {
            return Err(DeployError::validation(format!(
                "member '{}' is not a JSON object",
                segment
            )));
        };

        let member = Member {
            identifier: required(&object, "identifier", segment)?,
            principal_type: required(&object, "principalType", segment)?,
            access: required(&object, "access", segment)?,
        };

        let key = (
            member.identifier.to_lowercase(),
            member.principal_type.to_lowercase(),
            member.access.to_lowercase(),
        );
        if seen.insert(key) {
            members.push(member);
        }
    }

    validate_unique_roles(&members)?;
    Ok(members)
}

/// Rejects an identifier declared with two different roles
pub fn validate_unique_roles(members: &[Member]) -> DeployResult<()> {
    let mut roles: HashMap<String, &str> = HashMap::new();
    for member in members {
        let identifier = member.identifier.to_lowercase();
        match roles.get(&identifier) {
            Some(role) if !role.eq_ignore_ascii_case(&member.access) => {
                return Err(DeployError::validation(format!(
                    "member '{}' is declared with different roles: '{}' and '{}'",
                    member.identifier, role, member.access
                )));
            }
            Some(_) => {}
            None => {
                roles.insert(identifier, &member.access);
            }
        }
    }
    Ok(())
}
