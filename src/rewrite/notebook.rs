//! Default-lakehouse attachment in notebook source
//!
//! Notebook sources carry their attachment in `# META` comment lines:
//!
//! ```text
//! # META       "default_lakehouse": "<id>",
//! # META       "default_lakehouse_name": "Bronze",
//! # META       "default_lakehouse_workspace_id": "<workspace id>",
//! # META       "known_lakehouses": [ { "id": "<id>" } ]
//! ```

use regex::{NoExpand, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// A lakehouse a notebook can be attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LakehouseRef {
    pub id: String,
    pub workspace_id: String,
}

/// How notebooks of one layer get their default lakehouse
#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    /// Lakehouses by display name
    pub lakehouses: HashMap<String, LakehouseRef>,
    /// Lakehouse forced onto notebooks that have none (or an unknown one)
    pub forced: Option<String>,
}

struct Patterns {
    current_name: Regex,
    has_default: Regex,
    name_line: Regex,
    default: Regex,
    name: Regex,
    workspace: Regex,
    known: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).expect("Invalid notebook META regex");
        Patterns {
            current_name: compile(r#""default_lakehouse_name"\s*:\s*"([^"]*)""#),
            has_default: compile(r#""default_lakehouse"\s*:"#),
            name_line: compile(r#"# META\s+"default_lakehouse_name""#),
            default: compile(r#""default_lakehouse"\s*:\s*("[^"]*"|null)"#),
            name: compile(r#""default_lakehouse_name"\s*:\s*("[^"]*"|null)"#),
            workspace: compile(r#""default_lakehouse_workspace_id"\s*:\s*("[^"]*"|null)"#),
            known: compile(r#"(?s)"known_lakehouses"\s*:\s*\[[^\]]*\]"#),
        }
    })
}

/// Name of the lakehouse the notebook is attached to, if any
pub fn attached_lakehouse(content: &str) -> Option<&str> {
    patterns()
        .current_name
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|name| !name.is_empty())
}

/// Re-points the notebook's lakehouse attachment
///
/// A notebook attached to a known lakehouse is bound to that lakehouse's
/// runtime id. Under a forcing policy, a notebook with no attachment or an
/// unknown one is bound to the forced lakehouse. Otherwise the content is
/// returned untouched.
pub fn attach_lakehouse(content: &str, policy: &AttachmentPolicy) -> String {
    let current = attached_lakehouse(content);
    let known = current.filter(|name| policy.lakehouses.contains_key(*name));

    let target = match (known, &policy.forced) {
        (Some(name), _) => name.to_string(),
        (None, Some(forced)) => forced.clone(),
        (None, None) => {
            if let Some(name) = current {
                warn!(lakehouse = %name, "Notebook attached to unknown lakehouse, leaving as is");
            }
            return content.to_string();
        }
    };

    let Some(lakehouse) = policy.lakehouses.get(&target) else {
        warn!(lakehouse = %target, "Lakehouse to attach is not available, leaving notebook as is");
        return content.to_string();
    };
    debug!(lakehouse = %target, id = %lakehouse.id, "Attaching notebook to lakehouse");

    let p = patterns();
    let mut updated = content.to_string();

    if !p.has_default.is_match(&updated) {
        if let Some(m) = p.name_line.find(&updated) {
            let line = format!("# META       \"default_lakehouse\": \"{}\",\n", lakehouse.id);
            updated.insert_str(m.start(), &line);
        }
    }

    let replace = |re: &Regex, text: String, value: String| -> String {
        re.replace_all(&text, NoExpand(&value)).into_owned()
    };
    updated = replace(
        &p.default,
        updated,
        format!("\"default_lakehouse\": \"{}\"", lakehouse.id),
    );
    updated = replace(
        &p.name,
        updated,
        format!("\"default_lakehouse_name\": \"{}\"", target),
    );
    updated = replace(
        &p.workspace,
        updated,
        format!("\"default_lakehouse_workspace_id\": \"{}\"", lakehouse.workspace_id),
    );
    replace(
        &p.known,
        updated,
        format!("\"known_lakehouses\": [{{\"id\": \"{}\"}}]", lakehouse.id),
    )
}
