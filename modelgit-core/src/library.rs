//! Library restriction checks against a collaboration server.

use crate::error::{Error, Result};
use crate::models::{Change, LibraryRestriction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Finds changes that collide with protected reference libraries.
pub trait LibraryCheck: Send + Sync {
    fn check(&self, changes: &[Change]) -> Result<Vec<LibraryRestriction>>;
}

/// Restriction as returned by the server, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRestriction {
    pub dataset_ref_id: String,
    pub library_name: String,
}

pub fn validate_request(base_url: &str, changes: &[Change]) -> Result<()> {
    if base_url.trim().is_empty() {
        return Err(Error::Precondition("base url must not be empty".to_string()));
    }
    if changes.is_empty() {
        return Err(Error::Precondition("changes must not be empty".to_string()));
    }
    Ok(())
}

/// Splits `group/name` on the first `/`.
pub fn split_repository_id(repository_id: &str) -> Result<(&str, &str)> {
    match repository_id.split_once('/') {
        Some((group, name)) if !group.is_empty() && !name.is_empty() => Ok((group, name)),
        _ => Err(Error::Precondition(format!(
            "repository id must be <group>/<name>, got '{}'",
            repository_id
        ))),
    }
}

/// Copies type and path from the submitted changes onto each restriction.
///
/// A ref id that was never submitted means the server broke the contract;
/// the whole result is rejected.
pub fn enrich(
    restrictions: Vec<RemoteRestriction>,
    changes: &[Change],
) -> Result<Vec<LibraryRestriction>> {
    let by_ref_id: HashMap<&str, &Change> = changes
        .iter()
        .rev()
        .map(|c| (c.ref_id.as_str(), c))
        .collect();

    restrictions
        .into_iter()
        .map(|r| {
            let change = by_ref_id
                .get(r.dataset_ref_id.as_str())
                .ok_or_else(|| Error::PolicyContract(r.dataset_ref_id.clone()))?;
            Ok(LibraryRestriction {
                model_type: Some(change.model_type),
                path: Some(change.path.clone()),
                dataset_ref_id: r.dataset_ref_id,
                library_name: r.library_name,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiffType, ModelType};

    fn changes() -> Vec<Change> {
        vec![
            Change::new(ModelType::Flow, "A", "elementary/CO2", DiffType::Modified),
            Change::new(ModelType::Process, "B", "energy/Coal", DiffType::Added),
        ]
    }

    #[test]
    fn test_validate_request() {
        assert!(matches!(validate_request("", &changes()), Err(Error::Precondition(_))));
        assert!(matches!(validate_request("http://x", &[]), Err(Error::Precondition(_))));
        assert!(validate_request("http://x", &changes()).is_ok());
    }

    #[test]
    fn test_split_repository_id() {
        assert_eq!(split_repository_id("lca/steel").unwrap(), ("lca", "steel"));
        assert_eq!(split_repository_id("lca/steel/v2").unwrap(), ("lca", "steel/v2"));
        assert!(split_repository_id("nogroup").is_err());
        assert!(split_repository_id("/name").is_err());
    }

    #[test]
    fn test_enrich_copies_type_and_path() {
        let remote = vec![RemoteRestriction {
            dataset_ref_id: "A".to_string(),
            library_name: "ecoinvent".to_string(),
        }];

        let enriched = enrich(remote, &changes()).unwrap();
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].model_type, Some(ModelType::Flow));
        assert_eq!(enriched[0].path.as_deref(), Some("elementary/CO2"));
        assert_eq!(enriched[0].library_name, "ecoinvent");
    }

    #[test]
    fn test_enrich_rejects_unknown_ref_id() {
        let remote = vec![RemoteRestriction {
            dataset_ref_id: "Z".to_string(),
            library_name: "ecoinvent".to_string(),
        }];

        assert!(matches!(enrich(remote, &changes()), Err(Error::PolicyContract(id)) if id == "Z"));
    }
}
