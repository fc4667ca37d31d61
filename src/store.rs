//! Persistence of the expansion set.
//!
//! The set of expanded directory paths lives in an external key-value store
//! under [`EXPANDED_FOLDERS_KEY`]. Writes go through the host channel; the
//! initial read happens before the tree is built and is handed to it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::BoxFuture;
use crate::error::StoreError;
use crate::host::{HostChannel, HostRequest};

/// Storage key of the expansion set.
pub const EXPANDED_FOLDERS_KEY: &str = "expandedFolders";

/// Somewhere the expansion set can be written to.
pub trait ExpansionStore: Send + Sync {
    fn save<'a>(&'a self, expanded: &'a BTreeSet<String>) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Persists through `storage` messages to the host.
pub struct HostStore {
    host: Arc<dyn HostChannel>,
}

impl HostStore {
    pub fn new(host: Arc<dyn HostChannel>) -> Self {
        Self { host }
    }
}

impl ExpansionStore for HostStore {
    fn save<'a>(&'a self, expanded: &'a BTreeSet<String>) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let value = Value::Array(expanded.iter().cloned().map(Value::String).collect());
            let response = self
                .host
                .request(HostRequest::Storage {
                    key: EXPANDED_FOLDERS_KEY.to_string(),
                    value,
                })
                .await?;
            if response.success {
                Ok(())
            } else {
                Err(StoreError::Rejected)
            }
        })
    }
}

/// Read the persisted expansion set from a JSON key-value file.
///
/// A missing file, or a file without the key, yields an empty set.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a JSON object.
pub fn load_expanded(path: &Path) -> Result<BTreeSet<String>, StoreError> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    let entries: BTreeMap<String, Value> = serde_json::from_str(&content)?;
    let expanded = entries
        .get(EXPANDED_FOLDERS_KEY)
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalHost;
    use tempfile::tempdir;

    #[test]
    fn test_missing_store_file_is_empty() {
        let dir = tempdir().unwrap();
        let expanded = load_expanded(&dir.path().join("missing.json")).unwrap();
        assert!(expanded.is_empty());
    }

    #[test]
    fn test_load_ignores_other_keys_and_non_strings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"theme":"dark","expandedFolders":["file:///a/",3,"file:///b/"]}"#,
        )
        .unwrap();
        let expanded = load_expanded(&path).unwrap();
        assert_eq!(
            expanded.into_iter().collect::<Vec<_>>(),
            ["file:///a/", "file:///b/"]
        );
    }

    #[test]
    fn test_malformed_store_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[not an object").unwrap();
        assert!(matches!(load_expanded(&path), Err(StoreError::Json(_))));
    }

    #[tokio::test]
    async fn test_host_store_round_trips_through_local_host() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = HostStore::new(Arc::new(LocalHost::new(Some(path.clone()))));

        let expanded: BTreeSet<String> =
            ["file:///docs/".to_string(), "file:///docs/api/".to_string()].into();
        store.save(&expanded).await.unwrap();
        assert_eq!(load_expanded(&path).unwrap(), expanded);
    }

    #[tokio::test]
    async fn test_host_store_reports_rejection() {
        let store = HostStore::new(Arc::new(LocalHost::default()));
        let err = store.save(&BTreeSet::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected));
    }
}
