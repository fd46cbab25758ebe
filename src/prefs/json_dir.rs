//! Directory-of-JSON preference backend.
//!
//! Each domain lives in `<root>/<domain>.json` as a single JSON object. Used
//! for offline staging of a reconcile run and for exercising the binary on
//! hosts without a preference daemon.
use super::{value_kind, PreferenceStore};
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct JsonDirStore {
    root: PathBuf,
    staged: BTreeMap<String, Map<String, Value>>,
}

impl JsonDirStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            staged: BTreeMap::new(),
        }
    }

    /// File backing `domain`.
    ///
    /// Path-shaped domains (sandboxed containers) flatten to a single file
    /// name so they never escape the store root.
    pub fn domain_path(&self, domain: &str) -> PathBuf {
        let name = domain.trim_start_matches('/').replace('/', "__");
        self.root.join(format!("{name}.json"))
    }

    fn load_domain(&self, domain: &str) -> Result<Map<String, Value>> {
        let path = self.domain_path(domain);
        if !path.is_file() {
            return Ok(Map::new());
        }
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse preference domain {}", path.display()))?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(anyhow!(
                "preference domain {} is not a dictionary (found {})",
                path.display(),
                value_kind(&other)
            )),
        }
    }
}

impl PreferenceStore for JsonDirStore {
    fn copy_value(&self, key: &str, domain: &str) -> Result<Option<Value>> {
        let values = self.load_domain(domain)?;
        Ok(values.get(key).cloned())
    }

    fn set_value(&mut self, key: &str, domain: &str, value: &Value) -> Result<()> {
        tracing::debug!(domain, key, "stage preference write");
        self.staged
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn synchronize(&mut self, domain: &str) -> Result<()> {
        let Some(staged) = self.staged.remove(domain) else {
            return Ok(());
        };
        let mut values = self.load_domain(domain)?;
        let staged_count = staged.len();
        values.extend(staged);
        let path = self.domain_path(domain);
        let bytes = serde_json::to_vec_pretty(&Value::Object(values))
            .context("serialize preference domain")?;
        publish_file(&path, &bytes)?;
        tracing::info!(domain, staged_count, path = %path.display(), "synchronized domain");
        Ok(())
    }
}

fn publish_file(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("domain");
    let tmp_path = dest
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, bytes).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, dest).with_context(|| format!("publish {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_are_invisible_until_synchronized() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let mut store = JsonDirStore::new(temp.path().to_path_buf());

        store
            .set_value("AutoUpdateState", "com.citrix.receiver.nomas", &json!("Manual"))
            .expect("stage write");
        assert_eq!(
            store
                .copy_value("AutoUpdateState", "com.citrix.receiver.nomas")
                .expect("read staged"),
            None
        );

        store
            .synchronize("com.citrix.receiver.nomas")
            .expect("synchronize");
        assert_eq!(
            store
                .copy_value("AutoUpdateState", "com.citrix.receiver.nomas")
                .expect("read synchronized"),
            Some(json!("Manual"))
        );
    }

    #[test]
    fn synchronize_keeps_unrelated_keys() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let mut store = JsonDirStore::new(temp.path().to_path_buf());
        let path = store.domain_path("com.apple.Safari");
        fs::write(&path, r#"{"HomePage": "https://example.com"}"#).expect("seed domain");

        store
            .set_value("AutoOpenSafeDownloads", "com.apple.Safari", &json!(true))
            .expect("stage write");
        store.synchronize("com.apple.Safari").expect("synchronize");

        let text = fs::read_to_string(&path).expect("read domain file");
        let value: Value = serde_json::from_str(&text).expect("parse domain file");
        assert_eq!(value["HomePage"], json!("https://example.com"));
        assert_eq!(value["AutoOpenSafeDownloads"], json!(true));
    }

    #[test]
    fn path_shaped_domains_stay_inside_root() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = JsonDirStore::new(temp.path().to_path_buf());
        let path = store.domain_path(
            "/Users/alice/Library/Containers/com.apple.Safari/Data/Library/Preferences/com.apple.Safari",
        );
        assert_eq!(path.parent(), Some(temp.path()));
    }

    #[test]
    fn non_dictionary_domain_file_is_an_error() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = JsonDirStore::new(temp.path().to_path_buf());
        fs::write(store.domain_path("com.apple.DownloadAssessment"), "[1, 2]")
            .expect("seed domain");

        let err = store
            .copy_value("LSRiskCategorySafe", "com.apple.DownloadAssessment")
            .expect_err("array domain should fail");
        assert!(err.to_string().contains("not a dictionary"));
    }
}
