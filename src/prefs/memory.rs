use super::PreferenceStore;
use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// In-memory store that records every write and synchronize call.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    domains: BTreeMap<String, Map<String, Value>>,
    staged: BTreeMap<String, Map<String, Value>>,
    pub(crate) writes: Vec<(String, String)>,
    pub(crate) syncs: Vec<String>,
    drop_writes: bool,
    broken_domain: Option<String>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_value(mut self, domain: &str, key: &str, value: Value) -> Self {
        self.domains
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self
    }

    /// Accept writes but never persist them.
    pub(crate) fn dropping_writes(mut self) -> Self {
        self.drop_writes = true;
        self
    }

    /// Fail every read of `domain`.
    pub(crate) fn failing_reads(mut self, domain: &str) -> Self {
        self.broken_domain = Some(domain.to_string());
        self
    }

    pub(crate) fn get(&self, domain: &str, key: &str) -> Option<&Value> {
        self.domains.get(domain).and_then(|values| values.get(key))
    }

    pub(crate) fn writes_to(&self, domain: &str) -> usize {
        self.writes.iter().filter(|(d, _)| d == domain).count()
    }
}

impl PreferenceStore for MemoryStore {
    fn copy_value(&self, key: &str, domain: &str) -> Result<Option<Value>> {
        if self.broken_domain.as_deref() == Some(domain) {
            return Err(anyhow!("read {domain} failed"));
        }
        Ok(self.get(domain, key).cloned())
    }

    fn set_value(&mut self, key: &str, domain: &str, value: &Value) -> Result<()> {
        self.writes.push((domain.to_string(), key.to_string()));
        self.staged
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn synchronize(&mut self, domain: &str) -> Result<()> {
        self.syncs.push(domain.to_string());
        let Some(staged) = self.staged.remove(domain) else {
            return Ok(());
        };
        if self.drop_writes {
            return Ok(());
        }
        self.domains
            .entry(domain.to_string())
            .or_default()
            .extend(staged);
        Ok(())
    }
}
