//! Preference store boundary.
//!
//! Every read and write of a preference domain goes through `PreferenceStore`
//! so reconciliation logic never touches the OS directly. Writes are staged by
//! `set_value` and only become durable when the domain is synchronized.
use anyhow::Result;
use serde_json::Value;

mod defaults;
mod json_dir;
#[cfg(test)]
mod memory;

pub use defaults::DefaultsStore;
pub use json_dir::JsonDirStore;
#[cfg(test)]
pub(crate) use memory::MemoryStore;

/// Read, stage, and flush values in named preference domains.
pub trait PreferenceStore {
    /// Current value of `key` in `domain`, or `None` when the key is absent.
    fn copy_value(&self, key: &str, domain: &str) -> Result<Option<Value>>;

    /// Stage `value` for `key` in `domain`.
    fn set_value(&mut self, key: &str, domain: &str, value: &Value) -> Result<()>;

    /// Flush staged writes for `domain`.
    fn synchronize(&mut self, domain: &str) -> Result<()>;
}

impl<S: PreferenceStore + ?Sized> PreferenceStore for &mut S {
    fn copy_value(&self, key: &str, domain: &str) -> Result<Option<Value>> {
        (**self).copy_value(key, domain)
    }

    fn set_value(&mut self, key: &str, domain: &str, value: &Value) -> Result<()> {
        (**self).set_value(key, domain, value)
    }

    fn synchronize(&mut self, domain: &str) -> Result<()> {
        (**self).synchronize(domain)
    }
}

impl<S: PreferenceStore + ?Sized> PreferenceStore for Box<S> {
    fn copy_value(&self, key: &str, domain: &str) -> Result<Option<Value>> {
        (**self).copy_value(key, domain)
    }

    fn set_value(&mut self, key: &str, domain: &str, value: &Value) -> Result<()> {
        (**self).set_value(key, domain, value)
    }

    fn synchronize(&mut self, domain: &str) -> Result<()> {
        (**self).synchronize(domain)
    }
}

/// Short human rendering of a preference value for log lines.
pub fn describe_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Plist-flavored name of a value's type, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "dictionary",
    }
}
