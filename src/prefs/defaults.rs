//! macOS preference backend built on `defaults`.
//!
//! Reads export the whole domain through the preference daemon (so cached
//! values are seen) and pick the key out of the exported property list.
//! Writes are staged and applied with `defaults write` on synchronize, which
//! also goes through the daemon so running apps pick up the change without a
//! restart.
use super::PreferenceStore;
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Instant;

const DEFAULTS_FALLBACK: &str = "/usr/bin/defaults";

pub struct DefaultsStore {
    defaults: PathBuf,
    staged: BTreeMap<String, Map<String, Value>>,
}

impl DefaultsStore {
    /// Locate `defaults` on `PATH`, falling back to `/usr/bin/defaults`.
    pub fn locate() -> Self {
        Self::locate_in(std::env::var_os("PATH"))
    }

    fn locate_in(search_path: Option<OsString>) -> Self {
        let defaults = search_path
            .and_then(|paths| which::which_in("defaults", Some(paths), ".").ok())
            .unwrap_or_else(|| PathBuf::from(DEFAULTS_FALLBACK));
        tracing::debug!(path = %defaults.display(), "using defaults tool");
        Self {
            defaults,
            staged: BTreeMap::new(),
        }
    }

    fn export_domain(&self, domain: &str) -> Result<Vec<u8>> {
        let output = run_tool(&self.defaults, &["export", domain, "-"])?;
        check_status("defaults export", &output)?;
        Ok(output.stdout)
    }
}

impl PreferenceStore for DefaultsStore {
    fn copy_value(&self, key: &str, domain: &str) -> Result<Option<Value>> {
        let exported = self
            .export_domain(domain)
            .with_context(|| format!("export preference domain {domain}"))?;
        lookup_exported(&exported, key).with_context(|| format!("decode {key} in {domain}"))
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
        for (key, value) in &staged {
            let mut args = vec!["write".to_string(), domain.to_string(), key.clone()];
            args.extend(write_args(value)?);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let output = run_tool(&self.defaults, &args)?;
            check_status("defaults write", &output)
                .with_context(|| format!("write {key} to {domain}"))?;
        }
        tracing::info!(domain, staged_count = staged.len(), "synchronized domain");
        Ok(())
    }
}

fn run_tool(program: &Path, args: &[&str]) -> Result<Output> {
    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("run {}", program.display()))?;

    tracing::debug!(
        program = %program.display(),
        ?args,
        elapsed_ms = start.elapsed().as_millis(),
        status = ?output.status.code(),
        "tool complete"
    );
    Ok(output)
}

fn check_status(label: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr_line = stderr.trim().lines().next().unwrap_or_default();
    let detail = if stderr_line.is_empty() {
        format!("status {}", output.status)
    } else {
        stderr_line.to_string()
    };
    Err(anyhow!("{label} failed: {detail}"))
}

/// Value of `key` in an exported domain, or `None` when the key is missing.
///
/// An empty export is treated as an empty domain.
fn lookup_exported(exported: &[u8], key: &str) -> Result<Option<Value>> {
    if exported.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let document = plist::Value::from_reader(Cursor::new(exported))
        .context("parse exported property list")?;
    let plist::Value::Dictionary(entries) = document else {
        return Err(anyhow!("exported domain is not a dictionary"));
    };
    entries.get(key).map(plist_to_json).transpose()
}

/// Convert a property-list value to the store's value model.
///
/// Dates become their XML timestamp string and data becomes an array of
/// byte values; neither survives a write back with its original type.
fn plist_to_json(value: &plist::Value) -> Result<Value> {
    Ok(match value {
        plist::Value::Dictionary(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, item)| Ok((key.clone(), plist_to_json(item)?)))
                .collect::<Result<Map<String, Value>>>()?,
        ),
        plist::Value::Array(items) => {
            Value::Array(items.iter().map(plist_to_json).collect::<Result<Vec<_>>>()?)
        }
        plist::Value::Boolean(flag) => Value::Bool(*flag),
        plist::Value::String(text) => Value::String(text.clone()),
        plist::Value::Integer(number) => match (number.as_signed(), number.as_unsigned()) {
            (Some(signed), _) => Value::from(signed),
            (None, Some(unsigned)) => Value::from(unsigned),
            (None, None) => return Err(anyhow!("integer {number:?} is out of range")),
        },
        plist::Value::Real(number) => Number::from_f64(*number)
            .map(Value::Number)
            .ok_or_else(|| anyhow!("real {number} has no JSON representation"))?,
        plist::Value::Date(date) => Value::String(date.to_xml_format()),
        plist::Value::Data(bytes) => {
            Value::Array(bytes.iter().copied().map(Value::from).collect())
        }
        plist::Value::Uid(uid) => Value::from(uid.get()),
        other => return Err(anyhow!("unsupported property-list value {other:?}")),
    })
}

fn json_to_plist(value: &Value) -> Result<plist::Value> {
    Ok(match value {
        Value::Null => return Err(anyhow!("null has no property-list representation")),
        Value::Bool(flag) => plist::Value::Boolean(*flag),
        Value::Number(number) => {
            if let Some(signed) = number.as_i64() {
                plist::Value::Integer(signed.into())
            } else if let Some(unsigned) = number.as_u64() {
                plist::Value::Integer(unsigned.into())
            } else {
                let real = number
                    .as_f64()
                    .ok_or_else(|| anyhow!("number {number} is not representable"))?;
                plist::Value::Real(real)
            }
        }
        Value::String(text) => plist::Value::String(text.clone()),
        Value::Array(items) => {
            plist::Value::Array(items.iter().map(json_to_plist).collect::<Result<Vec<_>>>()?)
        }
        Value::Object(entries) => {
            let mut dictionary = plist::Dictionary::new();
            for (key, item) in entries {
                dictionary.insert(key.clone(), json_to_plist(item)?);
            }
            plist::Value::Dictionary(dictionary)
        }
    })
}

/// Trailing `defaults write` arguments that encode `value`.
fn write_args(value: &Value) -> Result<Vec<String>> {
    Ok(match value {
        Value::String(text) => vec!["-string".to_string(), text.clone()],
        Value::Bool(flag) => vec!["-bool".to_string(), flag.to_string()],
        Value::Number(number) if number.is_i64() || number.is_u64() => {
            vec!["-int".to_string(), number.to_string()]
        }
        Value::Number(number) => vec!["-float".to_string(), number.to_string()],
        collection => vec![plist_fragment(collection)?],
    })
}

/// Render a value as an XML property-list fragment (no header, no root).
fn plist_fragment(value: &Value) -> Result<String> {
    let mut document = Vec::new();
    json_to_plist(value)?
        .to_writer_xml(&mut document)
        .context("render property list")?;
    let document = String::from_utf8(document).context("property list is not UTF-8")?;
    document
        .split_once("<plist version=\"1.0\">")
        .and_then(|(_, rest)| rest.rsplit_once("</plist>"))
        .map(|(body, _)| body.trim().to_string())
        .ok_or_else(|| anyhow!("unexpected property-list document layout"))
}
