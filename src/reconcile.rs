//! Preference reconciliation.
//!
//! Every step is a synchronous read, decide, write, synchronize cycle against
//! the injected store. Nothing is retried and earlier writes are not rolled
//! back when a later step fails.
use crate::config::ReconcileConfig;
use crate::prefs::{describe_value, PreferenceStore};
use crate::report::{Outcome, Report};
use crate::risk::{
    plan_download_assessment, ExtensionChange, RiskCategory, DOWNLOAD_ASSESSMENT_DOMAIN,
};
use crate::safari::{resolve_safari_target, SafariTarget};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::Path;

pub const CITRIX_DOMAIN: &str = "com.citrix.receiver.nomas";
pub const CITRIX_AUTO_UPDATE_KEY: &str = "AutoUpdateState";
pub const SAFARI_SAFE_DOWNLOADS_KEY: &str = "AutoOpenSafeDownloads";

#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    /// Decide and report only; never write or synchronize.
    pub dry_run: bool,
    /// Re-read every written value after synchronizing.
    pub verify: bool,
}

/// A single typed value to converge.
pub struct ScalarSpec<'a> {
    pub key: &'a str,
    pub domain: &'a str,
    pub wording: Wording<'a>,
    pub desired: Value,
    /// Absent key already means `desired`.
    pub absent_is_ok: bool,
}

/// Phrasing of the decision lines for one scalar.
pub enum Wording<'a> {
    /// `<label> <key> set to <value>`.
    Setting { label: &'a str },
    /// Safari's "Open safe Downloads" lines, naming the plist path.
    SafeDownloads { plist_path: &'a str },
}

impl Wording<'_> {
    fn absent(&self, key: &str, desired: &Value) -> String {
        match self {
            Wording::Setting { label } => format!(
                "{label} key {key} is not present - it defaults to {} so that's OK",
                describe_value(desired)
            ),
            Wording::SafeDownloads { plist_path } => format!(
                "Open safe Downloads for Safari prefs key {key} key is not present in {plist_path} - it defaults to {} so that's OK",
                title_bool(desired)
            ),
        }
    }

    fn unchanged(&self, key: &str, desired: &Value) -> String {
        match self {
            Wording::Setting { label } => {
                format!("{label} {key} already set to {}", describe_value(desired))
            }
            Wording::SafeDownloads { plist_path } => format!(
                "Open safe Downloads for Safari already {} in {plist_path}",
                enabled_word(desired)
            ),
        }
    }

    fn changed(&self, key: &str, desired: &Value) -> String {
        match self {
            Wording::Setting { label } => {
                format!("{label} {key} set to {}", describe_value(desired))
            }
            Wording::SafeDownloads { plist_path } => format!(
                "Open safe Downloads is now set to {} for Safari in {plist_path}",
                title_bool(desired)
            ),
        }
    }

    fn would_change(&self, key: &str, desired: &Value, was: &str) -> String {
        match self {
            Wording::Setting { label } => format!(
                "{label} {key} would be set to {} (currently {was})",
                describe_value(desired)
            ),
            Wording::SafeDownloads { plist_path } => format!(
                "Open safe Downloads is not {} in {plist_path} - apply would set it to {}",
                enabled_word(desired),
                title_bool(desired)
            ),
        }
    }
}

fn title_bool(value: &Value) -> String {
    match value {
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => describe_value(other),
    }
}

fn enabled_word(value: &Value) -> &'static str {
    if *value == Value::Bool(false) {
        "disabled"
    } else {
        "enabled"
    }
}

pub struct Reconciler<S> {
    store: S,
    options: RunOptions,
    report: Report,
}

impl<S: PreferenceStore> Reconciler<S> {
    pub fn new(store: S, options: RunOptions) -> Self {
        Self {
            store,
            options,
            report: Report::new(options.dry_run),
        }
    }

    pub fn into_report(self) -> Report {
        self.report
    }

    /// Ensure `extension` is listed in `target` and in no other category.
    ///
    /// All four records are written back, changed or not, and the domain is
    /// synchronized once at the end.
    pub fn reconcile_download_risk_category(
        &mut self,
        extension: &str,
        target: RiskCategory,
    ) -> Result<()> {
        let store = &self.store;
        let plans = plan_download_assessment(
            |category| {
                store
                    .copy_value(category.key(), DOWNLOAD_ASSESSMENT_DOMAIN)
                    .with_context(|| {
                        format!("read {category} from {DOWNLOAD_ASSESSMENT_DOMAIN}")
                    })
            },
            extension,
            target,
        )?;

        let dry_run = self.options.dry_run;
        for plan in &plans {
            let category = plan.category;
            let message = match (plan.change, dry_run) {
                (ExtensionChange::Added, false) => Some(format!(
                    "Adding extension \"{extension}\" to risk category array \"{category}\" of {DOWNLOAD_ASSESSMENT_DOMAIN}"
                )),
                (ExtensionChange::Added, true) => Some(format!(
                    "Would add extension \"{extension}\" to risk category array \"{category}\" of {DOWNLOAD_ASSESSMENT_DOMAIN}"
                )),
                (ExtensionChange::Removed, false) => Some(format!(
                    "Removing extension \"{extension}\" from risk category array \"{category}\" of {DOWNLOAD_ASSESSMENT_DOMAIN}"
                )),
                (ExtensionChange::Removed, true) => Some(format!(
                    "Would remove extension \"{extension}\" from risk category array \"{category}\" of {DOWNLOAD_ASSESSMENT_DOMAIN}"
                )),
                (ExtensionChange::AlreadyPresent, _) => Some(format!(
                    "extension \"{extension}\" is already present in risk category array \"{category}\" of {DOWNLOAD_ASSESSMENT_DOMAIN}"
                )),
                (ExtensionChange::Unchanged, _) => None,
            };
            if let Some(message) = message {
                let outcome = if plan.change.is_change() {
                    Outcome::Changed
                } else {
                    Outcome::Unchanged
                };
                self.report
                    .record(DOWNLOAD_ASSESSMENT_DOMAIN, category.key(), outcome, message);
            }
            if !dry_run {
                self.write(category.key(), DOWNLOAD_ASSESSMENT_DOMAIN, &plan.record)?;
            }
        }

        if dry_run {
            return Ok(());
        }
        self.synchronize(DOWNLOAD_ASSESSMENT_DOMAIN)?;
        for plan in &plans {
            self.verify(plan.category.key(), DOWNLOAD_ASSESSMENT_DOMAIN, &plan.record)?;
        }
        Ok(())
    }

    /// Converge one scalar to `spec.desired`.
    pub fn reconcile_scalar(&mut self, spec: &ScalarSpec<'_>) -> Result<Outcome> {
        let ScalarSpec {
            key,
            domain,
            ref wording,
            ref desired,
            absent_is_ok,
        } = *spec;
        let current = self
            .store
            .copy_value(key, domain)
            .with_context(|| format!("read {key} from {domain}"))?;

        let outcome = match current {
            None if absent_is_ok => {
                self.report.record(
                    domain,
                    key,
                    Outcome::AbsentAccepted,
                    wording.absent(key, desired),
                );
                Outcome::AbsentAccepted
            }
            Some(ref value) if value == desired => {
                self.report.record(
                    domain,
                    key,
                    Outcome::Unchanged,
                    wording.unchanged(key, desired),
                );
                Outcome::Unchanged
            }
            current => {
                let was = current
                    .as_ref()
                    .map(describe_value)
                    .unwrap_or_else(|| "absent".to_string());
                if self.options.dry_run {
                    self.report.record(
                        domain,
                        key,
                        Outcome::Changed,
                        wording.would_change(key, desired, &was),
                    );
                } else {
                    self.write(key, domain, desired)?;
                    self.synchronize(domain)?;
                    tracing::debug!(domain, key, was = %was, "replaced preference value");
                    self.report.record(
                        domain,
                        key,
                        Outcome::Changed,
                        wording.changed(key, desired),
                    );
                    self.verify(key, domain, desired)?;
                }
                Outcome::Changed
            }
        };
        Ok(outcome)
    }

    /// Resolve where Safari keeps its preferences and log the choice.
    pub fn resolve_safari(&mut self, home: &Path) -> SafariTarget {
        let target = resolve_safari_target(home);
        match &target {
            SafariTarget::Sandboxed { domain, plist_path } => {
                self.report.record(
                    domain,
                    SAFARI_SAFE_DOWNLOADS_KEY,
                    Outcome::Checked,
                    format!(
                        "Access OK to sandboxed Safari prefs at {}",
                        plist_path.display()
                    ),
                );
            }
            SafariTarget::Legacy { plist_path, .. } => {
                tracing::debug!(path = %plist_path.display(), "Safari is not sandboxed");
            }
            SafariTarget::InaccessibleSandboxed { .. } => {}
        }
        self.report.safari_target = Some(target.clone());
        target
    }

    /// Run every step of `config` in order.
    pub fn run(&mut self, config: &ReconcileConfig, home: &Path) -> Result<()> {
        for rule in &config.download_assessment {
            self.reconcile_download_risk_category(&rule.extension, rule.category)?;
        }

        if let Some(state) = config.citrix_auto_update_state.as_deref() {
            let label = format!("Citrix preference {CITRIX_DOMAIN}");
            self.reconcile_scalar(&ScalarSpec {
                key: CITRIX_AUTO_UPDATE_KEY,
                domain: CITRIX_DOMAIN,
                wording: Wording::Setting { label: &label },
                desired: Value::String(state.to_string()),
                absent_is_ok: false,
            })?;
        }

        let Some(open_safe) = config.safari_auto_open_safe_downloads else {
            return Ok(());
        };
        let target = self.resolve_safari(home);
        let Some(domain) = target.domain() else {
            let path = target.plist_path().display().to_string();
            if !self.options.dry_run {
                return Err(anyhow!(
                    "No access to sandboxed Safari prefs at {path} - bailing out"
                ));
            }
            self.report.record(
                &path,
                SAFARI_SAFE_DOWNLOADS_KEY,
                Outcome::Skipped,
                format!("No access to sandboxed Safari prefs at {path} - apply would bail out"),
            );
            return Ok(());
        };
        let plist_path = target.plist_path().display().to_string();
        self.reconcile_scalar(&ScalarSpec {
            key: SAFARI_SAFE_DOWNLOADS_KEY,
            domain,
            wording: Wording::SafeDownloads {
                plist_path: &plist_path,
            },
            desired: Value::Bool(open_safe),
            // Safari treats a missing key as enabled.
            absent_is_ok: open_safe,
        })?;
        Ok(())
    }

    fn write(&mut self, key: &str, domain: &str, value: &Value) -> Result<()> {
        self.store
            .set_value(key, domain, value)
            .with_context(|| format!("write {key} to {domain}"))?;
        self.report.writes += 1;
        Ok(())
    }

    fn synchronize(&mut self, domain: &str) -> Result<()> {
        self.store
            .synchronize(domain)
            .with_context(|| format!("synchronize {domain}"))
    }

    fn verify(&mut self, key: &str, domain: &str, expected: &Value) -> Result<()> {
        if !self.options.verify {
            return Ok(());
        }
        let stored = self
            .store
            .copy_value(key, domain)
            .with_context(|| format!("read back {key} from {domain}"))?;
        if stored.as_ref() != Some(expected) {
            let found = stored
                .as_ref()
                .map(describe_value)
                .unwrap_or_else(|| "nothing".to_string());
            return Err(anyhow!(
                "{key} in {domain} did not persist: wrote {}, read back {found}",
                describe_value(expected)
            ));
        }
        tracing::debug!(domain, key, "write verified");
        self.report.verified += 1;
        Ok(())
    }
}
