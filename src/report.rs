//! Decision log for a reconcile run.
//!
//! Each decision is printed as soon as it is made so the log stays ordered
//! even when a later step fails; the collected report can also be emitted as
//! JSON once the run completes.
use crate::safari::SafariTarget;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Value differed and was (or would be) written.
    Changed,
    /// Value already matched; nothing written.
    Unchanged,
    /// Key absent and absence is acceptable; nothing written.
    AbsentAccepted,
    /// Precondition checked; nothing written.
    Checked,
    /// Step not performed.
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct Decision {
    pub domain: String,
    pub key: String,
    pub outcome: Outcome,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub dry_run: bool,
    pub decisions: Vec<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safari_target: Option<SafariTarget>,
    pub writes: usize,
    pub verified: usize,
}

impl Report {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Print the decision line and keep it for the summary.
    pub fn record(&mut self, domain: &str, key: &str, outcome: Outcome, message: String) {
        println!("{message}");
        self.decisions.push(Decision {
            domain: domain.to_string(),
            key: key.to_string(),
            outcome,
            message,
        });
    }

    pub fn changed(&self) -> usize {
        self.decisions
            .iter()
            .filter(|decision| decision.outcome == Outcome::Changed)
            .count()
    }

    #[cfg(test)]
    pub fn outcomes_for(&self, key: &str) -> Vec<Outcome> {
        self.decisions
            .iter()
            .filter(|decision| decision.key == key)
            .map(|decision| decision.outcome)
            .collect()
    }
}
