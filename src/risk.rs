//! Download-risk categories and extension membership planning.
//!
//! Planning is pure: it maps the four current category records to four new
//! records plus the change made to each, and never touches a store. Writing
//! the plan back is the reconciler's job.
use crate::prefs::value_kind;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Preference domain holding the risk category records.
pub const DOWNLOAD_ASSESSMENT_DOMAIN: &str = "com.apple.DownloadAssessment";
/// Key of the extension list inside each category record.
pub const EXTENSIONS_KEY: &str = "LSRiskCategoryExtensions";

/// Classification deciding whether a downloaded file triggers a warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    #[serde(alias = "LSRiskCategorySafe")]
    Safe,
    #[serde(alias = "LSRiskCategoryNeutral")]
    Neutral,
    #[serde(alias = "LSRiskCategoryUnsafeExecutable")]
    UnsafeExecutable,
    #[serde(alias = "LSRiskCategoryMayContainUnsafeExecutable")]
    MayContainUnsafeExecutable,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Safe,
        RiskCategory::Neutral,
        RiskCategory::UnsafeExecutable,
        RiskCategory::MayContainUnsafeExecutable,
    ];

    /// Preference key the category is stored under.
    pub fn key(self) -> &'static str {
        match self {
            RiskCategory::Safe => "LSRiskCategorySafe",
            RiskCategory::Neutral => "LSRiskCategoryNeutral",
            RiskCategory::UnsafeExecutable => "LSRiskCategoryUnsafeExecutable",
            RiskCategory::MayContainUnsafeExecutable => "LSRiskCategoryMayContainUnsafeExecutable",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What planning did to one category's extension list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionChange {
    Added,
    AlreadyPresent,
    Removed,
    Unchanged,
}

impl ExtensionChange {
    pub fn is_change(self) -> bool {
        matches!(self, ExtensionChange::Added | ExtensionChange::Removed)
    }
}

/// Desired record for one category.
#[derive(Clone, Debug, PartialEq)]
pub struct CategoryPlan {
    pub category: RiskCategory,
    pub record: Value,
    pub change: ExtensionChange,
}

/// Plan extension membership across all four categories.
///
/// `current` yields the stored record for a category, `None` when absent.
/// The extension ends up in `target` exactly once and in no other category.
pub fn plan_download_assessment<F>(
    mut current: F,
    extension: &str,
    target: RiskCategory,
) -> Result<Vec<CategoryPlan>>
where
    F: FnMut(RiskCategory) -> Result<Option<Value>>,
{
    let mut plans = Vec::with_capacity(RiskCategory::ALL.len());
    for category in RiskCategory::ALL {
        let stored = current(category)?;
        let (mut record, mut extensions) = normalize_record(category, stored)?;
        let present = extensions.iter().any(|item| is_extension(item, extension));
        let change = if category == target {
            if present {
                ExtensionChange::AlreadyPresent
            } else {
                extensions.push(Value::String(extension.to_string()));
                ExtensionChange::Added
            }
        } else if present {
            extensions.retain(|item| !is_extension(item, extension));
            ExtensionChange::Removed
        } else {
            ExtensionChange::Unchanged
        };
        record.insert(EXTENSIONS_KEY.to_string(), Value::Array(extensions));
        plans.push(CategoryPlan {
            category,
            record: Value::Object(record),
            change,
        });
    }
    Ok(plans)
}

/// Extension list stored in a category record, if any.
#[cfg(test)]
pub fn record_extensions(record: &Value) -> Vec<&str> {
    record
        .get(EXTENSIONS_KEY)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn normalize_record(
    category: RiskCategory,
    stored: Option<Value>,
) -> Result<(Map<String, Value>, Vec<Value>)> {
    let mut record = match stored {
        None => Map::new(),
        Some(Value::Object(record)) => record,
        Some(other) => {
            return Err(anyhow!(
                "{category} in {DOWNLOAD_ASSESSMENT_DOMAIN} is a {}, expected a dictionary",
                value_kind(&other)
            ))
        }
    };
    let extensions = match record.remove(EXTENSIONS_KEY) {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(anyhow!(
                "{EXTENSIONS_KEY} of {category} is a {}, expected an array",
                value_kind(&other)
            ))
        }
    };
    Ok((record, extensions))
}

fn is_extension(item: &Value, extension: &str) -> bool {
    item.as_str() == Some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn plan_with(
        stored: BTreeMap<RiskCategory, Value>,
        extension: &str,
        target: RiskCategory,
    ) -> Vec<CategoryPlan> {
        plan_download_assessment(
            |category| Ok(stored.get(&category).cloned()),
            extension,
            target,
        )
        .expect("plan categories")
    }

    fn plan_for(plans: &[CategoryPlan], category: RiskCategory) -> &CategoryPlan {
        plans
            .iter()
            .find(|plan| plan.category == category)
            .expect("category planned")
    }

    #[test]
    fn absent_categories_become_empty_records() {
        let plans = plan_with(BTreeMap::new(), "ica", RiskCategory::Safe);

        assert_eq!(plans.len(), 4);
        let safe = plan_for(&plans, RiskCategory::Safe);
        assert_eq!(safe.change, ExtensionChange::Added);
        assert_eq!(safe.record, json!({ "LSRiskCategoryExtensions": ["ica"] }));
        let neutral = plan_for(&plans, RiskCategory::Neutral);
        assert_eq!(neutral.change, ExtensionChange::Unchanged);
        assert_eq!(neutral.record, json!({ "LSRiskCategoryExtensions": [] }));
    }

    #[test]
    fn extension_moves_out_of_other_categories() {
        let stored = BTreeMap::from([
            (
                RiskCategory::Neutral,
                json!({ "LSRiskCategoryExtensions": ["zip", "ica"] }),
            ),
            (
                RiskCategory::UnsafeExecutable,
                json!({ "LSRiskCategoryExtensions": ["ica", "ica"] }),
            ),
        ]);
        let plans = plan_with(stored, "ica", RiskCategory::Safe);

        assert_eq!(
            plan_for(&plans, RiskCategory::Neutral).record,
            json!({ "LSRiskCategoryExtensions": ["zip"] })
        );
        assert_eq!(
            plan_for(&plans, RiskCategory::Neutral).change,
            ExtensionChange::Removed
        );
        assert!(record_extensions(&plan_for(&plans, RiskCategory::UnsafeExecutable).record)
            .is_empty());
        for plan in &plans {
            let count = record_extensions(&plan.record)
                .iter()
                .filter(|ext| **ext == "ica")
                .count();
            let expected = usize::from(plan.category == RiskCategory::Safe);
            assert_eq!(count, expected, "{}", plan.category);
        }
    }

    #[test]
    fn existing_membership_and_extra_keys_are_preserved() {
        let stored = BTreeMap::from([(
            RiskCategory::Safe,
            json!({ "LSRiskCategoryExtensions": ["pdf", "ica"], "Note": "kept" }),
        )]);
        let plans = plan_with(stored, "ica", RiskCategory::Safe);

        let safe = plan_for(&plans, RiskCategory::Safe);
        assert_eq!(safe.change, ExtensionChange::AlreadyPresent);
        assert_eq!(
            safe.record,
            json!({ "LSRiskCategoryExtensions": ["pdf", "ica"], "Note": "kept" })
        );
    }

    #[test]
    fn planning_is_idempotent() {
        let first = plan_with(BTreeMap::new(), "zip", RiskCategory::Neutral);
        let stored: BTreeMap<_, _> = first
            .iter()
            .map(|plan| (plan.category, plan.record.clone()))
            .collect();
        let second = plan_with(stored, "zip", RiskCategory::Neutral);

        for (before, after) in first.iter().zip(&second) {
            assert_eq!(before.record, after.record);
            assert!(!after.change.is_change());
        }
    }

    #[test]
    fn malformed_records_are_rejected() {
        let stored = BTreeMap::from([(RiskCategory::Neutral, json!(["ica"]))]);
        let err = plan_download_assessment(
            |category| Ok(stored.get(&category).cloned()),
            "ica",
            RiskCategory::Safe,
        )
        .expect_err("array record should fail");
        assert!(err.to_string().contains("expected a dictionary"));

        let stored = BTreeMap::from([(
            RiskCategory::Safe,
            json!({ "LSRiskCategoryExtensions": "ica" }),
        )]);
        let err = plan_download_assessment(
            |category| Ok(stored.get(&category).cloned()),
            "ica",
            RiskCategory::Safe,
        )
        .expect_err("string extension list should fail");
        assert!(err.to_string().contains("expected an array"));
    }

    #[test]
    fn categories_parse_from_short_and_preference_names() {
        let short: RiskCategory = serde_json::from_str("\"unsafe_executable\"").expect("short");
        let long: RiskCategory =
            serde_json::from_str("\"LSRiskCategoryUnsafeExecutable\"").expect("long");
        assert_eq!(short, RiskCategory::UnsafeExecutable);
        assert_eq!(long, short);
    }
}
