use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::CatalogError;
use crate::models::{TaskActivity, Timekeeper};

/// Expense code reserved for photocopying
pub const COPYING_CODE: &str = "E101";
pub const COPYING_DESCRIPTION: &str = "Copying";

/// UTBMS expense codes keyed by description
const EXPENSE_CODES: &[(&str, &str)] = &[
    ("Copying", "E101"),
    ("Outside printing", "E102"),
    ("Word processing", "E103"),
    ("Facsimile", "E104"),
    ("Telephone", "E105"),
    ("Online research", "E106"),
    ("Delivery services/messengers", "E107"),
    ("Postage", "E108"),
    ("Local travel", "E109"),
    ("Out-of-town travel", "E110"),
    ("Meals", "E111"),
    ("Court fees", "E112"),
    ("Subpoena fees", "E113"),
    ("Witness fees", "E114"),
    ("Deposition transcripts", "E115"),
    ("Trial transcripts", "E116"),
    ("Trial exhibits", "E117"),
    ("Litigation support vendors", "E118"),
    ("Experts", "E119"),
    ("Private investigators", "E120"),
    ("Arbitrators/mediators", "E121"),
    ("Local counsel", "E122"),
    ("Other professionals", "E123"),
    ("Other", "E124"),
];

/// An expense description and its code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpenseCategory {
    pub description: &'static str,
    pub code: &'static str,
}

/// The fixed expense catalog
pub struct ExpenseCatalog;

impl ExpenseCatalog {
    pub fn all() -> impl Iterator<Item = ExpenseCategory> {
        EXPENSE_CODES
            .iter()
            .map(|&(description, code)| ExpenseCategory { description, code })
    }

    /// Every category except the reserved Copying entry
    pub fn optional() -> Vec<ExpenseCategory> {
        Self::all().filter(|c| c.code != COPYING_CODE).collect()
    }

    pub fn code_for(description: &str) -> Option<&'static str> {
        EXPENSE_CODES
            .iter()
            .find(|(d, _)| d.eq_ignore_ascii_case(description))
            .map(|&(_, code)| code)
    }
}

/// Task codes favoured by the fee generator
pub fn default_major_task_codes() -> Vec<String> {
    ["L110", "L120", "L130", "L160", "L210", "L310"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Task catalog used when the caller does not supply one
pub fn default_tasks() -> Vec<TaskActivity> {
    [
        ("L110", "A101", "Plan and prepare strategy for fact investigation"),
        ("L110", "A102", "Research factual background regarding incident on 01/15/2024"),
        ("L120", "A104", "Review and analyze pleadings and prior correspondence"),
        ("L120", "A106", "Telephone conference with {NAME_PLACEHOLDER} regarding case status"),
        ("L130", "A105", "Communicate with co-counsel regarding expert retention"),
        ("L140", "A103", "Draft memorandum on document preservation obligations"),
        ("L160", "A107", "Communicate with opposing counsel regarding settlement"),
        ("L190", "A108", "Communicate with court clerk regarding scheduling"),
        ("L210", "A103", "Draft answer and affirmative defenses"),
        ("L230", "A104", "Review court order entered 03/02/2024"),
        ("L240", "A103", "Draft motion to dismiss"),
        ("L250", "A104", "Analyze opposing party's motion for summary judgment"),
        ("L310", "A103", "Draft written discovery requests"),
        ("L320", "A104", "Review document production from {NAME_PLACEHOLDER}"),
        ("L330", "A101", "Prepare for deposition of {NAME_PLACEHOLDER}"),
        ("L340", "A106", "Confer with client regarding expert discovery"),
        ("L350", "A108", "Communicate with vendor regarding e-discovery processing"),
        ("L390", "A104", "Review privilege log"),
        ("L410", "A102", "Research evidentiary issues for trial"),
        ("L430", "A101", "Prepare witness outline for trial"),
    ]
    .iter()
    .map(|&(task, activity, description)| TaskActivity {
        task_code: task.to_string(),
        activity_code: activity.to_string(),
        description: description.to_string(),
    })
    .collect()
}

/// Load a timekeeper list from a YAML or JSON file
pub fn load_timekeepers(path: impl AsRef<Path>) -> Result<Vec<Timekeeper>> {
    let path = path.as_ref();
    let timekeepers: Vec<Timekeeper> = read_records(path)?;
    validate_timekeepers(&timekeepers)
        .with_context(|| format!("Invalid timekeeper file: {}", path.display()))?;

    info!(path = %path.display(), count = timekeepers.len(), "Loaded timekeepers");

    Ok(timekeepers)
}

/// Load a task/activity catalog from a YAML or JSON file
pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<TaskActivity>> {
    let path = path.as_ref();
    let tasks: Vec<TaskActivity> = read_records(path)?;
    validate_tasks(&tasks).with_context(|| format!("Invalid task file: {}", path.display()))?;

    info!(path = %path.display(), count = tasks.len(), "Loaded task catalog");

    Ok(tasks)
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let records = match ext.as_str() {
        "json" => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?,
        "yml" | "yaml" => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?,
        other => return Err(CatalogError::UnsupportedFormat(other.to_string()).into()),
    };

    Ok(records)
}

pub fn validate_timekeepers(timekeepers: &[Timekeeper]) -> Result<(), CatalogError> {
    for (index, tk) in timekeepers.iter().enumerate() {
        let reason = if tk.name.trim().is_empty() {
            Some("timekeeper name is empty")
        } else if tk.id.trim().is_empty() {
            Some("timekeeper id is empty")
        } else if tk.classification.trim().is_empty() {
            Some("timekeeper classification is empty")
        } else if !tk.rate.is_finite() || tk.rate <= 0.0 {
            Some("rate must be a positive number")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(CatalogError::InvalidRecord {
                index,
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}

pub fn validate_tasks(tasks: &[TaskActivity]) -> Result<(), CatalogError> {
    for (index, task) in tasks.iter().enumerate() {
        if task.task_code.trim().is_empty() || task.activity_code.trim().is_empty() {
            return Err(CatalogError::InvalidRecord {
                index,
                reason: "task and activity codes are required".to_string(),
            });
        }
        if task.description.trim().is_empty() {
            return Err(CatalogError::InvalidRecord {
                index,
                reason: "description is empty".to_string(),
            });
        }
    }
    Ok(())
}
