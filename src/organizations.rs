//! Organization list input
//!
//! The run is driven by a single `YYYY-MM-bills.csv` file in the working
//! directory. Its name fixes the billing period; its rows (filtered to
//! usage-based subscriptions) fix which organizations are processed, in
//! file order.

use crate::period::{is_bills_filename, BillingPeriod, BILLS_FILE_SUFFIX};
use crate::{BillsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Subscription type whose organizations receive a usage bill
pub const USAGE_BASED: &str = "usage_based";

/// One organization to fetch a bill for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationRecord {
    pub id: String,
    pub display_name: String,
}

impl OrganizationRecord {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Raw CSV row; unknown columns are ignored and missing ones read as empty
#[derive(Debug, Deserialize)]
struct OrganizationRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    subscription_type: String,
}

/// Find the one `YYYY-MM-bills.csv` in `workdir`
///
/// Zero or several candidates is a configuration error.
pub fn discover_bills_csv(workdir: &Path) -> Result<(PathBuf, BillingPeriod)> {
    let dir = workdir.to_str().ok_or_else(|| {
        BillsError::Config(format!(
            "Working directory is not valid UTF-8: {}",
            workdir.display()
        ))
    })?;
    let pattern = format!("{}/*{}", glob::Pattern::escape(dir), BILLS_FILE_SUFFIX);

    let mut candidates: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| BillsError::Other(format!("Invalid glob pattern {}: {}", pattern, e)))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(is_bills_filename)
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    match candidates.len() {
        1 => {
            let path = candidates.remove(0);
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let period = BillingPeriod::from_bills_filename(&name)?;
            tracing::info!(file = %path.display(), %period, "Found organization list");
            Ok((path, period))
        }
        0 => Err(BillsError::Config(format!(
            "No YYYY-MM{} file in {}. Place exactly one organization list there.",
            BILLS_FILE_SUFFIX,
            workdir.display()
        ))),
        n => Err(BillsError::Config(format!(
            "Found {} YYYY-MM{} files in {} ({}). Keep exactly one.",
            n,
            BILLS_FILE_SUFFIX,
            workdir.display(),
            candidates
                .iter()
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Read usage-based organizations from the CSV at `path`, in file order
pub fn load_organizations(path: &Path) -> Result<Vec<OrganizationRecord>> {
    let content = fs::read_to_string(path)?;
    let orgs = parse_organizations(&content)?;

    if orgs.is_empty() {
        return Err(BillsError::Config(format!(
            "{} has no {} rows with both `id` and `name`",
            path.display(),
            USAGE_BASED
        )));
    }

    tracing::info!(count = orgs.len(), "Loaded organizations");
    Ok(orgs)
}

/// Parse CSV text into organization records
///
/// A leading byte-order mark is ignored. Rows are kept when
/// `subscription_type` is `usage_based` and both `id` and `name` are
/// non-empty after trimming. Repeated ids keep their first row.
pub fn parse_organizations(content: &str) -> Result<Vec<OrganizationRecord>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut seen = HashSet::new();
    let mut orgs = Vec::new();

    for row in reader.deserialize::<OrganizationRow>() {
        let row = row?;
        if row.subscription_type.trim() != USAGE_BASED {
            continue;
        }

        let id = row.id.trim();
        let name = row.name.trim();
        if id.is_empty() || name.is_empty() {
            tracing::debug!(id, name, "Skipping row with empty id or name");
            continue;
        }

        if !seen.insert(id.to_string()) {
            tracing::warn!(org_id = id, "Duplicate organization id, keeping the first row");
            continue;
        }

        orgs.push(OrganizationRecord::new(id, name));
    }

    Ok(orgs)
}
