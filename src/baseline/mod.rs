//! Violation baselines for incremental adoption
//!
//! CDD Principle: Infrastructure Layer - The baseline stores fingerprints from a prior run
//! - A baseline never changes a report; it only classifies violations as new or known
//! - Fingerprints ignore file lines so unrelated edits do not churn the baseline
//! - The file is plain JSON with sorted entries for reviewable diffs

use crate::domain::violations::{GuardianError, GuardianResult, Report, Violation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const BASELINE_VERSION: u32 = 1;

/// Fingerprints of accepted violations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Baseline format version
    version: u32,
    /// Configuration fingerprint of the run that wrote the baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config_fingerprint: Option<String>,
    fingerprints: BTreeSet<String>,
}

/// Report violations split against a baseline
#[derive(Debug, Default)]
pub struct BaselineDiff<'r> {
    /// Violations not present in the baseline
    pub new: Vec<&'r Violation>,
    /// Violations already present in the baseline
    pub known: Vec<&'r Violation>,
    /// Baseline fingerprints no longer reported
    pub resolved: Vec<String>,
}

impl Baseline {
    /// Capture every violation of a report
    pub fn from_report(report: &Report) -> Self {
        Self {
            version: BASELINE_VERSION,
            config_fingerprint: report.config_fingerprint.clone(),
            fingerprints: report.violations().iter().map(Violation::fingerprint).collect(),
        }
    }

    /// Load a baseline file
    pub fn load<P: AsRef<Path>>(path: P) -> GuardianResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            GuardianError::baseline(format!("Failed to read baseline {}: {e}", path.display()))
        })?;

        let baseline: Self = serde_json::from_str(&content).map_err(|e| {
            GuardianError::baseline(format!("Failed to parse baseline {}: {e}", path.display()))
        })?;

        if baseline.version != BASELINE_VERSION {
            return Err(GuardianError::baseline(format!(
                "Unsupported baseline version {} in {}",
                baseline.version,
                path.display()
            )));
        }

        tracing::debug!("Loaded {} baseline fingerprints", baseline.fingerprints.len());
        Ok(baseline)
    }

    /// Write the baseline, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> GuardianResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut content = serde_json::to_string_pretty(self)
            .map_err(|e| GuardianError::baseline(format!("Failed to serialize baseline: {e}")))?;
        content.push('\n');
        fs::write(path, content)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn contains(&self, violation: &Violation) -> bool {
        self.fingerprints.contains(&violation.fingerprint())
    }

    /// Whether the baseline was written under a different configuration
    pub fn is_stale_for(&self, report: &Report) -> bool {
        match (&self.config_fingerprint, &report.config_fingerprint) {
            (Some(ours), Some(theirs)) => ours != theirs,
            _ => false,
        }
    }

    /// Split a report's violations into new and known, and list resolved fingerprints
    pub fn diff<'r>(&self, report: &'r Report) -> BaselineDiff<'r> {
        let mut diff = BaselineDiff::default();
        let mut seen = BTreeSet::new();

        for violation in report.violations() {
            let fingerprint = violation.fingerprint();
            if self.fingerprints.contains(&fingerprint) {
                diff.known.push(violation);
            } else {
                diff.new.push(violation);
            }
            seen.insert(fingerprint);
        }

        diff.resolved = self.fingerprints.difference(&seen).cloned().collect();
        diff
    }
}
