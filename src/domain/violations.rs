//! Core domain models for conformance violations and run reports
//!
//! Architecture: Rich Domain Models - Violations are write-once entities, the report is the aggregate
//! - Violations carry the rule that produced them and every module they implicate
//! - Report owns its violations append-only and derives counts and the pass/fail outcome
//! - Ordering is total so repeated runs over the same input render identically

use crate::domain::model::ModuleId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Severity levels for conformance violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported, does not fail the run unless a warning threshold is exceeded
    Warning,
    /// Fails the run under the default threshold
    Error,
}

impl Severity {
    /// Whether this severity level should cause validation to fail
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Convert to string for display
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A conformance violation detected during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Identifier of the rule that detected this violation
    pub rule_id: String,
    /// Severity level of this violation
    pub severity: Severity,
    /// Offending modules; the first one is the primary location
    pub modules: Vec<ModuleId>,
    /// Source file of the primary module, relative to the audited root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Line number (1-indexed) of the offending declaration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    /// Human-readable description of the violation
    pub message: String,
    /// Ordered detail such as the modules on a cycle
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<String>,
    /// Suggested fix for the violation (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl Violation {
    /// Create a new violation against a single module
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        module: ModuleId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            modules: vec![module],
            file_path: None,
            line_number: None,
            message: message.into(),
            detail: Vec::new(),
            suggested_fix: None,
        }
    }

    /// Add another implicated module (e.g. the target of a forbidden edge)
    pub fn with_module(mut self, module: ModuleId) -> Self {
        self.modules.push(module);
        self
    }

    /// Set the source file and optional line
    pub fn with_location(mut self, file_path: impl Into<PathBuf>, line: Option<u32>) -> Self {
        self.file_path = Some(file_path.into());
        self.line_number = line;
        self
    }

    /// Attach ordered detail entries
    pub fn with_detail(mut self, detail: Vec<String>) -> Self {
        self.detail = detail;
        self
    }

    /// Add a suggested fix
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_fix = Some(suggestion.into());
        self
    }

    /// Whether this violation is blocking
    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }

    /// The module used as the sort key and display location
    pub fn primary_module(&self) -> &str {
        self.modules.first().map(|m| m.as_str()).unwrap_or("")
    }

    /// Format violation as a single display line
    pub fn format_display(&self) -> String {
        let location = match (&self.file_path, self.line_number) {
            (Some(path), Some(line)) => format!(" ({}:{line})", path.display()),
            (Some(path), None) => format!(" ({})", path.display()),
            _ => String::new(),
        };

        let detail = if self.detail.is_empty() {
            String::new()
        } else {
            format!(" [{}]", self.detail.join(" -> "))
        };

        format!(
            "{} [{}] {}: {}{}{}",
            self.primary_module(),
            self.severity.as_str(),
            self.rule_id,
            self.message,
            detail,
            location
        )
    }

    /// Stable content fingerprint, used to diff reports across runs
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.rule_id.as_bytes());
        for module in &self.modules {
            hasher.update([0u8]);
            hasher.update(module.as_str().as_bytes());
        }
        hasher.update([1u8]);
        hasher.update(self.message.as_bytes());
        for entry in &self.detail {
            hasher.update([2u8]);
            hasher.update(entry.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Total report order: module path, rule id, severity, then the remaining fields
    pub fn report_order(&self, other: &Self) -> Ordering {
        self.primary_module()
            .cmp(other.primary_module())
            .then_with(|| self.rule_id.cmp(&other.rule_id))
            .then_with(|| other.severity.cmp(&self.severity))
            .then_with(|| self.modules.cmp(&other.modules))
            .then_with(|| self.line_number.cmp(&other.line_number))
            .then_with(|| self.message.cmp(&other.message))
            .then_with(|| self.detail.cmp(&other.detail))
    }
}

/// Count of violations by severity level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationCounts {
    pub error: usize,
    pub warning: usize,
}

impl ViolationCounts {
    /// Total number of violations across all severities
    pub fn total(&self) -> usize {
        self.error + self.warning
    }

    /// Whether there are any blocking violations
    pub fn has_blocking(&self) -> bool {
        self.error > 0
    }

    /// Add a violation to the counts
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error += 1,
            Severity::Warning => self.warning += 1,
        }
    }
}

/// When a finished report counts as failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Fail once the warning count exceeds this value
    pub warning_threshold: Option<usize>,
}

impl FailurePolicy {
    /// Fail on any warning as well as any error
    pub fn strict() -> Self {
        Self { warning_threshold: Some(0) }
    }

    /// Whether the given counts pass under this policy
    pub fn passes(&self, counts: &ViolationCounts) -> bool {
        if counts.has_blocking() {
            return false;
        }
        match self.warning_threshold {
            Some(threshold) => counts.warning <= threshold,
            None => true,
        }
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Number of modules in the graph
    pub modules: usize,
    /// Number of internal edges
    pub internal_edges: usize,
    /// Number of imports that resolved outside the root
    pub external_edges: usize,
    /// Number of violations by severity level
    pub violations_by_severity: ViolationCounts,
    /// Number of violations by rule id
    pub violations_by_rule: BTreeMap<String, usize>,
    /// Outcome under the failure policy
    pub passed: bool,
}

/// Complete report of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    violations: Vec<Violation>,
    /// Summary statistics
    pub summary: ReportSummary,
    /// Fingerprint of the configuration used for this run
    pub config_fingerprint: Option<String>,
}

impl Report {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            violations: Vec::new(),
            summary: ReportSummary { passed: true, ..Default::default() },
            config_fingerprint: None,
        }
    }

    /// Append a violation; violations are never removed once added
    pub fn add_violation(&mut self, violation: Violation) {
        self.summary.violations_by_severity.add(violation.severity);
        *self.summary.violations_by_rule.entry(violation.rule_id.clone()).or_default() += 1;
        self.violations.push(violation);
    }

    /// Append every violation from an iterator
    pub fn extend<I: IntoIterator<Item = Violation>>(&mut self, violations: I) {
        for violation in violations {
            self.add_violation(violation);
        }
    }

    /// All violations in report order (once finalized)
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Whether the report contains any violations
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Whether the report contains blocking violations
    pub fn has_errors(&self) -> bool {
        self.summary.violations_by_severity.has_blocking()
    }

    /// Whether the run passed
    pub fn passed(&self) -> bool {
        self.summary.passed
    }

    /// Get violations of a specific severity
    pub fn violations_by_severity(&self, severity: Severity) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.severity == severity)
    }

    /// Get violations produced by a specific rule
    pub fn violations_for_rule<'a>(&'a self, rule_id: &'a str) -> impl Iterator<Item = &'a Violation> {
        self.violations.iter().filter(move |v| v.rule_id == rule_id)
    }

    /// Record graph size statistics
    pub fn set_graph_stats(&mut self, modules: usize, internal_edges: usize, external_edges: usize) {
        self.summary.modules = modules;
        self.summary.internal_edges = internal_edges;
        self.summary.external_edges = external_edges;
    }

    /// Set the configuration fingerprint
    pub fn set_config_fingerprint(&mut self, fingerprint: impl Into<String>) {
        self.config_fingerprint = Some(fingerprint.into());
    }

    /// Sort violations deterministically and compute the outcome
    pub fn finalize(&mut self, policy: &FailurePolicy) {
        self.violations.sort_by(|a, b| a.report_order(b));
        self.summary.passed = policy.passes(&self.summary.violations_by_severity);
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

/// Error types that can abort a run
#[derive(Debug, thiserror::Error)]
pub enum GuardianError {
    /// Configuration file could not be loaded, parsed or validated
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Command line usage problem, such as a missing root
    #[error("Usage error: {message}")]
    Usage { message: String },

    /// File could not be read or written
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Pattern compilation failed
    #[error("Pattern error: {message}")]
    Pattern { message: String },

    /// Baseline file could not be read or written
    #[error("Baseline error: {message}")]
    Baseline { message: String },

    /// An internal invariant failed; the run is abandoned
    #[error("Internal failure during {stage}: {message}")]
    Internal { stage: String, message: String },

    /// The run was cancelled before it completed
    #[error("Run cancelled")]
    Cancelled,
}

impl GuardianError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage { message: message.into() }
    }

    /// Create a pattern error
    pub fn pattern(message: impl Into<String>) -> Self {
        Self::Pattern { message: message.into() }
    }

    /// Create a baseline error
    pub fn baseline(message: impl Into<String>) -> Self {
        Self::Baseline { message: message.into() }
    }

    /// Create an internal failure for the named stage
    pub fn internal(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal { stage: stage.into(), message: message.into() }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. }
            | Self::Usage { .. }
            | Self::Pattern { .. }
            | Self::Baseline { .. } => 2,
            Self::Io { .. } | Self::Internal { .. } => 3,
            Self::Cancelled => 130,
        }
    }
}

/// Result type for Guardian operations
pub type GuardianResult<T> = Result<T, GuardianError>;
