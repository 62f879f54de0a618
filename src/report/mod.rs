//! Report generation in text and JSON Lines formats
//!
//! CDD Principle: Anti-Corruption Layer - Formatters translate domain objects to external formats
//! - Report (domain) is converted to line-oriented text or one JSON object per line
//! - Output is a pure function of the report: no timestamps, durations or host details
//! - Domain logic remains pure while supporting multiple presentation needs

use crate::domain::violations::{GuardianError, GuardianResult, Report, Severity, Violation};
use serde_json::Value as JsonValue;
use std::io::Write;
use std::str::FromStr;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per violation plus a summary line
    Text,
    /// One JSON object per violation, then one summary object
    Json,
}

impl OutputFormat {
    pub fn all_formats() -> &'static [&'static str] {
        &["text", "json"]
    }
}

impl FromStr for OutputFormat {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(GuardianError::usage(format!(
                "Unknown format '{other}', expected one of: {}",
                Self::all_formats().join(", ")
            ))),
        }
    }
}

/// Options for customizing report output
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Whether to color severities (text format only)
    pub use_colors: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { use_colors: true }
    }
}

/// Renders finalized reports
pub struct ReportFormatter {
    options: ReportOptions,
}

impl ReportFormatter {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    /// Format a report in the specified format
    pub fn format_report(&self, report: &Report, format: OutputFormat) -> GuardianResult<String> {
        match format {
            OutputFormat::Text => Ok(self.format_text(report)),
            OutputFormat::Json => self.format_json(report),
        }
    }

    /// Write a formatted report to a writer
    pub fn write_report<W: Write>(
        &self,
        report: &Report,
        format: OutputFormat,
        mut writer: W,
    ) -> GuardianResult<()> {
        let formatted = self.format_report(report, format)?;
        writer.write_all(formatted.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn format_text(&self, report: &Report) -> String {
        let mut output = String::new();
        for violation in report.violations() {
            output.push_str(&self.text_line(violation));
            output.push('\n');
        }
        output.push_str(&self.format_summary(report));
        output.push('\n');
        output
    }

    fn text_line(&self, violation: &Violation) -> String {
        let line = violation.format_display();
        if !self.options.use_colors {
            return line;
        }
        let tag = format!("[{}]", violation.severity.as_str());
        line.replacen(&tag, &paint(&tag, violation.severity), 1)
    }

    fn format_json(&self, report: &Report) -> GuardianResult<String> {
        let mut output = String::new();
        for violation in report.violations() {
            let record = serde_json::json!({
                "type": "violation",
                "rule_id": violation.rule_id,
                "severity": violation.severity.as_str(),
                "modules": violation.modules,
                "file_path": violation.file_path.as_ref().map(|p| p.display().to_string()),
                "line_number": violation.line_number,
                "message": violation.message,
                "detail": violation.detail,
                "suggested_fix": violation.suggested_fix,
            });
            output.push_str(&to_line(&record)?);
        }

        let summary = &report.summary;
        let record = serde_json::json!({
            "type": "summary",
            "modules": summary.modules,
            "internal_edges": summary.internal_edges,
            "external_edges": summary.external_edges,
            "violations_by_severity": {
                "error": summary.violations_by_severity.error,
                "warning": summary.violations_by_severity.warning,
            },
            "violations_by_rule": summary.violations_by_rule,
            "passed": summary.passed,
            "config_fingerprint": report.config_fingerprint,
        });
        output.push_str(&to_line(&record)?);
        Ok(output)
    }

    /// Single summary line, e.g. `Summary: 12 modules, 9 edges (4 external); 1 error, 2 warnings; FAILED`
    fn format_summary(&self, report: &Report) -> String {
        let summary = &report.summary;
        let counts = &summary.violations_by_severity;

        let violations = if counts.total() == 0 {
            "0 violations".to_string()
        } else {
            format!(
                "{} error{}, {} warning{}",
                counts.error,
                if counts.error == 1 { "" } else { "s" },
                counts.warning,
                if counts.warning == 1 { "" } else { "s" }
            )
        };

        let outcome = if summary.passed { "PASSED" } else { "FAILED" };
        let outcome = if self.options.use_colors {
            paint_outcome(outcome, summary.passed)
        } else {
            outcome.to_string()
        };

        format!(
            "Summary: {} modules, {} edges ({} external); {}; {}",
            summary.modules, summary.internal_edges, summary.external_edges, violations, outcome
        )
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new(ReportOptions::default())
    }
}

fn to_line(value: &JsonValue) -> GuardianResult<String> {
    let mut line = serde_json::to_string(value)
        .map_err(|e| GuardianError::internal("report", format!("JSON serialization failed: {e}")))?;
    line.push('\n');
    Ok(line)
}

#[cfg(feature = "colors")]
fn paint(text: &str, severity: Severity) -> String {
    use colored::Colorize;
    match severity {
        Severity::Error => text.red().bold().to_string(),
        Severity::Warning => text.yellow().to_string(),
    }
}

#[cfg(feature = "colors")]
fn paint_outcome(text: &str, passed: bool) -> String {
    use colored::Colorize;
    if passed {
        text.green().bold().to_string()
    } else {
        text.red().bold().to_string()
    }
}

#[cfg(not(feature = "colors"))]
fn paint(text: &str, _severity: Severity) -> String {
    text.to_string()
}

#[cfg(not(feature = "colors"))]
fn paint_outcome(text: &str, _passed: bool) -> String {
    text.to_string()
}
