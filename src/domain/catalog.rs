//! Catalog of every rule id the engine can report
//!
//! Architecture: Ubiquitous Language - Rule ids are stable, user-facing names
//! - Each entry carries its default severity and a short explanation for `explain`

use crate::domain::violations::Severity;

pub const LOADER_UNPARSED: &str = "loader.unparsed";
pub const LOADER_UNREADABLE: &str = "loader.unreadable";
pub const CLASSIFIER_UNCLASSIFIED: &str = "classifier.unclassified";
pub const CLASSIFIER_INVALID_OVERRIDE: &str = "classifier.invalid-override";
pub const DIRECTION_FORBIDDEN: &str = "direction.forbidden";
pub const DIRECTION_CONTRACT_BOUNDARY: &str = "direction.contract-boundary";
pub const DIRECTION_CYCLE: &str = "direction.cycle";
pub const LEAKAGE_FRAMEWORK_TYPE: &str = "leakage.framework-type";
pub const TAXONOMY_EXTERNAL_ERROR: &str = "taxonomy.external-error";
pub const RESILIENCE_MISSING_TIMEOUT: &str = "resilience.missing-timeout";
pub const RESILIENCE_MISSING_RETRY: &str = "resilience.missing-retry";
pub const RESILIENCE_MISSING_IDEMPOTENCY: &str = "resilience.missing-idempotency";

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleInfo {
    pub id: &'static str,
    pub severity: Severity,
    /// Component that reports the rule
    pub family: &'static str,
    pub summary: &'static str,
    pub explanation: &'static str,
}

pub const RULE_CATALOG: &[RuleInfo] = &[
    RuleInfo {
        id: LOADER_UNPARSED,
        severity: Severity::Warning,
        family: "loader",
        summary: "A source file could not be parsed",
        explanation: "The file has a syntax error or nests deeper than loader.max_nesting_depth. \
                      It is kept as an unparsed module with no imports or symbols, and its \
                      dependencies are invisible to every other check until it parses.",
    },
    RuleInfo {
        id: LOADER_UNREADABLE,
        severity: Severity::Warning,
        family: "loader",
        summary: "A source file could not be read in time or is too large",
        explanation: "Reading failed, the file exceeded loader.max_file_bytes, or reading and \
                      parsing exceeded loader.file_timeout_ms. The module is kept as unparsed.",
    },
    RuleInfo {
        id: CLASSIFIER_UNCLASSIFIED,
        severity: Severity::Warning,
        family: "classifier",
        summary: "A module matches no layer pattern and has no override",
        explanation: "Unclassified modules are excluded from direction, cycle and leakage checks. \
                      Add a layers.patterns entry or an `// arch-layer: <layer>` comment.",
    },
    RuleInfo {
        id: CLASSIFIER_INVALID_OVERRIDE,
        severity: Severity::Warning,
        family: "classifier",
        summary: "A layer override comment names an unknown layer",
        explanation: "Valid layers are domain, application, infrastructure, interfaces and \
                      bootstrap. The module falls back to the path patterns.",
    },
    RuleInfo {
        id: DIRECTION_FORBIDDEN,
        severity: Severity::Error,
        family: "direction",
        summary: "An import crosses layers against the dependency matrix",
        explanation: "Domain depends on nothing; Application on Domain; Infrastructure on Domain \
                      and Application; Interfaces on Application; Bootstrap on everything. \
                      Invert the dependency through a trait owned by the inner layer.",
    },
    RuleInfo {
        id: DIRECTION_CONTRACT_BOUNDARY,
        severity: Severity::Error,
        family: "direction",
        summary: "A contract boundary edge references non-contract symbols",
        explanation: "Across a configured contract boundary (by default Infrastructure to \
                      Application) only traits, names matching layers.contract_patterns, or \
                      symbols documented with the contract marker may be referenced.",
    },
    RuleInfo {
        id: DIRECTION_CYCLE,
        severity: Severity::Error,
        family: "direction",
        summary: "Classified modules import each other in a cycle",
        explanation: "Every strongly connected component of more than one classified, \
                      non-bootstrap module is reported once, listed in traversal order. \
                      Cycles are never broken automatically.",
    },
    RuleInfo {
        id: LEAKAGE_FRAMEWORK_TYPE,
        severity: Severity::Error,
        family: "leakage",
        summary: "A domain or application module references a framework or driver type",
        explanation: "Business layers must not mention deny-listed types such as HTTP requests \
                      or database rows. Map them to domain types in an adapter.",
    },
    RuleInfo {
        id: TAXONOMY_EXTERNAL_ERROR,
        severity: Severity::Warning,
        family: "taxonomy",
        summary: "A business-layer operation surfaces an external error type",
        explanation: "Wrap external failures into a Business or System error before they cross \
                      into domain or application signatures.",
    },
    RuleInfo {
        id: RESILIENCE_MISSING_TIMEOUT,
        severity: Severity::Warning,
        family: "resilience",
        summary: "An external call has no timeout",
        explanation: "Functions that call out over HTTP, consume queues or run as scheduled jobs \
                      need a timeout in the function or a module-level declaration.",
    },
    RuleInfo {
        id: RESILIENCE_MISSING_RETRY,
        severity: Severity::Warning,
        family: "resilience",
        summary: "An external call has no retry/backoff",
        explanation: "Functions that call out over HTTP, consume queues or run as scheduled jobs \
                      need a retry or backoff policy in the function or at module level.",
    },
    RuleInfo {
        id: RESILIENCE_MISSING_IDEMPOTENCY,
        severity: Severity::Warning,
        family: "resilience",
        summary: "A consumer or job entry point has no idempotency key",
        explanation: "Re-delivered messages and re-run jobs must be safe to repeat. Derive or \
                      accept an idempotency key in the entry point.",
    },
];

/// Look up a rule by id
pub fn find_rule(id: &str) -> Option<&'static RuleInfo> {
    RULE_CATALOG.iter().find(|rule| rule.id == id)
}

/// Default severity of a rule; unknown ids are warnings
pub fn default_severity(id: &str) -> Severity {
    find_rule(id).map(|rule| rule.severity).unwrap_or(Severity::Warning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_catalog_ids_are_unique() {
        let ids: BTreeSet<&str> = RULE_CATALOG.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), RULE_CATALOG.len());
    }

    #[test]
    fn test_find_rule() {
        assert_eq!(find_rule(DIRECTION_CYCLE).map(|r| r.severity), Some(Severity::Error));
        assert!(find_rule("style.naming").is_none());
        assert_eq!(default_severity(RESILIENCE_MISSING_RETRY), Severity::Warning);
    }
}
