//! Configuration loading and management for Layer Guardian
//!
//! Architecture: Anti-Corruption Layer - Configuration translates external YAML formats
//! - Raw YAML structures are converted to clean domain objects
//! - Default layer tables, deny-lists and marker lists are embedded here, not in the validators
//! - Every section is optional; unknown keys are rejected

use crate::domain::model::Layer;
use crate::domain::violations::{FailurePolicy, GuardianError, GuardianResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// File names looked up in the audited root when no config is given
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["layer_guardian.yaml", ".layer_guardian.yaml"];

/// Main configuration structure for Layer Guardian
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardianConfig {
    /// Configuration format version
    pub version: String,
    /// Path filtering configuration
    pub paths: PathConfig,
    /// Source loader limits
    pub loader: LoaderConfig,
    /// Layer classification and dependency direction
    pub layers: LayerConfig,
    /// Framework type leakage deny-list
    pub leakage: LeakageConfig,
    /// Error taxonomy heuristics
    pub errors: ErrorTaxonomyConfig,
    /// Resilience markers and control tokens
    pub resilience: ResilienceConfig,
    /// Pass/fail policy
    pub report: ReportConfig,
}

/// Path filtering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfig {
    /// Include/exclude patterns (gitignore-style)
    pub patterns: Vec<String>,
    /// Optional .layerguardianignore file name
    pub ignore_file: Option<String>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                "target/".to_string(),
                "**/.git/".to_string(),
                "**/tests/".to_string(),
                "**/benches/".to_string(),
                "**/examples/".to_string(),
                "**/*.generated.*".to_string(),
            ],
            ignore_file: Some(".layerguardianignore".to_string()),
        }
    }
}

/// Limits for the concurrent source loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Files parsed at once; 0 means one per available CPU
    pub max_concurrency: usize,
    /// Per-file read and parse budget
    pub file_timeout_ms: u64,
    /// Larger files are reported as unreadable instead of parsed
    pub max_file_bytes: u64,
    /// Deeper bracket nesting is reported as unparsed instead of handed to the parser
    pub max_nesting_depth: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            file_timeout_ms: 5_000,
            max_file_bytes: 2 * 1024 * 1024,
            max_nesting_depth: crate::analyzer::rust::DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

/// One ordered path-pattern to layer mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerPattern {
    /// Glob over the path relative to the audited root
    pub pattern: String,
    pub layer: Layer,
}

impl LayerPattern {
    pub fn new(pattern: impl Into<String>, layer: Layer) -> Self {
        Self { pattern: pattern.into(), layer }
    }
}

/// A (from, to) layer pair whose edges must only reference contract symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractBoundary {
    pub from: Layer,
    pub to: Layer,
}

/// Layer classification and dependency direction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerConfig {
    /// Token that starts a per-module override comment
    pub override_marker: String,
    /// Ordered glob to layer table; first match wins
    pub patterns: Vec<LayerPattern>,
    /// Replaces the permitted targets for the listed source layers
    pub matrix_overrides: BTreeMap<Layer, BTreeSet<Layer>>,
    /// Whether edges between modules of the same layer are permitted
    pub allow_same_layer: bool,
    /// Layer pairs restricted to contract symbols; empty disables the check
    pub contract_boundaries: Vec<ContractBoundary>,
    /// Regexes over symbol names that count as contracts
    pub contract_patterns: Vec<String>,
    /// Doc comment token that tags a symbol as a contract
    pub contract_marker: String,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            override_marker: "arch-layer:".to_string(),
            patterns: default_layer_patterns(),
            matrix_overrides: BTreeMap::new(),
            allow_same_layer: true,
            contract_boundaries: vec![ContractBoundary {
                from: Layer::Infrastructure,
                to: Layer::Application,
            }],
            contract_patterns: vec![
                "Port$".to_string(),
                "Contract$".to_string(),
                "(Command|Query|Event)$".to_string(),
                "Dto$".to_string(),
            ],
            contract_marker: "arch-contract".to_string(),
        }
    }
}

fn default_layer_patterns() -> Vec<LayerPattern> {
    let table: [(&str, Layer); 18] = [
        ("**/src/main.rs", Layer::Bootstrap),
        ("**/src/lib.rs", Layer::Bootstrap),
        ("**/bootstrap/**", Layer::Bootstrap),
        ("**/bootstrap.rs", Layer::Bootstrap),
        ("**/domain/**", Layer::Domain),
        ("**/domain.rs", Layer::Domain),
        ("**/application/**", Layer::Application),
        ("**/application.rs", Layer::Application),
        ("**/usecases/**", Layer::Application),
        ("**/infrastructure/**", Layer::Infrastructure),
        ("**/infrastructure.rs", Layer::Infrastructure),
        ("**/infra/**", Layer::Infrastructure),
        ("**/adapters/**", Layer::Infrastructure),
        ("**/persistence/**", Layer::Infrastructure),
        ("**/interfaces/**", Layer::Interfaces),
        ("**/interfaces.rs", Layer::Interfaces),
        ("**/presentation/**", Layer::Interfaces),
        ("**/api/**", Layer::Interfaces),
    ];
    table.iter().map(|(pattern, layer)| LayerPattern::new(*pattern, *layer)).collect()
}

/// Framework type leakage deny-list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeakageConfig {
    pub enabled: bool,
    /// Exact type names, matched against the last path segment
    pub deny_types: Vec<String>,
    /// Regexes over the resolved full path
    pub deny_patterns: Vec<String>,
}

impl Default for LeakageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            deny_types: [
                "HttpRequest",
                "HttpResponse",
                "HeaderMap",
                "StatusCode",
                "PgRow",
                "MySqlRow",
                "SqliteRow",
                "PgPool",
                "MySqlPool",
                "SqlitePool",
                "PgConnection",
                "DatabaseConnection",
                "PooledConnection",
                "RedisConnection",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            deny_patterns: vec![
                r"^(axum|actix_web|hyper|warp|rocket|tonic|poem)::".to_string(),
                r"^(sqlx|diesel|sea_orm|redis|mongodb|tokio_postgres|rusqlite|lapin|rdkafka)::"
                    .to_string(),
            ],
        }
    }
}

/// Error taxonomy naming heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorTaxonomyConfig {
    pub enabled: bool,
    /// Doc comment token that declares a kind explicitly
    pub kind_marker: String,
    pub business_suffixes: Vec<String>,
    pub system_suffixes: Vec<String>,
    pub external_suffixes: Vec<String>,
    /// Regexes over resolved full paths of third-party error types
    pub external_paths: Vec<String>,
}

impl Default for ErrorTaxonomyConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            enabled: true,
            kind_marker: "error-kind:".to_string(),
            business_suffixes: strings(&[
                "DomainError",
                "BusinessError",
                "ValidationError",
                "RuleViolation",
            ]),
            system_suffixes: strings(&["SystemError", "InternalError", "ConfigError"]),
            external_suffixes: strings(&[
                "ExternalError",
                "DbError",
                "DatabaseError",
                "SqlError",
                "HttpError",
                "ClientError",
                "ApiError",
                "DriverError",
                "TransportError",
            ]),
            external_paths: vec![
                r"^(sqlx|diesel|sea_orm|redis|mongodb|reqwest|hyper|tonic|lapin|rdkafka|tokio_postgres|rusqlite)::(.+::)?Error$"
                    .to_string(),
            ],
        }
    }
}

/// Kind of external interaction a marker denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    HttpCall,
    QueueConsumer,
    ScheduledJob,
}

impl MarkerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpCall => "http_call",
            Self::QueueConsumer => "queue_consumer",
            Self::ScheduledJob => "scheduled_job",
        }
    }

    /// Consumers and jobs are re-delivered, so they must be idempotent
    pub fn requires_idempotency(self) -> bool {
        matches!(self, Self::QueueConsumer | Self::ScheduledJob)
    }
}

/// Tokens that identify one kind of external interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResilienceMarker {
    pub kind: MarkerKind,
    /// Identifiers or `::` paths; matched as whole segments
    pub tokens: Vec<String>,
}

/// Resilience markers and control tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    pub enabled: bool,
    pub markers: Vec<ResilienceMarker>,
    /// Case-insensitive substrings that satisfy the timeout control
    pub timeout_tokens: Vec<String>,
    /// Case-insensitive substrings that satisfy the retry/backoff control
    pub retry_tokens: Vec<String>,
    /// Case-insensitive substrings that satisfy the idempotency control
    pub idempotency_tokens: Vec<String>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            enabled: true,
            markers: vec![
                ResilienceMarker {
                    kind: MarkerKind::HttpCall,
                    tokens: strings(&["reqwest", "ureq", "surf", "isahc", "hyper::Client", "HttpClient"]),
                },
                ResilienceMarker {
                    kind: MarkerKind::QueueConsumer,
                    tokens: strings(&[
                        "lapin",
                        "rdkafka",
                        "StreamConsumer",
                        "basic_consume",
                        "QueueConsumer",
                        "receive_message",
                    ]),
                },
                ResilienceMarker {
                    kind: MarkerKind::ScheduledJob,
                    tokens: strings(&["tokio_cron_scheduler", "JobScheduler", "cron", "ScheduledJob"]),
                },
            ],
            timeout_tokens: strings(&["timeout", "deadline"]),
            retry_tokens: strings(&["retry", "retries", "backoff", "max_attempts"]),
            idempotency_tokens: strings(&["idempotency", "idempotent", "dedup", "message_id"]),
        }
    }
}

/// Which severity fails the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailOn {
    #[default]
    Error,
    Warning,
}

/// Pass/fail policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub fail_on: FailOn,
    /// Fail once the warning count exceeds this value; overrides `fail_on`
    pub warning_threshold: Option<usize>,
}

impl ReportConfig {
    pub fn failure_policy(&self) -> FailurePolicy {
        match (self.warning_threshold, self.fail_on) {
            (Some(threshold), _) => FailurePolicy { warning_threshold: Some(threshold) },
            (None, FailOn::Warning) => FailurePolicy::strict(),
            (None, FailOn::Error) => FailurePolicy::default(),
        }
    }
}

impl GuardianConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> GuardianResult<Self> {
        let contents = fs::read_to_string(&path).map_err(|e| {
            GuardianError::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            GuardianError::config(format!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from string content
    pub fn load_from_str(content: &str) -> GuardianResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| GuardianError::config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Find the config file for an audited root, if one exists
    pub fn discover(root: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_FILES.iter().map(|name| root.join(name)).find(|path| path.is_file())
    }

    /// Load the root's config file, or the built-in defaults when there is none
    pub fn load_for_root(root: &Path) -> GuardianResult<Self> {
        match Self::discover(root) {
            Some(path) => {
                tracing::debug!("Using configuration {}", path.display());
                Self::load_from_file(path)
            }
            None => Ok(Self::with_defaults()),
        }
    }

    /// Get default configuration with built-in tables
    pub fn with_defaults() -> Self {
        Self {
            version: "1.0".to_string(),
            paths: PathConfig::default(),
            loader: LoaderConfig::default(),
            layers: LayerConfig::default(),
            leakage: LeakageConfig::default(),
            errors: ErrorTaxonomyConfig::default(),
            resilience: ResilienceConfig::default(),
            report: ReportConfig::default(),
        }
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> GuardianResult<()> {
        if !["1.0"].contains(&self.version.as_str()) {
            return Err(GuardianError::config(format!(
                "Unsupported configuration version: {}. Supported versions: 1.0",
                self.version
            )));
        }

        if self.loader.file_timeout_ms == 0 {
            return Err(GuardianError::config("loader.file_timeout_ms must be greater than 0"));
        }
        if self.loader.max_nesting_depth == 0 {
            return Err(GuardianError::config("loader.max_nesting_depth must be greater than 0"));
        }

        if self.layers.override_marker.trim().is_empty() {
            return Err(GuardianError::config("layers.override_marker must not be empty"));
        }

        for pattern in &self.paths.patterns {
            let glob = pattern.strip_prefix('!').unwrap_or(pattern);
            glob::Pattern::new(glob.trim_end_matches('/')).map_err(|e| {
                GuardianError::config(format!("Invalid path pattern '{pattern}': {e}"))
            })?;
        }

        for entry in &self.layers.patterns {
            glob::Pattern::new(&entry.pattern).map_err(|e| {
                GuardianError::config(format!("Invalid layer pattern '{}': {}", entry.pattern, e))
            })?;
        }

        check_regexes("layers.contract_patterns", &self.layers.contract_patterns)?;
        check_regexes("leakage.deny_patterns", &self.leakage.deny_patterns)?;
        check_regexes("errors.external_paths", &self.errors.external_paths)?;

        for marker in &self.resilience.markers {
            if marker.tokens.iter().any(|t| t.trim().is_empty()) {
                return Err(GuardianError::config(format!(
                    "Empty token in resilience marker '{}'",
                    marker.kind.as_str()
                )));
            }
        }

        Ok(())
    }

    /// Effective pass/fail policy
    pub fn failure_policy(&self) -> FailurePolicy {
        self.report.failure_policy()
    }

    /// Convert to JSON for serialization
    pub fn to_json(&self) -> GuardianResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GuardianError::config(format!("Failed to serialize config: {e}")))
    }

    /// Stable SHA-256 fingerprint of the configuration
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // Every map in the config is a BTreeMap, so the JSON form is stable.
        match serde_json::to_vec(self) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(format!("{self:?}").as_bytes()),
        }
        format!("{:x}", hasher.finalize())
    }
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn check_regexes(section: &str, patterns: &[String]) -> GuardianResult<()> {
    for pattern in patterns {
        regex::Regex::new(pattern).map_err(|e| {
            GuardianError::config(format!("Invalid regex in {section} '{pattern}': {e}"))
        })?;
    }
    Ok(())
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: GuardianConfig,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self { config: GuardianConfig::default() }
    }

    /// Add a path pattern
    pub fn add_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.paths.patterns.push(pattern.into());
        self
    }

    /// Set the ignore file name
    pub fn ignore_file(mut self, filename: impl Into<String>) -> Self {
        self.config.paths.ignore_file = Some(filename.into());
        self
    }

    /// Put a layer pattern ahead of the existing table
    pub fn prepend_layer_pattern(mut self, pattern: impl Into<String>, layer: Layer) -> Self {
        self.config.layers.patterns.insert(0, LayerPattern::new(pattern, layer));
        self
    }

    /// Replace the permitted targets of one source layer
    pub fn matrix_override(mut self, from: Layer, to: impl IntoIterator<Item = Layer>) -> Self {
        self.config.layers.matrix_overrides.insert(from, to.into_iter().collect());
        self
    }

    /// Replace the contract boundary list
    pub fn contract_boundaries(mut self, boundaries: Vec<ContractBoundary>) -> Self {
        self.config.layers.contract_boundaries = boundaries;
        self
    }

    /// Add an exact deny-listed type name
    pub fn deny_type(mut self, name: impl Into<String>) -> Self {
        self.config.leakage.deny_types.push(name.into());
        self
    }

    /// Set the warning threshold
    pub fn warning_threshold(mut self, threshold: usize) -> Self {
        self.config.report.warning_threshold = Some(threshold);
        self
    }

    /// Build the final configuration
    pub fn build(self) -> GuardianResult<GuardianConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_validate() {
        let config = GuardianConfig::with_defaults();
        assert!(config.validate().is_ok());
        assert!(config.layers.allow_same_layer);
        assert_eq!(config.layers.contract_boundaries.len(), 1);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = GuardianConfig::load_from_str(
            r#"
layers:
  allow_same_layer: false
report:
  warning_threshold: 3
"#,
        )
        .unwrap();

        assert!(!config.layers.allow_same_layer);
        assert_eq!(config.layers.override_marker, "arch-layer:");
        assert_eq!(config.report.warning_threshold, Some(3));
        assert!(!config.leakage.deny_types.is_empty());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = GuardianConfig::load_from_str("layers:\n  colour: blue\n").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = GuardianConfig::load_from_str("leakage:\n  deny_patterns: ['(']\n").unwrap_err();
        assert!(err.to_string().contains("leakage.deny_patterns"));
    }

    #[test]
    fn test_matrix_overrides_parse() {
        let config = GuardianConfig::load_from_str(
            "layers:\n  matrix_overrides:\n    interfaces: [application, domain]\n",
        )
        .unwrap();
        let targets = &config.layers.matrix_overrides[&Layer::Interfaces];
        assert!(targets.contains(&Layer::Domain));
        assert!(targets.contains(&Layer::Application));
    }

    #[test]
    fn test_failure_policy() {
        let mut report = ReportConfig::default();
        assert_eq!(report.failure_policy(), FailurePolicy::default());
        report.fail_on = FailOn::Warning;
        assert_eq!(report.failure_policy(), FailurePolicy::strict());
        report.warning_threshold = Some(5);
        assert_eq!(report.failure_policy().warning_threshold, Some(5));
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = GuardianConfig::with_defaults();
        let b = ConfigBuilder::new().deny_type("Bson").build().unwrap();
        assert_eq!(a.fingerprint(), GuardianConfig::with_defaults().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_discover_in_root() {
        let temp = TempDir::new().unwrap();
        assert!(GuardianConfig::discover(temp.path()).is_none());
        assert_eq!(GuardianConfig::load_for_root(temp.path()).unwrap(), GuardianConfig::default());

        fs::write(temp.path().join(".layer_guardian.yaml"), "report:\n  fail_on: warning\n")
            .unwrap();
        let config = GuardianConfig::load_for_root(temp.path()).unwrap();
        assert_eq!(config.report.fail_on, FailOn::Warning);
    }

    #[test]
    fn test_unparsable_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yaml");
        fs::write(&path, "layers: [unterminated").unwrap();
        let err = GuardianConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, GuardianError::Configuration { .. }));
    }
}
