//! Layer Guardian - Static conformance checking for layered Rust codebases
//!
//! Architecture: Clean Architecture - Library interface serves as the application layer
//! - Pure domain logic separated from infrastructure concerns
//! - Data flows forward: load, classify, link, validate, report
//! - Validators run in parallel over a frozen graph and never share mutable state

pub mod analyzer;
pub mod baseline;
pub mod cancel;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod graph;
pub mod patterns;
pub mod report;
pub mod rules;

// Re-export main types for convenient access
pub use domain::model::{Layer, LayerAssignment, Module, ModuleId};
pub use domain::violations::{
    FailurePolicy, GuardianError, GuardianResult, Report, ReportSummary, Severity, Violation,
};

pub use config::{ConfigBuilder, GuardianConfig};

pub use analyzer::{LoadOutcome, ModuleParser, SourceLoader};

pub use baseline::{Baseline, BaselineDiff};

pub use cancel::CancelFlag;

pub use classifier::LayerClassifier;

pub use graph::DependencyGraph;

pub use report::{OutputFormat, ReportFormatter, ReportOptions};

pub use rules::{LayerMatrix, RuleSet};

use std::path::Path;

/// Main engine running one conformance check over a project tree
pub struct ConformanceEngine {
    config: GuardianConfig,
    loader: SourceLoader,
    classifier: LayerClassifier,
    rules: RuleSet,
}

impl ConformanceEngine {
    /// Create an engine; configuration is validated and every pattern compiled up front
    pub fn new(config: GuardianConfig) -> GuardianResult<Self> {
        config.validate()?;
        let loader = SourceLoader::new(&config)?;
        let classifier = LayerClassifier::new(&config.layers)?;
        let rules = RuleSet::from_config(&config)?;
        Ok(Self { config, loader, classifier, rules })
    }

    /// Create an engine from the configuration discovered in `root`, or the defaults
    pub fn for_root(root: &Path) -> GuardianResult<Self> {
        Self::new(GuardianConfig::load_for_root(root)?)
    }

    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    /// Load, classify and link the tree; returns the frozen graph and the warnings so far
    pub async fn build_graph(
        &self,
        root: &Path,
        cancel: &CancelFlag,
    ) -> GuardianResult<(DependencyGraph, Vec<Violation>)> {
        if !root.is_dir() {
            return Err(GuardianError::usage(format!(
                "Root path does not exist or is not a directory: {}",
                root.display()
            )));
        }

        let loaded = self.loader.load(root, cancel).await?;
        cancel.checkpoint()?;
        tracing::debug!("Loaded {} modules", loaded.modules.len());

        let mut violations = loaded.violations;
        let classification = self.classifier.classify_all(loaded.modules);
        violations.extend(classification.violations);
        cancel.checkpoint()?;

        let graph = DependencyGraph::build(classification.modules)?;
        Ok((graph, violations))
    }

    /// Run every check over `root` and produce a finalized report
    pub async fn check(&self, root: &Path, cancel: &CancelFlag) -> GuardianResult<Report> {
        let (graph, early_violations) = self.build_graph(root, cancel).await?;

        let rule_violations = self.rules.evaluate(&graph, cancel)?;
        cancel.checkpoint()?;

        let mut report = Report::new();
        report.extend(early_violations);
        report.extend(rule_violations);
        report.set_graph_stats(graph.module_count(), graph.edges().len(), graph.external_edges().len());
        report.set_config_fingerprint(self.config.fingerprint());
        report.finalize(&self.config.failure_policy());

        tracing::info!(
            "Checked {} modules: {} errors, {} warnings",
            report.summary.modules,
            report.summary.violations_by_severity.error,
            report.summary.violations_by_severity.warning
        );
        Ok(report)
    }
}

/// Convenience function to check a tree with its discovered configuration
pub async fn check_root(root: &Path) -> GuardianResult<Report> {
    let engine = ConformanceEngine::for_root(root)?;
    engine.check(root, &CancelFlag::new()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{
        DIRECTION_CYCLE, DIRECTION_FORBIDDEN, LEAKAGE_FRAMEWORK_TYPE, LOADER_UNPARSED,
        RESILIENCE_MISSING_RETRY,
    };
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    async fn check(root: &Path) -> Report {
        ConformanceEngine::new(GuardianConfig::default())
            .unwrap()
            .check(root, &CancelFlag::new())
            .await
            .unwrap()
    }

    fn count(report: &Report, rule_id: &str) -> usize {
        report.violations_for_rule(rule_id).count()
    }

    #[tokio::test]
    async fn test_empty_root_passes() {
        let temp_dir = TempDir::new().unwrap();
        let report = check(temp_dir.path()).await;

        assert!(report.passed());
        assert!(!report.has_violations());
        assert_eq!(report.summary.modules, 0);
    }

    #[tokio::test]
    async fn test_missing_root_is_usage_error() {
        let engine = ConformanceEngine::new(GuardianConfig::default()).unwrap();
        let result = engine.check(&PathBuf::from("/definitely/not/here"), &CancelFlag::new()).await;
        match result {
            Err(error) => assert_eq!(error.exit_code(), 2),
            Ok(_) => panic!("expected a usage error"),
        }
    }

    #[tokio::test]
    async fn test_clean_user_repository_layout() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/main.rs", "mod domain;\nmod infrastructure;\nfn main() {}\n");
        write(root, "src/domain/mod.rs", "pub mod user;\n");
        write(
            root,
            "src/domain/user.rs",
            "pub struct User { pub id: u64 }\n\npub trait UserRepository {\n    fn find(&self, id: u64) -> Option<User>;\n}\n",
        );
        write(root, "src/infrastructure/mod.rs", "pub mod user_repository;\n");
        write(
            root,
            "src/infrastructure/user_repository.rs",
            "use crate::domain::user::{User, UserRepository};\nuse sqlx::postgres::PgRow;\n\npub struct PgUserRepository;\n\nimpl UserRepository for PgUserRepository {\n    fn find(&self, id: u64) -> Option<User> { None }\n}\n\nfn map(row: PgRow) -> User { todo!() }\n",
        );

        let report = check(root).await;
        assert_eq!(count(&report, LEAKAGE_FRAMEWORK_TYPE), 0);
        assert_eq!(count(&report, DIRECTION_FORBIDDEN), 0);
        assert!(report.passed(), "{:?}", report.violations());
        assert_eq!(report.summary.modules, 5);
    }

    #[tokio::test]
    async fn test_domain_leak_and_forbidden_edge() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/domain/user.rs", "use sqlx::postgres::PgRow;\npub fn load(row: PgRow) {}\n");
        write(root, "src/domain/order.rs", "use crate::infrastructure::db::Pool;\npub struct Order;\n");
        write(root, "src/infrastructure/db.rs", "pub struct Pool;\n");

        let report = check(root).await;
        assert_eq!(count(&report, LEAKAGE_FRAMEWORK_TYPE), 1);
        assert_eq!(count(&report, DIRECTION_FORBIDDEN), 1);
        assert!(!report.passed());
        assert_eq!(report.summary.violations_by_severity.error, 2);
    }

    #[tokio::test]
    async fn test_consumer_without_retry() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "src/interfaces/consumer.rs",
            "const CONSUMER_TIMEOUT_MS: u64 = 500;\n\npub async fn consume(delivery: lapin::message::Delivery) {\n    let idempotency_key = delivery.properties.message_id();\n}\n",
        );

        let report = check(temp_dir.path()).await;
        assert_eq!(report.violations().len(), 1);
        assert_eq!(count(&report, RESILIENCE_MISSING_RETRY), 1);
        assert!(report.violations()[0].message.contains("retry/backoff"));
        assert!(report.passed());
    }

    #[tokio::test]
    async fn test_infrastructure_cycle_reported_once() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/infrastructure/cache.rs", "use crate::infrastructure::store::Store;\npub struct Cache;\n");
        write(root, "src/infrastructure/store.rs", "use crate::infrastructure::cache::Cache;\npub struct Store;\n");

        let report = check(root).await;
        assert_eq!(count(&report, DIRECTION_CYCLE), 1);
        let cycle = report.violations_for_rule(DIRECTION_CYCLE).next().unwrap();
        assert_eq!(cycle.detail, vec!["crate::infrastructure::cache", "crate::infrastructure::store"]);
    }

    #[tokio::test]
    async fn test_unparsable_file_is_a_warning() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "src/domain/broken.rs", "pub fn broken( {\n");

        let report = check(temp_dir.path()).await;
        assert_eq!(count(&report, LOADER_UNPARSED), 1);
        assert_eq!(report.summary.modules, 1);
        assert!(report.passed());
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/domain/a.rs", "use crate::application::b::B;\npub struct A;\n");
        write(root, "src/application/b.rs", "use crate::domain::a::A;\npub struct B;\n");
        write(root, "src/util.rs", "pub fn helper() {}\n");

        let formatter = ReportFormatter::new(ReportOptions { use_colors: false });
        let first = formatter.format_report(&check(root).await, OutputFormat::Json).unwrap();
        let second = formatter.format_report(&check(root).await, OutputFormat::Json).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cancelled_run_produces_no_report() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "src/domain/a.rs", "pub struct A;\n");

        let cancel = CancelFlag::new();
        cancel.cancel();
        let engine = ConformanceEngine::new(GuardianConfig::default()).unwrap();
        let result = engine.check(temp_dir.path(), &cancel).await;
        assert!(matches!(result, Err(GuardianError::Cancelled)));
    }

    #[tokio::test]
    async fn test_warning_threshold_fails_run() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "src/util.rs", "pub fn helper() {}\n");

        let config = ConfigBuilder::new().warning_threshold(0).build().unwrap();
        let report = ConformanceEngine::new(config)
            .unwrap()
            .check(temp_dir.path(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.summary.violations_by_severity.warning, 1);
        assert!(!report.passed());
    }
}
