//! Architectural validators over the frozen dependency graph
//!
//! Architectural Principle: Service Layer - Each validator owns one family of invariants
//! - Every validator implements the Validator trait for clean polymorphism
//! - Validators only read the graph and return their own violation lists
//! - The rule set runs them in parallel and merges results without locking

pub mod direction;
pub mod leakage;
pub mod resilience;
pub mod taxonomy;

use crate::cancel::CancelFlag;
use crate::config::GuardianConfig;
use crate::domain::violations::{GuardianError, GuardianResult, Violation};
use crate::graph::DependencyGraph;
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub use direction::{DirectionValidator, LayerMatrix};
pub use leakage::LeakageValidator;
pub use resilience::ResilienceValidator;
pub use taxonomy::TaxonomyValidator;

/// Trait for validators that check one family of rules against the graph
pub trait Validator: Send + Sync {
    /// Stage name used when the validator fails
    fn stage(&self) -> &'static str;

    /// Check the graph, returning every violation found
    fn validate(
        &self,
        graph: &DependencyGraph,
        cancel: &CancelFlag,
    ) -> GuardianResult<Vec<Violation>>;
}

/// The enabled validators for one run
pub struct RuleSet {
    validators: Vec<Box<dyn Validator>>,
}

impl RuleSet {
    /// Build every enabled validator from configuration
    pub fn from_config(config: &GuardianConfig) -> GuardianResult<Self> {
        let mut validators: Vec<Box<dyn Validator>> =
            vec![Box::new(DirectionValidator::new(&config.layers)?)];

        if config.leakage.enabled {
            validators.push(Box::new(LeakageValidator::new(&config.leakage)?));
        }
        if config.errors.enabled {
            validators.push(Box::new(TaxonomyValidator::new(&config.errors)?));
        }
        if config.resilience.enabled {
            validators.push(Box::new(ResilienceValidator::new(&config.resilience)));
        }

        Ok(Self { validators })
    }

    pub fn with_validators(validators: Vec<Box<dyn Validator>>) -> Self {
        Self { validators }
    }

    pub fn stages(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.stage()).collect()
    }

    /// Run all validators in parallel; a panic becomes an internal failure of its stage
    pub fn evaluate(
        &self,
        graph: &DependencyGraph,
        cancel: &CancelFlag,
    ) -> GuardianResult<Vec<Violation>> {
        let results: Vec<GuardianResult<Vec<Violation>>> = self
            .validators
            .par_iter()
            .map(|validator| {
                let stage = validator.stage();
                tracing::debug!("Running {} validator", stage);
                match catch_unwind(AssertUnwindSafe(|| validator.validate(graph, cancel))) {
                    Ok(result) => result,
                    Err(payload) => Err(GuardianError::internal(stage, panic_message(&payload))),
                }
            })
            .collect();

        let mut violations = Vec::new();
        for result in results {
            violations.extend(result?);
        }
        Ok(violations)
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("validator panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("validator panicked: {message}")
    } else {
        "validator panicked".to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::analyzer::rust::{ParserMarkers, RustModuleParser};
    use crate::analyzer::ModuleParser;
    use crate::classifier::LayerClassifier;
    use crate::config::GuardianConfig;
    use crate::graph::DependencyGraph;
    use std::path::Path;

    /// Parse, classify and link in-memory sources under the default configuration
    pub fn graph_from(files: &[(&str, &str)]) -> DependencyGraph {
        graph_with_config(files, &GuardianConfig::default())
    }

    pub fn graph_with_config(files: &[(&str, &str)], config: &GuardianConfig) -> DependencyGraph {
        let parser = RustModuleParser::new(ParserMarkers::from_config(config));
        let parsed = files.iter().map(|(path, source)| parser.parse(Path::new(path), source)).collect();
        let classification = LayerClassifier::new(&config.layers).unwrap().classify_all(parsed);
        DependencyGraph::build(classification.modules).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::violations::Severity;

    struct Panicking;

    impl Validator for Panicking {
        fn stage(&self) -> &'static str {
            "exploding"
        }

        fn validate(&self, _: &DependencyGraph, _: &CancelFlag) -> GuardianResult<Vec<Violation>> {
            panic!("boom")
        }
    }

    struct Fixed(&'static str);

    impl Validator for Fixed {
        fn stage(&self) -> &'static str {
            self.0
        }

        fn validate(&self, _: &DependencyGraph, _: &CancelFlag) -> GuardianResult<Vec<Violation>> {
            Ok(vec![Violation::new(
                self.0,
                Severity::Warning,
                crate::domain::model::ModuleId::new("crate"),
                "fixed",
            )])
        }
    }

    #[test]
    fn test_default_rule_set_has_all_validators() {
        let rules = RuleSet::from_config(&GuardianConfig::default()).unwrap();
        assert_eq!(rules.stages(), vec!["direction", "leakage", "taxonomy", "resilience"]);
    }

    #[test]
    fn test_disabled_validators_are_skipped() {
        let mut config = GuardianConfig::default();
        config.leakage.enabled = false;
        config.resilience.enabled = false;
        let rules = RuleSet::from_config(&config).unwrap();
        assert_eq!(rules.stages(), vec!["direction", "taxonomy"]);
    }

    #[test]
    fn test_results_are_merged_in_validator_order() {
        let rules = RuleSet::with_validators(vec![Box::new(Fixed("a")), Box::new(Fixed("b"))]);
        let violations =
            rules.evaluate(&DependencyGraph::default(), &CancelFlag::new()).unwrap();
        let ids: Vec<&str> = violations.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_panic_becomes_internal_failure() {
        let rules = RuleSet::with_validators(vec![Box::new(Fixed("a")), Box::new(Panicking)]);
        let error = rules.evaluate(&DependencyGraph::default(), &CancelFlag::new()).unwrap_err();
        match error {
            GuardianError::Internal { stage, message } => {
                assert_eq!(stage, "exploding");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancelled_run_fails() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let graph = test_support::graph_from(&[("src/domain/user.rs", "pub struct User;")]);
        let rules = RuleSet::from_config(&GuardianConfig::default()).unwrap();
        assert!(matches!(rules.evaluate(&graph, &cancel), Err(GuardianError::Cancelled)));
    }
}
