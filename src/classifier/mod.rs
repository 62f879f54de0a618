//! Layer classification of parsed modules
//!
//! Architecture: Domain Service - Assigns exactly one layer to every module
//! - An explicit override comment wins over path patterns
//! - Path patterns are tried in configured order; the first match wins
//! - Anything left over is Unclassified and reported as a warning

use crate::config::LayerConfig;
use crate::domain::catalog::{CLASSIFIER_INVALID_OVERRIDE, CLASSIFIER_UNCLASSIFIED};
use crate::domain::model::{Layer, LayerAssignment, Module, ParsedModule};
use crate::domain::violations::{GuardianError, GuardianResult, Severity, Violation};
use rayon::prelude::*;
use std::path::Path;

/// Compiled layer pattern table
#[derive(Debug, Clone)]
pub struct LayerClassifier {
    patterns: Vec<(glob::Pattern, Layer)>,
}

/// Classified modules plus the warnings classification produced
#[derive(Debug, Default)]
pub struct Classification {
    pub modules: Vec<Module>,
    pub violations: Vec<Violation>,
}

impl LayerClassifier {
    pub fn new(config: &LayerConfig) -> GuardianResult<Self> {
        let mut patterns = Vec::with_capacity(config.patterns.len());
        for entry in &config.patterns {
            let pattern = glob::Pattern::new(&entry.pattern).map_err(|e| {
                GuardianError::config(format!("Invalid layer pattern '{}': {}", entry.pattern, e))
            })?;
            patterns.push((pattern, entry.layer));
        }
        Ok(Self { patterns })
    }

    /// Layer of the first pattern matching the relative path
    pub fn layer_for_path(&self, relative_path: &Path) -> Option<Layer> {
        let path = relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        self.patterns.iter().find(|(pattern, _)| pattern.matches(&path)).map(|(_, layer)| *layer)
    }

    /// Classify one module, returning any warnings about it
    pub fn classify(&self, parsed: ParsedModule) -> (Module, Vec<Violation>) {
        let mut violations = Vec::new();

        let from_override = match parsed.layer_override.as_deref() {
            Some(token) => match token.parse::<Layer>() {
                Ok(layer) => Some(layer),
                Err(e) => {
                    violations.push(
                        Violation::new(
                            CLASSIFIER_INVALID_OVERRIDE,
                            Severity::Warning,
                            parsed.id.clone(),
                            format!("Layer override ignored: {e}"),
                        )
                        .with_location(&parsed.path, None)
                        .with_suggestion(
                            "Use one of: domain, application, infrastructure, interfaces, bootstrap",
                        ),
                    );
                    None
                }
            },
            None => None,
        };

        let layer = from_override.or_else(|| self.layer_for_path(&parsed.path));
        let assignment = match layer {
            Some(layer) => LayerAssignment::Layer(layer),
            None => {
                violations.push(
                    Violation::new(
                        CLASSIFIER_UNCLASSIFIED,
                        Severity::Warning,
                        parsed.id.clone(),
                        "Module matches no layer pattern and has no layer override",
                    )
                    .with_location(&parsed.path, None)
                    .with_suggestion("Add a layers.patterns entry or an `// arch-layer: <layer>` comment"),
                );
                LayerAssignment::Unclassified
            }
        };

        tracing::debug!("Classified {} as {}", parsed.id, assignment);
        (Module::from_parsed(parsed, assignment), violations)
    }

    /// Classify all modules in parallel, keeping their order
    pub fn classify_all(&self, parsed: Vec<ParsedModule>) -> Classification {
        let results: Vec<(Module, Vec<Violation>)> =
            parsed.into_par_iter().map(|module| self.classify(module)).collect();

        let mut classification = Classification::default();
        for (module, violations) in results {
            classification.modules.push(module);
            classification.violations.extend(violations);
        }
        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::rust::module_identity;
    use rstest::rstest;
    use std::path::PathBuf;

    fn parsed(path: &str, layer_override: Option<&str>) -> ParsedModule {
        let path = PathBuf::from(path);
        let (id, crate_name) = module_identity(&path);
        let mut module = ParsedModule::unparsed(id, path, crate_name, "");
        module.layer_override = layer_override.map(str::to_string);
        module
    }

    fn classifier() -> LayerClassifier {
        LayerClassifier::new(&LayerConfig::default()).unwrap()
    }

    #[rstest]
    #[case("src/domain/user.rs", Some(Layer::Domain))]
    #[case("src/domain/mod.rs", Some(Layer::Domain))]
    #[case("src/application/register.rs", Some(Layer::Application))]
    #[case("src/infrastructure/user_repository.rs", Some(Layer::Infrastructure))]
    #[case("src/interfaces/consumer.rs", Some(Layer::Interfaces))]
    #[case("src/main.rs", Some(Layer::Bootstrap))]
    #[case("crates/core/src/lib.rs", Some(Layer::Bootstrap))]
    #[case("crates/core/src/domain.rs", Some(Layer::Domain))]
    #[case("src/util.rs", None)]
    fn test_default_patterns(#[case] path: &str, #[case] expected: Option<Layer>) {
        assert_eq!(classifier().layer_for_path(Path::new(path)), expected);
    }

    #[test]
    fn test_override_wins_over_path() {
        let (module, violations) = classifier().classify(parsed("src/util.rs", Some("domain")));
        assert_eq!(module.layer(), Some(Layer::Domain));
        assert!(violations.is_empty());

        let (module, _) =
            classifier().classify(parsed("src/infrastructure/money.rs", Some("Domain")));
        assert_eq!(module.layer(), Some(Layer::Domain));
    }

    #[test]
    fn test_unclassified_module_gets_warning() {
        let (module, violations) = classifier().classify(parsed("src/util.rs", None));
        assert_eq!(module.layer, LayerAssignment::Unclassified);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, CLASSIFIER_UNCLASSIFIED);
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    #[test]
    fn test_invalid_override_falls_back_to_path() {
        let (module, violations) =
            classifier().classify(parsed("src/domain/user.rs", Some("persistence")));
        assert_eq!(module.layer(), Some(Layer::Domain));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, CLASSIFIER_INVALID_OVERRIDE);
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let mut config = LayerConfig::default();
        config.patterns.insert(
            0,
            crate::config::LayerPattern::new("**/domain/events/**", Layer::Application),
        );
        let classifier = LayerClassifier::new(&config).unwrap();
        assert_eq!(
            classifier.layer_for_path(Path::new("src/domain/events/created.rs")),
            Some(Layer::Application)
        );
    }

    #[test]
    fn test_classify_all_preserves_order() {
        let modules = vec![parsed("src/domain/a.rs", None), parsed("src/util.rs", None)];
        let classification = classifier().classify_all(modules);
        assert_eq!(classification.modules[0].id.as_str(), "crate::domain::a");
        assert_eq!(classification.violations.len(), 1);
    }
}
