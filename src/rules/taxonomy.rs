//! Error taxonomy of business-layer operations
//!
//! Architecture: Domain Service - Business operations surface Business or System errors only
//! - Error types are classified by annotation, then suffix, then external crate path
//! - Error names in signatures are resolved through imports and declarations across the graph

use crate::cancel::CancelFlag;
use crate::config::ErrorTaxonomyConfig;
use crate::domain::catalog::TAXONOMY_EXTERNAL_ERROR;
use crate::domain::model::{ErrorKind, Module};
use crate::domain::violations::{GuardianResult, Severity, Violation};
use crate::graph::{DependencyGraph, TypeOrigin};
use crate::patterns::SymbolMatcher;
use crate::rules::Validator;
use std::collections::BTreeSet;

/// Classifies error types and flags External errors in Domain/Application signatures
pub struct TaxonomyValidator {
    /// Suffixes of every kind, longest first
    suffixes: Vec<(String, ErrorKind)>,
    external_paths: SymbolMatcher,
}

impl TaxonomyValidator {
    pub fn new(config: &ErrorTaxonomyConfig) -> GuardianResult<Self> {
        let mut suffixes: Vec<(String, ErrorKind)> = config
            .business_suffixes
            .iter()
            .map(|s| (s.clone(), ErrorKind::Business))
            .chain(config.system_suffixes.iter().map(|s| (s.clone(), ErrorKind::System)))
            .chain(config.external_suffixes.iter().map(|s| (s.clone(), ErrorKind::External)))
            .filter(|(suffix, _)| !suffix.is_empty())
            .collect();
        suffixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Ok(Self { suffixes, external_paths: SymbolMatcher::new(&[], &config.external_paths)? })
    }

    /// Longest configured suffix wins
    pub fn kind_by_suffix(&self, name: &str) -> Option<ErrorKind> {
        self.suffixes.iter().find(|(suffix, _)| name.ends_with(suffix.as_str())).map(|(_, kind)| *kind)
    }

    /// Kind of a type declared in `owner`: annotation first, then suffix
    fn declared_kind(&self, owner: &Module, name: &str) -> Option<ErrorKind> {
        owner
            .error_types
            .iter()
            .find(|declared| declared.name == name)
            .and_then(|declared| declared.annotated_kind)
            .or_else(|| self.kind_by_suffix(name))
    }

    /// Classify an error type referenced from `module`; returns the kind and a display path
    pub fn classify(
        &self,
        graph: &DependencyGraph,
        module: &Module,
        error_ref: &str,
    ) -> Option<(ErrorKind, String)> {
        let name = error_ref.rsplit("::").next().unwrap_or(error_ref);

        match graph.resolve_type_ref(module, error_ref) {
            TypeOrigin::Local => {
                self.declared_kind(module, name).map(|kind| (kind, format!("{}::{name}", module.id)))
            }
            TypeOrigin::Internal(target) => {
                let owner = graph.module(&target)?;
                self.declared_kind(owner, name).map(|kind| (kind, format!("{target}::{name}")))
            }
            TypeOrigin::External(full_path) => {
                let last = full_path.rsplit("::").next().unwrap_or(&full_path);
                let kind = self.kind_by_suffix(last).or_else(|| {
                    self.external_paths.matches(&full_path).map(|_| ErrorKind::External)
                })?;
                Some((kind, full_path))
            }
        }
    }

    fn check_module(&self, graph: &DependencyGraph, module: &Module) -> Vec<Violation> {
        let Some(layer) = module.layer() else {
            return Vec::new();
        };
        if !layer.is_business() {
            return Vec::new();
        }

        let mut reported: BTreeSet<(String, String)> = BTreeSet::new();
        let mut violations = Vec::new();

        for symbol in module.exports.iter().filter(|s| s.kind.is_operation()) {
            for error_ref in &symbol.error_refs {
                let Some((ErrorKind::External, error_type)) = self.classify(graph, module, error_ref) else {
                    continue;
                };
                if !reported.insert((symbol.name.clone(), error_type.clone())) {
                    continue;
                }
                violations.push(
                    Violation::new(
                        TAXONOMY_EXTERNAL_ERROR,
                        Severity::Warning,
                        module.id.clone(),
                        format!(
                            "{layer} operation `{}` surfaces external error `{error_type}`",
                            symbol.name
                        ),
                    )
                    .with_location(&module.path, symbol.line)
                    .with_suggestion(
                        "Wrap the external failure into a Business or System error at the adapter",
                    ),
                );
            }
        }
        violations
    }
}

impl Validator for TaxonomyValidator {
    fn stage(&self) -> &'static str {
        "taxonomy"
    }

    fn validate(
        &self,
        graph: &DependencyGraph,
        cancel: &CancelFlag,
    ) -> GuardianResult<Vec<Violation>> {
        let mut violations = Vec::new();
        for module in graph.modules() {
            cancel.checkpoint()?;
            violations.extend(self.check_module(graph, module));
        }

        tracing::debug!("Taxonomy validator found {} violations", violations.len());
        Ok(violations)
    }
}
