//! Dependency direction, contract boundaries and cycles
//!
//! Architecture: Domain Service - Enforces the layer transition matrix on every internal edge
//! - One Error per forbidden edge, naming both modules and the matrix rule
//! - Configured boundaries only admit contract symbols
//! - Every precomputed cycle is reported once; cycles are never broken

use crate::cancel::CancelFlag;
use crate::config::{ContractBoundary, LayerConfig};
use crate::domain::catalog::{DIRECTION_CONTRACT_BOUNDARY, DIRECTION_CYCLE, DIRECTION_FORBIDDEN};
use crate::domain::model::{ExportedSymbol, Layer, Module, ModuleId, SymbolKind};
use crate::domain::violations::{GuardianResult, Severity, Violation};
use crate::graph::{DependencyGraph, Edge, GLOB_SYMBOL, MODULE_SYMBOL};
use crate::patterns::SymbolMatcher;
use crate::rules::Validator;
use std::collections::{BTreeMap, BTreeSet};

/// Permitted target layers per source layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMatrix {
    allowed: BTreeMap<Layer, BTreeSet<Layer>>,
    allow_same_layer: bool,
}

impl LayerMatrix {
    /// The reference matrix; same-layer edges allowed
    pub fn reference() -> Self {
        use Layer::*;
        let allowed = BTreeMap::from([
            (Domain, BTreeSet::new()),
            (Application, BTreeSet::from([Domain])),
            (Infrastructure, BTreeSet::from([Domain, Application])),
            (Interfaces, BTreeSet::from([Application])),
            (Bootstrap, BTreeSet::from([Domain, Application, Infrastructure, Interfaces])),
        ]);
        Self { allowed, allow_same_layer: true }
    }

    /// Reference matrix with per-source overrides applied
    pub fn from_config(config: &LayerConfig) -> Self {
        let mut matrix = Self::reference();
        for (from, targets) in &config.matrix_overrides {
            matrix.allowed.insert(*from, targets.clone());
        }
        matrix.allow_same_layer = config.allow_same_layer;
        matrix
    }

    pub fn permits(&self, from: Layer, to: Layer) -> bool {
        if from == to {
            return self.allow_same_layer;
        }
        self.allowed.get(&from).map(|targets| targets.contains(&to)).unwrap_or(false)
    }

    /// Permitted targets, including the source itself when same-layer edges are allowed
    pub fn allowed_targets(&self, from: Layer) -> BTreeSet<Layer> {
        let mut targets = self.allowed.get(&from).cloned().unwrap_or_default();
        if self.allow_same_layer {
            targets.insert(from);
        }
        targets
    }

    /// Human-readable rule for one source layer, e.g. `Interfaces may depend on Application`
    pub fn describe(&self, from: Layer) -> String {
        let targets: Vec<String> = self
            .allowed
            .get(&from)
            .map(|targets| targets.iter().map(Layer::to_string).collect())
            .unwrap_or_default();

        let rule = if targets.is_empty() {
            format!("{from} may depend on nothing")
        } else {
            format!("{from} may depend on {}", targets.join(", "))
        };
        if self.allow_same_layer {
            rule
        } else {
            format!("{rule} (same-layer imports disabled)")
        }
    }
}

impl Default for LayerMatrix {
    fn default() -> Self {
        Self::reference()
    }
}

/// Checks edges against the matrix and contract boundaries, and reports cycles
pub struct DirectionValidator {
    matrix: LayerMatrix,
    boundaries: Vec<ContractBoundary>,
    contract_names: SymbolMatcher,
}

impl DirectionValidator {
    pub fn new(config: &LayerConfig) -> GuardianResult<Self> {
        Ok(Self {
            matrix: LayerMatrix::from_config(config),
            boundaries: config.contract_boundaries.clone(),
            contract_names: SymbolMatcher::new(&[], &config.contract_patterns)?,
        })
    }

    pub fn matrix(&self) -> &LayerMatrix {
        &self.matrix
    }

    fn is_boundary(&self, from: Layer, to: Layer) -> bool {
        self.boundaries.iter().any(|b| b.from == from && b.to == to)
    }

    fn is_contract(&self, symbol: &ExportedSymbol) -> bool {
        symbol.kind == SymbolKind::Trait
            || symbol.contract_tagged
            || self.contract_names.matches(&symbol.name).is_some()
    }

    /// Referenced symbols of an edge that are not contracts of the target
    fn non_contract_symbols(&self, edge: &Edge, target: &Module) -> Vec<String> {
        edge.symbols
            .iter()
            .filter(|name| {
                if name.as_str() == MODULE_SYMBOL || name.as_str() == GLOB_SYMBOL {
                    // Whole-module imports reach every top-level item
                    return target
                        .exports
                        .iter()
                        .filter(|s| !s.name.contains("::"))
                        .any(|s| !self.is_contract(s));
                }
                match target.export(name) {
                    Some(symbol) => !self.is_contract(symbol),
                    None => self.contract_names.matches(name).is_none(),
                }
            })
            .cloned()
            .collect()
    }

    fn check_edge(
        &self,
        edge: &Edge,
        source: &Module,
        target: &Module,
        violations: &mut Vec<Violation>,
    ) {
        let (Some(from), Some(to)) = (source.layer(), target.layer()) else {
            return;
        };

        if !self.matrix.permits(from, to) {
            violations.push(
                Violation::new(
                    DIRECTION_FORBIDDEN,
                    Severity::Error,
                    source.id.clone(),
                    format!(
                        "{} ({from}) must not import {} ({to}): {}",
                        source.id,
                        target.id,
                        self.matrix.describe(from)
                    ),
                )
                .with_module(target.id.clone())
                .with_location(&source.path, edge.line)
                .with_suggestion(format!(
                    "Invert the dependency: define a trait in the {from} layer and implement it in {to}"
                )),
            );
            return;
        }

        if self.is_boundary(from, to) {
            let offending = self.non_contract_symbols(edge, target);
            if !offending.is_empty() {
                violations.push(
                    Violation::new(
                        DIRECTION_CONTRACT_BOUNDARY,
                        Severity::Error,
                        source.id.clone(),
                        format!(
                            "{} ({from}) references non-contract symbols of {} ({to}): {}",
                            source.id,
                            target.id,
                            offending.join(", ")
                        ),
                    )
                    .with_module(target.id.clone())
                    .with_location(&source.path, edge.line)
                    .with_detail(offending)
                    .with_suggestion(
                        "Depend on a trait, command, query or DTO exposed by the target layer",
                    ),
                );
            }
        }
    }

    fn cycle_violation(&self, graph: &DependencyGraph, cycle: &[ModuleId]) -> Option<Violation> {
        let first = cycle.first()?;
        let mut violation = Violation::new(
            DIRECTION_CYCLE,
            Severity::Error,
            first.clone(),
            format!("Dependency cycle through {} modules", cycle.len()),
        );
        for module in &cycle[1..] {
            violation = violation.with_module(module.clone());
        }
        if let Some(module) = graph.module(first) {
            violation = violation.with_location(&module.path, None);
        }
        Some(
            violation
                .with_detail(cycle.iter().map(|id| id.to_string()).collect())
                .with_suggestion("Extract the shared part into a module both sides can depend on"),
        )
    }
}

impl Validator for DirectionValidator {
    fn stage(&self) -> &'static str {
        "direction"
    }

    fn validate(
        &self,
        graph: &DependencyGraph,
        cancel: &CancelFlag,
    ) -> GuardianResult<Vec<Violation>> {
        let mut violations = Vec::new();

        for edge in graph.edges() {
            cancel.checkpoint()?;
            if let (Some(source), Some(target)) = (graph.module(&edge.source), graph.module(&edge.target)) {
                self.check_edge(edge, source, target, &mut violations);
            }
        }

        for cycle in graph.cycles() {
            violations.extend(self.cycle_violation(graph, cycle));
        }

        tracing::debug!("Direction validator found {} violations", violations.len());
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardianConfig;
    use crate::rules::test_support::{graph_from, graph_with_config};
    use rstest::rstest;

    fn validate(graph: &DependencyGraph) -> Vec<Violation> {
        DirectionValidator::new(&LayerConfig::default())
            .unwrap()
            .validate(graph, &CancelFlag::new())
            .unwrap()
    }

    #[rstest]
    #[case(Layer::Domain, Layer::Domain, true)]
    #[case(Layer::Domain, Layer::Application, false)]
    #[case(Layer::Application, Layer::Domain, true)]
    #[case(Layer::Application, Layer::Infrastructure, false)]
    #[case(Layer::Infrastructure, Layer::Application, true)]
    #[case(Layer::Infrastructure, Layer::Interfaces, false)]
    #[case(Layer::Interfaces, Layer::Application, true)]
    #[case(Layer::Interfaces, Layer::Domain, false)]
    #[case(Layer::Interfaces, Layer::Infrastructure, false)]
    #[case(Layer::Bootstrap, Layer::Infrastructure, true)]
    #[case(Layer::Domain, Layer::Bootstrap, false)]
    fn test_reference_matrix(#[case] from: Layer, #[case] to: Layer, #[case] permitted: bool) {
        assert_eq!(LayerMatrix::reference().permits(from, to), permitted);
    }

    #[test]
    fn test_matrix_overrides_and_same_layer_toggle() {
        let mut config = LayerConfig::default();
        config.matrix_overrides.insert(Layer::Interfaces, BTreeSet::from([Layer::Application, Layer::Domain]));
        config.allow_same_layer = false;
        let matrix = LayerMatrix::from_config(&config);

        assert!(matrix.permits(Layer::Interfaces, Layer::Domain));
        assert!(!matrix.permits(Layer::Domain, Layer::Domain));
        assert_eq!(matrix.describe(Layer::Domain), "Domain may depend on nothing (same-layer imports disabled)");
    }

    #[test]
    fn test_forbidden_edge_yields_one_error() {
        let graph = graph_from(&[
            ("src/domain/user.rs", "use crate::application::register::Register;\nuse crate::application::register::Input;\npub struct User;"),
            ("src/application/register.rs", "pub struct Register;\npub struct Input;"),
        ]);

        let violations = validate(&graph);
        assert_eq!(violations.len(), 1);
        let violation = &violations[0];
        assert_eq!(violation.rule_id, DIRECTION_FORBIDDEN);
        assert_eq!(violation.severity, Severity::Error);
        assert_eq!(
            violation.modules.iter().map(ModuleId::as_str).collect::<Vec<_>>(),
            vec!["crate::domain::user", "crate::application::register"]
        );
        assert!(violation.message.contains("Domain may depend on nothing"));
        assert_eq!(violation.line_number, Some(1));
    }

    #[test]
    fn test_clean_layering_has_no_violations() {
        let graph = graph_from(&[
            ("src/domain/user.rs", "pub struct User;\npub trait UserRepository { fn save(&self, user: User); }"),
            ("src/application/register.rs", "use crate::domain::user::{User, UserRepository};\npub struct RegisterCommand;"),
            (
                "src/infrastructure/user_repository.rs",
                "use crate::domain::user::{User, UserRepository};\nuse crate::application::register::RegisterCommand;\npub struct PgUsers;",
            ),
            ("src/interfaces/http.rs", "use crate::application::register::RegisterCommand;"),
            ("src/main.rs", "use crate::infrastructure::user_repository::PgUsers;"),
        ]);
        assert!(validate(&graph).is_empty());
    }

    #[test]
    fn test_unclassified_modules_are_skipped() {
        let graph = graph_from(&[
            ("src/domain/user.rs", "use crate::util::Helper;\npub struct User;"),
            ("src/util.rs", "pub struct Helper;"),
        ]);
        assert!(validate(&graph).is_empty());
    }

    #[test]
    fn test_contract_boundary() {
        let graph = graph_from(&[
            (
                "src/application/ports.rs",
                "pub trait UserPort {}\npub struct CreateUserCommand;\n/// Shared shape. arch-contract\npub struct UserView;\npub struct RegisterService;",
            ),
            (
                "src/infrastructure/adapter.rs",
                "use crate::application::ports::{UserPort, CreateUserCommand, UserView, RegisterService};",
            ),
        ]);

        let violations = validate(&graph);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, DIRECTION_CONTRACT_BOUNDARY);
        assert_eq!(violations[0].detail, vec!["RegisterService".to_string()]);
    }

    #[test]
    fn test_contract_boundary_can_be_disabled() {
        let mut config = GuardianConfig::default();
        config.layers.contract_boundaries.clear();
        let graph = graph_with_config(
            &[
                ("src/application/service.rs", "pub struct RegisterService;"),
                ("src/infrastructure/adapter.rs", "use crate::application::service::RegisterService;"),
            ],
            &config,
        );
        let violations = DirectionValidator::new(&config.layers)
            .unwrap()
            .validate(&graph, &CancelFlag::new())
            .unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn test_whole_module_import_across_boundary() {
        let graph = graph_from(&[
            ("src/application/ports.rs", "pub trait UserPort {}\npub trait OrderPort {}"),
            ("src/application/service.rs", "pub struct RegisterService;"),
            ("src/infrastructure/a.rs", "use crate::application::ports;"),
            ("src/infrastructure/b.rs", "use crate::application::service::*;"),
        ]);

        let violations = validate(&graph);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].primary_module(), "crate::infrastructure::b");
        assert_eq!(violations[0].detail, vec![GLOB_SYMBOL.to_string()]);
    }

    #[test]
    fn test_cycle_reported_once_in_traversal_order() {
        let graph = graph_from(&[
            ("src/infrastructure/a.rs", "use crate::infrastructure::b::B;\npub struct A;"),
            ("src/infrastructure/b.rs", "use crate::infrastructure::c::C;\npub struct B;"),
            ("src/infrastructure/c.rs", "use crate::infrastructure::a::A;\npub struct C;"),
        ]);

        let violations = validate(&graph);
        assert_eq!(violations.len(), 1);
        let cycle = &violations[0];
        assert_eq!(cycle.rule_id, DIRECTION_CYCLE);
        assert_eq!(cycle.modules.len(), 3);
        assert_eq!(
            cycle.detail,
            vec!["crate::infrastructure::a", "crate::infrastructure::b", "crate::infrastructure::c"]
        );
    }
}
