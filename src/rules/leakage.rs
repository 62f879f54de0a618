//! Framework and driver type leakage into business layers
//!
//! Architecture: Anti-Corruption Layer - Domain and Application stay free of adapter types
//! - Scans external imports and the type references of exported symbols
//! - Resolves short names through the module's own imports before matching
//! - Each distinct deny-listed symbol is reported once per module

use crate::cancel::CancelFlag;
use crate::config::LeakageConfig;
use crate::domain::catalog::LEAKAGE_FRAMEWORK_TYPE;
use crate::domain::model::Module;
use crate::domain::violations::{GuardianResult, Severity, Violation};
use crate::graph::{min_line, DependencyGraph, ResolvedImport, TypeOrigin};
use crate::patterns::SymbolMatcher;
use crate::rules::Validator;
use std::collections::BTreeMap;

/// Flags deny-listed types referenced by Domain and Application modules
pub struct LeakageValidator {
    deny: SymbolMatcher,
}

/// First sighting of a deny-listed symbol in one module
struct Sighting {
    entry: String,
    line: Option<u32>,
    reexported: bool,
}

impl LeakageValidator {
    pub fn new(config: &LeakageConfig) -> GuardianResult<Self> {
        Ok(Self { deny: SymbolMatcher::new(&config.deny_types, &config.deny_patterns)? })
    }

    fn record(
        &self,
        found: &mut BTreeMap<String, Sighting>,
        full_path: &str,
        line: Option<u32>,
        reexported: bool,
    ) {
        let Some(entry) = self.deny.matches(full_path) else {
            return;
        };
        found
            .entry(full_path.to_string())
            .and_modify(|sighting| {
                sighting.line = min_line(sighting.line, line);
                sighting.reexported |= reexported;
            })
            .or_insert_with(|| Sighting { entry: entry.to_string(), line, reexported });
    }

    /// Qualify a bare deny-listed name with the external glob import that supplies it
    fn through_glob(&self, imports: &[ResolvedImport], name: String) -> String {
        if name.contains("::") || self.deny.matches(&name).is_none() {
            return name;
        }
        imports
            .iter()
            .filter(|import| import.is_glob && import.target.is_none())
            .map(|import| format!("{}::{name}", import.full_path))
            .find(|qualified| self.deny.matches(qualified).is_some())
            .unwrap_or(name)
    }

    fn check_module(&self, graph: &DependencyGraph, module: &Module) -> Vec<Violation> {
        let Some(layer) = module.layer() else {
            return Vec::new();
        };
        if !layer.is_business() || !module.status.is_parsed() {
            return Vec::new();
        }

        let imports = graph.imports_of(&module.id);
        let mut found: BTreeMap<String, Sighting> = BTreeMap::new();

        for symbol in &module.exports {
            for type_ref in &symbol.type_refs {
                if let TypeOrigin::External(full_path) = graph.resolve_type_ref(module, type_ref) {
                    let full_path = self.through_glob(imports, full_path);
                    self.record(&mut found, &full_path, symbol.line, false);
                }
            }
        }

        for import in imports.iter().filter(|import| import.target.is_none()) {
            // Module and glob imports are cited through the types reached by them
            let prefix = format!("{}::", import.full_path);
            let mut qualifies = false;
            for (path, sighting) in found.iter_mut() {
                if path.starts_with(&prefix) {
                    sighting.line = min_line(sighting.line, import.line);
                    qualifies = true;
                }
            }
            if !qualifies {
                self.record(&mut found, &import.full_path, import.line, import.is_reexport);
            }
        }

        found
            .into_iter()
            .map(|(symbol, sighting)| {
                let verb = if sighting.reexported { "re-exports" } else { "references" };
                Violation::new(
                    LEAKAGE_FRAMEWORK_TYPE,
                    Severity::Error,
                    module.id.clone(),
                    format!(
                        "{layer} module {} {verb} `{symbol}` (deny-listed by `{}`)",
                        module.id, sighting.entry
                    ),
                )
                .with_location(&module.path, sighting.line)
                .with_suggestion(format!(
                    "Map `{symbol}` to a {layer} type inside an Infrastructure adapter"
                ))
            })
            .collect()
    }
}

impl Validator for LeakageValidator {
    fn stage(&self) -> &'static str {
        "leakage"
    }

    fn validate(
        &self,
        graph: &DependencyGraph,
        cancel: &CancelFlag,
    ) -> GuardianResult<Vec<Violation>> {
        if self.deny.is_empty() {
            return Ok(Vec::new());
        }

        let mut violations = Vec::new();
        for module in graph.modules() {
            cancel.checkpoint()?;
            violations.extend(self.check_module(graph, module));
        }

        tracing::debug!("Leakage validator found {} violations", violations.len());
        Ok(violations)
    }
}
