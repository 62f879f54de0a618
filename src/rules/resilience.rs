//! Resilience controls on external interactions
//!
//! Architecture: Domain Service - Edge-layer functions that call out must bound and retry the call
//! - Markers identify HTTP calls, queue consumers and scheduled jobs
//! - Timeout and retry may be declared in the function or at module level
//! - Consumers and jobs additionally need an idempotency key in the entry point

use crate::cancel::CancelFlag;
use crate::config::{MarkerKind, ResilienceConfig};
use crate::domain::catalog::{
    RESILIENCE_MISSING_IDEMPOTENCY, RESILIENCE_MISSING_RETRY, RESILIENCE_MISSING_TIMEOUT,
};
use crate::domain::model::{FunctionFacts, Module};
use crate::domain::violations::{GuardianResult, Severity, Violation};
use crate::graph::DependencyGraph;
use crate::patterns::{ControlTokens, SegmentMatcher};
use crate::rules::Validator;

/// A marker found in one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerHit {
    pub kind: MarkerKind,
    pub token: String,
}

/// Audits Interfaces and Infrastructure functions for timeout, retry and idempotency
pub struct ResilienceValidator {
    markers: Vec<(MarkerKind, SegmentMatcher)>,
    timeout: ControlTokens,
    retry: ControlTokens,
    idempotency: ControlTokens,
}

impl ResilienceValidator {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            markers: config
                .markers
                .iter()
                .map(|marker| (marker.kind, SegmentMatcher::new(&marker.tokens)))
                .collect(),
            timeout: ControlTokens::new(&config.timeout_tokens),
            retry: ControlTokens::new(&config.retry_tokens),
            idempotency: ControlTokens::new(&config.idempotency_tokens),
        }
    }

    /// Every marker kind the function references, in configured order
    pub fn markers_in(&self, function: &FunctionFacts) -> Vec<MarkerHit> {
        let candidates = function
            .identifiers
            .iter()
            .chain(function.attributes.iter())
            .map(String::as_str);

        let mut hits: Vec<MarkerHit> = Vec::new();
        for (kind, matcher) in &self.markers {
            if hits.iter().any(|hit| hit.kind == *kind) {
                continue;
            }
            if let Some(token) = matcher.find(candidates.clone()) {
                hits.push(MarkerHit { kind: *kind, token: token.to_string() });
            }
        }
        hits
    }

    fn check_function(&self, module: &Module, function: &FunctionFacts) -> Vec<Violation> {
        let hits = self.markers_in(function);
        let Some(first) = hits.first() else {
            return Vec::new();
        };

        let scope = || {
            function
                .identifiers
                .iter()
                .chain(function.attributes.iter())
                .chain(module.module_identifiers.iter())
                .map(String::as_str)
        };
        let entry_point = || {
            function
                .identifiers
                .iter()
                .map(String::as_str)
                .chain(function.params.iter().flat_map(|(name, types)| {
                    std::iter::once(name.as_str()).chain(types.iter().map(String::as_str))
                }))
        };

        let mut missing: Vec<(&'static str, &'static str)> = Vec::new();
        if !self.timeout.found_in(scope()) {
            missing.push((RESILIENCE_MISSING_TIMEOUT, "timeout"));
        }
        if !self.retry.found_in(scope()) {
            missing.push((RESILIENCE_MISSING_RETRY, "retry/backoff"));
        }
        if hits.iter().any(|hit| hit.kind.requires_idempotency())
            && !self.idempotency.found_in(entry_point())
        {
            missing.push((RESILIENCE_MISSING_IDEMPOTENCY, "idempotency key"));
        }

        missing
            .into_iter()
            .map(|(rule_id, control)| {
                Violation::new(
                    rule_id,
                    Severity::Warning,
                    module.id.clone(),
                    format!(
                        "Function `{}` in {} ({} via `{}`) has no {control}",
                        function.name,
                        module.id,
                        first.kind.as_str(),
                        first.token
                    ),
                )
                .with_location(&module.path, function.line)
                .with_suggestion(suggestion(rule_id))
            })
            .collect()
    }
}

fn suggestion(rule_id: &str) -> &'static str {
    match rule_id {
        RESILIENCE_MISSING_TIMEOUT => "Bound the call with a timeout or a module-level timeout constant",
        RESILIENCE_MISSING_RETRY => "Wrap the call in a retry policy with backoff",
        _ => "Derive an idempotency key from the message or job and deduplicate on it",
    }
}

impl Validator for ResilienceValidator {
    fn stage(&self) -> &'static str {
        "resilience"
    }

    fn validate(
        &self,
        graph: &DependencyGraph,
        cancel: &CancelFlag,
    ) -> GuardianResult<Vec<Violation>> {
        let mut violations = Vec::new();
        for module in graph.modules() {
            cancel.checkpoint()?;
            if !module.layer().map(|layer| layer.is_edge()).unwrap_or(false) {
                continue;
            }
            for function in &module.functions {
                violations.extend(self.check_function(module, function));
            }
        }

        tracing::debug!("Resilience validator found {} violations", violations.len());
        Ok(violations)
    }
}
