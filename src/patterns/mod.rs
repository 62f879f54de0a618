//! Compiled matchers shared by the loader and the validators
//!
//! Architectural Principle: Service Layer - Matchers hide how configured names are compared
//! - SymbolMatcher combines exact names and regexes over resolved paths (deny-lists, contracts)
//! - SegmentMatcher finds marker tokens as whole identifiers or path segments
//! - ControlTokens does case-insensitive substring search for resilience controls

pub mod path_filter;

use crate::domain::violations::{GuardianError, GuardianResult};
use regex::Regex;
use std::collections::BTreeSet;

pub use path_filter::PathFilter;

/// Exact names plus regexes; reports which entry matched
#[derive(Debug, Clone)]
pub struct SymbolMatcher {
    exact: BTreeSet<String>,
    patterns: Vec<(String, Regex)>,
}

impl SymbolMatcher {
    /// Compile the matcher; regex failures are pattern errors
    pub fn new(exact: &[String], patterns: &[String]) -> GuardianResult<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let regex = Regex::new(pattern)
                .map_err(|e| GuardianError::pattern(format!("Invalid regex '{pattern}': {e}")))?;
            compiled.push((pattern.clone(), regex));
        }

        Ok(Self { exact: exact.iter().cloned().collect(), patterns: compiled })
    }

    /// Match a `::`-joined path: exact entries against its last segment, regexes against all of it
    pub fn matches(&self, full_path: &str) -> Option<&str> {
        let last = full_path.rsplit("::").next().unwrap_or(full_path);
        if let Some(entry) = self.exact.get(last) {
            return Some(entry.as_str());
        }

        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(full_path))
            .map(|(source, _)| source.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }
}

/// Tokens matched as whole identifiers or consecutive path segments
#[derive(Debug, Clone, Default)]
pub struct SegmentMatcher {
    tokens: Vec<String>,
}

impl SegmentMatcher {
    pub fn new(tokens: &[String]) -> Self {
        Self { tokens: tokens.iter().map(|t| t.trim().to_string()).collect() }
    }

    /// First token found in the candidate identifiers or paths
    pub fn find<'a, I>(&self, candidates: I) -> Option<&str>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.tokens
            .iter()
            .find(|token| candidates.clone().into_iter().any(|c| segment_match(c, token)))
            .map(String::as_str)
    }
}

/// `reqwest` matches `reqwest::Client::new`; `hyper::Client` matches `hyper::Client::builder`
fn segment_match(candidate: &str, token: &str) -> bool {
    if candidate == token {
        return true;
    }
    let haystack = format!("::{candidate}::");
    haystack.contains(&format!("::{token}::"))
}

/// Case-insensitive substrings that satisfy one control
#[derive(Debug, Clone, Default)]
pub struct ControlTokens {
    lowered: Vec<String>,
}

impl ControlTokens {
    pub fn new(tokens: &[String]) -> Self {
        Self {
            lowered: tokens
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Whether any candidate contains any token
    pub fn found_in<'a, I>(&self, candidates: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates.into_iter().any(|candidate| {
            let candidate = candidate.to_lowercase();
            self.lowered.iter().any(|token| candidate.contains(token.as_str()))
        })
    }
}
