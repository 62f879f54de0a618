//! Module dependency graph
//!
//! Architecture: Aggregate Root - The graph owns every module and edge for the run
//! - Raw imports are resolved once, by longest known-module prefix
//! - Internal imports become merged edges; everything else is an external edge
//! - Strongly connected components are computed once, at build time
//! - Nothing is mutated after `build` returns; validators only read

use crate::domain::model::{Layer, Module, ModuleId, RawImport};
use crate::domain::violations::{GuardianError, GuardianResult};
use std::collections::{BTreeMap, BTreeSet};

/// Symbol recorded for a glob import
pub const GLOB_SYMBOL: &str = "*";
/// Symbol recorded when a whole module is imported
pub const MODULE_SYMBOL: &str = "self";

/// An internal import edge; all `use` items from one module to one target are merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: ModuleId,
    pub target: ModuleId,
    /// Referenced symbol names
    pub symbols: BTreeSet<String>,
    /// First import line in the source file
    pub line: Option<u32>,
}

/// An import that does not resolve to a module under the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEdge {
    pub source: ModuleId,
    /// Path without the imported symbol, e.g. `sqlx::postgres`
    pub path: String,
    pub symbols: BTreeSet<String>,
    pub line: Option<u32>,
}

/// One import of a module, resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    /// Name the import binds in the module, if any
    pub local_name: Option<String>,
    /// Normalized full path, e.g. `crate::domain::user::User` or `sqlx::postgres::PgRow`
    pub full_path: String,
    /// Internal module the path resolves into
    pub target: Option<ModuleId>,
    pub is_glob: bool,
    /// `pub use` re-export
    pub is_reexport: bool,
    pub line: Option<u32>,
}

/// Frozen dependency graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    modules: BTreeMap<ModuleId, Module>,
    edges: Vec<Edge>,
    external_edges: Vec<ExternalEdge>,
    imports: BTreeMap<ModuleId, Vec<ResolvedImport>>,
    cycles: Vec<Vec<ModuleId>>,
    /// Names of nested workspace crates under the root
    crate_names: BTreeSet<String>,
}

/// Where a type name used in a declaration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeOrigin {
    /// Declared in the module itself
    Local,
    /// Declared in another module under the root
    Internal(ModuleId),
    /// Anything else, with the best-known full path
    External(String),
}

impl DependencyGraph {
    /// Resolve imports, build edges, verify endpoints and find cycles
    pub fn build(modules: Vec<Module>) -> GuardianResult<Self> {
        let mut by_id: BTreeMap<ModuleId, Module> = BTreeMap::new();
        for module in modules {
            if let Some(previous) = by_id.insert(module.id.clone(), module) {
                return Err(GuardianError::internal(
                    "graph",
                    format!("duplicate module id {}", previous.id),
                ));
            }
        }

        let crate_names = crate_names(&by_id);
        let resolver = ImportResolver { modules: &by_id, crate_names: &crate_names };
        let mut edge_map: BTreeMap<(ModuleId, ModuleId), Edge> = BTreeMap::new();
        let mut external_map: BTreeMap<(ModuleId, String), ExternalEdge> = BTreeMap::new();
        let mut imports: BTreeMap<ModuleId, Vec<ResolvedImport>> = BTreeMap::new();

        for module in by_id.values() {
            let mut resolved_imports = Vec::with_capacity(module.imports.len());
            for raw in &module.imports {
                let Some(resolution) = resolver.resolve(module, raw) else {
                    continue;
                };

                match &resolution.target {
                    Some((target, symbol)) if target == &module.id => {
                        tracing::trace!("{} imports from itself via {}", module.id, symbol);
                    }
                    Some((target, symbol)) => {
                        let edge = edge_map
                            .entry((module.id.clone(), target.clone()))
                            .or_insert_with(|| Edge {
                                source: module.id.clone(),
                                target: target.clone(),
                                symbols: BTreeSet::new(),
                                line: raw.line,
                            });
                        edge.symbols.insert(symbol.clone());
                        edge.line = min_line(edge.line, raw.line);
                    }
                    None => {
                        let (path, symbol) = split_external(&resolution.full_path, raw.is_glob);
                        let edge = external_map
                            .entry((module.id.clone(), path.clone()))
                            .or_insert_with(|| ExternalEdge {
                                source: module.id.clone(),
                                path,
                                symbols: BTreeSet::new(),
                                line: raw.line,
                            });
                        edge.symbols.insert(symbol);
                        edge.line = min_line(edge.line, raw.line);
                    }
                }

                resolved_imports.push(ResolvedImport {
                    local_name: raw.local_name.clone(),
                    full_path: resolution.full_path,
                    target: resolution.target.map(|(target, _)| target),
                    is_glob: raw.is_glob,
                    is_reexport: raw.is_reexport,
                    line: raw.line,
                });
            }
            imports.insert(module.id.clone(), resolved_imports);
        }

        let mut graph = Self {
            modules: by_id,
            edges: edge_map.into_values().collect(),
            external_edges: external_map.into_values().collect(),
            imports,
            cycles: Vec::new(),
            crate_names,
        };

        graph.verify()?;
        graph.cycles = graph.find_cycles()?;

        tracing::debug!(
            "Built graph: {} modules, {} edges, {} external edges, {} cycles",
            graph.modules.len(),
            graph.edges.len(),
            graph.external_edges.len(),
            graph.cycles.len()
        );

        Ok(graph)
    }

    /// Every edge endpoint must be a module of this graph
    pub fn verify(&self) -> GuardianResult<()> {
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !self.modules.contains_key(endpoint) {
                    return Err(GuardianError::internal(
                        "graph",
                        format!(
                            "edge {} -> {} references unknown module {}",
                            edge.source, edge.target, endpoint
                        ),
                    ));
                }
            }
        }
        for edge in &self.external_edges {
            if !self.modules.contains_key(&edge.source) {
                return Err(GuardianError::internal(
                    "graph",
                    format!("external edge from unknown module {}", edge.source),
                ));
            }
        }
        Ok(())
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn module(&self, id: &ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Internal edges, ordered by (source, target)
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// External edges, ordered by (source, path)
    pub fn external_edges(&self) -> &[ExternalEdge] {
        &self.external_edges
    }

    pub fn external_edges_from<'a>(
        &'a self,
        id: &'a ModuleId,
    ) -> impl Iterator<Item = &'a ExternalEdge> + 'a {
        self.external_edges.iter().filter(move |edge| &edge.source == id)
    }

    /// Resolved imports of one module, in source order
    pub fn imports_of(&self, id: &ModuleId) -> &[ResolvedImport] {
        self.imports.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve a type path from a declaration of `module` through its imports
    pub fn resolve_type_ref(&self, module: &Module, type_ref: &str) -> TypeOrigin {
        let segments: Vec<String> = type_ref.split("::").map(str::to_string).collect();
        let first = segments[0].as_str();

        if segments.len() == 1
            && (module.declares(first) || module.module_identifiers.contains(first))
        {
            return TypeOrigin::Local;
        }

        let imports = self.imports_of(&module.id);
        if let Some(import) = imports.iter().find(|i| i.local_name.as_deref() == Some(first)) {
            let mut full_path = import.full_path.clone();
            for segment in &segments[1..] {
                full_path.push_str("::");
                full_path.push_str(segment);
            }
            return match &import.target {
                Some(target) => TypeOrigin::Internal(target.clone()),
                None => TypeOrigin::External(full_path),
            };
        }

        if matches!(first, "crate" | "self" | "super") || self.crate_names.contains(first) {
            let resolver =
                ImportResolver { modules: &self.modules, crate_names: &self.crate_names };
            let raw = RawImport {
                segments: segments.clone(),
                local_name: None,
                is_glob: false,
                is_reexport: false,
                line: None,
            };
            return match resolver.resolve(module, &raw) {
                Some(Resolution { target: Some((target, _)), .. }) => {
                    if target == module.id {
                        TypeOrigin::Local
                    } else {
                        TypeOrigin::Internal(target)
                    }
                }
                _ => TypeOrigin::External(type_ref.to_string()),
            };
        }

        if segments.len() == 1 {
            // Names brought in by an internal glob import
            let from_glob = imports
                .iter()
                .filter(|i| i.is_glob)
                .filter_map(|i| i.target.as_ref())
                .find(|target| self.module(target).map(|m| m.declares(first)).unwrap_or(false));
            if let Some(target) = from_glob {
                return TypeOrigin::Internal(target.clone());
            }
        }

        TypeOrigin::External(type_ref.to_string())
    }

    /// Components of more than one module, each in traversal order
    pub fn cycles(&self) -> &[Vec<ModuleId>] {
        &self.cycles
    }

    /// Classified, non-bootstrap modules take part in cycle detection
    pub fn is_cycle_eligible(module: &Module) -> bool {
        matches!(module.layer(), Some(layer) if layer != Layer::Bootstrap)
    }

    /// Tarjan's strongly connected components over eligible modules
    fn find_cycles(&self) -> GuardianResult<Vec<Vec<ModuleId>>> {
        let nodes: Vec<&ModuleId> = self
            .modules
            .values()
            .filter(|module| Self::is_cycle_eligible(module))
            .map(|module| &module.id)
            .collect();
        let index_of: BTreeMap<&ModuleId, usize> =
            nodes.iter().enumerate().map(|(index, id)| (*id, index)).collect();

        // Edges are sorted by (source, target), so adjacency lists come out sorted
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (index_of.get(&edge.source), index_of.get(&edge.target))
            {
                adjacency[from].push(to);
            }
        }

        let mut tarjan = Tarjan::new(&adjacency);
        for node in 0..nodes.len() {
            if tarjan.index[node].is_none() {
                tarjan.visit(node);
            }
        }

        let covered: usize = tarjan.components.iter().map(Vec::len).sum();
        if covered != nodes.len() {
            return Err(GuardianError::internal(
                "cycle-detection",
                format!("component pass covered {covered} of {} modules", nodes.len()),
            ));
        }

        let mut cycles: Vec<Vec<ModuleId>> = tarjan
            .components
            .iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                traversal_order(component, &adjacency)
                    .into_iter()
                    .map(|index| nodes[index].clone())
                    .collect()
            })
            .collect();
        cycles.sort();
        Ok(cycles)
    }
}

/// Tarjan state over dense node indices; the DFS keeps its own frame stack
struct Tarjan<'a> {
    adjacency: &'a [Vec<usize>],
    counter: usize,
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl<'a> Tarjan<'a> {
    fn new(adjacency: &'a [Vec<usize>]) -> Self {
        let n = adjacency.len();
        Self {
            adjacency,
            counter: 0,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn open(&mut self, v: usize) {
        self.index[v] = Some(self.counter);
        self.lowlink[v] = self.counter;
        self.counter += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    fn visit(&mut self, root: usize) {
        self.open(root);
        // (node, position of the next neighbour to explore)
        let mut frames: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = frames.last_mut() {
            let (v, next) = *frame;
            if let Some(&w) = self.adjacency[v].get(next) {
                frame.1 += 1;
                match self.index[w] {
                    None => {
                        self.open(w);
                        frames.push((w, 0));
                    }
                    Some(w_index) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[v]);
            }

            if Some(self.lowlink[v]) == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }
}

/// Depth-first preorder from the smallest member, following sorted targets inside the component
fn traversal_order(component: &[usize], adjacency: &[Vec<usize>]) -> Vec<usize> {
    let members: BTreeSet<usize> = component.iter().copied().collect();
    let Some(&start) = members.iter().next() else {
        return Vec::new();
    };

    let mut order = Vec::with_capacity(members.len());
    let mut visited = BTreeSet::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        order.push(node);
        // Reverse push so the smallest target is explored first
        for &next in adjacency[node].iter().rev() {
            if members.contains(&next) && !visited.contains(&next) {
                stack.push(next);
            }
        }
    }
    order
}

/// Earlier of two optional line numbers
pub(crate) fn min_line(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// `sqlx::postgres::PgRow` becomes (`sqlx::postgres`, `PgRow`); a bare crate is imported as `self`
fn split_external(full_path: &str, is_glob: bool) -> (String, String) {
    if is_glob {
        return (full_path.to_string(), GLOB_SYMBOL.to_string());
    }
    match full_path.rsplit_once("::") {
        Some((path, symbol)) => (path.to_string(), symbol.to_string()),
        None => (full_path.to_string(), MODULE_SYMBOL.to_string()),
    }
}

/// Resolution of one raw import
struct Resolution {
    full_path: String,
    /// Internal target module and the symbol referenced in it
    target: Option<(ModuleId, String)>,
}

fn crate_names(modules: &BTreeMap<ModuleId, Module>) -> BTreeSet<String> {
    modules
        .values()
        .map(|module| module.crate_name.clone())
        .filter(|name| name != "crate")
        .collect()
}

/// Resolves raw `use` paths against the set of known module ids
struct ImportResolver<'g> {
    modules: &'g BTreeMap<ModuleId, Module>,
    crate_names: &'g BTreeSet<String>,
}

impl<'g> ImportResolver<'g> {
    fn resolve(&self, module: &Module, raw: &RawImport) -> Option<Resolution> {
        let mut segments = raw.segments.clone();
        let absolute = segments.first().map(|s| s.is_empty()).unwrap_or(false);
        if absolute {
            segments.remove(0);
        }
        if segments.is_empty() {
            return None;
        }

        let written = segments.join("::");
        let Some(normalized) = self.normalize(module, &segments, absolute) else {
            return Some(Resolution { full_path: written, target: None });
        };

        let full_path = normalized.join("::");
        let target = self.longest_prefix(&normalized).map(|(target, consumed)| {
            let symbol = if raw.is_glob && consumed == normalized.len() {
                GLOB_SYMBOL.to_string()
            } else {
                normalized.get(consumed).cloned().unwrap_or_else(|| MODULE_SYMBOL.to_string())
            };
            (target, symbol)
        });

        match target {
            Some(target) => Some(Resolution { full_path, target: Some(target) }),
            None => Some(Resolution { full_path: written, target: None }),
        }
    }

    /// Rewrite the path to start at a module id root, or `None` if it is external
    fn normalize(&self, module: &Module, segments: &[String], absolute: bool) -> Option<Vec<String>> {
        let own = module.id.segments();
        let first = segments[0].as_str();

        if absolute {
            return self.crate_names.contains(first).then(|| segments.to_vec());
        }

        match first {
            "crate" => {
                let mut path = vec![module.crate_name.clone()];
                path.extend_from_slice(&segments[1..]);
                Some(path)
            }
            "self" => {
                let mut path = own;
                path.extend_from_slice(&segments[1..]);
                Some(path)
            }
            "super" => {
                let mut path = own;
                let mut rest = segments;
                while rest.first().map(String::as_str) == Some("super") {
                    // Never climb above the crate root segment
                    if path.len() <= 1 {
                        return None;
                    }
                    path.pop();
                    rest = &rest[1..];
                }
                path.extend_from_slice(rest);
                Some(path)
            }
            _ if self.crate_names.contains(first) => Some(segments.to_vec()),
            _ => {
                // A child module of the importing module, e.g. `use repository::Users`
                let mut child = own;
                child.push(first.to_string());
                if self.modules.contains_key(&ModuleId::from_segments(&child)) {
                    child.extend_from_slice(&segments[1..]);
                    Some(child)
                } else {
                    None
                }
            }
        }
    }

    /// Longest prefix of the path that names a known module
    fn longest_prefix(&self, path: &[String]) -> Option<(ModuleId, usize)> {
        (1..=path.len()).rev().find_map(|length| {
            let candidate = ModuleId::from_segments(&path[..length]);
            self.modules.contains_key(&candidate).then_some((candidate, length))
        })
    }
}
