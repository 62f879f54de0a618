//! Rust source parsing using syn for AST extraction
//!
//! Code Quality Principle: Specialized Analysis Services - The parser turns one file into one module record
//! - Implements ModuleParser for clean polymorphism
//! - Extracts imports, public symbols with their type references, error types and function facts
//! - Never fails: unparsable input becomes an Unparsed module

use crate::analyzer::ModuleParser;
use crate::config::GuardianConfig;
use crate::domain::model::{
    DeclaredErrorType, ErrorKind, ExportedSymbol, FunctionFacts, ModuleId, ParseStatus,
    ParsedModule, RawImport, SymbolKind,
};
use proc_macro2::{TokenStream, TokenTree};
use quote::ToTokens;
use std::collections::BTreeSet;
use std::path::{Component, Path};
use syn::spanned::Spanned;
use syn::visit::Visit;

/// Comment and doc markers the parser looks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserMarkers {
    /// Layer override token, e.g. `arch-layer:`
    pub layer_override: String,
    /// Error kind token, e.g. `error-kind:`
    pub error_kind: String,
    /// Contract tag token, e.g. `arch-contract`
    pub contract: String,
}

impl Default for ParserMarkers {
    fn default() -> Self {
        Self {
            layer_override: "arch-layer:".to_string(),
            error_kind: "error-kind:".to_string(),
            contract: "arch-contract".to_string(),
        }
    }
}

impl ParserMarkers {
    pub fn from_config(config: &GuardianConfig) -> Self {
        Self {
            layer_override: config.layers.override_marker.clone(),
            error_kind: config.errors.kind_marker.clone(),
            contract: config.layers.contract_marker.clone(),
        }
    }
}

/// Bracket depth accepted by default before a file is left unparsed
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 256;

/// Parser for Rust source files
#[derive(Debug, Clone)]
pub struct RustModuleParser {
    markers: ParserMarkers,
    max_nesting_depth: usize,
}

impl Default for RustModuleParser {
    fn default() -> Self {
        Self::new(ParserMarkers::default())
    }
}

impl RustModuleParser {
    pub fn new(markers: ParserMarkers) -> Self {
        Self { markers, max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH }
    }

    /// Files nested deeper than `depth` brackets are not handed to syn
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// First `// <marker> <layer>` comment in the file
    fn find_layer_override(&self, content: &str) -> Option<String> {
        let marker = self.markers.layer_override.as_str();
        content.lines().find_map(|line| {
            let comment = line.trim_start().strip_prefix("//")?;
            let (_, rest) = comment.split_once(marker)?;
            let token: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect();
            Some(token)
        })
    }
}

impl ModuleParser for RustModuleParser {
    fn parse(&self, relative_path: &Path, content: &str) -> ParsedModule {
        let (id, crate_name) = module_identity(relative_path);

        if let Some(line) = exceeds_nesting_depth(content, self.max_nesting_depth) {
            tracing::debug!(
                "Skipping {}: nesting deeper than {} at line {}",
                relative_path.display(),
                self.max_nesting_depth,
                line
            );
            return ParsedModule::unparsed(
                id,
                relative_path.to_path_buf(),
                crate_name,
                format!("nesting deeper than {} levels at line {line}", self.max_nesting_depth),
            );
        }

        let syntax_tree = match syn::parse_file(content) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::debug!("Failed to parse Rust file {}: {}", relative_path.display(), e);
                let line = e.span().start().line;
                return ParsedModule::unparsed(
                    id,
                    relative_path.to_path_buf(),
                    crate_name,
                    format!("syntax error at line {line}: {e}"),
                );
            }
        };

        let mut collector = ItemCollector::new(&self.markers);
        collector.collect_items(&syntax_tree.items);
        collector.finish();

        ParsedModule {
            id,
            path: relative_path.to_path_buf(),
            crate_name,
            status: ParseStatus::Parsed,
            layer_override: self.find_layer_override(content),
            exports: collector.exports,
            imports: collector.imports,
            error_types: collector.error_types,
            functions: collector.functions,
            module_identifiers: collector.module_identifiers,
        }
    }

    fn handles_file(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == "rs")
            .unwrap_or(false)
    }
}

/// Line where bracket nesting first goes past `limit`, ignoring comments and string literals
fn exceeds_nesting_depth(content: &str, limit: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut line = 1usize;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            '(' | '[' | '{' => {
                depth += 1;
                if depth > limit {
                    return Some(line);
                }
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = ' ';
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                    }
                    if previous == '*' && c == '/' {
                        break;
                    }
                    previous = c;
                }
            }
            '\'' => {
                // Char literals; lifetimes are left alone
                let mut lookahead = chars.clone();
                match (lookahead.next(), lookahead.next()) {
                    (Some('\\'), Some(_)) => {
                        chars.next();
                        chars.next();
                        for c in chars.by_ref() {
                            if c == '\'' {
                                break;
                            }
                        }
                    }
                    (Some(_), Some('\'')) => {
                        chars.next();
                        chars.next();
                    }
                    _ => {}
                }
            }
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if chars.next() == Some('\n') {
                                line += 1;
                            }
                        }
                        '\n' => line += 1,
                        '"' => break,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Canonical module id and crate name for a path relative to the audited root
///
/// `src/domain/user.rs` is `crate::domain::user`; `crates/billing-core/src/lib.rs`
/// is `billing_core`. `mod.rs` and crate-root `lib.rs`/`main.rs` map to their parent.
pub fn module_identity(relative_path: &Path) -> (ModuleId, String) {
    let components: Vec<String> = relative_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let dirs = components.len().saturating_sub(1);
    let src_index = components[..dirs].iter().rposition(|c| c == "src");

    let (crate_name, mut rest) = match src_index {
        Some(0) => ("crate".to_string(), components[1..].to_vec()),
        Some(index) => (components[index - 1].replace('-', "_"), components[index + 1..].to_vec()),
        None => ("crate".to_string(), components.clone()),
    };

    if let Some(last) = rest.last_mut() {
        if let Some(stem) = last.strip_suffix(".rs") {
            *last = stem.to_string();
        }
    }

    let drop_last = match rest.last().map(String::as_str) {
        Some("mod") => true,
        Some("lib") | Some("main") => rest.len() == 1 && src_index.is_some(),
        _ => false,
    };
    if drop_last {
        rest.pop();
    }

    let mut segments = vec![crate_name.clone()];
    segments.extend(rest.into_iter().map(|s| s.replace('-', "_")));
    (ModuleId::from_segments(&segments), crate_name)
}

/// Walks top-level items (and inline non-test modules) of one file
struct ItemCollector<'m> {
    markers: &'m ParserMarkers,
    exports: Vec<ExportedSymbol>,
    imports: Vec<RawImport>,
    error_types: Vec<DeclaredErrorType>,
    functions: Vec<FunctionFacts>,
    module_identifiers: BTreeSet<String>,
    /// Types with an `impl Error for X` in this file
    error_impls: BTreeSet<String>,
    /// Struct/enum declarations seen, with their docs and line
    type_decls: Vec<(String, Option<ErrorKind>, Option<u32>, bool)>,
}

impl<'m> ItemCollector<'m> {
    fn new(markers: &'m ParserMarkers) -> Self {
        Self {
            markers,
            exports: Vec::new(),
            imports: Vec::new(),
            error_types: Vec::new(),
            functions: Vec::new(),
            module_identifiers: BTreeSet::new(),
            error_impls: BTreeSet::new(),
            type_decls: Vec::new(),
        }
    }

    fn collect_items(&mut self, items: &[syn::Item]) {
        for item in items {
            self.collect_item(item);
        }
    }

    fn collect_item(&mut self, item: &syn::Item) {
        match item {
            syn::Item::Use(item_use) => {
                if is_test_only(&item_use.attrs) {
                    return;
                }
                let line = line_of(item_use.span());
                let is_reexport = is_visible(&item_use.vis);
                let mut prefix = Vec::new();
                if item_use.leading_colon.is_some() {
                    prefix.push(String::new());
                }
                flatten_use_tree(&item_use.tree, &mut prefix, is_reexport, line, &mut self.imports);
            }
            syn::Item::Fn(item_fn) => {
                if is_test_only(&item_fn.attrs) {
                    return;
                }
                let name = item_fn.sig.ident.to_string();
                self.functions.push(function_facts(
                    &name,
                    &item_fn.attrs,
                    &item_fn.sig,
                    Some(&item_fn.block),
                ));
                if is_visible(&item_fn.vis) {
                    self.exports.push(self.signature_symbol(
                        name,
                        SymbolKind::Function,
                        &item_fn.sig,
                        &item_fn.attrs,
                    ));
                }
            }
            syn::Item::Struct(item_struct) => {
                if is_test_only(&item_struct.attrs) {
                    return;
                }
                let name = item_struct.ident.to_string();
                let mut refs = TypeRefCollector::default();
                for field in &item_struct.fields {
                    if let Some(ident) = &field.ident {
                        self.module_identifiers.insert(ident.to_string());
                    }
                    refs.visit_type(&field.ty);
                }
                let line = line_of(item_struct.ident.span());
                self.record_type(&name, &item_struct.attrs, &item_struct.vis, SymbolKind::Struct, refs, line);
            }
            syn::Item::Enum(item_enum) => {
                if is_test_only(&item_enum.attrs) {
                    return;
                }
                let name = item_enum.ident.to_string();
                let mut refs = TypeRefCollector::default();
                for variant in &item_enum.variants {
                    for field in &variant.fields {
                        refs.visit_type(&field.ty);
                    }
                }
                let line = line_of(item_enum.ident.span());
                self.record_type(&name, &item_enum.attrs, &item_enum.vis, SymbolKind::Enum, refs, line);
            }
            syn::Item::Trait(item_trait) => {
                if is_test_only(&item_trait.attrs) {
                    return;
                }
                let name = item_trait.ident.to_string();
                self.module_identifiers.insert(name.clone());
                let visible = is_visible(&item_trait.vis);
                let mut refs = TypeRefCollector::default();
                let mut methods = Vec::new();
                for trait_item in &item_trait.items {
                    let syn::TraitItem::Fn(method) = trait_item else {
                        continue;
                    };
                    if is_test_only(&method.attrs) {
                        continue;
                    }
                    refs.visit_signature(&method.sig);
                    let method_name = format!("{}::{}", name, method.sig.ident);
                    if let Some(block) = &method.default {
                        self.functions.push(function_facts(
                            &method_name,
                            &method.attrs,
                            &method.sig,
                            Some(block),
                        ));
                    }
                    if visible {
                        let mut symbol = self.signature_symbol(
                            method_name,
                            SymbolKind::Method,
                            &method.sig,
                            &method.attrs,
                        );
                        symbol.contract_tagged = true;
                        methods.push(symbol);
                    }
                }
                if visible {
                    let mut symbol = ExportedSymbol::new(name, SymbolKind::Trait);
                    symbol.type_refs = refs.paths;
                    symbol.contract_tagged = true;
                    symbol.line = Some(line_of(item_trait.ident.span()));
                    self.exports.push(symbol);
                    self.exports.extend(methods);
                }
            }
            syn::Item::Type(item_type) => {
                if is_test_only(&item_type.attrs) {
                    return;
                }
                let name = item_type.ident.to_string();
                self.module_identifiers.insert(name.clone());
                if is_visible(&item_type.vis) {
                    let mut refs = TypeRefCollector::default();
                    refs.visit_type(&item_type.ty);
                    let mut symbol = ExportedSymbol::new(name, SymbolKind::TypeAlias);
                    symbol.type_refs = refs.paths;
                    symbol.contract_tagged = self.has_contract_tag(&item_type.attrs);
                    symbol.line = Some(line_of(item_type.ident.span()));
                    self.exports.push(symbol);
                }
            }
            syn::Item::Const(item_const) => {
                if is_test_only(&item_const.attrs) {
                    return;
                }
                let name = item_const.ident.to_string();
                self.module_identifiers.insert(name.clone());
                if is_visible(&item_const.vis) {
                    let mut refs = TypeRefCollector::default();
                    refs.visit_type(&item_const.ty);
                    let mut symbol = ExportedSymbol::new(name, SymbolKind::Const);
                    symbol.type_refs = refs.paths;
                    symbol.line = Some(line_of(item_const.ident.span()));
                    self.exports.push(symbol);
                }
            }
            syn::Item::Static(item_static) => {
                if !is_test_only(&item_static.attrs) {
                    self.module_identifiers.insert(item_static.ident.to_string());
                }
            }
            syn::Item::Impl(item_impl) => {
                if !is_test_only(&item_impl.attrs) {
                    self.collect_impl(item_impl);
                }
            }
            syn::Item::Mod(item_mod) => {
                if is_test_only(&item_mod.attrs) {
                    return;
                }
                if let Some((_, items)) = &item_mod.content {
                    self.collect_items(items);
                }
            }
            _ => {}
        }
    }

    fn collect_impl(&mut self, item_impl: &syn::ItemImpl) {
        let Some(owner) = type_name(&item_impl.self_ty) else {
            return;
        };

        let trait_name = item_impl
            .trait_
            .as_ref()
            .and_then(|(_, path, _)| path.segments.last())
            .map(|segment| segment.ident.to_string());

        if trait_name.as_deref() == Some("Error") {
            self.error_impls.insert(owner.clone());
        }

        for impl_item in &item_impl.items {
            match impl_item {
                syn::ImplItem::Fn(method) => {
                    if is_test_only(&method.attrs) {
                        continue;
                    }
                    let name = format!("{}::{}", owner, method.sig.ident);
                    self.functions.push(function_facts(
                        &name,
                        &method.attrs,
                        &method.sig,
                        Some(&method.block),
                    ));
                    if trait_name.is_some() || is_visible(&method.vis) {
                        self.exports.push(self.signature_symbol(
                            name,
                            SymbolKind::Method,
                            &method.sig,
                            &method.attrs,
                        ));
                    }
                }
                syn::ImplItem::Const(constant) => {
                    self.module_identifiers.insert(constant.ident.to_string());
                }
                syn::ImplItem::Type(assoc) => {
                    self.module_identifiers.insert(assoc.ident.to_string());
                }
                _ => {}
            }
        }
    }

    fn signature_symbol(
        &self,
        name: String,
        kind: SymbolKind,
        sig: &syn::Signature,
        attrs: &[syn::Attribute],
    ) -> ExportedSymbol {
        let mut refs = TypeRefCollector::default();
        refs.visit_signature(sig);

        let mut symbol = ExportedSymbol::new(name, kind);
        symbol.type_refs = refs.paths;
        symbol.error_refs = error_refs(&sig.output);
        symbol.contract_tagged = self.has_contract_tag(attrs);
        symbol.line = Some(line_of(sig.ident.span()));
        symbol
    }

    fn record_type(
        &mut self,
        name: &str,
        attrs: &[syn::Attribute],
        vis: &syn::Visibility,
        kind: SymbolKind,
        refs: TypeRefCollector,
        line: u32,
    ) {
        self.module_identifiers.insert(name.to_string());

        let docs = doc_text(attrs);
        let annotated_kind = self.annotated_error_kind(&docs);
        let derives_error = derives(attrs, "Error");
        let line = Some(line);
        self.type_decls.push((
            name.to_string(),
            annotated_kind,
            line,
            derives_error || name.ends_with("Error") || annotated_kind.is_some(),
        ));

        if is_visible(vis) {
            let mut symbol = ExportedSymbol::new(name, kind);
            symbol.type_refs = refs.paths;
            symbol.contract_tagged = docs.contains(&self.markers.contract);
            symbol.line = line;
            self.exports.push(symbol);
        }
    }

    fn annotated_error_kind(&self, docs: &str) -> Option<ErrorKind> {
        let (_, rest) = docs.split_once(&self.markers.error_kind)?;
        let word = rest.split_whitespace().next()?;
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        match word.parse() {
            Ok(kind) => Some(kind),
            Err(e) => {
                tracing::warn!("Ignoring error kind annotation: {}", e);
                None
            }
        }
    }

    fn has_contract_tag(&self, attrs: &[syn::Attribute]) -> bool {
        doc_text(attrs).contains(&self.markers.contract)
    }

    /// Resolve error declarations once every impl has been seen
    fn finish(&mut self) {
        for (name, annotated_kind, line, looks_like_error) in self.type_decls.drain(..) {
            if looks_like_error || self.error_impls.contains(&name) {
                self.error_types.push(DeclaredErrorType { name, annotated_kind, line });
            }
        }
    }
}

/// Flatten a `use` tree into one import per leaf
fn flatten_use_tree(
    tree: &syn::UseTree,
    prefix: &mut Vec<String>,
    is_reexport: bool,
    line: u32,
    out: &mut Vec<RawImport>,
) {
    match tree {
        syn::UseTree::Path(path) => {
            prefix.push(path.ident.to_string());
            flatten_use_tree(&path.tree, prefix, is_reexport, line, out);
            prefix.pop();
        }
        syn::UseTree::Name(name) => {
            let ident = name.ident.to_string();
            let mut segments = prefix.clone();
            // `use foo::{self}` imports `foo` itself
            let local_name = if ident == "self" {
                segments.last().cloned()
            } else {
                segments.push(ident.clone());
                Some(ident)
            };
            out.push(RawImport { segments, local_name, is_glob: false, is_reexport, line: Some(line) });
        }
        syn::UseTree::Rename(rename) => {
            let ident = rename.ident.to_string();
            let mut segments = prefix.clone();
            if ident != "self" {
                segments.push(ident);
            }
            out.push(RawImport {
                segments,
                local_name: Some(rename.rename.to_string()).filter(|r| r != "_"),
                is_glob: false,
                is_reexport,
                line: Some(line),
            });
        }
        syn::UseTree::Glob(_) => {
            out.push(RawImport {
                segments: prefix.clone(),
                local_name: None,
                is_glob: true,
                is_reexport,
                line: Some(line),
            });
        }
        syn::UseTree::Group(group) => {
            for tree in &group.items {
                flatten_use_tree(tree, prefix, is_reexport, line, out);
            }
        }
    }
}

/// Collects every path mentioned in a type or signature, `::`-joined without generics
#[derive(Default)]
struct TypeRefCollector {
    paths: BTreeSet<String>,
}

impl<'ast> Visit<'ast> for TypeRefCollector {
    fn visit_path(&mut self, path: &'ast syn::Path) {
        let joined = join_path(path);
        if !joined.is_empty() {
            self.paths.insert(joined);
        }
        syn::visit::visit_path(self, path);
    }

    fn visit_block(&mut self, _block: &'ast syn::Block) {
        // Bodies are not part of a declaration
    }
}

/// Error types surfaced by a return type: `Result<_, E>`'s `E` plus any `*Error` path
fn error_refs(output: &syn::ReturnType) -> BTreeSet<String> {
    let mut errors = BTreeSet::new();
    let syn::ReturnType::Type(_, ty) = output else {
        return errors;
    };

    if let syn::Type::Path(type_path) = ty.as_ref() {
        if let Some(last) = type_path.path.segments.last() {
            if last.ident == "Result" {
                if let syn::PathArguments::AngleBracketed(args) = &last.arguments {
                    let types: Vec<&syn::Type> = args
                        .args
                        .iter()
                        .filter_map(|arg| match arg {
                            syn::GenericArgument::Type(ty) => Some(ty),
                            _ => None,
                        })
                        .collect();
                    if let Some(syn::Type::Path(error_path)) = types.get(1) {
                        errors.insert(join_path(&error_path.path));
                    }
                }
            }
        }
    }

    let mut refs = TypeRefCollector::default();
    refs.visit_type(ty);
    errors.extend(
        refs.paths
            .into_iter()
            .filter(|path| path.rsplit("::").next().map(|n| n.ends_with("Error")).unwrap_or(false)),
    );
    errors
}

/// Identifiers, paths, string literals and macro tokens of a function
#[derive(Default)]
struct IdentifierCollector {
    identifiers: BTreeSet<String>,
}

impl<'ast> Visit<'ast> for IdentifierCollector {
    fn visit_ident(&mut self, ident: &'ast proc_macro2::Ident) {
        self.identifiers.insert(ident.to_string());
    }

    fn visit_path(&mut self, path: &'ast syn::Path) {
        let joined = join_path(path);
        if joined.contains("::") {
            self.identifiers.insert(joined);
        }
        syn::visit::visit_path(self, path);
    }

    fn visit_lit_str(&mut self, lit: &'ast syn::LitStr) {
        self.identifiers.insert(lit.value());
    }

    fn visit_macro(&mut self, mac: &'ast syn::Macro) {
        collect_token_identifiers(mac.tokens.clone(), &mut self.identifiers);
        syn::visit::visit_macro(self, mac);
    }

    fn visit_item(&mut self, item: &'ast syn::Item) {
        // Nested test items do not count
        if let syn::Item::Fn(item_fn) = item {
            if is_test_only(&item_fn.attrs) {
                return;
            }
        }
        syn::visit::visit_item(self, item);
    }
}

/// Identifiers and `a::b` paths inside an unparsed macro token stream
fn collect_token_identifiers(tokens: TokenStream, out: &mut BTreeSet<String>) {
    let mut path: Vec<String> = Vec::new();
    let mut pending_colons = 0;

    let flush = |path: &mut Vec<String>, out: &mut BTreeSet<String>| {
        if path.len() > 1 {
            out.insert(path.join("::"));
        }
        path.clear();
    };

    for tree in tokens {
        match tree {
            TokenTree::Ident(ident) => {
                let name = ident.to_string();
                out.insert(name.clone());
                if pending_colons != 2 {
                    flush(&mut path, out);
                }
                path.push(name);
                pending_colons = 0;
            }
            TokenTree::Punct(punct) if punct.as_char() == ':' => {
                pending_colons += 1;
            }
            TokenTree::Group(group) => {
                flush(&mut path, out);
                pending_colons = 0;
                collect_token_identifiers(group.stream(), out);
            }
            TokenTree::Literal(literal) => {
                flush(&mut path, out);
                pending_colons = 0;
                let text = literal.to_string();
                if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
                    out.insert(inner.to_string());
                }
            }
            TokenTree::Punct(_) => {
                flush(&mut path, out);
                pending_colons = 0;
            }
        }
    }
    flush(&mut path, out);
}

fn function_facts(
    name: &str,
    attrs: &[syn::Attribute],
    sig: &syn::Signature,
    block: Option<&syn::Block>,
) -> FunctionFacts {
    let mut collector = IdentifierCollector::default();
    for attr in attrs {
        collector.visit_attribute(attr);
        collect_token_identifiers(attr.meta.to_token_stream(), &mut collector.identifiers);
    }
    collector.visit_signature(sig);
    if let Some(block) = block {
        collector.visit_block(block);
    }

    let params = sig
        .inputs
        .iter()
        .filter_map(|input| match input {
            syn::FnArg::Typed(pat_type) => {
                let syn::Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
                    return None;
                };
                let mut refs = TypeRefCollector::default();
                refs.visit_type(&pat_type.ty);
                Some((pat_ident.ident.to_string(), refs.paths))
            }
            syn::FnArg::Receiver(_) => None,
        })
        .collect();

    FunctionFacts {
        name: name.to_string(),
        attributes: attrs.iter().map(|attr| join_path(attr.path())).collect(),
        params,
        identifiers: collector.identifiers,
        line: Some(line_of(sig.ident.span())),
    }
}

fn join_path(path: &syn::Path) -> String {
    path.segments.iter().map(|segment| segment.ident.to_string()).collect::<Vec<_>>().join("::")
}

/// Last segment of an impl's self type, e.g. `UserRepository` for `impl<T> repo::UserRepository<T>`
fn type_name(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(type_path) => type_path.path.segments.last().map(|s| s.ident.to_string()),
        syn::Type::Reference(reference) => type_name(&reference.elem),
        syn::Type::Paren(paren) => type_name(&paren.elem),
        _ => None,
    }
}

fn is_visible(vis: &syn::Visibility) -> bool {
    !matches!(vis, syn::Visibility::Inherited)
}

/// `#[cfg(test)]` items and `#[test]` functions
fn is_test_only(attrs: &[syn::Attribute]) -> bool {
    attrs.iter().any(|attr| {
        if attr.path().is_ident("test") {
            return true;
        }
        if !attr.path().is_ident("cfg") {
            return false;
        }
        let mut is_test = false;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("test") {
                is_test = true;
            }
            Ok(())
        });
        is_test
    })
}

/// Whether a `#[derive(...)]` lists a trait with this final segment
fn derives(attrs: &[syn::Attribute], trait_name: &str) -> bool {
    attrs.iter().filter(|attr| attr.path().is_ident("derive")).any(|attr| {
        let mut found = false;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.segments.last().map(|s| s.ident == trait_name).unwrap_or(false) {
                found = true;
            }
            Ok(())
        });
        found
    })
}

/// Concatenated `///` doc lines
fn doc_text(attrs: &[syn::Attribute]) -> String {
    let mut text = String::new();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("doc")) {
        if let syn::Meta::NameValue(name_value) = &attr.meta {
            if let syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Str(doc), .. }) = &name_value.value {
                text.push_str(doc.value().trim());
                text.push('\n');
            }
        }
    }
    text
}

fn line_of(span: proc_macro2::Span) -> u32 {
    span.start().line as u32
}
