//! Module records produced by the loader and consumed by the graph
//!
//! Architecture: Value Objects - Everything here is plain data extracted from source files
//! - ParsedModule is what a single parse produces, before any layer is known
//! - Module is the frozen, classified record owned by the dependency graph

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Architectural layer of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Domain,
    Application,
    Infrastructure,
    Interfaces,
    Bootstrap,
}

impl Layer {
    /// All layers, innermost first
    pub const ALL: [Layer; 5] = [
        Layer::Domain,
        Layer::Application,
        Layer::Infrastructure,
        Layer::Interfaces,
        Layer::Bootstrap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Application => "application",
            Self::Infrastructure => "infrastructure",
            Self::Interfaces => "interfaces",
            Self::Bootstrap => "bootstrap",
        }
    }

    /// Whether modules of this layer carry business rules
    pub fn is_business(self) -> bool {
        matches!(self, Self::Domain | Self::Application)
    }

    /// Whether modules of this layer talk to the outside world
    pub fn is_edge(self) -> bool {
        matches!(self, Self::Infrastructure | Self::Interfaces)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Domain => "Domain",
            Self::Application => "Application",
            Self::Infrastructure => "Infrastructure",
            Self::Interfaces => "Interfaces",
            Self::Bootstrap => "Bootstrap",
        };
        f.write_str(name)
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "domain" => Ok(Self::Domain),
            "application" => Ok(Self::Application),
            "infrastructure" => Ok(Self::Infrastructure),
            "interfaces" => Ok(Self::Interfaces),
            "bootstrap" => Ok(Self::Bootstrap),
            other => Err(format!("unknown layer '{other}'")),
        }
    }
}

/// Layer assignment of a module; every module receives exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerAssignment {
    Layer(Layer),
    Unclassified,
}

impl LayerAssignment {
    pub fn layer(self) -> Option<Layer> {
        match self {
            Self::Layer(layer) => Some(layer),
            Self::Unclassified => None,
        }
    }
}

impl fmt::Display for LayerAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layer(layer) => layer.fmt(f),
            Self::Unclassified => f.write_str("Unclassified"),
        }
    }
}

/// Canonical module path, e.g. `crate::domain::user`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_segments(segments: &[String]) -> Self {
        Self(segments.join("::"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> Vec<String> {
        self.0.split("::").map(str::to_string).collect()
    }

    /// Last path segment, the module's short name
    pub fn name(&self) -> &str {
        self.0.rsplit("::").next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the loader managed to parse the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseStatus {
    Parsed,
    Unparsed { reason: String },
}

impl ParseStatus {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed)
    }
}

/// Kind of a public symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Struct,
    Enum,
    Trait,
    TypeAlias,
    Const,
}

impl SymbolKind {
    /// Whether the symbol represents an operation with a signature
    pub fn is_operation(self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }
}

/// A public symbol and the types its declaration mentions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedSymbol {
    /// Symbol name; methods are written `Owner::method`
    pub name: String,
    pub kind: SymbolKind,
    /// Every type path referenced by the declaration, `::`-joined
    pub type_refs: BTreeSet<String>,
    /// Types surfaced as errors by the return type
    pub error_refs: BTreeSet<String>,
    /// Tagged as an interface/contract boundary in its docs
    pub contract_tagged: bool,
    pub line: Option<u32>,
}

impl ExportedSymbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            type_refs: BTreeSet::new(),
            error_refs: BTreeSet::new(),
            contract_tagged: false,
            line: None,
        }
    }

    /// Name without an `Owner::` prefix
    pub fn short_name(&self) -> &str {
        self.name.rsplit("::").next().unwrap_or(&self.name)
    }
}

/// One flattened `use` path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImport {
    /// Path segments as written, e.g. `["crate", "domain", "user", "User"]`
    pub segments: Vec<String>,
    /// Name the import binds locally (rename or last segment)
    pub local_name: Option<String>,
    /// `use path::*`
    pub is_glob: bool,
    /// `pub use`
    pub is_reexport: bool,
    pub line: Option<u32>,
}

impl RawImport {
    pub fn path(&self) -> String {
        let mut path = self.segments.join("::");
        if self.is_glob {
            path.push_str("::*");
        }
        path
    }
}

/// Error category of the taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Business,
    System,
    External,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::System => "system",
            Self::External => "external",
        }
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "business" => Ok(Self::Business),
            "system" => Ok(Self::System),
            "external" => Ok(Self::External),
            other => Err(format!("unknown error kind '{other}'")),
        }
    }
}

/// An error type declared by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredErrorType {
    pub name: String,
    /// Explicit `error-kind:` annotation, if present and valid
    pub annotated_kind: Option<ErrorKind>,
    pub line: Option<u32>,
}

/// Identifiers observed in one function, used by the resilience audit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFacts {
    /// Function name; methods are written `Owner::method`
    pub name: String,
    /// Attribute paths, e.g. `tokio::main`
    pub attributes: BTreeSet<String>,
    /// Parameter names and their type paths
    pub params: Vec<(String, BTreeSet<String>)>,
    /// Identifiers and joined paths found in the signature and body
    pub identifiers: BTreeSet<String>,
    pub line: Option<u32>,
}

/// Output of parsing one file, before classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedModule {
    pub id: ModuleId,
    /// Path relative to the audited root
    pub path: PathBuf,
    /// Crate the file belongs to; `crate` for the root crate
    pub crate_name: String,
    pub status: ParseStatus,
    /// Raw token following the layer override marker
    pub layer_override: Option<String>,
    pub exports: Vec<ExportedSymbol>,
    pub imports: Vec<RawImport>,
    pub error_types: Vec<DeclaredErrorType>,
    pub functions: Vec<FunctionFacts>,
    /// Names declared at module level: consts, statics, fields, aliases
    pub module_identifiers: BTreeSet<String>,
}

impl ParsedModule {
    /// An empty record for a file that could not be read or parsed
    pub fn unparsed(
        id: ModuleId,
        path: PathBuf,
        crate_name: String,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id,
            path,
            crate_name,
            status: ParseStatus::Unparsed { reason: reason.into() },
            layer_override: None,
            exports: Vec::new(),
            imports: Vec::new(),
            error_types: Vec::new(),
            functions: Vec::new(),
            module_identifiers: BTreeSet::new(),
        }
    }

    pub fn export(&self, name: &str) -> Option<&ExportedSymbol> {
        self.exports.iter().find(|s| s.name == name)
    }
}

/// A classified module, owned by the dependency graph for the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub path: PathBuf,
    pub crate_name: String,
    pub layer: LayerAssignment,
    pub status: ParseStatus,
    pub exports: Vec<ExportedSymbol>,
    pub imports: Vec<RawImport>,
    pub error_types: Vec<DeclaredErrorType>,
    pub functions: Vec<FunctionFacts>,
    pub module_identifiers: BTreeSet<String>,
}

impl Module {
    pub fn from_parsed(parsed: ParsedModule, layer: LayerAssignment) -> Self {
        Self {
            id: parsed.id,
            path: parsed.path,
            crate_name: parsed.crate_name,
            layer,
            status: parsed.status,
            exports: parsed.exports,
            imports: parsed.imports,
            error_types: parsed.error_types,
            functions: parsed.functions,
            module_identifiers: parsed.module_identifiers,
        }
    }

    pub fn layer(&self) -> Option<Layer> {
        self.layer.layer()
    }

    /// Whether the module declares a public symbol with this short name
    pub fn declares(&self, name: &str) -> bool {
        self.exports.iter().any(|s| s.name == name)
            || self.error_types.iter().any(|e| e.name == name)
    }

    pub fn export(&self, name: &str) -> Option<&ExportedSymbol> {
        self.exports.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_round_trip_through_str() {
        for layer in Layer::ALL {
            assert_eq!(layer.as_str().parse::<Layer>(), Ok(layer));
        }
        assert!("persistence".parse::<Layer>().is_err());
        assert_eq!(" Domain ".parse::<Layer>(), Ok(Layer::Domain));
    }

    #[test]
    fn test_module_id_name() {
        let id = ModuleId::new("crate::infrastructure::user_repository");
        assert_eq!(id.name(), "user_repository");
        assert_eq!(id.segments().len(), 3);
        assert_eq!(ModuleId::new("crate").name(), "crate");
    }

    #[test]
    fn test_raw_import_path() {
        let import = RawImport {
            segments: vec!["crate".into(), "domain".into()],
            local_name: None,
            is_glob: true,
            is_reexport: false,
            line: None,
        };
        assert_eq!(import.path(), "crate::domain::*");
    }
}
