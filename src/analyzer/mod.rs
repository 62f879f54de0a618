//! Source loading for Layer Guardian
//!
//! CDD Principle: Domain Services - The loader turns a project tree into module records
//! - Discovers files through the path filter in a deterministic order
//! - Parses files concurrently on bounded tokio tasks, each under a per-file timeout
//! - Recovers from unreadable or unparsable files by reporting warnings, never by aborting

pub mod rust;

use crate::analyzer::rust::{ParserMarkers, RustModuleParser};
use crate::cancel::CancelFlag;
use crate::config::{GuardianConfig, LoaderConfig};
use crate::domain::catalog::{LOADER_UNPARSED, LOADER_UNREADABLE};
use crate::domain::model::{ModuleId, ParseStatus, ParsedModule};
use crate::domain::violations::{GuardianError, GuardianResult, Severity, Violation};
use crate::patterns::PathFilter;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Stack of each parse thread; syn recursion grows with bracket nesting
const PARSER_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Trait for source parsers
pub trait ModuleParser: Send + Sync {
    /// Parse one file into a module record; never fails
    fn parse(&self, relative_path: &Path, content: &str) -> ParsedModule;

    /// Check if this parser handles the given file type
    fn handles_file(&self, file_path: &Path) -> bool;
}

/// Everything the loader produced for one run
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// One record per discovered file, sorted by module id
    pub modules: Vec<ParsedModule>,
    /// Warnings for unreadable and unparsable files
    pub violations: Vec<Violation>,
}

/// Result of loading a single file
enum FileOutcome {
    Parsed(ParsedModule),
    Unreadable(ParsedModule, String),
}

/// Loads and parses every source file under a root
pub struct SourceLoader {
    parser: Arc<dyn ModuleParser>,
    path_filter: PathFilter,
    limits: LoaderConfig,
}

impl SourceLoader {
    /// Create a loader with the Rust parser and the configured filters
    pub fn new(config: &GuardianConfig) -> GuardianResult<Self> {
        let ignore_file = match config.paths.ignore_file.as_deref() {
            Some("") | None => None,
            Some(name) => Some(name.to_string()),
        };

        let path_filter = PathFilter::new(config.paths.patterns.clone(), ignore_file)
            .map_err(|e| GuardianError::config(format!("Failed to create path filter: {e}")))?;

        let parser = RustModuleParser::new(ParserMarkers::from_config(config))
            .with_max_nesting_depth(config.loader.max_nesting_depth);

        Ok(Self::with_parser(Arc::new(parser), path_filter, config.loader.clone()))
    }

    /// Create a loader around any parser
    pub fn with_parser(
        parser: Arc<dyn ModuleParser>,
        path_filter: PathFilter,
        limits: LoaderConfig,
    ) -> Self {
        Self { parser, path_filter, limits }
    }

    /// Files that will be loaded, relative to the root, in sorted order
    pub fn discover(&self, root: &Path) -> GuardianResult<Vec<PathBuf>> {
        let files = self.path_filter.find_rust_files(root)?;
        Ok(files.into_iter().filter(|path| self.parser.handles_file(path)).collect())
    }

    fn concurrency(&self) -> usize {
        match self.limits.max_concurrency {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            n => n,
        }
    }

    /// Load every file under `root`; returns once all tasks have joined
    pub async fn load(&self, root: &Path, cancel: &CancelFlag) -> GuardianResult<LoadOutcome> {
        let files = self.discover(root)?;
        tracing::debug!("Discovered {} source files under {}", files.len(), root.display());

        let semaphore = Arc::new(Semaphore::new(self.concurrency()));
        let timeout = Duration::from_millis(self.limits.file_timeout_ms);
        let mut tasks = JoinSet::new();

        for (index, relative) in files.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let parser = Arc::clone(&self.parser);
            let cancel = cancel.clone();
            let absolute = root.join(&relative);
            let max_bytes = self.limits.max_file_bytes;

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| GuardianError::internal("loader", e.to_string()))?;
                cancel.checkpoint()?;

                let load = load_file(parser, absolute, relative.clone(), max_bytes);
                let outcome = match tokio::time::timeout(timeout, load).await {
                    Ok(outcome) => outcome?,
                    Err(_) => {
                        let (id, crate_name) = rust::module_identity(&relative);
                        let reason = format!("timed out after {} ms", timeout.as_millis());
                        FileOutcome::Unreadable(
                            ParsedModule::unparsed(id, relative, crate_name, reason.clone()),
                            reason,
                        )
                    }
                };
                Ok::<_, GuardianError>((index, outcome))
            });
        }

        let mut results: Vec<Option<FileOutcome>> = (0..files.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(GuardianError::internal("loader", format!("worker failed: {e}")));
                }
            };
            results[index] = Some(outcome);
        }
        cancel.checkpoint()?;

        let mut modules = Vec::with_capacity(files.len());
        let mut unreadable: BTreeMap<PathBuf, String> = BTreeMap::new();
        for result in results.into_iter().flatten() {
            match result {
                FileOutcome::Parsed(module) => modules.push(module),
                FileOutcome::Unreadable(module, reason) => {
                    unreadable.insert(module.path.clone(), reason);
                    modules.push(module);
                }
            }
        }

        disambiguate_ids(&mut modules);
        modules.sort_by(|a, b| a.id.cmp(&b.id));

        let mut violations = Vec::new();
        for module in &modules {
            if let Some(reason) = unreadable.get(&module.path) {
                violations.push(loader_warning(module, LOADER_UNREADABLE, reason));
            } else if let ParseStatus::Unparsed { reason } = &module.status {
                violations.push(loader_warning(module, LOADER_UNPARSED, reason));
            }
        }

        Ok(LoadOutcome { modules, violations })
    }
}

/// Read and parse one file; parsing runs on the blocking pool
async fn load_file(
    parser: Arc<dyn ModuleParser>,
    absolute: PathBuf,
    relative: PathBuf,
    max_bytes: u64,
) -> GuardianResult<FileOutcome> {
    let unreadable = |relative: PathBuf, reason: String| {
        let (id, crate_name) = rust::module_identity(&relative);
        FileOutcome::Unreadable(
            ParsedModule::unparsed(id, relative, crate_name, reason.clone()),
            reason,
        )
    };

    match tokio::fs::metadata(&absolute).await {
        Ok(metadata) if metadata.len() > max_bytes => {
            let reason = format!("file is {} bytes, limit is {}", metadata.len(), max_bytes);
            return Ok(unreadable(relative, reason));
        }
        Ok(_) => {}
        Err(e) => return Ok(unreadable(relative, format!("failed to stat file: {e}"))),
    }

    let content = match tokio::fs::read_to_string(&absolute).await {
        Ok(content) => content,
        Err(e) => return Ok(unreadable(relative, format!("failed to read file: {e}"))),
    };

    let module = tokio::task::spawn_blocking(move || parse_on_large_stack(parser, relative, content))
        .await
        .map_err(|e| GuardianError::internal("loader", format!("parser failed: {e}")))??;
    Ok(FileOutcome::Parsed(module))
}

/// Run the parser on a dedicated thread sized by `PARSER_STACK_BYTES`
fn parse_on_large_stack(
    parser: Arc<dyn ModuleParser>,
    relative: PathBuf,
    content: String,
) -> GuardianResult<ParsedModule> {
    let handle = std::thread::Builder::new()
        .name("layer-guardian-parse".to_string())
        .stack_size(PARSER_STACK_BYTES)
        .spawn(move || parser.parse(&relative, &content))?;

    handle
        .join()
        .map_err(|_| GuardianError::internal("loader", "parser thread panicked"))
}

fn loader_warning(module: &ParsedModule, rule_id: &str, reason: &str) -> Violation {
    let message = if rule_id == LOADER_UNPARSED {
        format!("Module could not be parsed: {reason}")
    } else {
        format!("Module could not be read: {reason}")
    };
    Violation::new(rule_id, Severity::Warning, module.id.clone(), message)
        .with_location(&module.path, None)
}

/// Give later files sharing an id (e.g. `main.rs` next to `lib.rs`) a suffix from their file stem
fn disambiguate_ids(modules: &mut [ParsedModule]) {
    modules.sort_by(|a, b| a.path.cmp(&b.path));
    let mut seen: BTreeSet<ModuleId> = BTreeSet::new();
    for module in modules.iter_mut() {
        if seen.insert(module.id.clone()) {
            continue;
        }
        let stem = module
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().replace('-', "_"))
            .unwrap_or_else(|| "file".to_string());
        let mut candidate = ModuleId::new(format!("{}::{}", module.id, stem));
        let mut counter = 2;
        while seen.contains(&candidate) {
            candidate = ModuleId::new(format!("{}::{}{}", module.id, stem, counter));
            counter += 1;
        }
        tracing::warn!(
            "Module id {} is shared by several files; using {} for {}",
            module.id,
            candidate,
            module.path.display()
        );
        seen.insert(candidate.clone());
        module.id = candidate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn loader(config: &GuardianConfig) -> SourceLoader {
        SourceLoader::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_empty_root_loads_nothing() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let outcome = loader(&GuardianConfig::default())
            .load(temp_dir.path(), &CancelFlag::new())
            .await?;

        assert!(outcome.modules.is_empty());
        assert!(outcome.violations.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_directory_load_is_sorted_and_filtered() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        fs::create_dir_all(root.join("src/domain"))?;
        fs::create_dir_all(root.join("target/debug"))?;
        fs::write(root.join("src/lib.rs"), "pub mod domain;")?;
        fs::write(root.join("src/domain/user.rs"), "pub struct User;")?;
        fs::write(root.join("src/domain/mod.rs"), "pub mod user;")?;
        fs::write(root.join("target/debug/build.rs"), "fn main() {}")?;

        let outcome = loader(&GuardianConfig::default()).load(root, &CancelFlag::new()).await?;
        let ids: Vec<&str> = outcome.modules.iter().map(|m| m.id.as_str()).collect();

        assert_eq!(ids, vec!["crate", "crate::domain", "crate::domain::user"]);
        assert!(outcome.violations.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unparsable_file_becomes_warning() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        fs::create_dir_all(root.join("src"))?;
        fs::write(root.join("src/broken.rs"), "pub fn {")?;
        fs::write(root.join("src/fine.rs"), "pub fn ok() {}")?;

        let outcome = loader(&GuardianConfig::default()).load(root, &CancelFlag::new()).await?;

        assert_eq!(outcome.modules.len(), 2);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule_id, LOADER_UNPARSED);
        assert_eq!(outcome.violations[0].primary_module(), "crate::broken");
        assert!(!outcome.modules[0].status.is_parsed());
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_file_is_unreadable() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        fs::create_dir_all(root.join("src"))?;
        fs::write(root.join("src/big.rs"), "pub struct Big;\n".repeat(64))?;

        let mut config = GuardianConfig::default();
        config.loader.max_file_bytes = 100;
        let outcome = loader(&config).load(root, &CancelFlag::new()).await?;

        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule_id, LOADER_UNREADABLE);
        assert_eq!(outcome.violations[0].severity, Severity::Warning);
        Ok(())
    }

    #[tokio::test]
    async fn test_lib_and_main_get_distinct_ids() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        fs::create_dir_all(root.join("src"))?;
        fs::write(root.join("src/lib.rs"), "")?;
        fs::write(root.join("src/main.rs"), "fn main() {}")?;

        let outcome = loader(&GuardianConfig::default()).load(root, &CancelFlag::new()).await?;
        let ids: Vec<&str> = outcome.modules.iter().map(|m| m.id.as_str()).collect();

        assert_eq!(ids, vec!["crate", "crate::main"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_deeply_nested_file_is_unparsed_and_run_continues() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src"))?;

        let deep = format!("fn f() {{ let x = {}1{}; }}\n", "(".repeat(3_000), ")".repeat(3_000));
        fs::write(root.join("src/deep.rs"), deep)?;
        fs::write(root.join("src/ok.rs"), "pub fn ok() {}")?;

        let outcome = loader(&GuardianConfig::default()).load(root, &CancelFlag::new()).await?;

        assert_eq!(outcome.modules.len(), 2);
        assert_eq!(outcome.modules[0].id.as_str(), "crate::deep");
        assert!(!outcome.modules[0].status.is_parsed());
        assert!(outcome.modules[1].status.is_parsed());
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule_id, LOADER_UNPARSED);
        assert!(outcome.violations[0].message.contains("nesting deeper than 256"));
        Ok(())
    }

    #[tokio::test]
    async fn test_nesting_within_limit_parses() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src"))?;

        let nested = format!("pub fn f() -> u32 {{ {}1{} }}\n", "(".repeat(1_000), ")".repeat(1_000));
        fs::write(root.join("src/nested.rs"), nested)?;

        let mut config = GuardianConfig::default();
        config.loader.max_nesting_depth = 2_000;
        let outcome = loader(&config).load(root, &CancelFlag::new()).await?;

        assert!(outcome.violations.is_empty());
        assert!(outcome.modules[0].status.is_parsed());
        Ok(())
    }

    /// Delegates to the Rust parser but stalls on `slow.rs`
    struct StallingParser {
        inner: RustModuleParser,
    }

    impl ModuleParser for StallingParser {
        fn parse(&self, relative_path: &Path, content: &str) -> ParsedModule {
            if relative_path.ends_with("slow.rs") {
                std::thread::sleep(Duration::from_millis(2_000));
            }
            self.inner.parse(relative_path, content)
        }

        fn handles_file(&self, file_path: &Path) -> bool {
            self.inner.handles_file(file_path)
        }
    }

    #[tokio::test]
    async fn test_file_timeout_becomes_unreadable_warning() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src"))?;
        fs::write(root.join("src/slow.rs"), "pub fn slow() {}")?;
        fs::write(root.join("src/fast.rs"), "pub fn fast() {}")?;

        let config = GuardianConfig::default();
        let path_filter = PathFilter::new(config.paths.patterns.clone(), None).unwrap();
        let limits = LoaderConfig { file_timeout_ms: 250, ..LoaderConfig::default() };
        let parser = StallingParser { inner: RustModuleParser::default() };
        let loader = SourceLoader::with_parser(Arc::new(parser), path_filter, limits);

        let outcome = loader.load(root, &CancelFlag::new()).await?;

        assert_eq!(outcome.modules.len(), 2);
        assert_eq!(outcome.modules[0].id.as_str(), "crate::fast");
        assert!(outcome.modules[0].status.is_parsed());
        assert!(!outcome.modules[1].status.is_parsed());
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule_id, LOADER_UNREADABLE);
        assert_eq!(outcome.violations[0].primary_module(), "crate::slow");
        assert!(outcome.violations[0].message.contains("timed out after 250 ms"));
        Ok(())
    }

    #[tokio::test]
    async fn test_warning_names_disambiguated_id() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src"))?;
        fs::write(root.join("src/lib.rs"), "pub mod domain;")?;
        fs::write(root.join("src/main.rs"), "fn main( {")?;

        let outcome = loader(&GuardianConfig::default()).load(root, &CancelFlag::new()).await?;

        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule_id, LOADER_UNPARSED);
        assert_eq!(outcome.violations[0].primary_module(), "crate::main");
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_load_returns_cancelled() -> GuardianResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src"))?;
        fs::write(root.join("src/lib.rs"), "")?;

        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = loader(&GuardianConfig::default()).load(root, &cancel).await;

        assert!(matches!(result, Err(GuardianError::Cancelled)));
        Ok(())
    }
}
