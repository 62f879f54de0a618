//! Layer Guardian CLI - Command-line interface for architecture conformance checks
//!
//! CDD Principle: Application Layer - CLI coordinates user interactions with domain services
//! - Translates user commands to engine operations
//! - Handles external concerns like process exit codes, signals and terminal output
//! - Report output goes to stdout; logs and diagnostics go to stderr

use clap::{Parser, Subcommand, ValueEnum};
use layer_guardian::config::FailOn;
use layer_guardian::domain::catalog::{find_rule, RULE_CATALOG};
use layer_guardian::{
    Baseline, CancelFlag, ConformanceEngine, GuardianConfig, GuardianError, GuardianResult,
    Layer, LayerMatrix, OutputFormat, Report, ReportFormatter, ReportOptions,
};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Layer Guardian - Static conformance checking for layered Rust code
#[derive(Parser)]
#[command(name = "layer-guardian")]
#[command(version)]
#[command(about = "Static conformance checking for layered, dependency-inverted Rust codebases")]
#[command(long_about = "Layer Guardian builds the module dependency graph of a Rust tree, classifies every module into an architectural layer and reports dependency direction, cycle, leakage, error taxonomy and resilience violations. Designed for CI gates.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a source tree for architecture violations
    Check {
        /// Root of the tree to analyze
        root: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormatArg,

        /// Lowest severity that fails the run
        #[arg(long, value_enum)]
        fail_on: Option<FailOnArg>,

        /// Fail once the warning count exceeds this value
        #[arg(long)]
        warning_threshold: Option<usize>,

        /// Compare against a baseline of accepted violations
        #[arg(long)]
        baseline: Option<PathBuf>,

        /// Write the violations of this run as a baseline
        #[arg(long)]
        write_baseline: Option<PathBuf>,
    },

    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config_file: Option<PathBuf>,
    },

    /// Explain what a specific rule checks
    Explain {
        /// Rule ID to explain
        rule_id: String,
    },

    /// List the rule catalog and the effective layer matrix
    Rules,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    Text,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Text => OutputFormat::Text,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FailOnArg {
    Error,
    Warning,
}

impl From<FailOnArg> for FailOn {
    fn from(arg: FailOnArg) -> Self {
        match arg {
            FailOnArg::Error => FailOn::Error,
            FailOnArg::Warning => FailOn::Warning,
        }
    }
}

/// Options of one `check` invocation
struct CheckArgs {
    root: PathBuf,
    config_path: Option<PathBuf>,
    format: OutputFormat,
    fail_on: Option<FailOn>,
    warning_threshold: Option<usize>,
    baseline: Option<PathBuf>,
    write_baseline: Option<PathBuf>,
    use_colors: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let exit_code = match run_command(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    };

    process::exit(exit_code);
}

async fn run_command(cli: Cli) -> GuardianResult<i32> {
    match cli.command {
        Commands::Check {
            root,
            format,
            fail_on,
            warning_threshold,
            baseline,
            write_baseline,
        } => {
            let args = CheckArgs {
                root,
                config_path: cli.config,
                format: format.into(),
                fail_on: fail_on.map(Into::into),
                warning_threshold,
                baseline,
                write_baseline,
                use_colors: !cli.no_color && !matches!(format, OutputFormatArg::Json),
            };
            let cancel = CancelFlag::new();
            cancel.install_ctrlc_handler()?;
            run_check(args, &cancel).await
        }
        Commands::ValidateConfig { config_file } => run_validate_config(config_file.or(cli.config)),
        Commands::Explain { rule_id } => run_explain(&rule_id),
        Commands::Rules => run_list_rules(cli.config),
    }
}

async fn run_check(args: CheckArgs, cancel: &CancelFlag) -> GuardianResult<i32> {
    let mut config = load_config(args.config_path.as_deref(), &args.root)?;
    if let Some(fail_on) = args.fail_on {
        config.report.fail_on = fail_on;
    }
    if args.warning_threshold.is_some() {
        config.report.warning_threshold = args.warning_threshold;
    }

    let engine = ConformanceEngine::new(config)?;
    let report = engine.check(&args.root, cancel).await?;

    let formatter = ReportFormatter::new(ReportOptions { use_colors: args.use_colors });
    formatter.write_report(&report, args.format, std::io::stdout().lock())?;

    if let Some(path) = &args.baseline {
        compare_baseline(path, &report)?;
    }

    if let Some(path) = &args.write_baseline {
        let baseline = Baseline::from_report(&report);
        baseline.save(path)?;
        eprintln!("Wrote {} baseline entries to {}", baseline.len(), path.display());
    }

    Ok(if report.passed() { 0 } else { 1 })
}

/// The config given on the command line, else the one discovered in the root
fn load_config(config_path: Option<&Path>, root: &Path) -> GuardianResult<GuardianConfig> {
    match config_path {
        Some(path) => GuardianConfig::load_from_file(path),
        None if root.is_dir() => GuardianConfig::load_for_root(root),
        None => Err(GuardianError::usage(format!(
            "Root path does not exist or is not a directory: {}",
            root.display()
        ))),
    }
}

/// Print the baseline comparison to stderr; the report and exit code are unaffected
fn compare_baseline(path: &Path, report: &Report) -> GuardianResult<()> {
    let baseline = Baseline::load(path)?;
    if baseline.is_stale_for(report) {
        eprintln!("warning: baseline {} was written under a different configuration", path.display());
    }

    let diff = baseline.diff(report);
    eprintln!(
        "Baseline: {} new, {} known, {} resolved",
        diff.new.len(),
        diff.known.len(),
        diff.resolved.len()
    );
    for violation in &diff.new {
        eprintln!("  new: {}", violation.format_display());
    }
    Ok(())
}

fn run_validate_config(config_path: Option<PathBuf>) -> GuardianResult<i32> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from("layer_guardian.yaml"));

    println!("Validating configuration: {}", config_path.display());

    let config = GuardianConfig::load_from_file(&config_path)?;
    println!("Configuration is valid");
    println!("  Layer patterns: {}", config.layers.patterns.len());
    println!("  Matrix overrides: {}", config.layers.matrix_overrides.len());
    println!("  Contract boundaries: {}", config.layers.contract_boundaries.len());
    println!(
        "  Leakage deny-list: {} names, {} patterns",
        config.leakage.deny_types.len(),
        config.leakage.deny_patterns.len()
    );
    println!("  Resilience markers: {}", config.resilience.markers.len());
    println!("  Fingerprint: {}", config.fingerprint());
    Ok(0)
}

fn run_explain(rule_id: &str) -> GuardianResult<i32> {
    let Some(rule) = find_rule(rule_id) else {
        let known: Vec<&str> = RULE_CATALOG.iter().map(|rule| rule.id).collect();
        return Err(GuardianError::usage(format!(
            "Unknown rule '{rule_id}'. Available rules: {}",
            known.join(", ")
        )));
    };

    println!("Rule: {}", rule.id);
    println!("Reported by: {}", rule.family);
    println!("Severity: {}", rule.severity.as_str());
    println!();
    println!("{}", rule.summary);
    println!();
    println!("{}", rule.explanation);
    Ok(0)
}

fn run_list_rules(config_path: Option<PathBuf>) -> GuardianResult<i32> {
    let config = match config_path {
        Some(path) => GuardianConfig::load_from_file(path)?,
        None => GuardianConfig::default(),
    };

    println!("Rules:");
    for rule in RULE_CATALOG {
        println!("  {:<32} [{}] {}", rule.id, rule.severity.as_str(), rule.summary);
    }

    println!();
    println!("Layer matrix:");
    let matrix = LayerMatrix::from_config(&config.layers);
    for layer in Layer::ALL {
        let targets: Vec<String> =
            matrix.allowed_targets(layer).into_iter().map(|target| target.to_string()).collect();
        let targets = if targets.is_empty() { "(none)".to_string() } else { targets.join(", ") };
        println!("  {:<15} -> {}", layer.to_string(), targets);
    }
    if !config.layers.allow_same_layer {
        println!("  (same-layer imports disabled)");
    }
    Ok(0)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn check_args(root: &Path) -> CheckArgs {
        CheckArgs {
            root: root.to_path_buf(),
            config_path: None,
            format: OutputFormat::Json,
            fail_on: None,
            warning_threshold: None,
            baseline: None,
            write_baseline: None,
            use_colors: false,
        }
    }

    #[tokio::test]
    async fn test_check_command() {
        let temp_dir = TempDir::new().unwrap();
        let domain = temp_dir.path().join("src/domain");
        fs::create_dir_all(&domain).unwrap();
        fs::write(domain.join("user.rs"), "use crate::infrastructure::db::Pool;\npub struct User;\n").unwrap();
        fs::create_dir_all(temp_dir.path().join("src/infrastructure")).unwrap();
        fs::write(temp_dir.path().join("src/infrastructure/db.rs"), "pub struct Pool;\n").unwrap();

        let result = run_check(check_args(temp_dir.path()), &CancelFlag::new()).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_warning_override() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("src")).unwrap();
        fs::write(temp_dir.path().join("src/util.rs"), "pub fn helper() {}\n").unwrap();

        let result = run_check(check_args(temp_dir.path()), &CancelFlag::new()).await;
        assert_eq!(result.unwrap(), 0);

        let mut args = check_args(temp_dir.path());
        args.fail_on = Some(FailOn::Warning);
        assert_eq!(run_check(args, &CancelFlag::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_then_compare_baseline() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("src")).unwrap();
        fs::write(temp_dir.path().join("src/util.rs"), "pub fn helper() {}\n").unwrap();
        let baseline_path = temp_dir.path().join("baseline.json");

        let mut args = check_args(temp_dir.path());
        args.write_baseline = Some(baseline_path.clone());
        assert_eq!(run_check(args, &CancelFlag::new()).await.unwrap(), 0);
        assert_eq!(Baseline::load(&baseline_path).unwrap().len(), 1);

        let mut args = check_args(temp_dir.path());
        args.baseline = Some(baseline_path);
        assert_eq!(run_check(args, &CancelFlag::new()).await.unwrap(), 0);
    }

    #[test]
    fn test_validate_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("layer_guardian.yaml");

        let yaml = serde_yaml::to_string(&GuardianConfig::default()).unwrap();
        fs::write(&config_file, yaml).unwrap();
        assert_eq!(run_validate_config(Some(config_file.clone())).unwrap(), 0);

        fs::write(&config_file, "layers:\n  unknown_key: true\n").unwrap();
        assert_eq!(run_validate_config(Some(config_file)).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn test_explain_rule() {
        assert_eq!(run_explain("direction.cycle").unwrap(), 0);
        assert_eq!(run_explain("nonexistent_rule").unwrap_err().exit_code(), 2);
    }

    #[test]
    fn test_list_rules() {
        assert_eq!(run_list_rules(None).unwrap(), 0);
    }
}
