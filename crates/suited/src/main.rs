use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use suite_core::{
    load_config, save_config, GenerationReport, GeneratorConfig, JobId, LineRange,
    PipelineState, SourceStructure, TargetScope, Validate, ValidationIssue, ValidationLevel,
};
use suited::{
    CancelOutcome, ChannelDelivery, DeliveredResult, GenerationRequest, PipelineOrchestrator,
    ResultSubscriber, StateStore,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "suitegen.toml";
const UI_TICK: Duration = Duration::from_millis(100);
const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "suitegen", version, about = "Cache-first unit test generation")]
struct Cli {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Generate tests for one class, method or line.
    Generate(GenerateArgs),
    /// Write a configuration file with every default spelled out.
    InitConfig {
        #[arg(long)]
        force: bool,
    },
    /// Print validation issues of the configuration.
    CheckConfig {
        /// Also print the effective configuration.
        #[arg(long)]
        print: bool,
    },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Source file the generated tests belong to.
    #[arg(long)]
    file: String,
    /// Fully qualified name of the class under test.
    #[arg(long)]
    class: String,
    /// Method descriptor, e.g. `bake(I)V`.
    #[arg(long, conflicts_with = "line")]
    method: Option<String>,
    #[arg(long)]
    line: Option<u32>,
    /// Lines whose cached tests satisfy the request, `FROM-TO` or `LINE`.
    #[arg(long, value_parser = parse_line_range)]
    lines: Option<LineRange>,
    /// JSON method structure of the file, used for static invalidation.
    #[arg(long)]
    structure: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    source_version: i64,
    /// Skip the cache lookup.
    #[arg(long)]
    force: bool,
    /// Print the delivered report as JSON.
    #[arg(long)]
    json: bool,
}

fn parse_line_range(raw: &str) -> Result<LineRange, String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid line `{part}`: {err}"))
    };
    let range = match raw.split_once('-') {
        Some((from, to)) => LineRange::new(parse(from)?, parse(to)?),
        None => LineRange::single(parse(raw)?),
    };
    if range.from == 0 {
        return Err("lines are 1-based".to_string());
    }
    if range.is_empty() {
        return Err(format!("empty line range {raw}"));
    }
    Ok(range)
}

impl GenerateArgs {
    fn scope(&self) -> TargetScope {
        match (&self.method, self.line) {
            (Some(descriptor), _) => TargetScope::Method {
                descriptor: descriptor.clone(),
            },
            (None, Some(line)) => TargetScope::Line { line },
            (None, None) => TargetScope::Class,
        }
    }

    fn request(&self) -> Result<GenerationRequest> {
        let mut request = GenerationRequest::new(
            suite_core::FileId::new(self.file.clone()),
            self.class.clone(),
            self.scope(),
        )
        .with_source_version(self.source_version);

        let lookup = self.lines.or(self.line.map(LineRange::single));
        if let Some(lines) = lookup {
            request = request.with_lookup(lines);
        }
        if let Some(path) = &self.structure {
            let body = fs::read_to_string(path)
                .with_context(|| format!("failed to read structure file {}", path.display()))?;
            let structure = SourceStructure::from_json_str(&body)
                .with_context(|| format!("failed to parse structure file {}", path.display()))?;
            request = request.with_source(structure);
        }
        if self.force {
            request = request.forced();
        }
        Ok(request)
    }
}

/// Collects deliveries on the thread that drains the delivery queue.
#[derive(Default)]
struct DeliveredTests {
    results: Mutex<Vec<DeliveredResult>>,
}

impl ResultSubscriber for DeliveredTests {
    fn on_result(&self, result: &DeliveredResult) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
    }
}

#[derive(Debug, Serialize)]
struct GeneratedOutput<'a> {
    job_id: &'a JobId,
    from_cache: bool,
    report: &'a GenerationReport,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("suitegen failed: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        CliCommand::Generate(args) => run_generate(&cli.config, args),
        CliCommand::InitConfig { force } => run_init_config(&cli.config, force),
        CliCommand::CheckConfig { print } => run_check_config(&cli.config, print),
    }
}

fn load_or_default(path: &Path) -> Result<GeneratorConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(GeneratorConfig::default());
    }
    load_config(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn print_issues(issues: &[ValidationIssue]) {
    for issue in issues {
        let level = match issue.level {
            ValidationLevel::Error => "error",
            ValidationLevel::Warning => "warning",
        };
        eprintln!("[{level}] {}: {}", issue.code, issue.message);
    }
}

fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.level == ValidationLevel::Error)
}

fn run_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_config(path, &GeneratorConfig::default())
        .with_context(|| format!("failed to write config {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(0)
}

fn run_check_config(path: &Path, print: bool) -> Result<i32> {
    let config = load_or_default(path)?;
    let issues = config.validate();
    print_issues(&issues);
    if print {
        let body = toml::to_string_pretty(&config).context("failed to render config")?;
        println!("{body}");
    }
    if has_errors(&issues) {
        return Ok(1);
    }
    if issues.is_empty() {
        println!("{}: ok", path.display());
    }
    Ok(0)
}

fn run_generate(config_path: &Path, args: GenerateArgs) -> Result<i32> {
    let config = load_or_default(config_path)?;
    let issues = config.validate();
    print_issues(&issues);
    if has_errors(&issues) {
        bail!("configuration {} is invalid", config_path.display());
    }
    let request = args.request()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))
        .context("failed to install Ctrl-C handler")?;

    let store = StateStore::from_config(&config);
    let _run_lock = match &store {
        Some(store) => Some(store.lock().context("cannot start generation")?),
        None => None,
    };

    let (delivery, queue) = ChannelDelivery::new();
    let orchestrator = PipelineOrchestrator::builder(config)
        .delivery(Arc::new(delivery))
        .build();
    if let Some(store) = &store {
        store
            .load(orchestrator.cache(), orchestrator.invalidator())
            .context("failed to restore saved state")?;
    }
    let delivered = Arc::new(DeliveredTests::default());
    orchestrator.subscribe(delivered.clone());

    let handle = orchestrator.start(request)?;
    let mut cancel_sent = false;
    let mut last_shown = None;
    let snapshot = loop {
        queue.run_next(UI_TICK);

        if interrupted.load(Ordering::SeqCst) && !cancel_sent {
            cancel_sent = true;
            match handle.cancel() {
                CancelOutcome::Requested => eprintln!("cancelling {}", handle.job_id()),
                CancelOutcome::TooLate => {
                    eprintln!("engine already finished, waiting for its result")
                }
                CancelOutcome::AlreadyFinished => {}
            }
        }

        let snapshot = handle.snapshot();
        let shown = (snapshot.state, (snapshot.progress * 100.0).floor() as u32);
        if last_shown != Some(shown) {
            last_shown = Some(shown);
            if snapshot.state == PipelineState::Engine {
                eprintln!("[{}] {} {}%", handle.job_id(), snapshot.state, shown.1);
            } else {
                eprintln!("[{}] {}", handle.job_id(), snapshot.state);
            }
        }
        if snapshot.state.is_terminal() {
            queue.run_pending();
            break snapshot;
        }
    };

    if let Some(store) = &store {
        if let Err(err) = store.save(orchestrator.cache(), orchestrator.invalidator()) {
            tracing::warn!(dir = %store.dir().display(), error = %err, "failed to save state");
        }
    }

    match snapshot.state {
        PipelineState::Delivered => {
            let results = delivered
                .results
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for result in results.iter() {
                print_result(result, &args)?;
            }
            Ok(0)
        }
        PipelineState::Cancelled => Ok(EXIT_CANCELLED),
        _ => {
            if let Some(failure) = &snapshot.failure {
                eprintln!("generation failed: {failure}");
            }
            Ok(1)
        }
    }
}

fn print_result(result: &DeliveredResult, args: &GenerateArgs) -> Result<()> {
    if args.json {
        let output = GeneratedOutput {
            job_id: &result.job.job_id,
            from_cache: result.from_cache,
            report: &result.report,
        };
        let body = serde_json::to_string_pretty(&output).context("failed to render report")?;
        println!("{body}");
        return Ok(());
    }

    let origin = if result.from_cache { "cache" } else { "engine" };
    println!(
        "// {} test(s) for {} from {origin}",
        result.report.len(),
        result.job.target_unit
    );
    if let Some(package) = result.report.package_line() {
        println!("{package}");
    }
    for import in result.report.import_lines(&args.class) {
        println!("{import}");
    }
    for test in result.report.test_cases() {
        let lines: Vec<String> = test.covered_lines.iter().map(u32::to_string).collect();
        println!();
        println!("// {} covers lines {}", test.test_name, lines.join(", "));
        println!("{}", test.test_code);
    }
    Ok(())
}
