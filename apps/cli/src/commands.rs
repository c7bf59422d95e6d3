//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use narrascript_core::{
    Halt, PipelineConfig, ProgressReporter, PromptComposer, RunOutcome, RunReport, SegmentRecord,
    report_path, run_script, write_report, write_script,
};
use narrascript_gateway::{GatewayConfig, OpenRouterGateway, RetryingGateway};
use narrascript_outline::{normalize_escaped_newlines, parse_outline};
use narrascript_sanitizer::sanitizer_from;
use narrascript_shared::{
    AppConfig, ContextPolicyKind, DefaultsConfig, GenerationUnit, init_config, load_config,
    resolve_api_key,
};

/// Env var holding the outline text when `--outline` is not given.
const OUTLINE_ENV: &str = "INPUT_OUTLINE_TEXT";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// narrascript: outline in, narration script out.
#[derive(Parser)]
#[command(
    name = "narrascript",
    version,
    about = "Expand a story outline into a voiceover-ready narration script.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a narration script from an outline.
    Generate(GenerateArgs),

    /// Show how an outline will be split into units, without generating.
    Plan {
        /// Outline file, or `-` for stdin. Defaults to $INPUT_OUTLINE_TEXT.
        #[arg(long)]
        outline: Option<String>,

        /// Also print the prompt composed for each unit.
        #[arg(long)]
        show_prompts: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `generate`; each one overrides the config file.
#[derive(Args, Debug, Default)]
pub(crate) struct GenerateArgs {
    /// Outline file, or `-` for stdin. Defaults to $INPUT_OUTLINE_TEXT.
    #[arg(long)]
    pub outline: Option<String>,

    /// Where to write the script.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Model ID to request.
    #[arg(long)]
    pub model: Option<String>,

    /// Trailing sentences of earlier output shown to each unit.
    #[arg(long, conflicts_with = "full_context")]
    pub context_sentences: Option<usize>,

    /// Show each unit the whole script so far instead.
    #[arg(long)]
    pub full_context: bool,

    /// Include the numbered outline in every prompt.
    #[arg(long)]
    pub outline_summary: bool,

    /// Pause between units, in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Per-request timeout, in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Total attempts per unit on timeouts and connection failures.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Write the partial script if the run halts.
    #[arg(long)]
    pub save_partial: bool,

    /// Skip the `<out>.run.json` report.
    #[arg(long)]
    pub no_report: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "narrascript=info",
        1 => "narrascript=debug",
        _ => "narrascript=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate(args) => cmd_generate(args).await,
        Command::Plan {
            outline,
            show_prompts,
        } => cmd_plan(outline.as_deref(), show_prompts),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

async fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let mut config = load_config()?;
    apply_overrides(&mut config, &args);

    // Outline problems are reported before anything needs a key.
    let outline = read_outline(args.outline.as_deref())?;
    let units = parse_outline(&outline)?;

    let api_key = resolve_api_key(&config)?;
    let openrouter = OpenRouterGateway::new(GatewayConfig::from_app_config(&config, api_key))?;
    let model = openrouter.model().to_string();
    let gateway = RetryingGateway::from_config(openrouter, &config.retry);
    let sanitizer = sanitizer_from(&config.sanitizer)?;
    let composer = PromptComposer::from_config(&config);
    let pipeline = PipelineConfig::from_config(&config);

    let out = PathBuf::from(&config.defaults.output_file);
    info!(
        units = units.len(),
        model = %model,
        out = %out.display(),
        "generating script"
    );

    let reporter = CliProgress::new(units.len());
    let outcome = run_script(&units, &gateway, &sanitizer, &composer, &pipeline, &reporter).await;

    let written = write_outputs(&outcome, &out, &model, &config.defaults)?;
    print_summary(&outcome, written.then_some(out.as_path()));

    if let Some(err) = outcome.halt_error() {
        let index = outcome.halt.as_ref().map_or(0, |h| h.index);
        return Err(eyre!(err).wrap_err(format!(
            "run halted at unit {index} of {}",
            outcome.units_planned
        )));
    }
    outcome.document()?;
    Ok(())
}

/// Layer CLI flags over the loaded config.
fn apply_overrides(config: &mut AppConfig, args: &GenerateArgs) {
    if let Some(out) = &args.out {
        config.defaults.output_file = out.display().to_string();
    }
    if let Some(model) = &args.model {
        config.openrouter.default_model = model.clone();
    }
    if let Some(n) = args.context_sentences {
        config.context.policy = ContextPolicyKind::Trailing;
        config.context.sentences = n;
    }
    if args.full_context {
        config.context.policy = ContextPolicyKind::Full;
    }
    if args.outline_summary {
        config.context.include_outline_summary = true;
    }
    if let Some(ms) = args.delay_ms {
        config.defaults.inter_unit_delay_ms = ms;
    }
    if let Some(secs) = args.timeout_secs {
        config.openrouter.timeout_secs = secs.max(1);
    }
    if let Some(attempts) = args.retries {
        config.retry.max_attempts = attempts.max(1);
    }
    if args.save_partial {
        config.defaults.save_partial = true;
    }
    if args.no_report {
        config.defaults.write_report = false;
    }
}

/// Persist the script and, unless disabled, the run report next to it.
/// The report is written for halted runs too. Returns whether the script was written.
fn write_outputs(
    outcome: &RunOutcome,
    out: &Path,
    model: &str,
    defaults: &DefaultsConfig,
) -> Result<bool> {
    let written = persist(outcome, out, defaults.save_partial)?;
    if defaults.write_report {
        let report = RunReport::new(outcome, model, written.then_some(out));
        let path = report_path(out);
        write_report(&path, &report)?;
        info!(path = %path.display(), "run report written");
    }
    Ok(written)
}

/// Write the script if there is something worth keeping. Returns whether it was written.
fn persist(outcome: &RunOutcome, out: &Path, save_partial: bool) -> Result<bool> {
    if outcome.script.is_empty() {
        return Ok(false);
    }
    if !outcome.is_complete() && !save_partial {
        warn!("run halted; partial script not saved (use --save-partial to keep it)");
        return Ok(false);
    }
    write_script(out, &outcome.script)?;
    Ok(true)
}

fn print_summary(outcome: &RunOutcome, written: Option<&Path>) {
    println!();
    if outcome.is_complete() {
        println!("  Script generated.");
    } else {
        println!("  Run halted.");
    }
    println!(
        "  Units:  {}/{}",
        outcome.units_completed(),
        outcome.units_planned
    );
    println!("  Words:  {}", outcome.script.split_whitespace().count());
    if let Some(path) = written {
        println!("  Path:   {}", path.display());
    }
    println!("  Time:   {:.1}s", outcome.elapsed.as_secs_f64());
    for warning in &outcome.warnings {
        println!("  Warning: {warning}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

fn cmd_plan(outline: Option<&str>, show_prompts: bool) -> Result<()> {
    let config = load_config()?;
    let text = read_outline(outline)?;
    let units = parse_outline(&text)?;

    let mut composer = PromptComposer::from_config(&config);
    if config.context.include_outline_summary {
        composer = composer.with_outline_summary(&units);
    }

    for unit in &units {
        println!("{}", plan_line(unit));
        if show_prompts {
            println!();
            println!("{}", composer.compose(unit, ""));
            println!();
            println!("{}", "-".repeat(72));
        }
    }
    Ok(())
}

fn plan_line(unit: &GenerationUnit) -> String {
    let section = if unit.section_label.is_empty() {
        String::new()
    } else {
        format!("[{}] ", unit.section_label)
    };
    format!(
        "{:>3}/{:<3} {:<8} {section}{}",
        unit.index,
        unit.total,
        unit.role().as_str(),
        unit.instruction
    )
}

// ---------------------------------------------------------------------------
// Outline input
// ---------------------------------------------------------------------------

/// Read the outline from a file, stdin (`-`), or `$INPUT_OUTLINE_TEXT`.
fn read_outline(source: Option<&str>) -> Result<String> {
    match source {
        Some("-") => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| eyre!("failed to read outline from stdin: {e}"))?;
            Ok(text)
        }
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| eyre!("failed to read outline '{path}': {e}")),
        None => match std::env::var(OUTLINE_ENV) {
            Ok(text) if !text.trim().is_empty() => Ok(normalize_escaped_newlines(&text)),
            _ => Err(eyre!(
                "no outline given: pass --outline <file> (or - for stdin), or set {OUTLINE_ENV}"
            )),
        },
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    total: usize,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner, total }
    }
}

impl ProgressReporter for CliProgress {
    fn unit_started(&self, unit: &GenerationUnit) {
        self.spinner.set_message(format!(
            "Generating [{}/{}] {}",
            unit.index,
            self.total,
            truncate(&unit.instruction, 60)
        ));
    }

    fn unit_finished(&self, record: &SegmentRecord) {
        self.spinner.set_message(format!(
            "Appended [{}/{}] {} words",
            record.index, self.total, record.words
        ));
    }

    fn halted(&self, halt: &Halt) {
        self.spinner
            .set_message(format!("Halted at [{}/{}]: {}", halt.index, self.total, halt.error));
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrascript_shared::GatewayError;

    fn generate_args(argv: &[&str]) -> GenerateArgs {
        let mut full = vec!["narrascript", "generate"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).expect("parse args").command {
            Command::Generate(args) => args,
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn overrides_applied_over_config() {
        let args = generate_args(&[
            "--out",
            "out/story.txt",
            "--model",
            "test/model",
            "--full-context",
            "--outline-summary",
            "--delay-ms",
            "0",
            "--retries",
            "3",
            "--no-report",
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.defaults.output_file, "out/story.txt");
        assert_eq!(config.openrouter.default_model, "test/model");
        assert_eq!(config.context.policy, ContextPolicyKind::Full);
        assert!(config.context.include_outline_summary);
        assert_eq!(config.defaults.inter_unit_delay_ms, 0);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.defaults.write_report);
    }

    #[test]
    fn no_flags_keep_config() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &generate_args(&[]));

        assert_eq!(config.defaults.output_file, "generated_story.txt");
        assert_eq!(config.context.sentences, 2);
        assert_eq!(config.openrouter.timeout_secs, 180);
        assert!(config.defaults.write_report);
    }

    #[test]
    fn context_sentences_conflicts_with_full_context() {
        let result = Cli::try_parse_from([
            "narrascript",
            "generate",
            "--context-sentences",
            "3",
            "--full-context",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn outline_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outline.md");
        std::fs::write(&path, "### Intro\n- hook\n").unwrap();

        let text = read_outline(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(text, "### Intro\n- hook\n");
    }

    #[test]
    fn missing_outline_file_is_error() {
        assert!(read_outline(Some("/definitely/not/here.md")).is_err());
    }

    fn outcome(script: &str, halt: Option<Halt>) -> RunOutcome {
        let now = chrono::Utc::now();
        RunOutcome {
            script: script.into(),
            units_planned: 3,
            segments: vec![],
            halt,
            warnings: vec![],
            started_at: now,
            finished_at: now,
            elapsed: Duration::from_millis(10),
        }
    }

    fn halted_at(index: usize) -> Option<Halt> {
        Some(Halt {
            index,
            error: GatewayError::NonSuccessStatus {
                code: 503,
                body: "busy".into(),
            },
        })
    }

    fn report_json(out: &Path) -> serde_json::Value {
        let raw = std::fs::read_to_string(report_path(out)).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn complete_run_writes_script_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("story.txt");

        let written =
            write_outputs(&outcome("Hello world.", None), &out, "m", &DefaultsConfig::default())
                .unwrap();

        assert!(written);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "Hello world.");
        let json = report_json(&out);
        assert_eq!(json["status"], "complete");
        assert_eq!(json["output_file"], out.display().to_string());
    }

    #[test]
    fn halted_run_keeps_report_but_not_script() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("story.txt");

        let written = write_outputs(
            &outcome("Unit one.", halted_at(2)),
            &out,
            "m",
            &DefaultsConfig::default(),
        )
        .unwrap();

        assert!(!written);
        assert!(!out.exists());
        let json = report_json(&out);
        assert_eq!(json["status"], "halted");
        assert_eq!(json["halt"]["index"], 2);
        assert!(json.get("output_file").is_none());
    }

    #[test]
    fn halted_run_with_save_partial_writes_script() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("story.txt");
        let defaults = DefaultsConfig {
            save_partial: true,
            ..DefaultsConfig::default()
        };

        let written =
            write_outputs(&outcome("Unit one.", halted_at(2)), &out, "m", &defaults).unwrap();

        assert!(written);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "Unit one.");
        assert_eq!(report_json(&out)["status"], "halted");
    }

    #[test]
    fn empty_script_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("story.txt");

        let written =
            write_outputs(&outcome("", None), &out, "m", &DefaultsConfig::default()).unwrap();

        assert!(!written);
        assert!(!out.exists());
        assert_eq!(report_json(&out)["status"], "empty");
    }

    #[test]
    fn no_report_flag_skips_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("story.txt");
        let defaults = DefaultsConfig {
            write_report: false,
            ..DefaultsConfig::default()
        };

        write_outputs(&outcome("Done.", None), &out, "m", &defaults).unwrap();

        assert!(out.exists());
        assert!(!report_path(&out).exists());
    }

    #[test]
    fn plan_line_format() {
        let unit = GenerationUnit {
            section_label: "Intro".into(),
            instruction: "hook".into(),
            index: 1,
            total: 2,
        };
        assert_eq!(plan_line(&unit), "  1/2   opening  [Intro] hook");
    }
}
