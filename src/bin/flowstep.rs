//! CLI binary for flowstep.
//!
//! Loads a workflow context from JSON, runs one or more steps against it,
//! and prints the resulting context (or just the step outputs) as JSON.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use flowstep::{
    run_step, FailurePolicy, InferenceBackend, PageProgress, ProgressCallback, StepConfig,
    StepKind, StepOutputs, WorkflowContext,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Page progress via indicatif ──────────────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Live progress bar plus one log line per finished page.
struct CliProgress {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn page_elapsed(&self) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Stop the bar when a step fails before the batch completes.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl PageProgress for CliProgress {
    fn on_batch_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Analysing");
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Sending {total_pages} pages for analysis…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} pages analysed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages analysed  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # List steps with their inputs and outputs
  flowstep list

  # Extract a file path from an upload descriptor
  flowstep run extract_file_path --set 'media_data={"file_path":"uploads/memo.m4a"}'

  # OCR a stored PDF and index the result, continuing past failed pages
  flowstep chain pdf_ocr create_knowledge_config \
      --set 'dpr_file="tenders/DPR 2024/plan.pdf"' --policy continue -o ctx.json

  # Run against a saved context, printing only the step outputs
  flowstep run extract_specialist --context ctx.json --outputs-only

ENVIRONMENT VARIABLES:
  API_URL / CLIENT_URL      Platform API base URL (default http://localhost:4000)
  API_TOKEN / GIA_API_TOKEN Bearer token (else `token` or `user.token` in the context)
  PDFIUM_LIB_PATH           pdfium library file or directory
  RUST_LOG                  Log filter, overrides --verbose/--quiet

A .env file in the working directory is loaded first.
"#;

/// Run typed workflow steps against a JSON context.
#[derive(Parser, Debug)]
#[command(
    name = "flowstep",
    version,
    about = "Run typed workflow steps against a JSON context",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FLOWSTEP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FLOWSTEP_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every step with its inputs and outputs.
    List,
    /// Run a single step.
    Run {
        /// Step name, e.g. `pdf_ocr`.
        step: String,
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Run several steps in order, feeding each one's outputs to the next.
    Chain {
        /// Step names, in execution order.
        #[arg(required = true)]
        steps: Vec<String>,
        #[command(flatten)]
        opts: RunOpts,
    },
}

#[derive(Args, Debug)]
struct RunOpts {
    /// JSON file holding the starting context (`-` for stdin).
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// Set a context value: NAME=JSON. Values that are not valid JSON are taken as text.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Write the resulting JSON to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print only the outputs of the last step.
    #[arg(long)]
    outputs_only: bool,

    /// Platform API base URL.
    #[arg(long, env = "API_URL")]
    api_url: Option<String>,

    /// Bearer token for the platform API.
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// What a batch does when one page fails.
    #[arg(long, env = "FLOWSTEP_POLICY", value_enum, default_value = "continue")]
    policy: PolicyArg,

    /// Inference endpoint used for pages.
    #[arg(long, env = "FLOWSTEP_BACKEND", value_enum, default_value = "agent")]
    backend: BackendArg,

    /// Agent name for the agent-runtime backend.
    #[arg(long, env = "FLOWSTEP_AGENT")]
    agent: Option<String>,

    /// Page render scale (0.5–8.0; 2.0 ≈ 144 DPI).
    #[arg(long, env = "FLOWSTEP_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Per-page inference timeout in seconds.
    #[arg(long, env = "FLOWSTEP_INFERENCE_TIMEOUT", default_value_t = 120)]
    inference_timeout: u64,

    /// Storage transfer timeout in seconds (none by default).
    #[arg(long, env = "FLOWSTEP_TRANSFER_TIMEOUT")]
    transfer_timeout: Option<u64>,

    /// Path to a text file with a custom OCR prompt.
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Disable the page progress bar.
    #[arg(long, env = "FLOWSTEP_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Abort,
    Continue,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::Abort => FailurePolicy::Abort,
            PolicyArg::Continue => FailurePolicy::Continue,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Agent,
    Tool,
}

impl From<BackendArg> for InferenceBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Agent => InferenceBackend::Agent,
            BackendArg::Tool => InferenceBackend::Tool,
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::List => {
            print_catalog();
            Ok(())
        }
        Command::Run { step, opts } => execute(&[step], &opts, cli.quiet).await,
        Command::Chain { steps, opts } => execute(&steps, &opts, cli.quiet).await,
    }
}

fn print_catalog() {
    for kind in StepKind::all() {
        println!("{}", bold(kind.name()));
        println!("  {} {}", dim("in: "), kind.inputs().join(", "));
        println!("  {} {}", dim("out:"), kind.outputs().join(", "));
        if kind.needs_token() {
            println!("  {}", dim("needs a bearer token"));
        }
    }
}

async fn execute(step_names: &[String], opts: &RunOpts, quiet: bool) -> Result<()> {
    let steps = step_names
        .iter()
        .map(|s| s.parse::<StepKind>())
        .collect::<Result<Vec<_>, _>>()
        .context("Unknown step (see `flowstep list`)")?;

    let cli_progress = (!quiet && !opts.no_progress).then(CliProgress::new);
    let progress = cli_progress
        .clone()
        .map(|p| p as Arc<dyn PageProgress>);
    let config = build_config(opts, progress).await?;
    let mut ctx = load_context(opts).await?;

    let mut last = StepOutputs::new();
    for kind in steps {
        let started = Instant::now();
        let outputs = match run_step(kind, &ctx, &config).await {
            Ok(outputs) => outputs,
            Err(e) => {
                if let Some(p) = &cli_progress {
                    p.abandon();
                }
                return Err(e).with_context(|| format!("Step '{kind}' failed"));
            }
        };
        if !quiet {
            eprintln!(
                "{} {}  {}",
                green("✔"),
                bold(kind.name()),
                dim(&format!(
                    "{} outputs  {}ms",
                    outputs.len(),
                    started.elapsed().as_millis()
                )),
            );
        }
        ctx.apply(outputs.clone());
        last = outputs;
    }

    let result = if opts.outputs_only {
        serde_json::to_value(&last).context("Failed to serialise outputs")?
    } else {
        ctx.to_value()
    };
    write_json(&result, opts.output.as_ref())
}

/// Map CLI args onto `StepConfig`, starting from the environment.
async fn build_config(opts: &RunOpts, progress: Option<ProgressCallback>) -> Result<StepConfig> {
    let mut builder = StepConfig::from_env()
        .failure_policy(opts.policy.into())
        .inference_backend(opts.backend.into())
        .render_scale(opts.scale)
        .inference_timeout_secs(Some(opts.inference_timeout))
        .transfer_timeout_secs(opts.transfer_timeout);

    if let Some(ref url) = opts.api_url {
        builder = builder.api_base_url(url);
    }
    if let Some(ref token) = opts.token {
        builder = builder.token(token);
    }
    if let Some(ref agent) = opts.agent {
        builder = builder.agent_name(agent);
    }
    if let Some(ref path) = opts.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.ocr_prompt(prompt.trim());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn load_context(opts: &RunOpts) -> Result<WorkflowContext> {
    let mut ctx = match &opts.context {
        None => WorkflowContext::new(),
        Some(path) => {
            let text = if path.as_os_str() == "-" {
                let mut buf = String::new();
                io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read context from stdin")?;
                buf
            } else {
                tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read context from {:?}", path))?
            };
            let value: Value = serde_json::from_str(&text).context("Context is not valid JSON")?;
            WorkflowContext::from_value(value).context("Invalid context")?
        }
    };

    for assignment in &opts.set {
        let (name, raw) = parse_assignment(assignment)?;
        ctx.insert(name, raw);
    }
    Ok(ctx)
}

/// `name=json`; a value that does not parse as JSON is kept as text.
fn parse_assignment(s: &str) -> Result<(String, Value)> {
    let Some((name, raw)) = s.split_once('=') else {
        bail!("Expected NAME=VALUE, got '{s}'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Empty variable name in '{s}'");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

fn write_json(value: &Value, output: Option<&PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise JSON")?;
    match output {
        Some(path) => std::fs::write(path, format!("{json}\n"))
            .with_context(|| format!("Failed to write {:?}", path)),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}").context("Failed to write to stdout")
        }
    }
}
