//! CLI binary for edgequake-linearize.
//!
//! A thin shim over the library crate: `serve` runs the HTTP upload service,
//! `run` linearizes local files into a PDF or ZIP.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_linearize::{
    linearize_to_file, serve, BatchProgressCallback, LinearizeConfig, ProgressCallback,
};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished document. Documents
/// finish out of order, so start times are tracked by name.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Linearizing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, name: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(name))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Linearizing {total} file(s)…"))
        ));
    }

    fn on_job_start(&self, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(name.to_string(), Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_job_complete(&self, name: &str, bytes: u64) {
        let secs = self.elapsed_secs(name);
        self.bar.println(format!(
            "  {} {:<40}  {:>10}  {}",
            green("✓"),
            name,
            dim(&HumanBytes(bytes).to_string()),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_error(&self, name: &str, error: String) {
        let secs = self.elapsed_secs(name);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let first_line = error.lines().next().unwrap_or("");
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} file(s) linearized",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) linearized  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the upload service on port 8080
  pdflinearize serve

  # Listen elsewhere, four qpdf workers
  pdflinearize -c 4 serve --bind 127.0.0.1:9000

  # Linearize one file
  pdflinearize run report.pdf -o report-web.pdf

  # Several files into a ZIP, with a JSON summary on stdout
  pdflinearize run *.pdf -o linearized.zip --json

ENVIRONMENT VARIABLES:
  PDFLINEARIZE_CONCURRENCY   Worker pool size (default 2)
  PDFLINEARIZE_QPDF          qpdf executable (default: qpdf on PATH)
  PDFLINEARIZE_TEMP_DIR      Directory for staged inputs and outputs
  PDFLINEARIZE_BIND          Listen address for `serve`
  PDFLINEARIZE_MAX_UPLOAD_MB Request body limit for `serve`
  RUST_LOG                   Overrides the log filter (e.g. debug)
"#;

/// Linearize PDFs with qpdf, one at a time or in streamed ZIP batches.
#[derive(Parser, Debug)]
#[command(
    name = "pdflinearize",
    version,
    about = "Linearize PDFs with qpdf, singly or as a streamed ZIP",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFLINEARIZE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFLINEARIZE_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Number of qpdf processes allowed to run at once.
    #[arg(short, long, global = true, env = "PDFLINEARIZE_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// qpdf executable.
    #[arg(long, global = true, env = "PDFLINEARIZE_QPDF", default_value = "qpdf")]
    qpdf: PathBuf,

    /// Extra argument passed to qpdf before `--linearize` (repeatable).
    #[arg(long = "qpdf-arg", global = true, allow_hyphen_values = true)]
    qpdf_args: Vec<String>,

    /// Directory for staged inputs and outputs.
    #[arg(long, global = true, env = "PDFLINEARIZE_TEMP_DIR")]
    temp_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the upload form and `POST /linearize`.
    Serve {
        /// Listen address.
        #[arg(long, env = "PDFLINEARIZE_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Maximum request body in MiB.
        #[arg(long, env = "PDFLINEARIZE_MAX_UPLOAD_MB", default_value_t = 256)]
        max_upload_mb: usize,
    },
    /// Linearize local files: one input writes a PDF, several write a ZIP.
    Run {
        /// PDF files to linearize.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (.pdf for one input, .zip for several).
        #[arg(short, long, env = "PDFLINEARIZE_OUTPUT")]
        output: PathBuf,

        /// Print the batch summary as JSON on stdout.
        #[arg(long, env = "PDFLINEARIZE_JSON")]
        json: bool,

        /// Disable progress bar.
        #[arg(long, env = "PDFLINEARIZE_NO_PROGRESS")]
        no_progress: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for `run`; `serve` always logs.
    let show_progress = match cli.command {
        Command::Run {
            json, no_progress, ..
        } => !cli.quiet && !no_progress && !json,
        Command::Serve { .. } => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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
        Command::Serve {
            bind,
            max_upload_mb,
        } => {
            let config = build_config(&cli.pipeline, None)?;
            let config = LinearizeConfig {
                bind_addr: bind,
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
                ..config
            };
            serve(config).await.context("Server failed")?;
        }
        Command::Run {
            ref inputs,
            ref output,
            json,
            ..
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
            } else {
                None
            };
            let config = build_config(&cli.pipeline, progress)?;

            let summary = linearize_to_file(inputs, output, &config)
                .await
                .context("Linearize failed")?;

            if json {
                let out =
                    serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
                println!("{out}");
            } else if !cli.quiet {
                eprintln!(
                    "{}  {}/{} files  {}ms  →  {}",
                    if summary.failed() == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    summary.succeeded,
                    summary.total,
                    summary.duration_ms,
                    bold(&output.display().to_string()),
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `LinearizeConfig`.
fn build_config(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<LinearizeConfig> {
    let mut builder = LinearizeConfig::builder()
        .concurrency(args.concurrency)
        .qpdf_path(&args.qpdf)
        .qpdf_args(args.qpdf_args.iter().cloned());

    if let Some(ref dir) = args.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
