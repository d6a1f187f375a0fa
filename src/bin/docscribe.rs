//! CLI binary for docscribe.
//!
//! A thin shim over the library crate: maps flags onto a `DigitizerConfig`
//! loaded from `DOCSCRIBE_*` variables, runs one digitisation, and writes
//! the result.

use anyhow::{bail, Context, Result};
use clap::Parser;
use docscribe::{
    DigitizationProgressCallback, DigitizationResult, Digitizer, DigitizerConfig, ProgressCallback,
    TargetFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished call.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Rasterising input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl DigitizationProgressCallback for CliProgressCallback {
    fn on_digitization_start(&self, total_calls: usize) {
        self.bar.set_length(total_calls as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Digitising");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting digitisation ({total_calls} call(s))…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut t) = self.page_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}: preparing model"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, content_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{content_len:>5} chars")),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
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
        self.bar.abandon();
    }

    fn on_digitization_complete(&self, total_pages: usize, elapsed_secs: f64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} page(s) digitised in {:.1}s",
            green("✔"),
            bold(&total_pages.to_string()),
            elapsed_secs
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Markdown to stdout with the default model
  docscribe scan.pdf

  # LaTeX body from a math-heavy scan
  docscribe --format latex --model datalab-to/chandra notes.pdf -o notes.tex

  # Editable layout: layout.json + page-N.png in a directory
  docscribe --format layout scan.pdf -o scan-layout/

  # Timing record as JSON
  docscribe --json scan.png -o scan.md

ENVIRONMENT VARIABLES:
  DOCSCRIBE_DEFAULT_MODEL            Model used when --model is absent
  DOCSCRIBE_<F>_MODELS               Comma-separated model ids per family
  DOCSCRIBE_<F>_BASE_URL             Inference base URL per family
  DOCSCRIBE_<F>_API_KEY              Bearer token per family
  DOCSCRIBE_<F>_SERVICE_NAMES        JSON map model id → container name
  DOCSCRIBE_<F>_MODEL_ENDPOINTS      JSON map model id → base URL
  DOCSCRIBE_<F>_START_TIMEOUT_SECS   Readiness timeout after a container start
  DOCSCRIBE_DOCKER_BINARY            Container CLI (docker, podman)
  PDFIUM_LIB_PATH                    Path to libpdfium when not on the search path

  <F> is one of GENERIC, STRUCTURED, MATH_HTML.
"#;

/// Digitise scanned PDFs and images with self-hosted vision models.
#[derive(Parser, Debug)]
#[command(
    name = "docscribe",
    version,
    about = "Digitise scanned PDFs and images into Markdown, LaTeX, or an editable layout",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF or image file to digitise.
    #[arg(required_unless_present = "list_models")]
    input: Option<PathBuf>,

    /// Target format.
    #[arg(short, long, value_enum, default_value = "markdown")]
    format: FormatArg,

    /// Model id (must be in a configured family list).
    #[arg(short, long, env = "DOCSCRIBE_MODEL")]
    model: Option<String>,

    /// Output file (markdown/latex) or directory (layout). Default: stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// PDF rasterisation DPI (72–600).
    #[arg(long, value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: Option<u32>,

    /// Maximum number of PDF pages to digitise.
    #[arg(long)]
    page_limit: Option<usize>,

    /// Completion token budget per inference call.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Print the conversion record (timings) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// List configured models and their families, then exit.
    #[arg(long)]
    list_models: bool,

    /// Disable the progress bar.
    #[arg(long, env = "DOCSCRIBE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Markdown,
    Latex,
    Layout,
}

impl From<FormatArg> for TargetFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Markdown => TargetFormat::Markdown,
            FormatArg::Latex => TargetFormat::Latex,
            FormatArg::Layout => TargetFormat::Layout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_models;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn DigitizationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    if cli.list_models {
        for model in config.available_models() {
            let marker = if model == config.default_model { "*" } else { " " };
            println!("{marker} {model:<40} {}", config.family_of(&model));
        }
        return Ok(());
    }

    let Some(input) = cli.input.as_deref() else {
        bail!("no input file given");
    };
    let format: TargetFormat = cli.format.into();
    if format == TargetFormat::Layout && cli.output.is_none() {
        bail!("--format layout needs an output directory (-o DIR)");
    }

    let digitizer = Digitizer::new(config).context("Failed to initialise digitizer")?;
    let model = digitizer.resolve_model(cli.model.as_deref())?.to_string();
    let result = digitizer
        .digitalize_file(input, format, Some(&model))
        .await
        .with_context(|| format!("Digitisation of {} failed", input.display()))?;

    match (format, cli.output.as_deref()) {
        (TargetFormat::Layout, Some(dir)) => write_layout(&result, dir).await?,
        (_, Some(path)) => {
            let mut text = result.joined_text();
            text.push('\n');
            tokio::fs::write(path, text)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        (_, None) if !cli.json => {
            let text = result.joined_text();
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            if !text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
        (_, None) => {}
    }

    let record = result.record(&model, format);
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Failed to serialise record")?
        );
    } else if !cli.quiet && !show_progress {
        eprintln!(
            "Digitised {} page(s) with {} in {:.2}s (prepare {:.2}s, inference {:.2}s)",
            record.page_count,
            record.model_id,
            record.generation_seconds,
            record.model_prepare_seconds,
            record.inference_seconds
        );
    }
    if let (false, Some(path)) = (cli.quiet, cli.output.as_deref()) {
        eprintln!("   →  {}", bold(&path.display().to_string()));
    }

    Ok(())
}

/// Environment configuration with CLI flags layered on top.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DigitizerConfig> {
    let mut builder = DigitizerConfig::from_env()
        .context("Invalid DOCSCRIBE_* environment configuration")?
        .into_builder();
    if let Some(dpi) = cli.dpi {
        builder = builder.dpi(dpi);
    }
    if let Some(n) = cli.page_limit {
        builder = builder.page_limit(n);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// Write `layout.json` and one `page-N.png` per page into `dir`.
async fn write_layout(result: &DigitizationResult, dir: &Path) -> Result<()> {
    let layout = result.layout_document()?;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for (i, page) in result.pages.iter().enumerate() {
        if let Some(image) = &page.image {
            let path = dir.join(format!("page-{}.png", i + 1));
            tokio::fs::write(&path, image.data())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(&layout).context("Failed to serialise layout")?;
    tokio::fs::write(dir.join("layout.json"), json)
        .await
        .context("Failed to write layout.json")?;
    Ok(())
}
