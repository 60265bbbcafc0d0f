//! CLI binary for edgequake-docregen.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` / `ExportConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_docregen::{
    build_context, generate_document, parse_sections, pipeline::parse::render_tree, render_all,
    ContextInput, CoverPageMode, ExportConfig, ExportFormat, GenerationProgressCallback,
    IdentityWriter, LlmSectionWriter, LlmWriterConfig, PipelineConfig, ProgressCallback,
    SectionWriter, VarValue,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
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

/// Terminal progress callback: a live progress bar plus one log line per
/// section. Sections finish out of order, so start times are keyed by
/// document position.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Parsing sections…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            fallbacks: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} sections  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, order_index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&order_index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, total_sections: usize) {
        self.activate_bar(total_sections);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Regenerating {total_sections} sections…"))
        ));
    }

    fn on_section_start(&self, order_index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(order_index, Instant::now());
        }
        self.bar.set_message(format!("section {}", order_index + 1));
    }

    fn on_section_complete(&self, order_index: usize, total: usize, html_len: usize) {
        let secs = self.elapsed_secs(order_index);
        self.bar.println(format!(
            "  {} Section {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            order_index + 1,
            total,
            dim(&format!("{html_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_section_fallback(&self, order_index: usize, total: usize, reason: &str) {
        let secs = self.elapsed_secs(order_index);
        self.fallbacks.fetch_add(1, Ordering::SeqCst);

        let msg: String = if reason.chars().count() > 80 {
            let mut s: String = reason.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            reason.to_string()
        };

        self.bar.println(format!(
            "  {} Section {:>3}/{:<3}  {}  {}",
            red("↺"),
            order_index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_generation_complete(&self, total_sections: usize, success_count: usize) {
        let fell_back = total_sections.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if fell_back == 0 {
            eprintln!(
                "{} {} sections regenerated",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} sections regenerated  ({} kept original)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_sections,
                red(&fell_back.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Show how a reference document splits into sections
  docregen sections reference.html

  # Regenerate a document for a new project
  docregen generate reference.html \
      --project-name FinStack \
      --project-description "A payments platform for small banks" \
      --prompt 'Formal tone. {"region": "EU"}' \
      -o finstack.html

  # Pin variables the prompt may not override
  docregen generate reference.html --project-name FinStack \
      --project-description "Payments" --var currency=EUR --var seats=20

  # Dry run: exercise parsing and assembly without any LLM call
  docregen generate reference.html --project-name X --project-description Y --dry-run

  # Export to PDF and DOCX with a cover page
  docregen export finstack.html --format both -o out/finstack \
      --title "FinStack Architecture" --cover-page full --author "Platform Team"

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Regenerate HTML documents section by section and export them to PDF and DOCX.
#[derive(Parser, Debug)]
#[command(
    name = "docregen",
    version,
    about = "Regenerate HTML documents section by section with LLMs and export them to PDF and DOCX",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCREGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCREGEN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the section tree of an HTML document.
    Sections(SectionsArgs),
    /// Regenerate every section of an HTML document for a new project.
    Generate(GenerateArgs),
    /// Render an HTML document to PDF and/or DOCX.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct SectionsArgs {
    /// HTML file to split.
    input: PathBuf,

    /// Output the sections as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Reference HTML file.
    input: PathBuf,

    /// Write the final HTML to this file instead of stdout.
    #[arg(short, long, env = "DOCREGEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Name of the project the document is regenerated for.
    #[arg(long, env = "DOCREGEN_PROJECT_NAME")]
    project_name: Option<String>,

    /// One-paragraph description of the project.
    #[arg(long, env = "DOCREGEN_PROJECT_DESCRIPTION")]
    project_description: Option<String>,

    /// Free-form instructions; a trailing JSON object sets variables.
    #[arg(long, conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Read the instructions from a file.
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Strict variable (KEY=VALUE); wins over variables from the prompt.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DOCREGEN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Number of concurrent writer calls.
    #[arg(short, long, env = "DOCREGEN_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Writer calls per section before keeping the original.
    #[arg(long, env = "DOCREGEN_MAX_ATTEMPTS", default_value_t = 2)]
    max_attempts: u32,

    /// Per-call timeout in seconds.
    #[arg(long, env = "DOCREGEN_ATTEMPT_TIMEOUT", default_value_t = 60)]
    attempt_timeout: u64,

    /// Timeout of the whole generation phase in seconds.
    #[arg(long, env = "DOCREGEN_GENERATION_TIMEOUT", default_value_t = 300)]
    generation_timeout: u64,

    /// Max LLM output tokens per section.
    #[arg(long, env = "DOCREGEN_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCREGEN_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Skip the LLM and keep every section as is.
    #[arg(long)]
    dry_run: bool,

    /// Output structured JSON (GenerationResult) instead of HTML.
    #[arg(long, env = "DOCREGEN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCREGEN_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// HTML file to render.
    input: PathBuf,

    /// Output path. With `--format both` the extension is replaced per format.
    #[arg(short, long)]
    output: PathBuf,

    /// Target format.
    #[arg(long, value_enum, default_value = "both")]
    format: FormatArg,

    /// Document title; enables duplicate-title removal.
    #[arg(long)]
    title: Option<String>,

    /// Cover page: none, minimal, full.
    #[arg(long, value_enum, default_value = "none")]
    cover_page: CoverArg,

    #[arg(long)]
    author: Option<String>,

    #[arg(long)]
    organization: Option<String>,

    /// Date shown on the cover page.
    #[arg(long)]
    date: Option<String>,

    /// Body font family (e.g. Helvetica, Times, Courier).
    #[arg(long)]
    font_family: Option<String>,

    /// Body font size in points.
    #[arg(long)]
    font_size: Option<f32>,

    /// Page margin in millimetres.
    #[arg(long)]
    margin_mm: Option<f32>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Pdf,
    Docx,
    Both,
}

impl FormatArg {
    fn formats(self) -> Vec<ExportFormat> {
        match self {
            FormatArg::Pdf => vec![ExportFormat::Pdf],
            FormatArg::Docx => vec![ExportFormat::Docx],
            FormatArg::Both => vec![ExportFormat::Pdf, ExportFormat::Docx],
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CoverArg {
    None,
    Minimal,
    Full,
}

impl From<CoverArg> for CoverPageMode {
    fn from(v: CoverArg) -> Self {
        match v {
            CoverArg::None => CoverPageMode::None,
            CoverArg::Minimal => CoverPageMode::Minimal,
            CoverArg::Full => CoverPageMode::Full,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs while it is shown.
    let show_progress = match &cli.command {
        Command::Generate(args) => {
            !cli.quiet && !args.no_progress && !args.json && io::stderr().is_terminal()
        }
        _ => false,
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
        Command::Sections(args) => run_sections(&args).await,
        Command::Generate(args) => run_generate(&args, cli.quiet, show_progress).await,
        Command::Export(args) => run_export(&args, cli.quiet).await,
    }
}

async fn run_sections(args: &SectionsArgs) -> Result<()> {
    let html = read_html(&args.input).await?;
    let sections = parse_sections(&html);

    if args.json {
        let json = serde_json::to_string_pretty(&sections).context("Failed to serialise sections")?;
        println!("{json}");
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for s in &sections {
        let indent = if s.is_top_level() { "" } else { "  " };
        writeln!(
            out,
            "{indent}{:>3}  {:<10} {:<8} {:>5} words  {}",
            s.order_index,
            s.section_type.to_string(),
            s.metadata.tag_name,
            s.metadata.word_count,
            dim(&s.id),
        )
        .context("Failed to write to stdout")?;
    }
    // The tree is what assembly would reproduce with an identity writer.
    let rebuilt = render_tree(&sections);
    writeln!(
        out,
        "{} sections, {} bytes of section HTML",
        sections.len(),
        rebuilt.len()
    )
    .context("Failed to write to stdout")?;
    Ok(())
}

async fn run_generate(args: &GenerateArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let html = read_html(&args.input).await?;
    let context = build_context(context_input(args).await?).context("Invalid project context")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_pipeline_config(args, progress_cb)?;
    let writer = build_writer(args).await?;

    let result = generate_document(&html, &context, writer, &config)
        .await
        .context("Generation failed")?;

    if let Some(ref path) = args.output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = if args.json {
            serde_json::to_string_pretty(&result).context("Failed to serialise output")?
        } else {
            result.final_html.clone()
        };
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else if args.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(result.final_html.as_bytes())
            .context("Failed to write to stdout")?;
        if !result.final_html.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !quiet && !args.json {
        let stats = &result.stats;
        eprintln!(
            "{}  {}/{} sections  {} attempts  {}ms{}",
            if result.sections_failed == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            result.sections_processed - result.sections_failed,
            result.sections_processed,
            stats.total_attempts,
            stats.total_duration_ms,
            args.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
        for e in &result.errors {
            eprintln!("   {}", dim(e));
        }
    }
    Ok(())
}

async fn run_export(args: &ExportArgs, quiet: bool) -> Result<()> {
    let html = read_html(&args.input).await?;
    let config = build_export_config(args)?;
    let formats = args.format.formats();

    let results = render_all(&html, &formats, &config).await;

    let mut failed = Vec::new();
    for (format, result) in results {
        match result {
            Ok(bytes) => {
                let path = output_path(&args.output, format, formats.len() > 1);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !quiet {
                    eprintln!(
                        "{} {:<4}  {}  →  {}",
                        green("✔"),
                        format.extension(),
                        dim(&format!("{} bytes", bytes.len())),
                        bold(&path.display().to_string()),
                    );
                }
            }
            Err(e) => {
                eprintln!("{} {:<4}  {}", red("✘"), format.extension(), red(&e.to_string()));
                failed.push(format.to_string());
            }
        }
    }

    if !failed.is_empty() {
        bail!("export failed for: {}", failed.join(", "));
    }
    Ok(())
}

// ── Argument mapping ─────────────────────────────────────────────────────────

async fn read_html(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn context_input(args: &GenerateArgs) -> Result<ContextInput> {
    let prompt_text = if let Some(ref path) = args.prompt_file {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {}", path.display()))?
    } else {
        args.prompt.clone().unwrap_or_default()
    };

    let mut input = ContextInput {
        project_name: args.project_name.clone(),
        project_description: args.project_description.clone(),
        prompt_text,
        ..Default::default()
    };
    for (key, value) in &args.vars {
        input = input.strict_var(key.as_str(), VarValue::parse_literal(value));
    }
    Ok(input)
}

fn build_pipeline_config(
    args: &GenerateArgs,
    progress: Option<ProgressCallback>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(args.concurrency)
        .max_attempts(args.max_attempts)
        .attempt_timeout_secs(args.attempt_timeout)
        .generation_timeout_secs(args.generation_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

async fn build_writer(args: &GenerateArgs) -> Result<Arc<dyn SectionWriter>> {
    if args.dry_run {
        return Ok(Arc::new(IdentityWriter));
    }

    let mut builder = LlmWriterConfig::builder()
        .temperature(args.temperature)
        .max_tokens(args.max_tokens);
    if let Some(ref model) = args.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }

    let config = builder.build().context("Invalid LLM configuration")?;
    let writer = LlmSectionWriter::from_config(config).context("Failed to set up LLM provider")?;
    Ok(Arc::new(writer))
}

fn build_export_config(args: &ExportArgs) -> Result<ExportConfig> {
    let mut builder = ExportConfig::builder().cover_page(args.cover_page.into());
    if let Some(ref title) = args.title {
        builder = builder.title(title.as_str());
    }
    if let Some(ref author) = args.author {
        builder = builder.author(author.as_str());
    }
    if let Some(ref org) = args.organization {
        builder = builder.organization(org.as_str());
    }
    if let Some(ref date) = args.date {
        builder = builder.date(date.as_str());
    }
    if let Some(ref family) = args.font_family {
        builder = builder.font_family(family.as_str());
    }
    if let Some(size) = args.font_size {
        builder = builder.font_size_pt(size);
    }
    if let Some(mm) = args.margin_mm {
        builder = builder.margin_mm(mm);
    }
    builder.build().context("Invalid export configuration")
}

/// Path for `format`: `output` as given for a single format, otherwise
/// `output` with the format's extension.
fn output_path(output: &Path, format: ExportFormat, multiple: bool) -> PathBuf {
    if multiple || output.extension().is_none() {
        output.with_extension(format.extension())
    } else {
        output.to_path_buf()
    }
}

/// Parse a `--var KEY=VALUE` argument.
fn parse_var(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("variable name must not be empty in '{s}'");
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vars() {
        assert_eq!(
            parse_var("currency=EUR").unwrap(),
            ("currency".to_string(), "EUR".to_string())
        );
        assert_eq!(
            parse_var("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn output_paths_per_format() {
        let p = Path::new("out/report");
        assert_eq!(output_path(p, ExportFormat::Pdf, false), PathBuf::from("out/report.pdf"));
        assert_eq!(output_path(p, ExportFormat::Docx, true), PathBuf::from("out/report.docx"));
        let named = Path::new("out/final.bin");
        assert_eq!(output_path(named, ExportFormat::Pdf, false), PathBuf::from("out/final.bin"));
        assert_eq!(output_path(named, ExportFormat::Pdf, true), PathBuf::from("out/final.pdf"));
    }

    #[test]
    fn cli_parses_export() {
        let cli = Cli::try_parse_from([
            "docregen", "export", "in.html", "-o", "out", "--format", "pdf", "--cover-page", "full",
        ])
        .unwrap();
        match cli.command {
            Command::Export(args) => {
                assert!(matches!(args.format, FormatArg::Pdf));
                assert!(matches!(args.cover_page, CoverArg::Full));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
