//! CLI binary for pdf2mcq.
//!
//! A thin foreground controller over the library: it maps flags to
//! `ConversionConfig` / `ModelSettings`, echoes streamed text, asks the
//! operator what to do with pages that keep failing, and turns Ctrl-C into
//! a cooperative stop.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2mcq::artifacts::write_atomic;
use pdf2mcq::config::{gemini_model_for_choice, DEFAULT_MODEL};
use pdf2mcq::profiles::DEFAULT_PROFILE_FILE;
use pdf2mcq::progress::NO_CONTENT_STATUS;
use pdf2mcq::questions::RECENT_EXAM_LABEL;
use pdf2mcq::{
    build_client, build_text_model, run_batch, BatchOutcome, BatchSettings, CancelFlag,
    ConversionConfig, ConversionDriver, ConversionObserver, ConversionOutcome, ConversionRequest,
    Decision, EscalationInfo, InstructionSource, ModelBackend, ModelSettings, PageRange,
    PdfiumRasterizer, Profile, ProfileStore, StopHandle,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
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

/// Exit code for a run stopped with Ctrl-C.
const EXIT_CANCELLED: i32 = 130;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe pages 45-49 to a file, asking what to do with stuck pages
  pdf2mcq convert notes.pdf --pages 45-49 -o notes.md

  # Unattended run: skip pages that fail three times
  pdf2mcq convert notes.pdf --pages 45-49 --on-exhausted skip > notes.md

  # Page count and metadata (no API key needed)
  pdf2mcq inspect notes.pdf

  # Save and reuse a profile
  pdf2mcq profile save epi --pdf notes.pdf --md epi.md --pages 45-49
  pdf2mcq convert --profile epi

  # Notes plus generated questions
  pdf2mcq generate notes.pdf --pages 45-49 --topic "Cohort Studies" \
      --topic-bank banks/topic --topic-modules 2,5 \
      --style-bank banks/style --style-modules 1,3,8

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (gemini backend)
  EDGEQUAKE_LLM_PROVIDER  Provider for the llm backend (openai, anthropic, ollama, ...)
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, overrides --verbose / --quiet

A .env file in the working directory is loaded on start.
"#;

/// Transcribe scanned PDF pages to Markdown and generate questions from them.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2mcq",
    version,
    about = "Transcribe scanned PDF pages to Markdown with a vision model",
    long_about = "Transcribe scanned PDF pages to Markdown with a multimodal model, page by page, \
with retries and an operator prompt for pages that keep failing. The notes can then be turned \
into multiple-choice questions using reference question banks.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug logging.
    #[arg(short, long, global = true, env = "PDF2MCQ_VERBOSE")]
    verbose: bool,

    /// Errors only; no progress display.
    #[arg(short, long, global = true, env = "PDF2MCQ_QUIET")]
    quiet: bool,

    /// Profile store.
    #[arg(long, global = true, env = "PDF2MCQ_PROFILES", default_value = DEFAULT_PROFILE_FILE)]
    profiles: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transcribe a page range to Markdown.
    Convert(ConvertArgs),
    /// Print the page count and metadata of a PDF.
    Inspect(InspectArgs),
    /// Manage saved conversion profiles.
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Transcribe a page range, then generate questions from the notes.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// PDF to convert. Taken from --profile when omitted.
    input: Option<PathBuf>,

    /// Page range, e.g. 45-49 or 7.
    #[arg(short, long, env = "PDF2MCQ_PAGES")]
    pages: Option<PageRange>,

    /// Markdown output file. Stdout when omitted.
    #[arg(short, long, env = "PDF2MCQ_OUTPUT")]
    output: Option<PathBuf>,

    /// Leave out the `--- Page N ---` markers.
    #[arg(long, env = "PDF2MCQ_NO_PAGE_MARKERS")]
    no_page_markers: bool,

    /// Fill missing inputs from this profile.
    #[arg(long)]
    profile: Option<String>,

    /// Save the resolved inputs under this profile name.
    #[arg(long)]
    save_profile: Option<String>,

    #[command(flatten)]
    driver: DriverArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    input: PathBuf,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    /// List profile names.
    List,
    /// Print one profile as JSON.
    Show { name: String },
    /// Create or replace a profile.
    Save {
        name: String,
        #[arg(long)]
        pdf: PathBuf,
        #[arg(long, default_value = "")]
        md: String,
        #[arg(long)]
        pages: Option<PageRange>,
        #[arg(long)]
        no_page_markers: bool,
    },
    /// Remove a profile.
    Delete { name: String },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    input: PathBuf,

    #[arg(short, long, env = "PDF2MCQ_PAGES")]
    pages: PageRange,

    /// Topic name; used for every artifact file name.
    #[arg(long)]
    topic: String,

    /// Question prompt template with the three placeholders.
    #[arg(long, env = "PDF2MCQ_TEMPLATE", default_value = "prompt_template.txt")]
    template: PathBuf,

    /// Root of the topic question bank (`output_<n>/questions.json`).
    #[arg(long, env = "PDF2MCQ_TOPIC_BANK", default_value = ".")]
    topic_bank: PathBuf,

    /// Comma-separated topic bank modules, e.g. 2,5,18.
    #[arg(long, default_value = "")]
    topic_modules: String,

    #[arg(long, default_value = RECENT_EXAM_LABEL)]
    topic_label: String,

    /// Root of the style-guide question bank.
    #[arg(long, env = "PDF2MCQ_STYLE_BANK", default_value = ".")]
    style_bank: PathBuf,

    /// Comma-separated style-guide modules, e.g. 1,3,8.
    #[arg(long, default_value = "")]
    style_modules: String,

    /// Directory receiving the artifact folders.
    #[arg(long, env = "PDF2MCQ_OUTPUT_ROOT", default_value = ".")]
    output_root: PathBuf,

    /// Question model: `pro`, `flash` or a full model id. Defaults to --model.
    #[arg(long, env = "PDF2MCQ_QUESTION_MODEL")]
    question_model: Option<String>,

    /// Seed for the style-guide sample.
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    driver: DriverArgs,
}

#[derive(Args, Debug)]
struct DriverArgs {
    /// Transcription instruction file. Built-in instruction when omitted.
    #[arg(long, env = "PDF2MCQ_INSTRUCTION")]
    instruction: Option<PathBuf>,

    #[arg(long, env = "PDF2MCQ_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, env = "PDF2MCQ_RETRY_DELAY_MS", default_value_t = 2000)]
    retry_delay_ms: u64,

    /// What to do with a page once its attempts are spent.
    #[arg(long, env = "PDF2MCQ_ON_EXHAUSTED", value_enum, default_value = "ask")]
    on_exhausted: ExhaustedArg,

    /// Show a progress bar instead of echoing streamed text.
    #[arg(long, env = "PDF2MCQ_NO_ECHO")]
    no_echo: bool,

    #[command(flatten)]
    render: RenderArgs,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[arg(long, env = "PDF2MCQ_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    #[arg(long, env = "PDF2MCQ_PASSWORD")]
    password: Option<String>,

    /// Directory containing libpdfium.
    #[arg(long)]
    pdfium_lib_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ModelArgs {
    #[arg(long, env = "PDF2MCQ_BACKEND", value_enum, default_value = "gemini")]
    backend: BackendArg,

    /// Model id, or `pro` / `flash` for Gemini 2.5.
    #[arg(long, env = "PDF2MCQ_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Provider for the llm backend. Auto-detected when omitted.
    #[arg(long, env = "PDF2MCQ_PROVIDER")]
    provider: Option<String>,

    #[arg(long, env = "PDF2MCQ_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "PDF2MCQ_TEMPERATURE")]
    temperature: Option<f32>,

    #[arg(long, env = "PDF2MCQ_MAX_TOKENS")]
    max_tokens: Option<usize>,
}

impl ModelArgs {
    fn settings(&self) -> ModelSettings {
        ModelSettings {
            backend: self.backend.into(),
            model: gemini_model_for_choice(&self.model),
            provider_name: self.provider.clone(),
            api_key: None,
            base_url: self.base_url.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Gemini,
    Llm,
}

impl From<BackendArg> for ModelBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Gemini => ModelBackend::Gemini,
            BackendArg::Llm => ModelBackend::Llm,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExhaustedArg {
    /// Prompt the operator.
    Ask,
    Retry,
    Skip,
    Abort,
}

// ── Foreground observer ──────────────────────────────────────────────────────

/// Terminal observer: echoes fragments (or drives a progress bar) and
/// answers escalations.
struct CliObserver {
    bar: ProgressBar,
    echo: bool,
    on_exhausted: ExhaustedArg,
    cancel: CancelFlag,
    /// Echoed text has been written without a trailing newline.
    mid_line: bool,
}

impl CliObserver {
    fn new(args: &DriverArgs, cancel: CancelFlag, quiet: bool) -> Self {
        let echo = !quiet && !args.no_echo;
        let bar = if quiet || echo {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {pos:>3}/{len} pages  {msg}  ⏱ {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            bar.set_prefix("Converting");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        };
        Self {
            bar,
            echo,
            on_exhausted: args.on_exhausted,
            cancel,
            mid_line: false,
        }
    }

    fn end_line(&mut self) {
        if self.mid_line {
            eprintln!();
            self.mid_line = false;
        }
    }

    fn status(&mut self, line: String) {
        self.end_line();
        if self.echo {
            eprintln!("{line}");
        } else {
            self.bar.println(line);
        }
    }

    async fn ask(&self, info: &EscalationInfo) -> Decision {
        let prompt = format!(
            "Page {} (document page {}) failed after all attempts",
            info.ordinal, info.absolute_page
        );
        let bar = self.bar.clone();
        let choice = tokio::task::spawn_blocking(move || {
            bar.suspend(|| {
                Select::new()
                    .with_prompt(prompt)
                    .items(&["Retry page", "Skip page", "End conversion"])
                    .default(0)
                    .interact_opt()
            })
        });

        tokio::select! {
            answer = choice => match answer {
                Ok(Ok(Some(0))) => Decision::Retry,
                Ok(Ok(Some(1))) => Decision::Skip,
                _ => Decision::Abort,
            },
            _ = self.cancel.cancelled() => Decision::Abort,
        }
    }
}

#[async_trait]
impl ConversionObserver for CliObserver {
    fn on_page_start(&mut self, ordinal: usize, absolute_page: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(ordinal.saturating_sub(1) as u64);
        self.bar.set_message(format!("page {absolute_page}"));
        self.status(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Page {ordinal}/{total} (document page {absolute_page})"
            ))
        ));
    }

    fn on_fragment(&mut self, _ordinal: usize, text: &str) {
        if self.echo {
            eprint!("{text}");
            let _ = io::stderr().flush();
            self.mid_line = !text.ends_with('\n');
        }
    }

    fn on_no_content(&mut self, _ordinal: usize) {
        self.status(format!("  {}", dim(NO_CONTENT_STATUS)));
    }

    fn on_attempt_failed(&mut self, ordinal: usize, attempt: u32, max_attempts: u32, error: &str) {
        // Keep long provider errors to one line.
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };
        self.status(format!(
            "  {} Page {ordinal}: attempt {attempt}/{max_attempts} failed  {}",
            red("✗"),
            red(&msg)
        ));
    }

    async fn decide(&mut self, info: &EscalationInfo) -> Decision {
        self.end_line();
        let decision = match self.on_exhausted {
            ExhaustedArg::Ask => self.ask(info).await,
            ExhaustedArg::Retry => Decision::Retry,
            ExhaustedArg::Skip => Decision::Skip,
            ExhaustedArg::Abort => Decision::Abort,
        };
        self.status(format!(
            "  {} Page {}: {:?} ({})",
            cyan("→"),
            info.ordinal,
            decision,
            dim(&info.last_error)
        ));
        decision
    }

    fn on_finished(&mut self, _markdown: &str) {
        self.end_line();
        self.bar.finish_and_clear();
    }

    fn on_error(&mut self, message: &str) {
        self.status(format!("{} {}", red("✘"), red(message)));
        self.bar.finish_and_clear();
    }

    fn on_cancelled(&mut self) {
        self.status(format!("{} Conversion cancelled", cyan("⚠")));
        self.bar.finish_and_clear();
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // A live display already reports progress; keep library INFO logs out of it.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        match &cli.command {
            Command::Convert(_) | Command::Generate(_) => "warn",
            _ => "info",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let profiles = ProfileStore::new(&cli.profiles);
    match cli.command {
        Command::Convert(args) => run_convert(args, &profiles, cli.quiet).await,
        Command::Inspect(args) => run_inspect(args).await,
        Command::Profile(cmd) => run_profile(cmd, &profiles).await,
        Command::Generate(args) => run_generate(args, cli.quiet).await,
    }
}

async fn run_convert(args: ConvertArgs, profiles: &ProfileStore, quiet: bool) -> Result<()> {
    let profile = match &args.profile {
        Some(name) => Some(
            profiles
                .get(name)
                .await
                .with_context(|| format!("No profile named '{name}' in {}", profiles.path().display()))?,
        ),
        None => None,
    };

    let input = args
        .input
        .clone()
        .or_else(|| profile.as_ref().map(|p| PathBuf::from(&p.pdf_path)))
        .context("No input PDF; pass a path or --profile")?;
    let range = match args.pages {
        Some(range) => range,
        None => profile_range(profile.as_ref())?.context("No page range; pass --pages")?,
    };
    let output = args.output.clone().or_else(|| {
        profile
            .as_ref()
            .filter(|p| !p.md_path.is_empty())
            .map(|p| PathBuf::from(&p.md_path))
    });
    let markers = !args.no_page_markers
        && profile
            .as_ref()
            .and_then(|p| p.include_page_markers)
            .unwrap_or(true);

    if let Some(name) = &args.save_profile {
        let saved = Profile {
            pdf_path: input.display().to_string(),
            md_path: output
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            start_page: Some(range.start()),
            end_page: Some(range.end()),
            include_page_markers: Some(markers),
        };
        profiles
            .save(name, saved)
            .await
            .context("Failed to save profile")?;
    }

    let config = build_config(&args.driver, markers)?;
    let driver = build_driver(&args.driver, config)?;

    let cancel = CancelFlag::new();
    stop_on_ctrl_c(cancel.handle());
    let mut observer = CliObserver::new(&args.driver, cancel.clone(), quiet);

    let outcome = driver
        .spawn_with(ConversionRequest::new(&input, range), cancel)
        .observe(&mut observer)
        .await
        .context("Conversion failed")?;

    let converted = match outcome {
        ConversionOutcome::Completed(done) => done,
        // The observer has already reported both of these.
        ConversionOutcome::Aborted { .. } => std::process::exit(1),
        ConversionOutcome::Cancelled => std::process::exit(EXIT_CANCELLED),
    };

    match &output {
        Some(path) => {
            write_atomic(path, converted.markdown.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(converted.markdown.as_bytes())
                .context("Failed to write to stdout")?;
            if !converted.markdown.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !quiet {
        let s = &converted.stats;
        eprintln!(
            "{}  {}/{} pages  ({} skipped, {} failed attempts)  {}ms{}",
            if s.skipped_pages == 0 { green("✔") } else { cyan("⚠") },
            s.converted_pages,
            s.total_pages,
            s.skipped_pages,
            s.failed_attempts,
            s.duration_ms,
            output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn run_inspect(args: InspectArgs) -> Result<()> {
    let info = PdfiumRasterizer::new()
        .with_lib_dir(args.render.pdfium_lib_path.clone())
        .with_password(args.render.password.clone())
        .inspect(&args.input)
        .await
        .context("Invalid PDF")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
        );
    } else {
        println!("File:         {}", args.input.display());
        if let Some(ref t) = info.title {
            println!("Title:        {t}");
        }
        if let Some(ref a) = info.author {
            println!("Author:       {a}");
        }
        println!("Total Pages:  1-{}", info.page_count);
    }
    Ok(())
}

async fn run_profile(cmd: ProfileCommand, profiles: &ProfileStore) -> Result<()> {
    match cmd {
        ProfileCommand::List => {
            for name in profiles.list().await {
                println!("{name}");
            }
        }
        ProfileCommand::Show { name } => {
            let profile = profiles
                .get(&name)
                .await
                .with_context(|| format!("No profile named '{name}'"))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&profile).context("Failed to serialize profile")?
            );
        }
        ProfileCommand::Save {
            name,
            pdf,
            md,
            pages,
            no_page_markers,
        } => {
            let profile = Profile {
                pdf_path: pdf.display().to_string(),
                md_path: md,
                start_page: pages.map(|r| r.start()),
                end_page: pages.map(|r| r.end()),
                include_page_markers: Some(!no_page_markers),
            };
            profiles
                .save(&name, profile)
                .await
                .context("Failed to save profile")?;
            eprintln!("{} Profile '{name}' saved", green("✔"));
        }
        ProfileCommand::Delete { name } => {
            if !profiles
                .delete(&name)
                .await
                .context("Failed to update profile store")?
            {
                bail!("No profile named '{name}'");
            }
            eprintln!("{} Profile '{name}' deleted", green("✔"));
        }
    }
    Ok(())
}

async fn run_generate(args: GenerateArgs, quiet: bool) -> Result<()> {
    let config = build_config(&args.driver, true)?;
    let driver = build_driver(&args.driver, config)?;

    let mut question_settings = args.driver.model.settings();
    if let Some(choice) = &args.question_model {
        question_settings.model = gemini_model_for_choice(choice);
    }
    let text_model =
        build_text_model(&question_settings).context("Failed to set up the question model")?;

    let settings = BatchSettings {
        document: args.input.clone(),
        range: args.pages,
        topic: args.topic.clone(),
        template: args.template.clone(),
        topic_bank: args.topic_bank.clone(),
        topic_modules: args.topic_modules.clone(),
        topic_label: args.topic_label.clone(),
        style_bank: args.style_bank.clone(),
        style_modules: args.style_modules.clone(),
        output_root: args.output_root.clone(),
    };
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let cancel = CancelFlag::new();
    stop_on_ctrl_c(cancel.handle());
    let mut observer = CliObserver::new(&args.driver, cancel.clone(), quiet);

    let outcome = run_batch(
        &driver,
        text_model.as_ref(),
        &settings,
        &mut observer,
        cancel,
        &mut rng,
    )
    .await
    .context("Question generation failed")?;

    let report = match outcome {
        BatchOutcome::Completed(report) => report,
        BatchOutcome::Aborted { .. } => std::process::exit(1),
        BatchOutcome::Cancelled => std::process::exit(EXIT_CANCELLED),
    };

    if !quiet {
        eprintln!(
            "{} {} questions for '{}'",
            green("✔"),
            bold(&report.question_count.to_string()),
            args.topic
        );
        eprintln!("   notes      {}", dim(&report.notes.display().to_string()));
        eprintln!("   prompt     {}", dim(&report.prompt.display().to_string()));
        eprintln!(
            "   questions  {}",
            dim(&report.questions.path.display().to_string())
        );
        eprintln!("   run log    {}", dim(&report.run_log.display().to_string()));
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn profile_range(profile: Option<&Profile>) -> Result<Option<PageRange>> {
    match profile.map(|p| (p.start_page, p.end_page)) {
        Some((Some(start), Some(end))) => Ok(Some(
            PageRange::new(start, end).context("Profile holds an invalid page range")?,
        )),
        _ => Ok(None),
    }
}

fn build_config(args: &DriverArgs, include_page_markers: bool) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .dpi(args.render.dpi)
        .max_attempts(args.max_attempts)
        .retry_delay_ms(args.retry_delay_ms)
        .include_page_markers(include_page_markers);
    if let Some(path) = &args.instruction {
        builder = builder.instruction(InstructionSource::File(path.clone()));
    }
    if let Some(pwd) = &args.render.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(dir) = &args.render.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir.clone());
    }
    builder.build().context("Invalid configuration")
}

fn build_driver(args: &DriverArgs, config: ConversionConfig) -> Result<ConversionDriver> {
    let client =
        build_client(&args.model.settings()).context("Failed to set up the model client")?;
    let rasterizer = Arc::new(PdfiumRasterizer::from_config(&config));
    Ok(ConversionDriver::new(rasterizer, client, config))
}

fn stop_on_ctrl_c(stop: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} Stopping after the current step…", cyan("⚠"));
            stop.stop();
        }
    });
}
