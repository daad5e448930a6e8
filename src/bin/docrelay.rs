//! CLI binary for doc-relay.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `RelayConfig`, runs one generation flow and writes the PDF.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doc_relay::pipeline::merge::{looks_like_html, merge};
use doc_relay::{
    ConvertDialect, Dialect, Disposition, DocumentGenerationError, EmbeddedAsset, GenerationObserver,
    GenerationState, InterviewDialect, MergeContext, MergeDialect, RelayConfig, SessionOrchestrator, Stage,
    Variables, DEFAULT_USER_AGENT,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
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

// ── Spinner observer using indicatif ─────────────────────────────────────────

/// Terminal observer: a spinner whose message follows the current stage,
/// with one log line per completed state.
struct SpinnerObserver {
    bar: ProgressBar,
    started: Instant,
}

impl SpinnerObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Generating");
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }
}

fn stage_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Create => "creating session…",
        Stage::Advance => "submitting variables…",
        Stage::FetchState => "reading session state…",
        Stage::Resolve => "locating document…",
        Stage::Download => "downloading PDF…",
        Stage::Validate => "validating…",
        Stage::Merge => "merging template…",
        Stage::Submit => "submitting template…",
        Stage::Classify => "reading response…",
    }
}

impl GenerationObserver for SpinnerObserver {
    fn on_stage(&self, stage: Stage) {
        self.bar.set_message(stage_message(stage));
    }

    fn on_transition(&self, _from: GenerationState, to: GenerationState) {
        if !to.is_terminal() {
            self.bar.println(format!("  {} {}", green("✓"), to.label()));
        }
    }

    fn on_failure(&self, error: &DocumentGenerationError) {
        self.bar.finish_and_clear();
        eprintln!("  {} failed at {}", red("✗"), bold(&error.stage.to_string()));
    }

    fn on_complete(&self, bytes: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} PDF ready  {}  {}",
            green("✔"),
            dim(&format!("{bytes} bytes")),
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64())),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Interview session
  docrelay session --template docassemble.demo:data/questions/agreement.yml \
      --var client_name="Ann Lee" --var monthly_payment=520 -o agreement.pdf

  # Merge engine with an embedded signature image
  docrelay merge --template agreement.html --text client_name="Ann Lee" \
      --asset signature=sig.png -o agreement.pdf

  # HTML conversion engine
  docrelay convert --template agreement.html --text client_name="Ann Lee"

  # Preview the merged HTML locally
  docrelay render-html --template agreement.html --text client_name="Ann Lee" > preview.html

ENVIRONMENT VARIABLES:
  DOCRELAY_BASE_URL               Interview engine base URL
  DOCRELAY_API_KEY                Interview engine API key
  DOCRELAY_MERGE_URL              Merge endpoint
  DOCRELAY_MERGE_API_KEY          Merge API key
  DOCRELAY_MERGE_KEY_HEADER       Header carrying the merge API key (default: apikey)
  DOCRELAY_CONVERT_URL            Convert endpoint
  DOCRELAY_CONVERT_API_KEY        Convert API key
  DOCRELAY_CONVERT_API_SECRET     Convert API secret
  DOCRELAY_CONVERT_WORKSPACE      Convert workspace id
  RUST_LOG                        Override log filter (e.g. doc_relay=debug)
"#;

/// Drive remote document engines to a finished PDF.
#[derive(Parser, Debug)]
#[command(
    name = "docrelay",
    version,
    about = "Drive remote document-generation engines to a finished PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a PDF through an interview session.
    Session {
        /// Interview engine base URL.
        #[arg(long, env = "DOCRELAY_BASE_URL")]
        base_url: String,

        /// Interview engine API key.
        #[arg(long, env = "DOCRELAY_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Interview (template) identifier.
        #[arg(long)]
        template: String,

        /// Template variable, repeatable: --var name=value.
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },

    /// Merge a template locally and submit it to a merge engine.
    Merge {
        #[command(flatten)]
        template: TemplateArgs,

        /// Merge endpoint URL.
        #[arg(long, env = "DOCRELAY_MERGE_URL")]
        endpoint: String,

        /// Merge API key.
        #[arg(long, env = "DOCRELAY_MERGE_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Header carrying the API key.
        #[arg(long, env = "DOCRELAY_MERGE_KEY_HEADER", default_value = "apikey")]
        api_key_header: String,
    },

    /// Merge a template locally and submit it to an HTML conversion engine.
    Convert {
        #[command(flatten)]
        template: TemplateArgs,

        /// Convert endpoint URL.
        #[arg(long, env = "DOCRELAY_CONVERT_URL")]
        endpoint: String,

        /// Convert API key.
        #[arg(long, env = "DOCRELAY_CONVERT_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Convert API secret.
        #[arg(long, env = "DOCRELAY_CONVERT_API_SECRET", hide_env_values = true)]
        api_secret: String,

        /// Workspace id.
        #[arg(long, env = "DOCRELAY_CONVERT_WORKSPACE")]
        workspace_id: String,

        /// Header carrying the workspace id.
        #[arg(long, env = "DOCRELAY_CONVERT_WORKSPACE_HEADER", default_value = "X-Workspace-Id")]
        workspace_header: String,
    },

    /// Merge a template locally and print the HTML; no network.
    RenderHtml {
        #[command(flatten)]
        template: TemplateArgs,
    },
}

#[derive(Args, Debug)]
struct TemplateArgs {
    /// HTML template file with {{placeholder}} tokens.
    #[arg(long)]
    template: PathBuf,

    /// Text placeholder, repeatable: --text name=value.
    #[arg(long = "text", value_parser = parse_key_val)]
    text: Vec<(String, String)>,

    /// Image placeholder, repeatable: --asset name=path/to/image.png.
    #[arg(long = "asset", value_parser = parse_key_val)]
    assets: Vec<(String, String)>,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Write the PDF (or HTML for render-html) here. Default: ./<file-name>
    /// for PDFs, stdout for HTML.
    #[arg(short, long, global = true, env = "DOCRELAY_OUTPUT")]
    output: Option<PathBuf>,

    /// File name announced for the artifact.
    #[arg(long, global = true, env = "DOCRELAY_FILE_NAME", default_value = "document.pdf")]
    file_name: String,

    /// Offer the PDF inline instead of as an attachment.
    #[arg(long, global = true)]
    inline: bool,

    /// TCP/TLS connect timeout in seconds.
    #[arg(long, global = true, env = "DOCRELAY_CONNECT_TIMEOUT", default_value_t = 10)]
    connect_timeout: u64,

    /// Whole-request timeout in seconds.
    #[arg(long, global = true, env = "DOCRELAY_REQUEST_TIMEOUT", default_value_t = 60)]
    request_timeout: u64,

    /// User-Agent for outbound calls.
    #[arg(long, global = true, env = "DOCRELAY_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Print failures as a JSON error report on stdout.
    #[arg(long, global = true, env = "DOCRELAY_JSON_ERRORS")]
    json_errors: bool,

    /// Disable the spinner.
    #[arg(long, global = true, env = "DOCRELAY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCRELAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCRELAY_QUIET")]
    quiet: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports progress, so library INFO lines are muted
    // while it runs.
    let show_progress = !cli.common.quiet && !cli.common.no_progress && !cli.common.json_errors;
    let filter = if cli.common.verbose {
        "debug"
    } else if cli.common.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let json_errors = cli.common.json_errors;
    match run(cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(&err, json_errors);
            ExitCode::FAILURE
        }
    }
}

fn report_failure(err: &anyhow::Error, json: bool) {
    let generation = err.chain().find_map(|e| e.downcast_ref::<DocumentGenerationError>());

    if json {
        let report = match generation {
            Some(g) => serde_json::to_string_pretty(&g.report()),
            None => serde_json::to_string_pretty(&serde_json::json!({
                "success": false,
                "message": format!("{err:#}"),
            })),
        };
        match report {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{} {err:#} (report serialisation failed: {e})", red("error:")),
        }
        return;
    }

    eprintln!("{} {err:#}", red("error:"));
    if let Some(preview) = generation.and_then(|g| g.cause.preview()) {
        eprintln!("  {} {}", dim("preview:"), preview);
    }
}

/// What to submit once the relay is built.
enum Job {
    Session { template: String, variables: Variables },
    Render(MergeContext),
}

async fn run(cli: Cli, show_progress: bool) -> Result<()> {
    let common = &cli.common;

    let (dialect, job) = match cli.command {
        Command::RenderHtml { template } => {
            let context = load_context(&template).await?;
            let html = merge(&context);
            return write_html(&html, common.output.as_ref()).await;
        }
        Command::Session {
            base_url,
            api_key,
            template,
            vars,
        } => (
            Dialect::Interview(
                InterviewDialect::new(&base_url, api_key).context("Invalid interview engine settings")?,
            ),
            Job::Session {
                template,
                variables: vars.into_iter().collect(),
            },
        ),
        Command::Merge {
            template,
            endpoint,
            api_key,
            api_key_header,
        } => (
            Dialect::Merge(
                MergeDialect::new(&endpoint, api_key)
                    .context("Invalid merge engine settings")?
                    .with_api_key_header(api_key_header),
            ),
            Job::Render(load_context(&template).await?),
        ),
        Command::Convert {
            template,
            endpoint,
            api_key,
            api_secret,
            workspace_id,
            workspace_header,
        } => (
            Dialect::Convert(
                ConvertDialect::new(&endpoint, api_key, api_secret, workspace_id)
                    .context("Invalid convert engine settings")?
                    .with_workspace_header(workspace_header),
            ),
            Job::Render(load_context(&template).await?),
        ),
    };

    let config = build_config(common, dialect)?;
    let mut relay = SessionOrchestrator::from_config(config).context("Failed to build HTTP client")?;
    if show_progress {
        relay = relay.with_observer(SpinnerObserver::new());
    }

    let pdf = match job {
        Job::Session { template, variables } => relay.generate_document(&template, &variables).await?,
        Job::Render(context) => relay.render_template(&context).await?,
    };

    let delivery = relay.delivery();
    let path = common
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&delivery.file_name));
    delivery.write_artifact(&pdf, &path)?;

    if !common.quiet {
        eprintln!(
            "{}  {}  →  {}",
            green("✔"),
            dim(&delivery.content_disposition()),
            bold(&path.display().to_string()),
        );
    }
    Ok(())
}

/// Map CLI args to `RelayConfig`.
fn build_config(common: &CommonArgs, dialect: Dialect) -> Result<RelayConfig> {
    let disposition = if common.inline {
        Disposition::Inline
    } else {
        Disposition::Attachment
    };
    RelayConfig::builder(dialect)
        .connect_timeout_secs(common.connect_timeout)
        .request_timeout_secs(common.request_timeout)
        .user_agent(common.user_agent.clone())
        .file_name(common.file_name.clone())
        .disposition(disposition)
        .build()
        .context("Invalid configuration")
}

async fn load_context(args: &TemplateArgs) -> Result<MergeContext> {
    let template = tokio::fs::read(&args.template)
        .await
        .with_context(|| format!("Failed to read template {:?}", args.template))?;
    if !looks_like_html(&String::from_utf8_lossy(&template)) {
        tracing::warn!("Template {:?} does not look like HTML", args.template);
    }

    let mut context = MergeContext::new(template);
    for (name, value) in &args.text {
        context = context.text(name.clone(), value.clone());
    }
    for (name, path) in &args.assets {
        let asset = EmbeddedAsset::from_path(Path::new(path))
            .with_context(|| format!("Failed to read asset '{name}' from {path:?}"))?;
        context = context.asset(name.clone(), asset);
    }
    Ok(context)
}

async fn write_html(html: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => tokio::fs::write(path, html)
            .await
            .with_context(|| format!("Failed to write HTML to {path:?}")),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(html.as_bytes()).context("Failed to write to stdout")?;
            if !html.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
            Ok(())
        }
    }
}
