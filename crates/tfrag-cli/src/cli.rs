//! CLI definition and command dispatch for tfrag.
//!
//! ## Configuration Precedence
//!
//! 1. CLI flags (`--config`, `--rules`, `--device`, `--k-docs`, ...)
//! 2. Environment variables (`TFRAG_CONFIG`, `TFRAG_RULES`, `TFRAG_DEVICE`, ...)
//! 3. Settings file (`~/.tfrag/config.yaml` or the `--config` path)
//! 4. Built-in defaults
//!
//! `--json` output goes to stdout; logs and the spinner go to stderr.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use crate::ui::color::terminal_width;
use crate::ui::{format, table, ColorMode, MessageType, ProgressMode, Spinner, Style};

use tfrag_core::{
    ChatMessage, DevicePreference, HealthStatus, PipelineState, RagEngine, RagError, Settings,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// Width reserved for the other source table columns before the preview.
const SOURCE_COLUMNS_WIDTH: usize = 70;

/// Terraform question answering over indexed books and examples
#[derive(Parser, Debug)]
#[command(name = "tfrag")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging and pipeline trace)
    #[arg(short, long, global = true, env = "TFRAG_VERBOSE")]
    pub verbose: bool,

    /// Suppress progress and informational messages
    #[arg(short, long, global = true, env = "TFRAG_QUIET")]
    pub quiet: bool,

    /// Path to settings file (default: ~/.tfrag/config.yaml)
    #[arg(long, global = true, env = "TFRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Classifier rules file (overrides rulesPath in settings)
    #[arg(long, global = true, env = "TFRAG_RULES")]
    pub rules: Option<PathBuf>,

    /// Device preference for embedding inference (auto/gpu/cpu)
    #[arg(long, global = true, env = "TFRAG_DEVICE")]
    pub device: Option<String>,

    /// Color output mode
    #[arg(long, global = true, env = "TFRAG_COLOR", value_enum, default_value = "auto")]
    pub color: ColorMode,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a Terraform question from the indexed collections
    #[command(after_help = r#"EXAMPLES:
    # Ask for a template
    tfrag ask "¿Cómo creo un storage account en Azure con Terraform?"

    # Retrieve more documents with a stricter threshold
    tfrag ask "explain terraform state locking" --k-docs 5 --threshold 0.5

    # Follow-up question with conversation history
    tfrag ask "and with private endpoints?" --history chat.json

    # JSON response for scripting
    tfrag ask "terraform module for aks" --json | jq '.sources[].source'
"#)]
    Ask {
        /// The question
        question: String,

        /// Documents to keep (1-20, default from settings)
        #[arg(short = 'k', long)]
        k_docs: Option<usize>,

        /// Minimum similarity score (0.0-1.0, default from settings)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// JSON file with earlier turns: [{"role": "user", "content": "..."}]
        #[arg(long)]
        history: Option<PathBuf>,

        /// Output the response as JSON
        #[arg(long)]
        json: bool,

        /// Output the response as pretty-printed JSON
        #[arg(long, conflicts_with = "json")]
        pretty: bool,
    },

    /// Show how a question is scoped and classified, without retrieval
    #[command(after_help = r#"EXAMPLES:
    tfrag classify "terraform module completo para aks y explica los pasos"
    tfrag classify "hola" --json
"#)]
    Classify {
        question: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check the vector store and collection document counts
    #[command(after_help = r#"EXAMPLES:
    tfrag health

    # Exit status is non-zero when the store is unavailable
    tfrag health --json || echo "store down"
"#)]
    Health {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the effective settings and classifier rules source
    #[command(after_help = r#"EXAMPLES:
    tfrag config
    tfrag --config ./tfrag.yaml config --json
"#)]
    Config {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Run function
// ============================================================================

/// Parse arguments, build the engine and dispatch the command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Warnings always, debug with --verbose
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = format!("tfrag_core={lvl},tfrag_db={lvl},tfrag_model={lvl},tfrag_cli={lvl}", lvl = log_level);

    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let style = Style::new(cli.color);

    let mut engine = match create_engine(&cli) {
        Ok(engine) => engine,
        Err(e) => {
            let hint = match &cli.config {
                Some(path) => format!("Check your settings at {}", path.display()),
                None => "Check ~/.tfrag/config.yaml or pass --config".to_string(),
            };
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to initialize tfrag",
                    Some(&format!("{:#}", e)),
                    Some(&hint)
                )
            );
            return ExitCode::FAILURE;
        }
    };

    if let Some(device) = &cli.device {
        match device.parse::<DevicePreference>() {
            Ok(pref) => engine.set_device(pref),
            Err(e) => {
                eprintln!("{}", style.message(MessageType::Err, &e));
                return ExitCode::FAILURE;
            }
        }
    }

    let result = match cli.command {
        Command::Ask {
            question,
            k_docs,
            threshold,
            history,
            json,
            pretty,
        } => handle_ask(
            &style,
            &engine,
            AskArgs {
                question,
                k_docs,
                threshold,
                history,
                json,
                pretty,
            },
            cli.quiet,
            cli.verbose,
        ),
        Command::Classify { question, json } => handle_classify(&style, &engine, &question, json),
        Command::Health { json } => handle_health(&style, &engine, json),
        Command::Config { json } => handle_config(&style, &engine, cli.config.as_deref(), json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style.message(MessageType::Err, &e.to_string()));
            if let RagError::InvalidConfiguration { .. } | RagError::InvalidArgument(_) = e {
                eprintln!(
                    "{}",
                    style.message(MessageType::Hint, "Run `tfrag <command> --help` for valid values")
                );
            }
            ExitCode::FAILURE
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, RagError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::load_default()?,
    };
    if let Some(rules) = &cli.rules {
        settings.rules_path = Some(rules.clone());
    }
    Ok(settings)
}

fn create_engine(cli: &Cli) -> anyhow::Result<RagEngine> {
    let settings = load_settings(cli)?;
    tracing::debug!(
        "Vector store: {} at {}",
        settings.vector_store.backend,
        settings.vector_store.path.display()
    );
    RagEngine::from_settings(settings)
}

// ============================================================================
// Command handlers
// ============================================================================

struct AskArgs {
    question: String,
    k_docs: Option<usize>,
    threshold: Option<f32>,
    history: Option<PathBuf>,
    json: bool,
    pretty: bool,
}

fn load_history(path: &Path) -> Result<Vec<ChatMessage>, RagError> {
    let content = fs::read_to_string(path).map_err(|e| {
        RagError::InvalidArgument(format!("Failed to read history {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        RagError::InvalidArgument(format!(
            "History {} is not a JSON array of {{role, content}} messages: {}",
            path.display(),
            e
        ))
    })
}

fn handle_ask(
    style: &Style,
    engine: &RagEngine,
    args: AskArgs,
    quiet: bool,
    verbose: bool,
) -> Result<ExitCode, RagError> {
    let mut request = engine.request(&args.question);
    if let Some(k) = args.k_docs {
        request = request.with_k_docs(k);
    }
    if let Some(threshold) = args.threshold {
        request = request.with_threshold(threshold);
    }
    if let Some(path) = &args.history {
        request = request.with_history(load_history(path)?);
    }
    request.validate()?;

    let machine = args.json || args.pretty;
    let spinner = Spinner::start("Answering", ProgressMode::detect(quiet, machine));
    let state = engine.ask_with_state(request)?;
    spinner.finish();

    if machine {
        let response = state.into_response();
        let output = if args.pretty {
            serde_json::to_string_pretty(&response)?
        } else {
            serde_json::to_string(&response)?
        };
        println!("{}", output);
        return Ok(ExitCode::SUCCESS);
    }

    print_answer(style, &state, quiet);

    if verbose && !state.trace.is_empty() {
        println!();
        println!("{}", style.section("TRACE"));
        for line in &state.trace {
            println!("  {}", line);
        }
        println!(
            "  {}",
            style.key_value("Elapsed", &format!("{}ms", spinner.elapsed().as_millis()))
        );
    }

    Ok(ExitCode::SUCCESS)
}

fn print_answer(style: &Style, state: &PipelineState, quiet: bool) {
    let rejected = state.scope.as_ref().filter(|s| !s.in_scope);

    if !quiet {
        match rejected {
            Some(scope) => println!(
                "{}",
                style.message(MessageType::Warn, &format!("Out of scope: {}", scope.message))
            ),
            None => {
                if let Some(action) = state.action {
                    println!(
                        "{}",
                        style.message(
                            MessageType::Info,
                            &format!("Intent: {} ({})", state.intent, action)
                        )
                    );
                }
            }
        }
        if state.question != state.original_question {
            println!(
                "{}",
                style.message(
                    MessageType::Info,
                    &format!("Rewritten question: {}", state.question)
                )
            );
        }
        println!();
        println!("{}", style.section("ANSWER"));
        println!();
    }

    println!("{}", state.answer.as_deref().unwrap_or_default());

    if !quiet && !state.sources.is_empty() {
        let preview = terminal_width().saturating_sub(SOURCE_COLUMNS_WIDTH);
        println!();
        println!("{}", style.section("SOURCES"));
        println!();
        println!("{}", table::render_sources_table(&state.sources, preview));
    }
}

fn handle_classify(
    style: &Style,
    engine: &RagEngine,
    question: &str,
    json: bool,
) -> Result<ExitCode, RagError> {
    let classification = engine.classify(question);

    if json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
        return Ok(ExitCode::SUCCESS);
    }

    let scope = &classification.scope;
    if scope.in_scope {
        println!("{}", style.message(MessageType::Ok, &format!("In scope: {}", scope.message)));
    } else {
        println!(
            "{}",
            style.message(MessageType::Warn, &format!("Out of scope: {}", scope.message))
        );
    }

    if let Some(intent) = &classification.intent {
        println!();
        println!("{}", style.section("INTENT"));
        println!();
        println!("  {}", style.key_value("Primary", &intent.primary_intent));
        println!("  {}", style.key_value("Action", intent.action.as_str()));
        if intent.is_multi_intent {
            println!("  {}", style.key_value("Intents", &intent.all_intents_found.join(", ")));
        }
        if let Some(collection) = &intent.preferred_collection {
            println!("  {}", style.key_value("Collection", &style.source(collection)));
        }
        let scores = table::render_intent_scores(&intent.scores);
        if !scores.is_empty() {
            println!();
            println!("{}", scores);
        }
    }

    if let Some(message) = &classification.rejection_message {
        println!();
        println!("  {}", style.key_value("Reply", message));
    }

    Ok(ExitCode::SUCCESS)
}

fn handle_health(style: &Style, engine: &RagEngine, json: bool) -> Result<ExitCode, RagError> {
    let report = engine.health();
    let code = if report.status == HealthStatus::Unhealthy {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(code);
    }

    println!(
        "{}",
        style.message(
            Style::health_message_type(report.status),
            &format!("{}: {}", style.health(report.status), report.message)
        )
    );
    println!();
    println!("  {}", style.key_value("Vector store", &report.vector_db_status));
    println!(
        "  {}",
        style.key_value("Location", &style.source(&engine.settings().vector_store.path.display().to_string()))
    );
    println!("  {}", style.key_value("Documents", &format::format_count(report.documents_count)));

    let collections = table::render_collections_table(&report.collections);
    if !collections.is_empty() {
        println!();
        println!("{}", collections);
    }

    Ok(code)
}

fn handle_config(
    style: &Style,
    engine: &RagEngine,
    config_path: Option<&Path>,
    json: bool,
) -> Result<ExitCode, RagError> {
    let mut settings = engine.settings().clone();
    if settings.generation.api_key.is_some() {
        settings.generation.api_key = Some("***".to_string());
    }
    let warnings = settings.validate()?;
    let path = config_path
        .map(Path::to_path_buf)
        .or_else(Settings::default_path);

    let output = json!({
        "configPath": path.as_ref().map(|p| p.display().to_string()),
        "configExists": path.as_ref().is_some_and(|p| p.exists()),
        "rulesSource": engine.rules().source_name,
        "settings": &settings,
        "warnings": warnings,
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    let location = match &path {
        Some(p) if p.exists() => p.display().to_string(),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "defaults".to_string(),
    };
    println!("{}", style.message(MessageType::Info, &format!("Settings: {}", location)));
    println!(
        "{}",
        style.message(MessageType::Info, &format!("Rules: {}", engine.rules().source_name))
    );
    for warning in &warnings {
        println!("{}", style.message(MessageType::Warn, warning));
    }
    println!();
    print!("{}", serde_yaml::to_string(&settings)?);

    Ok(ExitCode::SUCCESS)
}
