//! classgen CLI
//!
//! Generates quizzes and lesson plans from the generation service, parses
//! generated text, and manages saved records.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use classgen_content::{
    parse_or_fallback, ContentKind, DirRecordStore, LessonMetadata, LessonPlan, Quiz,
    QuizMetadata, RecordStore, SavedRecord,
};
use classgen_engine::{
    generate, EngineConfig, EngineError, FinalSource, Generation, Identity, SessionRegistry,
};
use tracing_subscriber::EnvFilter;

/// Default time to wait for a generation to finish (in seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 2;

/// classgen - Classroom Content Generator
///
/// Streams quizzes and lesson plans from the generation service and turns
/// them into structured, editable documents.
#[derive(Parser, Debug)]
#[command(name = "classgen")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: classgen.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a document from a prompt
    Generate(GenerateArgs),

    /// Parse a text file into a document
    Parse {
        /// Kind of content in the file
        #[arg(short, long, value_enum)]
        kind: Kind,

        /// Path to the text file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Manage saved records
    Records {
        #[command(subcommand)]
        action: RecordsCommand,
    },
}

#[derive(ClapArgs, Debug)]
struct GenerateArgs {
    /// Kind of content to generate
    #[arg(short, long, value_enum)]
    kind: Kind,

    /// User the session belongs to
    #[arg(short, long)]
    owner: String,

    /// Prompt sent to the service
    #[arg(short, long)]
    prompt: String,

    /// Title for the document and saved record
    #[arg(long)]
    title: Option<String>,

    /// Subject area
    #[arg(long)]
    subject: Option<String>,

    /// Grade level
    #[arg(long)]
    grade_level: Option<String>,

    /// Seconds to wait for the generation to finish
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Save the result as a record
    #[arg(long)]
    save: bool,
}

#[derive(Subcommand, Debug)]
enum RecordsCommand {
    /// List saved records, newest first
    List,
    /// Show one record as canonical text
    Show {
        /// Record id
        id: String,
    },
    /// Delete one record
    Delete {
        /// Record id
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Quiz,
    LessonPlan,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            let fatal = e
                .downcast_ref::<EngineError>()
                .is_some_and(EngineError::is_fatal);
            ExitCode::from(if fatal { EXIT_CONFIG } else { 1 })
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Generate(generate_args) => match generate_args.kind {
            Kind::Quiz => {
                let metadata = QuizMetadata {
                    title: generate_args.title.clone().unwrap_or_default(),
                    subject: generate_args.subject.clone().unwrap_or_default(),
                    grade_level: generate_args.grade_level.clone().unwrap_or_default(),
                    ..QuizMetadata::default()
                };
                run_generate::<Quiz>(&config, &generate_args, metadata).await
            }
            Kind::LessonPlan => {
                let metadata = LessonMetadata {
                    title: generate_args.title.clone().unwrap_or_default(),
                    subject: generate_args.subject.clone().unwrap_or_default(),
                    grade_level: generate_args.grade_level.clone().unwrap_or_default(),
                    ..LessonMetadata::default()
                };
                run_generate::<LessonPlan>(&config, &generate_args, metadata).await
            }
        },
        Command::Parse { kind, file } => match kind {
            Kind::Quiz => run_parse::<Quiz>(&file),
            Kind::LessonPlan => run_parse::<LessonPlan>(&file),
        },
        Command::Records { action } => {
            let store = DirRecordStore::new(&config.records_dir);
            run_records(&store, action)
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<EngineConfig> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(EngineConfig::load_from_file(path)?)
        }
        None => Ok(EngineConfig::load()?),
    }
}

/// Runs one generation, printing fragments as they arrive.
async fn run_generate<K: ContentKind>(
    config: &EngineConfig,
    args: &GenerateArgs,
    metadata: K::Metadata,
) -> anyhow::Result<()> {
    let mut registry = SessionRegistry::websocket(config.clone());
    let identity = Identity::new(&args.owner, K::NAME);
    tracing::info!(%identity, url = %config.endpoint(K::NAME, &args.owner)?, "Opening session");

    let handle = registry.open(identity).await?;
    let mut stdout = std::io::stdout();
    let timeout = Duration::from_secs(args.timeout);

    let outcome = tokio::select! {
        result = tokio::time::timeout(
            timeout,
            generate::<K, _>(handle, &args.prompt, metadata.clone(), |fragment| {
                let _ = write!(stdout, "{fragment}");
                let _ = stdout.flush();
            }),
        ) => result.map_err(|_| {
            anyhow::anyhow!(
                "Generation did not finish within {}s\n\nSuggestion: Check that the service at '{}' is running, or raise --timeout",
                args.timeout,
                config.service_url
            )
        }),
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
            Err(anyhow::anyhow!("Interrupted"))
        }
    };

    registry.close_all().await;
    let generation = outcome??;

    println!();
    println!();
    print_summary(&generation);
    println!();
    print!("{}", generation.resolved.document.to_text());

    if args.save {
        let store = DirRecordStore::new(&config.records_dir);
        let title = args
            .title
            .clone()
            .unwrap_or_else(|| args.prompt.clone());
        let document = generation
            .resolved
            .structured
            .then_some(&generation.resolved.document);
        let record = SavedRecord::new::<K>(title, &metadata, generation.text.clone(), document)?;
        store.put(&record)?;
        println!();
        println!("Saved record {} to {}", record.id, store.dir().display());
    }

    Ok(())
}

/// Prints a summary of a finished generation.
fn print_summary<K: ContentKind>(generation: &Generation<K>) {
    let resolved = &generation.resolved;
    println!("=== Generation Summary ===");
    println!("Kind: {}", K::NAME);
    println!(
        "Source: {}",
        match generation.source {
            FinalSource::Buffer => "streamed tokens",
            FinalSource::FullResponse => "full response",
        }
    );
    println!("Characters: {}", generation.text.chars().count());
    if resolved.structured {
        println!("Blocks: {}", resolved.document.len());
    } else {
        println!("Structure: not recognized, kept as raw text");
    }
    for diagnostic in &resolved.diagnostics {
        println!("  Skipped #{}: {}", diagnostic.segment, diagnostic.message);
    }
}

/// Parses a text file and prints the document as JSON.
fn run_parse<K: ContentKind>(path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read '{}': {e}", path.display())
    })?;

    let resolved = parse_or_fallback::<K>(&text, K::Metadata::default());
    println!("{}", serde_json::to_string_pretty(&resolved.document)?);

    if !resolved.structured {
        eprintln!(
            "No {} structure recognized; the text is kept as a single block",
            K::NAME
        );
    }
    for diagnostic in &resolved.diagnostics {
        eprintln!("Skipped #{}: {}", diagnostic.segment, diagnostic.message);
    }
    Ok(())
}

/// Runs a records subcommand.
fn run_records(store: &DirRecordStore, action: RecordsCommand) -> anyhow::Result<()> {
    match action {
        RecordsCommand::List => {
            let records = store.list()?;
            if records.is_empty() {
                println!("No saved records in {}", store.dir().display());
            }
            for record in records {
                let saved_at = record.timestamp.with_timezone(&chrono::Local);
                println!(
                    "{}  {}  {:<12} {}",
                    record.id,
                    saved_at.format("%Y-%m-%d %H:%M"),
                    record.kind,
                    record.title
                );
            }
        }
        RecordsCommand::Show { id } => {
            let record = store.get(&id)?;
            println!("Title: {}", record.title);
            println!("Saved: {}", record.timestamp.to_rfc3339());
            println!();
            if record.kind == Quiz::NAME {
                print!("{}", record.document::<Quiz>().to_text());
            } else if record.kind == LessonPlan::NAME {
                print!("{}", record.document::<LessonPlan>().to_text());
            } else {
                tracing::warn!(kind = %record.kind, "Unknown record kind, showing raw text");
                println!("{}", record.generated_text);
            }
        }
        RecordsCommand::Delete { id } => {
            store.delete(&id)?;
            println!("Deleted record {id}");
        }
    }
    Ok(())
}
