use anyhow::Context;
use clap::{Parser, Subcommand};
use profile_diagnostics::config::{Config, LoggingConfig};
use profile_diagnostics::services::operator_stats::{OutputFormat, analyze_to_json};
use profile_diagnostics::{AppState, build_router};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "profile-diagnostics")]
#[command(about = "Condense query operator statistics into a bounded diagnostic payload")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Analyze a JSON file of operator rows and print the payload
    Analyze {
        /// Query ID (UUID)
        #[arg(long)]
        query_id: String,
        /// Path to a JSON array of operator rows
        #[arg(long)]
        input: PathBuf,
        /// Print a single-line payload instead of the indented one
        #[arg(long)]
        compact: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load()?;
    let _guard = init_tracing(&config.logging)?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Analyze { query_id, input, compact } => {
            let format = if compact { OutputFormat::Compact } else { OutputFormat::Expanded };
            analyze_file(&config, &query_id, &input, format)
        },
    }
}

/// Stderr logging plus an optional daily rolling file
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&logging.level)
        .with_context(|| format!("invalid logging.level '{}'", logging.level))?;

    let (file_layer, guard) = match &logging.file {
        Some(file) => {
            let path = Path::new(file);
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("logging.file '{}' has no file name", file))?;
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState { config });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn analyze_file(config: &Config, query_id: &str, input: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let rows: Vec<Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of operator rows", input.display()))?;

    let options = config.analysis_options(Some(format));
    let (status, body) = analyze_to_json(query_id, &rows, &options);
    println!("{}", body);

    if !status.is_success() {
        anyhow::bail!("analysis failed with status {}", status);
    }
    Ok(())
}
