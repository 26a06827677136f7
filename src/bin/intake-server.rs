//! CLI binary for edgequake-intake.
//!
//! Serves the HTTP API by default; `--process FILE` runs a single upload
//! through the same handler and prints the JSON response.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_intake::{serve, CustomFields, DocumentIntake, IntakeConfig, UploadedDocument};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"ENVIRONMENT:
  YOLO_MODEL_PATH        ONNX receipt detector (required)
  GEMINI_MODEL           Model identifier, e.g. gemini-1.5-pro-002 (required)
  PROJECT_ID             Google Cloud project (required for Vertex AI)
  CREDENTIALS_FILE_PATH  Service-account JSON key (required for Vertex AI)
  VERTEX_LOCATION        Vertex AI region (default: us-central1)
  PDFIUM_LIB_PATH        Directory containing libpdfium (default: system library)
  INTAKE_LLM_PROVIDER    Use an edgequake-llm provider (openai, gemini, ...) instead of Vertex AI

EXAMPLES:
  intake-server --bind 127.0.0.1:8000
  intake-server --env-file prod.env
  intake-server --process receipt.jpg --header-field store_phone --item-field sku

  curl -F content=@receipt.jpg -F custome_field_headers=store_phone http://localhost:8000/process/
"#;

/// Receipt and invoice intake service.
#[derive(Parser, Debug)]
#[command(
    name = "intake-server",
    version,
    about = "Extract structured data from receipt and invoice images or PDFs",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, env = "INTAKE_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Load environment variables from this file before reading configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Process one local file and print the response instead of serving.
    #[arg(long, value_name = "FILE")]
    process: Option<PathBuf>,

    /// Extra top-level field for `--process` (repeatable, comma-separated allowed).
    #[arg(long = "header-field", value_name = "NAME")]
    header_fields: Vec<String>,

    /// Extra line-item field for `--process` (repeatable, comma-separated allowed).
    #[arg(long = "item-field", value_name = "NAME")]
    item_fields: Vec<String>,

    /// Debug logging.
    #[arg(short, long, env = "INTAKE_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, env = "INTAKE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Environment ──────────────────────────────────────────────────────
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Service ──────────────────────────────────────────────────────────
    let config = IntakeConfig::from_env().context("Invalid configuration")?;
    let intake = DocumentIntake::from_config(config).context("Failed to initialise intake service")?;

    match cli.process {
        Some(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let upload = UploadedDocument::new(bytes, filename, None);
            let fields = CustomFields::from_form(cli.header_fields, cli.item_fields);

            let response = intake
                .process(upload, fields)
                .await
                .with_context(|| format!("Failed to process {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        None => {
            info!("Starting intake-server v{}", env!("CARGO_PKG_VERSION"));
            serve(cli.bind, Arc::new(intake)).await?;
        }
    }

    Ok(())
}
