//! docshift CLI - convert uploaded files and fetch the results

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use docshift::{
    capability, load_config, Config, ConversionResponse, Database, DocshiftError, JobError,
    JobManager,
};

#[derive(Parser)]
#[command(name = "docshift")]
#[command(version)]
#[command(about = "Convert documents and images between formats", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, value_name = "FILE", env = "DOCSHIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a file for conversion
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Original file name to record (defaults to the file's own name)
        #[arg(long)]
        name: Option<String>,

        /// Owner token the job is recorded under
        #[arg(long, env = "DOCSHIFT_OWNER", default_value = "local")]
        owner: String,
    },

    /// Convert a registered file
    Convert {
        #[arg(value_name = "ID")]
        id: i64,

        /// Target format (jpg, png, gif, webp, pdf, doc, docx, ppt, pptx)
        #[arg(value_name = "FORMAT")]
        format: String,
    },

    /// Copy a converted file out of storage
    Download {
        #[arg(value_name = "ID")]
        id: i64,

        /// Destination file (defaults to the suggested name in the current directory)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// List conversions, newest first
    History {
        #[arg(long, env = "DOCSHIFT_OWNER", default_value = "local")]
        owner: String,

        #[arg(long, default_value = "1")]
        page: u64,
    },

    /// Show supported conversions
    Formats,
}

fn init_logging(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // The library's record store logs through `log`.
    tracing_log::LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))?;
    } else {
        let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))?;
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_json) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {}", public_message(&e));
            ExitCode::FAILURE
        }
    }
}

fn public_message(err: &DocshiftError) -> String {
    match err {
        DocshiftError::Job(job) => job.public_message(),
        DocshiftError::Config(config) => config.to_string(),
        DocshiftError::Storage(_) | DocshiftError::Database(_) => "Internal error".to_string(),
    }
}

fn run(cli: Cli) -> Result<ExitCode, DocshiftError> {
    if let Commands::Formats = cli.command {
        print_formats();
        return Ok(ExitCode::SUCCESS);
    }

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let db = Database::open(&config.database_path)?;
    let manager = JobManager::from_config(&config, db)?;

    match cli.command {
        Commands::Import { file, name, owner } => {
            let name = name.unwrap_or_else(|| file_name(&file));
            let job = manager.register_upload(&file, &name, &owner)?;
            print_json(&job);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Convert { id, format } => {
            let result = manager.request_conversion(id, &format);
            let response = ConversionResponse::from_result(&result);
            print_json(&response);
            Ok(if response.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Download { id, output } => {
            let target = manager.resolve_for_download(id)?;
            let dest = output.unwrap_or_else(|| PathBuf::from(&target.suggested_filename));
            let size = std::fs::copy(&target.absolute_path, &dest).map_err(|e| {
                tracing::error!(error = %e, "Failed to copy converted file");
                DocshiftError::Job(JobError::ArtifactMissing(id))
            })?;
            print_json(&serde_json::json!({
                "path": dest.display().to_string(),
                "content_type": target.content_type,
                "size": size,
            }));
            Ok(ExitCode::SUCCESS)
        }
        Commands::History { owner, page } => {
            let history = manager.history(&owner, page)?;
            print_json(&history);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Formats => Ok(ExitCode::SUCCESS),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}

fn print_formats() {
    for (source, target, strategy) in capability::supported_pairs() {
        println!("{:<5} -> {:<5} {}", source, target, strategy);
    }
}
