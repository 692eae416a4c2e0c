//! pdfpal - chat with uploaded documents from the terminal

use anyhow::Result;
use clap::{Parser, Subcommand};
use pdfpal::client::{self, StartupTarget};
use pdfpal::config::Config;

#[derive(Parser)]
#[command(name = "pdfpal")]
#[command(about = "Chat with your uploaded documents from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat about an uploaded document
    Chat {
        /// Document id returned by the upload
        document_id: String,
        /// Display name of the document
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Upload a PDF and start chatting about it
    Upload {
        /// Path to the PDF
        path: std::path::PathBuf,
    },
    /// Resume a stored conversation
    Resume {
        /// Session id or list number
        session: String,
    },
    /// List stored conversations
    Sessions,
    /// Rename a stored conversation
    Rename {
        /// Session id or list number
        session: String,
        /// New name
        name: String,
    },
    /// Delete a stored conversation
    Delete {
        /// Session id or list number
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they stay out of the transcript
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Some(Commands::Chat { document_id, name }) => {
            tracing::info!("Opening chat for document: {}", document_id);
            let document_name = name.unwrap_or_else(|| document_id.clone());
            client::run(
                &config,
                StartupTarget::Document {
                    document_id,
                    document_name,
                },
            )
            .await
        }
        Some(Commands::Upload { path }) => {
            let uploaded = client::upload_document(&config, &path).await?;
            client::run(
                &config,
                StartupTarget::Document {
                    document_id: uploaded.document_id,
                    document_name: uploaded.filename,
                },
            )
            .await
        }
        Some(Commands::Resume { session }) => {
            tracing::info!("Resuming session: {}", session);
            client::run(&config, StartupTarget::Session(session)).await
        }
        Some(Commands::Sessions) => client::list_sessions(&config),
        Some(Commands::Rename { session, name }) => client::rename_session(&config, &session, &name),
        Some(Commands::Delete { session }) => client::delete_session(&config, &session),
        // Default: resume the most recent conversation
        None => client::run(&config, StartupTarget::MostRecent).await,
    }
}
