//! # DocVault CLI (`docvault`)
//!
//! Manage apps, upload documents, and build or remove the page-level chunks
//! of PDF documents.
//!
//! ## Usage
//!
//! ```bash
//! docvault --config ./config/docvault.toml --user <id> <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docvault init` | Create the SQLite database, schema, and data directory |
//! | `docvault app create\|list\|show\|update\|delete` | Manage apps |
//! | `docvault doc upload\|list\|rename\|delete` | Manage documents of an app |
//! | `docvault chunk create\|list\|show\|delete` | Chunk documents, per document or per app |
//! | `docvault image list\|describe` | Inspect and annotate extracted images |
//!
//! Failures print `error [<KIND>]: <message>` on stderr and exit non-zero.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use docvault::config;
use docvault::docvault_core::access::{Access, Actor};
use docvault::docvault_core::app::AppDetails;
use docvault::docvault_core::chunk::ChunkParams;
use docvault::docvault_core::document::DocumentUpload;
use docvault::docvault_core::models::Chunk;
use docvault::docvault_core::VaultError;
use docvault::vault::Vault;
use docvault::{logging, migrate};

/// DocVault: apps, documents, and page-level chunks with extracted images.
#[derive(Parser)]
#[command(name = "docvault", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docvault.toml")]
    config: PathBuf,

    /// Acting user id. Ownership checks compare against this.
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and the data directory.
    ///
    /// Idempotent; running it more than once is safe.
    Init,

    /// Manage apps.
    App {
        #[command(subcommand)]
        action: AppAction,
    },

    /// Manage documents.
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Create, list, and delete chunks.
    Chunk {
        #[command(subcommand)]
        action: ChunkAction,
    },

    /// Inspect extracted images.
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },
}

#[derive(Subcommand)]
enum AppAction {
    /// Register an app. Names are exactly four uppercase letters.
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Repeatable.
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
    /// List apps created by the acting user.
    List,
    Show {
        app_id: String,
    },
    /// Replace description and keywords.
    Update {
        app_id: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
    /// Delete an app with all of its documents, chunks, and images.
    Delete {
        app_id: String,
    },
}

#[derive(Subcommand)]
enum DocAction {
    /// Upload one or more files into an app.
    Upload {
        app_id: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    List {
        app_id: String,
    },
    /// Rename a document. The extension is kept.
    Rename {
        document_id: String,
        new_name: String,
    },
    /// Delete a document together with its chunks.
    Delete {
        document_id: String,
    },
}

#[derive(Subcommand)]
enum ChunkAction {
    /// Chunk one document, or every document of an app with `--app`.
    ///
    /// Existing chunks of a document are replaced.
    Create {
        #[arg(required_unless_present = "app", conflicts_with = "app")]
        document_id: Option<String>,
        #[arg(long)]
        app: Option<String>,
        /// Window size in characters. Defaults to `chunking.chunk_size`.
        #[arg(long)]
        size: Option<usize>,
        /// Overlap in characters. Defaults to `chunking.chunk_overlap`.
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// List the chunks of a document.
    List {
        document_id: String,
    },
    Show {
        chunk_id: String,
    },
    /// Delete the chunks of one document, of every document of an app, or a single chunk.
    Delete {
        #[arg(required_unless_present_any = ["app", "chunk"], conflicts_with_all = ["app", "chunk"])]
        document_id: Option<String>,
        #[arg(long, conflicts_with = "chunk")]
        app: Option<String>,
        #[arg(long)]
        chunk: Option<String>,
    },
}

#[derive(Subcommand)]
enum ImageAction {
    /// List the images of a chunk.
    List {
        chunk_id: String,
    },
    /// Set an image's description.
    Describe {
        image_id: String,
        description: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            match err.downcast_ref::<VaultError>() {
                Some(vault_err) => eprintln!("error [{}]: {}", vault_err.kind(), vault_err),
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);
    let actor = Actor::new(cli.user);

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        std::fs::create_dir_all(&cfg.storage.data_dir)
            .with_context(|| format!("Failed to create {}", cfg.storage.data_dir.display()))?;
        println!("Database initialized successfully.");
        return Ok(ExitCode::SUCCESS);
    }

    let vault = Vault::open(cfg).await?;
    let outcome = match cli.command {
        Commands::Init => Ok(ExitCode::SUCCESS),
        Commands::App { action } => app_command(&vault, action, &actor).await,
        Commands::Doc { action } => doc_command(&vault, action, &actor).await,
        Commands::Chunk { action } => chunk_command(&vault, action, &actor).await,
        Commands::Image { action } => image_command(&vault, action, &actor).await,
    };
    vault.close().await;
    outcome
}

async fn app_command(vault: &Vault, action: AppAction, actor: &Actor) -> Result<ExitCode> {
    match action {
        AppAction::Create {
            name,
            description,
            keywords,
        } => {
            let app = vault
                .apps
                .register_app(&name, AppDetails { description, keywords }, actor)
                .await?;
            println!("Created app {} ({})", app.name, app.id);
        }
        AppAction::List => {
            for app in vault.apps.list_apps(actor).await? {
                println!("{}\t{}\t{}", app.id, app.name, app.description.unwrap_or_default());
            }
        }
        AppAction::Show { app_id } => {
            let app = vault.apps.get_app(&app_id).await?;
            println!("{}", serde_json::to_string_pretty(&app)?);
        }
        AppAction::Update {
            app_id,
            description,
            keywords,
        } => {
            let app = vault
                .apps
                .update_app(&app_id, AppDetails { description, keywords }, actor)
                .await?;
            println!("Updated app {} ({})", app.name, app.id);
        }
        AppAction::Delete { app_id } => {
            let removal = vault.delete_app_cascade(&app_id, actor).await?;
            println!(
                "Deleted app {} ({} documents, chunks removed from {})",
                removal.app.name,
                removal.documents.succeeded.len(),
                removal.chunk_documents
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn mime_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "pdf" => "application/pdf",
        Some(ext) if ext == "docx" => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some(ext) if ext == "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

async fn doc_command(vault: &Vault, action: DocAction, actor: &Actor) -> Result<ExitCode> {
    match action {
        DocAction::Upload { app_id, files } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .with_context(|| format!("Invalid file name: {}", path.display()))?
                    .to_string();
                uploads.push(DocumentUpload {
                    file_name,
                    mime_type: mime_type_for(path).to_string(),
                    bytes,
                });
            }

            let batch = vault.documents.upload_documents(&app_id, uploads, actor).await?;
            for doc in &batch.succeeded {
                println!("Uploaded {} ({})", doc.name, doc.id);
            }
            for failure in &batch.failed {
                println!("Skipped {}: {}", failure.name, failure.error);
            }
        }
        DocAction::List { app_id } => {
            for doc in vault.documents.list_documents(&app_id).await? {
                println!("{}\t{}\t{}\t{} bytes", doc.id, doc.name, doc.extension, doc.size);
            }
        }
        DocAction::Rename {
            document_id,
            new_name,
        } => {
            let doc = vault.documents.rename_document(&document_id, &new_name, actor).await?;
            println!("Renamed document {} to {}", doc.id, doc.name);
        }
        DocAction::Delete { document_id } => {
            let doc = vault.documents.get_document(&document_id).await?;
            if doc.extension == docvault::docvault_core::engine::CHUNKABLE_EXTENSION {
                vault
                    .engine
                    .delete_chunks_for_document(&doc.id, Access::Actor(actor.clone()))
                    .await?;
            }
            let doc = vault.documents.delete_document(&doc.id, actor).await?;
            println!("Deleted document {} ({})", doc.name, doc.id);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_chunks(chunks: &[Chunk]) {
    for chunk in chunks {
        let preview: String = chunk.content.chars().take(60).collect();
        println!(
            "{}\tpage {}\t{} images\t{}",
            chunk.id,
            chunk.page,
            chunk.images.len(),
            preview.replace('\n', " ")
        );
    }
}

async fn chunk_command(vault: &Vault, action: ChunkAction, actor: &Actor) -> Result<ExitCode> {
    match action {
        ChunkAction::Create {
            document_id,
            app,
            size,
            overlap,
        } => {
            let defaults = vault.config.chunking.params();
            let params = ChunkParams {
                size: size.unwrap_or(defaults.size),
                overlap: overlap.unwrap_or(defaults.overlap),
            };

            if let Some(app_id) = app {
                let report = vault.engine.create_chunks_for_app(&app_id, params, actor).await?;
                for done in &report.succeeded {
                    println!("Created {} chunks for document {}", done.chunks.len(), done.document_id);
                }
                for failure in &report.failed {
                    println!("Failed document {} [{}]: {}", failure.document_id, failure.kind, failure.error);
                }
                if let Some(kind) = report.kind() {
                    eprintln!(
                        "error [{}]: {} of {} documents failed",
                        kind,
                        report.failed.len(),
                        report.failed.len() + report.succeeded.len()
                    );
                    return Ok(ExitCode::FAILURE);
                }
            } else if let Some(document_id) = document_id {
                let chunks = vault
                    .engine
                    .create_chunks_for_document(&document_id, params, Access::Actor(actor.clone()))
                    .await?;
                println!("Created {} chunks for document {}", chunks.len(), document_id);
                print_chunks(&chunks);
            }
        }
        ChunkAction::List { document_id } => {
            let chunks = vault
                .engine
                .get_chunks_for_document(&document_id, Access::Actor(actor.clone()))
                .await?;
            print_chunks(&chunks);
        }
        ChunkAction::Show { chunk_id } => {
            let chunk = vault.engine.get_chunk(&chunk_id, actor).await?;
            println!("{}", serde_json::to_string_pretty(&chunk)?);
        }
        ChunkAction::Delete {
            document_id,
            app,
            chunk,
        } => {
            if let Some(chunk_id) = chunk {
                let chunk = vault.engine.delete_chunk(&chunk_id, actor).await?;
                println!("Deleted chunk {} ({} images)", chunk.id, chunk.images.len());
            } else if let Some(app_id) = app {
                let removed = vault.engine.delete_chunks_for_app(&app_id, actor).await?;
                let total: usize = removed.iter().map(|d| d.chunks.len()).sum();
                println!("Deleted {} chunks from {} documents", total, removed.len());
            } else if let Some(document_id) = document_id {
                let deleted = vault
                    .engine
                    .delete_chunks_for_document(&document_id, Access::Actor(actor.clone()))
                    .await?;
                println!(
                    "Deleted {} chunks and {} images from document {}",
                    deleted.chunks.len(),
                    deleted.images.len(),
                    document_id
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn image_command(vault: &Vault, action: ImageAction, actor: &Actor) -> Result<ExitCode> {
    match action {
        ImageAction::List { chunk_id } => {
            for image in vault.images.get_images_by_chunk(&chunk_id, actor).await? {
                println!(
                    "{}\t{}\t{}",
                    image.id,
                    image.image_url,
                    image.image_description.unwrap_or_default()
                );
            }
        }
        ImageAction::Describe {
            image_id,
            description,
        } => {
            let image = vault.images.update_image(&image_id, &description, actor).await?;
            println!("Updated image {}", image.id);
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_chunk_delete_needs_a_target() {
        assert!(Cli::try_parse_from(["docvault", "chunk", "delete"]).is_err());
        assert!(Cli::try_parse_from(["docvault", "chunk", "delete", "--app", "a1"]).is_ok());
        assert!(Cli::try_parse_from(["docvault", "chunk", "delete", "d1", "--app", "a1"]).is_err());
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type_for(std::path::Path::new("a.PDF")), "application/pdf");
        assert_eq!(mime_type_for(std::path::Path::new("a")), "application/octet-stream");
    }
}
