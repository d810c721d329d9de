//! # docchat CLI
//!
//! The `docchat` binary starts the web server and covers the administrative
//! tasks that don't need a browser: schema setup, account management, and
//! working with a user's document collection and transcripts.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite database and schema |
//! | `docchat serve` | Start the web UI and JSON API |
//! | `docchat user add <email> --password <pw>` | Create an account |
//! | `docchat user check <email> --password <pw>` | Verify credentials |
//! | `docchat user remove <email>` | Delete an account |
//! | `docchat upload <file> --user <email>` | Ingest a document for a user |
//! | `docchat documents --user <email>` | List a user's documents |
//! | `docchat clear --user <email>` | Remove all of a user's documents |
//! | `docchat export <chat> --user <email>` | Write a chat transcript as CSV |

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use docchat::config::{load_config, Config};
use docchat::paths::{collection_name, DataLayout};
use docchat::users::{self, validate_registration};
use docchat::{collection, db, ingest, migrate, server, transcript};

/// docchat: chat with your documents through a hosted LLM.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "docchat: a document-grounded chat assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running it
    /// more than once is safe.
    Init,

    /// Start the web server.
    Serve,

    /// Manage user accounts.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Extract, chunk and embed a file into a user's collection.
    Upload {
        file: PathBuf,
        #[arg(long)]
        user: String,
    },

    /// List the documents in a user's collection.
    Documents {
        #[arg(long)]
        user: String,
    },

    /// Remove every document from a user's collection.
    Clear {
        #[arg(long)]
        user: String,
    },

    /// Export a chat transcript to CSV and print the file path.
    Export {
        chat: String,
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create an account.
    Add {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Check an email/password pair.
    Check {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Delete an account.
    Remove { email: String },
}

fn init_tracing(default: LevelFilter) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve => LevelFilter::INFO,
        _ => LevelFilter::WARN,
    };
    init_tracing(default_level);

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            let pool = db::connect(&config).await?;
            let user_count = users::count_users(&pool).await?;
            pool.close().await;
            println!(
                "Database initialized at {} ({} users)",
                config.db.path.display(),
                user_count
            );
        }
        Commands::Serve => {
            server::run_server(&config).await?;
        }
        Commands::User { action } => run_user(&config, action).await?,
        Commands::Upload { file, user } => run_upload(&config, &file, &user).await?,
        Commands::Documents { user } => run_documents(&config, &user).await?,
        Commands::Clear { user } => {
            let pool = db::connect(&config).await?;
            let removed = collection::clear(&pool, &collection_name(&user)).await?;
            pool.close().await;
            println!("Removed {} documents for {}", removed, user);
        }
        Commands::Export { chat, user } => {
            let layout = DataLayout::new(&config.storage.data_dir);
            match transcript::export_csv(&layout, &user, &chat)? {
                Some(path) => println!("{}", path.display()),
                None => bail!("No history for chat '{}'", chat),
            }
        }
    }

    Ok(())
}

async fn run_user(config: &Config, action: UserAction) -> Result<()> {
    let pool = db::connect(config).await?;

    let result = match action {
        UserAction::Add { email, password } => {
            validate_registration(&email, &password, &password)?;
            if users::create_user(&pool, &email, &password).await? {
                println!("Created user {}", email);
                Ok(())
            } else {
                Err(anyhow::anyhow!("User {} already exists", email))
            }
        }
        UserAction::Check { email, password } => {
            if users::validate_user(&pool, &email, &password).await? {
                println!("ok");
                Ok(())
            } else {
                Err(anyhow::anyhow!("Invalid email or password"))
            }
        }
        UserAction::Remove { email } => {
            if users::delete_user(&pool, &email).await? {
                println!("Removed user {}", email);
                Ok(())
            } else {
                Err(anyhow::anyhow!("No such user: {}", email))
            }
        }
    };

    pool.close().await;
    result
}

async fn run_upload(config: &Config, file: &Path, user: &str) -> Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", file.display()))?;

    let pool = db::connect(config).await?;
    let layout = DataLayout::new(&config.storage.data_dir);
    let summary =
        ingest::ingest_upload(config, &pool, &layout, user, filename, None, &bytes).await;
    pool.close().await;
    let summary = summary?;

    println!(
        "Stored {} ({} chunks) as {}",
        summary.filename, summary.chunks, summary.document_id
    );
    Ok(())
}

async fn run_documents(config: &Config, user: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let collection = collection_name(user);
    let docs = collection::list_documents(&pool, &collection).await?;
    let chunks = collection::count(&pool, &collection).await?;
    pool.close().await;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in &docs {
        println!(
            "{}  {}  {}  {} bytes  {} chunks  {}",
            doc.id, doc.filename, doc.file_type, doc.file_size, doc.chunks, doc.uploaded_at
        );
    }
    println!("{} documents, {} chunks", docs.len(), chunks);
    Ok(())
}
