//! CLI tool for inspecting and maintaining the message store
//!
//! # Usage
//!
//! ```bash
//! # Store a raw message file in a mailbox
//! inbox-admin ingest user@example.com message.eml --from sender@example.com
//!
//! # List the newest messages of a mailbox
//! inbox-admin list user@example.com --limit 20
//!
//! # Show a message, or dump its original bytes
//! inbox-admin show <id>
//! inbox-admin raw <id> > message.eml
//!
//! # Delete expired messages now
//! inbox-admin purge
//! ```

use clap::{Parser, Subcommand};
use inbox_rs::config::Config;
use inbox_rs::store::{MessageStore, StoreOptions};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "inbox-admin")]
#[command(about = "Inspect and maintain the inbox message store", long_about = None)]
struct Cli {
    /// Config file (defaults are used when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL, overrides the config file (e.g., sqlite://inbox.db)
    #[arg(short, long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a raw RFC 5322 message
    Ingest {
        /// Mailbox to store the message under
        mailbox: String,
        /// Path of the message file
        file: PathBuf,
        /// Envelope sender
        #[arg(long, default_value = "")]
        from: String,
    },
    /// List messages of a mailbox, newest first
    List {
        mailbox: String,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        /// Include sanitized HTML and attachments
        #[arg(long)]
        full: bool,
    },
    /// Show a message as JSON
    Show { id: String },
    /// Write the original message bytes to stdout
    Raw { id: String },
    /// Delete a message
    Delete { id: String },
    /// Remove messages older than the retention window
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();
    if let Some(db) = cli.db {
        config.storage.database_url = db;
    }

    let pool = inbox_rs::db::connect(&config.storage).await?;
    let store = MessageStore::open(pool, StoreOptions::from(&config)).await?;

    match cli.command {
        Commands::Ingest {
            mailbox,
            file,
            from,
        } => {
            let raw = std::fs::read(&file)?;
            match store.ingest(&mailbox, &from, &raw).await? {
                Some(id) => println!("✓ Stored {} in {} as {}", file.display(), mailbox, id),
                None => {
                    eprintln!("Error: message was not stored");
                    std::process::exit(1);
                }
            }
        }
        Commands::List {
            mailbox,
            limit,
            full,
        } => {
            let summaries = store.list_by_mailbox(&mailbox, full, limit).await?;

            if summaries.is_empty() {
                println!("No messages in {}.", mailbox);
            } else if full {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                println!("{:<38} {:<26} {:<5} {}", "ID", "Received", "Read", "Subject");
                println!("{:-<90}", "");

                for summary in &summaries {
                    println!(
                        "{:<38} {:<26} {:<5} {}",
                        summary.id,
                        summary.received.format("%Y-%m-%d %H:%M:%S UTC"),
                        if summary.read { "yes" } else { "no" },
                        summary.subject.as_deref().unwrap_or("(no subject)")
                    );
                }

                let total = store.count_by_mailbox(&mailbox).await?;
                println!("\nShowing {} of {} message(s)", summaries.len(), total);
            }
        }
        Commands::Show { id } => match store.get_by_id(&id).await? {
            Some(detail) => {
                println!("{}", serde_json::to_string_pretty(&detail)?);
                // the background flip may not finish before the runtime exits
                store.mark_read(&id).await?;
            }
            None => {
                eprintln!("Error: message {} not found", id);
                std::process::exit(1);
            }
        },
        Commands::Raw { id } => match store.get_raw_by_id(&id).await? {
            Some(raw) => std::io::stdout().write_all(&raw)?,
            None => {
                eprintln!("Error: message {} not found", id);
                std::process::exit(1);
            }
        },
        Commands::Delete { id } => {
            store.delete_by_id(&id).await?;
            println!("✓ Delete of {} accepted", id);
        }
        Commands::Purge => {
            let removed = store.purge_expired().await?;
            println!("✓ Removed {} expired message(s)", removed);
        }
    }

    Ok(())
}
