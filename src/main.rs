// Money Ledger - Command line
// Scan receipts, import statements and print reports against a local ledger.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use money_ledger::{
    db, ingest_receipt, ingest_statement, open_database, summarize_for_user, AppConfig, DateRange,
    PdfTextExtractor, TesseractOcr, UserId,
};

#[derive(Parser)]
#[command(name = "money-ledger", version, about = "Personal finance ledger")]
struct Cli {
    /// TOML config file (defaults and MONEY_LEDGER__* env vars apply otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR a receipt image and print merchant, total and date
    ScanReceipt {
        image: PathBuf,
    },

    /// Import a PDF bank statement, skipping lines already in the ledger
    ImportStatement {
        #[arg(long)]
        user: UserId,
        document: PathBuf,
    },

    /// Expense/income report, optionally limited to an inclusive date range
    Summary {
        #[arg(long)]
        user: UserId,
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },

    /// List the user's categories
    Categories {
        #[arg(long)]
        user: UserId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::ScanReceipt { image } => {
            let bytes = std::fs::read(&image).with_context(|| format!("Failed to read {:?}", image))?;
            let source = TesseractOcr::from_config(&config.ingest);
            let extraction = ingest_receipt(&source, bytes).await?;
            print_json(&extraction)
        }

        Command::ImportStatement { user, document } => {
            let bytes =
                std::fs::read(&document).with_context(|| format!("Failed to read {:?}", document))?;
            let ledger = Mutex::new(open_database(&config.database.path)?);
            let source = PdfTextExtractor::from_config(&config.ingest);
            let summary = ingest_statement(&source, bytes, &ledger, user).await?;
            print_json(&summary)
        }

        Command::Summary { user, from, to } => {
            let conn = open_database(&config.database.path)?;
            let summary = summarize_for_user(&conn, user, DateRange::from_bounds(from, to))?;
            print_json(&summary)
        }

        Command::Categories { user } => {
            let conn = open_database(&config.database.path)?;
            print_json(&db::list_categories(&conn, user)?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
