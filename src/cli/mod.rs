pub mod backup;
pub mod categories;
pub mod categorize;
pub mod erpnext;
pub mod import;
pub mod init;
pub mod parse;
pub mod statements;
pub mod status;
pub mod sync;
pub mod template;
pub mod transactions;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use zeroize::Zeroizing;

use crate::db::{get_connection, init_db};
use crate::error::{BridgeError, Result};
use crate::models::CategoryKind;
use crate::parser::{BankFormat, ParseOptions};
use crate::settings::get_data_dir;

/// Open the database in the configured data directory, creating the schema
/// on first use.
pub(crate) fn open_db() -> Result<Connection> {
    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let conn = get_connection(&data_dir.join(crate::db::DB_FILE))?;
    init_db(&conn)?;
    Ok(conn)
}

pub(crate) fn parse_bank(bank: Option<&str>) -> Result<Option<BankFormat>> {
    bank.map(|b| BankFormat::from_key(b).ok_or_else(|| BridgeError::UnknownFormat(b.to_string())))
        .transpose()
}

pub(crate) fn parse_kind(kind: &str) -> Result<CategoryKind> {
    CategoryKind::from_key(kind).ok_or_else(|| {
        BridgeError::Other(format!("Unknown category type {kind:?} (expected expense, income or transfer)"))
    })
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| BridgeError::Other(format!("Invalid date {raw:?} (expected YYYY-MM-DD)")))
}

pub(crate) fn parse_options(year: Option<i32>) -> ParseOptions {
    match year {
        Some(statement_year) => ParseOptions { statement_year },
        None => ParseOptions::default(),
    }
}

/// Run `attempt` with the given password. If the document turns out to be
/// protected and no password was given, ask for one and try once more.
pub(crate) fn with_password<T>(
    password: Option<String>,
    mut attempt: impl FnMut(Option<&str>) -> Result<T>,
) -> Result<T> {
    let password = password.map(Zeroizing::new);
    match attempt(password.as_deref().map(String::as_str)) {
        Err(BridgeError::PasswordRequired) if password.is_none() => {
            let prompted = Zeroizing::new(rpassword::prompt_password("Statement password: ")?);
            attempt(Some(prompted.as_str()))
        }
        other => other,
    }
}

#[derive(Parser)]
#[command(
    name = "bankbridge",
    version,
    about = "Import bank statements, categorize transactions and post them to ERPNext."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for bankbridge data (default: ~/Documents/bankbridge)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Show configuration and database counts.
    Status,
    /// Copy the database to a backup file.
    Backup {
        /// Destination file (default: <data dir>/backups/bankbridge-<stamp>.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Parse a statement and print its transactions without storing them.
    Parse {
        /// Statement file (pdf, csv, html, txt or eml)
        file: String,
        /// Bank format: tymebank, capitec or generic (default: detect)
        #[arg(long)]
        bank: Option<String>,
        /// Password for a protected PDF
        #[arg(long)]
        password: Option<String>,
        /// Year for statements that print dates without one
        #[arg(long)]
        year: Option<i32>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Import a statement and auto-categorize its transactions.
    Import {
        /// Statement file (pdf, csv, html, txt or eml)
        file: String,
        /// Bank format: tymebank, capitec or generic (default: detect)
        #[arg(long)]
        bank: Option<String>,
        /// Password for a protected PDF
        #[arg(long)]
        password: Option<String>,
        /// Year for statements that print dates without one
        #[arg(long)]
        year: Option<i32>,
        /// Skip categorization after import
        #[arg(long = "no-categorize")]
        no_categorize: bool,
    },
    /// Parse a stored statement again with another bank format.
    Reparse {
        /// Statement ID (see `bankbridge statements`)
        statement_id: i64,
        /// Bank format to parse with
        #[arg(long)]
        bank: String,
        /// Year for statements that print dates without one
        #[arg(long)]
        year: Option<i32>,
    },
    /// List imported statements.
    Statements,
    /// List transactions.
    Transactions {
        /// Only transactions without a category
        #[arg(long)]
        uncategorized: bool,
        /// Only transactions not yet posted to ERPNext
        #[arg(long)]
        unsynced: bool,
        /// Maximum number of rows
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Assign categories to uncategorized transactions by keyword.
    Categorize {
        /// Show what would match without saving
        #[arg(long)]
        preview: bool,
    },
    /// Manually set a transaction's category.
    Assign {
        transaction_id: i64,
        /// Category name or ID
        category: String,
    },
    /// Remove a transaction's category.
    Unassign { transaction_id: i64 },
    /// Configure and test the ERPNext connection.
    Erpnext {
        #[command(subcommand)]
        command: ErpnextCommands,
    },
    /// Post categorized transactions to ERPNext as journal entries.
    Sync {
        /// Sync a single transaction
        #[arg(long)]
        transaction: Option<i64>,
        /// Only transactions in this category
        #[arg(long)]
        category: Option<String>,
        /// Start date (YYYY-MM-DD), requires --to
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD), requires --from
        #[arg(long)]
        to: Option<String>,
    },
    /// Show recent sync attempts.
    SyncLog {
        /// Only failed attempts
        #[arg(long)]
        failed: bool,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Retry a failed sync.
    Retry {
        /// Sync log ID (see `bankbridge sync-log --failed`)
        log_id: i64,
    },
    /// Write a CSV template for manual imports.
    CsvTemplate {
        /// Destination file (default: print to stdout)
        #[arg(long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// Add a category.
    Add {
        name: String,
        /// ERPNext ledger account
        #[arg(long)]
        account: String,
        /// expense, income or transfer
        #[arg(long = "type", default_value = "expense")]
        kind: String,
        /// Comma-separated keywords
        #[arg(long, default_value = "")]
        keywords: String,
        #[arg(long, default_value = "0")]
        priority: i64,
    },
    /// List categories.
    List {
        /// Include inactive categories
        #[arg(long)]
        all: bool,
    },
    /// Update a category.
    Update {
        /// Category name or ID
        category: String,
        #[arg(long)]
        account: Option<String>,
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long)]
        keywords: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
        /// Reactivate a deleted category
        #[arg(long)]
        activate: bool,
    },
    /// Delete a category (deactivated instead when in use).
    Delete {
        /// Category name or ID
        category: String,
    },
    /// Add the default categories.
    Seed {
        /// Reset existing default categories too
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Subcommand)]
pub enum ErpnextCommands {
    /// Save ERPNext connection settings.
    Configure {
        #[arg(long = "url")]
        base_url: String,
        #[arg(long = "api-key")]
        api_key: String,
        /// Prompted for when omitted
        #[arg(long = "api-secret")]
        api_secret: Option<String>,
        #[arg(long)]
        company: String,
        /// Ledger account of the bank
        #[arg(long = "bank-account")]
        bank_account: String,
        #[arg(long = "cost-center")]
        cost_center: Option<String>,
    },
    /// Show the ERPNext settings in effect.
    Show,
    /// Check the credentials against the server.
    Test,
    /// List the company's ledger accounts and cost centers.
    Accounts,
}
