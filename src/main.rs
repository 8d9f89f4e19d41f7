mod categorizer;
mod cli;
mod db;
mod erpnext;
mod error;
mod extract;
mod fmt;
mod importer;
mod mailbox;
mod models;
mod parser;
mod settings;
mod syncer;

use clap::Parser;

use cli::{CategoriesCommands, Cli, Commands, ErpnextCommands};

fn init_logging() {
    let level = settings::load_settings().log_level;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        None | Some(Commands::Status) => cli::status::run(),
        Some(Commands::Init { data_dir }) => cli::init::run(data_dir),
        Some(Commands::Backup { output }) => cli::backup::run(output),
        Some(Commands::Parse {
            file,
            bank,
            password,
            year,
            json,
        }) => cli::parse::run(&file, bank.as_deref(), password, year, json),
        Some(Commands::Import {
            file,
            bank,
            password,
            year,
            no_categorize,
        }) => cli::import::run(&file, bank.as_deref(), password, year, no_categorize),
        Some(Commands::Reparse {
            statement_id,
            bank,
            year,
        }) => cli::import::reparse(statement_id, &bank, year),
        Some(Commands::Statements) => cli::statements::list(),
        Some(Commands::Transactions {
            uncategorized,
            unsynced,
            limit,
        }) => cli::transactions::list(uncategorized, unsynced, limit),
        Some(Commands::Categories { command }) => match command {
            CategoriesCommands::Add {
                name,
                account,
                kind,
                keywords,
                priority,
            } => cli::categories::add(&name, &account, &kind, &keywords, priority),
            CategoriesCommands::List { all } => cli::categories::list(all),
            CategoriesCommands::Update {
                category,
                account,
                kind,
                keywords,
                priority,
                activate,
            } => cli::categories::update(
                &category,
                account.as_deref(),
                kind.as_deref(),
                keywords.as_deref(),
                priority,
                activate,
            ),
            CategoriesCommands::Delete { category } => cli::categories::delete(&category),
            CategoriesCommands::Seed { overwrite } => cli::categories::seed(overwrite),
        },
        Some(Commands::Categorize { preview }) => cli::categorize::run(preview),
        Some(Commands::Assign {
            transaction_id,
            category,
        }) => cli::categorize::assign(transaction_id, &category),
        Some(Commands::Unassign { transaction_id }) => cli::categorize::unassign(transaction_id),
        Some(Commands::Erpnext { command }) => match command {
            ErpnextCommands::Configure {
                base_url,
                api_key,
                api_secret,
                company,
                bank_account,
                cost_center,
            } => cli::erpnext::configure(&base_url, &api_key, api_secret, &company, &bank_account, cost_center),
            ErpnextCommands::Show => cli::erpnext::show(),
            ErpnextCommands::Test => cli::erpnext::test(),
            ErpnextCommands::Accounts => cli::erpnext::accounts(),
        },
        Some(Commands::Sync {
            transaction,
            category,
            from,
            to,
        }) => cli::sync::run(transaction, category.as_deref(), from.as_deref(), to.as_deref()),
        Some(Commands::SyncLog { failed, limit }) => cli::sync::log(failed, limit),
        Some(Commands::Retry { log_id }) => cli::sync::retry(log_id),
        Some(Commands::CsvTemplate { output }) => cli::template::run(output),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
