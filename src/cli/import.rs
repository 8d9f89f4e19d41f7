use std::path::PathBuf;

use super::parse::configured_default;
use super::{open_db, parse_bank, parse_options, with_password};
use crate::categorizer::categorize_transactions;
use crate::db::get_statement;
use crate::error::Result;
use crate::importer::{import_file, reparse_statement, ImportOptions};
use crate::parser::BankFormat;

pub fn run(
    file: &str,
    bank: Option<&str>,
    password: Option<String>,
    year: Option<i32>,
    no_categorize: bool,
) -> Result<()> {
    let file_path = PathBuf::from(file);
    let conn = open_db()?;
    let format = parse_bank(bank)?;
    let default_format = configured_default();
    let parse = parse_options(year);

    let result = with_password(password, |pw| {
        let opts = ImportOptions {
            format,
            default_format,
            password: pw,
            parse,
        };
        import_file(&conn, &file_path, &opts)
    })?;

    if result.duplicate_file {
        println!("This file has already been imported (duplicate checksum).");
        return Ok(());
    }

    let parser_name = result.format.map(|f| f.name()).unwrap_or("unknown");
    println!(
        "Statement {}: {} imported, {} skipped (duplicates) using {parser_name}",
        result.statement_id.unwrap_or_default(),
        result.imported,
        result.skipped
    );
    if result.imported == 0 && result.skipped == 0 {
        println!("No transactions found. Try `bankbridge reparse` with another --bank.");
    }

    if !no_categorize {
        let cat = categorize_transactions(&conn)?;
        println!("{} categorized, {} still uncategorized", cat.categorized, cat.unmatched);
    }
    Ok(())
}

pub fn reparse(statement_id: i64, bank: &str, year: Option<i32>) -> Result<()> {
    let conn = open_db()?;
    let format = parse_bank(Some(bank))?.unwrap_or(BankFormat::Generic);
    let statement = get_statement(&conn, statement_id)?;
    if statement.bank_format == format.key() {
        log::info!("{} was already parsed with {format}", statement.filename);
    }
    let result = reparse_statement(&conn, statement_id, format, &parse_options(year))?;
    println!(
        "Statement {statement_id} ({}) re-parsed with {}: {} imported, {} skipped",
        statement.filename,
        format.name(),
        result.imported,
        result.skipped
    );
    Ok(())
}
