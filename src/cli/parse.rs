use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use super::{parse_bank, parse_options, with_password};
use crate::error::{BridgeError, Result};
use crate::extract::{self, DocumentKind};
use crate::fmt::{money, truncate};
use crate::importer::resolve_format;
use crate::mailbox;
use crate::models::ParsedTransaction;
use crate::parser::{self, BankFormat, ParseOptions};
use crate::settings::load_settings;

pub(crate) fn configured_default() -> Option<BankFormat> {
    let settings = load_settings();
    let key = settings.default_bank?;
    let format = BankFormat::from_key(&key);
    if format.is_none() {
        log::warn!("Ignoring unknown default_bank {key:?} in settings");
    }
    format
}

/// Text, kind and sender of the statement inside `bytes`.
fn statement_text(
    bytes: &[u8],
    kind: DocumentKind,
    password: Option<&str>,
) -> Result<(String, DocumentKind, Option<String>)> {
    if kind == DocumentKind::Email {
        let message = mailbox::read_message(bytes)?;
        let (body, body_kind) = message.statement_document()?;
        let text = extract::document_text(body, body_kind, password)?;
        Ok((text, body_kind, Some(message.sender)))
    } else {
        Ok((extract::document_text(bytes, kind, password)?, kind, None))
    }
}

fn preview(
    bytes: &[u8],
    kind: DocumentKind,
    bank: Option<BankFormat>,
    password: Option<String>,
    opts: &ParseOptions,
) -> Result<(BankFormat, Vec<ParsedTransaction>)> {
    if let Some(format) = bank {
        let txns = with_password(password, |pw| parser::parse(bytes, kind, format, pw, opts))?;
        return Ok((format, txns));
    }
    let (text, doc_kind, sender) = with_password(password, |pw| statement_text(bytes, kind, pw))?;
    let format = resolve_format(None, sender.as_deref(), &text, configured_default());
    Ok((format, parser::parse_source(&text, doc_kind, format, opts)?))
}

pub fn run(
    file: &str,
    bank: Option<&str>,
    password: Option<String>,
    year: Option<i32>,
    json: bool,
) -> Result<()> {
    let path = PathBuf::from(file);
    let kind = DocumentKind::from_path(&path)
        .ok_or_else(|| BridgeError::Other(format!("Unsupported file type: {file}")))?;
    let bytes = std::fs::read(&path)?;
    let (format, txns) = preview(&bytes, kind, parse_bank(bank)?, password, &parse_options(year))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&txns)?);
        return Ok(());
    }

    let symbol = load_settings().currency_symbol;
    let mut table = Table::new();
    table.set_header(vec!["Date", "Description", "Debit", "Credit", "Reference"]);
    for t in &txns {
        let debit = t.debit().map(|a| money(a, &symbol).red().to_string());
        let credit = t.credit().map(|a| money(a, &symbol).green().to_string());
        table.add_row(vec![
            Cell::new(t.date),
            Cell::new(truncate(&t.description, 50)),
            Cell::new(debit.unwrap_or_default()),
            Cell::new(credit.unwrap_or_default()),
            Cell::new(&t.reference),
        ]);
    }
    println!("{} ({} transactions)\n{table}", format.name(), txns.len());
    Ok(())
}
