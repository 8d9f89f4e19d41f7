use colored::Colorize;
use comfy_table::{Cell, Table};

use super::open_db;
use crate::categorizer::{categorize_transactions, clear_category, preview, set_category};
use crate::error::Result;
use crate::fmt::{money, truncate};
use crate::settings::load_settings;

pub fn run(dry_run: bool) -> Result<()> {
    let conn = open_db()?;
    if !dry_run {
        let result = categorize_transactions(&conn)?;
        println!(
            "{} categorized, {} still uncategorized",
            result.categorized, result.unmatched
        );
        return Ok(());
    }

    let symbol = load_settings().currency_symbol;
    let rows = preview(&conn)?;
    let matched = rows.iter().filter(|r| r.matched.is_some()).count();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Description", "Amount", "Category", "Keyword"]);
    for row in &rows {
        let t = &row.transaction;
        let (category, keyword) = match &row.matched {
            Some((name, keyword)) => (name.green().to_string(), keyword.clone()),
            None => ("no match".dimmed().to_string(), String::new()),
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(truncate(&t.description, 45)),
            Cell::new(money(t.signed_amount(), &symbol)),
            Cell::new(category),
            Cell::new(keyword),
        ]);
    }
    println!("Preview: {matched} of {} would be categorized\n{table}", rows.len());
    Ok(())
}

pub fn assign(transaction_id: i64, category: &str) -> Result<()> {
    let conn = open_db()?;
    let category = set_category(&conn, transaction_id, category)?;
    println!("Transaction {transaction_id} \u{2192} {}", category.name);
    Ok(())
}

pub fn unassign(transaction_id: i64) -> Result<()> {
    let conn = open_db()?;
    clear_category(&conn, transaction_id)?;
    println!("Transaction {transaction_id} is now uncategorized");
    Ok(())
}
