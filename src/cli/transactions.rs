use std::collections::HashMap;

use colored::Colorize;
use comfy_table::{Cell, Table};

use super::open_db;
use crate::db::{list_categories, list_transactions, TransactionFilter};
use crate::error::Result;
use crate::fmt::{money, truncate};
use crate::models::Direction;
use crate::settings::load_settings;

pub fn list(uncategorized: bool, unsynced: bool, limit: usize) -> Result<()> {
    let conn = open_db()?;
    let symbol = load_settings().currency_symbol;
    let names: HashMap<i64, String> = list_categories(&conn, false)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let filter = TransactionFilter {
        uncategorized,
        unsynced,
        limit: Some(limit),
        ..TransactionFilter::default()
    };
    let txns = list_transactions(&conn, &filter)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Amount", "Category", "ERPNext"]);
    for t in &txns {
        let amount = money(t.signed_amount(), &symbol);
        let amount = match t.direction {
            Direction::Credit => amount.green().to_string(),
            Direction::Debit => amount.red().to_string(),
        };
        let category = t
            .category_id
            .and_then(|id| names.get(&id).cloned())
            .unwrap_or_else(|| "-".dimmed().to_string());
        let erpnext = match (&t.erpnext_journal_entry, &t.erpnext_error) {
            (Some(entry), _) if t.erpnext_synced => entry.green().to_string(),
            (_, Some(err)) => truncate(err, 30).red().to_string(),
            _ => String::new(),
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.date),
            Cell::new(truncate(&t.description, 45)),
            Cell::new(amount),
            Cell::new(category),
            Cell::new(erpnext),
        ]);
    }
    println!("Transactions ({})\n{table}", txns.len());
    Ok(())
}
