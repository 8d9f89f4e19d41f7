use colored::Colorize;
use comfy_table::{Cell, Table};

use super::open_db;
use crate::db::list_statements;
use crate::error::Result;
use crate::fmt::truncate;
use crate::models::StatementState;

pub fn list() -> Result<()> {
    let conn = open_db()?;
    let statements = list_statements(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "File", "Source", "Kind", "Bank", "State", "Txns", "Received", "Log"]);
    for s in statements {
        let state = if s.state == StatementState::Error.as_str() {
            s.state.red().to_string()
        } else {
            s.state.clone()
        };
        let source = match &s.sender {
            Some(sender) => format!("{} ({})", s.source, truncate(sender, 24)),
            None => s.source.clone(),
        };
        let title = s.subject.as_deref().unwrap_or(&s.filename);
        table.add_row(vec![
            Cell::new(s.id),
            Cell::new(truncate(title, 30)),
            Cell::new(source),
            Cell::new(&s.document_kind),
            Cell::new(&s.bank_format),
            Cell::new(state),
            Cell::new(s.transaction_count),
            Cell::new(s.received_at.as_deref().unwrap_or(&s.imported_at)),
            Cell::new(truncate(s.parsing_log.as_deref().unwrap_or(""), 40)),
        ]);
    }
    println!("Statements\n{table}");
    Ok(())
}
