use comfy_table::{Cell, Table};

use super::{open_db, parse_kind};
use crate::categorizer::{add_category, delete_category, update_category, CategoryUpdate, NewCategory};
use crate::db::{list_categories, seed_categories};
use crate::error::Result;
use crate::fmt::truncate;

pub fn add(name: &str, account: &str, kind: &str, keywords: &str, priority: i64) -> Result<()> {
    let conn = open_db()?;
    let new = NewCategory {
        name,
        ledger_account: account,
        kind: parse_kind(kind)?,
        keywords,
        priority,
    };
    let id = add_category(&conn, &new)?;
    println!("Added category {id}: {name} \u{2192} {account}");
    Ok(())
}

pub fn list(all: bool) -> Result<()> {
    let conn = open_db()?;
    let categories = list_categories(&conn, !all)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "ERPNext Account", "Priority", "Keywords", "Active"]);
    for cat in categories {
        table.add_row(vec![
            Cell::new(cat.id),
            Cell::new(&cat.name),
            Cell::new(cat.kind.as_str()),
            Cell::new(&cat.ledger_account),
            Cell::new(cat.priority),
            Cell::new(truncate(&cat.keywords.join(", "), 50)),
            Cell::new(if cat.is_active { "yes" } else { "no" }),
        ]);
    }
    println!("Categories\n{table}");
    Ok(())
}

pub fn update(
    category: &str,
    account: Option<&str>,
    kind: Option<&str>,
    keywords: Option<&str>,
    priority: Option<i64>,
    activate: bool,
) -> Result<()> {
    let conn = open_db()?;
    let update = CategoryUpdate {
        ledger_account: account,
        kind: kind.map(parse_kind).transpose()?,
        keywords,
        priority,
        active: activate.then_some(true),
    };
    let updated = update_category(&conn, category, &update)?;
    println!("Updated category {}: {}", updated.id, updated.name);
    Ok(())
}

pub fn delete(category: &str) -> Result<()> {
    let conn = open_db()?;
    if delete_category(&conn, category)? {
        println!("Deleted category {category}");
    } else {
        println!("Category {category} is in use; deactivated instead");
    }
    Ok(())
}

pub fn seed(overwrite: bool) -> Result<()> {
    let conn = open_db()?;
    let result = seed_categories(&conn, overwrite)?;
    println!(
        "{} added, {} updated, {} already present",
        result.added, result.updated, result.skipped
    );
    Ok(())
}
