use std::cmp::Reverse;

use log::{debug, info};
use rusqlite::Connection;

use crate::db::{self, TransactionFilter};
use crate::error::{BridgeError, Result};
use crate::models::{Category, CategoryKind, Direction, StoredTransaction};

/// A category hit and the keyword that produced it.
#[derive(Debug, Clone, Copy)]
pub struct Match<'c> {
    pub category: &'c Category,
    pub keyword: &'c str,
}

/// Pick the category for a description. Only active categories whose kind
/// accepts `direction` are considered; among hits the highest priority wins,
/// then the longest matching keyword, then the category name.
pub fn find_match<'c>(
    description: &str,
    direction: Direction,
    categories: &'c [Category],
) -> Option<Match<'c>> {
    let haystack = description.to_lowercase();
    categories
        .iter()
        .filter(|c| c.is_active && c.kind.accepts(direction))
        .filter_map(|category| {
            category
                .keywords
                .iter()
                .filter(|k| haystack.contains(k.as_str()))
                .max_by_key(|k| k.chars().count())
                .map(|keyword| Match {
                    category,
                    keyword: keyword.as_str(),
                })
        })
        .min_by_key(|m| {
            (
                Reverse(m.category.priority),
                Reverse(m.keyword.chars().count()),
                m.category.name.as_str(),
            )
        })
}

pub struct CategorizeResult {
    pub categorized: usize,
    pub unmatched: usize,
}

/// Categorize every transaction that has no category and has not been synced.
pub fn categorize_transactions(conn: &Connection) -> Result<CategorizeResult> {
    let categories = db::list_categories(conn, true)?;
    let pending = pending_transactions(conn)?;

    let mut categorized = 0usize;
    let mut unmatched = 0usize;
    for txn in &pending {
        match find_match(&txn.description, txn.direction, &categories) {
            Some(m) => {
                conn.execute(
                    "UPDATE transactions SET category_id = ?1 WHERE id = ?2",
                    rusqlite::params![m.category.id, txn.id],
                )?;
                debug!("Transaction {} -> {} via {:?}", txn.id, m.category.name, m.keyword);
                categorized += 1;
            }
            None => unmatched += 1,
        }
    }
    info!("Categorized {categorized} transactions, {unmatched} without a match");
    Ok(CategorizeResult {
        categorized,
        unmatched,
    })
}

pub struct PreviewRow {
    pub transaction: StoredTransaction,
    /// `(category name, keyword)` when a category would be assigned.
    pub matched: Option<(String, String)>,
}

/// What [`categorize_transactions`] would do, without writing anything.
pub fn preview(conn: &Connection) -> Result<Vec<PreviewRow>> {
    let categories = db::list_categories(conn, true)?;
    Ok(pending_transactions(conn)?
        .into_iter()
        .map(|transaction| {
            let matched = find_match(&transaction.description, transaction.direction, &categories)
                .map(|m| (m.category.name.clone(), m.keyword.to_string()));
            PreviewRow {
                transaction,
                matched,
            }
        })
        .collect())
}

fn pending_transactions(conn: &Connection) -> Result<Vec<StoredTransaction>> {
    db::list_transactions(
        conn,
        &TransactionFilter {
            uncategorized: true,
            unsynced: true,
            ..TransactionFilter::default()
        },
    )
}

// ---------------------------------------------------------------------------
// Manual assignment
// ---------------------------------------------------------------------------

pub fn set_category(conn: &Connection, txn_id: i64, category: &str) -> Result<Category> {
    let category = db::find_category(conn, category)?;
    let updated = conn.execute(
        "UPDATE transactions SET category_id = ?1 WHERE id = ?2",
        rusqlite::params![category.id, txn_id],
    )?;
    if updated == 0 {
        return Err(BridgeError::UnknownTransaction(txn_id));
    }
    Ok(category)
}

pub fn clear_category(conn: &Connection, txn_id: i64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE transactions SET category_id = NULL WHERE id = ?1",
        [txn_id],
    )?;
    if updated == 0 {
        return Err(BridgeError::UnknownTransaction(txn_id));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Category maintenance
// ---------------------------------------------------------------------------

pub struct NewCategory<'a> {
    pub name: &'a str,
    pub ledger_account: &'a str,
    pub kind: CategoryKind,
    pub keywords: &'a str,
    pub priority: i64,
}

pub fn add_category(conn: &Connection, new: &NewCategory<'_>) -> Result<i64> {
    let name = new.name.trim();
    if name.is_empty() || new.ledger_account.trim().is_empty() {
        return Err(BridgeError::Other(
            "Category name and ERPNext account are required".to_string(),
        ));
    }
    conn.execute(
        "INSERT INTO categories (name, erpnext_account, transaction_type, keywords, priority) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            name,
            new.ledger_account.trim(),
            new.kind.as_str(),
            Category::parse_keywords(new.keywords).join(", "),
            new.priority,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            BridgeError::Other(format!("Category {name:?} already exists"))
        }
        other => other.into(),
    })?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Default)]
pub struct CategoryUpdate<'a> {
    pub ledger_account: Option<&'a str>,
    pub kind: Option<CategoryKind>,
    pub keywords: Option<&'a str>,
    pub priority: Option<i64>,
    pub active: Option<bool>,
}

pub fn update_category(conn: &Connection, category: &str, update: &CategoryUpdate<'_>) -> Result<Category> {
    let existing = db::find_category(conn, category)?;
    conn.execute(
        "UPDATE categories SET erpnext_account = ?2, transaction_type = ?3, keywords = ?4, priority = ?5, active = ?6 WHERE id = ?1",
        rusqlite::params![
            existing.id,
            update
                .ledger_account
                .unwrap_or(existing.ledger_account.as_str()),
            update.kind.unwrap_or(existing.kind).as_str(),
            update
                .keywords
                .map(|k| Category::parse_keywords(k).join(", "))
                .unwrap_or_else(|| existing.keywords.join(", ")),
            update.priority.unwrap_or(existing.priority),
            update.active.unwrap_or(existing.is_active),
        ],
    )?;
    db::find_category(conn, &existing.id.to_string())
}

/// Categories referenced by transactions are deactivated, never removed.
pub fn delete_category(conn: &Connection, category: &str) -> Result<bool> {
    let existing = db::find_category(conn, category)?;
    let in_use: bool = conn
        .prepare("SELECT 1 FROM transactions WHERE category_id = ?1")?
        .exists([existing.id])?;
    if in_use {
        conn.execute("UPDATE categories SET active = 0 WHERE id = ?1", [existing.id])?;
        Ok(false)
    } else {
        conn.execute("DELETE FROM categories WHERE id = ?1", [existing.id])?;
        Ok(true)
    }
}
