use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{Connection, Row};
use rust_decimal::Decimal;

use crate::error::{BridgeError, Result};
use crate::models::{Category, CategoryKind, Direction, Statement, StoredTransaction};

pub const DB_FILE: &str = "bankbridge.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS statements (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL DEFAULT 'file',
    filename TEXT NOT NULL,
    sender TEXT,
    subject TEXT,
    received_at TEXT,
    bank_format TEXT NOT NULL,
    document_kind TEXT NOT NULL,
    checksum TEXT NOT NULL UNIQUE,
    source_text TEXT,
    state TEXT NOT NULL DEFAULT 'parsed',
    parsing_log TEXT,
    transaction_count INTEGER DEFAULT 0,
    imported_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    erpnext_account TEXT NOT NULL,
    transaction_type TEXT NOT NULL DEFAULT 'expense',
    keywords TEXT NOT NULL DEFAULT '',
    priority INTEGER DEFAULT 0,
    active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    statement_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount TEXT NOT NULL,
    direction TEXT NOT NULL,
    reference TEXT,
    balance TEXT,
    category_id INTEGER,
    erpnext_synced INTEGER DEFAULT 0,
    erpnext_journal_entry TEXT,
    erpnext_sync_date TEXT,
    erpnext_error TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (statement_id) REFERENCES statements(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_dedupe
    ON transactions (date, description, amount, direction);

CREATE TABLE IF NOT EXISTS sync_logs (
    id INTEGER PRIMARY KEY,
    transaction_id INTEGER NOT NULL,
    doctype TEXT NOT NULL DEFAULT 'Journal Entry',
    document_name TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    synced_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (transaction_id) REFERENCES transactions(id)
);
";

// (name, erpnext_account, transaction_type, keywords)
pub const DEFAULT_CATEGORIES: &[(&str, &str, &str, &str)] = &[
    ("Transport & Fuel", "Transport Expenses - Company", "expense",
     "uber, bolt, taxi, transport, fuel, petrol, diesel, garage, shell, engen, bp, total, sasol"),
    ("Food & Beverages", "Food & Beverage Expenses - Company", "expense",
     "restaurant, coffee, lunch, dinner, food, cafe, starbucks, mugg & bean, nandos, kfc, mcdonalds, steers, pizza, spur, ocean basket, woolworths food"),
    ("Office Supplies", "Office Supplies - Company", "expense",
     "stationery, office, supplies, printer, paper, ink, makro, waltons, office national, croxley"),
    ("Utilities", "Utilities - Company", "expense",
     "electricity, water, internet, telkom, eskom, municipality, city of"),
    ("Telecommunications", "Telecommunications - Company", "expense",
     "airtime, data, cell phone, mobile, vodacom, mtn, cell c, phone contract"),
    ("Software & Subscriptions", "Software Expenses - Company", "expense",
     "software, subscription, saas, microsoft, office 365, adobe, dropbox, google workspace, hosting, domain"),
    ("Bank Charges & Fees", "Bank Charges - Company", "expense",
     "bank fee, bank charge, service fee, monthly fee, transaction fee, atm fee, account fee"),
    ("Professional Fees", "Professional Fees - Company", "expense",
     "lawyer, attorney, accountant, consultant, professional services, legal fees, audit"),
    ("Marketing & Advertising", "Marketing Expenses - Company", "expense",
     "marketing, advertising, facebook ads, google ads, social media, promotion, campaign"),
    ("Insurance", "Insurance - Company", "expense",
     "insurance, premium, cover, policy, old mutual, discovery, sanlam, momentum"),
    ("Rent & Lease", "Rent - Company", "expense",
     "rent, lease, rental, office space, property"),
    ("Repairs & Maintenance", "Repairs & Maintenance - Company", "expense",
     "repair, maintenance, fix, plumber, electrician, handyman"),
    ("Salaries & Wages", "Salaries - Company", "expense",
     "salary, wage, payroll, staff, employee"),
    ("Customer Payments", "Sales - Company", "income",
     "payment received, deposit, income, customer payment, invoice payment, receipt"),
    ("Interest Income", "Interest Income - Company", "income",
     "interest earned, interest credit, bank interest"),
    ("Bank Transfers", "Bank Account - Company", "transfer",
     "transfer, own account, internal transfer, move funds, between accounts"),
    ("Entertainment", "Entertainment - Company", "expense",
     "entertainment, cinema, movies, theatre, event, tickets, ster kinekor, nu metro"),
    ("Training & Development", "Training Expenses - Company", "expense",
     "training, course, education, learning, workshop, seminar, udemy, coursera"),
    ("Shipping & Courier", "Shipping Expenses - Company", "expense",
     "courier, shipping, delivery, postnet, aramex, dhl, fedex, post office"),
    ("Miscellaneous", "Miscellaneous Expenses - Company", "expense",
     "miscellaneous, sundry"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        seed_categories(conn, false)?;
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Insert the default categories. Existing names are skipped unless
/// `overwrite` is set, in which case their account, type and keywords are
/// reset.
pub fn seed_categories(conn: &Connection, overwrite: bool) -> Result<SeedResult> {
    let mut result = SeedResult::default();
    for (name, account, kind, keywords) in DEFAULT_CATEGORIES {
        let exists: bool = conn
            .prepare_cached("SELECT 1 FROM categories WHERE name = ?1")?
            .exists([name])?;
        if !exists {
            conn.execute(
                "INSERT INTO categories (name, erpnext_account, transaction_type, keywords) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![name, account, kind, keywords],
            )?;
            result.added += 1;
        } else if overwrite {
            conn.execute(
                "UPDATE categories SET erpnext_account = ?2, transaction_type = ?3, keywords = ?4, active = 1 WHERE name = ?1",
                rusqlite::params![name, account, kind, keywords],
            )?;
            result.updated += 1;
        } else {
            result.skipped += 1;
        }
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Column encoding
// ---------------------------------------------------------------------------

/// Amounts are stored as fixed two-decimal text so equal values compare
/// equal in SQL.
pub fn amount_to_sql(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

pub fn date_to_sql(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(BridgeError::Other(msg)),
    )
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

pub const TRANSACTION_COLUMNS: &str = "id, statement_id, date, description, amount, direction, reference, category_id, erpnext_synced, erpnext_journal_entry, erpnext_sync_date, erpnext_error";

pub fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<StoredTransaction> {
    let date: String = row.get(2)?;
    let amount: String = row.get(4)?;
    let direction: String = row.get(5)?;
    Ok(StoredTransaction {
        id: row.get(0)?,
        statement_id: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| conversion_error(2, format!("bad date {date:?}: {e}")))?,
        description: row.get(3)?,
        amount: Decimal::from_str(&amount)
            .map_err(|e| conversion_error(4, format!("bad amount {amount:?}: {e}")))?,
        direction: Direction::from_key(&direction)
            .ok_or_else(|| conversion_error(5, format!("bad direction {direction:?}")))?,
        reference: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        category_id: row.get(7)?,
        erpnext_synced: row.get::<_, i64>(8)? != 0,
        erpnext_journal_entry: row.get(9)?,
        erpnext_sync_date: row.get(10)?,
        erpnext_error: row.get(11)?,
    })
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<StoredTransaction> {
    conn.query_row(
        &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
        [id],
        transaction_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => BridgeError::UnknownTransaction(id),
        other => other.into(),
    })
}

#[derive(Debug, Default, Clone)]
pub struct TransactionFilter {
    pub uncategorized: bool,
    pub unsynced: bool,
    pub category_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<usize>,
}

pub fn list_transactions(conn: &Connection, filter: &TransactionFilter) -> Result<Vec<StoredTransaction>> {
    let mut sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1 = 1");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if filter.uncategorized {
        sql.push_str(" AND category_id IS NULL");
    }
    if filter.unsynced {
        sql.push_str(" AND erpnext_synced = 0");
    }
    if let Some(category_id) = filter.category_id {
        params.push(Box::new(category_id));
        sql.push_str(&format!(" AND category_id = ?{}", params.len()));
    }
    if let Some(from) = filter.from {
        params.push(Box::new(date_to_sql(from)));
        sql.push_str(&format!(" AND date >= ?{}", params.len()));
    }
    if let Some(to) = filter.to {
        params.push(Box::new(date_to_sql(to)));
        sql.push_str(&format!(" AND date <= ?{}", params.len()));
    }
    sql.push_str(" ORDER BY date, id");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), transaction_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let kind: String = row.get(4)?;
    let keywords: String = row.get(3)?;
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        ledger_account: row.get(2)?,
        keywords: Category::parse_keywords(&keywords),
        kind: CategoryKind::from_key(&kind)
            .ok_or_else(|| conversion_error(4, format!("bad category type {kind:?}")))?,
        priority: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
    })
}

pub const CATEGORY_COLUMNS: &str =
    "id, name, erpnext_account, keywords, transaction_type, priority, active";

pub fn list_categories(conn: &Connection, active_only: bool) -> Result<Vec<Category>> {
    let sql = if active_only {
        format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE active = 1 ORDER BY name")
    } else {
        format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], category_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Look a category up by exact name (case-insensitive) or numeric id.
pub fn find_category(conn: &Connection, name_or_id: &str) -> Result<Category> {
    let by_id = name_or_id.parse::<i64>().ok();
    conn.query_row(
        &format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE name = ?1 COLLATE NOCASE OR id = ?2"
        ),
        rusqlite::params![name_or_id, by_id],
        category_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => BridgeError::UnknownCategory(name_or_id.to_string()),
        other => other.into(),
    })
}

pub fn statement_from_row(row: &Row<'_>) -> rusqlite::Result<Statement> {
    Ok(Statement {
        id: row.get(0)?,
        source: row.get(1)?,
        filename: row.get(2)?,
        sender: row.get(3)?,
        subject: row.get(4)?,
        received_at: row.get(5)?,
        bank_format: row.get(6)?,
        document_kind: row.get(7)?,
        state: row.get(8)?,
        parsing_log: row.get(9)?,
        transaction_count: row.get(10)?,
        imported_at: row.get(11)?,
    })
}

pub const STATEMENT_COLUMNS: &str = "id, source, filename, sender, subject, received_at, bank_format, document_kind, state, parsing_log, transaction_count, imported_at";

pub fn list_statements(conn: &Connection) -> Result<Vec<Statement>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STATEMENT_COLUMNS} FROM statements ORDER BY imported_at DESC, id DESC"
    ))?;
    let rows = stmt
        .query_map([], statement_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_statement(conn: &Connection, id: i64) -> Result<Statement> {
    conn.query_row(
        &format!("SELECT {STATEMENT_COLUMNS} FROM statements WHERE id = ?1"),
        [id],
        statement_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => BridgeError::UnknownStatement(id),
        other => other.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &["statements", "categories", "transactions", "sync_logs"] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
        let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0)).unwrap();
        assert_eq!(count as usize, DEFAULT_CATEGORIES.len());
    }

    #[test]
    fn test_seed_categories_skips_and_overwrites() {
        let (_dir, conn) = test_db();
        conn.execute(
            "UPDATE categories SET keywords = 'changed' WHERE name = 'Insurance'",
            [],
        )
        .unwrap();
        let skipped = seed_categories(&conn, false).unwrap();
        assert_eq!(skipped.added, 0);
        assert_eq!(skipped.skipped, DEFAULT_CATEGORIES.len());

        let updated = seed_categories(&conn, true).unwrap();
        assert_eq!(updated.updated, DEFAULT_CATEGORIES.len());
        let keywords: String = conn
            .query_row("SELECT keywords FROM categories WHERE name = 'Insurance'", [], |r| r.get(0))
            .unwrap();
        assert!(keywords.contains("premium"));
    }

    #[test]
    fn test_seeded_kinds() {
        let (_dir, conn) = test_db();
        let categories = list_categories(&conn, true).unwrap();
        let income = categories.iter().filter(|c| c.kind == CategoryKind::Income).count();
        let transfer = categories.iter().filter(|c| c.kind == CategoryKind::Transfer).count();
        assert_eq!(income, 2);
        assert_eq!(transfer, 1);
    }

    #[test]
    fn test_find_category_by_name_or_id() {
        let (_dir, conn) = test_db();
        let cat = find_category(&conn, "insurance").unwrap();
        assert_eq!(cat.name, "Insurance");
        assert_eq!(cat.ledger_account, "Insurance - Company");
        let same = find_category(&conn, &cat.id.to_string()).unwrap();
        assert_eq!(same.id, cat.id);
        assert!(matches!(
            find_category(&conn, "Nope"),
            Err(BridgeError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_amount_encoding() {
        assert_eq!(amount_to_sql(dec!(250)), "250.00");
        assert_eq!(amount_to_sql(dec!(1234.5)), "1234.50");
    }

    #[test]
    fn test_unknown_transaction() {
        let (_dir, conn) = test_db();
        assert!(matches!(
            get_transaction(&conn, 42),
            Err(BridgeError::UnknownTransaction(42))
        ));
        assert!(matches!(get_statement(&conn, 7), Err(BridgeError::UnknownStatement(7))));
    }
}
