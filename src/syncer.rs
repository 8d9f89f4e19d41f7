use chrono::NaiveDate;
use log::{error, info, warn};
use rusqlite::{Connection, Row};

use crate::db::{self, TransactionFilter};
use crate::erpnext::{ErpNextConfig, JournalEntry, LedgerClient, JOURNAL_ENTRY};
use crate::error::{BridgeError, Result};
use crate::models::{StoredTransaction, SyncRecord, SyncStatus};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

impl SyncSummary {
    fn record(&mut self, outcome: &SyncRecord) {
        self.total += 1;
        match outcome.status {
            SyncStatus::Success => self.succeeded += 1,
            _ => self.failed += 1,
        }
    }
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn open_log(conn: &Connection, transaction_id: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO sync_logs (transaction_id, doctype, status, synced_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![transaction_id, JOURNAL_ENTRY, SyncStatus::Pending.as_str(), now()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn close_log(
    conn: &Connection,
    log_id: i64,
    txn: &StoredTransaction,
    outcome: &std::result::Result<String, String>,
) -> Result<()> {
    let stamp = now();
    match outcome {
        Ok(name) => {
            conn.execute(
                "UPDATE sync_logs SET status = ?1, document_name = ?2, synced_at = ?3 WHERE id = ?4",
                rusqlite::params![SyncStatus::Success.as_str(), name, stamp, log_id],
            )?;
            conn.execute(
                "UPDATE transactions SET erpnext_synced = 1, erpnext_journal_entry = ?1, erpnext_sync_date = ?2, erpnext_error = NULL WHERE id = ?3",
                rusqlite::params![name, stamp, txn.id],
            )?;
        }
        Err(message) => {
            conn.execute(
                "UPDATE sync_logs SET status = ?1, error_message = ?2, synced_at = ?3 WHERE id = ?4",
                rusqlite::params![SyncStatus::Failed.as_str(), message, stamp, log_id],
            )?;
            conn.execute(
                "UPDATE transactions SET erpnext_error = ?1 WHERE id = ?2",
                rusqlite::params![message, txn.id],
            )?;
        }
    }
    Ok(())
}

/// Post one transaction as a journal entry. Exactly one call is made to the
/// ledger; its outcome is recorded on a fresh sync log and returned.
/// Transactions without a category are refused up front.
pub fn sync_transaction(
    conn: &Connection,
    client: &dyn LedgerClient,
    config: &ErpNextConfig,
    transaction_id: i64,
) -> Result<SyncRecord> {
    let txn = db::get_transaction(conn, transaction_id)?;
    let category_id = txn.category_id.ok_or(BridgeError::NotCategorized(txn.id))?;
    let category = db::find_category(conn, &category_id.to_string())?;
    if txn.erpnext_synced {
        warn!(
            "Transaction {} was already synced as {}",
            txn.id,
            txn.erpnext_journal_entry.as_deref().unwrap_or("?")
        );
    }

    let entry = JournalEntry::for_transaction(&txn, &category, config);
    let log_id = open_log(conn, txn.id)?;
    let outcome = client.create_journal_entry(&entry);
    close_log(conn, log_id, &txn, &outcome)?;
    match &outcome {
        Ok(name) => info!("Transaction {} synced as {name}", txn.id),
        Err(message) => error!("Transaction {} failed to sync: {message}", txn.id),
    }
    get_sync_record(conn, log_id)
}

fn sync_many(
    conn: &Connection,
    client: &dyn LedgerClient,
    config: &ErpNextConfig,
    filter: TransactionFilter,
) -> Result<SyncSummary> {
    let pending: Vec<StoredTransaction> = db::list_transactions(conn, &filter)?
        .into_iter()
        .filter(|t| t.category_id.is_some())
        .collect();
    let mut summary = SyncSummary::default();
    for txn in pending {
        let record = sync_transaction(conn, client, config, txn.id)?;
        summary.record(&record);
    }
    info!(
        "Sync finished: {} succeeded, {} failed of {}",
        summary.succeeded, summary.failed, summary.total
    );
    Ok(summary)
}

/// Sync every categorized transaction not yet in the ledger.
pub fn sync_ready(conn: &Connection, client: &dyn LedgerClient, config: &ErpNextConfig) -> Result<SyncSummary> {
    sync_many(
        conn,
        client,
        config,
        TransactionFilter { unsynced: true, ..Default::default() },
    )
}

pub fn sync_by_category(
    conn: &Connection,
    client: &dyn LedgerClient,
    config: &ErpNextConfig,
    category: &str,
) -> Result<SyncSummary> {
    let category = db::find_category(conn, category)?;
    sync_many(
        conn,
        client,
        config,
        TransactionFilter { unsynced: true, category_id: Some(category.id), ..Default::default() },
    )
}

/// Inclusive on both ends.
pub fn sync_by_date_range(
    conn: &Connection,
    client: &dyn LedgerClient,
    config: &ErpNextConfig,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<SyncSummary> {
    if from > to {
        return Err(BridgeError::Other(format!("Start date {from} is after end date {to}")));
    }
    sync_many(
        conn,
        client,
        config,
        TransactionFilter { unsynced: true, from: Some(from), to: Some(to), ..Default::default() },
    )
}

/// Re-attempt the transaction behind a failed sync log. The old log is left
/// as it was and a new one records the retry.
pub fn retry_failed(
    conn: &Connection,
    client: &dyn LedgerClient,
    config: &ErpNextConfig,
    log_id: i64,
) -> Result<SyncRecord> {
    let record = get_sync_record(conn, log_id)?;
    if record.status != SyncStatus::Failed {
        return Err(BridgeError::Other(format!(
            "Sync log {log_id} is {}, only failed syncs can be retried",
            record.status.as_str()
        )));
    }
    sync_transaction(conn, client, config, record.transaction_id)
}

// ---------------------------------------------------------------------------
// Sync log queries
// ---------------------------------------------------------------------------

const SYNC_COLUMNS: &str = "id, transaction_id, doctype, document_name, status, error_message, synced_at";

fn sync_record_from_row(row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
    let status: String = row.get(4)?;
    Ok(SyncRecord {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        doctype: row.get(2)?,
        document_name: row.get(3)?,
        status: SyncStatus::from_key(&status).unwrap_or(SyncStatus::Failed),
        error: row.get(5)?,
        synced_at: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
    })
}

pub fn get_sync_record(conn: &Connection, log_id: i64) -> Result<SyncRecord> {
    conn.query_row(
        &format!("SELECT {SYNC_COLUMNS} FROM sync_logs WHERE id = ?1"),
        [log_id],
        sync_record_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => BridgeError::Other(format!("No sync log with ID {log_id}")),
        other => other.into(),
    })
}

pub fn list_sync_records(conn: &Connection, failed_only: bool, limit: usize) -> Result<Vec<SyncRecord>> {
    let mut sql = format!("SELECT {SYNC_COLUMNS} FROM sync_logs");
    if failed_only {
        sql.push_str(" WHERE status = 'failed'");
    }
    sql.push_str(" ORDER BY id DESC LIMIT ?1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([limit as i64], sync_record_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer;
    use crate::db::{get_connection, init_db};
    use std::cell::{Cell, RefCell};

    struct FakeLedger {
        fail_with: RefCell<Option<String>>,
        calls: Cell<usize>,
        last_remark: RefCell<Option<String>>,
    }

    impl FakeLedger {
        fn ok() -> Self {
            Self { fail_with: RefCell::new(None), calls: Cell::new(0), last_remark: RefCell::new(None) }
        }

        fn failing(message: &str) -> Self {
            let fake = Self::ok();
            *fake.fail_with.borrow_mut() = Some(message.to_string());
            fake
        }
    }

    impl LedgerClient for FakeLedger {
        fn create_journal_entry(&self, entry: &JournalEntry) -> std::result::Result<String, String> {
            self.calls.set(self.calls.get() + 1);
            *self.last_remark.borrow_mut() = Some(entry.user_remark.clone());
            assert_eq!(entry.total_debit(), entry.total_credit());
            match self.fail_with.borrow().as_ref() {
                Some(message) => Err(message.clone()),
                None => Ok(format!("ACC-JV-2025-{:05}", self.calls.get())),
            }
        }

        fn test_connection(&self) -> std::result::Result<String, String> {
            Ok("Administrator".to_string())
        }
    }

    fn config() -> ErpNextConfig {
        ErpNextConfig {
            base_url: "https://erp.example.com".to_string(),
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            company: "Acme".to_string(),
            bank_account: "Bank - A".to_string(),
            cost_center: None,
        }
    }

    fn setup() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO statements (filename, bank_format, document_kind, checksum) VALUES ('s.txt', 'generic', 'text', 'abc')",
            [],
        )
        .unwrap();
        let rows = [
            ("2025-09-01", "UBER TRIP", "120.50", "debit"),
            ("2025-09-02", "Mystery payee", "80.00", "debit"),
            ("2025-09-15", "Engen garage", "600.00", "debit"),
        ];
        for (date, desc, amount, direction) in rows {
            conn.execute(
                "INSERT INTO transactions (statement_id, date, description, amount, direction, reference) VALUES (1, ?1, ?2, ?3, ?4, 'GEN')",
                rusqlite::params![date, desc, amount, direction],
            )
            .unwrap();
        }
        categorizer::categorize_transactions(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_sync_success_updates_transaction() {
        let (_dir, conn) = setup();
        let ledger = FakeLedger::ok();
        let record = sync_transaction(&conn, &ledger, &config(), 1).unwrap();
        assert_eq!(record.status, SyncStatus::Success);
        assert_eq!(record.document_name.as_deref(), Some("ACC-JV-2025-00001"));
        assert_eq!(ledger.last_remark.borrow().as_deref(), Some("UBER TRIP"));

        let txn = db::get_transaction(&conn, 1).unwrap();
        assert!(txn.erpnext_synced);
        assert_eq!(txn.erpnext_journal_entry.as_deref(), Some("ACC-JV-2025-00001"));
        assert!(txn.erpnext_sync_date.is_some());
        assert!(txn.erpnext_error.is_none());
    }

    #[test]
    fn test_sync_failure_records_error() {
        let (_dir, conn) = setup();
        let ledger = FakeLedger::failing("HTTP 417: Account frozen");
        let record = sync_transaction(&conn, &ledger, &config(), 1).unwrap();
        assert_eq!(record.status, SyncStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("HTTP 417: Account frozen"));

        let txn = db::get_transaction(&conn, 1).unwrap();
        assert!(!txn.erpnext_synced);
        assert_eq!(txn.erpnext_error.as_deref(), Some("HTTP 417: Account frozen"));
    }

    #[test]
    fn test_uncategorized_refused_without_call() {
        let (_dir, conn) = setup();
        let ledger = FakeLedger::ok();
        let err = sync_transaction(&conn, &ledger, &config(), 2).unwrap_err();
        assert!(matches!(err, BridgeError::NotCategorized(2)));
        assert_eq!(ledger.calls.get(), 0);
        assert!(list_sync_records(&conn, false, 10).unwrap().is_empty());
    }

    #[test]
    fn test_sync_ready_skips_uncategorized_and_synced() {
        let (_dir, conn) = setup();
        let ledger = FakeLedger::ok();
        let summary = sync_ready(&conn, &ledger, &config()).unwrap();
        assert_eq!(summary, SyncSummary { succeeded: 2, failed: 0, total: 2 });

        let again = sync_ready(&conn, &ledger, &config()).unwrap();
        assert_eq!(again.total, 0);
        assert_eq!(ledger.calls.get(), 2);
    }

    #[test]
    fn test_sync_by_date_range_and_category() {
        let (_dir, conn) = setup();
        let ledger = FakeLedger::ok();
        let from = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        let summary = sync_by_date_range(&conn, &ledger, &config(), from, to).unwrap();
        assert_eq!(summary.total, 1);
        assert!(db::get_transaction(&conn, 3).unwrap().erpnext_synced);
        assert!(!db::get_transaction(&conn, 1).unwrap().erpnext_synced);

        let summary = sync_by_category(&conn, &ledger, &config(), "Transport & Fuel").unwrap();
        assert_eq!(summary.total, 1);
        assert!(db::get_transaction(&conn, 1).unwrap().erpnext_synced);

        assert!(sync_by_date_range(&conn, &ledger, &config(), to, from).is_err());
    }

    #[test]
    fn test_retry_failed_creates_new_log() {
        let (_dir, conn) = setup();
        let failed = sync_transaction(&conn, &FakeLedger::failing("timeout"), &config(), 1).unwrap();

        let retried = retry_failed(&conn, &FakeLedger::ok(), &config(), failed.id).unwrap();
        assert_ne!(retried.id, failed.id);
        assert_eq!(retried.status, SyncStatus::Success);
        assert_eq!(get_sync_record(&conn, failed.id).unwrap().status, SyncStatus::Failed);
        assert!(db::get_transaction(&conn, 1).unwrap().erpnext_error.is_none());

        assert!(retry_failed(&conn, &FakeLedger::ok(), &config(), retried.id).is_err());
        assert_eq!(list_sync_records(&conn, true, 10).unwrap().len(), 1);
        assert_eq!(list_sync_records(&conn, false, 10).unwrap().len(), 2);
    }
}
