use std::path::Path;

use log::{info, warn};
use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::db::{amount_to_sql, date_to_sql};
use crate::error::{BridgeError, Result};
use crate::extract::{self, DocumentKind};
use crate::mailbox;
use crate::models::{ParsedTransaction, StatementState};
use crate::parser::{self, BankFormat, ParseOptions};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn is_duplicate_row(conn: &Connection, row: &ParsedTransaction) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM transactions WHERE date = ?1 AND description = ?2 AND amount = ?3 AND direction = ?4",
    )?;
    Ok(stmt.exists(rusqlite::params![
        date_to_sql(row.date),
        row.description,
        amount_to_sql(row.amount),
        row.direction.as_str(),
    ])?)
}

/// Insert parsed rows for a statement, skipping any already stored.
fn insert_rows(conn: &Connection, statement_id: i64, rows: &[ParsedTransaction]) -> Result<(usize, usize)> {
    let mut imported = 0usize;
    let mut skipped = 0usize;
    for row in rows {
        if is_duplicate_row(conn, row)? {
            skipped += 1;
            continue;
        }
        conn.execute(
            "INSERT INTO transactions (statement_id, date, description, amount, direction, reference, balance) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                statement_id,
                date_to_sql(row.date),
                row.description,
                amount_to_sql(row.amount),
                row.direction.as_str(),
                row.reference,
                row.balance.map(amount_to_sql),
            ],
        )?;
        imported += 1;
    }
    Ok((imported, skipped))
}

/// Explicit choice, then the sender, then the statement text, then the
/// configured default.
pub fn resolve_format(
    explicit: Option<BankFormat>,
    sender: Option<&str>,
    text: &str,
    default: Option<BankFormat>,
) -> BankFormat {
    if let Some(format) = explicit {
        return format;
    }
    if let Some(format) = sender
        .map(BankFormat::detect_sender)
        .filter(|f| *f != BankFormat::Generic)
    {
        return format;
    }
    match BankFormat::detect_text(text) {
        BankFormat::Generic => default.unwrap_or(BankFormat::Generic),
        detected => detected,
    }
}

// ---------------------------------------------------------------------------
// import_document
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct ImportOptions<'a> {
    pub format: Option<BankFormat>,
    pub default_format: Option<BankFormat>,
    pub password: Option<&'a str>,
    pub parse: ParseOptions,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub duplicate_file: bool,
    pub statement_id: Option<i64>,
    pub format: Option<BankFormat>,
}

struct Envelope {
    source: &'static str,
    sender: Option<String>,
    subject: Option<String>,
    received_at: Option<String>,
}

pub fn import_file(conn: &Connection, file_path: &Path, opts: &ImportOptions<'_>) -> Result<ImportResult> {
    let kind = DocumentKind::from_path(file_path).ok_or_else(|| {
        BridgeError::Other(format!(
            "Unsupported file type: {} (expected pdf, csv, html, txt or eml)",
            file_path.display()
        ))
    })?;
    let bytes = std::fs::read(file_path)?;
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("statement");
    import_document(conn, filename, &bytes, kind, opts)
}

/// Store one document and its transactions. Re-importing identical bytes is
/// a no-op reported as `duplicate_file`.
pub fn import_document(
    conn: &Connection,
    filename: &str,
    bytes: &[u8],
    kind: DocumentKind,
    opts: &ImportOptions<'_>,
) -> Result<ImportResult> {
    let checksum = compute_checksum(bytes);
    {
        let mut stmt = conn.prepare("SELECT id FROM statements WHERE checksum = ?1")?;
        let mut rows = stmt.query([&checksum])?;
        if let Some(row) = rows.next()? {
            info!("{filename} was already imported");
            return Ok(ImportResult {
                duplicate_file: true,
                statement_id: Some(row.get(0)?),
                ..ImportResult::default()
            });
        }
    }

    let (text, doc_kind, envelope) = if kind == DocumentKind::Email {
        let message = mailbox::read_message(bytes)?;
        let (body, doc_kind) = message.statement_document()?;
        let text = extract::document_text(body, doc_kind, opts.password)?;
        let envelope = Envelope {
            source: "email",
            sender: Some(message.sender.clone()),
            subject: Some(message.subject.clone()),
            received_at: Some(message.received_at.to_rfc3339()),
        };
        (text, doc_kind, envelope)
    } else {
        let text = extract::document_text(bytes, kind, opts.password)?;
        let envelope = Envelope {
            source: "file",
            sender: None,
            subject: None,
            received_at: None,
        };
        (text, kind, envelope)
    };

    let format = resolve_format(opts.format, envelope.sender.as_deref(), &text, opts.default_format);
    let parsed = parser::parse_source(&text, doc_kind, format, &opts.parse)?;
    if parsed.is_empty() {
        warn!("No transactions found in {filename}");
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO statements (source, filename, sender, subject, received_at, bank_format, document_kind, checksum, source_text, state) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            envelope.source,
            filename,
            envelope.sender,
            envelope.subject,
            envelope.received_at,
            format.key(),
            doc_kind.key(),
            checksum,
            text,
            StatementState::Parsed.as_str(),
        ],
    )?;
    let statement_id = tx.last_insert_rowid();
    let (imported, skipped) = insert_rows(&tx, statement_id, &parsed)?;
    finish_statement(&tx, statement_id, format, parsed.len(), imported, skipped)?;
    tx.commit()?;

    info!("Imported {imported} transactions from {filename} ({skipped} duplicates)");
    Ok(ImportResult {
        imported,
        skipped,
        duplicate_file: false,
        statement_id: Some(statement_id),
        format: Some(format),
    })
}

fn finish_statement(
    conn: &Connection,
    statement_id: i64,
    format: BankFormat,
    parsed: usize,
    imported: usize,
    skipped: usize,
) -> Result<()> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM transactions WHERE statement_id = ?1",
        [statement_id],
        |row| row.get(0),
    )?;
    let (state, log) = if parsed == 0 {
        (StatementState::Error, format!("No transactions found with the {} parser", format.key()))
    } else {
        (
            StatementState::Imported,
            format!(
                "Parsed {parsed} transactions with the {} parser; {imported} imported, {skipped} duplicates skipped",
                format.key()
            ),
        )
    };
    conn.execute(
        "UPDATE statements SET bank_format = ?2, state = ?3, parsing_log = ?4, transaction_count = ?5 WHERE id = ?1",
        rusqlite::params![statement_id, format.key(), state.as_str(), log, count],
    )?;
    Ok(())
}

/// Drop a statement's unsynced transactions and parse its stored text again
/// with `format`. Transactions already posted to ERPNext are kept.
pub fn reparse_statement(
    conn: &Connection,
    statement_id: i64,
    format: BankFormat,
    opts: &ParseOptions,
) -> Result<ImportResult> {
    let (text, kind): (Option<String>, String) = conn
        .query_row(
            "SELECT source_text, document_kind FROM statements WHERE id = ?1",
            [statement_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => BridgeError::UnknownStatement(statement_id),
            other => other.into(),
        })?;
    let text = text.ok_or_else(|| {
        BridgeError::Other(format!("Statement {statement_id} has no stored text to re-parse"))
    })?;
    let kind = DocumentKind::from_key(&kind)
        .ok_or_else(|| BridgeError::Other(format!("Unknown document kind {kind:?}")))?;

    let parsed = parser::parse_source(&text, kind, format, opts)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM sync_logs WHERE transaction_id IN (SELECT id FROM transactions WHERE statement_id = ?1 AND erpnext_synced = 0)",
        [statement_id],
    )?;
    let removed = tx.execute(
        "DELETE FROM transactions WHERE statement_id = ?1 AND erpnext_synced = 0",
        [statement_id],
    )?;
    let (imported, skipped) = insert_rows(&tx, statement_id, &parsed)?;
    finish_statement(&tx, statement_id, format, parsed.len(), imported, skipped)?;
    tx.commit()?;

    info!("Re-parsed statement {statement_id} with {format}: removed {removed}, imported {imported}");
    Ok(ImportResult {
        imported,
        skipped,
        duplicate_file: false,
        statement_id: Some(statement_id),
        format: Some(format),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::models::Direction;
    use std::io::Write;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn opts() -> ImportOptions<'static> {
        ImportOptions {
            parse: ParseOptions { statement_year: 2025 },
            ..ImportOptions::default()
        }
    }

    const TYME: &str = "\
TymeBank statement
04 Sep 2025 EFT for CAPITEC S SEANEGO - - 250.00 250.05
10 Sep 2025 Purchase at Boxer Spr Mabopane
525309988959
- 512.46 - 417.59
";

    fn txn_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_compute_checksum() {
        let sum = compute_checksum(b"hello");
        assert_eq!(sum.len(), 64);
        assert_eq!(sum, compute_checksum(b"hello"));
        assert_ne!(sum, compute_checksum(b"hello!"));
    }

    #[test]
    fn test_import_text_detects_format() {
        let (_dir, conn) = test_db();
        let result = import_document(&conn, "sept.txt", TYME.as_bytes(), DocumentKind::Text, &opts()).unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.format, Some(BankFormat::Tymebank));

        let (amount, direction): (String, String) = conn
            .query_row(
                "SELECT amount, direction FROM transactions WHERE description LIKE 'Purchase%'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(amount, "512.46");
        assert_eq!(direction, Direction::Debit.as_str());

        let (state, count): (String, i64) = conn
            .query_row(
                "SELECT state, transaction_count FROM statements WHERE id = ?1",
                [result.statement_id.unwrap()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(state, "imported");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_duplicate_file_detection() {
        let (_dir, conn) = test_db();
        let first = import_document(&conn, "a.txt", TYME.as_bytes(), DocumentKind::Text, &opts()).unwrap();
        let second = import_document(&conn, "b.txt", TYME.as_bytes(), DocumentKind::Text, &opts()).unwrap();
        assert!(second.duplicate_file);
        assert_eq!(second.imported, 0);
        assert_eq!(second.statement_id, first.statement_id);
        assert_eq!(txn_count(&conn), 2);
    }

    #[test]
    fn test_duplicate_rows_across_documents() {
        let (_dir, conn) = test_db();
        import_document(&conn, "a.txt", TYME.as_bytes(), DocumentKind::Text, &opts()).unwrap();
        let overlapping = format!("{TYME}12 Sep 2025 Monthly account fee 70.00 - - 347.59\n");
        let result =
            import_document(&conn, "b.txt", overlapping.as_bytes(), DocumentKind::Text, &opts()).unwrap();
        assert!(!result.duplicate_file);
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(txn_count(&conn), 3);
    }

    #[test]
    fn test_import_csv_file() {
        let (dir, conn) = test_db();
        let path = dir.path().join("export.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(crate::parser::csv::CSV_TEMPLATE.as_bytes()).unwrap();
        let result = import_file(&conn, &path, &opts()).unwrap();
        assert_eq!(result.imported, 2);
        let kind: String = conn
            .query_row("SELECT document_kind FROM statements", [], |r| r.get(0))
            .unwrap();
        assert_eq!(kind, "csv");
    }

    #[test]
    fn test_unsupported_extension() {
        let (dir, conn) = test_db();
        let path = dir.path().join("book.xlsx");
        std::fs::write(&path, b"x").unwrap();
        assert!(matches!(import_file(&conn, &path, &opts()), Err(BridgeError::Other(_))));
    }

    #[test]
    fn test_empty_statement_marked_error() {
        let (_dir, conn) = test_db();
        let result = import_document(&conn, "empty.txt", b"nothing here", DocumentKind::Text, &opts()).unwrap();
        assert_eq!(result.imported, 0);
        let state: String = conn
            .query_row("SELECT state FROM statements", [], |r| r.get(0))
            .unwrap();
        assert_eq!(state, "error");
    }

    #[test]
    fn test_import_email_uses_sender_and_html_body() {
        let (_dir, conn) = test_db();
        let raw = "From: alerts@capitecbank.co.za\r
Subject: Recent transactions\r
Date: Thu, 02 Oct 2025 08:15:00 +0000\r
Content-Type: text/html; charset=utf-8\r
\r
<table><tr><th>Date</th><th>Description</th><th>Amount</th></tr>\r
<tr><td>01/10/2025</td><td>Card purchase Engen</td><td>-R 350.00</td></tr></table>\r
";
        let result = import_document(&conn, "alert.eml", raw.as_bytes(), DocumentKind::Email, &opts()).unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(result.format, Some(BankFormat::Capitec));
        let (source, sender): (String, String) = conn
            .query_row("SELECT source, sender FROM statements", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(source, "email");
        assert!(sender.contains("capitec"));
    }

    #[test]
    fn test_reparse_keeps_synced_rows() {
        let (_dir, conn) = test_db();
        let text = "\
04 Sep 2025 EFT for CAPITEC S SEANEGO - - 250.00 250.05
12/09/2025 Some Shop -150.00
";
        let tyme = ImportOptions {
            format: Some(BankFormat::Tymebank),
            ..opts()
        };
        let result = import_document(&conn, "mixed.txt", text.as_bytes(), DocumentKind::Text, &tyme).unwrap();
        assert_eq!(result.imported, 1);
        let id = result.statement_id.unwrap();
        conn.execute("UPDATE transactions SET erpnext_synced = 1", []).unwrap();

        let again = reparse_statement(&conn, id, BankFormat::Generic, &ParseOptions { statement_year: 2025 }).unwrap();
        assert_eq!(again.imported, 1);
        assert_eq!(txn_count(&conn), 2);
        let format: String = conn
            .query_row("SELECT bank_format FROM statements WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(format, "generic");
    }

    #[test]
    fn test_reparse_unknown_statement() {
        let (_dir, conn) = test_db();
        assert!(matches!(
            reparse_statement(&conn, 99, BankFormat::Generic, &ParseOptions::default()),
            Err(BridgeError::UnknownStatement(99))
        ));
    }

    #[test]
    fn test_resolve_format_order() {
        assert_eq!(
            resolve_format(Some(BankFormat::Capitec), Some("x@tymebank.co.za"), "", None),
            BankFormat::Capitec
        );
        assert_eq!(
            resolve_format(None, Some("x@tymebank.co.za"), "capitec", None),
            BankFormat::Tymebank
        );
        assert_eq!(resolve_format(None, None, "Capitec Bank", None), BankFormat::Capitec);
        assert_eq!(
            resolve_format(None, None, "plain", Some(BankFormat::Tymebank)),
            BankFormat::Tymebank
        );
        assert_eq!(resolve_format(None, None, "plain", None), BankFormat::Generic);
    }
}
