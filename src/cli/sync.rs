use colored::Colorize;
use comfy_table::{Cell, Table};

use super::erpnext::connect;
use super::{open_db, parse_date};
use crate::error::{BridgeError, Result};
use crate::fmt::truncate;
use crate::models::{SyncRecord, SyncStatus};
use crate::syncer::{self, SyncSummary};

fn report(record: &SyncRecord) {
    match record.status {
        SyncStatus::Success => println!(
            "Transaction {} synced as {}",
            record.transaction_id,
            record.document_name.as_deref().unwrap_or("?").green()
        ),
        _ => println!(
            "Transaction {} failed: {}",
            record.transaction_id,
            record.error.as_deref().unwrap_or("unknown error").red()
        ),
    }
}

fn summarize(summary: &SyncSummary) {
    if summary.total == 0 {
        println!("Nothing to sync. Categorize transactions first.");
        return;
    }
    let failed = if summary.failed > 0 {
        summary.failed.to_string().red().to_string()
    } else {
        summary.failed.to_string()
    };
    println!(
        "{} synced, {failed} failed, {} total",
        summary.succeeded.to_string().green(),
        summary.total
    );
    if summary.failed > 0 {
        println!("See `bankbridge sync-log --failed` and `bankbridge retry <LOG_ID>`.");
    }
}

pub fn run(
    transaction: Option<i64>,
    category: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let conn = open_db()?;
    let (config, client) = connect()?;
    let client = client.as_ref();

    if let Some(id) = transaction {
        report(&syncer::sync_transaction(&conn, client, &config, id)?);
        return Ok(());
    }
    let summary = match (category, from, to) {
        (Some(category), None, None) => syncer::sync_by_category(&conn, client, &config, category)?,
        (None, Some(from), Some(to)) => {
            syncer::sync_by_date_range(&conn, client, &config, parse_date(from)?, parse_date(to)?)?
        }
        (None, None, None) => syncer::sync_ready(&conn, client, &config)?,
        (_, Some(_), None) | (_, None, Some(_)) => {
            return Err(BridgeError::Other("--from and --to must be given together".to_string()))
        }
        (Some(_), _, _) => {
            return Err(BridgeError::Other("Use either --category or --from/--to, not both".to_string()))
        }
    };
    summarize(&summary);
    Ok(())
}

pub fn log(failed: bool, limit: usize) -> Result<()> {
    let conn = open_db()?;
    let records = syncer::list_sync_records(&conn, failed, limit)?;

    let mut table = Table::new();
    table.set_header(vec!["Log", "Txn", "Status", "Document", "Error", "When"]);
    for r in &records {
        let status = match r.status {
            SyncStatus::Success => r.status.as_str().green().to_string(),
            SyncStatus::Failed => r.status.as_str().red().to_string(),
            SyncStatus::Pending => r.status.as_str().yellow().to_string(),
        };
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(r.transaction_id),
            Cell::new(status),
            Cell::new(match &r.document_name {
                Some(name) => format!("{} {name}", r.doctype),
                None => String::new(),
            }),
            Cell::new(truncate(r.error.as_deref().unwrap_or(""), 50)),
            Cell::new(&r.synced_at),
        ]);
    }
    println!("Sync log ({})\n{table}", records.len());
    Ok(())
}

pub fn retry(log_id: i64) -> Result<()> {
    let conn = open_db()?;
    let (config, client) = connect()?;
    report(&syncer::retry_failed(&conn, client.as_ref(), &config, log_id)?);
    Ok(())
}
