use chrono::NaiveDate;
use log::{info, warn};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{Direction, ParsedTransaction};
use crate::parser::amount::{normalize_whitespace, parse_date, parse_field};

pub const CSV_HEADERS: [&str; 7] = [
    "Transaction Date",
    "Posting Date",
    "Description",
    "Debits",
    "Credits",
    "Balance",
    "Bank account",
];

pub const CSV_TEMPLATE: &str = "\
Transaction Date,Posting Date,Description,Debits,Credits,Balance,Bank account
2025/09/23,2025/09/23,Uber trip to client,120.50,,4879.50,Business Cheque
2025/09/24,2025/09/24,Customer payment INV-0042,,2500.00,7379.50,Business Cheque
";

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];

/// One data row of a bank CSV export, before it becomes a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTransaction {
    pub transaction_date: NaiveDate,
    pub posting_date: Option<NaiveDate>,
    pub description: String,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub balance: Option<Decimal>,
    pub account_label: String,
}

impl CsvTransaction {
    /// First word of the description (at most 10 chars) plus the date.
    pub fn reference(&self) -> String {
        let word: String = self
            .description
            .split_whitespace()
            .next()
            .unwrap_or("TXN")
            .chars()
            .take(10)
            .collect();
        format!("{word}-{}", self.transaction_date.format("%Y%m%d"))
    }

    /// Debit wins over credit; a row with neither is not a transaction.
    pub fn to_parsed(&self) -> Option<ParsedTransaction> {
        let nonzero = |v: Option<Decimal>| v.filter(|d| !d.is_zero()).map(|d| d.abs());
        let (amount, direction) = match (nonzero(self.debit), nonzero(self.credit)) {
            (Some(debit), _) => (debit, Direction::Debit),
            (None, Some(credit)) => (credit, Direction::Credit),
            (None, None) => return None,
        };
        Some(ParsedTransaction {
            date: self.transaction_date,
            description: self.description.clone(),
            amount,
            direction,
            reference: self.reference(),
            balance: self.balance,
        })
    }
}

/// Column index of each of [`CSV_HEADERS`], matched by name. A file whose
/// header row matches none of them is read in the fixed order.
fn column_map(headers: &::csv::StringRecord) -> [Option<usize>; 7] {
    let mut map = [None; 7];
    for (slot, expected) in CSV_HEADERS.iter().enumerate() {
        map[slot] = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(expected));
    }
    if map.iter().all(Option::is_none) {
        return [Some(0), Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)];
    }
    map
}

pub fn parse_csv_rows(text: &str) -> Result<Vec<CsvTransaction>> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(text.as_bytes());
    let map = column_map(rdr.headers()?);
    let field = |record: &::csv::StringRecord, slot: usize| -> String {
        map[slot]
            .and_then(|idx| record.get(idx))
            .unwrap_or("")
            .trim()
            .to_string()
    };

    let mut rows = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("CSV row {}: {e}", line + 2);
                continue;
            }
        };
        let Some(transaction_date) = parse_date(&field(&record, 0), DATE_FORMATS) else {
            continue;
        };
        let description = normalize_whitespace(&field(&record, 2));
        if description.chars().count() < 2
            || description.contains("Transaction Date")
            || description.contains("Description")
        {
            continue;
        }
        let (debit, credit, balance) = match (
            parse_field(&field(&record, 3)),
            parse_field(&field(&record, 4)),
            parse_field(&field(&record, 5)),
        ) {
            (Ok(debit), Ok(credit), balance) => (debit, credit, balance.ok().flatten()),
            (Err(e), _, _) | (_, Err(e), _) => {
                warn!("CSV row {}: skipping {description:?}: {e}", line + 2);
                continue;
            }
        };
        rows.push(CsvTransaction {
            transaction_date,
            posting_date: parse_date(&field(&record, 1), DATE_FORMATS),
            description,
            debit,
            credit,
            balance,
            account_label: field(&record, 6),
        });
    }
    info!("Parsed {} CSV rows", rows.len());
    Ok(rows)
}

pub fn parse_csv(text: &str) -> Result<Vec<ParsedTransaction>> {
    Ok(parse_csv_rows(text)?
        .iter()
        .filter_map(CsvTransaction::to_parsed)
        .collect())
}
