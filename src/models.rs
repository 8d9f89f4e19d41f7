use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transaction recovered from a statement. `amount` is always positive;
/// the sign lives in `direction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
}

impl ParsedTransaction {
    /// Positive for money in, negative for money out.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }

    pub fn debit(&self) -> Option<Decimal> {
        (self.direction == Direction::Debit).then_some(self.amount)
    }

    pub fn credit(&self) -> Option<Decimal> {
        (self.direction == Direction::Credit).then_some(self.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Expense,
    Income,
    Transfer,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Transfer => "transfer",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "expense" => Some(Self::Expense),
            "income" => Some(Self::Income),
            "transfer" => Some(Self::Transfer),
            _ => None,
        }
    }

    pub fn accepts(&self, direction: Direction) -> bool {
        match self {
            Self::Expense => direction == Direction::Debit,
            Self::Income => direction == Direction::Credit,
            Self::Transfer => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub keywords: Vec<String>,
    pub ledger_account: String,
    pub kind: CategoryKind,
    pub priority: i64,
    pub is_active: bool,
}

impl Category {
    /// Split a comma-separated keyword list into trimmed, lower-cased,
    /// de-duplicated entries.
    pub fn parse_keywords(raw: &str) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        for keyword in raw.split(',').map(|k| k.trim().to_lowercase()) {
            if !keyword.is_empty() && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        keywords
    }
}

/// A persisted transaction row.
#[derive(Debug, Clone)]
pub struct StoredTransaction {
    pub id: i64,
    pub statement_id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub reference: String,
    pub category_id: Option<i64>,
    pub erpnext_synced: bool,
    pub erpnext_journal_entry: Option<String>,
    pub erpnext_sync_date: Option<String>,
    pub erpnext_error: Option<String>,
}

impl StoredTransaction {
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Parsed,
    Imported,
    Error,
}

impl StatementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Imported => "imported",
            Self::Error => "error",
        }
    }
}

/// One imported document.
#[derive(Debug, Clone)]
pub struct Statement {
    pub id: i64,
    /// `file` or `email`.
    pub source: String,
    pub filename: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub received_at: Option<String>,
    pub bank_format: String,
    pub document_kind: String,
    pub state: String,
    pub parsing_log: Option<String>,
    pub transaction_count: i64,
    pub imported_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncRecord {
    pub id: i64,
    pub transaction_id: i64,
    pub doctype: String,
    pub document_name: Option<String>,
    pub status: SyncStatus,
    pub error: Option<String>,
    pub synced_at: String,
}
