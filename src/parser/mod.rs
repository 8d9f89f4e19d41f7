pub mod amount;
pub mod csv;
pub mod generic;
pub mod html;
pub mod layout;

use chrono::Datelike;
use log::{info, warn};

use crate::error::Result;
use crate::extract::{self, DocumentKind};
use crate::mailbox;
use crate::models::ParsedTransaction;
use layout::{Column, DatePattern, FormatSpec};

/// Knobs that the statement text itself cannot supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Year used for `dd Mon` dates.
    pub statement_year: i32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            statement_year: chrono::Local::now().year(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bank format table
// ---------------------------------------------------------------------------

pub const TYMEBANK: FormatSpec = FormatSpec {
    key: "tymebank",
    reference_prefix: "TYME",
    dates: &[DatePattern {
        pattern: r"\d{1,2}\s+(?i:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s+\d{4}",
        format: "%d %b %Y",
        yearless: false,
    }],
    columns: &[Column::Fee, Column::MoneyOut, Column::MoneyIn, Column::Balance],
    optional_columns: 0,
    lookahead: 5,
};

pub const CAPITEC: FormatSpec = FormatSpec {
    key: "capitec",
    reference_prefix: "CAP",
    dates: &[
        DatePattern {
            pattern: r"\d{4}/\d{2}/\d{2}",
            format: "%Y/%m/%d",
            yearless: false,
        },
        DatePattern {
            pattern: r"\d{2}/\d{2}/\d{4}",
            format: "%d/%m/%Y",
            yearless: false,
        },
        DatePattern {
            pattern: r"\d{1,2}\s+(?i:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s+\d{4}",
            format: "%d %b %Y",
            yearless: false,
        },
        DatePattern {
            pattern: r"\d{1,2}\s+(?i:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)",
            format: "",
            yearless: true,
        },
    ],
    columns: &[Column::Signed, Column::Balance],
    optional_columns: 1,
    lookahead: 2,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankFormat {
    Tymebank,
    Capitec,
    Generic,
}

impl BankFormat {
    pub const ALL: &'static [BankFormat] = &[Self::Tymebank, Self::Capitec, Self::Generic];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Tymebank => "tymebank",
            Self::Capitec => "capitec",
            Self::Generic => "generic",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tymebank => "TymeBank",
            Self::Capitec => "Capitec Bank",
            Self::Generic => "Generic statement",
        }
    }

    /// `other` is accepted as an alias for the generic parser.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "tymebank" | "tyme" => Some(Self::Tymebank),
            "capitec" => Some(Self::Capitec),
            "generic" | "other" => Some(Self::Generic),
            _ => None,
        }
    }

    /// Layout table entry; `None` for the generic parser.
    pub fn spec(&self) -> Option<&'static FormatSpec> {
        match self {
            Self::Tymebank => Some(&TYMEBANK),
            Self::Capitec => Some(&CAPITEC),
            Self::Generic => None,
        }
    }

    /// Guess the bank from the address a statement e-mail came from.
    pub fn detect_sender(sender: &str) -> Self {
        let sender = sender.to_lowercase();
        if sender.contains("tymebank") {
            Self::Tymebank
        } else if sender.contains("capitec") {
            Self::Capitec
        } else {
            Self::Generic
        }
    }

    /// Guess the bank from the statement text.
    pub fn detect_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("tymebank") || lower.contains("tyme bank") {
            Self::Tymebank
        } else if lower.contains("capitec") {
            Self::Capitec
        } else {
            Self::Generic
        }
    }
}

impl std::fmt::Display for BankFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Extract transactions from statement text. Pure: no I/O, and the same
/// input always gives the same output.
pub fn parse_text(text: &str, format: BankFormat, opts: &ParseOptions) -> Vec<ParsedTransaction> {
    if let Some(spec) = format.spec() {
        let found = layout::scan(text, spec, opts);
        if !found.is_empty() {
            info!("Parsed {} {} transactions", found.len(), format.name());
            return found;
        }
        warn!("No {} transactions found, trying generic patterns", format.name());
    }
    let found = generic::parse(text);
    if found.is_empty() {
        warn!("No transactions found in statement text");
    }
    found
}

/// Parse already-decoded source text of the given document kind.
pub fn parse_source(
    text: &str,
    kind: DocumentKind,
    format: BankFormat,
    opts: &ParseOptions,
) -> Result<Vec<ParsedTransaction>> {
    match kind {
        DocumentKind::Csv => csv::parse_csv(text),
        DocumentKind::Html => Ok(html::parse_html(text)),
        DocumentKind::Pdf | DocumentKind::Text => Ok(parse_text(text, format, opts)),
        DocumentKind::Email => {
            let (text, kind) = email_source(text.as_bytes(), None)?;
            parse_source(&text, kind, format, opts)
        }
    }
}

/// Decode `bytes` and extract their transactions. Fails only when the
/// document itself cannot be read.
pub fn parse(
    bytes: &[u8],
    kind: DocumentKind,
    format: BankFormat,
    password: Option<&str>,
    opts: &ParseOptions,
) -> Result<Vec<ParsedTransaction>> {
    let (text, kind) = match kind {
        DocumentKind::Email => email_source(bytes, password)?,
        _ => (extract::document_text(bytes, kind, password)?, kind),
    };
    parse_source(&text, kind, format, opts)
}

/// Text of the statement carried by a saved e-mail, and what kind it is.
pub fn email_source(bytes: &[u8], password: Option<&str>) -> Result<(String, DocumentKind)> {
    let message = mailbox::read_message(bytes)?;
    let (body, kind) = message.statement_document()?;
    Ok((extract::document_text(body, kind, password)?, kind))
}
