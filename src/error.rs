use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "erpnext")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Document is password protected but no password was provided")]
    PasswordRequired,

    #[error("Incorrect document password")]
    WrongPassword,

    #[error("Could not extract text: {0}")]
    Extraction(String),

    #[error("Could not read e-mail message: {0}")]
    Mail(String),

    #[error("Unknown bank format: {0}")]
    UnknownFormat(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("No transaction with ID {0}")]
    UnknownTransaction(i64),

    #[error("No statement with ID {0}")]
    UnknownStatement(i64),

    #[error("Transaction {0} must be categorized before syncing")]
    NotCategorized(i64),

    #[error("ERPNext is not configured. Run `bankbridge erpnext configure` first.")]
    NotConfigured,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
