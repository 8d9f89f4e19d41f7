use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{BridgeError, Result};
use crate::models::{Category, Direction, StoredTransaction};

pub const JOURNAL_ENTRY: &str = "Journal Entry";

/// Connection and posting defaults for one ERPNext site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpNextConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub company: String,
    /// Ledger account of the bank the statements come from.
    #[serde(default)]
    pub bank_account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_center: Option<String>,
}

impl ErpNextConfig {
    /// Overlay `ERPNEXT_BASE_URL`, `ERPNEXT_API_KEY` and `ERPNEXT_API_SECRET`
    /// on the stored section. Errors unless a URL and both credentials end up
    /// set.
    pub fn resolve(stored: Option<&ErpNextConfig>) -> Result<Self> {
        Self::resolve_with(stored, |name| std::env::var(name).ok())
    }

    pub fn resolve_with(
        stored: Option<&ErpNextConfig>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = stored.cloned().unwrap_or(ErpNextConfig {
            base_url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            company: String::new(),
            bank_account: String::new(),
            cost_center: None,
        });
        let non_empty = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty("ERPNEXT_BASE_URL") {
            config.base_url = url;
        }
        if let Some(key) = non_empty("ERPNEXT_API_KEY") {
            config.api_key = key;
        }
        if let Some(secret) = non_empty("ERPNEXT_API_SECRET") {
            config.api_secret = secret;
        }
        config.base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if config.base_url.is_empty() || config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(BridgeError::NotConfigured);
        }
        Ok(config)
    }

    pub fn auth_header(&self) -> String {
        format!("token {}:{}", self.api_key, self.api_secret)
    }

    /// Secret with all but the last four characters hidden.
    pub fn masked_secret(&self) -> String {
        let count = self.api_secret.chars().count();
        let tail: String = self.api_secret.chars().skip(count.saturating_sub(4)).collect();
        format!("{}{tail}", "*".repeat(count.saturating_sub(4)))
    }
}

// ---------------------------------------------------------------------------
// Journal entry document
// ---------------------------------------------------------------------------

fn as_float<S: Serializer>(value: &Decimal, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.to_f64().unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountLine {
    pub account: String,
    #[serde(serialize_with = "as_float")]
    pub debit_in_account_currency: Decimal,
    #[serde(serialize_with = "as_float")]
    pub credit_in_account_currency: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_center: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalEntry {
    pub doctype: &'static str,
    pub company: String,
    pub posting_date: NaiveDate,
    pub accounts: Vec<AccountLine>,
    pub user_remark: String,
    pub cheque_no: String,
    pub cheque_date: NaiveDate,
}

impl JournalEntry {
    /// Money out credits the bank and debits the category account; money in
    /// does the reverse.
    pub fn for_transaction(
        txn: &StoredTransaction,
        category: &Category,
        config: &ErpNextConfig,
    ) -> Self {
        let amount = txn.amount.abs();
        let zero = Decimal::ZERO;
        let (bank_debit, bank_credit) = match txn.direction {
            Direction::Debit => (zero, amount),
            Direction::Credit => (amount, zero),
        };
        JournalEntry {
            doctype: JOURNAL_ENTRY,
            company: config.company.clone(),
            posting_date: txn.date,
            accounts: vec![
                AccountLine {
                    account: config.bank_account.clone(),
                    debit_in_account_currency: bank_debit,
                    credit_in_account_currency: bank_credit,
                    cost_center: None,
                },
                AccountLine {
                    account: category.ledger_account.clone(),
                    debit_in_account_currency: bank_credit,
                    credit_in_account_currency: bank_debit,
                    cost_center: config.cost_center.clone().filter(|c| !c.is_empty()),
                },
            ],
            user_remark: txn.description.clone(),
            cheque_no: txn.reference.clone(),
            cheque_date: txn.date,
        }
    }

    pub fn total_debit(&self) -> Decimal {
        self.accounts.iter().map(|a| a.debit_in_account_currency).sum()
    }

    pub fn total_credit(&self) -> Decimal {
        self.accounts.iter().map(|a| a.credit_in_account_currency).sum()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The ledger a categorized transaction is posted to.
pub trait LedgerClient {
    /// Create a journal entry, returning its document name or an error
    /// message describing why the ledger refused it.
    fn create_journal_entry(&self, entry: &JournalEntry) -> std::result::Result<String, String>;

    /// Who the credentials authenticate as.
    fn test_connection(&self) -> std::result::Result<String, String>;
}

#[derive(Debug, Deserialize)]
pub struct LedgerAccount {
    pub name: String,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub is_group: i64,
}

#[derive(Debug, Deserialize)]
pub struct CostCenter {
    pub name: String,
    #[serde(default)]
    pub cost_center_name: Option<String>,
}

/// The `filters` query value restricting a list request to one company.
#[cfg_attr(not(feature = "erpnext"), allow(dead_code))]
fn company_filter(company: &str) -> String {
    serde_json::json!([["company", "=", company]]).to_string()
}

#[cfg(feature = "erpnext")]
pub use http::ErpNextClient;

#[cfg(feature = "erpnext")]
mod http {
    use std::time::Duration;

    use log::{debug, error, info};
    use reqwest::blocking::{Client, Response};
    use serde::de::DeserializeOwned;
    use serde::Deserialize;

    use super::{CostCenter, ErpNextConfig, JournalEntry, LedgerAccount, LedgerClient, JOURNAL_ENTRY};
    use crate::error::Result;

    #[derive(Deserialize)]
    struct DataEnvelope<T> {
        data: T,
    }

    #[derive(Deserialize)]
    struct CreatedDoc {
        name: String,
    }

    #[derive(Deserialize)]
    struct MethodEnvelope {
        message: Option<String>,
    }

    pub struct ErpNextClient {
        config: ErpNextConfig,
        client: Client,
    }

    impl ErpNextClient {
        pub fn new(config: ErpNextConfig) -> Result<Self> {
            let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
            Ok(Self { config, client })
        }

        fn url(&self, path: &str) -> String {
            format!("{}{path}", self.config.base_url)
        }

        fn get(&self, path: &str) -> reqwest::blocking::RequestBuilder {
            self.client
                .get(self.url(path))
                .header("Authorization", self.config.auth_header())
                .header("Accept", "application/json")
        }

        fn describe_failure(response: Response) -> String {
            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return "Authentication failed. Check API credentials.".to_string();
            }
            let body = response.text().unwrap_or_default();
            format!("HTTP {}: {}", status.as_u16(), body.trim())
        }

        fn describe_error(e: &reqwest::Error) -> String {
            if e.is_timeout() {
                "Connection timeout. Server not responding.".to_string()
            } else if e.is_connect() {
                "Cannot connect to ERPNext server. Check URL.".to_string()
            } else {
                e.to_string()
            }
        }

        fn list<T: DeserializeOwned>(&self, doctype: &str, fields: &str) -> std::result::Result<Vec<T>, String> {
            let filters = super::company_filter(&self.config.company);
            let response = self
                .get(&format!("/api/resource/{doctype}"))
                .query(&[
                    ("fields", fields),
                    ("filters", filters.as_str()),
                    ("limit_page_length", "1000"),
                ])
                .send()
                .map_err(|e| Self::describe_error(&e))?;
            if !response.status().is_success() {
                return Err(Self::describe_failure(response));
            }
            response
                .json::<DataEnvelope<Vec<T>>>()
                .map(|env| env.data)
                .map_err(|e| format!("Unexpected {doctype} response: {e}"))
        }

        pub fn list_accounts(&self) -> std::result::Result<Vec<LedgerAccount>, String> {
            self.list("Account", r#"["name", "account_type", "is_group"]"#)
        }

        pub fn list_cost_centers(&self) -> std::result::Result<Vec<CostCenter>, String> {
            self.list("Cost Center", r#"["name", "cost_center_name"]"#)
        }
    }

    impl LedgerClient for ErpNextClient {
        fn create_journal_entry(&self, entry: &JournalEntry) -> std::result::Result<String, String> {
            debug!("Posting {} for {} to {}", JOURNAL_ENTRY, entry.posting_date, self.config.base_url);
            let response = self
                .client
                .post(self.url(&format!("/api/resource/{JOURNAL_ENTRY}")))
                .header("Authorization", self.config.auth_header())
                .header("Accept", "application/json")
                .json(entry)
                .send()
                .map_err(|e| Self::describe_error(&e))?;
            if !response.status().is_success() {
                let message = Self::describe_failure(response);
                error!("Journal entry rejected: {message}");
                return Err(message);
            }
            let created: DataEnvelope<CreatedDoc> = response
                .json()
                .map_err(|e| format!("Unexpected journal entry response: {e}"))?;
            info!("Created {} {}", JOURNAL_ENTRY, created.data.name);
            Ok(created.data.name)
        }

        fn test_connection(&self) -> std::result::Result<String, String> {
            let response = self
                .get("/api/method/frappe.auth.get_logged_user")
                .timeout(Duration::from_secs(10))
                .send()
                .map_err(|e| Self::describe_error(&e))?;
            if !response.status().is_success() {
                return Err(Self::describe_failure(response));
            }
            let body: MethodEnvelope = response
                .json()
                .map_err(|e| format!("Unexpected response: {e}"))?;
            Ok(body.message.unwrap_or_else(|| "Unknown".to_string()))
        }
    }
}
