use zeroize::Zeroizing;

use crate::erpnext::{ErpNextConfig, LedgerClient};
use crate::error::{BridgeError, Result};
use crate::settings::{load_settings, save_settings};

/// Settings in effect, with environment overrides applied.
pub(crate) fn active_config() -> Result<ErpNextConfig> {
    ErpNextConfig::resolve(load_settings().erpnext.as_ref())
}

#[cfg(feature = "erpnext")]
pub(crate) fn connect() -> Result<(ErpNextConfig, Box<dyn LedgerClient>)> {
    let config = active_config()?;
    let client = crate::erpnext::ErpNextClient::new(config.clone())?;
    Ok((config, Box::new(client)))
}

#[cfg(not(feature = "erpnext"))]
pub(crate) fn connect() -> Result<(ErpNextConfig, Box<dyn LedgerClient>)> {
    Err(BridgeError::Other(
        "bankbridge was built without ERPNext support".to_string(),
    ))
}

pub fn configure(
    base_url: &str,
    api_key: &str,
    api_secret: Option<String>,
    company: &str,
    bank_account: &str,
    cost_center: Option<String>,
) -> Result<()> {
    let secret = match api_secret {
        Some(secret) => Zeroizing::new(secret),
        None => Zeroizing::new(rpassword::prompt_password("API secret: ")?),
    };
    if secret.trim().is_empty() {
        return Err(BridgeError::Other("API secret must not be empty".to_string()));
    }

    let config = ErpNextConfig {
        base_url: base_url.trim().trim_end_matches('/').to_string(),
        api_key: api_key.trim().to_string(),
        api_secret: secret.trim().to_string(),
        company: company.trim().to_string(),
        bank_account: bank_account.trim().to_string(),
        cost_center: cost_center.filter(|c| !c.trim().is_empty()),
    };
    let mut settings = load_settings();
    if settings.company_name.is_empty() {
        settings.company_name = config.company.clone();
    }
    settings.erpnext = Some(config);
    save_settings(&settings)?;
    println!("ERPNext settings saved. Run `bankbridge erpnext test` to check them.");
    Ok(())
}

pub fn show() -> Result<()> {
    let config = active_config()?;
    println!("URL:           {}", config.base_url);
    println!("API key:       {}", config.api_key);
    println!("API secret:    {}", config.masked_secret());
    println!("Company:       {}", config.company);
    println!("Bank account:  {}", config.bank_account);
    println!("Cost center:   {}", config.cost_center.as_deref().unwrap_or("(none)"));
    Ok(())
}

pub fn test() -> Result<()> {
    let (config, client) = connect()?;
    match client.test_connection() {
        Ok(user) => {
            println!("Connected to {} as: {user}", config.base_url);
            Ok(())
        }
        Err(message) => Err(BridgeError::Other(format!("Connection failed: {message}"))),
    }
}

#[cfg(feature = "erpnext")]
pub fn accounts() -> Result<()> {
    use comfy_table::{Cell, Table};

    let config = active_config()?;
    let client = crate::erpnext::ErpNextClient::new(config.clone())?;
    let accounts = client.list_accounts().map_err(BridgeError::Other)?;
    let cost_centers = client.list_cost_centers().map_err(BridgeError::Other)?;

    let mut table = Table::new();
    table.set_header(vec!["Account", "Type"]);
    for account in accounts.iter().filter(|a| a.is_group == 0) {
        table.add_row(vec![
            Cell::new(&account.name),
            Cell::new(account.account_type.as_deref().unwrap_or("")),
        ]);
    }
    println!("Accounts for {}\n{table}", config.company);

    let mut table = Table::new();
    table.set_header(vec!["Cost Center", "Name"]);
    for cc in &cost_centers {
        table.add_row(vec![
            Cell::new(&cc.name),
            Cell::new(cc.cost_center_name.as_deref().unwrap_or("")),
        ]);
    }
    println!("Cost centers\n{table}");
    Ok(())
}

#[cfg(not(feature = "erpnext"))]
pub fn accounts() -> Result<()> {
    connect().map(|_| ())
}
