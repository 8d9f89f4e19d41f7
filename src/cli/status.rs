use crate::db::{get_connection, DB_FILE};
use crate::erpnext::ErpNextConfig;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{load_settings, settings_file_exists, settings_path};

fn count(conn: &rusqlite::Connection, sql: &str) -> Result<i64> {
    Ok(conn.query_row(sql, [], |r| r.get(0))?)
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join(DB_FILE);

    println!(
        "Company:    {}",
        if settings.company_name.is_empty() { "(not set)" } else { &settings.company_name }
    );
    let settings_note = if settings_file_exists() { "" } else { " (defaults)" };
    println!("Settings:   {}{settings_note}", settings_path().display());
    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());
    match ErpNextConfig::resolve(settings.erpnext.as_ref()) {
        Ok(erp) => println!("ERPNext:    {} ({})", erp.base_url, erp.company),
        Err(_) => println!("ERPNext:    (not configured)"),
    }

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;
        let statements = count(&conn, "SELECT count(*) FROM statements")?;
        let transactions = count(&conn, "SELECT count(*) FROM transactions")?;
        let uncategorized = count(&conn, "SELECT count(*) FROM transactions WHERE category_id IS NULL")?;
        let synced = count(&conn, "SELECT count(*) FROM transactions WHERE erpnext_synced = 1")?;
        let failed = count(
            &conn,
            "SELECT count(*) FROM transactions WHERE erpnext_synced = 0 AND erpnext_error IS NOT NULL",
        )?;
        let categories = count(&conn, "SELECT count(*) FROM categories WHERE active = 1")?;

        println!();
        println!("Statements:     {statements}");
        println!("Transactions:   {transactions}");
        println!("Uncategorized:  {uncategorized}");
        println!("Synced:         {synced}");
        println!("Sync errors:    {failed}");
        println!("Categories:     {categories}");
    } else {
        println!();
        println!("Database not found. Run `bankbridge init` to set up.");
    }

    Ok(())
}
