use std::path::PathBuf;

use crate::db::{get_connection, init_db, DB_FILE};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        std::fs::create_dir_all(&dir)?;
        settings.data_dir = shellexpand_path(&dir);
    }
    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    save_settings(&settings)?;

    let db_path = resolved.join(DB_FILE);
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    let categories: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0))?;

    println!("Data directory: {}", resolved.display());
    println!("Database:       {}", db_path.display());
    println!("Categories:     {categories}");
    Ok(())
}
