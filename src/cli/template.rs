use crate::error::Result;
use crate::parser::csv::CSV_TEMPLATE;

pub fn run(output: Option<String>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, CSV_TEMPLATE)?;
            println!("CSV template written to {path}");
        }
        None => print!("{CSV_TEMPLATE}"),
    }
    Ok(())
}
