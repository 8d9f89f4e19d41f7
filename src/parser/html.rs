use log::{debug, info, warn};
use scraper::{Html, Selector};

use crate::models::{Direction, ParsedTransaction};
use crate::parser::amount::{normalize_whitespace, parse_amount, parse_date};

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d %b %Y"];

/// Pull `date | description | amount` rows out of every table in an HTML
/// notification e-mail. The first row of each table is treated as a header.
pub fn parse_html(html: &str) -> Vec<ParsedTransaction> {
    let (Ok(table_sel), Ok(row_sel), Ok(cell_sel)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("td"),
    ) else {
        warn!("Could not build HTML selectors");
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut transactions = Vec::new();

    for table in document.select(&table_sel) {
        for row in table.select(&row_sel).skip(1) {
            let cells: Vec<String> = row
                .select(&cell_sel)
                .map(|cell| normalize_whitespace(&cell.text().collect::<String>()))
                .collect();
            if cells.len() < 3 {
                continue;
            }
            let Some(date) = parse_date(&cells[0], DATE_FORMATS) else {
                debug!("Skipping HTML row with date {:?}", cells[0]);
                continue;
            };
            let description = cells[1].clone();
            let amount_text: String = cells[2]
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            let amount = match parse_amount(&amount_text) {
                Ok(amount) if !amount.is_zero() => amount,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Skipping HTML row {description:?}: {e}");
                    continue;
                }
            };
            let direction = if amount.is_sign_negative() {
                Direction::Debit
            } else {
                Direction::Credit
            };
            let reference = format!("HTML-{}-{}", date.format("%Y%m%d"), transactions.len());
            transactions.push(ParsedTransaction {
                date,
                description,
                amount: amount.abs(),
                direction,
                reference,
                balance: None,
            });
        }
    }

    info!("Extracted {} transactions from HTML e-mail", transactions.len());
    transactions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const EMAIL: &str = r#"
<html><body>
<p>Your recent transactions</p>
<table>
  <tr><th>Date</th><th>Description</th><th>Amount</th></tr>
  <tr><td>12/01/2024</td><td>Engen  Garage</td><td>-R 450.00</td></tr>
  <tr><td>2024-01-13</td><td>Customer payment</td><td>R1,200.00</td></tr>
  <tr><td>not a date</td><td>Junk</td><td>1.00</td></tr>
  <tr><td>14 Jan 2024</td><td>Too short</td></tr>
</table>
</body></html>"#;

    #[test]
    fn test_parse_html_rows() {
        let txns = parse_html(EMAIL);
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].date, NaiveDate::from_ymd_opt(2024, 1, 12).unwrap());
        assert_eq!(txns[0].description, "Engen Garage");
        assert_eq!(txns[0].amount, dec!(450.00));
        assert_eq!(txns[0].direction, Direction::Debit);
        assert_eq!(txns[1].amount, dec!(1200.00));
        assert_eq!(txns[1].direction, Direction::Credit);
        assert_eq!(txns[1].reference, "HTML-20240113-1");
    }

    #[test]
    fn test_parse_html_without_tables() {
        assert!(parse_html("<p>No statement here</p>").is_empty());
    }
}
