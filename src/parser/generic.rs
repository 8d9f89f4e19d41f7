use std::sync::OnceLock;

use log::{info, warn};
use regex::Regex;

use crate::models::{Direction, ParsedTransaction};
use crate::parser::amount::{normalize_whitespace, parse_amount, parse_date};

const AMOUNT: &str = r"(-?R?\s?[\d,]+\.\d{2})";

/// (pattern, chrono date format), tried in priority order.
const PATTERNS: &[(&str, &str)] = &[
    // 12/01/2024 | Description | -150.00
    (r"^(\d{2}/\d{2}/\d{4})[ \t]*\|[ \t]*([^|]+?)[ \t]*\|[ \t]*AMOUNT", "%d/%m/%Y"),
    // 12/01/2024 Description -150.00
    (r"^(\d{2}/\d{2}/\d{4})[ \t]+(.+?)[ \t]+AMOUNT[ \t]*$", "%d/%m/%Y"),
    // 2024-01-12 Description -150.00
    (r"^(\d{4}-\d{2}-\d{2})[ \t]+(.+?)[ \t]+AMOUNT[ \t]*$", "%Y-%m-%d"),
    // 12 Jan 2024 Description -150.00
    (r"^(\d{1,2}[ \t]+[A-Za-z]{3}[ \t]+\d{4})[ \t]+(.+?)[ \t]+AMOUNT[ \t]*$", "%d %b %Y"),
];

fn compiled() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|(pattern, fmt)| {
                match Regex::new(&pattern.replace("AMOUNT", AMOUNT)) {
                    Ok(re) => Some((re, *fmt)),
                    Err(e) => {
                        warn!("Skipping generic pattern {pattern}: {e}");
                        None
                    }
                }
            })
            .collect()
    })
}

/// Less precise fallback: one `date description amount` per line, where the
/// amount's sign gives the direction. The first date format that yields at
/// least one transaction wins.
pub fn parse(text: &str) -> Vec<ParsedTransaction> {
    for (re, date_format) in compiled() {
        let mut transactions = Vec::new();
        for line in text.lines().map(str::trim) {
            let Some(caps) = re.captures(line) else {
                continue;
            };
            let Some(date) = parse_date(&caps[1], &[*date_format]) else {
                warn!("Failed to parse generic transaction date {:?}", &caps[1]);
                continue;
            };
            let description = normalize_whitespace(&caps[2]);
            if description.chars().count() < 3 {
                continue;
            }
            let amount = match parse_amount(&caps[3]) {
                Ok(amount) if !amount.is_zero() => amount,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Dropping generic candidate {description:?} on {date}: {e}");
                    continue;
                }
            };
            let direction = if amount.is_sign_negative() {
                Direction::Debit
            } else {
                Direction::Credit
            };
            let reference = format!("GEN-{}-{}", date.format("%Y%m%d"), transactions.len());
            transactions.push(ParsedTransaction {
                date,
                description,
                amount: amount.abs(),
                direction,
                reference,
                balance: None,
            });
        }
        if !transactions.is_empty() {
            info!(
                "Found {} transactions with generic {} pattern",
                transactions.len(),
                date_format
            );
            return transactions;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_generic_slash_date_debit() {
        let txns = parse("12/01/2024 Some Shop -150.00");
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].date, NaiveDate::from_ymd_opt(2024, 1, 12).unwrap());
        assert_eq!(txns[0].description, "Some Shop");
        assert_eq!(txns[0].amount, dec!(150.00));
        assert_eq!(txns[0].direction, Direction::Debit);
        assert_eq!(txns[0].reference, "GEN-20240112-0");
    }

    #[test]
    fn test_generic_pipe_delimited() {
        let txns = parse("05/02/2024 | Rent Received | R 8,500.00");
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Rent Received");
        assert_eq!(txns[0].amount, dec!(8500.00));
        assert_eq!(txns[0].direction, Direction::Credit);
    }

    #[test]
    fn test_generic_iso_dates() {
        let txns = parse("2024-03-01 Coffee Shop -35.50\n2024-03-02 Refund 35.50");
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[1].direction, Direction::Credit);
        assert_eq!(txns[1].reference, "GEN-20240302-1");
    }

    #[test]
    fn test_generic_first_matching_format_wins() {
        let text = "2024-03-01 Coffee Shop -35.50\n01 Mar 2024 Other Shop -10.00";
        let txns = parse(text);
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Coffee Shop");
    }

    #[test]
    fn test_generic_skips_short_descriptions_and_corrupt_amounts() {
        let text = "12/01/2024 AB -150.00\n13/01/2024 Huge 15000000.00\n14/01/2024 Fine Shop -1.00";
        let txns = parse(text);
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Fine Shop");
    }

    #[test]
    fn test_generic_no_match() {
        assert!(parse("nothing that looks like a transaction").is_empty());
    }
}
