use chrono::NaiveDate;
use log::{debug, error, warn};
use regex::Regex;
use rust_decimal::Decimal;

use crate::models::{Direction, ParsedTransaction};
use crate::parser::amount::{normalize_whitespace, parse_date, parse_day_month, parse_field, AmountError};
use crate::parser::ParseOptions;

/// An unsigned amount with `,` or space thousands groups, or a bare `-`
/// meaning "empty".
const COLUMN_TOKEN: &str = r"-|\d{1,3}(?:,\d{3})+\.\d{2}|\d{1,3}(?: \d{3})+\.\d{2}|\d+\.\d{2}";
/// A signed amount that may carry an `R` currency marker.
const SIGNED_TOKEN: &str = r"-?R?\s?(?:\d{1,3}(?:,\d{3})+\.\d{2}|\d{1,3}(?: \d{3})+\.\d{2}|\d+\.\d{2})";
const BALANCE_TOKEN: &str = r"-?R?(?:\d{1,3}(?:,\d{3})+\.\d{2}|\d{1,3}(?: \d{3})+\.\d{2}|\d+\.\d{2})";

/// Running-balance summary rows. Matched as leading words of the description.
const SUMMARY_ROWS: &[&str] = &[
    "opening balance",
    "closing balance",
    "balance brought forward",
    "balance carried forward",
];

/// A description made up only of these words is a column header row.
const HEADER_WORDS: &[&str] = &[
    "date",
    "description",
    "details",
    "fee",
    "fees",
    "money",
    "out",
    "in",
    "amount",
    "debit",
    "debits",
    "credit",
    "credits",
    "balance",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Fee,
    MoneyOut,
    MoneyIn,
    /// One amount whose sign carries the direction.
    Signed,
    Balance,
}

impl Column {
    fn token(&self) -> &'static str {
        match self {
            Self::Fee | Self::MoneyOut | Self::MoneyIn => COLUMN_TOKEN,
            Self::Signed => SIGNED_TOKEN,
            Self::Balance => BALANCE_TOKEN,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DatePattern {
    /// Regex fragment for the date at the start of a line.
    pub pattern: &'static str,
    /// chrono format; ignored when `yearless` is set.
    pub format: &'static str,
    /// `dd Mon` dates take the year from [`ParseOptions::statement_year`].
    pub yearless: bool,
}

impl DatePattern {
    fn parse(&self, raw: &str, opts: &ParseOptions) -> Option<NaiveDate> {
        if self.yearless {
            parse_day_month(raw, opts.statement_year)
        } else {
            parse_date(raw, &[self.format])
        }
    }
}

/// One row of the bank-format table: how dates look, which monetary columns
/// trail a transaction and how far to look for them.
#[derive(Debug)]
pub struct FormatSpec {
    pub key: &'static str,
    pub reference_prefix: &'static str,
    pub dates: &'static [DatePattern],
    pub columns: &'static [Column],
    /// How many of the trailing `columns` may be absent.
    pub optional_columns: usize,
    /// Lines after the date line searched for the amount run.
    pub lookahead: usize,
}

/// Raw monetary cells, one per column, `None` when the column is absent.
type RawRun<'a> = Vec<Option<&'a str>>;

struct LayoutMatcher<'s> {
    spec: &'s FormatSpec,
    dated: Vec<(Regex, &'s DatePattern)>,
    date_prefix: Vec<Regex>,
    inline: Regex,
    amounts_only: Regex,
}

impl<'s> LayoutMatcher<'s> {
    fn new(spec: &'s FormatSpec) -> Result<Self, regex::Error> {
        let mut dated = Vec::with_capacity(spec.dates.len());
        let mut date_prefix = Vec::with_capacity(spec.dates.len());
        for date in spec.dates {
            dated.push((
                Regex::new(&format!(r"^(?P<date>{})\s+(?P<rest>.+)$", date.pattern))?,
                date,
            ));
            date_prefix.push(Regex::new(&format!(r"^(?:{})(?:\s|$)", date.pattern))?);
        }

        let required = spec.columns.len() - spec.optional_columns.min(spec.columns.len());
        let mut run = String::new();
        for (idx, column) in spec.columns.iter().enumerate() {
            let group = format!("(?P<c{idx}>{})", column.token());
            if idx < required {
                if idx > 0 {
                    run.push_str(r"\s+");
                }
                run.push_str(&group);
            } else {
                run.push_str(&format!(r"(?:\s+{group}"));
            }
        }
        run.push_str(&")?".repeat(spec.columns.len() - required));

        Ok(Self {
            spec,
            dated,
            date_prefix,
            inline: Regex::new(&format!(r"^(?P<desc>.+?)\s+{run}\s*$"))?,
            amounts_only: Regex::new(&format!(r"^{run}\s*$"))?,
        })
    }

    fn match_date<'l>(&self, line: &'l str) -> Option<(&'l str, &'l str, &'s DatePattern)> {
        self.dated.iter().find_map(|(re, pattern)| {
            let caps = re.captures(line)?;
            Some((caps.name("date")?.as_str(), caps.name("rest")?.as_str(), *pattern))
        })
    }

    fn starts_with_date(&self, line: &str) -> bool {
        self.date_prefix.iter().any(|re| re.is_match(line))
    }

    fn run_from<'l>(&self, caps: &regex::Captures<'l>) -> RawRun<'l> {
        (0..self.spec.columns.len())
            .map(|idx| caps.name(&format!("c{idx}")).map(|m| m.as_str()))
            .collect()
    }

    /// Description text followed by the full amount run.
    fn inline<'l>(&self, line: &'l str) -> Option<(&'l str, RawRun<'l>)> {
        let caps = self.inline.captures(line)?;
        let desc = caps.name("desc")?.as_str();
        Some((desc, self.run_from(&caps)))
    }

    /// A line holding nothing but the amount run.
    fn amounts_only<'l>(&self, line: &'l str) -> Option<RawRun<'l>> {
        let caps = self.amounts_only.captures(line)?;
        Some(self.run_from(&caps))
    }
}

/// A line that is only a long run of digits: an account, card or
/// terminal number that the PDF extractor split onto its own line.
pub fn is_digit_noise(line: &str) -> bool {
    let digits = line.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 8 && line.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '*')
}

fn looks_like_header(description: &str) -> bool {
    if description.chars().count() < 3 {
        return true;
    }
    let words: Vec<String> = description
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return true;
    }

    let joined = words.join(" ");
    let summary = SUMMARY_ROWS
        .iter()
        .any(|row| joined == *row || joined.starts_with(&format!("{row} ")));
    summary || words.iter().all(|w| HEADER_WORDS.contains(&w.as_str()))
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Fields {
    fee: Option<Decimal>,
    money_out: Option<Decimal>,
    money_in: Option<Decimal>,
    signed: Option<Decimal>,
    balance: Option<Decimal>,
}

fn read_fields(columns: &[Column], run: &RawRun<'_>) -> Result<Fields, AmountError> {
    let mut fields = Fields::default();
    for (column, raw) in columns.iter().zip(run) {
        let value = match raw {
            Some(raw) => parse_field(raw)?,
            None => None,
        };
        match column {
            Column::Fee => fields.fee = value,
            Column::MoneyOut => fields.money_out = value,
            Column::MoneyIn => fields.money_in = value,
            Column::Signed => fields.signed = value,
            Column::Balance => fields.balance = value,
        }
    }
    Ok(fields)
}

/// Money in wins over money out, which wins over a fee. Returns the positive
/// amount, its direction and whether it came from the fee column.
fn resolve(fields: &Fields) -> Option<(Decimal, Direction, bool)> {
    let populated = |v: Option<Decimal>| v.filter(|d| !d.is_zero());
    if let Some(amount) = populated(fields.money_in) {
        return Some((amount.abs(), Direction::Credit, false));
    }
    if let Some(amount) = populated(fields.money_out) {
        return Some((amount.abs(), Direction::Debit, false));
    }
    if let Some(amount) = populated(fields.fee) {
        return Some((amount.abs(), Direction::Debit, true));
    }
    populated(fields.signed).map(|amount| {
        let direction = if amount.is_sign_negative() {
            Direction::Debit
        } else {
            Direction::Credit
        };
        (amount.abs(), direction, false)
    })
}

/// Scan `text` line by line using the layout described by `spec`.
pub fn scan(text: &str, spec: &FormatSpec, opts: &ParseOptions) -> Vec<ParsedTransaction> {
    let matcher = match LayoutMatcher::new(spec) {
        Ok(m) => m,
        Err(e) => {
            error!("Invalid {} layout patterns: {e}", spec.key);
            return Vec::new();
        }
    };
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut transactions = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let Some((date_raw, rest, pattern)) = matcher.match_date(lines[i]) else {
            i += 1;
            continue;
        };
        let Some(date) = pattern.parse(date_raw, opts) else {
            debug!("Line {}: {date_raw:?} is not a calendar date", i + 1);
            i += 1;
            continue;
        };

        let mut parts: Vec<&str> = Vec::new();
        let mut run = None;
        let mut last = i;

        if let Some((desc, found)) = matcher.inline(rest) {
            parts.push(desc);
            run = Some(found);
        } else {
            parts.push(rest);
            let end = (i + spec.lookahead).min(lines.len().saturating_sub(1));
            for (j, &next) in lines.iter().enumerate().take(end + 1).skip(i + 1) {
                if matcher.starts_with_date(next) {
                    break;
                }
                if let Some(found) = matcher.amounts_only(next) {
                    run = Some(found);
                    last = j;
                    break;
                }
                if let Some((desc, found)) = matcher.inline(next) {
                    parts.push(desc);
                    run = Some(found);
                    last = j;
                    break;
                }
                if !next.is_empty() && !is_digit_noise(next) {
                    parts.push(next);
                }
            }
        }
        i = last + 1;

        let Some(run) = run else {
            debug!("Line {}: no amounts within {} lines, dropping", last + 1, spec.lookahead);
            continue;
        };

        let mut description = normalize_whitespace(&parts.join(" "));
        if looks_like_header(&description) {
            continue;
        }

        let fields = match read_fields(spec.columns, &run) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Dropping {} candidate {description:?} on {date}: {e}", spec.key);
                continue;
            }
        };
        let Some((amount, direction, from_fee)) = resolve(&fields) else {
            debug!("No populated amount for {description:?} on {date}, skipping");
            continue;
        };
        if from_fee {
            description.push_str(" (Fee)");
        }

        transactions.push(ParsedTransaction {
            date,
            description,
            amount,
            direction,
            reference: format!(
                "{}-{}-{}",
                spec.reference_prefix,
                date.format("%Y%m%d"),
                transactions.len()
            ),
            balance: fields.balance,
        });
    }
    transactions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{CAPITEC, TYMEBANK};
    use rust_decimal_macros::dec;

    fn opts() -> ParseOptions {
        ParseOptions { statement_year: 2024 }
    }

    #[test]
    fn test_is_digit_noise() {
        assert!(is_digit_noise("525309988959"));
        assert!(is_digit_noise("4111 1111 1111 1111"));
        assert!(is_digit_noise("****  1234 5678"));
        assert!(!is_digit_noise("1234"));
        assert!(!is_digit_noise("Boxer 525309988959"));
        assert!(!is_digit_noise("- 512.46 - 417.59"));
    }

    #[test]
    fn test_resolve_priority() {
        let both = Fields {
            money_in: Some(dec!(10)),
            money_out: Some(dec!(5)),
            ..Fields::default()
        };
        assert_eq!(resolve(&both), Some((dec!(10), Direction::Credit, false)));

        let out_only = Fields {
            money_in: Some(dec!(0)),
            money_out: Some(dec!(5)),
            fee: Some(dec!(1)),
            ..Fields::default()
        };
        assert_eq!(resolve(&out_only), Some((dec!(5), Direction::Debit, false)));

        let fee_only = Fields {
            fee: Some(dec!(7.50)),
            ..Fields::default()
        };
        assert_eq!(resolve(&fee_only), Some((dec!(7.50), Direction::Debit, true)));

        assert_eq!(resolve(&Fields::default()), None);
    }

    #[test]
    fn test_resolve_signed() {
        let negative = Fields {
            signed: Some(dec!(-150.00)),
            ..Fields::default()
        };
        assert_eq!(resolve(&negative), Some((dec!(150.00), Direction::Debit, false)));
        let positive = Fields {
            signed: Some(dec!(99.99)),
            ..Fields::default()
        };
        assert_eq!(resolve(&positive), Some((dec!(99.99), Direction::Credit, false)));
    }

    #[test]
    fn test_tymebank_single_line_credit() {
        let txns = scan(
            "04 Sep 2025 EFT for CAPITEC S SEANEGO - - 250.00 250.05",
            &TYMEBANK,
            &opts(),
        );
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].date, NaiveDate::from_ymd_opt(2025, 9, 4).unwrap());
        assert_eq!(txns[0].description, "EFT for CAPITEC S SEANEGO");
        assert_eq!(txns[0].amount, dec!(250.00));
        assert_eq!(txns[0].direction, Direction::Credit);
        assert_eq!(txns[0].balance, Some(dec!(250.05)));
        assert_eq!(txns[0].reference, "TYME-20250904-0");
    }

    #[test]
    fn test_tymebank_multi_line_skips_card_number() {
        let text = "\
10 Sep 2025 Purchase at Boxer Spr Mabopane
525309988959
- 512.46 - 417.59";
        let txns = scan(text, &TYMEBANK, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Purchase at Boxer Spr Mabopane");
        assert_eq!(txns[0].amount, dec!(512.46));
        assert_eq!(txns[0].direction, Direction::Debit);
        assert_eq!(txns[0].balance, Some(dec!(417.59)));
    }

    #[test]
    fn test_tymebank_continuation_lines_joined_in_order() {
        let text = "\
11 Sep 2025 Debit order
  MTN   SERVICE
PROVIDER  Contract 99 - 299.00 - 118.59";
        let txns = scan(text, &TYMEBANK, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Debit order MTN SERVICE PROVIDER Contract 99");
        assert_eq!(txns[0].amount, dec!(299.00));
    }

    #[test]
    fn test_tymebank_fee_marks_description() {
        let txns = scan("12 Sep 2025 Monthly account fee 70.00 - - 930.05", &TYMEBANK, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Monthly account fee (Fee)");
        assert_eq!(txns[0].amount, dec!(70.00));
        assert_eq!(txns[0].direction, Direction::Debit);
    }

    #[test]
    fn test_tymebank_thousands_separator() {
        let txns = scan("01 Oct 2025 Salary ACME - - 12,345.67 12,595.72", &TYMEBANK, &opts());
        assert_eq!(txns[0].amount, dec!(12345.67));
        assert_eq!(txns[0].balance, Some(dec!(12595.72)));
    }

    #[test]
    fn test_tymebank_drops_candidate_without_amounts() {
        let text = "\
04 Sep 2025 Orphan line with no amounts
05 Sep 2025 EFT for SHOP - 20.00 - 230.05";
        let txns = scan(text, &TYMEBANK, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "EFT for SHOP");
        assert_eq!(txns[0].reference, "TYME-20250905-0");
    }

    #[test]
    fn test_tymebank_lookahead_is_bounded() {
        let text = "\
04 Sep 2025 Far away amounts
a
b
c
d
e
f
- 20.00 - 230.05";
        assert!(scan(text, &TYMEBANK, &opts()).is_empty());
    }

    #[test]
    fn test_tymebank_corrupt_amount_drops_only_that_candidate() {
        let text = "\
04 Sep 2025 Broken extraction - - 15000000.00 250.05
05 Sep 2025 Good one - 20.00 - 230.05";
        let txns = scan(text, &TYMEBANK, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Good one");
    }

    #[test]
    fn test_tymebank_header_rows_ignored() {
        let text = "\
01 Sep 2025 Opening Balance - - - 0.05
04 Sep 2025 EFT for CAPITEC S SEANEGO - - 250.00 250.05";
        let txns = scan(text, &TYMEBANK, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "EFT for CAPITEC S SEANEGO");
    }

    #[test]
    fn test_tymebank_all_placeholders_skipped() {
        assert!(scan("04 Sep 2025 Nothing here - - - 250.05", &TYMEBANK, &opts()).is_empty());
    }

    #[test]
    fn test_capitec_signed_with_balance() {
        let text = "\
2024/01/12 Checkers Hyper -1,234.56 8,765.44
12/01/2024 Salary ACME R15,000.00 23,765.44";
        let txns = scan(text, &CAPITEC, &opts());
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].description, "Checkers Hyper");
        assert_eq!(txns[0].amount, dec!(1234.56));
        assert_eq!(txns[0].direction, Direction::Debit);
        assert_eq!(txns[0].balance, Some(dec!(8765.44)));
        assert_eq!(txns[1].date, NaiveDate::from_ymd_opt(2024, 1, 12).unwrap());
        assert_eq!(txns[1].direction, Direction::Credit);
        assert_eq!(txns[1].reference, "CAP-20240112-1");
    }

    #[test]
    fn test_capitec_yearless_date_uses_statement_year() {
        let txns = scan("12 Jan Uber trip -89.00", &CAPITEC, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].date, NaiveDate::from_ymd_opt(2024, 1, 12).unwrap());
        assert_eq!(txns[0].description, "Uber trip");
        assert_eq!(txns[0].balance, None);
    }

    #[test]
    fn test_capitec_wrapped_description() {
        let text = "\
2024/03/02 Payment received from
CLIENT ABC 500.00 1,500.00";
        let txns = scan(text, &CAPITEC, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Payment received from CLIENT ABC");
        assert_eq!(txns[0].direction, Direction::Credit);
    }

    #[test]
    fn test_looks_like_header() {
        assert!(looks_like_header("Description Money Out Money In Balance"));
        assert!(looks_like_header("Opening Balance"));
        assert!(looks_like_header("Balance Carried Forward:"));
        assert!(looks_like_header("-"));
        assert!(!looks_like_header("Send Money International"));
        assert!(!looks_like_header("Payment description ACME"));
        assert!(!looks_like_header("Opening Balances Ltd invoice"));
    }

    #[test]
    fn test_tymebank_description_with_header_words_kept() {
        let text = "\
04 Sep 2025 Send Money International - 150.00 - 100.05
05 Sep 2025 Payment description ACME - - 50.00 150.05";
        let txns = scan(text, &TYMEBANK, &opts());
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].description, "Send Money International");
        assert_eq!(txns[0].amount, dec!(150.00));
        assert_eq!(txns[0].direction, Direction::Debit);
        assert_eq!(txns[1].description, "Payment description ACME");
        assert_eq!(txns[1].direction, Direction::Credit);
    }

    #[test]
    fn test_tymebank_space_thousands_inline() {
        let txns = scan("01 Oct 2025 Salary ACME - - 12 345.67 12 595.72", &TYMEBANK, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Salary ACME");
        assert_eq!(txns[0].amount, dec!(12345.67));
        assert_eq!(txns[0].direction, Direction::Credit);
        assert_eq!(txns[0].balance, Some(dec!(12595.72)));
    }

    #[test]
    fn test_tymebank_space_thousands_amounts_only() {
        let text = "\
10 Sep 2025 Purchase at Boxer Spr Mabopane
525309988959
- 1 512.46 - 2 417.59";
        let txns = scan(text, &TYMEBANK, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, dec!(1512.46));
        assert_eq!(txns[0].direction, Direction::Debit);
        assert_eq!(txns[0].balance, Some(dec!(2417.59)));
    }

    #[test]
    fn test_capitec_space_thousands_signed() {
        let txns = scan("2024/01/12 Checkers Hyper -1 234.56 8 765.44", &CAPITEC, &opts());
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].description, "Checkers Hyper");
        assert_eq!(txns[0].amount, dec!(1234.56));
        assert_eq!(txns[0].direction, Direction::Debit);
        assert_eq!(txns[0].balance, Some(dec!(8765.44)));
    }
}
