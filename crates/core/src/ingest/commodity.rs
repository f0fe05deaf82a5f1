use crate::ingest::types::CommodityRecord;
use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default)]
pub struct ParsedPrices {
    pub records: Vec<CommodityRecord>,
    pub skipped: usize,
}

struct Columns {
    date: usize,
    close: usize,
    volume: Option<usize>,
    open: Option<usize>,
    high: usize,
    low: usize,
}

impl Columns {
    fn from_header(header: &[&str]) -> anyhow::Result<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
        };
        let require =
            |name: &str| find(name).with_context(|| format!("CSV header is missing {name:?}"));
        Ok(Self {
            date: require("Date")?,
            close: require("Close/Last")?,
            volume: find("Volume"),
            open: find("Open"),
            high: require("High")?,
            low: require("Low")?,
        })
    }
}

/// Splits one CSV line on commas outside double quotes.
fn parse_csv_line(line: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut in_quotes = false;
    let mut field_start = 0;

    for (i, c) in line.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == ',' && !in_quotes {
            result.push(line[field_start..i].trim().trim_matches('"'));
            field_start = i + 1;
        }
    }
    result.push(line[field_start..].trim().trim_matches('"'));
    result
}

pub fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().trim_start_matches('$').replace(',', "");
    if cleaned.is_empty() || cleaned == "-" || cleaned.eq_ignore_ascii_case("N/A") {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn parse_row(cols: &Columns, fields: &[&str]) -> Option<CommodityRecord> {
    let get = |i: usize| fields.get(i).copied();
    let date = parse_date(get(cols.date)?)?;
    let close_price = parse_price(get(cols.close)?)?;
    let open_price = cols
        .open
        .and_then(get)
        .and_then(parse_price)
        .unwrap_or(close_price);
    Some(CommodityRecord {
        date,
        close_price,
        open_price,
        high_price: parse_price(get(cols.high)?)?,
        low_price: parse_price(get(cols.low)?)?,
        volume: cols
            .volume
            .and_then(get)
            .and_then(parse_price)
            .unwrap_or(Decimal::ZERO),
    })
}

/// Parses a Nasdaq historical-price export. The first non-empty line is the header.
pub fn parse_prices_csv(content: &str) -> anyhow::Result<ParsedPrices> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().context("CSV is empty")?;
    let cols = Columns::from_header(&parse_csv_line(header))?;

    let mut out = ParsedPrices::default();
    for (line_num, line) in lines {
        let fields = parse_csv_line(line);
        match parse_row(&cols, &fields) {
            Some(record) => out.records.push(record),
            None => {
                tracing::warn!(line = line_num + 1, content = line, "skipping malformed price row");
                out.skipped += 1;
            }
        }
    }
    Ok(out)
}

pub fn read_prices_csv(path: &Path) -> anyhow::Result<ParsedPrices> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_prices_csv(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parse_csv_line_with_quotes() {
        assert_eq!(
            parse_csv_line(r#"10/10/2026,"$2,650.10",N/A,"2,640.00""#),
            vec!["10/10/2026", "$2,650.10", "N/A", "2,640.00"]
        );
        assert_eq!(parse_csv_line("a,,b"), vec!["a", "", "b"]);
    }

    #[test]
    fn parses_nasdaq_export() {
        let csv = "\u{feff}Date,Close/Last,Volume,Open,High,Low\n\
                   10/10/2026,\"$2,650.10\",180123,\"$2,640.00\",\"$2,660.00\",\"$2,630.50\"\n\
                   2026-10-09,2640.00,,,2645.5,2620\n\
                   \n\
                   not-a-date,1,1,1,1,1\n\
                   10/08/2026,-,1,1,1,1\n";
        let parsed = parse_prices_csv(csv).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 2);

        let first = &parsed.records[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 10, 10).unwrap());
        assert_eq!(first.close_price, dec("2650.10"));
        assert_eq!(first.open_price, dec("2640.00"));
        assert_eq!(first.volume, dec("180123"));

        // Missing Open falls back to Close; missing Volume is zero.
        let second = &parsed.records[1];
        assert_eq!(second.open_price, dec("2640.00"));
        assert_eq!(second.volume, Decimal::ZERO);
    }

    #[test]
    fn header_must_name_required_columns() {
        assert!(parse_prices_csv("Date,Price\n10/10/2026,1\n").is_err());
        assert!(parse_prices_csv("").is_err());
    }

    #[test]
    fn non_numeric_open_falls_back_to_close() {
        let csv =
            "Date,Close/Last,Volume,Open,High,Low\n01/02/2026,30.125,10,01/02/2026,30.5,29.9\n";
        let parsed = parse_prices_csv(csv).unwrap();
        assert_eq!(parsed.records[0].open_price, dec("30.125"));
    }
}
