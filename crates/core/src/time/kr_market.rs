use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

const KST_OFFSET_SECS: i32 = 9 * 3600;

// Before this time (KST) the previous day's prices are the latest published.
// KRX closes at 15:30 KST and publishes daily data shortly after.
const CLOSE_CUTOFF_HOUR_KST: u32 = 16;
const CLOSE_CUTOFF_MINUTE_KST: u32 = 0;

// Month/day pairs on which KRX is closed every year.
const FIXED_HOLIDAYS: [(u32, u32); 10] = [
    (1, 1),
    (3, 1),
    (5, 1),
    (5, 5),
    (6, 6),
    (8, 15),
    (10, 3),
    (10, 9),
    (12, 25),
    (12, 31),
];

/// Accepts `YYYY-MM-DD` or `YYYYMMDD` (the KRX `basDd` form).
pub fn parse_date_arg(s: &str) -> anyhow::Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .with_context(|| format!("invalid date {s:?} (expected YYYY-MM-DD or YYYYMMDD)"))
}

/// Calendar date in Korea at `now_utc`.
pub fn kst_date(now_utc: DateTime<Utc>) -> NaiveDate {
    (now_utc + Duration::seconds(i64::from(KST_OFFSET_SECS))).date_naive()
}

pub fn resolve_trading_date(
    date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    resolve_trading_date_with(date_arg, now_utc, &configured_holidays())
}

pub fn resolve_trading_date_with(
    date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    extra_holidays: &HashSet<NaiveDate>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = date_arg {
        return parse_date_arg(s);
    }

    let kst = chrono::FixedOffset::east_opt(KST_OFFSET_SECS).context("invalid KST offset")?;
    let now_kst = now_utc.with_timezone(&kst);

    let cutoff_reached =
        (now_kst.hour(), now_kst.minute()) >= (CLOSE_CUTOFF_HOUR_KST, CLOSE_CUTOFF_MINUTE_KST);
    let mut date = now_kst.date_naive();
    if !cutoff_reached {
        date -= Duration::days(1);
    }

    while !is_business_day(date, extra_holidays) {
        date -= Duration::days(1);
    }

    Ok(date)
}

pub fn is_business_day(date: NaiveDate, extra_holidays: &HashSet<NaiveDate>) -> bool {
    !is_weekend(date)
        && !FIXED_HOLIDAYS.contains(&(date.month(), date.day()))
        && !extra_holidays.contains(&date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

/// Lunar holidays move every year, so they come from
/// KR_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
fn configured_holidays() -> HashSet<NaiveDate> {
    let mut out = HashSet::new();
    if let Ok(s) = std::env::var("KR_MARKET_HOLIDAYS") {
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                Ok(d) => {
                    out.insert(d);
                }
                Err(_) => {
                    tracing::warn!(value = part, "ignoring malformed KR_MARKET_HOLIDAYS entry")
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn kst_date_crosses_midnight_before_utc() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 15, 30, 0).unwrap();
        assert_eq!(kst_date(now), d(2026, 3, 2));
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 14, 59, 0).unwrap();
        assert_eq!(kst_date(now), d(2026, 3, 1));
    }

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 3, 8, 0, 0).unwrap();
        let none = HashSet::new();
        assert_eq!(
            resolve_trading_date_with(Some("2026-01-03"), now, &none).unwrap(),
            d(2026, 1, 3)
        );
        assert_eq!(
            resolve_trading_date_with(Some("20260105"), now, &none).unwrap(),
            d(2026, 1, 5)
        );
        assert!(resolve_trading_date_with(Some("01/05/2026"), now, &none).is_err());
    }

    #[test]
    fn rolls_back_on_weekend() {
        // 2026-01-03 is Saturday; 17:00 KST.
        let now = Utc.with_ymd_and_hms(2026, 1, 3, 8, 0, 0).unwrap();
        assert_eq!(resolve_trading_date_with(None, now, &HashSet::new()).unwrap(), d(2026, 1, 2));
    }

    #[test]
    fn uses_previous_day_before_cutoff() {
        // 2026-01-05 06:00 UTC = 15:00 KST (<16:00 cutoff). Sunday and Saturday are skipped.
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 6, 0, 0).unwrap();
        assert_eq!(resolve_trading_date_with(None, now, &HashSet::new()).unwrap(), d(2026, 1, 2));
    }

    #[test]
    fn uses_same_day_after_cutoff() {
        // 2026-01-05 08:00 UTC = 17:00 KST (>=16:00 cutoff)
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        assert_eq!(resolve_trading_date_with(None, now, &HashSet::new()).unwrap(), d(2026, 1, 5));
    }

    #[test]
    fn skips_fixed_and_configured_holidays() {
        // 2026-10-10 is Saturday; the day before is Hangul Day.
        let now = Utc.with_ymd_and_hms(2026, 10, 10, 1, 0, 0).unwrap();
        assert_eq!(resolve_trading_date_with(None, now, &HashSet::new()).unwrap(), d(2026, 10, 8));

        let extra: HashSet<_> = [d(2026, 10, 8)].into_iter().collect();
        assert_eq!(resolve_trading_date_with(None, now, &extra).unwrap(), d(2026, 10, 7));
    }
}
