use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    Stock,
    Etf,
}

impl AssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Stock => "STOCK",
            AssetType::Etf => "ETF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOCK" => Some(AssetType::Stock),
            "ETF" => Some(AssetType::Etf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Stock {
    pub ticker: String,
    pub name: String,
    pub asset_type: String,
    pub market_type: String,
    pub market_cap: Option<i64>,
    pub total_shares: Option<i64>,
}

impl Stock {
    pub fn asset_type(&self) -> AssetType {
        AssetType::parse(&self.asset_type).unwrap_or(AssetType::Stock)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyPrice {
    pub ticker: String,
    pub date: NaiveDate,
    pub open_price: i64,
    pub high_price: i64,
    pub low_price: i64,
    pub close_price: i64,
    pub fluctuation_rate: Option<Decimal>,
    pub volume: i64,
    pub trading_value: Option<i64>,
    pub change: Option<i64>,
    pub nav: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockSummary {
    pub ticker: String,
    pub name: String,
    pub market_type: String,
    pub market_cap: Option<i64>,
    pub latest_price: Option<DailyPrice>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub close_price: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchlistEntry {
    pub id: i64,
    pub stock: StockSummary,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartPeriod {
    OneWeek,
    OneMonth,
    SixMonths,
    OneYear,
    ThreeYears,
    FiveYears,
    All,
}

impl ChartPeriod {
    /// Unknown values fall back to the ten-year window.
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            None | Some("1y") => ChartPeriod::OneYear,
            Some("1w") => ChartPeriod::OneWeek,
            Some("1m") => ChartPeriod::OneMonth,
            Some("6m") => ChartPeriod::SixMonths,
            Some("3y") => ChartPeriod::ThreeYears,
            Some("5y") => ChartPeriod::FiveYears,
            Some(_) => ChartPeriod::All,
        }
    }

    pub fn start_date(self, end: NaiveDate) -> NaiveDate {
        let months = match self {
            ChartPeriod::OneWeek => return end - chrono::Duration::weeks(1),
            ChartPeriod::OneMonth => 1,
            ChartPeriod::SixMonths => 6,
            ChartPeriod::OneYear => 12,
            ChartPeriod::ThreeYears => 36,
            ChartPeriod::FiveYears => 60,
            ChartPeriod::All => 120,
        };
        end.checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN)
    }
}
