use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Deposit,
    Saving,
}

impl ProductType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Deposit => "deposit",
            ProductType::Saving => "saving",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "deposit" => Some(ProductType::Deposit),
            "saving" => Some(ProductType::Saving),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DepositProduct {
    pub id: i64,
    pub fin_co_no: String,
    pub fin_prdt_cd: String,
    pub kor_co_nm: String,
    pub fin_prdt_nm: String,
    pub product_type: String,
    pub join_way: String,
    pub mtrt_int: String,
    pub spcl_cnd: String,
    pub join_deny: String,
    pub join_member: String,
    pub etc_note: String,
    pub max_limit: Option<i64>,
    pub dcls_strt_day: Option<String>,
    pub dcls_end_day: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DepositOption {
    pub id: i64,
    pub product_id: i64,
    pub intr_rate_type: String,
    pub intr_rate_type_nm: String,
    pub save_trm: i32,
    pub intr_rate: Option<Decimal>,
    pub intr_rate2: Option<Decimal>,
}

/// List row; `max_rate` is the best intr_rate2 across the product's options.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductSummary {
    pub id: i64,
    pub fin_co_no: String,
    pub fin_prdt_cd: String,
    pub kor_co_nm: String,
    pub fin_prdt_nm: String,
    pub product_type: String,
    pub max_rate: Option<Decimal>,
    pub is_joined: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: DepositProduct,
    pub options: Vec<DepositOption>,
    pub max_rate: Option<Decimal>,
    pub is_joined: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProductView {
    pub id: i64,
    pub product: ProductSummary,
    pub option: Option<DepositOption>,
    pub joined_at: DateTime<Utc>,
    pub memo: String,
}

#[derive(Debug, Clone, Default)]
pub struct DepositFilter {
    pub product_type: Option<ProductType>,
    pub search: Option<String>,
    pub bank: Option<String>,
}

pub fn max_rate(options: &[DepositOption]) -> Option<Decimal> {
    options.iter().filter_map(|o| o.intr_rate2).max()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commodity {
    Gold,
    Silver,
}

impl Commodity {
    /// Anything other than "gold" selects silver.
    pub fn parse_lenient(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some("gold") | None => Commodity::Gold,
            Some(_) => Commodity::Silver,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Commodity::Gold => "gold",
            Commodity::Silver => "silver",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Commodity::Gold => "gold_prices",
            Commodity::Silver => "silver_prices",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CommodityPrice {
    pub date: NaiveDate,
    pub close_price: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommodityLatest {
    pub date: NaiveDate,
    pub price: Decimal,
    pub change: Option<Decimal>,
    pub change_rate: Option<Decimal>,
}

/// `history` must be ordered newest first.
pub fn commodity_latest(history: &[CommodityPrice]) -> Option<CommodityLatest> {
    let latest = history.first()?;
    let (change, change_rate) = match history.get(1) {
        Some(prev) => {
            let change = latest.close_price - prev.close_price;
            let rate = if prev.close_price.is_zero() {
                None
            } else {
                Some(round2(change / prev.close_price * Decimal::ONE_HUNDRED))
            };
            (Some(round2(change)), rate)
        }
        None => (None, None),
    };
    Some(CommodityLatest {
        date: latest.date,
        price: latest.close_price,
        change,
        change_rate,
    })
}

fn round2(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn price(day: u32, close: &str) -> CommodityPrice {
        let close = Decimal::from_str(close).unwrap();
        CommodityPrice {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            close_price: close,
            open_price: close,
            high_price: close,
            low_price: close,
            volume: Decimal::ZERO,
        }
    }

    #[test]
    fn latest_change_and_rate() {
        let history = vec![price(3, "2050.50"), price(2, "2000.00"), price(1, "1990")];
        let latest = commodity_latest(&history).unwrap();
        assert_eq!(latest.price, Decimal::from_str("2050.50").unwrap());
        assert_eq!(latest.change, Some(Decimal::from_str("50.50").unwrap()));
        assert_eq!(latest.change_rate, Some(Decimal::from_str("2.53").unwrap()));
    }

    #[test]
    fn zero_change_is_reported_as_zero() {
        let history = vec![price(2, "30.125"), price(1, "30.125")];
        let latest = commodity_latest(&history).unwrap();
        assert_eq!(latest.change, Some(Decimal::ZERO));
        assert_eq!(latest.change_rate, Some(Decimal::ZERO));
    }

    #[test]
    fn single_row_has_no_change() {
        let latest = commodity_latest(&[price(1, "10")]).unwrap();
        assert_eq!(latest.change, None);
        assert_eq!(latest.change_rate, None);
        assert!(commodity_latest(&[]).is_none());
    }

    #[test]
    fn commodity_type_falls_back_to_silver() {
        assert_eq!(Commodity::parse_lenient(Some("gold")), Commodity::Gold);
        assert_eq!(Commodity::parse_lenient(None), Commodity::Gold);
        assert_eq!(Commodity::parse_lenient(Some("copper")), Commodity::Silver);
        assert_eq!(Commodity::Silver.table(), "silver_prices");
    }
}
