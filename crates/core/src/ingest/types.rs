use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::finance::ProductType;
use crate::domain::stock::AssetType;

#[derive(Debug, Clone, PartialEq)]
pub struct StockRecord {
    pub ticker: String,
    pub name: String,
    pub asset_type: AssetType,
    pub market_type: String,
    pub market_cap: Option<i64>,
    pub total_shares: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyPriceRecord {
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

#[derive(Debug, Clone, PartialEq)]
pub struct DepositProductRecord {
    pub fin_co_no: String,
    pub fin_prdt_cd: String,
    pub kor_co_nm: String,
    pub fin_prdt_nm: String,
    pub product_type: ProductType,
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

#[derive(Debug, Clone, PartialEq)]
pub struct DepositOptionRecord {
    pub fin_co_no: String,
    pub fin_prdt_cd: String,
    pub intr_rate_type: String,
    pub intr_rate_type_nm: String,
    pub save_trm: i32,
    pub intr_rate: Option<Decimal>,
    pub intr_rate2: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommodityRecord {
    pub date: NaiveDate,
    pub close_price: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
}
