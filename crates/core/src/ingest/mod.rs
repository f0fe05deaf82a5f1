pub mod commodity;
pub mod fss;
pub mod krx;
pub mod types;

pub use types::{
    CommodityRecord, DailyPriceRecord, DepositOptionRecord, DepositProductRecord, StockRecord,
};
