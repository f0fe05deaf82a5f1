use crate::domain::stock::{ChartPoint, DailyPrice, Stock, StockSummary, WatchlistEntry};
use crate::ingest::types::{DailyPriceRecord, StockRecord};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::BTreeMap;

use super::upsert_chunk_size;

pub const SEARCH_LIMIT: i64 = 10;

/// Stock joined with its most recent daily price (all price columns nullable).
#[derive(Debug, sqlx::FromRow)]
struct StockWithPriceRow {
    ticker: String,
    name: String,
    market_type: String,
    market_cap: Option<i64>,
    p_date: Option<NaiveDate>,
    p_open: Option<i64>,
    p_high: Option<i64>,
    p_low: Option<i64>,
    p_close: Option<i64>,
    p_fluctuation_rate: Option<Decimal>,
    p_volume: Option<i64>,
    p_trading_value: Option<i64>,
    p_change: Option<i64>,
    p_nav: Option<Decimal>,
}

impl StockWithPriceRow {
    fn into_summary(self) -> StockSummary {
        let latest_price = match (self.p_date, self.p_close) {
            (Some(date), Some(close_price)) => Some(DailyPrice {
                ticker: self.ticker.clone(),
                date,
                open_price: self.p_open.unwrap_or_default(),
                high_price: self.p_high.unwrap_or_default(),
                low_price: self.p_low.unwrap_or_default(),
                close_price,
                fluctuation_rate: self.p_fluctuation_rate,
                volume: self.p_volume.unwrap_or_default(),
                trading_value: self.p_trading_value,
                change: self.p_change,
                nav: self.p_nav,
            }),
            _ => None,
        };
        StockSummary {
            ticker: self.ticker,
            name: self.name,
            market_type: self.market_type,
            market_cap: self.market_cap,
            latest_price,
        }
    }
}

const SUMMARY_SELECT: &str = "SELECT s.ticker, s.name, s.market_type, s.market_cap, \
       p.date AS p_date, p.open_price AS p_open, p.high_price AS p_high, p.low_price AS p_low, \
       p.close_price AS p_close, p.fluctuation_rate AS p_fluctuation_rate, p.volume AS p_volume, \
       p.trading_value AS p_trading_value, p.change AS p_change, p.nav AS p_nav \
     FROM stocks s \
     LEFT JOIN LATERAL ( \
       SELECT * FROM daily_prices dp WHERE dp.ticker = s.ticker ORDER BY dp.date DESC LIMIT 1 \
     ) p ON TRUE";

/// Upserts stocks and their daily prices for one market in a single transaction.
/// Existing price history is left untouched.
pub async fn upsert_market_snapshot(
    pool: &PgPool,
    stocks: &[StockRecord],
    prices: &[DailyPriceRecord],
) -> anyhow::Result<(u64, u64)> {
    // ON CONFLICT cannot touch the same row twice in one statement.
    let stocks: BTreeMap<&str, &StockRecord> =
        stocks.iter().map(|s| (s.ticker.as_str(), s)).collect();
    let prices: BTreeMap<(&str, NaiveDate), &DailyPriceRecord> = prices
        .iter()
        .map(|p| ((p.ticker.as_str(), p.date), p))
        .collect();
    let stocks: Vec<_> = stocks.into_values().collect();
    let prices: Vec<_> = prices.into_values().collect();

    let chunk_size = upsert_chunk_size()?;
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut stock_rows: u64 = 0;
    for chunk in stocks.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO stocks (ticker, name, asset_type, market_type, market_cap, total_shares) ",
        );
        qb.push_values(chunk, |mut b, s| {
            b.push_bind(&s.ticker)
                .push_bind(&s.name)
                .push_bind(s.asset_type.as_str())
                .push_bind(&s.market_type)
                .push_bind(s.market_cap)
                .push_bind(s.total_shares);
        });
        qb.push(
            " ON CONFLICT (ticker) DO UPDATE SET name = EXCLUDED.name, \
               asset_type = EXCLUDED.asset_type, \
               market_type = EXCLUDED.market_type, market_cap = EXCLUDED.market_cap, \
               total_shares = EXCLUDED.total_shares, updated_at = now()",
        );
        stock_rows += qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert stocks failed")?
            .rows_affected();
    }

    let mut price_rows: u64 = 0;
    for (batch_idx, chunk) in prices.chunks(chunk_size).enumerate() {
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO daily_prices (ticker, date, open_price, high_price, low_price, \
             close_price, fluctuation_rate, volume, trading_value, change, nav) ",
        );
        qb.push_values(chunk, |mut b, p| {
            b.push_bind(&p.ticker)
                .push_bind(p.date)
                .push_bind(p.open_price)
                .push_bind(p.high_price)
                .push_bind(p.low_price)
                .push_bind(p.close_price)
                .push_bind(p.fluctuation_rate)
                .push_bind(p.volume)
                .push_bind(p.trading_value)
                .push_bind(p.change)
                .push_bind(p.nav);
        });
        qb.push(
            " ON CONFLICT (ticker, date) DO UPDATE SET open_price = EXCLUDED.open_price, \
               high_price = EXCLUDED.high_price, low_price = EXCLUDED.low_price, \
               close_price = EXCLUDED.close_price, fluctuation_rate = EXCLUDED.fluctuation_rate, \
               volume = EXCLUDED.volume, trading_value = EXCLUDED.trading_value, \
               change = EXCLUDED.change, nav = EXCLUDED.nav",
        );
        price_rows += qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert daily_prices failed")?
            .rows_affected();

        tracing::debug!(
            batch_idx,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "daily_prices batch upsert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok((stock_rows, price_rows))
}

/// Case-insensitive substring match on name or ticker. Blank queries match nothing.
pub async fn search(pool: &PgPool, query: &str) -> anyhow::Result<Vec<StockSummary>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = format!("%{}%", escape_like(query));
    let rows = sqlx::query_as::<_, StockWithPriceRow>(&format!(
        "{SUMMARY_SELECT} WHERE s.name ILIKE $1 OR s.ticker ILIKE $1 \
         ORDER BY s.market_cap DESC NULLS LAST, s.ticker LIMIT $2"
    ))
    .bind(pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await
    .context("stock search failed")?;
    Ok(rows.into_iter().map(StockWithPriceRow::into_summary).collect())
}

pub async fn find_summary(pool: &PgPool, ticker: &str) -> anyhow::Result<Option<StockSummary>> {
    let sql = format!("{SUMMARY_SELECT} WHERE s.ticker = $1");
    let row = sqlx::query_as::<_, StockWithPriceRow>(&sql)
        .bind(ticker)
        .fetch_optional(pool)
        .await
        .context("select stock failed")?;
    Ok(row.map(StockWithPriceRow::into_summary))
}

pub async fn find_stock(pool: &PgPool, ticker: &str) -> anyhow::Result<Option<Stock>> {
    sqlx::query_as::<_, Stock>(
        "SELECT ticker, name, asset_type, market_type, market_cap, total_shares \
         FROM stocks WHERE ticker = $1",
    )
    .bind(ticker)
    .fetch_optional(pool)
    .await
    .context("select stock failed")
}

pub async fn top_by_market_cap(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<Stock>> {
    sqlx::query_as::<_, Stock>(
        "SELECT ticker, name, asset_type, market_type, market_cap, total_shares FROM stocks \
         WHERE market_cap IS NOT NULL ORDER BY market_cap DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select top stocks failed")
}

pub async fn chart(
    pool: &PgPool,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<ChartPoint>> {
    sqlx::query_as::<_, ChartPoint>(
        "SELECT date, close_price FROM daily_prices \
         WHERE ticker = $1 AND date >= $2 AND date <= $3 ORDER BY date ASC",
    )
    .bind(ticker)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .context("select chart failed")
}

#[derive(Debug, sqlx::FromRow)]
struct WatchRow {
    watch_id: i64,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    stock: StockWithPriceRow,
}

pub async fn watchlist(pool: &PgPool, user_id: i64) -> anyhow::Result<Vec<WatchlistEntry>> {
    let select = SUMMARY_SELECT.replacen(
        "SELECT ",
        "SELECT w.id AS watch_id, w.created_at, ",
        1,
    );
    let rows = sqlx::query_as::<_, WatchRow>(&format!(
        "{} JOIN watchlist w ON w.ticker = s.ticker WHERE w.user_id = $1 \
         ORDER BY w.created_at DESC, w.id DESC",
        select
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select watchlist failed")?;
    Ok(rows
        .into_iter()
        .map(|r| WatchlistEntry {
            id: r.watch_id,
            created_at: r.created_at,
            stock: r.stock.into_summary(),
        })
        .collect())
}

/// Returns false when the ticker was already on the list.
pub async fn add_to_watchlist(pool: &PgPool, user_id: i64, ticker: &str) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "INSERT INTO watchlist (user_id, ticker) VALUES ($1, $2) \
         ON CONFLICT (user_id, ticker) DO NOTHING",
    )
    .bind(user_id)
    .bind(ticker)
    .execute(pool)
    .await
    .context("insert watchlist failed")?;
    Ok(res.rows_affected() == 1)
}

pub async fn remove_from_watchlist(
    pool: &PgPool,
    user_id: i64,
    ticker: &str,
) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM watchlist WHERE user_id = $1 AND ticker = $2")
        .bind(user_id)
        .bind(ticker)
        .execute(pool)
        .await
        .context("delete watchlist failed")?;
    Ok(res.rows_affected() > 0)
}

pub(crate) fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
