use anyhow::Context;
use chrono::NaiveDate;
use didim_core::domain::finance::{Commodity, ProductType};
use didim_core::ingest::commodity::read_prices_csv;
use didim_core::ingest::fss::{FssCatalog, FssClient};
use didim_core::ingest::krx::{KrxClient, ParsedMarket};
use didim_core::ingest::types::CommodityRecord;
use didim_core::storage::{finance, stocks};
use std::path::Path;

#[derive(Debug, Default)]
pub struct KrxBatch {
    pub snapshot: ParsedMarket,
    pub failed_markets: usize,
}

/// Fetches every configured market. A market whose request fails is logged and skipped.
pub async fn collect_krx(client: &KrxClient, date: NaiveDate) -> KrxBatch {
    let mut batch = KrxBatch::default();
    for &market in client.markets() {
        match client.fetch_daily(market, date).await {
            Ok(parsed) => {
                tracing::info!(
                    market = market.label(),
                    %date,
                    rows = parsed.stocks.len(),
                    skipped = parsed.skipped,
                    "fetched KRX market"
                );
                batch.snapshot.stocks.extend(parsed.stocks);
                batch.snapshot.prices.extend(parsed.prices);
                batch.snapshot.skipped += parsed.skipped;
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(
                    market = market.label(),
                    %date,
                    error = %format!("{err:#}"),
                    "KRX market failed; skipping"
                );
                batch.failed_markets += 1;
            }
        }
    }
    batch
}

pub async fn store_krx(pool: &sqlx::PgPool, batch: &KrxBatch) -> anyhow::Result<(u64, u64)> {
    stocks::upsert_market_snapshot(pool, &batch.snapshot.stocks, &batch.snapshot.prices).await
}

/// Deposits then savings. A product type whose fetch fails is logged and skipped.
pub async fn collect_deposits(client: &FssClient) -> FssCatalog {
    let mut catalog = FssCatalog::default();
    for product_type in [ProductType::Deposit, ProductType::Saving] {
        match client.fetch_catalog(product_type).await {
            Ok(part) => {
                tracing::info!(
                    product_type = product_type.as_str(),
                    products = part.products.len(),
                    options = part.options.len(),
                    "fetched FSS catalog"
                );
                catalog.products.extend(part.products);
                catalog.options.extend(part.options);
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(
                    product_type = product_type.as_str(),
                    error = %format!("{err:#}"),
                    "FSS catalog fetch failed; skipping"
                );
            }
        }
    }
    catalog
}

pub async fn store_deposits(
    pool: &sqlx::PgPool,
    catalog: &FssCatalog,
) -> anyhow::Result<(u64, u64)> {
    if catalog.products.is_empty() {
        tracing::warn!("FSS catalog is empty; nothing to store");
        return Ok((0, 0));
    }
    finance::upsert_catalog(pool, &catalog.products, &catalog.options).await
}

pub fn load_commodity(commodity: Commodity, path: &Path) -> anyhow::Result<Vec<CommodityRecord>> {
    let parsed = read_prices_csv(path)
        .with_context(|| format!("failed to import {} prices", commodity.as_str()))?;
    tracing::info!(
        commodity = commodity.as_str(),
        path = %path.display(),
        rows = parsed.records.len(),
        skipped = parsed.skipped,
        "parsed commodity CSV"
    );
    Ok(parsed.records)
}
