use anyhow::Context;
use clap::{Parser, Subcommand};
use didim_core::config::Settings;
use didim_core::domain::finance::Commodity;
use didim_core::ingest::fss::FssClient;
use didim_core::ingest::krx::KrxClient;
use didim_core::storage::finance;
use didim_core::storage::lock::{IngestJob, IngestLock};
use didim_core::time::kr_market::{kst_date, resolve_trading_date};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ingest;

#[derive(Debug, Parser)]
#[command(name = "didim_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upsert one trading day of KRX stock and ETF prices.
    IngestKrx {
        /// Trading date (YYYY-MM-DD or YYYYMMDD). Defaults to the latest KRX business day.
        #[arg(long)]
        date: Option<String>,

        /// Fetch and parse without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Refresh the FSS deposit and savings catalog.
    SyncDeposits {
        #[arg(long)]
        dry_run: bool,
    },
    /// Import gold/silver daily prices from Nasdaq CSV exports.
    ImportCommodities {
        #[arg(long)]
        gold: Option<PathBuf>,

        #[arg(long)]
        silver: Option<PathBuf>,

        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::IngestKrx { date, dry_run } => {
            ingest_krx(&settings, date.as_deref(), dry_run).await
        }
        Command::SyncDeposits { dry_run } => sync_deposits(&settings, dry_run).await,
        Command::ImportCommodities {
            gold,
            silver,
            dry_run,
        } => import_commodities(&settings, gold, silver, dry_run).await,
    };
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
    }
    result
}

async fn connect(settings: &Settings) -> anyhow::Result<sqlx::PgPool> {
    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    didim_core::storage::migrate(&pool).await?;
    Ok(pool)
}

async fn ingest_krx(
    settings: &Settings,
    date_arg: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let date = resolve_trading_date(date_arg, chrono::Utc::now())?;
    let client = KrxClient::from_settings(settings)?;

    if dry_run {
        let batch = ingest::collect_krx(&client, date).await;
        tracing::info!(
            %date,
            dry_run = true,
            stocks = batch.snapshot.stocks.len(),
            failed_markets = batch.failed_markets,
            "KRX ingest (dry-run)"
        );
        return Ok(());
    }

    let pool = connect(settings).await?;
    let Some(lock) = IngestLock::try_acquire(&pool, IngestJob::KrxDaily, date).await? else {
        tracing::warn!(%date, "KRX ingest lock not acquired; another run in progress");
        return Ok(());
    };

    let batch = ingest::collect_krx(&client, date).await;
    let stored = ingest::store_krx(&pool, &batch).await;
    lock.release().await?;
    let (stock_rows, price_rows) = stored?;

    tracing::info!(
        %date,
        stock_rows,
        price_rows,
        skipped = batch.snapshot.skipped,
        failed_markets = batch.failed_markets,
        "KRX ingest finished"
    );
    Ok(())
}

async fn sync_deposits(settings: &Settings, dry_run: bool) -> anyhow::Result<()> {
    let client = FssClient::from_settings(settings)?;

    if dry_run {
        let catalog = ingest::collect_deposits(&client).await;
        tracing::info!(
            dry_run = true,
            products = catalog.products.len(),
            options = catalog.options.len(),
            "FSS sync (dry-run)"
        );
        return Ok(());
    }

    let pool = connect(settings).await?;
    let today = kst_date(chrono::Utc::now());
    let Some(lock) = IngestLock::try_acquire(&pool, IngestJob::DepositCatalog, today).await? else {
        tracing::warn!("FSS sync lock not acquired; another run in progress");
        return Ok(());
    };

    let catalog = ingest::collect_deposits(&client).await;
    let stored = ingest::store_deposits(&pool, &catalog).await;
    lock.release().await?;
    let (products, options) = stored?;

    tracing::info!(products, options, "FSS sync finished");
    Ok(())
}

async fn import_commodities(
    settings: &Settings,
    gold: Option<PathBuf>,
    silver: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let inputs: Vec<(Commodity, PathBuf)> = [(Commodity::Gold, gold), (Commodity::Silver, silver)]
        .into_iter()
        .filter_map(|(commodity, path)| path.map(|p| (commodity, p)))
        .collect();
    anyhow::ensure!(!inputs.is_empty(), "pass --gold and/or --silver");

    let mut loaded = Vec::with_capacity(inputs.len());
    for (commodity, path) in &inputs {
        loaded.push((*commodity, ingest::load_commodity(*commodity, path)?));
    }
    if dry_run {
        tracing::info!(dry_run = true, files = loaded.len(), "commodity import (dry-run)");
        return Ok(());
    }

    let pool = connect(settings).await?;
    let today = kst_date(chrono::Utc::now());
    let Some(lock) = IngestLock::try_acquire(&pool, IngestJob::CommodityImport, today).await? else {
        tracing::warn!("commodity import lock not acquired; another run in progress");
        return Ok(());
    };

    let mut result = Ok(());
    for (commodity, records) in &loaded {
        match finance::upsert_commodity_prices(&pool, *commodity, records).await {
            Ok(rows) => {
                tracing::info!(commodity = commodity.as_str(), rows, "commodity prices stored")
            }
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    lock.release().await?;
    result
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
