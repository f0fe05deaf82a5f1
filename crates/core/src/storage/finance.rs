use crate::domain::finance::{
    max_rate, Commodity, CommodityPrice, DepositFilter, DepositOption, DepositProduct,
    ProductDetail, ProductSummary, ProductType, UserProductView,
};
use crate::ingest::types::{CommodityRecord, DepositOptionRecord, DepositProductRecord};
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};

use super::stocks::escape_like;
use super::upsert_chunk_size;

const SUMMARY_COLUMNS: &str =
    "p.id, p.fin_co_no, p.fin_prdt_cd, p.kor_co_nm, p.fin_prdt_nm, p.product_type, \
     (SELECT MAX(o.intr_rate2) FROM deposit_options o WHERE o.product_id = p.id) AS max_rate, \
     EXISTS (SELECT 1 FROM user_products up \
       WHERE up.product_id = p.id AND up.user_id = $1) AS is_joined";

const OPTION_COLUMNS: &str =
    "id, product_id, intr_rate_type, intr_rate_type_nm, save_trm, intr_rate, intr_rate2";

#[derive(Debug)]
pub enum JoinOutcome {
    Joined(UserProductView),
    AlreadyJoined,
    ProductNotFound,
}

/// Upserts products, then their options matched on (fin_co_no, fin_prdt_cd).
/// Options whose product is not in `products` are dropped.
pub async fn upsert_catalog(
    pool: &PgPool,
    products: &[DepositProductRecord],
    options: &[DepositOptionRecord],
) -> anyhow::Result<(u64, u64)> {
    let products: BTreeMap<(&str, &str), &DepositProductRecord> = products
        .iter()
        .map(|p| ((p.fin_co_no.as_str(), p.fin_prdt_cd.as_str()), p))
        .collect();
    let products: Vec<_> = products.into_values().collect();
    let chunk_size = upsert_chunk_size()?;

    let mut tx = pool.begin().await.context("begin transaction failed")?;
    let mut ids: HashMap<(String, String), i64> = HashMap::new();
    for chunk in products.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO deposit_products (fin_co_no, fin_prdt_cd, kor_co_nm, fin_prdt_nm, \
             product_type, join_way, mtrt_int, spcl_cnd, join_deny, join_member, etc_note, \
             max_limit, dcls_strt_day, dcls_end_day) ",
        );
        qb.push_values(chunk, |mut b, p| {
            b.push_bind(&p.fin_co_no)
                .push_bind(&p.fin_prdt_cd)
                .push_bind(&p.kor_co_nm)
                .push_bind(&p.fin_prdt_nm)
                .push_bind(p.product_type.as_str())
                .push_bind(&p.join_way)
                .push_bind(&p.mtrt_int)
                .push_bind(&p.spcl_cnd)
                .push_bind(&p.join_deny)
                .push_bind(&p.join_member)
                .push_bind(&p.etc_note)
                .push_bind(p.max_limit)
                .push_bind(&p.dcls_strt_day)
                .push_bind(&p.dcls_end_day);
        });
        qb.push(
            " ON CONFLICT (fin_co_no, fin_prdt_cd) DO UPDATE SET kor_co_nm = EXCLUDED.kor_co_nm, \
               fin_prdt_nm = EXCLUDED.fin_prdt_nm, product_type = EXCLUDED.product_type, \
               join_way = EXCLUDED.join_way, mtrt_int = EXCLUDED.mtrt_int, \
               spcl_cnd = EXCLUDED.spcl_cnd, \
               join_deny = EXCLUDED.join_deny, join_member = EXCLUDED.join_member, \
               etc_note = EXCLUDED.etc_note, max_limit = EXCLUDED.max_limit, \
               dcls_strt_day = EXCLUDED.dcls_strt_day, dcls_end_day = EXCLUDED.dcls_end_day, \
               updated_at = now() \
             RETURNING id, fin_co_no, fin_prdt_cd",
        );
        let rows: Vec<(i64, String, String)> = qb
            .build_query_as()
            .persistent(false)
            .fetch_all(&mut *tx)
            .await
            .context("batch upsert deposit_products failed")?;
        for (id, co, cd) in rows {
            ids.insert((co, cd), id);
        }
    }

    let mut keyed: BTreeMap<(i64, i32, &str), &DepositOptionRecord> = BTreeMap::new();
    for o in options {
        match ids.get(&(o.fin_co_no.clone(), o.fin_prdt_cd.clone())) {
            Some(&product_id) => {
                keyed.insert((product_id, o.save_trm, o.intr_rate_type.as_str()), o);
            }
            None => {
                tracing::debug!(fin_prdt_cd = %o.fin_prdt_cd, "option without matching product")
            }
        }
    }
    let keyed: Vec<_> = keyed.into_iter().collect();

    let mut option_rows: u64 = 0;
    for chunk in keyed.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO deposit_options \
             (product_id, save_trm, intr_rate_type, intr_rate_type_nm, intr_rate, intr_rate2) ",
        );
        qb.push_values(chunk, |mut b, ((product_id, save_trm, rate_type), o)| {
            b.push_bind(*product_id)
                .push_bind(*save_trm)
                .push_bind(*rate_type)
                .push_bind(&o.intr_rate_type_nm)
                .push_bind(o.intr_rate)
                .push_bind(o.intr_rate2);
        });
        qb.push(
            " ON CONFLICT (product_id, save_trm, intr_rate_type) DO UPDATE SET \
               intr_rate_type_nm = EXCLUDED.intr_rate_type_nm, intr_rate = EXCLUDED.intr_rate, \
               intr_rate2 = EXCLUDED.intr_rate2",
        );
        option_rows += qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert deposit_options failed")?
            .rows_affected();
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok((ids.len() as u64, option_rows))
}

/// Products ordered by best rate, nulls last. `viewer` drives `is_joined`.
pub async fn list_products(
    pool: &PgPool,
    filter: &DepositFilter,
    viewer: Option<i64>,
    limit: Option<i64>,
) -> anyhow::Result<Vec<ProductSummary>> {
    let product_type = filter.product_type.unwrap_or(ProductType::Deposit);
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));
    let bank = filter
        .bank
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));

    sqlx::query_as::<_, ProductSummary>(&format!(
        "SELECT * FROM (SELECT {SUMMARY_COLUMNS} FROM deposit_products p \
           WHERE p.product_type = $2 \
             AND ($3::TEXT IS NULL OR p.fin_prdt_nm ILIKE $3) \
             AND ($4::TEXT IS NULL OR p.kor_co_nm ILIKE $4)) t \
         ORDER BY max_rate DESC NULLS LAST, id LIMIT $5"
    ))
    .bind(viewer)
    .bind(product_type.as_str())
    .bind(search)
    .bind(bank)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select deposit products failed")
}

async fn options_for(pool: &PgPool, product_id: i64) -> anyhow::Result<Vec<DepositOption>> {
    sqlx::query_as::<_, DepositOption>(&format!(
        "SELECT {OPTION_COLUMNS} FROM deposit_options WHERE product_id = $1 \
         ORDER BY save_trm, intr_rate_type"
    ))
    .bind(product_id)
    .fetch_all(pool)
    .await
    .context("select deposit options failed")
}

pub async fn product_detail(
    pool: &PgPool,
    product_id: i64,
    viewer: Option<i64>,
) -> anyhow::Result<Option<ProductDetail>> {
    let product = sqlx::query_as::<_, DepositProduct>(
        "SELECT id, fin_co_no, fin_prdt_cd, kor_co_nm, fin_prdt_nm, product_type, join_way, \
         mtrt_int, spcl_cnd, join_deny, join_member, etc_note, max_limit, dcls_strt_day, \
         dcls_end_day FROM deposit_products WHERE id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await
    .context("select deposit product failed")?;
    let Some(product) = product else {
        return Ok(None);
    };

    let options = options_for(pool, product_id).await?;
    let is_joined = match viewer {
        Some(user_id) => is_joined(pool, user_id, product_id).await?,
        None => false,
    };
    Ok(Some(ProductDetail {
        max_rate: max_rate(&options),
        product,
        options,
        is_joined,
    }))
}

async fn is_joined(pool: &PgPool, user_id: i64, product_id: i64) -> anyhow::Result<bool> {
    let (joined,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM user_products WHERE user_id = $1 AND product_id = $2)",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(pool)
    .await
    .context("select user product failed")?;
    Ok(joined)
}

#[derive(Debug, sqlx::FromRow)]
struct UserProductRow {
    up_id: i64,
    option_id: Option<i64>,
    joined_at: DateTime<Utc>,
    memo: String,
    #[sqlx(flatten)]
    product: ProductSummary,
}

pub async fn my_products(pool: &PgPool, user_id: i64) -> anyhow::Result<Vec<UserProductView>> {
    let rows = sqlx::query_as::<_, UserProductRow>(&format!(
        "SELECT up.id AS up_id, up.option_id, up.joined_at, up.memo, {SUMMARY_COLUMNS} \
         FROM user_products up JOIN deposit_products p ON p.id = up.product_id \
         WHERE up.user_id = $1 ORDER BY up.joined_at DESC, up.id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select user products failed")?;

    let option_ids: Vec<i64> = rows.iter().filter_map(|r| r.option_id).collect();
    let options: HashMap<i64, DepositOption> = if option_ids.is_empty() {
        HashMap::new()
    } else {
        sqlx::query_as::<_, DepositOption>(&format!(
            "SELECT {OPTION_COLUMNS} FROM deposit_options WHERE id = ANY($1)"
        ))
        .bind(&option_ids)
        .fetch_all(pool)
        .await
        .context("select joined options failed")?
        .into_iter()
        .map(|o| (o.id, o))
        .collect()
    };

    Ok(rows
        .into_iter()
        .map(|r| UserProductView {
            id: r.up_id,
            option: r.option_id.and_then(|id| options.get(&id).cloned()),
            product: r.product,
            joined_at: r.joined_at,
            memo: r.memo,
        })
        .collect())
}

/// An option that belongs to another product is stored as no option.
pub async fn join_product(
    pool: &PgPool,
    user_id: i64,
    product_id: i64,
    option_id: Option<i64>,
    memo: &str,
) -> anyhow::Result<JoinOutcome> {
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM deposit_products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(pool)
            .await
            .context("select deposit product failed")?;
    if !exists {
        return Ok(JoinOutcome::ProductNotFound);
    }

    let res = sqlx::query(
        "INSERT INTO user_products (user_id, product_id, option_id, memo) \
         VALUES ($1, $2, (SELECT id FROM deposit_options WHERE id = $3 AND product_id = $2), $4) \
         ON CONFLICT (user_id, product_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(product_id)
    .bind(option_id)
    .bind(memo)
    .execute(pool)
    .await
    .context("insert user product failed")?;
    if res.rows_affected() == 0 {
        return Ok(JoinOutcome::AlreadyJoined);
    }

    let joined = my_products(pool, user_id)
        .await?
        .into_iter()
        .find(|v| v.product.id == product_id)
        .context("joined product vanished")?;
    Ok(JoinOutcome::Joined(joined))
}

pub async fn leave_product(pool: &PgPool, user_id: i64, product_id: i64) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM user_products WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await
        .context("delete user product failed")?;
    Ok(res.rows_affected() > 0)
}

/// Newest first.
pub async fn commodity_history(
    pool: &PgPool,
    commodity: Commodity,
    limit: i64,
) -> anyhow::Result<Vec<CommodityPrice>> {
    sqlx::query_as::<_, CommodityPrice>(&format!(
        "SELECT date, close_price, open_price, high_price, low_price, volume FROM {} \
         ORDER BY date DESC LIMIT $1",
        commodity.table()
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
    .with_context(|| format!("select {} failed", commodity.table()))
}

pub async fn upsert_commodity_prices(
    pool: &PgPool,
    commodity: Commodity,
    records: &[CommodityRecord],
) -> anyhow::Result<u64> {
    let by_date: BTreeMap<_, _> = records.iter().map(|r| (r.date, r)).collect();
    let records: Vec<_> = by_date.into_values().collect();
    let chunk_size = upsert_chunk_size()?;

    let mut tx = pool.begin().await.context("begin transaction failed")?;
    let mut affected: u64 = 0;
    for chunk in records.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(format!(
            "INSERT INTO {} (date, close_price, open_price, high_price, low_price, volume) ",
            commodity.table()
        ));
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.date)
                .push_bind(r.close_price)
                .push_bind(r.open_price)
                .push_bind(r.high_price)
                .push_bind(r.low_price)
                .push_bind(r.volume);
        });
        qb.push(
            " ON CONFLICT (date) DO UPDATE SET close_price = EXCLUDED.close_price, \
               open_price = EXCLUDED.open_price, high_price = EXCLUDED.high_price, \
               low_price = EXCLUDED.low_price, volume = EXCLUDED.volume",
        );
        affected += qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("batch upsert {} failed", commodity.table()))?
            .rows_affected();
    }
    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}
