use crate::config::Settings;
use crate::domain::stock::AssetType;
use crate::ingest::types::{DailyPriceRecord, StockRecord};
use anyhow::{bail, Context};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://data-dbg.krx.co.kr/svc/apis";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KrxMarket {
    Kospi,
    Kosdaq,
    Etf,
}

impl KrxMarket {
    pub const ALL: [KrxMarket; 3] = [KrxMarket::Kospi, KrxMarket::Kosdaq, KrxMarket::Etf];

    pub fn path(self) -> &'static str {
        match self {
            KrxMarket::Kospi => "sto/stk_bydd_trd",
            KrxMarket::Kosdaq => "sto/ksq_bydd_trd",
            KrxMarket::Etf => "etp/etf_bydd_trd",
        }
    }

    pub fn asset_type(self) -> AssetType {
        match self {
            KrxMarket::Etf => AssetType::Etf,
            _ => AssetType::Stock,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            KrxMarket::Kospi => "KOSPI",
            KrxMarket::Kosdaq => "KOSDAQ",
            KrxMarket::Etf => "ETF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kospi" => Some(KrxMarket::Kospi),
            "kosdaq" => Some(KrxMarket::Kosdaq),
            "etf" => Some(KrxMarket::Etf),
            _ => None,
        }
    }

    /// Parses a comma list such as `kospi,etf`. Unknown names are an error.
    pub fn parse_list(s: &str) -> anyhow::Result<Vec<Self>> {
        let mut out = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some(market) = Self::parse(part) else {
                bail!("unknown KRX market {part:?} (expected kospi, kosdaq or etf)");
            };
            if !out.contains(&market) {
                out.push(market);
            }
        }
        if out.is_empty() {
            bail!("KRX_MARKETS selects no market");
        }
        Ok(out)
    }
}

/// One `OutBlock_1` entry. Every field arrives as a string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct KrxRow {
    #[serde(default)]
    pub isu_cd: Option<String>,
    #[serde(default)]
    pub isu_nm: Option<String>,
    #[serde(default)]
    pub mkt_nm: Option<String>,
    #[serde(default)]
    pub list_shrs: Option<String>,
    #[serde(default)]
    pub mktcap: Option<String>,
    #[serde(default)]
    pub tdd_clsprc: Option<String>,
    #[serde(default)]
    pub tdd_opnprc: Option<String>,
    #[serde(default)]
    pub tdd_hgprc: Option<String>,
    #[serde(default)]
    pub tdd_lwprc: Option<String>,
    #[serde(default)]
    pub acc_trdvol: Option<String>,
    #[serde(default)]
    pub acc_trdval: Option<String>,
    #[serde(default)]
    pub cmpprevdd_prc: Option<String>,
    #[serde(default)]
    pub fluc_rt: Option<String>,
    #[serde(default)]
    pub nav: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KrxEnvelope {
    #[serde(default, rename = "OutBlock_1")]
    out_block: Vec<KrxRow>,
}

fn cleaned(value: Option<&str>) -> Option<String> {
    let v = value?.trim().replace(',', "");
    if v.is_empty() || v == "-" {
        return None;
    }
    Some(v)
}

/// Blank and `-` become None. Fractional values are truncated.
pub fn opt_int(value: Option<&str>) -> Option<i64> {
    let v = cleaned(value)?;
    v.parse::<i64>()
        .ok()
        .or_else(|| Decimal::from_str(&v).ok().and_then(|d| i64::try_from(d.trunc()).ok()))
}

pub fn req_int(value: Option<&str>) -> i64 {
    opt_int(value).unwrap_or(0)
}

pub fn opt_decimal(value: Option<&str>) -> Option<Decimal> {
    Decimal::from_str(&cleaned(value)?).ok()
}

#[derive(Debug, Clone, Default)]
pub struct ParsedMarket {
    pub stocks: Vec<StockRecord>,
    pub prices: Vec<DailyPriceRecord>,
    pub skipped: usize,
}

pub fn parse_rows(market: KrxMarket, date: NaiveDate, rows: Vec<KrxRow>) -> ParsedMarket {
    let mut out = ParsedMarket::default();
    for row in rows {
        let ticker = row.isu_cd.as_deref().map(str::trim).unwrap_or("");
        let name = row.isu_nm.as_deref().map(str::trim).unwrap_or("");
        if ticker.is_empty() || name.is_empty() {
            tracing::warn!(
                market = market.label(),
                %date,
                "skipping KRX row without ticker or name"
            );
            out.skipped += 1;
            continue;
        }

        let market_type = row
            .mkt_nm
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(market.label())
            .to_string();
        let nav = match market.asset_type() {
            AssetType::Etf => opt_decimal(row.nav.as_deref()),
            AssetType::Stock => None,
        };

        out.stocks.push(StockRecord {
            ticker: ticker.to_string(),
            name: name.to_string(),
            asset_type: market.asset_type(),
            market_type,
            market_cap: opt_int(row.mktcap.as_deref()),
            total_shares: opt_int(row.list_shrs.as_deref()),
        });
        out.prices.push(DailyPriceRecord {
            ticker: ticker.to_string(),
            date,
            open_price: req_int(row.tdd_opnprc.as_deref()),
            high_price: req_int(row.tdd_hgprc.as_deref()),
            low_price: req_int(row.tdd_lwprc.as_deref()),
            close_price: req_int(row.tdd_clsprc.as_deref()),
            fluctuation_rate: opt_decimal(row.fluc_rt.as_deref()),
            volume: req_int(row.acc_trdvol.as_deref()),
            trading_value: opt_int(row.acc_trdval.as_deref()),
            change: opt_int(row.cmpprevdd_prc.as_deref()),
            nav,
        });
    }
    out
}

#[derive(Debug, Clone)]
pub struct KrxClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    markets: Vec<KrxMarket>,
}

impl KrxClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_krx_api_key()?.to_string();
        let base_url =
            std::env::var("KRX_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let markets = match std::env::var("KRX_MARKETS") {
            Ok(v) => KrxMarket::parse_list(&v)?,
            Err(_) => KrxMarket::ALL.to_vec(),
        };
        let timeout_secs = std::env::var("KRX_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(api_key, base_url, markets, Duration::from_secs(timeout_secs))
    }

    pub fn new(
        api_key: String,
        base_url: String,
        markets: Vec<KrxMarket>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build KRX http client")?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            markets,
        })
    }

    pub fn markets(&self) -> &[KrxMarket] {
        &self.markets
    }

    pub async fn fetch_daily(
        &self,
        market: KrxMarket,
        date: NaiveDate,
    ) -> anyhow::Result<ParsedMarket> {
        let url = format!("{}/{}", self.base_url, market.path());
        let bas_dd = date.format("%Y%m%d").to_string();
        let res = self
            .http
            .get(url)
            .header("AUTH_KEY", &self.api_key)
            .query(&[("basDd", bas_dd.as_str())])
            .send()
            .await
            .with_context(|| format!("KRX request failed (market={})", market.label()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read KRX response")?;
        if !status.is_success() {
            bail!("KRX HTTP {status} (market={}): {text}", market.label());
        }
        let envelope = serde_json::from_str::<KrxEnvelope>(&text).with_context(|| {
            format!("KRX response is not valid JSON (market={})", market.label())
        })?;
        Ok(parse_rows(market, date, envelope.out_block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 13).unwrap()
    }

    #[test]
    fn number_cleaning() {
        assert_eq!(opt_int(Some("1,234,567")), Some(1_234_567));
        assert_eq!(opt_int(Some("-")), None);
        assert_eq!(opt_int(Some("")), None);
        assert_eq!(opt_int(Some("-1,500")), Some(-1500));
        assert_eq!(req_int(Some("-")), 0);
        assert_eq!(req_int(None), 0);
        assert_eq!(opt_decimal(Some("-2.35")), Decimal::from_str("-2.35").ok());
        assert_eq!(opt_decimal(Some("12,345.67")), Decimal::from_str("12345.67").ok());
    }

    #[test]
    fn market_list_parsing() {
        assert_eq!(
            KrxMarket::parse_list("kospi, ETF,kospi").unwrap(),
            vec![KrxMarket::Kospi, KrxMarket::Etf]
        );
        assert!(KrxMarket::parse_list("nasdaq").is_err());
        assert!(KrxMarket::parse_list(" , ").is_err());
    }

    #[test]
    fn parse_rows_skips_rows_without_identity() {
        let rows: Vec<KrxRow> = serde_json::from_value(json!([
            {"ISU_CD": "005930", "ISU_NM": "삼성전자", "MKT_NM": "KOSPI", "TDD_CLSPRC": "71,000",
             "TDD_OPNPRC": "70,500", "TDD_HGPRC": "71,200", "TDD_LWPRC": "70,100",
             "ACC_TRDVOL": "12,345,678", "ACC_TRDVAL": "-", "CMPPREVDD_PRC": "500",
             "FLUC_RT": "0.71", "MKTCAP": "423,000,000,000,000", "LIST_SHRS": "5,969,782,550",
             "NAV": "1.0"},
            {"ISU_CD": "", "ISU_NM": "이름만"},
            {"ISU_NM": "코드없음"}
        ]))
        .unwrap();

        let parsed = parse_rows(KrxMarket::Kospi, date(), rows);
        assert_eq!(parsed.skipped, 2);
        assert_eq!(parsed.stocks.len(), 1);
        let price = &parsed.prices[0];
        assert_eq!(price.close_price, 71_000);
        assert_eq!(price.trading_value, None);
        assert_eq!(price.fluctuation_rate, Decimal::from_str("0.71").ok());
        // NAV is only kept for ETFs.
        assert_eq!(price.nav, None);
        assert_eq!(parsed.stocks[0].market_cap, Some(423_000_000_000_000));
    }

    #[test]
    fn etf_rows_default_market_and_keep_nav() {
        let rows: Vec<KrxRow> = serde_json::from_value(json!([
            {"ISU_CD": "069500", "ISU_NM": "KODEX 200", "TDD_CLSPRC": "35,000", "NAV": "35,012.34"}
        ]))
        .unwrap();
        let parsed = parse_rows(KrxMarket::Etf, date(), rows);
        assert_eq!(parsed.stocks[0].market_type, "ETF");
        assert_eq!(parsed.stocks[0].asset_type, AssetType::Etf);
        assert_eq!(parsed.prices[0].nav, Decimal::from_str("35012.34").ok());
        assert_eq!(parsed.prices[0].open_price, 0);
    }

    #[tokio::test]
    async fn fetch_daily_sends_key_and_date() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sto/ksq_bydd_trd")
            .match_header("auth_key", "krx-key")
            .match_query(Matcher::UrlEncoded("basDd".into(), "20261013".into()))
            .with_status(200)
            .with_body(
                json!({"OutBlock_1": [
                    {"ISU_CD": "247540", "ISU_NM": "에코프로비엠", "MKT_NM": "KOSDAQ"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let client = KrxClient::new(
            "krx-key".into(),
            server.url(),
            vec![KrxMarket::Kosdaq],
            Duration::from_secs(5),
        )
        .unwrap();
        let parsed = client.fetch_daily(KrxMarket::Kosdaq, date()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(parsed.stocks[0].market_type, "KOSDAQ");
    }

    #[tokio::test]
    async fn fetch_daily_fails_on_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sto/stk_bydd_trd")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("{\"respMsg\":\"Unauthorized\"}")
            .create_async()
            .await;
        let client =
            KrxClient::new("bad".into(), server.url(), vec![], Duration::from_secs(5)).unwrap();
        assert!(client.fetch_daily(KrxMarket::Kospi, date()).await.is_err());
    }
}
