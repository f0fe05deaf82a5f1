use crate::config::Settings;
use crate::domain::finance::ProductType;
use crate::ingest::types::{DepositOptionRecord, DepositProductRecord};
use anyhow::{bail, Context};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://finlife.fss.or.kr/finlifeapi";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const TOP_FIN_GRP_NO: &str = "020000";
// Guards against a provider that reports an absurd page count.
const MAX_PAGES: u32 = 50;

impl ProductType {
    fn fss_endpoint(self) -> &'static str {
        match self {
            ProductType::Deposit => "depositProductsSearch.json",
            ProductType::Saving => "savingProductsSearch.json",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FssCatalog {
    pub products: Vec<DepositProductRecord>,
    pub options: Vec<DepositOptionRecord>,
}

#[derive(Debug, Deserialize)]
struct FssEnvelope {
    #[serde(default)]
    result: FssResult,
}

#[derive(Debug, Default, Deserialize)]
struct FssResult {
    #[serde(default)]
    err_cd: Option<String>,
    #[serde(default)]
    err_msg: Option<String>,
    #[serde(default)]
    max_page_no: Option<Value>,
    #[serde(default, rename = "baseList")]
    base_list: Vec<Value>,
    #[serde(default, rename = "optionList")]
    option_list: Vec<Value>,
}

fn text(v: &Value, key: &str) -> String {
    match v.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn opt_text(v: &Value, key: &str) -> Option<String> {
    Some(text(v, key)).filter(|s| !s.is_empty())
}

fn opt_i64(v: &Value, key: &str) -> Option<i64> {
    match v.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn opt_decimal(v: &Value, key: &str) -> Option<Decimal> {
    match v.get(key)? {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn product_record(product_type: ProductType, item: &Value) -> Option<DepositProductRecord> {
    let fin_co_no = text(item, "fin_co_no");
    let fin_prdt_cd = text(item, "fin_prdt_cd");
    if fin_co_no.is_empty() || fin_prdt_cd.is_empty() {
        return None;
    }
    Some(DepositProductRecord {
        fin_co_no,
        fin_prdt_cd,
        kor_co_nm: text(item, "kor_co_nm"),
        fin_prdt_nm: text(item, "fin_prdt_nm"),
        product_type,
        join_way: text(item, "join_way"),
        mtrt_int: text(item, "mtrt_int"),
        spcl_cnd: text(item, "spcl_cnd"),
        join_deny: text(item, "join_deny"),
        join_member: text(item, "join_member"),
        etc_note: text(item, "etc_note"),
        max_limit: opt_i64(item, "max_limit"),
        dcls_strt_day: opt_text(item, "dcls_strt_day"),
        dcls_end_day: opt_text(item, "dcls_end_day"),
    })
}

fn option_record(item: &Value) -> Option<DepositOptionRecord> {
    let fin_prdt_cd = text(item, "fin_prdt_cd");
    if fin_prdt_cd.is_empty() {
        return None;
    }
    let intr_rate_type = opt_text(item, "intr_rate_type").unwrap_or_else(|| "S".to_string());
    Some(DepositOptionRecord {
        fin_co_no: text(item, "fin_co_no"),
        fin_prdt_cd,
        intr_rate_type,
        intr_rate_type_nm: text(item, "intr_rate_type_nm"),
        save_trm: opt_i64(item, "save_trm")
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0),
        intr_rate: opt_decimal(item, "intr_rate"),
        intr_rate2: opt_decimal(item, "intr_rate2"),
    })
}

#[derive(Debug, Clone)]
pub struct FssClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FssClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_fss_api_key()?.to_string();
        let base_url =
            std::env::var("FSS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, base_url)
    }

    pub fn new(api_key: String, base_url: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build FSS http client")?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_page(&self, product_type: ProductType, page: u32) -> anyhow::Result<FssResult> {
        let url = format!("{}/{}", self.base_url, product_type.fss_endpoint());
        let page_no = page.to_string();
        let res = self
            .http
            .get(url)
            .query(&[
                ("auth", self.api_key.as_str()),
                ("topFinGrpNo", TOP_FIN_GRP_NO),
                ("pageNo", page_no.as_str()),
            ])
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("FSS request failed")?;

        let status = res.status();
        if !status.is_success() {
            bail!("FSS HTTP {status} ({})", product_type.as_str());
        }
        let envelope = res
            .json::<FssEnvelope>()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to decode FSS response")?;
        let result = envelope.result;
        if let Some(code) = result.err_cd.as_deref().filter(|c| *c != "000") {
            bail!(
                "FSS error {code}: {}",
                result.err_msg.as_deref().unwrap_or("")
            );
        }
        Ok(result)
    }

    /// Walks every page of the catalog for one product type.
    pub async fn fetch_catalog(&self, product_type: ProductType) -> anyhow::Result<FssCatalog> {
        let mut catalog = FssCatalog::default();
        let mut page = 1u32;
        loop {
            let result = self.fetch_page(product_type, page).await?;
            let max_page = result
                .max_page_no
                .as_ref()
                .and_then(|v| v.as_u64().or_else(|| v.as_str()?.trim().parse().ok()))
                .unwrap_or(1)
                .min(u64::from(MAX_PAGES)) as u32;

            let before = catalog.products.len();
            catalog.products.extend(
                result
                    .base_list
                    .iter()
                    .filter_map(|item| product_record(product_type, item)),
            );
            let dropped = result.base_list.len() - (catalog.products.len() - before);
            if dropped > 0 {
                tracing::warn!(
                    product_type = product_type.as_str(),
                    page,
                    dropped,
                    "skipped FSS products without identifiers"
                );
            }
            catalog
                .options
                .extend(result.option_list.iter().filter_map(option_record));

            if page >= max_page {
                break;
            }
            page += 1;
        }

        if catalog.products.is_empty() {
            tracing::warn!(
                product_type = product_type.as_str(),
                "FSS returned an empty product list; check FSS_API_KEY"
            );
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn page(page_no: u32, max_page: u32, code: &str) -> String {
        json!({
            "result": {
                "prdt_div": "D",
                "total_count": "2",
                "max_page_no": max_page.to_string(),
                "now_page_no": page_no.to_string(),
                "err_cd": "000",
                "err_msg": "정상",
                "baseList": [{
                    "fin_co_no": "0010001",
                    "kor_co_nm": "우리은행",
                    "fin_prdt_cd": code,
                    "fin_prdt_nm": "WON플러스예금",
                    "join_way": "인터넷,스마트폰",
                    "mtrt_int": "만기 후 1개월: 기본금리의 50%",
                    "spcl_cnd": "없음",
                    "join_deny": "1",
                    "join_member": "실명의 개인",
                    "etc_note": "",
                    "max_limit": null,
                    "dcls_strt_day": "20261001",
                    "dcls_end_day": null
                }],
                "optionList": [{
                    "fin_co_no": "0010001",
                    "fin_prdt_cd": code,
                    "intr_rate_type": "S",
                    "intr_rate_type_nm": "단리",
                    "save_trm": "12",
                    "intr_rate": 3.1,
                    "intr_rate2": 3.45
                }]
            }
        })
        .to_string()
    }

    #[test]
    fn option_record_parses_string_and_number_fields() {
        let opt = option_record(&json!({
            "fin_co_no": "1", "fin_prdt_cd": "P", "save_trm": "24",
            "intr_rate": null, "intr_rate2": "3.20"
        }))
        .unwrap();
        assert_eq!(opt.save_trm, 24);
        assert_eq!(opt.intr_rate_type, "S");
        assert_eq!(opt.intr_rate, None);
        assert_eq!(opt.intr_rate2, Decimal::from_str("3.20").ok());
    }

    #[tokio::test]
    async fn fetch_catalog_walks_all_pages() {
        let mut server = mockito::Server::new_async().await;
        for n in 1..=2u32 {
            server
                .mock("GET", "/depositProductsSearch.json")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("auth".into(), "fss-key".into()),
                    Matcher::UrlEncoded("topFinGrpNo".into(), "020000".into()),
                    Matcher::UrlEncoded("pageNo".into(), n.to_string()),
                ]))
                .with_status(200)
                .with_body(page(n, 2, &format!("P{n}")))
                .create_async()
                .await;
        }

        let client = FssClient::new("fss-key".into(), server.url()).unwrap();
        let catalog = client.fetch_catalog(ProductType::Deposit).await.unwrap();
        assert_eq!(catalog.products.len(), 2);
        assert_eq!(catalog.options.len(), 2);
        assert_eq!(catalog.products[1].fin_prdt_cd, "P2");
        assert_eq!(catalog.products[0].product_type, ProductType::Deposit);
        assert_eq!(catalog.products[0].dcls_end_day, None);
        assert_eq!(catalog.options[0].intr_rate2, Decimal::from_str("3.45").ok());
    }

    #[tokio::test]
    async fn empty_base_list_yields_empty_catalog() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/savingProductsSearch.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"result": {"err_cd": "000", "baseList": [], "optionList": []}}).to_string(),
            )
            .create_async()
            .await;

        let client = FssClient::new("k".into(), server.url()).unwrap();
        let catalog = client.fetch_catalog(ProductType::Saving).await.unwrap();
        assert!(catalog.products.is_empty());
    }

    #[tokio::test]
    async fn provider_error_code_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/depositProductsSearch.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"result": {"err_cd": "010", "err_msg": "미등록인증키"}}).to_string())
            .create_async()
            .await;

        let client = FssClient::new("k".into(), server.url()).unwrap();
        let err = client.fetch_catalog(ProductType::Deposit).await.unwrap_err();
        assert!(err.to_string().contains("010"));
    }

    #[tokio::test]
    async fn transport_error_hides_auth_key() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let base_url = format!("http://127.0.0.1:{port}");
        let client = FssClient::new("FSS_SECRET".into(), base_url).unwrap();
        let err = client.fetch_catalog(ProductType::Deposit).await.unwrap_err();
        assert!(!format!("{err:?} {err:#}").contains("FSS_SECRET"));
    }
}
