use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const MAX_RELATED_STOCKS: usize = 4;
pub const ALLOWED_ACTIONS: [&str; 3] = ["매수", "관망", "매도"];

/// Raw shape of a stock analysis reply. Missing keys deserialize to empty
/// values and are rejected by validation.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmStockAnalysis {
    #[serde(default)]
    pub opinion: LlmOpinion,
    #[serde(default)]
    pub summary: LlmSummary,
    #[serde(default)]
    pub related_stocks: Vec<LlmRelatedStock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmOpinion {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmSummary {
    #[serde(default)]
    pub summary_1: String,
    #[serde(default)]
    pub summary_2: String,
    #[serde(default)]
    pub summary_3: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmRelatedStock {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAnalysis {
    pub opinion: Opinion,
    pub summary: Summary,
    pub related_stocks: Vec<RelatedStock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub action: String,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summary_1: String,
    pub summary_2: String,
    pub summary_3: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedStock {
    pub name: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LlmStockAnalysis {
    pub fn validate_and_into_analysis(
        self,
        analysed_ticker: &str,
    ) -> anyhow::Result<StockAnalysis> {
        let action = self.opinion.action.trim().to_string();
        ensure!(
            ALLOWED_ACTIONS.contains(&action.as_str()),
            "opinion.action must be one of {ALLOWED_ACTIONS:?} (got {action:?})"
        );
        let title = non_empty("opinion.title", &self.opinion.title)?;
        let reason = non_empty("opinion.reason", &self.opinion.reason)?;

        let summary = Summary {
            summary_1: non_empty("summary.summary_1", &self.summary.summary_1)?,
            summary_2: non_empty("summary.summary_2", &self.summary.summary_2)?,
            summary_3: non_empty("summary.summary_3", &self.summary.summary_3)?,
        };

        let analysed = analysed_ticker.trim();
        let mut seen = BTreeSet::new();
        let related_stocks = self
            .related_stocks
            .into_iter()
            .filter_map(|s| {
                let code = s.code.trim().to_string();
                let name = s.name.trim().to_string();
                if code.is_empty()
                    || name.is_empty()
                    || code == analysed
                    || !seen.insert(code.clone())
                {
                    return None;
                }
                let reason = s.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
                Some(RelatedStock { name, code, reason })
            })
            .take(MAX_RELATED_STOCKS)
            .collect();

        Ok(StockAnalysis {
            opinion: Opinion { action, title, reason },
            summary,
            related_stocks,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub deposit: i64,
    pub saving: i64,
    pub stock: i64,
    pub etf: i64,
}

impl Allocation {
    pub fn total(&self) -> i64 {
        self.deposit + self.saving + self.stock + self.etf
    }

    /// Rescales to integers summing to 100 using largest-remainder rounding.
    /// Ties on the remainder go to the earlier bucket.
    pub fn normalized(self) -> anyhow::Result<Self> {
        let values = [self.deposit, self.saving, self.stock, self.etf];
        for v in values {
            ensure!((0..=100).contains(&v), "allocation values must be within 0..=100 (got {v})");
        }
        let total = self.total();
        ensure!(total > 0, "allocation must have a positive sum");

        let mut floors = [0i64; 4];
        let mut remainders = [(0i64, 0usize); 4];
        for (i, v) in values.iter().enumerate() {
            floors[i] = v * 100 / total;
            remainders[i] = (v * 100 % total, i);
        }
        let mut missing = 100 - floors.iter().sum::<i64>();
        remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for (_, i) in remainders {
            if missing == 0 {
                break;
            }
            floors[i] += 1;
            missing -= 1;
        }

        Ok(Self {
            deposit: floors[0],
            saving: floors[1],
            stock: floors[2],
            etf: floors[3],
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmRecommendation {
    #[serde(default)]
    pub summary: String,
    pub allocation: Allocation,
    #[serde(default)]
    pub recommended_products: Vec<LlmProductPick>,
    #[serde(default)]
    pub recommended_stocks: Vec<LlmStockPick>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProductPick {
    pub product_id: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmStockPick {
    pub ticker: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub summary: String,
    pub allocation: Allocation,
    pub recommended_products: Vec<ProductPick>,
    pub recommended_stocks: Vec<StockPick>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPick {
    pub product_id: i64,
    pub name: String,
    pub bank: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPick {
    pub ticker: String,
    pub name: String,
    pub reason: String,
}

/// Lookup tables for the candidates offered to the model.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    /// product_id -> (name, bank)
    pub products: BTreeMap<i64, (String, String)>,
    /// ticker -> name
    pub stocks: BTreeMap<String, String>,
}

impl LlmRecommendation {
    pub fn validate_and_into_recommendation(
        self,
        candidates: &CandidateSet,
    ) -> anyhow::Result<Recommendation> {
        let summary = non_empty("summary", &self.summary)?;
        let allocation = self.allocation.normalized()?;

        let mut seen_products = BTreeSet::new();
        let recommended_products = self
            .recommended_products
            .into_iter()
            .filter_map(|pick| {
                let (name, bank) = candidates.products.get(&pick.product_id)?;
                if !seen_products.insert(pick.product_id) {
                    return None;
                }
                Some(ProductPick {
                    product_id: pick.product_id,
                    name: name.clone(),
                    bank: bank.clone(),
                    reason: pick.reason.trim().to_string(),
                })
            })
            .collect();

        let mut seen_tickers = BTreeSet::new();
        let recommended_stocks = self
            .recommended_stocks
            .into_iter()
            .filter_map(|pick| {
                let ticker = pick.ticker.trim().to_string();
                let name = candidates.stocks.get(&ticker)?;
                if !seen_tickers.insert(ticker.clone()) {
                    return None;
                }
                Some(StockPick {
                    ticker,
                    name: name.clone(),
                    reason: pick.reason.trim().to_string(),
                })
            })
            .collect();

        Ok(Recommendation {
            summary,
            allocation,
            recommended_products,
            recommended_stocks,
        })
    }
}

fn non_empty(field: &str, value: &str) -> anyhow::Result<String> {
    let v = value.trim();
    if v.is_empty() {
        bail!("{field} must be non-empty");
    }
    Ok(v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis_json(action: &str) -> serde_json::Value {
        json!({
            "opinion": {"action": action, "title": "성장 잠재력이 높아요.", "reason": "좋아요."},
            "summary": {"summary_1": "a", "summary_2": "b", "summary_3": "c"},
            "related_stocks": [
                {"name": "삼성전자", "code": "005930", "reason": "동일 업종"},
                {"name": "SK하이닉스", "code": "000660", "reason": "메모리"},
                {"name": "LG전자", "code": "066570"},
                {"name": "현대차", "code": "005380", "reason": " "},
                {"name": "기아", "code": "000270", "reason": "extra"},
            ]
        })
    }

    #[test]
    fn analysis_excludes_self_and_caps_related() {
        let raw: LlmStockAnalysis = serde_json::from_value(analysis_json("매수")).unwrap();
        let a = raw.validate_and_into_analysis("005930").unwrap();
        assert_eq!(a.opinion.action, "매수");
        let codes: Vec<_> = a.related_stocks.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, ["000660", "066570", "005380", "000270"]);
        assert_eq!(a.related_stocks[1].reason, None);
        assert_eq!(a.related_stocks[3].reason.as_deref(), Some("extra"));
    }

    #[test]
    fn analysis_rejects_unknown_action() {
        let raw: LlmStockAnalysis = serde_json::from_value(analysis_json("강력매수")).unwrap();
        assert!(raw.validate_and_into_analysis("005930").is_err());
    }

    #[test]
    fn analysis_rejects_missing_summary() {
        let raw: LlmStockAnalysis = serde_json::from_value(json!({
            "opinion": {"action": "관망", "title": "t", "reason": "r"},
            "summary": {"summary_1": "a", "summary_2": ""},
        }))
        .unwrap();
        assert!(raw.validate_and_into_analysis("005930").is_err());
    }

    #[test]
    fn allocation_normalizes_with_largest_remainder() {
        let a = Allocation { deposit: 1, saving: 1, stock: 1, etf: 0 }
            .normalized()
            .unwrap();
        assert_eq!(a, Allocation { deposit: 34, saving: 33, stock: 33, etf: 0 });
        assert_eq!(a.total(), 100);

        let b = Allocation { deposit: 30, saving: 20, stock: 40, etf: 10 }
            .normalized()
            .unwrap();
        assert_eq!(b, Allocation { deposit: 30, saving: 20, stock: 40, etf: 10 });

        let c = Allocation { deposit: 50, saving: 50, stock: 50, etf: 0 }
            .normalized()
            .unwrap();
        assert_eq!(c.total(), 100);
    }

    #[test]
    fn allocation_rejects_out_of_range_and_zero_sum() {
        assert!(Allocation { deposit: 0, saving: 0, stock: 0, etf: 0 }.normalized().is_err());
        assert!(Allocation { deposit: 120, saving: 0, stock: 0, etf: 0 }.normalized().is_err());
        assert!(Allocation { deposit: -5, saving: 50, stock: 0, etf: 0 }.normalized().is_err());
    }

    #[test]
    fn recommendation_drops_non_candidates() {
        let mut candidates = CandidateSet::default();
        candidates.products.insert(7, ("정기예금".into(), "국민은행".into()));
        candidates.stocks.insert("005930".into(), "삼성전자".into());

        let raw: LlmRecommendation = serde_json::from_value(json!({
            "summary": "균형 잡힌 포트폴리오",
            "allocation": {"deposit": 40, "saving": 20, "stock": 30, "etf": 10},
            "recommended_products": [
                {"product_id": 7, "reason": "금리"},
                {"product_id": 99, "reason": "없는 상품"},
                {"product_id": 7, "reason": "중복"}
            ],
            "recommended_stocks": [
                {"ticker": "005930", "reason": "대형주"},
                {"ticker": "999999", "reason": "없음"}
            ]
        }))
        .unwrap();

        let rec = raw.validate_and_into_recommendation(&candidates).unwrap();
        assert_eq!(rec.recommended_products.len(), 1);
        assert_eq!(rec.recommended_products[0].bank, "국민은행");
        assert_eq!(rec.recommended_stocks.len(), 1);
        assert_eq!(rec.recommended_stocks[0].name, "삼성전자");
        assert_eq!(rec.allocation.total(), 100);
    }
}
