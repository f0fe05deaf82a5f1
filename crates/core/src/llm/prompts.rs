use crate::domain::contract::CandidateSet;
use crate::domain::finance::ProductSummary;
use crate::domain::stock::{AssetType, Stock};
use crate::domain::survey::{RiskProfile, SurveyAnswers};
use serde_json::json;

pub fn analysis_prompt(ticker: &str, name: &str, asset_type: AssetType) -> String {
    let subject = match asset_type {
        AssetType::Stock => "기업",
        AssetType::Etf => "ETF",
    };
    format!(
        r#"당신은 주식 투자 어드바이저 '디딤 AI'입니다.
{subject} '{name} ({ticker})'를 분석하여 반드시 아래 JSON 포맷으로만 응답하세요.

[Task 1: 디딤 Comment (종합 투자의견)]
- action: '매수', '관망', '매도' 중 하나를 선택 (엄격 준수)
- title: 투자의견을 한 줄로 요약
- reason: 투자자를 위한 친절한 설명 (해요체, 2문장 이내)

[Task 2: 3줄 요약]
- summary_1: 개요 및 주력 사업 모델 (ETF라면 추종 지수와 구성)
- summary_2: 현재 시장 업황 및 주요 이슈
- summary_3: 미래 성장 동력 및 전망

[Task 3: 연관 종목 4선]
- 섹터/테마가 유사한 국내 상장 종목 4개
- 분석 대상({ticker})은 제외
- name: 종목명, code: 종목코드 (6자리), reason: 추천 이유 요약

[JSON Output Schema]
{{
  "opinion": {{"action": "매수", "title": "...", "reason": "..."}},
  "summary": {{"summary_1": "...", "summary_2": "...", "summary_3": "..."}},
  "related_stocks": [{{"name": "...", "code": "...", "reason": "..."}}]
}}"#
    )
}

/// Products and stocks the model may pick from.
#[derive(Debug, Clone, Default)]
pub struct RecommendationCandidates {
    pub deposits: Vec<ProductSummary>,
    pub savings: Vec<ProductSummary>,
    pub stocks: Vec<Stock>,
}

impl RecommendationCandidates {
    pub fn candidate_set(&self) -> CandidateSet {
        let mut set = CandidateSet::default();
        for p in self.deposits.iter().chain(&self.savings) {
            set.products
                .insert(p.id, (p.fin_prdt_nm.clone(), p.kor_co_nm.clone()));
        }
        for s in &self.stocks {
            set.stocks.insert(s.ticker.clone(), s.name.clone());
        }
        set
    }

    pub fn to_json(&self) -> serde_json::Value {
        let product = |p: &ProductSummary| {
            json!({
                "product_id": p.id,
                "name": p.fin_prdt_nm,
                "bank": p.kor_co_nm,
                "max_rate": p.max_rate,
            })
        };
        json!({
            "deposits": self.deposits.iter().map(product).collect::<Vec<_>>(),
            "savings": self.savings.iter().map(product).collect::<Vec<_>>(),
            "stocks": self.stocks.iter().map(|s| json!({
                "ticker": s.ticker,
                "name": s.name,
                "asset_type": s.asset_type,
                "market_cap": s.market_cap,
            })).collect::<Vec<_>>(),
        })
    }
}

pub fn recommendation_prompt(
    answers: &SurveyAnswers,
    risk_score: i64,
    profile: RiskProfile,
    candidates: &RecommendationCandidates,
) -> String {
    let survey = serde_json::to_string_pretty(answers).unwrap_or_default();
    let candidates_json = serde_json::to_string_pretty(&candidates.to_json()).unwrap_or_default();
    format!(
        r#"당신은 자산관리 어드바이저 '디딤 AI'입니다.
아래 사용자 설문과 후보 상품을 바탕으로 자산 배분과 상품을 추천하고, 반드시 JSON으로만 응답하세요.

[사용자 설문]
{survey}

[투자 성향]
- risk_score: {risk_score} / 100
- risk_profile: {label}

[후보 상품]
{candidates_json}

[규칙]
- allocation 값은 0~100 정수이며 합이 100이 되도록 할 것
- recommended_products 는 후보의 product_id 만 사용
- recommended_stocks 는 후보의 ticker 만 사용

[JSON Output Schema]
{{
  "summary": "...",
  "allocation": {{"deposit": 40, "saving": 20, "stock": 30, "etf": 10}},
  "recommended_products": [{{"product_id": 1, "reason": "..."}}],
  "recommended_stocks": [{{"ticker": "005930", "reason": "..."}}]
}}"#,
        label = profile.label(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_prompt_names_subject() {
        let p = analysis_prompt("069500", "KODEX 200", AssetType::Etf);
        assert!(p.contains("ETF 'KODEX 200 (069500)'"));
        assert!(p.contains("\"opinion\""));
    }

    #[test]
    fn candidate_set_indexes_products_and_stocks() {
        let candidates = RecommendationCandidates {
            deposits: vec![ProductSummary {
                id: 3,
                fin_co_no: "0010001".into(),
                fin_prdt_cd: "P1".into(),
                kor_co_nm: "우리은행".into(),
                fin_prdt_nm: "WON플러스예금".into(),
                product_type: "deposit".into(),
                max_rate: None,
                is_joined: false,
            }],
            savings: vec![],
            stocks: vec![Stock {
                ticker: "005930".into(),
                name: "삼성전자".into(),
                asset_type: "STOCK".into(),
                market_type: "KOSPI".into(),
                market_cap: Some(1),
                total_shares: None,
            }],
        };
        let set = candidates.candidate_set();
        assert_eq!(set.products[&3].1, "우리은행");
        assert_eq!(set.stocks["005930"], "삼성전자");
        assert_eq!(candidates.to_json()["deposits"][0]["product_id"], 3);
    }
}
