//! Read-only browsing over a snapshot: filtered listing, search and top performers.
//!
//! Listings come back in rank order (ratio ascending, then ticker). Range filters exclude
//! stocks that lack the field.

use crate::domain::stock::{InvestmentStyle, RiskTier, Stock};
use crate::universe::snapshot::UniverseSnapshot;
use serde::Serialize;
use std::cmp::Ordering;

pub const DEFAULT_PAGE: usize = 50;
pub const MAX_PAGE: usize = 500;

/// Shortest accepted search term.
pub const MIN_SEARCH_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct StockFilter {
    /// Case-insensitive sector names; empty matches every sector.
    pub sectors: Vec<String>,
    pub styles: Vec<InvestmentStyle>,
    pub risk_tiers: Vec<RiskTier>,
    /// Historical CAGR bounds, as fractions.
    pub min_cagr: Option<f64>,
    pub max_cagr: Option<f64>,
    pub min_pe: Option<f64>,
    pub max_pe: Option<f64>,
    pub min_pb: Option<f64>,
    pub max_pb: Option<f64>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for StockFilter {
    fn default() -> Self {
        Self {
            sectors: Vec::new(),
            styles: Vec::new(),
            risk_tiers: Vec::new(),
            min_cagr: None,
            max_cagr: None,
            min_pe: None,
            max_pe: None,
            min_pb: None,
            max_pb: None,
            offset: 0,
            limit: DEFAULT_PAGE,
        }
    }
}

impl StockFilter {
    pub fn matches(&self, stock: &Stock) -> bool {
        if !self.sectors.is_empty()
            && !self
                .sectors
                .iter()
                .any(|s| s.trim().eq_ignore_ascii_case(&stock.sector))
        {
            return false;
        }
        if !self.styles.is_empty() && !self.styles.contains(&stock.style) {
            return false;
        }
        if !self.risk_tiers.is_empty() && !self.risk_tiers.contains(&stock.risk_tier) {
            return false;
        }
        within(stock.avg_historical_cagr, self.min_cagr, self.max_cagr)
            && within(stock.pe_ratio, self.min_pe, self.max_pe)
            && within(stock.pb_ratio, self.min_pb, self.max_pb)
    }
}

fn within(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(v) = value else {
        return false;
    };
    min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockPage {
    pub stocks: Vec<Stock>,
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

fn rank_order(a: &Stock, b: &Stock) -> Ordering {
    a.peg_ratio
        .total_cmp(&b.peg_ratio)
        .then_with(|| a.ticker.cmp(&b.ticker))
}

pub fn list_stocks(snapshot: &UniverseSnapshot, filter: &StockFilter) -> StockPage {
    let limit = filter.limit.clamp(1, MAX_PAGE);

    let mut matched: Vec<&Stock> = snapshot
        .stocks()
        .iter()
        .filter(|s| filter.matches(s))
        .collect();
    matched.sort_by(|a, b| rank_order(a, b));

    let total_count = matched.len();
    let stocks: Vec<Stock> = matched
        .into_iter()
        .skip(filter.offset)
        .take(limit)
        .cloned()
        .collect();

    StockPage {
        has_more: filter.offset + stocks.len() < total_count,
        stocks,
        total_count,
        offset: filter.offset,
        limit,
    }
}

/// Case-insensitive substring match on ticker or company name.
pub fn search_stocks(snapshot: &UniverseSnapshot, term: &str, limit: usize) -> Vec<Stock> {
    let needle = term.trim().to_ascii_lowercase();
    if needle.len() < MIN_SEARCH_LEN {
        return Vec::new();
    }

    let mut hits: Vec<&Stock> = snapshot
        .stocks()
        .iter()
        .filter(|s| {
            s.ticker.to_ascii_lowercase().contains(&needle)
                || s
                    .company_name
                    .as_deref()
                    .is_some_and(|n| n.to_ascii_lowercase().contains(&needle))
        })
        .collect();
    hits.sort_by(|a, b| rank_order(a, b));
    hits.into_iter().take(limit).cloned().collect()
}

/// Highest historical CAGR first; stocks without one are left out.
pub fn top_performers(
    snapshot: &UniverseSnapshot,
    limit: usize,
    sector: Option<&str>,
) -> Vec<Stock> {
    let mut ranked: Vec<(&Stock, f64)> = snapshot
        .stocks()
        .iter()
        .filter(|s| sector.map_or(true, |sec| s.sector.eq_ignore_ascii_case(sec.trim())))
        .filter_map(|s| s.avg_historical_cagr.map(|c| (s, c)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.ticker.cmp(&b.0.ticker)));
    ranked.into_iter().take(limit).map(|(s, _)| s.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::snapshot::fixtures::stock;

    fn universe() -> UniverseSnapshot {
        let mut a = stock("HDFCBANK", "Banks", 0.9, 0.12, 1_620.0);
        a.company_name = Some("HDFC Bank".to_string());
        a.avg_historical_cagr = Some(0.21);
        a.pe_ratio = Some(19.0);
        a.style = InvestmentStyle::Value;
        a.risk_tier = RiskTier::Low;

        let mut b = stock("ICICIBANK", "Banks", 0.7, 0.14, 1_150.0);
        b.company_name = Some("ICICI Bank".to_string());
        b.avg_historical_cagr = Some(0.25);
        b.pe_ratio = Some(17.0);

        let mut c = stock("TCS", "Technology", 1.2, 0.16, 3_450.0);
        c.company_name = Some("Tata Consultancy".to_string());
        c.avg_historical_cagr = Some(0.18);
        c.pe_ratio = Some(28.0);
        c.style = InvestmentStyle::Growth;

        let d = stock("NOCAGR", "Technology", 0.5, 0.10, 90.0);

        UniverseSnapshot::new(None, vec![a, b, c, d]).unwrap()
    }

    fn tickers(stocks: &[Stock]) -> Vec<&str> {
        stocks.iter().map(|s| s.ticker.as_str()).collect()
    }

    #[test]
    fn unfiltered_listing_is_in_rank_order() {
        let page = list_stocks(&universe(), &StockFilter::default());
        assert_eq!(tickers(&page.stocks), vec!["NOCAGR", "ICICIBANK", "HDFCBANK", "TCS"]);
        assert_eq!(page.total_count, 4);
        assert!(!page.has_more);
    }

    #[test]
    fn filters_combine_and_paginate() {
        let filter = StockFilter {
            sectors: vec!["banks".to_string()],
            max_pe: Some(18.0),
            ..StockFilter::default()
        };
        let page = list_stocks(&universe(), &filter);
        assert_eq!(tickers(&page.stocks), vec!["ICICIBANK"]);

        // A bound on a missing field excludes the stock.
        let filter = StockFilter {
            min_cagr: Some(0.0),
            ..StockFilter::default()
        };
        assert_eq!(list_stocks(&universe(), &filter).total_count, 3);

        let filter = StockFilter {
            offset: 1,
            limit: 2,
            ..StockFilter::default()
        };
        let page = list_stocks(&universe(), &filter);
        assert_eq!(tickers(&page.stocks), vec!["ICICIBANK", "HDFCBANK"]);
        assert!(page.has_more);
    }

    #[test]
    fn style_and_risk_filters() {
        let filter = StockFilter {
            styles: vec![InvestmentStyle::Growth],
            ..StockFilter::default()
        };
        assert_eq!(tickers(&list_stocks(&universe(), &filter).stocks), vec!["TCS"]);

        let filter = StockFilter {
            risk_tiers: vec![RiskTier::Low],
            ..StockFilter::default()
        };
        assert_eq!(tickers(&list_stocks(&universe(), &filter).stocks), vec!["HDFCBANK"]);
    }

    #[test]
    fn search_matches_ticker_or_company() {
        let hits = search_stocks(&universe(), "bank", 10);
        assert_eq!(tickers(&hits), vec!["ICICIBANK", "HDFCBANK"]);
        assert_eq!(tickers(&search_stocks(&universe(), "consult", 10)), vec!["TCS"]);
        assert!(search_stocks(&universe(), "t", 10).is_empty());
        assert_eq!(search_stocks(&universe(), "bank", 1).len(), 1);
    }

    #[test]
    fn top_performers_by_historical_cagr() {
        let top = top_performers(&universe(), 10, None);
        assert_eq!(tickers(&top), vec!["ICICIBANK", "HDFCBANK", "TCS"]);
        let top = top_performers(&universe(), 1, Some("Technology"));
        assert_eq!(tickers(&top), vec!["TCS"]);
    }
}
