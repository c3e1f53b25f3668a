use crate::domain::stock::Stock;
use crate::universe::snapshot::UniverseSnapshot;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorSummary {
    pub sector: String,
    pub stock_count: usize,
    pub avg_historical_cagr: Option<f64>,
    pub avg_pe_ratio: Option<f64>,
    pub avg_pb_ratio: Option<f64>,
    /// Lowest-ratio stock of the sector (ties by ticker).
    pub cheapest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSummary {
    pub as_of_date: Option<NaiveDate>,
    pub total_stocks: usize,
    pub sectors: Vec<String>,
    pub avg_historical_cagr: Option<f64>,
    pub avg_pe_ratio: Option<f64>,
    pub avg_pb_ratio: Option<f64>,
    /// Ordered by average historical CAGR, highest first.
    pub sector_summaries: Vec<SectorSummary>,
}

pub fn market_summary(snapshot: &UniverseSnapshot) -> MarketSummary {
    let mut by_sector: BTreeMap<&str, Vec<&Stock>> = BTreeMap::new();
    for stock in snapshot.stocks() {
        by_sector.entry(stock.sector.as_str()).or_default().push(stock);
    }

    let mut sector_summaries: Vec<SectorSummary> = by_sector
        .iter()
        .filter_map(|(sector, stocks)| {
            let cheapest = stocks.iter().min_by(|a, b| {
                a.peg_ratio
                    .total_cmp(&b.peg_ratio)
                    .then_with(|| a.ticker.cmp(&b.ticker))
            })?;
            Some(SectorSummary {
                sector: sector.to_string(),
                stock_count: stocks.len(),
                avg_historical_cagr: mean(stocks.iter().filter_map(|s| s.avg_historical_cagr)),
                avg_pe_ratio: mean(stocks.iter().filter_map(|s| s.pe_ratio)),
                avg_pb_ratio: mean(stocks.iter().filter_map(|s| s.pb_ratio)),
                cheapest: cheapest.ticker.clone(),
            })
        })
        .collect();

    sector_summaries.sort_by(|a, b| {
        let a_cagr = a.avg_historical_cagr.unwrap_or(f64::NEG_INFINITY);
        let b_cagr = b.avg_historical_cagr.unwrap_or(f64::NEG_INFINITY);
        b_cagr
            .total_cmp(&a_cagr)
            .then_with(|| a.sector.cmp(&b.sector))
    });

    let stocks = snapshot.stocks();
    MarketSummary {
        as_of_date: snapshot.as_of_date(),
        total_stocks: stocks.len(),
        sectors: by_sector.keys().map(|s| s.to_string()).collect(),
        avg_historical_cagr: mean(stocks.iter().filter_map(|s| s.avg_historical_cagr)),
        avg_pe_ratio: mean(stocks.iter().filter_map(|s| s.pe_ratio)),
        avg_pb_ratio: mean(stocks.iter().filter_map(|s| s.pb_ratio)),
        sector_summaries,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}
