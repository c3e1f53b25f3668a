use crate::domain::stock::{Horizon, Stock};
use crate::error::UniverseError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable view of the stock universe. Every plan computation reads one snapshot in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotFile", into = "SnapshotFile")]
pub struct UniverseSnapshot {
    as_of_date: Option<NaiveDate>,
    stocks: Vec<Stock>,
    by_ticker: BTreeMap<String, usize>,
}

/// On-disk shape of a snapshot (the canonical JSON written by the worker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub as_of_date: Option<NaiveDate>,
    pub stocks: Vec<Stock>,
}

impl UniverseSnapshot {
    pub fn new(as_of_date: Option<NaiveDate>, stocks: Vec<Stock>) -> Result<Self, UniverseError> {
        let mut by_ticker = BTreeMap::new();
        for (idx, stock) in stocks.iter().enumerate() {
            validate_stock(stock)?;
            if by_ticker.insert(stock.ticker.clone(), idx).is_some() {
                return Err(UniverseError::DuplicateTicker(stock.ticker.clone()));
            }
        }

        Ok(Self {
            as_of_date,
            stocks,
            by_ticker,
        })
    }

    pub fn empty() -> Self {
        Self {
            as_of_date: None,
            stocks: Vec::new(),
            by_ticker: BTreeMap::new(),
        }
    }

    pub fn as_of_date(&self) -> Option<NaiveDate> {
        self.as_of_date
    }

    pub fn stocks(&self) -> &[Stock] {
        &self.stocks
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<&Stock> {
        self.by_ticker.get(ticker).map(|&idx| &self.stocks[idx])
    }

    pub fn sectors(&self) -> BTreeSet<&str> {
        self.stocks.iter().map(|s| s.sector.as_str()).collect()
    }

    /// Stocks that carry a forecast for `horizon`, paired with that forecast.
    pub fn with_forecast(&self, horizon: Horizon) -> impl Iterator<Item = (&Stock, f64)> {
        self.stocks
            .iter()
            .filter_map(move |s| s.expected_return(horizon).map(|r| (s, r)))
    }
}

impl TryFrom<SnapshotFile> for UniverseSnapshot {
    type Error = UniverseError;

    fn try_from(file: SnapshotFile) -> Result<Self, Self::Error> {
        UniverseSnapshot::new(file.as_of_date, file.stocks)
    }
}

impl From<UniverseSnapshot> for SnapshotFile {
    fn from(snapshot: UniverseSnapshot) -> Self {
        SnapshotFile {
            as_of_date: snapshot.as_of_date,
            stocks: snapshot.stocks,
        }
    }
}

fn validate_stock(stock: &Stock) -> Result<(), UniverseError> {
    let invalid = |reason: String| UniverseError::InvalidStock {
        ticker: stock.ticker.clone(),
        reason,
    };

    if stock.ticker.trim().is_empty() {
        return Err(invalid("ticker must be non-empty".to_string()));
    }
    if stock.sector.trim().is_empty() {
        return Err(invalid("sector must be non-empty".to_string()));
    }
    if !(stock.peg_ratio.is_finite() && stock.peg_ratio > 0.0) {
        return Err(invalid(format!(
            "ratio must be positive (got {})",
            stock.peg_ratio
        )));
    }
    if !(stock.price.is_finite() && stock.price > 0.0) {
        return Err(invalid(format!("price must be positive (got {})", stock.price)));
    }
    for horizon in Horizon::ALL {
        match stock.expected_return(horizon) {
            Some(r) if r.is_finite() => {}
            Some(r) => return Err(invalid(format!("forecast for {horizon} is {r}"))),
            None => {
                return Err(UniverseError::MissingForecast {
                    ticker: stock.ticker.clone(),
                    horizon,
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::domain::stock::{Horizon, InvestmentStyle, RiskTier, Stock};
    use std::collections::BTreeMap;

    /// Stock with the same forecast at every horizon.
    pub fn stock(ticker: &str, sector: &str, ratio: f64, ret: f64, price: f64) -> Stock {
        Stock {
            ticker: ticker.to_string(),
            company_name: None,
            sector: sector.to_string(),
            style: InvestmentStyle::Blend,
            peg_ratio: ratio,
            price,
            risk_tier: RiskTier::Medium,
            forecasts: Horizon::ALL.into_iter().map(|h| (h, ret)).collect::<BTreeMap<_, _>>(),
            pe_ratio: None,
            pb_ratio: None,
            avg_historical_cagr: None,
            volatility: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::stock;
    use super::*;

    #[test]
    fn rejects_duplicate_tickers() {
        let err = UniverseSnapshot::new(
            None,
            vec![
                stock("AAA", "Energy", 0.8, 0.12, 100.0),
                stock("AAA", "Utilities", 0.9, 0.10, 50.0),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, UniverseError::DuplicateTicker(t) if t == "AAA"));
    }

    #[test]
    fn rejects_missing_horizon_and_bad_price() {
        let mut s = stock("AAA", "Energy", 0.8, 0.12, 100.0);
        s.forecasts.remove(&Horizon::M48);
        assert!(matches!(
            UniverseSnapshot::new(None, vec![s]),
            Err(UniverseError::MissingForecast { horizon: Horizon::M48, .. })
        ));

        let s = stock("BBB", "Energy", 0.8, 0.12, 0.0);
        assert!(matches!(
            UniverseSnapshot::new(None, vec![s]),
            Err(UniverseError::InvalidStock { .. })
        ));
    }

    #[test]
    fn lookup_and_sector_listing() {
        let snap = UniverseSnapshot::new(
            NaiveDate::from_ymd_opt(2025, 3, 31),
            vec![
                stock("AAA", "Energy", 0.8, 0.12, 100.0),
                stock("BBB", "Banks", 1.1, 0.10, 50.0),
                stock("CCC", "Energy", 1.4, 0.20, 75.0),
            ],
        )
        .unwrap();

        assert_eq!(snap.len(), 3);
        assert_eq!(snap.get("BBB").map(|s| s.price), Some(50.0));
        assert!(snap.get("ZZZ").is_none());
        assert_eq!(snap.sectors().into_iter().collect::<Vec<_>>(), vec!["Banks", "Energy"]);
    }

    #[test]
    fn with_forecast_pairs_stock_and_return() {
        let mut a = stock("AAA", "Energy", 0.8, 0.12, 100.0);
        a.forecasts.insert(Horizon::M60, 0.2);
        let snap = UniverseSnapshot::new(None, vec![a, stock("BBB", "Banks", 1.1, 0.10, 50.0)])
            .unwrap();
        let pairs: Vec<(&str, f64)> = snap
            .with_forecast(Horizon::M60)
            .map(|(s, r)| (s.ticker.as_str(), r))
            .collect();
        assert_eq!(pairs, vec![("AAA", 0.2), ("BBB", 0.10)]);
    }

    #[test]
    fn json_round_trip_revalidates() {
        let snap = UniverseSnapshot::new(None, vec![stock("AAA", "Energy", 0.8, 0.12, 100.0)])
            .unwrap();
        let json = serde_json::to_string(&snap).unwrap();
        let back: UniverseSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);

        let bad = json.replace("\"price\":100.0", "\"price\":-1.0");
        assert!(serde_json::from_str::<UniverseSnapshot>(&bad).is_err());
    }
}
