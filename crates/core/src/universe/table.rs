use crate::domain::stock::{Horizon, InvestmentStyle, RiskTier, Stock};
use crate::error::UniverseError;
use crate::universe::snapshot::UniverseSnapshot;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

/// Raw row of the universe table. Percent columns are converted to fractions on cleaning.
#[derive(Debug, Clone, Deserialize)]
struct RawStockRow {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Company_Name", default)]
    company_name: Option<String>,
    #[serde(rename = "Sector", default)]
    sector: Option<String>,
    #[serde(rename = "Current_Price", default, deserialize_with = "csv::invalid_option")]
    current_price: Option<f64>,
    #[serde(rename = "PE_Ratio", default, deserialize_with = "csv::invalid_option")]
    pe_ratio: Option<f64>,
    #[serde(rename = "PB_Ratio", default, deserialize_with = "csv::invalid_option")]
    pb_ratio: Option<f64>,
    #[serde(rename = "Avg_Historical_CAGR", default, deserialize_with = "csv::invalid_option")]
    avg_historical_cagr_pct: Option<f64>,
    #[serde(rename = "PEG_Ratio", default, deserialize_with = "csv::invalid_option")]
    peg_ratio: Option<f64>,
    /// Annualised volatility in percent, like the other return columns.
    #[serde(rename = "Volatility", default, deserialize_with = "csv::invalid_option")]
    volatility_pct: Option<f64>,
    #[serde(rename = "Investment_Style", default)]
    investment_style: Option<String>,
    #[serde(rename = "Risk_Level", default)]
    risk_level: Option<String>,
    #[serde(rename = "Forecast_6M", default, deserialize_with = "csv::invalid_option")]
    forecast_6m: Option<f64>,
    #[serde(rename = "Forecast_12M", default, deserialize_with = "csv::invalid_option")]
    forecast_12m: Option<f64>,
    #[serde(rename = "Forecast_18M", default, deserialize_with = "csv::invalid_option")]
    forecast_18m: Option<f64>,
    #[serde(rename = "Forecast_24M", default, deserialize_with = "csv::invalid_option")]
    forecast_24m: Option<f64>,
    #[serde(rename = "Forecast_36M", default, deserialize_with = "csv::invalid_option")]
    forecast_36m: Option<f64>,
    #[serde(rename = "Forecast_48M", default, deserialize_with = "csv::invalid_option")]
    forecast_48m: Option<f64>,
    #[serde(rename = "Forecast_60M", default, deserialize_with = "csv::invalid_option")]
    forecast_60m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    pub row: usize,
    pub ticker: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped: Vec<DroppedRow>,
}

/// Parse and clean a universe table into a validated snapshot.
pub fn read_universe_csv<R: Read>(
    reader: R,
    as_of_date: Option<NaiveDate>,
) -> Result<(UniverseSnapshot, LoadReport), UniverseError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut report = LoadReport::default();
    let mut seen = BTreeSet::new();
    let mut stocks = Vec::new();

    for (idx, row) in rdr.deserialize::<RawStockRow>().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        report.rows_read += 1;

        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                report.dropped.push(DroppedRow {
                    row: line,
                    ticker: String::new(),
                    reason: format!("malformed record: {e}"),
                });
                continue;
            }
        };

        let ticker = row.ticker.trim().to_ascii_uppercase();
        if ticker.is_empty() {
            report.dropped.push(DroppedRow {
                row: line,
                ticker,
                reason: "empty ticker".to_string(),
            });
            continue;
        }
        if seen.contains(&ticker) {
            report.dropped.push(DroppedRow {
                row: line,
                ticker,
                reason: "duplicate ticker".to_string(),
            });
            continue;
        }

        match clean_row(row, ticker.clone()) {
            Ok(stock) => {
                seen.insert(ticker);
                stocks.push(stock);
            }
            Err(reason) => report.dropped.push(DroppedRow {
                row: line,
                ticker,
                reason,
            }),
        }
    }

    report.rows_kept = stocks.len();
    let snapshot = UniverseSnapshot::new(as_of_date, stocks)?;
    Ok((snapshot, report))
}

fn clean_row(row: RawStockRow, ticker: String) -> Result<Stock, String> {
    let price = row
        .current_price
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| "missing or non-positive price".to_string())?;

    let pe = row
        .pe_ratio
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| "PE ratio must be positive".to_string())?;

    let cagr_pct = row
        .avg_historical_cagr_pct
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| "historical CAGR must be positive".to_string())?;

    let peg_ratio = row
        .peg_ratio
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(pe / cagr_pct);

    let pb = row.pb_ratio.filter(|v| v.is_finite());

    let raw_forecasts: BTreeMap<Horizon, f64> = [
        (Horizon::M6, row.forecast_6m),
        (Horizon::M12, row.forecast_12m),
        (Horizon::M18, row.forecast_18m),
        (Horizon::M24, row.forecast_24m),
        (Horizon::M36, row.forecast_36m),
        (Horizon::M48, row.forecast_48m),
        (Horizon::M60, row.forecast_60m),
    ]
    .into_iter()
    .filter_map(|(h, v)| v.filter(|x| x.is_finite()).map(|x| (h, x / 100.0)))
    .collect();

    let forecasts = fill_missing_horizons(&raw_forecasts).ok_or_else(|| "no forecasts".to_string())?;

    let style = row
        .investment_style
        .as_deref()
        .and_then(InvestmentStyle::parse)
        .unwrap_or_else(|| derive_style(pe, pb, cagr_pct));

    let risk_tier = row
        .risk_level
        .as_deref()
        .and_then(RiskTier::parse)
        .unwrap_or_else(|| derive_risk_tier(pe));

    let sector = row
        .sector
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    Ok(Stock {
        ticker,
        company_name: row
            .company_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        sector,
        style,
        peg_ratio,
        price,
        risk_tier,
        forecasts,
        pe_ratio: Some(pe),
        pb_ratio: pb,
        avg_historical_cagr: Some(cagr_pct / 100.0),
        volatility: row
            .volatility_pct
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v / 100.0),
    })
}

/// Fill each unsupplied horizon from the nearest supplied one; ties go to the shorter horizon.
fn fill_missing_horizons(raw: &BTreeMap<Horizon, f64>) -> Option<BTreeMap<Horizon, f64>> {
    if raw.is_empty() {
        return None;
    }

    let mut out = BTreeMap::new();
    for horizon in Horizon::ALL {
        let value = match raw.get(&horizon) {
            Some(v) => *v,
            None => {
                let target = horizon.months() as i64;
                let (_, v) = raw
                    .iter()
                    .min_by_key(|(h, _)| ((h.months() as i64 - target).abs(), h.months()))?;
                *v
            }
        };
        out.insert(horizon, value);
    }
    Some(out)
}

pub fn derive_style(pe: f64, pb: Option<f64>, cagr_pct: f64) -> InvestmentStyle {
    let pb = pb.unwrap_or(3.0);
    if pe < 15.0 && pb < 2.0 {
        InvestmentStyle::DeepValue
    } else if pe < 20.0 && pb < 3.0 {
        InvestmentStyle::Value
    } else if cagr_pct > 25.0 {
        InvestmentStyle::Growth
    } else {
        InvestmentStyle::Blend
    }
}

pub fn derive_risk_tier(pe: f64) -> RiskTier {
    if pe < 15.0 {
        RiskTier::Low
    } else if pe < 30.0 {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HEADER: &str = "Ticker,Company_Name,Sector,Current_Price,PE_Ratio,PB_Ratio,Avg_Historical_CAGR,Forecast_12M,Forecast_18M,Forecast_24M,Forecast_36M,Forecast_48M,Forecast_60M";

    fn table(rows: &[&str]) -> String {
        let mut s = HEADER.to_string();
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s
    }

    #[test]
    fn cleans_rows_and_converts_percentages() {
        let csv = table(&["hdfclife,HDFC Life,Financials,788.75,14.5,1.8,29.0,20,21,22,24,25,26"]);
        let (snap, report) = read_universe_csv(csv.as_bytes(), None).unwrap();
        assert_eq!(report.rows_read, 1);
        assert_eq!(report.rows_kept, 1);

        let s = snap.get("HDFCLIFE").unwrap();
        assert_relative_eq!(s.peg_ratio, 14.5 / 29.0, epsilon = 1e-12);
        assert_relative_eq!(s.expected_return(Horizon::M24).unwrap(), 0.22, epsilon = 1e-12);
        // 6M absent from the table: nearest supplied horizon is 12M.
        assert_relative_eq!(s.expected_return(Horizon::M6).unwrap(), 0.20, epsilon = 1e-12);
        assert_eq!(s.style, InvestmentStyle::DeepValue);
        assert_eq!(s.risk_tier, RiskTier::Low);
        assert_relative_eq!(s.avg_historical_cagr.unwrap(), 0.29, epsilon = 1e-12);
    }

    #[test]
    fn drops_rows_failing_quality_filters() {
        let csv = table(&[
            "AAA,,Energy,100,0,2,20,10,10,10,10,10,10",
            "BBB,,Energy,100,25,2,-3,10,10,10,10,10,10",
            "CCC,,Energy,,25,2,20,10,10,10,10,10,10",
            "DDD,,Energy,100,25,2,20,,,,,,",
            "EEE,,Energy,100,25,4,20,10,10,10,10,10,10",
            "eee,,Banks,100,25,4,20,10,10,10,10,10,10",
        ]);
        let (snap, report) = read_universe_csv(csv.as_bytes(), None).unwrap();
        assert_eq!(report.rows_read, 6);
        assert_eq!(snap.len(), 1);
        let reasons: Vec<_> = report.dropped.iter().map(|d| d.ticker.as_str()).collect();
        assert_eq!(reasons, vec!["AAA", "BBB", "CCC", "DDD", "EEE"]);
        assert_eq!(report.dropped[4].reason, "duplicate ticker");
        assert_eq!(report.dropped[0].row, 2);
    }

    #[test]
    fn non_numeric_cells_are_coerced_to_missing() {
        let csv = table(&["AAA,,Energy,N/A,25,2,20,10,10,10,10,10,10"]);
        let (snap, report) = read_universe_csv(csv.as_bytes(), None).unwrap();
        assert!(snap.is_empty());
        assert_eq!(report.dropped[0].reason, "missing or non-positive price");
    }

    #[test]
    fn explicit_labels_and_peg_win_over_derivation() {
        let csv = "Ticker,Sector,Current_Price,PE_Ratio,Avg_Historical_CAGR,PEG_Ratio,Investment_Style,Risk_Level,Forecast_6M\n\
                   XYZ,Tech,50,40,10,0.7,Growth,Low,12";
        let (snap, _) = read_universe_csv(csv.as_bytes(), None).unwrap();
        let s = snap.get("XYZ").unwrap();
        assert_relative_eq!(s.peg_ratio, 0.7);
        assert_eq!(s.style, InvestmentStyle::Growth);
        assert_eq!(s.risk_tier, RiskTier::Low);
        assert_relative_eq!(s.expected_return(Horizon::M60).unwrap(), 0.12, epsilon = 1e-12);
    }

    #[test]
    fn malformed_record_is_dropped_not_fatal() {
        let csv = table(&[
            "AAA,,Energy,100,12,1.5,20,10,10,10,10,10,10",
            "BBB,,Energy,100",
            "CCC,,Banks,250,18,2.5,15,9,9,9,9,9,9",
        ]);
        let (snap, report) = read_universe_csv(csv.as_bytes(), None).unwrap();
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_kept, 2);
        assert_eq!(snap.len(), 2);
        assert!(snap.get("CCC").is_some());
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].row, 3);
        assert!(report.dropped[0].reason.starts_with("malformed record"));
    }

    #[test]
    fn volatility_is_read_as_percent() {
        let csv = "Ticker,Sector,Current_Price,PE_Ratio,Avg_Historical_CAGR,Volatility,Forecast_12M\n\
                   VOL,Tech,50,20,15,22,12";
        let (snap, _) = read_universe_csv(csv.as_bytes(), None).unwrap();
        let s = snap.get("VOL").unwrap();
        assert_relative_eq!(s.volatility.unwrap(), 0.22, epsilon = 1e-12);
        assert_relative_eq!(s.variance_proxy(), 0.0484, epsilon = 1e-12);
    }

    #[test]
    fn nearest_horizon_ties_prefer_shorter() {
        let raw: BTreeMap<_, _> = [(Horizon::M12, 0.1), (Horizon::M24, 0.2)].into_iter().collect();
        let filled = fill_missing_horizons(&raw).unwrap();
        assert_eq!(filled[&Horizon::M18], 0.1);
        assert_eq!(filled[&Horizon::M60], 0.2);
        assert!(fill_missing_horizons(&BTreeMap::new()).is_none());
    }

    #[test]
    fn derivation_thresholds() {
        assert_eq!(derive_style(18.0, Some(2.5), 10.0), InvestmentStyle::Value);
        assert_eq!(derive_style(35.0, Some(6.0), 30.0), InvestmentStyle::Growth);
        assert_eq!(derive_style(35.0, None, 12.0), InvestmentStyle::Blend);
        assert_eq!(derive_risk_tier(29.9), RiskTier::Medium);
        assert_eq!(derive_risk_tier(30.0), RiskTier::High);
    }
}
