use std::path::Path;

use chrono::NaiveDate;
use vriddhi_core::universe::source::{FileUniverseSource, UniverseSource};
use vriddhi_core::universe::table::LoadReport;
use vriddhi_core::universe::UniverseSnapshot;

#[derive(Debug, Clone)]
pub struct UniverseOptions {
    /// Fewest stocks a cleaned universe may hold before it is rejected.
    pub min_stocks: usize,

    /// Largest share of input rows the cleaning pass may drop (0.0..=1.0).
    pub max_dropped_fraction: f64,
}

impl Default for UniverseOptions {
    fn default() -> Self {
        Self {
            min_stocks: 10,
            max_dropped_fraction: 0.5,
        }
    }
}

impl UniverseOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("UNIVERSE_MIN_STOCKS") {
            if let Ok(n) = s.parse::<usize>() {
                out.min_stocks = n;
            }
        }

        if let Ok(s) = std::env::var("UNIVERSE_MAX_DROPPED_FRACTION") {
            if let Ok(n) = s.parse::<f64>() {
                out.max_dropped_fraction = n;
            }
        }

        out
    }
}

pub async fn load_universe(
    path: &Path,
    as_of_date: Option<NaiveDate>,
) -> anyhow::Result<(UniverseSnapshot, LoadReport)> {
    let source = FileUniverseSource::new(path).with_as_of_date(as_of_date);
    let (snapshot, report) = source.load().await?;

    for d in &report.dropped {
        tracing::debug!(row = d.row, ticker = %d.ticker, reason = %d.reason, "row dropped");
    }
    tracing::info!(
        path = %path.display(),
        rows_read = report.rows_read,
        rows_kept = report.rows_kept,
        dropped = report.dropped.len(),
        "universe loaded"
    );

    Ok((snapshot, report))
}

/// Reject a cleaned universe that is too small or lost too many rows.
pub fn check_quality(
    snapshot: &UniverseSnapshot,
    report: &LoadReport,
    opts: &UniverseOptions,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&opts.max_dropped_fraction),
        "UNIVERSE_MAX_DROPPED_FRACTION must be 0.0..=1.0 (got {})",
        opts.max_dropped_fraction
    );

    anyhow::ensure!(
        snapshot.len() >= opts.min_stocks,
        "universe too small: expected at least {} stocks, got {}",
        opts.min_stocks,
        snapshot.len()
    );

    if report.rows_read > 0 {
        let dropped = report.dropped.len() as f64 / report.rows_read as f64;
        anyhow::ensure!(
            dropped <= opts.max_dropped_fraction,
            "cleaning dropped {} of {} rows ({:.1}%), above the {:.1}% limit",
            report.dropped.len(),
            report.rows_read,
            dropped * 100.0,
            opts.max_dropped_fraction * 100.0
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vriddhi_core::universe::table::{read_universe_csv, DroppedRow};

    const CSV: &str = "\
Ticker,Sector,Current_Price,PE_Ratio,PB_Ratio,Avg_Historical_CAGR,Forecast_6M,Forecast_12M
AAA,Energy,100,12,1.5,20,8,14
BBB,Banks,250,18,2.5,15,6,12
CCC,Pharma,80,-4,1.0,10,5,9
";

    #[test]
    fn quality_gate_counts_dropped_rows() {
        let (snap, report) = read_universe_csv(CSV.as_bytes(), None).unwrap();
        assert_eq!(snap.len(), 2);

        let lenient = UniverseOptions {
            min_stocks: 2,
            max_dropped_fraction: 0.5,
        };
        assert!(check_quality(&snap, &report, &lenient).is_ok());

        let strict = UniverseOptions {
            min_stocks: 2,
            max_dropped_fraction: 0.2,
        };
        assert!(check_quality(&snap, &report, &strict).is_err());

        let too_small = UniverseOptions {
            min_stocks: 3,
            max_dropped_fraction: 1.0,
        };
        assert!(check_quality(&snap, &report, &too_small).is_err());
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        let report = LoadReport {
            rows_read: 1,
            rows_kept: 0,
            dropped: vec![DroppedRow {
                row: 2,
                ticker: String::new(),
                reason: "empty ticker".to_string(),
            }],
        };
        let opts = UniverseOptions {
            min_stocks: 0,
            max_dropped_fraction: 1.5,
        };
        assert!(check_quality(&UniverseSnapshot::empty(), &report, &opts).is_err());
    }
}
