use anyhow::Context;
use chrono::NaiveDate;
use std::path::Path;
use vriddhi_core::universe::table::LoadReport;

use crate::universe::{check_quality, load_universe, UniverseOptions};

/// Clean a raw universe table and write it as a canonical JSON snapshot.
///
/// The file is written beside `output` first and renamed into place, so a reader polling
/// `output` never sees a half-written snapshot.
pub async fn normalize_universe(
    input: &Path,
    output: &Path,
    as_of_date: NaiveDate,
    opts: &UniverseOptions,
) -> anyhow::Result<LoadReport> {
    let (snapshot, report) = load_universe(input, Some(as_of_date)).await?;
    check_quality(&snapshot, &report, opts)?;

    let json = serde_json::to_string_pretty(&snapshot).context("serialize snapshot failed")?;

    let tmp = output.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("write {} failed", tmp.display()))?;
    tokio::fs::rename(&tmp, output)
        .await
        .with_context(|| format!("rename {} -> {} failed", tmp.display(), output.display()))?;

    tracing::info!(
        %as_of_date,
        output = %output.display(),
        stocks = snapshot.len(),
        dropped = report.dropped.len(),
        "universe snapshot written"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vriddhi_core::universe::source::{FileUniverseSource, UniverseSource};

    const CSV: &str = "\
Ticker,Company_Name,Sector,Current_Price,PE_Ratio,PB_Ratio,Avg_Historical_CAGR,Forecast_6M,Forecast_12M,Forecast_24M,Forecast_60M
tcs,Tata Consultancy,Technology,3450.5,28,12.1,18,7,14,15,16
HDFCBANK,HDFC Bank,Banks,1620,19,2.8,21,6,13,14,15
SUNPHARMA,Sun Pharma,Pharma,1210,32,5.2,16,5,12,13,14
";

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let dir = std::env::temp_dir().join(format!("vriddhi-{tag}-{}-{nanos}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn writes_a_snapshot_the_api_can_load() {
        let dir = scratch_dir("normalize");
        let input = dir.join("universe.csv");
        let output = dir.join("universe.json");
        std::fs::write(&input, CSV).unwrap();

        let as_of = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        let opts = UniverseOptions {
            min_stocks: 3,
            max_dropped_fraction: 0.0,
        };
        let report = normalize_universe(&input, &output, as_of, &opts).await.unwrap();
        assert_eq!(report.rows_kept, 3);
        assert!(!dir.join("universe.json.tmp").exists());

        let (snap, _) = FileUniverseSource::new(&output).load().await.unwrap();
        assert_eq!(snap.as_of_date(), Some(as_of));
        assert_eq!(snap.len(), 3);
        assert!(snap.get("TCS").is_some());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn quality_failure_leaves_no_output() {
        let dir = scratch_dir("reject");
        let input = dir.join("universe.csv");
        let output = dir.join("universe.json");
        std::fs::write(&input, CSV).unwrap();

        let opts = UniverseOptions {
            min_stocks: 50,
            max_dropped_fraction: 1.0,
        };
        let as_of = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        assert!(normalize_universe(&input, &output, as_of, &opts).await.is_err());
        assert!(!output.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
