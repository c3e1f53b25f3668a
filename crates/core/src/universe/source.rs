use crate::error::UniverseError;
use crate::universe::snapshot::UniverseSnapshot;
use crate::universe::store::UniverseStore;
use crate::universe::table::{read_universe_csv, LoadReport};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a full universe snapshot comes from. The engine never calls this itself.
#[async_trait::async_trait]
pub trait UniverseSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn load(&self) -> Result<(UniverseSnapshot, LoadReport)>;
}

/// Reads a `.csv` universe table or a canonical `.json` snapshot.
#[derive(Debug, Clone)]
pub struct FileUniverseSource {
    path: PathBuf,
    as_of_date: Option<NaiveDate>,
}

impl FileUniverseSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            as_of_date: None,
        }
    }

    /// Date stamped on snapshots parsed from CSV (JSON snapshots carry their own).
    pub fn with_as_of_date(mut self, as_of_date: Option<NaiveDate>) -> Self {
        self.as_of_date = as_of_date;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl UniverseSource for FileUniverseSource {
    fn source_name(&self) -> &'static str {
        "file"
    }

    async fn load(&self) -> Result<(UniverseSnapshot, LoadReport)> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read universe file {}", self.path.display()))?;

        parse_universe(&self.path, &text, self.as_of_date)
            .with_context(|| format!("parse universe file {}", self.path.display()))
    }
}

pub fn parse_universe(
    path: &Path,
    text: &str,
    as_of_date: Option<NaiveDate>,
) -> Result<(UniverseSnapshot, LoadReport), UniverseError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => read_universe_csv(text.as_bytes(), as_of_date),
        "json" => {
            let snapshot: UniverseSnapshot = serde_json::from_str(text)?;
            let report = LoadReport {
                rows_read: snapshot.len(),
                rows_kept: snapshot.len(),
                dropped: Vec::new(),
            };
            Ok((snapshot, report))
        }
        other => Err(UniverseError::UnsupportedFormat(other.to_string())),
    }
}

/// Load a fresh snapshot and swap it in. On failure the current snapshot stays in place.
pub async fn refresh(
    store: &UniverseStore,
    source: &dyn UniverseSource,
) -> Result<(Arc<UniverseSnapshot>, LoadReport)> {
    let t0 = std::time::Instant::now();
    let (snapshot, report) = source.load().await?;

    anyhow::ensure!(
        !snapshot.is_empty(),
        "{} source produced an empty universe ({} rows read, {} dropped)",
        source.source_name(),
        report.rows_read,
        report.dropped.len()
    );

    let as_of_date = snapshot.as_of_date();
    let stocks = snapshot.len();
    store.replace(snapshot);

    tracing::info!(
        source = source.source_name(),
        ?as_of_date,
        stocks,
        dropped = report.dropped.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "universe snapshot swapped"
    );

    Ok((store.snapshot(), report))
}
