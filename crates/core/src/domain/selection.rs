use crate::domain::stock::{Horizon, Stock};
use serde::Serialize;
use std::collections::BTreeMap;

/// Which selection pass admitted a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRound {
    /// Round 1: lowest-ratio stock of its sector.
    SectorRepresentative,
    /// Round 2: ratio strictly below the threshold.
    ThresholdQualified,
    /// Fallback: admitted regardless of threshold to reach `min_stocks`.
    Relaxed,
    /// Named by the caller instead of chosen by the selector.
    Requested,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub stock: Stock,
    pub round: SelectionRound,
    pub ratio: f64,
    pub expected_return: f64,
}

impl Candidate {
    pub fn ticker(&self) -> &str {
        &self.stock.ticker
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorPick {
    pub representative: String,
    pub ratio: f64,
    pub expected_return: f64,
    pub stocks_in_sector: usize,
    pub additional: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionRationale {
    pub universe_size: usize,
    pub eligible: usize,
    pub sectors_considered: Vec<String>,
    pub ratio_threshold: f64,
    pub round1_count: usize,
    pub round2_count: usize,
    pub relaxed_count: usize,
    pub relaxation_used: bool,
    pub min_stocks_met: bool,
    pub sector_breakdown: BTreeMap<String, SectorPick>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionResult {
    pub horizon: Horizon,
    pub candidates: Vec<Candidate>,
    /// Simple average of candidate returns; provisional until the optimizer weights it.
    pub achieved_cagr: f64,
    pub feasible: bool,
    pub rationale: SelectionRationale,
}

impl SelectionResult {
    pub fn tickers(&self) -> Vec<&str> {
        self.candidates.iter().map(Candidate::ticker).collect()
    }
}
