//! Two-round, sector-diversified stock selection.
//!
//! Round 1 takes the lowest-ratio stock of every sector. Round 2 admits the remaining stocks
//! whose ratio is strictly below the threshold, cheapest first, up to `max_stocks`. When the
//! result is still short of `min_stocks`, the next-cheapest stocks are admitted regardless of
//! the threshold.
//!
//! Ordering is total: ratio ascending, then expected return descending, then ticker.

use crate::domain::plan::PlanRequest;
use crate::domain::selection::{
    Candidate, SectorPick, SelectionRationale, SelectionResult, SelectionRound,
};
use crate::domain::stock::{Horizon, Stock};
use crate::error::PlanError;
use crate::universe::UniverseSnapshot;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Achieved CAGR may fall this far short of the request and still count as feasible.
pub const FEASIBILITY_TOLERANCE: f64 = 0.001;

/// Fewer candidates than this after relaxation is a hard failure.
pub const MIN_SELECTABLE: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionParams {
    pub expected_cagr: f64,
    pub horizon: Horizon,
    pub ratio_threshold: f64,
    pub min_stocks: usize,
    pub max_stocks: usize,
}

impl From<&PlanRequest> for SelectionParams {
    fn from(req: &PlanRequest) -> Self {
        Self {
            expected_cagr: req.expected_cagr,
            horizon: req.horizon,
            ratio_threshold: req.ratio_threshold,
            min_stocks: req.min_stocks,
            max_stocks: req.max_stocks,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ranked<'a> {
    stock: &'a Stock,
    ratio: f64,
    ret: f64,
}

impl Ranked<'_> {
    fn cmp_rank(&self, other: &Self) -> Ordering {
        self.ratio
            .total_cmp(&other.ratio)
            .then_with(|| other.ret.total_cmp(&self.ret))
            .then_with(|| self.stock.ticker.cmp(&other.stock.ticker))
    }

    fn admit(self, round: SelectionRound) -> Candidate {
        Candidate {
            stock: self.stock.clone(),
            round,
            ratio: self.ratio,
            expected_return: self.ret,
        }
    }
}

pub fn select(
    universe: &UniverseSnapshot,
    params: &SelectionParams,
) -> Result<SelectionResult, PlanError> {
    let horizon = params.horizon;

    let mut eligible: Vec<Ranked<'_>> = universe
        .with_forecast(horizon)
        .map(|(stock, ret)| Ranked {
            stock,
            ratio: stock.ratio_for(horizon),
            ret,
        })
        .collect();

    if eligible.is_empty() {
        return Err(PlanError::InsufficientUniverse {
            horizon,
            universe_size: universe.len(),
            eligible: 0,
        });
    }
    eligible.sort_by(Ranked::cmp_rank);

    tracing::info!(
        %horizon,
        universe = universe.len(),
        eligible = eligible.len(),
        threshold = params.ratio_threshold,
        "stock selection started"
    );

    // `eligible` is already in rank order, so the first stock seen per sector is its best.
    let mut by_sector: BTreeMap<&str, Vec<Ranked<'_>>> = BTreeMap::new();
    for r in &eligible {
        by_sector.entry(r.stock.sector.as_str()).or_default().push(*r);
    }

    let mut candidates: Vec<Candidate> = Vec::with_capacity(params.max_stocks.max(by_sector.len()));
    let mut picked: BTreeSet<&str> = BTreeSet::new();
    let mut breakdown: BTreeMap<String, SectorPick> = BTreeMap::new();

    for (sector, group) in &by_sector {
        let Some(best) = group.first() else {
            continue;
        };
        picked.insert(best.stock.ticker.as_str());
        candidates.push(best.admit(SelectionRound::SectorRepresentative));
        breakdown.insert(
            sector.to_string(),
            SectorPick {
                representative: best.stock.ticker.clone(),
                ratio: best.ratio,
                expected_return: best.ret,
                stocks_in_sector: group.len(),
                additional: Vec::new(),
            },
        );
    }
    let round1_count = candidates.len();

    let remaining: Vec<Ranked<'_>> = eligible
        .iter()
        .filter(|r| !picked.contains(r.stock.ticker.as_str()))
        .copied()
        .collect();

    let mut round2_count = 0;
    for r in &remaining {
        if candidates.len() >= params.max_stocks {
            break;
        }
        // `remaining` is ratio-ascending: nothing after the first miss can qualify.
        if r.ratio >= params.ratio_threshold {
            break;
        }
        picked.insert(r.stock.ticker.as_str());
        candidates.push(r.admit(SelectionRound::ThresholdQualified));
        round2_count += 1;
    }

    let mut relaxed_count = 0;
    if candidates.len() < params.min_stocks {
        for r in &remaining {
            if candidates.len() >= params.min_stocks {
                break;
            }
            if picked.contains(r.stock.ticker.as_str()) {
                continue;
            }
            picked.insert(r.stock.ticker.as_str());
            candidates.push(r.admit(SelectionRound::Relaxed));
            relaxed_count += 1;
        }
        tracing::warn!(
            %horizon,
            threshold = params.ratio_threshold,
            relaxed = relaxed_count,
            selected = candidates.len(),
            min_stocks = params.min_stocks,
            "threshold relaxed to reach min_stocks"
        );
    }

    if candidates.len() < MIN_SELECTABLE {
        return Err(PlanError::InfeasibleSelection {
            ratio_threshold: params.ratio_threshold,
            relaxed: relaxed_count > 0 || candidates.len() < params.min_stocks,
            eligible: eligible.len(),
            found: candidates.len(),
        });
    }

    for c in candidates
        .iter()
        .filter(|c| c.round != SelectionRound::SectorRepresentative)
    {
        if let Some(pick) = breakdown.get_mut(&c.stock.sector) {
            pick.additional.push(c.stock.ticker.clone());
        }
    }

    let achieved_cagr =
        candidates.iter().map(|c| c.expected_return).sum::<f64>() / candidates.len() as f64;
    let feasible = achieved_cagr >= params.expected_cagr - FEASIBILITY_TOLERANCE;

    tracing::info!(
        %horizon,
        selected = candidates.len(),
        round1 = round1_count,
        round2 = round2_count,
        relaxed = relaxed_count,
        achieved_cagr,
        feasible,
        "stock selection complete"
    );

    Ok(SelectionResult {
        horizon,
        achieved_cagr,
        feasible,
        rationale: SelectionRationale {
            universe_size: universe.len(),
            eligible: eligible.len(),
            sectors_considered: by_sector.keys().map(|s| s.to_string()).collect(),
            ratio_threshold: params.ratio_threshold,
            round1_count,
            round2_count,
            relaxed_count,
            relaxation_used: relaxed_count > 0,
            min_stocks_met: candidates.len() >= params.min_stocks,
            sector_breakdown: breakdown,
        },
        candidates,
    })
}
