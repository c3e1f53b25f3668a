use crate::config::PlanDefaults;
use crate::domain::selection::SelectionResult;
use crate::domain::stock::{Horizon, InvestmentStyle, RiskTier};
use crate::engine::allocator::ShareAllocation;
use crate::engine::optimizer::OptimizationOutcome;
use crate::engine::projection::Projection;
use crate::error::PlanError;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-request parameters. Built by the boundary layer, validated before any algorithm runs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub monthly_investment: f64,
    pub horizon: Horizon,
    pub expected_cagr: f64,
    pub ratio_threshold: f64,
    pub min_stocks: usize,
    pub max_stocks: usize,
    pub max_weight: Option<f64>,
    pub risk_aversion: f64,
    pub inflation_rate: f64,
}

impl PlanRequest {
    pub fn with_defaults(
        monthly_investment: f64,
        horizon_months: u32,
        defaults: &PlanDefaults,
    ) -> Result<Self, PlanError> {
        Ok(Self {
            monthly_investment,
            horizon: Horizon::try_from(horizon_months)?,
            expected_cagr: defaults.expected_cagr,
            ratio_threshold: defaults.ratio_threshold,
            min_stocks: defaults.min_stocks,
            max_stocks: defaults.max_stocks,
            max_weight: Some(defaults.max_weight),
            risk_aversion: defaults.risk_aversion,
            inflation_rate: defaults.inflation_rate,
        })
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if !(self.monthly_investment.is_finite() && self.monthly_investment > 0.0) {
            return Err(PlanError::validation(
                "monthly_investment",
                format!("must be positive (got {})", self.monthly_investment),
            ));
        }
        if !(self.expected_cagr.is_finite() && self.expected_cagr > 0.0) {
            return Err(PlanError::validation(
                "expected_cagr",
                format!("must be a positive fraction (got {})", self.expected_cagr),
            ));
        }
        if !(self.ratio_threshold.is_finite() && self.ratio_threshold > 0.0) {
            return Err(PlanError::validation(
                "ratio_threshold",
                format!("must be positive (got {})", self.ratio_threshold),
            ));
        }
        if self.min_stocks == 0 {
            return Err(PlanError::validation("min_stocks", "must be at least 1"));
        }
        if self.min_stocks > self.max_stocks {
            return Err(PlanError::validation(
                "min_stocks",
                format!(
                    "min_stocks ({}) exceeds max_stocks ({})",
                    self.min_stocks, self.max_stocks
                ),
            ));
        }
        if let Some(cap) = self.max_weight {
            if !(cap.is_finite() && cap > 0.0 && cap <= 1.0) {
                return Err(PlanError::validation(
                    "max_weight",
                    format!("must be in (0, 1] (got {cap})"),
                ));
            }
        }
        if !(self.risk_aversion.is_finite() && self.risk_aversion > 0.0) {
            return Err(PlanError::validation(
                "risk_aversion",
                format!("must be positive (got {})", self.risk_aversion),
            ));
        }
        if !self.inflation_rate.is_finite() {
            return Err(PlanError::validation("inflation_rate", "must be finite"));
        }
        Ok(())
    }
}

/// One position of the plan: continuous weight plus its monthly cash share.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub ticker: String,
    pub sector: String,
    pub weight: f64,
    pub monthly_allocation: f64,
    pub price: f64,
    pub ratio: f64,
    pub expected_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub horizon_months: u32,
    pub horizon_years: f64,
    pub expected_cagr: f64,
    pub achieved_cagr: f64,
    pub achieved_risk: Option<f64>,
    /// Achieved (weighted) CAGR meets the request within tolerance.
    pub feasible: bool,
    pub optimized: bool,
    pub total_invested: f64,
    pub final_value: f64,
    pub total_gain: f64,
    pub money_multiplier: f64,
    pub inflation_beat_margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diversification {
    pub by_sector: BTreeMap<String, f64>,
    pub by_style: BTreeMap<InvestmentStyle, f64>,
    pub by_risk: BTreeMap<RiskTier, f64>,
}

/// Weights and whole shares for a caller-chosen set of tickers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub horizon: Horizon,
    pub monthly_investment: f64,
    pub optimization: OptimizationOutcome,
    pub achieved_return: f64,
    pub achieved_risk: Option<f64>,
    pub allocations: Vec<Allocation>,
    pub whole_shares: ShareAllocation,
}

/// Fully assembled plan. Never mutated after the orchestrator returns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentPlan {
    pub universe_as_of: Option<NaiveDate>,
    pub monthly_investment: f64,
    pub selection: SelectionResult,
    pub optimization: OptimizationOutcome,
    pub allocations: Vec<Allocation>,
    pub whole_shares: ShareAllocation,
    pub projection: Projection,
    pub diversification: Diversification,
    pub summary: PlanSummary,
}
