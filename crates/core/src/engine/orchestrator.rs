use crate::domain::plan::{
    Allocation, Diversification, InvestmentPlan, PlanRequest, PlanSummary, Portfolio,
};
use crate::domain::selection::{Candidate, SelectionRound};
use crate::engine::allocator::{allocate, ShareAllocation, ShareTarget};
use crate::engine::optimizer::{optimize, Optimization, OptimizerConfig};
use crate::engine::projection::project;
use crate::engine::selector::{select, SelectionParams, FEASIBILITY_TOLERANCE};
use crate::error::PlanError;
use crate::universe::UniverseSnapshot;
use std::collections::{BTreeMap, BTreeSet};

/// Run selection, optimization, projection and whole-share allocation against one snapshot.
///
/// The first fatal error aborts the plan. Optimizer fallback is recorded on the plan, not
/// returned as an error.
pub fn build_plan(
    universe: &UniverseSnapshot,
    request: &PlanRequest,
) -> Result<InvestmentPlan, PlanError> {
    request.validate()?;
    let t0 = std::time::Instant::now();
    let horizon = request.horizon;

    let selection = select(universe, &SelectionParams::from(request))?;
    let (optimization, allocations, whole_shares) = weigh(&selection.candidates, request);

    let projection = project(
        request.monthly_investment,
        horizon.months(),
        optimization.achieved_return,
    );

    let mut diversification = Diversification {
        by_sector: BTreeMap::new(),
        by_style: BTreeMap::new(),
        by_risk: BTreeMap::new(),
    };
    for (c, &w) in selection.candidates.iter().zip(&optimization.weights) {
        *diversification.by_sector.entry(c.stock.sector.clone()).or_insert(0.0) += w;
        *diversification.by_style.entry(c.stock.style).or_insert(0.0) += w;
        *diversification.by_risk.entry(c.stock.risk_tier).or_insert(0.0) += w;
    }

    let achieved_cagr = optimization.achieved_return;
    let summary = PlanSummary {
        horizon_months: horizon.months(),
        horizon_years: horizon.years(),
        expected_cagr: request.expected_cagr,
        achieved_cagr,
        achieved_risk: optimization.achieved_risk,
        feasible: achieved_cagr >= request.expected_cagr - FEASIBILITY_TOLERANCE,
        optimized: optimization.outcome.is_optimized(),
        total_invested: projection.total_invested,
        final_value: projection.final_value,
        total_gain: projection.total_gain,
        money_multiplier: projection.money_multiplier,
        inflation_beat_margin: achieved_cagr - request.inflation_rate,
    };

    tracing::info!(
        %horizon,
        stocks = allocations.len(),
        achieved_cagr,
        feasible = summary.feasible,
        optimized = summary.optimized,
        final_value = summary.final_value,
        unallocated_cash = whole_shares.unallocated_cash,
        elapsed_ms = t0.elapsed().as_millis(),
        "investment plan built"
    );

    Ok(InvestmentPlan {
        universe_as_of: universe.as_of_date(),
        monthly_investment: request.monthly_investment,
        selection,
        optimization: optimization.outcome,
        allocations,
        whole_shares,
        projection,
        diversification,
        summary,
    })
}

/// Optimize and allocate a caller-chosen set of tickers, skipping selection.
///
/// Tickers are matched case-insensitively. An empty or repeated ticker list is a
/// validation error; a ticker missing from the snapshot is `UnknownTicker`.
pub fn build_portfolio(
    universe: &UniverseSnapshot,
    tickers: &[String],
    request: &PlanRequest,
) -> Result<Portfolio, PlanError> {
    request.validate()?;
    let horizon = request.horizon;

    if tickers.is_empty() {
        return Err(PlanError::validation("tickers", "at least one ticker is required"));
    }

    let mut seen = BTreeSet::new();
    let mut candidates = Vec::with_capacity(tickers.len());
    for raw in tickers {
        let ticker = raw.trim().to_ascii_uppercase();
        if !seen.insert(ticker.clone()) {
            return Err(PlanError::validation(
                "tickers",
                format!("duplicate ticker {ticker}"),
            ));
        }
        let stock = universe
            .get(&ticker)
            .ok_or_else(|| PlanError::UnknownTicker {
                ticker: ticker.clone(),
            })?;
        let expected_return = stock.expected_return(horizon).ok_or_else(|| {
            PlanError::validation("tickers", format!("{ticker} has no forecast for {horizon}"))
        })?;
        candidates.push(Candidate {
            stock: stock.clone(),
            round: SelectionRound::Requested,
            ratio: stock.ratio_for(horizon),
            expected_return,
        });
    }

    let (optimization, allocations, whole_shares) = weigh(&candidates, request);

    tracing::info!(
        %horizon,
        stocks = allocations.len(),
        achieved_return = optimization.achieved_return,
        optimized = optimization.outcome.is_optimized(),
        total_spent = whole_shares.total_spent,
        "portfolio built"
    );

    Ok(Portfolio {
        horizon,
        monthly_investment: request.monthly_investment,
        optimization: optimization.outcome,
        achieved_return: optimization.achieved_return,
        achieved_risk: optimization.achieved_risk,
        allocations,
        whole_shares,
    })
}

fn weigh(
    candidates: &[Candidate],
    request: &PlanRequest,
) -> (Optimization, Vec<Allocation>, ShareAllocation) {
    let optimization = optimize(
        candidates,
        &OptimizerConfig {
            target_return: request.expected_cagr,
            max_weight: request.max_weight,
            risk_aversion: request.risk_aversion,
            ..OptimizerConfig::default()
        },
    );

    let allocations: Vec<Allocation> = candidates
        .iter()
        .zip(&optimization.weights)
        .map(|(c, &weight)| Allocation {
            ticker: c.stock.ticker.clone(),
            sector: c.stock.sector.clone(),
            weight,
            monthly_allocation: weight * request.monthly_investment,
            price: c.stock.price,
            ratio: c.ratio,
            expected_return: c.expected_return,
        })
        .collect();

    let targets: Vec<ShareTarget> = allocations
        .iter()
        .map(|a| ShareTarget {
            ticker: a.ticker.clone(),
            weight: a.weight,
            price: a.price,
        })
        .collect();
    let whole_shares = allocate(&targets, request.monthly_investment);

    (optimization, allocations, whole_shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanDefaults;
    use crate::domain::stock::{Horizon, RiskTier};
    use crate::engine::optimizer::{FallbackReason, OptimizationOutcome};
    use crate::engine::projection::future_value;
    use crate::universe::snapshot::fixtures::stock;
    use approx::assert_relative_eq;

    fn universe() -> UniverseSnapshot {
        let mut stocks = vec![
            stock("AUTO1", "Autos", 0.6, 0.16, 850.0),
            stock("AUTO2", "Autos", 0.9, 0.14, 1_200.0),
            stock("BANK1", "Banks", 0.7, 0.13, 540.0),
            stock("BANK2", "Banks", 0.95, 0.15, 1_650.0),
            stock("CHEM1", "Chemicals", 0.8, 0.19, 2_300.0),
            stock("CHEM2", "Chemicals", 1.4, 0.22, 410.0),
            stock("IT1", "Technology", 0.5, 0.18, 3_100.0),
            stock("IT2", "Technology", 0.85, 0.17, 1_480.0),
            stock("PHARMA1", "Pharma", 0.75, 0.12, 990.0),
            stock("PHARMA2", "Pharma", 1.8, 0.24, 2_050.0),
        ];
        stocks[0].risk_tier = RiskTier::Low;
        stocks[4].risk_tier = RiskTier::High;
        UniverseSnapshot::new(chrono::NaiveDate::from_ymd_opt(2025, 6, 30), stocks).unwrap()
    }

    fn request() -> PlanRequest {
        let mut req = PlanRequest::with_defaults(100_000.0, 36, &PlanDefaults::default()).unwrap();
        req.expected_cagr = 0.14;
        req.min_stocks = 5;
        req.max_stocks = 8;
        req
    }

    #[test]
    fn builds_a_complete_plan() {
        let plan = build_plan(&universe(), &request()).unwrap();

        assert_eq!(plan.selection.candidates.len(), 8);
        assert_eq!(plan.allocations.len(), 8);
        assert!(plan.summary.optimized);
        assert_eq!(plan.universe_as_of, chrono::NaiveDate::from_ymd_opt(2025, 6, 30));

        let total: f64 = plan.allocations.iter().map(|a| a.weight).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-6);
        for a in &plan.allocations {
            assert!(a.weight >= 0.0 && a.weight <= 0.25 + 1e-9);
            assert_relative_eq!(a.monthly_allocation, a.weight * 100_000.0, epsilon = 1e-6);
        }

        assert!(plan.summary.achieved_cagr >= 0.14 - 1e-6);
        assert!(plan.summary.feasible);
        assert!(plan.whole_shares.total_spent <= 100_000.0);
        assert_eq!(plan.projection.trajectory.len(), 36);
        assert_eq!(plan.projection.yearly_checkpoints.len(), 3);
        assert_relative_eq!(
            plan.summary.inflation_beat_margin,
            plan.summary.achieved_cagr - 0.06,
            epsilon = 1e-12
        );
    }

    #[test]
    fn diversification_sums_to_one() {
        let plan = build_plan(&universe(), &request()).unwrap();
        let d = &plan.diversification;
        assert_eq!(d.by_sector.len(), 5);
        for map_total in [
            d.by_sector.values().sum::<f64>(),
            d.by_style.values().sum::<f64>(),
            d.by_risk.values().sum::<f64>(),
        ] {
            assert_relative_eq!(map_total, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn final_value_round_trips_through_annuity_formula() {
        let plan = build_plan(&universe(), &request()).unwrap();
        let fv = future_value(100_000.0, 36, plan.summary.achieved_cagr);
        assert_relative_eq!(fv, plan.summary.final_value, max_relative = 1e-12);
    }

    #[test]
    fn degenerate_risk_is_flagged_not_fatal() {
        let mut stocks: Vec<_> = universe().stocks().to_vec();
        stocks[2].volatility = Some(0.0);
        let snap = UniverseSnapshot::new(None, stocks).unwrap();

        let plan = build_plan(&snap, &request()).unwrap();
        assert!(!plan.summary.optimized);
        assert_eq!(
            plan.optimization,
            OptimizationOutcome::Fallback {
                reason: FallbackReason::DegenerateCovariance
            }
        );
        assert!(plan.summary.achieved_risk.is_none());
        let n = plan.allocations.len() as f64;
        for a in &plan.allocations {
            assert_relative_eq!(a.weight, 1.0 / n, epsilon = 1e-12);
        }
    }

    #[test]
    fn validation_runs_before_selection() {
        let mut req = request();
        req.monthly_investment = -5.0;
        let err = build_plan(&UniverseSnapshot::empty(), &req).unwrap_err();
        assert!(matches!(err, PlanError::Validation { field: "monthly_investment", .. }));
    }

    #[test]
    fn empty_universe_is_fatal() {
        let err = build_plan(&UniverseSnapshot::empty(), &request()).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_UNIVERSE");
        assert!(matches!(
            err,
            PlanError::InsufficientUniverse {
                horizon: Horizon::M36,
                ..
            }
        ));
    }

    #[test]
    fn unreachable_target_still_produces_a_plan() {
        let mut req = request();
        req.expected_cagr = 0.40;
        let plan = build_plan(&universe(), &req).unwrap();
        assert!(!plan.summary.optimized);
        assert!(!plan.summary.feasible);
        assert!(!plan.selection.feasible);
    }

    fn names(tickers: &[&str]) -> Vec<String> {
        tickers.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn portfolio_weighs_requested_tickers_only() {
        let mut req = request();
        req.max_weight = Some(0.5);
        req.expected_cagr = 0.15;
        let p = build_portfolio(&universe(), &names(&["it1", "CHEM1", "bank1"]), &req).unwrap();

        let tickers: Vec<&str> = p.allocations.iter().map(|a| a.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["IT1", "CHEM1", "BANK1"]);
        let total: f64 = p.allocations.iter().map(|a| a.weight).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-6);
        assert!(p.whole_shares.total_spent <= 100_000.0);
        assert_eq!(p.whole_shares.lots.len(), 3);
        assert_eq!(p.horizon, Horizon::M36);
    }

    #[test]
    fn portfolio_rejects_unknown_duplicate_and_empty() {
        let req = request();
        let err = build_portfolio(&universe(), &names(&["IT1", "NOPE"]), &req).unwrap_err();
        assert_eq!(err, PlanError::UnknownTicker { ticker: "NOPE".to_string() });

        let err = build_portfolio(&universe(), &names(&["IT1", "it1"]), &req).unwrap_err();
        assert!(matches!(err, PlanError::Validation { field: "tickers", .. }));

        let err = build_portfolio(&universe(), &[], &req).unwrap_err();
        assert!(matches!(err, PlanError::Validation { field: "tickers", .. }));
    }

    #[test]
    fn single_ticker_portfolio_falls_back() {
        let p = build_portfolio(&universe(), &names(&["IT1"]), &request()).unwrap();
        assert_eq!(
            p.optimization,
            OptimizationOutcome::Fallback {
                reason: FallbackReason::TooFewCandidates
            }
        );
        assert_eq!(p.allocations[0].weight, 1.0);
    }
}
