//! Future value of a monthly SIP under a constant annualised return.
//!
//! Contributions land at the start of each month (annuity due) and compound monthly at
//! `(1 + cagr)^(1/12) − 1`.

use serde::Serialize;

/// Monthly rates smaller than this use the zero-rate limit `P · n`.
const ZERO_RATE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectionPoint {
    pub month: u32,
    pub invested: f64,
    pub projected_value: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub monthly_investment: f64,
    pub horizon_months: u32,
    pub achieved_cagr: f64,
    pub monthly_rate: f64,
    pub total_invested: f64,
    pub final_value: f64,
    pub total_gain: f64,
    /// `final_value / total_invested`.
    pub money_multiplier: f64,
    pub monthly_avg_gain: f64,
    /// `total_gain / total_invested`, as a fraction.
    pub total_return: f64,
    /// Month 1 through `horizon_months`.
    pub trajectory: Vec<ProjectionPoint>,
    /// Every 12th month, plus the final month when the horizon is not whole years.
    pub yearly_checkpoints: Vec<ProjectionPoint>,
}

/// Monthly compounding rate equivalent to `cagr`. Returns below −100% are floored at a
/// total loss.
pub fn monthly_rate(cagr: f64) -> f64 {
    (1.0 + cagr).max(0.0).powf(1.0 / 12.0) - 1.0
}

/// Annuity-due future value of `months` contributions of `monthly_investment`.
pub fn future_value(monthly_investment: f64, months: u32, cagr: f64) -> f64 {
    value_at(monthly_investment, months, monthly_rate(cagr))
}

fn value_at(monthly_investment: f64, months: u32, r: f64) -> f64 {
    let n = months as f64;
    if r.abs() < ZERO_RATE {
        return monthly_investment * n;
    }
    let growth = (1.0 + r).powi(months as i32);
    monthly_investment * (growth - 1.0) / r * (1.0 + r)
}

pub fn project(monthly_investment: f64, horizon_months: u32, achieved_cagr: f64) -> Projection {
    let r = monthly_rate(achieved_cagr);

    let trajectory: Vec<ProjectionPoint> = (1..=horizon_months)
        .map(|month| {
            let invested = monthly_investment * month as f64;
            let projected_value = value_at(monthly_investment, month, r);
            ProjectionPoint {
                month,
                invested,
                projected_value,
                gain: projected_value - invested,
            }
        })
        .collect();

    let yearly_checkpoints: Vec<ProjectionPoint> = trajectory
        .iter()
        .filter(|p| p.month % 12 == 0 || p.month == horizon_months)
        .copied()
        .collect();

    let total_invested = monthly_investment * horizon_months as f64;
    let final_value = value_at(monthly_investment, horizon_months, r);
    let total_gain = final_value - total_invested;
    let (money_multiplier, total_return) = if total_invested > 0.0 {
        (final_value / total_invested, total_gain / total_invested)
    } else {
        (1.0, 0.0)
    };
    let monthly_avg_gain = if horizon_months > 0 {
        total_gain / horizon_months as f64
    } else {
        0.0
    };

    Projection {
        monthly_investment,
        horizon_months,
        achieved_cagr,
        monthly_rate: r,
        total_invested,
        final_value,
        total_gain,
        money_multiplier,
        monthly_avg_gain,
        total_return,
        trajectory,
        yearly_checkpoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_rate_is_plain_sum_of_contributions() {
        let p = project(100_000.0, 36, 0.0);
        assert_eq!(p.final_value, 3_600_000.0);
        assert_eq!(p.total_invested, 3_600_000.0);
        assert_eq!(p.total_gain, 0.0);
        assert_eq!(p.money_multiplier, 1.0);
        assert_eq!(p.trajectory.len(), 36);
    }

    #[test]
    fn matches_annuity_due_formula() {
        let p = project(10_000.0, 12, 0.12);
        let r = 1.12_f64.powf(1.0 / 12.0) - 1.0;
        let expected = 10_000.0 * ((1.0 + r).powi(12) - 1.0) / r * (1.0 + r);

        assert_relative_eq!(p.monthly_rate, r, epsilon = 1e-15);
        assert_relative_eq!(p.final_value, expected, max_relative = 1e-12);
        assert_relative_eq!(p.total_gain, expected - 120_000.0, max_relative = 1e-9);
        // Twelve start-of-month deposits at 12% a year end well above principal.
        assert!(p.final_value > 120_000.0 && p.final_value < 120_000.0 * 1.12);
    }

    #[test]
    fn first_month_earns_one_month_of_growth() {
        let p = project(1_000.0, 6, 0.10);
        let first = p.trajectory[0];
        assert_eq!(first.month, 1);
        assert_relative_eq!(first.projected_value, 1_000.0 * (1.0 + p.monthly_rate), max_relative = 1e-12);
    }

    #[test]
    fn trajectory_is_monotone_for_positive_rates() {
        let p = project(5_000.0, 60, 0.18);
        for pair in p.trajectory.windows(2) {
            assert!(pair[1].invested > pair[0].invested);
            assert!(pair[1].projected_value >= pair[0].projected_value);
        }
        assert_eq!(p.trajectory.last().map(|x| x.projected_value), Some(p.final_value));
    }

    #[test]
    fn summary_metrics_are_consistent() {
        let p = project(20_000.0, 24, 0.15);
        assert_relative_eq!(p.money_multiplier, p.final_value / p.total_invested);
        assert_relative_eq!(p.total_return, p.money_multiplier - 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.monthly_avg_gain * 24.0, p.total_gain, max_relative = 1e-12);
    }

    #[test]
    fn checkpoints_cover_years_and_final_month() {
        let p = project(1_000.0, 18, 0.1);
        let months: Vec<u32> = p.yearly_checkpoints.iter().map(|c| c.month).collect();
        assert_eq!(months, vec![12, 18]);

        let p = project(1_000.0, 36, 0.1);
        let months: Vec<u32> = p.yearly_checkpoints.iter().map(|c| c.month).collect();
        assert_eq!(months, vec![12, 24, 36]);
        assert_eq!(p.yearly_checkpoints[2], p.trajectory[35]);

        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["yearly_checkpoints"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["yearly_checkpoints"][0]["month"], 12);
    }

    #[test]
    fn negative_returns_lose_money_without_faults() {
        let p = project(1_000.0, 12, -0.2);
        assert!(p.final_value < p.total_invested);
        assert!(p.final_value.is_finite());

        let wiped = project(1_000.0, 12, -1.5);
        assert_relative_eq!(wiped.monthly_rate, -1.0);
        assert_eq!(wiped.final_value, 0.0);
    }

    #[test]
    fn future_value_agrees_with_project() {
        let p = project(7_500.0, 48, 0.13);
        assert_relative_eq!(future_value(7_500.0, 48, 0.13), p.final_value);
    }
}
