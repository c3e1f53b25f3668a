//! Whole-share allocation of a monthly budget.
//!
//! Each ticker first gets `floor(weight · budget / price)` shares. The pooled rounding
//! leftover is then spent one share at a time, cheapest ticker first, in repeated passes
//! until no ticker is affordable. Total spend never exceeds the budget.
//!
//! Cash is counted in whole paise: the budget rounds down and each price rounds up to the
//! next paisa, so reported spend is `spent_paise / 100` and never exceeds the budget.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct ShareTarget {
    pub ticker: String,
    pub weight: f64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareLot {
    pub ticker: String,
    pub price: f64,
    pub weight: f64,
    pub target_cash: f64,
    /// Fractional share count the weight asks for.
    pub target_shares: f64,
    /// Shares after redistribution (includes `bonus_shares`).
    pub shares: u64,
    pub bonus_shares: u64,
    pub cost: f64,
    /// `cost / total_spent`; zero when nothing was bought.
    pub actual_weight: f64,
    /// Cash left over from rounding this ticker's target down.
    pub rounding_leftover: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareAllocation {
    pub monthly_investment: f64,
    pub lots: Vec<ShareLot>,
    pub total_spent: f64,
    pub unallocated_cash: f64,
}

impl ShareAllocation {
    pub fn total_shares(&self) -> u64 {
        self.lots.iter().map(|l| l.shares).sum()
    }
}

fn buyable(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Largest whole-paise amount not above `x`.
fn paise_floor(x: f64) -> u64 {
    let p = (x * 100.0).round();
    if p / 100.0 > x {
        (p as u64).saturating_sub(1)
    } else {
        p as u64
    }
}

/// Smallest whole-paise amount not below `x`.
fn paise_ceil(x: f64) -> u64 {
    let p = (x * 100.0).round();
    if p / 100.0 < x {
        p as u64 + 1
    } else {
        p as u64
    }
}

fn rupees(paise: u64) -> f64 {
    paise as f64 / 100.0
}

pub fn allocate(targets: &[ShareTarget], monthly_investment: f64) -> ShareAllocation {
    let budget = if monthly_investment.is_finite() {
        monthly_investment.max(0.0)
    } else {
        0.0
    };
    let budget_paise = paise_floor(budget);

    // Zero marks a ticker that can't be bought.
    let prices: Vec<u64> = targets
        .iter()
        .map(|t| if buyable(t.price) { paise_ceil(t.price).max(1) } else { 0 })
        .collect();

    let mut remaining = budget_paise;
    let mut lots: Vec<ShareLot> = targets
        .iter()
        .zip(&prices)
        .map(|(t, &price)| {
            let weight = if t.weight.is_finite() { t.weight.max(0.0) } else { 0.0 };
            let target_cash = weight * budget;
            let (target_shares, shares) = if price > 0 {
                let want = (target_cash / t.price).floor().max(0.0) as u64;
                (target_cash / t.price, want.min(remaining / price))
            } else {
                (0.0, 0)
            };
            remaining -= shares * price;
            let cost = rupees(shares * price);
            ShareLot {
                ticker: t.ticker.clone(),
                price: t.price,
                weight,
                target_cash,
                target_shares,
                shares,
                bonus_shares: 0,
                cost,
                actual_weight: 0.0,
                rounding_leftover: target_cash - cost,
            }
        })
        .collect();

    let mut order: Vec<usize> = (0..lots.len()).filter(|&i| prices[i] > 0).collect();
    order.sort_by(|&a, &b| {
        prices[a]
            .cmp(&prices[b])
            .then_with(|| lots[a].ticker.cmp(&lots[b].ticker))
    });

    loop {
        let mut bought = false;
        for &i in &order {
            if prices[i] <= remaining {
                lots[i].shares += 1;
                lots[i].bonus_shares += 1;
                remaining -= prices[i];
                bought = true;
            }
        }
        if !bought {
            break;
        }
    }

    let spent_paise = budget_paise - remaining;
    let total_spent = rupees(spent_paise);
    for (lot, &price) in lots.iter_mut().zip(&prices) {
        lot.cost = rupees(lot.shares * price);
        if spent_paise > 0 {
            lot.actual_weight = (lot.shares * price) as f64 / spent_paise as f64;
        }
    }
    let unallocated_cash = (budget - total_spent).max(0.0);

    tracing::debug!(
        tickers = lots.len(),
        total_spent,
        unallocated_cash,
        "whole shares allocated"
    );

    ShareAllocation {
        monthly_investment: budget,
        lots,
        total_spent,
        unallocated_cash,
    }
}
