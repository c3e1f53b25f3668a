//! Long-only mean-variance weights with an equal-weight fallback.
//!
//! Minimises `wᵀΣw − μᵀw / risk_aversion` over `{ w ≥ 0, w ≤ cap, Σw = 1 }` by projected
//! gradient descent. A return floor `μᵀw ≥ target` is enforced by adding `λ·μᵀw` to the
//! reward and bisecting on `λ ≥ 0`. Any numerical trouble degrades to equal weights; the
//! result records which path was taken.

use crate::domain::selection::Candidate;
use serde::Serialize;
use std::fmt;

/// Slack on the return floor and on sum-to-one checks.
const RETURN_SLACK: f64 = 1e-9;
/// Weights below this are snapped to zero before renormalising.
const DUST: f64 = 1e-10;
const BISECTION_STEPS: usize = 60;
const MAX_LAMBDA: f64 = 1e12;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Minimum portfolio expected return (annualised fraction).
    pub target_return: f64,
    /// Per-stock cap; `None` means uncapped.
    pub max_weight: Option<f64>,
    pub risk_aversion: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            target_return: 0.0,
            max_weight: None,
            risk_aversion: 10.0,
            max_iterations: 5_000,
            tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    TooFewCandidates,
    DegenerateCovariance,
    InvalidConfig,
    DidNotConverge,
    TargetUnreachable,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallbackReason::TooFewCandidates => "fewer than two candidates",
            FallbackReason::DegenerateCovariance => "covariance matrix is degenerate",
            FallbackReason::InvalidConfig => "optimizer configuration is invalid",
            FallbackReason::DidNotConverge => "solver did not converge",
            FallbackReason::TargetUnreachable => "target return is above the best feasible return",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OptimizationOutcome {
    Optimized { iterations: usize },
    Fallback { reason: FallbackReason },
}

impl OptimizationOutcome {
    pub fn is_optimized(&self) -> bool {
        matches!(self, OptimizationOutcome::Optimized { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Optimization {
    /// One weight per input, in input order.
    pub weights: Vec<f64>,
    pub achieved_return: f64,
    /// Portfolio variance `wᵀΣw`; absent when the covariance could not be used.
    pub achieved_risk: Option<f64>,
    /// Cap actually applied (raised to `1/n` when the requested cap is infeasible).
    pub effective_max_weight: f64,
    pub outcome: OptimizationOutcome,
}

/// Symmetric, row-major covariance matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    n: usize,
    data: Vec<f64>,
}

impl CovarianceMatrix {
    pub fn diagonal(variances: &[f64]) -> Self {
        let n = variances.len();
        let mut data = vec![0.0; n * n];
        for (i, v) in variances.iter().enumerate() {
            data[i * n + i] = *v;
        }
        Self { n, data }
    }

    /// Independent-risk model built from each candidate's volatility or risk-tier proxy.
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        let variances: Vec<f64> = candidates.iter().map(|c| c.stock.variance_proxy()).collect();
        Self::diagonal(&variances)
    }

    /// `None` when the rows are ragged.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let n = rows.len();
        if rows.iter().any(|r| r.len() != n) {
            return None;
        }
        Some(Self {
            n,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    /// Finite, symmetric, strictly positive diagonal.
    pub fn is_usable(&self) -> bool {
        if self.data.iter().any(|v| !v.is_finite()) {
            return false;
        }
        (0..self.n).all(|i| {
            self.get(i, i) > 0.0
                && (0..i).all(|j| (self.get(i, j) - self.get(j, i)).abs() <= 1e-12)
        })
    }

    pub fn quadratic_form(&self, w: &[f64]) -> f64 {
        let mut acc = 0.0;
        for (i, wi) in w.iter().enumerate() {
            let row = &self.data[i * self.n..(i + 1) * self.n];
            acc += wi * row.iter().zip(w).map(|(c, wj)| c * wj).sum::<f64>();
        }
        acc
    }

    fn mul_vec(&self, w: &[f64], out: &mut [f64]) {
        for (i, o) in out.iter_mut().enumerate() {
            let row = &self.data[i * self.n..(i + 1) * self.n];
            *o = row.iter().zip(w).map(|(c, wj)| c * wj).sum();
        }
    }

    /// Gershgorin bound on the largest eigenvalue.
    fn spectral_bound(&self) -> f64 {
        (0..self.n)
            .map(|i| self.data[i * self.n..(i + 1) * self.n].iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }
}

/// Weights for `candidates` under the diagonal risk model.
pub fn optimize(candidates: &[Candidate], config: &OptimizerConfig) -> Optimization {
    let expected: Vec<f64> = candidates.iter().map(|c| c.expected_return).collect();
    optimize_with_covariance(&expected, &CovarianceMatrix::from_candidates(candidates), config)
}

pub fn optimize_with_covariance(
    expected: &[f64],
    cov: &CovarianceMatrix,
    config: &OptimizerConfig,
) -> Optimization {
    let n = expected.len();
    let cap = effective_cap(n, config.max_weight);
    let cov_ok = cov.dim() == n && cov.is_usable();

    if n < 2 {
        return fallback(expected, cov, cov_ok, cap, FallbackReason::TooFewCandidates);
    }
    if !cov_ok || expected.iter().any(|r| !r.is_finite()) {
        return fallback(expected, cov, cov_ok, cap, FallbackReason::DegenerateCovariance);
    }
    if !(config.risk_aversion.is_finite() && config.risk_aversion > 0.0)
        || !config.target_return.is_finite()
        || config.max_iterations == 0
    {
        return fallback(expected, cov, cov_ok, cap, FallbackReason::InvalidConfig);
    }
    if max_feasible_return(expected, cap) < config.target_return - RETURN_SLACK {
        return fallback(expected, cov, cov_ok, cap, FallbackReason::TargetUnreachable);
    }

    let solver = Solver {
        mu: expected,
        cov,
        cap,
        reward: 1.0 / config.risk_aversion,
        step: 1.0 / (2.0 * cov.spectral_bound()),
        max_iterations: config.max_iterations,
        tolerance: config.tolerance,
    };
    let meets = |w: &[f64]| dot(expected, w) >= config.target_return - RETURN_SLACK;

    let mut iterations = 0;
    let equal = vec![1.0 / n as f64; n];
    let mut best = solver.solve(0.0, &equal);
    iterations += best.iterations;

    if best.converged && !meets(&best.weights) {
        let mut lo = 0.0;
        let mut hi = 1.0;
        let mut hi_sol = solver.solve(hi, &best.weights);
        iterations += hi_sol.iterations;

        while !meets(&hi_sol.weights) {
            if hi >= MAX_LAMBDA {
                return fallback(expected, cov, cov_ok, cap, FallbackReason::DidNotConverge);
            }
            lo = hi;
            hi *= 2.0;
            hi_sol = solver.solve(hi, &hi_sol.weights);
            iterations += hi_sol.iterations;
        }

        for _ in 0..BISECTION_STEPS {
            if hi - lo <= 1e-9 * hi.max(1.0) {
                break;
            }
            let mid = 0.5 * (lo + hi);
            let sol = solver.solve(mid, &hi_sol.weights);
            iterations += sol.iterations;
            if meets(&sol.weights) {
                hi = mid;
                hi_sol = sol;
            } else {
                lo = mid;
            }
        }
        best = hi_sol;
    }

    if !best.converged {
        return fallback(expected, cov, cov_ok, cap, FallbackReason::DidNotConverge);
    }

    let weights = clean(best.weights);
    let achieved_return = dot(expected, &weights);
    let achieved_risk = cov.quadratic_form(&weights);

    tracing::debug!(
        n,
        iterations,
        cap,
        achieved_return,
        achieved_risk,
        "portfolio optimized"
    );

    Optimization {
        weights,
        achieved_return,
        achieved_risk: Some(achieved_risk),
        effective_max_weight: cap,
        outcome: OptimizationOutcome::Optimized { iterations },
    }
}

struct Solver<'a> {
    mu: &'a [f64],
    cov: &'a CovarianceMatrix,
    cap: f64,
    reward: f64,
    step: f64,
    max_iterations: usize,
    tolerance: f64,
}

struct Solve {
    weights: Vec<f64>,
    iterations: usize,
    converged: bool,
}

impl Solver<'_> {
    fn solve(&self, lambda: f64, start: &[f64]) -> Solve {
        let c = self.reward + lambda;
        let mut w = start.to_vec();
        let mut sigma_w = vec![0.0; w.len()];
        let mut trial = vec![0.0; w.len()];

        for it in 1..=self.max_iterations {
            self.cov.mul_vec(&w, &mut sigma_w);
            for i in 0..w.len() {
                trial[i] = w[i] - self.step * (2.0 * sigma_w[i] - c * self.mu[i]);
            }
            let next = project_capped_simplex(&trial, self.cap);

            let delta = next
                .iter()
                .zip(&w)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            w = next;
            if !delta.is_finite() {
                break;
            }
            if delta <= self.tolerance {
                return Solve {
                    weights: w,
                    iterations: it,
                    converged: true,
                };
            }
        }

        Solve {
            weights: w,
            iterations: self.max_iterations,
            converged: false,
        }
    }
}

/// Euclidean projection onto `{ 0 ≤ w ≤ cap, Σw = 1 }` by bisection on the shift `τ`.
/// Requires `cap · n ≥ 1`.
pub fn project_capped_simplex(v: &[f64], cap: f64) -> Vec<f64> {
    let clamp = |x: f64, tau: f64| (x - tau).clamp(0.0, cap);
    let mass = |tau: f64| v.iter().map(|&x| clamp(x, tau)).sum::<f64>();

    let (mut lo, mut hi) = v.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
        (lo.min(x), hi.max(x))
    });
    lo -= cap;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if mass(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
            break;
        }
    }
    let tau = 0.5 * (lo + hi);
    let mut w: Vec<f64> = v.iter().map(|&x| clamp(x, tau)).collect();
    let sum: f64 = w.iter().sum();
    if sum > 0.0 {
        w.iter_mut().for_each(|x| *x /= sum);
    }
    w
}

fn effective_cap(n: usize, requested: Option<f64>) -> f64 {
    if n == 0 {
        return 1.0;
    }
    let floor = 1.0 / n as f64;
    requested.unwrap_or(1.0).clamp(floor, 1.0)
}

/// Best return reachable under the cap: fill the highest-return names first.
fn max_feasible_return(expected: &[f64], cap: f64) -> f64 {
    let mut sorted = expected.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let mut left = 1.0_f64;
    let mut total = 0.0;
    for r in sorted {
        if left <= 0.0 {
            break;
        }
        let w = left.min(cap);
        total += w * r;
        left -= w;
    }
    total
}

fn fallback(
    expected: &[f64],
    cov: &CovarianceMatrix,
    cov_ok: bool,
    cap: f64,
    reason: FallbackReason,
) -> Optimization {
    let n = expected.len();
    let weights = if n == 0 {
        Vec::new()
    } else {
        vec![1.0 / n as f64; n]
    };
    let achieved_return = if n == 0 { 0.0 } else { dot(expected, &weights) };
    let achieved_risk = cov_ok.then(|| cov.quadratic_form(&weights));

    tracing::warn!(n, %reason, achieved_return, "optimizer fell back to equal weights");

    Optimization {
        weights,
        achieved_return,
        achieved_risk,
        effective_max_weight: cap,
        outcome: OptimizationOutcome::Fallback { reason },
    }
}

fn clean(mut w: Vec<f64>) -> Vec<f64> {
    for x in w.iter_mut() {
        if *x < DUST {
            *x = 0.0;
        }
    }
    let sum: f64 = w.iter().sum();
    if sum > 0.0 {
        w.iter_mut().for_each(|x| *x /= sum);
    }
    w
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
