use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Supported investment horizons in months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Horizon {
    M6,
    M12,
    M18,
    M24,
    M36,
    M48,
    M60,
}

impl Horizon {
    pub const ALL: [Horizon; 7] = [
        Horizon::M6,
        Horizon::M12,
        Horizon::M18,
        Horizon::M24,
        Horizon::M36,
        Horizon::M48,
        Horizon::M60,
    ];

    pub fn months(self) -> u32 {
        match self {
            Horizon::M6 => 6,
            Horizon::M12 => 12,
            Horizon::M18 => 18,
            Horizon::M24 => 24,
            Horizon::M36 => 36,
            Horizon::M48 => 48,
            Horizon::M60 => 60,
        }
    }

    pub fn years(self) -> f64 {
        self.months() as f64 / 12.0
    }
}

impl TryFrom<u32> for Horizon {
    type Error = PlanError;

    fn try_from(months: u32) -> Result<Self, Self::Error> {
        Horizon::ALL
            .into_iter()
            .find(|h| h.months() == months)
            .ok_or_else(|| {
                PlanError::validation(
                    "horizon_months",
                    format!("unsupported horizon {months} (expected one of 6, 12, 18, 24, 36, 48, 60)"),
                )
            })
    }
}

impl From<Horizon> for u32 {
    fn from(h: Horizon) -> u32 {
        h.months()
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.months())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Annualised volatility proxy for the tier.
    pub fn volatility_proxy(self) -> f64 {
        match self {
            RiskTier::Low => 0.15,
            RiskTier::Medium => 0.25,
            RiskTier::High => 0.35,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskTier::Low),
            "medium" | "moderate" => Some(RiskTier::Medium),
            "high" => Some(RiskTier::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InvestmentStyle {
    DeepValue,
    Value,
    #[serde(alias = "Balanced")]
    Blend,
    Growth,
}

impl InvestmentStyle {
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "deepvalue" => Some(InvestmentStyle::DeepValue),
            "value" => Some(InvestmentStyle::Value),
            "blend" | "balanced" => Some(InvestmentStyle::Blend),
            "growth" => Some(InvestmentStyle::Growth),
            _ => None,
        }
    }
}

/// One row of the stock universe. Return figures are annualised fractions (0.15 = 15%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub sector: String,
    pub style: InvestmentStyle,
    /// Valuation-growth ratio (PEG-like); lower is cheaper relative to growth.
    pub peg_ratio: f64,
    pub price: f64,
    pub risk_tier: RiskTier,
    pub forecasts: BTreeMap<Horizon, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pb_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_historical_cagr: Option<f64>,
    /// Annualised volatility; overrides the tier proxy when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<f64>,
}

impl Stock {
    pub fn expected_return(&self, horizon: Horizon) -> Option<f64> {
        self.forecasts.get(&horizon).copied()
    }

    /// Valuation-growth ratio used for ranking at `horizon`. The ratio is derived from
    /// trailing growth, so it does not vary across horizons.
    pub fn ratio_for(&self, _horizon: Horizon) -> f64 {
        self.peg_ratio
    }

    pub fn variance_proxy(&self) -> f64 {
        let sigma = self
            .volatility
            .unwrap_or_else(|| self.risk_tier.volatility_proxy());
        sigma * sigma
    }
}
