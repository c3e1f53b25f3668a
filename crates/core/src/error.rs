use crate::domain::stock::Horizon;
use serde::Serialize;
use std::fmt;

/// Pipeline stage that raised a fatal error. Later stages degrade instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStage {
    Validation,
    Selection,
}

impl fmt::Display for PlanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStage::Validation => "validation",
            PlanStage::Selection => "selection",
        };
        f.write_str(s)
    }
}

/// Fatal plan errors. Optimizer degradation is not an error and never shows up here.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error(
        "insufficient universe for {horizon}: {eligible} of {universe_size} stocks carry a forecast"
    )]
    InsufficientUniverse {
        horizon: Horizon,
        universe_size: usize,
        eligible: usize,
    },

    #[error("unknown ticker {ticker}")]
    UnknownTicker { ticker: String },

    #[error(
        "no stock selectable (threshold {ratio_threshold}, relaxed={relaxed}, eligible={eligible}, found={found})"
    )]
    InfeasibleSelection {
        ratio_threshold: f64,
        relaxed: bool,
        eligible: usize,
        found: usize,
    },
}

impl PlanError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        PlanError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn stage(&self) -> PlanStage {
        match self {
            PlanError::Validation { .. } | PlanError::UnknownTicker { .. } => {
                PlanStage::Validation
            }
            PlanError::InsufficientUniverse { .. } | PlanError::InfeasibleSelection { .. } => {
                PlanStage::Selection
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PlanError::Validation { .. } => "VALIDATION_ERROR",
            PlanError::UnknownTicker { .. } => "STOCK_NOT_FOUND",
            PlanError::InsufficientUniverse { .. } => "INSUFFICIENT_UNIVERSE",
            PlanError::InfeasibleSelection { .. } => "INFEASIBLE_SELECTION",
        }
    }
}

/// Snapshot construction and loading failures.
#[derive(Debug, thiserror::Error)]
pub enum UniverseError {
    #[error("duplicate ticker {0}")]
    DuplicateTicker(String),

    #[error("invalid stock {ticker}: {reason}")]
    InvalidStock { ticker: String, reason: String },

    #[error("stock {ticker} has no forecast for {horizon}")]
    MissingForecast { ticker: String, horizon: Horizon },

    #[error("unsupported universe file extension: {0}")]
    UnsupportedFormat(String),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
