pub mod domain;
pub mod engine;
pub mod error;
pub mod universe;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_REFRESH_SECS: u64 = 300;
    const DEFAULT_PORT: u16 = 3000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub universe_path: Option<PathBuf>,
        pub sentry_dsn: Option<String>,
        pub universe_refresh: Duration,
        pub port: u16,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let refresh_secs =
                env_parse::<u64>("UNIVERSE_REFRESH_SECS").unwrap_or(DEFAULT_REFRESH_SECS);

            Ok(Self {
                universe_path: std::env::var("VRIDDHI_UNIVERSE_PATH")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                universe_refresh: Duration::from_secs(refresh_secs.max(1)),
                port: env_parse::<u16>("PORT").unwrap_or(DEFAULT_PORT),
            })
        }

        pub fn require_universe_path(&self) -> anyhow::Result<&std::path::Path> {
            self.universe_path
                .as_deref()
                .context("VRIDDHI_UNIVERSE_PATH is required")
        }
    }

    /// Policy values used when a request leaves a knob unset.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PlanDefaults {
        pub expected_cagr: f64,
        pub ratio_threshold: f64,
        pub min_stocks: usize,
        pub max_stocks: usize,
        pub max_weight: f64,
        pub risk_aversion: f64,
        pub inflation_rate: f64,
    }

    impl Default for PlanDefaults {
        fn default() -> Self {
            Self {
                expected_cagr: 0.15,
                ratio_threshold: 1.0,
                min_stocks: 8,
                max_stocks: 20,
                max_weight: 0.25,
                risk_aversion: 10.0,
                inflation_rate: 0.06,
            }
        }
    }

    impl PlanDefaults {
        pub fn from_env() -> Self {
            let mut out = Self::default();

            if let Some(v) = env_parse::<f64>("PLAN_EXPECTED_CAGR") {
                out.expected_cagr = v;
            }
            if let Some(v) = env_parse::<f64>("PLAN_RATIO_THRESHOLD") {
                out.ratio_threshold = v;
            }
            if let Some(v) = env_parse::<usize>("PLAN_MIN_STOCKS") {
                out.min_stocks = v;
            }
            if let Some(v) = env_parse::<usize>("PLAN_MAX_STOCKS") {
                out.max_stocks = v;
            }
            if let Some(v) = env_parse::<f64>("PLAN_MAX_WEIGHT") {
                out.max_weight = v;
            }
            if let Some(v) = env_parse::<f64>("PLAN_RISK_AVERSION") {
                out.risk_aversion = v;
            }
            if let Some(v) = env_parse::<f64>("PLAN_INFLATION_RATE") {
                out.inflation_rate = v;
            }

            out
        }
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn port_comes_from_env_with_fallback() {
            std::env::set_var("PORT", "8089");
            assert_eq!(Settings::from_env().unwrap().port, 8089);

            std::env::set_var("PORT", "not-a-port");
            assert_eq!(Settings::from_env().unwrap().port, DEFAULT_PORT);

            std::env::remove_var("PORT");
            assert_eq!(Settings::from_env().unwrap().port, DEFAULT_PORT);
        }
    }
}
