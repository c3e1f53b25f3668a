use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vriddhi_core::config::{PlanDefaults, Settings};
use vriddhi_core::domain::plan::PlanRequest;

mod ingest;
mod universe;

#[derive(Debug, Parser)]
#[command(name = "vriddhi_worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a universe file and log what was kept and dropped.
    Inspect {
        /// Universe file (.csv or .json). Defaults to VRIDDHI_UNIVERSE_PATH.
        #[arg(long)]
        universe: Option<PathBuf>,
    },

    /// Clean a raw CSV universe and write a canonical JSON snapshot.
    Normalize {
        #[arg(long)]
        universe: PathBuf,

        #[arg(long)]
        out: PathBuf,

        /// Snapshot as-of date (YYYY-MM-DD). Defaults to today's UTC date.
        #[arg(long)]
        as_of_date: Option<String>,
    },

    /// Build a plan offline and print it as JSON.
    Plan(PlanArgs),
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Universe file (.csv or .json). Defaults to VRIDDHI_UNIVERSE_PATH.
    #[arg(long)]
    universe: Option<PathBuf>,

    #[arg(long)]
    monthly_investment: f64,

    #[arg(long)]
    horizon_months: u32,

    #[arg(long)]
    expected_cagr: Option<f64>,

    #[arg(long)]
    ratio_threshold: Option<f64>,

    #[arg(long)]
    min_stocks: Option<usize>,

    #[arg(long)]
    max_stocks: Option<usize>,

    #[arg(long)]
    max_weight: Option<f64>,

    #[arg(long)]
    risk_aversion: Option<f64>,

    /// Annual inflation rate the plan is compared against (fraction).
    #[arg(long)]
    inflation_rate: Option<f64>,
}

impl PlanArgs {
    fn to_request(&self, defaults: &PlanDefaults) -> anyhow::Result<PlanRequest> {
        let mut req =
            PlanRequest::with_defaults(self.monthly_investment, self.horizon_months, defaults)?;
        if let Some(v) = self.expected_cagr {
            req.expected_cagr = v;
        }
        if let Some(v) = self.ratio_threshold {
            req.ratio_threshold = v;
        }
        if let Some(v) = self.min_stocks {
            req.min_stocks = v;
        }
        if let Some(v) = self.max_stocks {
            req.max_stocks = v;
        }
        if let Some(v) = self.max_weight {
            req.max_weight = Some(v);
        }
        if let Some(v) = self.risk_aversion {
            req.risk_aversion = v;
        }
        if let Some(v) = self.inflation_rate {
            req.inflation_rate = v;
        }
        Ok(req)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli.command, &settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "worker run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(command: Command, settings: &Settings) -> anyhow::Result<()> {
    match command {
        Command::Inspect { universe } => {
            let path = universe_path(universe, settings)?;
            let (snapshot, _report) = universe::load_universe(&path, None).await?;
            let summary = vriddhi_core::universe::summary::market_summary(&snapshot);

            for s in &summary.sector_summaries {
                tracing::info!(
                    sector = %s.sector,
                    stocks = s.stock_count,
                    avg_cagr = ?s.avg_historical_cagr,
                    avg_pe = ?s.avg_pe_ratio,
                    cheapest = %s.cheapest,
                    "sector"
                );
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Normalize {
            universe,
            out,
            as_of_date,
        } => {
            let as_of_date = resolve_as_of_date(as_of_date.as_deref())?;
            let opts = universe::UniverseOptions::from_env();
            ingest::normalize_universe(&universe, &out, as_of_date, &opts).await?;
        }
        Command::Plan(args) => {
            let path = universe_path(args.universe.clone(), settings)?;
            let request = args.to_request(&PlanDefaults::from_env())?;
            let (snapshot, _report) = universe::load_universe(&path, None).await?;

            let plan = vriddhi_core::engine::build_plan(&snapshot, &request)
                .with_context(|| format!("plan failed for {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }
    Ok(())
}

fn universe_path(arg: Option<PathBuf>, settings: &Settings) -> anyhow::Result<PathBuf> {
    match arg {
        Some(p) => Ok(p),
        None => Ok(settings.require_universe_path()?.to_path_buf()),
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_as_of_date(as_of_date_arg: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of-date {s}"));
    }
    Ok(chrono::Utc::now().date_naive())
}
