use crate::error::{FrontierError, FrontierResult};
use rayon::ThreadPoolBuilder;
use std::sync::OnceLock;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

pub fn init_cpu_parallelism() {
    RAYON_INIT.get_or_init(|| {
        let num_threads = num_cpus::get().max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!(
                "Initialized Rayon thread pool with {} threads (all logical CPU cores)",
                num_threads
            ),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

/// Lookback window handed to the data provider (Yahoo range syntax).
pub const DEFAULT_PERIOD: &str = "1y";
/// Range values the Yahoo chart endpoint accepts.
pub const ALLOWED_PERIODS: [&str; 11] = [
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];
/// Number of random portfolios to sample.
pub const DEFAULT_NUM_PORTFOLIOS: usize = 25_000;
/// Annual risk-free rate used in Sharpe calculations.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.0515;
/// Trading days per year for annualization.
pub const DEFAULT_ANNUALISATION_FACTOR: f64 = 252.0;
/// Seed for the sampling generator created at process start.
pub const DEFAULT_SEED: u64 = 777;
/// Upper bound on `num_portfolios` accepted from HTTP callers.
pub const MAX_REQUEST_PORTFOLIOS: usize = 1_000_000;
/// Tolerance for the simplex sum check on sampled weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;
pub const DEFAULT_WEBUI_PORT: u16 = 8000;

/// Tunables for one optimization run.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
    pub period: String,
    pub num_portfolios: usize,
    pub risk_free_rate: f64,
    pub annualisation_factor: f64,
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD.to_string(),
            num_portfolios: DEFAULT_NUM_PORTFOLIOS,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            annualisation_factor: DEFAULT_ANNUALISATION_FACTOR,
            seed: DEFAULT_SEED,
        }
    }
}

impl OptimizerConfig {
    /// Defaults overridden by `FRONTIER_*` environment variables.
    ///
    /// Unparseable values are logged and ignored rather than aborting start-up.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(period) = lookup_string(&lookup, "FRONTIER_PERIOD") {
            cfg.period = period;
        }
        if let Some(v) = lookup_parse::<usize>(&lookup, "FRONTIER_NUM_PORTFOLIOS") {
            cfg.num_portfolios = v;
        }
        if let Some(v) = lookup_parse::<f64>(&lookup, "FRONTIER_RISK_FREE_RATE") {
            cfg.risk_free_rate = v;
        }
        if let Some(v) = lookup_parse::<f64>(&lookup, "FRONTIER_ANNUALISATION_FACTOR") {
            cfg.annualisation_factor = v;
        }
        if let Some(v) = lookup_parse::<u64>(&lookup, "FRONTIER_SEED") {
            cfg.seed = v;
        }

        cfg
    }

    pub fn validate(&self) -> FrontierResult<()> {
        if self.num_portfolios == 0 {
            return Err(FrontierError::InvalidConfig(
                "num_portfolios must be at least 1".to_string(),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(FrontierError::InvalidConfig(format!(
                "risk_free_rate must be finite, got {}",
                self.risk_free_rate
            )));
        }
        if !self.annualisation_factor.is_finite() || self.annualisation_factor <= 0.0 {
            return Err(FrontierError::InvalidConfig(format!(
                "annualisation_factor must be positive, got {}",
                self.annualisation_factor
            )));
        }
        if !ALLOWED_PERIODS.contains(&self.period.as_str()) {
            return Err(FrontierError::InvalidConfig(format!(
                "period must be one of {}, got {:?}",
                ALLOWED_PERIODS.join(", "),
                self.period
            )));
        }
        Ok(())
    }
}

fn lookup_string(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn lookup_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup_string(lookup, key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}={}", key, raw);
            None
        }
    }
}
