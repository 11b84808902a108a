mod config;
mod data;
mod error;
mod performance;
mod portfolio;
mod returns;
mod sampler;
mod selector;
mod webui;

use clap::Parser;
use config::OptimizerConfig;
use std::io;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Efficient frontier estimation by Monte Carlo portfolio sampling",
    after_help = "EXAMPLES:
    # Serve the HTTP API on the default port
    cargo run --release

    # One-shot optimization printed to stdout
    cargo run --release -- --portfolio AAPL,MSFT,GOOGL,AMZN,TSLA

    # Larger sample pool over a longer lookback
    cargo run --release -- --portfolio NVDA,SPY,TLT --period 5y --num-portfolios 100000"
)]
struct Args {
    /// Run the optimizer once for comma-separated symbols (e.g., NVDA,MSFT,AAPL)
    #[arg(long)]
    portfolio: Option<String>,

    /// Serve the HTTP API (default when --portfolio is not given)
    #[arg(long)]
    webui: bool,

    /// HTTP API port
    #[arg(long, default_value_t = config::DEFAULT_WEBUI_PORT)]
    webui_port: u16,

    /// Price history lookback passed to the data provider (e.g., 6mo, 1y, 5y)
    #[arg(long)]
    period: Option<String>,

    /// Number of random portfolios to sample (default: 25000)
    #[arg(long)]
    num_portfolios: Option<usize>,

    /// Annual risk-free rate for the Sharpe ratio (default: 0.0515)
    #[arg(long)]
    risk_free_rate: Option<f64>,

    /// Trading periods per year (default: 252)
    #[arg(long)]
    annualisation_factor: Option<f64>,

    /// Seed for the weight sampler (default: 777)
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn optimizer_config(&self) -> OptimizerConfig {
        let mut cfg = OptimizerConfig::from_env();
        if let Some(period) = &self.period {
            cfg.period = period.clone();
        }
        if let Some(n) = self.num_portfolios {
            cfg.num_portfolios = n;
        }
        if let Some(rf) = self.risk_free_rate {
            cfg.risk_free_rate = rf;
        }
        if let Some(f) = self.annualisation_factor {
            cfg.annualisation_factor = f;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        cfg
    }
}

/// Comma-separated symbols in the order given, repeats dropped.
fn cli_symbols(raw: &str) -> Vec<String> {
    let parts: Vec<String> = raw.split(',').map(str::to_string).collect();
    data::dedup_symbols(&parts)
}

#[tokio::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("efficient_frontier=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();
    let args = Args::parse();

    config::init_cpu_parallelism();

    let cfg = args.optimizer_config();
    if let Err(e) = cfg.validate() {
        error!("{}", e);
        return Ok(());
    }

    if let Some(ref symbols_str) = args.portfolio {
        let symbols = cli_symbols(symbols_str);
        if symbols.is_empty() {
            error!("Portfolio optimization requires at least 1 symbol. Example: --portfolio NVDA,MSFT,AAPL,QQQ");
            return Ok(());
        }
        match portfolio::run_portfolio_optimization(&symbols, &cfg).await {
            Ok(_report) => info!("Portfolio optimization completed."),
            Err(e) => error!("Portfolio optimization failed: {}", e),
        }
        return Ok(());
    }

    if !args.webui {
        info!("No --portfolio given; serving the HTTP API");
    }
    match webui::run_webui_server(args.webui_port, cfg).await {
        Ok(_) => info!("WebUI exited."),
        Err(e) => error!("WebUI failed: {}", e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "efficient-frontier",
            "--portfolio",
            "AAPL,MSFT",
            "--num-portfolios",
            "1000",
            "--risk-free-rate",
            "0.04",
            "--seed",
            "11",
        ]);
        let cfg = args.optimizer_config();
        assert_eq!(cfg.num_portfolios, 1000);
        assert_eq!(cfg.risk_free_rate, 0.04);
        assert_eq!(cfg.seed, 11);
        assert_eq!(args.webui_port, 8000);
    }

    #[test]
    fn test_cli_symbols_drop_repeats() {
        assert_eq!(cli_symbols("aaa, AAA,bbb,,Aaa"), vec!["AAA", "BBB"]);
        assert!(cli_symbols(" , ").is_empty());
    }
}
