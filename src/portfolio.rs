use crate::config::OptimizerConfig;
use crate::error::{FrontierError, FrontierResult};
use crate::performance::{self, Performance};
use crate::returns::{PriceMatrix, ReturnStatistics};
use crate::{data, sampler, selector};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

// ──────────────────────────────────────────────────────────────────────────────
// Data Structures
// ──────────────────────────────────────────────────────────────────────────────

/// One reported portfolio. Field names on the wire follow the public API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioResult {
    #[serde(rename = "Annualised Return")]
    pub annualised_return: f64,
    #[serde(rename = "Annualised Volatility")]
    pub annualised_volatility: f64,
    /// Ticker -> percentage of capital.
    #[serde(rename = "Allocation")]
    pub allocation: BTreeMap<String, f64>,
}

/// Both frontier extremes for one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrontierReport {
    /// `None` when every sample had zero volatility.
    pub max_sharpe_portfolio: Option<PortfolioResult>,
    pub min_vol_portfolio: PortfolioResult,
}

// ──────────────────────────────────────────────────────────────────────────────
// Allocation Reporting
// ──────────────────────────────────────────────────────────────────────────────

/// Rounds to 2 decimals, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

pub fn build_result(weights: &[f64], perf: &Performance, tickers: &[String]) -> PortfolioResult {
    let allocation = tickers
        .iter()
        .zip(weights.iter())
        .map(|(symbol, w)| (symbol.clone(), round2(w * 100.0)))
        .collect();

    PortfolioResult {
        annualised_return: round2(perf.annual_return),
        annualised_volatility: round2(perf.volatility),
        allocation,
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Optimizer: Monte Carlo Sampling + Ranking
// ──────────────────────────────────────────────────────────────────────────────

/// Samples, scores and ranks portfolios over precomputed return statistics.
pub fn optimize_from_statistics<R: Rng + ?Sized>(
    stats: &ReturnStatistics,
    cfg: &OptimizerConfig,
    rng: &mut R,
) -> FrontierResult<FrontierReport> {
    cfg.validate()?;
    let n = stats.num_assets();

    info!(
        "Optimizing portfolio with {} assets over {} return periods, {} random samples...",
        n,
        stats.num_periods(),
        cfg.num_portfolios
    );

    let samples = sampler::sample_weights(n, cfg.num_portfolios, rng)?;
    let perfs = performance::evaluate_samples(&samples, stats, cfg.annualisation_factor);

    let selection = selector::select(&perfs, cfg.risk_free_rate).ok_or_else(|| {
        FrontierError::InsufficientData("no portfolios were sampled".to_string())
    })?;

    let max_sharpe_portfolio = selection.max_sharpe.map(|i| {
        if let Some(sharpe) = selector::sharpe_ratio(&perfs[i], cfg.risk_free_rate) {
            info!(
                "Max Sharpe sample #{}: E[r]={:.4}, σ={:.4}, Sharpe={:.3}",
                i, perfs[i].annual_return, perfs[i].volatility, sharpe
            );
        }
        build_result(&samples[i], &perfs[i], &stats.tickers)
    });
    if max_sharpe_portfolio.is_none() {
        warn!("No sample has a defined Sharpe ratio; reporting min-volatility only");
    }

    let m = selection.min_volatility;
    info!(
        "Min volatility sample #{}: E[r]={:.4}, σ={:.4}",
        m, perfs[m].annual_return, perfs[m].volatility
    );

    Ok(FrontierReport {
        max_sharpe_portfolio,
        min_vol_portfolio: build_result(&samples[m], &perfs[m], &stats.tickers),
    })
}

/// Full core pipeline on an in-memory price matrix.
pub fn optimize_frontier<R: Rng + ?Sized>(
    prices: &PriceMatrix,
    cfg: &OptimizerConfig,
    rng: &mut R,
) -> FrontierResult<FrontierReport> {
    let stats = ReturnStatistics::from_prices(prices)?;
    optimize_from_statistics(&stats, cfg, rng)
}

// ──────────────────────────────────────────────────────────────────────────────
// Top-Level Command: Run Portfolio Optimization
// ──────────────────────────────────────────────────────────────────────────────

/// Full pipeline: fetch data → statistics → sample → rank → print.
pub async fn run_portfolio_optimization(
    symbols: &[String],
    cfg: &OptimizerConfig,
) -> FrontierResult<FrontierReport> {
    info!(
        "=== Efficient Frontier ===\n  Assets: {:?}\n  Period: {}\n  Samples: {}\n  Risk-free: {:.2}%",
        symbols,
        cfg.period,
        cfg.num_portfolios,
        cfg.risk_free_rate * 100.0
    );
    cfg.validate()?;

    let prices = data::fetch_price_matrix(symbols, &cfg.period).await?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let report = optimize_frontier(&prices, cfg, &mut rng)?;

    print_report(&report);

    Ok(report)
}

/// Pretty-prints both portfolios to stdout.
pub fn print_report(report: &FrontierReport) {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║              Efficient Frontier Allocation                 ║");
    match &report.max_sharpe_portfolio {
        Some(p) => print_portfolio("Maximum Sharpe Ratio", p),
        None => {
            println!("╠════════════════════════════════════════════════════════════╣");
            println!("║  Maximum Sharpe Ratio: undefined (zero volatility)         ║");
        }
    }
    print_portfolio("Minimum Volatility", &report.min_vol_portfolio);
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("⚠  Educational use only. Not financial advice.");
}

fn print_portfolio(title: &str, p: &PortfolioResult) {
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  {:<58}║", title);
    println!(
        "║  Annualised Return     : {:>+8.2}                          ║",
        p.annualised_return
    );
    println!(
        "║  Annualised Volatility : {:>8.2}                          ║",
        p.annualised_volatility
    );

    // Sort by weight descending
    let mut sorted: Vec<_> = p.allocation.iter().collect();
    sorted.sort_by(|a, b| b.1.total_cmp(a.1));

    for (sym, pct) in sorted {
        println!("║    {:<8} {:>7.2}%                                        ║", sym, pct);
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::two_ticker_prices;
    use approx::assert_relative_eq;

    fn cfg(num_portfolios: usize) -> OptimizerConfig {
        OptimizerConfig {
            num_portfolios,
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn test_round2_ties_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(33.333333), 33.33);
        assert_eq!(round2(-1.234), -1.23);
        assert_eq!(round2(100.0), 100.0);
    }

    #[test]
    fn test_two_ticker_scenario_with_fixed_seed() {
        let stats = ReturnStatistics::from_prices(&two_ticker_prices()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let samples = sampler::sample_weights(2, 4, &mut rng).unwrap();
        let perfs = performance::evaluate_samples(&samples, &stats, 252.0);

        // Closed form for two assets with the hand-computed moments.
        let (s11, s22, s12) = (21.0 / 90_000.0, 3.0 / 90_000.0, -1.5 / 90_000.0);
        let mu = 0.02 / 3.0;
        for (w, p) in samples.iter().zip(perfs.iter()) {
            let var = w[0] * w[0] * s11 + w[1] * w[1] * s22 + 2.0 * w[0] * w[1] * s12;
            assert_relative_eq!(p.volatility, (252.0 * var).sqrt(), epsilon = 1e-10);
            // Equal means make the return independent of the weights.
            assert_relative_eq!(p.annual_return, 252.0 * mu, epsilon = 1e-10);
        }

        // Brute-force argmax/argmin with first-occurrence ties.
        let rf = 0.0515;
        let mut best = 0;
        let mut lowest = 0;
        for i in 1..perfs.len() {
            let si = (perfs[i].annual_return - rf) / perfs[i].volatility;
            let sb = (perfs[best].annual_return - rf) / perfs[best].volatility;
            if si > sb {
                best = i;
            }
            if perfs[i].volatility < perfs[lowest].volatility {
                lowest = i;
            }
        }
        let sel = selector::select(&perfs, rf).unwrap();
        assert_eq!(sel.max_sharpe, Some(best));
        assert_eq!(sel.min_volatility, lowest);
        // With identical returns the best Sharpe is the lowest volatility.
        assert_eq!(sel.max_sharpe, Some(sel.min_volatility));
    }

    #[test]
    fn test_allocations_sum_to_hundred() {
        let prices = PriceMatrix::from_columns(
            &["AAA", "BBB", "CCC", "DDD"],
            &[
                vec![10.0, 10.5, 10.2, 10.9, 11.3, 11.0],
                vec![20.0, 19.5, 19.9, 20.4, 20.1, 20.8],
                vec![5.0, 5.1, 5.05, 5.2, 5.3, 5.25],
                vec![40.0, 41.0, 39.5, 40.5, 42.0, 41.2],
            ],
        );
        let mut rng = StdRng::seed_from_u64(777);
        let report = optimize_frontier(&prices, &cfg(2_000), &mut rng).unwrap();

        let max_sharpe = report.max_sharpe_portfolio.as_ref().unwrap();
        for p in [max_sharpe, &report.min_vol_portfolio] {
            assert_eq!(p.allocation.len(), 4);
            let total: f64 = p.allocation.values().sum();
            assert!((total - 100.0).abs() <= 0.1 * 4.0, "allocation sums to {}", total);
            assert!(p.allocation.values().all(|&v| (0.0..=100.0).contains(&v)));
        }
    }

    #[test]
    fn test_zero_variance_reports_no_max_sharpe() {
        let prices = PriceMatrix::from_columns(&["AAA", "BBB"], &[vec![25.0; 10], vec![80.0; 10]]);
        let mut rng = StdRng::seed_from_u64(777);
        let report = optimize_frontier(&prices, &cfg(100), &mut rng).unwrap();

        assert!(report.max_sharpe_portfolio.is_none());
        assert_eq!(report.min_vol_portfolio.annualised_volatility, 0.0);
        assert_eq!(report.min_vol_portfolio.annualised_return, 0.0);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["max_sharpe_portfolio"].is_null());
    }

    #[test]
    fn test_single_ticker_is_fully_allocated() {
        let prices = PriceMatrix::from_columns(&["SOLO"], &[vec![100.0, 102.0, 101.0, 104.0, 103.5]]);
        let mut rng = StdRng::seed_from_u64(777);
        let report = optimize_frontier(&prices, &cfg(50), &mut rng).unwrap();

        let max_sharpe = report.max_sharpe_portfolio.unwrap();
        assert_eq!(max_sharpe.allocation.get("SOLO"), Some(&100.0));
        assert_eq!(report.min_vol_portfolio.allocation.get("SOLO"), Some(&100.0));
        assert_eq!(max_sharpe, report.min_vol_portfolio);
    }

    #[test]
    fn test_more_samples_never_lower_best_sharpe() {
        let prices = PriceMatrix::from_columns(
            &["AAA", "BBB", "CCC"],
            &[
                vec![10.0, 10.4, 10.1, 10.8, 11.2, 10.9, 11.5],
                vec![20.0, 19.6, 20.3, 20.1, 20.9, 21.4, 21.0],
                vec![7.0, 7.3, 7.1, 7.0, 7.4, 7.6, 7.5],
            ],
        );
        let stats = ReturnStatistics::from_prices(&prices).unwrap();
        let rf = 0.0515;

        let mut previous = f64::NEG_INFINITY;
        for pool in [10, 100, 1_000, 5_000] {
            let mut rng = StdRng::seed_from_u64(777);
            let samples = sampler::sample_weights(3, pool, &mut rng).unwrap();
            let perfs = performance::evaluate_samples(&samples, &stats, 252.0);
            let best = selector::sharpe_ratios(&perfs, rf)
                .into_iter()
                .flatten()
                .fold(f64::NEG_INFINITY, f64::max);
            assert!(best >= previous, "pool {} lowered best Sharpe", pool);
            previous = best;
        }
    }

    #[test]
    fn test_allocation_round_trips_through_evaluator() {
        let prices = PriceMatrix::from_columns(
            &["AAA", "BBB", "CCC"],
            &[
                vec![10.0, 10.4, 10.1, 10.8, 11.2, 10.9, 11.5],
                vec![20.0, 19.6, 20.3, 20.1, 20.9, 21.4, 21.0],
                vec![7.0, 7.3, 7.1, 7.0, 7.4, 7.6, 7.5],
            ],
        );
        let stats = ReturnStatistics::from_prices(&prices).unwrap();
        let mut rng = StdRng::seed_from_u64(777);
        let report = optimize_from_statistics(&stats, &cfg(3_000), &mut rng).unwrap();

        for p in [report.max_sharpe_portfolio.as_ref().unwrap(), &report.min_vol_portfolio] {
            let weights: Vec<f64> = stats
                .tickers
                .iter()
                .map(|t| p.allocation[t] / 100.0)
                .collect();
            let perf = performance::annualised_performance(
                &weights,
                &stats.mean_returns,
                &stats.covariance,
                252.0,
            );
            assert!((round2(perf.annual_return) - p.annualised_return).abs() <= 0.011);
            assert!((round2(perf.volatility) - p.annualised_volatility).abs() <= 0.011);
        }
    }

    #[test]
    fn test_min_vol_selection_is_idempotent() {
        let stats = ReturnStatistics::from_prices(&two_ticker_prices()).unwrap();
        let a = optimize_from_statistics(&stats, &cfg(500), &mut StdRng::seed_from_u64(9)).unwrap();
        let b = optimize_from_statistics(&stats, &cfg(500), &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.min_vol_portfolio, b.min_vol_portfolio);
    }

    #[test]
    fn test_insufficient_prices_fail_fast() {
        let prices = PriceMatrix::from_columns(&["AAA", "BBB"], &[vec![1.0], vec![2.0]]);
        let mut rng = StdRng::seed_from_u64(777);
        assert!(matches!(
            optimize_frontier(&prices, &cfg(10), &mut rng),
            Err(FrontierError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_wire_keys() {
        let p = build_result(
            &[0.25, 0.75],
            &Performance {
                volatility: 0.123456,
                annual_return: 0.98765,
            },
            &["AAA".to_string(), "BBB".to_string()],
        );
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["Annualised Return"], 0.99);
        assert_eq!(json["Annualised Volatility"], 0.12);
        assert_eq!(json["Allocation"]["AAA"], 25.0);
        assert_eq!(json["Allocation"]["BBB"], 75.0);
    }

    #[test]
    fn test_repeated_ticker_fails_instead_of_losing_weight() {
        let prices = PriceMatrix::from_columns(
            &["AAA", "AAA", "BBB"],
            &[
                vec![100.0, 101.0, 103.02, 101.9898],
                vec![100.0, 101.0, 103.02, 101.9898],
                vec![100.0, 100.0, 101.0, 102.01],
            ],
        );
        let mut rng = StdRng::seed_from_u64(777);
        assert!(matches!(
            optimize_frontier(&prices, &cfg(200), &mut rng),
            Err(FrontierError::InvalidConfig(_))
        ));
    }
}
