use crate::performance::Performance;
use tracing::warn;

/// Indices of the two extremal samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    /// `None` when no sample has a defined Sharpe ratio (all volatilities zero).
    pub max_sharpe: Option<usize>,
    pub min_volatility: usize,
}

/// `(return - rf) / vol`, or `None` when the ratio is undefined.
pub fn sharpe_ratio(perf: &Performance, risk_free_rate: f64) -> Option<f64> {
    if perf.volatility == 0.0 {
        return None;
    }
    let sharpe = (perf.annual_return - risk_free_rate) / perf.volatility;
    sharpe.is_finite().then_some(sharpe)
}

pub fn sharpe_ratios(perfs: &[Performance], risk_free_rate: f64) -> Vec<Option<f64>> {
    perfs.iter().map(|p| sharpe_ratio(p, risk_free_rate)).collect()
}

/// Picks max-Sharpe and min-volatility samples. Ties go to the lowest index.
///
/// Returns `None` for an empty pool.
pub fn select(perfs: &[Performance], risk_free_rate: f64) -> Option<Selection> {
    if perfs.is_empty() {
        return None;
    }

    let ratios = sharpe_ratios(perfs, risk_free_rate);
    let mut max_sharpe: Option<(usize, f64)> = None;
    let mut min_volatility = 0;

    for (i, (perf, ratio)) in perfs.iter().zip(ratios).enumerate() {
        if let Some(sharpe) = ratio {
            if max_sharpe.is_none_or(|(_, best)| sharpe > best) {
                max_sharpe = Some((i, sharpe));
            }
        }
        if perf.volatility < perfs[min_volatility].volatility {
            min_volatility = i;
        }
    }

    if max_sharpe.is_none() {
        warn!(
            "All {} sampled portfolios have zero volatility; max-Sharpe portfolio is undefined",
            perfs.len()
        );
    }

    Some(Selection {
        max_sharpe: max_sharpe.map(|(i, _)| i),
        min_volatility,
    })
}
