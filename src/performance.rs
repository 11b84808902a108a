use crate::returns::ReturnStatistics;
use rayon::prelude::*;

/// Annualised risk/return of one weight vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Performance {
    pub volatility: f64,
    pub annual_return: f64,
}

fn portfolio_return(weights: &[f64], means: &[f64]) -> f64 {
    weights.iter().zip(means.iter()).map(|(w, r)| w * r).sum()
}

fn portfolio_variance(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    let n = weights.len();
    let mut var = 0.0;
    for i in 0..n {
        for j in 0..n {
            var += weights[i] * weights[j] * cov[i][j];
        }
    }
    var
}

/// `return = f * (mu . w)`, `vol = sqrt(f) * sqrt(w' S w)`.
///
/// Round-off can leave `w' S w` slightly below zero on a (near) singular
/// covariance; it is clamped so volatility stays a real number.
pub fn annualised_performance(
    weights: &[f64],
    mean_returns: &[f64],
    covariance: &[Vec<f64>],
    annualisation_factor: f64,
) -> Performance {
    let annual_return = portfolio_return(weights, mean_returns) * annualisation_factor;
    let variance = portfolio_variance(weights, covariance).max(0.0);
    let volatility = variance.sqrt() * annualisation_factor.sqrt();
    Performance {
        volatility,
        annual_return,
    }
}

/// Scores every sample; output order matches `samples`.
pub fn evaluate_samples(
    samples: &[Vec<f64>],
    stats: &ReturnStatistics,
    annualisation_factor: f64,
) -> Vec<Performance> {
    samples
        .par_iter()
        .map(|w| {
            annualised_performance(w, &stats.mean_returns, &stats.covariance, annualisation_factor)
        })
        .collect()
}
