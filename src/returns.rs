use crate::error::{FrontierError, FrontierResult};
use tracing::{debug, warn};

/// Closing prices laid out as chronological rows × ticker columns.
///
/// A `None` cell means the instrument has no close for that timestamp
/// (not yet listed, halted, provider gap).
#[derive(Clone, Debug, PartialEq)]
pub struct PriceMatrix {
    pub tickers: Vec<String>,
    /// Unix seconds per row, same length as `rows`.
    pub timestamps: Vec<i64>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl PriceMatrix {
    pub fn new(tickers: Vec<String>, timestamps: Vec<i64>, rows: Vec<Vec<Option<f64>>>) -> Self {
        Self {
            tickers,
            timestamps,
            rows,
        }
    }

    pub fn num_tickers(&self) -> usize {
        self.tickers.len()
    }

    /// Rows where every ticker has a finite, strictly positive close.
    fn complete_rows(&self) -> Vec<Vec<f64>> {
        let k = self.tickers.len();
        self.rows
            .iter()
            .filter(|row| row.len() == k)
            .filter_map(|row| {
                row.iter()
                    .map(|cell| cell.filter(|p| p.is_finite() && *p > 0.0))
                    .collect::<Option<Vec<f64>>>()
            })
            .collect()
    }
}

/// Period returns plus the first two moments needed by the evaluator.
#[derive(Clone, Debug)]
pub struct ReturnStatistics {
    pub tickers: Vec<String>,
    /// One row per period, one column per ticker.
    pub returns: Vec<Vec<f64>>,
    pub mean_returns: Vec<f64>,
    /// Sample covariance (n-1 denominator), symmetric.
    pub covariance: Vec<Vec<f64>>,
}

impl ReturnStatistics {
    /// Drops incomplete price rows, then derives simple returns, their means
    /// and sample covariance.
    pub fn from_prices(prices: &PriceMatrix) -> FrontierResult<Self> {
        let k = prices.num_tickers();
        if k == 0 {
            return Err(FrontierError::InsufficientData(
                "no tickers in price matrix".to_string(),
            ));
        }

        let valid = prices.complete_rows();
        let dropped = prices.rows.len() - valid.len();
        if dropped > 0 {
            warn!(
                "Dropped {} of {} price rows with missing or invalid closes",
                dropped,
                prices.rows.len()
            );
        }
        if valid.len() < 3 {
            return Err(FrontierError::InsufficientData(format!(
                "need at least 3 complete price rows, got {}",
                valid.len()
            )));
        }

        let returns: Vec<Vec<f64>> = valid
            .windows(2)
            .map(|w| {
                w[0].iter()
                    .zip(w[1].iter())
                    .map(|(p0, p1)| (p1 - p0) / p0)
                    .collect()
            })
            .collect();

        Self::from_returns(prices.tickers.clone(), returns)
    }

    /// Computes moments from an already-built return matrix.
    pub fn from_returns(tickers: Vec<String>, returns: Vec<Vec<f64>>) -> FrontierResult<Self> {
        let k = tickers.len();
        if k == 0 {
            return Err(FrontierError::InsufficientData(
                "no tickers in return matrix".to_string(),
            ));
        }
        if let Some(dup) = first_duplicate(&tickers) {
            return Err(FrontierError::InvalidConfig(format!(
                "ticker {} appears more than once",
                dup
            )));
        }
        let n = returns.len();
        // Sample covariance is undefined on a single observation.
        if n < 2 {
            return Err(FrontierError::InsufficientData(format!(
                "need at least 2 return periods for a sample covariance, got {}",
                n
            )));
        }
        if returns.iter().any(|row| row.len() != k) {
            return Err(FrontierError::InsufficientData(
                "return rows do not match ticker count".to_string(),
            ));
        }

        let mean_returns: Vec<f64> = (0..k)
            .map(|j| returns.iter().map(|row| row[j]).sum::<f64>() / n as f64)
            .collect();

        let mut covariance = vec![vec![0.0; k]; k];
        for i in 0..k {
            for j in i..k {
                let sum: f64 = returns
                    .iter()
                    .map(|row| (row[i] - mean_returns[i]) * (row[j] - mean_returns[j]))
                    .sum();
                let cov = sum / (n as f64 - 1.0);
                covariance[i][j] = cov;
                covariance[j][i] = cov;
            }
        }

        debug!("Return statistics: {} tickers over {} periods", k, n);

        Ok(Self {
            tickers,
            returns,
            mean_returns,
            covariance,
        })
    }

    pub fn num_assets(&self) -> usize {
        self.tickers.len()
    }

    pub fn num_periods(&self) -> usize {
        self.returns.len()
    }
}

fn first_duplicate(tickers: &[String]) -> Option<&str> {
    tickers
        .iter()
        .enumerate()
        .find(|&(i, t)| tickers[..i].contains(t))
        .map(|(_, t)| t.as_str())
}

#[cfg(test)]
impl PriceMatrix {
    /// Builds a gap-free matrix from one price column per ticker.
    /// Row timestamps are synthetic day offsets.
    pub fn from_columns(tickers: &[&str], columns: &[Vec<f64>]) -> Self {
        let len = columns.iter().map(Vec::len).max().unwrap_or(0);
        let rows = (0..len)
            .map(|t| columns.iter().map(|col| col.get(t).copied()).collect())
            .collect();
        Self {
            tickers: tickers.iter().map(|s| s.to_string()).collect(),
            timestamps: (0..len as i64).map(|d| d * 86_400).collect(),
            rows,
        }
    }
}

/// Closes whose simple returns are [0.01, 0.02, -0.01] and [0.00, 0.01, 0.01].
#[cfg(test)]
pub(crate) fn two_ticker_prices() -> PriceMatrix {
    PriceMatrix::from_columns(
        &["AAA", "BBB"],
        &[
            vec![100.0, 101.0, 103.02, 101.9898],
            vec![100.0, 100.0, 101.0, 102.01],
        ],
    )
}
