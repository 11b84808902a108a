use thiserror::Error;

/// Failures surfaced by the frontier pipeline and its market-data collaborator.
///
/// None of these are retryable within one invocation: the computation is
/// deterministic given its inputs, so a retry without new inputs fails the
/// same way.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrontierError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Sampled weights violate the simplex invariant (sample {index}, sum={sum})")]
    InvalidWeight { index: usize, sum: f64 },

    #[error("Invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Market data provider failed: {0}")]
    Provider(String),
}

pub type FrontierResult<T> = std::result::Result<T, FrontierError>;
