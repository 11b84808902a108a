use crate::config::WEIGHT_SUM_TOLERANCE;
use crate::error::{FrontierError, FrontierResult};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Draws `num_portfolios` weight vectors of length `num_assets`.
///
/// Each vector is `num_assets` independent U(0,1) draws divided by their sum.
/// That is not uniform over the simplex, which is fine for exploratory
/// frontier sampling. Draws are taken row by row from `rng`, so a longer run
/// with the same seed starts with exactly the vectors of a shorter one.
pub fn sample_weights<R: Rng + ?Sized>(
    num_assets: usize,
    num_portfolios: usize,
    rng: &mut R,
) -> FrontierResult<Vec<Vec<f64>>> {
    if num_assets == 0 {
        return Err(FrontierError::InsufficientData(
            "cannot sample weights for zero assets".to_string(),
        ));
    }
    if num_portfolios == 0 {
        return Err(FrontierError::InvalidConfig(
            "num_portfolios must be at least 1".to_string(),
        ));
    }

    let unit = Uniform::new(0.0_f64, 1.0);
    let samples: Vec<Vec<f64>> = (0..num_portfolios)
        .map(|_| generate_random_weights(num_assets, &unit, rng))
        .collect();

    for (index, weights) in samples.iter().enumerate() {
        check_simplex(index, weights)?;
    }

    Ok(samples)
}

fn generate_random_weights<R: Rng + ?Sized>(n: usize, unit: &Uniform<f64>, rng: &mut R) -> Vec<f64> {
    let raw: Vec<f64> = (0..n).map(|_| unit.sample(rng)).collect();
    let sum: f64 = raw.iter().sum();
    raw.iter().map(|v| v / sum).collect()
}

/// Components in [0, 1] summing to 1 within tolerance.
pub fn check_simplex(index: usize, weights: &[f64]) -> FrontierResult<()> {
    let sum: f64 = weights.iter().sum();
    let in_range = weights.iter().all(|w| w.is_finite() && (0.0..=1.0).contains(w));
    if !in_range || (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(FrontierError::InvalidWeight { index, sum });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_weights_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = sample_weights(5, 1_000, &mut rng).unwrap();
        assert_eq!(samples.len(), 1_000);
        for w in &samples {
            assert_eq!(w.len(), 5);
            let sum: f64 = w.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "Weights should sum to 1.0, got {}", sum);
            assert!(w.iter().all(|&v| v >= 0.0), "Weights should be non-negative");
        }
    }

    #[test]
    fn test_single_asset_is_fully_allocated() {
        let mut rng = StdRng::seed_from_u64(1);
        let samples = sample_weights(1, 50, &mut rng).unwrap();
        assert!(samples.iter().all(|w| w == &vec![1.0]));
    }

    #[test]
    fn test_same_seed_is_reproducible_and_prefix_stable() {
        let short = sample_weights(3, 10, &mut StdRng::seed_from_u64(777)).unwrap();
        let again = sample_weights(3, 10, &mut StdRng::seed_from_u64(777)).unwrap();
        let long = sample_weights(3, 40, &mut StdRng::seed_from_u64(777)).unwrap();

        assert_eq!(short, again);
        assert_eq!(&long[..10], &short[..]);
    }

    #[test]
    fn test_rejects_degenerate_requests() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            sample_weights(0, 10, &mut rng),
            Err(FrontierError::InsufficientData(_))
        ));
        assert!(matches!(
            sample_weights(2, 0, &mut rng),
            Err(FrontierError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_check_simplex_flags_bad_vectors() {
        assert!(check_simplex(0, &[0.25, 0.75]).is_ok());
        assert!(matches!(
            check_simplex(4, &[0.5, 0.6]),
            Err(FrontierError::InvalidWeight { index: 4, .. })
        ));
        assert!(check_simplex(0, &[1.5, -0.5]).is_err());
        assert!(check_simplex(0, &[f64::NAN, 1.0]).is_err());
    }
}
