use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Scale turning a median absolute deviation into a Gaussian-equivalent sigma
pub const MAD_TO_SIGMA: f64 = 1.482_602_218_505_602;

/// Summary of one quantity over a set of samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub median: f64,
    /// Median absolute deviation scaled to a standard-deviation equivalent
    pub robust_std: f64,
}

impl SummaryStats {
    /// Statistics of the finite values; `None` when there are none
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }

        let count = finite.len();
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = mean(&finite)?;
        let std = population_std(&finite)?;
        let median = median(&finite)?;
        let robust_std = mad(&finite)? * MAD_TO_SIGMA;

        Some(Self { count, min, max, mean, std, median, robust_std })
    }
}

pub fn mean<T: Float>(values: &[T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    let sum = values.iter().fold(T::zero(), |acc, &v| acc + v);
    Some(sum / T::from(values.len())?)
}

pub fn population_std<T: Float>(values: &[T]) -> Option<T> {
    let m = mean(values)?;
    let var = values.iter().fold(T::zero(), |acc, &v| acc + (v - m) * (v - m));
    Some((var / T::from(values.len())?).sqrt())
}

/// Median, averaging the two central values for even lengths
pub fn median<T: Float>(values: &[T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        let two = T::one() + T::one();
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / two)
    }
}

/// Median absolute deviation from the median (unscaled)
pub fn mad<T: Float>(values: &[T]) -> Option<T> {
    let m = median(values)?;
    let deviations: Vec<T> = values.iter().map(|&v| (v - m).abs()).collect();
    median(&deviations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_summary_stats() {
        let stats = SummaryStats::from_values(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_eq!(stats.count, 5);
        assert_relative_eq!(stats.median, 3.0);
        assert_relative_eq!(stats.mean, 22.0);
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 100.0);
        // deviations 2,1,0,1,97 -> MAD 1
        assert_relative_eq!(stats.robust_std, MAD_TO_SIGMA);
    }

    #[test]
    fn test_nonfinite_values_ignored() {
        let stats = SummaryStats::from_values(&[f64::NAN, 2.0, f64::INFINITY]).unwrap();
        assert_eq!(stats.count, 1);
        assert_relative_eq!(stats.std, 0.0);
        assert!(SummaryStats::from_values(&[f64::NAN]).is_none());
        assert!(SummaryStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_even_median_f32() {
        assert_relative_eq!(median(&[4.0f32, 1.0, 3.0, 2.0]).unwrap(), 2.5);
    }
}
