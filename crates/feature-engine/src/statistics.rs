//! Statistical Features Computation

/// Order and moment statistics of one channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticalFeatures {
    /// Mean value
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Median (mean of the middle pair for even lengths)
    pub median: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Index of the first occurrence of the minimum
    pub argmin: usize,
    /// Index of the first occurrence of the maximum
    pub argmax: usize,
}

impl StatisticalFeatures {
    /// Compute statistics from a slice of finite values.
    ///
    /// Returns `None` for an empty slice.
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;

        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        let (mut argmin, mut argmax) = (0, 0);
        for (i, &v) in values.iter().enumerate() {
            if v < values[argmin] {
                argmin = i;
            }
            if v > values[argmax] {
                argmax = i;
            }
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            mean,
            std_dev,
            median,
            min: values[argmin],
            max: values[argmax],
            argmin,
            argmax,
        })
    }
}

/// Discrete gradient with unit spacing.
///
/// One-sided differences at both ends, central differences inside. Needs at
/// least two samples.
pub fn gradient(values: &[f64]) -> Option<Vec<f64>> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let mut grad = Vec::with_capacity(n);
    grad.push(values[1] - values[0]);
    for i in 1..n - 1 {
        grad.push((values[i + 1] - values[i - 1]) / 2.0);
    }
    grad.push(values[n - 1] - values[n - 2]);
    Some(grad)
}

/// Trapezoidal integral over the sample index
pub fn trapezoid(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.windows(2).map(|w| (w[0] + w[1]) / 2.0).sum())
}

/// Slope angle in degrees for a gradient value
pub fn slope_angle(gradient: f64) -> f64 {
    gradient.atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_computation() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let stats = StatisticalFeatures::compute(&values).unwrap();
        assert!((stats.mean - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_std_dev_computation() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = StatisticalFeatures::compute(&values).unwrap();
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(StatisticalFeatures::compute(&[3.0, 1.0, 2.0]).unwrap().median, 2.0);
        assert_eq!(StatisticalFeatures::compute(&[4.0, 1.0, 3.0, 2.0]).unwrap().median, 2.5);
    }

    #[test]
    fn test_arg_extrema_take_first_occurrence() {
        let stats = StatisticalFeatures::compute(&[1.0, 5.0, 0.0, 5.0, 0.0]).unwrap();
        assert_eq!(stats.argmax, 1);
        assert_eq!(stats.argmin, 2);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.min, 0.0);
    }

    #[test]
    fn test_empty_values() {
        assert!(StatisticalFeatures::compute(&[]).is_none());
        assert!(trapezoid(&[]).is_none());
    }

    #[test]
    fn test_gradient_edges_and_interior() {
        let grad = gradient(&[1.0, 2.0, 4.0, 7.0]).unwrap();
        assert_eq!(grad, vec![1.0, 1.5, 2.5, 3.0]);
        assert_eq!(gradient(&[10.0, 9.0]).unwrap(), vec![-1.0, -1.0]);
        assert!(gradient(&[1.0]).is_none());
    }

    #[test]
    fn test_trapezoid() {
        assert_eq!(trapezoid(&[1.0, 2.0]).unwrap(), 1.5);
        assert_eq!(trapezoid(&[0.0, 2.0, 0.0]).unwrap(), 2.0);
        assert_eq!(trapezoid(&[7.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_slope_angle() {
        assert!((slope_angle(1.0) - 45.0).abs() < 1e-12);
        assert_eq!(slope_angle(0.0), 0.0);
    }
}
