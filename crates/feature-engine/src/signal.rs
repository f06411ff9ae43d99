//! Per-Channel Signal View

use crate::peaks::{local_maxima, local_minima};
use crate::statistics::{gradient, StatisticalFeatures};
use std::cell::OnceCell;

/// One channel of one cycle, widened to f64.
///
/// Derived series are computed on first use and shared by every feature
/// function evaluated against the same signal. Order statistics are missing
/// for a channel holding a NaN or infinite sample; peak detection treats
/// comparisons against such a sample as false.
#[derive(Debug)]
pub struct Signal {
    samples: Vec<f64>,
    finite: bool,
    stats: OnceCell<Option<StatisticalFeatures>>,
    gradient: OnceCell<Option<Vec<f64>>>,
    maxima: OnceCell<Vec<usize>>,
    minima: OnceCell<Vec<usize>>,
}

impl Signal {
    /// Build from raw decoded samples
    pub fn from_f32(samples: &[f32]) -> Self {
        Self::new(samples.iter().map(|&v| f64::from(v)).collect())
    }

    /// Build from f64 samples
    pub fn new(samples: Vec<f64>) -> Self {
        let finite = samples.iter().all(|v| v.is_finite());
        Self {
            samples,
            finite,
            stats: OnceCell::new(),
            gradient: OnceCell::new(),
            maxima: OnceCell::new(),
            minima: OnceCell::new(),
        }
    }

    /// Raw samples
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True for an empty channel
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when every sample is finite
    pub fn is_finite(&self) -> bool {
        self.finite
    }

    /// Order statistics; `None` for an empty or non-finite channel
    pub fn stats(&self) -> Option<&StatisticalFeatures> {
        self.stats
            .get_or_init(|| {
                if self.finite {
                    StatisticalFeatures::compute(&self.samples)
                } else {
                    None
                }
            })
            .as_ref()
    }

    /// Discrete gradient; `None` with fewer than two samples
    pub fn gradient(&self) -> Option<&[f64]> {
        self.gradient
            .get_or_init(|| gradient(&self.samples))
            .as_deref()
    }

    /// Local maxima indices
    pub fn maxima(&self) -> &[usize] {
        self.maxima.get_or_init(|| local_maxima(&self.samples))
    }

    /// Local minima indices
    pub fn minima(&self) -> &[usize] {
        self.minima.get_or_init(|| local_minima(&self.samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_keeps_values() {
        let signal = Signal::from_f32(&[1.5, -2.25]);
        assert_eq!(signal.samples(), &[1.5, -2.25]);
    }

    #[test]
    fn test_non_finite_drops_order_statistics_only() {
        let signal = Signal::new(vec![1.0, 3.0, f64::NAN, 2.0, 0.0, 4.0]);
        assert!(!signal.is_finite());
        assert!(signal.stats().is_none());
        // the NaN neighbour hides the rise at 1
        assert!(signal.maxima().is_empty());
        assert_eq!(signal.minima(), &[4]);
        assert_eq!(signal.gradient().unwrap().len(), 6);
    }

    #[test]
    fn test_cached_series() {
        let signal = Signal::new(vec![0.0, 2.0, 0.0, -1.0, 0.0]);
        assert_eq!(signal.maxima(), &[1]);
        assert_eq!(signal.minima(), &[3]);
        assert_eq!(signal.stats().unwrap().max, 2.0);
        assert_eq!(signal.gradient().unwrap().len(), 5);
    }
}
