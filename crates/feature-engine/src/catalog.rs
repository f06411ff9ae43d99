//! Feature Catalog
//!
//! Every feature is a named pure function over one channel's [`Signal`],
//! tagged with the channel group it applies to. Time-valued features return
//! sample indices.

use crate::error::ComputeError;
use crate::signal::Signal;
use crate::statistics::{slope_angle, trapezoid};
use serde::{Deserialize, Serialize};

/// Output of a feature function; `None` is the missing-value sentinel
pub type FeatureResult = Result<Option<f64>, ComputeError>;

/// Signature shared by all catalog entries
pub type FeatureFn = fn(&Signal) -> FeatureResult;

/// Channel group a feature applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureGroup {
    /// Pressure channels only
    Pressure,
    /// Temperature channels only
    Temperature,
    /// Every channel regardless of category
    Common,
}

/// Catalog entry
#[derive(Debug, Clone, Copy)]
pub struct FeatureDef {
    pub group: FeatureGroup,
    pub name: &'static str,
    pub compute: FeatureFn,
}

const fn def(group: FeatureGroup, name: &'static str, compute: FeatureFn) -> FeatureDef {
    FeatureDef {
        group,
        name,
        compute,
    }
}

use FeatureGroup::{Common, Pressure, Temperature};

/// The fixed catalog, in column order within each group
pub static CATALOG: &[FeatureDef] = &[
    def(Pressure, "mean", mean),
    def(Pressure, "std", std_dev),
    def(Pressure, "median", median),
    def(Pressure, "max_point", max_value),
    def(Pressure, "max_point_derivative", max_point_derivative),
    def(Pressure, "max_point_time", argmax),
    def(Pressure, "derivative_of_first_peak", derivative_of_first_peak),
    def(Pressure, "derivative_of_first_peak_time", first_peak_time),
    def(Pressure, "derivative_of_second_peak", derivative_of_second_peak),
    def(Pressure, "derivative_of_second_peak_time", second_peak_time),
    def(Pressure, "area_under_curve", area_under_curve),
    def(Pressure, "slope_angle_of_first_localmax", slope_angle_of_first_localmax),
    def(Pressure, "slope_angle_of_first_localmax_time", first_peak_time),
    def(Pressure, "slope_angle_of_first_localmin", slope_angle_of_first_localmin),
    def(Pressure, "slope_angle_of_first_localmin_time", first_valley_time),
    def(Pressure, "first_local_max_point", first_local_max_point),
    def(Pressure, "first_local_max_point_time", first_peak_time),
    def(Pressure, "first_local_min_point", first_local_min_point),
    def(Pressure, "first_local_min_point_time", first_valley_time),
    def(Pressure, "global_max_point", max_value),
    def(Pressure, "global_max_point_time", argmax),
    def(Pressure, "global_min_point", min_value),
    def(Pressure, "global_min_point_time", argmin),
    def(Temperature, "min_temp", min_value),
    def(Temperature, "min_temp_time", argmin),
    def(Temperature, "max_temp", max_value),
    def(Temperature, "max_temp_time", argmax),
    def(Temperature, "cooling_rate", cooling_rate),
    def(Temperature, "cooling_rate_after_first_localmax", cooling_rate_after_first_localmax),
    def(Temperature, "derivative_of_temp_rising", derivative_of_temp_rising),
    def(Common, "first_point", first_point),
    def(Common, "last_point", last_point),
    def(Common, "slope_angle_of_globalmax", slope_angle_of_globalmax),
    def(Common, "slope_angle_of_globalmax_time", slope_angle_of_globalmax_time),
    def(Common, "slope_angle_to_last_point", slope_angle_to_last_point),
    def(Common, "slope_angle_to_last_point_time", slope_angle_to_last_point_time),
    def(Common, "slope_angle_of_globalmin", slope_angle_of_globalmin),
    def(Common, "slope_angle_of_globalmin_time", slope_angle_of_globalmin_time),
];

/// Catalog entries of one group, in catalog order
pub fn features_in(group: FeatureGroup) -> impl Iterator<Item = &'static FeatureDef> {
    CATALOG.iter().filter(move |f| f.group == group)
}

/// Look up a feature by group and name
pub fn lookup(group: FeatureGroup, name: &str) -> Option<&'static FeatureDef> {
    CATALOG.iter().find(|f| f.group == group && f.name == name)
}

fn index(i: usize) -> Option<f64> {
    Some(i as f64)
}

fn out_of_range(series: &'static str, index: usize, len: usize) -> ComputeError {
    ComputeError::IndexOutOfRange { series, index, len }
}

fn sample_at(s: &Signal, i: Option<usize>) -> FeatureResult {
    let Some(i) = i else {
        return Ok(None);
    };
    match s.samples().get(i) {
        Some(&v) => Ok(Some(v)),
        None => Err(out_of_range("samples", i, s.len())),
    }
}

fn gradient_at(s: &Signal, i: Option<usize>) -> FeatureResult {
    let (Some(i), Some(grad)) = (i, s.gradient()) else {
        return Ok(None);
    };
    match grad.get(i) {
        Some(&g) => Ok(Some(g)),
        None => Err(out_of_range("gradient", i, grad.len())),
    }
}

fn nth_peak(s: &Signal, n: usize) -> Option<usize> {
    s.maxima().get(n).copied()
}

fn first_valley(s: &Signal) -> Option<usize> {
    s.minima().first().copied()
}

/// Among `candidates`, the first index whose gradient is largest
/// (`steepest_up`) or smallest.
fn steepest(
    s: &Signal,
    candidates: &[usize],
    steepest_up: bool,
) -> Result<Option<usize>, ComputeError> {
    let Some(grad) = s.gradient() else {
        return Ok(None);
    };
    let mut best: Option<(usize, f64)> = None;
    for &c in candidates {
        let g = *grad
            .get(c)
            .ok_or_else(|| out_of_range("gradient", c, grad.len()))?;
        let better = match best {
            None => true,
            Some((_, b)) if steepest_up => g > b,
            Some((_, b)) => g < b,
        };
        if better {
            best = Some((c, g));
        }
    }
    Ok(best.map(|(c, _)| c))
}

// Shared order statistics

fn mean(s: &Signal) -> FeatureResult {
    Ok(s.stats().map(|st| st.mean))
}

fn std_dev(s: &Signal) -> FeatureResult {
    Ok(s.stats().map(|st| st.std_dev))
}

fn median(s: &Signal) -> FeatureResult {
    Ok(s.stats().map(|st| st.median))
}

fn max_value(s: &Signal) -> FeatureResult {
    Ok(s.stats().map(|st| st.max))
}

fn min_value(s: &Signal) -> FeatureResult {
    Ok(s.stats().map(|st| st.min))
}

fn argmax(s: &Signal) -> FeatureResult {
    Ok(s.stats().and_then(|st| index(st.argmax)))
}

fn argmin(s: &Signal) -> FeatureResult {
    Ok(s.stats().and_then(|st| index(st.argmin)))
}

// Pressure

fn max_point_derivative(s: &Signal) -> FeatureResult {
    gradient_at(s, s.stats().map(|st| st.argmax))
}

fn derivative_of_first_peak(s: &Signal) -> FeatureResult {
    gradient_at(s, nth_peak(s, 0))
}

fn derivative_of_second_peak(s: &Signal) -> FeatureResult {
    gradient_at(s, nth_peak(s, 1))
}

fn first_peak_time(s: &Signal) -> FeatureResult {
    Ok(nth_peak(s, 0).and_then(index))
}

fn second_peak_time(s: &Signal) -> FeatureResult {
    Ok(nth_peak(s, 1).and_then(index))
}

fn first_valley_time(s: &Signal) -> FeatureResult {
    Ok(first_valley(s).and_then(index))
}

fn area_under_curve(s: &Signal) -> FeatureResult {
    Ok(trapezoid(s.samples()))
}

fn slope_angle_of_first_localmax(s: &Signal) -> FeatureResult {
    Ok(gradient_at(s, nth_peak(s, 0))?.map(slope_angle))
}

fn slope_angle_of_first_localmin(s: &Signal) -> FeatureResult {
    Ok(gradient_at(s, first_valley(s))?.map(slope_angle))
}

fn first_local_max_point(s: &Signal) -> FeatureResult {
    sample_at(s, nth_peak(s, 0))
}

fn first_local_min_point(s: &Signal) -> FeatureResult {
    sample_at(s, first_valley(s))
}

// Temperature

/// Drop from `from` to the last sample, per sample after `from`
fn cooling_from(s: &Signal, from: Option<usize>) -> FeatureResult {
    let Some(from) = from else {
        return Ok(None);
    };
    let (Some(start), Some(&last)) = (sample_at(s, Some(from))?, s.samples().last()) else {
        return Ok(None);
    };
    let after = (s.len() - 1 - from).max(1);
    Ok(Some((start - last) / after as f64))
}

fn cooling_rate(s: &Signal) -> FeatureResult {
    cooling_from(s, s.stats().map(|st| st.argmax))
}

fn cooling_rate_after_first_localmax(s: &Signal) -> FeatureResult {
    cooling_from(s, nth_peak(s, 0))
}

fn derivative_of_temp_rising(s: &Signal) -> FeatureResult {
    Ok(s
        .gradient()
        .map(|g| g.iter().copied().fold(f64::NEG_INFINITY, f64::max)))
}

// Common

fn first_point(s: &Signal) -> FeatureResult {
    Ok(s.samples().first().copied())
}

fn last_point(s: &Signal) -> FeatureResult {
    Ok(s.samples().last().copied())
}

fn slope_angle_of_globalmax(s: &Signal) -> FeatureResult {
    Ok(gradient_at(s, steepest(s, s.maxima(), true)?)?.map(slope_angle))
}

fn slope_angle_of_globalmax_time(s: &Signal) -> FeatureResult {
    Ok(steepest(s, s.maxima(), true)?.and_then(index))
}

fn slope_angle_to_last_point(s: &Signal) -> FeatureResult {
    let x = s.samples();
    if x.len() < 2 {
        return Ok(None);
    }
    Ok(Some(slope_angle(x[x.len() - 1] - x[x.len() - 2])))
}

fn slope_angle_to_last_point_time(s: &Signal) -> FeatureResult {
    Ok(s.len().checked_sub(2).and_then(index))
}

fn slope_angle_of_globalmin(s: &Signal) -> FeatureResult {
    Ok(gradient_at(s, steepest(s, s.minima(), false)?)?.map(slope_angle))
}

fn slope_angle_of_globalmin_time(s: &Signal) -> FeatureResult {
    Ok(steepest(s, s.minima(), false)?.and_then(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn eval(group: FeatureGroup, name: &str, samples: &[f64]) -> Option<f64> {
        let feature = lookup(group, name).unwrap_or_else(|| panic!("unknown feature {name}"));
        (feature.compute)(&Signal::new(samples.to_vec())).unwrap()
    }

    #[test]
    fn test_catalog_names_unique_per_group() {
        let mut seen = HashSet::new();
        for f in CATALOG {
            assert!(seen.insert((f.group, f.name)), "duplicate {}", f.name);
        }
        assert_eq!(features_in(Pressure).count(), 23);
        assert_eq!(features_in(Temperature).count(), 7);
        assert_eq!(features_in(Common).count(), 8);
    }

    #[test]
    fn test_flat_channel_has_no_peak_features() {
        let flat = [5.0, 5.0, 5.0, 5.0];
        for name in [
            "derivative_of_first_peak",
            "derivative_of_first_peak_time",
            "derivative_of_second_peak",
            "derivative_of_second_peak_time",
            "slope_angle_of_first_localmax",
            "slope_angle_of_first_localmax_time",
            "slope_angle_of_first_localmin",
            "slope_angle_of_first_localmin_time",
            "first_local_max_point",
            "first_local_max_point_time",
            "first_local_min_point",
            "first_local_min_point_time",
        ] {
            assert_eq!(eval(Pressure, name, &flat), None, "{name}");
        }
        for name in [
            "slope_angle_of_globalmax",
            "slope_angle_of_globalmax_time",
            "slope_angle_of_globalmin",
            "slope_angle_of_globalmin_time",
        ] {
            assert_eq!(eval(Common, name, &flat), None, "{name}");
        }
        assert_eq!(eval(Temperature, "cooling_rate_after_first_localmax", &flat), None);

        assert_eq!(eval(Pressure, "mean", &flat), Some(5.0));
        assert_eq!(eval(Pressure, "std", &flat), Some(0.0));
        assert_eq!(eval(Common, "first_point", &flat), Some(5.0));
        assert_eq!(eval(Common, "last_point", &flat), Some(5.0));
    }

    #[test]
    fn test_max_point_derivative_boundaries() {
        assert_eq!(eval(Pressure, "max_point_derivative", &[1.0, 4.0, 2.0]), Some(0.5));
        assert_eq!(eval(Pressure, "max_point_derivative", &[1.0, 2.0, 4.0]), Some(2.0));
        assert_eq!(eval(Pressure, "max_point_derivative", &[4.0, 2.0, 1.0]), Some(-2.0));
        assert_eq!(eval(Pressure, "max_point_derivative", &[4.0]), None);
    }

    #[test]
    fn test_peak_features() {
        // peaks at 2 and 5, minima at 3
        let x = [0.0, 1.0, 3.0, 2.0, 4.0, 6.0, 1.0];
        assert_eq!(eval(Pressure, "derivative_of_first_peak_time", &x), Some(2.0));
        assert_eq!(eval(Pressure, "derivative_of_first_peak", &x), Some(0.5));
        assert_eq!(eval(Pressure, "derivative_of_second_peak_time", &x), Some(5.0));
        assert_eq!(eval(Pressure, "derivative_of_second_peak", &x), Some(-1.5));
        assert_eq!(eval(Pressure, "first_local_max_point", &x), Some(3.0));
        assert_eq!(eval(Pressure, "first_local_min_point", &x), Some(2.0));
        assert_eq!(eval(Pressure, "first_local_min_point_time", &x), Some(3.0));

        let angle = eval(Pressure, "slope_angle_of_first_localmax", &x).unwrap();
        assert!((angle - 0.5f64.atan().to_degrees()).abs() < 1e-12);
        let angle = eval(Pressure, "slope_angle_of_first_localmin", &x).unwrap();
        assert!((angle - 0.5f64.atan().to_degrees()).abs() < 1e-12);
    }

    #[test]
    fn test_global_slope_features_pick_steepest_extremum() {
        // peaks at 2 (grad 0.5) and 5 (grad -1.5): steepest upward is 2
        let x = [0.0, 1.0, 3.0, 2.0, 4.0, 6.0, 1.0];
        assert_eq!(eval(Common, "slope_angle_of_globalmax_time", &x), Some(2.0));
        assert_eq!(eval(Common, "slope_angle_of_globalmin_time", &x), Some(3.0));
        assert_eq!(eval(Common, "slope_angle_to_last_point_time", &x), Some(5.0));
        let angle = eval(Common, "slope_angle_to_last_point", &x).unwrap();
        assert!((angle - (-5.0f64).atan().to_degrees()).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_features() {
        let x = [20.0, 30.0, 80.0, 60.0, 50.0];
        assert_eq!(eval(Temperature, "max_temp", &x), Some(80.0));
        assert_eq!(eval(Temperature, "max_temp_time", &x), Some(2.0));
        assert_eq!(eval(Temperature, "min_temp_time", &x), Some(0.0));
        assert_eq!(eval(Temperature, "cooling_rate", &x), Some(15.0));
        assert_eq!(eval(Temperature, "cooling_rate_after_first_localmax", &x), Some(15.0));
        assert_eq!(eval(Temperature, "derivative_of_temp_rising", &x), Some(30.0));
    }

    #[test]
    fn test_cooling_rate_two_samples() {
        assert_eq!(eval(Temperature, "cooling_rate", &[10.0, 9.0]), Some(1.0));
        assert_eq!(eval(Temperature, "cooling_rate", &[9.0, 10.0]), Some(0.0));
    }

    #[test]
    fn test_short_series_yield_missing() {
        assert_eq!(eval(Temperature, "derivative_of_temp_rising", &[1.0]), None);
        assert_eq!(eval(Common, "slope_angle_to_last_point", &[1.0]), None);
        assert_eq!(eval(Common, "slope_angle_to_last_point_time", &[1.0]), None);
        assert_eq!(eval(Pressure, "area_under_curve", &[1.0]), Some(0.0));
        for f in CATALOG {
            assert_eq!((f.compute)(&Signal::new(Vec::new())).unwrap(), None, "{}", f.name);
        }
    }

    #[test]
    fn test_non_finite_sample_leaves_order_features_missing() {
        let x = [1.0, 3.0, f64::NAN, 2.0, 0.0, 4.0];
        for name in ["mean", "std", "median", "max_point", "max_point_time", "max_point_derivative"] {
            assert_eq!(eval(Pressure, name, &x), None, "{name}");
        }
        assert_eq!(eval(Temperature, "cooling_rate", &x), None);
        assert_eq!(eval(Pressure, "first_local_min_point", &x), Some(0.0));
        assert_eq!(eval(Pressure, "first_local_min_point_time", &x), Some(4.0));
        assert_eq!(eval(Common, "first_point", &x), Some(1.0));
        assert!(eval(Pressure, "area_under_curve", &x).unwrap().is_nan());
    }

    #[test]
    fn test_index_outside_derived_series_is_an_error() {
        let signal = Signal::new(vec![1.0, 2.0]);
        assert_eq!(
            gradient_at(&signal, Some(5)),
            Err(ComputeError::IndexOutOfRange {
                series: "gradient",
                index: 5,
                len: 2
            })
        );
        assert!(matches!(
            sample_at(&signal, Some(2)),
            Err(ComputeError::IndexOutOfRange { series: "samples", .. })
        ));
        assert_eq!(sample_at(&signal, None), Ok(None));
    }
}
