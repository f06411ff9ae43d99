//! Local Extremum Detection
//!
//! Plain local maxima without height, prominence, distance or width filters.
//! A flat run of equal samples counts as one peak when both of its outer
//! neighbours are strictly lower; the reported index is the run's midpoint
//! rounded down. The first and last samples are never peaks.

/// Indices of local maxima, ascending
pub fn local_maxima(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }

    let last = n - 1;
    let mut i = 1;
    while i < last {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Indices of local minima (maxima of the negated series), ascending
pub fn local_minima(values: &[f64]) -> Vec<usize> {
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();
    local_maxima(&negated)
}
