/// Numeric helpers shared by the table pipelines (i.e. not FASTX-based).

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n-1 denominator, matching the tables the
/// original workflow produced). 0.0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Median of a slice (not required to be sorted).
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Coefficient of variation in percent: sd / mean * 100.
pub fn percent_cv(values: &[f64]) -> f64 {
    let mu = mean(values);
    if mu == 0.0 {
        return 0.0;
    }
    std_dev(values) / mu * 100.0
}

/// Per-row z-score. A zero standard deviation divides by 1 instead, keeping
/// constant rows finite.
pub fn zscore_row(values: &[f64]) -> Vec<f64> {
    let mu = mean(values);
    let mut sd = std_dev(values);
    if sd == 0.0 {
        sd = 1.0;
    }
    values.iter().map(|v| (v - mu) / sd).collect()
}

/// Classic O(n*m) dynamic-programming DTW distance between two series.
/// Used by the clustering module as its sequence metric.
pub fn dtw_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }
    let (n, m) = (a.len(), b.len());
    let mut cost = vec![f64::INFINITY; (n + 1) * (m + 1)];
    cost[0] = 0.0;
    for i in 1..=n {
        for j in 1..=m {
            let d = (a[i - 1] - b[j - 1]).powi(2);
            let best = cost[(i - 1) * (m + 1) + j]
                .min(cost[i * (m + 1) + j - 1])
                .min(cost[(i - 1) * (m + 1) + j - 1]);
            cost[i * (m + 1) + j] = d + best;
        }
    }
    cost[n * (m + 1) + m].sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-12);
        // Sample std of the classic example
        assert!((std_dev(&values) - 2.13809).abs() < 1e-4);
    }

    #[test]
    fn test_median_even_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn test_percent_cv_constant_row_is_zero() {
        assert_eq!(percent_cv(&[5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_zscore_row_centered() {
        let z = zscore_row(&[1.0, 2.0, 3.0]);
        assert!(mean(&z).abs() < 1e-12);
        // Constant rows stay finite
        let flat = zscore_row(&[2.0, 2.0]);
        assert!(flat.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_dtw_identity_and_symmetry() {
        let a = [0.0, 1.0, 2.0, 1.0];
        let b = [0.0, 0.5, 2.0, 1.5];
        assert_eq!(dtw_distance(&a, &a), 0.0);
        assert!((dtw_distance(&a, &b) - dtw_distance(&b, &a)).abs() < 1e-12);
        // Warping absorbs a time shift that Euclidean distance would not
        let shifted = [0.0, 0.0, 1.0, 2.0];
        let base = [0.0, 1.0, 2.0, 2.0];
        assert!(dtw_distance(&base, &shifted) < 1.0);
    }
}
