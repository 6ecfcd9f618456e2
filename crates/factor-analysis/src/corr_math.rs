//! Low-level correlation primitives shared by IC computation, layering
//! monotonicity, and pairwise factor correlation (§4.8). Pure functions
//! over paired samples — no panel or date awareness lives here.

use statrs::distribution::{ContinuousCDF, StudentsT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
}

/// Pearson product-moment correlation. Returns `None` if either series has
/// zero variance (undefined correlation) or fewer than 2 points.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 || n != ys.len() {
        return None;
    }
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Fractional (average-tie) ranks, 1-indexed, ascending.
pub fn rank(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Average rank (1-indexed) over the tied block [i, j].
        let avg_rank = ((i + 1) + (j + 1)) as f64 / 2.0;
        for k in order.iter().take(j + 1).skip(i) {
            ranks[*k] = avg_rank;
        }
        i = j + 1;
    }
    ranks
}

/// Spearman rank correlation: Pearson correlation of the rank transforms.
pub fn spearman(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    pearson(&rank(xs), &rank(ys))
}

pub fn correlate(method: CorrelationMethod, xs: &[f64], ys: &[f64]) -> Option<f64> {
    match method {
        CorrelationMethod::Pearson => pearson(xs, ys),
        CorrelationMethod::Spearman => spearman(xs, ys),
    }
}

/// Sample mean and (ddof=1) standard deviation. Returns `std = 0.0` for a
/// single observation rather than `NaN`.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}

/// Two-sided single-sample Student's-t test against `mu = 0`. Returns
/// `(t_stat, p_value)`; degenerate when `std == 0` or `n < 2`.
pub fn t_test_against_zero(mean: f64, std: f64, n: usize) -> (f64, f64) {
    if n < 2 || std == 0.0 {
        return (0.0, 1.0);
    }
    let se = std / (n as f64).sqrt();
    let t_stat = mean / se;
    let df = (n - 1) as f64;
    let dist = StudentsT::new(0.0, 1.0, df).expect("valid Student's t degrees of freedom");
    let p_value = 2.0 * (1.0 - dist.cdf(t_stat.abs()));
    (t_stat, p_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pearson_of_perfectly_linear_series_is_one() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![2.0, 4.0, 6.0, 8.0];
        assert_relative_eq!(pearson(&xs, &ys).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn pearson_undefined_for_zero_variance() {
        let xs = vec![1.0, 1.0, 1.0];
        let ys = vec![1.0, 2.0, 3.0];
        assert!(pearson(&xs, &ys).is_none());
    }

    #[test]
    fn spearman_ignores_nonlinear_monotonic_transform() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys: Vec<f64> = xs.iter().map(|x| x.powi(3)).collect();
        assert_relative_eq!(spearman(&xs, &ys).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rank_averages_ties() {
        let ranks = rank(&[10.0, 20.0, 20.0, 30.0]);
        assert_eq!(ranks, vec![1.0, 2.5, 2.5, 4.0]);
    }

    #[test]
    fn t_test_large_mean_small_std_is_significant() {
        let (t_stat, p_value) = t_test_against_zero(0.05, 0.01, 100);
        assert!(t_stat > 30.0);
        assert!(p_value < 0.001);
    }
}
