//! Factor-to-factor correlation, high-pair discovery, and hierarchical
//! clustering (§4.8 "Correlation").

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use panel_core::{CoreError, ScorePanel, StockCode};

use crate::corr_math::pearson;
use crate::types::{CorrelationMatrix, CorrelationMode, HighCorrelationPair};

/// Build the symmetric factor correlation matrix. `factors` must be
/// non-empty; factor order in the output follows `factors`' insertion
/// order via the caller-supplied name list.
pub fn build_correlation_matrix(
    names: &[String],
    factors: &HashMap<String, ScorePanel>,
    mode: CorrelationMode,
) -> Result<CorrelationMatrix, CoreError> {
    if names.len() < 2 {
        return Err(CoreError::InvalidInput(
            "correlation matrix requires at least 2 factors".to_string(),
        ));
    }

    let n = names.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
    }

    match mode {
        CorrelationMode::Concat => {
            let vectors = stacked_vectors(names, factors);
            for i in 0..n {
                for j in (i + 1)..n {
                    let rho = pearson(&vectors[i], &vectors[j]).unwrap_or(0.0);
                    matrix[i][j] = rho;
                    matrix[j][i] = rho;
                }
            }
        }
        CorrelationMode::Mean => {
            for i in 0..n {
                for j in (i + 1)..n {
                    let rho = mean_cross_sectional_correlation(
                        &factors[&names[i]],
                        &factors[&names[j]],
                    );
                    matrix[i][j] = rho;
                    matrix[j][i] = rho;
                }
            }
        }
    }

    Ok(CorrelationMatrix {
        factor_names: names.to_vec(),
        matrix,
    })
}

/// One vector per factor, aligned over the `(date, stock)` keys common to
/// every factor in `names`.
fn stacked_vectors(names: &[String], factors: &HashMap<String, ScorePanel>) -> Vec<Vec<f64>> {
    let mut common_keys: Option<BTreeSet<(NaiveDate, StockCode)>> = None;
    for name in names {
        let panel = &factors[name];
        let keys: BTreeSet<(NaiveDate, StockCode)> = panel
            .calendar()
            .as_slice()
            .iter()
            .flat_map(|date| panel.row(*date).into_iter().map(move |(s, _)| (*date, s)))
            .collect();
        common_keys = Some(match common_keys {
            Some(existing) => existing.intersection(&keys).cloned().collect(),
            None => keys,
        });
    }
    let keys: Vec<(NaiveDate, StockCode)> = common_keys.unwrap_or_default().into_iter().collect();

    names
        .iter()
        .map(|name| {
            let panel = &factors[name];
            keys.iter()
                .map(|(date, stock)| *panel.get(stock, *date).unwrap_or(&f64::NAN))
                .collect()
        })
        .collect()
}

/// Average of per-date cross-sectional Pearson correlations between two
/// factor panels, over dates where both have at least 2 overlapping stocks.
fn mean_cross_sectional_correlation(a: &ScorePanel, b: &ScorePanel) -> f64 {
    let common_dates = a.calendar().intersect(b.calendar());
    let mut daily = Vec::new();
    for date in common_dates {
        let row_a: HashMap<StockCode, f64> = a.row(date).into_iter().collect();
        let row_b: HashMap<StockCode, f64> = b.row(date).into_iter().collect();
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (stock, va) in &row_a {
            if let Some(vb) = row_b.get(stock) {
                if va.is_finite() && vb.is_finite() {
                    xs.push(*va);
                    ys.push(*vb);
                }
            }
        }
        if let Some(rho) = pearson(&xs, &ys) {
            daily.push(rho);
        }
    }
    if daily.is_empty() {
        0.0
    } else {
        daily.iter().sum::<f64>() / daily.len() as f64
    }
}

impl CorrelationMatrix {
    /// Upper-triangle entries whose absolute correlation meets `threshold`.
    pub fn find_high_pairs(&self, threshold: f64) -> Vec<HighCorrelationPair> {
        let n = self.factor_names.len();
        let mut out = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let rho = self.matrix[i][j];
                if rho.abs() >= threshold {
                    out.push(HighCorrelationPair {
                        factor_a: self.factor_names[i].clone(),
                        factor_b: self.factor_names[j].clone(),
                        correlation: rho,
                    });
                }
            }
        }
        out
    }

    /// Agglomerative average-linkage clustering over the distance matrix
    /// `1 - |rho|`, cut to produce exactly `target_clusters` groups
    /// (fewer if there are fewer factors than that).
    pub fn cluster(&self, target_clusters: usize) -> Vec<Vec<String>> {
        let n = self.factor_names.len();
        if n == 0 {
            return Vec::new();
        }
        let target = target_clusters.clamp(1, n);

        let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        let mut dist = |a: &[usize], b: &[usize]| -> f64 {
            let mut total = 0.0;
            let mut count = 0.0;
            for &i in a {
                for &j in b {
                    total += 1.0 - self.matrix[i][j].abs();
                    count += 1.0;
                }
            }
            total / count
        };

        while clusters.len() > target {
            let mut best = (0usize, 1usize, f64::INFINITY);
            for i in 0..clusters.len() {
                for j in (i + 1)..clusters.len() {
                    let d = dist(&clusters[i], &clusters[j]);
                    if d < best.2 {
                        best = (i, j, d);
                    }
                }
            }
            let (i, j, _) = best;
            let merged: Vec<usize> = clusters[i]
                .iter()
                .chain(clusters[j].iter())
                .copied()
                .collect();
            // Remove the higher index first so the lower index stays valid.
            clusters.remove(j);
            clusters.remove(i);
            clusters.push(merged);
        }

        clusters
            .into_iter()
            .map(|members| members.iter().map(|&i| self.factor_names[i].clone()).collect())
            .collect()
    }
}
