// Weighted sample statistics shared by the geometry, bandwidth and density code

/// ln(2π)
const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Kish effective sample size `(Σw)² / Σw²`.
///
/// Returns 0 for an empty or all-zero weight set.
pub fn effective_sample_size(weights: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum_w = 0.0f64;
    let mut sum_w2 = 0.0f64;
    for w in weights {
        sum_w += w;
        sum_w2 += w * w;
    }
    if sum_w2 <= 0.0 {
        return 0.0;
    }
    sum_w * sum_w / sum_w2
}

/// Weighted mean and (population) variance of a single column.
///
/// `weights = None` means unit weights. Returns `None` when the total weight is
/// not positive.
pub fn weighted_mean_var(values: &[f64], weights: Option<&[f64]>) -> Option<(f64, f64)> {
    let mut sum_w = 0.0f64;
    let mut sum_wx = 0.0f64;
    for (i, &x) in values.iter().enumerate() {
        let w = weights.map(|ws| ws[i]).unwrap_or(1.0);
        sum_w += w;
        sum_wx += w * x;
    }
    if !(sum_w > 0.0) {
        return None;
    }
    let mean = sum_wx / sum_w;

    // Two-pass variance: the single-pass form cancels badly for energies ~1e6
    let mut sum_wd2 = 0.0f64;
    for (i, &x) in values.iter().enumerate() {
        let w = weights.map(|ws| ws[i]).unwrap_or(1.0);
        let d = x - mean;
        sum_wd2 += w * d * d;
    }
    Some((mean, (sum_wd2 / sum_w).max(0.0)))
}

/// Per-column weighted standard deviation of a row-major `n × dim` matrix
pub fn column_std(rows: &[f64], dim: usize, weights: Option<&[f64]>) -> Vec<f64> {
    if dim == 0 {
        return Vec::new();
    }
    let n = rows.len() / dim;
    let mut column = Vec::with_capacity(n);
    (0..dim)
        .map(|d| {
            column.clear();
            column.extend((0..n).map(|i| rows[i * dim + d]));
            weighted_mean_var(&column, weights)
                .map(|(_, var)| var.sqrt())
                .unwrap_or(0.0)
        })
        .collect()
}

#[inline]
pub fn standard_normal_logpdf(z: f64) -> f64 {
    -0.5 * (z * z + LN_2PI)
}

/// Numerically stable `ln Σ exp(t_i)`; `-inf` for an empty input
pub fn log_sum_exp(terms: impl IntoIterator<Item = f64>) -> f64 {
    // Online form: keep (m, s) with ln Σ = m + ln s
    let mut m = f64::NEG_INFINITY;
    let mut s = 0.0f64;
    for t in terms {
        if t == f64::NEG_INFINITY {
            continue;
        }
        if t > m {
            s = if m.is_finite() { s * (m - t).exp() + 1.0 } else { 1.0 };
            m = t;
        } else {
            s += (t - m).exp();
        }
    }
    if !m.is_finite() {
        return f64::NEG_INFINITY;
    }
    m + s.ln()
}

/// Number of distinct rows in a row-major `n × dim` matrix (exact comparison)
pub fn distinct_rows(rows: &[f64], dim: usize) -> usize {
    if dim == 0 {
        return 0;
    }
    let mut keyed: Vec<&[f64]> = rows.chunks_exact(dim).collect();
    keyed.sort_by(|a, b| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    keyed.dedup();
    keyed.len()
}
