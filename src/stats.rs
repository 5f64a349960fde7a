//! Pure numeric routines: means, two-sample t-test, hypergeometric
//! enrichment tail, and Benjamini-Hochberg FDR correction.

use crate::error::{AnalysisError, Result};
use statrs::distribution::{ContinuousCDF, DiscreteCDF, Hypergeometric, StudentsT};

/// Arithmetic mean. Returns NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (n - 1 denominator).
fn sample_variance(values: &[f64], mean: f64) -> f64 {
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Result of a two-sample t-test.
#[derive(Debug, Clone, Copy)]
pub struct TTest {
    /// t statistic.
    pub statistic: f64,
    /// Welch-Satterthwaite degrees of freedom.
    pub df: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// Welch's two-sample t-test (independent samples, unequal variances).
///
/// Tests H0: mean(a) = mean(b) against a two-sided alternative. For groups
/// of equal size and equal variance this coincides with Student's t-test.
///
/// # Errors
/// `Numerical` if either group has fewer than two observations or both
/// variances are zero.
pub fn two_sample_t_test(a: &[f64], b: &[f64]) -> Result<TTest> {
    if a.len() < 2 || b.len() < 2 {
        return Err(AnalysisError::Numerical(format!(
            "t-test requires at least 2 observations per group (got {} and {})",
            a.len(),
            b.len()
        )));
    }

    let (mean_a, mean_b) = (mean(a), mean(b));
    let var_a = sample_variance(a, mean_a);
    let var_b = sample_variance(b, mean_b);
    let se_a = var_a / a.len() as f64;
    let se_b = var_b / b.len() as f64;
    let se = (se_a + se_b).sqrt();
    if se == 0.0 {
        return Err(AnalysisError::Numerical(
            "t-test undefined: both groups have zero variance".into(),
        ));
    }

    let statistic = (mean_a - mean_b) / se;
    // Welch-Satterthwaite approximation
    let df = (se_a + se_b).powi(2)
        / (se_a.powi(2) / (a.len() - 1) as f64 + se_b.powi(2) / (b.len() - 1) as f64);

    let t_dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| AnalysisError::Numerical(format!("t distribution (df={}): {}", df, e)))?;
    let p_value = 2.0 * (1.0 - t_dist.cdf(statistic.abs()));

    Ok(TTest {
        statistic,
        df,
        p_value,
    })
}

/// Upper-tail hypergeometric probability used for enrichment significance.
///
/// Probability of observing `k` or more successes when drawing `m` items
/// without replacement from a universe of `universe` items of which `n` are
/// successes: `P(X >= k) = 1 - CDF(k - 1)`.
///
/// # Errors
/// `Numerical` if `n` or `m` exceed `universe`.
pub fn hypergeometric_enrichment(k: u64, m: u64, n: u64, universe: u64) -> Result<f64> {
    let dist = Hypergeometric::new(universe, n, m).map_err(|e| {
        AnalysisError::Numerical(format!(
            "hypergeometric(N={}, K={}, n={}): {}",
            universe, n, m, e
        ))
    })?;
    if k == 0 {
        return Ok(1.0);
    }
    Ok(1.0 - dist.cdf(k - 1))
}

/// Benjamini-Hochberg FDR correction (step-up).
///
/// Returns adjusted p-values aligned with the input order, each clamped to
/// [0, 1]. For each rank i (ascending p): q[i] = min(p[i] * n / rank,
/// q[i+1]).
///
/// NaN entries mark undefined tests: they are excluded from the correction
/// (they do not count toward n) and stay NaN in the output, so an
/// undefined test can never come out significant.
pub fn bh_adjust(p_values: &[f64]) -> Vec<f64> {
    let mut q_values = vec![f64::NAN; p_values.len()];
    let mut indices: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    let n = indices.len();
    if n == 0 {
        return q_values;
    }
    indices.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut q_sorted = vec![0.0; n];
    let n_f64 = n as f64;

    // Work backwards from the largest p-value, carrying the running minimum.
    q_sorted[n - 1] = p_values[indices[n - 1]].min(1.0);
    for i in (0..n - 1).rev() {
        let rank = i + 1;
        let adjusted = p_values[indices[i]] * n_f64 / rank as f64;
        q_sorted[i] = adjusted.min(q_sorted[i + 1]).min(1.0);
    }

    for (i, &orig_idx) in indices.iter().enumerate() {
        q_values[orig_idx] = q_sorted[i];
    }
    q_values
}

/// Round to `digits` significant digits.
pub fn round_sig(value: f64, digits: u32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let shift = digits as i32 - 1 - value.abs().log10().floor() as i32;
    let factor = 10f64.powi(shift);
    (value * factor).round() / factor
}
