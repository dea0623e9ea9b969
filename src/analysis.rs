//! Correlation and simple linear regression on paired observations.
//!
//! Both routines expect complete pairs: rows with a missing value in
//! either column are removed by the dispatcher before the call.
//!
//! # Correlation
//!
//! ```
//! use agristat::analysis::correlation_pair;
//!
//! let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let y = [1.2, 1.9, 3.2, 3.8, 5.3, 5.9];
//! let pair = correlation_pair("N rate", "Yield", &x, &y).unwrap();
//! assert!(pair.pearson.r > 0.99);
//! assert!(pair.spearman.r > 0.99);
//! ```

use serde::Serialize;

use crate::stats::StatError;

// ── Input Validation ──────────────────────────────────────────────────

fn validate_pairs(x_name: &str, y_name: &str, x: &[f64], y: &[f64]) -> Result<(), StatError> {
    if x.len() != y.len() {
        return Err(StatError::LengthMismatch);
    }
    if x.len() < 3 {
        return Err(StatError::TooFewObservations {
            needed: 3,
            got: x.len(),
        });
    }
    if has_zero_variance(x) {
        return Err(StatError::ZeroVariance(x_name.to_string()));
    }
    if has_zero_variance(y) {
        return Err(StatError::ZeroVariance(y_name.to_string()));
    }
    Ok(())
}

fn has_zero_variance(data: &[f64]) -> bool {
    data.windows(2).all(|w| w[0] == w[1])
}

// ── Correlation Analysis ──────────────────────────────────────────────

/// A correlation coefficient with its two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrelationStat {
    pub r: f64,
    pub p_value: f64,
    pub n: usize,
}

/// Pearson and Spearman correlation between two columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationPair {
    /// First column name.
    pub col_a: String,
    /// Second column name.
    pub col_b: String,
    pub pearson: CorrelationStat,
    pub spearman: CorrelationStat,
}

/// Pearson product-moment correlation with a t-test p-value (df = n − 2).
pub fn pearson(x: &[f64], y: &[f64]) -> Result<CorrelationStat, StatError> {
    validate_pairs("x", "y", x, y)?;
    checked_pearson(x, y)
}

/// Spearman rank correlation (average ranks for ties) with the
/// t-approximation p-value.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<CorrelationStat, StatError> {
    validate_pairs("x", "y", x, y)?;
    checked_spearman(x, y)
}

fn checked_pearson(x: &[f64], y: &[f64]) -> Result<CorrelationStat, StatError> {
    u_analytics::correlation::pearson(x, y)
        .map(CorrelationStat::from)
        .ok_or(StatError::NonFinite)
}

fn checked_spearman(x: &[f64], y: &[f64]) -> Result<CorrelationStat, StatError> {
    u_analytics::correlation::spearman(x, y)
        .map(CorrelationStat::from)
        .ok_or(StatError::NonFinite)
}

impl From<u_analytics::correlation::CorrelationResult> for CorrelationStat {
    fn from(r: u_analytics::correlation::CorrelationResult) -> Self {
        Self {
            r: r.r,
            p_value: r.p_value,
            n: r.n,
        }
    }
}

/// Computes both correlation coefficients for a named pair of columns.
pub fn correlation_pair(
    col_a: &str,
    col_b: &str,
    x: &[f64],
    y: &[f64],
) -> Result<CorrelationPair, StatError> {
    validate_pairs(col_a, col_b, x, y)?;
    Ok(CorrelationPair {
        col_a: col_a.to_string(),
        col_b: col_b.to_string(),
        pearson: checked_pearson(x, y)?,
        spearman: checked_spearman(x, y)?,
    })
}

// ── Regression Analysis ───────────────────────────────────────────────

/// A regression coefficient with its inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coefficient {
    pub estimate: f64,
    pub std_error: f64,
    pub t: f64,
    pub p_value: f64,
}

/// Simple OLS fit `y = b0 + b1·x`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionSummary {
    /// Name of the predictor column.
    pub x_name: String,
    /// Name of the response column.
    pub y_name: String,
    pub n: usize,
    pub intercept: Coefficient,
    pub slope: Coefficient,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    /// Residual standard error.
    pub sigma: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
}

/// Fits a simple linear regression of `y` on `x`.
///
/// ```
/// use agristat::analysis::simple_ols;
///
/// let x = [1.0, 2.0, 3.0, 4.0, 5.0];
/// let y = [2.1, 3.9, 6.1, 7.9, 10.1];
/// let fit = simple_ols("dose", "yield", &x, &y).unwrap();
/// assert!(fit.r_squared > 0.99);
/// assert!((fit.slope.estimate - 2.0).abs() < 0.1);
/// ```
///
/// # Errors
///
/// Requires at least 3 pairs and variance in both `x` and `y`. A perfect
/// fit yields zero standard errors and infinite t statistics with p = 0.
pub fn simple_ols(
    x_name: &str,
    y_name: &str,
    x: &[f64],
    y: &[f64],
) -> Result<RegressionSummary, StatError> {
    validate_pairs(x_name, y_name, x, y)?;
    let fit = u_analytics::regression::simple_linear_regression(x, y).ok_or(StatError::NonFinite)?;

    let coef = |estimate: f64, std_error: f64, t: f64, p_value: f64| Coefficient {
        estimate,
        std_error,
        t: if t.is_infinite() { t.copysign(estimate) } else { t },
        p_value,
    };

    Ok(RegressionSummary {
        x_name: x_name.to_string(),
        y_name: y_name.to_string(),
        n: fit.n,
        intercept: coef(fit.intercept, fit.intercept_se, fit.intercept_t, fit.intercept_p),
        slope: coef(fit.slope, fit.slope_se, fit.slope_t, fit.slope_p),
        r_squared: fit.r_squared,
        adj_r_squared: fit.adjusted_r_squared,
        sigma: fit.residual_se,
        f_statistic: fit.f_statistic,
        f_p_value: fit.f_p_value,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────
