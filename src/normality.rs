//! Shapiro-Wilk normality test and the normality gate.
//!
//! The W statistic and its p-value come from `u_analytics`, which
//! implements Royston's approximation (AS R94) for 3 ≤ n ≤ 5000.
//!
//! # Example
//!
//! ```
//! use agristat::normality::check_normality;
//!
//! let p = check_normality(&[4.2, 4.8, 5.1, 5.5, 5.9, 6.3, 6.6]).unwrap();
//! assert!(p > 0.05);
//! ```

use serde::Serialize;

use crate::config::NormalityConfig;
use crate::dataframe::{DataType, Table};
use crate::error::{AgriError, Result};

/// Largest sample the approximation is defined for.
pub const MAX_SAMPLE: usize = 5000;

/// Default minimum sample for the gate.
pub const DEFAULT_MIN_SAMPLE: usize = 4;

// ── Shapiro-Wilk ──────────────────────────────────────────────────────

/// Result of a Shapiro-Wilk test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapiroWilk {
    /// W statistic in (0, 1].
    pub w: f64,
    /// Upper-tail p-value.
    pub p_value: f64,
    /// Number of observations used.
    pub n: usize,
}

/// Runs the Shapiro-Wilk test on finite data.
///
/// Returns `None` when n < 3, n > 5000, or any value is not finite.
/// Constant data yields `W = 1`, `p = 1`.
///
/// ```
/// use agristat::normality::shapiro_wilk;
///
/// let r = shapiro_wilk(&[148.0, 154.0, 158.0, 160.0, 161.0, 162.0,
///                        166.0, 170.0, 182.0, 195.0, 236.0]).unwrap();
/// assert!((r.w - 0.7888).abs() < 1e-3);
/// assert!(r.p_value < 0.01);
/// ```
pub fn shapiro_wilk(data: &[f64]) -> Option<ShapiroWilk> {
    let n = data.len();
    if !(3..=MAX_SAMPLE).contains(&n) || data.iter().any(|v| !v.is_finite()) {
        return None;
    }

    // u_analytics refuses zero-range samples; the gate treats them as normal.
    let (lo, hi) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
        return Some(ShapiroWilk {
            w: 1.0,
            p_value: 1.0,
            n,
        });
    }

    u_analytics::testing::shapiro_wilk_test(data).map(|r| ShapiroWilk {
        w: r.w,
        p_value: r.p_value,
        n,
    })
}

// ── Single-sample check ───────────────────────────────────────────────

/// Shapiro-Wilk p-value for a sample, ignoring NaN entries.
///
/// # Errors
///
/// - [`AgriError::InsufficientData`] with fewer than 4 observations
/// - [`AgriError::AnalysisFailed`] with more than 5000 observations
pub fn check_normality(values: &[f64]) -> Result<f64> {
    check_normality_with(values, DEFAULT_MIN_SAMPLE).map(|r| r.p_value)
}

/// Like [`check_normality`] with an explicit minimum sample, returning
/// the full test result.
pub fn check_normality_with(values: &[f64], min_sample: usize) -> Result<ShapiroWilk> {
    let clean: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    let min_required = min_sample.max(3);
    if clean.len() < min_required {
        return Err(AgriError::InsufficientData {
            min_required,
            actual: clean.len(),
        });
    }
    if clean.len() > MAX_SAMPLE {
        return Err(AgriError::AnalysisFailed {
            kind: "normality".into(),
            cause: format!("sample exceeds {MAX_SAMPLE} observations"),
        });
    }
    shapiro_wilk(&clean).ok_or_else(|| AgriError::AnalysisFailed {
        kind: "normality".into(),
        cause: "sample contains non-finite values".into(),
    })
}

// ── Gate ──────────────────────────────────────────────────────────────

/// Normality verdict for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnNormality {
    pub column: String,
    pub n: usize,
    pub w: f64,
    pub p_value: f64,
    /// `true` when `p_value >= alpha`.
    pub normal: bool,
}

/// Per-column normality results and the gate decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalityReport {
    pub alpha: f64,
    pub columns: Vec<ColumnNormality>,
}

impl NormalityReport {
    /// `true` if every tested column is consistent with normality.
    pub fn passed(&self) -> bool {
        self.columns.iter().all(|c| c.normal)
    }

    /// Columns whose normality was rejected.
    pub fn rejected(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !c.normal)
            .map(|c| c.column.as_str())
            .collect()
    }

    /// Advice shown when the gate halts; `None` if it passed.
    pub fn recommendation(&self) -> Option<String> {
        let rejected = self.rejected();
        if rejected.is_empty() {
            return None;
        }
        Some(format!(
            "Normality rejected at alpha = {} for: {}. Parametric tests are not \
             appropriate. Use a non-parametric method (Kruskal-Wallis instead of \
             ANOVA, Spearman instead of Pearson correlation) or transform the data \
             (log or square root) and check again.",
            self.alpha,
            rejected.join(", ")
        ))
    }
}

/// Tests the named columns of `table`.
///
/// An empty `columns` list tests every numeric column.
///
/// # Errors
///
/// - [`AgriError::MissingRole`] if a named column does not exist
/// - [`AgriError::ColumnType`] if a named column is text
/// - [`AgriError::InsufficientData`] if a column is shorter than the minimum sample
pub fn normality_report(
    table: &Table,
    columns: &[&str],
    config: &NormalityConfig,
) -> Result<NormalityReport> {
    let names: Vec<&str> = if columns.is_empty() {
        table.numeric_columns()
    } else {
        columns.to_vec()
    };
    if names.is_empty() {
        return Err(AgriError::InsufficientData {
            min_required: 1,
            actual: 0,
        });
    }

    let mut results = Vec::with_capacity(names.len());
    for name in names {
        let col = table
            .column_by_name(name)
            .ok_or_else(|| AgriError::MissingRole {
                role: "normality".into(),
                column: Some(name.to_string()),
            })?;
        let values = col.valid_numeric_values().ok_or(AgriError::ColumnType {
            column: name.to_string(),
            expected: DataType::Numeric,
            found: col.data_type(),
        })?;
        let sw = check_normality_with(&values, config.min_sample)?;
        let normal = sw.p_value >= config.alpha;
        tracing::debug!(column = name, n = sw.n, w = sw.w, p_value = sw.p_value, normal, "shapiro-wilk");
        results.push(ColumnNormality {
            column: name.to_string(),
            n: sw.n,
            w: sw.w,
            p_value: sw.p_value,
            normal,
        });
    }

    Ok(NormalityReport {
        alpha: config.alpha,
        columns: results,
    })
}
