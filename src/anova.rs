//! Factorial ANOVA with Type II sums of squares.
//!
//! The model is the full factorial linear model with treatment coding:
//! the first level (sorted) of each factor is the reference, and
//! interaction columns are products of the main-effect dummies. For each
//! term `T`, the Type II sum of squares compares the model containing all
//! terms that do not include `T` with the same model plus `T`.
//!
//! A single factor with at least two observations per level goes through
//! `u_analytics::testing::one_way_anova`. Everything else is fitted by
//! least squares on an SVD of the design matrix, so designs with empty
//! cells (aliased interaction columns) fit without error; the aliased
//! columns simply contribute no degrees of freedom.
//!
//! ```
//! use agristat::anova::{fit_anova, Factor};
//!
//! let factor = Factor::new("Variety", ["A", "A", "B", "B"]);
//! let table = fit_anova("Yield", &[1.0, 2.0, 10.0, 11.0], &[factor]).unwrap();
//! let row = table.term("Variety").unwrap();
//! assert!((row.f.unwrap() - 162.0).abs() < 1e-9);
//! ```

use std::collections::BTreeSet;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::stats::{f_upper_p, StatError};

/// Residual share of the total sum of squares treated as an exact fit.
const EXACT_FIT_TOLERANCE: f64 = 1e-10;

/// Name used for the residual row.
pub const RESIDUAL: &str = "Residual";

// ── Input ─────────────────────────────────────────────────────────────

/// A categorical factor: one level label per observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub name: String,
    pub labels: Vec<String>,
}

impl Factor {
    pub fn new<I, S>(name: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Distinct levels in sorted order; the first is the reference.
    pub fn levels(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.labels.iter().map(String::as_str).collect();
        set.into_iter().collect()
    }

    /// Treatment-coded dummy columns, one per non-reference level.
    fn dummies(&self) -> Vec<Vec<f64>> {
        self.levels()
            .iter()
            .skip(1)
            .map(|level| {
                self.labels
                    .iter()
                    .map(|l| if l == level { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect()
    }
}

// ── Output ────────────────────────────────────────────────────────────

/// One row of an ANOVA table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaRow {
    /// Term name (`"A"`, `"A:B"`) or `"Residual"`.
    pub term: String,
    pub sum_sq: f64,
    pub df: usize,
    pub mean_sq: f64,
    /// `None` on the residual row.
    pub f: Option<f64>,
    /// `None` on the residual row.
    pub p_value: Option<f64>,
}

/// A fitted ANOVA table. The last row is always the residual.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaTable {
    pub response: String,
    pub factors: Vec<String>,
    pub n: usize,
    /// Total sum of squares about the grand mean.
    pub ss_total: f64,
    pub rows: Vec<AnovaRow>,
}

impl AnovaTable {
    /// Returns the row for `term`.
    pub fn term(&self, term: &str) -> Option<&AnovaRow> {
        self.rows.iter().find(|r| r.term == term)
    }

    /// Returns the residual row.
    pub fn residual(&self) -> &AnovaRow {
        // fit_anova always appends the residual row last.
        &self.rows[self.rows.len() - 1]
    }

    /// Model term rows, excluding the residual.
    pub fn effects(&self) -> &[AnovaRow] {
        &self.rows[..self.rows.len() - 1]
    }
}

// ── Effect sizes ──────────────────────────────────────────────────────

/// Effect sizes for one ANOVA term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectSizeRow {
    pub term: String,
    /// SS_term / SS_total.
    pub eta_sq: f64,
    /// SS_term / (SS_term + SS_residual).
    pub partial_eta_sq: f64,
    /// (SS_term − df_term·MS_residual) / (SS_total + MS_residual).
    pub omega_sq: f64,
}

/// Effect sizes for every term of an ANOVA model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectSizeTable {
    pub response: String,
    pub rows: Vec<EffectSizeRow>,
}

impl EffectSizeTable {
    pub fn term(&self, term: &str) -> Option<&EffectSizeRow> {
        self.rows.iter().find(|r| r.term == term)
    }
}

/// Derives effect sizes from a fitted table.
pub fn effect_sizes(table: &AnovaTable) -> EffectSizeTable {
    let resid = table.residual();
    let rows = table
        .effects()
        .iter()
        .map(|r| EffectSizeRow {
            term: r.term.clone(),
            eta_sq: r.sum_sq / table.ss_total,
            partial_eta_sq: r.sum_sq / (r.sum_sq + resid.sum_sq),
            omega_sq: (r.sum_sq - r.df as f64 * resid.mean_sq) / (table.ss_total + resid.mean_sq),
        })
        .collect();
    EffectSizeTable {
        response: table.response.clone(),
        rows,
    }
}

// ── Fitting ───────────────────────────────────────────────────────────

/// Fits a full-factorial ANOVA model with Type II sums of squares.
///
/// # Errors
///
/// - [`StatError::LengthMismatch`] if a factor's labels differ in length from `values`
/// - [`StatError::SingleLevel`] if a factor has only one level
/// - [`StatError::NoResidualDf`] if the model is saturated
/// - [`StatError::PerfectFit`] if the residual sum of squares is zero
pub fn fit_anova(response: &str, values: &[f64], factors: &[Factor]) -> Result<AnovaTable, StatError> {
    let n = values.len();
    if factors.iter().any(|f| f.labels.len() != n) {
        return Err(StatError::LengthMismatch);
    }
    if n < 3 {
        return Err(StatError::TooFewObservations { needed: 3, got: n });
    }
    for f in factors {
        if f.levels().len() < 2 {
            return Err(StatError::SingleLevel(f.name.clone()));
        }
    }
    if let [factor] = factors {
        if let Some(table) = one_way(response, values, factor)? {
            return Ok(table);
        }
    }

    let y = DVector::from_column_slice(values);
    let dummies: Vec<Vec<Vec<f64>>> = factors.iter().map(Factor::dummies).collect();
    let terms = all_terms(factors.len());
    let term_columns: Vec<Vec<Vec<f64>>> = terms
        .iter()
        .map(|t| interaction_columns(t, &dummies, n))
        .collect();

    let fit = |included: &[usize]| -> Result<LeastSquares, StatError> {
        let mut cols: Vec<&[f64]> = Vec::new();
        for &ti in included {
            cols.extend(term_columns[ti].iter().map(Vec::as_slice));
        }
        least_squares(&y, &cols)
    };

    let all: Vec<usize> = (0..terms.len()).collect();
    let full = fit(&all)?;
    let df_resid = n.saturating_sub(full.rank);
    if df_resid == 0 {
        return Err(StatError::NoResidualDf);
    }
    let ss_total = {
        let mean = values.iter().sum::<f64>() / n as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
    };
    if full.rss <= EXACT_FIT_TOLERANCE * ss_total.max(f64::MIN_POSITIVE) {
        return Err(StatError::PerfectFit);
    }
    let ms_resid = full.rss / df_resid as f64;

    let mut rows = Vec::with_capacity(terms.len() + 1);
    for (ti, term) in terms.iter().enumerate() {
        let reduced: Vec<usize> = (0..terms.len())
            .filter(|&other| !is_subset(term, &terms[other]))
            .collect();
        let mut augmented = reduced.clone();
        augmented.push(ti);

        let without = fit(&reduced)?;
        let with = fit(&augmented)?;
        let df = with.rank.saturating_sub(without.rank);
        let name = term_name(term, factors);
        if df == 0 {
            tracing::warn!(term = %name, "term is fully aliased; dropped from table");
            continue;
        }
        let sum_sq = (without.rss - with.rss).max(0.0);
        let mean_sq = sum_sq / df as f64;
        let f = mean_sq / ms_resid;
        rows.push(AnovaRow {
            term: name,
            sum_sq,
            df,
            mean_sq,
            f: Some(f),
            p_value: Some(f_upper_p(f, df as f64, df_resid as f64)),
        });
    }
    rows.push(AnovaRow {
        term: RESIDUAL.to_string(),
        sum_sq: full.rss,
        df: df_resid,
        mean_sq: ms_resid,
        f: None,
        p_value: None,
    });

    Ok(AnovaTable {
        response: response.to_string(),
        factors: factors.iter().map(|f| f.name.clone()).collect(),
        n,
        ss_total,
        rows,
    })
}

/// Main effects first, then two-way, then three-way interactions.
fn all_terms(k: usize) -> Vec<Vec<usize>> {
    let mut terms: Vec<Vec<usize>> = (1u32..(1 << k))
        .map(|mask| (0..k).filter(|i| mask & (1 << i) != 0).collect())
        .collect();
    terms.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    terms
}

fn is_subset(a: &[usize], b: &[usize]) -> bool {
    a.iter().all(|x| b.contains(x))
}

fn term_name(term: &[usize], factors: &[Factor]) -> String {
    term.iter()
        .map(|&i| factors[i].name.as_str())
        .collect::<Vec<_>>()
        .join(":")
}

/// Products of one dummy from each factor in `term`.
fn interaction_columns(term: &[usize], dummies: &[Vec<Vec<f64>>], n: usize) -> Vec<Vec<f64>> {
    let mut cols = vec![vec![1.0; n]];
    for &fi in term {
        let mut next = Vec::with_capacity(cols.len() * dummies[fi].len());
        for c in &cols {
            for d in &dummies[fi] {
                next.push(c.iter().zip(d).map(|(a, b)| a * b).collect());
            }
        }
        cols = next;
    }
    cols
}

/// One-way table from the closed-form group decomposition.
///
/// Returns `Ok(None)` when some level has a single observation, which
/// the closed form does not cover; the caller falls back to least squares.
fn one_way(response: &str, values: &[f64], factor: &Factor) -> Result<Option<AnovaTable>, StatError> {
    let groups: Vec<Vec<f64>> = factor
        .levels()
        .iter()
        .map(|level| {
            factor
                .labels
                .iter()
                .zip(values)
                .filter(|(l, _)| l.as_str() == *level)
                .map(|(_, v)| *v)
                .collect()
        })
        .collect();
    let refs: Vec<&[f64]> = groups.iter().map(Vec::as_slice).collect();
    let Some(r) = u_analytics::testing::one_way_anova(&refs) else {
        return Ok(None);
    };

    let ss_total = r.ss_between + r.ss_within;
    if r.ss_within <= EXACT_FIT_TOLERANCE * ss_total.max(f64::MIN_POSITIVE) {
        return Err(StatError::PerfectFit);
    }
    Ok(Some(AnovaTable {
        response: response.to_string(),
        factors: vec![factor.name.clone()],
        n: values.len(),
        ss_total,
        rows: vec![
            AnovaRow {
                term: factor.name.clone(),
                sum_sq: r.ss_between,
                df: r.df_between,
                mean_sq: r.ms_between,
                f: Some(r.f_statistic),
                p_value: Some(r.p_value),
            },
            AnovaRow {
                term: RESIDUAL.to_string(),
                sum_sq: r.ss_within,
                df: r.df_within,
                mean_sq: r.ms_within,
                f: None,
                p_value: None,
            },
        ],
    }))
}

struct LeastSquares {
    rss: f64,
    /// Rank including the intercept.
    rank: usize,
}

/// Residual sum of squares of `y` regressed on an intercept plus `columns`.
///
/// The rank uses the `σ_max · max(n, p) · ε` singular-value cutoff; the
/// fitted values are the projection onto the retained left singular vectors.
fn least_squares(y: &DVector<f64>, columns: &[&[f64]]) -> Result<LeastSquares, StatError> {
    let n = y.len();
    let p = columns.len() + 1;
    let design = DMatrix::from_fn(n, p, |i, j| if j == 0 { 1.0 } else { columns[j - 1][i] });
    let svd = design
        .try_svd(true, false, f64::EPSILON, 0)
        .ok_or(StatError::NoConvergence)?;
    let u = svd.u.as_ref().ok_or(StatError::NoConvergence)?;

    let cutoff = svd.singular_values.max() * n.max(p) as f64 * f64::EPSILON;
    let kept: Vec<usize> = svd
        .singular_values
        .iter()
        .enumerate()
        .filter(|(_, sv)| **sv > cutoff)
        .map(|(k, _)| k)
        .collect();
    let basis = u.select_columns(&kept);
    let fitted = &basis * (basis.transpose() * y);
    Ok(LeastSquares {
        rss: (y - fitted).norm_squared(),
        rank: kept.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn chars(s: &str) -> Vec<String> {
        s.chars().map(String::from).collect()
    }

    #[test]
    fn one_way_reference_values() {
        let t = fit_anova("y", &[1.0, 2.0, 10.0, 11.0], &[Factor::new("g", chars("AABB"))]).unwrap();
        let g = t.term("g").unwrap();
        assert_abs_diff_eq!(g.sum_sq, 81.0, epsilon = 1e-9);
        assert_eq!(g.df, 1);
        assert_abs_diff_eq!(g.f.unwrap(), 162.0, epsilon = 1e-9);
        assert_abs_diff_eq!(g.p_value.unwrap(), 0.006_116_265, epsilon = 1e-6);
        let r = t.residual();
        assert_eq!(r.term, "Residual");
        assert_abs_diff_eq!(r.sum_sq, 1.0, epsilon = 1e-9);
        assert_eq!(r.df, 2);
        assert!(r.f.is_none());
        assert_abs_diff_eq!(t.ss_total, 82.0, epsilon = 1e-9);
    }

    #[test]
    fn one_way_three_levels() {
        let y = [4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 1.0, 2.0, 3.0];
        let t = fit_anova("y", &y, &[Factor::new("g", chars("AAABBBCCC"))]).unwrap();
        // Group means 5, 8, 2; grand mean 5.
        let g = t.term("g").unwrap();
        assert_abs_diff_eq!(g.sum_sq, 54.0, epsilon = 1e-9);
        assert_eq!(g.df, 2);
        assert_eq!(t.residual().df, 6);
        assert_abs_diff_eq!(g.f.unwrap(), 27.0, epsilon = 1e-9);
    }

    #[test]
    fn one_way_singleton_level() {
        // Level C has one plot, so the closed form declines and least squares fits.
        let t = fit_anova("y", &[1.0, 2.0, 10.0, 11.0, 6.0], &[Factor::new("g", chars("AABBC"))]).unwrap();
        let g = t.term("g").unwrap();
        assert_abs_diff_eq!(g.sum_sq, 81.0, epsilon = 1e-9);
        assert_eq!(g.df, 2);
        assert_eq!(t.residual().df, 2);
        assert_abs_diff_eq!(g.f.unwrap(), 81.0, epsilon = 1e-9);
    }

    #[test]
    fn two_way_balanced() {
        let y = [4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 12.0, 13.0];
        let t = fit_anova(
            "y",
            &y,
            &[
                Factor::new("A", chars("aaaabbbb")),
                Factor::new("B", chars("xxyyxxyy")),
            ],
        )
        .unwrap();
        let terms: Vec<&str> = t.rows.iter().map(|r| r.term.as_str()).collect();
        assert_eq!(terms, vec!["A", "B", "A:B", "Residual"]);
        assert_abs_diff_eq!(t.term("A").unwrap().sum_sq, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t.term("B").unwrap().sum_sq, 18.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t.term("A:B").unwrap().sum_sq, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t.term("A").unwrap().p_value.unwrap(), 0.000_562_004, epsilon = 1e-8);
        assert_abs_diff_eq!(t.term("B").unwrap().p_value.unwrap(), 0.003_882_537, epsilon = 1e-8);
        assert_abs_diff_eq!(t.term("A:B").unwrap().p_value.unwrap(), 0.116_116_524, epsilon = 1e-8);
        assert_abs_diff_eq!(t.residual().sum_sq, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn two_way_unbalanced_type_ii() {
        let y = [5.1, 4.8, 6.0, 6.3, 5.5, 7.2, 7.9, 8.1, 6.6, 7.0, 9.4];
        let a = ["N0", "N0", "N0", "N0", "N0", "N1", "N1", "N1", "N1", "N1", "N1"];
        let b = ["irr", "irr", "dry", "dry", "dry", "irr", "irr", "dry", "dry", "irr", "dry"];
        let t = fit_anova("y", &y, &[Factor::new("N", a), Factor::new("W", b)]).unwrap();
        assert_abs_diff_eq!(t.term("N").unwrap().sum_sq, 13.556_481_48, epsilon = 1e-7);
        assert_abs_diff_eq!(t.term("W").unwrap().sum_sq, 1.760_148_15, epsilon = 1e-7);
        assert_abs_diff_eq!(t.term("N:W").unwrap().sum_sq, 0.066_851_85, epsilon = 1e-7);
        assert_abs_diff_eq!(t.residual().sum_sq, 4.745, epsilon = 1e-9);
        assert_eq!(t.residual().df, 7);
        assert_abs_diff_eq!(t.term("N").unwrap().p_value.unwrap(), 0.002_893_875, epsilon = 1e-7);
        assert_abs_diff_eq!(t.term("W").unwrap().p_value.unwrap(), 0.151_125_967, epsilon = 1e-7);
    }

    #[test]
    fn three_way_terms_and_values() {
        let y = [
            3.1, 3.5, 4.0, 4.4, 5.2, 5.0, 6.1, 6.9, 3.3, 3.9, 4.2, 4.9, 5.4, 5.8, 6.3, 7.2,
        ];
        let t = fit_anova(
            "y",
            &y,
            &[
                Factor::new("A", chars("aaaabbbbaaaabbbb")),
                Factor::new("B", chars("xxyyxxyyxxyyxxyy")),
                Factor::new("C", chars("pqpqpqpqqpqpqpqp")),
            ],
        )
        .unwrap();
        let terms: Vec<&str> = t.rows.iter().map(|r| r.term.as_str()).collect();
        assert_eq!(terms, vec!["A", "B", "C", "A:B", "A:C", "B:C", "A:B:C", "Residual"]);
        assert_abs_diff_eq!(t.term("A").unwrap().sum_sq, 17.2225, epsilon = 1e-9);
        assert_abs_diff_eq!(t.term("B").unwrap().sum_sq, 4.84, epsilon = 1e-9);
        assert_abs_diff_eq!(t.term("A:B:C").unwrap().sum_sq, 0.0225, epsilon = 1e-9);
        assert_abs_diff_eq!(t.term("C").unwrap().p_value.unwrap(), 0.545_824_304, epsilon = 1e-7);
        assert_eq!(t.residual().df, 8);
        assert_abs_diff_eq!(t.residual().sum_sq, 1.81, epsilon = 1e-9);
    }

    #[test]
    fn empty_cell_drops_aliased_interaction() {
        // No observation has A = b with B = y.
        let y = [1.0, 1.5, 3.0, 3.4, 5.0, 5.6];
        let t = fit_anova(
            "y",
            &y,
            &[
                Factor::new("A", chars("aaaabb")),
                Factor::new("B", chars("xxyyxx")),
            ],
        )
        .unwrap();
        assert!(t.term("A:B").is_none());
        assert!(t.term("A").is_some());
        assert_eq!(t.residual().df, 3);
    }

    #[test]
    fn single_level_rejected() {
        let err = fit_anova("y", &[1.0, 2.0, 3.0], &[Factor::new("g", chars("AAA"))]).unwrap_err();
        assert_eq!(err, StatError::SingleLevel("g".into()));
    }

    #[test]
    fn saturated_model_rejected() {
        let err = fit_anova("y", &[1.0, 2.0, 3.0], &[Factor::new("g", chars("ABC"))]).unwrap_err();
        assert_eq!(err, StatError::NoResidualDf);
    }

    #[test]
    fn perfect_fit_rejected() {
        let err =
            fit_anova("y", &[1.0, 1.0, 5.0, 5.0], &[Factor::new("g", chars("AABB"))]).unwrap_err();
        assert_eq!(err, StatError::PerfectFit);
    }

    #[test]
    fn length_mismatch_rejected() {
        let err = fit_anova("y", &[1.0, 2.0, 3.0, 4.0], &[Factor::new("g", chars("AAB"))]).unwrap_err();
        assert_eq!(err, StatError::LengthMismatch);
    }

    #[test]
    fn effect_sizes_one_way() {
        let t = fit_anova("y", &[1.0, 2.0, 10.0, 11.0], &[Factor::new("g", chars("AABB"))]).unwrap();
        let es = effect_sizes(&t);
        let g = es.term("g").unwrap();
        assert_abs_diff_eq!(g.eta_sq, 81.0 / 82.0, epsilon = 1e-12);
        assert_abs_diff_eq!(g.partial_eta_sq, 81.0 / 82.0, epsilon = 1e-12);
        assert_abs_diff_eq!(g.omega_sq, (81.0 - 0.5) / 82.5, epsilon = 1e-12);
    }

    #[test]
    fn effect_sizes_two_way() {
        let y = [4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 12.0, 13.0];
        let t = fit_anova(
            "y",
            &y,
            &[
                Factor::new("A", chars("aaaabbbb")),
                Factor::new("B", chars("xxyyxxyy")),
            ],
        )
        .unwrap();
        let es = effect_sizes(&t);
        assert_eq!(es.rows.len(), 3);
        // SS_total = 72
        assert_abs_diff_eq!(es.term("A").unwrap().eta_sq, 50.0 / 72.0, epsilon = 1e-12);
        assert_abs_diff_eq!(es.term("B").unwrap().partial_eta_sq, 18.0 / 20.0, epsilon = 1e-12);
    }

    #[test]
    fn levels_are_sorted() {
        let f = Factor::new("v", ["c", "a", "b", "a"]);
        assert_eq!(f.levels(), vec!["a", "b", "c"]);
    }
}
