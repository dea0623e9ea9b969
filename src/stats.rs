//! Descriptive helpers and distribution tails shared by the routines.
//!
//! Descriptive statistics and distribution functions come from `statrs`;
//! everything here works on already-cleaned `f64` slices (no NaN).

use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use statrs::statistics::{Data, OrderStatistics, RankTieBreaker, Statistics};
use thiserror::Error;

/// Failure inside a statistical routine.
///
/// The dispatcher wraps these into
/// [`AgriError::AnalysisFailed`](crate::error::AgriError::AnalysisFailed).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatError {
    #[error("need at least {needed} complete observations, got {got}")]
    TooFewObservations { needed: usize, got: usize },
    #[error("'{0}' has zero variance")]
    ZeroVariance(String),
    #[error("factor '{0}' has fewer than two levels")]
    SingleLevel(String),
    #[error("no residual degrees of freedom left after fitting the model")]
    NoResidualDf,
    #[error("residual sum of squares is zero; the model fits the data exactly")]
    PerfectFit,
    #[error("observation and factor lengths differ")]
    LengthMismatch,
    #[error("observations must be finite")]
    NonFinite,
    #[error("least-squares decomposition did not converge")]
    NoConvergence,
}

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.mean())
}

/// Sample variance (n − 1 denominator), or `None` if n < 2.
pub fn variance(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    Some(Statistics::variance(data))
}

/// Standard error of the mean; zero for a single observation.
pub fn std_error(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        1 => Some(0.0),
        n => variance(data).map(|v| (v / n as f64).sqrt()),
    }
}

/// Quantile with linear interpolation between order statistics (the
/// default method of most spreadsheet and plotting tools).
///
/// ```
/// use agristat::stats::quantile;
///
/// let d = [4.0, 1.0, 3.0, 2.0];
/// assert_eq!(quantile(&d, 0.5), Some(2.5));
/// assert_eq!(quantile(&d, 0.25), Some(1.75));
/// ```
pub fn quantile(data: &[f64], q: f64) -> Option<f64> {
    if data.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut order = Data::new(data.to_vec());
    let h = (data.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let a = order.order_statistic(lo + 1);
    let b = order.order_statistic(hi + 1);
    Some(a + (h - lo as f64) * (b - a))
}

/// 1-based ranks with ties assigned their average rank.
///
/// ```
/// use agristat::stats::average_ranks;
///
/// assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
/// ```
pub fn average_ranks(data: &[f64]) -> Vec<f64> {
    Data::new(data.to_vec()).ranks(RankTieBreaker::Average)
}

// ── Distribution tails ────────────────────────────────────────────────

/// Two-sided p-value of a Student t statistic.
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Upper-tail p-value of an F statistic.
pub fn f_upper_p(f: f64, df1: f64, df2: f64) -> f64 {
    if f.is_nan() || df1 <= 0.0 || df2 <= 0.0 {
        return f64::NAN;
    }
    if f.is_infinite() {
        return 0.0;
    }
    if f <= 0.0 {
        return 1.0;
    }
    match FisherSnedecor::new(df1, df2) {
        Ok(dist) => dist.sf(f).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}
