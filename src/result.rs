//! Analysis results and their text/tabular renderings.

use std::fmt;

use serde::Serialize;

use crate::analysis::{CorrelationPair, RegressionSummary};
use crate::anova::{AnovaTable, EffectSizeTable};
use crate::error::{AgriError, Result};
use crate::normality::NormalityReport;

/// Output of any pipeline analysis step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisResult {
    Normality(NormalityReport),
    Anova(AnovaTable),
    Correlation(CorrelationPair),
    Regression(RegressionSummary),
    EffectSize(EffectSizeTable),
}

/// A header row plus data rows, all as display strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Grid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Grid {
    fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| (*h).to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

impl AnalysisResult {
    /// Short heading for the result.
    pub fn title(&self) -> String {
        match self {
            Self::Normality(_) => "Shapiro-Wilk normality test".into(),
            Self::Anova(t) => match t.factors.len() {
                1 => "One-way ANOVA".into(),
                2 => "Two-way ANOVA".into(),
                3 => "Three-way ANOVA".into(),
                k => format!("{k}-way ANOVA"),
            },
            Self::Correlation(_) => "Correlation analysis".into(),
            Self::Regression(_) => "Simple linear regression".into(),
            Self::EffectSize(_) => "Effect sizes".into(),
        }
    }

    /// Human-readable summary, one paragraph per element.
    pub fn render_text(&self) -> Vec<String> {
        let mut lines = vec![self.title()];
        match self {
            Self::Normality(r) => {
                for c in &r.columns {
                    lines.push(format!(
                        "{}: n = {}, W = {}, p = {} ({})",
                        c.column,
                        c.n,
                        fmt_stat(c.w),
                        fmt_p(c.p_value),
                        if c.normal { "normal" } else { "not normal" }
                    ));
                }
                match r.recommendation() {
                    Some(advice) => lines.push(advice),
                    None => lines.push(format!(
                        "All columns are consistent with normality at alpha = {}.",
                        r.alpha
                    )),
                }
            }
            Self::Anova(t) => {
                lines.push(format!(
                    "Response: {}; factors: {}; n = {}.",
                    t.response,
                    t.factors.join(", "),
                    t.n
                ));
                let resid = t.residual();
                for row in t.effects() {
                    if let (Some(f), Some(p)) = (row.f, row.p_value) {
                        lines.push(format!(
                            "{}: F({}, {}) = {}, p = {}",
                            row.term,
                            row.df,
                            resid.df,
                            fmt_stat(f),
                            fmt_p(p)
                        ));
                    }
                }
            }
            Self::Correlation(c) => {
                lines.push(format!(
                    "{} vs {}: Pearson r = {}, p = {}; Spearman rho = {}, p = {} (n = {}).",
                    c.col_a,
                    c.col_b,
                    fmt_stat(c.pearson.r),
                    fmt_p(c.pearson.p_value),
                    fmt_stat(c.spearman.r),
                    fmt_p(c.spearman.p_value),
                    c.pearson.n
                ));
            }
            Self::Regression(r) => {
                lines.push(format!(
                    "{} = {} + {} * {} (n = {})",
                    r.y_name,
                    fmt_stat(r.intercept.estimate),
                    fmt_stat(r.slope.estimate),
                    r.x_name,
                    r.n
                ));
                lines.push(format!(
                    "R² = {}, adjusted R² = {}, F(1, {}) = {}, p = {}",
                    fmt_stat(r.r_squared),
                    fmt_stat(r.adj_r_squared),
                    r.n - 2,
                    fmt_stat(r.f_statistic),
                    fmt_p(r.f_p_value)
                ));
            }
            Self::EffectSize(e) => {
                lines.push(format!("Response: {}.", e.response));
                for row in &e.rows {
                    lines.push(format!(
                        "{}: eta² = {}, partial eta² = {}, omega² = {}",
                        row.term,
                        fmt_stat(row.eta_sq),
                        fmt_stat(row.partial_eta_sq),
                        fmt_stat(row.omega_sq)
                    ));
                }
            }
        }
        lines
    }

    /// Tabular rendering for reports.
    pub fn to_grid(&self) -> Grid {
        match self {
            Self::Normality(r) => {
                let mut g = Grid::new(&["Column", "n", "W", "p-value", "Normal"]);
                for c in &r.columns {
                    g.push(vec![
                        c.column.clone(),
                        c.n.to_string(),
                        fmt_stat(c.w),
                        fmt_p(c.p_value),
                        if c.normal { "yes" } else { "no" }.to_string(),
                    ]);
                }
                g
            }
            Self::Anova(t) => {
                let mut g = Grid::new(&["Term", "Sum Sq", "df", "Mean Sq", "F", "p-value"]);
                for row in &t.rows {
                    g.push(vec![
                        row.term.clone(),
                        fmt_stat(row.sum_sq),
                        row.df.to_string(),
                        fmt_stat(row.mean_sq),
                        row.f.map(fmt_stat).unwrap_or_default(),
                        row.p_value.map(fmt_p).unwrap_or_default(),
                    ]);
                }
                g
            }
            Self::Correlation(c) => {
                let mut g = Grid::new(&["Method", "Coefficient", "p-value", "n"]);
                for (name, stat) in [("Pearson", &c.pearson), ("Spearman", &c.spearman)] {
                    g.push(vec![
                        name.to_string(),
                        fmt_stat(stat.r),
                        fmt_p(stat.p_value),
                        stat.n.to_string(),
                    ]);
                }
                g
            }
            Self::Regression(r) => {
                let mut g = Grid::new(&["Coefficient", "Estimate", "Std. Error", "t", "p-value"]);
                for (name, c) in [("Intercept", &r.intercept), (r.x_name.as_str(), &r.slope)] {
                    g.push(vec![
                        name.to_string(),
                        fmt_stat(c.estimate),
                        fmt_stat(c.std_error),
                        fmt_stat(c.t),
                        fmt_p(c.p_value),
                    ]);
                }
                g
            }
            Self::EffectSize(e) => {
                let mut g = Grid::new(&["Term", "eta²", "partial eta²", "omega²"]);
                for row in &e.rows {
                    g.push(vec![
                        row.term.clone(),
                        fmt_stat(row.eta_sq),
                        fmt_stat(row.partial_eta_sq),
                        fmt_stat(row.omega_sq),
                    ]);
                }
                g
            }
        }
    }

    /// Serializes the result as JSON, tagged with `"type"`.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AgriError::Export(e.to_string()))
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_text().join("\n"))
    }
}

/// Four decimals; infinities spelled out.
pub fn fmt_stat(v: f64) -> String {
    if v.is_infinite() {
        let s = if v > 0.0 { "inf" } else { "-inf" };
        s.to_string()
    } else {
        format!("{v:.4}")
    }
}

/// Four decimals, with `< 0.0001` for tiny values.
pub fn fmt_p(p: f64) -> String {
    if p < 1e-4 {
        "< 0.0001".to_string()
    } else {
        format!("{p:.4}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{correlation_pair, simple_ols};
    use crate::anova::{effect_sizes, fit_anova, Factor};
    use crate::normality::ColumnNormality;

    fn one_way() -> AnovaTable {
        fit_anova(
            "Yield",
            &[1.0, 2.0, 10.0, 11.0],
            &[Factor::new("Variety", ["A", "A", "B", "B"])],
        )
        .unwrap()
    }

    #[test]
    fn anova_text_and_grid() {
        let r = AnalysisResult::Anova(one_way());
        assert_eq!(r.title(), "One-way ANOVA");
        let text = r.render_text();
        assert!(text.iter().any(|l| l.contains("F(1, 2) = 162.0000")), "{text:?}");
        let g = r.to_grid();
        assert_eq!(g.headers[0], "Term");
        assert_eq!(g.rows.len(), 2);
        assert_eq!(g.rows[0][0], "Variety");
        assert_eq!(g.rows[1][0], "Residual");
        assert_eq!(g.rows[1][4], "");
    }

    #[test]
    fn json_is_tagged() {
        let r = AnalysisResult::EffectSize(effect_sizes(&one_way()));
        let json: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "effect_size");
        assert_eq!(json["rows"][0]["term"], "Variety");
    }

    #[test]
    fn correlation_grid_has_both_methods() {
        let pair = correlation_pair("x", "y", &[1.0, 2.0, 3.0, 4.0], &[2.0, 1.0, 4.0, 3.0]).unwrap();
        let g = AnalysisResult::Correlation(pair).to_grid();
        assert_eq!(g.rows[0][0], "Pearson");
        assert_eq!(g.rows[1][0], "Spearman");
        assert_eq!(g.rows[0][3], "4");
    }

    #[test]
    fn regression_grid_names_predictor() {
        let fit = simple_ols("Dose", "Yield", &[1.0, 2.0, 3.0, 4.0], &[2.0, 4.1, 5.9, 8.2]).unwrap();
        let r = AnalysisResult::Regression(fit);
        let g = r.to_grid();
        assert_eq!(g.rows[1][0], "Dose");
        assert!(r.to_string().contains("Yield = "));
    }

    #[test]
    fn normality_text_mentions_verdicts() {
        let report = NormalityReport {
            alpha: 0.05,
            columns: vec![ColumnNormality {
                column: "Yield".into(),
                n: 8,
                w: 0.7,
                p_value: 0.002,
                normal: false,
            }],
        };
        let r = AnalysisResult::Normality(report);
        let text = r.to_string();
        assert!(text.contains("not normal"));
        assert!(text.contains("Kruskal-Wallis"));
        assert_eq!(r.to_grid().rows[0][4], "no");
    }

    #[test]
    fn p_value_formatting() {
        assert_eq!(fmt_p(0.00001), "< 0.0001");
        assert_eq!(fmt_p(0.0061163), "0.0061");
        assert_eq!(fmt_stat(f64::INFINITY), "inf");
        assert_eq!(fmt_stat(1.0 / 3.0), "0.3333");
    }
}
