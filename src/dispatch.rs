//! Method selection and role binding.
//!
//! A caller names a [`MethodKind`] and binds each of its [`Role`]s to a
//! column. [`run_method`] validates the bindings once, applies listwise
//! deletion over the bound columns, and runs the matching routine.
//!
//! ```
//! use agristat::dataframe::build_table;
//! use agristat::dispatch::{run_method, MethodKind, Role, Roles};
//! use agristat::result::AnalysisResult;
//!
//! let headers = vec!["Variety".to_string(), "Yield".to_string()];
//! let grid: Vec<Vec<String>> = [("A", "1"), ("A", "2"), ("B", "10"), ("B", "11")]
//!     .iter()
//!     .map(|(v, y)| vec![v.to_string(), y.to_string()])
//!     .collect();
//! let table = build_table(&grid, &headers).unwrap();
//! let roles = Roles::new().bind(Role::Factor, "Variety").bind(Role::Value, "Yield");
//!
//! match run_method(MethodKind::OneWayAnova, &table, &roles).unwrap() {
//!     AnalysisResult::Anova(t) => assert!((t.rows[0].f.unwrap() - 162.0).abs() < 1e-9),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analysis::{correlation_pair, simple_ols};
use crate::anova::{effect_sizes, fit_anova, Factor};
use crate::dataframe::{Column, DataType, Table};
use crate::error::{AgriError, Result};
use crate::result::AnalysisResult;
use crate::stats::StatError;

// ── Roles ─────────────────────────────────────────────────────────────

/// The part a column plays in a method or chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Factor,
    Factor1,
    Factor2,
    Factor3,
    Value,
    ColumnA,
    ColumnB,
    X,
    Y,
    Category,
    Labels,
    Values,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factor => "factor",
            Self::Factor1 => "factor1",
            Self::Factor2 => "factor2",
            Self::Factor3 => "factor3",
            Self::Value => "value",
            Self::ColumnA => "column_a",
            Self::ColumnB => "column_b",
            Self::X => "x",
            Self::Y => "y",
            Self::Category => "category",
            Self::Labels => "labels",
            Self::Values => "values",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AgriError;

    fn from_str(s: &str) -> Result<Self> {
        const ALL: [Role; 12] = [
            Role::Factor,
            Role::Factor1,
            Role::Factor2,
            Role::Factor3,
            Role::Value,
            Role::ColumnA,
            Role::ColumnB,
            Role::X,
            Role::Y,
            Role::Category,
            Role::Labels,
            Role::Values,
        ];
        ALL.into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AgriError::MissingRole {
                role: s.to_string(),
                column: None,
            })
    }
}

/// Role → column-name bindings.
///
/// Deserializes from a JSON object such as
/// `{"factor": "Variety", "value": "Yield"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roles(BTreeMap<Role, String>);

impl Roles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `role` to `column`, replacing any earlier binding.
    pub fn bind(mut self, role: Role, column: impl Into<String>) -> Self {
        self.0.insert(role, column.into());
        self
    }

    pub fn get(&self, role: Role) -> Option<&str> {
        self.0.get(&role).map(String::as_str)
    }

    /// Parses bindings from JSON.
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| AgriError::Config(format!("invalid role bindings: {e}")))
    }
}

/// A role resolved against a table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bound<'t> {
    pub name: &'t str,
    pub column: &'t Column,
}

/// Looks up the column bound to `role`.
pub(crate) fn resolve<'t>(table: &'t Table, roles: &Roles, role: Role) -> Result<Bound<'t>> {
    let name = roles.get(role).ok_or_else(|| AgriError::MissingRole {
        role: role.to_string(),
        column: None,
    })?;
    let idx = table.column_index(name).ok_or_else(|| AgriError::MissingRole {
        role: role.to_string(),
        column: Some(name.to_string()),
    })?;
    let column = table.column(idx).ok_or_else(|| AgriError::MissingRole {
        role: role.to_string(),
        column: Some(name.to_string()),
    })?;
    Ok(Bound {
        name: &table.column_names()[idx],
        column,
    })
}

/// Like [`resolve`] but also requires a numeric column.
pub(crate) fn resolve_numeric<'t>(table: &'t Table, roles: &Roles, role: Role) -> Result<Bound<'t>> {
    let bound = resolve(table, roles, role)?;
    if bound.column.data_type() != DataType::Numeric {
        return Err(AgriError::ColumnType {
            column: bound.name.to_string(),
            expected: DataType::Numeric,
            found: bound.column.data_type(),
        });
    }
    Ok(bound)
}

/// Row indices where every bound column has a value.
pub(crate) fn complete_rows(table: &Table, bound: &[Bound<'_>]) -> Vec<usize> {
    (0..table.row_count())
        .filter(|&i| bound.iter().all(|b| b.column.is_valid(i)))
        .collect()
}

fn numbers(bound: &Bound<'_>, rows: &[usize]) -> Vec<f64> {
    rows.iter()
        .filter_map(|&i| bound.column.number_at(i))
        .collect()
}

fn factor(bound: &Bound<'_>, rows: &[usize]) -> Factor {
    Factor::new(
        bound.name,
        rows.iter().filter_map(|&i| bound.column.level_at(i)),
    )
}

// ── Methods ───────────────────────────────────────────────────────────

/// Statistical methods the dispatcher can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodKind {
    OneWayAnova,
    TwoWayAnova,
    ThreeWayAnova,
    Correlation,
    Regression,
    EffectSize,
}

impl MethodKind {
    pub const ALL: [MethodKind; 6] = [
        MethodKind::OneWayAnova,
        MethodKind::TwoWayAnova,
        MethodKind::ThreeWayAnova,
        MethodKind::Correlation,
        MethodKind::Regression,
        MethodKind::EffectSize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneWayAnova => "one-way-anova",
            Self::TwoWayAnova => "two-way-anova",
            Self::ThreeWayAnova => "three-way-anova",
            Self::Correlation => "correlation",
            Self::Regression => "regression",
            Self::EffectSize => "effect-size",
        }
    }

    /// Roles that must be bound.
    pub fn required_roles(&self) -> &'static [Role] {
        match self {
            Self::OneWayAnova => &[Role::Factor, Role::Value],
            Self::TwoWayAnova => &[Role::Factor1, Role::Factor2, Role::Value],
            Self::ThreeWayAnova => &[Role::Factor1, Role::Factor2, Role::Factor3, Role::Value],
            Self::Correlation => &[Role::ColumnA, Role::ColumnB],
            Self::Regression => &[Role::X, Role::Y],
            Self::EffectSize => &[Role::Factor, Role::Value],
        }
    }

    /// Roles that may be bound in addition to the required ones.
    pub fn optional_roles(&self) -> &'static [Role] {
        match self {
            Self::EffectSize => &[Role::Factor2, Role::Factor3],
            _ => &[],
        }
    }

    /// Roles whose column must be numeric.
    pub fn numeric_roles(&self) -> &'static [Role] {
        match self {
            Self::Correlation => &[Role::ColumnA, Role::ColumnB],
            Self::Regression => &[Role::X, Role::Y],
            _ => &[Role::Value],
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodKind {
    type Err = AgriError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AgriError::AnalysisFailed {
                kind: s.to_string(),
                cause: "unknown method".into(),
            })
    }
}

/// Runs `kind` on `table` with the given role bindings.
///
/// # Errors
///
/// - [`AgriError::MissingRole`] if a required role is unbound or names an absent column
/// - [`AgriError::ColumnType`] if a numeric role is bound to a text column
/// - [`AgriError::AnalysisFailed`] if the routine itself fails
pub fn run_method(kind: MethodKind, table: &Table, roles: &Roles) -> Result<AnalysisResult> {
    let numeric = kind.numeric_roles();
    let resolve_role = |role: Role| {
        if numeric.contains(&role) {
            resolve_numeric(table, roles, role)
        } else {
            resolve(table, roles, role)
        }
    };

    let mut bound = Vec::new();
    for &role in kind.required_roles() {
        bound.push((role, resolve_role(role)?));
    }
    for &role in kind.optional_roles() {
        if roles.get(role).is_some() {
            bound.push((role, resolve_role(role)?));
        }
    }

    let columns: Vec<Bound<'_>> = bound.iter().map(|(_, b)| *b).collect();
    let rows = complete_rows(table, &columns);
    tracing::debug!(
        kind = %kind,
        rows = rows.len(),
        dropped = table.row_count() - rows.len(),
        "running analysis"
    );

    let get = |role: Role| {
        bound
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, b)| *b)
            .ok_or_else(|| AgriError::MissingRole {
                role: role.to_string(),
                column: None,
            })
    };
    let failed = |e: StatError| AgriError::AnalysisFailed {
        kind: kind.to_string(),
        cause: e.to_string(),
    };

    let result = match kind {
        MethodKind::OneWayAnova
        | MethodKind::TwoWayAnova
        | MethodKind::ThreeWayAnova
        | MethodKind::EffectSize => {
            let factor_roles: &[Role] = match kind {
                MethodKind::OneWayAnova => &[Role::Factor],
                MethodKind::TwoWayAnova => &[Role::Factor1, Role::Factor2],
                MethodKind::ThreeWayAnova => &[Role::Factor1, Role::Factor2, Role::Factor3],
                _ => &[Role::Factor, Role::Factor2, Role::Factor3],
            };
            let value = get(Role::Value)?;
            let factors = factor_roles
                .iter()
                .filter(|r| bound.iter().any(|(b, _)| b == *r))
                .map(|&r| get(r).map(|b| factor(&b, &rows)))
                .collect::<Result<Vec<Factor>>>()?;
            let t = fit_anova(value.name, &numbers(&value, &rows), &factors).map_err(failed)?;
            if kind == MethodKind::EffectSize {
                AnalysisResult::EffectSize(effect_sizes(&t))
            } else {
                AnalysisResult::Anova(t)
            }
        }
        MethodKind::Correlation => {
            let (a, b) = (get(Role::ColumnA)?, get(Role::ColumnB)?);
            let pair = correlation_pair(a.name, b.name, &numbers(&a, &rows), &numbers(&b, &rows))
                .map_err(failed)?;
            AnalysisResult::Correlation(pair)
        }
        MethodKind::Regression => {
            let (x, y) = (get(Role::X)?, get(Role::Y)?);
            let fit = simple_ols(x.name, y.name, &numbers(&x, &rows), &numbers(&y, &rows))
                .map_err(failed)?;
            AnalysisResult::Regression(fit)
        }
    };

    tracing::info!(kind = %kind, n = rows.len(), "analysis complete");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataframe::build_table;
    use approx::assert_abs_diff_eq;

    fn trial() -> Table {
        let headers: Vec<String> = ["Variety", "Irrigation", "Block", "N", "Yield", "Height"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = [
            ["A", "dry", "1", "0", "4.1", "50"],
            ["A", "dry", "2", "40", "4.6", "53"],
            ["A", "wet", "1", "80", "5.3", "57"],
            ["A", "wet", "2", "120", "5.9", "60"],
            ["B", "dry", "1", "0", "5.0", "55"],
            ["B", "dry", "2", "40", "5.2", ""],
            ["B", "wet", "1", "80", "6.4", "64"],
            ["B", "wet", "2", "120", "7.1", "66"],
            ["C", "dry", "1", "0", "3.2", "47"],
            ["C", "dry", "2", "40", "3.9", "49"],
            ["C", "wet", "1", "80", "4.4", "52"],
            ["C", "wet", "2", "120", "", "55"],
        ];
        let grid: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect();
        build_table(&grid, &headers).unwrap()
    }

    fn simple() -> Table {
        let headers = vec!["Variety".to_string(), "Yield".to_string()];
        let grid: Vec<Vec<String>> = [("A", "1"), ("A", "2"), ("B", "10"), ("B", "11")]
            .iter()
            .map(|(v, y)| vec![v.to_string(), y.to_string()])
            .collect();
        build_table(&grid, &headers).unwrap()
    }

    #[test]
    fn one_way_reference() {
        let roles = Roles::new().bind(Role::Factor, "Variety").bind(Role::Value, "Yield");
        let r = run_method(MethodKind::OneWayAnova, &simple(), &roles).unwrap();
        let AnalysisResult::Anova(t) = r else {
            panic!("expected anova");
        };
        let row = t.term("Variety").unwrap();
        assert_abs_diff_eq!(row.f.unwrap(), 162.0, epsilon = 1e-9);
        assert_eq!((row.df, t.residual().df), (1, 2));
        assert_abs_diff_eq!(row.p_value.unwrap(), 0.006116, epsilon = 1e-6);
    }

    #[test]
    fn listwise_deletion_over_bound_roles() {
        let roles = Roles::new().bind(Role::Factor, "Variety").bind(Role::Value, "Yield");
        let AnalysisResult::Anova(t) = run_method(MethodKind::OneWayAnova, &trial(), &roles).unwrap()
        else {
            panic!("expected anova");
        };
        // One Yield cell is missing; the missing Height is not bound.
        assert_eq!(t.n, 11);
    }

    #[test]
    fn two_and_three_way() {
        let t = trial();
        let roles = Roles::new()
            .bind(Role::Factor1, "Variety")
            .bind(Role::Factor2, "Irrigation")
            .bind(Role::Value, "Yield");
        let AnalysisResult::Anova(two) = run_method(MethodKind::TwoWayAnova, &t, &roles).unwrap()
        else {
            panic!("expected anova");
        };
        let terms: Vec<&str> = two.rows.iter().map(|r| r.term.as_str()).collect();
        assert_eq!(terms, vec!["Variety", "Irrigation", "Variety:Irrigation", "Residual"]);

        let roles = roles.bind(Role::Factor3, "Block");
        let result = run_method(MethodKind::ThreeWayAnova, &t, &roles);
        // 12 cells with at most one observation each leave no residual df.
        let err = result.unwrap_err();
        assert!(matches!(err, AgriError::AnalysisFailed { ref kind, .. } if kind == "three-way-anova"));
    }

    #[test]
    fn numeric_column_can_be_a_factor() {
        let roles = Roles::new()
            .bind(Role::Factor1, "Block")
            .bind(Role::Factor2, "Variety")
            .bind(Role::Value, "Height");
        let r = run_method(MethodKind::TwoWayAnova, &trial(), &roles).unwrap();
        assert_eq!(r.title(), "Two-way ANOVA");
    }

    #[test]
    fn correlation_and_regression() {
        let t = trial();
        let roles = Roles::new().bind(Role::ColumnA, "N").bind(Role::ColumnB, "Yield");
        let AnalysisResult::Correlation(c) = run_method(MethodKind::Correlation, &t, &roles).unwrap()
        else {
            panic!("expected correlation");
        };
        assert_eq!(c.pearson.n, 11);
        assert!(c.pearson.r > 0.0);

        let roles = Roles::new().bind(Role::X, "Yield").bind(Role::Y, "Height");
        let AnalysisResult::Regression(fit) = run_method(MethodKind::Regression, &t, &roles).unwrap()
        else {
            panic!("expected regression");
        };
        assert_eq!(fit.n, 10);
        assert!(fit.slope.estimate > 0.0);
    }

    #[test]
    fn effect_size_with_optional_factor() {
        let t = trial();
        let roles = Roles::new().bind(Role::Factor, "Variety").bind(Role::Value, "Yield");
        let AnalysisResult::EffectSize(one) = run_method(MethodKind::EffectSize, &t, &roles).unwrap()
        else {
            panic!("expected effect sizes");
        };
        assert_eq!(one.rows.len(), 1);

        let roles = roles.bind(Role::Factor2, "Irrigation");
        let AnalysisResult::EffectSize(two) = run_method(MethodKind::EffectSize, &t, &roles).unwrap()
        else {
            panic!("expected effect sizes");
        };
        assert_eq!(two.rows.len(), 3);
        for row in &two.rows {
            assert!(row.partial_eta_sq >= row.eta_sq);
        }
    }

    #[test]
    fn missing_role_names_absent_column() {
        let roles = Roles::new().bind(Role::ColumnA, "N").bind(Role::ColumnB, "NotAColumn");
        let err = run_method(MethodKind::Correlation, &trial(), &roles).unwrap_err();
        assert_eq!(
            err,
            AgriError::MissingRole {
                role: "column_b".into(),
                column: Some("NotAColumn".into())
            }
        );
        assert!(err.to_string().contains("NotAColumn"));
    }

    #[test]
    fn unbound_role() {
        let roles = Roles::new().bind(Role::Factor, "Variety");
        let err = run_method(MethodKind::OneWayAnova, &trial(), &roles).unwrap_err();
        assert_eq!(
            err,
            AgriError::MissingRole {
                role: "value".into(),
                column: None
            }
        );
    }

    #[test]
    fn text_column_in_numeric_role() {
        let roles = Roles::new().bind(Role::X, "Variety").bind(Role::Y, "Yield");
        let err = run_method(MethodKind::Regression, &trial(), &roles).unwrap_err();
        assert!(matches!(err, AgriError::ColumnType { ref column, .. } if column == "Variety"));
    }

    #[test]
    fn routine_failure_is_wrapped() {
        let roles = Roles::new().bind(Role::Factor, "Irrigation").bind(Role::Value, "Yield");
        let headers = vec!["Irrigation".to_string(), "Yield".to_string()];
        let grid = vec![
            vec!["dry".to_string(), "1".to_string()],
            vec!["dry".to_string(), "2".to_string()],
        ];
        let t = build_table(&grid, &headers).unwrap();
        let err = run_method(MethodKind::OneWayAnova, &t, &roles).unwrap_err();
        match err {
            AgriError::AnalysisFailed { kind, cause } => {
                assert_eq!(kind, "one-way-anova");
                assert!(!cause.is_empty());
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn roles_from_json() {
        let roles = Roles::from_json(r#"{"factor1": "Variety", "column_a": "N"}"#).unwrap();
        assert_eq!(roles.get(Role::Factor1), Some("Variety"));
        assert_eq!(roles.get(Role::ColumnA), Some("N"));
        assert!(Roles::from_json(r#"{"bogus": "x"}"#).is_err());
    }

    #[test]
    fn method_kind_parsing() {
        for kind in MethodKind::ALL {
            assert_eq!(kind.as_str().parse::<MethodKind>().unwrap(), kind);
        }
        assert!("four-way-anova".parse::<MethodKind>().is_err());
        assert_eq!("column_b".parse::<Role>().unwrap(), Role::ColumnB);
    }
}
