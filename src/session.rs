//! Pipeline stages as explicit values.
//!
//! ```text
//! Session ─load─▶ DataLoaded ─check_normality─▶ NormalityChecked ─run─▶ AnalysisRun
//!                                    └──────▶ Halted
//! AnalysisRun ─render_charts─▶ ChartsRendered ─export─▶ Exported
//!                              ChartsRendered ─rerun─▶ AnalysisRun
//! ```
//!
//! Every transition consumes the current stage, so an earlier stage can
//! never be reached from a later value. A transition that fails hands the
//! unchanged stage back inside [`StageError`]. `rerun` starts a new
//! analysis on the same checked data and discards the previous result and
//! its charts. Dropping a stage abandons the pipeline; files already
//! written stay on disk.
//!
//! ```no_run
//! use agristat::dispatch::{MethodKind, Role, Roles};
//! use agristat::session::{GateOutcome, Session};
//!
//! # fn main() -> agristat::Result<()> {
//! let loaded = Session::default().load_csv("trial.csv")?;
//! let checked = match loaded.check_normality(&["Yield"])? {
//!     GateOutcome::Proceed(c) => c,
//!     GateOutcome::Halted(h) => panic!("{}", h.recommendation()),
//! };
//! let roles = Roles::new()
//!     .bind(Role::Value, "Yield")
//!     .bind(Role::Factor, "Variety");
//! let run = checked.run(MethodKind::OneWayAnova, &roles)?;
//! let charts = run.render_charts(&[])?;
//! charts.export("trial.docx", "Variety trial")?;
//! # Ok(())
//! # }
//! ```
//!
//! A stage cannot be used twice:
//!
//! ```compile_fail
//! use agristat::session::Session;
//!
//! let loaded = Session::default().load_csv_str("x\n1\n2\n3\n4\n").unwrap();
//! let _first = loaded.check_normality(&[]);
//! let _again = loaded.check_normality(&[]);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use crate::chart::{render_chart_with, ChartArtifact, ChartKind};
use crate::config::PipelineConfig;
use crate::csv_parser::CsvParser;
use crate::dataframe::{build_table, Table};
use crate::dispatch::{run_method, MethodKind, Roles};
use crate::error::{AgriError, Result};
use crate::normality::{normality_report, NormalityReport};
use crate::report::export_report_with;
use crate::result::AnalysisResult;

// ── Failed transitions ────────────────────────────────────────────────

/// A transition that did not happen: the error plus the stage it was
/// attempted from, unchanged.
#[derive(Debug)]
pub struct StageError<S> {
    pub error: AgriError,
    pub stage: S,
}

impl<S> StageError<S> {
    fn new(error: AgriError, stage: S) -> Self {
        Self { error, stage }
    }

    /// Gives back the stage so the caller can try again.
    pub fn into_stage(self) -> S {
        self.stage
    }
}

impl<S> fmt::Display for StageError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<S: fmt::Debug> std::error::Error for StageError<S> {}

impl<S> From<StageError<S>> for AgriError {
    fn from(e: StageError<S>) -> Self {
        e.error
    }
}

/// Result of a stage transition from `S`.
pub type Transition<T, S> = std::result::Result<T, StageError<S>>;

// ── Idle ──────────────────────────────────────────────────────────────

/// Entry stage; holds the configuration for the whole pipeline.
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: PipelineConfig,
}

impl Session {
    /// Creates a session after validating `config`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Loads a manually entered grid.
    pub fn load_grid<S: AsRef<str>>(self, grid: &[Vec<S>], headers: &[S]) -> Result<DataLoaded> {
        let table = build_table(grid, headers)?;
        Ok(self.loaded(table))
    }

    /// Loads CSV text.
    pub fn load_csv_str(self, input: &str) -> Result<DataLoaded> {
        let table = self.csv_parser().parse_str(input)?;
        Ok(self.loaded(table))
    }

    /// Loads a CSV file.
    pub fn load_csv(self, path: impl AsRef<Path>) -> Result<DataLoaded> {
        let table = self.csv_parser().parse_file(path)?;
        Ok(self.loaded(table))
    }

    /// Wraps an already built table.
    pub fn load_table(self, table: Table) -> DataLoaded {
        self.loaded(table)
    }

    fn csv_parser(&self) -> CsvParser {
        // `validate` guarantees an ASCII delimiter.
        CsvParser::new().delimiter(self.config.csv.delimiter as u8)
    }

    fn loaded(self, table: Table) -> DataLoaded {
        tracing::info!(
            rows = table.row_count(),
            columns = table.column_count(),
            "data loaded"
        );
        DataLoaded {
            config: self.config,
            table,
        }
    }
}

// ── DataLoaded ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DataLoaded {
    config: PipelineConfig,
    table: Table,
}

/// Result of the normality gate.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    Proceed(NormalityChecked),
    Halted(Halted),
}

impl GateOutcome {
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted(_))
    }

    /// The Shapiro-Wilk report behind either outcome.
    pub fn report(&self) -> &NormalityReport {
        match self {
            Self::Proceed(c) => &c.report,
            Self::Halted(h) => &h.report,
        }
    }
}

impl DataLoaded {
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Runs Shapiro-Wilk on `columns` (every numeric column when empty).
    ///
    /// Any column rejecting normality halts the pipeline; that is an
    /// outcome, not an error.
    ///
    /// # Errors
    ///
    /// Whatever [`normality_report`] returns for unknown, text or too short
    /// columns.
    pub fn check_normality(self, columns: &[&str]) -> Transition<GateOutcome, DataLoaded> {
        let report = match normality_report(&self.table, columns, &self.config.normality) {
            Ok(report) => report,
            Err(e) => return Err(StageError::new(e, self)),
        };
        if let Some(recommendation) = report.recommendation() {
            tracing::warn!(
                rejected = ?report.rejected(),
                alpha = report.alpha,
                "normality gate halted the pipeline"
            );
            return Ok(GateOutcome::Halted(Halted {
                report,
                recommendation,
            }));
        }
        tracing::info!(columns = report.columns.len(), "normality gate passed");
        Ok(GateOutcome::Proceed(NormalityChecked {
            config: self.config,
            table: self.table,
            report,
        }))
    }
}

// ── Halted ────────────────────────────────────────────────────────────

/// Terminal stage when the data fail the normality gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Halted {
    report: NormalityReport,
    recommendation: String,
}

impl Halted {
    pub fn report(&self) -> &NormalityReport {
        &self.report
    }

    /// Suggested non-parametric alternative or transformation.
    pub fn recommendation(&self) -> &str {
        &self.recommendation
    }
}

// ── NormalityChecked ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NormalityChecked {
    config: PipelineConfig,
    table: Table,
    report: NormalityReport,
}

impl NormalityChecked {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn report(&self) -> &NormalityReport {
        &self.report
    }

    /// Runs `kind` with the given role bindings.
    pub fn run(self, kind: MethodKind, roles: &Roles) -> Transition<AnalysisRun, NormalityChecked> {
        match run_method(kind, &self.table, roles) {
            Ok(result) => Ok(AnalysisRun {
                checked: self,
                kind,
                result,
            }),
            Err(e) => Err(StageError::new(e, self)),
        }
    }
}

// ── AnalysisRun ───────────────────────────────────────────────────────

/// One chart to draw: kind, role bindings and output file.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRequest {
    pub kind: ChartKind,
    pub roles: Roles,
    pub path: PathBuf,
}

impl ChartRequest {
    pub fn new(kind: ChartKind, roles: Roles, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            roles,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRun {
    checked: NormalityChecked,
    kind: MethodKind,
    result: AnalysisResult,
}

impl AnalysisRun {
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn result(&self) -> &AnalysisResult {
        &self.result
    }

    pub fn table(&self) -> &Table {
        &self.checked.table
    }

    /// Renders every request in order. An empty slice is allowed.
    ///
    /// On failure the run comes back without any of the charts from this
    /// call; files already written stay on disk.
    pub fn render_charts(self, requests: &[ChartRequest]) -> Transition<ChartsRendered, AnalysisRun> {
        let mut stage = ChartsRendered::from(self);
        for request in requests {
            stage = match stage.with_chart(request) {
                Ok(next) => next,
                Err(StageError { error, stage }) => {
                    return Err(StageError::new(error, stage.into_run()));
                }
            };
        }
        Ok(stage)
    }
}

// ── ChartsRendered ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChartsRendered {
    run: AnalysisRun,
    charts: Vec<ChartArtifact>,
}

/// A run with no charts yet.
impl From<AnalysisRun> for ChartsRendered {
    fn from(run: AnalysisRun) -> Self {
        Self {
            run,
            charts: Vec::new(),
        }
    }
}

impl ChartsRendered {
    pub fn charts(&self) -> &[ChartArtifact] {
        &self.charts
    }

    pub fn result(&self) -> &AnalysisResult {
        &self.run.result
    }

    pub fn table(&self) -> &Table {
        self.run.table()
    }

    fn into_run(self) -> AnalysisRun {
        self.run
    }

    /// Appends one more chart.
    pub fn with_chart(mut self, request: &ChartRequest) -> Transition<ChartsRendered, ChartsRendered> {
        let checked = &self.run.checked;
        match render_chart_with(
            request.kind,
            &checked.table,
            &request.roles,
            &request.path,
            &checked.config.chart,
        ) {
            Ok(artifact) => {
                self.charts.push(artifact);
                Ok(self)
            }
            Err(e) => Err(StageError::new(e, self)),
        }
    }

    /// Runs another method on the same checked data, discarding the
    /// current result and its charts.
    pub fn rerun(self, kind: MethodKind, roles: &Roles) -> Transition<AnalysisRun, ChartsRendered> {
        match run_method(kind, self.table(), roles) {
            Ok(result) => {
                tracing::debug!(previous = ?self.run.kind, ?kind, dropped_charts = self.charts.len(), "analysis replaced");
                Ok(AnalysisRun {
                    checked: self.run.checked,
                    kind,
                    result,
                })
            }
            Err(e) => Err(StageError::new(e, self)),
        }
    }

    /// Writes the `.docx` report with every rendered chart.
    pub fn export(self, path: impl AsRef<Path>, title: &str) -> Transition<Exported, ChartsRendered> {
        let path = path.as_ref();
        let checked = &self.run.checked;
        if let Err(e) = export_report_with(
            path,
            title,
            &checked.table,
            &self.run.result,
            &self.charts,
            &checked.config.report,
            checked.config.chart.dpi,
        ) {
            return Err(StageError::new(e, self));
        }
        Ok(Exported {
            path: path.to_path_buf(),
            chart_count: self.charts.len(),
        })
    }
}

// ── Exported ──────────────────────────────────────────────────────────

/// Terminal stage after a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    pub path: PathBuf,
    pub chart_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalityConfig;
    use crate::dispatch::Role;

    const TRIAL: &str = "Variety,Yield\n\
        A,4.1\nA,4.5\nA,4.3\nA,4.8\nA,4.4\n\
        B,5.2\nB,5.6\nB,5.1\nB,5.9\nB,5.5\n";

    fn proceed(loaded: DataLoaded) -> NormalityChecked {
        match loaded.check_normality(&[]).unwrap() {
            GateOutcome::Proceed(c) => c,
            GateOutcome::Halted(h) => panic!("unexpected halt: {}", h.recommendation()),
        }
    }

    fn roles() -> Roles {
        Roles::new()
            .bind(Role::Value, "Yield")
            .bind(Role::Factor, "Variety")
    }

    fn charted() -> ChartsRendered {
        let loaded = Session::default().load_csv_str(TRIAL).unwrap();
        proceed(loaded)
            .run(MethodKind::OneWayAnova, &roles())
            .unwrap()
            .render_charts(&[])
            .unwrap()
    }

    #[test]
    fn full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Session::default().load_csv_str(TRIAL).unwrap();
        assert_eq!(loaded.table().row_count(), 10);

        let run = proceed(loaded).run(MethodKind::OneWayAnova, &roles()).unwrap();
        assert!(matches!(run.result(), AnalysisResult::Anova(_)));

        let chart_roles = Roles::new()
            .bind(Role::Category, "Variety")
            .bind(Role::Value, "Yield");
        let charts = run
            .render_charts(&[
                ChartRequest::new(ChartKind::Bar, chart_roles.clone(), dir.path().join("bar.png")),
                ChartRequest::new(ChartKind::Box, chart_roles, dir.path().join("box.svg")),
            ])
            .unwrap();
        assert_eq!(charts.charts().len(), 2);

        let out = dir.path().join("trial.docx");
        let exported = charts.export(&out, "Variety trial").unwrap();
        assert_eq!(exported.chart_count, 2);
        assert!(out.exists());
    }

    #[test]
    fn skewed_data_halts() {
        let grid = vec![
            vec!["1"],
            vec!["1"],
            vec!["1"],
            vec!["1"],
            vec!["1"],
            vec!["1"],
            vec!["2"],
            vec!["50"],
        ];
        let headers = ["Count"];
        let loaded = Session::default().load_grid(&grid[..], &headers[..]).unwrap();
        let outcome = loaded.check_normality(&["Count"]).unwrap();
        assert!(outcome.is_halted());
        let GateOutcome::Halted(h) = outcome else {
            unreachable!()
        };
        assert_eq!(h.report().rejected(), vec!["Count"]);
        assert!(h.recommendation().contains("Kruskal-Wallis"));
    }

    #[test]
    fn too_few_rows_is_error() {
        let loaded = Session::default()
            .load_csv_str("Yield\n1.0\n2.0\n3.0\n")
            .unwrap();
        let err = loaded.check_normality(&[]).unwrap_err();
        assert!(matches!(err.error, AgriError::InsufficientData { .. }));
        assert_eq!(err.into_stage().table().row_count(), 3);
    }

    #[test]
    fn configured_min_sample() {
        let config = PipelineConfig {
            normality: NormalityConfig {
                min_sample: 3,
                ..NormalityConfig::default()
            },
            ..PipelineConfig::default()
        };
        let loaded = Session::new(config)
            .unwrap()
            .load_csv_str("Yield\n1.0\n2.0\n3.1\n")
            .unwrap();
        assert!(!loaded.check_normality(&[]).unwrap().is_halted());
    }

    #[test]
    fn invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.normality.alpha = 1.5;
        assert!(matches!(Session::new(config), Err(AgriError::Config(_))));
    }

    #[test]
    fn failed_chart_returns_previous_stage() {
        let dir = tempfile::tempdir().unwrap();
        let bar = ChartRequest::new(
            ChartKind::Bar,
            Roles::new().bind(Role::Category, "Variety").bind(Role::Value, "Yield"),
            dir.path().join("bar.svg"),
        );
        let charts = charted().with_chart(&bar).unwrap();
        let bad = ChartRequest::new(
            ChartKind::Pie,
            Roles::new().bind(Role::Labels, "Variety").bind(Role::Values, "Nope"),
            dir.path().join("pie.png"),
        );
        let err = charts.with_chart(&bad).unwrap_err();
        assert!(matches!(err.error, AgriError::MissingRole { .. }));
        let charts = err.into_stage();
        assert_eq!(charts.charts().len(), 1);
        assert_eq!(charts.with_chart(&bar).unwrap().charts().len(), 2);
    }

    #[test]
    fn failed_batch_drops_partial_charts() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Session::default().load_csv_str(TRIAL).unwrap();
        let run = proceed(loaded).run(MethodKind::OneWayAnova, &roles()).unwrap();
        let err = run
            .render_charts(&[
                ChartRequest::new(
                    ChartKind::Bar,
                    Roles::new().bind(Role::Category, "Variety").bind(Role::Value, "Yield"),
                    dir.path().join("bar.svg"),
                ),
                ChartRequest::new(ChartKind::Bar, Roles::new(), dir.path().join("missing.svg")),
            ])
            .unwrap_err();
        assert!(matches!(err.error, AgriError::MissingRole { .. }));
        let charts = err.into_stage().render_charts(&[]).unwrap();
        assert!(charts.charts().is_empty());
    }

    #[test]
    fn failed_run_returns_checked_stage() {
        let loaded = Session::default().load_csv_str(TRIAL).unwrap();
        let bad = Roles::new().bind(Role::Factor, "Variety");
        let err = proceed(loaded).run(MethodKind::OneWayAnova, &bad).unwrap_err();
        assert!(matches!(err.error, AgriError::MissingRole { .. }));
        let run = err.into_stage().run(MethodKind::OneWayAnova, &roles()).unwrap();
        assert_eq!(run.kind(), MethodKind::OneWayAnova);
    }

    #[test]
    fn rerun_discards_result_and_charts() {
        let dir = tempfile::tempdir().unwrap();
        let bar = ChartRequest::new(
            ChartKind::Bar,
            Roles::new().bind(Role::Category, "Variety").bind(Role::Value, "Yield"),
            dir.path().join("bar.svg"),
        );
        let charts = charted().with_chart(&bar).unwrap();
        assert_eq!(charts.charts().len(), 1);

        let run = charts.rerun(MethodKind::EffectSize, &roles()).unwrap();
        assert_eq!(run.kind(), MethodKind::EffectSize);
        assert!(matches!(run.result(), AnalysisResult::EffectSize(_)));
        assert!(run.render_charts(&[]).unwrap().charts().is_empty());
    }

    #[test]
    fn stages_only_move_forward() {
        // Each transition takes the stage by value; the compiler rejects
        // reuse, so the only way forward is the next stage's own methods.
        let dir = tempfile::tempdir().unwrap();
        let loaded = Session::default().load_csv_str(TRIAL).unwrap();
        let outcome = loaded.check_normality(&[]).unwrap();
        let GateOutcome::Proceed(checked) = outcome else {
            panic!("unexpected halt");
        };
        let run = checked.run(MethodKind::OneWayAnova, &roles()).unwrap();
        let charts = run.render_charts(&[]).unwrap();
        let out = dir.path().join("once.docx");
        let exported = charts.export(&out, "Once").unwrap();
        assert_eq!(exported.path, out);
        assert_eq!(exported.chart_count, 0);
    }

    #[test]
    fn empty_title_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = charted().export(dir.path().join("r.docx"), "  ").unwrap_err();
        assert!(matches!(err.error, AgriError::Export(_)));
        assert!(!dir.path().join("r.docx").exists());
        let exported = err.into_stage().export(dir.path().join("r.docx"), "Titled").unwrap();
        assert!(exported.path.exists());
    }

    #[test]
    fn stage_error_converts_to_agri_error() {
        fn gate(loaded: DataLoaded) -> Result<bool> {
            Ok(loaded.check_normality(&["Nope"])?.is_halted())
        }
        let loaded = Session::default().load_csv_str(TRIAL).unwrap();
        assert!(matches!(gate(loaded), Err(AgriError::MissingRole { .. })));
    }
}
