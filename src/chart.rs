//! Bar, box and pie charts rendered to SVG or PNG.
//!
//! The output format follows the file extension of the target path:
//! `.svg` writes the SVG document, `.png` rasterizes it at the configured
//! DPI. Existing files are overwritten.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ChartConfig;
use crate::dataframe::Table;
use crate::dispatch::{complete_rows, resolve, resolve_numeric, Roles, Role};
use crate::error::{AgriError, Result};
use crate::stats::{mean, quantile, std_error};
use crate::svg::{svg_to_png, Anchor, Canvas, Style};

const MARGIN_LEFT: f64 = 56.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 32.0;
const MARGIN_BOTTOM: f64 = 40.0;
const AXIS_COLOR: &str = "#333333";
const GRID_COLOR: &str = "#e5e5e5";

// ── Kinds and artifacts ───────────────────────────────────────────────

/// Supported chart types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Mean per category with ±1 standard-error whiskers.
    Bar,
    /// Quartiles per category with 1.5·IQR whiskers and outliers.
    Box,
    /// Share of the summed values per label.
    Pie,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Box => "box",
            Self::Pie => "pie",
        }
    }

    /// Roles that must be bound, category role first.
    pub fn required_roles(&self) -> [Role; 2] {
        match self {
            Self::Bar | Self::Box => [Role::Category, Role::Value],
            Self::Pie => [Role::Labels, Role::Values],
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = AgriError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bar" => Ok(Self::Bar),
            "box" => Ok(Self::Box),
            "pie" => Ok(Self::Pie),
            other => Err(AgriError::ChartRender(format!("unknown chart kind '{other}'"))),
        }
    }
}

/// A chart written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartArtifact {
    pub path: PathBuf,
    pub kind: ChartKind,
    /// Columns visualized: category/labels first, then values.
    pub columns: Vec<String>,
}

impl AsRef<Path> for ChartArtifact {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Svg,
    Png,
}

fn output_format(path: &Path) -> Result<Format> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("svg") => Ok(Format::Svg),
        Some("png") => Ok(Format::Png),
        _ => Err(AgriError::ChartRender(format!(
            "unsupported chart file extension: {}",
            path.display()
        ))),
    }
}

// ── Entry points ──────────────────────────────────────────────────────

/// Renders a chart with the default [`ChartConfig`].
pub fn render_chart(
    kind: ChartKind,
    table: &Table,
    roles: &Roles,
    path: impl AsRef<Path>,
) -> Result<ChartArtifact> {
    render_chart_with(kind, table, roles, path, &ChartConfig::default())
}

/// Renders a chart of `kind` from the bound columns and writes it to `path`.
///
/// # Errors
///
/// - [`AgriError::MissingRole`] / [`AgriError::ColumnType`] for bad role bindings
/// - [`AgriError::ChartRender`] for an unsupported extension, no complete
///   rows, negative pie values, or a failed write
pub fn render_chart_with(
    kind: ChartKind,
    table: &Table,
    roles: &Roles,
    path: impl AsRef<Path>,
    config: &ChartConfig,
) -> Result<ChartArtifact> {
    let path = path.as_ref();
    let format = output_format(path)?;

    let [cat_role, val_role] = kind.required_roles();
    let cat = resolve(table, roles, cat_role)?;
    let val = resolve_numeric(table, roles, val_role)?;
    let rows = complete_rows(table, &[cat, val]);
    if rows.is_empty() {
        return Err(AgriError::ChartRender(format!(
            "no complete rows for '{}' and '{}'",
            cat.name, val.name
        )));
    }

    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    for &i in &rows {
        let (Some(label), Some(v)) = (cat.column.level_at(i), val.column.number_at(i)) else {
            continue;
        };
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, vs)) => vs.push(v),
            None => groups.push((label, vec![v])),
        }
    }

    let title = config.title.clone().unwrap_or_else(|| match kind {
        ChartKind::Bar => format!("Mean {} by {}", val.name, cat.name),
        ChartKind::Box => format!("{} by {}", val.name, cat.name),
        ChartKind::Pie => format!("{} by {}", val.name, cat.name),
    });

    let svg = match kind {
        ChartKind::Bar => bar_svg(&groups, &title, val.name, config),
        ChartKind::Box => box_svg(&groups, &title, val.name, config),
        ChartKind::Pie => pie_svg(&groups, &title, config)?,
    };

    let bytes = match format {
        Format::Svg => svg.into_bytes(),
        Format::Png => svg_to_png(&svg, config.dpi)?,
    };
    std::fs::write(path, &bytes)
        .map_err(|e| AgriError::ChartRender(format!("cannot write {}: {e}", path.display())))?;

    tracing::info!(kind = %kind, path = %path.display(), groups = groups.len(), "chart rendered");
    Ok(ChartArtifact {
        path: path.to_path_buf(),
        kind,
        columns: vec![cat.name.to_string(), val.name.to_string()],
    })
}

// ── Layout helpers ────────────────────────────────────────────────────

struct Plot {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    lo: f64,
    hi: f64,
}

impl Plot {
    fn new(config: &ChartConfig, lo: f64, hi: f64) -> Self {
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: (config.width - MARGIN_LEFT - MARGIN_RIGHT).max(1.0),
            height: (config.height - MARGIN_TOP - MARGIN_BOTTOM).max(1.0),
            lo,
            hi,
        }
    }

    fn y(&self, v: f64) -> f64 {
        self.top + (1.0 - (v - self.lo) / (self.hi - self.lo)) * self.height
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn slot(&self, n: usize) -> f64 {
        self.width / n.max(1) as f64
    }

    fn center(&self, i: usize, n: usize) -> f64 {
        self.left + (i as f64 + 0.5) * self.slot(n)
    }

    /// Draws horizontal grid lines, tick labels, axes and category labels.
    fn frame(&self, canvas: &mut Canvas, ticks: &[f64], labels: &[&str], y_label: &str) {
        for &t in ticks {
            let y = self.y(t);
            canvas.line(self.left, y, self.left + self.width, y, GRID_COLOR, 0.5);
            canvas.text(self.left - 4.0, y + 3.0, &tick_label(t), 8.0, Anchor::End);
        }
        canvas.line(self.left, self.top, self.left, self.bottom(), AXIS_COLOR, 1.0);
        canvas.line(self.left, self.bottom(), self.left + self.width, self.bottom(), AXIS_COLOR, 1.0);
        for (i, label) in labels.iter().enumerate() {
            canvas.text(self.center(i, labels.len()), self.bottom() + 14.0, label, 9.0, Anchor::Middle);
        }
        canvas.text(12.0, self.top - 8.0, y_label, 9.0, Anchor::Start);
    }
}

fn title(canvas: &mut Canvas, text: &str) {
    let x = canvas.width / 2.0;
    canvas.text(x, 18.0, text, 12.0, Anchor::Middle);
}

fn color(config: &ChartConfig, i: usize) -> &str {
    config
        .palette
        .get(i % config.palette.len().max(1))
        .map(String::as_str)
        .unwrap_or("#4c72b0")
}

/// Most ticks a single axis will carry.
const MAX_TICKS: usize = 50;

/// Evenly spaced round tick values covering `[lo, hi]`.
///
/// Falls back to the two endpoints when the step is below the float
/// resolution at `lo`.
fn nice_ticks(lo: f64, hi: f64, target: usize) -> Vec<f64> {
    let span = hi - lo;
    if !(span > 0.0) || !span.is_finite() {
        return vec![lo];
    }
    let raw = span / target.max(1) as f64;
    let mag = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|m| m * mag)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * mag);
    let start = (lo / step).ceil() * step;
    if start + step == start {
        return vec![lo, hi];
    }
    let count = (((hi - start) / step + 1e-9).floor() as usize).min(MAX_TICKS);
    (0..=count)
        .map(|i| start + i as f64 * step)
        .map(|t| if t.abs() < step * 1e-9 { 0.0 } else { t })
        .collect()
}

/// Pads `[lo, hi]` outward to tick boundaries.
fn padded_range(lo: f64, hi: f64) -> (f64, f64) {
    let (lo, hi) = if hi > lo {
        (lo, hi)
    } else {
        (lo - 1.0, hi + 1.0)
    };
    let ticks = nice_ticks(lo, hi, 5);
    let step = if ticks.len() > 1 { ticks[1] - ticks[0] } else { hi - lo };
    ((lo / step).floor() * step, (hi / step).ceil() * step)
}

fn tick_label(v: f64) -> String {
    let s = format!("{v:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

// ── Bar ───────────────────────────────────────────────────────────────

fn bar_svg(groups: &[(String, Vec<f64>)], title_text: &str, y_label: &str, config: &ChartConfig) -> String {
    let stats: Vec<(f64, f64)> = groups
        .iter()
        .map(|(_, vs)| (mean(vs).unwrap_or(0.0), std_error(vs).unwrap_or(0.0)))
        .collect();
    let data_hi = stats.iter().map(|(m, se)| m + se).fold(0.0, f64::max);
    let data_lo = stats.iter().map(|(m, se)| m - se).fold(0.0, f64::min);
    let (lo, hi) = padded_range(data_lo, data_hi);

    let mut canvas = Canvas::new(config.width, config.height);
    let plot = Plot::new(config, lo, hi);
    let labels: Vec<&str> = groups.iter().map(|(l, _)| l.as_str()).collect();
    plot.frame(&mut canvas, &nice_ticks(lo, hi, 5), &labels, y_label);

    let n = groups.len();
    let bar_w = plot.slot(n) * 0.6;
    let base = plot.y(0.0_f64.clamp(lo, hi));
    for (i, &(m, se)) in stats.iter().enumerate() {
        let cx = plot.center(i, n);
        let top = plot.y(m);
        let style = Style::fill(color(config, i)).with_stroke(AXIS_COLOR, 0.5);
        canvas.rect(cx - bar_w / 2.0, top.min(base), bar_w, (base - top).abs(), &style);
        if se > 0.0 {
            canvas.error_bar(cx, plot.y(m - se), plot.y(m + se), bar_w * 0.3, AXIS_COLOR);
        }
    }
    title(&mut canvas, title_text);
    canvas.finish()
}

// ── Box ───────────────────────────────────────────────────────────────

/// Five-number summary used for one box.
#[derive(Debug, Clone, PartialEq)]
struct BoxStats {
    q1: f64,
    median: f64,
    q3: f64,
    whisker_lo: f64,
    whisker_hi: f64,
    outliers: Vec<f64>,
}

fn box_stats(values: &[f64]) -> Option<BoxStats> {
    let q1 = quantile(values, 0.25)?;
    let median = quantile(values, 0.5)?;
    let q3 = quantile(values, 0.75)?;
    let iqr = q3 - q1;
    let fences = (q1 - 1.5 * iqr)..=(q3 + 1.5 * iqr);
    let inside = values.iter().copied().filter(|v| fences.contains(v));
    let whisker_lo = inside.clone().fold(f64::INFINITY, f64::min);
    let whisker_hi = inside.fold(f64::NEG_INFINITY, f64::max);
    Some(BoxStats {
        q1,
        median,
        q3,
        whisker_lo: if whisker_lo.is_finite() { whisker_lo } else { q1 },
        whisker_hi: if whisker_hi.is_finite() { whisker_hi } else { q3 },
        outliers: values.iter().copied().filter(|v| !fences.contains(v)).collect(),
    })
}

fn box_svg(groups: &[(String, Vec<f64>)], title_text: &str, y_label: &str, config: &ChartConfig) -> String {
    let stats: Vec<Option<BoxStats>> = groups.iter().map(|(_, vs)| box_stats(vs)).collect();
    let all = groups.iter().flat_map(|(_, vs)| vs.iter().copied());
    let data_lo = all.clone().fold(f64::INFINITY, f64::min);
    let data_hi = all.fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = padded_range(data_lo, data_hi);

    let mut canvas = Canvas::new(config.width, config.height);
    let plot = Plot::new(config, lo, hi);
    let labels: Vec<&str> = groups.iter().map(|(l, _)| l.as_str()).collect();
    plot.frame(&mut canvas, &nice_ticks(lo, hi, 5), &labels, y_label);

    let n = groups.len();
    let box_w = plot.slot(n) * 0.5;
    for (i, b) in stats.iter().enumerate() {
        let Some(b) = b else { continue };
        let cx = plot.center(i, n);
        let (x0, x1) = (cx - box_w / 2.0, cx + box_w / 2.0);
        canvas.line(cx, plot.y(b.whisker_lo), cx, plot.y(b.q1), AXIS_COLOR, 1.0);
        canvas.line(cx, plot.y(b.q3), cx, plot.y(b.whisker_hi), AXIS_COLOR, 1.0);
        canvas.line(cx - box_w / 4.0, plot.y(b.whisker_lo), cx + box_w / 4.0, plot.y(b.whisker_lo), AXIS_COLOR, 1.0);
        canvas.line(cx - box_w / 4.0, plot.y(b.whisker_hi), cx + box_w / 4.0, plot.y(b.whisker_hi), AXIS_COLOR, 1.0);
        let style = Style::fill(color(config, i)).with_stroke(AXIS_COLOR, 1.0);
        canvas.rect(x0, plot.y(b.q3), box_w, plot.y(b.q1) - plot.y(b.q3), &style);
        canvas.line(x0, plot.y(b.median), x1, plot.y(b.median), AXIS_COLOR, 1.5);
        for &o in &b.outliers {
            canvas.circle(cx, plot.y(o), 2.5, &Style::stroke(AXIS_COLOR, 1.0));
        }
    }
    title(&mut canvas, title_text);
    canvas.finish()
}

// ── Pie ───────────────────────────────────────────────────────────────

fn pie_svg(groups: &[(String, Vec<f64>)], title_text: &str, config: &ChartConfig) -> Result<String> {
    let mut slices = Vec::with_capacity(groups.len());
    for (label, vs) in groups {
        if let Some(neg) = vs.iter().find(|v| **v < 0.0) {
            return Err(AgriError::ChartRender(format!(
                "pie values must be non-negative, got {neg} for '{label}'"
            )));
        }
        slices.push((label.as_str(), vs.iter().sum::<f64>()));
    }
    let total: f64 = slices.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Err(AgriError::ChartRender("pie values sum to zero".into()));
    }

    let mut canvas = Canvas::new(config.width, config.height);
    let legend_w = 120.0;
    let avail_w = config.width - legend_w - 2.0 * MARGIN_RIGHT;
    let avail_h = config.height - MARGIN_TOP - MARGIN_RIGHT;
    let radius = (avail_w.min(avail_h) / 2.0).max(10.0);
    let (cx, cy) = (MARGIN_RIGHT + avail_w / 2.0, MARGIN_TOP + avail_h / 2.0);

    // Clockwise from 12 o'clock.
    let mut angle = -std::f64::consts::FRAC_PI_2;
    for (i, (_, value)) in slices.iter().enumerate() {
        if *value <= 0.0 {
            continue;
        }
        let sweep = value / total * std::f64::consts::TAU;
        let steps = ((sweep / (std::f64::consts::PI / 90.0)).ceil() as usize).max(2);
        let mut points = Vec::with_capacity(steps + 2);
        if sweep < std::f64::consts::TAU - 1e-9 {
            points.push((cx, cy));
        }
        for s in 0..=steps {
            let a = angle + sweep * s as f64 / steps as f64;
            points.push((cx + radius * a.cos(), cy + radius * a.sin()));
        }
        canvas.polygon(&points, &Style::fill(color(config, i)).with_stroke("#ffffff", 1.0));

        let mid = angle + sweep / 2.0;
        let pct = value / total * 100.0;
        canvas.text(
            cx + radius * 0.65 * mid.cos(),
            cy + radius * 0.65 * mid.sin() + 3.0,
            &format!("{pct:.1}%"),
            9.0,
            Anchor::Middle,
        );
        angle += sweep;
    }

    let legend_x = config.width - legend_w;
    for (i, (label, _)) in slices.iter().enumerate() {
        let y = MARGIN_TOP + 14.0 * i as f64;
        canvas.rect(legend_x, y, 9.0, 9.0, &Style::fill(color(config, i)));
        canvas.text(legend_x + 13.0, y + 8.0, label, 9.0, Anchor::Start);
    }
    title(&mut canvas, title_text);
    Ok(canvas.finish())
}
