//! `.docx` report assembly: title, raw data, analysis results, charts.

use std::path::Path;

use crate::config::{ChartConfig, ReportConfig};
use crate::dataframe::Table;
use crate::docx::DocxBuilder;
use crate::error::{AgriError, Result};
use crate::result::AnalysisResult;
use crate::svg::svg_to_png;

/// Exports a report with the default [`ReportConfig`] and chart DPI.
///
/// `charts` are image files (`.png` or `.svg`) embedded in order; a
/// [`ChartArtifact`](crate::chart::ChartArtifact) can be passed directly.
pub fn export_report<P: AsRef<Path>>(
    path: impl AsRef<Path>,
    title: &str,
    table: &Table,
    result: &AnalysisResult,
    charts: &[P],
) -> Result<()> {
    export_report_with(
        path,
        title,
        table,
        result,
        charts,
        &ReportConfig::default(),
        ChartConfig::default().dpi,
    )
}

/// Writes the report document to `path`, replacing any existing file.
///
/// SVG charts are rasterized at `dpi`. All chart files are read before
/// anything is written, so a missing chart leaves `path` untouched.
///
/// # Errors
///
/// [`AgriError::Export`] if the title is blank, a chart is missing,
/// unreadable or not an image, or `path` cannot be written.
pub fn export_report_with<P: AsRef<Path>>(
    path: impl AsRef<Path>,
    title: &str,
    table: &Table,
    result: &AnalysisResult,
    charts: &[P],
    config: &ReportConfig,
    dpi: u32,
) -> Result<()> {
    let path = path.as_ref();
    if title.trim().is_empty() {
        return Err(AgriError::Export("report title must not be empty".into()));
    }
    let images = charts
        .iter()
        .map(|c| load_chart(c.as_ref(), dpi))
        .collect::<Result<Vec<_>>>()?;

    let mut doc = DocxBuilder::new(title);
    doc.heading(title, 1);

    doc.heading(&config.raw_data_heading, 2);
    let rows: Vec<Vec<String>> = (0..table.row_count()).map(|r| table.display_row(r)).collect();
    doc.table(table.column_names(), &rows);

    doc.heading(&config.results_heading, 2);
    for line in result.render_text() {
        doc.paragraph(&line);
    }
    let grid = result.to_grid();
    doc.table(&grid.headers, &grid.rows);

    doc.heading(&config.charts_heading, 2);
    for png in images {
        doc.picture(png, config.image_width_inches)?;
    }

    doc.write(path)?;
    tracing::info!(
        path = %path.display(),
        rows = table.row_count(),
        charts = doc.image_count(),
        "report exported"
    );
    Ok(())
}

/// Reads a chart file as PNG bytes, rasterizing SVG input.
fn load_chart(path: &Path, dpi: u32) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path)
        .map_err(|e| AgriError::Export(format!("cannot read chart {}: {e}", path.display())))?;
    let is_svg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
    if !is_svg {
        return Ok(bytes);
    }
    let text = String::from_utf8(bytes)
        .map_err(|_| AgriError::Export(format!("chart {} is not UTF-8 SVG", path.display())))?;
    svg_to_png(&text, dpi)
        .map_err(|e| AgriError::Export(format!("chart {}: {e}", path.display())))
}
