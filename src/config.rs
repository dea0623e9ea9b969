//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML document (or no file at
//! all) yields a working configuration:
//!
//! ```
//! use agristat::config::PipelineConfig;
//!
//! let cfg = PipelineConfig::from_toml_str("[normality]\nalpha = 0.01\n").unwrap();
//! assert_eq!(cfg.normality.alpha, 0.01);
//! assert_eq!(cfg.normality.min_sample, 4);
//! assert_eq!(cfg.report.image_width_inches, 5.0);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgriError, Result};

/// Top-level configuration for a pipeline session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub normality: NormalityConfig,
    pub chart: ChartConfig,
    pub report: ReportConfig,
    pub csv: CsvConfig,
}

impl PipelineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        let n = &self.normality;
        if !(n.alpha > 0.0 && n.alpha < 1.0) {
            return Err(AgriError::Config(format!(
                "normality.alpha must be in (0, 1), got {}",
                n.alpha
            )));
        }
        if n.min_sample < 3 {
            return Err(AgriError::Config(format!(
                "normality.min_sample must be at least 3, got {}",
                n.min_sample
            )));
        }
        let c = &self.chart;
        if !(c.width > 0.0 && c.height > 0.0) {
            return Err(AgriError::Config("chart dimensions must be positive".into()));
        }
        if c.dpi == 0 {
            return Err(AgriError::Config("chart.dpi must be positive".into()));
        }
        if c.palette.is_empty() {
            return Err(AgriError::Config("chart.palette must not be empty".into()));
        }
        if self.report.image_width_inches <= 0.0 {
            return Err(AgriError::Config(
                "report.image_width_inches must be positive".into(),
            ));
        }
        if !self.csv.delimiter.is_ascii() {
            return Err(AgriError::Config("csv.delimiter must be ASCII".into()));
        }
        Ok(())
    }
}

/// Normality gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalityConfig {
    /// Significance level; `p < alpha` rejects normality.
    pub alpha: f64,
    /// Fewest non-missing observations a column needs to be tested.
    pub min_sample: usize,
}

impl Default for NormalityConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            min_sample: 4,
        }
    }
}

/// Chart appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Canvas width in points.
    pub width: f64,
    /// Canvas height in points.
    pub height: f64,
    /// Raster resolution for PNG output.
    pub dpi: u32,
    /// Fill colors as `#rrggbb`, cycled per category.
    pub palette: Vec<String>,
    /// Overrides the generated chart title.
    pub title: Option<String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 432.0,  // 6" * 72
            height: 288.0, // 4" * 72
            dpi: 150,
            palette: [
                "#4c72b0", "#dd8452", "#55a868", "#c44e52", "#8172b3", "#937860", "#da8bc3",
                "#8c8c8c",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            title: None,
        }
    }
}

/// Report document layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub image_width_inches: f64,
    pub raw_data_heading: String,
    pub results_heading: String,
    pub charts_heading: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            image_width_inches: 5.0,
            raw_data_heading: "Raw data".into(),
            results_heading: "Analysis results".into(),
            charts_heading: "Charts".into(),
        }
    }
}

/// CSV input settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub delimiter: char,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.normality.alpha, 0.05);
        assert_eq!(cfg.chart.dpi, 150);
        assert_eq!(cfg.csv.delimiter, ',');
    }

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            r##"
            [chart]
            width = 600.0
            title = "Yield by variety"

            [report]
            results_heading = "Results"

            [csv]
            delimiter = ";"
            "##,
        )
        .unwrap();
        assert_eq!(cfg.chart.width, 600.0);
        assert_eq!(cfg.chart.height, 288.0);
        assert_eq!(cfg.chart.title.as_deref(), Some("Yield by variety"));
        assert_eq!(cfg.report.results_heading, "Results");
        assert_eq!(cfg.report.charts_heading, "Charts");
        assert_eq!(cfg.csv.delimiter, ';');
    }

    #[test]
    fn alpha_out_of_range_rejected() {
        let err = PipelineConfig::from_toml_str("[normality]\nalpha = 1.5\n").unwrap_err();
        assert!(matches!(err, AgriError::Config(_)));
    }

    #[test]
    fn tiny_min_sample_rejected() {
        let err = PipelineConfig::from_toml_str("[normality]\nmin_sample = 2\n").unwrap_err();
        assert!(err.to_string().contains("min_sample"));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = PipelineConfig::from_toml_str("[chart\nwidth = ").unwrap_err();
        assert!(matches!(err, AgriError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agristat.toml");
        std::fs::write(&path, "[chart]\ndpi = 300\n").unwrap();
        let cfg = PipelineConfig::load(&path).unwrap();
        assert_eq!(cfg.chart.dpi, 300);
    }

    #[test]
    fn serializes_back_to_toml() {
        let cfg = PipelineConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let back = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(back, cfg);
    }
}
