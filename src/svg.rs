//! Minimal SVG canvas and PNG rasterization.
//!
//! Coordinates are in points (1pt = 1/72"), origin top-left.

use std::fmt::Write as FmtWrite;
use std::sync::{Arc, OnceLock};

use resvg::{tiny_skia, usvg};

use crate::error::{AgriError, Result};

/// Fill and stroke for shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: f64,
}

impl Style {
    pub fn fill(color: &str) -> Self {
        Self {
            fill: Some(color.to_string()),
            stroke: None,
            stroke_width: 0.0,
        }
    }

    pub fn stroke(color: &str, width: f64) -> Self {
        Self {
            fill: None,
            stroke: Some(color.to_string()),
            stroke_width: width,
        }
    }

    pub fn with_stroke(mut self, color: &str, width: f64) -> Self {
        self.stroke = Some(color.to_string());
        self.stroke_width = width;
        self
    }

    fn attrs(&self) -> String {
        let mut s = format!("fill=\"{}\"", self.fill.as_deref().unwrap_or("none"));
        if let Some(stroke) = &self.stroke {
            let _ = write!(s, " stroke=\"{stroke}\" stroke-width=\"{:.2}\"", self.stroke_width);
        }
        s
    }
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

impl Anchor {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Middle => "middle",
            Self::End => "end",
        }
    }
}

/// Immediate-mode SVG canvas.
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    body: String,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            body: String::new(),
        }
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, style: &Style) {
        let _ = writeln!(
            self.body,
            "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{:.2}\" height=\"{:.2}\" {}/>",
            w.max(0.0),
            h.max(0.0),
            style.attrs()
        );
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: &str, width: f64) {
        let _ = writeln!(
            self.body,
            "<line x1=\"{x1:.2}\" y1=\"{y1:.2}\" x2=\"{x2:.2}\" y2=\"{y2:.2}\" stroke=\"{color}\" stroke-width=\"{width:.2}\"/>"
        );
    }

    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, style: &Style) {
        let _ = writeln!(
            self.body,
            "<circle cx=\"{cx:.2}\" cy=\"{cy:.2}\" r=\"{r:.2}\" {}/>",
            style.attrs()
        );
    }

    pub fn polygon(&mut self, points: &[(f64, f64)], style: &Style) {
        let pts: Vec<String> = points.iter().map(|(x, y)| format!("{x:.2},{y:.2}")).collect();
        let _ = writeln!(
            self.body,
            "<polygon points=\"{}\" {}/>",
            pts.join(" "),
            style.attrs()
        );
    }

    pub fn text(&mut self, x: f64, y: f64, content: &str, size: f64, anchor: Anchor) {
        let _ = writeln!(
            self.body,
            "<text x=\"{x:.2}\" y=\"{y:.2}\" font-family=\"sans-serif\" font-size=\"{size:.1}\" text-anchor=\"{}\" fill=\"#222222\">{}</text>",
            anchor.as_str(),
            escape(content)
        );
    }

    /// Vertical error bar with caps.
    pub fn error_bar(&mut self, x: f64, y_lo: f64, y_hi: f64, cap_width: f64, color: &str) {
        self.line(x, y_lo, x, y_hi, color, 1.0);
        let half = cap_width / 2.0;
        self.line(x - half, y_lo, x + half, y_lo, color, 1.0);
        self.line(x - half, y_hi, x + half, y_hi, color, 1.0);
    }

    /// Serializes the canvas to a standalone SVG document.
    pub fn finish(self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n\
             <rect width=\"{w}\" height=\"{h}\" fill=\"#ffffff\"/>\n{body}</svg>\n",
            w = self.width,
            h = self.height,
            body = self.body
        )
    }
}

/// Escapes text for use in SVG/XML content and attributes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Rasterization ─────────────────────────────────────────────────────

fn font_database() -> Arc<usvg::fontdb::Database> {
    static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            tracing::debug!(faces = db.len(), "loaded system fonts");
            Arc::new(db)
        })
        .clone()
}

/// Converts an SVG document to PNG bytes at the given DPI.
pub fn svg_to_png(svg: &str, dpi: u32) -> Result<Vec<u8>> {
    let opt = usvg::Options {
        fontdb: font_database(),
        ..usvg::Options::default()
    };

    let tree = usvg::Tree::from_str(svg, &opt).map_err(|e| AgriError::ChartRender(e.to_string()))?;

    let scale = dpi as f32 / 72.0;
    let size = tree.size();
    let w = (size.width() * scale).ceil() as u32;
    let h = (size.height() * scale).ceil() as u32;

    let mut pixmap = tiny_skia::Pixmap::new(w, h)
        .ok_or_else(|| AgriError::ChartRender("failed to create pixmap".into()))?;
    pixmap.fill(tiny_skia::Color::WHITE);

    resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| AgriError::ChartRender(e.to_string()))
}

/// Reads width and height from a PNG header.
pub fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    if bytes.len() < 24 || bytes[..8] != SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let w = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let h = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_emits_elements() {
        let mut c = Canvas::new(100.0, 50.0);
        c.rect(1.0, 2.0, 10.0, 20.0, &Style::fill("#ff0000"));
        c.line(0.0, 0.0, 10.0, 10.0, "#000000", 1.0);
        c.circle(5.0, 5.0, 2.0, &Style::stroke("#00ff00", 0.5));
        c.polygon(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)], &Style::fill("#0000ff"));
        c.text(50.0, 10.0, "A & B", 10.0, Anchor::Middle);
        let svg = c.finish();
        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains("<rect x=\"1.00\""));
        assert!(svg.contains("fill=\"none\" stroke=\"#00ff00\""));
        assert!(svg.contains("<polygon points=\"0.00,0.00 1.00,0.00 0.00,1.00\""));
        assert!(svg.contains(">A &amp; B</text>"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn negative_sizes_are_clamped() {
        let mut c = Canvas::new(10.0, 10.0);
        c.rect(0.0, 0.0, -5.0, 3.0, &Style::fill("#000000"));
        assert!(c.finish().contains("width=\"0.00\""));
    }

    #[test]
    fn escape_all_specials() {
        assert_eq!(escape("<a href='x'>\"&\""), "&lt;a href=&apos;x&apos;&gt;&quot;&amp;&quot;");
    }

    #[test]
    fn rasterizes_at_dpi() {
        let mut c = Canvas::new(72.0, 36.0);
        c.rect(10.0, 10.0, 20.0, 10.0, &Style::fill("#4c72b0"));
        let png = svg_to_png(&c.finish(), 144).unwrap();
        assert_eq!(png_dimensions(&png), Some((144, 72)));
    }

    #[test]
    fn invalid_svg_is_render_error() {
        let err = svg_to_png("<svg", 72).unwrap_err();
        assert!(matches!(err, AgriError::ChartRender(_)));
    }

    #[test]
    fn png_dimensions_rejects_garbage() {
        assert_eq!(png_dimensions(b"not a png"), None);
    }
}
