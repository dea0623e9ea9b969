//! Minimal Office Open XML (`.docx`) writer.
//!
//! Supports what a report needs: headings, paragraphs, grid tables and
//! inline PNG pictures. The package is assembled in memory and written
//! with `zip` in one step.

use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AgriError, Result};
use crate::svg::{escape, png_dimensions};

/// English Metric Units per inch.
pub const EMU_PER_INCH: f64 = 914_400.0;

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// Builds a `.docx` document body in order.
#[derive(Debug, Default)]
pub struct DocxBuilder {
    title: String,
    body: String,
    images: Vec<Vec<u8>>,
}

impl DocxBuilder {
    /// Starts a document whose core properties carry `title`.
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    /// Number of pictures added so far.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Appends a heading paragraph (`level` 1 or 2).
    pub fn heading(&mut self, text: &str, level: u8) -> &mut Self {
        let style = if level <= 1 { "Heading1" } else { "Heading2" };
        self.body.push_str(&format!(
            "<w:p><w:pPr><w:pStyle w:val=\"{style}\"/></w:pPr>{}</w:p>",
            run(text, false)
        ));
        self
    }

    /// Appends a plain paragraph. Embedded newlines become line breaks.
    pub fn paragraph(&mut self, text: &str) -> &mut Self {
        let runs: Vec<String> = text.split('\n').map(|line| run(line, false)).collect();
        self.body
            .push_str(&format!("<w:p>{}</w:p>", runs.join("<w:r><w:br/></w:r>")));
        self
    }

    /// Appends a bordered table with a bold header row.
    pub fn table(&mut self, headers: &[String], rows: &[Vec<String>]) -> &mut Self {
        let mut xml = String::from(
            "<w:tbl><w:tblPr><w:tblStyle w:val=\"TableGrid\"/><w:tblW w:w=\"0\" w:type=\"auto\"/></w:tblPr><w:tblGrid>",
        );
        for _ in headers {
            xml.push_str("<w:gridCol/>");
        }
        xml.push_str("</w:tblGrid>");
        xml.push_str(&table_row(headers, true));
        for row in rows {
            xml.push_str(&table_row(row, false));
        }
        xml.push_str("</w:tbl>");
        self.body.push_str(&xml);
        // Word requires a paragraph between consecutive tables.
        self.body.push_str("<w:p/>");
        self
    }

    /// Appends a PNG picture scaled to `width_inches`, keeping its aspect ratio.
    pub fn picture(&mut self, png: Vec<u8>, width_inches: f64) -> Result<&mut Self> {
        let (w, h) = png_dimensions(&png)
            .filter(|(w, h)| *w > 0 && *h > 0)
            .ok_or_else(|| AgriError::Export("image is not a valid PNG".into()))?;
        let cx = (width_inches * EMU_PER_INCH).round() as u64;
        let cy = (cx as f64 * h as f64 / w as f64).round() as u64;

        self.images.push(png);
        let id = self.images.len();
        self.body.push_str(&format!(
            "<w:p><w:r><w:drawing><wp:inline distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\">\
             <wp:extent cx=\"{cx}\" cy=\"{cy}\"/><wp:docPr id=\"{id}\" name=\"Picture {id}\"/>\
             <wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a=\"{NS_A}\" noChangeAspect=\"1\"/></wp:cNvGraphicFramePr>\
             <a:graphic xmlns:a=\"{NS_A}\"><a:graphicData uri=\"{NS_PIC}\"><pic:pic xmlns:pic=\"{NS_PIC}\">\
             <pic:nvPicPr><pic:cNvPr id=\"{id}\" name=\"image{id}.png\"/><pic:cNvPicPr/></pic:nvPicPr>\
             <pic:blipFill><a:blip r:embed=\"rIdImage{id}\"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>\
             <pic:spPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>\
             <a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic>\
             </wp:inline></w:drawing></w:r></w:p>"
        ));
        Ok(self)
    }

    /// Serializes the package to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let put = |zip: &mut ZipWriter<Cursor<Vec<u8>>>, name: &str, data: &[u8]| -> Result<()> {
            zip.start_file(name, opts)?;
            zip.write_all(data)
                .map_err(|e| AgriError::Export(format!("{name}: {e}")))
        };

        put(&mut zip, "[Content_Types].xml", content_types().as_bytes())?;
        put(&mut zip, "_rels/.rels", package_rels().as_bytes())?;
        put(&mut zip, "docProps/core.xml", self.core_props().as_bytes())?;
        put(&mut zip, "word/document.xml", self.document().as_bytes())?;
        put(&mut zip, "word/styles.xml", STYLES.as_bytes())?;
        put(&mut zip, "word/_rels/document.xml.rels", self.document_rels().as_bytes())?;
        for (i, img) in self.images.iter().enumerate() {
            put(&mut zip, &format!("word/media/image{}.png", i + 1), img)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Writes the document to `path`, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .map_err(|e| AgriError::Export(format!("cannot write {}: {e}", path.display())))
    }

    fn document(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <w:document xmlns:w=\"{NS_W}\" xmlns:r=\"{NS_R}\" xmlns:wp=\"{NS_WP}\">\
             <w:body>{}<w:sectPr><w:pgSz w:w=\"11906\" w:h=\"16838\"/>\
             <w:pgMar w:top=\"1134\" w:right=\"1134\" w:bottom=\"1134\" w:left=\"1134\" w:header=\"708\" w:footer=\"708\" w:gutter=\"0\"/>\
             </w:sectPr></w:body></w:document>",
            self.body
        )
    }

    fn document_rels(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
             <Relationship Id=\"rIdStyles\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>",
        );
        for id in 1..=self.images.len() {
            xml.push_str(&format!(
                "<Relationship Id=\"rIdImage{id}\" Type=\"{REL_IMAGE}\" Target=\"media/image{id}.png\"/>"
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }

    fn core_props(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
             xmlns:dc=\"http://purl.org/dc/elements/1.1/\"><dc:title>{}</dc:title><dc:creator>agristat</dc:creator>\
             </cp:coreProperties>",
            escape(&self.title)
        )
    }
}

fn run(text: &str, bold: bool) -> String {
    let props = if bold { "<w:rPr><w:b/></w:rPr>" } else { "" };
    format!(
        "<w:r>{props}<w:t xml:space=\"preserve\">{}</w:t></w:r>",
        escape(text)
    )
}

fn table_row(cells: &[String], header: bool) -> String {
    let mut xml = String::from("<w:tr>");
    for cell in cells {
        xml.push_str(&format!(
            "<w:tc><w:tcPr><w:tcW w:w=\"0\" w:type=\"auto\"/></w:tcPr><w:p>{}</w:p></w:tc>",
            run(cell, header)
        ));
    }
    xml.push_str("</w:tr>");
    xml
}

fn content_types() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
     <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
     <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
     <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
     <Default Extension=\"png\" ContentType=\"image/png\"/>\
     <Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
     <Override PartName=\"/word/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml\"/>\
     <Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>\
     </Types>"
        .to_string()
}

fn package_rels() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
     <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
     <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\
     <Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties\" Target=\"docProps/core.xml\"/>\
     </Relationships>"
        .to_string()
}

const STYLES: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<w:styles xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
<w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii=\"Calibri\" w:hAnsi=\"Calibri\" w:cs=\"Calibri\"/>\
<w:sz w:val=\"22\"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after=\"120\"/></w:pPr></w:pPrDefault></w:docDefaults>\
<w:style w:type=\"paragraph\" w:default=\"1\" w:styleId=\"Normal\"><w:name w:val=\"Normal\"/></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Heading1\"><w:name w:val=\"heading 1\"/><w:basedOn w:val=\"Normal\"/>\
<w:next w:val=\"Normal\"/><w:pPr><w:keepNext/><w:spacing w:before=\"240\" w:after=\"120\"/><w:outlineLvl w:val=\"0\"/></w:pPr>\
<w:rPr><w:b/><w:sz w:val=\"32\"/></w:rPr></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Heading2\"><w:name w:val=\"heading 2\"/><w:basedOn w:val=\"Normal\"/>\
<w:next w:val=\"Normal\"/><w:pPr><w:keepNext/><w:spacing w:before=\"200\" w:after=\"80\"/><w:outlineLvl w:val=\"1\"/></w:pPr>\
<w:rPr><w:b/><w:sz w:val=\"26\"/></w:rPr></w:style>\
<w:style w:type=\"table\" w:styleId=\"TableGrid\"><w:name w:val=\"Table Grid\"/><w:tblPr><w:tblBorders>\
<w:top w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/><w:left w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
<w:bottom w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/><w:right w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
<w:insideH w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/><w:insideV w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
</w:tblBorders></w:tblPr></w:style></w:styles>";

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn tiny_png(w: u32, h: u32) -> Vec<u8> {
        let svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\"><rect width=\"{w}\" height=\"{h}\" fill=\"#336699\"/></svg>"
        );
        crate::svg::svg_to_png(&svg, 72).unwrap()
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut part = archive.by_name(name).unwrap();
        let mut s = String::new();
        part.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn package_parts_present() {
        let mut doc = DocxBuilder::new("Trial");
        doc.heading("Trial", 1).paragraph("hello");
        let bytes = doc.to_bytes().unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "docProps/core.xml",
            "word/document.xml",
            "word/styles.xml",
            "word/_rels/document.xml.rels",
        ] {
            assert!(names.contains(&part), "missing {part}");
        }
    }

    #[test]
    fn body_content_is_escaped_and_ordered() {
        let mut doc = DocxBuilder::new("N & P");
        doc.heading("N & P trial", 1)
            .heading("Data", 2)
            .table(&["a".into(), "b<c".into()], &[vec!["1".into(), "".into()]])
            .paragraph("line one\nline two");
        let xml = read_part(&doc.to_bytes().unwrap(), "word/document.xml");
        assert!(xml.contains("N &amp; P trial"));
        assert!(xml.contains("b&lt;c"));
        assert!(xml.contains("<w:br/>"));
        let h1 = xml.find("Heading1").unwrap();
        let h2 = xml.find("Heading2").unwrap();
        let tbl = xml.find("<w:tbl>").unwrap();
        assert!(h1 < h2 && h2 < tbl);
        assert_eq!(xml.matches("<w:tr>").count(), 2);
        let core = read_part(&doc.to_bytes().unwrap(), "docProps/core.xml");
        assert!(core.contains("<dc:title>N &amp; P</dc:title>"));
    }

    #[test]
    fn picture_keeps_aspect_ratio() {
        let mut doc = DocxBuilder::new("t");
        doc.picture(tiny_png(200, 100), 5.0).unwrap();
        assert_eq!(doc.image_count(), 1);
        let bytes = doc.to_bytes().unwrap();
        let xml = read_part(&bytes, "word/document.xml");
        assert!(xml.contains("<wp:extent cx=\"4572000\" cy=\"2286000\"/>"));
        assert!(xml.contains("r:embed=\"rIdImage1\""));
        let rels = read_part(&bytes, "word/_rels/document.xml.rels");
        assert!(rels.contains("Target=\"media/image1.png\""));
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        assert!(archive.by_name("word/media/image1.png").is_ok());
    }

    #[test]
    fn non_png_picture_rejected() {
        let mut doc = DocxBuilder::new("t");
        let err = doc.picture(b"GIF89a".to_vec(), 5.0).unwrap_err();
        assert!(matches!(err, AgriError::Export(_)));
        assert_eq!(doc.image_count(), 0);
    }

    #[test]
    fn write_to_bad_path_is_export_error() {
        let doc = DocxBuilder::new("t");
        let err = doc.write(Path::new("/nonexistent/agristat/report.docx")).unwrap_err();
        assert!(matches!(err, AgriError::Export(_)));
    }
}
