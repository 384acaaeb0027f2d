use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use docx_rs::{Docx, Paragraph, Run, RunFonts};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use tracing::info;

use crate::models::SurveyFindings;
use crate::report::{executive_summary, summary_table_text, RECOMMENDATIONS};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const WRAP_COLUMNS: usize = 90;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unable to write PDF: {0}")]
    Pdf(String),
    #[error("unable to write Word document: {0}")]
    Docx(String),
    #[error("unable to serialize summary tables: {0}")]
    Json(#[from] serde_json::Error),
}

/// Splits `text` into lines of at most `width` characters on word boundaries.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Builtin PDF fonts only cover Latin-1.
fn pdf_safe(text: &str) -> String {
    text.replace("χ²", "chi2")
        .chars()
        .map(|ch| if (ch as u32) < 0x100 { ch } else { '?' })
        .collect()
}

struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
    cursor: f32,
}

enum PdfFont {
    Regular,
    Bold,
    Mono,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, ExportError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let font = |builtin| {
            doc.add_builtin_font(builtin)
                .map_err(|err| ExportError::Pdf(err.to_string()))
        };
        let regular = font(BuiltinFont::Helvetica)?;
        let bold = font(BuiltinFont::HelveticaBold)?;
        let mono = font(BuiltinFont::Courier)?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            mono,
            cursor: PAGE_HEIGHT - MARGIN,
        })
    }

    fn line(&mut self, text: &str, size: f32, font: PdfFont) {
        let height = size * 0.5;
        if self.cursor - height < MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.cursor = PAGE_HEIGHT - MARGIN;
        }
        self.cursor -= height;
        let font = match font {
            PdfFont::Regular => &self.regular,
            PdfFont::Bold => &self.bold,
            PdfFont::Mono => &self.mono,
        };
        self.layer
            .use_text(pdf_safe(text), size, Mm(MARGIN), Mm(self.cursor), font);
    }

    fn paragraph(&mut self, text: &str) {
        for line in wrap_text(text, WRAP_COLUMNS) {
            self.line(&line, 11.0, PdfFont::Regular);
        }
        self.gap();
    }

    fn heading(&mut self, text: &str, size: f32) {
        self.gap();
        self.line(text, size, PdfFont::Bold);
        self.gap();
    }

    fn gap(&mut self) {
        self.cursor -= 3.0;
    }

    fn save(self, path: &Path) -> Result<(), ExportError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.doc
            .save(&mut writer)
            .map_err(|err| ExportError::Pdf(err.to_string()))
    }
}

pub fn write_pdf(title: &str, findings: &SurveyFindings, path: &Path) -> Result<(), ExportError> {
    let mut pdf = PdfWriter::new(title)?;
    pdf.heading(title, 16.0);

    pdf.heading("Executive Summary", 13.0);
    for line in executive_summary(findings) {
        pdf.paragraph(&line);
    }

    for summary in &findings.summaries {
        pdf.heading(&summary.title, 13.0);
        for line in summary_table_text(summary).lines() {
            pdf.line(line, 9.0, PdfFont::Mono);
        }
    }

    pdf.heading("Recommendations", 13.0);
    for (index, (heading, text)) in RECOMMENDATIONS.iter().enumerate() {
        pdf.paragraph(&format!("{}. {heading}: {text}", index + 1));
    }

    pdf.save(path)?;
    info!(path = %path.display(), "exported PDF report");
    Ok(())
}

pub fn write_docx(title: &str, findings: &SurveyFindings, path: &Path) -> Result<(), ExportError> {
    let heading = |text: &str, size: usize| {
        Paragraph::new().add_run(Run::new().add_text(text).bold().size(size))
    };
    let mono = || RunFonts::new().ascii("Courier New").hi_ansi("Courier New");

    let mut docx = Docx::new()
        .add_paragraph(heading(&format!("Executive Summary – {title}"), 32));
    for line in executive_summary(findings) {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
    }

    for summary in &findings.summaries {
        docx = docx.add_paragraph(heading(&summary.title, 26));
        for line in summary_table_text(summary).lines() {
            docx = docx.add_paragraph(
                Paragraph::new().add_run(Run::new().add_text(line).fonts(mono()).size(18)),
            );
        }
    }

    docx = docx.add_paragraph(heading("Recommendations", 26));
    for (index, (label, text)) in RECOMMENDATIONS.iter().enumerate() {
        docx = docx.add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(format!("{}. {label}: ", index + 1)).bold())
                .add_run(Run::new().add_text(*text)),
        );
    }

    let file = File::create(path)?;
    docx.build()
        .pack(file)
        .map_err(|err| ExportError::Docx(err.to_string()))?;
    info!(path = %path.display(), "exported Word summary");
    Ok(())
}

/// Writes findings as pretty JSON; identical findings give identical bytes.
pub fn write_summary_json(findings: &SurveyFindings, path: &Path) -> Result<(), ExportError> {
    let mut body = serde_json::to_string_pretty(findings)?;
    body.push('\n');
    std::fs::write(path, body)?;
    info!(path = %path.display(), "wrote summary tables");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssociationOutcome, AssociationTest, SummaryRow, SummaryTable};

    fn findings() -> SurveyFindings {
        SurveyFindings {
            respondents: 3,
            awareness_pct: "66.7".to_string(),
            summaries: vec![SummaryTable {
                name: "awareness".to_string(),
                title: "Overall Awareness".to_string(),
                keys: vec!["Awareness".to_string()],
                rows: vec![
                    SummaryRow {
                        keys: vec![Some("No".to_string())],
                        count: 1,
                    },
                    SummaryRow {
                        keys: vec![Some("Yes".to_string())],
                        count: 2,
                    },
                ],
            }],
            associations: vec![AssociationTest {
                left: "Awareness".to_string(),
                right: "Know_Whom".to_string(),
                outcome: AssociationOutcome::Computed {
                    statistic: 1.5,
                    p_value: 0.2207,
                    dof: 1,
                },
            }],
        }
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(
            wrap_text("one two three four", 9),
            vec!["one two", "three", "four"]
        );
        assert_eq!(wrap_text("averyveryverylongword x", 5), vec!["averyveryverylongword", "x"]);
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn pdf_text_is_latin1() {
        assert_eq!(pdf_safe("χ² = 1.50 – ok"), "chi2 = 1.50 ? ok");
    }

    #[test]
    fn writes_pdf_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        write_pdf("Survey Report", &findings(), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn writes_docx_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.docx");
        write_docx("Workplace Harassment Survey", &findings(), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn summary_json_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");
        write_summary_json(&findings(), &first).unwrap();
        write_summary_json(&findings(), &second).unwrap();

        let body = std::fs::read_to_string(&first).unwrap();
        assert_eq!(body, std::fs::read_to_string(&second).unwrap());
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["awareness_pct"], "66.7");
        assert_eq!(parsed["summaries"][0]["rows"][1]["count"], 2);
        assert_eq!(parsed["associations"][0]["outcome"]["kind"], "computed");
    }
}
