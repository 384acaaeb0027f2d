use std::fmt::Write;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{SummaryTable, SurveyFindings};

pub const RECOMMENDATIONS: [(&str, &str); 5] = [
    (
        "Mandatory Training",
        "Formal training should be instituted across departments to improve awareness and reporting clarity.",
    ),
    (
        "Clarify Reporting Channels",
        "Low awareness of whom to report to indicates a need for clearer communication protocols.",
    ),
    (
        "Target Gender Disparities",
        "Gender-based differences in awareness require tailored outreach.",
    ),
    (
        "Continuous Learning",
        "Refresher programs should be scheduled periodically.",
    ),
    (
        "Accessible Policy Documents",
        "Ensure policies are visible and easy to locate on internal platforms.",
    ),
];

const STYLE: &str = "\
    body { font-family: Arial, sans-serif; margin: 40px; background: #f4f4f4; }
    h1, h2 { color: #2c3e50; }
    h2 { margin-top: 0; }
    .section { background: #fff; padding: 20px; border-radius: 6px; margin-bottom: 30px; }
    img { max-width: 100%; border: 1px solid #ccc; padding: 4px; background: #fff; }
    table { width: 100%; border-collapse: collapse; margin: 20px 0; background: #fff; }
    th, td { padding: 8px; border: 1px solid #ccc; text-align: left; }
    footer { color: #777; font-size: 0.85em; }";

/// Chart location as referenced from the report file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartLink {
    pub name: String,
    pub src: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddedDataset {
    pub download_name: String,
    pub base64: String,
}

pub struct ReportContext<'a> {
    pub title: &'a str,
    pub findings: &'a SurveyFindings,
    pub charts: &'a [ChartLink],
    pub dataset: Option<&'a EmbeddedDataset>,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Headline sentence used by every output format.
pub fn awareness_sentence(findings: &SurveyFindings) -> String {
    format!(
        "Out of {} respondents, {}% reported being fully aware of what constitutes workplace harassment.",
        findings.respondents, findings.awareness_pct
    )
}

/// Plain-text executive summary: headline followed by one line per test.
pub fn executive_summary(findings: &SurveyFindings) -> Vec<String> {
    let mut lines = vec![awareness_sentence(findings)];
    lines.extend(findings.associations.iter().map(ToString::to_string));
    lines
}

/// Renders a summary table the way a dataframe is rendered to HTML: keys
/// first, count last, no index column.
pub fn summary_table_html(summary: &SummaryTable) -> String {
    let mut html = String::new();
    let _ = writeln!(html, "<table class=\"dataframe\">");
    let _ = writeln!(html, "  <thead>");
    let _ = write!(html, "    <tr>");
    for heading in summary.header() {
        let _ = write!(html, "<th>{}</th>", escape_html(heading));
    }
    let _ = writeln!(html, "</tr>");
    let _ = writeln!(html, "  </thead>");
    let _ = writeln!(html, "  <tbody>");
    for row in &summary.rows {
        let _ = write!(html, "    <tr>");
        for index in 0..summary.keys.len() {
            let _ = write!(html, "<td>{}</td>", escape_html(row.label(index)));
        }
        let _ = writeln!(html, "<td>{}</td></tr>", row.count);
    }
    let _ = writeln!(html, "  </tbody>");
    let _ = writeln!(html, "</table>");
    html
}

/// Plain-text rendering of a summary table for the console and documents.
pub fn summary_table_text(summary: &SummaryTable) -> String {
    let header = summary.header();
    let cells: Vec<Vec<String>> = summary
        .rows
        .iter()
        .map(|row| {
            let mut cells: Vec<String> = (0..summary.keys.len())
                .map(|index| row.label(index).to_string())
                .collect();
            cells.push(row.count.to_string());
            cells
        })
        .collect();

    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(index, heading)| {
            cells
                .iter()
                .map(|row| row[index].chars().count())
                .chain(std::iter::once(heading.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut output = String::new();
    let line = |values: Vec<&str>| {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let _ = writeln!(output, "{}", line(header.clone()));
    for row in &cells {
        let _ = writeln!(output, "{}", line(row.iter().map(String::as_str).collect()));
    }
    output
}

pub fn build_html(context: &ReportContext<'_>) -> String {
    let findings = context.findings;
    let mut html = String::new();

    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(html, "<html lang=\"en\">");
    let _ = writeln!(html, "<head>");
    let _ = writeln!(html, "  <meta charset=\"UTF-8\">");
    let _ = writeln!(html, "  <title>{}</title>", escape_html(context.title));
    let _ = writeln!(html, "  <style>\n{STYLE}\n  </style>");
    let _ = writeln!(html, "</head>");
    let _ = writeln!(html, "<body>");
    let _ = writeln!(html, "  <h1>{}</h1>", escape_html(context.title));

    let mut section = 1;
    let _ = writeln!(html, "  <div class=\"section\">");
    let _ = writeln!(html, "    <h2>{section}. Executive Summary</h2>");
    let _ = writeln!(
        html,
        "    <p>Out of {} respondents, <strong>{}%</strong> reported being fully aware of what constitutes workplace harassment.</p>",
        findings.respondents, findings.awareness_pct
    );
    if !findings.associations.is_empty() {
        let _ = writeln!(html, "    <ul>");
        for test in &findings.associations {
            let _ = writeln!(html, "      <li>{}</li>", escape_html(&test.to_string()));
        }
        let _ = writeln!(html, "    </ul>");
    }
    let _ = writeln!(html, "  </div>");

    for summary in &findings.summaries {
        section += 1;
        let _ = writeln!(html, "  <div class=\"section\">");
        let _ = writeln!(
            html,
            "    <h2>{section}. {}</h2>",
            escape_html(&summary.title)
        );
        if let Some(chart) = context.charts.iter().find(|chart| chart.name == summary.name) {
            let _ = writeln!(
                html,
                "    <img src=\"{}\" alt=\"{} chart\">",
                escape_html(&chart.src),
                escape_html(&summary.title)
            );
        }
        html.push_str(&summary_table_html(summary));
        let _ = writeln!(html, "  </div>");
    }

    if let Some(dataset) = context.dataset {
        section += 1;
        let _ = writeln!(html, "  <div class=\"section\">");
        let _ = writeln!(html, "    <h2>{section}. Original Survey Dataset</h2>");
        let _ = writeln!(
            html,
            "    <p>You can download the cleaned survey data used in this report below:</p>"
        );
        let _ = writeln!(
            html,
            "    <a download=\"{}\" href=\"data:application/vnd.openxmlformats-officedocument.spreadsheetml.sheet;base64,{}\">Download Excel File</a>",
            escape_html(&dataset.download_name),
            dataset.base64
        );
        let _ = writeln!(html, "  </div>");
    }

    section += 1;
    let _ = writeln!(html, "  <div class=\"section\">");
    let _ = writeln!(html, "    <h2>{section}. Recommendations</h2>");
    let _ = writeln!(html, "    <ul>");
    for (heading, text) in RECOMMENDATIONS {
        let _ = writeln!(html, "      <li><strong>{heading}:</strong> {text}</li>");
    }
    let _ = writeln!(html, "    </ul>");
    let _ = writeln!(html, "  </div>");

    let _ = writeln!(
        html,
        "  <footer>Generated {} (run {}). All visualizations and conclusions are based on survey responses.</footer>",
        context.generated_at.format("%Y-%m-%d %H:%M UTC"),
        context.run_id
    );
    let _ = writeln!(html, "</body>");
    let _ = writeln!(html, "</html>");

    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssociationOutcome, AssociationTest, SummaryRow};

    fn findings() -> SurveyFindings {
        SurveyFindings {
            respondents: 100,
            awareness_pct: "60.0".to_string(),
            summaries: vec![SummaryTable {
                name: "awareness".to_string(),
                title: "Overall Awareness".to_string(),
                keys: vec!["Awareness".to_string()],
                rows: vec![
                    SummaryRow {
                        keys: vec![Some("No".to_string())],
                        count: 40,
                    },
                    SummaryRow {
                        keys: vec![Some("Yes".to_string())],
                        count: 60,
                    },
                ],
            }],
            associations: vec![AssociationTest {
                left: "Training".to_string(),
                right: "Know_Whom".to_string(),
                outcome: AssociationOutcome::NoData,
            }],
        }
    }

    fn context<'a>(
        findings: &'a SurveyFindings,
        charts: &'a [ChartLink],
        dataset: Option<&'a EmbeddedDataset>,
    ) -> ReportContext<'a> {
        ReportContext {
            title: "Survey <Report>",
            findings,
            charts,
            dataset,
            run_id: Uuid::nil(),
            generated_at: DateTime::from_timestamp(0, 0).unwrap(),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b>\"Tom\" & 'Jerry'</b>"),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn summary_table_lists_keys_then_count() {
        let html = summary_table_html(&findings().summaries[0]);
        assert!(html.contains("<tr><th>Awareness</th><th>Count</th></tr>"));
        assert!(html.contains("<tr><td>Yes</td><td>60</td></tr>"));
    }

    #[test]
    fn text_table_aligns_columns() {
        let text = summary_table_text(&findings().summaries[0]);
        assert_eq!(text, "Awareness  Count\nNo         40\nYes        60\n");
    }

    #[test]
    fn executive_summary_reports_percentage_and_tests() {
        let lines = executive_summary(&findings());
        assert_eq!(
            lines[0],
            "Out of 100 respondents, 60.0% reported being fully aware of what constitutes workplace harassment."
        );
        assert!(lines[1].contains("No data available"));
    }

    #[test]
    fn html_has_fixed_section_order() {
        let findings = findings();
        let charts = vec![ChartLink {
            name: "awareness".to_string(),
            src: "charts/awareness.svg".to_string(),
        }];
        let dataset = EmbeddedDataset {
            download_name: "SurveyData.xlsx".to_string(),
            base64: "UEsDBA==".to_string(),
        };
        let html = build_html(&context(&findings, &charts, Some(&dataset)));

        assert!(html.contains("<title>Survey &lt;Report&gt;</title>"));
        assert!(html.contains("<strong>60.0%</strong>"));
        assert!(html.contains("<img src=\"charts/awareness.svg\""));
        assert!(html.contains("base64,UEsDBA==\">Download Excel File</a>"));

        let summary = html.find("1. Executive Summary").unwrap();
        let awareness = html.find("2. Overall Awareness").unwrap();
        let download = html.find("3. Original Survey Dataset").unwrap();
        let recommendations = html.find("4. Recommendations").unwrap();
        assert!(summary < awareness && awareness < download && download < recommendations);
    }

    #[test]
    fn html_without_dataset_skips_download_section() {
        let findings = findings();
        let html = build_html(&context(&findings, &[], None));
        assert!(!html.contains("Download Excel File"));
        assert!(html.contains("3. Recommendations"));
        assert!(!html.contains("<img"));
    }
}
