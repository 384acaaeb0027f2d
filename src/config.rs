use std::env;
use std::path::PathBuf;

use clap::ValueEnum;

pub const DEFAULT_DATABASE: &str = "survey.db";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum OutputFormat {
    Html,
    Pdf,
    Docx,
    /// Summary tables and association tests as JSON.
    Json,
}

/// What to do with rows whose grouped column is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NullPolicy {
    Drop,
    #[default]
    #[value(name = "keep")]
    KeepAsGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ChartStyle {
    Simple,
    #[default]
    #[value(name = "stacked")]
    StackedPivot,
    Grouped,
}

/// Normalized names of the survey questions the fixed reports are built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyColumns {
    pub awareness: String,
    pub reporting: String,
    pub training: String,
    pub gender: String,
}

impl Default for SurveyColumns {
    fn default() -> Self {
        Self {
            awareness: "Are_you_aware_of_what_constitutes_workplace_harassment".to_string(),
            reporting: "Do_you_know_whom_to_report_workplace_harassment_incidents_to".to_string(),
            training: "Have_you_ever_received_any_formal_training_on_workplace_harassment_policies"
                .to_string(),
            gender: "What_is_your_Gender".to_string(),
        }
    }
}

/// Every knob of a pipeline run. Paths under `out_dir` are relative to it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub database: PathBuf,
    pub table_name: String,
    pub out_dir: PathBuf,
    pub chart_dir: String,
    pub report_html: String,
    pub report_pdf: String,
    pub report_docx: String,
    pub summary_json: String,
    pub embed_file: String,
    pub formats: Vec<OutputFormat>,
    pub null_policy: NullPolicy,
    pub chart_style: ChartStyle,
    pub embed_dataset: bool,
    pub columns: SurveyColumns,
    pub affirmative: String,
    pub title: String,
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            database: database_from_env(),
            table_name: "survey".to_string(),
            out_dir: PathBuf::from("."),
            chart_dir: "charts".to_string(),
            report_html: "survey_report.html".to_string(),
            report_pdf: "survey_report.pdf".to_string(),
            report_docx: "executive_summary.docx".to_string(),
            summary_json: "summary_tables.json".to_string(),
            embed_file: "survey_data.xlsx".to_string(),
            formats: vec![OutputFormat::Html],
            null_policy: NullPolicy::default(),
            chart_style: ChartStyle::default(),
            embed_dataset: false,
            columns: SurveyColumns::default(),
            affirmative: "Yes".to_string(),
            title: "Survey Report: Awareness and Effectiveness of Workplace Harassment Policies"
                .to_string(),
        }
    }

    /// HTML is always produced; other formats only when requested.
    pub fn wants(&self, format: OutputFormat) -> bool {
        format == OutputFormat::Html || self.formats.contains(&format)
    }

    pub fn chart_path(&self) -> PathBuf {
        self.out_dir.join(&self.chart_dir)
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.out_dir.join(file_name)
    }
}

pub fn database_from_env() -> PathBuf {
    env::var("SURVEY_DATABASE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE))
}

pub fn log_level_from_env() -> String {
    env::var("SURVEY_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}
