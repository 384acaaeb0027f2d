use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::aggregate::{self, default_association_pairs, default_specs};
use crate::charts;
use crate::config::{OutputFormat, PipelineConfig};
use crate::db;
use crate::export;
use crate::loader;
use crate::models::{ChartArtifact, SurveyFindings, SurveyTable};
use crate::report::{self, ChartLink, EmbeddedDataset, ReportContext};
use crate::stats;

const AWARENESS_SUMMARY: &str = "awareness";

#[derive(Debug)]
pub struct RunArtifacts {
    pub run_id: Uuid,
    pub findings: SurveyFindings,
    pub charts: Vec<ChartArtifact>,
    pub documents: Vec<PathBuf>,
}

/// load → persist → aggregate → chart → compose, in that order, once.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn load(&self) -> anyhow::Result<SurveyTable> {
        loader::load_table(&self.config.input)
            .with_context(|| format!("failed to load {}", self.config.input.display()))
    }

    pub async fn persist(&self, pool: &SqlitePool, table: &SurveyTable) -> anyhow::Result<usize> {
        db::replace_table(pool, &self.config.table_name, table).await
    }

    pub async fn analyze(
        &self,
        pool: &SqlitePool,
        table: &SurveyTable,
    ) -> anyhow::Result<SurveyFindings> {
        let mut summaries = Vec::new();
        for spec in default_specs(&self.config.columns) {
            let summary = aggregate::summarize(
                pool,
                &self.config.table_name,
                table,
                &spec,
                self.config.null_policy,
            )
            .await
            .with_context(|| format!("failed to summarize {}", spec.name))?;
            summaries.push(summary);
        }

        let mut associations = Vec::new();
        for (left, right) in default_association_pairs(&self.config.columns) {
            associations.push(stats::association_test(table, &left, &right)?);
        }

        let respondents = table.row_count() as i64;
        let awareness_pct = summaries
            .iter()
            .find(|summary| summary.name == AWARENESS_SUMMARY)
            .map(|summary| {
                aggregate::awareness_percentage(summary, &self.config.affirmative, respondents)
            })
            .unwrap_or_else(|| format!("{:.1}", 0.0));

        info!(
            respondents,
            awareness_pct = %awareness_pct,
            summaries = summaries.len(),
            "aggregated survey"
        );

        Ok(SurveyFindings {
            respondents,
            awareness_pct,
            summaries,
            associations,
        })
    }

    pub fn render_charts(&self, findings: &SurveyFindings) -> anyhow::Result<Vec<ChartArtifact>> {
        let charts = charts::render_all(
            &findings.summaries,
            &self.config.chart_path(),
            self.config.chart_style,
        )?;
        info!(charts = charts.len(), dir = %self.config.chart_path().display(), "rendered charts");
        Ok(charts)
    }

    pub fn compose(
        &self,
        table: &SurveyTable,
        findings: &SurveyFindings,
        charts: &[ChartArtifact],
        run_id: Uuid,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let config = &self.config;
        let mut documents = Vec::new();

        let dataset = if config.embed_dataset {
            Some(self.embed_dataset(table)?)
        } else {
            None
        };

        let links: Vec<ChartLink> = charts
            .iter()
            .map(|chart| ChartLink {
                name: chart.name.clone(),
                src: chart_src(&config.chart_dir, &chart.path),
            })
            .collect();

        let html = report::build_html(&ReportContext {
            title: &config.title,
            findings,
            charts: &links,
            dataset: dataset.as_ref(),
            run_id,
            generated_at: Utc::now(),
        });
        let html_path = config.output_path(&config.report_html);
        std::fs::write(&html_path, html)
            .with_context(|| format!("failed to write {}", html_path.display()))?;
        info!(path = %html_path.display(), "wrote HTML report");
        documents.push(html_path);

        if config.wants(OutputFormat::Pdf) {
            let path = config.output_path(&config.report_pdf);
            export::write_pdf(&config.title, findings, &path)?;
            documents.push(path);
        }

        if config.wants(OutputFormat::Docx) {
            let path = config.output_path(&config.report_docx);
            export::write_docx(&config.title, findings, &path)?;
            documents.push(path);
        }

        if config.wants(OutputFormat::Json) {
            let path = config.output_path(&config.summary_json);
            export::write_summary_json(findings, &path)?;
            documents.push(path);
        }

        Ok(documents)
    }

    fn embed_dataset(&self, table: &SurveyTable) -> anyhow::Result<EmbeddedDataset> {
        let path = self.config.output_path(&self.config.embed_file);
        loader::write_cleaned_copy(table, &path)?;
        let bytes = std::fs::read(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        Ok(EmbeddedDataset {
            download_name: self.config.embed_file.clone(),
            base64: STANDARD.encode(bytes),
        })
    }

    /// Loads and persists the survey, returning the table for later stages.
    pub async fn load_into(&self, pool: &SqlitePool) -> anyhow::Result<SurveyTable> {
        let table = self.load()?;
        self.persist(pool, &table).await?;
        Ok(table)
    }

    pub async fn run(&self) -> anyhow::Result<RunArtifacts> {
        let pool = db::connect(&self.config.database).await?;
        let artifacts = self.run_with_pool(&pool).await;
        pool.close().await;
        artifacts
    }

    pub async fn run_with_pool(&self, pool: &SqlitePool) -> anyhow::Result<RunArtifacts> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", run_id = %run_id);

        async move {
            std::fs::create_dir_all(&self.config.out_dir).with_context(|| {
                format!("failed to create {}", self.config.out_dir.display())
            })?;

            let table = self.load_into(pool).await?;
            let findings = self.analyze(pool, &table).await?;
            let charts = self.render_charts(&findings)?;
            let documents = self.compose(&table, &findings, &charts, run_id)?;

            Ok::<_, anyhow::Error>(RunArtifacts {
                run_id,
                findings,
                charts,
                documents,
            })
        }
        .instrument(span)
        .await
    }
}

fn chart_src(chart_dir: &str, path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", chart_dir.trim_end_matches('/'), file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::config::{ChartStyle, NullPolicy};
    use crate::models::SummaryRow;

    const HEADER: &str = "Timestamp,\"Are you aware of what constitutes workplace harassment?\",\
        \"Do you know whom to report workplace harassment incidents to?\",\
        \"Have you ever received any formal training on workplace harassment policies?\",\
        What is your Gender?";

    /// 100 respondents, 60 of whom answer "Yes" to the awareness question.
    fn write_survey(dir: &Path) -> PathBuf {
        let path = dir.join("responses.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for index in 0..100 {
            let aware = if index < 60 { "Yes" } else { "No" };
            let report = if index % 3 == 0 { "No" } else { "Yes" };
            let training = if index % 2 == 0 { "Yes" } else { "No" };
            let gender = if index % 5 < 2 { "Female" } else { "Male" };
            writeln!(file, "2024-05-01 10:{:02},{aware},{report},{training},{gender}", index % 60)
                .unwrap();
        }
        path
    }

    fn config(dir: &Path, input: PathBuf) -> PipelineConfig {
        let mut config = PipelineConfig::new(input);
        config.database = dir.join("survey.db");
        config.out_dir = dir.join("out");
        config
    }

    #[test]
    fn chart_src_is_relative_to_report() {
        assert_eq!(
            chart_src("charts/", Path::new("/tmp/out/charts/awareness.svg")),
            "charts/awareness.svg"
        );
    }

    #[tokio::test]
    async fn end_to_end_reports_sixty_percent_awareness() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_survey(dir.path());
        let mut config = config(dir.path(), input);
        config.formats = vec![OutputFormat::Pdf, OutputFormat::Docx, OutputFormat::Json];
        config.embed_dataset = true;

        let pipeline = Pipeline::new(config);
        let artifacts = pipeline.run().await.unwrap();

        assert_eq!(artifacts.findings.respondents, 100);
        assert_eq!(artifacts.findings.awareness_pct, "60.0");
        assert_eq!(
            artifacts.findings.summaries[0].rows,
            vec![
                SummaryRow {
                    keys: vec![Some("No".to_string())],
                    count: 40
                },
                SummaryRow {
                    keys: vec![Some("Yes".to_string())],
                    count: 60
                },
            ]
        );
        assert_eq!(artifacts.charts.len(), 4);
        assert_eq!(artifacts.documents.len(), 4);
        assert!(artifacts.documents.iter().all(|path| path.exists()));
        assert_eq!(artifacts.findings.associations.len(), 3);
        assert!(artifacts
            .findings
            .associations
            .iter()
            .all(|test| test.p_value().is_some()));

        let html = std::fs::read_to_string(&artifacts.documents[0]).unwrap();
        assert!(html.contains("<strong>60.0%</strong>"));
        assert!(html.contains("charts/awareness_vs_reporting.svg"));
        assert!(html.contains("Download Excel File"));
        assert!(pipeline.config().output_path("survey_data.xlsx").exists());
    }

    #[tokio::test]
    async fn rerun_gives_identical_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_survey(dir.path());
        let mut config = config(dir.path(), input);
        config.formats = vec![OutputFormat::Json];
        let json_path = config.output_path(&config.summary_json);

        let pipeline = Pipeline::new(config);
        let first = pipeline.run().await.unwrap();
        let first_json = std::fs::read(&json_path).unwrap();
        let second = pipeline.run().await.unwrap();
        let second_json = std::fs::read(&json_path).unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.findings.summaries, second.findings.summaries);
        assert_eq!(first_json, second_json);
    }

    #[tokio::test]
    async fn null_policy_controls_missing_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "t1,Yes,Yes,,Female").unwrap();
        writeln!(file, "t2,No,No,No,").unwrap();
        writeln!(file, "t3,,Yes,Yes,Male").unwrap();
        writeln!(file, "t4,Yes,No,Yes,Male").unwrap();
        drop(file);

        let pool = db::connect_in_memory().await.unwrap();

        let mut keep = config(dir.path(), path.clone());
        keep.null_policy = NullPolicy::KeepAsGroup;
        let keep = Pipeline::new(keep);
        let table = keep.load_into(&pool).await.unwrap();
        let findings = keep.analyze(&pool, &table).await.unwrap();
        assert!(findings.summaries.iter().all(|summary| summary.total() == 4));
        assert_eq!(findings.respondents, 4);
        assert_eq!(findings.awareness_pct, "50.0");

        let mut drop_nulls = config(dir.path(), path);
        drop_nulls.null_policy = NullPolicy::Drop;
        let drop_nulls = Pipeline::new(drop_nulls);
        let findings = drop_nulls.analyze(&pool, &table).await.unwrap();
        let totals: Vec<i64> = findings.summaries.iter().map(|summary| summary.total()).collect();
        assert_eq!(totals, vec![3, 3, 3, 2]);
        assert_eq!(findings.respondents, 4);
        assert_eq!(findings.awareness_pct, "50.0");
    }

    #[tokio::test]
    async fn missing_question_column_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "Department,Tenure\nSales,2\n").unwrap();

        let mut config = config(dir.path(), path);
        config.chart_style = ChartStyle::Grouped;
        let err = Pipeline::new(config).run().await.unwrap_err();
        assert!(format!("{err:#}").contains("is not present in the survey"));
    }

    #[tokio::test]
    async fn missing_input_file_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), dir.path().join("absent.xlsx"));
        let err = Pipeline::new(config).run().await.unwrap_err();
        assert!(format!("{err:#}").contains("survey file not found"));
    }
}
