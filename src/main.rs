//! CLI entry point: load a survey, summarize it, or build the full report.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use survey_report::config::{self, ChartStyle, NullPolicy, OutputFormat, PipelineConfig};
use survey_report::pipeline::Pipeline;
use survey_report::{db, loader, report, telemetry};

#[derive(Parser)]
#[command(name = "survey-report")]
#[command(about = "Aggregate survey spreadsheets into charts and reports", long_about = None)]
struct Cli {
    /// SQLite file the survey table is written to (defaults to SURVEY_DATABASE or survey.db)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(flatten)]
    columns: ColumnArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Normalized column names of the questions the reports group by.
#[derive(Args)]
struct ColumnArgs {
    #[arg(long, global = true)]
    awareness_column: Option<String>,
    #[arg(long, global = true)]
    reporting_column: Option<String>,
    #[arg(long, global = true)]
    training_column: Option<String>,
    #[arg(long, global = true)]
    gender_column: Option<String>,
    /// Answer counted as "aware" in the headline percentage
    #[arg(long, global = true)]
    affirmative: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how spreadsheet headers are normalized
    Columns {
        #[arg(long)]
        input: PathBuf,
    },
    /// Load a spreadsheet into the survey table, replacing it
    Load {
        #[arg(long)]
        input: PathBuf,
    },
    /// Print the headline inferences to the console
    Summary {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = NullPolicy::KeepAsGroup)]
        null_policy: NullPolicy,
    },
    /// Run the full pipeline and write charts and reports
    Report {
        #[arg(long)]
        input: PathBuf,
        /// Extra output formats; HTML is always written
        #[arg(long = "format", value_enum)]
        formats: Vec<OutputFormat>,
        #[arg(long, value_enum, default_value_t = NullPolicy::KeepAsGroup)]
        null_policy: NullPolicy,
        #[arg(long, value_enum, default_value_t = ChartStyle::StackedPivot)]
        chart_style: ChartStyle,
        /// Embed the cleaned dataset in the HTML report as a download link
        #[arg(long)]
        embed_dataset: bool,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long)]
        title: Option<String>,
    },
}

impl Cli {
    fn pipeline_config(&self, input: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::new(input);
        if let Some(database) = &self.database {
            config.database = database.clone();
        }

        let columns = &self.columns;
        let overrides = [
            (&columns.awareness_column, &mut config.columns.awareness),
            (&columns.reporting_column, &mut config.columns.reporting),
            (&columns.training_column, &mut config.columns.training),
            (&columns.gender_column, &mut config.columns.gender),
            (&columns.affirmative, &mut config.affirmative),
        ];
        for (value, target) in overrides {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init(&config::log_level_from_env())?;
    let cli = Cli::parse();

    match &cli.command {
        Commands::Columns { input } => {
            let table = loader::load_table(input)
                .with_context(|| format!("failed to load {}", input.display()))?;
            for column in &table.columns {
                println!("{} -> {}", column.original, column.name);
            }
        }
        Commands::Load { input } => {
            let pipeline = Pipeline::new(cli.pipeline_config(input));
            let config = pipeline.config();
            let pool = db::connect(&config.database).await?;
            let table = pipeline.load_into(&pool).await?;
            let stored = db::count_rows(&pool, &config.table_name).await?;
            pool.close().await;
            println!(
                "Loaded {} rows ({} columns) into {} at {}.",
                stored,
                table.columns.len(),
                config.table_name,
                config.database.display()
            );
        }
        Commands::Summary { input, null_policy } => {
            let mut config = cli.pipeline_config(input);
            config.null_policy = *null_policy;
            let pipeline = Pipeline::new(config);

            let pool = db::connect(&pipeline.config().database).await?;
            let table = pipeline.load_into(&pool).await?;
            let findings = pipeline.analyze(&pool, &table).await?;
            pool.close().await;

            println!("=== Survey Inferences ===");
            println!();
            println!("{}", report::awareness_sentence(&findings));
            for summary in &findings.summaries {
                println!();
                println!("{}:", summary.title);
                print!("{}", report::summary_table_text(summary));
            }
            println!();
            for test in &findings.associations {
                println!("{test}");
            }
        }
        Commands::Report {
            input,
            formats,
            null_policy,
            chart_style,
            embed_dataset,
            out_dir,
            title,
        } => {
            let mut config = cli.pipeline_config(input);
            config.formats = formats.clone();
            config.null_policy = *null_policy;
            config.chart_style = *chart_style;
            config.embed_dataset = *embed_dataset;
            config.out_dir = out_dir.clone();
            if let Some(title) = title {
                config.title = title.clone();
            }

            let artifacts = Pipeline::new(config).run().await?;
            println!(
                "Charts saved: {} (run {}).",
                artifacts.charts.len(),
                artifacts.run_id
            );
            for document in &artifacts.documents {
                println!("Report generated: {}", document.display());
            }
        }
    }

    Ok(())
}
