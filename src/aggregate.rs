use sqlx::SqlitePool;
use tracing::debug;

use crate::config::{NullPolicy, SurveyColumns};
use crate::db::{self, quote_ident};
use crate::loader::require_column;
use crate::models::{SummaryTable, SurveyTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupColumn {
    pub column: String,
    pub alias: String,
}

impl GroupColumn {
    pub fn new(column: &str, alias: &str) -> Self {
        Self {
            column: column.to_string(),
            alias: alias.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub equals: String,
}

/// One group-by/count report over the survey table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub name: String,
    pub title: String,
    pub columns: Vec<GroupColumn>,
    pub filter: Option<Filter>,
}

pub fn default_specs(columns: &SurveyColumns) -> Vec<GroupSpec> {
    vec![
        GroupSpec {
            name: "awareness".to_string(),
            title: "Overall Awareness".to_string(),
            columns: vec![GroupColumn::new(&columns.awareness, "Awareness")],
            filter: None,
        },
        GroupSpec {
            name: "awareness_vs_reporting".to_string(),
            title: "Awareness vs Reporting Knowledge".to_string(),
            columns: vec![
                GroupColumn::new(&columns.awareness, "Awareness"),
                GroupColumn::new(&columns.reporting, "Know_Whom_To_Report"),
            ],
            filter: None,
        },
        GroupSpec {
            name: "training_vs_reporting".to_string(),
            title: "Formal Training vs Reporting Knowledge".to_string(),
            columns: vec![
                GroupColumn::new(&columns.training, "Training"),
                GroupColumn::new(&columns.reporting, "Know_Whom_To_Report"),
            ],
            filter: None,
        },
        GroupSpec {
            name: "gender_awareness".to_string(),
            title: "Gender-based Awareness".to_string(),
            columns: vec![
                GroupColumn::new(&columns.gender, "Gender"),
                GroupColumn::new(&columns.awareness, "Awareness"),
            ],
            filter: None,
        },
    ]
}

/// Column pairs tested for association, in report order.
pub fn default_association_pairs(columns: &SurveyColumns) -> Vec<(String, String)> {
    vec![
        (columns.awareness.clone(), columns.reporting.clone()),
        (columns.training.clone(), columns.reporting.clone()),
        (columns.gender.clone(), columns.awareness.clone()),
    ]
}

/// Builds the SQL for a spec; returns the statement and its bind values.
pub fn build_query(table_name: &str, spec: &GroupSpec, policy: NullPolicy) -> (String, Vec<String>) {
    let keys: Vec<String> = spec
        .columns
        .iter()
        .map(|group| quote_ident(&group.column))
        .collect();
    let select = spec
        .columns
        .iter()
        .zip(&keys)
        .map(|(group, key)| format!("{key} AS {}", quote_ident(&group.alias)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut predicates = Vec::new();
    let mut binds = Vec::new();
    if policy == NullPolicy::Drop {
        predicates.extend(keys.iter().map(|key| format!("{key} IS NOT NULL")));
    }
    if let Some(filter) = &spec.filter {
        predicates.push(format!("{} = ?", quote_ident(&filter.column)));
        binds.push(filter.equals.clone());
    }

    let mut sql = format!(
        "SELECT {select}, COUNT(*) AS \"Count\" FROM {}",
        quote_ident(table_name)
    );
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    let group_by = keys.join(", ");
    sql.push_str(&format!(" GROUP BY {group_by} ORDER BY {group_by}"));

    (sql, binds)
}

pub async fn summarize(
    pool: &SqlitePool,
    table_name: &str,
    schema: &SurveyTable,
    spec: &GroupSpec,
    policy: NullPolicy,
) -> anyhow::Result<SummaryTable> {
    for group in &spec.columns {
        require_column(schema, &group.column)?;
    }
    if let Some(filter) = &spec.filter {
        require_column(schema, &filter.column)?;
    }

    let (sql, binds) = build_query(table_name, spec, policy);
    let rows = db::fetch_group_counts(pool, &sql, &binds, spec.columns.len()).await?;
    debug!(summary = %spec.name, groups = rows.len(), "summarized survey");

    Ok(SummaryTable {
        name: spec.name.clone(),
        title: spec.title.clone(),
        keys: spec.columns.iter().map(|group| group.alias.clone()).collect(),
        rows,
    })
}

/// Share of all `respondents` answering `affirmative` in a one-key summary,
/// formatted to one decimal place.
pub fn awareness_percentage(
    summary: &SummaryTable,
    affirmative: &str,
    respondents: i64,
) -> String {
    if respondents <= 0 {
        return format!("{:.1}", 0.0);
    }

    let yes: i64 = summary
        .rows
        .iter()
        .filter(|row| row.keys.first().and_then(|key| key.as_deref()) == Some(affirmative))
        .map(|row| row.count)
        .sum();

    format!("{:.1}", yes as f64 / respondents as f64 * 100.0)
}
