use std::path::PathBuf;

use serde::Serialize;

/// Label used wherever a missing answer is shown as its own group.
pub const MISSING_LABEL: &str = "(missing)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyColumn {
    pub original: String,
    pub name: String,
}

/// One row per respondent; cells are free-form categorical answers.
#[derive(Debug, Clone, Default)]
pub struct SurveyTable {
    pub columns: Vec<SurveyColumn>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl SurveyTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub keys: Vec<Option<String>>,
    pub count: i64,
}

impl SummaryRow {
    pub fn label(&self, index: usize) -> &str {
        self.keys
            .get(index)
            .and_then(|key| key.as_deref())
            .unwrap_or(MISSING_LABEL)
    }
}

/// Result of grouping the survey by one or two columns and counting rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryTable {
    pub name: String,
    pub title: String,
    pub keys: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn total(&self) -> i64 {
        self.rows.iter().map(|row| row.count).sum()
    }

    /// Header row in display order: group keys first, count last.
    pub fn header(&self) -> Vec<&str> {
        let mut header: Vec<&str> = self.keys.iter().map(String::as_str).collect();
        header.push("Count");
        header
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssociationOutcome {
    Computed {
        statistic: f64,
        p_value: f64,
        dof: usize,
    },
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociationTest {
    pub left: String,
    pub right: String,
    pub outcome: AssociationOutcome,
}

impl AssociationTest {
    pub fn p_value(&self) -> Option<f64> {
        match self.outcome {
            AssociationOutcome::Computed { p_value, .. } => Some(p_value),
            AssociationOutcome::NoData => None,
        }
    }
}

impl std::fmt::Display for AssociationTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chi-square test between '{}' and '{}': ", self.left, self.right)?;
        match self.outcome {
            AssociationOutcome::Computed {
                statistic,
                p_value,
                dof,
            } => write!(f, "χ² = {statistic:.2}, p = {p_value:.4} (dof={dof})"),
            AssociationOutcome::NoData => write!(f, "No data available for chi-square test."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartArtifact {
    pub name: String,
    pub path: PathBuf,
}

/// Everything the composer needs about the survey results.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyFindings {
    pub respondents: i64,
    pub awareness_pct: String,
    pub summaries: Vec<SummaryTable>,
    pub associations: Vec<AssociationTest>,
}
