use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::warn;

use crate::loader::{require_column, LoadError};
use crate::models::{AssociationOutcome, AssociationTest, SurveyTable};

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error(transparent)]
    Column(#[from] LoadError),
    #[error("chi-squared distribution unavailable: {0}")]
    Distribution(String),
}

/// Cross-tabulation of two columns over rows where both answers are present.
/// Labels are sorted so the table is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contingency {
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub counts: Vec<Vec<u64>>,
}

impl Contingency {
    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    fn row_totals(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    fn col_totals(&self) -> Vec<u64> {
        (0..self.col_labels.len())
            .map(|col| self.counts.iter().map(|row| row[col]).sum())
            .collect()
    }
}

pub fn crosstab(table: &SurveyTable, left: &str, right: &str) -> Result<Contingency, LoadError> {
    let left_index = require_column(table, left)?;
    let right_index = require_column(table, right)?;

    let pairs: Vec<(&str, &str)> = table
        .rows
        .iter()
        .filter_map(|row| match (&row[left_index], &row[right_index]) {
            (Some(a), Some(b)) => Some((a.as_str(), b.as_str())),
            _ => None,
        })
        .collect();

    let mut row_labels: Vec<String> = pairs.iter().map(|(a, _)| a.to_string()).collect();
    row_labels.sort();
    row_labels.dedup();
    let mut col_labels: Vec<String> = pairs.iter().map(|(_, b)| b.to_string()).collect();
    col_labels.sort();
    col_labels.dedup();

    let mut counts = vec![vec![0u64; col_labels.len()]; row_labels.len()];
    for (a, b) in pairs {
        let (Ok(r), Ok(c)) = (
            row_labels.binary_search_by(|label| label.as_str().cmp(a)),
            col_labels.binary_search_by(|label| label.as_str().cmp(b)),
        ) else {
            continue;
        };
        counts[r][c] += 1;
    }

    Ok(Contingency {
        row_labels,
        col_labels,
        counts,
    })
}

/// Pearson chi-square test of independence. Uses the Yates continuity
/// correction when there is a single degree of freedom.
pub fn chi_square(contingency: &Contingency) -> Result<AssociationOutcome, StatsError> {
    let rows = contingency.row_labels.len();
    let cols = contingency.col_labels.len();
    if rows < 2 || cols < 2 {
        return Ok(AssociationOutcome::NoData);
    }

    let total = contingency.total() as f64;
    let row_totals = contingency.row_totals();
    let col_totals = contingency.col_totals();
    let dof = (rows - 1) * (cols - 1);

    let mut statistic = 0.0;
    for (r, row) in contingency.counts.iter().enumerate() {
        for (c, &observed) in row.iter().enumerate() {
            let expected = row_totals[r] as f64 * col_totals[c] as f64 / total;
            let mut observed = observed as f64;
            if dof == 1 {
                let diff = expected - observed;
                observed += diff.signum() * diff.abs().min(0.5);
            }
            statistic += (observed - expected).powi(2) / expected;
        }
    }

    let distribution = ChiSquared::new(dof as f64)
        .map_err(|err| StatsError::Distribution(err.to_string()))?;

    Ok(AssociationOutcome::Computed {
        statistic,
        p_value: distribution.sf(statistic),
        dof,
    })
}

pub fn association_test(
    table: &SurveyTable,
    left: &str,
    right: &str,
) -> Result<AssociationTest, StatsError> {
    let contingency = crosstab(table, left, right)?;
    let outcome = chi_square(&contingency)?;
    if outcome == AssociationOutcome::NoData {
        warn!(left, right, "contingency table too small for chi-square test");
    }

    Ok(AssociationTest {
        left: left.to_string(),
        right: right.to_string(),
        outcome,
    })
}
