use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::models::{SummaryRow, SurveyTable};

pub async fn connect(path: &Path) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open SQLite store at {}", path.display()))
}

/// Private in-memory store; a single connection keeps the database alive.
pub async fn connect_in_memory() -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Drops and recreates `table_name` from the survey, all columns as TEXT.
pub async fn replace_table(
    pool: &SqlitePool,
    table_name: &str,
    table: &SurveyTable,
) -> anyhow::Result<usize> {
    let table_ident = quote_ident(table_name);
    let column_defs = table
        .column_names()
        .map(|name| format!("{} TEXT", quote_ident(name)))
        .collect::<Vec<_>>()
        .join(", ");
    let column_list = table
        .column_names()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; table.columns.len()].join(", ");
    let insert_sql = format!("INSERT INTO {table_ident} ({column_list}) VALUES ({placeholders})");

    let mut tx = pool.begin().await?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {table_ident}"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("CREATE TABLE {table_ident} ({column_defs})"))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to create table {table_name}"))?;

    let mut inserted = 0usize;
    for row in &table.rows {
        let mut query = sqlx::query(&insert_sql);
        for cell in row {
            query = query.bind(cell.as_deref());
        }
        let result = query.execute(&mut *tx).await?;
        inserted += result.rows_affected() as usize;
    }

    tx.commit().await?;
    info!(table = table_name, rows = inserted, "replaced survey table");
    Ok(inserted)
}

pub async fn count_rows(pool: &SqlitePool, table_name: &str) -> anyhow::Result<i64> {
    let row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM {}", quote_ident(table_name)))
        .fetch_one(pool)
        .await?;
    Ok(row.try_get("total")?)
}

/// Runs a prepared group-by query whose first `key_count` columns are keys
/// and whose last column is the count.
pub async fn fetch_group_counts(
    pool: &SqlitePool,
    sql: &str,
    binds: &[String],
    key_count: usize,
) -> anyhow::Result<Vec<SummaryRow>> {
    debug!(sql, "running summary query");

    let mut query = sqlx::query(sql);
    for value in binds {
        query = query.bind(value.as_str());
    }

    let records = query.fetch_all(pool).await?;
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let mut keys = Vec::with_capacity(key_count);
        for index in 0..key_count {
            keys.push(record.try_get::<Option<String>, _>(index)?);
        }
        rows.push(SummaryRow {
            keys,
            count: record.try_get(key_count)?,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SurveyColumn;

    fn sample_table() -> SurveyTable {
        SurveyTable {
            columns: vec![
                SurveyColumn {
                    original: "Gender?".to_string(),
                    name: "Gender".to_string(),
                },
                SurveyColumn {
                    original: "Aware?".to_string(),
                    name: "Aware".to_string(),
                },
            ],
            rows: vec![
                vec![Some("Female".to_string()), Some("Yes".to_string())],
                vec![Some("Male".to_string()), None],
                vec![Some("Male".to_string()), Some("Yes".to_string())],
            ],
        }
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("survey"), "\"survey\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[tokio::test]
    async fn replace_table_overwrites_previous_contents() {
        let pool = connect_in_memory().await.unwrap();
        let table = sample_table();

        assert_eq!(replace_table(&pool, "survey", &table).await.unwrap(), 3);
        assert_eq!(replace_table(&pool, "survey", &table).await.unwrap(), 3);
        assert_eq!(count_rows(&pool, "survey").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn group_counts_keep_null_keys() {
        let pool = connect_in_memory().await.unwrap();
        replace_table(&pool, "survey", &sample_table()).await.unwrap();

        let rows = fetch_group_counts(
            &pool,
            "SELECT \"Aware\", COUNT(*) FROM \"survey\" GROUP BY \"Aware\" ORDER BY \"Aware\"",
            &[],
            1,
        )
        .await
        .unwrap();

        assert_eq!(
            rows,
            vec![
                SummaryRow {
                    keys: vec![None],
                    count: 1
                },
                SummaryRow {
                    keys: vec![Some("Yes".to_string())],
                    count: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn persists_to_a_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.db");
        let pool = connect(&path).await.unwrap();
        replace_table(&pool, "survey", &sample_table()).await.unwrap();
        pool.close().await;

        let reopened = connect(&path).await.unwrap();
        assert_eq!(count_rows(&reopened, "survey").await.unwrap(), 3);
    }
}
