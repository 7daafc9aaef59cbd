use std::collections::HashMap;

use chrono::{DateTime, Utc};
use smbsignal_common::{Keyword, KeywordKind, KeywordOrigin, KeywordPerformance};

use super::SignalStore;
use crate::error::{ArchiveError, Result};

#[derive(Debug, sqlx::FromRow)]
struct KeywordRow {
    id: i64,
    term: String,
    kind: String,
    origin: String,
    usage_count: i64,
    success_count: i64,
    hit_rate: f64,
    active: bool,
    added_at: DateTime<Utc>,
    retired_at: Option<DateTime<Utc>>,
}

impl TryFrom<KeywordRow> for Keyword {
    type Error = ArchiveError;

    fn try_from(row: KeywordRow) -> Result<Self> {
        let kind = KeywordKind::parse(&row.kind).ok_or_else(|| {
            ArchiveError::CorruptRow(format!("keyword '{}': kind '{}'", row.term, row.kind))
        })?;
        let origin = KeywordOrigin::parse(&row.origin).ok_or_else(|| {
            ArchiveError::CorruptRow(format!("keyword '{}': origin '{}'", row.term, row.origin))
        })?;
        Ok(Keyword {
            id: row.id,
            term: row.term,
            kind,
            origin,
            usage_count: row.usage_count,
            success_count: row.success_count,
            hit_rate: row.hit_rate,
            active: row.active,
            added_at: row.added_at,
            retired_at: row.retired_at,
        })
    }
}

impl SignalStore {
    /// Insert a tracked keyword if the term is unknown. Existing rows keep
    /// their counters. Returns true when a row was created.
    pub async fn ensure_keyword(
        &self,
        term: &str,
        kind: KeywordKind,
        origin: KeywordOrigin,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO keywords (term, kind, origin, added_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(term) DO NOTHING
            "#,
        )
        .bind(term)
        .bind(kind.as_str())
        .bind(origin.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count one execution of a query containing `term`. The hit rate is
    /// recomputed in the same statement, so readers never see stale ratios.
    /// Unknown terms are ignored; returns whether a row was updated.
    pub async fn record_keyword_use(&self, term: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE keywords
            SET usage_count = usage_count + 1,
                hit_rate = CAST(success_count AS REAL) / (usage_count + 1)
            WHERE term = ?
            "#,
        )
        .bind(term)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Credit a query execution that led to a verified signal: flag the log
    /// entry and add one success to each of its keywords, in one transaction.
    /// A query is credited at most once; returns false if it already was.
    pub async fn credit_query_success(&self, query_log_id: i64, terms: &[String]) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let flagged = sqlx::query("UPDATE query_log SET credited = 1 WHERE id = ? AND credited = 0")
            .bind(query_log_id)
            .execute(&mut *tx)
            .await?;
        if flagged.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for term in terms {
            sqlx::query(
                r#"
                UPDATE keywords
                SET success_count = success_count + 1,
                    hit_rate = CAST(success_count + 1 AS REAL) / usage_count
                WHERE term = ? AND usage_count > success_count
                "#,
            )
            .bind(term)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Deactivate a keyword. The row and its counters are kept.
    pub async fn retire_keyword(&self, term: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE keywords SET active = 0, retired_at = ? WHERE term = ? AND active = 1",
        )
        .bind(Utc::now())
        .bind(term)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn keyword(&self, term: &str) -> Result<Option<Keyword>> {
        let row = sqlx::query_as::<_, KeywordRow>("SELECT * FROM keywords WHERE term = ?")
            .bind(term)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Keyword::try_from).transpose()
    }

    pub async fn active_keywords(&self) -> Result<Vec<Keyword>> {
        let rows = sqlx::query_as::<_, KeywordRow>(
            "SELECT * FROM keywords WHERE active = 1 ORDER BY kind, term",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Keyword::try_from).collect()
    }

    /// Counters for every tracked keyword, keyed by term.
    pub async fn keyword_performance(&self) -> Result<HashMap<String, KeywordPerformance>> {
        let rows = sqlx::query_as::<_, (String, i64, f64)>(
            "SELECT term, usage_count, hit_rate FROM keywords",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(term, usage_count, hit_rate)| {
                (term, KeywordPerformance { usage_count, hit_rate })
            })
            .collect())
    }
}
