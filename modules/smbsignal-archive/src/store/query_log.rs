use chrono::{DateTime, Utc};
use smbsignal_common::{KeywordKind, QueryLogEntry};
use sqlx::types::Json;

use super::SignalStore;
use crate::error::{ArchiveError, Result};

#[derive(Debug, Clone)]
pub struct NewQueryLog<'a> {
    pub query_text: &'a str,
    pub kind: KeywordKind,
    pub target: &'a str,
    pub include_domains: &'a [String],
    pub keywords_used: &'a [String],
    pub result_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct QueryLogRow {
    id: i64,
    query_text: String,
    kind: String,
    target: String,
    include_domains: Json<Vec<String>>,
    keywords_used: Json<Vec<String>>,
    result_count: i64,
    run_at: DateTime<Utc>,
    credited: bool,
}

impl TryFrom<QueryLogRow> for QueryLogEntry {
    type Error = ArchiveError;

    fn try_from(row: QueryLogRow) -> Result<Self> {
        let kind = KeywordKind::parse(&row.kind).ok_or_else(|| {
            ArchiveError::CorruptRow(format!("query_log {}: kind '{}'", row.id, row.kind))
        })?;
        Ok(QueryLogEntry {
            id: row.id,
            query_text: row.query_text,
            kind,
            target: row.target,
            include_domains: row.include_domains.0,
            keywords_used: row.keywords_used.0,
            result_count: row.result_count,
            run_at: row.run_at,
            credited: row.credited,
        })
    }
}

impl SignalStore {
    /// Record an executed query. Returns the log id captures link back to.
    pub async fn log_query(&self, q: &NewQueryLog<'_>) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO query_log
                (query_text, kind, target, include_domains, keywords_used, result_count, run_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(q.query_text)
        .bind(q.kind.as_str())
        .bind(q.target)
        .bind(Json(q.include_domains))
        .bind(Json(q.keywords_used))
        .bind(q.result_count)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Distinct query texts executed at or after `since`.
    pub async fn recent_query_texts(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT query_text FROM query_log WHERE run_at >= ?",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn query_log_entry(&self, id: i64) -> Result<Option<QueryLogEntry>> {
        let row = sqlx::query_as::<_, QueryLogRow>("SELECT * FROM query_log WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(QueryLogEntry::try_from).transpose()
    }

    /// Uncredited query executions that produced at least one verified candidate.
    pub async fn uncredited_queries_with_verified(&self) -> Result<Vec<QueryLogEntry>> {
        let rows = sqlx::query_as::<_, QueryLogRow>(
            r#"
            SELECT q.* FROM query_log q
            WHERE q.credited = 0
              AND EXISTS (
                SELECT 1 FROM captures c
                JOIN candidates s ON s.capture_identity = c.identity
                JOIN verifications v ON v.candidate_id = s.id
                WHERE c.query_log_id = q.id
                  AND v.final_status = 'verified'
              )
            ORDER BY q.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(QueryLogEntry::try_from).collect()
    }
}
