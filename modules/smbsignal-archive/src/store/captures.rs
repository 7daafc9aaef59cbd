use chrono::{DateTime, Utc};
use smbsignal_common::{capture_identity, Capture, KeywordKind};

use super::SignalStore;
use crate::error::{ArchiveError, Result};

/// Parameters for inserting a new capture. The identity and fetch time are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewCapture {
    pub url: String,
    pub domain: String,
    pub content_date: Option<String>,
    pub title: Option<String>,
    pub raw_text: String,
    pub raw_markup: Option<String>,
    pub query: Option<String>,
    pub query_type: Option<KeywordKind>,
    pub query_log_id: Option<i64>,
    pub http_status: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct CaptureRow {
    id: i64,
    identity: String,
    url: String,
    domain: String,
    fetched_at: DateTime<Utc>,
    content_date: Option<String>,
    title: Option<String>,
    raw_text: String,
    raw_markup: Option<String>,
    query: Option<String>,
    query_type: Option<String>,
    query_log_id: Option<i64>,
    http_status: Option<i64>,
}

impl TryFrom<CaptureRow> for Capture {
    type Error = ArchiveError;

    fn try_from(row: CaptureRow) -> Result<Self> {
        let query_type = match row.query_type.as_deref() {
            None => None,
            Some(s) => Some(KeywordKind::parse(s).ok_or_else(|| {
                ArchiveError::CorruptRow(format!("capture {}: query_type '{s}'", row.id))
            })?),
        };
        Ok(Capture {
            id: row.id,
            identity: row.identity,
            url: row.url,
            domain: row.domain,
            fetched_at: row.fetched_at,
            content_date: row.content_date,
            title: row.title,
            raw_text: row.raw_text,
            raw_markup: row.raw_markup,
            query: row.query,
            query_type,
            query_log_id: row.query_log_id,
            http_status: row.http_status,
        })
    }
}

impl SignalStore {
    /// Store a capture. Returns its identity, or `None` when a capture with the
    /// same identity already exists (a duplicate, not an error).
    pub async fn insert_capture(&self, c: &NewCapture) -> Result<Option<String>> {
        let identity = capture_identity(&c.url, &c.raw_text);

        let result = sqlx::query(
            r#"
            INSERT INTO captures
                (identity, url, domain, fetched_at, content_date, title,
                 raw_text, raw_markup, query, query_type, query_log_id, http_status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity) DO NOTHING
            "#,
        )
        .bind(&identity)
        .bind(&c.url)
        .bind(&c.domain)
        .bind(Utc::now())
        .bind(&c.content_date)
        .bind(&c.title)
        .bind(&c.raw_text)
        .bind(&c.raw_markup)
        .bind(&c.query)
        .bind(c.query_type.map(|k| k.as_str()))
        .bind(c.query_log_id)
        .bind(c.http_status)
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() > 0).then_some(identity))
    }

    /// Whether any capture was already stored for this URL.
    pub async fn url_exists(&self, url: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM captures WHERE url = ? LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn capture(&self, identity: &str) -> Result<Option<Capture>> {
        let row = sqlx::query_as::<_, CaptureRow>("SELECT * FROM captures WHERE identity = ?")
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Capture::try_from).transpose()
    }

    pub async fn capture_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM captures")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Captures never handed to the extraction collaborator, newest first.
    pub async fn captures_pending_extraction(
        &self,
        min_text_chars: i64,
        limit: i64,
    ) -> Result<Vec<Capture>> {
        let rows = sqlx::query_as::<_, CaptureRow>(
            r#"
            SELECT c.* FROM captures c
            LEFT JOIN extractions e ON e.capture_identity = c.identity
            WHERE e.id IS NULL
              AND length(c.raw_text) > ?
            ORDER BY c.fetched_at DESC
            LIMIT ?
            "#,
        )
        .bind(min_text_chars)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Capture::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(url: &str, text: &str) -> NewCapture {
        NewCapture {
            url: url.to_string(),
            domain: smbsignal_common::domain_of(url),
            content_date: None,
            title: Some("Forumtråd".to_string()),
            raw_text: text.to_string(),
            raw_markup: None,
            query: Some("fakturering småföretag".to_string()),
            query_type: Some(KeywordKind::Core),
            query_log_id: None,
            http_status: Some(200),
        }
    }

    #[tokio::test]
    async fn identical_leading_text_is_a_duplicate() {
        let store = SignalStore::in_memory().await.unwrap();
        let body = "Vi har problem med fakturering. ".repeat(30);

        let first = store.insert_capture(&capture("https://www.example.se/a", &body)).await.unwrap();
        assert!(first.is_some());

        // Differs only after the hashed prefix.
        let tail_changed = format!("{body} och mer text längre ner");
        let second = store
            .insert_capture(&capture("https://www.example.se/a", &tail_changed))
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.capture_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_url_with_new_text_is_stored() {
        let store = SignalStore::in_memory().await.unwrap();
        let a = store
            .insert_capture(&capture("https://forum.example.se/t/1", "Första versionen av sidan"))
            .await
            .unwrap();
        let b = store
            .insert_capture(&capture("https://forum.example.se/t/1", "Helt annan text efter uppdatering"))
            .await
            .unwrap();

        assert!(a.is_some() && b.is_some());
        assert_ne!(a, b);
        assert!(store.url_exists("https://forum.example.se/t/1").await.unwrap());

        let stored = store.capture(&a.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.domain, "forum.example.se");
        assert_eq!(stored.query_type, Some(KeywordKind::Core));
    }

    #[tokio::test]
    async fn pending_extraction_skips_short_and_processed_captures() {
        let store = SignalStore::in_memory().await.unwrap();
        let long = "Lång text om administration och pappersarbete. ".repeat(5);
        let id = store
            .insert_capture(&capture("https://example.se/long", &long))
            .await
            .unwrap()
            .unwrap();
        store.insert_capture(&capture("https://example.se/short", "kort")).await.unwrap();

        let pending = store.captures_pending_extraction(100, 50).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].identity, id);

        assert!(store.record_extraction(&id, &[]).await.unwrap());
        assert!(store.captures_pending_extraction(100, 50).await.unwrap().is_empty());
    }
}
