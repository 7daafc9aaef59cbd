use chrono::{DateTime, Utc};
use smbsignal_common::{
    AiAwareness, CandidateRecord, CompanyInfo, CredibilityAssessment, CredibilityVerdict,
    ExtractedSignal, FinalStatus, PersonInfo, QuoteCheck, SignalContent, SignalType, UrlCheck,
    VerificationResult,
};
use sqlx::types::Json;

use super::SignalStore;
use crate::error::{ArchiveError, Result};

/// A candidate to store, tied to the capture it was extracted from.
#[derive(Debug, Clone)]
pub struct NewCandidate {
    pub capture_identity: String,
    pub signal: ExtractedSignal,
}

/// A candidate joined with the capture fields the filters need.
#[derive(Debug, Clone)]
pub struct CandidateWithSource {
    pub candidate: CandidateRecord,
    pub url: String,
    pub raw_text: String,
    pub raw_markup: Option<String>,
}

/// Compact view of a verified candidate, for the keyword advisor.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct VerifiedSignalRow {
    pub candidate_id: i64,
    pub original_quote: Option<String>,
    pub expressed_problem: Option<String>,
    pub expressed_need: Option<String>,
    pub company_name: Option<String>,
    pub url: String,
}

#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    id: i64,
    capture_identity: String,
    signal_type: Option<String>,
    person_name: Option<String>,
    person_title: Option<String>,
    person_company: Option<String>,
    company_name: Option<String>,
    company_org_number: Option<String>,
    company_industry: Option<String>,
    company_employee_count: Option<String>,
    original_quote: Option<String>,
    expressed_problem: Option<String>,
    expressed_need: Option<String>,
    ai_awareness: Option<String>,
    topic_tags: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    url: String,
    raw_text: String,
    raw_markup: Option<String>,
}

impl From<CandidateRow> for CandidateWithSource {
    fn from(row: CandidateRow) -> Self {
        // Enum columns are only ever written from parsed values; an unknown
        // value reads back as absent, matching how collaborator output is parsed.
        let signal = ExtractedSignal {
            signal_type: row.signal_type.as_deref().and_then(SignalType::parse),
            person: PersonInfo {
                name: row.person_name,
                title: row.person_title,
                company: row.person_company,
            },
            company: CompanyInfo {
                name: row.company_name,
                org_number: row.company_org_number,
                industry: row.company_industry,
                employee_count: row.company_employee_count,
            },
            content: SignalContent {
                original_quote: row.original_quote,
                topic_tags: row.topic_tags.0,
                expressed_problem: row.expressed_problem,
                expressed_need: row.expressed_need,
                ai_awareness: row.ai_awareness.as_deref().and_then(AiAwareness::parse),
            },
        };
        Self {
            candidate: CandidateRecord {
                id: row.id,
                capture_identity: row.capture_identity,
                signal,
                created_at: row.created_at,
            },
            url: row.url,
            raw_text: row.raw_text,
            raw_markup: row.raw_markup,
        }
    }
}

const CANDIDATE_WITH_SOURCE: &str = r#"
    SELECT s.*, c.url, c.raw_text, c.raw_markup
    FROM candidates s
    JOIN captures c ON c.identity = s.capture_identity
"#;

#[derive(Debug, sqlx::FromRow)]
struct VerificationRow {
    candidate_id: i64,
    quote_check: String,
    quote_similarity: f64,
    url_check: String,
    company_verified: bool,
    company_data: Json<serde_json::Value>,
    is_duplicate: bool,
    duplicate_of: Option<i64>,
    final_status: String,
}

impl TryFrom<VerificationRow> for VerificationResult {
    type Error = ArchiveError;

    fn try_from(row: VerificationRow) -> Result<Self> {
        let corrupt = |field: &str, value: &str| {
            ArchiveError::CorruptRow(format!(
                "verification of candidate {}: {field} '{value}'",
                row.candidate_id
            ))
        };
        Ok(VerificationResult {
            candidate_id: row.candidate_id,
            quote_check: QuoteCheck::parse(&row.quote_check)
                .ok_or_else(|| corrupt("quote_check", &row.quote_check))?,
            quote_similarity: row.quote_similarity,
            url_check: UrlCheck::parse(&row.url_check)
                .ok_or_else(|| corrupt("url_check", &row.url_check))?,
            company_verified: row.company_verified,
            company_data: row.company_data.0,
            is_duplicate: row.is_duplicate,
            duplicate_of: row.duplicate_of,
            final_status: FinalStatus::parse(&row.final_status)
                .ok_or_else(|| corrupt("final_status", &row.final_status))?,
        })
    }
}

impl SignalStore {
    /// Store the candidates extracted from one capture and mark the capture as
    /// processed, in a single transaction. Returns false when the capture was
    /// already processed; nothing is written in that case.
    pub async fn record_extraction(
        &self,
        capture_identity: &str,
        candidates: &[NewCandidate],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let marked = sqlx::query(
            r#"
            INSERT INTO extractions (capture_identity, signals_stored, extracted_at)
            VALUES (?, ?, ?)
            ON CONFLICT(capture_identity) DO NOTHING
            "#,
        )
        .bind(capture_identity)
        .bind(candidates.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for c in candidates {
            let s = &c.signal;
            sqlx::query(
                r#"
                INSERT INTO candidates
                    (capture_identity, signal_type, person_name, person_title, person_company,
                     company_name, company_org_number, company_industry, company_employee_count,
                     original_quote, expressed_problem, expressed_need, ai_awareness,
                     topic_tags, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&c.capture_identity)
            .bind(s.signal_type.map(|t| t.as_str()))
            .bind(&s.person.name)
            .bind(&s.person.title)
            .bind(&s.person.company)
            .bind(&s.company.name)
            .bind(&s.company.org_number)
            .bind(&s.company.industry)
            .bind(&s.company.employee_count)
            .bind(&s.content.original_quote)
            .bind(&s.content.expressed_problem)
            .bind(&s.content.expressed_need)
            .bind(s.content.ai_awareness.map(|a| a.as_str()))
            .bind(Json(&s.content.topic_tags))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Candidates with no credibility verdict yet, oldest first.
    pub async fn candidates_pending_credibility(&self, limit: i64) -> Result<Vec<CandidateWithSource>> {
        let sql = format!(
            "{CANDIDATE_WITH_SOURCE}
             WHERE NOT EXISTS (SELECT 1 FROM credibility_checks k WHERE k.candidate_id = s.id)
             ORDER BY s.id LIMIT ?"
        );
        let rows = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CandidateWithSource::from).collect())
    }

    /// Candidates with a credibility verdict (of any kind) and no
    /// verification result yet, oldest first. Rejected candidates are
    /// included so every candidate ends with exactly one result.
    pub async fn candidates_pending_verification(
        &self,
        limit: i64,
    ) -> Result<Vec<CandidateWithSource>> {
        let sql = format!(
            "{CANDIDATE_WITH_SOURCE}
             WHERE EXISTS (SELECT 1 FROM credibility_checks k WHERE k.candidate_id = s.id)
               AND NOT EXISTS (SELECT 1 FROM verifications v WHERE v.candidate_id = s.id)
             ORDER BY s.id LIMIT ?"
        );
        let rows = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CandidateWithSource::from).collect())
    }

    pub async fn candidates_for_capture(&self, capture_identity: &str) -> Result<Vec<CandidateWithSource>> {
        let sql = format!("{CANDIDATE_WITH_SOURCE} WHERE s.capture_identity = ? ORDER BY s.id");
        let rows = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(capture_identity)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CandidateWithSource::from).collect())
    }

    /// Persist a credibility verdict. Returns false if the candidate already has one.
    pub async fn insert_credibility(
        &self,
        candidate_id: i64,
        assessment: &CredibilityAssessment,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO credibility_checks
                (candidate_id, verdict, flags, is_regional, reasoning, checked_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(candidate_id) DO NOTHING
            "#,
        )
        .bind(candidate_id)
        .bind(assessment.verdict.as_str())
        .bind(Json(&assessment.flags))
        .bind(assessment.is_regional)
        .bind(&assessment.reasoning)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn credibility(&self, candidate_id: i64) -> Result<Option<CredibilityAssessment>> {
        let row = sqlx::query_as::<_, (String, Json<Vec<String>>, bool, String)>(
            "SELECT verdict, flags, is_regional, reasoning FROM credibility_checks WHERE candidate_id = ?",
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(verdict, flags, is_regional, reasoning)| {
            let verdict = CredibilityVerdict::parse(&verdict).ok_or_else(|| {
                ArchiveError::CorruptRow(format!("credibility of {candidate_id}: '{verdict}'"))
            })?;
            Ok(CredibilityAssessment {
                verdict,
                flags: flags.0,
                is_regional,
                reasoning,
            })
        })
        .transpose()
    }

    /// Persist the terminal verification result. Returns false if the
    /// candidate was already verified; the existing result is kept.
    pub async fn insert_verification(&self, v: &VerificationResult) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO verifications
                (candidate_id, quote_check, quote_similarity, url_check, company_verified,
                 company_data, is_duplicate, duplicate_of, final_status, verified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(candidate_id) DO NOTHING
            "#,
        )
        .bind(v.candidate_id)
        .bind(v.quote_check.as_str())
        .bind(v.quote_similarity)
        .bind(v.url_check.as_str())
        .bind(v.company_verified)
        .bind(Json(&v.company_data))
        .bind(v.is_duplicate)
        .bind(v.duplicate_of)
        .bind(v.final_status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn verification(&self, candidate_id: i64) -> Result<Option<VerificationResult>> {
        let row = sqlx::query_as::<_, VerificationRow>(
            r#"
            SELECT candidate_id, quote_check, quote_similarity, url_check, company_verified,
                   company_data, is_duplicate, duplicate_of, final_status
            FROM verifications WHERE candidate_id = ?
            "#,
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(VerificationResult::try_from).transpose()
    }

    /// Quotes of verified candidates sharing the person or the company name
    /// (case-insensitive), created at or after `since`, excluding `exclude_id`.
    /// Newest first.
    pub async fn prior_verified_quotes(
        &self,
        person: Option<&str>,
        company: Option<&str>,
        since: DateTime<Utc>,
        exclude_id: i64,
    ) -> Result<Vec<(i64, String)>> {
        let person = person.and_then(fold_name);
        let company = company.and_then(fold_name);
        if person.is_none() && company.is_none() {
            return Ok(Vec::new());
        }

        // SQLite's lower() only folds ASCII, so names are compared here.
        let rows = sqlx::query_as::<_, (i64, String, Option<String>, Option<String>, Option<String>)>(
            r#"
            SELECT s.id, s.original_quote, s.person_name, s.company_name, s.person_company
            FROM candidates s
            JOIN verifications v ON v.candidate_id = s.id
            WHERE v.final_status = 'verified'
              AND s.created_at >= ?
              AND s.id != ?
              AND s.original_quote IS NOT NULL
            ORDER BY s.created_at DESC, s.id DESC
            "#,
        )
        .bind(since)
        .bind(exclude_id)
        .fetch_all(&self.pool)
        .await?;

        let same = |wanted: &Option<String>, stored: Option<&str>| {
            wanted.is_some() && wanted.as_deref() == stored.and_then(fold_name).as_deref()
        };
        Ok(rows
            .into_iter()
            .filter(|(_, _, person_name, company_name, person_company)| {
                same(&person, person_name.as_deref())
                    || same(&company, company_name.as_deref())
                    || same(&company, person_company.as_deref())
            })
            .map(|(id, quote, ..)| (id, quote))
            .collect())
    }

    /// Most recently verified candidates, newest first.
    pub async fn recent_verified_signals(&self, limit: i64) -> Result<Vec<VerifiedSignalRow>> {
        Ok(sqlx::query_as::<_, VerifiedSignalRow>(
            r#"
            SELECT s.id AS candidate_id, s.original_quote, s.expressed_problem, s.expressed_need,
                   COALESCE(NULLIF(trim(s.company_name), ''), s.person_company) AS company_name,
                   c.url
            FROM candidates s
            JOIN verifications v ON v.candidate_id = s.id
            JOIN captures c ON c.identity = s.capture_identity
            WHERE v.final_status = 'verified'
            ORDER BY v.verified_at DESC, s.id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

/// Trimmed, Unicode-lowercased name; None when blank.
fn fold_name(name: &str) -> Option<String> {
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use smbsignal_common::KeywordKind;

    use super::*;
    use crate::store::NewCapture;

    const QUOTE: &str = "Vi lägger hela helgen på fakturering";

    async fn seed(store: &SignalStore, url: &str, person: &str, company: &str) -> i64 {
        let identity = store
            .insert_capture(&NewCapture {
                url: url.to_string(),
                domain: smbsignal_common::domain_of(url),
                content_date: None,
                title: None,
                raw_text: format!("{url} {QUOTE}"),
                raw_markup: None,
                query: None,
                query_type: Some(KeywordKind::Core),
                query_log_id: None,
                http_status: Some(200),
            })
            .await
            .unwrap()
            .unwrap();
        let signal = ExtractedSignal {
            person: PersonInfo {
                name: Some(person.to_string()),
                ..Default::default()
            },
            company: CompanyInfo {
                name: Some(company.to_string()),
                ..Default::default()
            },
            content: SignalContent {
                original_quote: Some(QUOTE.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        store
            .record_extraction(
                &identity,
                &[NewCandidate {
                    capture_identity: identity.clone(),
                    signal,
                }],
            )
            .await
            .unwrap();
        store.candidates_for_capture(&identity).await.unwrap()[0].candidate.id
    }

    fn verified(candidate_id: i64) -> VerificationResult {
        VerificationResult {
            candidate_id,
            quote_check: QuoteCheck::Passed,
            quote_similarity: 1.0,
            url_check: UrlCheck::Live,
            company_verified: false,
            company_data: serde_json::json!({}),
            is_duplicate: false,
            duplicate_of: None,
            final_status: FinalStatus::Verified,
        }
    }

    fn assessment(verdict: CredibilityVerdict) -> CredibilityAssessment {
        CredibilityAssessment {
            verdict,
            flags: Vec::new(),
            is_regional: true,
            reasoning: String::new(),
        }
    }

    #[tokio::test]
    async fn rejected_candidates_are_still_pending_verification() {
        let store = SignalStore::in_memory().await.unwrap();
        let accepted = seed(&store, "https://forum.example.se/1", "Anna", "Acme AB").await;
        let rejected = seed(&store, "https://forum.example.se/2", "Björn", "Beta AB").await;
        let unchecked = seed(&store, "https://forum.example.se/3", "Cilla", "Gamma AB").await;

        store.insert_credibility(accepted, &assessment(CredibilityVerdict::Accept)).await.unwrap();
        store.insert_credibility(rejected, &assessment(CredibilityVerdict::Reject)).await.unwrap();

        let pending: Vec<i64> = store
            .candidates_pending_verification(10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.candidate.id)
            .collect();
        assert_eq!(pending, vec![accepted, rejected]);
        assert!(!pending.contains(&unchecked));

        store.insert_verification(&verified(rejected)).await.unwrap();
        let pending = store.candidates_pending_verification(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].candidate.id, accepted);
    }

    #[tokio::test]
    async fn prior_quotes_match_company_across_swedish_case() {
        let store = SignalStore::in_memory().await.unwrap();
        let earlier = seed(&store, "https://forum.example.se/4", "Anna", "Åkeri Öst AB").await;
        let later = seed(&store, "https://forum.example.se/5", "Björn", "åkeri öst ab").await;
        store.insert_verification(&verified(earlier)).await.unwrap();

        let since = Utc::now() - Duration::days(7);
        let prior = store
            .prior_verified_quotes(Some("Björn"), Some("åkeri öst ab"), since, later)
            .await
            .unwrap();
        assert_eq!(prior, vec![(earlier, QUOTE.to_string())]);

        let unrelated = store
            .prior_verified_quotes(Some("Björn"), Some("Åkeri Väst AB"), since, later)
            .await
            .unwrap();
        assert!(unrelated.is_empty());
    }

    #[test]
    fn fold_name_handles_swedish_letters() {
        assert_eq!(fold_name("  Åkeri Öst AB "), fold_name("åkeri öst ab"));
        assert_eq!(fold_name("Ärlig Ängel"), Some("ärlig ängel".to_string()));
        assert_eq!(fold_name("   "), None);
    }
}
