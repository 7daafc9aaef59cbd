use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Implements `as_str` and `parse` for a fieldless enum with fixed wire names.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// --- Keywords ---

/// Core terms are fixed vocabulary; discovery terms evolve through the feedback loop.
/// The same split classifies the queries built from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordKind {
    Core,
    Discovery,
}

wire_enum!(KeywordKind { Core => "core", Discovery => "discovery" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordOrigin {
    /// Present in the keyword file before any feedback ran.
    Initial,
    /// Proposed by the keyword-suggestion collaborator.
    LlmSuggested,
}

wire_enum!(KeywordOrigin { Initial => "initial", LlmSuggested => "llm_suggested" });

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    pub term: String,
    pub kind: KeywordKind,
    pub origin: KeywordOrigin,
    pub usage_count: i64,
    pub success_count: i64,
    /// Always `success_count / usage_count`, recomputed in the same write.
    pub hit_rate: f64,
    pub active: bool,
    pub added_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
}

/// Per-term counters used to weight discovery sampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordPerformance {
    pub usage_count: i64,
    pub hit_rate: f64,
}

// --- Queries ---

/// One query of a run's plan, before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedQuery {
    pub text: String,
    pub kind: KeywordKind,
    /// Name of the site target group the domains came from.
    pub target: String,
    /// Domain allow-list for the backend. Empty means unrestricted.
    pub include_domains: Vec<String>,
    /// Literal keyword-file terms embedded in `text`.
    pub keywords_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub id: i64,
    pub query_text: String,
    pub kind: KeywordKind,
    pub target: String,
    pub include_domains: Vec<String>,
    pub keywords_used: Vec<String>,
    pub result_count: i64,
    pub run_at: DateTime<Utc>,
    /// Set once the query's keywords have been credited with a verified signal.
    pub credited: bool,
}

// --- Captures ---

/// Immutable record of one fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    pub id: i64,
    pub identity: String,
    pub url: String,
    pub domain: String,
    pub fetched_at: DateTime<Utc>,
    pub content_date: Option<String>,
    pub title: Option<String>,
    pub raw_text: String,
    pub raw_markup: Option<String>,
    pub query: Option<String>,
    pub query_type: Option<KeywordKind>,
    pub query_log_id: Option<i64>,
    pub http_status: Option<i64>,
}

// --- Candidate records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    JobPosting,
    SocialPost,
    NewsMention,
    ForumPost,
    CompanyData,
}

wire_enum!(SignalType {
    JobPosting => "job_posting",
    SocialPost => "social_post",
    NewsMention => "news_mention",
    ForumPost => "forum_post",
    CompanyData => "company_data",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiAwareness {
    UsingAi,
    ExploringAi,
    Skeptical,
    Unaware,
}

wire_enum!(AiAwareness {
    UsingAi => "using_ai",
    ExploringAi => "exploring_ai",
    Skeptical => "skeptical",
    Unaware => "unaware",
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub org_number: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub employee_count: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalContent {
    #[serde(default)]
    pub original_quote: Option<String>,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    #[serde(default)]
    pub expressed_problem: Option<String>,
    #[serde(default)]
    pub expressed_need: Option<String>,
    #[serde(default, deserialize_with = "lenient_awareness")]
    pub ai_awareness: Option<AiAwareness>,
}

/// One structured claim returned by the extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSignal {
    #[serde(default, deserialize_with = "lenient_signal_type")]
    pub signal_type: Option<SignalType>,
    #[serde(default)]
    pub person: PersonInfo,
    #[serde(default)]
    pub company: CompanyInfo,
    #[serde(default)]
    pub content: SignalContent,
}

impl ExtractedSignal {
    /// Structural minimum enforced by the core: a quote or a stated problem.
    pub fn has_substance(&self) -> bool {
        non_blank(&self.content.original_quote) || non_blank(&self.content.expressed_problem)
    }

    /// Company the claim is about: the company block, else the person's employer.
    pub fn company_name(&self) -> Option<&str> {
        self.company
            .name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.person.company.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

fn non_blank(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// A stored candidate, tied to the capture it was extracted from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: i64,
    pub capture_identity: String,
    pub signal: ExtractedSignal,
    pub created_at: DateTime<Utc>,
}

// --- Credibility ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredibilityVerdict {
    Accept,
    /// Not auto-rejected, but the source is not confirmed regional.
    Review,
    Reject,
}

wire_enum!(CredibilityVerdict { Accept => "accept", Review => "review", Reject => "reject" });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredibilityAssessment {
    pub verdict: CredibilityVerdict,
    pub flags: Vec<String>,
    pub is_regional: bool,
    pub reasoning: String,
}

// --- Verification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteCheck {
    Passed,
    Partial,
    Failed,
}

wire_enum!(QuoteCheck { Passed => "passed", Partial => "partial", Failed => "failed" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlCheck {
    Live,
    Redirect,
    Dead,
    Timeout,
}

wire_enum!(UrlCheck { Live => "live", Redirect => "redirect", Dead => "dead", Timeout => "timeout" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Verified,
    Weak,
    Rejected,
}

wire_enum!(FinalStatus { Verified => "verified", Weak => "weak", Rejected => "rejected" });

impl FinalStatus {
    /// Fixed priority: failed quote, then dead URL, reject; partial quote or
    /// timed-out URL is weak; everything else is verified.
    pub fn decide(quote: QuoteCheck, url: UrlCheck) -> Self {
        if quote == QuoteCheck::Failed {
            return Self::Rejected;
        }
        if url == UrlCheck::Dead {
            return Self::Rejected;
        }
        if quote == QuoteCheck::Partial || url == UrlCheck::Timeout {
            return Self::Weak;
        }
        Self::Verified
    }
}

/// Terminal verification outcome. Exactly one per candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub candidate_id: i64,
    pub quote_check: QuoteCheck,
    pub quote_similarity: f64,
    pub url_check: UrlCheck,
    pub company_verified: bool,
    /// Raw registry enrichment payload; `{}` when skipped or not found.
    pub company_data: serde_json::Value,
    pub is_duplicate: bool,
    pub duplicate_of: Option<i64>,
    pub final_status: FinalStatus,
}

// --- Lenient deserializers for collaborator output ---

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_awareness<'de, D>(deserializer: D) -> Result<Option<AiAwareness>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(AiAwareness::parse))
}

fn lenient_signal_type<'de, D>(deserializer: D) -> Result<Option<SignalType>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(SignalType::parse))
}
