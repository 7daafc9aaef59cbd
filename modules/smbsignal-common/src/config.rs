use std::env;
use std::path::PathBuf;

use tracing::info;

use crate::error::SmbSignalError;

/// Which search provider backs the source acquirer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackendKind {
    Tavily,
    Serper,
}

/// Which company registry the verifier consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    None,
    Allabolag,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub keywords_path: PathBuf,
    pub data_dir: PathBuf,

    // Search
    pub search_backend: SearchBackendKind,
    pub tavily_api_key: String,
    pub serper_api_key: String,

    // External collaborators
    pub extractor_url: Option<String>,
    pub keyword_advisor_url: Option<String>,
    pub registry: RegistryKind,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, SmbSignalError> {
        let search_backend = match optional_env("SEARCH_BACKEND").as_deref() {
            None | Some("tavily") => SearchBackendKind::Tavily,
            Some("serper") => SearchBackendKind::Serper,
            Some(other) => {
                return Err(SmbSignalError::Config(format!(
                    "SEARCH_BACKEND must be 'tavily' or 'serper', got '{other}'"
                )))
            }
        };

        let registry = match optional_env("REGISTRY_LOOKUP").as_deref() {
            None | Some("none") => RegistryKind::None,
            Some("allabolag") => RegistryKind::Allabolag,
            Some(other) => {
                return Err(SmbSignalError::Config(format!(
                    "REGISTRY_LOOKUP must be 'none' or 'allabolag', got '{other}'"
                )))
            }
        };

        Ok(Self {
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/intel.db?mode=rwc".to_string()),
            keywords_path: optional_env("KEYWORDS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/keywords.json")),
            data_dir: optional_env("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            search_backend,
            tavily_api_key: optional_env("TAVILY_API_KEY").unwrap_or_default(),
            serper_api_key: optional_env("SERPER_API_KEY").unwrap_or_default(),
            extractor_url: optional_env("EXTRACTOR_URL"),
            keyword_advisor_url: optional_env("KEYWORD_ADVISOR_URL"),
            registry,
        })
    }

    /// Credential required by the configured search backend.
    /// Checked before any network activity when a run needs to search.
    pub fn require_search_credentials(&self) -> Result<&str, SmbSignalError> {
        let (name, key) = match self.search_backend {
            SearchBackendKind::Tavily => ("TAVILY_API_KEY", &self.tavily_api_key),
            SearchBackendKind::Serper => ("SERPER_API_KEY", &self.serper_api_key),
        };
        if key.is_empty() {
            return Err(SmbSignalError::Config(format!(
                "{name} environment variable is required for the configured search backend"
            )));
        }
        Ok(key)
    }

    /// Log which settings are present without printing secrets.
    pub fn log_redacted(&self) {
        info!(
            database_url = %self.database_url,
            keywords_path = %self.keywords_path.display(),
            data_dir = %self.data_dir.display(),
            search_backend = ?self.search_backend,
            tavily_key = redact(&self.tavily_api_key),
            serper_key = redact(&self.serper_api_key),
            extractor = self.extractor_url.is_some(),
            keyword_advisor = self.keyword_advisor_url.is_some(),
            registry = ?self.registry,
            "Configuration loaded"
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "missing"
    } else {
        "set"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            database_url: "sqlite::memory:".into(),
            keywords_path: PathBuf::from("config/keywords.json"),
            data_dir: PathBuf::from("data"),
            search_backend: SearchBackendKind::Serper,
            tavily_api_key: String::new(),
            serper_api_key: String::new(),
            extractor_url: None,
            keyword_advisor_url: None,
            registry: RegistryKind::None,
        }
    }

    #[test]
    fn missing_backend_key_is_a_config_error() {
        let config = base();
        assert!(matches!(
            config.require_search_credentials(),
            Err(SmbSignalError::Config(_))
        ));
    }

    #[test]
    fn present_backend_key_is_returned() {
        let mut config = base();
        config.serper_api_key = "abc".into();
        assert_eq!(config.require_search_credentials().unwrap(), "abc");
    }
}
