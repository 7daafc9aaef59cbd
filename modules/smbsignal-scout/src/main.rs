use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use smbsignal_archive::{HttpPageFetcher, SerperSearcher, SignalStore, TavilySearcher, WebSearcher};
use smbsignal_common::{Config, RegistryKind, SearchBackendKind};
use smbsignal_scout::credibility::CredibilityRules;
use smbsignal_scout::extraction::{HttpSignalExtractor, SignalExtractor};
use smbsignal_scout::feedback::{HttpKeywordAdvisor, KeywordAdvisor};
use smbsignal_scout::keywords::KeywordStore;
use smbsignal_scout::pacing::Pacing;
use smbsignal_scout::verify::{AllabolagRegistry, CompanyRegistry, HttpUrlProber, NoopRegistry};
use smbsignal_scout::workflows::{ScoutDeps, DEFAULT_BATCH_LIMIT};

#[derive(Parser)]
#[command(name = "smbsignal-scout", about = "Collect and verify small-business signals")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Maximum items per stage in this run
    #[arg(long, global = true, default_value_t = DEFAULT_BATCH_LIMIT)]
    batch_limit: i64,
}

#[derive(Subcommand)]
enum Command {
    /// Generate queries and acquire new captures
    Acquire,
    /// Extract, assess, verify and learn over existing captures
    Process,
    /// Credit successful queries and evolve the keyword pool
    Feedback,
    /// Acquire, then process
    All,
}

impl Command {
    fn needs_search(&self) -> bool {
        matches!(self, Command::Acquire | Command::All)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("smbsignal=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.log_redacted();

    // Configuration problems surface here, before any network call.
    let keywords = KeywordStore::new(&config.keywords_path);
    keywords.load()?;
    let searcher: Option<Box<dyn WebSearcher>> = if cli.command.needs_search() {
        let key = config.require_search_credentials()?;
        let searcher: Box<dyn WebSearcher> = match config.search_backend {
            SearchBackendKind::Tavily => Box::new(TavilySearcher::new(key)?),
            SearchBackendKind::Serper => Box::new(SerperSearcher::new(key)?),
        };
        Some(searcher)
    } else {
        None
    };

    std::fs::create_dir_all(&config.data_dir)?;
    let store = SignalStore::connect(&config.database_url).await?;

    let registry: Box<dyn CompanyRegistry> = match config.registry {
        RegistryKind::None => Box::new(NoopRegistry),
        RegistryKind::Allabolag => Box::new(AllabolagRegistry::new()?),
    };
    let extractor: Option<Box<dyn SignalExtractor>> = match config.extractor_url.as_deref() {
        Some(url) => Some(Box::new(HttpSignalExtractor::new(url)?) as Box<dyn SignalExtractor>),
        None => None,
    };
    let advisor: Option<Box<dyn KeywordAdvisor>> = match config.keyword_advisor_url.as_deref() {
        Some(url) => Some(Box::new(HttpKeywordAdvisor::new(url)?) as Box<dyn KeywordAdvisor>),
        None => None,
    };

    let deps = ScoutDeps {
        store,
        keywords,
        data_dir: config.data_dir.clone(),
        searcher,
        fetcher: Box::new(HttpPageFetcher::new()?),
        prober: Box::new(HttpUrlProber::new()?),
        registry,
        extractor,
        advisor,
        credibility: CredibilityRules::nordic(),
        pacing: Pacing::default(),
        batch_limit: cli.batch_limit,
    };

    let mut rng = StdRng::from_os_rng();
    match cli.command {
        Command::Acquire => {
            let stats = deps.acquire(&mut rng).await?;
            println!("{stats}");
        }
        Command::Process => {
            let stats = deps.process().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Feedback => {
            let stats = deps.feedback().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::All => {
            let stats = deps.run_all(&mut rng).await?;
            println!("{}", stats.acquisition);
            println!("{}", serde_json::to_string_pretty(&stats.processing)?);
        }
    }

    info!("Run complete");
    Ok(())
}
