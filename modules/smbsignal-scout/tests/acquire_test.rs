//! Acquisition against mock search and fetch backends.

mod harness;

use std::collections::HashSet;

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use smbsignal_archive::{PageFetchError, SearchResult};
use smbsignal_common::{KeywordKind, PlannedQuery, SmbSignalError};
use smbsignal_scout::acquire::Acquirer;
use smbsignal_scout::pacing::Pacing;
use smbsignal_scout::testing::{html_page, MockPageFetcher, MockSearcher};
use smbsignal_scout::workflows::ScoutDeps;

use harness::{searcher, TestContext};

const FORUM_URL: &str = "https://www.foretagarforum.se/trad/123";

fn forum_fetcher() -> MockPageFetcher {
    MockPageFetcher::new().on_html(
        FORUM_URL,
        &html_page(
            "Fakturering tar hela helgen",
            "Vi har problem med fakturering och det tar hela helgen varje månad.",
        ),
    )
}

fn forum_results() -> Vec<SearchResult> {
    vec![
        SearchResult::new(FORUM_URL, "Fakturering tar hela helgen", "Vi har problem..."),
        SearchResult::new("https://www.youtube.com/watch?v=abc", "Video", "..."),
    ]
}

async fn logged_query_texts(ctx: &TestContext) -> Vec<String> {
    ctx.store
        .recent_query_texts(Utc::now() - Duration::days(1))
        .await
        .unwrap()
}

#[tokio::test]
async fn acquire_stores_new_pages_once() {
    let ctx = TestContext::new(4, 0.5).await;
    let deps = ScoutDeps {
        searcher: searcher(MockSearcher::new().on_any_query(forum_results())),
        fetcher: Box::new(forum_fetcher()),
        ..ctx.deps()
    };

    let stats = deps.acquire(&mut StdRng::seed_from_u64(7)).await.unwrap();

    assert_eq!(stats.queries_run, 4);
    assert_eq!(stats.skipped_domains, 4);
    assert_eq!(stats.pages_stored, 1);
    assert_eq!(stats.known_urls, 3);
    assert_eq!(ctx.store.capture_count().await.unwrap(), 1);

    assert!(ctx.store.url_exists(FORUM_URL).await.unwrap());
    let texts = logged_query_texts(&ctx).await;
    assert_eq!(texts.len(), 4, "query texts must be unique within a run");

    let logs: Vec<_> = std::fs::read_dir(ctx.dir.path().join("data/logs"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert!(logs.iter().any(|name| name.starts_with("crawl_stats_")));
}

#[tokio::test]
async fn acquire_counts_keyword_uses() {
    let ctx = TestContext::new(4, 0.5).await;
    let deps = ScoutDeps {
        searcher: searcher(MockSearcher::new().on_any_query(forum_results())),
        fetcher: Box::new(forum_fetcher()),
        ..ctx.deps()
    };
    deps.acquire(&mut StdRng::seed_from_u64(11)).await.unwrap();

    let total_uses: i64 = ctx
        .store
        .active_keywords()
        .await
        .unwrap()
        .iter()
        .map(|k| k.usage_count)
        .sum();
    assert!(total_uses >= 4, "every executed query embeds at least one keyword");

    for keyword in ctx.store.active_keywords().await.unwrap() {
        assert_eq!(keyword.success_count, 0);
        assert_eq!(keyword.hit_rate, 0.0);
    }
}

#[tokio::test]
async fn second_run_skips_queries_in_cooldown() {
    let ctx = TestContext::new(4, 0.5).await;

    let first = ScoutDeps {
        searcher: searcher(MockSearcher::new()),
        ..ctx.deps()
    };
    let first_stats = first.acquire(&mut StdRng::seed_from_u64(1)).await.unwrap();
    let first_texts: HashSet<String> = logged_query_texts(&ctx).await.into_iter().collect();

    let second = ScoutDeps {
        searcher: searcher(MockSearcher::new()),
        ..ctx.deps()
    };
    let second_stats = second.acquire(&mut StdRng::seed_from_u64(1)).await.unwrap();
    let all_texts = logged_query_texts(&ctx).await;

    assert_eq!(first_stats.queries_run, 4);
    assert_eq!(second_stats.queries_run, 4);
    assert_eq!(first_texts.len(), 4);
    // Distinct texts across both runs: nothing from the first run was reissued.
    assert_eq!(all_texts.len(), 8);
}

#[tokio::test]
async fn invalid_keyword_file_fails_before_any_search() {
    let ctx = TestContext::new(0, 0.5).await;

    let err = ctx
        .deps()
        .acquire(&mut StdRng::seed_from_u64(3))
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SmbSignalError>(),
        Some(SmbSignalError::Validation(_))
    ));
    assert!(logged_query_texts(&ctx).await.is_empty());
}

#[tokio::test]
async fn missing_search_backend_is_a_config_error() {
    let ctx = TestContext::new(4, 0.5).await;
    let deps = ScoutDeps {
        searcher: None,
        ..ctx.deps()
    };

    let err = deps.acquire(&mut StdRng::seed_from_u64(3)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SmbSignalError>(),
        Some(SmbSignalError::Config(_))
    ));
}

fn planned(text: &str) -> PlannedQuery {
    PlannedQuery {
        text: text.to_string(),
        kind: KeywordKind::Discovery,
        target: "open_web".to_string(),
        include_domains: Vec::new(),
        keywords_used: vec!["kvittohantering".to_string()],
    }
}

#[tokio::test]
async fn failed_searches_are_not_logged_and_fetch_failures_are_counted() {
    let ctx = TestContext::new(4, 0.5).await;
    let searcher = MockSearcher::new()
        .failing("kvittohantering företag")
        .on_query(
            "kvittohantering småföretag",
            vec![
                SearchResult::new("https://a.se/sida", "A", ""),
                SearchResult::new("https://b.se/sida", "B", ""),
                SearchResult::new("https://c.se/sida", "C", ""),
            ],
        );
    let fetcher = MockPageFetcher::new()
        .on_error("https://a.se/sida", PageFetchError::Transient("timed out".into()))
        .on_error("https://b.se/sida", PageFetchError::TooShort(12));

    let queries = vec![planned("kvittohantering företag"), planned("kvittohantering småföretag")];
    let stats = Acquirer::new(&ctx.store, &searcher, &fetcher, Pacing::none())
        .run(&queries, &mut StdRng::seed_from_u64(5))
        .await
        .unwrap();

    assert_eq!(searcher.calls(), vec!["kvittohantering företag", "kvittohantering småföretag"]);
    assert_eq!(stats.search_errors, 1);
    assert_eq!(stats.queries_run, 1);
    assert_eq!(stats.transient_errors, 1);
    assert_eq!(stats.content_errors, 1);
    assert_eq!(stats.http_errors, 1);
    assert_eq!(stats.pages_stored, 0);
    assert_eq!(fetcher.calls().len(), 3);

    assert_eq!(logged_query_texts(&ctx).await, vec!["kvittohantering småföretag"]);
}
