pub mod error;
pub mod fetchers;
mod readability;
pub mod store;
pub mod text_extract;

pub use error::{ArchiveError, Result};
pub use fetchers::page::{
    build_page, FetchedPage, HttpPageFetcher, PageFetchError, PageFetcher, MIN_TEXT_CHARS,
};
pub use fetchers::search::{SearchResult, SerperSearcher, TavilySearcher, WebSearcher};
pub use readability::{cap_markup, cap_text, html_to_text, MAX_MARKUP_CHARS, MAX_TEXT_CHARS};
pub use store::{
    CandidateWithSource, NewCandidate, NewCapture, NewQueryLog, SignalStore, VerifiedSignalRow,
};
