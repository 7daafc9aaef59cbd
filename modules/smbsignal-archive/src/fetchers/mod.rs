/// Outbound collaborators of the acquirer: web search backends and the page fetcher.
/// Each sits behind a trait so runs can inject a backend, and tests a mock.

pub mod page;
pub mod search;
