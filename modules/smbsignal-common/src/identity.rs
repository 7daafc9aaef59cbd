//! Content-addressed identity for captures.

use sha2::{Digest, Sha256};

/// Number of leading characters of the page text that participate in the identity.
pub const IDENTITY_PREFIX_CHARS: usize = 500;

/// Hex length of a capture identity.
const IDENTITY_HEX_LEN: usize = 16;

/// Identity of a capture: sha256 over `url|<first 500 chars of text>`, truncated
/// to 16 hex characters. Two fetches of the same URL with the same leading text
/// collide by construction; materially different text yields a new identity.
pub fn capture_identity(url: &str, text: &str) -> String {
    let prefix: String = text.chars().take(IDENTITY_PREFIX_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"|");
    hasher.update(prefix.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..IDENTITY_HEX_LEN].to_string()
}

/// Lowercased host of a URL with any leading `www.` removed.
/// Returns an empty string for unparseable URLs.
pub fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .map(|h| h.strip_prefix("www.").map(str::to_string).unwrap_or(h))
        .unwrap_or_default()
}
