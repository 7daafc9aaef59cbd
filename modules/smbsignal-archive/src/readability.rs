// HTML → plain text via spider_transformations Readability.

use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

/// Longest cleaned text kept per capture, in characters.
pub const MAX_TEXT_CHARS: usize = 50_000;
/// Longest raw markup kept per capture, in characters.
pub const MAX_MARKUP_CHARS: usize = 100_000;

const TRUNCATION_MARKER: &str = "\n[TRUNCATED]";

/// Strip scripts, styles and navigation chrome and return the main body text,
/// capped at `MAX_TEXT_CHARS`.
pub fn html_to_text(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Text,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    cap_text(&transform_content_input(input, &config))
}

/// Trim and cap text, marking the cut.
pub fn cap_text(text: &str) -> String {
    let text = text.trim();
    match truncate_chars(text, MAX_TEXT_CHARS) {
        Some(head) => format!("{head}{TRUNCATION_MARKER}"),
        None => text.to_string(),
    }
}

/// Cap raw markup without a marker; it is only ever pattern-matched.
pub fn cap_markup(markup: &str) -> String {
    truncate_chars(markup, MAX_MARKUP_CHARS)
        .unwrap_or(markup)
        .to_string()
}

/// Prefix of `s` holding at most `max` characters, or `None` if `s` already fits.
fn truncate_chars(s: &str, max: usize) -> Option<&str> {
    s.char_indices().nth(max).map(|(idx, _)| &s[..idx])
}
