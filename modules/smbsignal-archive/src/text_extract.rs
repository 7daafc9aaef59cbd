use std::sync::LazyLock;

use regex::Regex;

/// How much leading text is scanned for a publication date.
pub const DATE_SCAN_CHARS: usize = 2_000;

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid regex"));
static WRITTEN_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}\.?\s+(?:jan|feb|mar|apr|maj|may|jun|jul|aug|sep|okt|oct|nov|dec)\w*\.?\s+\d{4})\b")
        .expect("valid regex")
});
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static OG_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta[^>]+property\s*=\s*["']og:title["'][^>]+content\s*=\s*["']([^"']+)["']"#)
        .expect("valid regex")
});

/// Best-effort content date: the first ISO date, else the first written
/// "15 dec 2024" style date, within the leading text window.
pub fn extract_content_date(text: &str) -> Option<String> {
    let window = match text.char_indices().nth(DATE_SCAN_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    };
    [&*ISO_DATE_RE, &*WRITTEN_DATE_RE]
        .iter()
        .find_map(|re| re.captures(window).map(|c| c[1].to_string()))
}

/// Page title from `<title>`, falling back to `og:title`. Whitespace is collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    [&*TITLE_RE, &*OG_TITLE_RE]
        .iter()
        .filter_map(|re| re.captures(html))
        .map(|c| c[1].split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_iso_date() {
        let text = "Publicerad 2024-12-15 av redaktionen";
        assert_eq!(extract_content_date(text).as_deref(), Some("2024-12-15"));
    }

    #[test]
    fn finds_swedish_written_date() {
        let text = "Uppdaterad 3 maj 2024. Småföretagare berättar om sin vardag.";
        assert_eq!(extract_content_date(text).as_deref(), Some("3 maj 2024"));
    }

    #[test]
    fn finds_english_written_date() {
        let text = "Posted 21 October 2023 in Business";
        assert_eq!(extract_content_date(text).as_deref(), Some("21 October 2023"));
    }

    #[test]
    fn ignores_dates_past_the_window() {
        let text = format!("{} 2024-01-01", "x".repeat(DATE_SCAN_CHARS));
        assert_eq!(extract_content_date(&text), None);
    }

    #[test]
    fn extracts_title() {
        let html = "<html><head><title>\n  Fakturering  för småföretag \n</title></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Fakturering för småföretag"));
    }

    #[test]
    fn falls_back_to_og_title() {
        let html = r#"<head><meta property="og:title" content="Forum: Bokföring"></head>"#;
        assert_eq!(extract_title(html).as_deref(), Some("Forum: Bokföring"));
    }

    #[test]
    fn no_title() {
        assert_eq!(extract_title("<p>ingen titel</p>"), None);
        assert_eq!(extract_title("<title>   </title>"), None);
    }
}
