//! Best-effort quote similarity.
//!
//! One entry point, [`match_quote`], tries ordered strategies until one
//! clears the pass threshold: exact substring, then a sliding window of
//! bigram similarity, then (for long quotes) literal half-quote lookup.
//! The best score seen decides the band.

use serde::Serialize;
use smbsignal_common::QuoteCheck;

pub const PASS_THRESHOLD: f64 = 0.65;
pub const PARTIAL_THRESHOLD: f64 = 0.5;
/// Extra characters each window spans beyond the quote length.
pub const WINDOW_OVERSHOOT: usize = 50;
/// Quotes longer than this may fall back to half-quote lookup.
pub const HALF_FALLBACK_MIN_CHARS: usize = 50;
pub const BOTH_HALVES_SCORE: f64 = 0.85;
pub const ONE_HALF_SCORE: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    SlidingWindow,
    HalfQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuoteMatch {
    pub score: f64,
    pub band: QuoteCheck,
    /// Strategy that produced `score`; `None` when nothing matched at all.
    pub strategy: Option<MatchStrategy>,
}

/// Lowercase and collapse all whitespace runs to single spaces.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized similarity ratio in `0.0..=1.0` (bigram Sørensen–Dice).
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::sorensen_dice(a, b)
}

pub fn band(score: f64) -> QuoteCheck {
    if score >= PASS_THRESHOLD {
        QuoteCheck::Passed
    } else if score >= PARTIAL_THRESHOLD {
        QuoteCheck::Partial
    } else {
        QuoteCheck::Failed
    }
}

fn exact(quote: &str, source: &str) -> Option<f64> {
    source.contains(quote).then_some(1.0)
}

/// Best ratio over windows of `quote length + overshoot` characters,
/// stepping by a quarter of the quote length.
fn sliding_window(quote: &str, source: &str) -> Option<f64> {
    let q_len = quote.chars().count();
    let chars: Vec<char> = source.chars().collect();
    if chars.is_empty() {
        return None;
    }

    let width = q_len + WINDOW_OVERSHOOT;
    let step = (q_len / 4).max(1);
    let mut best = 0.0_f64;
    let mut start = 0;
    loop {
        let end = (start + width).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        best = best.max(ratio(quote, &window));
        if end == chars.len() || best >= 1.0 {
            break;
        }
        start += step;
    }
    Some(best)
}

/// Literal lookup of each half of a long quote, split at the midpoint.
fn half_quote(quote: &str, source: &str) -> Option<f64> {
    let chars: Vec<char> = quote.chars().collect();
    if chars.len() <= HALF_FALLBACK_MIN_CHARS {
        return None;
    }
    let mid = chars.len() / 2;
    let first: String = chars[..mid].iter().collect();
    let second: String = chars[mid..].iter().collect();

    match (source.contains(first.trim()), source.contains(second.trim())) {
        (true, true) => Some(BOTH_HALVES_SCORE),
        (true, false) | (false, true) => Some(ONE_HALF_SCORE),
        (false, false) => None,
    }
}

/// Score how well `quote` is substantiated by `source`.
pub fn match_quote(quote: &str, source: &str) -> QuoteMatch {
    let quote = normalize(quote);
    let source = normalize(source);
    if quote.is_empty() || source.is_empty() {
        return QuoteMatch {
            score: 0.0,
            band: QuoteCheck::Failed,
            strategy: None,
        };
    }

    let strategies: [(MatchStrategy, fn(&str, &str) -> Option<f64>); 3] = [
        (MatchStrategy::Exact, exact),
        (MatchStrategy::SlidingWindow, sliding_window),
        (MatchStrategy::HalfQuote, half_quote),
    ];

    let mut best: Option<(f64, MatchStrategy)> = None;
    for (strategy, run) in strategies {
        let Some(score) = run(&quote, &source) else {
            continue;
        };
        if best.map_or(true, |(b, _)| score > b) {
            best = Some((score, strategy));
        }
        if score >= PASS_THRESHOLD {
            break;
        }
    }

    let score = best.map_or(0.0, |(s, _)| s);
    QuoteMatch {
        score,
        band: band(score),
        strategy: best.map(|(_, s)| s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_substring_scores_one() {
        let m = match_quote(
            "Vi har problem med fakturering",
            "...vi har problem med fakturering och det är jobbigt",
        );
        assert_eq!(m.score, 1.0);
        assert_eq!(m.band, QuoteCheck::Passed);
        assert_eq!(m.strategy, Some(MatchStrategy::Exact));
    }

    #[test]
    fn unrelated_text_fails() {
        let m = match_quote("helt orelaterad text", "Vi har problem med fakturering");
        assert!(m.score < PASS_THRESHOLD);
        assert_eq!(m.band, QuoteCheck::Failed);
    }

    #[test]
    fn whitespace_and_case_are_ignored() {
        let m = match_quote("VI  HAR\nproblem", "vi har problem med allt");
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn paraphrase_passes_through_window() {
        let source = "Vi lägger alldeles för mycket tid på fakturering varje månad, säger hon.";
        let m = match_quote("vi lägger alldeles för mycket tid på faktureringen varje månad", source);
        assert_eq!(m.strategy, Some(MatchStrategy::SlidingWindow));
        assert_eq!(m.band, QuoteCheck::Passed);
    }

    #[test]
    fn half_quote_lookup() {
        let first = "det största problemet för oss är att all lönehantering";
        let source = normalize(&format!("Intervju. {first} görs i kalkylark. Slut."));
        let quote = normalize(&format!("{first} sker för hand varje vecka"));
        assert_eq!(half_quote(&quote, &source), Some(ONE_HALF_SCORE));

        let both = normalize(&format!("{first} görs i kalkylark."));
        assert!(both.chars().count() > HALF_FALLBACK_MIN_CHARS);
        assert_eq!(half_quote(&both, &source), Some(BOTH_HALVES_SCORE));

        assert_eq!(half_quote("kort citat", &source), None);
    }

    #[test]
    fn long_quote_with_one_verbatim_half_passes() {
        let first = "det största problemet för oss är att all lönehantering";
        let source = format!("Intervju. {first} görs i kalkylark. Slut.");
        let quote = format!("{first} sker för hand, xqz wvy jjk ööö qqq zzz");
        let m = match_quote(&quote, &source);
        assert!(m.score >= PASS_THRESHOLD);
        assert_eq!(m.band, QuoteCheck::Passed);
    }

    #[test]
    fn empty_inputs_fail() {
        assert_eq!(match_quote("", "text").band, QuoteCheck::Failed);
        assert_eq!(match_quote("citat", "   ").band, QuoteCheck::Failed);
    }

    #[test]
    fn bands() {
        assert_eq!(band(0.65), QuoteCheck::Passed);
        assert_eq!(band(0.6), QuoteCheck::Partial);
        assert_eq!(band(0.5), QuoteCheck::Partial);
        assert_eq!(band(0.49), QuoteCheck::Failed);
    }
}
