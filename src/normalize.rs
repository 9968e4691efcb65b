//! src/normalize.rs
//! Normalizacja tekstu pod matching i anty-spam.
//!
//! Dwa profile (wspólne kroki 1–5):
//! - profil *matching* (badwords): URL-e → spacje, lowercase, zrzut diakrytyków,
//!   usunięcie zero-width, fold symboli (gwiazdka = usunięcie, nie spacja),
//!   kompresja białych znaków;
//! - profil *spam* (duplikaty/stretched): to samo + leetspeak.
//!
//! Kompresja powtórzeń (`compress_repeats`) jest osobnym krokiem — duplikaty
//! porównujemy po `compress_repeats(normalize_spam(..))`, a „stretched text”
//! liczymy ze stosunku długości przed/po kompresji. Celowo NIE stosujemy
//! leetspeaku ani kompresji do matchingu badwords (inne profile).

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

static RE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://\S+|discord\.gg/\S+|www\.\S+").unwrap()
});

const MAX_REPEATS: usize = 2;

/// Kroki 1–2: URL-e na spacje (żeby treść linku nie robiła false-positive)
/// + lowercase.
pub fn strip_urls(text: &str) -> String {
    RE_URL.replace_all(text, " ").into_owned()
}

fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
}

/// Fold symboli/interpunkcji do spacji. Gwiazdka jest USUWANA, nie zamieniana
/// na spację — "p**n" ma zostać "pn", a nie "p  n".
fn fold_symbols(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '*' => {}
            c if is_zero_width(c) => {}
            '\u{00A0}' => out.push(' '),
            '-' | '_' | '.' | ',' | '/' | '\\' | '+' | '~' | '=' | '`' | '\'' | '"' | '(' | ')'
            | '[' | ']' | '{' | '}' | '<' | '>' | '^' | '%' | '$' | '#' | '@' | '!' | '?' | ';'
            | ':' | '|' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_ws = true; // zjada też leading whitespace
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn fold_leetspeak(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '0' => 'o',
            '1' | 'l' => 'i',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            '8' => 'b',
            '9' => 'g',
            c => c,
        })
        .collect()
}

/// Profil matchingowy (badwords): kroki 1–6, bez leetspeaku i kompresji.
pub fn normalize_matching(raw: &str) -> String {
    let lowered = strip_urls(raw).to_lowercase();
    let folded = fold_symbols(&strip_diacritics(&lowered));
    collapse_whitespace(&folded)
}

/// Profil spamowy: matching + leetspeak. Kompresję powtórzeń wołamy osobno.
pub fn normalize_spam(raw: &str) -> String {
    fold_leetspeak(&normalize_matching(raw))
}

/// Ogranicza serie identycznych znaków do `MAX_REPEATS` ("fuuuuck" → "fuuck").
pub fn compress_repeats(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    let mut run = 0usize;
    for c in text.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            prev = Some(c);
            run = 1;
        }
        if run <= MAX_REPEATS {
            out.push(c);
        }
    }
    out
}

/// Tokeny alfanumeryczne (ASCII) po normalizacji matchingowej — gwarancja
/// whole-word checks.
pub fn tokenize(raw: &str) -> Vec<String> {
    let normalized = normalize_matching(raw);
    normalized
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_is_deleted_not_spaced() {
        assert_eq!(normalize_matching("p**n"), "pn");
    }

    #[test]
    fn urls_are_stripped_before_matching() {
        let t = normalize_matching("visit https://example.com/merde now");
        assert!(!t.contains("merde"));
        assert!(t.contains("visit"));
    }

    #[test]
    fn diacritics_and_zero_width_fold_away() {
        assert_eq!(normalize_matching("mérde"), "merde");
        assert_eq!(normalize_matching("me\u{200B}rde"), "merde");
    }

    #[test]
    fn leetspeak_only_in_spam_profile() {
        assert_eq!(normalize_spam("m3rd3"), "merde");
        assert_eq!(normalize_matching("m3rd3"), "m3rd3");
    }

    #[test]
    fn repeats_capped_at_two() {
        assert_eq!(compress_repeats("fuuuuuck"), "fuuck");
        assert_eq!(compress_repeats("abc"), "abc");
        assert_eq!(compress_repeats("aabb"), "aabb");
    }

    #[test]
    fn tokens_are_ascii_alnum() {
        assert_eq!(tokenize("Hello, MERDE!  x2"), vec!["hello", "merde", "x2"]);
    }
}
