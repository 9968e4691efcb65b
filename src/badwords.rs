//! src/badwords.rs
//! BadContentMatcher – wykrywanie zabronionych słów i fraz.
//!
//! Lista ładowana raz przy starcie z dwóch źródeł (JSON `{"words": [...]}` +
//! płaski plik tekstowy), suma bez duplikatów. Wpisy jednowyrazowe trafiają do
//! lookupa po pełnym tokenie (znormalizowany → oryginalna pisownia), frazy
//! kompilują się do wzorców kotwiczonych na granicach: `(^|\s)fraza(\s|$)`.
//!
//! Matching jest celowo precyzyjny: liczy się równość CAŁEGO tokenu, nigdy
//! substring ("assistant" nie łapie się na "ass"). Mocno zleetspeakowane
//! warianty zostawiamy heurystyce stretched-text w detektorze spamu.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context as _, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::normalize::{normalize_matching, tokenize};

#[derive(Debug, Deserialize)]
struct WordsFile {
    words: Vec<String>,
}

#[derive(Debug)]
struct PhrasePattern {
    regex: Regex,
    original: String,
}

#[derive(Debug, Default)]
pub struct BadContentMatcher {
    /// znormalizowany token → oryginalny wpis (do raportów)
    words: HashMap<String, String>,
    phrases: Vec<PhrasePattern>,
}

impl BadContentMatcher {
    /// Buduje matcher z gotowej listy wpisów (testy, listy z configu).
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut matcher = Self::default();
        for entry in entries {
            let trimmed = entry.as_ref().trim();
            if trimmed.is_empty() || !seen.insert(trimmed.to_string()) {
                continue;
            }
            matcher.add_entry(trimmed);
        }
        matcher
    }

    /// Ładuje i scala obie listy. Brak pliku tekstowego degraduje do samej
    /// listy JSON (z ostrzeżeniem), jak w pierwotnym systemie.
    pub fn load(json_path: &Path, txt_path: &Path, extra: &[String]) -> Result<Self> {
        let raw = std::fs::read_to_string(json_path)
            .with_context(|| format!("cannot read wordlist {}", json_path.display()))?;
        let parsed: WordsFile = serde_json::from_str(&raw)
            .with_context(|| format!("malformed wordlist {}", json_path.display()))?;

        let mut entries = parsed.words;
        match std::fs::read_to_string(txt_path) {
            Ok(raw) => entries.extend(
                raw.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string),
            ),
            Err(e) => {
                warn!(path = %txt_path.display(), error = %e, "txt wordlist not readable, using JSON list only");
            }
        }
        entries.extend(extra.iter().cloned());

        Ok(Self::from_entries(entries))
    }

    fn add_entry(&mut self, entry: &str) {
        if entry.split_whitespace().nth(1).is_some() {
            // fraza wielowyrazowa
            let normalized = normalize_matching(entry);
            if normalized.is_empty() {
                return;
            }
            let pattern = format!(r"(^|\s){}(\s|$)", regex::escape(&normalized));
            match Regex::new(&pattern) {
                Ok(regex) => self.phrases.push(PhrasePattern {
                    regex,
                    original: entry.to_string(),
                }),
                Err(e) => warn!(entry, error = %e, "phrase pattern rejected"),
            }
        } else {
            // pojedynczy wyraz: zrzuć wszystko poza alfanumerykami,
            // żeby wpis w stylu "p**n" łapał token "pn"
            let normalized: String = normalize_matching(entry)
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect();
            if normalized.is_empty() {
                return;
            }
            self.words.entry(normalized).or_insert_with(|| entry.to_string());
        }
    }

    pub fn entry_count(&self) -> usize {
        self.words.len() + self.phrases.len()
    }

    /// Czy tekst zawiera naruszenie. Short-circuit na pierwszym trafieniu.
    pub fn contains_violation(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        for token in tokenize(text) {
            if self.words.contains_key(&token) {
                return true;
            }
        }
        if self.phrases.is_empty() {
            return false;
        }
        let normalized = normalize_matching(text);
        self.phrases.iter().any(|p| p.regex.is_match(&normalized))
    }

    /// Wszystkie trafione wpisy (oryginalna pisownia), bez duplikatów.
    pub fn find_violations(&self, text: &str) -> HashSet<String> {
        let mut matched = HashSet::new();
        if text.is_empty() {
            return matched;
        }
        for token in tokenize(text) {
            if let Some(original) = self.words.get(&token) {
                matched.insert(original.clone());
            }
        }
        if !self.phrases.is_empty() {
            let normalized = normalize_matching(text);
            for p in &self.phrases {
                if p.regex.is_match(&normalized) {
                    matched.insert(p.original.clone());
                }
            }
        }
        matched
    }
}
