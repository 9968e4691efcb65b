//! src/spam.rs
//! SpamDetector – wielosygnałowa detekcja spamu per użytkownik.
//!
//! Sygnały stanowe (okna przesuwne per user): rate-limit, duplikaty, licznik
//! linków. Sygnały bezstanowe (sama treść/metadane): mentiony, invite-linki,
//! linki per wiadomość, emoji, caps, stretched-text. Wszystkie trafione powody
//! wracają listą w
//! kolejności sprawdzeń — bez early-exitu, jedna wiadomość może nieść kilka
//! naruszeń naraz.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::config::SpamConfig;
use crate::ledger::ViolationKind;
use crate::normalize::{compress_repeats, normalize_spam};
use crate::platform::InboundMessage;

static RE_INVITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(discord\.(gg|io|me|li)|discordapp\.com/invite)/[a-zA-Z0-9]+").unwrap()
});
static RE_URL_ALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://\S+").unwrap());
static RE_EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"<a?:[a-zA-Z0-9_]+:\d+>|[\u{1F300}-\u{1F9FF}]|[\u{2600}-\u{26FF}]|[\u{2700}-\u{27BF}]",
    )
    .unwrap()
});

const GIF_HOSTS: [&str; 4] = ["tenor.com", "media.tenor.com", "giphy.com", "media.giphy.com"];

/// Minimalna znormalizowana długość, od której liczymy stretched-text.
const STRETCHED_MIN_LEN: usize = 6;

/// Brak aktywności w oknach przez tyle czasu == stan użytkownika do wyrzucenia.
const IDLE_WINDOW_SECS: i64 = 60;

/// Pojedynczy trafiony sygnał.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpamHit {
    pub kind: ViolationKind,
    pub detail: String,
}

impl SpamHit {
    fn new(kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }
}

/// Stan sygnałów per użytkownik. Mutowany wyłącznie eventami właściciela.
#[derive(Debug, Default)]
struct SpamSignalState {
    message_times: VecDeque<DateTime<Utc>>,
    recent_bodies: VecDeque<(String, DateTime<Utc>)>,
    link_count: u32,
    link_window_start: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SpamDetector {
    cfg: SpamConfig,
    users: DashMap<u64, SpamSignalState>,
}

impl SpamDetector {
    pub fn new(cfg: SpamConfig) -> Self {
        Self { cfg, users: DashMap::new() }
    }

    /// Pełna ewaluacja wiadomości: sygnały stanowe + bezstanowe.
    pub fn evaluate(&self, msg: &InboundMessage, now: DateTime<Utc>) -> Vec<SpamHit> {
        let mut hits = Vec::new();
        let content = msg.content.as_str();

        {
            let mut state = self.users.entry(msg.author_id).or_default();

            if self.check_rate_limit(&mut state, now) {
                hits.push(SpamHit::new(
                    ViolationKind::RateLimit,
                    "Rate limit exceeded (too many messages)",
                ));
            }

            if !content.is_empty() && self.check_duplicate(&mut state, content, now) {
                hits.push(SpamHit::new(ViolationKind::Duplicate, "Duplicate message spam"));
            }

            if self.check_link_spam(&mut state, content, now) {
                hits.push(SpamHit::new(ViolationKind::Link, "Link spam (too many links)"));
            }
        }

        // Okno linków już policzyło bieżącą wiadomość — nie dublujemy trafienia
        // z bezstanowego licznika per wiadomość.
        for hit in self.content_checks(msg) {
            if hit.kind == ViolationKind::Link
                && hits.iter().any(|h| h.kind == ViolationKind::Link)
            {
                continue;
            }
            hits.push(hit);
        }
        hits
    }

    /// Podzbiór bezstanowy – używany też przez skan historii, gdzie okna
    /// czasowe sprzed tygodni nie mają sensu.
    pub fn content_checks(&self, msg: &InboundMessage) -> Vec<SpamHit> {
        let mut hits = Vec::new();
        let content = msg.content.as_str();

        if let Some(detail) = self.check_mentions(msg) {
            hits.push(SpamHit::new(ViolationKind::Mention, detail));
        }
        if let Some(detail) = self.check_invites(content) {
            hits.push(SpamHit::new(ViolationKind::Invite, detail));
        }
        if count_non_gif_links(content) > self.cfg.links.max_links {
            hits.push(SpamHit::new(ViolationKind::Link, "Link spam (too many links)"));
        }
        if self.check_emoji(content) {
            hits.push(SpamHit::new(ViolationKind::Emoji, "Emoji spam (excessive emojis)"));
        }
        if self.check_caps(content) {
            hits.push(SpamHit::new(ViolationKind::Caps, "Caps spam (excessive capitals)"));
        }
        if self.check_stretched(content) {
            hits.push(SpamHit::new(ViolationKind::Stretched, "Stretched characters/letters"));
        }
        hits
    }

    /* =========================================
       Sygnały stanowe
       ========================================= */

    fn check_rate_limit(&self, state: &mut SpamSignalState, now: DateTime<Utc>) -> bool {
        let window = Duration::milliseconds(self.cfg.rate_limit.window_ms as i64);
        while let Some(front) = state.message_times.front() {
            if now - *front >= window {
                state.message_times.pop_front();
            } else {
                break;
            }
        }
        state.message_times.push_back(now);
        state.message_times.len() > self.cfg.rate_limit.max_messages as usize
    }

    fn check_duplicate(&self, state: &mut SpamSignalState, content: &str, now: DateTime<Utc>) -> bool {
        let window = Duration::milliseconds(self.cfg.duplicates.window_ms as i64);
        while let Some((_, ts)) = state.recent_bodies.front() {
            if now - *ts >= window {
                state.recent_bodies.pop_front();
            } else {
                break;
            }
        }

        // Normalizacja + kompresja, żeby "ffuucckk" zrównało się z "fuck"
        let normalized = compress_repeats(&normalize_spam(content));
        let duplicates = state
            .recent_bodies
            .iter()
            .filter(|(body, _)| *body == normalized)
            .count();
        state.recent_bodies.push_back((normalized, now));

        duplicates >= self.cfg.duplicates.max_duplicates.saturating_sub(1) as usize
    }

    fn check_link_spam(&self, state: &mut SpamSignalState, content: &str, now: DateTime<Utc>) -> bool {
        let window = Duration::milliseconds(self.cfg.links.window_ms as i64);
        let fresh = count_non_gif_links(content);

        match state.link_window_start {
            Some(start) if now - start <= window => {}
            _ => {
                state.link_count = 0;
                state.link_window_start = Some(now);
            }
        }
        state.link_count += fresh;
        state.link_count > self.cfg.links.max_links
    }

    /* =========================================
       Sygnały bezstanowe
       ========================================= */

    fn check_mentions(&self, msg: &InboundMessage) -> Option<String> {
        let allowed_broadcast = self
            .cfg
            .mentions
            .allowed_broadcast_user_ids
            .contains(&msg.author_id);
        let broadcast = u32::from(msg.mentions_everyone && !allowed_broadcast);

        // @everyone/@here jest kategorycznie zabronione poza allow-listą
        if broadcast > 0 {
            return Some("@everyone/@here mention not allowed".to_string());
        }
        let total = msg.user_mentions + msg.role_mentions + broadcast;
        if total > self.cfg.mentions.max_mentions {
            return Some(format!("{total} total mentions"));
        }
        if msg.role_mentions > self.cfg.mentions.max_role_mentions {
            return Some(format!("{} role mentions", msg.role_mentions));
        }
        None
    }

    fn check_invites(&self, content: &str) -> Option<String> {
        if !self.cfg.invites.enabled {
            return None;
        }
        let unauthorized: Vec<&str> = RE_INVITE
            .find_iter(content)
            .map(|m| m.as_str())
            .filter(|inv| !self.cfg.invites.allowed.iter().any(|a| inv.contains(a.as_str())))
            .collect();
        if unauthorized.is_empty() {
            None
        } else {
            Some(format!("Unauthorized invite: {}", unauthorized.join(", ")))
        }
    }

    fn check_emoji(&self, content: &str) -> bool {
        RE_EMOJI.find_iter(content).count() > self.cfg.emoji.max_emojis as usize
    }

    fn check_caps(&self, content: &str) -> bool {
        if !self.cfg.caps.enabled {
            return false;
        }
        let letters: Vec<char> = content.chars().filter(|c| c.is_ascii_alphabetic()).collect();
        if letters.len() < self.cfg.caps.min_length as usize {
            return false;
        }
        let caps = letters.iter().filter(|c| c.is_ascii_uppercase()).count();
        (caps * 100) as f64 / letters.len() as f64 >= self.cfg.caps.caps_percentage as f64
    }

    fn check_stretched(&self, content: &str) -> bool {
        // Tylko znaki alfanumeryczne: ciąg identycznych emoji czy symboli
        // nie jest "rozciąganiem" liter.
        let normalized: String = normalize_spam(content)
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
            .collect();
        if normalized.chars().count() < STRETCHED_MIN_LEN {
            return false;
        }
        let compressed = compress_repeats(&normalized);
        let ratio = compressed.chars().count() as f64 / normalized.chars().count().max(1) as f64;
        ratio <= self.cfg.stretched_ratio
    }

    /* =========================================
       Sprzątanie
       ========================================= */

    /// Usuwa stany użytkowników bez aktywności w ostatnim oknie.
    pub fn prune_idle(&self, now: DateTime<Utc>) {
        let idle = Duration::seconds(IDLE_WINDOW_SECS);
        self.users.retain(|_, state| {
            state.message_times.iter().any(|ts| now - *ts < idle)
                || state.recent_bodies.iter().any(|(_, ts)| now - *ts < idle)
        });
    }

    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }
}

fn is_gif_link(link: &str) -> bool {
    let Ok(url) = Url::parse(link) else {
        return false;
    };
    if url.path().to_ascii_lowercase().ends_with(".gif") {
        return true;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    GIF_HOSTS
        .iter()
        .any(|gif| host == *gif || host.ends_with(&format!(".{gif}")))
}

fn count_non_gif_links(content: &str) -> u32 {
    RE_URL_ALL
        .find_iter(content)
        .filter(|m| !is_gif_link(m.as_str()))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gif_links_are_exempt() {
        assert!(is_gif_link("https://tenor.com/view/cat-123"));
        assert!(is_gif_link("https://media.giphy.com/media/x/giphy.webp"));
        assert!(is_gif_link("https://example.com/funny.GIF"));
        assert!(!is_gif_link("https://example.com/page"));
        assert_eq!(count_non_gif_links("https://a.test/x https://tenor.com/y"), 1);
    }

    #[test]
    fn invite_regex_catches_variants() {
        assert!(RE_INVITE.is_match("join discord.gg/abc123"));
        assert!(RE_INVITE.is_match("discordapp.com/invite/xyz"));
        assert!(!RE_INVITE.is_match("no invites here"));
    }
}
