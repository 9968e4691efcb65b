//! src/ledger.rs
//! ViolationLedger – dziennik naruszeń per użytkownik.
//!
//! Dwie warstwy:
//! - pamięciowa historia okienkowa (ograniczona długość FIFO + agregaty per
//!   typ + retencja czasowa + twardy limit liczby userów z eksmisją ~10%
//!   najstarszych) — to karmi raporty moderacyjne;
//! - `LifetimeCounters` — dożywotni, trwały licznik w Store, jedyne wejście
//!   progu read-only. Retencja go NIE czyści; reset tylko jawny.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::warn;

use crate::config::RetentionConfig;
use crate::store::Store;

/// Rodzaj naruszenia. Zamknięta unia zamiast luźnych stringów — raportowanie
/// i agregaty mają być wyczerpujące.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    BadWord,
    RateLimit,
    Duplicate,
    Mention,
    Link,
    Invite,
    Emoji,
    Caps,
    Stretched,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BadWord => "Bad words/insults",
            Self::RateLimit => "Rate limit",
            Self::Duplicate => "Duplicate spam",
            Self::Mention => "Mention spam",
            Self::Link => "Link spam",
            Self::Invite => "Invite link",
            Self::Emoji => "Emoji spam",
            Self::Caps => "Caps spam",
            Self::Stretched => "Stretched text",
        };
        f.write_str(label)
    }
}

impl ViolationKind {
    pub fn is_bad_word(&self) -> bool {
        matches!(self, Self::BadWord)
    }
}

#[derive(Debug, Clone)]
pub struct ViolationRecord {
    pub kind: ViolationKind,
    pub detail: String,
    /// Początek treści wiadomości (przycięty — do raportów, nie do dowodów).
    pub snippet: String,
    pub at: DateTime<Utc>,
}

const SNIPPET_MAX: usize = 100;

impl ViolationRecord {
    pub fn new(kind: ViolationKind, detail: impl Into<String>, content: &str, at: DateTime<Utc>) -> Self {
        let snippet: String = content.chars().take(SNIPPET_MAX).collect();
        Self { kind, detail: detail.into(), snippet, at }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserViolationHistory {
    pub violations: VecDeque<ViolationRecord>,
    /// Agregaty per typ. Nigdy nie dekrementowane przy przycinaniu FIFO —
    /// liczą życie-w-retencji, nie zawartość bufora.
    pub stats_by_kind: HashMap<ViolationKind, u32>,
    pub last_updated: DateTime<Utc>,
}

impl UserViolationHistory {
    pub fn total(&self) -> u32 {
        self.stats_by_kind.values().sum()
    }
}

pub struct ViolationLedger {
    cfg: RetentionConfig,
    users: DashMap<u64, UserViolationHistory>,
    /// user → id stojącego raportu na kanale mod-log (edycja zamiast spamu
    /// nowymi wiadomościami). Czyszczone razem z historią.
    report_messages: DashMap<u64, u64>,
}

impl ViolationLedger {
    pub fn new(cfg: RetentionConfig) -> Self {
        Self { cfg, users: DashMap::new(), report_messages: DashMap::new() }
    }

    pub fn record(&self, user_id: u64, record: ViolationRecord) {
        {
            let mut entry = self.users.entry(user_id).or_default();
            *entry.stats_by_kind.entry(record.kind).or_insert(0) += 1;
            entry.last_updated = record.at;
            entry.violations.push_back(record);
            while entry.violations.len() > self.cfg.max_entries_per_user as usize {
                entry.violations.pop_front();
            }
        }
        self.enforce_size_cap();
    }

    pub fn get_history(&self, user_id: u64) -> Option<UserViolationHistory> {
        self.users.get(&user_id).map(|h| h.clone())
    }

    /// Usuwa wpisy nieaktywne dłużej niż okno retencji. Zwraca liczbę
    /// wyrzuconych userów. Wołane cyklicznie; idempotentne.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = Duration::milliseconds(self.cfg.history_retention_ms as i64);
        let before = self.users.len();
        let mut purged_users: Vec<u64> = Vec::new();
        self.users.retain(|uid, h| {
            let keep = now - h.last_updated <= retention;
            if !keep {
                purged_users.push(*uid);
            }
            keep
        });
        for uid in purged_users {
            self.report_messages.remove(&uid);
        }
        before - self.users.len()
    }

    /// Twardy limit liczby śledzonych userów: po przekroczeniu wylatuje
    /// ~10% najdawniej aktualizowanych (heurystyka, nie ścisłe LRU).
    fn enforce_size_cap(&self) {
        let cap = self.cfg.max_map_entries as usize;
        if self.users.len() <= cap {
            return;
        }
        let mut by_age: Vec<(u64, DateTime<Utc>)> = self
            .users
            .iter()
            .map(|e| (*e.key(), e.value().last_updated))
            .collect();
        by_age.sort_by_key(|(_, ts)| *ts);

        let to_remove = (cap / 10).max(1);
        for (uid, _) in by_age.into_iter().take(to_remove) {
            self.users.remove(&uid);
            self.report_messages.remove(&uid);
        }
    }

    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    /* ======== cache id-ków stojących raportów ======== */

    pub fn report_message(&self, user_id: u64) -> Option<u64> {
        self.report_messages.get(&user_id).map(|v| *v)
    }

    pub fn remember_report_message(&self, user_id: u64, message_id: u64) {
        self.report_messages.insert(user_id, message_id);
    }

    pub fn forget_report_message(&self, user_id: u64) {
        self.report_messages.remove(&user_id);
    }
}

/* =========================================
   Licznik dożywotni (Store-backed)
   ========================================= */

pub struct LifetimeCounters {
    store: Arc<dyn Store>,
    cache: DashMap<u64, u64>,
}

fn counter_key(user_id: u64) -> String {
    format!("violations:{user_id}")
}

impl LifetimeCounters {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, cache: DashMap::new() }
    }

    /// Aktualny stan licznika; zepsuta wartość w Store == 0.
    pub async fn count(&self, user_id: u64) -> u64 {
        if let Some(c) = self.cache.get(&user_id) {
            return *c;
        }
        let loaded = match self.store.get(&counter_key(user_id)).await {
            Ok(Some(raw)) => raw.parse::<u64>().unwrap_or_else(|_| {
                warn!(user_id, raw = %raw, "malformed lifetime counter, treating as 0");
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!(user_id, error = %e, "lifetime counter read failed, treating as 0");
                0
            }
        };
        self.cache.insert(user_id, loaded);
        loaded
    }

    /// Inkrement + trwały zapis (kolejka zapisu w Store serializuje).
    /// Zwraca stan po inkremencie.
    pub async fn increment(&self, user_id: u64, amount: u64) -> u64 {
        let current = self.count(user_id).await;
        let next = current.saturating_add(amount);
        self.cache.insert(user_id, next);
        if let Err(e) = self.store.set(&counter_key(user_id), next.to_string()).await {
            warn!(user_id, error = %e, "lifetime counter write failed");
        }
        next
    }

    /// Jawny reset (akcja manualna moderatora). Jedyna droga w dół.
    pub async fn reset(&self, user_id: u64) {
        self.cache.insert(user_id, 0);
        if let Err(e) = self.store.set(&counter_key(user_id), "0".to_string()).await {
            warn!(user_id, error = %e, "lifetime counter reset write failed");
        }
    }
}
