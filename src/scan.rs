//! src/scan.rs
//! HistoryScanner – retroaktywny przebieg po historii kanału.
//!
//! Stronicuje od najnowszych w dół, zatrzymuje się na limicie wiadomości albo
//! na checkpoincie z poprzedniego przebiegu (id ostatnio widzianej wiadomości,
//! trzymane w Store per kanał). Na starych wiadomościach działają tylko
//! słownik i bezstanowe sygnały spamowe — okna czasowe sprzed tygodni nie mają
//! sensu. Błędy pojedynczych stron/akcji są zbierane, nie przerywają przebiegu.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::guard::ChatGuard;
use crate::ledger::{ViolationKind, ViolationRecord};
use crate::platform::{ChatPlatform, InboundMessage};
use crate::store::Store;

/// Podsumowanie jednego przebiegu skanu.
#[derive(Debug, Default, Clone)]
pub struct ScanOutcome {
    pub scanned: u32,
    pub bad_word_hits: u32,
    pub spam_hits: u32,
    pub deleted: u32,
    pub errors: Vec<String>,
}

pub struct HistoryScanner {
    cfg: ScanConfig,
    store: Arc<dyn Store>,
    guard: Arc<ChatGuard>,
}

fn checkpoint_key(channel_id: u64) -> String {
    format!("scan:{channel_id}")
}

impl HistoryScanner {
    pub fn new(cfg: ScanConfig, store: Arc<dyn Store>, guard: Arc<ChatGuard>) -> Arc<Self> {
        Arc::new(Self { cfg, store, guard })
    }

    /// Checkpoint kanału; zepsuta/nieobecna wartość == skan od zera.
    async fn load_checkpoint(&self, channel_id: u64) -> Option<u64> {
        match self.store.get(&checkpoint_key(channel_id)).await {
            Ok(Some(raw)) => match raw.parse::<u64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(channel_id, raw = %raw, "malformed scan checkpoint, rescanning");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(channel_id, error = %e, "checkpoint read failed, rescanning");
                None
            }
        }
    }

    pub async fn scan_channel(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        channel_id: u64,
    ) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        if self.guard.channel_is_exempt(channel_id) {
            info!(channel_id, "channel exempt from moderation, scan skipped");
            return outcome;
        }
        let checkpoint = self.load_checkpoint(channel_id).await;

        // Checkpoint na przyszły przebieg bierzemy PRZED skanem: wiadomości
        // przychodzące w trakcie obsłuży pipeline na żywo.
        let next_checkpoint = match platform.latest_message_id(channel_id).await {
            Ok(id) => id,
            Err(e) => {
                outcome.errors.push(format!("latest message lookup: {e}"));
                None
            }
        };

        let mut before: Option<u64> = None;
        let mut fetch_failed = false;
        'pages: loop {
            let page = match platform
                .fetch_messages_before(channel_id, before, self.cfg.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    outcome.errors.push(format!("page fetch (before={before:?}): {e}"));
                    fetch_failed = true;
                    break;
                }
            };
            if page.is_empty() {
                break;
            }

            for msg in &page {
                if let Some(cp) = checkpoint {
                    // id rosną w czasie: wszystko od checkpointu w dół już było.
                    if msg.id <= cp {
                        break 'pages;
                    }
                }
                // Boty i autorzy zwolnieni z moderacji nie wchodzą do limitu.
                if self.guard.is_exempt(msg) {
                    continue;
                }
                if outcome.scanned >= self.cfg.max_messages {
                    break 'pages;
                }
                outcome.scanned += 1;
                self.scan_message(platform, msg, &mut outcome).await;
            }

            before = page.last().map(|m| m.id);
            if self.cfg.page_delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.cfg.page_delay_ms)).await;
            }
        }

        // Checkpoint zapisujemy tylko po czystym przebiegu: przerwany fetch
        // zostawia zaległość, która inaczej przepadłaby na zawsze.
        if fetch_failed {
            warn!(channel_id, "scan aborted on fetch error, checkpoint not advanced");
        } else if let Some(latest) = next_checkpoint {
            if let Err(e) = self
                .store
                .set(&checkpoint_key(channel_id), latest.to_string())
                .await
            {
                outcome.errors.push(format!("checkpoint write: {e}"));
            }
        }

        info!(
            channel_id,
            scanned = outcome.scanned,
            bad_words = outcome.bad_word_hits,
            spam = outcome.spam_hits,
            deleted = outcome.deleted,
            errors = outcome.errors.len(),
            "history scan finished"
        );
        outcome
    }

    async fn scan_message(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        msg: &InboundMessage,
        outcome: &mut ScanOutcome,
    ) {
        let now = Utc::now();
        let bad_words = self.guard.matcher.find_violations(&msg.content);
        let spam_hits = self.guard.spam.content_checks(msg);
        if bad_words.is_empty() && spam_hits.is_empty() {
            return;
        }
        outcome.bad_word_hits += bad_words.len() as u32;
        outcome.spam_hits += spam_hits.len() as u32;

        if self.cfg.delete_violations {
            match platform.delete_message(msg.channel_id, msg.id).await {
                Ok(()) => outcome.deleted += 1,
                Err(e) => outcome.errors.push(format!("delete {}: {e}", msg.id)),
            }
        }

        let mut records: Vec<ViolationRecord> = Vec::new();
        for word in &bad_words {
            records.push(ViolationRecord::new(
                ViolationKind::BadWord,
                format!("Matched: {word}"),
                &msg.content,
                now,
            ));
        }
        for hit in &spam_hits {
            records.push(ViolationRecord::new(hit.kind, hit.detail.clone(), &msg.content, now));
        }
        self.guard.record_historical(platform, msg, records).await;
    }
}
