//! src/guard.rs
//! ChatGuard – pipeline moderacji na żywo, spina wszystkie moduły.
//!
//! Przepływ per wiadomość: bramki wejściowe (bot / kanał zgłoszeń błędów /
//! wyjątki kanałów z nadpisaniem kategorii / role bypass) → słownik + detekcja
//! spamu → kasowanie → dziennik + licznik dożywotni → ostrzeżenie/mute →
//! stojący raport na kanale mod-log → próg read-only. Wszystkie akcje na
//! platformie są best-effort: pojedyncza próba, błąd logujemy i lecimy dalej.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::badwords::BadContentMatcher;
use crate::config::FilterConfig;
use crate::escalate::{EscalationAction, EscalationEngine};
use crate::ledger::{LifetimeCounters, UserViolationHistory, ViolationLedger, ViolationRecord};
use crate::platform::{ChatPlatform, InboundMessage, ModReport};
use crate::spam::SpamDetector;

const BRAND_FOOTER: &str = "Pardus Guard";
const REPORT_RECENT_MAX: usize = 5;

pub struct ChatGuard {
    filter: FilterConfig,
    pub matcher: BadContentMatcher,
    pub spam: SpamDetector,
    pub ledger: ViolationLedger,
    pub escalation: EscalationEngine,
    pub counters: LifetimeCounters,
    cleanup_interval_ms: u64,
}

impl ChatGuard {
    pub fn new(
        filter: FilterConfig,
        matcher: BadContentMatcher,
        spam: SpamDetector,
        ledger: ViolationLedger,
        escalation: EscalationEngine,
        counters: LifetimeCounters,
        cleanup_interval_ms: u64,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            filter,
            matcher,
            spam,
            ledger,
            escalation,
            counters,
            cleanup_interval_ms,
        });
        Self::spawn_cleanup_task(&this);
        this
    }

    fn spawn_cleanup_task(this: &Arc<Self>) {
        let weak = Arc::downgrade(this);
        let interval_ms = this.cleanup_interval_ms.max(1_000);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            interval.tick().await; // pierwszy tick jest natychmiastowy
            loop {
                interval.tick().await;
                let Some(strong) = weak.upgrade() else { break };
                let now = Utc::now();
                let purged = strong.ledger.purge_expired(now);
                strong.spam.prune_idle(now);
                if purged > 0 {
                    info!(purged, "expired violation histories purged");
                }
            }
        });
    }

    /* =========================================
       Bramki wejściowe
       ========================================= */

    /// Kanał całkiem poza moderacją (zgłoszenia błędów / lista wyjątków).
    /// Używane przez skan historii, gdzie kategoria kanału jest nieznana,
    /// więc nadpisanie wymuszoną kategorią tu nie działa.
    pub fn channel_is_exempt(&self, channel_id: u64) -> bool {
        self.filter.bug_reports_channel_id == Some(channel_id)
            || self.filter.exempt_channel_ids.contains(&channel_id)
    }

    pub fn is_exempt(&self, msg: &InboundMessage) -> bool {
        if msg.author_is_bot {
            return true;
        }
        if self.filter.bug_reports_channel_id == Some(msg.channel_id) {
            return true;
        }
        // Kanał z listy wyjątków — chyba że siedzi w wymuszonej kategorii.
        if self.filter.exempt_channel_ids.contains(&msg.channel_id) {
            let enforced = msg
                .category_id
                .is_some_and(|cat| self.filter.enforced_category_ids.contains(&cat));
            if !enforced {
                return true;
            }
        }
        if msg
            .author_role_ids
            .iter()
            .any(|r| self.filter.bypass_role_ids.contains(r))
        {
            return true;
        }
        false
    }

    /* =========================================
       Pipeline na żywo
       ========================================= */

    pub async fn on_message(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        msg: &InboundMessage,
        now: DateTime<Utc>,
    ) {
        if self.is_exempt(msg) {
            return;
        }

        let bad_words = self.matcher.find_violations(&msg.content);
        let spam_hits = self.spam.evaluate(msg, now);
        if bad_words.is_empty() && spam_hits.is_empty() {
            return;
        }

        // Wulgaryzmy kasujemy zawsze; czysty spam zostaje na kanale ogólnym.
        let keep = bad_words.is_empty()
            && self.filter.keep_message_channel_id == Some(msg.channel_id);
        if !keep {
            if let Err(e) = platform.delete_message(msg.channel_id, msg.id).await {
                warn!(
                    channel_id = msg.channel_id,
                    message_id = msg.id,
                    error = ?e,
                    "message delete failed"
                );
            }
        }

        let mut records: Vec<ViolationRecord> = Vec::new();
        for word in &bad_words {
            records.push(ViolationRecord::new(
                crate::ledger::ViolationKind::BadWord,
                format!("Matched: {word}"),
                &msg.content,
                now,
            ));
        }
        for hit in &spam_hits {
            records.push(ViolationRecord::new(hit.kind, hit.detail.clone(), &msg.content, now));
        }

        let added = records.len() as u64;
        for record in records {
            self.ledger.record(msg.author_id, record);
        }
        let lifetime = self.counters.increment(msg.author_id, added).await;

        info!(
            user_id = msg.author_id,
            channel_id = msg.channel_id,
            violations = added,
            lifetime,
            "message flagged"
        );

        // Jedno ostrzeżenie na oflagowaną wiadomość, niezależnie od liczby powodów.
        let action = self
            .escalation
            .on_flagged_message(platform, msg.author_id, now)
            .await;
        self.notify_user(platform, msg, &action).await;

        self.update_standing_report(platform, msg.author_id, &msg.author_tag).await;

        if self
            .escalation
            .check_read_only(platform, msg.author_id, lifetime)
            .await
        {
            self.notify_read_only(platform, msg.author_id).await;
        }
    }

    /// Wejście dla skanu historii: zapis do dziennika i licznika + odświeżenie
    /// raportu, bez ostrzeżeń i mute (stare wiadomości to nie bieżące zachowanie).
    pub async fn record_historical(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        msg: &InboundMessage,
        records: Vec<ViolationRecord>,
    ) {
        if records.is_empty() {
            return;
        }
        let added = records.len() as u64;
        for record in records {
            self.ledger.record(msg.author_id, record);
        }
        let lifetime = self.counters.increment(msg.author_id, added).await;
        self.update_standing_report(platform, msg.author_id, &msg.author_tag).await;
        if self
            .escalation
            .check_read_only(platform, msg.author_id, lifetime)
            .await
        {
            self.notify_read_only(platform, msg.author_id).await;
        }
    }

    /* =========================================
       Raporty / powiadomienia
       ========================================= */

    /// Jeden stojący raport per użytkownik na kanale mod-log: edytowany przy
    /// kolejnych naruszeniach zamiast zaśmiecania kanału nowymi wpisami.
    async fn update_standing_report(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        user_id: u64,
        author_tag: &str,
    ) {
        let Some(log_channel) = self.filter.moderation_log_channel_id else {
            return;
        };
        let Some(history) = self.ledger.get_history(user_id) else {
            return;
        };
        let report = build_user_report(user_id, author_tag, &history, self.filter.mod_role_id);

        if let Some(message_id) = self.ledger.report_message(user_id) {
            match platform.edit_report(log_channel, message_id, &report).await {
                Ok(()) => return,
                Err(e) => {
                    // Raport mógł zostać skasowany ręcznie — wyślij świeży.
                    warn!(user_id, message_id, error = ?e, "report edit failed, sending new");
                    self.ledger.forget_report_message(user_id);
                }
            }
        }
        match platform.send_report(log_channel, &report).await {
            Ok(message_id) => self.ledger.remember_report_message(user_id, message_id),
            Err(e) => warn!(user_id, error = ?e, "report send failed"),
        }
    }

    async fn notify_user(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        msg: &InboundMessage,
        action: &EscalationAction,
    ) {
        let report = match action {
            EscalationAction::Warned(count) => ModReport::new("⚠️ Moderation warning")
                .describe(
                    "Your message violated the server rules and has been flagged.".to_string(),
                )
                .field("Warnings", count.to_string()),
            EscalationAction::Muted { minutes } => ModReport::new("🔇 You have been muted")
                .describe(format!(
                    "Repeated violations resulted in a {minutes} minute mute."
                )),
        };
        if let Err(e) = platform.send_dm(msg.author_id, &report).await {
            warn!(user_id = msg.author_id, error = ?e, "warning DM failed");
        }
    }

    async fn notify_read_only(&self, platform: &Arc<dyn ChatPlatform>, user_id: u64) {
        let report = ModReport::new("🔒 Read-only mode")
            .describe(
                "Your violation count crossed the server threshold. \
                 You can read but no longer write. Contact the moderators to appeal.",
            );
        if let Err(e) = platform.send_dm(user_id, &report).await {
            warn!(user_id, error = ?e, "read-only DM failed");
        }
    }
}

fn build_user_report(
    user_id: u64,
    author_tag: &str,
    history: &UserViolationHistory,
    mod_role_id: Option<u64>,
) -> ModReport {
    let mut breakdown: Vec<(crate::ledger::ViolationKind, u32)> =
        history.stats_by_kind.iter().map(|(k, v)| (*k, *v)).collect();
    breakdown.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    let breakdown_text = breakdown
        .iter()
        .map(|(kind, count)| format!("{kind}: **{count}**"))
        .collect::<Vec<_>>()
        .join("\n");

    let recent_text = history
        .violations
        .iter()
        .rev()
        .take(REPORT_RECENT_MAX)
        .map(|v| {
            let snippet = if v.snippet.is_empty() { "—" } else { v.snippet.as_str() };
            format!("`{}` {} — {}", v.at.format("%H:%M:%S"), v.kind, snippet)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut report = ModReport::new(format!("{BRAND_FOOTER}: violations of {author_tag}"))
        .describe(format!(
            "User: <@{user_id}>\nTotal violations (retention window): **{}**",
            history.total()
        ))
        .field("Breakdown", breakdown_text)
        .field("Recent", recent_text);
    report.mention_role_id = mod_role_id;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ViolationKind;

    #[test]
    fn report_orders_breakdown_by_count() {
        let mut history = UserViolationHistory::default();
        history.stats_by_kind.insert(ViolationKind::BadWord, 2);
        history.stats_by_kind.insert(ViolationKind::RateLimit, 7);
        let report = build_user_report(42, "user#0", &history, None);
        let breakdown = &report.fields[0].1;
        let rate_pos = breakdown.find("Rate limit").unwrap();
        let bad_pos = breakdown.find("Bad words").unwrap();
        assert!(rate_pos < bad_pos);
    }
}
