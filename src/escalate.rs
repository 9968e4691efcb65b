//! src/escalate.rs
//! EscalationEngine – dwa niezależne tory kar.
//!
//! Tor krótkoterminowy: ostrzeżenia → timed mute. Licznik ostrzeżeń resetuje
//! się do 1 po przerwie dłuższej niż okno resetu; próg == mute (rola Muted
//! z zaplanowanym zdjęciem albo natywny timeout). Udany mute zeruje licznik.
//! Zaplanowany unmute sprawdza flagę żywotności w secie `muted`, więc ręczne
//! wcześniejsze odciszenie bezpiecznie skraca ten zaplanowany.
//!
//! Tor długoterminowy: licznik dożywotni → jednokierunkowa rola read-only.
//! Idempotentny (ponowne nadanie to no-op), z per-user guardem wzajemnego
//! wykluczania na czas efektu ubocznego — dwa nakładające się eventy nie
//! nadadzą roli dwa razy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::{PunishmentConfig, ReadOnlyConfig};
use crate::platform::ChatPlatform;

#[derive(Debug, Clone, Copy)]
struct WarningState {
    count: u32,
    last_warning: DateTime<Utc>,
}

/// Wynik toru krótkoterminowego dla jednej oflagowanej wiadomości.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    /// Tylko ostrzeżenie; niesie stan licznika.
    Warned(u32),
    /// Mute nałożony na tyle minut.
    Muted { minutes: i64 },
}

pub struct EscalationEngine {
    punishment: PunishmentConfig,
    readonly: ReadOnlyConfig,
    warnings: DashMap<u64, WarningState>,
    muted: Arc<DashMap<u64, ()>>,
    readonly_granted: DashMap<u64, ()>,
    readonly_inflight: Arc<DashMap<u64, ()>>,
    readonly_role_warned: AtomicBool,
}

/// Guard set-membership: zwolnienie w Drop, niezależnie od wyniku akcji.
struct InflightGuard {
    set: Arc<DashMap<u64, ()>>,
    user_id: u64,
}

impl InflightGuard {
    fn acquire(set: &Arc<DashMap<u64, ()>>, user_id: u64) -> Option<Self> {
        if set.insert(user_id, ()).is_some() {
            return None; // ktoś już trzyma
        }
        Some(Self { set: set.clone(), user_id })
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.user_id);
    }
}

impl EscalationEngine {
    pub fn new(punishment: PunishmentConfig, readonly: ReadOnlyConfig) -> Self {
        Self {
            punishment,
            readonly,
            warnings: DashMap::new(),
            muted: Arc::new(DashMap::new()),
            readonly_granted: DashMap::new(),
            readonly_inflight: Arc::new(DashMap::new()),
            readonly_role_warned: AtomicBool::new(false),
        }
    }

    /* =========================================
       Tor krótkoterminowy: warn → mute
       ========================================= */

    fn add_warning(&self, user_id: u64, now: DateTime<Utc>) -> u32 {
        let reset = Duration::milliseconds(self.punishment.warning_reset_ms as i64);
        let mut entry = self
            .warnings
            .entry(user_id)
            .or_insert(WarningState { count: 0, last_warning: now });
        if now - entry.last_warning > reset {
            entry.count = 1;
        } else {
            entry.count += 1;
        }
        entry.last_warning = now;
        entry.count
    }

    pub fn warning_count(&self, user_id: u64, now: DateTime<Utc>) -> u32 {
        let reset = Duration::milliseconds(self.punishment.warning_reset_ms as i64);
        let expired = match self.warnings.get(&user_id) {
            Some(state) => {
                if now - state.last_warning > reset {
                    true
                } else {
                    return state.count;
                }
            }
            None => return 0,
        };
        if expired {
            self.warnings.remove(&user_id);
        }
        0
    }

    pub fn is_muted(&self, user_id: u64) -> bool {
        self.muted.contains_key(&user_id)
    }

    /// Przetwarza jedną oflagowaną wiadomość: dolicza ostrzeżenie i — przy
    /// progu — próbuje mute. Nieudany mute zostawia stan w `Warned`
    /// (platforma best-effort, tor read-only i raporty lecą dalej).
    pub async fn on_flagged_message(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        user_id: u64,
        now: DateTime<Utc>,
    ) -> EscalationAction {
        let count = self.add_warning(user_id, now);
        if count < self.punishment.warnings_before_mute {
            return EscalationAction::Warned(count);
        }

        match self.apply_mute(platform, user_id, now).await {
            Ok(()) => {
                // Reset licznika TYLKO po udanym mute.
                self.warnings.remove(&user_id);
                EscalationAction::Muted { minutes: self.punishment.mute_duration_ms as i64 / 60_000 }
            }
            Err(e) => {
                warn!(user_id, error = ?e, "mute failed, keeping warning state");
                EscalationAction::Warned(count)
            }
        }
    }

    async fn apply_mute(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        user_id: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let duration_ms = self.punishment.mute_duration_ms;

        if let Some(role_id) = self.punishment.muted_role_id {
            platform.assign_role(user_id, role_id).await?;
            self.muted.insert(user_id, ());
            self.schedule_unmute(platform.clone(), user_id, role_id, duration_ms);
        } else {
            let until = now + Duration::milliseconds(duration_ms as i64);
            platform.timeout_member(user_id, until).await?;
        }
        info!(user_id, duration_ms, "mute applied");
        Ok(())
    }

    fn schedule_unmute(
        &self,
        platform: Arc<dyn ChatPlatform>,
        user_id: u64,
        role_id: u64,
        duration_ms: u64,
    ) {
        let muted = self.muted.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(duration_ms)).await;
            // Flaga żywotności: ręczny unmute mógł już zdjąć wpis.
            if muted.remove(&user_id).is_some() {
                if let Err(e) = platform.remove_role(user_id, role_id).await {
                    warn!(user_id, error = ?e, "scheduled unmute failed");
                }
            }
        });
    }

    /// Ręczne odciszenie. Zdejmuje flagę żywotności (zaplanowany unmute
    /// zrobi no-op) i rolę, best-effort.
    pub async fn release_mute(&self, platform: &Arc<dyn ChatPlatform>, user_id: u64) {
        let was_muted = self.muted.remove(&user_id).is_some();
        if let Some(role_id) = self.punishment.muted_role_id {
            if let Err(e) = platform.remove_role(user_id, role_id).await {
                warn!(user_id, error = ?e, "manual unmute role removal failed");
            }
        }
        if was_muted {
            info!(user_id, "mute released manually");
        }
    }

    /* =========================================
       Tor długoterminowy: read-only
       ========================================= */

    /// Sprawdza próg read-only dla aktualnego stanu licznika dożywotniego.
    /// Zwraca `true` tylko przy faktycznym nadaniu roli (dokładnie raz).
    pub async fn check_read_only(
        &self,
        platform: &Arc<dyn ChatPlatform>,
        user_id: u64,
        lifetime_total: u64,
    ) -> bool {
        if lifetime_total < self.readonly.threshold {
            return false;
        }
        if self.readonly_granted.contains_key(&user_id) {
            return false; // już w read-only, no-op
        }
        let Some(role_id) = self.readonly.role_id else {
            if !self.readonly_role_warned.swap(true, Ordering::Relaxed) {
                warn!("read-only role not configured, long-term track is a no-op");
            }
            return false;
        };

        // Wzajemne wykluczanie per user: nakładające się eventy nie mogą
        // wystrzelić nadania roli dwa razy.
        let Some(_guard) = InflightGuard::acquire(&self.readonly_inflight, user_id) else {
            return false;
        };
        if self.readonly_granted.contains_key(&user_id) {
            return false;
        }

        match platform.assign_role(user_id, role_id).await {
            Ok(()) => {
                self.readonly_granted.insert(user_id, ());
                info!(user_id, lifetime_total, "read-only role assigned");
                true
            }
            Err(e) => {
                warn!(user_id, error = ?e, "read-only role assignment failed");
                false
            }
        }
    }
}
