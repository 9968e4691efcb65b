// src/lib.rs

pub mod badwords;
pub mod config;
pub mod discord;
pub mod escalate;
pub mod guard;
pub mod ledger;
pub mod logging;
pub mod normalize;
pub mod platform;
pub mod scan;
pub mod spam;
pub mod store;

use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use badwords::BadContentMatcher;
use config::Settings;
use escalate::EscalationEngine;
use guard::ChatGuard;
use ledger::{LifetimeCounters, ViolationLedger};
use scan::HistoryScanner;
use spam::SpamDetector;
use store::{FileStore, Store};

// gotowiec z właściwymi intents do użycia w discord::run_bot
use serenity::all::GatewayIntents;

/// Globalny kontekst aplikacji.
/// Konfiguracja, magazyn stanu i gotowe serwisy (ChatGuard, HistoryScanner).
#[derive(Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub store: Arc<dyn Store>,
    guard: OnceCell<Arc<ChatGuard>>,
    scanner: OnceCell<Arc<HistoryScanner>>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - magazyn plikowy + słownik wulgaryzmów
    /// - złożenie pipeline'u moderacji i wstrzyknięcie do OnceCell
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        // 1) logi
        logging::init(&settings);

        // 2) stan na dysku
        let store: Arc<dyn Store> = FileStore::open(settings.storage.state_file.clone());

        // 3) słownik
        let json_path = settings
            .filter
            .badwords_json
            .as_deref()
            .unwrap_or("data/badwords.json");
        let txt_path = settings
            .filter
            .badwords_txt
            .as_deref()
            .unwrap_or("data/badwords-list.txt");
        let matcher = BadContentMatcher::load(
            std::path::Path::new(json_path),
            std::path::Path::new(txt_path),
            &settings.filter.extra_words,
        )?;

        // 4) kontekst (na razie z pustymi OnceCell)
        let ctx = Arc::new(Self {
            settings: settings.clone(),
            store: store.clone(),
            guard: OnceCell::new(),
            scanner: OnceCell::new(),
        });

        // 5) ChatGuard (spina detektory, dziennik i eskalację; startuje
        //    własny task sprzątający)
        let guard = ChatGuard::new(
            settings.filter.clone(),
            matcher,
            SpamDetector::new(settings.spam.clone()),
            ViolationLedger::new(settings.retention.clone()),
            EscalationEngine::new(settings.punishment.clone(), settings.readonly.clone()),
            LifetimeCounters::new(store.clone()),
            settings.retention.cleanup_interval_ms,
        );
        let _ = ctx.guard.set(guard.clone()); // set() można wołać tylko raz

        // 6) HistoryScanner
        let scanner = HistoryScanner::new(settings.scan.clone(), store, guard);
        let _ = ctx.scanner.set(scanner);

        Ok(ctx)
    }

    /// Wygodny getter: daj mi ChatGuarda (Arc).
    pub fn guard(&self) -> Arc<ChatGuard> {
        self.guard.get().expect("ChatGuard not initialized").clone()
    }

    /// Wygodny getter: daj mi HistoryScannera (Arc).
    pub fn scanner(&self) -> Arc<HistoryScanner> {
        self.scanner
            .get()
            .expect("HistoryScanner not initialized")
            .clone()
    }

    /// Środowisko: "production" | "development".
    /// Czytamy z ENV `PGS_ENV`; brak → "development".
    #[inline]
    pub fn env(&self) -> String {
        std::env::var("PGS_ENV").unwrap_or_else(|_| "development".to_string())
    }
}

/// Gotowy zestaw intents do użycia w kliencie Discord:
/// - GUILDS, GUILD_MESSAGES, MESSAGE_CONTENT (konieczne do filtrowania treści),
/// - GUILD_MEMBERS (role – bypass, Muted, read-only).
pub fn default_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
}

/// Start klienta Discorda (Gateway + slash commands).
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    discord::run_bot(ctx).await
}
