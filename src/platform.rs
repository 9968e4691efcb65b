//! src/platform.rs
//! Abstrakcja platformy czatowej. Rdzeń moderacji nie wie nic o serenity —
//! dostaje `InboundMessage` i gada przez ten trait. Produkcyjna implementacja
//! siedzi w `discord::DiscordPlatform`, testy wstawiają własne atrapy.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serenity::async_trait;

/// Wiadomość przychodząca w postaci niezależnej od platformy.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub id: u64,
    pub channel_id: u64,
    pub category_id: Option<u64>,
    pub author_id: u64,
    pub author_tag: String,
    pub author_is_bot: bool,
    pub author_role_ids: Vec<u64>,
    pub content: String,
    pub user_mentions: u32,
    pub role_mentions: u32,
    pub mentions_everyone: bool,
}

/// Raport moderacyjny w formie neutralnej; adapter platformy renderuje go
/// jak chce (na Discordzie: embed).
#[derive(Debug, Clone, Default)]
pub struct ModReport {
    pub title: String,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub mention_role_id: Option<u64>,
}

impl ModReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Default::default() }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// Możliwości platformy potrzebne rdzeniowi. Wszystkie wywołania są
/// best-effort, single-attempt — błędy łyka i loguje strona wołająca.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<()>;

    /// Wysyła raport na kanał, zwraca id wiadomości (do późniejszej edycji).
    async fn send_report(&self, channel_id: u64, report: &ModReport) -> Result<u64>;

    /// Edytuje istniejący raport (standing report per użytkownik).
    async fn edit_report(&self, channel_id: u64, message_id: u64, report: &ModReport)
        -> Result<()>;

    async fn send_dm(&self, user_id: u64, report: &ModReport) -> Result<()>;

    async fn assign_role(&self, user_id: u64, role_id: u64) -> Result<()>;

    async fn remove_role(&self, user_id: u64, role_id: u64) -> Result<()>;

    /// Natywny timed mute (timeout) do wskazanego momentu.
    async fn timeout_member(&self, user_id: u64, until: DateTime<Utc>) -> Result<()>;

    /// Strona wiadomości starszych niż `before` (albo najnowszych, gdy None),
    /// posortowana od najnowszej.
    async fn fetch_messages_before(
        &self,
        channel_id: u64,
        before: Option<u64>,
        limit: u8,
    ) -> Result<Vec<InboundMessage>>;

    /// Id najnowszej wiadomości na kanale (checkpoint po skanie).
    async fn latest_message_id(&self, channel_id: u64) -> Result<Option<u64>>;
}
