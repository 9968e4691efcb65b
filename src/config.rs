use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub discord: Discord,
    pub storage: Storage,
    pub logging: Logging,
    pub filter: FilterConfig,
    pub spam: SpamConfig,
    pub punishment: PunishmentConfig,
    pub readonly: ReadOnlyConfig,
    pub retention: RetentionConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub app_id: Option<String>,
    pub intents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Storage {
    /// Plik JSON z licznikami dożywotnimi i checkpointami skanu.
    pub state_file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub json: Option<bool>,
    pub level: Option<String>,
}

/// Źródła słownika i routing moderacji (kanały/kategorie/role).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FilterConfig {
    pub badwords_json: Option<String>,
    pub badwords_txt: Option<String>,
    #[serde(default)]
    pub extra_words: Vec<String>,
    /// Kanały całkiem poza moderacją (chyba że w wymuszonej kategorii).
    #[serde(default)]
    pub exempt_channel_ids: Vec<u64>,
    /// Kategorie, w których moderacja działa nawet na kanałach z listy wyjątków.
    #[serde(default)]
    pub enforced_category_ids: Vec<u64>,
    #[serde(default)]
    pub bypass_role_ids: Vec<u64>,
    /// Na tym kanale spam-only nie kasuje wiadomości (ogólny czat).
    pub keep_message_channel_id: Option<u64>,
    pub bug_reports_channel_id: Option<u64>,
    pub moderation_log_channel_id: Option<u64>,
    pub mod_role_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpamConfig {
    pub rate_limit: RateLimitConfig,
    pub duplicates: DuplicatesConfig,
    pub mentions: MentionsConfig,
    pub links: LinksConfig,
    pub emoji: EmojiConfig,
    pub caps: CapsConfig,
    pub invites: InvitesConfig,
    /// Skompresowana/oryginalna długość poniżej tego progu == stretched text.
    pub stretched_ratio: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_messages: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DuplicatesConfig {
    pub window_ms: u64,
    pub max_duplicates: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MentionsConfig {
    pub max_mentions: u32,
    pub max_role_mentions: u32,
    #[serde(default)]
    pub allowed_broadcast_user_ids: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinksConfig {
    pub max_links: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmojiConfig {
    pub max_emojis: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapsConfig {
    pub enabled: bool,
    pub min_length: u32,
    pub caps_percentage: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvitesConfig {
    pub enabled: bool,
    /// Podciągi zapraszające uznawane za własne (np. zaproszenie serwera).
    #[serde(default)]
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PunishmentConfig {
    pub warnings_before_mute: u32,
    pub mute_duration_ms: u64,
    pub warning_reset_ms: u64,
    /// Rola Muted; brak == natywny timeout platformy.
    pub muted_role_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadOnlyConfig {
    pub role_id: Option<u64>,
    /// Próg licznika dożywotniego.
    pub threshold: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    pub history_retention_ms: u64,
    pub max_entries_per_user: u32,
    pub max_map_entries: u32,
    pub cleanup_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    pub max_messages: u32,
    pub page_size: u8,
    pub delete_violations: bool,
    pub page_delay_ms: u64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Które środowisko?
        let env = std::env::var("PGS_ENV").unwrap_or_else(|_| "development".to_string());

        // Załaduj .env.<env> i .env (jeśli są)
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        // Domyślne wartości
        #[derive(Deserialize, Serialize)]
        struct Defaults {
            env: String,
            app: App,
            discord: Discord,
            storage: Storage,
            logging: Logging,
            filter: FilterConfig,
            spam: SpamConfig,
            punishment: PunishmentConfig,
            readonly: ReadOnlyConfig,
            retention: RetentionConfig,
            scan: ScanConfig,
        }

        let defaults = Defaults {
            env: env.clone(),
            app: App {
                name: "Pardus Guard".into(),
            },
            discord: Discord {
                token: "".into(),
                app_id: None,
                intents: vec![
                    "GUILDS".into(),
                    "GUILD_MEMBERS".into(),
                    "GUILD_MESSAGES".into(),
                    "MESSAGE_CONTENT".into(),
                ],
            },
            storage: Storage {
                state_file: "data/state.json".into(),
            },
            logging: Logging {
                json: Some(false),
                level: Some("info".into()),
            },
            filter: FilterConfig {
                badwords_json: Some("data/badwords.json".into()),
                badwords_txt: Some("data/badwords-list.txt".into()),
                ..FilterConfig::default()
            },
            spam: SpamConfig {
                rate_limit: RateLimitConfig {
                    window_ms: 8_000,
                    max_messages: 5,
                },
                duplicates: DuplicatesConfig {
                    window_ms: 30_000,
                    max_duplicates: 3,
                },
                mentions: MentionsConfig {
                    max_mentions: 5,
                    max_role_mentions: 2,
                    allowed_broadcast_user_ids: vec![],
                },
                links: LinksConfig {
                    max_links: 3,
                    window_ms: 60_000,
                },
                emoji: EmojiConfig { max_emojis: 15 },
                caps: CapsConfig {
                    enabled: false,
                    min_length: 10,
                    caps_percentage: 70,
                },
                invites: InvitesConfig {
                    enabled: true,
                    allowed: vec![],
                },
                stretched_ratio: 0.55,
            },
            punishment: PunishmentConfig {
                warnings_before_mute: 3,
                mute_duration_ms: 300_000,
                warning_reset_ms: 3_600_000,
                muted_role_id: None,
            },
            readonly: ReadOnlyConfig {
                role_id: None,
                threshold: 20,
            },
            retention: RetentionConfig {
                history_retention_ms: 7_200_000,
                max_entries_per_user: 50,
                max_map_entries: 5_000,
                cleanup_interval_ms: 300_000,
            },
            scan: ScanConfig {
                max_messages: 500,
                page_size: 100,
                delete_violations: false,
                page_delay_ms: 1_000,
            },
        };

        // Warstwy: domyślne -> plik TOML -> zmienne środowiskowe PGS_*
        let figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(format!("config/{}.toml", env)))
            // PGS_DISCORD_TOKEN => discord.token itd.
            .merge(Env::prefixed("PGS_").split("_"));

        let mut s: Settings = figment.extract()?;
        s.env = env;

        Ok(s)
    }
}
