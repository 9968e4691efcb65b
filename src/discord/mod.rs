// src/discord/mod.rs
//! Warstwa Discorda: adapter `ChatPlatform` na serenity, EventHandler i
//! rejestracja komendy /scan. Rdzeń moderacji nie importuje stąd niczego.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures_util::FutureExt;
use serenity::all::*;
use serenity::async_trait;

use crate::AppContext;
use crate::platform::{ChatPlatform, InboundMessage, ModReport};

const BRAND_FOOTER: &str = "Pardus Guard";

/* ============================================================
   Adapter platformy
   ============================================================ */

pub struct DiscordPlatform {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, guild_id: GuildId) -> Arc<Self> {
        Arc::new(Self { http, guild_id })
    }
}

fn render_embed(report: &ModReport) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(report.title.clone())
        .description(report.description.clone())
        .footer(CreateEmbedFooter::new(BRAND_FOOTER))
        .timestamp(Timestamp::now());
    for (name, value) in &report.fields {
        // Discord odrzuca puste pola embedów
        if !value.is_empty() {
            embed = embed.field(name.clone(), value.clone(), false);
        }
    }
    embed
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<()> {
        ChannelId::new(channel_id)
            .delete_message(&self.http, MessageId::new(message_id))
            .await?;
        Ok(())
    }

    async fn send_report(&self, channel_id: u64, report: &ModReport) -> Result<u64> {
        let mut builder = CreateMessage::new().embed(render_embed(report));
        if let Some(role_id) = report.mention_role_id {
            builder = builder.content(format!("<@&{role_id}>"));
        }
        let sent = ChannelId::new(channel_id)
            .send_message(&self.http, builder)
            .await?;
        Ok(sent.id.get())
    }

    async fn edit_report(
        &self,
        channel_id: u64,
        message_id: u64,
        report: &ModReport,
    ) -> Result<()> {
        ChannelId::new(channel_id)
            .edit_message(
                &self.http,
                MessageId::new(message_id),
                EditMessage::new().embed(render_embed(report)),
            )
            .await?;
        Ok(())
    }

    async fn send_dm(&self, user_id: u64, report: &ModReport) -> Result<()> {
        let channel = UserId::new(user_id).create_dm_channel(&self.http).await?;
        channel
            .id
            .send_message(&self.http, CreateMessage::new().embed(render_embed(report)))
            .await?;
        Ok(())
    }

    async fn assign_role(&self, user_id: u64, role_id: u64) -> Result<()> {
        self.http
            .add_member_role(
                self.guild_id,
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("Pardus Guard moderation"),
            )
            .await?;
        Ok(())
    }

    async fn remove_role(&self, user_id: u64, role_id: u64) -> Result<()> {
        self.http
            .remove_member_role(
                self.guild_id,
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("Pardus Guard moderation"),
            )
            .await?;
        Ok(())
    }

    async fn timeout_member(&self, user_id: u64, until: chrono::DateTime<chrono::Utc>) -> Result<()> {
        self.guild_id
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new().disable_communication_until_datetime(timeout_timestamp(until)?),
            )
            .await?;
        Ok(())
    }

    async fn fetch_messages_before(
        &self,
        channel_id: u64,
        before: Option<u64>,
        limit: u8,
    ) -> Result<Vec<InboundMessage>> {
        let mut builder = GetMessages::new().limit(limit);
        if let Some(before) = before {
            builder = builder.before(MessageId::new(before));
        }
        let messages = ChannelId::new(channel_id)
            .messages(&self.http, builder)
            .await?;
        // serenity zwraca od najnowszej — dokładnie tak, jak chce skaner
        Ok(messages.iter().map(|m| convert_message(m, None)).collect())
    }

    async fn latest_message_id(&self, channel_id: u64) -> Result<Option<u64>> {
        let messages = ChannelId::new(channel_id)
            .messages(&self.http, GetMessages::new().limit(1))
            .await?;
        Ok(messages.first().map(|m| m.id.get()))
    }
}

fn timeout_timestamp(until: chrono::DateTime<chrono::Utc>) -> Result<Timestamp> {
    Timestamp::from_unix_timestamp(until.timestamp())
        .map_err(|e| anyhow::anyhow!("invalid timeout timestamp: {e}"))
}

fn convert_message(msg: &Message, category_id: Option<u64>) -> InboundMessage {
    InboundMessage {
        id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        category_id,
        author_id: msg.author.id.get(),
        author_tag: msg.author.tag(),
        author_is_bot: msg.author.bot,
        author_role_ids: msg
            .member
            .as_ref()
            .map(|m| m.roles.iter().map(|r| r.get()).collect())
            .unwrap_or_default(),
        content: msg.content.clone(),
        user_mentions: msg.mentions.len() as u32,
        role_mentions: msg.mention_roles.len() as u32,
        mentions_everyone: msg.mention_everyone,
    }
}

/* ============================================================
   EventHandler
   ============================================================ */

pub struct Handler {
    pub app: Arc<AppContext>,
}

impl Handler {
    fn platform(&self, ctx: &Context, guild_id: GuildId) -> Arc<dyn ChatPlatform> {
        DiscordPlatform::new(ctx.http.clone(), guild_id)
    }

    /// Kategoria kanału ma znaczenie tylko przy nadpisywaniu wyjątków, więc
    /// dociągamy ją z API wyłącznie dla kanałów z listy wyjątków.
    async fn category_of(&self, ctx: &Context, channel_id: ChannelId) -> Option<u64> {
        if !self
            .app
            .settings
            .filter
            .exempt_channel_ids
            .contains(&channel_id.get())
        {
            return None;
        }
        match channel_id.to_channel(&ctx.http).await {
            Ok(Channel::Guild(ch)) => ch.parent_id.map(|p| p.get()),
            _ => None,
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("Logged in as {}", ready.user.name);
        for g in ready.guilds {
            if let Err(e) = register_commands_for_guild(&ctx, g.id).await {
                tracing::warn!(error=?e, gid=%g.id.get(), "register_commands_for_guild failed");
            }
        }
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        if let Err(e) = register_commands_for_guild(&ctx, guild.id).await {
            tracing::warn!(error=?e, gid=%guild.id.get(), "register_commands_for_guild failed (on guild_create)");
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(gid) = msg.guild_id else {
            return;
        };
        if msg.author.bot {
            return;
        }

        let category_id = self.category_of(&ctx, msg.channel_id).await;
        let inbound = convert_message(&msg, category_id);
        let platform = self.platform(&ctx, gid);
        let guard = self.app.guard();

        // Panika w pipeline nie może ubić gateway taska.
        let fut = async {
            guard.on_message(&platform, &inbound, chrono::Utc::now()).await;
        };
        if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
            tracing::error!(
                message_id = inbound.id,
                channel_id = inbound.channel_id,
                "moderation pipeline panicked"
            );
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Some(cmd) = interaction.command() {
            if cmd.data.name.as_str() == "scan" {
                if let Err(e) = handle_scan(&ctx, &self.app, &cmd).await {
                    tracing::warn!(error=?e, "scan command failed");
                }
            }
        }
    }
}

/* ============================================================
   /scan
   ============================================================ */

async fn register_commands_for_guild(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("scan")
                .description("Przeskanuj historię kanału pod kątem naruszeń.")
                .default_member_permissions(Permissions::MODERATE_MEMBERS)
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::Channel,
                        "channel",
                        "Kanał do przeskanowania",
                    )
                    .required(true),
                ),
        )
        .await?;
    Ok(())
}

async fn handle_scan(ctx: &Context, app: &Arc<AppContext>, cmd: &CommandInteraction) -> Result<()> {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true)),
    )
    .await?;
    let Some(gid) = cmd.guild_id else {
        return edit(ctx, cmd, "Użyj na serwerze.").await;
    };

    let mut channel: Option<ChannelId> = None;
    for o in &cmd.data.options {
        if let ("channel", CommandDataOptionValue::Channel(c)) = (&o.name[..], &o.value) {
            channel = Some(*c);
        }
    }
    let Some(channel) = channel else {
        return edit(ctx, cmd, "Wskaż kanał.").await;
    };

    let platform: Arc<dyn ChatPlatform> = DiscordPlatform::new(ctx.http.clone(), gid);
    let outcome = app
        .scanner()
        .scan_channel(&platform, channel.get())
        .await;

    let mut txt = format!(
        "✅ Przeskanowano **{}** wiadomości na <#{}>: {} wulgaryzmów, {} sygnałów spamu, {} usuniętych.",
        outcome.scanned,
        channel.get(),
        outcome.bad_word_hits,
        outcome.spam_hits,
        outcome.deleted,
    );
    if !outcome.errors.is_empty() {
        txt.push_str(&format!(" ⚠️ Błędów: {}.", outcome.errors.len()));
    }
    edit(ctx, cmd, &txt).await
}

async fn edit(ctx: &Context, cmd: &CommandInteraction, text: &str) -> Result<()> {
    cmd.edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await?;
    Ok(())
}

/* ============================================================
   Start klienta
   ============================================================ */

fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            _ => {}
        }
    }
    i
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Brak tokenu Discord (PGS_DISCORD_TOKEN). Uzupełnij w .env.");
    }

    let intents = intents_from_settings(&ctx.settings.discord.intents);

    let handler = Handler { app: ctx.clone() };

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    tracing::info!("Discord client starting…");
    client.start().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timeout_timestamp_preserves_the_unix_second() {
        let until = chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        let ts = timeout_timestamp(until).unwrap();
        assert_eq!(ts.unix_timestamp(), until.timestamp());
    }
}
