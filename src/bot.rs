//! Discord gateway connection, presence and group registration.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use anyhow::anyhow;
use async_trait::async_trait;
use log::debug;
use log::error;
use log::info;
use log::warn;
use poise::serenity_prelude::ActivityData;
use poise::serenity_prelude::ChannelType;
use poise::serenity_prelude::ClientBuilder;
use poise::serenity_prelude::Context;
use poise::serenity_prelude::FullEvent;
use poise::serenity_prelude::GatewayIntents;
use poise::serenity_prelude::Guild;
use poise::serenity_prelude::Http;
use poise::serenity_prelude::Token;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::repository::Repository;
use crate::task::status_reporter::StatusSink;

/// Discord bot client.
pub struct Bot {
    pub http: Arc<Http>,
    pub presence: Arc<Presence>,
    client_builder: Option<ClientBuilder>,
}

impl Bot {
    pub fn new(config: &Config, repository: Arc<Repository>) -> Result<Self> {
        info!("Initializing bot...");

        let token = Token::from_str(&config.discord_token)?;
        let presence = Arc::new(Presence::default());
        let event_handler = Arc::new(BotEventHandler::new(repository, presence.clone()));

        let client_builder =
            ClientBuilder::new(token.clone(), GatewayIntents::GUILDS).event_handler(event_handler);

        Ok(Self {
            http: Arc::new(Http::new(token)),
            presence,
            client_builder: Some(client_builder),
        })
    }

    /// Connects to Discord in a background task.
    pub fn start(&mut self) -> Result<()> {
        let client_builder = self
            .client_builder
            .take()
            .ok_or_else(|| anyhow!("Bot client was already started"))?;

        tokio::spawn(async move {
            info!("Connecting bot to Discord...");
            let mut client = match client_builder.await {
                Ok(client) => client,
                Err(e) => {
                    error!("Failed to build Discord client: {e}");
                    return;
                }
            };
            info!("Bot connected to Discord.");

            if let Err(e) = client.start().await {
                error!("Bot client stopped: {e}");
            }
        });

        info!("Bot client start initiated.");
        Ok(())
    }
}

/// Custom status of the bot user.
///
/// Updates made before the gateway is ready are dropped.
#[derive(Default)]
pub struct Presence {
    ctx: RwLock<Option<Context>>,
}

impl Presence {
    async fn attach(&self, ctx: &Context) {
        *self.ctx.write().await = Some(ctx.clone());
    }
}

#[async_trait]
impl StatusSink for Presence {
    async fn set_status(&self, text: String) {
        match self.ctx.read().await.as_ref() {
            Some(ctx) => ctx.set_activity(Some(ActivityData::custom(text))),
            None => debug!("Gateway not ready. Dropping status \"{text}\"."),
        }
    }
}

/// A guild channel as seen when choosing where alerts go.
#[derive(Clone, Copy, Debug)]
struct ChannelCandidate {
    id: u64,
    position: u16,
    text: bool,
    sendable: bool,
}

/// Picks a group's alert channel: the system channel if the bot can post
/// there, else the topmost text channel it can post to.
fn alert_channel(system_channel_id: Option<u64>, channels: &[ChannelCandidate]) -> Option<u64> {
    let usable = channels.iter().filter(|c| c.text && c.sendable);
    if let Some(id) = system_channel_id
        && usable.clone().any(|c| c.id == id)
    {
        return Some(id);
    }
    usable.min_by_key(|c| (c.position, c.id)).map(|c| c.id)
}

fn alert_channel_of(ctx: &Context, guild: &Guild) -> Option<u64> {
    let bot_id = ctx.cache.current_user().id;
    // Without the bot's member entry, permissions are left to the send.
    let member = guild.members.get(&bot_id);
    let channels: Vec<ChannelCandidate> = guild
        .channels
        .iter()
        .map(|channel| ChannelCandidate {
            id: channel.id.get(),
            position: channel.position,
            text: channel.kind == ChannelType::Text,
            sendable: member.is_none_or(|member| {
                guild.user_permissions_in(channel, member).send_messages()
            }),
        })
        .collect();
    alert_channel(guild.system_channel_id.map(|id| id.get()), &channels)
}

/// Event handler for Discord gateway events.
pub struct BotEventHandler {
    repository: Arc<Repository>,
    presence: Arc<Presence>,
}

impl BotEventHandler {
    pub fn new(repository: Arc<Repository>, presence: Arc<Presence>) -> Self {
        Self {
            repository,
            presence,
        }
    }

    async fn on_guild_create(&self, guild_id: u64, channel_id: Option<u64>) {
        let channel_id = channel_id.map(|id| id as i64);
        match self.repository.add_group(guild_id as i64, channel_id).await {
            Ok(true) => info!("Registered guild `{guild_id}` (alert channel: {channel_id:?})."),
            Ok(false) => debug!("Guild `{guild_id}` is already registered."),
            Err(e) => error!("Failed to register guild `{guild_id}`: {e}"),
        }
    }

    async fn on_guild_delete(&self, guild_id: u64, unavailable: bool) {
        if unavailable {
            warn!("Guild `{guild_id}` became unavailable. Keeping its subscriptions.");
            return;
        }
        if let Err(e) = self.repository.remove_group(guild_id as i64).await {
            error!("Failed to remove guild `{guild_id}`: {e}");
        }
    }
}

#[async_trait]
impl poise::serenity_prelude::EventHandler for BotEventHandler {
    async fn dispatch(&self, context: &Context, event: &FullEvent) {
        match event {
            FullEvent::Ready { data_about_bot, .. } => {
                info!("Bot is ready as {}.", data_about_bot.user.name);
                self.presence.attach(context).await;
            }
            FullEvent::GuildCreate { guild, .. } => {
                let channel_id = alert_channel_of(context, guild);
                if channel_id.is_none() {
                    warn!("Guild `{}` has no text channel the bot can post to.", guild.id);
                }
                self.on_guild_create(guild.id.get(), channel_id).await;
            }
            FullEvent::GuildDelete { incomplete, .. } => {
                self.on_guild_delete(incomplete.id.get(), incomplete.unavailable)
                    .await;
            }
            _ => {}
        };
    }
}
