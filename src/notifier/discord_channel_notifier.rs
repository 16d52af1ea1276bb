//! Sink that posts alerts as embeds to Discord guild channels.

use std::sync::Arc;

use anyhow::Result;
use log::debug;
use log::info;
use poise::serenity_prelude::ChannelId;
use poise::serenity_prelude::Colour;
use poise::serenity_prelude::CreateEmbed;
use poise::serenity_prelude::CreateMessage;
use poise::serenity_prelude::GuildId;
use poise::serenity_prelude::Http;

use crate::notifier::Destination;
use crate::notifier::NotificationSink;
use crate::notifier::alert::Alert;

pub struct DiscordChannelNotifier {
    http: Arc<Http>,
}

impl DiscordChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        debug!("Initializing DiscordChannelNotifier.");
        Self { http }
    }

    /// Renders an alert as an embed message.
    pub fn create_message(alert: &Alert) -> CreateMessage<'static> {
        let mut embed = CreateEmbed::new()
            .title(alert.title.clone())
            .url(alert.url.clone())
            .colour(Colour::new(alert.colour));
        if !alert.image_url.is_empty() {
            embed = embed.image(alert.image_url.clone());
        }
        for field in &alert.fields {
            embed = embed.field(field.name.clone(), field.value.clone(), field.inline);
        }

        CreateMessage::new().embed(embed)
    }
}

#[async_trait::async_trait]
impl NotificationSink for DiscordChannelNotifier {
    async fn send(&self, destination: &Destination, alert: &Alert) -> Result<()> {
        let guild_id = GuildId::new(u64::try_from(destination.group_id)?);
        let channel_id = ChannelId::new(u64::try_from(destination.channel_id)?);

        debug!("Fetching channel id `{}`.", channel_id);
        let channel = channel_id
            .to_guild_channel(&self.http, Some(guild_id))
            .await?;

        debug!(
            "Fetched channel id `{}` ({}). Sending alert for listing `{}`.",
            channel_id, channel.base.name, alert.listing_id
        );
        channel
            .send_message(&self.http, Self::create_message(alert))
            .await?;

        info!(
            "Sent {:?} alert for listing `{}` to channel id `{}` ({}).",
            alert.kind, alert.listing_id, channel_id, channel.base.name
        );
        Ok(())
    }
}
