//! Discord adapter
//!
//! Wires the gateway to the proxy core: messages either carry a management
//! command or get matched against the author's aliases and re-sent through a
//! channel webhook as the matched persona. The `ChannelProxy` port is
//! implemented here over serenity's HTTP client; everything above this file
//! is platform-agnostic.

use anyhow::Context as AnyhowContext;
use parking_lot::RwLock;
use secrecy::ExposeSecret;
use serenity::async_trait;
use serenity::builder::{CreateAllowedMentions, CreateAttachment, CreateWebhook, EditWebhookMessage, ExecuteWebhook};
use serenity::http::{Http, HttpError};
use serenity::model::channel::{Message, Reaction};
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId, WebhookId};
use serenity::model::permissions::Permissions;
use serenity::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::alias::MatchResult;
use crate::cache::AliasCache;
use crate::channel::{AttachmentRef, ChannelError, ChannelProxy, ProxyPayload, SentMessage};
use crate::commands::{self, Command, CommandHandler};
use crate::config::Config;
use crate::coordinator::{ProxyCoordinator, ProxyRequest};
use crate::deletion::DeleteCoordinator;
use crate::matcher::AliasMatcher;
use crate::permissions::{evaluate, ActorCapabilities, OutboundContent};
use crate::store::SqliteStore;

/// Name given to webhooks this bot creates.
const WEBHOOK_NAME: &str = "formbot proxy";

/// `ChannelProxy` over Discord webhooks.
///
/// One bot-owned webhook per channel, created on first use and cached
/// in-process. Webhook lifecycle beyond get-or-create is out of scope.
#[derive(Clone)]
pub struct WebhookProxy {
    http: Arc<Http>,
    hooks: Arc<RwLock<HashMap<u64, (u64, String)>>>,
}

impl WebhookProxy {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            hooks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn with_cache(http: Arc<Http>, hooks: Arc<RwLock<HashMap<u64, (u64, String)>>>) -> Self {
        Self { http, hooks }
    }

    /// Known webhook for the channel, or fetch/create one.
    async fn webhook_for_channel(&self, channel_id: u64) -> Result<(u64, String), ChannelError> {
        if let Some(hook) = self.hooks.read().get(&channel_id).cloned() {
            return Ok(hook);
        }

        let channel = ChannelId::new(channel_id);
        let existing = channel
            .webhooks(&self.http)
            .await
            .map_err(classify)?
            .into_iter()
            .find_map(|w| {
                let token = w.token.as_ref().map(|t| t.expose_secret().to_string())?;
                Some((w.id.get(), token))
            });

        let hook = match existing {
            Some(hook) => hook,
            None => {
                let created = channel
                    .create_webhook(&self.http, CreateWebhook::new(WEBHOOK_NAME))
                    .await
                    .map_err(classify)?;
                let token = created
                    .token
                    .as_ref()
                    .map(|t| t.expose_secret().to_string())
                    .ok_or_else(|| {
                        ChannelError::Other("webhook created without a token".to_string())
                    })?;
                debug!("Webhook created for channel {}", channel_id);
                (created.id.get(), token)
            }
        };

        self.hooks.write().insert(channel_id, hook.clone());
        Ok(hook)
    }

    /// Webhooks cannot produce native replies; render a short quote header
    /// instead when the original message is still fetchable.
    async fn reply_header(&self, channel_id: u64, reply_to: u64) -> Option<String> {
        let replied = self
            .http
            .get_message(ChannelId::new(channel_id), MessageId::new(reply_to))
            .await
            .ok()?;
        let preview: String = replied.content.chars().take(80).collect();
        Some(format!("> **{}**: {}\n", replied.author.name, preview))
    }
}

#[async_trait]
impl ChannelProxy for WebhookProxy {
    async fn send(
        &self,
        channel_id: u64,
        payload: &ProxyPayload,
    ) -> Result<SentMessage, ChannelError> {
        let (webhook_id, token) = self.webhook_for_channel(channel_id).await?;

        let mut content = payload.content.clone();
        if let Some(reply_to) = payload.reply_to {
            if let Some(header) = self.reply_header(channel_id, reply_to).await {
                content = format!("{header}{content}");
            }
        }

        let mentions = CreateAllowedMentions::new()
            .everyone(payload.allowed_mentions.everyone)
            .users(payload.allowed_mentions.users.iter().map(|id| UserId::new(*id)))
            .roles(payload.allowed_mentions.roles.iter().copied());

        let mut builder = ExecuteWebhook::new()
            .content(content)
            .username(&payload.username)
            .allowed_mentions(mentions);
        if let Some(url) = &payload.avatar_url {
            builder = builder.avatar_url(url);
        }
        if payload.suppress_embeds {
            builder = builder.flags(serenity::model::channel::MessageFlags::SUPPRESS_EMBEDS);
        }

        let mut files = Vec::new();
        for att in &payload.attachments {
            let file = CreateAttachment::url(&self.http, &att.url)
                .await
                .map_err(classify)?;
            files.push(file);
        }

        let message = self
            .http
            .execute_webhook(WebhookId::new(webhook_id), None, &token, true, files, &builder)
            .await
            .map_err(classify)?
            .ok_or_else(|| ChannelError::Other("webhook returned no message".to_string()))?;

        Ok(SentMessage {
            webhook_id,
            webhook_token: token,
            message_id: message.id.get(),
        })
    }

    async fn edit(&self, sent: &SentMessage, content: &str) -> Result<(), ChannelError> {
        let builder = EditWebhookMessage::new().content(content);
        self.http
            .edit_webhook_message(
                WebhookId::new(sent.webhook_id),
                None,
                &sent.webhook_token,
                MessageId::new(sent.message_id),
                &builder,
                Vec::new(),
            )
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete(
        &self,
        channel_id: u64,
        message_id: u64,
        webhook: Option<(u64, &str)>,
    ) -> Result<(), ChannelError> {
        match webhook {
            Some((webhook_id, token)) => self
                .http
                .delete_webhook_message(
                    WebhookId::new(webhook_id),
                    None,
                    token,
                    MessageId::new(message_id),
                )
                .await
                .map_err(classify),
            None => self
                .http
                .delete_message(ChannelId::new(channel_id), MessageId::new(message_id), None)
                .await
                .map_err(classify),
        }
    }
}

/// Map serenity HTTP failures onto the port's distinguishable outcomes.
fn classify(err: serenity::Error) -> ChannelError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) = &err {
        return match resp.status_code.as_u16() {
            404 => ChannelError::NotFound,
            403 => ChannelError::Forbidden,
            429 => ChannelError::RateLimited(1),
            _ => ChannelError::Other(err.to_string()),
        };
    }
    ChannelError::Other(err.to_string())
}

/// Gateway event handler wiring the core together
pub struct Handler {
    matcher: AliasMatcher<SqliteStore>,
    coordinator: ProxyCoordinator<SqliteStore, SqliteStore>,
    deleter: DeleteCoordinator<SqliteStore>,
    commands: CommandHandler<SqliteStore>,
    prefix: String,
    webhook_cache: Arc<RwLock<HashMap<u64, (u64, String)>>>,
}

impl Handler {
    pub fn new(store: Arc<SqliteStore>, cache: AliasCache, prefix: String) -> Self {
        Self {
            matcher: AliasMatcher::new(store.clone(), cache.clone()),
            coordinator: ProxyCoordinator::new(store.clone(), store.clone()),
            deleter: DeleteCoordinator::new(store.clone()),
            commands: CommandHandler::new(store, cache),
            prefix,
            webhook_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn port(&self, ctx: &Context) -> WebhookProxy {
        WebhookProxy::with_cache(ctx.http.clone(), self.webhook_cache.clone())
    }

    async fn handle_command(&self, ctx: &Context, msg: &Message, cmd: Command) {
        let user_id = msg.author.id.get();

        let reply = match cmd {
            Command::Delete { message_id } => {
                let caps = match self.capabilities(ctx, msg).await {
                    Ok(caps) => caps,
                    Err(e) => {
                        warn!("Capability resolution failed: {}", e);
                        return;
                    }
                };
                let port = self.port(ctx);
                match self
                    .deleter
                    .delete_proxied(&port, message_id, user_id, caps.can_manage_messages)
                    .await
                {
                    Ok(outcome) if outcome.ok() => "Message deleted.".to_string(),
                    Ok(outcome) => format!(
                        "Could not delete that message: {}.",
                        outcome.reason().unwrap_or("unknown")
                    ),
                    Err(e) => {
                        error!("Delete of message {} failed: {}", message_id, e);
                        "Something went wrong deleting that message.".to_string()
                    }
                }
            }
            other => match self.commands.execute(user_id, other).await {
                Ok(reply) => reply,
                Err(e) if e.is_user_facing() => e.to_string(),
                Err(e) => {
                    error!("Command failed for user {}: {}", user_id, e);
                    "Something went wrong.".to_string()
                }
            },
        };

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            warn!("Failed to send command reply: {}", e);
        }
    }

    async fn handle_proxy(&self, ctx: &Context, msg: &Message, matched: MatchResult) {
        let user_id = msg.author.id.get();
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        // Nothing to say and nothing to show.
        if matched.rendered_text.is_empty() && msg.attachments.is_empty() {
            return;
        }

        let caps = match self.capabilities(ctx, msg).await {
            Ok(caps) => caps,
            Err(e) => {
                warn!("Capability resolution failed for user {}: {}", user_id, e);
                return;
            }
        };

        let outbound = OutboundContent {
            content: matched.rendered_text,
            attachments: msg
                .attachments
                .iter()
                .map(|a| AttachmentRef {
                    url: a.url.to_string(),
                    filename: a.filename.to_string(),
                })
                .collect(),
        };

        let Some(sanitized) = evaluate(&caps, &outbound) else {
            debug!("Proxy rejected: user {} cannot send here", user_id);
            return;
        };

        let request = ProxyRequest {
            actor_id: user_id,
            form_id: matched.alias.form_id.clone(),
            guild_id: guild_id.get(),
            channel_id: msg.channel_id.get(),
            content: sanitized,
            reply_to: msg.referenced_message.as_ref().map(|r| r.id.get()),
            original_message_id: Some(msg.id.get()),
            prefetched_form: None,
        };

        let port = self.port(ctx);
        match self.coordinator.coordinate(&port, request).await {
            Ok(receipt) => {
                // The trigger message is now duplicated by the proxy; remove
                // it best-effort.
                if let Err(e) = msg.delete(&ctx.http).await {
                    warn!(
                        "Could not delete trigger message {} (proxied as {}): {}",
                        msg.id, receipt.message_id, e
                    );
                }
            }
            Err(e) => {
                error!("Proxy attempt failed for user {}: {}", user_id, e);
            }
        }
    }

    /// Resolve what the author may do in the message's channel.
    async fn capabilities(&self, ctx: &Context, msg: &Message) -> anyhow::Result<ActorCapabilities> {
        let guild_id = msg.guild_id.context("not a guild message")?;
        self.capabilities_in(ctx, guild_id, msg.channel_id, msg.author.id)
            .await
    }

    async fn capabilities_in(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> anyhow::Result<ActorCapabilities> {
        let member = guild_id
            .member(&ctx.http, user_id)
            .await
            .context("member fetch failed")?;
        let guild = guild_id
            .to_partial_guild(&ctx.http)
            .await
            .context("guild fetch failed")?;
        let channels = guild_id
            .channels(&ctx.http)
            .await
            .context("channel list fetch failed")?;
        let channel = channels
            .get(&channel_id)
            .context("channel not found in guild")?;

        let perms = guild.user_permissions_in(channel, &member);
        Ok(capabilities_from(perms))
    }
}

fn capabilities_from(perms: Permissions) -> ActorCapabilities {
    ActorCapabilities {
        can_send: perms.send_messages(),
        can_embed: perms.embed_links(),
        can_attach: perms.attach_files(),
        can_mention_everyone: perms.mention_everyone(),
        can_manage_messages: perms.manage_messages(),
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if let Some(cmd) = commands::parse(&self.prefix, &msg.content) {
            self.handle_command(&ctx, &msg, cmd).await;
            return;
        }

        if msg.guild_id.is_none() {
            return;
        }

        let matched = match self.matcher.match_text(msg.author.id.get(), &msg.content).await {
            Ok(Some(matched)) => matched,
            Ok(None) => return,
            Err(e) => {
                error!("Alias match failed for user {}: {}", msg.author.id, e);
                return;
            }
        };

        self.handle_proxy(&ctx, &msg, matched).await;
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        if !reaction.emoji.unicode_eq("\u{274c}") {
            return;
        }
        let Some(user_id) = reaction.user_id else {
            return;
        };
        let Some(guild_id) = reaction.guild_id else {
            return;
        };

        let caps = match self
            .capabilities_in(&ctx, guild_id, reaction.channel_id, user_id)
            .await
        {
            Ok(caps) => caps,
            Err(e) => {
                warn!("Capability resolution failed for reactor {}: {}", user_id, e);
                return;
            }
        };

        let port = self.port(&ctx);
        match self
            .deleter
            .delete_proxied(
                &port,
                reaction.message_id.get(),
                user_id.get(),
                caps.can_manage_messages,
            )
            .await
        {
            Ok(outcome) => {
                debug!(
                    "Reaction delete on {}: ok={} reason={:?}",
                    reaction.message_id,
                    outcome.ok(),
                    outcome.reason()
                );
            }
            Err(e) => {
                error!("Reaction delete on {} failed: {}", reaction.message_id, e);
            }
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected", ready.user.name);
    }
}

/// Build the store-backed handler and run the gateway client.
pub async fn run_bot(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let cache = AliasCache::new(config.cache_ttl_secs);
    let handler = Handler::new(store, cache, config.command_prefix.clone());

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .context("Failed to create Discord client")?;

    info!("Starting Discord gateway (prefix `{}`)", config.command_prefix);
    client.start().await.context("Discord client error")?;

    Ok(())
}
