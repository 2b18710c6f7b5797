//! Proxy coordinator
//!
//! Orchestrates one proxy attempt: resolve the persona, build the webhook
//! payload, send exactly once, then record the linkage. The linkage row is
//! written only after a confirmed send; a send that succeeds but whose
//! linkage insert fails is surfaced as an error and left for reconciliation
//! rather than rolled back by deleting the message.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::alias::Form;
use crate::channel::{ChannelProxy, ProxyPayload};
use crate::error::{ProxyError, Result};
use crate::permissions::SanitizedContent;
use crate::store::{AliasStore, LinkStore, ProxiedMessage};

/// One validated proxy attempt
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub actor_id: u64,
    pub form_id: String,
    pub guild_id: u64,
    pub channel_id: u64,
    pub content: SanitizedContent,
    /// Message this proxy replies to, if any.
    pub reply_to: Option<u64>,
    /// The user message that triggered the proxy, for the linkage record.
    pub original_message_id: Option<u64>,
    /// Skips the form fetch when the caller already resolved it.
    pub prefetched_form: Option<Form>,
}

/// Identifiers of the message the attempt produced
#[derive(Debug, Clone)]
pub struct ProxyReceipt {
    pub webhook_id: u64,
    pub webhook_token: String,
    pub message_id: u64,
}

/// Coordinates persona resolution, the single send, and linkage persistence
pub struct ProxyCoordinator<S, L> {
    forms: Arc<S>,
    links: Arc<L>,
}

impl<S: AliasStore, L: LinkStore> ProxyCoordinator<S, L> {
    pub fn new(forms: Arc<S>, links: Arc<L>) -> Self {
        Self { forms, links }
    }

    /// Run one proxy attempt through the channel port.
    ///
    /// Guarantees: no send without a resolved persona, at most one send-port
    /// call, no linkage row without a confirmed send.
    pub async fn coordinate(
        &self,
        port: &dyn ChannelProxy,
        req: ProxyRequest,
    ) -> Result<ProxyReceipt> {
        info!(
            "Proxy attempt: actor {} form {} channel {} guild {}",
            req.actor_id, req.form_id, req.channel_id, req.guild_id
        );

        let form = match req.prefetched_form {
            Some(form) => form,
            None => self
                .forms
                .form_by_id(&req.form_id)
                .await?
                .ok_or_else(|| ProxyError::NotFound(format!("form {}", req.form_id)))?,
        };

        let payload = ProxyPayload {
            username: form.name.clone(),
            avatar_url: form.avatar_url.clone(),
            content: req.content.content.clone(),
            allowed_mentions: req.content.allowed_mentions.clone(),
            attachments: req.content.attachments.clone(),
            suppress_embeds: req.content.suppress_embeds,
            reply_to: req.reply_to,
        };

        let sent = port.send(req.channel_id, &payload).await.map_err(|e| {
            warn!(
                "Proxy send failed: actor {} form {} channel {}: {}",
                req.actor_id, req.form_id, req.channel_id, e
            );
            ProxyError::Transport(e.to_string())
        })?;

        let link = ProxiedMessage {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: req.actor_id,
            form_id: form.id.clone(),
            guild_id: req.guild_id,
            channel_id: req.channel_id,
            webhook_id: sent.webhook_id,
            webhook_token: sent.webhook_token.clone(),
            message_id: sent.message_id,
            original_message_id: req.original_message_id,
            created_at: chrono::Utc::now().timestamp(),
        };

        if let Err(e) = self.links.insert_link(&link).await {
            // The remote message now exists without a linkage. Surface the
            // error; reconciliation tooling owns this window.
            error!(
                "Linkage insert failed after send: actor {} message {}: {}",
                req.actor_id, sent.message_id, e
            );
            return Err(e);
        }

        info!(
            "Proxy sent: actor {} as `{}` message {} in channel {}",
            req.actor_id, form.name, sent.message_id, req.channel_id
        );

        Ok(ProxyReceipt {
            webhook_id: sent.webhook_id,
            webhook_token: sent.webhook_token,
            message_id: sent.message_id,
        })
    }
}
