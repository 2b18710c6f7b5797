//! Permission guard for outbound proxy content
//!
//! Pure mapping from resolved actor capabilities and outbound content to a
//! payload that is safe to hand to the webhook, or a rejection when the
//! actor cannot send at all. Capability resolution (who can do what in which
//! channel) happens in the adapter; nothing here does I/O.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::channel::{AllowedMentions, AttachmentRef};

static USER_MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@!?(\d+)>").unwrap());
static ROLE_MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@&(\d+)>").unwrap());

/// What the actor may do in the target channel, resolved by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorCapabilities {
    pub can_send: bool,
    pub can_embed: bool,
    pub can_attach: bool,
    /// everyone/here/role pings pass through unfiltered when set.
    pub can_mention_everyone: bool,
    /// Elevated capability used by the delete coordinator.
    pub can_manage_messages: bool,
}

impl ActorCapabilities {
    /// Everything allowed; used in tests and for trusted contexts.
    pub fn unrestricted() -> Self {
        Self {
            can_send: true,
            can_embed: true,
            can_attach: true,
            can_mention_everyone: true,
            can_manage_messages: true,
        }
    }
}

/// Content as the actor wrote it, before sanitization.
#[derive(Debug, Clone, Default)]
pub struct OutboundContent {
    pub content: String,
    pub attachments: Vec<AttachmentRef>,
}

/// Content reduced to what the actor is allowed to send.
#[derive(Debug, Clone)]
pub struct SanitizedContent {
    pub content: String,
    pub suppress_embeds: bool,
    pub attachments: Vec<AttachmentRef>,
    pub allowed_mentions: AllowedMentions,
}

/// Reduce outbound content to the actor's capabilities.
///
/// `None` when the actor lacks the fundamental send capability. Otherwise:
/// embeds are suppressed without embed capability, attachments are dropped
/// entirely without attach capability, and mentions are scoped to the
/// user/role ids explicitly present in the content unless the actor holds
/// the broad-mention capability.
pub fn evaluate(caps: &ActorCapabilities, content: &OutboundContent) -> Option<SanitizedContent> {
    if !caps.can_send {
        return None;
    }

    let attachments = if caps.can_attach {
        content.attachments.clone()
    } else {
        Vec::new()
    };

    // Explicit ids are always allowed; the broad flag additionally lets
    // everyone/here pings through.
    let allowed_mentions = AllowedMentions {
        users: explicit_user_mentions(&content.content),
        roles: explicit_role_mentions(&content.content),
        everyone: caps.can_mention_everyone,
    };

    Some(SanitizedContent {
        content: content.content.clone(),
        suppress_embeds: !caps.can_embed,
        attachments,
        allowed_mentions,
    })
}

/// User ids explicitly mentioned in the text.
pub fn explicit_user_mentions(text: &str) -> Vec<u64> {
    let mut ids: Vec<u64> = USER_MENTION_RE
        .captures_iter(text)
        .filter_map(|cap| cap[1].parse().ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Role ids explicitly mentioned in the text.
pub fn explicit_role_mentions(text: &str) -> Vec<u64> {
    let mut ids: Vec<u64> = ROLE_MENTION_RE
        .captures_iter(text)
        .filter_map(|cap| cap[1].parse().ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
