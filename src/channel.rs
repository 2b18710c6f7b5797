//! Channel proxy port
//!
//! The narrow interface the core uses to create, edit, and delete proxied
//! messages. Platform adapters (Discord webhooks in this crate) live behind
//! it; the core never touches a platform SDK directly.

use async_trait::async_trait;

/// Error outcomes a channel adapter must keep distinguishable. The delete
/// coordinator treats `NotFound` as idempotent success and `Forbidden` as a
/// terminal, audit-preserving failure.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("message or webhook not found")]
    NotFound,

    #[error("missing permission for this channel operation")]
    Forbidden,

    #[error("rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("channel transport error: {0}")]
    Other(String),
}

/// Mentions allowed to ping in an outbound message. Default allows nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedMentions {
    pub users: Vec<u64>,
    pub roles: Vec<u64>,
    pub everyone: bool,
}

impl AllowedMentions {
    /// Suppress every ping.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Attachment carried by URL reference; re-upload mechanics are the
/// adapter's concern.
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub url: String,
    pub filename: String,
}

/// Outbound webhook message
#[derive(Debug, Clone)]
pub struct ProxyPayload {
    /// Display name of the persona.
    pub username: String,
    /// Omitted from the wire entirely when absent, never sent as null.
    pub avatar_url: Option<String>,
    pub content: String,
    pub allowed_mentions: AllowedMentions,
    pub attachments: Vec<AttachmentRef>,
    pub suppress_embeds: bool,
    /// Message this proxy replies to, if any.
    pub reply_to: Option<u64>,
}

/// Identifiers of a successfully sent proxied message
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub webhook_id: u64,
    pub webhook_token: String,
    pub message_id: u64,
}

/// Send/edit/delete operations on a channel, implemented per platform.
#[async_trait]
pub trait ChannelProxy: Send + Sync {
    /// Create a proxied message in the channel. Called exactly once per
    /// proxy attempt; retries belong to the transport layer underneath.
    async fn send(
        &self,
        channel_id: u64,
        payload: &ProxyPayload,
    ) -> Result<SentMessage, ChannelError>;

    /// Replace the content of a previously proxied message.
    async fn edit(&self, sent: &SentMessage, content: &str) -> Result<(), ChannelError>;

    /// Delete a message, through the webhook token when one is known,
    /// otherwise as a direct channel-message delete.
    async fn delete(
        &self,
        channel_id: u64,
        message_id: u64,
        webhook: Option<(u64, &str)>,
    ) -> Result<(), ChannelError>;
}
