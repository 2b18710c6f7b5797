//! formbot - Discord persona-proxy bot
//!
//! Users register forms (personas) with trigger aliases; typing a
//! trigger-prefixed message makes the bot repost it through a channel
//! webhook as that persona, keeping a linkage record for later audit and
//! deletion.
//!
//! # Architecture
//!
//! ```text
//! Discord gateway ──► Handler ──► Alias Matcher ──► Permission Guard
//!                        │          (store + cache)        │
//!                        │                                 ▼
//!                        ├── Commands (forms/aliases)  Proxy Coordinator
//!                        │                                 │
//!                        └── Delete Coordinator ◄──── Linkage (SQLite)
//!                                     │
//!                              Webhook port (send/edit/delete)
//! ```

pub mod alias;
pub mod cache;
pub mod channel;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod deletion;
pub mod discord;
pub mod error;
pub mod matcher;
pub mod permissions;
pub mod store;

pub use alias::{classify, normalize, Alias, AliasKind, Form, MatchResult};
pub use cache::{AliasCache, AliasCacheStats, GroupedAliases};
pub use channel::{AllowedMentions, AttachmentRef, ChannelError, ChannelProxy, ProxyPayload, SentMessage};
pub use commands::{Command, CommandHandler};
pub use config::Config;
pub use coordinator::{ProxyCoordinator, ProxyReceipt, ProxyRequest};
pub use deletion::{DeleteCoordinator, DeleteOutcome};
pub use error::ProxyError;
pub use matcher::AliasMatcher;
pub use permissions::{evaluate, ActorCapabilities, OutboundContent, SanitizedContent};
pub use store::{AliasStore, LinkStore, ProxiedMessage, SqliteStore};
