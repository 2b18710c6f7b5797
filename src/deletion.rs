//! Delete/audit coordinator
//!
//! Removes a proxied message and its linkage record. The linkage is the
//! authorization source ("who sent this"); it is removed only after the
//! remote delete is confirmed, and preserved on forbidden or failed deletes
//! so the audit trail survives investigation.

use std::sync::Arc;
use tracing::{info, warn};

use crate::channel::{ChannelError, ChannelProxy};
use crate::error::Result;
use crate::store::LinkStore;

/// Outcome of a delete attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Remote message gone (deleted now, or already absent) and linkage removed.
    Deleted,
    /// No linkage for this message id; idempotent no-op.
    NotFound,
    /// Requester is neither the original actor nor message-management
    /// capable, or the remote side refused. Linkage preserved.
    Forbidden,
    /// Remote delete failed for another reason. Linkage preserved.
    Failed(String),
}

impl DeleteOutcome {
    pub fn ok(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            DeleteOutcome::Deleted => None,
            DeleteOutcome::NotFound => Some("not found"),
            DeleteOutcome::Forbidden => Some("insufficient permissions"),
            DeleteOutcome::Failed(msg) => Some(msg),
        }
    }
}

/// Looks up linkage, authorizes, and performs the idempotent remote delete
pub struct DeleteCoordinator<L> {
    links: Arc<L>,
}

impl<L: LinkStore> DeleteCoordinator<L> {
    pub fn new(links: Arc<L>) -> Self {
        Self { links }
    }

    /// Delete a proxied message on behalf of `actor_id`.
    ///
    /// `can_manage_messages` is the caller-resolved elevated capability; the
    /// coordinator never fetches permissions itself. Errors are reserved for
    /// store failures; every remote outcome maps into `DeleteOutcome`.
    pub async fn delete_proxied(
        &self,
        port: &dyn ChannelProxy,
        message_id: u64,
        actor_id: u64,
        can_manage_messages: bool,
    ) -> Result<DeleteOutcome> {
        let Some(link) = self.links.find_by_message_id(message_id).await? else {
            return Ok(DeleteOutcome::NotFound);
        };

        if link.user_id != actor_id && !can_manage_messages {
            warn!(
                "Delete refused: actor {} is not the sender of message {}",
                actor_id, message_id
            );
            return Ok(DeleteOutcome::Forbidden);
        }

        let webhook = if link.webhook_token.is_empty() {
            None
        } else {
            Some((link.webhook_id, link.webhook_token.as_str()))
        };

        match port.delete(link.channel_id, link.message_id, webhook).await {
            // Already gone remotely still counts as deleted.
            Ok(()) | Err(ChannelError::NotFound) => {
                self.links.delete_by_row_id(&link.id).await?;
                info!(
                    "Proxied message {} deleted by actor {} (sender {})",
                    message_id, actor_id, link.user_id
                );
                Ok(DeleteOutcome::Deleted)
            }
            Err(ChannelError::Forbidden) => {
                warn!(
                    "Remote refused delete of message {} for actor {}",
                    message_id, actor_id
                );
                Ok(DeleteOutcome::Forbidden)
            }
            Err(e) => Ok(DeleteOutcome::Failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_contract() {
        assert!(DeleteOutcome::Deleted.ok());
        assert_eq!(DeleteOutcome::Deleted.reason(), None);

        assert!(!DeleteOutcome::NotFound.ok());
        assert_eq!(DeleteOutcome::NotFound.reason(), Some("not found"));

        assert!(!DeleteOutcome::Forbidden.ok());
        assert_eq!(
            DeleteOutcome::Forbidden.reason(),
            Some("insufficient permissions")
        );

        let failed = DeleteOutcome::Failed("boom".to_string());
        assert!(!failed.ok());
        assert_eq!(failed.reason(), Some("boom"));
    }
}
