//! Form and alias management commands
//!
//! Plain text commands behind a configurable prefix. Parsing is a pure
//! function; execution runs validation, collision checks, and store
//! mutations, invalidating the owner's alias cache on every change.

use std::sync::Arc;
use tracing::info;

use crate::alias::{classify, normalize};
use crate::cache::AliasCache;
use crate::error::{ProxyError, Result};
use crate::store::AliasStore;

/// Parsed management command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    FormCreate {
        name: String,
        avatar_url: Option<String>,
    },
    FormDelete {
        name: String,
    },
    FormList,
    AliasAdd {
        form_name: String,
        trigger: String,
    },
    AliasRemove {
        trigger: String,
    },
    AliasList,
    /// Delete a proxied message by id; dispatched by the adapter because it
    /// needs the channel port and the requester's capabilities.
    Delete {
        message_id: u64,
    },
    Help,
    Unknown(String),
}

pub const USAGE: &str = "\
Commands:
  form create <name> [avatar url]  create a persona
  form delete <name>               delete a persona and its aliases
  form list                        list your personas
  alias add <form name> <trigger>  bind a trigger (e.g. `neo:text` or `{text}`)
  alias remove <trigger>           unbind a trigger
  alias list                       list your aliases
  delete <message id>              delete one of your proxied messages
  help                             show this text
React with \u{274c} on a proxied message to delete it.";

/// Parse a prefixed management command. `None` when the message does not
/// start with the prefix (and so is a proxy candidate, not a command).
///
/// Trigger arguments are taken as the raw remainder of the line so their
/// internal spacing survives into normalization.
pub fn parse(prefix: &str, content: &str) -> Option<Command> {
    let rest = content.strip_prefix(prefix)?.trim();

    let cmd = if rest.is_empty() || rest == "help" {
        Command::Help
    } else if let Some(args) = strip_head(rest, "form create") {
        let mut words = args.split_whitespace();
        match words.next() {
            Some(name) => Command::FormCreate {
                name: name.to_string(),
                avatar_url: words.next().map(str::to_string),
            },
            None => Command::Unknown("form create".to_string()),
        }
    } else if let Some(args) = strip_head(rest, "form delete") {
        match args.split_whitespace().next() {
            Some(name) => Command::FormDelete {
                name: name.to_string(),
            },
            None => Command::Unknown("form delete".to_string()),
        }
    } else if rest == "form list" {
        Command::FormList
    } else if let Some(args) = strip_head(rest, "alias add") {
        match args.split_once(char::is_whitespace) {
            Some((form_name, trigger)) if !trigger.trim().is_empty() => Command::AliasAdd {
                form_name: form_name.to_string(),
                trigger: trigger.trim().to_string(),
            },
            _ => Command::Unknown("alias add".to_string()),
        }
    } else if let Some(trigger) = strip_head(rest, "alias remove") {
        if trigger.is_empty() {
            Command::Unknown("alias remove".to_string())
        } else {
            Command::AliasRemove {
                trigger: trigger.to_string(),
            }
        }
    } else if rest == "alias list" {
        Command::AliasList
    } else if let Some(id) = strip_head(rest, "delete") {
        match id.parse() {
            Ok(message_id) => Command::Delete { message_id },
            Err(_) => Command::Unknown("delete".to_string()),
        }
    } else {
        let head = rest.split_whitespace().next().unwrap_or(rest);
        Command::Unknown(head.to_string())
    };

    Some(cmd)
}

/// Strip a command head and return the trimmed argument tail.
fn strip_head<'a>(rest: &'a str, head: &str) -> Option<&'a str> {
    let tail = rest.strip_prefix(head)?;
    // Either exactly the head, or head followed by whitespace.
    if tail.is_empty() {
        Some("")
    } else if tail.starts_with(char::is_whitespace) {
        Some(tail.trim())
    } else {
        None
    }
}

/// Executes store-backed commands and returns the reply text
pub struct CommandHandler<S> {
    store: Arc<S>,
    cache: AliasCache,
}

impl<S: AliasStore> CommandHandler<S> {
    pub fn new(store: Arc<S>, cache: AliasCache) -> Self {
        Self { store, cache }
    }

    /// Run a command for a user. Validation and not-found errors carry
    /// user-facing messages; the adapter renders them as replies.
    pub async fn execute(&self, user_id: u64, cmd: Command) -> Result<String> {
        match cmd {
            Command::FormCreate { name, avatar_url } => {
                if self.store.form_by_name(user_id, &name).await?.is_some() {
                    return Err(ProxyError::Validation(format!(
                        "you already have a form named `{name}`"
                    )));
                }
                let form = self
                    .store
                    .create_form(user_id, &name, avatar_url.as_deref())
                    .await?;
                Ok(format!("Form `{}` created.", form.name))
            }

            Command::FormDelete { name } => {
                let form = self
                    .store
                    .form_by_name(user_id, &name)
                    .await?
                    .ok_or_else(|| ProxyError::NotFound(format!("form `{name}`")))?;
                self.store.delete_form(user_id, &form.id).await?;
                self.cache.invalidate(user_id).await;
                Ok(format!("Form `{}` and its aliases deleted.", form.name))
            }

            Command::FormList => {
                let forms = self.store.forms_for_user(user_id).await?;
                if forms.is_empty() {
                    return Ok("You have no forms yet. Try `form create <name>`.".to_string());
                }
                let grouped = self.store.aliases_grouped_by_form(user_id).await?;
                let lines: Vec<String> = forms
                    .iter()
                    .map(|f| {
                        let count = grouped.get(&f.id).map_or(0, Vec::len);
                        format!("- {} ({} alias{})", f.name, count, plural(count))
                    })
                    .collect();
                Ok(format!("Your forms:\n{}", lines.join("\n")))
            }

            Command::AliasAdd { form_name, trigger } => {
                let form = self
                    .store
                    .form_by_name(user_id, &form_name)
                    .await?
                    .ok_or_else(|| ProxyError::NotFound(format!("form `{form_name}`")))?;

                let trigger_norm = normalize(&trigger)?;
                let kind = classify(&trigger_norm);

                if self
                    .store
                    .find_alias_collision(user_id, &trigger_norm)
                    .await?
                    .is_some()
                {
                    return Err(ProxyError::Validation(format!(
                        "trigger `{trigger_norm}` is already in use"
                    )));
                }

                self.store
                    .create_alias(user_id, &form.id, &trigger, &trigger_norm, kind)
                    .await?;
                self.cache.invalidate(user_id).await;

                info!(
                    "User {} bound `{}` ({:?}) to form {}",
                    user_id, trigger_norm, kind, form.name
                );
                Ok(format!(
                    "Alias `{}` now proxies as `{}`.",
                    trigger_norm, form.name
                ))
            }

            Command::AliasRemove { trigger } => {
                let trigger_norm = normalize(&trigger)?;
                let removed = self.store.delete_alias(user_id, &trigger_norm).await?;
                self.cache.invalidate(user_id).await;
                if removed {
                    Ok(format!("Alias `{trigger_norm}` removed."))
                } else {
                    Err(ProxyError::NotFound(format!("alias `{trigger_norm}`")))
                }
            }

            Command::AliasList => {
                let grouped = self.store.aliases_grouped_by_form(user_id).await?;
                if grouped.is_empty() {
                    return Ok(
                        "You have no aliases yet. Try `alias add <form name> <trigger>`."
                            .to_string(),
                    );
                }
                let forms = self.store.forms_for_user(user_id).await?;
                let mut lines = Vec::new();
                for form in &forms {
                    if let Some(aliases) = grouped.get(&form.id) {
                        for alias in aliases {
                            lines.push(format!("- `{}` -> {}", alias.trigger_norm, form.name));
                        }
                    }
                }
                Ok(format!("Your aliases:\n{}", lines.join("\n")))
            }

            // The adapter dispatches deletes itself; reaching here means a
            // caller without a channel port, so just point at usage.
            Command::Delete { .. } => Ok(USAGE.to_string()),

            Command::Help => Ok(USAGE.to_string()),

            Command::Unknown(what) => Ok(format!(
                "Unrecognized command `{what}`. Try `help` for usage."
            )),
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "es"
    }
}
