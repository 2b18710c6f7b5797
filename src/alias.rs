//! Forms, aliases, and trigger normalization
//!
//! A form is a persona a user can speak as. An alias maps a typed trigger to
//! a form, either as a `name:text` prefix or a `{...text...}` bracket
//! pattern. The literal word `text` marks where user content is substituted.

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// Placeholder literal every trigger must contain.
pub const PLACEHOLDER: &str = "text";

/// Trigger shape, decided once at creation and again at match time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasKind {
    /// `name:text` - trigger is a prefix of the message
    Prefix,
    /// `{...text...}` - trigger brackets the message
    Pattern,
}

impl AliasKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AliasKind::Prefix => "prefix",
            AliasKind::Pattern => "pattern",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "prefix" => Some(AliasKind::Prefix),
            "pattern" => Some(AliasKind::Pattern),
            _ => None,
        }
    }
}

/// A persona owned by a single user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Form {
    pub id: String,
    pub user_id: u64,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: i64,
}

/// A trigger mapping free text to a form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub id: String,
    pub user_id: u64,
    pub form_id: String,
    pub trigger_raw: String,
    pub trigger_norm: String,
    pub kind: AliasKind,
    pub created_at: i64,
}

/// Outcome of matching a message against a user's aliases
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub alias: Alias,
    /// Message content with the trigger stripped, trimmed at both ends only.
    pub rendered_text: String,
}

/// Normalize a raw trigger into its canonical form.
///
/// Trims outer whitespace and lowercases; internal spacing is preserved
/// exactly as typed. Fails when the input is empty or does not contain the
/// `text` placeholder in a recognized shape:
///
/// - prefix: `name:text` (placeholder after a colon, optional spaces between)
/// - pattern: `{...text...}` (well-formed brace pair around the placeholder)
///
/// Idempotent: normalizing a normalized trigger is a no-op.
pub fn normalize(raw: &str) -> Result<String, ProxyError> {
    let norm = raw.trim().to_lowercase();
    if norm.is_empty() {
        return Err(ProxyError::Validation(
            "trigger cannot be empty".to_string(),
        ));
    }

    match classify(&norm) {
        AliasKind::Pattern => {
            // Interior must carry the placeholder somewhere.
            let interior = &norm[1..norm.len() - 1];
            if !interior.contains(PLACEHOLDER) {
                return Err(ProxyError::Validation(format!(
                    "bracket trigger must contain the word `{PLACEHOLDER}`"
                )));
            }
        }
        AliasKind::Prefix => {
            // A stray brace means a malformed pattern, not a prefix trigger.
            if norm.contains('{') || norm.contains('}') {
                return Err(ProxyError::Validation(
                    "unbalanced braces in trigger".to_string(),
                ));
            }
            let Some(colon) = norm.find(':') else {
                return Err(ProxyError::Validation(format!(
                    "trigger must look like `name:{PLACEHOLDER}` or `{{{PLACEHOLDER}}}`"
                )));
            };
            if norm[colon + 1..].trim_start() != PLACEHOLDER {
                return Err(ProxyError::Validation(format!(
                    "prefix trigger must end with `{PLACEHOLDER}` after the colon"
                )));
            }
        }
    }

    Ok(norm)
}

/// Classify a normalized trigger. Pure and deterministic; creation-time
/// validation and runtime matching must agree on the answer.
pub fn classify(trigger_norm: &str) -> AliasKind {
    if trigger_norm.len() >= 2 && trigger_norm.starts_with('{') && trigger_norm.ends_with('}') {
        AliasKind::Pattern
    } else {
        AliasKind::Prefix
    }
}

/// Split a pattern trigger into the fixed prefix and suffix around the
/// placeholder. Returns None when the trigger carries no placeholder
/// (rejected at creation, so only reachable with un-normalized input).
pub fn pattern_bounds(trigger_norm: &str) -> Option<(&str, &str)> {
    let idx = trigger_norm.find(PLACEHOLDER)?;
    Some((&trigger_norm[..idx], &trigger_norm[idx + PLACEHOLDER.len()..]))
}
