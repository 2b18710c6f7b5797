//! Alias matching
//!
//! Given a message and the author's registered aliases, pick the best match:
//! prefix aliases win by longest normalized trigger, bracket patterns are
//! checked only when no prefix applies. Alias lists come through the
//! read-through cache; "no match" is a normal outcome, store failure is not.

use std::sync::Arc;
use tracing::debug;

use crate::alias::{pattern_bounds, Alias, AliasKind, MatchResult};
use crate::cache::{AliasCache, GroupedAliases};
use crate::error::Result;
use crate::store::AliasStore;

/// Store-backed matcher with an injected per-user cache
pub struct AliasMatcher<S> {
    store: Arc<S>,
    cache: AliasCache,
}

impl<S: AliasStore> AliasMatcher<S> {
    pub fn new(store: Arc<S>, cache: AliasCache) -> Self {
        Self { store, cache }
    }

    /// The cache this matcher reads through; mutating callers invalidate it.
    pub fn cache(&self) -> &AliasCache {
        &self.cache
    }

    /// Match a message against the user's aliases.
    ///
    /// `Ok(None)` when nothing matches; errors only on store failure, which
    /// callers must treat as a hard failure of the proxy attempt.
    pub async fn match_text(&self, user_id: u64, text: &str) -> Result<Option<MatchResult>> {
        let grouped = self.grouped_aliases(user_id).await?;
        if grouped.is_empty() {
            return Ok(None);
        }

        let aliases: Vec<&Alias> = grouped.values().flatten().collect();

        if let Some(result) = best_prefix_match(&aliases, text) {
            debug!(
                "Prefix match for user {}: `{}`",
                user_id, result.alias.trigger_norm
            );
            return Ok(Some(result));
        }

        if let Some(result) = first_pattern_match(&aliases, text) {
            debug!(
                "Pattern match for user {}: `{}`",
                user_id, result.alias.trigger_norm
            );
            return Ok(Some(result));
        }

        Ok(None)
    }

    /// Grouped alias list, from cache when fresh, one store fetch otherwise.
    async fn grouped_aliases(&self, user_id: u64) -> Result<GroupedAliases> {
        if let Some(cached) = self.cache.get(user_id).await {
            return Ok(cached);
        }

        let fetched = Arc::new(self.store.aliases_grouped_by_form(user_id).await?);
        self.cache.set(user_id, fetched.clone()).await;
        Ok(fetched)
    }
}

/// Longest-prefix-wins over all prefix-kind aliases. Equal lengths break
/// lexicographically on the normalized trigger, never on iteration order.
fn best_prefix_match(aliases: &[&Alias], text: &str) -> Option<MatchResult> {
    let mut best: Option<&Alias> = None;

    for alias in aliases {
        if alias.kind != AliasKind::Prefix {
            continue;
        }
        if !prefix_matches(&alias.trigger_norm, text) {
            continue;
        }
        best = match best {
            None => Some(alias),
            Some(current) => {
                let longer = alias.trigger_norm.len() > current.trigger_norm.len();
                let tie_wins = alias.trigger_norm.len() == current.trigger_norm.len()
                    && alias.trigger_norm < current.trigger_norm;
                if longer || tie_wins {
                    Some(alias)
                } else {
                    Some(current)
                }
            }
        };
    }

    best.map(|alias| MatchResult {
        alias: (*alias).clone(),
        rendered_text: text[alias.trigger_norm.len()..].trim().to_string(),
    })
}

/// First bracket pattern whose fixed prefix and suffix bound the text.
/// Aliases are scanned in normalized-trigger order for determinism.
fn first_pattern_match(aliases: &[&Alias], text: &str) -> Option<MatchResult> {
    let mut patterns: Vec<&&Alias> = aliases
        .iter()
        .filter(|a| a.kind == AliasKind::Pattern)
        .collect();
    patterns.sort_by(|a, b| a.trigger_norm.cmp(&b.trigger_norm));

    for alias in patterns {
        let Some((pfx, sfx)) = pattern_bounds(&alias.trigger_norm) else {
            continue;
        };
        if text.len() < pfx.len() + sfx.len() {
            continue;
        }
        if !prefix_matches(pfx, text) || !suffix_matches(sfx, text) {
            continue;
        }
        let interior = &text[pfx.len()..text.len() - sfx.len()];
        return Some(MatchResult {
            alias: (**alias).clone(),
            rendered_text: interior.trim().to_string(),
        });
    }

    None
}

/// Case-insensitive check that `text` starts with the already-lowercased
/// `trigger`. Slices at the trigger's byte length, so a boundary falling
/// inside a multi-byte character simply fails the match.
fn prefix_matches(trigger: &str, text: &str) -> bool {
    match text.get(..trigger.len()) {
        Some(head) => head.to_lowercase() == trigger,
        None => false,
    }
}

fn suffix_matches(suffix: &str, text: &str) -> bool {
    if suffix.is_empty() {
        return true;
    }
    match text.get(text.len() - suffix.len()..) {
        Some(tail) => tail.to_lowercase() == suffix,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(trigger_norm: &str, kind: AliasKind) -> Alias {
        Alias {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: 1,
            form_id: "form-1".to_string(),
            trigger_raw: trigger_norm.to_string(),
            trigger_norm: trigger_norm.to_string(),
            kind,
            created_at: 0,
        }
    }

    fn prefix(trigger: &str) -> Alias {
        alias(trigger, AliasKind::Prefix)
    }

    fn pattern(trigger: &str) -> Alias {
        alias(trigger, AliasKind::Pattern)
    }

    #[test]
    fn test_longest_prefix_wins() {
        let a = prefix("n:text");
        let b = prefix("neoli:text");
        let refs: Vec<&Alias> = vec![&a, &b];

        let result = best_prefix_match(&refs, "neoli:text hello world").unwrap();
        assert_eq!(result.alias.trigger_norm, "neoli:text");
        assert_eq!(result.rendered_text, "hello world");
    }

    #[test]
    fn test_prefix_match_case_insensitive() {
        let a = prefix("n:text");
        let refs: Vec<&Alias> = vec![&a];

        let result = best_prefix_match(&refs, "N:TEXT hi").unwrap();
        assert_eq!(result.rendered_text, "hi");
    }

    #[test]
    fn test_exact_trigger_renders_empty() {
        let a = prefix("n:text");
        let refs: Vec<&Alias> = vec![&a];

        let result = best_prefix_match(&refs, "n:text").unwrap();
        assert_eq!(result.rendered_text, "");
    }

    #[test]
    fn test_internal_whitespace_preserved() {
        let a = prefix("n:text");
        let refs: Vec<&Alias> = vec![&a];

        let result = best_prefix_match(&refs, "n:text  a   b ").unwrap();
        assert_eq!(result.rendered_text, "a   b");
    }

    #[test]
    fn test_no_prefix_match() {
        let a = prefix("n:text");
        let refs: Vec<&Alias> = vec![&a];

        assert!(best_prefix_match(&refs, "m:text hello").is_none());
    }

    #[test]
    fn test_longest_prefix_wins_regardless_of_order() {
        let a = prefix("n:text");
        let b = prefix("neoli:text");

        for refs in [vec![&a, &b], vec![&b, &a]] {
            let result = best_prefix_match(&refs, "neoli:text hello").unwrap();
            assert_eq!(result.alias.trigger_norm, "neoli:text");
        }
    }

    #[test]
    fn test_equal_length_tie_is_deterministic() {
        // Uniqueness per user makes real ties duplicates of the same
        // normalized trigger; the winner must not depend on iteration order.
        let a = prefix("n:text");
        let b = prefix("n:text");

        for refs in [vec![&a, &b], vec![&b, &a]] {
            let result = best_prefix_match(&refs, "n:text hi").unwrap();
            assert_eq!(result.alias.trigger_norm, "n:text");
            assert_eq!(result.rendered_text, "hi");
        }
    }

    #[test]
    fn test_pattern_match_brackets() {
        let p = pattern("{text}");
        let refs: Vec<&Alias> = vec![&p];

        let result = first_pattern_match(&refs, "{hello world}").unwrap();
        assert_eq!(result.rendered_text, "hello world");
    }

    #[test]
    fn test_pattern_requires_structural_bounds() {
        let p = pattern("{text}");
        let refs: Vec<&Alias> = vec![&p];

        assert!(first_pattern_match(&refs, "[hello]").is_none());
        assert!(first_pattern_match(&refs, "{hello").is_none());
        assert!(first_pattern_match(&refs, "hello}").is_none());
    }

    #[test]
    fn test_pattern_with_decorated_bounds() {
        let p = pattern("{-text-}");
        let refs: Vec<&Alias> = vec![&p];

        let result = first_pattern_match(&refs, "{-hi there-}").unwrap();
        assert_eq!(result.rendered_text, "hi there");
        assert!(first_pattern_match(&refs, "{hi there}").is_none());
    }

    #[test]
    fn test_pattern_pass_ignores_prefix_aliases() {
        let a = prefix("n:text");
        let p = pattern("{text}");
        let refs: Vec<&Alias> = vec![&a, &p];

        let result = first_pattern_match(&refs, "{hello}").unwrap();
        assert_eq!(result.alias.trigger_norm, "{text}");
    }

    #[test]
    fn test_multibyte_boundary_is_no_match() {
        let a = prefix("né:text");
        let refs: Vec<&Alias> = vec![&a];
        // Shorter input with a multi-byte char at the slice boundary.
        assert!(best_prefix_match(&refs, "né").is_none());
    }
}
