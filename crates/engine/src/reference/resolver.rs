//! Reference resolution against storage.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::authorization::RuleRegistry;
use crate::config::EngineConfig;
use crate::error::{EngineResult, ReferenceError};
use crate::reference::{collect_references, rewrite_references, ReferenceKind};
use crate::search::{parse_query_string, SearchQuery};
use crate::storage::StoreTransaction;
use crate::types::Identity;
use crate::user::User;

/// Resolves every reference of a resource against storage and the bundle's
/// temporary id map.
///
/// Stateless apart from borrowed configuration; safe to recreate per
/// command.
pub struct ReferenceResolver<'a> {
    config: &'a EngineConfig,
    rules: &'a RuleRegistry,
}

impl<'a> ReferenceResolver<'a> {
    /// Creates a resolver over the given configuration and rule registry.
    pub fn new(config: &'a EngineConfig, rules: &'a RuleRegistry) -> Self {
        Self { config, rules }
    }

    /// Classifies and resolves every reference in `content`, returning a
    /// new content value with conditional references rewritten to concrete
    /// relative identities and temporary references rewritten to absolute,
    /// versioned URLs.
    ///
    /// External and contained references pass through unchanged; internal
    /// literal references are verified but kept as written.
    pub async fn resolve_in_content(
        &self,
        tx: &mut dyn StoreTransaction,
        user: &User,
        content: &Value,
        temp_ids: &HashMap<String, Identity>,
    ) -> EngineResult<Value> {
        let mut replacements: HashMap<String, String> = HashMap::new();

        for reference in collect_references(content) {
            if replacements.contains_key(&reference.value) {
                continue;
            }
            match reference.classify(self.config)? {
                ReferenceKind::ExternalLiteral | ReferenceKind::Contained => {}
                ReferenceKind::InternalLiteral { resource_type, id } => {
                    self.check_literal(tx, user, &resource_type, &id, &reference.value)
                        .await?;
                }
                ReferenceKind::Conditional {
                    resource_type,
                    query,
                } => {
                    let identity = self
                        .resolve_conditional(tx, user, &resource_type, &query, &reference.value)
                        .await?;
                    replacements.insert(reference.value.clone(), identity.relative());
                }
                ReferenceKind::Temporary => {
                    let identity = temp_ids.get(&reference.value).ok_or_else(|| {
                        ReferenceError::UnknownTemporary {
                            reference: reference.value.clone(),
                        }
                    })?;
                    let base = self.config.base_with_slash();
                    replacements.insert(
                        reference.value.clone(),
                        identity.absolute_versioned(&base),
                    );
                }
            }
        }

        if replacements.is_empty() {
            Ok(content.clone())
        } else {
            Ok(rewrite_references(content, &replacements))
        }
    }

    /// Verifies that an internal literal reference points at an existing,
    /// non-deleted resource the user may read.
    ///
    /// Missing, deleted, and unauthorized targets all fail with the same
    /// error; the actual cause is only logged. This prevents probing for
    /// resource existence via reference fields.
    async fn check_literal(
        &self,
        tx: &mut dyn StoreTransaction,
        user: &User,
        resource_type: &str,
        id: &str,
        raw: &str,
    ) -> EngineResult<()> {
        let not_accessible = || ReferenceError::TargetNotAccessible {
            reference: raw.to_string(),
        };

        let Some(target) = tx.read(resource_type, id).await? else {
            warn!(reference = raw, "reference target does not exist");
            return Err(not_accessible().into());
        };
        if target.is_deleted() {
            warn!(reference = raw, "reference target is deleted");
            return Err(not_accessible().into());
        }
        let Some(rule) = self.rules.get(resource_type) else {
            warn!(
                reference = raw,
                resource_type, "no authorization rule for reference target type"
            );
            return Err(not_accessible().into());
        };
        let decision = rule.allows_read(user, &target).await;
        if !decision.is_allowed() {
            warn!(
                reference = raw,
                user = user.name(),
                "reference target not readable by user"
            );
            return Err(not_accessible().into());
        }

        debug!(reference = raw, "literal reference verified");
        Ok(())
    }

    /// Resolves a conditional reference to the identity of its single
    /// match. Zero matches and multiple matches are distinct failures; a
    /// single unreadable match is indistinguishable from a missing one.
    pub async fn resolve_conditional(
        &self,
        tx: &mut dyn StoreTransaction,
        user: &User,
        resource_type: &str,
        query: &str,
        raw: &str,
    ) -> EngineResult<Identity> {
        let search_query =
            SearchQuery::configure_strict(resource_type, parse_query_string(query), self.config)?;
        let page = tx.search(&search_query).await?;

        match page.total {
            0 => Err(ReferenceError::NoMatch {
                reference: raw.to_string(),
            }
            .into()),
            1 => {
                let target = page.resources.first().ok_or_else(|| {
                    ReferenceError::NoMatch {
                        reference: raw.to_string(),
                    }
                })?;
                let readable = match self.rules.get(resource_type) {
                    Some(rule) => rule.allows_read(user, target).await.is_allowed(),
                    None => false,
                };
                if !readable {
                    warn!(
                        reference = raw,
                        user = user.name(),
                        "conditional reference match not readable by user"
                    );
                    return Err(ReferenceError::TargetNotAccessible {
                        reference: raw.to_string(),
                    }
                    .into());
                }
                debug!(
                    reference = raw,
                    target = %target.url(),
                    "conditional reference resolved"
                );
                Ok(target.identity())
            }
            count => Err(ReferenceError::MultipleMatches {
                reference: raw.to_string(),
                count,
            }
            .into()),
        }
    }
}
