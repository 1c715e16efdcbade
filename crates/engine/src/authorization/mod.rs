//! Authorization rule framework.
//!
//! One rule per resource type, selected through a [`RuleRegistry`] built at
//! startup. Rules are stateless and shared across concurrent requests.
//! Every decision carries a human-readable reason and is logged where it is
//! made; a denial is never silent.

mod rules;
mod tag_rule;

pub use rules::{
    binary_rule, bundle_rule, endpoint_rule, location_rule, organization_rule,
};
pub use tag_rule::{RuleHooks, TagAuthorizationRule, UnconstrainedHooks};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineResult;
use crate::storage::StoreTransaction;
use crate::types::StoredResource;
use crate::user::User;

/// The outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// The operation may proceed, with the reason it was allowed.
    Allowed(String),
    /// The operation is refused.
    Denied,
}

impl AuthorizationDecision {
    /// Creates an allowed decision.
    pub fn allowed(reason: impl Into<String>) -> Self {
        AuthorizationDecision::Allowed(reason.into())
    }

    /// Returns `true` if the operation may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthorizationDecision::Allowed(_))
    }

    /// Returns the reason of an allowed decision.
    pub fn reason(&self) -> Option<&str> {
        match self {
            AuthorizationDecision::Allowed(reason) => Some(reason),
            AuthorizationDecision::Denied => None,
        }
    }
}

/// Per-resource-type authorization capability.
///
/// Checks that need storage access (uniqueness, immutability) receive the
/// bundle's transaction handle so they observe entries committed earlier in
/// the same bundle.
#[async_trait]
pub trait AuthorizationRule: Send + Sync {
    /// The resource type this rule governs.
    fn resource_type(&self) -> &'static str;

    /// Decides whether `user` may create `new`.
    async fn allows_create(
        &self,
        tx: &mut dyn StoreTransaction,
        user: &User,
        new: &Value,
    ) -> EngineResult<AuthorizationDecision>;

    /// Decides whether `user` may read `resource`, per its read-access tags.
    async fn allows_read(&self, user: &User, resource: &StoredResource) -> AuthorizationDecision;

    /// Decides whether `user` may replace `old` with `new`.
    async fn allows_update(
        &self,
        tx: &mut dyn StoreTransaction,
        user: &User,
        old: &StoredResource,
        new: &Value,
    ) -> EngineResult<AuthorizationDecision>;

    /// Decides whether `user` may delete `resource`. Deleting requires at
    /// least read visibility.
    async fn allows_delete(&self, user: &User, resource: &StoredResource)
        -> AuthorizationDecision;

    /// Decides whether `user` may permanently remove the soft-deleted
    /// `resource`. Restricted to local users for every resource type.
    async fn allows_expunge(
        &self,
        user: &User,
        resource: &StoredResource,
    ) -> AuthorizationDecision;
}

/// Type-to-rule mapping built at startup.
#[derive(Default)]
pub struct RuleRegistry {
    rules: HashMap<&'static str, Arc<dyn AuthorizationRule>>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in rules for every supported
    /// resource type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(organization_rule()));
        registry.register(Arc::new(endpoint_rule()));
        registry.register(Arc::new(location_rule()));
        registry.register(Arc::new(binary_rule()));
        registry.register(Arc::new(bundle_rule()));
        registry
    }

    /// Registers a rule, replacing any previous rule for its type.
    pub fn register(&mut self, rule: Arc<dyn AuthorizationRule>) {
        self.rules.insert(rule.resource_type(), rule);
    }

    /// Looks up the rule for a resource type.
    pub fn get(&self, resource_type: &str) -> Option<&Arc<dyn AuthorizationRule>> {
        self.rules.get(resource_type)
    }

    /// Returns the governed resource types.
    pub fn resource_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.rules.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision() {
        let allowed = AuthorizationDecision::allowed("read access tag valid");
        assert!(allowed.is_allowed());
        assert_eq!(allowed.reason(), Some("read access tag valid"));

        assert!(!AuthorizationDecision::Denied.is_allowed());
        assert_eq!(AuthorizationDecision::Denied.reason(), None);
    }

    #[test]
    fn test_registry_defaults() {
        let registry = RuleRegistry::with_defaults();
        assert_eq!(
            registry.resource_types(),
            vec!["Binary", "Bundle", "Endpoint", "Location", "Organization"]
        );
        assert!(registry.get("Organization").is_some());
        assert!(registry.get("Patient").is_none());
    }
}
