//! Shared base of the per-type authorization rules.
//!
//! [`TagAuthorizationRule`] enforces the read-access-tag invariant for every
//! verb and leaves type-specific uniqueness and immutability to
//! [`RuleHooks`]. The expunge restriction to local users is implemented
//! here and cannot be overridden per type.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::authorization::{AuthorizationDecision, AuthorizationRule};
use crate::error::EngineResult;
use crate::storage::StoreTransaction;
use crate::types::{ReadAccess, StoredResource};
use crate::user::User;

/// Type-specific checks plugged into [`TagAuthorizationRule`].
#[async_trait]
pub trait RuleHooks: Send + Sync {
    /// The governed resource type.
    fn resource_type(&self) -> &'static str;

    /// Returns `true` if a resource with `new`'s natural key already
    /// exists. Types without a natural key return `false`.
    async fn resource_exists(
        &self,
        tx: &mut dyn StoreTransaction,
        new: &Value,
    ) -> EngineResult<bool>;

    /// Returns `true` if the delta from `old` to `new` is acceptable,
    /// typically meaning the natural key is unchanged. Types without a
    /// natural key return `true`.
    async fn modifications_ok(
        &self,
        tx: &mut dyn StoreTransaction,
        old: &Value,
        new: &Value,
    ) -> EngineResult<bool>;
}

/// Hooks for resource types without a natural key.
pub struct UnconstrainedHooks {
    resource_type: &'static str,
}

impl UnconstrainedHooks {
    /// Creates hooks for the given type.
    pub fn new(resource_type: &'static str) -> Self {
        Self { resource_type }
    }
}

#[async_trait]
impl RuleHooks for UnconstrainedHooks {
    fn resource_type(&self) -> &'static str {
        self.resource_type
    }

    async fn resource_exists(
        &self,
        _tx: &mut dyn StoreTransaction,
        _new: &Value,
    ) -> EngineResult<bool> {
        Ok(false)
    }

    async fn modifications_ok(
        &self,
        _tx: &mut dyn StoreTransaction,
        _old: &Value,
        _new: &Value,
    ) -> EngineResult<bool> {
        Ok(true)
    }
}

/// Authorization rule enforcing the read-access-tag invariant, generic over
/// type-specific hooks.
pub struct TagAuthorizationRule<H> {
    hooks: H,
}

impl<H: RuleHooks> TagAuthorizationRule<H> {
    /// Creates a rule around the given hooks.
    pub fn new(hooks: H) -> Self {
        Self { hooks }
    }

    /// Checks that the new content carries a well-formed tag set that the
    /// user could read back. A remote user must not create a resource its
    /// own scope cannot see.
    fn tags_ok_for(&self, user: &User, new: &Value) -> Result<Vec<ReadAccess>, String> {
        let tags = ReadAccess::from_content(new).map_err(|e| e.to_string())?;
        if !user.is_local() && !ReadAccess::any_covers(&tags, user) {
            return Err("read access tags do not cover the remote user".to_string());
        }
        Ok(tags)
    }

    fn read_decision(&self, user: &User, resource: &StoredResource) -> AuthorizationDecision {
        match ReadAccess::from_content(resource.content()) {
            Ok(tags) if ReadAccess::any_covers(&tags, user) => {
                AuthorizationDecision::allowed("read access tag covers user")
            }
            Ok(_) => {
                warn!(
                    resource = %resource.url(),
                    user = user.name(),
                    "read denied, tag scope does not cover user"
                );
                AuthorizationDecision::Denied
            }
            Err(e) => {
                warn!(
                    resource = %resource.url(),
                    error = %e,
                    "read denied, malformed read access tags"
                );
                AuthorizationDecision::Denied
            }
        }
    }
}

#[async_trait]
impl<H: RuleHooks> AuthorizationRule for TagAuthorizationRule<H> {
    fn resource_type(&self) -> &'static str {
        self.hooks.resource_type()
    }

    async fn allows_create(
        &self,
        tx: &mut dyn StoreTransaction,
        user: &User,
        new: &Value,
    ) -> EngineResult<AuthorizationDecision> {
        if let Err(reason) = self.tags_ok_for(user, new) {
            warn!(
                resource_type = self.resource_type(),
                user = user.name(),
                reason = %reason,
                "create denied"
            );
            return Ok(AuthorizationDecision::Denied);
        }

        if self.hooks.resource_exists(tx, new).await? {
            warn!(
                resource_type = self.resource_type(),
                user = user.name(),
                "create denied, natural key already in use"
            );
            return Ok(AuthorizationDecision::Denied);
        }

        let decision =
            AuthorizationDecision::allowed("read access tags valid, no conflicting resource");
        info!(
            resource_type = self.resource_type(),
            user = user.name(),
            reason = decision.reason(),
            "create authorized"
        );
        Ok(decision)
    }

    async fn allows_read(&self, user: &User, resource: &StoredResource) -> AuthorizationDecision {
        self.read_decision(user, resource)
    }

    async fn allows_update(
        &self,
        tx: &mut dyn StoreTransaction,
        user: &User,
        old: &StoredResource,
        new: &Value,
    ) -> EngineResult<AuthorizationDecision> {
        if !self.read_decision(user, old).is_allowed() {
            warn!(
                resource = %old.url(),
                user = user.name(),
                "update denied, user may not read the current version"
            );
            return Ok(AuthorizationDecision::Denied);
        }

        if let Err(reason) = self.tags_ok_for(user, new) {
            warn!(resource = %old.url(), user = user.name(), reason = %reason, "update denied");
            return Ok(AuthorizationDecision::Denied);
        }

        if !self.hooks.modifications_ok(tx, old.content(), new).await? {
            warn!(
                resource = %old.url(),
                user = user.name(),
                "update denied, modification of immutable fields"
            );
            return Ok(AuthorizationDecision::Denied);
        }

        let decision = AuthorizationDecision::allowed(
            "read access tags valid, modifications within allowed fields",
        );
        info!(
            resource = %old.url(),
            user = user.name(),
            reason = decision.reason(),
            "update authorized"
        );
        Ok(decision)
    }

    async fn allows_delete(
        &self,
        user: &User,
        resource: &StoredResource,
    ) -> AuthorizationDecision {
        // Deleting requires at least read visibility.
        let decision = self.read_decision(user, resource);
        if decision.is_allowed() {
            info!(
                resource = %resource.url(),
                user = user.name(),
                "delete authorized"
            );
        }
        decision
    }

    async fn allows_expunge(
        &self,
        user: &User,
        resource: &StoredResource,
    ) -> AuthorizationDecision {
        // Hard rule for every resource type: only local users may expunge,
        // independent of any other permission they hold.
        if user.is_local() {
            info!(
                resource = %resource.url(),
                user = user.name(),
                "expunge authorized for local user"
            );
            AuthorizationDecision::allowed("local user")
        } else {
            warn!(
                resource = %resource.url(),
                user = user.name(),
                "expunge denied, not a local user"
            );
            AuthorizationDecision::Denied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule() -> TagAuthorizationRule<UnconstrainedHooks> {
        TagAuthorizationRule::new(UnconstrainedHooks::new("Location"))
    }

    fn tagged(tags: &[ReadAccess]) -> Value {
        json!({
            "resourceType": "Location",
            "meta": {"tag": tags.iter().map(ReadAccess::tag_value).collect::<Vec<_>>()}
        })
    }

    #[tokio::test]
    async fn test_read_scopes() {
        let rule = rule();
        let local = User::local("operator", "org.local");
        let remote = User::remote("partner", "org.partner");

        let local_only = StoredResource::new("Location", "l1", tagged(&[ReadAccess::Local]));
        assert!(rule.allows_read(&local, &local_only).await.is_allowed());
        assert!(!rule.allows_read(&remote, &local_only).await.is_allowed());

        let org = StoredResource::new(
            "Location",
            "l2",
            tagged(&[ReadAccess::Organization("org.partner".into())]),
        );
        assert!(rule.allows_read(&remote, &org).await.is_allowed());

        let all = StoredResource::new("Location", "l3", tagged(&[ReadAccess::All]));
        assert!(rule.allows_read(&remote, &all).await.is_allowed());
    }

    #[tokio::test]
    async fn test_read_denied_without_tags() {
        let rule = rule();
        let local = User::local("operator", "org.local");
        let untagged = StoredResource::new("Location", "l1", json!({"resourceType": "Location"}));
        assert!(!rule.allows_read(&local, &untagged).await.is_allowed());
    }

    #[tokio::test]
    async fn test_expunge_local_only() {
        let rule = rule();
        let resource = StoredResource::new("Location", "l1", tagged(&[ReadAccess::All]));

        let local = User::local("operator", "org.local");
        let decision = rule.allows_expunge(&local, &resource).await;
        assert_eq!(decision.reason(), Some("local user"));

        let remote = User::remote("partner", "org.partner");
        assert!(!rule.allows_expunge(&remote, &resource).await.is_allowed());
    }

    #[tokio::test]
    async fn test_delete_mirrors_read() {
        let rule = rule();
        let remote = User::remote("partner", "org.partner");
        let local_only = StoredResource::new("Location", "l1", tagged(&[ReadAccess::Local]));
        assert!(!rule.allows_delete(&remote, &local_only).await.is_allowed());
    }
}
