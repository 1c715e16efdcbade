//! Built-in per-type authorization rules.
//!
//! Organization and Endpoint carry a natural key that must be unique on
//! create and unchanged on update. Location, Binary, and Bundle have no
//! natural key and trivially pass both hooks.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::authorization::tag_rule::{RuleHooks, TagAuthorizationRule, UnconstrainedHooks};
use crate::error::EngineResult;
use crate::search::SearchQuery;
use crate::storage::StoreTransaction;

/// Collects `(system, value)` pairs from an `identifier` array.
fn identifier_tokens(content: &Value) -> BTreeSet<(String, String)> {
    content
        .get("identifier")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let value = entry.get("value")?.as_str()?;
            let system = entry
                .get("system")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some((system.to_string(), value.to_string()))
        })
        .collect()
}

async fn any_match(
    tx: &mut dyn StoreTransaction,
    resource_type: &str,
    parameter: &str,
    value: &str,
) -> EngineResult<bool> {
    match SearchQuery::for_parameter(resource_type, parameter, value) {
        Some(query) => Ok(tx.search(&query).await?.total > 0),
        None => Ok(false),
    }
}

/// Hooks for Organization: identifiers are the natural key.
pub struct OrganizationHooks;

#[async_trait]
impl RuleHooks for OrganizationHooks {
    fn resource_type(&self) -> &'static str {
        "Organization"
    }

    async fn resource_exists(
        &self,
        tx: &mut dyn StoreTransaction,
        new: &Value,
    ) -> EngineResult<bool> {
        for (system, value) in identifier_tokens(new) {
            let token = format!("{system}|{value}");
            if any_match(tx, "Organization", "identifier", &token).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn modifications_ok(
        &self,
        _tx: &mut dyn StoreTransaction,
        old: &Value,
        new: &Value,
    ) -> EngineResult<bool> {
        Ok(identifier_tokens(old) == identifier_tokens(new))
    }
}

/// Hooks for Endpoint: the address is the natural key.
pub struct EndpointHooks;

#[async_trait]
impl RuleHooks for EndpointHooks {
    fn resource_type(&self) -> &'static str {
        "Endpoint"
    }

    async fn resource_exists(
        &self,
        tx: &mut dyn StoreTransaction,
        new: &Value,
    ) -> EngineResult<bool> {
        match new.get("address").and_then(Value::as_str) {
            Some(address) => any_match(tx, "Endpoint", "address", address).await,
            None => Ok(false),
        }
    }

    async fn modifications_ok(
        &self,
        _tx: &mut dyn StoreTransaction,
        old: &Value,
        new: &Value,
    ) -> EngineResult<bool> {
        Ok(old.get("address") == new.get("address"))
    }
}

/// The Organization rule.
pub fn organization_rule() -> TagAuthorizationRule<OrganizationHooks> {
    TagAuthorizationRule::new(OrganizationHooks)
}

/// The Endpoint rule.
pub fn endpoint_rule() -> TagAuthorizationRule<EndpointHooks> {
    TagAuthorizationRule::new(EndpointHooks)
}

/// The Location rule; no natural key.
pub fn location_rule() -> TagAuthorizationRule<UnconstrainedHooks> {
    TagAuthorizationRule::new(UnconstrainedHooks::new("Location"))
}

/// The Binary rule; no natural key.
pub fn binary_rule() -> TagAuthorizationRule<UnconstrainedHooks> {
    TagAuthorizationRule::new(UnconstrainedHooks::new("Binary"))
}

/// The Bundle rule; no natural key.
pub fn bundle_rule() -> TagAuthorizationRule<UnconstrainedHooks> {
    TagAuthorizationRule::new(UnconstrainedHooks::new("Bundle"))
}
