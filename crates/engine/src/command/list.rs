//! Command ordering and execution.
//!
//! [`CommandList`] wires temporary-id dependencies between parsed commands
//! and produces the execution order: delete phase first, then creates in
//! topological producer-before-consumer order, then updates, then reads.
//! [`Executor`] runs one command against a storage transaction, carrying the
//! temporary-id table across commands of the same bundle.

use std::collections::HashMap;
use tracing::info;

use crate::authorization::{AuthorizationRule, RuleRegistry};
use crate::command::{Command, CommandKind, Phase};
use crate::config::EngineConfig;
use crate::error::{AuthError, BundleError, EngineError, EngineResult, StorageError};
use crate::reference::{self, collect_references, ReferenceResolver};
use crate::search::{parse_query_string, SearchQuery};
use crate::storage::StoreTransaction;
use crate::types::{EntryResult, Identity, StoredResource};
use crate::user::User;
use crate::validation::{IssueSeverity, ResourceValidator, ValidationFailure};

/// The parsed commands of one bundle, with temporary-id dependencies wired.
#[derive(Debug)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    /// Builds the list, mapping each temporary fullUrl to its producing
    /// command and recording which commands consume it.
    ///
    /// # Errors
    ///
    /// * `BundleError::DuplicateFullUrl` - if two entries share a temporary
    ///   fullUrl
    pub fn new(mut commands: Vec<Command>) -> Result<Self, BundleError> {
        let mut producers: HashMap<String, usize> = HashMap::new();
        for command in &commands {
            if let Some(urn) = command.temporary_id() {
                if producers.insert(urn.to_string(), command.index).is_some() {
                    return Err(BundleError::DuplicateFullUrl {
                        full_url: urn.to_string(),
                    });
                }
            }
        }

        for command in &mut commands {
            let Some(resource) = &command.resource else {
                continue;
            };
            let mut deps: Vec<usize> = collect_references(resource)
                .iter()
                .filter(|r| r.value.starts_with("urn:"))
                .filter_map(|r| producers.get(&r.value).copied())
                .filter(|&producer| producer != command.index)
                .collect();
            deps.sort_unstable();
            deps.dedup();
            command.dependencies = deps;
        }

        Ok(Self { commands })
    }

    /// The commands, in entry order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns command indices in execution order: phases in fixed order,
    /// stable within a phase, except that the create phase is topologically
    /// sorted so producers of temporary ids run before their consumers.
    ///
    /// # Errors
    ///
    /// * `BundleError::ReferenceCycle` - if the temporary references between
    ///   creates form a cycle
    pub fn execution_order(&self) -> Result<Vec<usize>, BundleError> {
        let mut order = Vec::with_capacity(self.commands.len());
        for phase in [Phase::Delete, Phase::Create, Phase::Update, Phase::Read] {
            let in_phase: Vec<usize> = self
                .commands
                .iter()
                .filter(|c| c.kind.phase() == phase)
                .map(|c| c.index)
                .collect();
            if phase == Phase::Create {
                order.extend(self.topological(&in_phase)?);
            } else {
                order.extend(in_phase);
            }
        }
        Ok(order)
    }

    /// Kahn's algorithm over the create-phase dependency edges, preferring
    /// entry order among ready commands so the result is deterministic.
    fn topological(&self, creates: &[usize]) -> Result<Vec<usize>, BundleError> {
        let in_creates = |index: usize| creates.contains(&index);
        let mut pending: Vec<usize> = creates.to_vec();
        let mut done: Vec<usize> = Vec::with_capacity(creates.len());

        while !pending.is_empty() {
            let ready = pending.iter().position(|&index| {
                self.commands[index]
                    .dependencies
                    .iter()
                    .all(|&dep| !in_creates(dep) || done.contains(&dep))
            });
            match ready {
                Some(position) => done.push(pending.remove(position)),
                None => {
                    return Err(BundleError::ReferenceCycle { index: pending[0] });
                }
            }
        }
        Ok(done)
    }
}

/// Runs commands against one storage transaction, accumulating the
/// temporary-id table so later commands see the ids of earlier writes.
pub(crate) struct Executor<'a> {
    config: &'a EngineConfig,
    rules: &'a RuleRegistry,
    validator: &'a dyn ResourceValidator,
    user: &'a User,
    temp_ids: HashMap<String, Identity>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        config: &'a EngineConfig,
        rules: &'a RuleRegistry,
        validator: &'a dyn ResourceValidator,
        user: &'a User,
    ) -> Self {
        Self {
            config,
            rules,
            validator,
            user,
            temp_ids: HashMap::new(),
        }
    }

    /// Executes one command.
    pub(crate) async fn run(
        &mut self,
        tx: &mut dyn StoreTransaction,
        command: &Command,
    ) -> EngineResult<EntryResult> {
        match &command.kind {
            CommandKind::Create {
                resource_type,
                if_none_exist,
            } => {
                self.run_create(tx, command, resource_type, if_none_exist.as_deref())
                    .await
            }
            CommandKind::Update {
                resource_type,
                id,
                expected_version,
            } => {
                self.run_update(tx, command, resource_type, id, *expected_version)
                    .await
            }
            CommandKind::ConditionalUpdate {
                resource_type,
                query,
                expected_version,
            } => {
                self.run_conditional_update(tx, command, resource_type, query, *expected_version)
                    .await
            }
            CommandKind::Delete { resource_type, id } => {
                self.run_delete(tx, resource_type, id).await
            }
            CommandKind::ConditionalDelete {
                resource_type,
                query,
            } => self.run_conditional_delete(tx, resource_type, query).await,
            CommandKind::Expunge { resource_type, id } => {
                self.run_expunge(tx, resource_type, id).await
            }
            CommandKind::Read { resource_type, id } => self.run_read(tx, resource_type, id).await,
        }
    }

    fn rule_for(
        &self,
        resource_type: &str,
    ) -> EngineResult<&std::sync::Arc<dyn AuthorizationRule>> {
        self.rules.get(resource_type).ok_or_else(|| {
            AuthError::UnknownResourceType {
                resource_type: resource_type.to_string(),
            }
            .into()
        })
    }

    fn denied(&self, verb: &str, resource_type: &str) -> EngineError {
        AuthError::Denied {
            operation: verb.to_string(),
            resource_type: resource_type.to_string(),
        }
        .into()
    }

    fn record_temporary(&mut self, command: &Command, identity: Identity) {
        if let Some(urn) = command.temporary_id() {
            self.temp_ids.insert(urn.to_string(), identity);
        }
    }

    /// Cleans contained duplicates, resolves references, and validates the
    /// payload. All writes pass through here before authorization.
    async fn prepare(
        &self,
        tx: &mut dyn StoreTransaction,
        resource_type: &str,
        content: &serde_json::Value,
    ) -> EngineResult<serde_json::Value> {
        let cleaned = reference::clean(content);
        let resolver = ReferenceResolver::new(self.config, self.rules);
        let resolved = resolver
            .resolve_in_content(tx, self.user, &cleaned, &self.temp_ids)
            .await?;
        let issues = self.validator.validate(resource_type, &resolved, None).await;
        if issues.iter().any(|i| i.severity == IssueSeverity::Error) {
            return Err(ValidationFailure { issues }.into());
        }
        Ok(resolved)
    }

    fn created_result(&self, stored: &StoredResource) -> EntryResult {
        let location = stored.absolute_versioned_url(&self.config.base_with_slash());
        EntryResult::created(stored, location)
    }

    async fn run_create(
        &mut self,
        tx: &mut dyn StoreTransaction,
        command: &Command,
        resource_type: &str,
        if_none_exist: Option<&str>,
    ) -> EngineResult<EntryResult> {
        let content = command.resource.as_ref().ok_or_else(|| {
            BundleError::InvalidEntry {
                index: command.index,
                message: "create requires a resource payload".to_string(),
            }
        })?;

        if let Some(criteria) = if_none_exist {
            let params = parse_query_string(criteria);
            let query = SearchQuery::configure_strict(resource_type, params, self.config)?;
            let page = tx.search(&query).await?;
            match page.total {
                0 => {}
                1 => {
                    let existing = page.resources.first().ok_or_else(|| {
                        StorageError::Failure {
                            message: "search returned total 1 with an empty page".to_string(),
                        }
                    })?;
                    let rule = self.rule_for(resource_type)?;
                    if !rule.allows_read(self.user, existing).await.is_allowed() {
                        return Err(self.denied("create", resource_type));
                    }
                    info!(
                        resource_type,
                        id = existing.id(),
                        "conditional create matched an existing resource, no write performed"
                    );
                    let identity = existing.identity();
                    let result = EntryResult::ok(existing);
                    self.record_temporary(command, identity);
                    return Ok(result);
                }
                count => {
                    return Err(BundleError::MultipleMatches {
                        operation: "create".to_string(),
                        count,
                    }
                    .into());
                }
            }
        }

        let prepared = self.prepare(tx, resource_type, content).await?;
        let rule = self.rule_for(resource_type)?;
        if !rule
            .allows_create(tx, self.user, &prepared)
            .await?
            .is_allowed()
        {
            return Err(self.denied("create", resource_type));
        }
        let stored = tx.create(resource_type, prepared).await?;
        info!(resource_type, id = stored.id(), "created resource");
        self.record_temporary(command, stored.identity());
        Ok(self.created_result(&stored))
    }

    async fn run_update(
        &mut self,
        tx: &mut dyn StoreTransaction,
        command: &Command,
        resource_type: &str,
        id: &str,
        expected_version: Option<u64>,
    ) -> EngineResult<EntryResult> {
        let content = command.resource.as_ref().ok_or_else(|| {
            BundleError::InvalidEntry {
                index: command.index,
                message: "update requires a resource payload".to_string(),
            }
        })?;

        match tx.read(resource_type, id).await? {
            None => {
                // Update-as-create: PUT to an id the server has never seen.
                let prepared = self.prepare(tx, resource_type, content).await?;
                let rule = self.rule_for(resource_type)?;
                if !rule
                    .allows_create(tx, self.user, &prepared)
                    .await?
                    .is_allowed()
                {
                    return Err(self.denied("create", resource_type));
                }
                let stored = tx.create_with_id(resource_type, id, prepared).await?;
                info!(resource_type, id, "created resource with client id");
                self.record_temporary(command, stored.identity());
                Ok(self.created_result(&stored))
            }
            Some(current) if current.is_deleted() => Err(StorageError::Gone {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            }
            .into()),
            Some(current) => {
                if let Some(expected) = expected_version {
                    if current.version_id() != expected {
                        return Err(StorageError::VersionConflict {
                            resource_type: resource_type.to_string(),
                            id: id.to_string(),
                            expected,
                            actual: current.version_id(),
                        }
                        .into());
                    }
                }
                let prepared = self.prepare(tx, resource_type, content).await?;
                let rule = self.rule_for(resource_type)?;
                if !rule
                    .allows_update(tx, self.user, &current, &prepared)
                    .await?
                    .is_allowed()
                {
                    return Err(self.denied("update", resource_type));
                }
                let stored = tx.update(&current, prepared).await?;
                info!(
                    resource_type,
                    id,
                    version = stored.version_id(),
                    "updated resource"
                );
                self.record_temporary(command, stored.identity());
                Ok(EntryResult::ok(&stored))
            }
        }
    }

    async fn run_conditional_update(
        &mut self,
        tx: &mut dyn StoreTransaction,
        command: &Command,
        resource_type: &str,
        query: &str,
        expected_version: Option<u64>,
    ) -> EngineResult<EntryResult> {
        let params = parse_query_string(query);
        let search = SearchQuery::configure_strict(resource_type, params, self.config)?;
        let page = tx.search(&search).await?;
        match page.total {
            // No match: the conditional update creates the resource.
            0 => {
                let content = command.resource.as_ref().ok_or_else(|| {
                    BundleError::InvalidEntry {
                        index: command.index,
                        message: "update requires a resource payload".to_string(),
                    }
                })?;
                let prepared = self.prepare(tx, resource_type, content).await?;
                let rule = self.rule_for(resource_type)?;
                if !rule
                    .allows_create(tx, self.user, &prepared)
                    .await?
                    .is_allowed()
                {
                    return Err(self.denied("create", resource_type));
                }
                let stored = tx.create(resource_type, prepared).await?;
                info!(resource_type, id = stored.id(), "created resource");
                self.record_temporary(command, stored.identity());
                Ok(self.created_result(&stored))
            }
            1 => {
                let matched = page.resources.first().ok_or_else(|| {
                    StorageError::Failure {
                        message: "search returned total 1 with an empty page".to_string(),
                    }
                })?;
                let id = matched.id().to_string();
                self.run_update(tx, command, resource_type, &id, expected_version)
                    .await
            }
            count => Err(BundleError::MultipleMatches {
                operation: "update".to_string(),
                count,
            }
            .into()),
        }
    }

    async fn run_delete(
        &mut self,
        tx: &mut dyn StoreTransaction,
        resource_type: &str,
        id: &str,
    ) -> EngineResult<EntryResult> {
        match tx.read(resource_type, id).await? {
            None => Err(StorageError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            }
            .into()),
            // Deleting twice is a no-op.
            Some(current) if current.is_deleted() => Ok(EntryResult::deleted()),
            Some(current) => {
                let rule = self.rule_for(resource_type)?;
                if !rule.allows_delete(self.user, &current).await.is_allowed() {
                    return Err(self.denied("delete", resource_type));
                }
                tx.delete(resource_type, id).await?;
                info!(resource_type, id, "deleted resource");
                Ok(EntryResult::deleted())
            }
        }
    }

    async fn run_conditional_delete(
        &mut self,
        tx: &mut dyn StoreTransaction,
        resource_type: &str,
        query: &str,
    ) -> EngineResult<EntryResult> {
        let params = parse_query_string(query);
        let search = SearchQuery::configure_strict(resource_type, params, self.config)?;
        let page = tx.search(&search).await?;
        match page.total {
            0 => Err(BundleError::NoMatch {
                operation: "delete".to_string(),
            }
            .into()),
            1 => {
                let matched = page.resources.first().ok_or_else(|| {
                    StorageError::Failure {
                        message: "search returned total 1 with an empty page".to_string(),
                    }
                })?;
                let id = matched.id().to_string();
                self.run_delete(tx, resource_type, &id).await
            }
            count => Err(BundleError::MultipleMatches {
                operation: "delete".to_string(),
                count,
            }
            .into()),
        }
    }

    async fn run_expunge(
        &mut self,
        tx: &mut dyn StoreTransaction,
        resource_type: &str,
        id: &str,
    ) -> EngineResult<EntryResult> {
        match tx.read(resource_type, id).await? {
            None => Err(StorageError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            }
            .into()),
            Some(current) if !current.is_deleted() => Err(BundleError::ExpungeNotDeleted {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            }
            .into()),
            Some(current) => {
                let rule = self.rule_for(resource_type)?;
                if !rule.allows_expunge(self.user, &current).await.is_allowed() {
                    return Err(self.denied("expunge", resource_type));
                }
                tx.expunge(resource_type, id).await?;
                info!(resource_type, id, "expunged resource");
                Ok(EntryResult::deleted())
            }
        }
    }

    async fn run_read(
        &mut self,
        tx: &mut dyn StoreTransaction,
        resource_type: &str,
        id: &str,
    ) -> EngineResult<EntryResult> {
        match tx.read(resource_type, id).await? {
            None => Err(StorageError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            }
            .into()),
            Some(current) if current.is_deleted() => Err(StorageError::Gone {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            }
            .into()),
            Some(current) => {
                let rule = self.rule_for(resource_type)?;
                if !rule.allows_read(self.user, &current).await.is_allowed() {
                    return Err(self.denied("read", resource_type));
                }
                Ok(EntryResult::ok(&current))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BundleEntry, RequestMethod};
    use serde_json::json;

    fn parse_all(entries: Vec<BundleEntry>) -> CommandList {
        let commands = entries
            .iter()
            .enumerate()
            .map(|(i, e)| Command::parse(i, e).unwrap())
            .collect();
        CommandList::new(commands).unwrap()
    }

    #[test]
    fn test_deletes_run_before_creates_regardless_of_entry_order() {
        let list = parse_all(vec![
            BundleEntry::new(RequestMethod::Post, "Organization")
                .with_resource(json!({"resourceType": "Organization"})),
            BundleEntry::new(RequestMethod::Delete, "Organization/old"),
            BundleEntry::new(RequestMethod::Get, "Organization/other"),
            BundleEntry::new(RequestMethod::Put, "Endpoint/ep-1")
                .with_resource(json!({"resourceType": "Endpoint", "id": "ep-1"})),
        ]);
        assert_eq!(list.execution_order().unwrap(), vec![1, 0, 3, 2]);
    }

    #[test]
    fn test_create_order_producer_before_consumer() {
        let urn = "urn:uuid:11111111-2222-3333-4444-555555555555";
        let list = parse_all(vec![
            // Consumer first in entry order.
            BundleEntry::new(RequestMethod::Post, "Endpoint").with_resource(json!({
                "resourceType": "Endpoint",
                "managingOrganization": {"reference": urn}
            })),
            BundleEntry::new(RequestMethod::Post, "Organization")
                .with_full_url(urn)
                .with_resource(json!({"resourceType": "Organization"})),
        ]);
        assert_eq!(list.execution_order().unwrap(), vec![1, 0]);
        assert_eq!(list.commands()[0].dependencies, vec![1]);
    }

    #[test]
    fn test_create_order_stable_without_dependencies() {
        let list = parse_all(vec![
            BundleEntry::new(RequestMethod::Post, "Organization")
                .with_resource(json!({"resourceType": "Organization"})),
            BundleEntry::new(RequestMethod::Post, "Location")
                .with_resource(json!({"resourceType": "Location"})),
            BundleEntry::new(RequestMethod::Post, "Binary")
                .with_resource(json!({"resourceType": "Binary"})),
        ]);
        assert_eq!(list.execution_order().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_reference_cycle_detected() {
        let urn_a = "urn:uuid:aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";
        let urn_b = "urn:uuid:bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb";
        let list = parse_all(vec![
            BundleEntry::new(RequestMethod::Post, "Organization")
                .with_full_url(urn_a)
                .with_resource(json!({
                    "resourceType": "Organization",
                    "partOf": {"reference": urn_b}
                })),
            BundleEntry::new(RequestMethod::Post, "Organization")
                .with_full_url(urn_b)
                .with_resource(json!({
                    "resourceType": "Organization",
                    "partOf": {"reference": urn_a}
                })),
        ]);
        assert!(matches!(
            list.execution_order(),
            Err(BundleError::ReferenceCycle { .. })
        ));
    }

    #[test]
    fn test_duplicate_full_url_rejected() {
        let urn = "urn:uuid:11111111-2222-3333-4444-555555555555";
        let commands = vec![
            Command::parse(
                0,
                &BundleEntry::new(RequestMethod::Post, "Organization")
                    .with_full_url(urn)
                    .with_resource(json!({"resourceType": "Organization"})),
            )
            .unwrap(),
            Command::parse(
                1,
                &BundleEntry::new(RequestMethod::Post, "Location")
                    .with_full_url(urn)
                    .with_resource(json!({"resourceType": "Location"})),
            )
            .unwrap(),
        ];
        assert!(matches!(
            CommandList::new(commands),
            Err(BundleError::DuplicateFullUrl { .. })
        ));
    }
}
