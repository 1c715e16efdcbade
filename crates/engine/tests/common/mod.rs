//! Test infrastructure for the bundle execution engine.
//!
//! Provides an in-memory [`ResourceStore`] with real transaction semantics
//! (staged writes, read-your-own-writes, commit/rollback) plus fixture
//! builders for tagged resources and configured engines.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use url::Url;

use helios_bundle_engine::authorization::RuleRegistry;
use helios_bundle_engine::command::CommandFactory;
use helios_bundle_engine::config::EngineConfig;
use helios_bundle_engine::error::{StorageError, StorageResult};
use helios_bundle_engine::search::{SearchPage, SearchQuery};
use helios_bundle_engine::storage::{ResourceStore, StoreTransaction};
use helios_bundle_engine::types::{ReadAccess, StoredResource};
use helios_bundle_engine::user::User;
use helios_bundle_engine::validation::{
    NoopValidator, ResourceValidator, ValidationIssue,
};

type Key = (String, String);
type Histories = HashMap<Key, Vec<StoredResource>>;

/// In-memory store with per-transaction staging.
#[derive(Default)]
pub struct MemoryStore {
    histories: Arc<RwLock<Histories>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts version 1 of a resource directly, bypassing the engine.
    pub fn seed(&self, resource_type: &str, id: &str, content: Value) {
        let resource = StoredResource::new(resource_type, id, content);
        self.histories
            .write()
            .insert(key(resource_type, id), vec![resource]);
    }

    /// Inserts a resource and immediately soft-deletes it.
    pub fn seed_deleted(&self, resource_type: &str, id: &str, content: Value) {
        let resource = StoredResource::new(resource_type, id, content);
        let history = vec![resource.clone(), resource.mark_deleted()];
        self.histories.write().insert(key(resource_type, id), history);
    }

    /// Latest committed version, deleted versions included.
    pub fn latest(&self, resource_type: &str, id: &str) -> Option<StoredResource> {
        self.histories
            .read()
            .get(&key(resource_type, id))
            .and_then(|h| h.last())
            .cloned()
    }

    /// Number of committed versions of a resource, zero if expunged.
    pub fn version_count(&self, resource_type: &str, id: &str) -> usize {
        self.histories
            .read()
            .get(&key(resource_type, id))
            .map(|h| h.len())
            .unwrap_or(0)
    }

    /// Number of committed resources, deleted versions included.
    pub fn resource_count(&self) -> usize {
        self.histories.read().len()
    }
}

fn key(resource_type: &str, id: &str) -> Key {
    (resource_type.to_string(), id.to_string())
}

#[async_trait]
impl ResourceStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.histories),
            staged: HashMap::new(),
            expunged: HashSet::new(),
            active: true,
        }))
    }
}

/// One staged transaction over [`MemoryStore`].
pub struct MemoryTransaction {
    shared: Arc<RwLock<Histories>>,
    staged: Histories,
    expunged: HashSet<Key>,
    active: bool,
}

impl MemoryTransaction {
    fn check_active(&self) -> StorageResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(StorageError::InvalidTransaction)
        }
    }

    /// History of a key as this transaction sees it.
    fn history(&self, key: &Key) -> Option<Vec<StoredResource>> {
        if self.expunged.contains(key) {
            return None;
        }
        if let Some(history) = self.staged.get(key) {
            return Some(history.clone());
        }
        self.shared.read().get(key).cloned()
    }

    fn stage(&mut self, key: Key, resource: StoredResource) {
        let mut history = self.history(&key).unwrap_or_default();
        history.push(resource);
        self.expunged.remove(&key);
        self.staged.insert(key, history);
    }

    /// Latest version of every resource visible to this transaction.
    fn visible_latest(&self) -> Vec<StoredResource> {
        let shared = self.shared.read();
        let mut keys: HashSet<Key> = shared.keys().cloned().collect();
        keys.extend(self.staged.keys().cloned());
        let mut latest: Vec<StoredResource> = keys
            .into_iter()
            .filter_map(|k| self.history(&k).and_then(|h| h.last().cloned()))
            .collect();
        latest.sort_by(|a, b| {
            (a.resource_type(), a.id()).cmp(&(b.resource_type(), b.id()))
        });
        latest
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn create(
        &mut self,
        resource_type: &str,
        content: Value,
    ) -> StorageResult<StoredResource> {
        self.check_active()?;
        let id = uuid::Uuid::new_v4().to_string();
        self.create_with_id(resource_type, &id, content).await
    }

    async fn create_with_id(
        &mut self,
        resource_type: &str,
        id: &str,
        content: Value,
    ) -> StorageResult<StoredResource> {
        self.check_active()?;
        let key = key(resource_type, id);
        if self.history(&key).is_some() {
            return Err(StorageError::Failure {
                message: format!("id already in use: {resource_type}/{id}"),
            });
        }
        let resource = StoredResource::new(resource_type, id, content);
        self.stage(key, resource.clone());
        Ok(resource)
    }

    async fn read(
        &mut self,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<Option<StoredResource>> {
        self.check_active()?;
        Ok(self
            .history(&key(resource_type, id))
            .and_then(|h| h.last().cloned()))
    }

    async fn read_version(
        &mut self,
        resource_type: &str,
        id: &str,
        version_id: u64,
    ) -> StorageResult<Option<StoredResource>> {
        self.check_active()?;
        Ok(self
            .history(&key(resource_type, id))
            .and_then(|h| h.iter().find(|r| r.version_id() == version_id).cloned()))
    }

    async fn update(
        &mut self,
        current: &StoredResource,
        content: Value,
    ) -> StorageResult<StoredResource> {
        self.check_active()?;
        let key = key(current.resource_type(), current.id());
        let latest = self
            .history(&key)
            .and_then(|h| h.last().cloned())
            .ok_or_else(|| StorageError::NotFound {
                resource_type: current.resource_type().to_string(),
                id: current.id().to_string(),
            })?;
        if latest.version_id() != current.version_id() {
            return Err(StorageError::VersionConflict {
                resource_type: current.resource_type().to_string(),
                id: current.id().to_string(),
                expected: current.version_id(),
                actual: latest.version_id(),
            });
        }
        let next = latest.new_version(content);
        self.stage(key, next.clone());
        Ok(next)
    }

    async fn delete(&mut self, resource_type: &str, id: &str) -> StorageResult<StoredResource> {
        self.check_active()?;
        let key = key(resource_type, id);
        let latest = self
            .history(&key)
            .and_then(|h| h.last().cloned())
            .ok_or_else(|| StorageError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            })?;
        let deleted = latest.mark_deleted();
        self.stage(key, deleted.clone());
        Ok(deleted)
    }

    async fn expunge(&mut self, resource_type: &str, id: &str) -> StorageResult<()> {
        self.check_active()?;
        let key = key(resource_type, id);
        if self.history(&key).is_none() {
            return Err(StorageError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            });
        }
        self.staged.remove(&key);
        self.expunged.insert(key);
        Ok(())
    }

    async fn search(&mut self, query: &SearchQuery) -> StorageResult<SearchPage> {
        self.check_active()?;
        let matched: Vec<StoredResource> = self
            .visible_latest()
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        let total = matched.len();
        let resources = matched
            .into_iter()
            .skip(query.offset())
            .take(query.count() as usize)
            .collect();
        Ok(SearchPage { resources, total })
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.check_active()?;
        let this = *self;
        let mut shared = this.shared.write();
        for key in &this.expunged {
            shared.remove(key);
        }
        for (key, history) in this.staged {
            shared.insert(key, history);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.check_active()?;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Validator that reports an error-severity issue for every resource.
pub struct RejectingValidator;

#[async_trait]
impl ResourceValidator for RejectingValidator {
    async fn validate(
        &self,
        resource_type: &str,
        _content: &Value,
        _profile: Option<&str>,
    ) -> Vec<ValidationIssue> {
        vec![ValidationIssue::error(format!(
            "{resource_type} does not conform to its base profile"
        ))]
    }
}

/// Store whose transactions can never be opened, simulating a backend
/// outage.
pub struct FailingStore;

#[async_trait]
impl ResourceStore for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>> {
        Err(StorageError::Failure {
            message: "backend unavailable".to_string(),
        })
    }
}

/// Bundles a store, registry, and factory for one test.
pub struct TestEngine {
    pub store: Arc<MemoryStore>,
    pub factory: CommandFactory,
    pub config: EngineConfig,
}

pub const BASE_URL: &str = "https://fhir.example.org/fhir";

impl TestEngine {
    pub fn new() -> Self {
        Self::with_validator(Arc::new(NoopValidator))
    }

    /// Builds an engine around a custom validation collaborator.
    pub fn with_validator(validator: Arc<dyn ResourceValidator>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig::new(Url::parse(BASE_URL).unwrap());
        let factory = CommandFactory::new(
            config.clone(),
            Arc::new(RuleRegistry::with_defaults()),
            validator,
            Arc::clone(&store) as Arc<dyn ResourceStore>,
        );
        Self {
            store,
            factory,
            config,
        }
    }

    /// Builds a factory over a store whose transactions cannot be opened.
    pub fn failing_factory() -> CommandFactory {
        let config = EngineConfig::new(Url::parse(BASE_URL).unwrap());
        CommandFactory::new(
            config,
            Arc::new(RuleRegistry::with_defaults()),
            Arc::new(NoopValidator),
            Arc::new(FailingStore),
        )
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A local user; covered by every read-access tag.
pub fn local_user() -> User {
    User::local("test-admin", "org.example")
}

/// A remote user affiliated with `organization`.
pub fn remote_user(organization: &str) -> User {
    User::remote("test-remote", organization)
}

/// A minimal resource carrying the given read-access tags.
pub fn tagged(resource_type: &str, tags: &[ReadAccess]) -> Value {
    let tag_values: Vec<Value> = tags.iter().map(ReadAccess::tag_value).collect();
    json!({
        "resourceType": resource_type,
        "meta": {"tag": tag_values}
    })
}

/// Like [`tagged`], with extra top-level fields merged in.
pub fn tagged_with(resource_type: &str, tags: &[ReadAccess], extra: Value) -> Value {
    let mut resource = tagged(resource_type, tags);
    if let (Some(base), Some(fields)) = (resource.as_object_mut(), extra.as_object()) {
        for (name, value) in fields {
            base.insert(name.clone(), value.clone());
        }
    }
    resource
}
