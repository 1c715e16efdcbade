//! Bundle execution facade.
//!
//! [`CommandFactory`] turns a [`Bundle`] into commands and executes them. A
//! transaction bundle runs every command on one storage transaction and
//! aborts entirely, with rollback, on the first failure. A batch bundle runs
//! each entry on its own transaction; deterministic failures are captured as
//! per-entry outcomes, and only transient storage faults abort the whole
//! bundle.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::command::list::Executor;
use crate::command::{Command, CommandList};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, StorageError};
use crate::outcome::Outcome;
use crate::reference::collect_references;
use crate::storage::ResourceStore;
use crate::types::{Bundle, BundleEntry, BundleResult, BundleType, EntryResult};
use crate::user::User;
use crate::authorization::RuleRegistry;
use crate::validation::ResourceValidator;

/// Parses and executes bundles against a storage collaborator.
pub struct CommandFactory {
    config: EngineConfig,
    rules: Arc<RuleRegistry>,
    validator: Arc<dyn ResourceValidator>,
    store: Arc<dyn ResourceStore>,
}

impl CommandFactory {
    /// Creates a factory over the given collaborators.
    pub fn new(
        config: EngineConfig,
        rules: Arc<RuleRegistry>,
        validator: Arc<dyn ResourceValidator>,
        store: Arc<dyn ResourceStore>,
    ) -> Self {
        Self {
            config,
            rules,
            validator,
            store,
        }
    }

    /// Parses a bundle's entries into an ordered command list.
    ///
    /// # Errors
    ///
    /// * `BundleError::InvalidEntry` - if an entry's request line or payload
    ///   is unusable
    /// * `BundleError::DuplicateFullUrl` - if two entries share a temporary
    ///   fullUrl
    pub fn create_commands(&self, bundle: &Bundle) -> EngineResult<CommandList> {
        let commands = bundle
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| Command::parse(index, entry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CommandList::new(commands)?)
    }

    /// Executes a bundle on behalf of `user`.
    ///
    /// For a transaction bundle the `Err` case covers every failure; the
    /// caller renders it with [`Outcome::from`]. For a batch bundle the
    /// `Err` case covers only transient storage faults; everything else is
    /// captured per entry.
    pub async fn execute(&self, user: &User, bundle: &Bundle) -> EngineResult<BundleResult> {
        debug!(
            bundle_type = ?bundle.bundle_type,
            entries = bundle.entries.len(),
            user = user.name(),
            "executing bundle"
        );
        match bundle.bundle_type {
            BundleType::Transaction => self.execute_transaction(user, bundle).await,
            BundleType::Batch => self.execute_batch(user, bundle).await,
        }
    }

    async fn execute_transaction(
        &self,
        user: &User,
        bundle: &Bundle,
    ) -> EngineResult<BundleResult> {
        let list = self.create_commands(bundle)?;
        let order = list.execution_order()?;

        let mut tx = self.store.begin().await?;
        let mut executor = Executor::new(&self.config, &self.rules, self.validator.as_ref(), user);
        let mut results: Vec<Option<EntryResult>> = vec![None; list.commands().len()];

        for &index in &order {
            let command = &list.commands()[index];
            match executor.run(tx.as_mut(), command).await {
                Ok(result) => results[index] = Some(result),
                Err(err) => {
                    warn!(entry = index, error = %err, "transaction bundle aborted");
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "rollback after failed bundle also failed");
                    }
                    return Err(err);
                }
            }
        }

        tx.commit().await?;

        let entries = results
            .into_iter()
            .map(|result| {
                result.ok_or_else(|| {
                    EngineError::from(StorageError::Failure {
                        message: "bundle entry produced no result".to_string(),
                    })
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(BundleResult {
            bundle_type: BundleType::Transaction,
            entries,
        })
    }

    async fn execute_batch(&self, user: &User, bundle: &Bundle) -> EngineResult<BundleResult> {
        let mut entries = Vec::with_capacity(bundle.entries.len());
        for (index, entry) in bundle.entries.iter().enumerate() {
            match self.execute_batch_entry(user, index, entry).await {
                Ok(result) => entries.push(result),
                Err(err) if err.is_fatal_to_bundle() => return Err(err),
                Err(err) => {
                    warn!(entry = index, error = %err, "batch entry failed");
                    entries.push(EntryResult::error(Outcome::from(&err)));
                }
            }
        }
        Ok(BundleResult {
            bundle_type: BundleType::Batch,
            entries,
        })
    }

    /// Runs one batch entry on its own storage transaction.
    async fn execute_batch_entry(
        &self,
        user: &User,
        index: usize,
        entry: &BundleEntry,
    ) -> EngineResult<EntryResult> {
        let command = Command::parse(index, entry)?;
        if let Some(resource) = &command.resource {
            if collect_references(resource)
                .iter()
                .any(|r| r.value.starts_with("urn:"))
            {
                return Err(crate::error::BundleError::TemporaryReferenceInBatch { index }.into());
            }
        }

        let mut tx = self.store.begin().await?;
        let mut executor = Executor::new(&self.config, &self.rules, self.validator.as_ref(), user);
        match executor.run(tx.as_mut(), &command).await {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed batch entry also failed");
                }
                Err(err)
            }
        }
    }
}
