//! Helios FHIR Bundle Execution Engine
//!
//! This crate executes FHIR transaction and batch bundles against a pluggable
//! storage collaborator: it parses bundle entries into commands, resolves
//! literal, conditional, and temporary references between them, enforces
//! read-access-tag authorization per resource type, and applies the whole
//! bundle atomically (transaction) or entry by entry (batch).
//!
//! # Features
//!
//! - **Commands**: `POST`/`PUT`/`DELETE`/`GET` entries, conditional create
//!   (`If-None-Exist`), conditional update and delete (`Type?query`),
//!   version-checked update (`If-Match`), and `$expunge` of soft-deleted
//!   resources
//! - **References**: temporary (`urn:uuid:`) references resolved in
//!   producer-before-consumer order and rewritten to absolute versioned
//!   URLs; conditional references resolved to exactly one match
//! - **Authorization**: read-access tags (`LOCAL`, `ORGANIZATION`, `ALL`)
//!   with per-type uniqueness and immutability rules
//! - **Search**: a typed per-resource search parameter catalog backing
//!   conditional operations and the storage predicate
//!
//! # Architecture
//!
//! - [`types`] - Bundles, entries, stored resources, read-access tags
//! - [`command`] - Entry parsing, phase ordering, and bundle execution
//! - [`authorization`] - Decision trait, tag rule, and the rule registry
//! - [`reference`] - Reference classification, cleaning, and resolution
//! - [`search`] - Search parameter catalog and query binding
//! - [`storage`] - The persistence collaborator traits
//! - [`error`] / [`outcome`] - Error taxonomy and HTTP-shaped outcomes
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use helios_bundle_engine::authorization::RuleRegistry;
//! use helios_bundle_engine::command::CommandFactory;
//! use helios_bundle_engine::config::EngineConfig;
//! use helios_bundle_engine::storage::ResourceStore;
//! use helios_bundle_engine::types::{Bundle, BundleEntry, RequestMethod};
//! use helios_bundle_engine::user::User;
//! use helios_bundle_engine::validation::NoopValidator;
//! use serde_json::json;
//! use url::Url;
//!
//! # async fn run(store: Arc<dyn ResourceStore>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::new(Url::parse("https://fhir.example.org/fhir")?);
//! let factory = CommandFactory::new(
//!     config,
//!     Arc::new(RuleRegistry::with_defaults()),
//!     Arc::new(NoopValidator),
//!     store,
//! );
//!
//! let bundle = Bundle::transaction().with_entry(
//!     BundleEntry::new(RequestMethod::Post, "Organization")
//!         .with_full_url("urn:uuid:4f800b9f-2cbc-42a7-a599-2a7a8d2b3f15")
//!         .with_resource(json!({
//!             "resourceType": "Organization",
//!             "meta": {"tag": [{
//!                 "system": "https://helios-software.com/fhir/CodeSystem/read-access-tag",
//!                 "code": "ALL"
//!             }]},
//!             "name": "Example Organization"
//!         })),
//! );
//!
//! let user = User::local("admin", "org.example");
//! let result = factory.execute(&user, &bundle).await?;
//! assert!(result.entries[0].is_success());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod authorization;
pub mod command;
pub mod config;
pub mod error;
pub mod outcome;
pub mod reference;
pub mod search;
pub mod storage;
pub mod types;
pub mod user;
pub mod validation;

pub use authorization::{AuthorizationDecision, AuthorizationRule, RuleRegistry};
pub use command::CommandFactory;
pub use config::{EngineConfig, SearchHandling};
pub use error::{EngineError, EngineResult};
pub use outcome::{Outcome, OutcomeKind};
pub use storage::{ResourceStore, StoreTransaction};
pub use types::{Bundle, BundleEntry, BundleResult, BundleType, EntryResult, RequestMethod};
pub use user::{User, UserRole};
pub use validation::{NoopValidator, ResourceValidator};

/// The crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
