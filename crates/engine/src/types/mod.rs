//! Core data types: stored resources, bundles, and read-access tags.

mod bundle;
mod resource;
mod tags;

pub use bundle::{
    Bundle, BundleEntry, BundleResult, BundleType, EntryResult, RequestMethod,
};
pub use resource::{Identity, StoredResource};
pub(crate) use resource::parse_if_match;
pub use tags::{ReadAccess, TagError, ORGANIZATION_EXTENSION_URL, READ_ACCESS_TAG_SYSTEM};
