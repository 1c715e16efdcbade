//! Engine configuration.

use url::Url;

/// How unsupported search parameters are treated.
///
/// Conditional references and conditional operations always use
/// [`SearchHandling::Strict`] regardless of this setting; a write must not
/// silently match against a weaker query than the client asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchHandling {
    /// Reject the request if any supplied parameter has no definition.
    #[default]
    Strict,
    /// Ignore unknown parameters; they are still reported to the caller.
    Lenient,
}

/// Static configuration for the bundle execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Absolute base URL of this server, used to classify literal
    /// references as internal or external and to build result URLs.
    pub base_url: Url,
    /// Page size applied when a search does not specify `_count`.
    pub default_page_size: u32,
    /// Upper bound on `_count`.
    pub max_page_size: u32,
    /// Handling of unsupported parameters for client-facing search.
    pub search_handling: SearchHandling,
}

impl EngineConfig {
    /// Creates a configuration with defaults for everything but the base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            default_page_size: 20,
            max_page_size: 1000,
            search_handling: SearchHandling::Strict,
        }
    }

    /// Sets the search handling mode.
    pub fn with_search_handling(mut self, handling: SearchHandling) -> Self {
        self.search_handling = handling;
        self
    }

    /// Sets the default page size.
    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size;
        self
    }

    /// Returns the base URL with a guaranteed trailing slash, so joins
    /// against it keep the full path.
    pub fn base_with_slash(&self) -> Url {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base
    }
}
