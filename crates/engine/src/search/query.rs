//! Bound search queries.

use chrono::{DateTime, NaiveDate, Utc};
use url::Url;

use crate::config::{EngineConfig, SearchHandling};
use crate::error::SearchError;
use crate::search::params::{parameters_for, ParamDef, SearchPrefix};
use crate::types::StoredResource;

/// Parameter names recognized but excluded from unsupported-parameter
/// reporting: pagination and result shaping.
const IGNORED_PARAMETERS: &[&str] = &["page", "_count", "_format", "_pretty"];

/// A date comparison against resource metadata.
#[derive(Debug, Clone, Copy)]
pub struct DateFilter {
    /// The comparison prefix.
    pub prefix: SearchPrefix,
    /// The instant compared against.
    pub instant: DateTime<Utc>,
}

impl DateFilter {
    fn parse(raw: &str) -> Option<Self> {
        let (prefix, value) = SearchPrefix::extract(raw);
        let instant = DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
            })?;
        Some(Self { prefix, instant })
    }

    fn test(&self, candidate: DateTime<Utc>) -> bool {
        match self.prefix {
            SearchPrefix::Eq => candidate == self.instant,
            SearchPrefix::Ne => candidate != self.instant,
            SearchPrefix::Gt => candidate > self.instant,
            SearchPrefix::Lt => candidate < self.instant,
            SearchPrefix::Ge => candidate >= self.instant,
            SearchPrefix::Le => candidate <= self.instant,
        }
    }
}

#[derive(Debug)]
struct BoundParameter {
    def: &'static ParamDef,
    values: Vec<String>,
}

/// A validated search query against one resource type.
///
/// Doubles as the storage-level predicate: the persistence collaborator
/// evaluates candidates with [`SearchQuery::matches`].
#[derive(Debug)]
pub struct SearchQuery {
    resource_type: String,
    bound: Vec<BoundParameter>,
    id_values: Vec<String>,
    last_updated: Vec<DateFilter>,
    unsupported: Vec<String>,
    page: u32,
    count: u32,
    raw: Vec<(String, String)>,
}

impl SearchQuery {
    /// Binds raw name/value pairs to the parameter catalog of
    /// `resource_type`, using the configured unsupported-parameter handling.
    pub fn configure(
        resource_type: &str,
        params: Vec<(String, String)>,
        config: &EngineConfig,
    ) -> Result<Self, SearchError> {
        Self::bind(resource_type, params, config, config.search_handling)
    }

    /// Binds with [`SearchHandling::Strict`] regardless of configuration.
    ///
    /// Conditional references and conditional operations must never match
    /// against a weaker query than the client supplied. They are membership
    /// tests rather than searches, so any supplied `page` is discarded and
    /// the match is always taken from the first page.
    pub fn configure_strict(
        resource_type: &str,
        params: Vec<(String, String)>,
        config: &EngineConfig,
    ) -> Result<Self, SearchError> {
        let mut query = Self::bind(resource_type, params, config, SearchHandling::Strict)?;
        query.page = 1;
        Ok(query)
    }

    fn bind(
        resource_type: &str,
        params: Vec<(String, String)>,
        config: &EngineConfig,
        handling: SearchHandling,
    ) -> Result<Self, SearchError> {
        let catalog =
            parameters_for(resource_type).ok_or_else(|| SearchError::UnsupportedResourceType {
                resource_type: resource_type.to_string(),
            })?;

        let mut query = Self {
            resource_type: resource_type.to_string(),
            bound: Vec::new(),
            id_values: Vec::new(),
            last_updated: Vec::new(),
            unsupported: Vec::new(),
            page: 1,
            count: config.default_page_size,
            raw: params.clone(),
        };

        for (name, value) in params {
            match name.as_str() {
                "page" => {
                    query.page = value.parse().unwrap_or(1).max(1);
                }
                "_count" => {
                    let count: u32 = value.parse().unwrap_or(config.default_page_size);
                    query.count = count.min(config.max_page_size).max(1);
                }
                "_format" | "_pretty" => {}
                "_id" => query.id_values.push(value),
                "_lastUpdated" => {
                    let filter =
                        DateFilter::parse(&value).ok_or_else(|| SearchError::InvalidValue {
                            parameter: "_lastUpdated".to_string(),
                            value: value.clone(),
                        })?;
                    query.last_updated.push(filter);
                }
                _ => match catalog.iter().find(|d| d.name == name) {
                    Some(def) => match query.bound.iter_mut().find(|b| b.def.name == name) {
                        Some(bound) => bound.values.push(value),
                        None => query.bound.push(BoundParameter {
                            def,
                            values: vec![value],
                        }),
                    },
                    None => {
                        if !query.unsupported.contains(&name) {
                            query.unsupported.push(name);
                        }
                    }
                },
            }
        }

        if handling == SearchHandling::Strict && !query.unsupported.is_empty() {
            return Err(SearchError::UnsupportedParameters {
                resource_type: query.resource_type,
                parameters: query.unsupported,
            });
        }

        Ok(query)
    }

    /// Builds a single-parameter query directly from the catalog, used by
    /// the uniqueness checks of the authorization rules.
    pub(crate) fn for_parameter(resource_type: &str, name: &str, value: &str) -> Option<Self> {
        let catalog = parameters_for(resource_type)?;
        let def = catalog.iter().find(|d| d.name == name)?;
        Some(Self {
            resource_type: resource_type.to_string(),
            bound: vec![BoundParameter {
                def,
                values: vec![value.to_string()],
            }],
            id_values: Vec::new(),
            last_updated: Vec::new(),
            unsupported: Vec::new(),
            page: 1,
            count: 2,
            raw: vec![(name.to_string(), value.to_string())],
        })
    }

    /// The resource type being searched.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Supplied parameter names with no definition. Empty in strict mode
    /// (binding would have failed).
    pub fn unsupported_parameters(&self) -> &[String] {
        &self.unsupported
    }

    /// The 1-based page number.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// The page size.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Number of matches to skip before this page. Computed in `usize`
    /// so a huge client-supplied `page` cannot overflow.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.count as usize
    }

    /// Tests one candidate against every bound parameter. Soft-deleted
    /// resources never match.
    pub fn matches(&self, resource: &StoredResource) -> bool {
        if resource.is_deleted() || resource.resource_type() != self.resource_type {
            return false;
        }
        if !self.id_values.is_empty() && !self.id_values.iter().any(|id| id == resource.id()) {
            return false;
        }
        if !self
            .last_updated
            .iter()
            .all(|f| f.test(resource.last_modified()))
        {
            return false;
        }
        self.bound
            .iter()
            .all(|b| b.values.iter().any(|v| b.def.matches(resource.content(), v)))
    }

    /// Builds the self link for this query under `base`.
    pub fn self_link(&self, base: &Url) -> Url {
        self.link_with_page(base, self.page)
    }

    /// Builds the next-page link, if `total` matches extend past this page.
    pub fn next_link(&self, base: &Url, total: usize) -> Option<Url> {
        if (self.page as usize) * (self.count as usize) < total {
            Some(self.link_with_page(base, self.page + 1))
        } else {
            None
        }
    }

    /// Builds the previous-page link, if this is not the first page.
    pub fn prev_link(&self, base: &Url) -> Option<Url> {
        if self.page > 1 {
            Some(self.link_with_page(base, self.page - 1))
        } else {
            None
        }
    }

    fn link_with_page(&self, base: &Url, page: u32) -> Url {
        // Joining against a base without a trailing slash would replace
        // its last path segment rather than append to it.
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let mut url = base
            .join(&self.resource_type)
            .unwrap_or_else(|_| base.clone());
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.raw {
                if name == "page" || name == "_count" {
                    continue;
                }
                pairs.append_pair(name, value);
            }
            pairs.append_pair("page", &page.to_string());
            pairs.append_pair("_count", &self.count.to_string());
        }
        url
    }
}

/// One page of matches plus the overall match count.
#[derive(Debug)]
pub struct SearchPage {
    /// The matches of the requested page.
    pub resources: Vec<StoredResource>,
    /// Overall match count across all pages, needed to distinguish
    /// "exactly one" from "many" for conditional operations.
    pub total: usize,
}

impl SearchPage {
    /// Returns the single match, if the overall count is exactly one.
    pub fn single(&self) -> Option<&StoredResource> {
        if self.total == 1 {
            self.resources.first()
        } else {
            None
        }
    }
}

/// Splits a raw query string into decoded name/value pairs.
pub fn parse_query_string(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> EngineConfig {
        EngineConfig::new(Url::parse("https://fhir.example.org/fhir").unwrap())
    }

    fn organization(id: &str, name: &str) -> StoredResource {
        StoredResource::new(
            "Organization",
            id,
            json!({
                "resourceType": "Organization",
                "name": name,
                "identifier": [{"system": "http://example.org/sid", "value": id}]
            }),
        )
    }

    #[test]
    fn test_configure_and_match() {
        let query = SearchQuery::configure(
            "Organization",
            vec![("name".to_string(), "univ".to_string())],
            &config(),
        )
        .unwrap();

        assert!(query.matches(&organization("org-1", "University Hospital")));
        assert!(!query.matches(&organization("org-2", "Clinic")));
    }

    #[test]
    fn test_deleted_never_matches() {
        let query = SearchQuery::configure("Organization", vec![], &config()).unwrap();
        let deleted = organization("org-1", "University Hospital").mark_deleted();
        assert!(!query.matches(&deleted));
    }

    #[test]
    fn test_unsupported_strict_vs_lenient() {
        let params = vec![("flavor".to_string(), "blue".to_string())];
        let err = SearchQuery::configure("Organization", params.clone(), &config()).unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedParameters { .. }));

        let lenient = config().with_search_handling(SearchHandling::Lenient);
        let query = SearchQuery::configure("Organization", params, &lenient).unwrap();
        assert_eq!(query.unsupported_parameters(), ["flavor".to_string()]);
    }

    #[test]
    fn test_pagination_params_not_unsupported() {
        let query = SearchQuery::configure(
            "Organization",
            vec![
                ("page".to_string(), "2".to_string()),
                ("_count".to_string(), "5".to_string()),
                ("_format".to_string(), "json".to_string()),
            ],
            &config(),
        )
        .unwrap();

        assert!(query.unsupported_parameters().is_empty());
        assert_eq!(query.page(), 2);
        assert_eq!(query.count(), 5);
        assert_eq!(query.offset(), 5);
    }

    #[test]
    fn test_offset_with_huge_page_does_not_overflow() {
        let query = SearchQuery::configure(
            "Organization",
            vec![
                ("page".to_string(), u32::MAX.to_string()),
                ("_count".to_string(), "1000".to_string()),
            ],
            &config(),
        )
        .unwrap();

        assert_eq!(query.page(), u32::MAX);
        assert_eq!(query.count(), 1000);
        assert_eq!(query.offset(), (u32::MAX as usize - 1) * 1000);
    }

    #[test]
    fn test_id_and_last_updated() {
        let query = SearchQuery::configure(
            "Organization",
            vec![
                ("_id".to_string(), "org-1".to_string()),
                ("_lastUpdated".to_string(), "le2900-01-01".to_string()),
            ],
            &config(),
        )
        .unwrap();

        assert!(query.matches(&organization("org-1", "x")));
        assert!(!query.matches(&organization("org-2", "x")));
    }

    #[test]
    fn test_invalid_last_updated() {
        let err = SearchQuery::configure(
            "Organization",
            vec![("_lastUpdated".to_string(), "gtnotadate".to_string())],
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_resource_type() {
        let err = SearchQuery::configure("Patient", vec![], &config()).unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedResourceType { .. }));
    }

    #[test]
    fn test_links() {
        let query = SearchQuery::configure(
            "Organization",
            vec![
                ("name".to_string(), "univ".to_string()),
                ("_count".to_string(), "10".to_string()),
            ],
            &config(),
        )
        .unwrap();
        let base = Url::parse("https://fhir.example.org/fhir/").unwrap();

        let self_link = query.self_link(&base);
        assert!(self_link.as_str().contains("Organization?"));
        assert!(self_link.as_str().contains("name=univ"));
        assert!(self_link.as_str().contains("page=1"));

        assert!(query.prev_link(&base).is_none());
        let next = query.next_link(&base, 25).unwrap();
        assert!(next.as_str().contains("page=2"));
        assert!(query.next_link(&base, 10).is_none());
    }

    #[test]
    fn test_links_with_unslashed_base() {
        let query = SearchQuery::configure("Organization", vec![], &config()).unwrap();
        let base = Url::parse("https://fhir.example.org/fhir").unwrap();

        let self_link = query.self_link(&base);
        assert!(
            self_link
                .as_str()
                .starts_with("https://fhir.example.org/fhir/Organization?")
        );
    }

    #[test]
    fn test_parse_query_string() {
        let pairs = parse_query_string("identifier=http%3A%2F%2Fexample.org%7Cx&name=a");
        assert_eq!(
            pairs,
            vec![
                ("identifier".to_string(), "http://example.org|x".to_string()),
                ("name".to_string(), "a".to_string()),
            ]
        );
    }

    #[test]
    fn test_search_page_single() {
        let page = SearchPage {
            resources: vec![organization("org-1", "x")],
            total: 1,
        };
        assert!(page.single().is_some());

        let many = SearchPage {
            resources: vec![organization("org-1", "x")],
            total: 2,
        };
        assert!(many.single().is_none());
    }
}
