//! Request URL construction for collection queries
//!
//! The builder keeps the pending sort order and page in mutable state that
//! `build` consumes: after every build the pending values are reset, so the
//! caller sets them again before each request.

use crate::query::{Page, QueryError, QueryOrder, Target};
use url::Url;

/// Default Galaxy v1 API root
pub const DEFAULT_API_BASE_URL: &str = "https://galaxy.ansible.com/api/v1/";

/// Translates (target, order, page) into request URLs
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base_url: Url,
    deprecated: bool,
    default_page_size: u32,
    pending_order: Option<(QueryOrder, bool)>,
    pending_page: Option<Page>,
}

impl QueryBuilder {
    /// Creates a builder rooted at `base_url`
    ///
    /// A missing trailing slash is added so relative joins stay under the
    /// API root.
    pub fn new(base_url: &str, deprecated: bool, default_page_size: u32) -> Result<Self, QueryError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        if base_url.cannot_be_a_base() {
            return Err(QueryError::InvalidBaseUrl(base_url.to_string()));
        }

        Ok(Self {
            base_url,
            deprecated,
            default_page_size: default_page_size.max(1),
            pending_order: None,
            pending_page: None,
        })
    }

    /// Sets the sort order for the next build
    pub fn order_by(&mut self, order: QueryOrder, ascending: bool) -> &mut Self {
        self.pending_order = Some((order, ascending));
        self
    }

    /// Sets the page for the next build
    pub fn set_page(&mut self, page: Page) -> &mut Self {
        self.pending_page = Some(page);
        self
    }

    /// Builds the collection URL for `target` and resets pending state
    pub fn build(&mut self, target: Target) -> Result<Url, QueryError> {
        let mut url = self.base_url.join(target.path())?;
        let order = self.pending_order.take();
        let page = self.pending_page.take();

        {
            let mut pairs = url.query_pairs_mut();
            if let Some((order, ascending)) = order {
                pairs.append_pair("order_by", &order.to_query_value(target, ascending));
            }
            match page {
                Some(page) => {
                    pairs.append_pair("page", &page.number.to_string());
                    pairs.append_pair("page_size", &page.size.to_string());
                }
                None => {
                    pairs.append_pair("page_size", &self.default_page_size.to_string());
                }
            }
            pairs.append_pair("deprecated", if self.deprecated { "true" } else { "false" });
        }

        Ok(url)
    }

    /// Resolves a path relative to the API root
    pub fn join(&self, relative_path: &str) -> Result<Url, QueryError> {
        Ok(self.base_url.join(relative_path)?)
    }

    /// URL of a single role's detail document
    pub fn role_url(&self, role_id: i64) -> Result<Url, QueryError> {
        self.join(&format!("{}{}/", Target::Roles.path(), role_id))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> QueryBuilder {
        QueryBuilder::new("https://galaxy.example.com/api/v1", false, 100).unwrap()
    }

    #[test]
    fn test_build_with_order_and_page() {
        let mut builder = builder();
        let url = builder
            .order_by(QueryOrder::Download, false)
            .set_page(Page { number: 3, size: 10 })
            .build(Target::Roles)
            .unwrap();

        assert_eq!(url.path(), "/api/v1/roles/");
        assert_eq!(
            url.query(),
            Some("order_by=-repository__download_count&page=3&page_size=10&deprecated=false")
        );
    }

    #[test]
    fn test_build_resets_pending_state() {
        let mut builder = builder();
        let first = builder
            .order_by(QueryOrder::Name, true)
            .set_page(Page { number: 2, size: 100 })
            .build(Target::Tags)
            .unwrap();
        let second = builder.build(Target::Tags).unwrap();
        let third = builder.build(Target::Tags).unwrap();

        assert!(first.query().unwrap().contains("order_by=name"));
        assert_eq!(second.query(), Some("page_size=100&deprecated=false"));
        assert_eq!(second, third);
    }

    #[test]
    fn test_provider_namespaces_path() {
        let mut builder = builder();
        let url = builder.build(Target::ProviderNamespaces).unwrap();
        assert_eq!(url.path(), "/api/v1/provider_namespaces/");
    }

    #[test]
    fn test_join_relative_path() {
        let builder = builder();
        let url = builder.join("roles/?page=2").unwrap();
        assert_eq!(url.as_str(), "https://galaxy.example.com/api/v1/roles/?page=2");
        assert_eq!(
            builder.role_url(42).unwrap().as_str(),
            "https://galaxy.example.com/api/v1/roles/42/"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(QueryBuilder::new("not a url", false, 100).is_err());
        assert!(QueryBuilder::new("mailto:someone@example.com", false, 100).is_err());
    }
}
