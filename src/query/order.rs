//! Sort keys accepted by the collection endpoints
//!
//! A key resolves to a different query field depending on the target: roles
//! are sorted by their owning repository's counters, repositories by their
//! own, and kinds without counters fall back to `id` so pagination stays
//! stable.

use crate::query::Target;
use crate::ConfigError;
use std::str::FromStr;

/// Sort key for a collection query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOrder {
    Download,
    Star,
    Name,
    Id,
    ContributorName,
    Fork,
    Watcher,
}

impl QueryOrder {
    /// All keys in declaration order
    pub const ALL: [QueryOrder; 7] = [
        QueryOrder::Download,
        QueryOrder::Star,
        QueryOrder::Name,
        QueryOrder::Id,
        QueryOrder::ContributorName,
        QueryOrder::Fork,
        QueryOrder::Watcher,
    ];

    /// External name, as written in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Star => "star",
            Self::Name => "name",
            Self::Id => "id",
            Self::ContributorName => "contributor_name",
            Self::Fork => "fork",
            Self::Watcher => "watcher",
        }
    }

    /// Names of all supported keys
    pub fn choices() -> Vec<&'static str> {
        Self::ALL.iter().map(|o| o.as_str()).collect()
    }

    /// Resolves the query field for the given target
    pub fn by_target(&self, target: Target) -> &'static str {
        match (self, target) {
            (Self::Download, Target::Roles) => "repository__download_count",
            (Self::Star, Target::Roles) => "repository__stargazers_count",
            (Self::Fork, Target::Roles) => "repository__forks_count",
            (Self::Watcher, Target::Roles) => "repository__watchers_count",
            (Self::Download, Target::Repositories) => "download_count",
            (Self::Star, Target::Repositories) => "stargazers_count",
            (Self::Fork, Target::Repositories) => "forks_count",
            (Self::Watcher, Target::Repositories) => "watchers_count",
            (Self::Download | Self::Star | Self::Fork | Self::Watcher, _) => "id",
            (Self::ContributorName, t) if t.has_namespace() => "namespace__name",
            (Self::ContributorName, _) => "name",
            (Self::Name, _) => "name",
            (Self::Id, _) => "id",
        }
    }

    /// Renders the `order_by` value, prefixing `-` for descending order
    pub fn to_query_value(&self, target: Target, ascending: bool) -> String {
        let field = self.by_target(target);
        if ascending {
            field.to_string()
        } else {
            format!("-{}", field)
        }
    }
}

impl FromStr for QueryOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|o| o.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnsupportedOrder(s.to_string()))
    }
}
