//! Resource kinds exposed by the Galaxy v1 API
//!
//! Each target is crawled as an independent pagination stream and persisted
//! to its own storage destination.

use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// A crawlable resource collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Roles,
    Repositories,
    Platforms,
    Tags,
    Providers,
    ProviderNamespaces,
    Namespaces,
}

impl Target {
    /// All targets in declaration order
    pub const ALL: [Target; 7] = [
        Target::Roles,
        Target::Repositories,
        Target::Platforms,
        Target::Tags,
        Target::Providers,
        Target::ProviderNamespaces,
        Target::Namespaces,
    ];

    /// Order in which targets can be loaded into the relational store so
    /// that referenced kinds exist before the kinds that reference them.
    pub const LOAD_ORDER: [Target; 7] = [
        Target::Providers,
        Target::Platforms,
        Target::Tags,
        Target::Namespaces,
        Target::ProviderNamespaces,
        Target::Repositories,
        Target::Roles,
    ];

    /// Name used in config files, output directories and table names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roles => "roles",
            Self::Repositories => "repositories",
            Self::Platforms => "platforms",
            Self::Tags => "tags",
            Self::Providers => "providers",
            Self::ProviderNamespaces => "provider_namespaces",
            Self::Namespaces => "namespaces",
        }
    }

    /// Path segment of the collection endpoint, relative to the API base
    pub fn path(&self) -> &'static str {
        match self {
            Self::Roles => "roles/",
            Self::Repositories => "repositories/",
            Self::Platforms => "platforms/",
            Self::Tags => "tags/",
            Self::Providers => "providers/",
            Self::ProviderNamespaces => "provider_namespaces/",
            Self::Namespaces => "namespaces/",
        }
    }

    /// Returns true for kinds whose records carry download/star/fork counts
    pub fn has_counts(&self) -> bool {
        matches!(self, Self::Roles | Self::Repositories)
    }

    /// Returns true for kinds whose records belong to a namespace
    pub fn has_namespace(&self) -> bool {
        matches!(
            self,
            Self::Roles | Self::Repositories | Self::ProviderNamespaces
        )
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Target::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnsupportedTarget(s.to_string()))
    }
}
