//! Record filters
//!
//! Filters are stateless boolean predicates over `(target, record)`. They
//! compose into an expression tree with `&`, `|` and `!`, and the same tree
//! is evaluated against every record of a crawl.
//!
//! # Example
//!
//! ```
//! use galaxy_crawler::filter::Filter;
//! use galaxy_crawler::query::Target;
//! use serde_json::json;
//!
//! let popular = Filter::by_expr("download>500").unwrap();
//! let starred = Filter::by_expr("star>10").unwrap();
//! let filter = popular & !starred;
//!
//! let record = json!({"id": 1, "download_count": 900, "stargazers_count": 3});
//! assert!(filter.passed(Target::Roles, record.as_object().unwrap()));
//! ```

mod chain;
mod expr;
mod predicates;

pub use chain::FilterChain;
pub use expr::{parse_expr, FilterField, FilterOp};
pub use predicates::{AnsibleVersionFilter, CountFilter};

use crate::query::Target;
use crate::record::Record;
use std::ops::{BitAnd, BitOr};
use thiserror::Error;

/// Errors raised while building filters from expressions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("Invalid expression `{0}`")]
    InvalidExpression(String),

    #[error("Filter type '{0}' is not supported")]
    UnsupportedField(String),
}

/// A filter expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Constant outcome; `Always(true)` is the default pass-through filter
    Always(bool),
    Count(CountFilter),
    AnsibleVersion(AnsibleVersionFilter),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Filter that accepts every record
    pub fn allow() -> Self {
        Self::Always(true)
    }

    /// Filter that rejects every record
    pub fn deny() -> Self {
        Self::Always(false)
    }

    /// Builds a filter from a `<field><op><threshold>` expression
    pub fn by_expr(expr: &str) -> Result<Self, FilterError> {
        let (field, op, threshold) = parse_expr(expr)?;
        let filter = match field {
            FilterField::Ansible => Self::AnsibleVersion(AnsibleVersionFilter::new(threshold)),
            count => Self::Count(CountFilter::new(count, threshold)),
        };
        Ok(match op {
            FilterOp::Greater => filter,
            FilterOp::Less => !filter,
        })
    }

    /// Evaluates the filter against one record
    pub fn passed(&self, target: Target, record: &Record) -> bool {
        match self {
            Self::Always(outcome) => *outcome,
            Self::Count(f) => f.passed(target, record),
            Self::AnsibleVersion(f) => f.passed(target, record),
            Self::And(a, b) => a.passed(target, record) && b.passed(target, record),
            Self::Or(a, b) => a.passed(target, record) || b.passed(target, record),
            Self::Not(f) => !f.passed(target, record),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::allow()
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        Filter::And(Box::new(self), Box::new(rhs))
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        Filter::Or(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }
}
