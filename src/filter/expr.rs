//! Parser for `<field><op><threshold>` filter expressions

use crate::filter::FilterError;
use std::str::FromStr;

/// Fields a filter expression can test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Download,
    Star,
    Fork,
    Ansible,
}

impl FilterField {
    /// Record key holding the value this field tests
    pub fn record_key(&self) -> &'static str {
        match self {
            Self::Download => "download_count",
            Self::Star => "stargazers_count",
            Self::Fork => "forks_count",
            Self::Ansible => "min_ansible_version",
        }
    }

    pub fn choices() -> [&'static str; 4] {
        ["download", "star", "fork", "ansible"]
    }
}

impl FromStr for FilterField {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(Self::Download),
            "star" => Ok(Self::Star),
            "fork" => Ok(Self::Fork),
            "ansible" => Ok(Self::Ansible),
            other => Err(FilterError::UnsupportedField(other.to_string())),
        }
    }
}

/// Comparison operator of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Greater,
    Less,
}

/// Splits an expression such as `download>500` into its parts
pub fn parse_expr(expr: &str) -> Result<(FilterField, FilterOp, f64), FilterError> {
    let invalid = || FilterError::InvalidExpression(expr.to_string());

    let (idx, op) = expr
        .char_indices()
        .find_map(|(i, c)| match c {
            '>' => Some((i, FilterOp::Greater)),
            '<' => Some((i, FilterOp::Less)),
            _ => None,
        })
        .ok_or_else(invalid)?;

    let field = expr[..idx].trim();
    let threshold = expr[idx + 1..].trim();
    if field.is_empty() || threshold.is_empty() {
        return Err(invalid());
    }

    let field = field.parse::<FilterField>()?;
    let threshold = threshold.parse::<f64>().map_err(|_| invalid())?;
    if !threshold.is_finite() {
        return Err(invalid());
    }

    Ok((field, op, threshold))
}
