use crate::filter::{Filter, FilterError};
use crate::query::Target;
use crate::record::Record;

/// The configured filters, combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    /// Builds a chain from expressions such as `download>500`
    ///
    /// An empty list yields a chain that passes every record.
    pub fn from_exprs<S: AsRef<str>>(exprs: &[S]) -> Result<Self, FilterError> {
        let filters = exprs
            .iter()
            .map(|e| Filter::by_expr(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    pub fn passed(&self, target: Target, record: &Record) -> bool {
        self.filters.iter().all(|f| f.passed(target, record))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
