// Query filtering on indexed record fields

use crate::record::IndexValue;
use std::collections::HashMap;

/// Filter for querying records
#[derive(Debug, Clone)]
pub struct Filter {
    /// Field name to filter on
    pub field: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Bound to compare against
    pub value: IndexValue,
}

/// Comparison operators for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Gte, // >=
    Lte, // <=
}

impl Filter {
    pub fn new(field: &str, op: FilterOp, value: IndexValue) -> Self {
        Self {
            field: field.to_string(),
            op,
            value,
        }
    }

    /// Inclusive integer range on a single field, as a pair of filters
    pub fn int_between(field: &str, min: i64, max: i64) -> Vec<Filter> {
        vec![
            Filter::new(field, FilterOp::Gte, IndexValue::Int(min)),
            Filter::new(field, FilterOp::Lte, IndexValue::Int(max)),
        ]
    }

    /// Evaluate against a record's indexed fields.
    ///
    /// A missing field never matches, the same way a SQL comparison against
    /// NULL never matches.
    pub fn matches(&self, fields: &HashMap<String, IndexValue>) -> bool {
        let Some(IndexValue::Int(actual)) = fields.get(&self.field) else {
            return false;
        };
        let IndexValue::Int(bound) = self.value;

        match self.op {
            FilterOp::Gte => *actual >= bound,
            FilterOp::Lte => *actual <= bound,
        }
    }
}

impl FilterOp {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
        }
    }
}
