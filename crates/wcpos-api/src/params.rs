//! Declarative query parameters
//!
//! A query is described by a collection name plus a closed parameter struct:
//! free-text search, per-field filters, an optional sort and a pagination
//! mode. The struct is deliberately closed so the selector compiler can
//! handle every case explicitly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortParam {
    pub field: String,
    pub direction: SortDirection,
}

impl SortParam {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Condition on a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    /// No constraint. Kept so callers can clear a filter through a patch.
    Absent,
    /// Field equals the value (or, for array fields, contains it)
    Eq(Value),
    /// Field equals any of the values
    In(Vec<Value>),
    /// Field lies within the inclusive bounds
    Range {
        min: Option<Value>,
        max: Option<Value>,
    },
}

impl FilterValue {
    pub fn eq(value: impl Into<Value>) -> Self {
        FilterValue::Eq(value.into())
    }

    /// Whether the filter constrains nothing.
    ///
    /// `Absent`, `Eq(Null)`, an empty `In` and an unbounded `Range` are all
    /// treated the same way: the filter is dropped rather than compiled.
    pub fn is_absent(&self) -> bool {
        match self {
            FilterValue::Absent => true,
            FilterValue::Eq(v) => v.is_null(),
            FilterValue::In(values) => values.is_empty(),
            FilterValue::Range { min, max } => {
                min.as_ref().map_or(true, Value::is_null) && max.as_ref().map_or(true, Value::is_null)
            }
        }
    }
}

/// How a query pages through the remote source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pagination {
    /// `sync` keeps fetching pages until the remote reports no more
    #[default]
    Full,
    /// `sync` fetches a single page; `load_more` fetches the next one
    Infinite { page_size: usize },
}

impl Pagination {
    /// Page size for `Infinite`, never less than one.
    pub fn page_size(&self) -> Option<usize> {
        match self {
            Pagination::Full => None,
            Pagination::Infinite { page_size } => Some((*page_size).max(1)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub search: Option<String>,
    pub filters: BTreeMap<String, FilterValue>,
    pub sort: Option<SortParam>,
    pub pagination: Pagination,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.filters.insert(field.into(), value);
        self
    }

    pub fn with_sort(mut self, sort: SortParam) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// Trimmed search text, or `None` when blank.
    pub fn normalized_search(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Filters that actually constrain something, in key order.
    pub fn active_filters(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.filters.iter().filter(|(_, v)| !v.is_absent())
    }

    /// Merge a partial update into these params.
    pub fn apply(&mut self, patch: ParamsPatch) {
        if let Some(search) = patch.search {
            self.search = search;
        }
        if patch.clear_filters {
            self.filters.clear();
        }
        for (field, value) in patch.filters {
            if value.is_absent() {
                self.filters.remove(&field);
            } else {
                self.filters.insert(field, value);
            }
        }
        if let Some(sort) = patch.sort {
            self.sort = sort;
        }
        if let Some(pagination) = patch.pagination {
            self.pagination = pagination;
        }
    }
}

/// Partial update for [`QueryParams`]. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamsPatch {
    pub search: Option<Option<String>>,
    pub filters: Vec<(String, FilterValue)>,
    pub clear_filters: bool,
    pub sort: Option<Option<SortParam>>,
    pub pagination: Option<Pagination>,
}

impl ParamsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(Some(text.into()));
        self
    }

    pub fn clear_search(mut self) -> Self {
        self.search = Some(None);
        self
    }

    /// Set a filter; passing an absent value removes it.
    pub fn filter(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    pub fn clear_filters(mut self) -> Self {
        self.clear_filters = true;
        self
    }

    pub fn sort(mut self, sort: SortParam) -> Self {
        self.sort = Some(Some(sort));
        self
    }

    pub fn clear_sort(mut self) -> Self {
        self.sort = Some(None);
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

/// Immutable description of a query: which collection, with which params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescription {
    pub collection_name: String,
    pub params: QueryParams,
}

impl QueryDescription {
    pub fn new(collection_name: impl Into<String>, params: QueryParams) -> Self {
        Self {
            collection_name: collection_name.into(),
            params,
        }
    }
}
