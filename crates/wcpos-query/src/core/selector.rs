//! Selector compiler
//!
//! Turns [`QueryParams`] into a [`Selector`] (a predicate tree the local
//! collection evaluates) and an ordered list of sort keys that always ends with the
//! primary key, so result order is total even with duplicate sort values.

use std::cmp::Ordering;

use wcpos_api::{Document, FilterValue, QueryParams, SortDirection, Value};

use crate::config::CollectionConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Matches every document
    All,
    /// Matches nothing (e.g. a search with no searchable fields configured)
    None,
    Eq(String, Value),
    In(String, Vec<Value>),
    Range {
        field: String,
        min: Option<Value>,
        max: Option<Value>,
    },
    /// Case-insensitive substring match; `needle` is stored lowercased
    Contains { field: String, needle: String },
    And(Vec<Selector>),
    Or(Vec<Selector>),
}

impl Selector {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Selector::All => true,
            Selector::None => false,
            Selector::Eq(field, expected) => doc
                .get(field)
                .is_some_and(|actual| value_matches(actual, expected)),
            Selector::In(field, candidates) => doc.get(field).is_some_and(|actual| {
                candidates
                    .iter()
                    .any(|candidate| value_matches(actual, candidate))
            }),
            Selector::Range { field, min, max } => doc.get(field).is_some_and(|actual| {
                if actual.is_null() {
                    return false;
                }
                let above_min = min
                    .as_ref()
                    .map_or(true, |min| actual.total_cmp(min) != Ordering::Less);
                let below_max = max
                    .as_ref()
                    .map_or(true, |max| actual.total_cmp(max) != Ordering::Greater);
                above_min && below_max
            }),
            Selector::Contains { field, needle } => doc
                .get(field)
                .and_then(Value::search_text)
                .is_some_and(|text| text.to_lowercase().contains(needle.as_str())),
            Selector::And(parts) => parts.iter().all(|p| p.matches(doc)),
            Selector::Or(parts) => parts.iter().any(|p| p.matches(doc)),
        }
    }
}

/// Equality that treats an array field as "contains", like document stores do
/// for multi-valued fields (categories, tags).
fn value_matches(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) if !matches!(expected, Value::Array(_)) => {
            items.iter().any(|item| item.loosely_equals(expected))
        }
        _ => actual.loosely_equals(expected),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub selector: Selector,
    pub sort: Vec<SortField>,
}

pub fn compile(params: &QueryParams, config: &CollectionConfig) -> CompiledQuery {
    let mut clauses = Vec::new();

    if let Some(search) = params.normalized_search() {
        let needle = search.to_lowercase();
        let alternatives: Vec<Selector> = config
            .searchable_fields
            .iter()
            .map(|field| Selector::Contains {
                field: field.clone(),
                needle: needle.clone(),
            })
            .collect();
        clauses.push(match alternatives.len() {
            0 => Selector::None,
            1 => alternatives.into_iter().next().unwrap_or(Selector::None),
            _ => Selector::Or(alternatives),
        });
    }

    for (field, filter) in params.active_filters() {
        let clause = match filter {
            FilterValue::Eq(v) => Selector::Eq(field.clone(), v.clone()),
            FilterValue::In(values) => Selector::In(field.clone(), values.clone()),
            FilterValue::Range { min, max } => Selector::Range {
                field: field.clone(),
                min: min.clone().filter(|v| !v.is_null()),
                max: max.clone().filter(|v| !v.is_null()),
            },
            FilterValue::Absent => continue,
        };
        clauses.push(clause);
    }

    let selector = match clauses.len() {
        0 => Selector::All,
        1 => clauses.into_iter().next().unwrap_or(Selector::All),
        _ => Selector::And(clauses),
    };

    let mut sort = Vec::new();
    if let Some(user_sort) = &params.sort {
        sort.push(SortField {
            field: user_sort.field.clone(),
            direction: user_sort.direction,
        });
    }
    if !sort.iter().any(|s| s.field == config.primary_key) {
        sort.push(SortField {
            field: config.primary_key.clone(),
            direction: SortDirection::Asc,
        });
    }

    CompiledQuery { selector, sort }
}

/// Compare two documents by the sort keys. Missing fields sort as null.
pub fn compare_documents(a: &Document, b: &Document, sort: &[SortField]) -> Ordering {
    for key in sort {
        let left = a.get(&key.field).unwrap_or(&Value::Null);
        let right = b.get(&key.field).unwrap_or(&Value::Null);
        let ord = left.total_cmp(right);
        let ord = match key.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Filter and sort documents the way a collection query does.
pub fn evaluate<'a, I>(documents: I, compiled: &CompiledQuery) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut matched: Vec<Document> = documents
        .into_iter()
        .filter(|doc| compiled.selector.matches(doc))
        .cloned()
        .collect();
    matched.sort_by(|a, b| compare_documents(a, b, &compiled.sort));
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use wcpos_api::{document, SortParam};

    fn products_config() -> CollectionConfig {
        CollectionConfig::new("id").searchable(["name", "sku"])
    }

    fn product(id: i64, name: &str, sku: &str, price: f64, status: &str) -> Document {
        document([
            ("id", Value::Integer(id)),
            ("name", Value::from(name)),
            ("sku", Value::from(sku)),
            ("price", Value::Float(price)),
            ("status", Value::from(status)),
        ])
    }

    fn catalog() -> Vec<Document> {
        vec![
            product(3, "Blue Mug", "MUG-B", 8.0, "publish"),
            product(1, "Red Mug", "MUG-R", 8.0, "publish"),
            product(2, "Teapot", "TEA-1", 25.0, "draft"),
            product(4, "Mug Tree", "TREE", 12.5, "publish"),
        ]
    }

    fn ids(docs: &[Document]) -> Vec<i64> {
        docs.iter().map(|d| d["id"].as_i64().unwrap()).collect()
    }

    #[test]
    fn test_empty_params_match_all_sorted_by_primary_key() {
        let compiled = compile(&QueryParams::new(), &products_config());
        assert_eq!(compiled.selector, Selector::All);
        assert_eq!(
            compiled.sort,
            vec![SortField {
                field: "id".into(),
                direction: SortDirection::Asc
            }]
        );
        assert_eq!(ids(&evaluate(&catalog(), &compiled)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_search_is_case_insensitive_or_over_fields() {
        let compiled = compile(&QueryParams::new().with_search("mug"), &products_config());
        assert!(matches!(compiled.selector, Selector::Or(ref parts) if parts.len() == 2));
        assert_eq!(ids(&evaluate(&catalog(), &compiled)), vec![1, 3, 4]);

        let by_sku = compile(&QueryParams::new().with_search("tea-"), &products_config());
        assert_eq!(ids(&evaluate(&catalog(), &by_sku)), vec![2]);
    }

    #[test]
    fn test_search_without_searchable_fields_matches_nothing() {
        let compiled = compile(&QueryParams::new().with_search("mug"), &CollectionConfig::default());
        assert_eq!(compiled.selector, Selector::None);
        assert!(evaluate(&catalog(), &compiled).is_empty());
    }

    #[test]
    fn test_filters_are_anded_and_absent_ones_omitted() {
        let params = QueryParams::new()
            .with_search("mug")
            .with_filter("status", FilterValue::eq("publish"))
            .with_filter(
                "price",
                FilterValue::Range {
                    min: Some(Value::Integer(10)),
                    max: None,
                },
            )
            .with_filter("category", FilterValue::Absent);
        let compiled = compile(&params, &products_config());
        match &compiled.selector {
            Selector::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
        assert_eq!(ids(&evaluate(&catalog(), &compiled)), vec![4]);
    }

    #[test]
    fn test_in_filter_and_array_fields() {
        let mut docs = catalog();
        docs[0].insert("categories".into(), Value::from(vec![5, 9]));
        docs[1].insert("categories".into(), Value::from(vec![7]));

        let compiled = compile(
            &QueryParams::new().with_filter("categories", FilterValue::eq(9)),
            &products_config(),
        );
        assert_eq!(ids(&evaluate(&docs, &compiled)), vec![3]);

        let compiled = compile(
            &QueryParams::new().with_filter("id", FilterValue::In(vec![2.into(), 4.into()])),
            &products_config(),
        );
        assert_eq!(ids(&evaluate(&docs, &compiled)), vec![2, 4]);
    }

    #[test]
    fn test_tiebreaker_orders_duplicate_sort_values() {
        let params = QueryParams::new().with_sort(SortParam::asc("price"));
        let compiled = compile(&params, &products_config());
        assert_eq!(compiled.sort.len(), 2);
        assert_eq!(compiled.sort[1].field, "id");

        // Blue Mug (3) and Red Mug (1) share price 8.0
        let first = ids(&evaluate(&catalog(), &compiled));
        assert_eq!(first, vec![1, 3, 4, 2]);

        let mut shuffled = catalog();
        shuffled.reverse();
        assert_eq!(ids(&evaluate(&shuffled, &compiled)), first);
    }

    #[test]
    fn test_descending_sort() {
        let params = QueryParams::new().with_sort(SortParam::desc("name"));
        let compiled = compile(&params, &products_config());
        assert_eq!(ids(&evaluate(&catalog(), &compiled)), vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_sort_by_primary_key_is_not_duplicated() {
        let params = QueryParams::new().with_sort(SortParam::desc("id"));
        let compiled = compile(&params, &products_config());
        assert_eq!(compiled.sort.len(), 1);
        assert_eq!(ids(&evaluate(&catalog(), &compiled)), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_missing_fields_do_not_match_and_sort_first() {
        let mut docs = catalog();
        docs.push(document([("id", Value::Integer(9))]));

        let compiled = compile(
            &QueryParams::new().with_filter("status", FilterValue::eq("publish")),
            &products_config(),
        );
        assert!(!ids(&evaluate(&docs, &compiled)).contains(&9));

        let compiled = compile(
            &QueryParams::new().with_sort(SortParam::asc("name")),
            &products_config(),
        );
        assert_eq!(ids(&evaluate(&docs, &compiled))[0], 9);
    }
}
