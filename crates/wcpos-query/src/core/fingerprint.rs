//! Deterministic cache keys for query descriptions
//!
//! The fingerprint is `<collection>:<canonical json>` where the JSON has
//! sorted keys at every level, absent filters and blank search dropped, and
//! arrays kept in their original order.

use serde_json::{Map, Value as Json};
use wcpos_api::{FilterValue, Pagination, QueryDescription, QueryParams, Value};

pub fn fingerprint(collection_name: &str, params: &QueryParams) -> String {
    format!("{}:{}", collection_name, canonical_params(params))
}

pub fn description_fingerprint(description: &QueryDescription) -> String {
    fingerprint(&description.collection_name, &description.params)
}

fn canonical_params(params: &QueryParams) -> Json {
    let mut entries = Vec::new();

    if let Some(search) = params.normalized_search() {
        entries.push(("search".to_string(), Json::String(search.to_string())));
    }

    let filters: Vec<(String, Json)> = params
        .active_filters()
        .map(|(field, filter)| (field.clone(), canonical_filter(filter)))
        .collect();
    if !filters.is_empty() {
        entries.push(("filters".to_string(), object(filters)));
    }

    if let Some(sort) = &params.sort {
        entries.push((
            "sort".to_string(),
            object(vec![
                ("field".to_string(), Json::String(sort.field.clone())),
                (
                    "direction".to_string(),
                    Json::String(sort.direction.as_str().to_string()),
                ),
            ]),
        ));
    }

    if let Pagination::Infinite { page_size } = params.pagination {
        entries.push((
            "pagination".to_string(),
            object(vec![("page_size".to_string(), Json::from(page_size))]),
        ));
    }

    object(entries)
}

fn canonical_filter(filter: &FilterValue) -> Json {
    match filter {
        FilterValue::Absent => Json::Null,
        FilterValue::Eq(v) => object(vec![("eq".to_string(), canonical_value(v))]),
        FilterValue::In(values) => object(vec![(
            "in".to_string(),
            Json::Array(values.iter().map(canonical_value).collect()),
        )]),
        FilterValue::Range { min, max } => {
            let mut bounds = Vec::new();
            if let Some(min) = min.as_ref().filter(|v| !v.is_null()) {
                bounds.push(("min".to_string(), canonical_value(min)));
            }
            if let Some(max) = max.as_ref().filter(|v| !v.is_null()) {
                bounds.push(("max".to_string(), canonical_value(max)));
            }
            object(vec![("range".to_string(), object(bounds))])
        }
    }
}

fn canonical_value(value: &Value) -> Json {
    match value {
        // 1.0 and 1 select the same documents
        Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Json::from(*f as i64),
        Value::Array(items) => Json::Array(items.iter().map(canonical_value).collect()),
        Value::Object(map) => object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical_value(v)))
                .collect(),
        ),
        other => Json::from(other.clone()),
    }
}

/// Build a JSON object inserting keys in sorted order, so the output is
/// canonical whether or not serde_json preserves insertion order.
fn object(mut entries: Vec<(String, Json)>) -> Json {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut map = Map::new();
    for (k, v) in entries {
        map.insert(k, v);
    }
    Json::Object(map)
}
