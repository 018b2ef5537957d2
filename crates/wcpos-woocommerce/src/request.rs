//! Mapping between page requests and WooCommerce REST query strings.
//!
//! Cursors are page numbers: the first page is `1` and the cursor handed
//! back after page `n` is `n + 1`.

use wcpos_api::{ApiError, Checkpoint, Document, FilterValue, Value};
use wcpos_query::{Page, PageRequest};

/// Page number a request should fetch.
pub fn page_number(cursor: &Checkpoint) -> Result<u32, ApiError> {
    match cursor.cursor() {
        None => Ok(1),
        Some(raw) => match raw.parse::<u32>() {
            Ok(page) if page >= 1 => Ok(page),
            _ => Err(ApiError::InvalidOperation {
                message: format!("'{}' is not a WooCommerce page cursor", raw),
            }),
        },
    }
}

/// Query-string pairs for one page request.
pub fn build_query_pairs(request: &PageRequest) -> Result<Vec<(String, String)>, ApiError> {
    let mut pairs = vec![
        ("page".to_string(), page_number(&request.cursor)?.to_string()),
        ("per_page".to_string(), request.page_size.to_string()),
    ];

    if let Some(search) = request.params.normalized_search() {
        pairs.push(("search".to_string(), search.to_string()));
    }

    if let Some(sort) = &request.params.sort {
        pairs.push(("orderby".to_string(), orderby_param(&sort.field).to_string()));
        pairs.push(("order".to_string(), sort.direction.as_str().to_string()));
    }

    for (field, filter) in request.params.active_filters() {
        match filter {
            FilterValue::Eq(value) => pairs.push((field.clone(), param_value(value))),
            FilterValue::In(values) => {
                let joined = values.iter().map(param_value).collect::<Vec<_>>().join(",");
                pairs.push((field.clone(), joined));
            }
            FilterValue::Range { min, max } => {
                if let Some(min) = min.as_ref().filter(|v| !v.is_null()) {
                    pairs.push((format!("min_{}", field), param_value(min)));
                }
                if let Some(max) = max.as_ref().filter(|v| !v.is_null()) {
                    pairs.push((format!("max_{}", field), param_value(max)));
                }
            }
            FilterValue::Absent => {}
        }
    }

    Ok(pairs)
}

/// WooCommerce sorts products by `title` rather than `name`.
fn orderby_param(field: &str) -> &str {
    match field {
        "name" => "title",
        other => other,
    }
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_json_string(),
    }
}

/// Decode a list response body into a page.
///
/// `total_pages` comes from the `X-WP-TotalPages` header. Without it, a full
/// page is taken to mean more may follow.
pub fn parse_page(
    body: &str,
    page: u32,
    per_page: usize,
    total_pages: Option<u32>,
) -> Result<Page, ApiError> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ApiError::network(format!("Failed to parse response: {}", e)))?;
    let serde_json::Value::Array(rows) = json else {
        return Err(ApiError::network("Expected a JSON array of documents"));
    };

    let items: Vec<Document> = rows
        .into_iter()
        .filter_map(|row| match Value::from_json_value(row) {
            Value::Object(fields) => Some(fields),
            _ => None,
        })
        .collect();

    let has_more = match total_pages {
        Some(total) => page < total,
        None => per_page > 0 && items.len() == per_page,
    };

    Ok(Page {
        next_cursor: has_more.then(|| (page + 1).to_string()),
        items,
    })
}
