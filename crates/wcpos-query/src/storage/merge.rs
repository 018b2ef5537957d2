use wcpos_api::Document;

/// Field-scoped merge of an incoming document into the stored one.
///
/// Incoming fields overwrite stored fields and stored fields the incoming
/// document does not mention are kept. Fields listed in `preserve` keep their
/// stored value when one exists.
pub fn merge_document(
    existing: Option<&Document>,
    incoming: Document,
    preserve: &[String],
) -> Document {
    let Some(existing) = existing else {
        return incoming;
    };

    let mut merged = existing.clone();
    for (field, value) in incoming {
        if preserve.contains(&field) && existing.contains_key(&field) {
            continue;
        }
        merged.insert(field, value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use wcpos_api::{document, Value};

    #[test]
    fn test_new_document_is_taken_as_is() {
        let incoming = document([("id", Value::Integer(1)), ("_pending", Value::Boolean(true))]);
        let merged = merge_document(None, incoming.clone(), &["_pending".to_string()]);
        assert_eq!(merged, incoming);
    }

    #[test]
    fn test_remote_fields_overwrite_but_local_fields_survive() {
        let stored = document([
            ("id", Value::Integer(1)),
            ("name", Value::from("Old")),
            ("_pending", Value::Boolean(true)),
            ("note", Value::from("kept")),
        ]);
        let incoming = document([
            ("id", Value::Integer(1)),
            ("name", Value::from("New")),
            ("_pending", Value::Boolean(false)),
        ]);

        let merged = merge_document(Some(&stored), incoming, &["_pending".to_string()]);
        assert_eq!(merged["name"], Value::from("New"));
        assert_eq!(merged["_pending"], Value::Boolean(true));
        assert_eq!(merged["note"], Value::from("kept"));
    }

    #[test]
    fn test_preserved_field_missing_locally_is_filled() {
        let stored = document([("id", Value::Integer(1))]);
        let incoming = document([("id", Value::Integer(1)), ("_pending", Value::Boolean(false))]);
        let merged = merge_document(Some(&stored), incoming, &["_pending".to_string()]);
        assert_eq!(merged["_pending"], Value::Boolean(false));
    }
}
