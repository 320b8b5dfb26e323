//! Detection of lossy numbers in checkpoint documents.

use serde_json::Value as Json;

/// Returns the JSON path of the first float-valued number, if any.
///
/// Exact quantities are stored as decimal strings, so any float in a
/// checkpoint was either hand-edited or produced by a reader that rounded a
/// large integer through `f64`. Integers too large for `u64` also parse as
/// floats and are caught here.
#[must_use]
pub fn find_lossy_number(value: &Json) -> Option<String> {
    let mut path = String::from("$");
    scan(value, &mut path)
}

fn scan(value: &Json, path: &mut String) -> Option<String> {
    match value {
        Json::Number(n) if n.is_f64() => Some(path.clone()),
        Json::Array(items) => items.iter().enumerate().find_map(|(i, item)| {
            let len = path.len();
            path.push_str(&format!("[{i}]"));
            let found = scan(item, path);
            path.truncate(len);
            found
        }),
        Json::Object(map) => map.iter().find_map(|(key, item)| {
            let len = path.len();
            path.push('.');
            path.push_str(key);
            let found = scan(item, path);
            path.truncate(len);
            found
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integers_and_strings_pass() {
        let doc = json!({"a": 1, "b": "10000000000000000000000", "c": [1, 2, {"d": -3}]});
        assert_eq!(find_lossy_number(&doc), None);
    }

    #[test]
    fn test_float_reported_with_path() {
        let doc = json!({"tokens": {"gt": {"quantity": 4.5e16}}});
        assert_eq!(find_lossy_number(&doc).as_deref(), Some("$.tokens.gt.quantity"));
    }

    #[test]
    fn test_float_in_array_reported_with_index() {
        let doc = json!({"batches": [{"n": 1}, {"n": 2.0}]});
        assert_eq!(find_lossy_number(&doc).as_deref(), Some("$.batches[1].n"));
    }

    #[test]
    fn test_oversized_integer_literal_is_lossy() {
        let doc: Json = serde_json::from_str(r#"{"q": 100000000000000000000000}"#).unwrap();
        assert_eq!(find_lossy_number(&doc).as_deref(), Some("$.q"));
    }
}
