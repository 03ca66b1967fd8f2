// Nested JSON -> flat (path, leaf) pairs.
//
// Object keys and array indices become path segments joined by `.`.
// `null` leaves and empty containers produce nothing.

use serde_json::Value;

pub const SEPARATOR: char = '.';

/// Flatten `value` into `(path, leaf)` pairs, in key order.
pub fn flatten(value: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    walk(String::new(), value, &mut out);
    out
}

fn walk<'a>(path: String, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk(join(&path, key), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk(join(&path, &index.to_string()), child, out);
            }
        }
        Value::Null => {}
        leaf => {
            if !path.is_empty() {
                out.push((path, leaf));
            }
        }
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_owned()
    } else {
        format!("{prefix}{SEPARATOR}{segment}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn paths(value: &Value) -> Vec<(String, Value)> {
        flatten(value)
            .into_iter()
            .map(|(path, leaf)| (path, leaf.clone()))
            .collect()
    }

    #[test]
    fn nested_objects_and_arrays() {
        let value = json!({"a": {"b": [1, 2]}, "c": "x"});
        assert_eq!(
            paths(&value),
            vec![
                ("a.b.0".to_owned(), json!(1)),
                ("a.b.1".to_owned(), json!(2)),
                ("c".to_owned(), json!("x")),
            ]
        );
    }

    #[test]
    fn nulls_and_empty_containers_are_skipped() {
        let value = json!({"a": null, "b": {}, "c": [], "d": [null, true]});
        assert_eq!(paths(&value), vec![("d.1".to_owned(), json!(true))]);
    }

    #[test]
    fn top_level_scalar_has_no_path() {
        assert!(flatten(&json!(42)).is_empty());
    }

    #[test]
    fn arrays_of_objects() {
        let value = json!({"rows": [{"len": 3}, {"len": 4}]});
        assert_eq!(
            paths(&value),
            vec![
                ("rows.0.len".to_owned(), json!(3)),
                ("rows.1.len".to_owned(), json!(4)),
            ]
        );
    }
}
