//! Lock predicate escaping
//!
//! Predicates are stored as plain data, so `$` and `.` in keys and string
//! values are replaced with `&dollar` and `&dot` on the way in and restored
//! on the way out.
//!
//! Only the first occurrence of each token is replaced per string. Documents
//! written by other producers on the same collection use the same rule, so a
//! string such as `"a.b.c"` is stored as `"a&dotb.c"` and still round-trips.
//! A string that already contains a literal `&dollar`/`&dot` does not.

use serde_json::{Map, Value};

const DOLLAR: &str = "$";
const DOLLAR_TOKEN: &str = "&dollar";
const DOT: &str = ".";
const DOT_TOKEN: &str = "&dot";

pub fn escape_str(s: &str) -> String {
    s.replacen(DOLLAR, DOLLAR_TOKEN, 1).replacen(DOT, DOT_TOKEN, 1)
}

pub fn unescape_str(s: &str) -> String {
    s.replacen(DOLLAR_TOKEN, DOLLAR, 1).replacen(DOT_TOKEN, DOT, 1)
}

/// Escape every string key and value, recursively
pub fn escape(value: &Value) -> Value {
    map_strings(value, &escape_str)
}

/// Reverse of [`escape`]
pub fn unescape(value: &Value) -> Value {
    map_strings(value, &unescape_str)
}

fn map_strings(value: &Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| map_strings(v, f)).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (f(k), map_strings(v, f)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

/// Whether a predicate carries no lock at all
pub fn is_empty_predicate(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        Value::Number(_) => false,
    }
}
