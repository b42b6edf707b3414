//! Password masking over a log record's field tree.
//!
//! Every value under a key named `password` is replaced with [`MASK`], at any
//! depth. String values that are themselves serialized JSON (captured request
//! and response bodies) are parsed, masked and re-serialized; text that does
//! not parse falls back to a pattern scan.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use serde_json::{Map, Value};

pub const MASK: &str = "*****";

const SENSITIVE_KEY: &str = "password";

/// A `"password": <value>` pair where the value is a string (possibly cut
/// off at the end of the text) or a bare token such as a number.
static PASSWORD_PLAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""password"\s*:\s*(?:"(?:[^"\\]|\\.)*(?:"|$)|[^\s,}\]"]+)"#)
        .expect("valid password regex")
});

/// The same field after one extra round of JSON string escaping.
static PASSWORD_ESCAPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\"password\\"\s*:\s*(?:\\"(?:[^"\\]|\\[^"])*(?:\\"|$)|[^\s,}\]"\\]+)"#)
        .expect("valid escaped password regex")
});

/// Mask every password in `fields`. Returns whether anything changed.
pub fn redact_fields(fields: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    for (key, value) in fields.iter_mut() {
        if key == SENSITIVE_KEY {
            if !value.is_null() && value.as_str() != Some(MASK) {
                *value = Value::String(MASK.to_owned());
                changed = true;
            }
        } else {
            changed |= redact_value(value);
        }
    }
    changed
}

/// Mask every password in `value`. Returns whether anything changed.
pub fn redact_value(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => redact_fields(map),
        Value::Array(items) => items.iter_mut().fold(false, |acc, v| redact_value(v) | acc),
        Value::String(text) => match redact_text(text) {
            Some(masked) => {
                *text = masked;
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// Mask passwords inside a piece of text, returning `None` if untouched.
///
/// Anything that looks like a JSON document is parsed and walked, so keys
/// spelled with escapes (`"pass\u0077ord"`) are matched after decoding.
pub fn redact_text(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(mut embedded) = serde_json::from_str::<Value>(text) {
            return if redact_value(&mut embedded) {
                Some(embedded.to_string())
            } else {
                None
            };
        }
    }

    if !text.contains(SENSITIVE_KEY) {
        return None;
    }

    let plain = PASSWORD_PLAIN.replace_all(text, NoExpand(r#""password":"*****""#));
    let masked = PASSWORD_ESCAPED.replace_all(&plain, NoExpand(r#"\"password\":\"*****\""#));
    if masked == text {
        None
    } else {
        Some(masked.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn top_level_password_is_masked() {
        let mut f = fields(json!({"email": "d@jwt.com", "password": "diner"}));
        assert!(redact_fields(&mut f));
        assert_eq!(f["password"], MASK);
        assert_eq!(f["email"], "d@jwt.com");
    }

    #[test]
    fn password_inside_embedded_json_body_is_masked() {
        let mut f = fields(json!({"reqBody": r#"{"password":"secret123"}"#, "statusCode": 200}));
        assert!(redact_fields(&mut f));
        let line = Value::Object(f).to_string();
        assert!(!line.contains("secret123"));

        let body: Value = serde_json::from_str(line_field(&line, "reqBody").as_str()).unwrap();
        assert_eq!(body["password"], MASK);
    }

    fn line_field(line: &str, key: &str) -> String {
        let v: Value = serde_json::from_str(line).unwrap();
        v[key].as_str().unwrap().to_owned()
    }

    #[test]
    fn doubly_embedded_password_is_masked() {
        let inner = json!({"password": "secret123", "name": "x"}).to_string();
        let middle = json!({"user": inner}).to_string();
        let mut f = fields(json!({"resBody": middle}));
        assert!(redact_fields(&mut f));
        assert!(!Value::Object(f).to_string().contains("secret123"));
    }

    #[test]
    fn nested_objects_and_arrays_are_walked() {
        let mut v = json!({"users": [{"password": "a"}, {"profile": {"password": 1234}}]});
        assert!(redact_value(&mut v));
        assert_eq!(v["users"][0]["password"], MASK);
        assert_eq!(v["users"][1]["profile"]["password"], MASK);
    }

    #[test]
    fn truncated_body_falls_back_to_pattern() {
        let text = r#"{"email":"a@b.c","password": "hunter2","na"#;
        let masked = redact_text(text).unwrap();
        assert!(!masked.contains("hunter2"));
        assert!(masked.contains(r#""password":"*****""#));
    }

    #[test]
    fn escaped_key_spelling_is_masked_after_decoding() {
        let mut v = json!({"reqBody": r#"{"pass\u0077ord":"secret123"}"#});
        assert!(redact_value(&mut v));
        let line = v.to_string();
        assert!(!line.contains("secret123"));

        let body: Value = serde_json::from_str(line_field(&line, "reqBody").as_str()).unwrap();
        assert_eq!(body["password"], MASK);
    }

    #[test]
    fn truncated_body_with_bare_value_is_masked() {
        let text = r#"{"email":"a@b.c","password": 12345,"na"#;
        let masked = redact_text(text).unwrap();
        assert!(!masked.contains("12345"));
        assert_eq!(masked, r#"{"email":"a@b.c","password":"*****","na"#);
    }

    #[test]
    fn password_cut_off_mid_value_is_masked() {
        let masked = redact_text(r#"{"email":"a@b.c","password":"hunt"#).unwrap();
        assert_eq!(masked, r#"{"email":"a@b.c","password":"*****""#);
        assert_eq!(redact_text(&masked), None);
    }

    #[test]
    fn escaped_pattern_inside_plain_text_is_masked() {
        let text = r#"prefix {\"password\":\"hunter2\"} suffix"#;
        let masked = redact_text(text).unwrap();
        assert!(!masked.contains("hunter2"));
        assert_eq!(masked, r#"prefix {\"password\":\"*****\"} suffix"#);
    }

    #[test]
    fn redaction_is_idempotent() {
        let mut f = fields(json!({"reqBody": r#"{"password":"secret123"}"#, "password": "x"}));
        redact_fields(&mut f);
        let once = f.clone();
        assert!(!redact_fields(&mut f));
        assert_eq!(f, once);
    }

    #[test]
    fn records_without_passwords_are_untouched() {
        let original = json!({"reqBody": r#"{ "email" : "a@b.c" }"#, "ip": "unknown"});
        let mut f = fields(original.clone());
        assert!(!redact_fields(&mut f));
        assert_eq!(Value::Object(f), original);
    }
}
