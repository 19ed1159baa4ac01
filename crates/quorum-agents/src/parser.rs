use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ParseError;

/// Keys some providers wrap the real payload in.
pub const WRAPPER_KEYS: [&str; 5] = ["task", "response", "output", "result", "data"];

/// Name and required top-level keys of an expected JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedSchema {
    pub name: &'static str,
    pub required: &'static [&'static str],
}

impl ExpectedSchema {
    pub fn missing_keys(&self, value: &Value) -> Vec<&'static str> {
        match value.as_object() {
            Some(map) => self
                .required
                .iter()
                .copied()
                .filter(|k| !map.contains_key(*k))
                .collect(),
            None => self.required.to_vec(),
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        value.is_object() && self.missing_keys(value).is_empty()
    }
}

/// A model output type that can be parsed from raw text.
pub trait Structured: DeserializeOwned + Serialize + Send + 'static {
    const SCHEMA: ExpectedSchema;
}

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common model response formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the analysis:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if let Some(inner) = strip_code_fence(trimmed) {
        if is_object(inner) {
            return Some(inner.to_string());
        }
    }

    if is_object(trimmed) {
        return Some(trimmed.to_string());
    }

    balanced_objects(trimmed)
        .find(|candidate| is_object(candidate))
        .map(str::to_string)
}

fn is_object(text: &str) -> bool {
    text.starts_with('{') && serde_json::from_str::<Value>(text).is_ok()
}

/// Contents of the first fenced block (```json ... ``` or ``` ... ```).
fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_marker = &text[open + 3..];
    // Skip the language tag up to the end of the line.
    let body_start = after_marker.find('\n')? + 1;
    let body = &after_marker[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Every top-level balanced `{ ... }` span, in order. String and escape aware.
fn balanced_objects(text: &str) -> impl Iterator<Item = &str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' if depth > 0 => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans.into_iter()
}

/// Decode raw model text into a JSON object satisfying `schema`.
///
/// Falls back to unwrapping one level of [`WRAPPER_KEYS`] when the decoded
/// object lacks required keys. Wrapped values may themselves be JSON text.
pub fn parse_value(raw: &str, schema: &ExpectedSchema) -> Result<Value, ParseError> {
    let error = |message: String| ParseError {
        schema: schema.name,
        message,
        raw: raw.to_string(),
    };

    let json = extract_json(raw)
        .ok_or_else(|| error(format!("no JSON object found (length={})", raw.len())))?;
    let value: Value = serde_json::from_str(&json).map_err(|e| error(e.to_string()))?;

    if schema.accepts(&value) {
        return Ok(value);
    }

    for key in WRAPPER_KEYS {
        let Some(inner) = value.get(key) else {
            continue;
        };
        let unwrapped = match inner {
            Value::Object(_) => Some(inner.clone()),
            Value::String(text) => extract_json(text).and_then(|j| serde_json::from_str(&j).ok()),
            _ => None,
        };
        if let Some(candidate) = unwrapped.filter(|v| schema.accepts(v)) {
            return Ok(candidate);
        }
    }

    Err(error(format!(
        "missing required keys {:?}",
        schema.missing_keys(&value)
    )))
}

/// Parse raw model text into a typed output.
pub fn parse_structured<T: Structured>(raw: &str) -> Result<T, ParseError> {
    let value = parse_value(raw, &T::SCHEMA)?;
    serde_json::from_value(value).map_err(|e| ParseError {
        schema: T::SCHEMA.name,
        message: e.to_string(),
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const AB: ExpectedSchema = ExpectedSchema {
        name: "ab",
        required: &["a", "b"],
    };

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ab {
        a: i64,
        b: i64,
    }

    impl Structured for Ab {
        const SCHEMA: ExpectedSchema = AB;
    }

    #[test]
    fn extract_clean_json() {
        let input = r#"{"confidence": 0.75, "reasoning": "test"}"#;
        assert_eq!(extract_json(input).unwrap(), input);
    }

    #[test]
    fn extract_from_markdown() {
        let input = "Here is my analysis:\n```json\n{\"confidence\": 0.75}\n```\nDone.";
        assert_eq!(extract_json(input).unwrap(), r#"{"confidence": 0.75}"#);
    }

    #[test]
    fn extract_from_markdown_no_lang() {
        let input = "Result:\n```\n{\"confidence\": 0.75}\n```";
        assert_eq!(extract_json(input).unwrap(), r#"{"confidence": 0.75}"#);
    }

    #[test]
    fn extract_with_prefix_text() {
        let input = "Based on my analysis, here is the result:\n{\"confidence\": 0.75, \"reasoning\": \"bullish\"}";
        assert!(extract_json(input).unwrap().contains("confidence"));
    }

    #[test]
    fn extract_with_braces_in_strings() {
        let input = r#"note {not json} then {"reasoning": "went from {low} to \"{high}\"", "confidence": 0.5}"#;
        let parsed: Value = serde_json::from_str(&extract_json(input).unwrap()).unwrap();
        assert_eq!(parsed["confidence"], 0.5);
    }

    #[test]
    fn extract_no_json() {
        assert!(extract_json("This is just plain text with no JSON at all.").is_none());
        assert!(extract_json("{ unterminated").is_none());
    }

    #[test]
    fn unwraps_task_wrapper() {
        let value = parse_value(r#"{"task": {"a": 1, "b": 2}}"#, &AB).unwrap();
        assert_eq!(value, serde_json::json!({"a": 1, "b": 2}));
        let typed: Ab = parse_structured(r#"{"task": {"a": 1, "b": 2}}"#).unwrap();
        assert_eq!(typed, Ab { a: 1, b: 2 });
    }

    #[test]
    fn unwraps_stringified_wrapper() {
        let raw = r#"{"response": "```json\n{\"a\": 3, \"b\": 4}\n```"}"#;
        let typed: Ab = parse_structured(raw).unwrap();
        assert_eq!(typed, Ab { a: 3, b: 4 });
    }

    #[test]
    fn only_one_level_is_unwrapped() {
        let err = parse_value(r#"{"data": {"result": {"a": 1, "b": 2}}}"#, &AB).unwrap_err();
        assert!(err.message.contains("missing required keys"));
    }

    #[test]
    fn missing_keys_keep_raw_text() {
        let raw = "Sure! {\"a\": 1}";
        let err = parse_value(raw, &AB).unwrap_err();
        assert_eq!(err.schema, "ab");
        assert_eq!(err.raw, raw);
        assert!(err.message.contains("\"b\""));
    }

    #[test]
    fn parse_is_idempotent() {
        let inputs = [
            "```json\n{\"a\": 1, \"b\": 2}\n```",
            r#"{"output": {"a": 5, "b": -1}}"#,
            "The answer is {\"b\": 9, \"a\": 8} as requested.",
        ];
        for raw in inputs {
            let first: Ab = parse_structured(raw).unwrap();
            let reserialized = serde_json::to_string(&first).unwrap();
            let second: Ab = parse_structured(&reserialized).unwrap();
            assert_eq!(first, second, "input: {raw}");
        }
    }

    #[test]
    fn type_mismatch_is_parse_error() {
        let err = parse_structured::<Ab>(r#"{"a": "one", "b": 2}"#).unwrap_err();
        assert_eq!(err.schema, "ab");
    }
}
