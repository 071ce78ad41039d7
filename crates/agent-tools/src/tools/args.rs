//! Lenient argument coercion. Models send `code` as a string, a list of
//! lines, a byte array or a wrapper object; all of them mean the same text.

use agent_core::tools::ToolError;
use serde_json::Value;

const TEXT_KEYS: &[&str] = &["code", "text", "content", "value"];

pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect();
            match bytes {
                Some(bytes) if !bytes.is_empty() => {
                    Some(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Some(
                    items
                        .iter()
                        .filter_map(|item| text(Some(item)))
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
            }
        }
        Value::Object(map) => TEXT_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| Some(Value::Object(map.clone()).to_string())),
        other => Some(other.to_string()),
    }
}

pub fn required_text(args: &Value, key: &str) -> Result<String, ToolError> {
    text(args.get(key))
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{key}' parameter")))
}

pub fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `args` as a JSON array, or a single shell-quoted string.
pub fn string_list(value: Option<&Value>) -> Result<Vec<String>, ToolError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()),
        Some(Value::String(s)) => split_words(s).map_err(ToolError::InvalidArguments),
        Some(other) => Ok(vec![other.to_string()]),
    }
}

pub fn u64_or(value: Option<&Value>, default: u64) -> Result<u64, ToolError> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| ToolError::InvalidArguments(format!("invalid number: {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| ToolError::InvalidArguments(format!("invalid number: '{s}'"))),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "expected a number, got {other}"
        ))),
    }
}

/// Split on whitespace, honoring single quotes, double quotes and backslash
/// escapes the way a POSIX shell would.
pub fn split_words(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated single quote".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err("unterminated double quote".to_string()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(ch) = chars.next() {
                    current.push(ch);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_accepts_common_shapes() {
        assert_eq!(text(Some(&json!("print(1)"))).unwrap(), "print(1)");
        assert_eq!(text(Some(&json!(["a = 1", "print(a)"]))).unwrap(), "a = 1\nprint(a)");
        assert_eq!(text(Some(&json!([104, 105]))).unwrap(), "hi");
        assert_eq!(text(Some(&json!({"code": "x"}))).unwrap(), "x");
        assert_eq!(text(Some(&json!({"other": 1}))).unwrap(), r#"{"other":1}"#);
        assert_eq!(text(Some(&Value::Null)), None);
        assert_eq!(text(None), None);
    }

    #[test]
    fn string_list_splits_quoted_strings() {
        let args = string_list(Some(&json!("--name 'hello world' \"a\\\"b\" c\\ d"))).unwrap();
        assert_eq!(args, vec!["--name", "hello world", "a\"b", "c d"]);

        let args = string_list(Some(&json!(["x", 1]))).unwrap();
        assert_eq!(args, vec!["x", "1"]);

        assert!(string_list(Some(&json!("'open"))).is_err());
        assert!(string_list(None).unwrap().is_empty());
    }

    #[test]
    fn numbers_from_strings_and_floats() {
        assert_eq!(u64_or(Some(&json!("15")), 20).unwrap(), 15);
        assert_eq!(u64_or(Some(&json!(3.0)), 20).unwrap(), 3);
        assert_eq!(u64_or(None, 20).unwrap(), 20);
        assert!(u64_or(Some(&json!("soon")), 20).is_err());
    }
}
