//! Lenient parameter readers.
//!
//! Directive arguments come from model output, so numbers may arrive as
//! strings (`limit="3"`) and blank strings count as absent.

use ember_core::error::ToolError;
use serde_json::Value;

pub fn optional_str<'a>(arguments: &'a Value, key: &str) -> Result<Option<&'a str>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then_some(s))
        }
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

pub fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    optional_str(arguments, key)?
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

pub fn optional_u64(arguments: &Value, key: &str) -> Result<Option<u64>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| invalid_number(key, n)),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid_number(key, s)),
        Some(other) => Err(invalid_number(key, other)),
    }
}

pub fn optional_f64(arguments: &Value, key: &str) -> Result<Option<f64>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| invalid_number(key, n)),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid_number(key, s)),
        Some(other) => Err(invalid_number(key, other)),
    }
}

fn invalid_number(key: &str, value: impl std::fmt::Display) -> ToolError {
    ToolError::InvalidArguments(format!("'{key}' must be a number, got {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_and_numbers_are_accepted() {
        let args = json!({"a": 3, "b": "7", "c": 2.0, "d": "0.25", "e": "  "});
        assert_eq!(optional_u64(&args, "a").unwrap(), Some(3));
        assert_eq!(optional_u64(&args, "b").unwrap(), Some(7));
        assert_eq!(optional_u64(&args, "c").unwrap(), Some(2));
        assert_eq!(optional_f64(&args, "d").unwrap(), Some(0.25));
        assert_eq!(optional_str(&args, "e").unwrap(), None);
        assert_eq!(optional_u64(&args, "missing").unwrap(), None);
    }

    #[test]
    fn wrong_types_are_rejected() {
        let args = json!({"n": -1, "s": "ten", "b": true});
        assert!(optional_u64(&args, "n").is_err());
        assert!(optional_u64(&args, "s").is_err());
        assert!(optional_str(&args, "b").is_err());
        assert!(required_str(&args, "missing").is_err());
    }
}
