use std::fmt::Write as _;

use serde_json::Value;

const INDENT: &str = "    ";

/// Render a JSON value as a Python literal with four-space indentation.
///
/// The first line is not indented; nested lines start at `depth + 1` levels
/// so the literal can sit inline after an assignment at `depth`.
#[must_use]
pub fn python_literal(value: &Value, depth: usize) -> String {
    let mut out = String::with_capacity(256);
    write_value(&mut out, value, depth);
    out
}

fn write_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_string(out: &mut String, text: &str) {
    // JSON string escapes are valid Python string escapes.
    match serde_json::to_string(text) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str("\"\""),
    }
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(number) => {
            let _ = write!(out, "{number}");
        }
        Value::String(text) => write_string(out, text),
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Array(items) => {
            out.push_str("[\n");
            for (index, item) in items.iter().enumerate() {
                write_indent(out, depth + 1);
                write_value(out, item, depth + 1);
                if index + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            write_indent(out, depth);
            out.push(']');
        }
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Object(map) => {
            out.push_str("{\n");
            for (index, (key, item)) in map.iter().enumerate() {
                write_indent(out, depth + 1);
                write_string(out, key);
                out.push_str(": ");
                write_value(out, item, depth + 1);
                if index + 1 < map.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            write_indent(out, depth);
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_python_keywords_and_indentation() {
        let value = json!({"a": [1, true, null], "b": {}, "c": "x\"y"});
        let expected = "{\n    \"a\": [\n        1,\n        True,\n        None\n    ],\n    \"b\": {},\n    \"c\": \"x\\\"y\"\n}";
        assert_eq!(python_literal(&value, 0), expected);
    }

    #[test]
    fn test_nested_depth_offsets_every_line() {
        let rendered = python_literal(&json!({"k": false}), 1);
        assert_eq!(rendered, "{\n        \"k\": False\n    }");
    }
}
