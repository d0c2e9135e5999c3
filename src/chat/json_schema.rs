//! GBNF grammar generation, JSON recovery, and schema validation
//! (spec.md §4.4 "structured output").
//!
//! No teacher file does any of this — `src/web/chat/sampler.rs` builds
//! sampler chains but never a grammar from a schema — so this module is
//! hand-rolled from spec.md's description of the three operations, kept in
//! the teacher's general style (small focused functions, `Result` returns,
//! no unwraps outside tests).

use serde_json::Value;

use crate::error::{ConfigError, RuntimeError};

/// Compiles a JSON Schema (a restricted but common subset: `object`,
/// `array`, `string`, `number`, `integer`, `boolean`, `enum`, `required`,
/// `properties`, `items`) into a GBNF grammar string rooted at `root-rule`.
pub fn schema_to_gbnf(schema: &Value) -> Result<String, RuntimeError> {
    let mut rules = Vec::new();
    let root = gbnf_for_value(schema, "root", &mut rules)?;
    let mut out = format!("root ::= {root}\n");
    for (name, body) in rules {
        out.push_str(&format!("{name} ::= {body}\n"));
    }
    Ok(out)
}

fn gbnf_for_value(schema: &Value, rule_prefix: &str, rules: &mut Vec<(String, String)>) -> Result<String, RuntimeError> {
    let ty = schema.get("type").and_then(|v| v.as_str()).unwrap_or("object");

    if let Some(values) = schema.get("enum").and_then(|v| v.as_array()) {
        let alts: Vec<String> = values.iter().map(gbnf_literal).collect();
        return Ok(format!("({})", alts.join(" | ")));
    }

    match ty {
        "object" => {
            let properties = schema
                .get("properties")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default();
            let required: Vec<&str> = schema
                .get("required")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default();

            let mut required_fields = Vec::new();
            let mut optional_fields = Vec::new();
            for (key, value_schema) in properties.iter() {
                let sub_rule = format!("{rule_prefix}-{key}");
                let body = gbnf_for_value(value_schema, &sub_rule, rules)?;
                rules.push((sub_rule.clone(), body));
                let field_rule = format!("\"\\\"{key}\\\":\" {sub_rule}");
                if required.contains(&key.as_str()) {
                    required_fields.push(field_rule);
                } else {
                    optional_fields.push(field_rule);
                }
            }

            if required_fields.is_empty() && optional_fields.is_empty() {
                return Ok("\"{}\"".to_string());
            }
            if required_fields.is_empty() {
                // No required fields: the whole optional chain is itself
                // optional, so an empty object is still accepted.
                return Ok(format!("\"{{\" {} \"}}\"", optional_chain(&optional_fields, false)));
            }
            let core = required_fields.join(" \",\" ");
            if optional_fields.is_empty() {
                Ok(format!("\"{{\" {core} \"}}\""))
            } else {
                Ok(format!("\"{{\" {core} {} \"}}\"", optional_chain(&optional_fields, true)))
            }
        }
        "array" => {
            let items_schema = schema.get("items").cloned().unwrap_or(serde_json::json!({"type": "string"}));
            let item_rule = format!("{rule_prefix}-item");
            let body = gbnf_for_value(&items_schema, &item_rule, rules)?;
            rules.push((item_rule.clone(), body));
            Ok(format!("\"[\" ({item_rule} (\",\" {item_rule})*)? \"]\""))
        }
        "string" => Ok("\"\\\"\" [^\"]* \"\\\"\"".to_string()),
        "number" => Ok("\"-\"? [0-9]+ (\".\" [0-9]+)?".to_string()),
        "integer" => Ok("\"-\"? [0-9]+".to_string()),
        "boolean" => Ok("(\"true\" | \"false\")".to_string()),
        other => Err(ConfigError::InvalidSchema(format!("unsupported schema type: {other}")).into()),
    }
}

/// Builds a trailing chain of optional object fields: including `fields[i]`
/// requires including `fields[0..i]` first, so the grammar only accepts a
/// present-prefix of the optional tail rather than arbitrary subsets
/// (spec.md §4.4 "optional properties still emittable"). `leading_comma`
/// controls whether the first field in the chain needs a preceding `,`
/// (false when the object has no required fields ahead of it).
fn optional_chain(fields: &[String], leading_comma: bool) -> String {
    let Some((first, rest)) = fields.split_first() else {
        return String::new();
    };
    let inner = optional_chain(rest, true);
    let prefix = if leading_comma { "\",\" " } else { "" };
    if inner.is_empty() {
        format!("({prefix}{first})?")
    } else {
        format!("({prefix}{first} {inner})?")
    }
}

fn gbnf_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"\\\"{s}\\\"\""),
        other => format!("\"{other}\""),
    }
}

/// Attempts to parse `text` as JSON directly; on failure, falls back to
/// extracting the first top-level `{...}` or `[...]` span (models often wrap
/// valid JSON in prose or markdown code fences), closing any still-open
/// string and brackets if generation was cut off mid-structure (spec.md §7:
/// "JSON parse failure after grammar-constrained generation -> attempt JSON
/// recovery before surfacing").
pub fn recover_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    let trimmed = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    find_balanced_span(trimmed).and_then(|span| serde_json::from_str(&span).ok())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        return rest.trim().trim_end_matches("```").trim();
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        return rest.trim().trim_end_matches("```").trim();
    }
    trimmed
}

/// Scans from the first `{`/`[` tracking a bracket stack and in-string
/// state. If the input closes cleanly, returns the balanced span verbatim.
/// If it runs out before every bracket closes (a truncated generation),
/// closes the dangling string (if any) and appends closers for whatever is
/// still open on the stack, in the right order, instead of giving up.
fn find_balanced_span(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = text.find(['{', '['])?;
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(byte),
            b'}' => {
                if stack.pop()? != b'{' {
                    return None;
                }
                if stack.is_empty() {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            b']' => {
                if stack.pop()? != b'[' {
                    return None;
                }
                if stack.is_empty() {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() {
        return None;
    }
    let mut recovered = text[start..].to_string();
    if in_string {
        recovered.push('"');
    }
    while let Some(open) = stack.pop() {
        recovered.push(if open == b'{' { '}' } else { ']' });
    }
    Some(recovered)
}

/// Validates `value` against a JSON-Schema subset (`type`, `required`,
/// `properties`, `items`, `enum`). In `strict` mode, object properties not
/// listed in `properties` are rejected; in non-strict mode extra keys are
/// ignored (spec.md §4.4 "strict-mode extra-key rejection").
pub fn validate(value: &Value, schema: &Value, strict: bool) -> Result<(), RuntimeError> {
    validate_at(value, schema, strict, "$")
}

fn validate_at(value: &Value, schema: &Value, strict: bool, path: &str) -> Result<(), RuntimeError> {
    if let Some(values) = schema.get("enum").and_then(|v| v.as_array()) {
        if !values.contains(value) {
            return Err(schema_error(path, "value is not one of the allowed enum values"));
        }
        return Ok(());
    }

    let ty = schema.get("type").and_then(|v| v.as_str()).unwrap_or("object");
    match (ty, value) {
        ("object", Value::Object(map)) => {
            let properties = schema.get("properties").and_then(|v| v.as_object()).cloned().unwrap_or_default();
            let required: Vec<&str> = schema
                .get("required")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default();

            for key in &required {
                if !map.contains_key(*key) {
                    return Err(schema_error(path, &format!("missing required property \"{key}\"")));
                }
            }
            for (key, child) in map.iter() {
                match properties.get(key) {
                    Some(child_schema) => validate_at(child, child_schema, strict, &format!("{path}.{key}"))?,
                    None if strict => {
                        return Err(schema_error(path, &format!("unexpected property \"{key}\" in strict mode")));
                    }
                    None => {}
                }
            }
            Ok(())
        }
        ("array", Value::Array(items)) => {
            if let Some(items_schema) = schema.get("items") {
                for (index, item) in items.iter().enumerate() {
                    validate_at(item, items_schema, strict, &format!("{path}[{index}]"))?;
                }
            }
            Ok(())
        }
        ("string", Value::String(_)) => Ok(()),
        ("number", Value::Number(_)) => Ok(()),
        ("integer", Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(()),
        ("boolean", Value::Bool(_)) => Ok(()),
        (expected, actual) => Err(schema_error(path, &format!("expected {expected}, got {actual}"))),
    }
}

fn schema_error(path: &str, message: &str) -> RuntimeError {
    crate::error::GenerationError::SchemaValidationFailed(format!("{path}: {message}")).into()
}
