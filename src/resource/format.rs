//! Result Formatting
//!
//! Compact human-readable rendering of executor payloads, and the
//! related-resource hints attached to `get` responses.

use super::registry::{HintSource, ResourceDef};
use serde_json::{Map, Value};

/// Render a payload using the resource's compact fields
pub fn format_compact(def: &ResourceDef, payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            if items.is_empty() {
                return format!("No {} found.", def.display_name.to_lowercase());
            }
            let mut out = format!("{} ({}):\n", def.display_name, items.len());
            for item in items {
                out.push_str(&format!("• {}\n", summary_line(def, item)));
            }
            out
        }
        Value::Object(_) => {
            let mut out = format!("{}\n", title(def, payload));
            for (label, path) in def.compact.fields {
                out.push_str(&format!("  {}: {}\n", label, extract_json_value(payload, path)));
            }
            out
        }
        other => other.to_string(),
    }
}

fn title(def: &ResourceDef, item: &Value) -> String {
    let id = extract_json_value(item, "id");
    if def.compact.title_field.is_empty() {
        return format!("#{}", id);
    }
    format!("{} (#{})", extract_json_value(item, def.compact.title_field), id)
}

/// One line per list item: title plus the first two compact fields
fn summary_line(def: &ResourceDef, item: &Value) -> String {
    let extras: Vec<String> = def
        .compact
        .fields
        .iter()
        .take(2)
        .map(|(label, path)| format!("{}: {}", label, extract_json_value(item, path)))
        .collect();
    if extras.is_empty() {
        title(def, item)
    } else {
        format!("{} - {}", title(def, item), extras.join(", "))
    }
}

/// Related-resource suggestions for a `get` result
pub fn format_hints(def: &ResourceDef, args: &Map<String, Value>, item: &Value) -> Option<String> {
    if def.related.is_empty() || !item.is_object() {
        return None;
    }

    let lines: Vec<String> = def
        .related
        .iter()
        .filter_map(|related| {
            let mut call = Map::new();
            call.insert("resource".to_string(), Value::String(related.resource.to_string()));
            call.insert("action".to_string(), Value::String(related.action.to_string()));
            for (field, source) in related.args {
                let value = match source {
                    HintSource::Item(path) => item.get(*path),
                    HintSource::Args(key) => args.get(*key),
                }?;
                call.insert(field.to_string(), value.clone());
            }
            Some(format!("  {}", Value::Object(call)))
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(format!("Related:\n{}", lines.join("\n")))
    }
}

/// Extract a value from JSON using a dot-notation path
pub fn extract_json_value(item: &Value, path: &str) -> String {
    let mut current = item;

    for part in path.split('.') {
        // Handle array index
        let next = if let Ok(idx) = part.parse::<usize>() {
            current.get(idx)
        } else {
            current.get(part)
        };
        current = match next {
            Some(v) => v,
            None => return "-".to_string(),
        };
    }

    match current {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => if *b { "yes" } else { "no" }.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(_) => "[object]".to_string(),
    }
}
