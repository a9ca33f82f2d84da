//! crates/conversation_package_core/src/normalize.rs
//!
//! Turns the raw JSON returned by the generation model into a structurally valid
//! `GeneratedPackage`.
//!
//! Absent or `null` optional fields are defaulted. A field that is present with
//! the wrong JSON type, a missing or empty conversation list, or a non-object
//! entry fails the whole package with `PortError::SchemaValidation`. Nothing
//! partially typed leaves this module.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::domain::{Conversation, GeneratedPackage, Notes, Target};
use crate::ports::{PortError, PortResult};

/// Every conversation carries at least this many targets after normalization.
pub const MIN_TARGETS_PER_CONVERSATION: usize = 3;

const DEFAULT_PACKAGE_NAME: &str = "Learning package";
const DEFAULT_CATEGORY: &str = "language";

/// Parses model output text (optionally wrapped in a Markdown code fence) and normalizes it.
pub fn parse_generated_package(text: &str, language: &str) -> PortResult<GeneratedPackage> {
    let body = strip_code_fence(text);
    let raw: Value = serde_json::from_str(body).map_err(|e| {
        PortError::SchemaValidation(format!("generation response is not valid JSON: {e}"))
    })?;
    normalize_generated_package(&raw, language)
}

/// Validates and normalizes an already-parsed generation response.
pub fn normalize_generated_package(raw: &Value, language: &str) -> PortResult<GeneratedPackage> {
    let root = raw.as_object().ok_or_else(|| {
        PortError::SchemaValidation(format!(
            "generated package must be an object, found {}",
            kind(raw)
        ))
    })?;

    let name = optional_string(root, "name", "package")?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_PACKAGE_NAME.to_string());
    let description = optional_string(root, "description", "package")?.unwrap_or_default();
    let category = optional_string(root, "category", "package")?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let tags = parse_tags(root, language)?;
    let notes = parse_notes(root)?;

    let entries = match root.get("conversations") {
        None | Some(Value::Null) => {
            return Err(PortError::SchemaValidation(
                "package.conversations is required".to_string(),
            ))
        }
        Some(Value::Array(entries)) => entries,
        Some(other) => return Err(type_error("package", "conversations", "an array", other)),
    };
    if entries.is_empty() {
        return Err(PortError::SchemaValidation(
            "package.conversations must not be empty".to_string(),
        ));
    }

    let conversations = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_conversation(index, entry, language))
        .collect::<PortResult<Vec<_>>>()?;

    Ok(GeneratedPackage {
        name,
        description,
        category,
        tags,
        conversations,
        notes,
    })
}

fn parse_conversation(index: usize, entry: &Value, language: &str) -> PortResult<Conversation> {
    let path = format!("conversations[{index}]");
    let obj = entry.as_object().ok_or_else(|| {
        PortError::SchemaValidation(format!("{path} must be an object, found {}", kind(entry)))
    })?;

    let number = index + 1;
    let name = optional_string(obj, "name", &path)?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("Conversation {number}"));
    let description = optional_string(obj, "description", &path)?.unwrap_or_default();
    let instruction = optional_string(obj, "instruction", &path)?.unwrap_or_default();

    let raw_targets: &[Value] = match obj.get("targets") {
        None | Some(Value::Null) => &[],
        Some(Value::Array(items)) => items.as_slice(),
        Some(other) => return Err(type_error(&path, "targets", "an array", other)),
    };

    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(raw_targets.len().max(MIN_TARGETS_PER_CONVERSATION));
    for (target_index, raw) in raw_targets.iter().enumerate() {
        let target_path = format!("{path}.targets[{target_index}]");
        let mut target = parse_target(&target_path, raw)?;
        if target.key.is_empty() {
            target.key = format!("c{number}-t{}", target_index + 1);
        }
        target.key = unique_key(&mut seen, target.key);
        targets.push(target);
    }

    let mut placeholder = 1;
    while targets.len() < MIN_TARGETS_PER_CONVERSATION {
        let key = format!("c{number}-review-{placeholder}");
        placeholder += 1;
        if !seen.insert(key.clone()) {
            continue;
        }
        targets.push(Target {
            key,
            description: format!("Speak {language} during \"{name}\""),
            check: format!(
                "Did the user respond in {language} at least once during the conversation?"
            ),
            amount: None,
        });
    }

    Ok(Conversation {
        name,
        description,
        instruction,
        targets,
    })
}

fn parse_target(path: &str, raw: &Value) -> PortResult<Target> {
    let obj = raw.as_object().ok_or_else(|| {
        PortError::SchemaValidation(format!("{path} must be an object, found {}", kind(raw)))
    })?;

    let amount = match obj.get("amount") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(whole_amount(n).ok_or_else(|| {
            PortError::SchemaValidation(format!(
                "{path}.amount must be a non-negative integer, found {n}"
            ))
        })?),
        Some(other) => return Err(type_error(path, "amount", "a number", other)),
    };

    Ok(Target {
        key: optional_string(obj, "key", path)?.unwrap_or_default(),
        description: optional_string(obj, "description", path)?.unwrap_or_default(),
        check: optional_string(obj, "check", path)?.unwrap_or_default(),
        amount,
    })
}

/// A non-negative whole number that fits a repetition count.
pub fn whole_amount(n: &serde_json::Number) -> Option<u32> {
    if let Some(whole) = n.as_u64() {
        return u32::try_from(whole).ok();
    }
    let float = n.as_f64()?;
    if float >= 0.0 && float.fract() == 0.0 && float <= f64::from(u32::MAX) {
        Some(float as u32)
    } else {
        None
    }
}

fn unique_key(seen: &mut HashSet<String>, key: String) -> String {
    if seen.insert(key.clone()) {
        return key;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{key}-{suffix}");
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

fn parse_tags(root: &Map<String, Value>, language: &str) -> PortResult<Vec<String>> {
    let items = match root.get("tags") {
        None | Some(Value::Null) => return Ok(default_tags(language)),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(type_error("package", "tags", "an array", other)),
    };

    let mut tags = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::String(tag) if !tag.trim().is_empty() => tags.push(tag.trim().to_string()),
            Value::String(_) => {}
            other => {
                return Err(type_error(
                    "package",
                    &format!("tags[{index}]"),
                    "a string",
                    other,
                ))
            }
        }
    }
    if tags.is_empty() {
        return Ok(default_tags(language));
    }
    Ok(tags)
}

fn default_tags(language: &str) -> Vec<String> {
    vec![language.to_string(), "speaking".to_string()]
}

fn parse_notes(root: &Map<String, Value>) -> PortResult<Notes> {
    match root.get("notes") {
        None | Some(Value::Null) => Ok(Notes::default()),
        Some(Value::Object(obj)) => Ok(Notes {
            title: optional_string(obj, "title", "package.notes")?.unwrap_or_default(),
            details: optional_string(obj, "details", "package.notes")?.unwrap_or_default(),
            content: optional_string(obj, "content", "package.notes")?.unwrap_or_default(),
        }),
        Some(other) => Err(type_error("package", "notes", "an object", other)),
    }
}

fn optional_string(obj: &Map<String, Value>, field: &str, path: &str) -> PortResult<Option<String>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.trim().to_string())),
        Some(other) => Err(type_error(path, field, "a string", other)),
    }
}

fn type_error(path: &str, field: &str, expected: &str, found: &Value) -> PortError {
    PortError::SchemaValidation(format!(
        "{path}.{field} must be {expected}, found {}",
        kind(found)
    ))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string on the opening fence ("```json").
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
