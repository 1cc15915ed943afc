//! Legacy template-set migrations.
//!
//! Older document shapes are migrated transparently before validation.
//! Each migration is an independent pure transform over the raw JSON value;
//! it either rewrites the document and returns an advisory, or leaves the
//! document untouched. A migration never fails validation on its own.
//!
//! Migrations run in a fixed order so each legacy shape has exactly one
//! owner and its own regression test.

use serde_json::{Map, Value, json};

/// A single migration: rewrites the document in place and returns an
/// advisory message when it applied.
pub type Migration = fn(&mut Value) -> Option<String>;

/// The ordered migration list.
///
/// The legacy flat shape is handled first because it *produces* the
/// two-phase lists the wrapping migration expects.
pub fn all() -> Vec<(&'static str, Migration)> {
    vec![
        ("legacy-flat-options", migrate_legacy_flat),
        ("wrap-single-tool-config", migrate_wrap_single),
    ]
}

/// Apply every migration in order, collecting advisories.
pub fn apply(value: &mut Value) -> Vec<String> {
    all()
        .into_iter()
        .filter_map(|(_, migration)| migration(value))
        .collect()
}

/// Migrate the oldest shape: a single top-level `tool` with a flat
/// `options` bag, where `options.skipTaskContext` controlled prompt
/// context. Rewritten into the two-phase list shape: a default conversion
/// entry plus a task entry carrying the flag as `skipContext`.
fn migrate_legacy_flat(value: &mut Value) -> Option<String> {
    let doc = value.as_object_mut()?;
    if !doc.contains_key("tool") || doc.contains_key("conversion") || doc.contains_key("task") {
        return None;
    }

    let tool = doc.remove("tool")?;
    let mut options = match doc.remove("options") {
        Some(Value::Object(map)) => map,
        Some(other) => {
            // Malformed options survive into the task entry so validation
            // reports them against the migrated shape.
            let mut map = Map::new();
            map.insert("options".to_string(), other);
            map
        }
        None => Map::new(),
    };

    let skip_context = options
        .remove("skipTaskContext")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    doc.insert(
        "conversion".to_string(),
        json!([{"tool": tool.clone(), "options": options.clone()}]),
    );
    doc.insert(
        "task".to_string(),
        json!([{"tool": tool, "options": options, "skipContext": skip_context}]),
    );

    Some(
        "migrated legacy flat tool configuration into two-phase lists \
         (options.skipTaskContext became task[0].skipContext)"
            .to_string(),
    )
}

/// Migrate a single ToolConfig object in place of a one-element list.
fn migrate_wrap_single(value: &mut Value) -> Option<String> {
    let doc = value.as_object_mut()?;
    let mut wrapped = Vec::new();

    for phase in ["conversion", "task"] {
        if let Some(entry) = doc.get(phase)
            && entry.is_object()
        {
            let single = doc.remove(phase).unwrap_or(Value::Null);
            doc.insert(phase.to_string(), Value::Array(vec![single]));
            wrapped.push(phase);
        }
    }

    if wrapped.is_empty() {
        None
    } else {
        Some(format!(
            "wrapped single tool configuration into a list for: {}",
            wrapped.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_single_conversion_object() {
        let mut doc = json!({
            "name": "x", "version": "1",
            "conversion": {"tool": "claude-code"},
            "task": [{"tool": "claude-code"}]
        });

        let advisories = apply(&mut doc);
        assert_eq!(advisories.len(), 1);
        assert!(advisories[0].contains("conversion"));
        assert!(doc["conversion"].is_array());
        assert_eq!(doc["conversion"][0]["tool"], "claude-code");
        // already-listed phase untouched
        assert_eq!(doc["task"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn wrap_both_phases() {
        let mut doc = json!({
            "name": "x", "version": "1",
            "conversion": {"tool": "claude-code"},
            "task": {"tool": "claude-code"}
        });

        let advisories = apply(&mut doc);
        assert_eq!(advisories.len(), 1);
        assert!(advisories[0].contains("conversion, task"));
    }

    #[test]
    fn legacy_flat_shape_becomes_two_phase() {
        let mut doc = json!({
            "name": "legacy", "version": "1",
            "tool": "claude-code",
            "options": {"model": "sonnet", "skipTaskContext": true}
        });

        let advisories = apply(&mut doc);
        assert_eq!(advisories.len(), 1);
        assert!(advisories[0].contains("skipTaskContext"));

        assert!(doc.get("tool").is_none());
        assert!(doc.get("options").is_none());
        assert_eq!(doc["conversion"][0]["tool"], "claude-code");
        assert_eq!(doc["conversion"][0]["options"]["model"], "sonnet");
        assert_eq!(doc["task"][0]["skipContext"], true);
        // the flag is removed from the migrated option bag
        assert!(doc["task"][0]["options"].get("skipTaskContext").is_none());
    }

    #[test]
    fn legacy_flat_defaults_skip_context_false() {
        let mut doc = json!({
            "name": "legacy", "version": "1",
            "tool": "claude-code",
            "options": {"model": "sonnet"}
        });

        apply(&mut doc);
        assert_eq!(doc["task"][0]["skipContext"], false);
    }

    #[test]
    fn modern_document_is_untouched() {
        let mut doc = json!({
            "name": "modern", "version": "1",
            "conversion": [{"tool": "claude-code"}],
            "task": [{"tool": "claude-code"}]
        });
        let before = doc.clone();

        let advisories = apply(&mut doc);
        assert!(advisories.is_empty());
        assert_eq!(doc, before);
    }

    #[test]
    fn migrations_run_in_declared_order() {
        let names: Vec<&str> = all().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["legacy-flat-options", "wrap-single-tool-config"]
        );
    }
}
