//! Save payload planning and the blob document codec.
//!
//! # Responsibility
//! - Split a topic's attribute bag into the indexed payload, the blob
//!   payload and the removal list for one save.
//! - Encode and decode the per-topic blob document.
//!
//! # Invariants
//! - Column-backed keys never appear in any payload or removal list.
//! - The blob payload always carries every blob value, changed or not.
//! - Removals are only planned for persisted topics and never name blob
//!   attributes.

use crate::model::content_type::ContentType;
use crate::model::topic::{
    Topic, TopicHandle, TopicId, CONTENT_TYPE_ATTRIBUTE, DERIVED_TOPIC_ATTRIBUTE, KEY_ATTRIBUTE,
    PARENT_ID_ATTRIBUTE, SORT_ORDER_ATTRIBUTE,
};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Attributes persisted as `topics` columns instead of attribute rows.
const COLUMN_BACKED_ATTRIBUTES: &[&str] = &[
    KEY_ATTRIBUTE,
    CONTENT_TYPE_ATTRIBUTE,
    PARENT_ID_ATTRIBUTE,
    SORT_ORDER_ATTRIBUTE,
];

static BLOB_ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<attribute\s+key="([^"]*)"\s*>(.*?)</attribute>"#)
        .expect("valid blob entry regex")
});

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(amp|lt|gt|quot|apos|#[0-9]+|#[xX][0-9A-Fa-f]+);").expect("valid entity regex")
});

pub(crate) fn is_column_backed(key: &str) -> bool {
    COLUMN_BACKED_ATTRIBUTES
        .iter()
        .any(|column| column.eq_ignore_ascii_case(key))
}

/// Attribute writes planned for one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AttributePlan {
    pub(crate) indexed: Vec<(String, String)>,
    pub(crate) blob: Vec<(String, String)>,
    pub(crate) removed: Vec<String>,
}

/// Identity of a topic referenced by a save, possibly assigned mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TopicRef {
    Saved(TopicId),
    Pending(TopicHandle),
}

/// What a save does with the `TopicID` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReferencePlan {
    Keep,
    Write(TopicRef),
    WriteLiteral(String),
    Remove,
}

/// Partitions the bag; `TopicID` is planned separately.
pub(crate) fn plan_attributes(topic: &Topic, content_type: &ContentType) -> AttributePlan {
    let mut plan = AttributePlan::default();
    let persisted = !topic.is_new();

    for entry in topic.attributes() {
        let key = entry.key();
        if is_column_backed(key) || key.eq_ignore_ascii_case(DERIVED_TOPIC_ATTRIBUTE) {
            continue;
        }
        let descriptor = content_type.attribute(key);
        if descriptor.is_some_and(|descriptor| !descriptor.kind.is_stored_as_attribute()) {
            continue;
        }
        let is_blob = descriptor.is_some_and(|descriptor| descriptor.is_extended);
        match (is_blob, entry.value()) {
            (true, Some(value)) => plan.blob.push((key.to_string(), value.to_string())),
            (true, None) => {}
            (false, Some(value)) if entry.is_dirty() => {
                plan.indexed.push((key.to_string(), value.to_string()))
            }
            (false, None) if entry.is_dirty() && persisted => plan.removed.push(key.to_string()),
            (false, _) => {}
        }
    }

    if persisted {
        for descriptor in content_type.attributes() {
            let key = descriptor.key.as_str();
            if descriptor.is_extended
                || !descriptor.kind.is_stored_as_attribute()
                || is_column_backed(key)
                || key.eq_ignore_ascii_case(DERIVED_TOPIC_ATTRIBUTE)
                || topic.attributes().get_value(key).is_some()
                || plan
                    .removed
                    .iter()
                    .any(|removed| removed.eq_ignore_ascii_case(key))
            {
                continue;
            }
            plan.removed.push(key.to_string());
        }
    }
    plan
}

/// Plans the `TopicID` write from the derived pointer, falling back to the
/// stored literal when the pointer is unresolved.
pub(crate) fn plan_topic_reference(topic: &Topic, derived: Option<TopicRef>) -> ReferencePlan {
    let entry = topic.attributes().get(DERIVED_TOPIC_ATTRIBUTE);
    let stored = entry.and_then(|entry| entry.value());
    let is_dirty = entry.is_some_and(|entry| entry.is_dirty());

    match derived {
        Some(TopicRef::Saved(id)) if !is_dirty && stored == Some(id.to_string().as_str()) => {
            ReferencePlan::Keep
        }
        Some(reference) => ReferencePlan::Write(reference),
        None => match stored {
            Some(literal) if is_dirty => ReferencePlan::WriteLiteral(literal.to_string()),
            None if is_dirty && !topic.is_new() => ReferencePlan::Remove,
            _ => ReferencePlan::Keep,
        },
    }
}

/// Serializes blob entries into the stored document.
pub(crate) fn encode_blob(entries: &[(String, String)]) -> String {
    let mut document = String::from("<attributes>");
    for (key, value) in entries {
        document.push_str(&format!(
            "<attribute key=\"{}\">{}</attribute>",
            escape(key),
            escape(value)
        ));
    }
    document.push_str("</attributes>");
    document
}

/// Parses a stored blob document; malformed fragments are ignored.
pub(crate) fn decode_blob(document: &str) -> Vec<(String, String)> {
    BLOB_ENTRY_RE
        .captures_iter(document)
        .map(|caps| (unescape(&caps[1]), unescape(&caps[2])))
        .collect()
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape(raw: &str) -> String {
    ENTITY_RE
        .replace_all(raw, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let number = &entity[1..];
                    let code = match number.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => number.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
