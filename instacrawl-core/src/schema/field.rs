use std::collections::HashMap;

use serde_json::Value;
use tracing::trace;

use crate::collect::{CanonicalRecord, CollectError, CollectResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    /// Non-negative integer such as a follower count.
    Count,
    Float,
    Bool,
    FloatList,
    StrList,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fallback {
    Str(&'static str),
    Int(i64),
    Bool(bool),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence {
    Required,
    Optional,
    Default(Fallback),
}

/// How one typed field is read out of a raw record.
///
/// `sources` are tried in order and the first non-null value wins, which is
/// how one table covers several upstream spellings of the same field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub sources: &'static [&'static str],
    pub kind: FieldKind,
    pub presence: Presence,
}

impl FieldSpec {
    pub const fn required(
        name: &'static str,
        sources: &'static [&'static str],
        kind: FieldKind,
    ) -> Self {
        Self {
            name,
            sources,
            kind,
            presence: Presence::Required,
        }
    }

    pub const fn optional(
        name: &'static str,
        sources: &'static [&'static str],
        kind: FieldKind,
    ) -> Self {
        Self {
            name,
            sources,
            kind,
            presence: Presence::Optional,
        }
    }

    pub const fn defaulted(
        name: &'static str,
        sources: &'static [&'static str],
        kind: FieldKind,
        fallback: Fallback,
    ) -> Self {
        Self {
            name,
            sources,
            kind,
            presence: Presence::Default(fallback),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Count(u64),
    Float(f64),
    Bool(bool),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
}

/// Fields resolved against one record, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    values: HashMap<&'static str, FieldValue>,
}

impl FieldSet {
    pub fn str(&self, name: &str) -> String {
        self.opt_str(name).unwrap_or_default()
    }

    pub fn opt_str(&self, name: &str) -> Option<String> {
        match self.values.get(name)? {
            FieldValue::Str(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> i64 {
        self.opt_int(name).unwrap_or_default()
    }

    pub fn opt_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            FieldValue::Int(value) => Some(*value),
            FieldValue::Count(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn count(&self, name: &str) -> u64 {
        self.opt_count(name).unwrap_or_default()
    }

    pub fn opt_count(&self, name: &str) -> Option<u64> {
        match self.values.get(name)? {
            FieldValue::Count(value) => Some(*value),
            _ => None,
        }
    }

    pub fn opt_float(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            FieldValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> bool {
        self.opt_bool(name).unwrap_or_default()
    }

    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn floats(&self, name: &str) -> Vec<f64> {
        match self.values.get(name) {
            Some(FieldValue::FloatList(values)) => values.clone(),
            _ => Vec::new(),
        }
    }

    pub fn strs(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(FieldValue::StrList(values)) => values.clone(),
            _ => Vec::new(),
        }
    }
}

/// Resolves every field of `table` against `record`.
///
/// A missing or unconvertible required field fails the whole entity. The
/// same problem on an optional or defaulted field only drops that field.
pub fn resolve(
    entity: &'static str,
    table: &[FieldSpec],
    record: &CanonicalRecord,
) -> CollectResult<FieldSet> {
    let mut set = FieldSet::default();
    for spec in table {
        let raw = spec.sources.iter().find_map(|path| record.lookup(path));
        let coerced = match raw {
            Some(value) => match coerce(value, spec.kind) {
                Some(converted) => Some(converted),
                None if spec.presence == Presence::Required => {
                    return Err(CollectError::schema(
                        entity,
                        format!("field `{}` expected {:?}, found {}", spec.name, spec.kind, value),
                    ));
                }
                None => {
                    trace!(entity, field = spec.name, %value, "Dropping unconvertible optional field");
                    None
                }
            },
            None => None,
        };

        match (coerced, spec.presence) {
            (Some(value), _) => {
                set.values.insert(spec.name, value);
            }
            (None, Presence::Required) => {
                return Err(CollectError::schema(
                    entity,
                    format!("missing required field `{}`", spec.name),
                ));
            }
            (None, Presence::Default(fallback)) => {
                set.values.insert(spec.name, fallback_value(fallback, spec.kind));
            }
            (None, Presence::Optional) => {}
        }
    }
    Ok(set)
}

fn fallback_value(fallback: Fallback, kind: FieldKind) -> FieldValue {
    match (fallback, kind) {
        (Fallback::Str(value), _) => FieldValue::Str(value.to_string()),
        (Fallback::Int(value), FieldKind::Count) => FieldValue::Count(value.max(0) as u64),
        (Fallback::Int(value), FieldKind::Float) => FieldValue::Float(value as f64),
        (Fallback::Int(value), _) => FieldValue::Int(value),
        (Fallback::Bool(value), _) => FieldValue::Bool(value),
        (Fallback::Empty, FieldKind::FloatList) => FieldValue::FloatList(Vec::new()),
        (Fallback::Empty, _) => FieldValue::StrList(Vec::new()),
    }
}

fn coerce(value: &Value, kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Str => match value {
            Value::String(text) => Some(FieldValue::Str(text.clone())),
            Value::Number(number) => Some(FieldValue::Str(number.to_string())),
            _ => None,
        },
        FieldKind::Int => as_i64(value).map(FieldValue::Int),
        FieldKind::Count => as_i64(value)
            .and_then(|n| u64::try_from(n).ok())
            .map(FieldValue::Count),
        FieldKind::Float => as_f64(value).map(FieldValue::Float),
        FieldKind::Bool => match value {
            Value::Bool(flag) => Some(FieldValue::Bool(*flag)),
            Value::Number(number) => match number.as_i64() {
                Some(0) => Some(FieldValue::Bool(false)),
                Some(1) => Some(FieldValue::Bool(true)),
                _ => None,
            },
            Value::String(text) => match text.as_str() {
                "true" => Some(FieldValue::Bool(true)),
                "false" => Some(FieldValue::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        FieldKind::FloatList => value
            .as_array()?
            .iter()
            .map(as_f64)
            .collect::<Option<Vec<_>>>()
            .map(FieldValue::FloatList),
        FieldKind::StrList => Some(FieldValue::StrList(
            value
                .as_array()?
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect(),
        )),
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TABLE: &[FieldSpec] = &[
        FieldSpec::required("id", &["pk", "id"], FieldKind::Str),
        FieldSpec::required("followers", &["edge_followed_by.count", "follower_count"], FieldKind::Count),
        FieldSpec::optional("private", &["is_private"], FieldKind::Bool),
        FieldSpec::defaulted("bio", &["biography"], FieldKind::Str, Fallback::Str("")),
        FieldSpec::defaulted("tags", &["related_tags"], FieldKind::StrList, Fallback::Empty),
    ];

    fn record(value: Value) -> CanonicalRecord {
        CanonicalRecord::from_value(value).unwrap()
    }

    #[test]
    fn first_non_null_source_wins() {
        let set = resolve(
            "user",
            TABLE,
            &record(json!({"pk": null, "id": 528817151, "follower_count": "97"})),
        )
        .unwrap();
        assert_eq!(set.str("id"), "528817151");
        assert_eq!(set.count("followers"), 97);
        assert_eq!(set.opt_bool("private"), None);
        assert_eq!(set.str("bio"), "");
        assert!(set.strs("tags").is_empty());
    }

    #[test]
    fn missing_required_field_is_a_mismatch() {
        let err = resolve("user", TABLE, &record(json!({"pk": "1"}))).unwrap_err();
        match err {
            CollectError::SchemaMismatch { entity, reason } => {
                assert_eq!(entity, "user");
                assert!(reason.contains("followers"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn negative_counts_are_rejected() {
        let err = resolve(
            "user",
            TABLE,
            &record(json!({"pk": "1", "follower_count": -4})),
        )
        .unwrap_err();
        assert!(matches!(err, CollectError::SchemaMismatch { .. }));
    }

    #[test]
    fn bad_optional_values_fall_back() {
        let set = resolve(
            "user",
            TABLE,
            &record(json!({
                "pk": "1",
                "follower_count": 3,
                "is_private": {"nested": true},
                "biography": ["not", "text"],
                "related_tags": [{"name": "space"}, "nasa", 4],
            })),
        )
        .unwrap();
        assert_eq!(set.opt_bool("private"), None);
        assert_eq!(set.str("bio"), "");
        assert_eq!(set.strs("tags"), vec!["space", "nasa"]);
    }
}
