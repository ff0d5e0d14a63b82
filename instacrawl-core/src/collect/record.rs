use serde::Serialize;
use serde_json::{Map, Value};

/// A decoded JSON object as captured from the wire.
///
/// Paths are dotted key sequences. A numeric segment indexes into an array,
/// and a negative segment counts from the end (`video_versions.-1.url`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalRecord(Map<String, Value>);

impl CanonicalRecord {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Looks a path up, treating JSON `null` as absent.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = step(current, segment)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.lookup(path).and_then(Value::as_str)
    }

    pub fn bool_at(&self, path: &str) -> Option<bool> {
        self.lookup(path).and_then(Value::as_bool)
    }

    pub fn u64_at(&self, path: &str) -> Option<u64> {
        match self.lookup(path)? {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        }
    }

    /// Returns the object at `path` as its own record.
    pub fn subtree(&self, path: &str) -> Option<CanonicalRecord> {
        match self.lookup(path)? {
            Value::Object(map) => Some(Self(map.clone())),
            _ => None,
        }
    }

    /// Returns every object in the array at `path`, skipping non-object entries.
    pub fn records(&self, path: &str) -> Option<Vec<CanonicalRecord>> {
        Some(self.entries(path)?.into_iter().flatten().collect())
    }

    /// Returns every entry of the array at `path`, `None` where an entry is not an object.
    pub fn entries(&self, path: &str) -> Option<Vec<Option<CanonicalRecord>>> {
        let items = self.lookup(path)?.as_array()?;
        Some(
            items
                .iter()
                .map(|item| CanonicalRecord::from_value(item.clone()))
                .collect(),
        )
    }
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => {
            let index: i64 = segment.parse().ok()?;
            let resolved = if index < 0 {
                items.len().checked_sub(index.unsigned_abs() as usize)?
            } else {
                index as usize
            };
            items.get(resolved)
        }
        _ => None,
    }
}

impl From<Map<String, Value>> for CanonicalRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
