//! Scalar cell values and ordered rows.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or the empty string: what required-ness repair treats as missing.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Text form used for string coercion and value comparison.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Comparison key for uniqueness and reference membership; `None` for Null.
    pub(crate) fn key(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.render())
        }
    }
}

/// Integral finite numbers render without a fractional part.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        // folds -0 into 0
        "0".to_string()
    } else {
        n.to_string()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Ordered mapping from column name to value.
///
/// Equality ignores key order.
#[derive(Debug, Clone, Default)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace; replacement keeps the key's position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep exactly `names`, in that order, filling absent keys from `fill`.
    pub(crate) fn conform<'a, I, F>(&mut self, names: I, mut fill: F)
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(&str) -> Value,
    {
        let mut entries = std::mem::take(&mut self.entries);
        self.entries = names
            .into_iter()
            .map(|name| {
                let value = match entries.iter().position(|(k, _)| k == name) {
                    Some(index) => entries.swap_remove(index).1,
                    None => fill(name),
                };
                (name.to_string(), value)
            })
            .collect();
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut row = Row::new();
        for (key, value) in iter {
            row.insert(key, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-12.0), "-12");
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut row: Row = [("a", Value::from(1)), ("b", Value::from("x"))]
            .into_iter()
            .collect();
        row.insert("a", Value::from(2));

        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn equality_ignores_key_order() {
        let left: Row = [("a", Value::from(1)), ("b", Value::Null)]
            .into_iter()
            .collect();
        let right: Row = [("b", Value::Null), ("a", Value::from(1))]
            .into_iter()
            .collect();
        assert_eq!(left, right);
    }

    #[test]
    fn conform_orders_fills_and_drops() {
        let mut row: Row = [("stale", Value::from(1)), ("b", Value::from("x"))]
            .into_iter()
            .collect();
        row.conform(["a", "b"], |_| Value::Number(0.0));

        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&Value::Number(0.0)));
        assert!(!row.contains_key("stale"));
    }

    #[test]
    fn rows_serialize_as_ordered_objects() {
        let row: Row = [("id", Value::from(1)), ("ok", Value::from(true))]
            .into_iter()
            .collect();
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"id":1.0,"ok":true}"#);
    }
}
