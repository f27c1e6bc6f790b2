use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result item from the place-search endpoint.
///
/// Values are kept raw so export and display can decide how to render them. The
/// provider encodes "no value" inconsistently: missing keys, `null`, `""`, an empty
/// JSON array, or the literal string `"[]"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoiRecord(Map<String, Value>);

impl PoiRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// True when the value under `key` counts as empty for export purposes.
    pub fn is_empty_field(&self, key: &str) -> bool {
        is_empty_value(self.0.get(key))
    }

    /// Render the value under `key` as CSV/display text, normalizing empties to `""`.
    pub fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            v if is_empty_value(v) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// True when every one of `keys` is empty.
    pub fn all_empty<'a, I>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter().all(|k| self.is_empty_field(k))
    }
}

impl From<Map<String, Value>> for PoiRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty() || s == "[]",
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> PoiRecord {
        match value {
            Value::Object(map) => PoiRecord::new(map),
            _ => panic!("record fixture must be an object"),
        }
    }

    #[test]
    fn test_empty_sentinels() {
        let poi = record(json!({
            "name": "",
            "tel": [],
            "email": "[]",
            "website": null,
            "address": "1 Main St"
        }));

        assert!(poi.is_empty_field("name"));
        assert!(poi.is_empty_field("tel"));
        assert!(poi.is_empty_field("email"));
        assert!(poi.is_empty_field("website"));
        assert!(poi.is_empty_field("missing"));
        assert!(!poi.is_empty_field("address"));
    }

    #[test]
    fn test_text_rendering() {
        let poi = record(json!({
            "name": "City Museum",
            "tel": [],
            "distance": 42,
            "photos": ["a", "b"]
        }));

        assert_eq!(poi.text("name"), "City Museum");
        assert_eq!(poi.text("tel"), "");
        assert_eq!(poi.text("distance"), "42");
        assert_eq!(poi.text("photos"), r#"["a","b"]"#);
        assert_eq!(poi.text("missing"), "");
    }

    #[test]
    fn test_all_empty() {
        let poi = record(json!({ "name": "[]", "address": [] , "tel": "555"}));
        assert!(poi.all_empty(["name", "address"]));
        assert!(!poi.all_empty(["name", "tel"]));
    }
}
