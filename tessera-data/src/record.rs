use indexmap::IndexMap;
use serde::Serialize;

use crate::error::DataError;
use crate::value::{FromValue, Value};

/// An ordered set of named values: one row of a table or one projected element.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Decode a field, delegating absent fields to [`FromValue::from_missing`].
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, DataError> {
        match self.fields.get(name) {
            Some(value) => T::from_value(value, name),
            None => T::from_missing(name),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Overwrite this record's fields with those of `other`, adding new ones.
    pub fn merge(&mut self, other: &Record) {
        for (name, value) in &other.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_preserved() {
        let record = Record::new().with("b", 1_i64).with("a", "x");
        assert_eq!(record.names().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn test_merge_overwrites_and_appends() {
        let mut record = Record::new().with("id", 1_i64).with("name", "old");
        record.merge(&Record::new().with("name", "new").with("qty", 2_i64));
        assert_eq!(record.get::<String>("name").unwrap(), "new");
        assert_eq!(record.get::<i64>("qty").unwrap(), 2);
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_serializes_as_object() {
        let record = Record::new().with("id", 1_i64).with("note", Value::Null);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":1,"note":null}"#);
    }
}
