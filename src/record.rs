use std::collections::BTreeMap;

use crate::{BggError, Result, Value};

/// Read-only view over one field map.
///
/// Fields are looked up by name; there is no way to change them once the
/// record is built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    data: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(data: BTreeMap<String, Value>) -> Self {
        Self { data }
    }

    /// Returns a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Returns a field by name, failing with
    /// [`BggError::AttributeNotFound`] when it is absent.
    pub fn attr(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| BggError::AttributeNotFound(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Returns an integer field by name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns a float field by name. Integers are widened.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Float(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_list(&self, name: &str) -> Option<&[Value]> {
        match self.get(name)? {
            Value::List(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    /// The backing field map, for dumping or debugging.
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.data)
            .map_err(|err| BggError::InvalidData(format!("cannot serialize record: {err}")))
    }

    pub(crate) fn data_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.data
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
