// streamctl - CLI for the Stream activity log
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Record values returned by the store and their flattened form.
//!
//! A record is an arbitrarily nested tree. Before rendering, every record is
//! reduced to a single-level mapping keyed by dotted paths such as
//! `author_meta.user_login`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl fmt::Display for Scalar {
    /// Cell text used by table and CSV output; null renders as an empty cell.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

/// A node of a record tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Sequence(Vec<Value>),
    Mapping(IndexMap<String, Value>),
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Scalar(Scalar::Null),
            serde_json::Value::Bool(b) => Value::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => Value::Scalar(Scalar::Number(n)),
            serde_json::Value::String(s) => Value::Scalar(Scalar::String(s)),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Mapping(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// One entry returned by the store: a top-level mapping of field name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new(fields: IndexMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

impl From<serde_json::Value> for Record {
    fn from(value: serde_json::Value) -> Self {
        match Value::from(value) {
            Value::Mapping(fields) => Record { fields },
            other => {
                tracing::warn!(?other, "store returned a non-object record, treating it as empty");
                Record::default()
            }
        }
    }
}

/// A record reduced to dotted path → scalar.
pub type FlatRecord = IndexMap<String, Scalar>;

/// How sequence values are reduced while flattening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayPolicy {
    /// Keep element 0 under the sequence's own path and drop the rest.
    #[default]
    First,
    /// Keep every element under `path.<index>`.
    Indexed,
}

/// Flattens `value` under `name` with the default [`ArrayPolicy::First`].
pub fn flatten(name: &str, value: &Value) -> FlatRecord {
    flatten_with(name, value, ArrayPolicy::First)
}

pub fn flatten_with(name: &str, value: &Value, policy: ArrayPolicy) -> FlatRecord {
    let mut out = FlatRecord::new();
    flatten_into(&mut out, name.to_string(), value, policy);
    out
}

fn flatten_into(out: &mut FlatRecord, path: String, value: &Value, policy: ArrayPolicy) {
    match value {
        Value::Scalar(scalar) => {
            out.insert(path, scalar.clone());
        }
        Value::Mapping(map) => {
            for (key, sub) in map {
                flatten_into(out, format!("{path}.{key}"), sub, policy);
            }
        }
        Value::Sequence(items) if items.is_empty() => {
            out.insert(path, Scalar::Null);
        }
        Value::Sequence(items) => match policy {
            ArrayPolicy::First => flatten_into(out, path, &items[0], policy),
            ArrayPolicy::Indexed => {
                for (idx, item) in items.iter().enumerate() {
                    flatten_into(out, format!("{path}.{idx}"), item, policy);
                }
            }
        },
    }
}

/// Flattens every top-level field of `record`, then fills in `null` for each
/// requested field the result does not already carry.
///
/// The output always contains every entry of `fields`; it may also contain
/// paths that were never requested.
pub fn flatten_record(record: &Record, fields: &[String], policy: ArrayPolicy) -> FlatRecord {
    let mut flat = FlatRecord::new();
    for (key, value) in record.iter() {
        flatten_into(&mut flat, key.clone(), value, policy);
    }
    for field in fields {
        if !flat.contains_key(field) {
            flat.insert(field.clone(), Scalar::Null);
        }
    }
    flat
}
