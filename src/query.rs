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

//! The `query` pipeline: probe the store, run one query, flatten, render.

use crate::client::ApiClient;
use crate::config::{QuerySettings, UnknownFormatPolicy};
use crate::record::{FlatRecord, Record, flatten_record};
use crate::render::{self, Format};
use crate::schema;
use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use serde_json::Value;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    List(Vec<String>),
}

/// Filters forwarded verbatim to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    filters: IndexMap<String, FilterValue>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FilterValue) {
        self.filters.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.filters.get(name)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Query-string pairs; lists become repeated `name[]` parameters.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (name, value) in &self.filters {
            match value {
                FilterValue::Text(text) => pairs.push((name.clone(), text.clone())),
                FilterValue::List(items) => {
                    for item in items {
                        pairs.push((format!("{name}[]"), item.clone()));
                    }
                }
            }
        }
        pairs
    }
}

/// The external record store.
///
/// `Ok(None)` is the store's falsy answer.
pub trait RecordStore {
    fn query(&self, filters: &QueryFilter, fields: Option<&str>) -> Result<Option<Vec<Record>>>;
}

/// Record store reached over the site's REST endpoint.
pub struct HttpStore<'a> {
    client: &'a ApiClient,
    path: String,
}

impl<'a> HttpStore<'a> {
    pub fn new(client: &'a ApiClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

impl RecordStore for HttpStore<'_> {
    fn query(&self, filters: &QueryFilter, fields: Option<&str>) -> Result<Option<Vec<Record>>> {
        let mut params = filters.to_query_pairs();
        if let Some(fields) = fields {
            params.push(("fields".to_string(), fields.to_string()));
        }
        let response = self.client.get(&self.path, &params)?;
        let json = response
            .json
            .ok_or_else(|| anyhow!("record store returned a non-JSON body"))?;
        Ok(records_from_json(json))
    }
}

fn records_from_json(json: Value) -> Option<Vec<Record>> {
    match json {
        Value::Array(items) => Some(items.into_iter().map(Record::from).collect()),
        Value::Null | Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) if s.is_empty() || s == "0" => None,
        other => {
            tracing::warn!(?other, "unexpected record store response, treating it as empty");
            Some(Vec::new())
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("SITE IS DISCONNECTED")]
    Disconnected,
}

/// Asks the store for a single record; a falsy or empty answer, or no answer
/// at all, means the site is disconnected.
pub fn probe<S: RecordStore + ?Sized>(store: &S) -> Result<(), QueryError> {
    let mut filters = QueryFilter::new();
    filters.insert("records_per_page", FilterValue::Text("1".into()));
    match store.query(&filters, Some("created")) {
        Ok(Some(records)) if !records.is_empty() => Ok(()),
        Ok(_) => Err(QueryError::Disconnected),
        Err(err) => {
            tracing::debug!(error = %err, "connection probe failed");
            Err(QueryError::Disconnected)
        }
    }
}

/// One `query` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub filters: QueryFilter,
    /// Explicit `--fields`, also forwarded to the store.
    pub fields: Option<Vec<String>>,
    pub format: String,
}

impl QueryRequest {
    /// Builds a request from free-form `--name=value` arguments.
    ///
    /// `format` and `fields` given this way override the dedicated flags and
    /// are never forwarded as filters. A bare `--name` means `true`.
    pub fn from_args(
        fields: Option<String>,
        format: String,
        args: &[String],
    ) -> Result<Self> {
        let mut request = QueryRequest {
            filters: QueryFilter::new(),
            fields: fields.as_deref().map(split_fields),
            format,
        };

        for arg in args {
            let (name, value) = parse_assoc_arg(arg)?;
            match name {
                "format" => request.format = value.to_string(),
                "fields" => request.fields = Some(split_fields(value)),
                _ => {
                    if !schema::is_documented_filter(name) {
                        tracing::debug!(filter = name, "forwarding undocumented filter");
                    }
                    request
                        .filters
                        .insert(name, FilterValue::Text(value.to_string()));
                }
            }
        }

        Ok(request)
    }
}

fn parse_assoc_arg(arg: &str) -> Result<(&str, &str)> {
    let stripped = arg
        .strip_prefix("--")
        .ok_or_else(|| anyhow!("unexpected argument `{arg}`; filters look like --name=value"))?;
    let (name, value) = stripped.split_once('=').unwrap_or((stripped, "true"));
    if name.is_empty() {
        return Err(anyhow!("empty filter name in `{arg}`"));
    }
    Ok((name, value))
}

pub fn split_fields(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Runs the full pipeline, writing the rendered output to `out`.
pub fn run<S: RecordStore + ?Sized, W: Write>(
    store: &S,
    request: &QueryRequest,
    settings: &QuerySettings,
    out: &mut W,
) -> Result<()> {
    let format = match request.format.parse::<Format>() {
        Ok(format) => Some(format),
        Err(err) if settings.unknown_format == UnknownFormatPolicy::Reject => {
            return Err(err.into());
        }
        Err(err) => {
            tracing::warn!("{err}; nothing will be printed");
            None
        }
    };

    probe(store)?;

    let fields = request
        .fields
        .clone()
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| settings.default_fields.clone());
    let fields_param = request
        .fields
        .as_ref()
        .filter(|f| !f.is_empty())
        .map(|f| f.join(","));

    let records = store
        .query(&request.filters, fields_param.as_deref())
        .context("querying records")?
        .unwrap_or_default();
    tracing::debug!(count = records.len(), "records fetched");

    let rows: Vec<FlatRecord> = records
        .iter()
        .map(|record| flatten_record(record, &fields, settings.array_policy))
        .collect();

    match format {
        Some(format) => render::render(out, format, &rows, &fields),
        None => Ok(()),
    }
}
