// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::record::{Record, SCHEMA_TYPE};
use crate::schema::{archived_schema_id, SchemaModel, ARCHIVE_DIVIDER};
use crate::value::Value;

/// Where schemas and records come from: local storage, a peer, or a fixture.
pub trait RecordSource {
    /// Schema of `data_type`. Archived versions are looked up by their archived id.
    fn get_schema(&self, data_type: &str) -> Result<SchemaModel>;

    fn get_record(&self, data_type: &str, id: &str) -> Result<Record>;

    fn archive_divider(&self) -> &str {
        ARCHIVE_DIVIDER
    }
}

/// Memoizes schemas and records for the duration of one resolution.
///
/// Owned by the caller and passed by reference into a single call; not meant to be shared
/// across concurrent traversals.
#[derive(Debug, Default)]
pub struct TraversalCache {
    schemas: HashMap<String, SchemaModel>,
    records: HashMap<(String, String), Record>,
}

impl TraversalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.schemas.clear();
        self.records.clear();
    }

    pub fn schema(&mut self, source: &dyn RecordSource, data_type: &str) -> Result<SchemaModel> {
        if let Some(s) = self.schemas.get(data_type) {
            return Ok(s.clone());
        }
        let schema = source.get_schema(data_type)?;
        self.schemas.insert(data_type.to_string(), schema.clone());
        Ok(schema)
    }

    pub fn record(&mut self, source: &dyn RecordSource, data_type: &str, id: &str) -> Result<Record> {
        let key = (data_type.to_string(), id.to_string());
        if let Some(r) = self.records.get(&key) {
            return Ok(r.clone());
        }
        let record = source.get_record(data_type, id)?;
        self.records.insert(key, record.clone());
        Ok(record)
    }

    /// Schema governing `record`: the current one, or the archived version it declares.
    pub fn schema_for(&mut self, source: &dyn RecordSource, record: &Record) -> Result<SchemaModel> {
        let current = self.schema(source, &record.data_type)?;
        if current.version() == Some(record.version.as_str()) {
            return Ok(current);
        }
        let archived = archived_schema_id(&record.data_type, &record.version, source.archive_divider());
        self.schema(source, &archived)
            .map_err(|e| e.context(format!("schema of {record}")))
    }
}

/// A fixed set of records held in memory, schemas included as `schema` records.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: BTreeMap<(String, String), Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: Record) {
        self.records
            .insert((record.data_type.clone(), record.id.clone()), record);
    }

    /// Load an array of record envelopes.
    pub fn from_value(v: &Value) -> Result<RecordSet> {
        let mut set = RecordSet::new();
        for item in v.as_array()?.iter() {
            set.insert(Record::from_value(item)?);
        }
        Ok(set)
    }

    pub fn from_json_str(json: &str) -> Result<RecordSet> {
        Self::from_value(&Value::from_json_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for RecordSet {
    fn get_schema(&self, data_type: &str) -> Result<SchemaModel> {
        let record = self.get_record(SCHEMA_TYPE, data_type)?;
        SchemaModel::from_value(&record.data)
    }

    fn get_record(&self, data_type: &str, id: &str) -> Result<Record> {
        self.records
            .get(&(data_type.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("{data_type}/{id}")))
    }
}
