// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{btree_map, BTreeMap};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::record::Record;

/// Selects one record, or every record of a type when `data_id` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Keys {
    pub data_type: String,
    pub data_id: Option<String>,
}

impl Keys {
    pub fn record(data_type: &str, data_id: &str) -> Self {
        Self {
            data_type: data_type.to_string(),
            data_id: Some(data_id.to_string()),
        }
    }

    pub fn all(data_type: &str) -> Self {
        Self {
            data_type: data_type.to_string(),
            data_id: None,
        }
    }
}

/// Table-oriented record driver. Records are keyed by their `(type, id)`.
pub trait Storage {
    /// Matching records ordered by id. A missing type or id yields an empty list.
    fn get(&self, table: &str, keys: &Keys) -> Result<Vec<Record>>;

    /// Insert; fails with `Conflict` when the record exists.
    fn create(&self, table: &str, record: &Record) -> Result<()>;

    /// Insert or overwrite.
    fn replace(&self, table: &str, record: &Record) -> Result<()>;

    /// Remove the selected records; fails with `NotFound` when nothing matched.
    fn delete(&self, table: &str, keys: &Keys) -> Result<()>;
}

type Table = BTreeMap<(String, String), Record>;

/// In-memory driver with one ordered map per table.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: DashMap<String, Table>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held in `table`.
    pub fn count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }
}

fn key_of(record: &Record) -> (String, String) {
    (record.data_type.clone(), record.id.clone())
}

impl Storage for MemoryStorage {
    fn get(&self, table: &str, keys: &Keys) -> Result<Vec<Record>> {
        let Some(t) = self.tables.get(table) else {
            return Ok(vec![]);
        };
        let found = match &keys.data_id {
            Some(id) => t
                .get(&(keys.data_type.clone(), id.clone()))
                .cloned()
                .into_iter()
                .collect(),
            None => t
                .iter()
                .filter(|((ty, _), _)| *ty == keys.data_type)
                .map(|(_, r)| r.clone())
                .collect(),
        };
        Ok(found)
    }

    fn create(&self, table: &str, record: &Record) -> Result<()> {
        let mut t = self.tables.entry(table.to_string()).or_default();
        let created = match t.entry(key_of(record)) {
            btree_map::Entry::Occupied(_) => Err(Error::Conflict(format!(
                "{}/{} already exists in `{table}`",
                record.data_type, record.id
            ))),
            btree_map::Entry::Vacant(e) => {
                e.insert(record.clone());
                Ok(())
            }
        };
        created
    }

    fn replace(&self, table: &str, record: &Record) -> Result<()> {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key_of(record), record.clone());
        Ok(())
    }

    fn delete(&self, table: &str, keys: &Keys) -> Result<()> {
        let missing = || {
            Error::not_found(format!(
                "{}/{} in `{table}`",
                keys.data_type,
                keys.data_id.as_deref().unwrap_or("*")
            ))
        };
        let Entry::Occupied(mut t) = self.tables.entry(table.to_string()) else {
            return Err(missing());
        };
        let removed = match &keys.data_id {
            Some(id) => t
                .get_mut()
                .remove(&(keys.data_type.clone(), id.clone()))
                .is_some(),
            None => {
                let before = t.get().len();
                t.get_mut().retain(|(ty, _), _| *ty != keys.data_type);
                before != t.get().len()
            }
        };
        if !removed {
            return Err(missing());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn rec(ty: &str, id: &str) -> Record {
        Record::new(ty, id, "0.0.1", Value::new_object())
    }

    #[test]
    fn crud() -> Result<()> {
        let s = MemoryStorage::new();
        s.create("data", &rec("a", "2"))?;
        s.create("data", &rec("a", "1"))?;
        s.create("data", &rec("b", "1"))?;
        assert_eq!(s.create("data", &rec("a", "1")).err().map(|e| e.status()), Some(409));

        let ids: Vec<String> = s.get("data", &Keys::all("a"))?.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(s.get("other", &Keys::all("a"))?.is_empty());

        s.delete("data", &Keys::record("a", "1"))?;
        assert!(s.delete("data", &Keys::record("a", "1")).is_err());
        s.delete("data", &Keys::all("a"))?;
        assert_eq!(s.count("data"), 1);
        Ok(())
    }
}
