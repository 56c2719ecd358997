// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Write front-end over a [`Storage`].
//!
//! Every effective write is journaled as a `(before, after)` pair. Schemas live in the data
//! table as records of type `schema`; replacing a schema by a newer version keeps the old one
//! under its archived id so that records still declaring it stay readable.

use dashmap::DashMap;
use tracing::{debug, info};

use crate::autoindex::{discover, validate_index_template};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::journal::Journal;
use crate::lock::PathLockManager;
use crate::patch::set_data_on_path;
use crate::path::{PathCmd, PathQuery, PathResolver};
use crate::record::{Record, Version, KEY_ID, KEY_TYPE, KEY_VER, SCHEMA_TYPE};
use crate::schema::builtin::{cmt_index_schema, CMT_INDEX_TYPE};
use crate::schema::{archived_schema_id, RecordValidator, RefValidator, SchemaModel, RESERVED_CHARS};
use crate::source::RecordSource;
use crate::storage::{Keys, MemoryStorage, Storage};
use crate::value::Value;
use crate::Rc;

pub struct DataHandler {
    config: Config,
    storage: Rc<dyn Storage>,
    journal: Journal,
    locks: PathLockManager,
    schemas: DashMap<String, SchemaModel>,
}

impl core::fmt::Debug for DataHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataHandler")
            .field("config", &self.config)
            .field("journal", &self.journal)
            .finish_non_exhaustive()
    }
}

impl DataHandler {
    pub fn new(storage: Rc<dyn Storage>, config: Config) -> Result<DataHandler> {
        let journal = Journal::new(storage.clone(), &config)?;
        let locks = PathLockManager::new(&config.lock);
        Ok(DataHandler {
            config,
            storage,
            journal,
            locks,
            schemas: DashMap::new(),
        })
    }

    /// Handler over a fresh [`MemoryStorage`].
    pub fn in_memory(config: Config) -> Result<DataHandler> {
        Self::new(Rc::new(MemoryStorage::new()), config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn locks(&self) -> &PathLockManager {
        &self.locks
    }

    fn table(&self) -> &str {
        &self.config.tables.data
    }

    fn divider(&self) -> &str {
        &self.config.schema.archive_divider
    }

    fn find(&self, data_type: &str, id: &str) -> Result<Option<Record>> {
        Ok(self
            .storage
            .get(self.table(), &Keys::record(data_type, id))?
            .into_iter()
            .next())
    }

    pub fn get(&self, data_type: &str, id: &str) -> Result<Record> {
        self.find(data_type, id)?
            .ok_or_else(|| Error::not_found(format!("{data_type}/{id}")))
    }

    /// All records of `data_type`, ordered by id.
    pub fn list(&self, data_type: &str) -> Result<Vec<Record>> {
        self.storage.get(self.table(), &Keys::all(data_type))
    }

    /// Evaluate a `type/id/path?cmd` query against the stored records.
    pub fn query(&self, path: &str) -> Result<Value> {
        PathResolver::new(self).query(path)
    }

    /// Current schema of `data_type`. The subscription type falls back to its built-in schema.
    pub fn current_schema(&self, data_type: &str) -> Result<SchemaModel> {
        if let Some(s) = self.schemas.get(data_type) {
            return Ok(s.clone());
        }
        let schema = match self.find(SCHEMA_TYPE, data_type)? {
            Some(record) => SchemaModel::from_value(&record.data)?,
            None if data_type == CMT_INDEX_TYPE => SchemaModel::from_value(&cmt_index_schema()?)?,
            None => return Err(Error::not_found(format!("schema of `{data_type}`"))),
        };
        self.schemas.insert(data_type.to_string(), schema.clone());
        Ok(schema)
    }

    /// Schema of the version `record` declares, current or archived.
    pub fn schema_of(&self, record: &Record) -> Result<SchemaModel> {
        let current = self.current_schema(&record.data_type)?;
        if current.version() == Some(record.version.as_str()) {
            return Ok(current);
        }
        let archived = archived_schema_id(&record.data_type, &record.version, self.divider());
        self.current_schema(&archived)
            .map_err(|e| e.context(format!("schema of {record}")))
    }

    // Run `f` under a lock on `path` held by a one-off owner.
    fn locked<T>(&self, path: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let handle = self.locks.lock(&self.locks.new_request("", path, 0))?;
        let result = f();
        self.locks.release(&handle);
        result
    }

    fn check_envelope(&self, record: &Record) -> Result<()> {
        for (name, v) in [(KEY_TYPE, &record.data_type), (KEY_ID, &record.id)] {
            if v.is_empty() || v.contains(RESERVED_CHARS) {
                return Err(Error::bad_request(format!(
                    "`{name}` of `{v}` must be non-empty without {RESERVED_CHARS:?}"
                )));
            }
        }
        if record.data_type != SCHEMA_TYPE && record.data_type.contains(self.divider()) {
            return Err(Error::bad_request(format!(
                "`{}` is an archived schema id, not a writable type",
                record.data_type
            )));
        }
        Version::parse(&record.version)?;
        Ok(())
    }

    // Reference problems `before` already had do not block the write, so that a stale
    // membership can still be taken out.
    fn check_refs(&self, before: Option<&Record>, after: &Record, schema: &SchemaModel) -> Result<()> {
        let refs = RefValidator::new(self);
        let problems = refs.problems(schema, &after.id, &after.data)?;
        if problems.is_empty() {
            return Ok(());
        }
        let known = match before {
            Some(b) => refs.problems(&self.schema_of(b)?, &b.id, &b.data)?,
            None => vec![],
        };
        match problems.iter().find(|p| !known.iter().any(|k| k.path == p.path)) {
            Some(p) => Err(Error::bad_request(format!("invalid reference: {p}")).context(after)),
            None => Ok(()),
        }
    }

    fn journal_write(&self, before: Option<&Record>, after: Option<&Record>) -> Result<()> {
        let Some(r) = after.or(before) else {
            return Ok(());
        };
        self.journal.append(
            &r.data_type,
            &r.id,
            before.map(Record::to_value),
            after.map(Record::to_value),
        )?;
        Ok(())
    }

    /// Create a record. Adding a schema whose type exists upgrades it and archives the
    /// current version.
    pub fn add(&self, record: Record) -> Result<()> {
        self.check_envelope(&record)?;
        let path = format!("{}/{}", record.data_type, record.id);
        self.locked(&path, || self.add_unlocked(record))
    }

    fn add_unlocked(&self, record: Record) -> Result<()> {
        if record.data_type == SCHEMA_TYPE {
            return self.add_schema(record);
        }
        let schema = self.current_schema(&record.data_type)?;
        if schema.version() != Some(record.version.as_str()) {
            return Err(Error::bad_request(format!(
                "{record} does not use the current schema version {}",
                schema.version().unwrap_or_default()
            )));
        }
        RecordValidator::validate(&schema, &record.data).map_err(|e| e.context(&record))?;
        self.check_refs(None, &record, &schema)?;
        self.storage.create(self.table(), &record)?;
        debug!(record = %record, "added");
        self.journal_write(None, Some(&record))
    }

    fn parse_schema(&self, record: &Record) -> Result<SchemaModel> {
        if record.id.contains(self.divider()) {
            return Err(Error::bad_request(format!(
                "schema id `{}` is reserved for archived versions",
                record.id
            )));
        }
        if record.id == SCHEMA_TYPE || record.id == CMT_INDEX_TYPE {
            return Err(Error::bad_request(format!("`{}` is a built-in type", record.id)));
        }
        let schema = SchemaModel::from_value(&record.data).map_err(|e| e.context(record))?;
        if schema.name() != record.id {
            return Err(Error::bad_request(format!(
                "schema name `{}` differs from record id `{}`",
                schema.name(),
                record.id
            )));
        }
        Version::parse(schema.version().unwrap_or_default())?;
        self.validate_auto_indexes(&schema)?;
        Ok(schema)
    }

    // Templates must only use string attributes of the type they refer to.
    fn validate_auto_indexes(&self, schema: &SchemaModel) -> Result<()> {
        for idx in discover(schema) {
            let target = if idx.content_type == schema.name() {
                schema.clone()
            } else {
                self.current_schema(&idx.content_type)
                    .map_err(|e| e.context(format!("index target of `{}`", idx.attr_path)))?
            };
            validate_index_template(&idx, &target)?;
        }
        Ok(())
    }

    fn add_schema(&self, record: Record) -> Result<()> {
        let schema = self.parse_schema(&record)?;
        let Some(old) = self.find(SCHEMA_TYPE, &record.id)? else {
            self.storage.create(self.table(), &record)?;
            self.schemas.remove(&record.id);
            info!(data_type = %record.id, version = schema.version().unwrap_or_default(), "schema added");
            return self.journal_write(None, Some(&record));
        };
        let old_schema = SchemaModel::from_value(&old.data)?;
        let old_ver = old_schema.version().unwrap_or_default();
        let new_ver = schema.version().unwrap_or_default();
        if Version::parse(new_ver)? <= Version::parse(old_ver)? {
            return Err(Error::Conflict(format!(
                "schema `{}` exists at {old_ver}, a new version must be greater than {old_ver}, got {new_ver}",
                record.id
            )));
        }
        let archived = Record::new(
            SCHEMA_TYPE,
            archived_schema_id(&record.id, old_ver, self.divider()),
            old.version.as_str(),
            old.data.clone(),
        );
        self.storage.replace(self.table(), &archived)?;
        self.storage.replace(self.table(), &record)?;
        self.schemas.remove(&record.id);
        self.schemas.remove(&archived.id);
        info!(data_type = %record.id, archived = %archived.id, version = new_ver, "schema upgraded");
        self.journal_write(Some(&old), Some(&record))
    }

    /// Create or replace a record. Nothing is written or journaled when the content is
    /// unchanged.
    pub fn set(&self, record: Record) -> Result<()> {
        self.check_envelope(&record)?;
        let path = format!("{}/{}", record.data_type, record.id);
        self.locked(&path, || self.set_unlocked(record))
    }

    fn set_unlocked(&self, record: Record) -> Result<()> {
        let existing = self.find(&record.data_type, &record.id)?;
        if existing.as_ref() == Some(&record) {
            return Ok(());
        }
        if record.data_type == SCHEMA_TYPE {
            let same_version = match &existing {
                Some(old) => SchemaModel::from_value(&old.data)?.version() == record.data["version"].as_str(),
                None => false,
            };
            if !same_version {
                return self.add_schema(record);
            }
            self.parse_schema(&record)?;
            self.storage.replace(self.table(), &record)?;
            self.schemas.remove(&record.id);
            return self.journal_write(existing.as_ref(), Some(&record));
        }
        let schema = self.schema_of(&record)?;
        RecordValidator::validate(&schema, &record.data).map_err(|e| e.context(&record))?;
        self.check_refs(existing.as_ref(), &record, &schema)?;
        self.storage.replace(self.table(), &record)?;
        debug!(record = %record, "set");
        self.journal_write(existing.as_ref(), Some(&record))
    }

    /// Delete a record.
    ///
    /// A schema cannot be deleted while archived versions of it or records of its type
    /// exist; an archived schema cannot be deleted while records still declare it.
    pub fn delete(&self, data_type: &str, id: &str) -> Result<()> {
        self.locked(&format!("{data_type}/{id}"), || self.delete_unlocked(data_type, id))
    }

    fn delete_unlocked(&self, data_type: &str, id: &str) -> Result<()> {
        let before = self.get(data_type, id)?;
        if data_type != SCHEMA_TYPE {
            self.storage.delete(self.table(), &Keys::record(data_type, id))?;
            debug!(record = %before, "deleted");
            return self.journal_write(Some(&before), None);
        }

        if let Some((base, version)) = id.rsplit_once(self.divider()) {
            if self.list(base)?.iter().any(|r| r.version == version) {
                return Err(Error::Conflict(format!(
                    "records of `{base}` still declare version {version}"
                )));
            }
            self.storage.delete(self.table(), &Keys::record(SCHEMA_TYPE, id))?;
            self.schemas.remove(id);
            info!(schema = id, "archived schema deleted");
            return Ok(());
        }
        let prefix = format!("{id}{}", self.divider());
        if let Some(archived) = self.list(SCHEMA_TYPE)?.iter().find(|r| r.id.starts_with(&prefix)) {
            return Err(Error::Conflict(format!(
                "schema `{id}` still has archived version `{}`",
                archived.id
            )));
        }
        if !self.list(id)?.is_empty() {
            return Err(Error::Conflict(format!("records of `{id}` still exist")));
        }
        self.storage.delete(self.table(), &Keys::record(SCHEMA_TYPE, id))?;
        self.schemas.remove(id);
        info!(schema = id, "schema deleted");
        self.journal_write(Some(&before), None)
    }

    /// Write (`Some`) or delete (`None`) the value at `id/path` of a `data_type` record.
    ///
    /// Patching `__ver` moves the record to another schema version it satisfies. A patch that
    /// leaves the record unchanged fails with `NotModified` and is not journaled.
    pub fn patch(&self, data_type: &str, id_path: &str, value: Option<Value>) -> Result<Record> {
        self.patch_checked(data_type, id_path, value, true)
    }

    /// Patch written by index maintenance. The entry may describe a state the referenced
    /// record has already left, so references are not checked.
    pub(crate) fn patch_index(&self, data_type: &str, id_path: &str, value: Option<Value>) -> Result<Record> {
        self.patch_checked(data_type, id_path, value, false)
    }

    fn patch_checked(&self, data_type: &str, id_path: &str, value: Option<Value>, check_refs: bool) -> Result<Record> {
        let Some((id, path)) = id_path
            .trim_start_matches('/')
            .split_once('/')
            .filter(|(id, path)| !id.is_empty() && !path.trim_matches('/').is_empty())
        else {
            return Err(Error::bad_request(format!(
                "patch of `{data_type}/{id_path}` needs `id/path`"
            )));
        };
        if data_type == SCHEMA_TYPE {
            return Err(Error::bad_request("schemas are replaced with add or set, not patched"));
        }
        let query = PathQuery::new(data_type, id, path)?;
        if query.cmd != PathCmd::Value || query.has_wildcard() {
            return Err(Error::bad_request(format!(
                "patch path `{path}` must be concrete and without a command"
            )));
        }
        let lock_path = format!("{data_type}/{id}/{}", query.attr_path());
        self.locked(&lock_path, || self.patch_unlocked(&query, value, check_refs))
            .map_err(|e| e.context(format!("patch {data_type}/{id_path}")))
    }

    fn patch_unlocked(&self, query: &PathQuery, value: Option<Value>, check_refs: bool) -> Result<Record> {
        let before = self.get(&query.data_type, &query.id)?;
        let mut after = before.clone();
        match query.attr_path().as_str() {
            KEY_VER => {
                let Some(version) = value.as_ref().and_then(Value::as_str) else {
                    return Err(Error::bad_request(format!("`{KEY_VER}` needs a version string")));
                };
                Version::parse(version)?;
                if version == before.version {
                    return Err(Error::not_modified(format!("{before} already at {version}")));
                }
                after.version = version.to_string();
            }
            KEY_ID | KEY_TYPE => {
                return Err(Error::bad_request(format!(
                    "`{}` of a record cannot be patched",
                    query.attr_path()
                )))
            }
            _ => {
                let schema = self.schema_of(&before)?;
                set_data_on_path(&schema, &mut after.data, &query.segments, value)?;
                if after.data == before.data {
                    return Err(Error::not_modified(format!("{before} unchanged")));
                }
            }
        }
        let schema = self.schema_of(&after)?;
        RecordValidator::validate(&schema, &after.data).map_err(|e| e.context(&after))?;
        if check_refs {
            self.check_refs(Some(&before), &after, &schema)?;
        }
        self.storage.replace(self.table(), &after)?;
        debug!(record = %after, path = %query.attr_path(), "patched");
        self.journal_write(Some(&before), Some(&after))?;
        Ok(after)
    }
}

impl RecordSource for DataHandler {
    fn get_schema(&self, data_type: &str) -> Result<SchemaModel> {
        self.current_schema(data_type)
    }

    fn get_record(&self, data_type: &str, id: &str) -> Result<Record> {
        self.get(data_type, id)
    }

    fn archive_divider(&self) -> &str {
        self.divider()
    }
}
