// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::{debug, info};

use crate::autoindex::{discover, AutoIndex, CmtIndex, Subscriber, VersionIndex};
use crate::error::{Error, Result};
use crate::handler::DataHandler;
use crate::journal::{JournalEntry, JournalProcessor};
use crate::record::{Record, SCHEMA_TYPE};
use crate::schema::builtin::{CMT_INDEX_TYPE, CMT_SUBSCRIBER, VERSION_INDEX};
use crate::schema::SchemaModel;
use crate::value::Value;

/// Keeps subscription records in line with the index templates schemas declare.
///
/// Schema writes subscribe or unsubscribe templates. Writes of records whose schema declares
/// auto indexes replay the referenced records, so that a newly created or upgraded record
/// collects the back references that already exist.
#[derive(Debug, Default)]
pub struct SchemaChanges;

impl JournalProcessor for SchemaChanges {
    fn name(&self) -> &str {
        "schema changes"
    }

    fn handles_type(&self, handler: &DataHandler, data_type: &str) -> Result<bool> {
        if data_type == SCHEMA_TYPE {
            return Ok(true);
        }
        match handler.current_schema(data_type) {
            Ok(schema) => Ok(!discover(&schema).is_empty()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn process(
        &self,
        handler: &DataHandler,
        data_type: &str,
        data_id: &str,
        entry: &JournalEntry,
    ) -> Result<()> {
        if data_type != SCHEMA_TYPE {
            return backfill(handler, data_type, data_id, entry);
        }
        let before = entry.before.as_ref().map(schema_of).transpose()?;
        let after = entry.after.as_ref().map(schema_of).transpose()?;
        match (before, after) {
            (None, None) => Err(Error::not_modified(format!("empty entry on schema/{data_id}"))),
            (Some(b), None) => unsubscribe_all(handler, &b, &[]),
            (None, Some(a)) => subscribe_all(handler, &a),
            (Some(b), Some(a)) => {
                let mut changed = false;
                if b.version() == a.version() {
                    changed |= changed_or_quiet(unsubscribe_all(handler, &b, &discover(&a)))?;
                }
                changed |= changed_or_quiet(subscribe_all(handler, &a))?;
                if !changed {
                    return Err(Error::not_modified(format!("indexes of `{data_id}` unchanged")));
                }
                Ok(())
            }
        }
    }
}

fn schema_of(v: &Value) -> Result<SchemaModel> {
    SchemaModel::from_value(&Record::from_value(v)?.data)
}

// `Ok(true)` for a change, `Ok(false)` for NotModified.
fn changed_or_quiet(r: Result<()>) -> Result<bool> {
    match r {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_modified() => Ok(false),
        Err(e) => Err(e),
    }
}

fn version_of(schema: &SchemaModel) -> Result<&str> {
    schema
        .version()
        .ok_or_else(|| Error::bad_request(format!("schema `{}` has no version", schema.name())))
}

fn subscribe_all(handler: &DataHandler, schema: &SchemaModel) -> Result<()> {
    let version = version_of(schema)?;
    let mut changed = false;
    for idx in discover(schema) {
        changed |= changed_or_quiet(subscribe(handler, schema.name(), version, &idx))?;
    }
    if !changed {
        return Err(Error::not_modified(format!("`{}` subscribes nothing new", schema.name())));
    }
    Ok(())
}

fn subscribe(handler: &DataHandler, data_type: &str, version: &str, idx: &AutoIndex) -> Result<()> {
    let content_type = &idx.content_type;
    let record = match handler.get(CMT_INDEX_TYPE, content_type) {
        Ok(r) => r,
        Err(e) if e.is_not_found() => {
            let mut cmt = CmtIndex::new(content_type);
            cmt.subscribe(data_type, version, &idx.index_template);
            info!(content_type = %content_type, subscriber = data_type, version, template = %idx.index_template, "created subscription");
            return handler.add(cmt.to_record()?);
        }
        Err(e) => return Err(e),
    };
    let cmt = CmtIndex::from_record(&record)?;
    if cmt.has_template(data_type, version, &idx.index_template) {
        return Err(Error::not_modified(format!(
            "{content_type} already indexed by {data_type}@{version}"
        )));
    }
    info!(content_type = %content_type, subscriber = data_type, version, template = %idx.index_template, "adding subscription");
    let sub_path = format!("{content_type}/{CMT_SUBSCRIBER}[{data_type}]");
    let Some(sub) = cmt.cmt_subscriber.get(data_type) else {
        let sub = Subscriber::new(data_type, version, &idx.index_template);
        return handler
            .patch(CMT_INDEX_TYPE, &sub_path, Some(Value::from_serialize(&sub)?))
            .map(|_| ());
    };
    let mut ver = sub
        .version_index
        .get(version)
        .cloned()
        .unwrap_or_else(|| VersionIndex {
            version: version.to_string(),
            index_template: vec![],
        });
    ver.index_template.push(idx.index_template.clone());
    handler
        .patch(
            CMT_INDEX_TYPE,
            &format!("{sub_path}/{VERSION_INDEX}[{version}]"),
            Some(Value::from_serialize(&ver)?),
        )
        .map(|_| ())
}

// Drop the templates of `schema` that are not in `keep`.
fn unsubscribe_all(handler: &DataHandler, schema: &SchemaModel, keep: &[AutoIndex]) -> Result<()> {
    let version = version_of(schema)?;
    let mut changed = false;
    for idx in discover(schema) {
        if keep.contains(&idx) {
            continue;
        }
        let removed = unsubscribe(handler, schema.name(), version, &idx);
        changed |= match removed {
            Err(e) if e.is_not_found() => false,
            r => changed_or_quiet(r)?,
        };
    }
    if !changed {
        return Err(Error::not_modified(format!("`{}` had no subscription to drop", schema.name())));
    }
    Ok(())
}

fn unsubscribe(handler: &DataHandler, data_type: &str, version: &str, idx: &AutoIndex) -> Result<()> {
    let content_type = &idx.content_type;
    let cmt = CmtIndex::from_record(&handler.get(CMT_INDEX_TYPE, content_type)?)?;
    let Some(ver) = cmt
        .cmt_subscriber
        .get(data_type)
        .and_then(|s| s.version_index.get(version))
    else {
        return Err(Error::not_modified(format!("{data_type}@{version} not subscribed")));
    };
    let path = format!("{content_type}/{CMT_SUBSCRIBER}[{data_type}]/{VERSION_INDEX}[{version}]");
    let mut ver = ver.clone();
    ver.index_template.retain(|t| *t != idx.index_template);
    info!(content_type = %content_type, subscriber = data_type, version, template = %idx.index_template, "removing subscription");
    let value = if ver.index_template.is_empty() {
        None
    } else {
        Some(Value::from_serialize(&ver)?)
    };
    handler.patch(CMT_INDEX_TYPE, &path, value).map(|_| ())
}

// A record that starts to declare indexes, by creation or by a version change, replays the
// records it refers to so they register in it.
fn backfill(handler: &DataHandler, data_type: &str, data_id: &str, entry: &JournalEntry) -> Result<()> {
    let Some(after) = &entry.after else {
        return Err(Error::not_modified(format!("{data_type}/{data_id} deleted")));
    };
    let after = Record::from_value(after)?;
    if let Some(before) = &entry.before {
        if Record::from_value(before)?.version == after.version {
            return Err(Error::not_modified(format!("{data_type}/{data_id} kept its version")));
        }
    }
    let schema = handler.schema_of(&after)?;
    let mut content_types: Vec<String> = discover(&schema).into_iter().map(|i| i.content_type).collect();
    content_types.sort();
    content_types.dedup();
    let mut replayed = 0;
    for content_type in content_types {
        for record in handler.list(&content_type)? {
            handler
                .journal()
                .append(&content_type, &record.id, None, Some(record.to_value()))?;
            replayed += 1;
        }
    }
    if replayed == 0 {
        return Err(Error::not_modified(format!("nothing refers to {data_type}/{data_id}")));
    }
    debug!(data_type, data_id, replayed, "replayed referenced records");
    Ok(())
}
