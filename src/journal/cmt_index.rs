// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::{debug, warn};

use crate::autoindex::CmtIndex;
use crate::error::{Error, Result};
use crate::handler::DataHandler;
use crate::journal::{JournalEntry, JournalProcessor};
use crate::record::Record;
use crate::schema::builtin::CMT_INDEX_TYPE;
use crate::template::Template;
use crate::value::Value;

/// Writes and removes back references for every subscribed index template.
///
/// For a change of a referenced record, each template is evaluated on the before and the
/// after snapshot. The result `<targetId>/<path>` plus `[<recordId>]` names the membership to
/// drop and the one to add. Changes of a subscription record replay every record of the
/// indexed type so that existing data is indexed too.
#[derive(Debug, Default)]
pub struct CmtIndexChanges;

impl JournalProcessor for CmtIndexChanges {
    fn name(&self) -> &str {
        "cmtIndex changes"
    }

    fn handles_type(&self, handler: &DataHandler, data_type: &str) -> Result<bool> {
        if data_type == CMT_INDEX_TYPE {
            return Ok(true);
        }
        match handler.get(CMT_INDEX_TYPE, data_type) {
            Ok(_) => Ok(true),
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
        if data_type == CMT_INDEX_TYPE {
            return subscription_change(handler, data_id, entry);
        }
        data_change(handler, data_type, data_id, entry)
    }
}

fn subscription_change(handler: &DataHandler, indexed_type: &str, entry: &JournalEntry) -> Result<()> {
    let Some(after) = &entry.after else {
        return Err(Error::not_modified(format!("subscription of {indexed_type} removed")));
    };
    let after = CmtIndex::from_record(&Record::from_value(after)?)?;
    if let Some(before) = &entry.before {
        let before = CmtIndex::from_record(&Record::from_value(before)?)?;
        let added = after
            .templates()
            .any(|(ty, ver, t)| !before.has_template(ty, ver, t));
        if !added {
            return Err(Error::not_modified(format!(
                "no template added for {indexed_type}"
            )));
        }
    }
    replay(handler, indexed_type)
}

fn replay(handler: &DataHandler, data_type: &str) -> Result<()> {
    let records = handler.list(data_type)?;
    if records.is_empty() {
        return Err(Error::not_modified(format!("no {data_type} record to index")));
    }
    for record in &records {
        handler
            .journal()
            .append(data_type, &record.id, None, Some(record.to_value()))?;
    }
    debug!(data_type, count = records.len(), "replayed records for new subscription");
    Ok(())
}

// Snapshot side of an entry. Unreadable snapshots are logged and skipped.
fn snapshot(data_type: &str, data_id: &str, side: &str, v: Option<&Value>) -> Option<Record> {
    let v = v?;
    match Record::from_value(v) {
        Ok(r) => Some(r),
        Err(e) => {
            warn!(data_type, data_id, side, error = %e, "unreadable journal snapshot");
            None
        }
    }
}

fn index_path(template: &Template, record: &Record) -> Result<String> {
    Ok(format!("{}[{}]", template.build(&record.data)?, record.id))
}

fn data_change(handler: &DataHandler, data_type: &str, data_id: &str, entry: &JournalEntry) -> Result<()> {
    let cmt = CmtIndex::from_record(&handler.get(CMT_INDEX_TYPE, data_type)?)?;
    let before = snapshot(data_type, data_id, "before", entry.before.as_ref());
    let after = snapshot(data_type, data_id, "after", entry.after.as_ref());
    if before.is_none() && after.is_none() {
        return Err(Error::not_modified(format!(
            "{data_type}/{data_id} entry {}/{} has no usable snapshot",
            entry.page, entry.idx
        )));
    }

    let mut changed = false;
    for (subscriber, version, raw) in cmt.templates() {
        let template = Template::parse(raw).map_err(|e| e.context(format!("{subscriber}@{version}")))?;
        let before_path = match &before {
            Some(r) => match index_path(&template, r) {
                Ok(p) => Some(p),
                Err(e) => {
                    debug!(data_type, data_id, template = raw, error = %e, "no index path before");
                    None
                }
            },
            None => None,
        };
        let after_path = match &after {
            Some(r) => match index_path(&template, r) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(data_type, data_id, template = raw, error = %e, "no index path after");
                    None
                }
            },
            None => None,
        };
        if before_path == after_path {
            continue;
        }
        if let Some(p) = &before_path {
            changed |= set_index(handler, subscriber, version, p, None)?;
        }
        if let Some(p) = &after_path {
            changed |= set_index(handler, subscriber, version, p, Some(Value::from(data_id)))?;
        }
    }
    if !changed {
        return Err(Error::not_modified(format!("indexes of {data_type}/{data_id} unchanged")));
    }
    Ok(())
}

// Patch `<targetId>/<path>` of a `data_type` record at `version`. Missing targets and targets
// at another version are skipped.
fn set_index(
    handler: &DataHandler,
    data_type: &str,
    version: &str,
    path: &str,
    value: Option<Value>,
) -> Result<bool> {
    let Some((target_id, rest)) = path.split_once('/').filter(|(id, rest)| !id.is_empty() && !rest.is_empty()) else {
        warn!(data_type, path, "index path has no target record");
        return Ok(false);
    };
    let target = match handler.get(data_type, target_id) {
        Ok(t) => t,
        Err(e) if e.is_not_found() => {
            warn!(data_type, target_id, path, "index target does not exist");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    if target.version != version {
        debug!(data_type, target_id, version = %target.version, expected = version, "index target at another version");
        return Ok(false);
    }
    let adding = value.is_some();
    match handler.patch_index(data_type, &format!("{target_id}/{rest}"), value) {
        Ok(_) => {
            debug!(data_type, target_id, path = rest, adding, "index updated");
            Ok(true)
        }
        Err(e) if e.is_not_modified() || e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
