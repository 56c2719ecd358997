// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Paged, per-record changelog of `(before, after)` snapshots.
//!
//! Each `(type, id)` owns a sequence of pages numbered from 1. Entries are appended to the
//! last page until it holds `pageCapacity` entries, then a new page opens. Consuming an entry
//! moves it from the page's `active` list to its `archived` list; entries are never reordered
//! or deleted.

mod cmt_index;
mod processor;
mod schema_changes;

pub use cmt_index::CmtIndexChanges;
pub use processor::{JournalProcessor, JournalWorker};
pub use schema_changes::SchemaChanges;

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::storage::{Keys, Storage};
use crate::value::Value;
use crate::Rc;

/// Record type of stored journal pages.
pub const JOURNAL_TYPE: &str = "journal";
pub const JOURNAL_VERSION: &str = "0.0.1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub page: u64,
    pub idx: u64,
    /// RFC 3339 append time.
    pub time: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalPage {
    pub data_type: String,
    pub data_id: String,
    pub idx: u64,
    #[serde(default)]
    pub active: Vec<JournalEntry>,
    #[serde(default)]
    pub archived: Vec<JournalEntry>,
}

impl JournalPage {
    fn new(data_type: &str, data_id: &str, idx: u64) -> Self {
        Self {
            data_type: data_type.to_string(),
            data_id: data_id.to_string(),
            idx,
            active: vec![],
            archived: vec![],
        }
    }

    pub fn page_id(data_type: &str, data_id: &str, idx: u64) -> String {
        format!("dataType:{data_type}_dataId:{data_id}_page:{idx}")
    }

    /// Split a page id back into `(type, id, page)`.
    pub fn parse_id(page_id: &str) -> Option<(String, String, u64)> {
        let rest = page_id.strip_prefix("dataType:")?;
        let (rest, page) = rest.rsplit_once("_page:")?;
        let (data_type, data_id) = rest.split_once("_dataId:")?;
        Some((data_type.to_string(), data_id.to_string(), page.parse().ok()?))
    }

    pub fn id(&self) -> String {
        Self::page_id(&self.data_type, &self.data_id, self.idx)
    }

    /// Entries ever appended to this page.
    pub fn len(&self) -> usize {
        self.active.len() + self.archived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn last_idx(&self) -> u64 {
        self.active
            .iter()
            .chain(self.archived.iter())
            .map(|e| e.idx)
            .max()
            .unwrap_or(0)
    }

    fn to_record(&self) -> Result<Record> {
        Ok(Record::new(
            JOURNAL_TYPE,
            self.id(),
            JOURNAL_VERSION,
            Value::from_serialize(self)?,
        ))
    }

    fn from_record(record: &Record) -> Result<JournalPage> {
        Ok(record.data.to_typed()?)
    }
}

// First page that may still hold active entries, and the page appends go to.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    head: u64,
    tail: u64,
}

/// Journal persisted as page records in the journal table of a [`Storage`].
pub struct Journal {
    storage: Rc<dyn Storage>,
    table: String,
    capacity: usize,
    cursors: Mutex<BTreeMap<(String, String), Cursor>>,
}

impl core::fmt::Debug for Journal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Journal")
            .field("table", &self.table)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Journal {
    /// Open the journal kept in `storage`, picking up pages written earlier.
    pub fn new(storage: Rc<dyn Storage>, config: &Config) -> Result<Journal> {
        if config.journal.page_capacity == 0 {
            return Err(Error::bad_request("journal page capacity must be positive"));
        }
        let journal = Journal {
            storage,
            table: config.tables.journal.clone(),
            capacity: config.journal.page_capacity,
            cursors: Mutex::new(BTreeMap::new()),
        };
        journal.load_cursors()?;
        Ok(journal)
    }

    fn load_cursors(&self) -> Result<()> {
        let mut cursors = self.cursors.lock();
        for record in self.storage.get(&self.table, &Keys::all(JOURNAL_TYPE))? {
            let Some((data_type, data_id, page)) = JournalPage::parse_id(&record.id) else {
                debug!(id = %record.id, "ignoring unrecognized journal page");
                continue;
            };
            let cursor = cursors.entry((data_type, data_id)).or_insert(Cursor {
                head: page,
                tail: page,
            });
            cursor.head = cursor.head.min(page);
            cursor.tail = cursor.tail.max(page);
        }
        Ok(())
    }

    fn load_page(&self, data_type: &str, data_id: &str, idx: u64) -> Result<JournalPage> {
        let page_id = JournalPage::page_id(data_type, data_id, idx);
        match self
            .storage
            .get(&self.table, &Keys::record(JOURNAL_TYPE, &page_id))?
            .first()
        {
            Some(record) => JournalPage::from_record(record),
            None => Err(Error::not_found(format!("journal page `{page_id}`"))),
        }
    }

    fn store_page(&self, page: &JournalPage) -> Result<()> {
        self.storage.replace(&self.table, &page.to_record()?)
    }

    /// Append a change of `data_type/data_id`; returns the page it landed on.
    pub fn append(
        &self,
        data_type: &str,
        data_id: &str,
        before: Option<Value>,
        after: Option<Value>,
    ) -> Result<u64> {
        if before.is_none() && after.is_none() {
            return Err(Error::bad_request(format!(
                "journal entry of {data_type}/{data_id} needs a before or an after"
            )));
        }
        let mut cursors = self.cursors.lock();
        let key = (data_type.to_string(), data_id.to_string());
        let cursor = cursors.get(&key).copied();
        let mut page = match cursor {
            None => JournalPage::new(data_type, data_id, 1),
            Some(c) => {
                let tail = self.load_page(data_type, data_id, c.tail)?;
                if tail.len() >= self.capacity {
                    JournalPage::new(data_type, data_id, c.tail + 1)
                } else {
                    tail
                }
            }
        };
        let entry = JournalEntry {
            page: page.idx,
            idx: page.last_idx() + 1,
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            before,
            after,
        };
        debug!(data_type, data_id, page = entry.page, idx = entry.idx, "journal append");
        page.active.push(entry);
        self.store_page(&page)?;
        cursors.insert(
            key,
            Cursor {
                head: cursor.map(|c| c.head).unwrap_or(page.idx),
                tail: page.idx,
            },
        );
        Ok(page.idx)
    }

    /// Oldest active entry of `data_type/data_id`, or `NotFound` when all are consumed.
    pub fn next_entry(&self, data_type: &str, data_id: &str) -> Result<JournalEntry> {
        let mut cursors = self.cursors.lock();
        let key = (data_type.to_string(), data_id.to_string());
        let Some(cursor) = cursors.get_mut(&key) else {
            return Err(Error::not_found(format!("journal of {data_type}/{data_id}")));
        };
        loop {
            let page = self.load_page(data_type, data_id, cursor.head)?;
            if let Some(entry) = page.active.first() {
                return Ok(entry.clone());
            }
            if cursor.head >= cursor.tail {
                return Err(Error::not_found(format!(
                    "no active journal entry of {data_type}/{data_id}"
                )));
            }
            cursor.head += 1;
        }
    }

    /// Move `entry` from active to archived. Archiving an entry twice is a no-op.
    pub fn archive(&self, data_type: &str, data_id: &str, entry: &JournalEntry) -> Result<()> {
        let _guard = self.cursors.lock();
        let mut page = self.load_page(data_type, data_id, entry.page)?;
        let Some(pos) = page.active.iter().position(|e| e.idx == entry.idx) else {
            debug!(data_type, data_id, page = entry.page, idx = entry.idx, "entry already archived");
            return Ok(());
        };
        let consumed = page.active.remove(pos);
        page.archived.push(consumed);
        self.store_page(&page)
    }

    pub fn page(&self, data_type: &str, data_id: &str, idx: u64) -> Result<JournalPage> {
        let _guard = self.cursors.lock();
        self.load_page(data_type, data_id, idx)
    }

    /// Types with at least one journal page.
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .cursors
            .lock()
            .keys()
            .map(|(t, _)| t.clone())
            .collect();
        types.dedup();
        types
    }

    pub fn list_ids(&self, data_type: &str) -> Vec<String> {
        self.cursors
            .lock()
            .keys()
            .filter(|(t, _)| t == data_type)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Page numbers of `data_type/data_id`, oldest first.
    pub fn list_pages(&self, data_type: &str, data_id: &str) -> Vec<u64> {
        match self
            .cursors
            .lock()
            .get(&(data_type.to_string(), data_id.to_string()))
        {
            Some(c) => (1..=c.tail).collect(),
            None => vec![],
        }
    }

    /// Records that still have active entries, in `(type, id)` order.
    pub fn pending(&self) -> Result<Vec<(String, String)>> {
        let keys: Vec<(String, String)> = self.cursors.lock().keys().cloned().collect();
        let mut pending = vec![];
        for (data_type, data_id) in keys {
            match self.next_entry(&data_type, &data_id) {
                Ok(_) => pending.push((data_type, data_id)),
                Err(e) if e.is_not_found() => (),
                Err(e) => return Err(e),
            }
        }
        Ok(pending)
    }
}
