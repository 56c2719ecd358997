// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::Result;
use schemapath::*;

use crate::common::{add, handler, settle};

const COUNTER: &str = r#"{"__type": "schema", "__id": "counter", "__ver": "0.0.1", "data": {
    "name": "counter", "version": "0.0.1",
    "properties": {"name": {"type": "string"}, "n": {"type": "integer"}}
}}"#;

#[test]
fn pages_roll_over_at_capacity() -> Result<()> {
    let h = handler()?;
    add(&h, COUNTER)?;
    add(
        &h,
        r#"{"__type": "counter", "__id": "c1", "__ver": "0.0.1", "data": {"name": "c1", "n": 0}}"#,
    )?;
    for n in 1..=10 {
        h.patch("counter", "c1/n", Some(Value::from(n)))?;
    }

    let journal = h.journal();
    assert_eq!(journal.list_pages("counter", "c1"), vec![1, 2]);
    let first = journal.page("counter", "c1", 1)?;
    let second = journal.page("counter", "c1", 2)?;
    assert_eq!(first.active.len(), 10);
    assert_eq!(second.active.len(), 1);
    assert_eq!(second.active[0].idx, 1);
    assert_eq!(second.active[0].after.as_ref().map(|a| a["data"]["n"].clone()), Some(Value::from(10)));
    assert_eq!(second.active[0].before.as_ref().map(|b| b["data"]["n"].clone()), Some(Value::from(9)));

    // The first entry is the creation.
    assert!(first.active[0].before.is_none());
    assert!(journal.list_types().contains(&"counter".to_string()));
    assert_eq!(journal.list_ids("counter"), vec!["c1".to_string()]);
    Ok(())
}

#[test]
fn worker_archives_in_order() -> Result<()> {
    let h = handler()?;
    add(&h, COUNTER)?;
    add(
        &h,
        r#"{"__type": "counter", "__id": "c1", "__ver": "0.0.1", "data": {"name": "c1", "n": 0}}"#,
    )?;
    h.patch("counter", "c1/n", Some(Value::from(1)))?;

    // schema/counter and counter/c1 x2
    assert_eq!(settle(&h)?, 3);
    assert!(h.journal().pending()?.is_empty());
    let page = h.journal().page("counter", "c1", 1)?;
    assert!(page.active.is_empty());
    let order: Vec<u64> = page.archived.iter().map(|e| e.idx).collect();
    assert_eq!(order, vec![1, 2]);

    // Nothing left to do.
    assert_eq!(settle(&h)?, 0);
    Ok(())
}

#[test]
fn journal_survives_reopen() -> Result<()> {
    let storage: std::sync::Arc<dyn Storage> = std::sync::Arc::new(MemoryStorage::new());
    let config = Config::from_json_str(r#"{"journal": {"pageCapacity": 2}}"#)?;
    {
        let journal = Journal::new(storage.clone(), &config)?;
        for n in 0..3 {
            journal.append("counter", "c1", None, Some(Value::from(n)))?;
        }
    }
    let journal = Journal::new(storage, &config)?;
    assert_eq!(journal.list_pages("counter", "c1"), vec![1, 2]);
    let page = journal.append("counter", "c1", None, Some(Value::from(3)))?;
    assert_eq!(page, 2);
    assert_eq!(journal.page("counter", "c1", 2)?.active.len(), 2);
    assert_eq!(journal.next_entry("counter", "c1")?.after, Some(Value::from(0)));
    Ok(())
}

struct Failing;

impl JournalProcessor for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn handles_type(&self, _: &DataHandler, data_type: &str) -> schemapath::Result<bool> {
        Ok(data_type == "counter")
    }

    fn process(&self, _: &DataHandler, _: &str, _: &str, _: &JournalEntry) -> schemapath::Result<()> {
        Err(Error::bad_request("refused"))
    }
}

#[test]
fn failed_entries_stay_active() -> Result<()> {
    let h = handler()?;
    add(&h, COUNTER)?;
    add(
        &h,
        r#"{"__type": "counter", "__id": "c1", "__ver": "0.0.1", "data": {"name": "c1", "n": 0}}"#,
    )?;
    let worker = JournalWorker::with_processors(&h, vec![Box::new(Failing)]);
    assert!(worker.process_record("counter", "c1").is_err());
    assert_eq!(h.journal().page("counter", "c1", 1)?.active.len(), 1);
    assert_eq!(worker.process_record("schema", "counter")?, 1);
    Ok(())
}
