// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::Result;
use schemapath::*;

use crate::common::{add, handler, record, settle, strings};

const LEAF: &str = r#"{"__type": "schema", "__id": "leaf", "__ver": "0.0.1", "data": {
    "name": "leaf", "version": "0.0.1",
    "properties": {
        "name": {"type": "string"},
        "layer1": {"type": "string", "contentMediaType": "inventory/layer1", "required": false}
    }
}}"#;

// Same shape as LEAF, but `layer1` is a plain name rather than a reference.
const LOOSE_LEAF: &str = r#"{"__type": "schema", "__id": "leaf", "__ver": "0.0.1", "data": {
    "name": "leaf", "version": "0.0.1",
    "properties": {
        "name": {"type": "string"},
        "layer1": {"type": "string", "required": false}
    }
}}"#;

const LAYER1: &str = r#"{"__type": "schema", "__id": "layer1", "__ver": "0.0.1", "data": {
    "name": "layer1", "version": "0.0.1",
    "properties": {
        "name": {"type": "string"},
        "leafs": {"type": "array", "required": false, "items": {
            "type": "string", "contentMediaType": "inventory/leaf", "indexTemplate": "{layer1}/leafs"
        }}
    }
}}"#;

const LAYER1_PLAIN: &str = r#"{"__type": "schema", "__id": "layer1", "__ver": "0.0.1", "data": {
    "name": "layer1", "version": "0.0.1",
    "properties": {
        "name": {"type": "string"},
        "leafs": {"type": "array", "required": false, "items": {
            "type": "string", "contentMediaType": "inventory/leaf"
        }}
    }
}}"#;

fn layer1(id: &str, version: &str) -> Result<Record> {
    record(&format!(
        r#"{{"__type": "layer1", "__id": "{id}", "__ver": "{version}", "data": {{"name": "{id}"}}}}"#
    ))
}

fn leaf(id: &str, parent: &str) -> Result<Record> {
    record(&format!(
        r#"{{"__type": "leaf", "__id": "{id}", "__ver": "0.0.1", "data": {{"name": "{id}", "layer1": "{parent}"}}}}"#
    ))
}

fn leafs_of(h: &DataHandler, id: &str) -> Result<Vec<String>> {
    let data = h.get("layer1", id)?.data;
    match data.get("leafs") {
        Some(v) => strings(v),
        None => Ok(vec![]),
    }
}

// Entries ever journaled for one record, across its pages.
fn journal_len(h: &DataHandler, data_type: &str, id: &str) -> Result<usize> {
    let mut n = 0;
    for page in h.journal().list_pages(data_type, id) {
        n += h.journal().page(data_type, id, page)?.len();
    }
    Ok(n)
}

fn indexed() -> Result<DataHandler> {
    let h = handler()?;
    add(&h, LEAF)?;
    add(&h, LAYER1)?;
    settle(&h)?;
    Ok(h)
}

#[test]
fn leafs_register_in_their_layer1() -> Result<()> {
    let h = indexed()?;
    h.add(layer1("layer1-01", "0.0.1")?)?;
    settle(&h)?;
    for id in ["leaf-1", "leaf-2", "leaf-3"] {
        h.add(leaf(id, "layer1-01")?)?;
        settle(&h)?;
    }
    assert_eq!(leafs_of(&h, "layer1-01")?, vec!["leaf-1", "leaf-2", "leaf-3"]);
    assert!(h.journal().pending()?.is_empty());

    let names = h.query("layer1/layer1-01/leafs[*]/name")?;
    assert_eq!(strings(&names)?, vec!["leaf-1", "leaf-2", "leaf-3"]);
    assert_eq!(
        h.query("leaf/leaf-2/layer1/leafs[leaf-3]?ref")?,
        Value::from("leaf-3")
    );

    let cmt = CmtIndex::from_record(&h.get("cmtIdx", "leaf")?)?;
    assert!(cmt.has_template("layer1", "0.0.1", "{layer1}/leafs"));
    Ok(())
}

#[test]
fn moves_and_deletes_update_the_index() -> Result<()> {
    let h = indexed()?;
    h.add(layer1("layer1-01", "0.0.1")?)?;
    h.add(layer1("layer1-02", "0.0.1")?)?;
    for id in ["leaf-1", "leaf-2", "leaf-3"] {
        h.add(leaf(id, "layer1-01")?)?;
    }
    settle(&h)?;
    assert_eq!(leafs_of(&h, "layer1-01")?, vec!["leaf-1", "leaf-2", "leaf-3"]);

    h.delete("leaf", "leaf-2")?;
    h.patch("leaf", "leaf-3/layer1", Some(Value::from("layer1-02")))?;
    settle(&h)?;
    assert_eq!(leafs_of(&h, "layer1-01")?, vec!["leaf-1"]);
    assert_eq!(leafs_of(&h, "layer1-02")?, vec!["leaf-3"]);

    h.patch("leaf", "leaf-1/layer1", None)?;
    settle(&h)?;
    assert!(leafs_of(&h, "layer1-01")?.is_empty());
    Ok(())
}

#[test]
fn late_targets_are_backfilled() -> Result<()> {
    let h = handler()?;
    add(&h, LOOSE_LEAF)?;
    add(&h, LAYER1)?;
    settle(&h)?;
    h.add(leaf("leaf-9", "layer1-09")?)?;
    settle(&h)?;
    assert!(h.get("layer1", "layer1-09").is_err());

    h.add(layer1("layer1-09", "0.0.1")?)?;
    settle(&h)?;
    assert_eq!(leafs_of(&h, "layer1-09")?, vec!["leaf-9"]);
    Ok(())
}

#[test]
fn replaying_the_journal_changes_nothing() -> Result<()> {
    let h = indexed()?;
    h.add(layer1("layer1-01", "0.0.1")?)?;
    for id in ["leaf-1", "leaf-2"] {
        h.add(leaf(id, "layer1-01")?)?;
    }
    settle(&h)?;
    let before = h.list("layer1")?;
    let journaled = journal_len(&h, "layer1", "layer1-01")?;
    assert!(journaled > 0);

    for r in h.list("leaf")? {
        h.journal().append("leaf", &r.id, None, Some(r.to_value()))?;
        h.journal().append("leaf", &r.id, Some(r.to_value()), Some(r.to_value()))?;
    }
    assert!(settle(&h)? >= 4);
    assert_eq!(h.list("layer1")?, before);
    // No index write was attempted, so nothing new was journaled for the target.
    assert_eq!(journal_len(&h, "layer1", "layer1-01")?, journaled);
    assert!(h.journal().pending()?.is_empty());
    Ok(())
}

#[test]
fn dangling_references_are_rejected() -> Result<()> {
    let h = indexed()?;
    h.add(layer1("layer1-01", "0.0.1")?)?;
    assert_eq!(h.add(leaf("leaf-0", "nope")?).err().map(|e| e.status()), Some(400));
    assert!(h.get("leaf", "leaf-0").err().map(|e| e.is_not_found()).unwrap_or(false));

    h.add(leaf("leaf-1", "layer1-01")?)?;
    let moved = h.patch("leaf", "leaf-1/layer1", Some(Value::from("layer1-09")));
    assert_eq!(moved.err().map(|e| e.status()), Some(400));
    let mut replaced = h.get("leaf", "leaf-1")?;
    replaced.data = Value::from_json_str(r#"{"name": "leaf-1", "layer1": "layer1-09"}"#)?;
    assert_eq!(h.set(replaced).err().map(|e| e.status()), Some(400));
    assert_eq!(h.get("leaf", "leaf-1")?.data["layer1"], Value::from("layer1-01"));
    Ok(())
}

#[test]
fn members_must_sit_at_their_index_path() -> Result<()> {
    let h = indexed()?;
    h.add(layer1("layer1-01", "0.0.1")?)?;
    h.add(layer1("layer1-02", "0.0.1")?)?;
    h.add(leaf("leaf-1", "layer1-01")?)?;
    settle(&h)?;

    // leaf-1 registers under layer1-01/leafs, not under layer1-02.
    let listed = h.patch("layer1", "layer1-02/leafs[leaf-1]", Some(Value::from("leaf-1")));
    assert_eq!(listed.err().map(|e| e.status()), Some(400));
    let listing = record(
        r#"{"__type": "layer1", "__id": "layer1-03", "__ver": "0.0.1", "data": {"name": "layer1-03", "leafs": ["leaf-1"]}}"#,
    )?;
    assert_eq!(h.add(listing).err().map(|e| e.status()), Some(400));
    assert!(leafs_of(&h, "layer1-02")?.is_empty());
    assert_eq!(leafs_of(&h, "layer1-01")?, vec!["leaf-1"]);
    Ok(())
}

#[test]
fn stale_members_do_not_block_other_writes() -> Result<()> {
    let h = indexed()?;
    h.add(layer1("layer1-01", "0.0.1")?)?;
    h.add(leaf("leaf-1", "layer1-01")?)?;
    settle(&h)?;

    // Deleted but not yet taken out of the index.
    h.delete("leaf", "leaf-1")?;
    h.patch("layer1", "layer1-01/name", Some(Value::from("renamed")))?;
    assert_eq!(leafs_of(&h, "layer1-01")?, vec!["leaf-1"]);
    settle(&h)?;
    assert!(leafs_of(&h, "layer1-01")?.is_empty());
    Ok(())
}

#[test]
fn a_failing_record_does_not_hold_up_the_others() -> Result<()> {
    let h = indexed()?;
    h.add(layer1("layer1-01", "0.0.1")?)?;
    settle(&h)?;

    // The template builds `layer1-01/name/leafs[leaf-a]`, which cannot be written.
    let broken = leaf("leaf-a", "layer1-01/name")?;
    h.journal().append("leaf", "leaf-a", None, Some(broken.to_value()))?;
    h.add(leaf("leaf-b", "layer1-01")?)?;

    assert!(settle(&h).is_err());
    assert_eq!(leafs_of(&h, "layer1-01")?, vec!["leaf-b"]);
    assert_eq!(
        h.journal().pending()?,
        vec![("leaf".to_string(), "leaf-a".to_string())]
    );
    Ok(())
}

#[test]
fn schema_upgrade_archives_and_reindexes() -> Result<()> {
    let h = handler()?;
    add(&h, LEAF)?;
    add(&h, LAYER1_PLAIN)?;
    h.add(layer1("layer1-01", "0.0.1")?)?;
    h.add(layer1("layer1-02", "0.0.1")?)?;
    h.add(leaf("leaf-1", "layer1-01")?)?;
    settle(&h)?;
    assert!(h.get("cmtIdx", "leaf").is_err());
    assert!(leafs_of(&h, "layer1-01")?.is_empty());

    let upgrade = LAYER1.replace("0.0.1", "0.0.2");
    add(&h, &upgrade)?;
    settle(&h)?;

    // The old version stays reachable under its archived id.
    let archived = h.get("schema", "layer1__0.0.1")?;
    assert_eq!(archived.data["version"], Value::from("0.0.1"));
    assert_eq!(h.query("layer1/layer1-02/name")?, Value::from("layer1-02"));

    // New records must use the current version, and the old version cannot come back.
    assert_eq!(h.add(layer1("layer1-03", "0.0.1")?).err().map(|e| e.status()), Some(400));
    assert_eq!(h.add(record(LAYER1_PLAIN)?).err().map(|e| e.status()), Some(409));

    // Records at the old version are not index targets until they move.
    assert!(leafs_of(&h, "layer1-01")?.is_empty());
    h.patch("layer1", "layer1-01/__ver", Some(Value::from("0.0.2")))?;
    settle(&h)?;
    assert_eq!(h.get("layer1", "layer1-01")?.version, "0.0.2");
    assert_eq!(leafs_of(&h, "layer1-01")?, vec!["leaf-1"]);

    // Still declared by layer1-02.
    assert_eq!(h.delete("schema", "layer1__0.0.1").err().map(|e| e.status()), Some(409));
    assert_eq!(h.delete("schema", "layer1").err().map(|e| e.status()), Some(409));
    Ok(())
}

#[test]
fn deleting_a_schema_drops_its_subscription() -> Result<()> {
    let h = indexed()?;
    assert!(CmtIndex::from_record(&h.get("cmtIdx", "leaf")?)?.has_template(
        "layer1",
        "0.0.1",
        "{layer1}/leafs"
    ));
    h.delete("schema", "layer1")?;
    settle(&h)?;
    let cmt = CmtIndex::from_record(&h.get("cmtIdx", "leaf")?)?;
    assert_eq!(cmt.templates().count(), 0);
    Ok(())
}

#[test]
fn index_templates_are_checked_against_their_target() -> Result<()> {
    let h = handler()?;
    // The referenced type has to exist first.
    assert!(h.add(record(LAYER1)?).is_err());

    add(&h, LEAF)?;
    let bad = LAYER1.replace("{layer1}/leafs", "{color}/leafs");
    let kind = h.add(record(&bad)?).err().and_then(|e| e.schema_kind());
    assert_eq!(kind, Some(SchemaErrorKind::TemplateValidation));

    let bad = LAYER1.replace("{layer1}/leafs", "{layer1}/leafs[x]");
    assert!(h.add(record(&bad)?).is_err());
    add(&h, LAYER1)?;
    Ok(())
}

#[test]
fn invalid_data_is_rejected() -> Result<()> {
    let h = indexed()?;
    let missing_name = record(
        r#"{"__type": "layer1", "__id": "x", "__ver": "0.0.1", "data": {"leafs": []}}"#,
    )?;
    assert_eq!(h.add(missing_name).err().map(|e| e.status()), Some(400));
    let wrong_type = record(
        r#"{"__type": "layer1", "__id": "x", "__ver": "0.0.1", "data": {"name": 3}}"#,
    )?;
    assert!(h.add(wrong_type).is_err());
    let no_schema = record(r#"{"__type": "rack", "__id": "r1", "__ver": "0.0.1", "data": {}}"#)?;
    assert!(h.add(no_schema).err().map(|e| e.is_not_found()).unwrap_or(false));
    assert!(h.get("layer1", "x").err().map(|e| e.is_not_found()).unwrap_or(false));
    Ok(())
}
