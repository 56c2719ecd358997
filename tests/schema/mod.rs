// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::Result;
use schemapath::*;

const RACK: &str = r##"{
    "name": "rack", "version": "1.2.0", "key": "{name}",
    "properties": {
        "name": {"type": "string"},
        "slots": {"type": "array", "required": false, "items": {"type": "object", "$ref": "#/definitions/slot"}},
        "tags": {"type": "object", "additionalProperties": {"type": "string"}, "required": false},
        "site": {"type": "string", "contentMediaType": "inventory/site", "required": false}
    },
    "definitions": {
        "slot": {
            "key": "{pos}",
            "properties": {
                "pos": {"type": "string"},
                "units": {"type": "integer", "required": false},
                "parent": {"type": "object", "$ref": "#", "required": false}
            }
        }
    }
}"##;

fn schema_kind(json: &str) -> Option<SchemaErrorKind> {
    SchemaModel::from_json_str(json).err().and_then(|e| e.schema_kind())
}

#[test]
fn definitions_and_refs_share_one_arena() -> Result<()> {
    let rack = SchemaModel::from_json_str(RACK)?;
    assert_eq!(rack.name(), "rack");
    assert_eq!(rack.version(), Some("1.2.0"));
    assert!(rack.is_root());
    assert_eq!(rack.required(), &["name".to_string()]);

    let slot = rack.sub_schema("slots").ok_or_else(|| anyhow::anyhow!("no slot schema"))?;
    assert_eq!(slot.name(), "slot");
    assert!(slot.version().is_none());
    assert!(slot.parent().map(|p| p.is_same(&rack)).unwrap_or(false));
    assert!(slot.is_same(&rack.definition("slot").ok_or_else(|| anyhow::anyhow!("no definition"))?));

    // `#` loops back to the root without copying it.
    let parent = slot.sub_schema("parent").ok_or_else(|| anyhow::anyhow!("no parent schema"))?;
    assert!(parent.is_same(&rack));
    assert!(parent.is_same(&slot.root()));

    assert_eq!(rack.cmt_ref("site").map(|c| c.content_type.as_str()), Some("site"));
    assert!(matches!(
        rack.attribute("tags").map(|d| &d.ty),
        Some(AttrType::Map { .. })
    ));
    assert_eq!(rack.attribute("slots").map(AttrDef::is_collection), Some(true));
    Ok(())
}

#[test]
fn attributes_keep_declaration_order() -> Result<()> {
    let rack = SchemaModel::from_json_str(RACK)?;
    let names: Vec<&str> = rack.attributes().keys().map(String::as_str).collect();
    assert_eq!(names, vec!["name", "slots", "tags", "site"]);

    #[cfg(feature = "yaml")]
    {
        let doc = Value::from_yaml_str(
            "name: z\nversion: 0.0.1\nproperties:\n  zeta: {type: string}\n  alpha: {type: integer}\n",
        )?;
        let z = SchemaModel::from_value(&doc)?;
        let names: Vec<&str> = z.attributes().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }
    Ok(())
}

#[test]
fn keys_are_built_from_templates() -> Result<()> {
    let rack = SchemaModel::from_json_str(RACK)?;
    let slot = rack.definition("slot").ok_or_else(|| anyhow::anyhow!("no definition"))?;
    assert_eq!(slot.build_key(&Value::from_json_str(r#"{"pos": "u12"}"#)?)?, "u12");
    let missing = slot.build_key(&Value::from_json_str(r#"{"units": 2}"#)?);
    assert_eq!(
        missing.err().and_then(|e| e.schema_kind()),
        Some(SchemaErrorKind::MissingKeyAttribute)
    );
    Ok(())
}

#[test]
fn malformed_documents() {
    // root without version
    assert_eq!(
        schema_kind(r#"{"name": "x", "properties": {}}"#),
        Some(SchemaErrorKind::InvalidSchema)
    );
    assert_eq!(
        schema_kind(r##"{"name": "x", "version": "0.0.1", "properties": {"a": {"type": "object", "$ref": "#/definitions/nope"}}}"##),
        Some(SchemaErrorKind::UnresolvedRef)
    );
    // arrays of objects need a keyed definition
    assert!(SchemaModel::from_json_str(
        r#"{"name": "x", "version": "0.0.1", "properties": {"a": {"type": "array", "items": {"type": "object"}}}}"#
    )
    .is_err());
    assert!(SchemaModel::from_json_str(
        r#"{"name": "x", "version": "0.0.1", "properties": {"a/b": {"type": "string"}}}"#
    )
    .is_err());
    // key attributes must be required strings
    assert!(SchemaModel::from_json_str(
        r#"{"name": "x", "version": "0.0.1", "key": "{n}", "properties": {"n": {"type": "integer"}}}"#
    )
    .is_err());
    assert!(SchemaModel::from_json_str(
        r#"{"name": "x", "version": "0.0.1", "key": "{n}", "properties": {"n": {"type": "string", "required": false}}}"#
    )
    .is_err());
    assert!(SchemaModel::from_json_str(
        r#"{"name": "x", "version": "0.0.1", "properties": {"m": {"type": "map", "items": {"type": "map", "items": {"type": "string"}}}}}"#
    )
    .is_err());
    assert!(SchemaModel::from_json_str(
        r#"{"name": "x", "version": "0.0.1", "properties": {"r": {"type": "string", "contentMediaType": "text/plain"}}}"#
    )
    .is_err());
}

#[test]
fn data_is_validated_against_the_schema() -> Result<()> {
    let rack = SchemaModel::from_json_str(RACK)?;
    let ok = Value::from_json_str(
        r#"{"name": "r1", "slots": [{"pos": "u1", "units": 2}, {"pos": "u2"}], "tags": {"a": "b"}, "extra": true}"#,
    )?;
    RecordValidator::validate(&rack, &ok)?;

    for bad in [
        r#"{"slots": []}"#,
        r#"{"name": 1}"#,
        r#"{"name": "r1", "slots": [{"pos": "u1"}, {"pos": "u1"}]}"#,
        r#"{"name": "r1", "slots": [{"units": 1}]}"#,
        r#"{"name": "r1", "tags": {"a": 1}}"#,
        r#"{"name": "r1", "slots": {"pos": "u1"}}"#,
    ] {
        let err = RecordValidator::validate(&rack, &Value::from_json_str(bad)?);
        assert_eq!(err.err().map(|e| e.status()), Some(400), "{bad}");
    }
    Ok(())
}

#[test]
fn versions_compare_numerically() -> Result<()> {
    assert!(Version::parse("0.0.10")? > Version::parse("0.0.9")?);
    assert!(Version::parse("1.0.0")? > Version::parse("0.99.99")?);
    assert_eq!(Version::parse("1.2.0")?, Version::parse("1.2.0")?);
    assert!(Version::parse("1.2").is_err());
    assert!(Version::parse("1.x.0").is_err());
    assert_eq!(archived_schema_id("rack", "1.2.0", "__"), "rack__1.2.0");
    Ok(())
}
