// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::Result;
use schemapath::*;

const SITE: &str = r##"{
    "name": "site", "version": "0.0.1",
    "properties": {
        "name": {"type": "string"},
        "region": {"type": "string"},
        "racks": {"type": "array", "required": false, "items": {"type": "string"}},
        "rooms": {"type": "array", "required": false, "items": {"type": "object", "$ref": "#/definitions/room"}},
        "floors": {"type": "integer", "required": false}
    },
    "definitions": {
        "room": {
            "key": "{name}",
            "properties": {
                "name": {"type": "string"},
                "racks": {"type": "array", "required": false, "items": {"type": "string"}}
            }
        }
    }
}"##;

fn rack(template: &str) -> Result<SchemaModel> {
    Ok(SchemaModel::from_json_str(&format!(
        r#"{{
            "name": "rack", "version": "0.0.1",
            "properties": {{
                "name": {{"type": "string"}},
                "room": {{"type": "string", "required": false}},
                "site": {{"type": "string", "contentMediaType": "inventory/site", "indexTemplate": "{template}"}}
            }}
        }}"#
    ))?)
}

#[test]
fn templates_are_found_with_their_attribute_path() -> Result<()> {
    let found = discover(&rack("{site}/racks")?);
    assert_eq!(
        found,
        vec![AutoIndex {
            attr_path: "/site".to_string(),
            content_type: "site".to_string(),
            index_template: "{site}/racks".to_string(),
        }]
    );
    // Nothing declared, nothing found.
    assert!(discover(&SchemaModel::from_json_str(SITE)?).is_empty());
    Ok(())
}

#[test]
fn template_variables_must_be_string_attributes() -> Result<()> {
    let site = SchemaModel::from_json_str(SITE)?;
    let idx = |t: &str| AutoIndex {
        attr_path: "/racks".to_string(),
        content_type: "site".to_string(),
        index_template: t.to_string(),
    };
    validate_index_template(&idx("{name}/racks"), &site)?;
    validate_index_template(&idx("{region}-{name}/racks"), &site)?;

    for bad in ["{floors}/racks", "{nope}/racks", "{name}", "{name}/racks/more", "{name}/racks[x]"] {
        let err = validate_index_template(&idx(bad), &site);
        assert_eq!(
            err.err().and_then(|e| e.schema_kind()),
            Some(SchemaErrorKind::TemplateValidation),
            "{bad}"
        );
    }

    let nested = AutoIndex {
        attr_path: "/rooms[rooms_key]/racks".to_string(),
        content_type: "site".to_string(),
        index_template: "{name}/rooms[{region}]/racks".to_string(),
    };
    validate_index_template(&nested, &site)?;
    Ok(())
}

#[test]
fn subscription_records_round_trip_through_values() -> Result<()> {
    let mut cmt = CmtIndex::new("site");
    assert!(cmt.subscribe("rack", "0.0.1", "{site}/racks"));
    assert!(cmt.subscribe("rack", "0.0.2", "{site}/racks"));
    assert!(cmt.subscribe("room", "0.0.1", "{site}/rooms"));
    assert!(!cmt.subscribe("rack", "0.0.1", "{site}/racks"));
    assert_eq!(cmt.templates().count(), 3);

    let record = cmt.to_record()?;
    assert_eq!(record.data_type, "cmtIdx");
    assert_eq!(record.id, "site");
    assert_eq!(
        record.data["cmtSubscriber"]["rack"]["versionIndex"]["0.0.2"]["indexTemplate"],
        Value::from(vec![Value::from("{site}/racks")])
    );
    assert_eq!(CmtIndex::from_record(&record)?, cmt);

    // The stored form satisfies the built-in subscription schema.
    let h = DataHandler::in_memory(Config::default())?;
    h.add(record)?;
    assert_eq!(
        h.query("cmtIdx/site/cmtSubscriber[rack]/versionIndex[0.0.1]/indexTemplate?flat")?,
        Value::from("{site}/racks")
    );
    Ok(())
}
