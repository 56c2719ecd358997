// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::Result;
use schemapath::*;

#[test]
fn serialize_number() -> Result<()> {
    // Check that integer values are serialized without fractional part
    assert_eq!(serde_json::to_string_pretty(&Value::from(1.0))?, "1");
    assert_eq!(serde_json::to_string_pretty(&Value::from(-1.0))?, "-1");

    // Ensure that fractional parts are also serialized.
    assert_eq!(serde_json::to_string_pretty(&Value::from(1.1))?, "1.1");
    assert_eq!(serde_json::to_string_pretty(&Value::from(-1.1))?, "-1.1");
    Ok(())
}

#[test]
fn serialize_string() -> Result<()> {
    assert_eq!(
        Value::String("Hello, World\n".into()).to_json_str()?,
        "\"Hello, World\\n\""
    );
    Ok(())
}

#[test]
fn object_members_keep_document_order() -> Result<()> {
    let v = Value::from_json_str(r#"{"b": 1, "a": [true, null], "c": {"z": "x", "y": 2}}"#)?;
    assert_eq!(v.to_string(), r#"{"b":1,"a":[true,null],"c":{"z":"x","y":2}}"#);
    assert_eq!(v, Value::from_json_str(r#"{"c": {"y": 2, "z": "x"}, "a": [true, null], "b": 1}"#)?);
    Ok(())
}

#[test]
fn numbers_compare_by_value() -> Result<()> {
    assert_eq!(Value::from(5.0), Value::from(5u64));
    assert_eq!(Value::from(-3), Value::from(-3.0));
    assert_ne!(Value::from(5.5), Value::from(5u64));
    assert_eq!(Value::from_json_str("[1, 2.0]")?, Value::from_json_str("[1.0, 2]")?);
    Ok(())
}

#[test]
fn string_as_index() -> Result<()> {
    let obj = Value::from_json_str(r#"{ "a" : 5, "b" : null }"#)?;
    assert_eq!(&obj["a"], &Value::from(5u64));
    assert_eq!(&obj[&"a".to_owned()], &Value::from(5u64));
    // A null member and a missing one index the same, `get` tells them apart.
    assert_eq!(&obj["b"], &Value::Null);
    assert_eq!(&obj["c"], &Value::Null);
    assert_eq!(obj.get("b"), Some(&Value::Null));
    assert_eq!(obj.get("c"), None);
    Ok(())
}

#[test]
fn usize_as_index() -> Result<()> {
    assert_eq!(&Value::from_json_str("[1, 2, 3]")?[0usize], &Value::from(1u64));
    assert_eq!(&Value::from_json_str("[1, 2, 3]")?[5usize], &Value::Null);
    assert_eq!(&Value::from("abc")[0usize], &Value::Null);
    Ok(())
}

#[test]
fn mutation_copies_on_write() -> Result<()> {
    let original = Value::from_json_str(r#"{"a": [1]}"#)?;
    let mut copy = original.clone();
    copy.as_object_mut()?
        .insert("b".into(), Value::from("x"));
    copy.as_object_mut()?
        .get_mut("a")
        .ok_or_else(|| anyhow::anyhow!("missing a"))?
        .as_array_mut()?
        .push(Value::from(2u64));

    assert_eq!(original, Value::from_json_str(r#"{"a": [1]}"#)?);
    assert_eq!(copy, Value::from_json_str(r#"{"a": [1, 2], "b": "x"}"#)?);
    Ok(())
}

#[test]
fn api() -> Result<()> {
    assert!(Value::from_json_str("{}")?.as_object()?.is_empty());
    assert!(Value::new_array().as_array()?.is_empty());
    assert!(Value::from("x").as_array().is_err());
    assert_eq!(Value::from("x").as_str(), Some("x"));
    assert_eq!(Value::from(1u64).as_str(), None);
    assert!(Value::Bool(true).is_scalar());
    assert_eq!(Value::from(7u64).to_key_string(), Some("7".to_string()));

    assert_eq!(Value::from(3.0).to_key_string(), Some("3".to_string()));
    assert_eq!(Value::from("k").to_key_string(), Some("k".to_string()));
    assert_eq!(Value::new_object().to_key_string(), None);
    assert_eq!(Value::Null.type_name(), "null");
    assert!(Value::new_object().is_empty_object());
    Ok(())
}

#[test]
fn typed_round_trip() -> Result<()> {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Item {
        name: String,
        count: u32,
    }
    let item = Item {
        name: "a".to_string(),
        count: 2,
    };
    let v = Value::from_serialize(&item)?;
    assert_eq!(v["count"], Value::from(2u64));
    assert_eq!(v.to_typed::<Item>()?, item);
    Ok(())
}

#[cfg(feature = "yaml")]
#[test]
fn yaml_and_json_agree() -> Result<()> {
    let yaml = Value::from_yaml_str("a: 1\nb:\n  - x\n  - 2.5\nc: null\n")?;
    let json = Value::from_json_str(r#"{"a": 1, "b": ["x", 2.5], "c": null}"#)?;
    assert_eq!(yaml, json);
    Ok(())
}
