// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::schema::{AttrDef, AttrType, SchemaModel};
use crate::value::Value;

/// Structural check of record data against a [`SchemaModel`].
///
/// Covers declared types, required attributes and item keys. Members that the schema does
/// not declare are tolerated.
#[derive(Debug)]
pub struct RecordValidator;

fn invalid(path: &str, msg: impl core::fmt::Display) -> Error {
    let at = if path.is_empty() { "/" } else { path };
    Error::bad_request(format!("invalid data at `{at}`: {msg}"))
}

impl RecordValidator {
    pub fn validate(schema: &SchemaModel, data: &Value) -> Result<()> {
        Self::validate_object(schema, data, "")
    }

    fn validate_object(schema: &SchemaModel, data: &Value, path: &str) -> Result<()> {
        let Value::Object(obj) = data else {
            return Err(invalid(path, format!("expected object, got {}", data.type_name())));
        };
        for (name, def) in schema.attributes() {
            let at = format!("{path}/{name}");
            match obj.get(name.as_str()) {
                None | Some(Value::Null) if def.required => {
                    return Err(invalid(&at, "required attribute is missing"))
                }
                None | Some(Value::Null) => (),
                Some(v) => Self::validate_attr(schema, name, def, v, &at)?,
            }
        }
        Ok(())
    }

    fn validate_attr(schema: &SchemaModel, name: &str, def: &AttrDef, v: &Value, path: &str) -> Result<()> {
        match &def.ty {
            AttrType::Array { items } => {
                let Value::Array(arr) = v else {
                    return Err(invalid(path, format!("expected array, got {}", v.type_name())));
                };
                let mut keys = BTreeSet::new();
                for (i, item) in arr.iter().enumerate() {
                    let at = format!("{path}[{i}]");
                    Self::validate_item(schema, name, items, item, &at)?;
                    if let Some(sub) = Self::object_schema(schema, name, items) {
                        let key = sub.build_key(item).map_err(|e| invalid(&at, e))?;
                        if !keys.insert(key.clone()) {
                            return Err(invalid(&at, format!("duplicate item key `{key}`")));
                        }
                    }
                }
                Ok(())
            }
            AttrType::Map { items } => {
                let Value::Object(map) = v else {
                    return Err(invalid(path, format!("expected map, got {}", v.type_name())));
                };
                for (k, item) in map.iter() {
                    Self::validate_item(schema, name, items, item, &format!("{path}[{k}]"))?;
                }
                Ok(())
            }
            _ => Self::validate_item(schema, name, def, v, path),
        }
    }

    fn object_schema(schema: &SchemaModel, name: &str, def: &AttrDef) -> Option<SchemaModel> {
        match def.ty {
            AttrType::Object { .. } => schema.sub_schema(name),
            _ => None,
        }
    }

    fn validate_item(schema: &SchemaModel, name: &str, def: &AttrDef, v: &Value, path: &str) -> Result<()> {
        match &def.ty {
            AttrType::String { .. } if v.is_string() => Ok(()),
            AttrType::Integer => match v {
                Value::Number(n) if n.is_integer() => Ok(()),
                _ => Err(invalid(path, format!("expected integer, got {}", v.type_name()))),
            },
            AttrType::Object { .. } => match Self::object_schema(schema, name, def) {
                Some(sub) => Self::validate_object(&sub, v, path),
                None if v.is_object() => Ok(()),
                None => Err(invalid(path, format!("expected object, got {}", v.type_name()))),
            },
            AttrType::Array { .. } | AttrType::Map { .. } => {
                Err(invalid(path, "nested collections are not supported"))
            }
            _ => Err(invalid(
                path,
                format!("expected {}, got {}", def.type_name(), v.type_name()),
            )),
        }
    }
}
