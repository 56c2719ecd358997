// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Path-addressed writes inside one record.
//!
//! Collections are addressed the same way the path reader addresses them: arrays of objects
//! by built key, arrays of strings by value, arrays of other scalars by position and maps by
//! key. Deleting something that is not there is `NotModified`.

use crate::error::{Error, PathErrorKind, Result};
use crate::path::Segment;
use crate::schema::{AttrDef, AttrType, SchemaModel};
use crate::value::Value;
use crate::Rc;

/// Set (`Some`) or delete (`None`) the value at `segments` inside `data`.
pub fn set_data_on_path(
    schema: &SchemaModel,
    data: &mut Value,
    segments: &[Segment],
    value: Option<Value>,
) -> Result<()> {
    let Some((seg, rest)) = segments.split_first() else {
        return Err(Error::bad_request("empty patch path"));
    };
    let def = declared(schema, &seg.attr)?;
    if rest.is_empty() {
        return match value {
            None => delete_attr(schema, data, seg, &def),
            Some(v) => set_attr(schema, data, seg, &def, v),
        };
    }

    let obj = data.as_object_mut()?;
    let Some(member) = obj.get_mut(seg.attr.as_str()).filter(|v| !v.is_null()) else {
        return Err(Error::not_found(format!("`{}` has no value", seg.attr)));
    };
    match &def.ty {
        AttrType::Object { .. } => {
            if seg.idx.is_some() {
                return Err(Error::bad_request(format!("object `{}` cannot be indexed", seg.attr)));
            }
            let sub = sub_schema(schema, &seg.attr)?;
            set_data_on_path(&sub, member, rest, value)
        }
        AttrType::Array { items } => {
            let Some(key) = &seg.idx else {
                return Err(Error::path(
                    PathErrorKind::MissingIndex,
                    format!("array `{}` needs an index", seg.attr),
                ));
            };
            if !matches!(items.ty, AttrType::Object { .. }) {
                return Err(Error::bad_request(format!(
                    "items of `{}` are {} values and cannot be walked into",
                    seg.attr,
                    items.type_name()
                )));
            }
            let sub = sub_schema(schema, &seg.attr)?;
            for item in member.as_array_mut()?.iter_mut() {
                if sub.build_key(item)? == *key {
                    return set_data_on_path(&sub, item, rest, value);
                }
            }
            Err(Error::not_found(format!("no item `{key}` in `{}`", seg.attr)))
        }
        AttrType::Map { items } => {
            // `attr[key]/...` or `attr/key/...`
            let (key, rest) = match &seg.idx {
                Some(k) => (k.clone(), rest),
                None => (rest[0].attr.clone(), &rest[1..]),
            };
            if rest.is_empty() {
                return write_map_item(member, &seg.attr, items, &key, value);
            }
            if !matches!(items.ty, AttrType::Object { .. }) {
                return Err(Error::bad_request(format!(
                    "items of `{}` are {} values and cannot be walked into",
                    seg.attr,
                    items.type_name()
                )));
            }
            let sub = sub_schema(schema, &seg.attr)?;
            let map = member.as_object_mut()?;
            let Some(item) = map.get_mut(key.as_str()) else {
                return Err(Error::not_found(format!("no item `{key}` in `{}`", seg.attr)));
            };
            set_data_on_path(&sub, item, rest, value)?;
            // Items of keyed maps move when their key attributes change.
            if sub.key().is_some() {
                let new_key = sub.build_key(item)?;
                if new_key != key {
                    if let Some(moved) = map.shift_remove(key.as_str()) {
                        map.insert(Rc::from(new_key.as_str()), moved);
                    }
                }
            }
            Ok(())
        }
        _ => Err(Error::bad_request(format!(
            "`{}` is a {} and cannot be walked into",
            seg.attr,
            def.type_name()
        ))),
    }
}

fn declared(schema: &SchemaModel, attr: &str) -> Result<AttrDef> {
    schema.attribute(attr).cloned().ok_or_else(|| {
        Error::path(
            PathErrorKind::UnknownAttribute,
            format!("`{attr}` is not declared in `{}`", schema.name()),
        )
    })
}

fn sub_schema(schema: &SchemaModel, attr: &str) -> Result<SchemaModel> {
    schema.sub_schema(attr).ok_or_else(|| {
        Error::path(
            PathErrorKind::UnknownAttribute,
            format!("`{attr}` of `{}` has no schema to walk into", schema.name()),
        )
    })
}

// Key an item the way readers address it. `None` for positional items.
fn item_key(schema: &SchemaModel, attr: &str, items: &AttrDef, item: &Value) -> Result<Option<String>> {
    match &items.ty {
        AttrType::Object { .. } => Ok(Some(sub_schema(schema, attr)?.build_key(item)?)),
        AttrType::String { .. } => Ok(item.to_key_string()),
        _ => Ok(None),
    }
}

fn delete_attr(schema: &SchemaModel, data: &mut Value, seg: &Segment, def: &AttrDef) -> Result<()> {
    let obj = data.as_object_mut()?;
    let Some(key) = &seg.idx else {
        return match obj.shift_remove(seg.attr.as_str()) {
            Some(_) => Ok(()),
            None => Err(Error::not_modified(format!("`{}` already deleted", seg.attr))),
        };
    };
    let Some(member) = obj.get_mut(seg.attr.as_str()) else {
        return Err(Error::not_modified(format!("`{}` already deleted", seg.attr)));
    };
    match &def.ty {
        AttrType::Array { items } => {
            let arr = member.as_array_mut()?;
            let before = arr.len();
            let mut kept = Vec::with_capacity(before);
            for (i, item) in arr.drain(..).enumerate() {
                let k = item_key(schema, &seg.attr, items, &item)?.unwrap_or_else(|| i.to_string());
                if k != *key {
                    kept.push(item);
                }
            }
            let removed = kept.len() != before;
            *arr = kept;
            if !removed {
                return Err(Error::not_modified(format!("`{key}` is not in `{}`", seg.attr)));
            }
            Ok(())
        }
        AttrType::Map { .. } => match member.as_object_mut()?.shift_remove(key.as_str()) {
            Some(_) => Ok(()),
            None => Err(Error::not_modified(format!("`{key}` is not in `{}`", seg.attr))),
        },
        _ => Err(Error::bad_request(format!(
            "`{}` is a {} and has no keys",
            seg.attr,
            def.type_name()
        ))),
    }
}

fn set_attr(schema: &SchemaModel, data: &mut Value, seg: &Segment, def: &AttrDef, value: Value) -> Result<()> {
    let obj = data.as_object_mut()?;
    let attr = seg.attr.as_str();
    match (&def.ty, &seg.idx) {
        (AttrType::Array { .. }, None) if value.is_array() => {
            obj.insert(Rc::from(attr), value);
            Ok(())
        }
        (AttrType::Array { items }, idx) => {
            if value.is_array() {
                return Err(Error::bad_request(format!(
                    "cannot store an array as one item of `{attr}`"
                )));
            }
            let member = obj.entry(Rc::from(attr)).or_insert_with(Value::new_array);
            if member.is_null() {
                *member = Value::new_array();
            }
            set_array_item(schema, member, attr, items, idx.as_deref(), value)
        }
        (AttrType::Map { items }, idx) => {
            let key = match idx {
                Some(k) => k.clone(),
                None => item_key(schema, attr, items, &value)?.ok_or_else(|| {
                    Error::bad_request(format!("map `{attr}` needs a key for {} items", items.type_name()))
                })?,
            };
            let member = obj.entry(Rc::from(attr)).or_insert_with(Value::new_object);
            if member.is_null() {
                *member = Value::new_object();
            }
            write_map_item(member, attr, items, &key, Some(value))
        }
        (_, Some(key)) => Err(Error::bad_request(format!(
            "`{attr}` is a {} and cannot take key `{key}`",
            def.type_name()
        ))),
        (_, None) => {
            obj.insert(Rc::from(attr), value);
            Ok(())
        }
    }
}

fn set_array_item(
    schema: &SchemaModel,
    member: &mut Value,
    attr: &str,
    items: &AttrDef,
    key: Option<&str>,
    value: Value,
) -> Result<()> {
    let new_key = item_key(schema, attr, items, &value)?;
    let arr = member.as_array_mut()?;
    let Some(new_key) = new_key else {
        // Positional items: replace in range, append otherwise.
        return match key.map(str::parse::<usize>) {
            Some(Ok(pos)) if pos < arr.len() => {
                arr[pos] = value;
                Ok(())
            }
            None | Some(Ok(_)) => {
                arr.push(value);
                Ok(())
            }
            Some(Err(_)) => Err(Error::bad_request(format!(
                "items of `{attr}` are addressed by position, got `{}`",
                key.unwrap_or_default()
            ))),
        };
    };
    let key = key.unwrap_or(new_key.as_str()).to_string();
    let mut found = false;
    for (i, item) in arr.iter_mut().enumerate() {
        let k = item_key(schema, attr, items, item)?.unwrap_or_else(|| i.to_string());
        if k == key {
            *item = value.clone();
            found = true;
        }
    }
    if !found {
        if key != new_key {
            return Err(Error::not_found(format!("no item `{key}` in `{attr}`")));
        }
        arr.push(value);
    }
    Ok(())
}

fn write_map_item(
    member: &mut Value,
    attr: &str,
    items: &AttrDef,
    key: &str,
    value: Option<Value>,
) -> Result<()> {
    let map = member.as_object_mut()?;
    match value {
        None => match map.shift_remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::not_modified(format!("`{key}` is not in `{attr}`"))),
        },
        Some(v) => {
            if matches!(items.ty, AttrType::Object { .. }) && !v.is_object() {
                return Err(Error::bad_request(format!("items of `{attr}` must be objects")));
            }
            map.insert(Rc::from(key), v);
            Ok(())
        }
    }
}
