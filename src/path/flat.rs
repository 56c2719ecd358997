// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::error::Result;
use crate::path::chain::PathChain;
use crate::path::interpret::collapse;
use crate::path::resolver::item_entries;
use crate::schema::{AttrDef, AttrType, SchemaModel};
use crate::value::Value;
use crate::Rc;

/// Renders terminals one level deep.
///
/// Records and objects become objects whose nested objects and maps are reduced to their key
/// lists and whose arrays are reduced to item keys. An object reached through a wildcard is
/// reduced to its key. A terminal array is spread into the result. A single result is
/// returned unwrapped.
pub fn flat(chain: &PathChain) -> Result<Value> {
    let mut out = vec![];
    for id in chain.leaves() {
        let node = chain.node(id);
        let under_wildcard = node.prev.map(|p| chain.node(p).wildcard).unwrap_or(false);
        match (&node.schema, &node.def) {
            (Some(s), _) if node.is_record() => out.push(flat_object(s, &node.data)?),
            (Some(s), _) if node.is_object() => match node.index_key() {
                Some(key) if under_wildcard => out.push(Value::from(key)),
                _ => out.push(flat_object(s, &node.data)?),
            },
            (Some(owner), Some(def)) if node.is_collection() => match &def.ty {
                AttrType::Array { .. } => out.extend(flat_array(owner, def, &node.data)?),
                _ => out.push(flat_map(owner, def, &node.data)?),
            },
            _ => out.push(node.data.clone()),
        }
    }
    Ok(collapse(dedup_strings(out)))
}

fn flat_object(schema: &SchemaModel, data: &Value) -> Result<Value> {
    let mut flat = IndexMap::new();
    for (name, def) in schema.attributes() {
        let Some(v) = data.get(name) else {
            continue;
        };
        let rendered = match &def.ty {
            AttrType::Object { .. } | AttrType::Map { .. } if v.is_object() => Value::from(
                v.as_object()?
                    .keys()
                    .map(|k| Value::from(k.clone()))
                    .collect::<Vec<_>>(),
            ),
            AttrType::Array { .. } if v.is_array() => Value::from(flat_array(schema, def, v)?),
            _ => v.clone(),
        };
        flat.insert(Rc::from(name.as_str()), rendered);
    }
    Ok(Value::from(flat))
}

fn item_schema(owner: &SchemaModel, def: &AttrDef) -> Option<SchemaModel> {
    match def.items().map(|i| &i.ty) {
        Some(AttrType::Object { .. }) => owner.sub_schema(&def.name),
        _ => None,
    }
}

fn is_object_items(def: &AttrDef) -> bool {
    matches!(def.items().map(|i| &i.ty), Some(AttrType::Object { .. }))
}

fn flat_array(owner: &SchemaModel, def: &AttrDef, data: &Value) -> Result<Vec<Value>> {
    let Some(items) = def.items() else {
        return Ok(vec![]);
    };
    let sub = item_schema(owner, def);
    let entries = item_entries(data, &def.ty, &items.ty, sub.as_ref())?;
    let keyed = is_object_items(def);
    Ok(entries
        .into_iter()
        .map(|(key, item)| if keyed { Value::from(key) } else { item })
        .collect())
}

fn flat_map(owner: &SchemaModel, def: &AttrDef, data: &Value) -> Result<Value> {
    let sub = item_schema(owner, def);
    let mut flat = IndexMap::new();
    for (key, item) in data.as_object()?.iter() {
        let rendered = match &sub {
            Some(s) if item.is_object() => Value::from(s.build_key(item)?),
            _ => item.clone(),
        };
        flat.insert(key.clone(), rendered);
    }
    Ok(Value::from(flat))
}

fn dedup_strings(values: Vec<Value>) -> Vec<Value> {
    let mut seen = BTreeSet::new();
    values
        .into_iter()
        .filter(|v| match v.as_str() {
            Some(s) => seen.insert(s.to_string()),
            None => true,
        })
        .collect()
}
