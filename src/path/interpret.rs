// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::Result;
use crate::path::chain::{NodeId, NodeKind, PathChain};
use crate::value::Value;

/// Data denoted by each terminal. A CMT terminal yields the referenced record's data.
pub fn value(chain: &PathChain) -> Result<Value> {
    let values = chain
        .leaves()
        .into_iter()
        .map(|id| chain.node(id).data.clone())
        .collect();
    Ok(shape(chain, values))
}

/// Identifier of each terminal.
///
/// A referenced record yields the key used to reach it, an object item its built key and
/// anything else its data.
pub fn reference(chain: &PathChain) -> Result<Value> {
    let values = chain
        .leaves()
        .into_iter()
        .map(|id| leaf_ref(chain, id))
        .collect();
    Ok(single_or_all(chain, values))
}

fn leaf_ref(chain: &PathChain, id: NodeId) -> Value {
    let node = chain.node(id);
    match (&node.kind, node.prev) {
        (NodeKind::Record { .. }, Some(prev)) => chain.node(prev).data.clone(),
        (NodeKind::Record { id, .. }, None) => Value::from(id.as_str()),
        (NodeKind::Index { key }, _) if node.is_object() => Value::from(key.as_str()),
        _ => node.data.clone(),
    }
}

/// Schema fragment governing each terminal.
pub fn schema(chain: &PathChain) -> Result<Value> {
    let values = chain
        .leaves()
        .into_iter()
        .map(|id| {
            let node = chain.node(id);
            match (&node.schema, &node.def) {
                (Some(s), _) if node.is_record() || node.is_object() => s.raw().clone(),
                (_, Some(def)) => def.raw().clone(),
                _ => Value::Null,
            }
        })
        .collect();
    Ok(single_or_all(chain, values))
}

/// A wildcard anywhere makes the result an array. Otherwise the single terminal value is
/// returned as is.
fn shape(chain: &PathChain, values: Vec<Value>) -> Value {
    if chain.query().has_wildcard() {
        return Value::from(values);
    }
    values.into_iter().next().unwrap_or_default()
}

// Like `collapse`, but a path without wildcards and without a terminal yields null.
fn single_or_all(chain: &PathChain, values: Vec<Value>) -> Value {
    if values.is_empty() && !chain.query().has_wildcard() {
        return Value::Null;
    }
    collapse(values)
}

/// A single result is returned as is, anything else as an array.
pub(crate) fn collapse(mut values: Vec<Value>) -> Value {
    match values.len() {
        1 => values.remove(0),
        _ => Value::from(values),
    }
}
