// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use indexmap::IndexMap;

use crate::error::Result;
use crate::path::chain::PathChain;
use crate::value::Value;
use crate::Rc;

/// One `{path, key, data}` row per terminal.
///
/// `path` is the concrete path with every wildcard replaced, `key` the item key chosen by the
/// nearest wildcard (`null` without one) and `data` what `?value` would give for that terminal.
pub fn iterator(chain: &PathChain) -> Result<Value> {
    let rows = chain
        .leaves()
        .into_iter()
        .map(|id| {
            let mut row = IndexMap::new();
            row.insert(Rc::from("path"), Value::from(chain.concrete_path(id)));
            row.insert(
                Rc::from("key"),
                chain.wildcard_key(id).map(Value::from).unwrap_or_default(),
            );
            row.insert(Rc::from("data"), chain.node(id).data.clone());
            Value::from(row)
        })
        .collect::<Vec<_>>();
    Ok(Value::from(rows))
}
