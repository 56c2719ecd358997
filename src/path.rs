// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod chain;
mod flat;
mod interpret;
mod iterator;
mod parser;
mod resolver;

pub use chain::{NodeId, NodeKind, PathChain, PathNode};
pub use parser::{PathCmd, PathQuery, Segment, WILDCARD};
pub use resolver::PathResolver;

use crate::error::{Error, Result};
use crate::source::TraversalCache;
use crate::value::Value;

/// Record type holding named path aliases: `{"name": ..., "path": ...}`.
pub const PATH_NAME_TYPE: &str = "pathName";

impl PathResolver<'_> {
    /// Resolve `query` and render it with its command.
    pub fn evaluate(&self, cache: &mut TraversalCache, query: &PathQuery) -> Result<Value> {
        if let PathCmd::PathName(alias) = &query.cmd {
            let expanded = self.expand_alias(cache, query, alias)?;
            if let PathCmd::PathName(inner) = &expanded.cmd {
                return Err(Error::bad_request(format!(
                    "path alias `{alias}` expands to another alias `{inner}`"
                )));
            }
            return self.evaluate(cache, &expanded);
        }
        let chain = self.resolve(cache, query)?;
        render(&chain)
    }

    /// Parse and evaluate a full `type/id/path?cmd` string with a fresh cache.
    pub fn query(&self, path: &str) -> Result<Value> {
        let mut cache = TraversalCache::new();
        self.evaluate(&mut cache, &PathQuery::parse(path)?)
    }

    fn expand_alias(&self, cache: &mut TraversalCache, query: &PathQuery, alias: &str) -> Result<PathQuery> {
        let record = cache.record(self.source(), PATH_NAME_TYPE, alias)?;
        let Some(path) = record.data.get("path").and_then(Value::as_str) else {
            return Err(Error::bad_request(format!("path alias `{alias}` has no `path`")));
        };
        let base = PathQuery {
            cmd: PathCmd::Value,
            ..query.clone()
        };
        let full = if path.starts_with('?') {
            format!("{base}{path}")
        } else {
            format!("{base}/{}", path.trim_start_matches('/'))
        };
        PathQuery::parse(&full)
    }
}

/// Render an already resolved chain with the command of its query.
pub fn render(chain: &PathChain) -> Result<Value> {
    match &chain.query().cmd {
        PathCmd::Value => interpret::value(chain),
        PathCmd::Ref => interpret::reference(chain),
        PathCmd::Schema => interpret::schema(chain),
        PathCmd::Flat => flat::flat(chain),
        PathCmd::Iterator => iterator::iterator(chain),
        PathCmd::PathName(alias) => Err(Error::bad_request(format!(
            "path alias `{alias}` must be expanded before rendering"
        ))),
    }
}
