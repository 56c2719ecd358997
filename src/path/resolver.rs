// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::debug;

use crate::error::{Error, PathErrorKind, Result};
use crate::path::chain::{NodeId, NodeKind, PathChain, PathNode};
use crate::path::parser::{PathQuery, Segment, WILDCARD};
use crate::schema::{AttrDef, AttrType, CmtRef, SchemaModel};
use crate::source::{RecordSource, TraversalCache};
use crate::value::Value;

/// Resolves path queries against a [`RecordSource`].
///
/// Resolution is eager: the whole chain, with every wildcard fan-out and CMT jump, is built
/// before any command renders it.
pub struct PathResolver<'a> {
    source: &'a dyn RecordSource,
}

impl<'a> PathResolver<'a> {
    pub fn new(source: &'a dyn RecordSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &'a dyn RecordSource {
        self.source
    }

    pub fn resolve(&self, cache: &mut TraversalCache, query: &PathQuery) -> Result<PathChain> {
        let record = cache.record(self.source, &query.data_type, &query.id)?;
        let schema = cache.schema_for(self.source, &record)?;
        let mut walker = Walker {
            source: self.source,
            cache,
            chain: PathChain::new(query.clone()),
        };
        let root = walker.chain.push(PathNode {
            kind: NodeKind::Record {
                data_type: record.data_type,
                id: record.id,
            },
            schema: Some(schema),
            def: None,
            data: record.data,
            wildcard: false,
            prev: None,
            next: vec![],
        });
        walker
            .extend(root, &query.segments)
            .map_err(|e| e.context(format!("[{query}]")))?;
        Ok(walker.chain)
    }
}

struct Walker<'a, 'c> {
    source: &'a dyn RecordSource,
    cache: &'c mut TraversalCache,
    chain: PathChain,
}

impl Walker<'_, '_> {
    fn extend(&mut self, id: NodeId, segs: &[Segment]) -> Result<()> {
        if segs.is_empty() {
            return Ok(());
        }
        let node = &self.chain.nodes[id];
        if node.wildcard || !node.next.is_empty() {
            return self.extend_forks(id, segs);
        }
        if node.is_collection() {
            return self.enter_collection(id, segs);
        }
        self.step(id, segs)
    }

    // Continue every branch below `id`. Branches of a wildcard that hit a missing value are
    // dropped; anything else fails the whole resolution.
    fn extend_forks(&mut self, id: NodeId, segs: &[Segment]) -> Result<()> {
        let wildcard = self.chain.nodes[id].wildcard;
        let next = std::mem::take(&mut self.chain.nodes[id].next);
        let mut kept = Vec::with_capacity(next.len());
        for n in next {
            match self.extend(n, segs) {
                Ok(()) => kept.push(n),
                Err(e) if wildcard && e.is_not_found() => {
                    debug!(path = %self.chain.concrete_path(n), error = %e, "pruned wildcard branch");
                }
                Err(e) => return Err(e),
            }
        }
        self.chain.nodes[id].next = kept;
        Ok(())
    }

    // A collection reached without `[idx]`: maps take the next segment as key.
    fn enter_collection(&mut self, id: NodeId, segs: &[Segment]) -> Result<()> {
        let node = &self.chain.nodes[id];
        let name = attr_name(node).to_string();
        let is_map = matches!(node.def.as_ref().map(|d| &d.ty), Some(AttrType::Map { .. }));
        if !is_map {
            return Err(Error::path(
                PathErrorKind::MissingIndex,
                format!("array `{name}` needs an index before `{}`", segs[0]),
            ));
        }
        let seg = &segs[0];
        if seg.idx.is_some() {
            return Err(Error::bad_request(format!(
                "map key `{seg}` of `{name}` cannot be indexed"
            )));
        }
        self.build_index(id, &seg.attr)?;
        self.extend(id, &segs[1..])
    }

    fn step(&mut self, id: NodeId, segs: &[Segment]) -> Result<()> {
        let (seg, rest) = (&segs[0], &segs[1..]);
        let node = &self.chain.nodes[id];
        let Some(schema) = node.schema.clone() else {
            return Err(Error::path(
                PathErrorKind::UnknownAttribute,
                format!("cannot walk into `{}` below `{}`", seg.attr, attr_name(node)),
            ));
        };
        if !node.data.is_object() {
            return Err(Error::bad_request(format!(
                "cannot walk into `{}` of a {}",
                seg.attr,
                node.data.type_name()
            )));
        }
        let member = node.data.get(&seg.attr).filter(|v| !v.is_null()).cloned();

        let Some(def) = schema.attribute(&seg.attr).cloned() else {
            if seg.idx.is_some() || !rest.is_empty() {
                return Err(Error::path(
                    PathErrorKind::UnknownAttribute,
                    format!("`{}` is not declared in `{}`", seg.attr, schema.name()),
                ));
            }
            let child = self.chain.push(attr_node(&seg.attr, None, None, member.unwrap_or_default()));
            self.chain.link(id, child);
            return Ok(());
        };
        let Some(data) = member else {
            return Err(Error::not_found(format!("`{}` has no value", seg.attr)));
        };

        let child_schema = match &def.ty {
            AttrType::Object { .. } => schema.sub_schema(&seg.attr),
            _ => Some(schema),
        };
        let ty = def.ty.clone();
        let type_name = def.type_name();
        let child = self
            .chain
            .push(attr_node(&seg.attr, child_schema, Some(def), data));
        self.chain.link(id, child);

        match (&seg.idx, &ty) {
            (Some(idx), AttrType::Array { .. } | AttrType::Map { .. }) => {
                self.build_index(child, idx)?
            }
            (Some(_), _) => {
                return Err(Error::bad_request(format!(
                    "`{}` is a {} and cannot be indexed",
                    seg.attr, type_name
                )))
            }
            (None, AttrType::String { cmt: Some(cmt) }) => self.splice(child, cmt)?,
            _ => (),
        }
        self.extend(child, rest)
    }

    // Fan a collection node out into one node per selected item.
    fn build_index(&mut self, id: NodeId, key: &str) -> Result<()> {
        let node = &self.chain.nodes[id];
        let name = attr_name(node).to_string();
        let Some(def) = node.def.clone() else {
            return Err(Error::bad_request(format!("`{name}` cannot be indexed")));
        };
        let Some(items) = def.items().cloned() else {
            return Err(Error::bad_request(format!("`{name}` cannot be indexed")));
        };
        if matches!(items.ty, AttrType::Array { .. } | AttrType::Map { .. }) {
            return Err(Error::path(
                PathErrorKind::UnsupportedNesting,
                format!("items of `{name}` are {} values", items.type_name()),
            ));
        }
        let item_schema = match &items.ty {
            AttrType::Object { .. } => node.schema.as_ref().and_then(|s| s.sub_schema(&name)),
            _ => node.schema.clone(),
        };
        let entries = item_entries(&node.data, &def.ty, &items.ty, item_schema.as_ref())
            .map_err(|e| e.context(format!("`{name}`")))?;

        let wildcard = key == WILDCARD;
        self.chain.nodes[id].wildcard = wildcard;
        let mut found = false;
        for (k, item) in entries {
            if (!wildcard && k != key) || item.is_null() {
                continue;
            }
            let child = self.chain.push(PathNode {
                kind: NodeKind::Index { key: k },
                schema: item_schema.clone(),
                def: Some(items.clone()),
                data: item,
                wildcard: false,
                prev: None,
                next: vec![],
            });
            if let AttrType::String { cmt: Some(cmt) } = &items.ty {
                match self.splice(child, cmt) {
                    Ok(()) => (),
                    Err(e) if wildcard && e.is_not_found() => {
                        debug!(attr = %name, error = %e, "skipped dangling reference");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            self.chain.link(id, child);
            found = true;
            if !wildcard {
                break;
            }
        }
        if !wildcard && !found {
            return Err(Error::not_found(format!("no item `{key}` in `{name}`")));
        }
        Ok(())
    }

    // Jump from a CMT-typed string to the record it names.
    fn splice(&mut self, id: NodeId, cmt: &CmtRef) -> Result<()> {
        let Some(target) = self.chain.nodes[id].data.as_str().map(str::to_string) else {
            return Err(Error::bad_request(format!(
                "reference to `{}` is not a string",
                cmt.content_type
            )));
        };
        let record = self.cache.record(self.source, &cmt.content_type, &target)?;
        let schema = self.cache.schema_for(self.source, &record)?;
        let child = self.chain.push(PathNode {
            kind: NodeKind::Record {
                data_type: record.data_type,
                id: record.id,
            },
            schema: Some(schema),
            def: None,
            data: record.data,
            wildcard: false,
            prev: None,
            next: vec![],
        });
        self.chain.link(id, child);
        Ok(())
    }
}

/// Items of a collection paired with their keys.
///
/// Array items are keyed by their built key when they are objects, by their own value when
/// they are strings and by position otherwise.
pub(crate) fn item_entries(
    data: &Value,
    ty: &AttrType,
    items: &AttrType,
    item_schema: Option<&SchemaModel>,
) -> Result<Vec<(String, Value)>> {
    match ty {
        AttrType::Array { .. } => {
            let arr = data
                .as_array()
                .map_err(|_| Error::bad_request(format!("expected an array, got {}", data.type_name())))?;
            let mut out = Vec::with_capacity(arr.len());
            for (i, item) in arr.iter().enumerate() {
                let key = match (items, item_schema) {
                    (AttrType::Object { .. }, Some(s)) => s.build_key(item)?,
                    (AttrType::String { .. }, _) => item.to_key_string().unwrap_or_else(|| i.to_string()),
                    _ => i.to_string(),
                };
                out.push((key, item.clone()));
            }
            Ok(out)
        }
        AttrType::Map { .. } => {
            let map = data
                .as_object()
                .map_err(|_| Error::bad_request(format!("expected a map, got {}", data.type_name())))?;
            Ok(map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
        }
        _ => Ok(vec![]),
    }
}

fn attr_node(name: &str, schema: Option<SchemaModel>, def: Option<AttrDef>, data: Value) -> PathNode {
    PathNode {
        kind: NodeKind::Attr {
            name: name.to_string(),
        },
        schema,
        def,
        data,
        wildcard: false,
        prev: None,
        next: vec![],
    }
}

fn attr_name(node: &PathNode) -> &str {
    match &node.kind {
        NodeKind::Attr { name } => name,
        NodeKind::Index { key } => key,
        NodeKind::Record { id, .. } => id,
    }
}
