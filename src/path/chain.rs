// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::path::parser::PathQuery;
use crate::schema::{AttrDef, AttrType, SchemaModel};
use crate::value::Value;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A record: the query root, or the target of a CMT reference.
    Record { data_type: String, id: String },
    Attr { name: String },
    /// One item of an array or map, addressed by its key.
    Index { key: String },
}

/// One step of a resolved path.
///
/// `schema` is the schema in force at this step: the record schema, the sub-schema of an
/// object attribute or object item, or the owning schema for scalars and collections. It is
/// `None` past a free-form object or an undeclared attribute, where no further walking is
/// possible.
#[derive(Debug, Clone)]
pub struct PathNode {
    pub kind: NodeKind,
    pub schema: Option<SchemaModel>,
    pub def: Option<AttrDef>,
    pub data: Value,
    /// Set on collection steps whose children were produced by `*`.
    pub wildcard: bool,
    pub prev: Option<NodeId>,
    pub next: Vec<NodeId>,
}

impl PathNode {
    pub fn is_record(&self) -> bool {
        matches!(self.kind, NodeKind::Record { .. })
    }

    /// Object attribute or object item governed by a sub-schema.
    pub fn is_object(&self) -> bool {
        matches!(
            self.def.as_ref().map(|d| &d.ty),
            Some(AttrType::Object { schema: Some(_), .. })
        ) && self.schema.is_some()
    }

    /// Array or map attribute not yet narrowed down to an item.
    pub fn is_collection(&self) -> bool {
        matches!(self.kind, NodeKind::Attr { .. })
            && self.def.as_ref().map(AttrDef::is_collection).unwrap_or(false)
    }

    pub fn index_key(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Index { key } => Some(key),
            _ => None,
        }
    }
}

/// Resolved path: an arena of nodes rooted at node `0`, forking under wildcards.
#[derive(Debug, Clone)]
pub struct PathChain {
    pub(crate) query: PathQuery,
    pub(crate) nodes: Vec<PathNode>,
}

impl PathChain {
    pub(crate) fn new(query: PathQuery) -> Self {
        Self {
            query,
            nodes: vec![],
        }
    }

    pub fn query(&self) -> &PathQuery {
        &self.query
    }

    pub fn root(&self) -> &PathNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &PathNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node without linking it to its parent yet.
    pub(crate) fn push(&mut self, node: PathNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child].prev = Some(parent);
        self.nodes[parent].next.push(child);
    }

    /// Terminal nodes reachable from the root, in document order.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out = vec![];
        if !self.nodes.is_empty() {
            self.collect_leaves(0, &mut out);
        }
        out
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let node = &self.nodes[id];
        if node.next.is_empty() {
            // An emptied wildcard fan-out contributes nothing.
            if !node.wildcard {
                out.push(id);
            }
            return;
        }
        for n in &node.next {
            self.collect_leaves(*n, out);
        }
    }

    /// Key of the item selected by the nearest wildcard above `id`.
    pub fn wildcard_key(&self, id: NodeId) -> Option<&str> {
        let mut cur = id;
        while let Some(prev) = self.nodes[cur].prev {
            if self.nodes[prev].wildcard {
                return self.nodes[cur].index_key();
            }
            cur = prev;
        }
        None
    }

    /// Concrete path from the root record to `id`, every wildcard replaced by its key.
    pub fn concrete_path(&self, id: NodeId) -> String {
        let mut steps = vec![];
        let mut cur = Some(id);
        while let Some(c) = cur {
            steps.push(c);
            cur = self.nodes[c].prev;
        }
        let mut out = String::new();
        for (i, c) in steps.iter().rev().enumerate() {
            match &self.nodes[*c].kind {
                NodeKind::Record { data_type, id } if i == 0 => {
                    out.push_str(data_type);
                    out.push('/');
                    out.push_str(id);
                }
                NodeKind::Record { .. } => (),
                NodeKind::Attr { name } => {
                    out.push('/');
                    out.push_str(name);
                }
                NodeKind::Index { key } => {
                    out.push('[');
                    out.push_str(key);
                    out.push(']');
                }
            }
        }
        out
    }
}
