// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use indexmap::IndexMap;

use crate::error::{Error, Result, SchemaErrorKind};
use crate::template::Template;
use crate::value::Value;
use crate::Rc;

mod arena;
mod attr;
pub(crate) mod builtin;
mod refs;
mod validate;

pub use arena::{SchemaArena, SchemaId, RESERVED_CHARS};
pub use attr::{AttrDef, AttrType, CmtRef, CMT_KIND_INVENTORY};
pub use refs::{RefProblem, RefValidator};
pub use validate::RecordValidator;

/// Separator between type and version in the id of an archived schema record.
pub const ARCHIVE_DIVIDER: &str = "__";

/// Id under which a superseded schema version is kept.
pub fn archived_schema_id(data_type: &str, version: &str, divider: &str) -> String {
    format!("{data_type}{divider}{version}")
}

/// A navigable schema: a cheap handle to one node of a shared [`SchemaArena`].
///
/// The handle returned by [`SchemaModel::from_value`] points at the document root. Handles
/// for definitions and sub-schemas share the same arena, so cloning is a reference count
/// bump and the model is immutable once built.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    arena: Rc<SchemaArena>,
    id: SchemaId,
}

impl SchemaModel {
    pub fn from_value(doc: &Value) -> Result<SchemaModel> {
        let arena = SchemaArena::build(doc)?;
        Ok(SchemaModel {
            arena: Rc::new(arena),
            id: 0,
        })
    }

    pub fn from_json_str(json: &str) -> Result<SchemaModel> {
        let doc = Value::from_json_str(json).map_err(|e| {
            Error::schema(SchemaErrorKind::InvalidSchema, format!("not json: {e}"))
        })?;
        Self::from_value(&doc)
    }

    fn at(&self, id: SchemaId) -> SchemaModel {
        SchemaModel {
            arena: self.arena.clone(),
            id,
        }
    }

    fn node(&self) -> &arena::SchemaNode {
        self.arena.node(self.id)
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn arena(&self) -> &SchemaArena {
        &self.arena
    }

    pub fn name(&self) -> &str {
        &self.node().name
    }

    /// Declared version. Only document roots carry one.
    pub fn version(&self) -> Option<&str> {
        self.node().version.as_deref()
    }

    pub fn parent(&self) -> Option<SchemaModel> {
        self.node().parent.map(|p| self.at(p))
    }

    pub fn root(&self) -> SchemaModel {
        self.at(self.arena.root_of(self.id))
    }

    pub fn is_root(&self) -> bool {
        self.node().parent.is_none()
    }

    pub fn attributes(&self) -> &IndexMap<String, AttrDef> {
        &self.node().attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrDef> {
        self.node().attributes.get(name)
    }

    pub fn required(&self) -> &[String] {
        &self.node().required
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&str, SchemaModel)> + '_ {
        self.node()
            .definitions
            .iter()
            .map(|(name, id)| (name.as_str(), self.at(*id)))
    }

    pub fn definition(&self, name: &str) -> Option<SchemaModel> {
        self.node().definitions.get(name).map(|id| self.at(*id))
    }

    pub fn cmt_refs(&self) -> &IndexMap<String, CmtRef> {
        &self.node().cmt_refs
    }

    pub fn cmt_ref(&self, attr: &str) -> Option<&CmtRef> {
        self.node().cmt_refs.get(attr)
    }

    pub fn sub_schemas(&self) -> impl Iterator<Item = (&str, SchemaModel)> + '_ {
        self.node()
            .sub_schemas
            .iter()
            .map(|(name, id)| (name.as_str(), self.at(*id)))
    }

    pub fn sub_schema(&self, attr: &str) -> Option<SchemaModel> {
        self.node().sub_schemas.get(attr).map(|id| self.at(*id))
    }

    /// Sub-schema designated by the `$ref` of `def` (or of its items).
    ///
    /// Attributes without a `$ref` have no sub-schema.
    pub fn resolve_ref(&self, attr: &str, def: &AttrDef) -> Result<Option<SchemaModel>> {
        match def.reference() {
            None => Ok(None),
            Some(r) => self
                .arena
                .resolve(self.id, r)
                .map(|id| Some(self.at(id)))
                .map_err(|e| e.context(format!("attribute `{attr}`"))),
        }
    }

    pub fn key(&self) -> Option<&Template> {
        self.node().key.as_ref()
    }

    /// Natural key of `data` computed from this schema's key template.
    pub fn build_key(&self, data: &Value) -> Result<String> {
        match &self.node().key {
            Some(t) => t
                .build(data)
                .map_err(|e| e.context(format!("schema `{}`", self.name()))),
            None => Err(Error::schema(
                SchemaErrorKind::MissingKeyAttribute,
                format!("schema `{}` has no key", self.name()),
            )),
        }
    }

    /// The document (or definition) as written.
    pub fn raw(&self) -> &Value {
        &self.node().raw
    }

    pub fn is_same(&self, other: &SchemaModel) -> bool {
        Rc::ptr_eq(&self.arena, &other.arena) && self.id == other.id
    }
}
