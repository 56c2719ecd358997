// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Error, Result, SchemaErrorKind};
use crate::schema::attr::{AdditionalProperties, AttrDef, AttrType, CmtRef, PropertyDoc};
use crate::template::Template;
use crate::value::Value;

/// Stable address of a schema node inside its [`SchemaArena`].
pub type SchemaId = usize;

/// Characters that cannot appear in attribute names because the path grammar uses them.
pub const RESERVED_CHARS: [char; 6] = ['/', '[', ']', '?', '*', '$'];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaDoc {
    name: Option<String>,
    version: Option<String>,
    key: Option<String>,
    properties: Option<Value>,
    definitions: Option<Value>,
}

/// One schema document or definition.
#[derive(Debug, Clone)]
pub(crate) struct SchemaNode {
    pub(crate) name: String,
    pub(crate) version: Option<String>,
    pub(crate) parent: Option<SchemaId>,
    pub(crate) attributes: IndexMap<String, AttrDef>,
    pub(crate) required: Vec<String>,
    pub(crate) definitions: IndexMap<String, SchemaId>,
    pub(crate) cmt_refs: IndexMap<String, CmtRef>,
    pub(crate) sub_schemas: IndexMap<String, SchemaId>,
    pub(crate) key: Option<Template>,
    pub(crate) raw: Value,
}

/// All nodes of one schema document, root first.
///
/// Sub-schemas and `$ref` targets are addressed by [`SchemaId`], so a definition that refers
/// back to the document root (`"$ref": "#"`) needs no cycle in ownership.
#[derive(Debug, Clone, Default)]
pub struct SchemaArena {
    nodes: Vec<SchemaNode>,
}

impl SchemaArena {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn node(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id]
    }

    /// Parse a schema document into an arena whose node `0` is the document root.
    pub fn build(doc: &Value) -> Result<SchemaArena> {
        let mut arena = SchemaArena::default();
        let mut pending = vec![];
        arena.alloc(doc, None, None, &mut pending)?;
        for (id, props) in pending {
            arena.process_properties(id, props)?;
        }
        for id in 0..arena.nodes.len() {
            arena.validate_key_attrs(id)?;
            arena.validate_item_keys(id)?;
        }
        Ok(arena)
    }

    // First pass: allocate every node and register definitions by name, so that refs can
    // be resolved in any order afterwards.
    fn alloc(
        &mut self,
        doc: &Value,
        parent: Option<SchemaId>,
        def_name: Option<&str>,
        pending: &mut Vec<(SchemaId, Vec<(String, Value)>)>,
    ) -> Result<SchemaId> {
        let path = match def_name {
            Some(n) => format!("definitions/{n}"),
            None => "<root>".to_string(),
        };
        let sd: SchemaDoc = doc.to_typed().map_err(|e| invalid(&path, e))?;
        let name = match (def_name, sd.name) {
            (None, Some(n)) if !n.is_empty() => n,
            (None, _) => return Err(invalid(&path, "missing `name`")),
            (Some(d), Some(n)) if n != d => {
                return Err(invalid(&path, format!("definition name `{n}` does not match key `{d}`")))
            }
            (Some(d), _) => d.to_string(),
        };
        if parent.is_none() && sd.version.is_none() {
            return Err(invalid(&path, "missing `version`"));
        }
        let props = match sd.properties {
            Some(Value::Object(props)) => props,
            _ => return Err(invalid(&path, "missing or malformed `properties`")),
        };
        let key = sd.key.as_deref().map(Template::parse).transpose()?;

        let id = self.nodes.len();
        self.nodes.push(SchemaNode {
            name,
            version: sd.version,
            parent,
            attributes: IndexMap::new(),
            required: vec![],
            definitions: IndexMap::new(),
            cmt_refs: IndexMap::new(),
            sub_schemas: IndexMap::new(),
            key,
            raw: doc.clone(),
        });

        let mut own = Vec::with_capacity(props.len());
        for (pname, praw) in props.iter() {
            if pname.is_empty() || pname.contains(RESERVED_CHARS) {
                return Err(invalid(
                    &path,
                    format!("invalid property name `{pname}`, {RESERVED_CHARS:?} are reserved"),
                ));
            }
            if !praw.is_object() {
                return Err(invalid(&path, format!("property `{pname}` must be an object")));
            }
            own.push((pname.to_string(), praw.clone()));
        }
        pending.push((id, own));

        match sd.definitions {
            None | Some(Value::Null) => (),
            Some(Value::Object(defs)) => {
                for (dname, ddoc) in defs.iter() {
                    let child = self.alloc(ddoc, Some(id), Some(dname), pending)?;
                    self.nodes[id].definitions.insert(dname.to_string(), child);
                }
            }
            Some(_) => return Err(invalid(&path, "`definitions` must be an object")),
        }
        Ok(id)
    }

    // Second pass: typed attribute definitions, required list, CMT refs and sub-schemas.
    fn process_properties(&mut self, id: SchemaId, props: Vec<(String, Value)>) -> Result<()> {
        for (name, raw) in props {
            let doc = PropertyDoc::from_value(&name, &raw)?;
            let required = doc.required();
            let def = self
                .attr_def(id, &name, &raw, doc, false)
                .map_err(|e| e.context(format!("{}/{name}", self.nodes[id].name)))?;
            let node = &mut self.nodes[id];
            if required {
                node.required.push(name.clone());
            }
            if let Some(cmt) = def.cmt() {
                node.cmt_refs.insert(name.clone(), cmt.clone());
            }
            if let Some(sub) = def.schema_id() {
                node.sub_schemas.insert(name.clone(), sub);
            }
            node.attributes.insert(name, def);
        }
        Ok(())
    }

    fn attr_def(
        &self,
        owner: SchemaId,
        name: &str,
        raw: &Value,
        doc: PropertyDoc,
        is_item: bool,
    ) -> Result<AttrDef> {
        let required = doc.required();
        let ty = match doc {
            PropertyDoc::String {
                content_media_type,
                index_template,
                ..
            } => {
                if let Some(t) = &index_template {
                    Template::parse(t)?;
                }
                let cmt = match content_media_type {
                    Some(mt) => Some(CmtRef::parse(&mt, index_template)?),
                    None if index_template.is_some() => {
                        return Err(Error::schema(
                            SchemaErrorKind::InvalidSchema,
                            "`indexTemplate` requires `contentMediaType`",
                        ))
                    }
                    None => None,
                };
                AttrType::String { cmt }
            }
            PropertyDoc::Integer { .. } => AttrType::Integer,
            PropertyDoc::Object {
                additional_properties: Some(AdditionalProperties::Items(items)),
                ..
            } => self.map_type(owner, name, &items)?,
            PropertyDoc::Object { reference, .. } => {
                let schema = match &reference {
                    Some(r) => Some(self.resolve(owner, r)?),
                    None => None,
                };
                AttrType::Object { reference, schema }
            }
            PropertyDoc::Map { items: Some(items), .. } => self.map_type(owner, name, &items)?,
            PropertyDoc::Map { items: None, .. } => AttrType::Object {
                reference: None,
                schema: None,
            },
            PropertyDoc::Array { items: None, .. } => {
                return Err(Error::schema(
                    SchemaErrorKind::InvalidSchema,
                    "array attribute requires `items`",
                ))
            }
            PropertyDoc::Array { items: Some(items), .. } => {
                let item = self.item_def(owner, name, &items)?;
                match &item.ty {
                    AttrType::Map { .. } => {
                        return Err(Error::schema(
                            SchemaErrorKind::InvalidSchema,
                            "array of map is not supported",
                        ))
                    }
                    AttrType::Object { reference: None, .. } => {
                        return Err(Error::schema(
                            SchemaErrorKind::InvalidSchema,
                            "array of object requires `$ref` to a keyed definition",
                        ))
                    }
                    _ => (),
                }
                AttrType::Array {
                    items: Box::new(item),
                }
            }
        };
        Ok(AttrDef::new(name, required || is_item, ty, raw.clone()))
    }

    fn item_def(&self, owner: SchemaId, name: &str, raw: &Value) -> Result<AttrDef> {
        let doc = PropertyDoc::from_value(name, raw)?;
        self.attr_def(owner, name, raw, doc, true)
    }

    fn map_type(&self, owner: SchemaId, name: &str, items: &Value) -> Result<AttrType> {
        let item = self.item_def(owner, name, items)?;
        if let AttrType::Map { .. } = item.ty {
            return Err(Error::schema(
                SchemaErrorKind::InvalidSchema,
                "map of map is not supported",
            ));
        }
        Ok(AttrType::Map {
            items: Box::new(item),
        })
    }

    /// Resolve a local `$ref`, walking up from `from` through the parent chain.
    pub(crate) fn resolve(&self, from: SchemaId, reference: &str) -> Result<SchemaId> {
        if reference == "#" {
            return Ok(self.root_of(from));
        }
        if let Some(name) = reference.strip_prefix("#/definitions/") {
            let mut cur = Some(from);
            while let Some(id) = cur {
                let node = &self.nodes[id];
                if let Some(found) = node.definitions.get(name) {
                    return Ok(*found);
                }
                cur = node.parent;
            }
        }
        Err(Error::schema(
            SchemaErrorKind::UnresolvedRef,
            format!("cannot resolve `$ref` `{reference}` from `{}`", self.nodes[from].name),
        ))
    }

    pub(crate) fn root_of(&self, mut id: SchemaId) -> SchemaId {
        while let Some(p) = self.nodes[id].parent {
            id = p;
        }
        id
    }

    fn validate_key_attrs(&self, id: SchemaId) -> Result<()> {
        let node = &self.nodes[id];
        let Some(key) = &node.key else {
            return Ok(());
        };
        for var in key.vars() {
            let def = node.attributes.get(var).ok_or_else(|| {
                invalid(
                    &node.name,
                    format!("key `{}` references undeclared attribute `{var}`", key.raw()),
                )
            })?;
            if !matches!(def.ty, AttrType::String { .. }) {
                return Err(invalid(
                    &node.name,
                    format!("key attribute `{var}` must be a string, got {}", def.type_name()),
                ));
            }
            if !node.required.iter().any(|r| r == var) {
                return Err(invalid(
                    &node.name,
                    format!("key attribute `{var}` must be required"),
                ));
            }
        }
        Ok(())
    }

    fn validate_item_keys(&self, id: SchemaId) -> Result<()> {
        let node = &self.nodes[id];
        for (name, def) in &node.attributes {
            if let AttrType::Array { items } = &def.ty {
                if let Some(sub) = items.schema_id() {
                    if self.nodes[sub].key.is_none() {
                        return Err(invalid(
                            &node.name,
                            format!("items of array `{name}` need a `key` in `{}`", self.nodes[sub].name),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn invalid(path: &str, msg: impl core::fmt::Display) -> Error {
    Error::schema(SchemaErrorKind::InvalidSchema, format!("[{path}] {msg}"))
}
