// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::Deserialize;

use crate::error::{Error, Result, SchemaErrorKind};
use crate::schema::SchemaId;
use crate::value::Value;

/// Only kind of content media type reference understood.
pub const CMT_KIND_INVENTORY: &str = "inventory";

/// Property definition as written in a schema document.
///
/// Discriminated on `type` the same way JSON Schema does it. Validation keywords such as
/// `minLength` are tolerated and left to the structural validator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub(crate) enum PropertyDoc {
    #[serde(rename_all = "camelCase")]
    String {
        content_media_type: Option<String>,
        index_template: Option<String>,
        required: Option<bool>,
    },
    Integer {
        required: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Object {
        #[serde(rename = "$ref")]
        reference: Option<String>,
        additional_properties: Option<AdditionalProperties>,
        required: Option<bool>,
    },
    Array {
        items: Option<Value>,
        required: Option<bool>,
    },
    Map {
        items: Option<Value>,
        required: Option<bool>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum AdditionalProperties {
    Flag(bool),
    Items(Value),
}

impl PropertyDoc {
    pub(crate) fn from_value(name: &str, raw: &Value) -> Result<PropertyDoc> {
        raw.to_typed::<PropertyDoc>().map_err(|e| {
            Error::schema(
                SchemaErrorKind::InvalidSchema,
                format!("property `{name}`: {e}"),
            )
        })
    }

    /// Properties are required unless they say `required: false`.
    pub(crate) fn required(&self) -> bool {
        let flag = match self {
            PropertyDoc::String { required, .. }
            | PropertyDoc::Integer { required }
            | PropertyDoc::Object { required, .. }
            | PropertyDoc::Array { required, .. }
            | PropertyDoc::Map { required, .. } => required,
        };
        flag.unwrap_or(true)
    }
}

/// A `contentMediaType` reference from a string attribute to records of another type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmtRef {
    pub kind: String,
    pub content_type: String,
    pub index_template: Option<String>,
}

impl CmtRef {
    /// Parse `<kind>/<targetType>`.
    pub fn parse(media_type: &str, index_template: Option<String>) -> Result<CmtRef> {
        match media_type.split_once('/') {
            Some((kind, target)) if kind == CMT_KIND_INVENTORY && !target.is_empty() && !target.contains('/') => {
                Ok(CmtRef {
                    kind: kind.to_string(),
                    content_type: target.to_string(),
                    index_template,
                })
            }
            _ => Err(Error::schema(
                SchemaErrorKind::InvalidSchema,
                format!("unsupported contentMediaType `{media_type}`, expected `{CMT_KIND_INVENTORY}/<type>`"),
            )),
        }
    }
}

/// Resolved type of an attribute. `map` sugar is already folded into [`AttrType::Map`].
#[derive(Debug, Clone)]
pub enum AttrType {
    String {
        cmt: Option<CmtRef>,
    },
    Integer,
    Object {
        reference: Option<String>,
        schema: Option<SchemaId>,
    },
    Array {
        items: Box<AttrDef>,
    },
    Map {
        items: Box<AttrDef>,
    },
}

#[derive(Debug, Clone)]
pub struct AttrDef {
    pub name: String,
    pub required: bool,
    pub ty: AttrType,
    raw: Value,
}

impl AttrDef {
    pub(crate) fn new(name: &str, required: bool, ty: AttrType, raw: Value) -> Self {
        Self {
            name: name.to_string(),
            required,
            ty,
            raw,
        }
    }

    /// The definition as it was written, before sugar expansion.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn type_name(&self) -> &'static str {
        match &self.ty {
            AttrType::String { .. } => "string",
            AttrType::Integer => "integer",
            AttrType::Object { .. } => "object",
            AttrType::Array { .. } => "array",
            AttrType::Map { .. } => "map",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.ty, AttrType::Array { .. } | AttrType::Map { .. })
    }

    /// Item definition of arrays and maps.
    pub fn items(&self) -> Option<&AttrDef> {
        match &self.ty {
            AttrType::Array { items } | AttrType::Map { items } => Some(items),
            _ => None,
        }
    }

    /// CMT reference carried by this attribute or by its items.
    pub fn cmt(&self) -> Option<&CmtRef> {
        match &self.ty {
            AttrType::String { cmt } => cmt.as_ref(),
            AttrType::Array { items } | AttrType::Map { items } => items.cmt(),
            _ => None,
        }
    }

    /// Sub-schema of an object attribute or of object items.
    pub fn schema_id(&self) -> Option<SchemaId> {
        match &self.ty {
            AttrType::Object { schema, .. } => *schema,
            AttrType::Array { items } | AttrType::Map { items } => items.schema_id(),
            _ => None,
        }
    }

    pub(crate) fn reference(&self) -> Option<&str> {
        match &self.ty {
            AttrType::Object { reference, .. } => reference.as_deref(),
            AttrType::Array { items } | AttrType::Map { items } => items.reference(),
            _ => None,
        }
    }
}
