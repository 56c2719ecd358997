// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reverse-index declarations and the subscription records derived from them.
//!
//! A string attribute that is both a CMT reference and carries an `indexTemplate` asks every
//! record it points to for a back reference. The template is evaluated on the referenced
//! record: its first segment is the id of the declaring record and the rest is the path,
//! inside that record, where the referenced id is registered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, SchemaErrorKind};
use crate::path::Segment;
use crate::record::Record;
use crate::schema::builtin::{CMT_INDEX_TYPE, CMT_INDEX_VERSION};
use crate::schema::{AttrType, SchemaModel};
use crate::template::Template;
use crate::value::Value;

/// One index-carrying CMT attribute found in a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoIndex {
    /// Where the attribute sits in the declaring schema, e.g. `/leafs` or `/arr[arr_key]/ref`.
    pub attr_path: String,
    /// Type the attribute refers to.
    pub content_type: String,
    pub index_template: String,
}

/// Depth-first scan of `schema` for auto indexes, in declaration order.
pub fn discover(schema: &SchemaModel) -> Vec<AutoIndex> {
    let mut found = vec![];
    discover_at(schema, "", &mut found);
    found
}

fn discover_at(schema: &SchemaModel, prefix: &str, found: &mut Vec<AutoIndex>) {
    for (name, def) in schema.attributes() {
        let path = format!("{prefix}/{name}");
        let (def, path) = match def.items() {
            Some(items) if matches!(items.ty, AttrType::Object { .. }) => {
                (items, format!("{path}[{name}_key]"))
            }
            Some(items) => (items, path),
            None => (def, path),
        };
        match &def.ty {
            AttrType::String { cmt: Some(cmt) } => {
                if let Some(t) = &cmt.index_template {
                    found.push(AutoIndex {
                        attr_path: path,
                        content_type: cmt.content_type.clone(),
                        index_template: t.clone(),
                    });
                }
            }
            AttrType::Object { .. } => {
                if let Some(sub) = schema.sub_schema(name) {
                    discover_at(&sub, &path, found);
                }
            }
            _ => (),
        }
    }
}

fn template_error(idx: &AutoIndex, msg: impl std::fmt::Display) -> Error {
    Error::schema(
        SchemaErrorKind::TemplateValidation,
        format!("indexTemplate `{}` of `{}`: {msg}", idx.index_template, idx.attr_path),
    )
}

/// Check `idx` against the schema of the type it refers to.
///
/// Every placeholder must name a string attribute of `target`, the template must start with
/// a non-empty id part, and the rest of it must have the shape of `attr_path`.
pub fn validate_index_template(idx: &AutoIndex, target: &SchemaModel) -> Result<()> {
    let template = Template::parse(&idx.index_template).map_err(|e| template_error(idx, e))?;
    let mut problems = vec![];
    for var in template.vars() {
        match target.attribute(var) {
            None => problems.push(format!("`{var}` is not declared in `{}`", target.name())),
            Some(def) if !matches!(def.ty, AttrType::String { .. }) => problems.push(format!(
                "`{var}` of `{}` is a {}, not a string",
                target.name(),
                def.type_name()
            )),
            Some(_) => (),
        }
    }
    if !problems.is_empty() {
        return Err(template_error(idx, problems.join("; ")));
    }

    let mut parts = idx.index_template.split('/').filter(|s| !s.is_empty());
    if parts.next().is_none() {
        return Err(template_error(idx, "id part cannot be empty"));
    }
    let tmpl_segs = parts
        .map(Segment::parse)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| template_error(idx, e))?;
    let attr_segs = idx
        .attr_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(Segment::parse)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| template_error(idx, e))?;
    if tmpl_segs.len() != attr_segs.len() {
        return Err(template_error(idx, "path does not match the attribute path"));
    }
    for (t, a) in tmpl_segs.iter().zip(attr_segs.iter()) {
        if t.idx.is_some() != a.idx.is_some() {
            return Err(template_error(idx, format!("`{t}` does not match `{a}`")));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionIndex {
    pub version: String,
    #[serde(default)]
    pub index_template: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub data_type: String,
    #[serde(default)]
    pub version_index: BTreeMap<String, VersionIndex>,
}

/// Subscription record of one referenced type: which types, at which schema versions, keep
/// a reverse index of it and with which templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmtIndex {
    pub data_type: String,
    #[serde(default)]
    pub cmt_subscriber: BTreeMap<String, Subscriber>,
}

impl VersionIndex {
    pub fn new(version: &str, template: &str) -> Self {
        Self {
            version: version.to_string(),
            index_template: vec![template.to_string()],
        }
    }
}

impl Subscriber {
    pub fn new(data_type: &str, version: &str, template: &str) -> Self {
        let mut version_index = BTreeMap::new();
        version_index.insert(version.to_string(), VersionIndex::new(version, template));
        Self {
            data_type: data_type.to_string(),
            version_index,
        }
    }
}

impl CmtIndex {
    pub fn new(data_type: &str) -> Self {
        Self {
            data_type: data_type.to_string(),
            cmt_subscriber: BTreeMap::new(),
        }
    }

    pub fn from_value(data: &Value) -> Result<CmtIndex> {
        Ok(data.to_typed()?)
    }

    pub fn from_record(record: &Record) -> Result<CmtIndex> {
        Self::from_value(&record.data).map_err(|e| e.context(format!("subscription {record}")))
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(Value::from_serialize(self)?)
    }

    pub fn to_record(&self) -> Result<Record> {
        Ok(Record::new(
            CMT_INDEX_TYPE,
            self.data_type.as_str(),
            CMT_INDEX_VERSION,
            self.to_value()?,
        ))
    }

    /// Add a template; returns whether anything was added.
    pub fn subscribe(&mut self, data_type: &str, version: &str, template: &str) -> bool {
        let sub = self
            .cmt_subscriber
            .entry(data_type.to_string())
            .or_insert_with(|| Subscriber {
                data_type: data_type.to_string(),
                version_index: BTreeMap::new(),
            });
        let ver = sub
            .version_index
            .entry(version.to_string())
            .or_insert_with(|| VersionIndex {
                version: version.to_string(),
                index_template: vec![],
            });
        if ver.index_template.iter().any(|t| t == template) {
            return false;
        }
        ver.index_template.push(template.to_string());
        true
    }

    /// Every `(subscriber type, version, template)` triple.
    pub fn templates(&self) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
        self.cmt_subscriber.iter().flat_map(|(ty, sub)| {
            sub.version_index.iter().flat_map(move |(ver, vi)| {
                vi.index_template
                    .iter()
                    .map(move |t| (ty.as_str(), ver.as_str(), t.as_str()))
            })
        })
    }

    pub fn has_template(&self, data_type: &str, version: &str, template: &str) -> bool {
        self.templates()
            .any(|(ty, ver, t)| ty == data_type && ver == version && t == template)
    }
}
