// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{Error, Result};
use crate::record::SCHEMA_TYPE;
use crate::schema::{AttrDef, AttrType, CmtRef, SchemaModel, CMT_KIND_INVENTORY};
use crate::source::RecordSource;
use crate::template::Template;
use crate::value::Value;

/// A reference that does not hold: dangling, or listed where the referenced record does not
/// register itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefProblem {
    /// Data path of the offending value, `<id>/<attr>[<key>]/...`.
    pub path: String,
    pub msg: String,
}

impl core::fmt::Display for RefProblem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} at `{}`", self.msg, self.path)
    }
}

/// Referential check of record data against the records of a [`RecordSource`].
///
/// Every CMT value must name an existing inventory record. When the reference carries an
/// index template, the value must sit where that template, built on the referenced record,
/// places it: `{built}[{value}]` for collection members, `{built}` for a plain attribute.
///
/// Data paths are rooted at the record id, the same form index templates build. Structure
/// is assumed to be checked already by [`RecordValidator`](crate::RecordValidator); values
/// of the wrong shape are skipped.
pub struct RefValidator<'s> {
    source: &'s dyn RecordSource,
}

impl<'s> RefValidator<'s> {
    pub fn new(source: &'s dyn RecordSource) -> Self {
        Self { source }
    }

    /// All reference problems of `data`, in document order.
    pub fn problems(&self, schema: &SchemaModel, id: &str, data: &Value) -> Result<Vec<RefProblem>> {
        let mut out = vec![];
        self.check_object(schema, data, id, &mut out)?;
        Ok(out)
    }

    pub fn validate(&self, schema: &SchemaModel, id: &str, data: &Value) -> Result<()> {
        let problems = self.problems(schema, id, data)?;
        match problems.first() {
            None => Ok(()),
            Some(first) => Err(Error::bad_request(format!("invalid reference: {first}"))),
        }
    }

    fn check_object(&self, schema: &SchemaModel, data: &Value, path: &str, out: &mut Vec<RefProblem>) -> Result<()> {
        let Value::Object(obj) = data else {
            return Ok(());
        };
        for (name, def) in schema.attributes() {
            let Some(v) = obj.get(name.as_str()) else {
                continue;
            };
            let at = format!("{path}/{name}");
            match &def.ty {
                AttrType::Array { items } => {
                    let Value::Array(arr) = v else { continue };
                    let sub = object_schema(schema, name, items);
                    for item in arr.iter() {
                        let key = match &sub {
                            Some(s) => s.build_key(item)?,
                            None => match item.to_key_string() {
                                Some(k) => k,
                                None => continue,
                            },
                        };
                        self.check_member(sub.as_ref(), items, item, &format!("{at}[{key}]"), out)?;
                    }
                }
                AttrType::Map { items } => {
                    let Value::Object(map) = v else { continue };
                    let sub = object_schema(schema, name, items);
                    for (k, item) in map.iter() {
                        self.check_member(sub.as_ref(), items, item, &format!("{at}[{k}]"), out)?;
                    }
                }
                AttrType::String { cmt: Some(cmt) } => {
                    if let Some(s) = v.as_str() {
                        self.check_value(cmt, s, &at, false, out)?;
                    }
                }
                AttrType::Object { .. } => {
                    if let Some(sub) = schema.sub_schema(name) {
                        self.check_object(&sub, v, &at, out)?;
                    }
                }
                _ => (),
            }
        }
        Ok(())
    }

    fn check_member(
        &self,
        sub: Option<&SchemaModel>,
        items: &AttrDef,
        item: &Value,
        at: &str,
        out: &mut Vec<RefProblem>,
    ) -> Result<()> {
        match (&items.ty, sub) {
            (AttrType::String { cmt: Some(cmt) }, _) => match item.as_str() {
                Some(s) => self.check_value(cmt, s, at, true, out),
                None => Ok(()),
            },
            (_, Some(sub)) => self.check_object(sub, item, at, out),
            _ => Ok(()),
        }
    }

    fn check_value(&self, cmt: &CmtRef, value: &str, at: &str, member: bool, out: &mut Vec<RefProblem>) -> Result<()> {
        let problem = |msg: String| RefProblem {
            path: at.to_string(),
            msg,
        };
        if cmt.kind != CMT_KIND_INVENTORY {
            return Ok(());
        }
        if cmt.content_type == SCHEMA_TYPE {
            out.push(problem("schema records cannot be referenced".to_string()));
            return Ok(());
        }
        let target = match self.source.get_record(&cmt.content_type, value) {
            Ok(r) => r,
            Err(e) if e.is_not_found() => {
                out.push(problem(format!(
                    "reference {}/{} `{value}` does not exist",
                    cmt.kind, cmt.content_type
                )));
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let Some(raw) = &cmt.index_template else {
            return Ok(());
        };
        let built = match Template::parse(raw)?.build(&target.data) {
            Ok(b) => b,
            Err(e) => {
                out.push(problem(format!("index template `{raw}` does not build on {target}: {e}")));
                return Ok(());
            }
        };
        let expected = if member { format!("{built}[{value}]") } else { built };
        if expected != at {
            out.push(problem(format!("{target} is indexed at `{expected}`")));
        }
        Ok(())
    }
}

fn object_schema(schema: &SchemaModel, name: &str, items: &AttrDef) -> Option<SchemaModel> {
    match items.ty {
        AttrType::Object { .. } => schema.sub_schema(name),
        _ => None,
    }
}
