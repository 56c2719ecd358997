// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{Error, Result, SchemaErrorKind};
use crate::value::Value;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([^{}]*)\}").expect("valid placeholder regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Var(String),
}

/// A `{attr}` placeholder string, used both for record keys and for index templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    parts: Vec<Part>,
    vars: Vec<String>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Template> {
        let mut parts = vec![];
        let mut vars: Vec<String> = vec![];
        let mut last = 0;
        for cap in PLACEHOLDER.captures_iter(raw) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            Self::push_text(raw, &raw[last..whole.start()], &mut parts)?;
            let name = name.as_str().trim();
            if name.is_empty() {
                return Err(Error::schema(
                    SchemaErrorKind::InvalidSchema,
                    format!("empty placeholder in template `{raw}`"),
                ));
            }
            if !vars.iter().any(|v| v == name) {
                vars.push(name.to_string());
            }
            parts.push(Part::Var(name.to_string()));
            last = whole.end();
        }
        Self::push_text(raw, &raw[last..], &mut parts)?;
        Ok(Template {
            raw: raw.to_string(),
            parts,
            vars,
        })
    }

    fn push_text(raw: &str, text: &str, parts: &mut Vec<Part>) -> Result<()> {
        if text.contains(['{', '}']) {
            return Err(Error::schema(
                SchemaErrorKind::InvalidSchema,
                format!("unbalanced brace in template `{raw}`"),
            ));
        }
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
        Ok(())
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in first-occurrence order.
    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Substitute every placeholder with the matching scalar member of `data`.
    pub fn build(&self, data: &Value) -> Result<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(t) => out.push_str(t),
                Part::Var(name) => match data.get(name).and_then(Value::to_key_string) {
                    Some(s) => out.push_str(&s),
                    None => {
                        return Err(Error::schema(
                            SchemaErrorKind::MissingKeyAttribute,
                            format!("`{name}` is missing or not a scalar for template `{}`", self.raw),
                        ))
                    }
                },
            }
        }
        Ok(out)
    }
}
