// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::Value;
use crate::Rc;

pub const KEY_ID: &str = "__id";
pub const KEY_TYPE: &str = "__type";
pub const KEY_VER: &str = "__ver";
pub const KEY_DATA: &str = "data";

/// Type name of schema records.
pub const SCHEMA_TYPE: &str = "schema";

/// Envelope of every stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub data_type: String,
    pub version: String,
    pub data: Value,
}

impl Record {
    pub fn new(
        data_type: impl Into<String>,
        id: impl Into<String>,
        version: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            data_type: data_type.into(),
            version: version.into(),
            data,
        }
    }

    pub fn from_value(v: &Value) -> Result<Record> {
        if !v.is_object() {
            return Err(Error::bad_request(format!(
                "record must be an object, got {}",
                v.type_name()
            )));
        }
        let text = |key: &str| -> Result<String> {
            match &v[key] {
                Value::String(s) if !s.is_empty() => Ok(s.to_string()),
                _ => Err(Error::bad_request(format!(
                    "record field `{key}` must be a non-empty string"
                ))),
            }
        };
        let data = &v[KEY_DATA];
        if !data.is_object() {
            return Err(Error::bad_request(format!(
                "record field `{KEY_DATA}` must be an object, got {}",
                data.type_name()
            )));
        }
        let version = text(KEY_VER)?;
        Version::parse(&version)?;
        Ok(Record {
            id: text(KEY_ID)?,
            data_type: text(KEY_TYPE)?,
            version,
            data: data.clone(),
        })
    }

    pub fn from_json_str(json: &str) -> Result<Record> {
        Self::from_value(&Value::from_json_str(json)?)
    }

    pub fn to_value(&self) -> Value {
        let mut map = IndexMap::new();
        map.insert(Rc::from(KEY_ID), Value::from(self.id.as_str()));
        map.insert(Rc::from(KEY_TYPE), Value::from(self.data_type.as_str()));
        map.insert(Rc::from(KEY_VER), Value::from(self.version.as_str()));
        map.insert(Rc::from(KEY_DATA), self.data.clone());
        Value::from(map)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}@{}", self.data_type, self.id, self.version)
    }
}

/// Dotted numeric version, `x.y.z` or longer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    pub fn parse(s: &str) -> Result<Version> {
        let parts = s
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<core::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::bad_request(format!("invalid version `{s}`")))?;
        if parts.len() < 3 {
            return Err(Error::bad_request(format!(
                "invalid version `{s}`, expected x.y.z"
            )));
        }
        Ok(Version { parts })
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                o => return o,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}
