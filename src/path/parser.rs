// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;

use crate::error::{Error, PathErrorKind, Result};

/// Index selecting every item of a collection.
pub const WILDCARD: &str = "*";

const CMD_PREFIX: char = '?';
const FLAT_SUFFIX: &str = "$";
const PATH_NAME_CMD: &str = "pathName=";

/// Command suffix of a path; decides how the resolved chain is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PathCmd {
    #[default]
    Value,
    Ref,
    Schema,
    Flat,
    Iterator,
    PathName(String),
}

impl PathCmd {
    fn parse(cmd: &str) -> Result<PathCmd> {
        let cmd = match cmd {
            "value" => PathCmd::Value,
            "ref" => PathCmd::Ref,
            "schema" => PathCmd::Schema,
            "flat" => PathCmd::Flat,
            "iterator" => PathCmd::Iterator,
            _ => match cmd.strip_prefix(PATH_NAME_CMD) {
                Some(alias) if !alias.is_empty() => PathCmd::PathName(alias.to_string()),
                _ => {
                    return Err(Error::path(
                        PathErrorKind::InvalidPathCmd,
                        format!("unknown path command `?{cmd}`"),
                    ))
                }
            },
        };
        Ok(cmd)
    }
}

impl fmt::Display for PathCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathCmd::Value => f.write_str("?value"),
            PathCmd::Ref => f.write_str("?ref"),
            PathCmd::Schema => f.write_str("?schema"),
            PathCmd::Flat => f.write_str("?flat"),
            PathCmd::Iterator => f.write_str("?iterator"),
            PathCmd::PathName(alias) => write!(f, "?{PATH_NAME_CMD}{alias}"),
        }
    }
}

/// One `attr` or `attr[idx]` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub attr: String,
    pub idx: Option<String>,
}

impl Segment {
    pub fn parse(s: &str) -> Result<Segment> {
        let malformed = || Error::bad_request(format!("malformed path segment `{s}`"));
        if s == FLAT_SUFFIX {
            return Err(malformed());
        }
        match s.find('[') {
            None if s.contains(']') => Err(malformed()),
            None => Ok(Segment {
                attr: s.to_string(),
                idx: None,
            }),
            Some(open) => {
                let idx = s[open + 1..].strip_suffix(']').ok_or_else(malformed)?;
                if open == 0 || idx.is_empty() || idx.contains(['[', ']']) {
                    return Err(malformed());
                }
                Ok(Segment {
                    attr: s[..open].to_string(),
                    idx: Some(idx.to_string()),
                })
            }
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.attr == WILDCARD || self.idx.as_deref() == Some(WILDCARD)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.idx {
            Some(idx) => write!(f, "{}[{idx}]", self.attr),
            None => f.write_str(&self.attr),
        }
    }
}

/// A parsed `type/id/attr[idx]/...?cmd` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    pub data_type: String,
    pub id: String,
    pub segments: Vec<Segment>,
    pub cmd: PathCmd,
}

impl PathQuery {
    /// Query rooted at an explicit record; `path` is the part after `type/id`.
    pub fn new(data_type: &str, id: &str, path: &str) -> Result<PathQuery> {
        if data_type.is_empty() || id.is_empty() {
            return Err(Error::bad_request("query needs a record type and id"));
        }
        let (segments, cmd) = Self::parse_path(path)?;
        Ok(PathQuery {
            data_type: data_type.to_string(),
            id: id.to_string(),
            segments,
            cmd,
        })
    }

    /// Parse a full `type/id[/path][?cmd]` string.
    pub fn parse(full: &str) -> Result<PathQuery> {
        let trimmed = full.trim_start_matches('/');
        let mut parts = trimmed.splitn(3, '/');
        let data_type = parts.next().unwrap_or_default();
        let id_part = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();
        // The id may carry the command directly: `type/id?ref`.
        let (id, rest) = match id_part.find(CMD_PREFIX) {
            Some(q) if rest.is_empty() => (&id_part[..q], &id_part[q..]),
            Some(_) => return Err(Error::bad_request(format!("malformed path `{full}`"))),
            None => (id_part, rest),
        };
        Self::new(data_type, id, rest)
    }

    fn parse_path(path: &str) -> Result<(Vec<Segment>, PathCmd)> {
        let (path, cmd) = match path.find(CMD_PREFIX) {
            None => (path, None),
            Some(q) => {
                let cmd = &path[q + 1..];
                if cmd.contains(CMD_PREFIX) {
                    return Err(Error::path(
                        PathErrorKind::InvalidPathCmd,
                        format!("more than one command in `{path}`"),
                    ));
                }
                (&path[..q], Some(PathCmd::parse(cmd)?))
            }
        };
        let mut raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let flat_alias = raw.last() == Some(&FLAT_SUFFIX);
        if flat_alias {
            raw.pop();
        }
        let cmd = match (cmd, flat_alias) {
            (Some(_), true) => {
                return Err(Error::path(
                    PathErrorKind::InvalidPathCmd,
                    format!("`/{FLAT_SUFFIX}` cannot be combined with another command"),
                ))
            }
            (None, true) => PathCmd::Flat,
            (Some(c), false) => c,
            (None, false) => PathCmd::Value,
        };
        let segments = raw
            .into_iter()
            .map(Segment::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok((segments, cmd))
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(Segment::is_wildcard)
    }

    /// Path after `type/id`, without the command.
    pub fn attr_path(&self) -> String {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        parts.join("/")
    }
}

impl fmt::Display for PathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.data_type, self.id)?;
        for s in &self.segments {
            write!(f, "/{s}")?;
        }
        if self.cmd != PathCmd::Value {
            write!(f, "{}", self.cmd)?;
        }
        Ok(())
    }
}
