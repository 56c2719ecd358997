// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;

/// Kind of a schema construction or evaluation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    InvalidSchema,
    UnresolvedRef,
    MissingKeyAttribute,
    TemplateValidation,
}

/// Kind of a path resolution failure. All of them are bad requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathErrorKind {
    UnknownAttribute,
    MissingIndex,
    UnsupportedNesting,
    InvalidPathCmd,
    BadRequest,
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaErrorKind::InvalidSchema => "invalid schema",
            SchemaErrorKind::UnresolvedRef => "unresolved ref",
            SchemaErrorKind::MissingKeyAttribute => "missing key attribute",
            SchemaErrorKind::TemplateValidation => "template validation failed",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PathErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PathErrorKind::UnknownAttribute => "unknown attribute",
            PathErrorKind::MissingIndex => "missing index",
            PathErrorKind::UnsupportedNesting => "unsupported nesting",
            PathErrorKind::InvalidPathCmd => "invalid path command",
            PathErrorKind::BadRequest => "bad request",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind}: {msg}")]
    Schema { kind: SchemaErrorKind, msg: String },

    #[error("{kind}: {msg}")]
    Path { kind: PathErrorKind, msg: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not modified: {0}")]
    NotModified(String),

    #[error("lock conflict: {0}")]
    LockConflict(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(e.into())
    }
}

impl Error {
    pub fn schema(kind: SchemaErrorKind, msg: impl Into<String>) -> Self {
        Error::Schema {
            kind,
            msg: msg.into(),
        }
    }

    pub fn path(kind: PathErrorKind, msg: impl Into<String>) -> Self {
        Error::Path {
            kind,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::path(PathErrorKind::BadRequest, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn not_modified(msg: impl Into<String>) -> Self {
        Error::NotModified(msg.into())
    }

    /// Transport status for this error.
    pub fn status(&self) -> u16 {
        match self {
            Error::Schema { .. } | Error::Path { .. } => 400,
            Error::NotFound(_) => 404,
            Error::NotModified(_) => 304,
            Error::Conflict(_) => 409,
            Error::LockConflict(_) => 423,
            Error::Internal(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self, Error::NotModified(_))
    }

    pub fn schema_kind(&self) -> Option<SchemaErrorKind> {
        match self {
            Error::Schema { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn path_kind(&self) -> Option<PathErrorKind> {
        match self {
            Error::Path { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Prefix the message with `ctx`, keeping the kind.
    pub fn context(self, ctx: impl fmt::Display) -> Self {
        match self {
            Error::Schema { kind, msg } => Error::Schema {
                kind,
                msg: format!("{ctx}: {msg}"),
            },
            Error::Path { kind, msg } => Error::Path {
                kind,
                msg: format!("{ctx}: {msg}"),
            },
            Error::NotFound(msg) => Error::NotFound(format!("{ctx}: {msg}")),
            Error::NotModified(msg) => Error::NotModified(format!("{ctx}: {msg}")),
            Error::LockConflict(msg) => Error::LockConflict(format!("{ctx}: {msg}")),
            Error::Conflict(msg) => Error::Conflict(format!("{ctx}: {msg}")),
            Error::Internal(e) => Error::Internal(e.context(ctx.to_string())),
        }
    }
}
