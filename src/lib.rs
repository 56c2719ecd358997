// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Schema-governed, path-addressable records.
//!
//! Records are JSON-like documents whose shape is declared by a schema. Any value inside a
//! record, including values reached by following content-media-type references into other
//! records, is addressed by a slash-delimited path with an optional command suffix
//! (`?value`, `?ref`, `?schema`, `?flat`, `?iterator`). Reverse indexes declared through
//! index templates are kept consistent by a paged journal and a set of processors.

mod autoindex;
mod config;
mod error;
mod handler;
mod journal;
mod lock;
mod number;
mod patch;
mod path;
mod record;
mod schema;
mod source;
mod storage;
mod template;
mod value;

#[cfg(feature = "arc")]
pub(crate) use std::sync::Arc as Rc;

#[cfg(not(feature = "arc"))]
pub(crate) use std::rc::Rc;

pub use autoindex::{discover, validate_index_template, AutoIndex, CmtIndex, Subscriber, VersionIndex};
pub use config::{Config, JournalConfig, LockConfig, SchemaConfig, TableConfig};
pub use error::{Error, PathErrorKind, Result, SchemaErrorKind};
pub use handler::DataHandler;
pub use journal::{
    CmtIndexChanges, Journal, JournalEntry, JournalPage, JournalProcessor, JournalWorker,
    SchemaChanges,
};
pub use lock::{PathLock, PathLockManager, PathLockRequest};
pub use number::Number;
pub use path::{
    render, NodeId, NodeKind, PathChain, PathCmd, PathNode, PathQuery, PathResolver, Segment,
    PATH_NAME_TYPE, WILDCARD,
};
pub use record::{Record, Version};
pub use schema::{
    archived_schema_id, AttrDef, AttrType, CmtRef, RecordValidator, RefProblem, RefValidator, SchemaArena,
    SchemaId, SchemaModel,
};
pub use source::{RecordSet, RecordSource, TraversalCache};
pub use storage::{Keys, MemoryStorage, Storage};
pub use template::Template;
pub use value::Value;
