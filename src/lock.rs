// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::config::LockConfig;
use crate::error::{Error, Result};

/// A live advisory lock on a record sub-tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLock {
    pub handle: String,
    pub owner: String,
    pub path: String,
    pub segments: Vec<String>,
    pub expire_time: DateTime<Utc>,
}

impl PathLock {
    pub fn data_type(&self) -> &str {
        &self.segments[0]
    }

    pub fn data_id(&self) -> &str {
        &self.segments[1]
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_time <= now
    }

    // Overlap: one path is a prefix of the other.
    fn overlaps(&self, segments: &[String]) -> bool {
        self.segments
            .iter()
            .zip(segments.iter())
            .all(|(a, b)| a == b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLockRequest {
    pub owner: String,
    pub path: String,
    pub ttl: Duration,
}

/// Hierarchical lock table keyed by lock handle.
///
/// Two locks conflict when one path is a prefix of, or equal to, the other and their owners
/// differ. A lock covers at least `type/id`.
#[derive(Debug)]
pub struct PathLockManager {
    max_ttl: Duration,
    locks: Mutex<IndexMap<String, PathLock>>,
}

impl Default for PathLockManager {
    fn default() -> Self {
        Self::new(&LockConfig::default())
    }
}

pub(crate) fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl PathLockManager {
    pub fn new(config: &LockConfig) -> Self {
        Self {
            max_ttl: Duration::seconds(config.max_ttl_secs as i64),
            locks: Mutex::new(IndexMap::new()),
        }
    }

    /// Build a request. An empty owner gets a fresh identity, a non-positive `ttl_secs` the
    /// configured maximum.
    pub fn new_request(&self, owner: &str, path: &str, ttl_secs: i64) -> PathLockRequest {
        let owner = match owner {
            "" => Uuid::new_v4().to_string(),
            o => o.to_string(),
        };
        let ttl = match ttl_secs {
            t if t <= 0 => self.max_ttl,
            t => Duration::seconds(t),
        };
        PathLockRequest {
            owner,
            path: path.to_string(),
            ttl,
        }
    }

    pub fn lock(&self, req: &PathLockRequest) -> Result<String> {
        self.lock_at(req, Utc::now())
    }

    /// Acquire or refresh a lock as of `now`.
    pub fn lock_at(&self, req: &PathLockRequest, now: DateTime<Utc>) -> Result<String> {
        let segments = split_path(&req.path);
        if segments.len() < 2 {
            return Err(Error::bad_request(format!(
                "cannot lock `{}`, expected `type/id[/path]`",
                req.path
            )));
        }
        let mut locks = self.locks.lock();
        locks.retain(|_, l| !l.is_expired(now));

        let existing = find_owned(&locks, &req.owner, &segments)?;
        let expire_time = now + req.ttl;
        match existing {
            Some(handle) => {
                let lock = locks
                    .get_mut(&handle)
                    .ok_or_else(|| Error::Internal(anyhow::anyhow!("lock {handle} vanished")))?;
                // A broader request widens the owned lock.
                if lock.segments.len() > segments.len() {
                    lock.segments = segments;
                    lock.path = req.path.clone();
                }
                lock.expire_time = expire_time;
                debug!(handle = %handle, path = %lock.path, "refreshed lock");
                Ok(handle)
            }
            None => {
                let handle = Uuid::new_v5(
                    &Uuid::NAMESPACE_OID,
                    format!("{}/{}", req.owner, req.path).as_bytes(),
                )
                .to_string();
                debug!(handle = %handle, owner = %req.owner, path = %req.path, "acquired lock");
                locks.insert(
                    handle.clone(),
                    PathLock {
                        handle: handle.clone(),
                        owner: req.owner.clone(),
                        path: req.path.clone(),
                        segments,
                        expire_time,
                    },
                );
                Ok(handle)
            }
        }
    }

    /// The lock `owner` holds over `path`, if any.
    ///
    /// Fails with `LockConflict` when another owner holds an overlapping live lock.
    pub fn query_lock(&self, owner: &str, path: &str) -> Result<PathLock> {
        self.query_lock_at(owner, path, Utc::now())
    }

    pub fn query_lock_at(&self, owner: &str, path: &str, now: DateTime<Utc>) -> Result<PathLock> {
        let segments = split_path(path);
        let mut locks = self.locks.lock();
        locks.retain(|_, l| !l.is_expired(now));
        match find_owned(&locks, owner, &segments)? {
            Some(handle) => locks
                .get(&handle)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("lock on `{path}`"))),
            None => Err(Error::not_found(format!("lock on `{path}`"))),
        }
    }

    pub fn release(&self, handle: &str) -> bool {
        let removed = self.locks.lock().shift_remove(handle).is_some();
        if removed {
            debug!(handle = %handle, "released lock");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Handle of the lock `owner` holds over `segments`, or a conflict with another owner.
fn find_owned(
    locks: &IndexMap<String, PathLock>,
    owner: &str,
    segments: &[String],
) -> Result<Option<String>> {
    let mut owned = None;
    for lock in locks.values() {
        if !lock.overlaps(segments) {
            continue;
        }
        if lock.owner != owner {
            return Err(Error::LockConflict(format!(
                "`{}` is held by another owner as `{}`",
                segments.join("/"),
                lock.path
            )));
        }
        owned = Some(lock.handle.clone());
    }
    Ok(owned)
}
