// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::Result;
use chrono::{Duration, Utc};
use schemapath::*;

fn conflicts(mgr: &PathLockManager, owner: &str, path: &str) -> bool {
    matches!(
        mgr.lock(&mgr.new_request(owner, path, 30)),
        Err(Error::LockConflict(_))
    )
}

#[test]
fn prefix_paths_conflict_across_owners() -> Result<()> {
    let mgr = PathLockManager::default();
    mgr.lock(&mgr.new_request("u1", "host/h1", 30))?;

    assert!(conflicts(&mgr, "u2", "host/h1/nics[aa]"));
    assert!(conflicts(&mgr, "u2", "host/h1"));
    // Shorter than `type/id` is rejected before any conflict check.
    assert!(mgr.lock(&mgr.new_request("u2", "host", 30)).is_err());

    // Siblings are independent.
    mgr.lock(&mgr.new_request("u2", "host/h2", 30))?;
    mgr.lock(&mgr.new_request("u2", "rack/h1", 30))?;
    assert_eq!(mgr.len(), 3);
    Ok(())
}

#[test]
fn same_owner_reuses_its_lock() -> Result<()> {
    let mgr = PathLockManager::default();
    let narrow = mgr.lock(&mgr.new_request("u1", "host/h1/nics[aa]", 30))?;
    let wide = mgr.lock(&mgr.new_request("u1", "host/h1", 30))?;
    assert_eq!(narrow, wide);
    assert_eq!(mgr.len(), 1);

    let lock = mgr.query_lock("u1", "host/h1/labels")?;
    assert_eq!(lock.path, "host/h1");
    assert_eq!(lock.data_type(), "host");
    assert_eq!(lock.data_id(), "h1");

    // Re-locking a narrower path keeps the wider lock.
    let again = mgr.lock(&mgr.new_request("u1", "host/h1/nics[aa]", 30))?;
    assert_eq!(again, wide);
    assert_eq!(mgr.query_lock("u1", "host/h1")?.path, "host/h1");
    Ok(())
}

#[test]
fn query_reports_foreign_locks() -> Result<()> {
    let mgr = PathLockManager::default();
    mgr.lock(&mgr.new_request("u1", "host/h1/name", 30))?;
    assert!(matches!(
        mgr.query_lock("u2", "host/h1"),
        Err(Error::LockConflict(_))
    ));
    assert!(mgr.query_lock("u2", "host/h2").err().map(|e| e.is_not_found()).unwrap_or(false));
    Ok(())
}

#[test]
fn release_and_expiry_free_the_path() -> Result<()> {
    let mgr = PathLockManager::default();
    let now = Utc::now();
    let handle = mgr.lock_at(&mgr.new_request("u1", "host/h1", 5), now)?;
    assert!(mgr.release(&handle));
    assert!(!mgr.release(&handle));

    mgr.lock_at(&mgr.new_request("u1", "host/h1", 5), now)?;
    assert!(mgr
        .lock_at(&mgr.new_request("u2", "host/h1", 5), now + Duration::seconds(4))
        .is_err());
    mgr.lock_at(&mgr.new_request("u2", "host/h1", 5), now + Duration::seconds(5))?;
    assert_eq!(mgr.query_lock_at("u2", "host/h1", now + Duration::seconds(6))?.owner, "u2");
    Ok(())
}
