// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::Result;
use schemapath::*;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test output. Controlled with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn handler() -> Result<DataHandler> {
    init_tracing();
    Ok(DataHandler::in_memory(Config::default())?)
}

pub fn record(json: &str) -> Result<Record> {
    Ok(Record::from_json_str(json)?)
}

pub fn add(h: &DataHandler, json: &str) -> Result<()> {
    h.add(record(json)?)?;
    Ok(())
}

/// Drain the journal and return the number of consumed entries.
pub fn settle(h: &DataHandler) -> Result<usize> {
    Ok(JournalWorker::new(h).run_until_idle()?)
}

pub fn strings(v: &Value) -> Result<Vec<String>> {
    Ok(v.as_array()?
        .iter()
        .filter_map(|s| s.as_str().map(str::to_string))
        .collect())
}
