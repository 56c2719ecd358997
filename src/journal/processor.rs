// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::handler::DataHandler;
use crate::journal::{CmtIndexChanges, JournalEntry, SchemaChanges};

/// Reacts to journal entries of the types it handles.
///
/// `process` reports "nothing to do" as `Error::NotModified`; the worker treats that as
/// success.
pub trait JournalProcessor {
    fn name(&self) -> &str;

    fn handles_type(&self, handler: &DataHandler, data_type: &str) -> Result<bool>;

    fn process(
        &self,
        handler: &DataHandler,
        data_type: &str,
        data_id: &str,
        entry: &JournalEntry,
    ) -> Result<()>;
}

// Upper bound on drain passes; index propagation settles long before.
const MAX_PASSES: usize = 1024;

/// Drains the journal of a [`DataHandler`] through a list of processors.
pub struct JournalWorker<'h> {
    handler: &'h DataHandler,
    processors: Vec<Box<dyn JournalProcessor>>,
}

impl<'h> JournalWorker<'h> {
    /// Worker with the schema and index processors.
    pub fn new(handler: &'h DataHandler) -> Self {
        Self::with_processors(
            handler,
            vec![Box::new(SchemaChanges), Box::new(CmtIndexChanges)],
        )
    }

    pub fn with_processors(handler: &'h DataHandler, processors: Vec<Box<dyn JournalProcessor>>) -> Self {
        Self {
            handler,
            processors,
        }
    }

    /// Process every active entry of `data_type/data_id`; returns how many were consumed.
    ///
    /// A processor failure leaves the entry active and stops the run.
    pub fn process_record(&self, data_type: &str, data_id: &str) -> Result<usize> {
        let (count, result) = self.drain(data_type, data_id);
        result.map(|()| count)
    }

    // Entries consumed before the first failure, and that failure.
    fn drain(&self, data_type: &str, data_id: &str) -> (usize, Result<()>) {
        let journal = self.handler.journal();
        let mut handlers = vec![];
        for p in &self.processors {
            match p.handles_type(self.handler, data_type) {
                Ok(true) => handlers.push(p),
                Ok(false) => (),
                Err(e) => return (0, Err(e)),
            }
        }
        let mut count = 0;
        loop {
            let entry = match journal.next_entry(data_type, data_id) {
                Ok(e) => e,
                Err(e) if e.is_not_found() => return (count, Ok(())),
                Err(e) => return (count, Err(e)),
            };
            for p in &handlers {
                match p.process(self.handler, data_type, data_id, &entry) {
                    Ok(()) => (),
                    Err(Error::NotModified(msg)) => {
                        debug!(processor = p.name(), data_type, data_id, idx = entry.idx, %msg, "no change")
                    }
                    Err(e) => {
                        warn!(processor = p.name(), data_type, data_id, page = entry.page, idx = entry.idx, error = %e, "journal entry failed");
                        let e = e.context(format!(
                            "{} on {data_type}/{data_id} page {} entry {}",
                            p.name(),
                            entry.page,
                            entry.idx
                        ));
                        return (count, Err(e));
                    }
                }
            }
            if let Err(e) = journal.archive(data_type, data_id, &entry) {
                return (count, Err(e));
            }
            count += 1;
        }
    }

    /// Keep processing until no record has an active entry; returns entries consumed.
    ///
    /// A record whose entry fails is left pending and the others are still drained. The run
    /// fails once a pass consumes nothing while records are pending.
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut total = 0;
        for _ in 0..MAX_PASSES {
            let pending = self.handler.journal().pending()?;
            if pending.is_empty() {
                return Ok(total);
            }
            let mut consumed = 0;
            let mut failed = vec![];
            for (data_type, data_id) in pending {
                let (count, result) = self.drain(&data_type, &data_id);
                consumed += count;
                if let Err(e) = result {
                    warn!(data_type = %data_type, data_id = %data_id, error = %e, "record left pending");
                    failed.push(e);
                }
            }
            total += consumed;
            if consumed == 0 && !failed.is_empty() {
                let stuck = failed.len();
                let first = failed.remove(0);
                return Err(first.context(format!("{stuck} record(s) stuck in the journal")));
            }
        }
        Err(Error::Internal(anyhow::anyhow!(
            "journal did not settle after {MAX_PASSES} passes"
        )))
    }
}
