//! In-process feasibility store.

use std::sync::{Mutex, PoisonError};

use super::{FeasibilityRecord, FeasibilityStore, ReportError};

/// Keeps records in memory; run identifiers count up from `1`.
#[derive(Debug, Default)]
pub struct MemoryFeasibilityStore {
    records: Mutex<Vec<FeasibilityRecord>>,
}

impl FeasibilityStore for MemoryFeasibilityStore {
    fn append(&self, mut record: FeasibilityRecord) -> Result<u64, ReportError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let run_id = records.len() as u64 + 1;
        record.run_id = Some(run_id);
        records.push(record);
        Ok(run_id)
    }

    fn records(&self) -> Result<Vec<FeasibilityRecord>, ReportError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
