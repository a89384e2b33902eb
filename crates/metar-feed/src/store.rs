//! Station table shared between the refresh loop and readers.
//!
//! Readers never hold the lock while they work: the table lives behind an
//! `Arc` that is swapped wholesale on every merge, so a lookup only clones
//! the current pointer and reads from that snapshot. A merge builds the next
//! table off to the side and publishes it in a single pointer swap, which
//! makes every batch visible all at once or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::types::AirportData;

type Table = HashMap<String, Arc<AirportData>>;

/// Latest observation per station, never shrinking.
#[derive(Debug, Default)]
pub struct StationStore {
    current: RwLock<Arc<Table>>,
    /// Serializes merges so that concurrent writers cannot lose updates
    writer: Mutex<()>,
}

impl StationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<Table> {
        Arc::clone(&self.current.read())
    }

    /// Insert or replace every record of `batch` by station id.
    ///
    /// Stations absent from the batch keep their previous record. Within a
    /// batch, the last record for a station wins. Records without a station
    /// id are skipped rather than upserted under an empty key. Returns the
    /// number of records applied.
    pub fn merge(&self, batch: Vec<AirportData>) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let _writer = self.writer.lock();
        let mut next: Table = self.snapshot().as_ref().clone();
        let mut applied = 0;

        for record in batch {
            if record.station_id.is_empty() {
                tracing::debug!("Skipping record without station id: {}", record.raw_text);
                continue;
            }
            next.insert(record.station_id.clone(), Arc::new(record));
            applied += 1;
        }

        *self.current.write() = Arc::new(next);
        applied
    }

    /// Copy of the record for `station_id`, if any cycle has reported it.
    pub fn get(&self, station_id: &str) -> Option<AirportData> {
        self.snapshot().get(station_id).map(|record| AirportData::clone(record))
    }

    /// Station ids known at this instant, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
