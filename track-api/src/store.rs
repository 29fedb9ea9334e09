use crate::errors::Result;
use crate::metrics::BUTTON_PRESSES_TOTAL;
use crate::model::{SortOrder, StoredRecord};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// In-memory time-series store: one timestamp-ordered series per device
#[derive(Debug, Default)]
pub struct TrackStore {
    series: RwLock<HashMap<String, Vec<StoredRecord>>>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts records, replacing any existing record with the same device
    /// and timestamp.
    pub async fn insert_many(&self, records: Vec<StoredRecord>) {
        let mut series = self.series.write().await;
        for record in records {
            if record.payloads.is_button_press() {
                BUTTON_PRESSES_TOTAL.inc();
                match (record.payloads.lat, record.payloads.lon) {
                    (Some(lat), Some(lon)) => warn!(
                        "Button pressed on {} at {},{}: https://www.google.com/maps?q={},{}",
                        record.imsi, lat, lon, lat, lon
                    ),
                    _ => warn!("Button pressed on {} without a position fix", record.imsi),
                }
            }

            let entries = series.entry(record.imsi.clone()).or_default();
            match entries.binary_search_by_key(&record.timestamp, |r| r.timestamp) {
                Ok(index) => entries[index] = record,
                Err(index) => entries.insert(index, record),
            }
        }
    }

    /// Records of `imsi` with `from <= timestamp <= to`, at most `limit` of
    /// them, starting from the newest (`Desc`) or oldest (`Asc`) end.
    pub async fn query(
        &self,
        imsi: &str,
        from: Option<i64>,
        to: Option<i64>,
        order: SortOrder,
        limit: usize,
    ) -> Vec<StoredRecord> {
        let series = self.series.read().await;
        let Some(entries) = series.get(imsi) else {
            return Vec::new();
        };

        let in_range = entries.iter().filter(|r| {
            from.map_or(true, |from| r.timestamp >= from) && to.map_or(true, |to| r.timestamp <= to)
        });

        match order {
            SortOrder::Asc => in_range.take(limit).cloned().collect(),
            SortOrder::Desc => in_range.rev().take(limit).cloned().collect(),
        }
    }

    pub async fn device_count(&self) -> usize {
        self.series.read().await.len()
    }

    pub async fn record_count(&self) -> usize {
        self.series.read().await.values().map(Vec::len).sum()
    }
}

/// Reads a JSON array of records
pub fn load_records(path: &Path) -> Result<Vec<StoredRecord>> {
    let bytes = std::fs::read(path)?;
    let records: Vec<StoredRecord> = serde_json::from_slice(&bytes)?;
    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}
