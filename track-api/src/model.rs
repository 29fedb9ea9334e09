use serde::{Deserialize, Serialize};

/// Payload reported by a GPS multi-unit device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Battery level, 1 (low) to 3 (full)
    pub bat: u8,
    pub temp: f64,
    pub humi: f64,
    /// 0 = periodic report, 1 = button pressed
    #[serde(rename = "type")]
    pub kind: u8,
    /// Signal strength
    pub rs: u8,
}

impl GpsPayload {
    pub fn is_button_press(&self) -> bool {
        self.kind == 1
    }
}

/// One stored sample, keyed by device and timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub imsi: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub payloads: GpsPayload,
}

/// Query result, shaped like the store's native query output
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResponse {
    pub items: Vec<StoredRecord>,
    pub count: usize,
    pub scanned_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}
