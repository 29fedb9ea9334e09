use crate::errors::FetchError;
use crate::model::{RawRecord, TrackPage};

const LAT_MIN: f64 = -90.0;
const LAT_MAX: f64 = 90.0;
const LON_MIN: f64 = -180.0;
const LON_MAX: f64 = 180.0;

/// Validates a decoded page before it may reach the view
pub fn validate_page(page: &TrackPage) -> Result<(), FetchError> {
    for (index, record) in page.items.iter().enumerate() {
        validate_record(record).map_err(|reason| {
            FetchError::Malformed(format!("record {}: {}", index, reason))
        })?;
    }

    // Newest first is part of the store contract
    if let Some(pair) = page
        .items
        .windows(2)
        .find(|pair| pair[0].timestamp < pair[1].timestamp)
    {
        return Err(FetchError::Malformed(format!(
            "records not in descending order ({} before {})",
            pair[0].timestamp, pair[1].timestamp
        )));
    }

    Ok(())
}

fn validate_record(record: &RawRecord) -> Result<(), String> {
    if record.timestamp < 0 {
        return Err(format!("timestamp {} is negative", record.timestamp));
    }
    if chrono::DateTime::from_timestamp_millis(record.timestamp).is_none() {
        return Err(format!("timestamp {} out of range", record.timestamp));
    }

    let payload = &record.payloads;
    match (payload.lat, payload.lon) {
        (Some(lat), Some(lon)) => {
            if !(LAT_MIN..=LAT_MAX).contains(&lat) {
                return Err(format!(
                    "latitude {} out of range [{}, {}]",
                    lat, LAT_MIN, LAT_MAX
                ));
            }
            if !(LON_MIN..=LON_MAX).contains(&lon) {
                return Err(format!(
                    "longitude {} out of range [{}, {}]",
                    lon, LON_MIN, LON_MAX
                ));
            }
        }
        (None, None) => {}
        _ => return Err("position has only one coordinate".to_string()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Payload;

    fn record(timestamp: i64, lat: Option<f64>, lon: Option<f64>) -> RawRecord {
        RawRecord {
            timestamp,
            payloads: Payload {
                lat,
                lon,
                ..Default::default()
            },
        }
    }

    fn page(items: Vec<RawRecord>) -> TrackPage {
        TrackPage { items, count: None }
    }

    #[test]
    fn test_valid_page() {
        let page = page(vec![
            record(3_000, Some(35.4), Some(136.0)),
            record(2_000, None, None),
            record(1_000, Some(-33.9), Some(151.2)),
        ]);
        assert!(validate_page(&page).is_ok());
    }

    #[test]
    fn test_empty_page_is_valid() {
        assert!(validate_page(&page(vec![])).is_ok());
    }

    #[test]
    fn test_invalid_latitude() {
        let page = page(vec![record(1_000, Some(91.0), Some(0.0))]);
        assert!(matches!(validate_page(&page), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_invalid_longitude() {
        let page = page(vec![record(1_000, Some(0.0), Some(-180.5))]);
        assert!(validate_page(&page).is_err());
    }

    #[test]
    fn test_half_position() {
        let page = page(vec![record(1_000, Some(35.0), None)]);
        assert!(validate_page(&page).is_err());
    }

    #[test]
    fn test_negative_timestamp() {
        let page = page(vec![record(-1, None, None)]);
        assert!(validate_page(&page).is_err());
    }

    #[test]
    fn test_ascending_order_rejected() {
        let page = page(vec![record(1_000, None, None), record(2_000, None, None)]);
        assert!(validate_page(&page).is_err());
    }

    #[test]
    fn test_equal_timestamps_allowed() {
        let page = page(vec![record(1_000, None, None), record(1_000, None, None)]);
        assert!(validate_page(&page).is_ok());
    }
}
