use crate::model::{GpsPayload, StoredRecord};
use rand::Rng;

/// Where simulated devices start wandering from
const ORIGIN_LAT: f64 = 35.68;
const ORIGIN_LON: f64 = 139.76;
/// Largest step between two samples, in degrees
const MAX_STEP_DEG: f64 = 0.002;

#[derive(Debug, Clone)]
pub struct TrackPlan {
    pub imsi: String,
    pub count: usize,
    /// Timestamp of the newest sample, epoch milliseconds
    pub newest_ms: i64,
    pub interval_ms: i64,
}

/// Random walk for one device, oldest sample first
pub fn simulate_track(rng: &mut impl Rng, plan: &TrackPlan) -> Vec<StoredRecord> {
    let mut lat = ORIGIN_LAT + rng.gen_range(-0.05..0.05);
    let mut lon = ORIGIN_LON + rng.gen_range(-0.05..0.05);
    let oldest_ms = plan.newest_ms - plan.interval_ms * plan.count.saturating_sub(1) as i64;

    (0..plan.count)
        .map(|i| {
            lat = (lat + rng.gen_range(-MAX_STEP_DEG..MAX_STEP_DEG)).clamp(-90.0, 90.0);
            lon = (lon + rng.gen_range(-MAX_STEP_DEG..MAX_STEP_DEG)).clamp(-180.0, 180.0);
            StoredRecord {
                imsi: plan.imsi.clone(),
                timestamp: oldest_ms + plan.interval_ms * i as i64,
                payloads: generate_payload(rng, lat, lon),
            }
        })
        .collect()
}

fn generate_payload(rng: &mut impl Rng, lat: f64, lon: f64) -> GpsPayload {
    // 10% of reports come without a position fix
    let fix = !rng.gen_bool(0.10);

    let bat = if rng.gen_bool(0.05) {
        1 // 5% low battery
    } else {
        rng.gen_range(2..=3)
    };

    GpsPayload {
        lat: fix.then_some(lat),
        lon: fix.then_some(lon),
        bat,
        temp: round1(rng.gen_range(15.0..35.0)),
        humi: round1(rng.gen_range(30.0..80.0)),
        kind: if rng.gen_bool(0.02) { 1 } else { 0 },
        rs: rng.gen_range(1..=5),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
