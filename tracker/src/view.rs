use crate::config::SyncConfig;
use crate::metrics::LIVE_MARKERS;
use crate::model::{LatLon, RawRecord, Scalar};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Marker placed on a map surface.
///
/// Not `Clone`: whoever holds the handle owns the marker, and giving it back
/// to [`MapSurface::remove_marker`] consumes it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MarkerHandle(Uuid);

impl MarkerHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl Default for MarkerHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewAnimation {
    pub pan_duration: Duration,
}

/// The map the track is drawn on
pub trait MapSurface {
    fn add_marker(&mut self, position: LatLon, label: &str) -> MarkerHandle;
    fn remove_marker(&mut self, handle: MarkerHandle);
    fn set_view(&mut self, center: LatLon, zoom: u8, animation: Option<ViewAnimation>);
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedMarker {
    pub position: LatLon,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    pub center: LatLon,
    pub zoom: u8,
}

/// In-memory map surface that only records and logs what it is told
#[derive(Debug, Default)]
pub struct HeadlessMap {
    markers: HashMap<Uuid, PlacedMarker>,
    view: Option<MapView>,
    recenters: usize,
}

impl HeadlessMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts out showing `center` without counting as a recenter
    pub fn with_view(center: LatLon, zoom: u8) -> Self {
        Self {
            view: Some(MapView { center, zoom }),
            ..Self::default()
        }
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn markers(&self) -> impl Iterator<Item = &PlacedMarker> {
        self.markers.values()
    }

    pub fn has_marker(&self, handle: &MarkerHandle) -> bool {
        self.markers.contains_key(&handle.id())
    }

    pub fn view(&self) -> Option<MapView> {
        self.view
    }

    /// Number of `set_view` calls received
    pub fn recenters(&self) -> usize {
        self.recenters
    }
}

impl MapSurface for HeadlessMap {
    fn add_marker(&mut self, position: LatLon, label: &str) -> MarkerHandle {
        let handle = MarkerHandle::new();
        debug!("Marker {} at {} ({})", handle.id(), position, label);
        self.markers.insert(
            handle.id(),
            PlacedMarker {
                position,
                label: label.to_string(),
            },
        );
        handle
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        if self.markers.remove(&handle.id()).is_none() {
            debug!("Marker {} was not on the map", handle.id());
        }
    }

    fn set_view(&mut self, center: LatLon, zoom: u8, animation: Option<ViewAnimation>) {
        debug!("View centered on {} at zoom {} ({:?})", center, zoom, animation);
        self.view = Some(MapView { center, zoom });
        self.recenters += 1;
    }
}

/// One displayed sample. Owns its marker when it has a position fix.
#[derive(Debug)]
pub struct DisplayRecord {
    pub position: Option<LatLon>,
    pub timestamp: i64,
    pub display_time: String,
    pub battery: Option<Scalar>,
    pub temperature: Option<Scalar>,
    pub humidity: Option<Scalar>,
    pub kind: Option<Scalar>,
    marker: Option<MarkerHandle>,
}

impl DisplayRecord {
    fn from_raw(raw: RawRecord) -> Self {
        let position = raw.payloads.position();
        Self {
            position,
            timestamp: raw.timestamp,
            display_time: display_time(raw.timestamp),
            battery: raw.payloads.bat,
            temperature: raw.payloads.temp,
            humidity: raw.payloads.humi,
            kind: raw.payloads.kind,
            marker: None,
        }
    }

    pub fn marker(&self) -> Option<&MarkerHandle> {
        self.marker.as_ref()
    }
}

pub fn display_time(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileSummary {
    pub records: usize,
    pub markers: usize,
    pub recentered_on: Option<LatLon>,
}

/// Owns the displayed records and keeps the map's markers in one-to-one
/// correspondence with them.
#[derive(Debug)]
pub struct ViewReconciler<M> {
    map: M,
    records: Vec<DisplayRecord>,
    zoom: u8,
    animation: Option<ViewAnimation>,
}

impl<M: MapSurface> ViewReconciler<M> {
    pub fn new(map: M, config: &SyncConfig) -> Self {
        Self {
            map,
            records: Vec::new(),
            zoom: config.recenter_zoom,
            animation: config
                .pan_duration
                .map(|pan_duration| ViewAnimation { pan_duration }),
        }
    }

    /// Tears down everything displayed and rebuilds from `records`, in order.
    /// The view recenters once, on the first record with a position fix.
    pub fn replace_all(&mut self, records: Vec<RawRecord>) -> ReconcileSummary {
        let removed = self.clear();
        let mut recentered_on = None;
        let mut markers = 0;

        self.records.reserve(records.len());
        for raw in records {
            let mut record = DisplayRecord::from_raw(raw);

            if let Some(position) = record.position {
                record.marker = Some(self.map.add_marker(position, &record.display_time));
                markers += 1;

                if recentered_on.is_none() {
                    self.map.set_view(position, self.zoom, self.animation);
                    recentered_on = Some(position);
                }
            }

            self.records.push(record);
        }

        LIVE_MARKERS.set(markers as f64);
        info!(
            "Displaying {} records with {} markers (replaced {} markers)",
            self.records.len(),
            markers,
            removed
        );

        ReconcileSummary {
            records: self.records.len(),
            markers,
            recentered_on,
        }
    }

    /// Removes every marker and releases every record. Returns the number of
    /// markers removed.
    pub fn clear(&mut self) -> usize {
        let mut removed = 0;
        for record in self.records.drain(..) {
            if let Some(marker) = record.marker {
                self.map.remove_marker(marker);
                removed += 1;
            }
        }
        LIVE_MARKERS.set(0.0);
        removed
    }

    pub fn records(&self) -> &[DisplayRecord] {
        &self.records
    }

    pub fn marker_count(&self) -> usize {
        self.records.iter().filter(|r| r.marker.is_some()).count()
    }

    pub fn map(&self) -> &M {
        &self.map
    }
}
