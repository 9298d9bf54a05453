//! # Sensor Entities
//!
//! A sensor exposes one variable of one location. It owns nothing but a
//! receiver on its coordinator's shared state and never performs network I/O,
//! so any number of sensors cost exactly one fetch per tick.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::api::fallback_units;
use crate::coordinator::CachedResult;
use crate::{Location, Point, Series, VariableSeries};

/// Whether a sensor has something to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Fresh value from the last tick
    Available,
    /// Last tick failed; showing the value from an earlier success
    Stale,
    /// Never fetched, never succeeded, or the variable is missing from the response
    Unavailable,
}

/// Read-only attributes published alongside the sensor value.
#[derive(Debug, Clone, Serialize)]
pub struct SensorAttributes {
    pub longitude: f64,
    pub latitude: f64,
    pub depth: f64,
    pub nearest_grid_lon: f64,
    pub nearest_grid_lat: f64,
    /// Depth of the model layer the service answered from
    pub model_depth: Option<f64>,
    /// Timestamp of the current value
    pub timestamp: Option<DateTime<Utc>>,
    /// Point closest to the moment the attributes were computed
    pub nearest_to_now: Option<Point>,
    pub unit_of_measurement: Option<String>,
    pub standard_name: Option<String>,
    pub long_name: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub stale: bool,
    pub series: Series,
}

/// Display state of a sensor, all taken from the same coordinator tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub name: String,
    pub availability: Availability,
    pub value: Option<f64>,
    pub unit_of_measurement: Option<String>,
}

/// One variable at one location, backed by a coordinator's cache.
///
/// Every read takes a single snapshot of the cache, so the values returned by
/// one call always belong to the same tick.
#[derive(Debug, Clone)]
pub struct Sensor {
    unique_id: String,
    station: String,
    variable: String,
    location: Location,
    state: watch::Receiver<Arc<CachedResult>>,
}

impl Sensor {
    pub fn new(
        unique_id: impl Into<String>,
        station: impl Into<String>,
        variable: impl Into<String>,
        location: Location,
        state: watch::Receiver<Arc<CachedResult>>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            station: station.into(),
            variable: variable.into(),
            location,
            state,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// "{station} {long name}", or the variable name until metadata is known.
    pub fn name(&self) -> String {
        let snapshot = self.snapshot();
        self.name_from(self.entry(&snapshot))
    }

    /// Value of the latest point, or `None` when unavailable.
    pub fn current_value(&self) -> Option<f64> {
        self.current_point().and_then(|point| point.value)
    }

    /// Latest point carrying a value.
    pub fn current_point(&self) -> Option<Point> {
        let snapshot = self.snapshot();
        self.entry(&snapshot)?.series.latest().copied()
    }

    /// Value closest in time to `instant`.
    pub fn value_at(&self, instant: DateTime<Utc>) -> Option<f64> {
        let snapshot = self.snapshot();
        self.entry(&snapshot)?
            .series
            .nearest_to(instant)
            .and_then(|point| point.value)
    }

    pub fn availability(&self) -> Availability {
        let snapshot = self.snapshot();
        availability_of(&snapshot, self.entry(&snapshot))
    }

    pub fn unit_of_measurement(&self) -> Option<String> {
        let snapshot = self.snapshot();
        self.units_from(self.entry(&snapshot))
    }

    /// Name, availability, value and unit from one snapshot.
    pub fn state(&self) -> SensorState {
        let snapshot = self.snapshot();
        let entry = self.entry(&snapshot);
        SensorState {
            name: self.name_from(entry),
            availability: availability_of(&snapshot, entry),
            value: entry
                .and_then(|entry| entry.series.latest())
                .and_then(|point| point.value),
            unit_of_measurement: self.units_from(entry),
        }
    }

    /// Error of the coordinator's most recent tick, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }

    pub fn attributes(&self) -> Option<SensorAttributes> {
        self.attributes_at(Utc::now())
    }

    /// Attributes as of `now`; `None` while the variable is not in the cache.
    pub fn attributes_at(&self, now: DateTime<Utc>) -> Option<SensorAttributes> {
        let snapshot = self.snapshot();
        let projection = snapshot.projection.as_ref()?;
        let entry = self.entry(&snapshot)?;

        Some(SensorAttributes {
            longitude: self.location.longitude(),
            latitude: self.location.latitude(),
            depth: self.location.depth(),
            nearest_grid_lon: projection.nearest_grid.lon,
            nearest_grid_lat: projection.nearest_grid.lat,
            model_depth: projection.depth_in_meters,
            timestamp: entry.series.latest().map(|point| point.time),
            nearest_to_now: entry.series.nearest_to(now).copied(),
            unit_of_measurement: self.units_from(Some(entry)),
            standard_name: entry.metadata.standard_name().map(str::to_string),
            long_name: entry.metadata.long_name().map(str::to_string),
            last_update: snapshot.last_update,
            stale: snapshot.is_stale(),
            series: entry.series.clone(),
        })
    }

    /// Wait for the coordinator's next tick. Returns false once the
    /// coordinator is gone.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    fn snapshot(&self) -> Arc<CachedResult> {
        self.state.borrow().clone()
    }

    fn entry<'a>(&self, snapshot: &'a CachedResult) -> Option<&'a VariableSeries> {
        snapshot.projection.as_ref()?.variable(&self.variable)
    }

    fn name_from(&self, entry: Option<&VariableSeries>) -> String {
        let label = entry
            .and_then(|entry| entry.metadata.long_name())
            .unwrap_or(&self.variable);
        format!("{} {}", self.station, label)
    }

    fn units_from(&self, entry: Option<&VariableSeries>) -> Option<String> {
        entry
            .and_then(|entry| entry.metadata.units())
            .or_else(|| fallback_units(&self.variable))
            .map(str::to_string)
    }
}

fn availability_of(snapshot: &CachedResult, entry: Option<&VariableSeries>) -> Availability {
    match entry {
        Some(entry) if entry.series.latest().is_some() => {
            if snapshot.last_update_success {
                Availability::Available
            } else {
                Availability::Stale
            }
        }
        _ => Availability::Unavailable,
    }
}
