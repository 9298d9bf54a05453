//! # Havvarsel Sea Sensor Core Library
//!
//! This library polls the Havvarsel ocean forecast service run by the Norwegian
//! Institute of Marine Research and turns its projections into sensors: one per
//! oceanographic variable, each carrying its latest value plus the full
//! time series as attributes.
//!
//! ## Data Flow
//!
//! 1. **Fetch**: [`api::HavvarselClient`] requests the projection for a
//!    [`Location`] together with the variable metadata
//! 2. **Normalize**: the JSON body becomes a [`Projection`] holding one sorted
//!    [`Series`] per variable
//! 3. **Share**: [`coordinator::Coordinator`] caches the projection and
//!    publishes it to every subscriber after each tick
//! 4. **Project**: each [`sensor::Sensor`] reads its own variable out of the
//!    shared cache without touching the network
//!
//! One fetch per tick feeds any number of sensors, so enabling more variables
//! never multiplies the load on the remote service.
//!
//! ## Core Types
//!
//! - [`Location`]: validated longitude/latitude/depth
//! - [`Point`] and [`Series`]: timestamped values for one variable
//! - [`VariableMetadata`]: units and names from the metadata endpoint
//! - [`Projection`]: everything one successful fetch produced

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod renderer;
pub mod sensor;
pub mod setup;

pub use error::HavvarselError;

/// A geographic position and depth to request projections for.
///
/// Fields are private so a `Location` is valid by construction: coordinates
/// are finite and within range, depth is finite and not negative. Once a
/// station is set up its location never changes.
///
/// # Example
/// ```
/// use havvarsel_lib::Location;
///
/// let nordnes = Location::new(5.303883, 60.400485, 0.0).unwrap();
/// assert_eq!(nordnes.depth(), 0.0);
///
/// assert!(Location::new(5.3, 60.4, -5.0).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Location {
    longitude: f64,
    latitude: f64,
    depth: f64,
}

impl Location {
    /// Validate and build a location.
    pub fn new(longitude: f64, latitude: f64, depth: f64) -> Result<Self, HavvarselError> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(HavvarselError::Configuration(format!(
                "longitude {longitude} must be a finite value between -180 and 180"
            )));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(HavvarselError::Configuration(format!(
                "latitude {latitude} must be a finite value between -90 and 90"
            )));
        }
        if !depth.is_finite() || depth < 0.0 {
            return Err(HavvarselError::Configuration(format!(
                "depth {depth} must be a finite number of meters >= 0"
            )));
        }

        Ok(Self {
            longitude,
            latitude,
            depth,
        })
    }

    /// Longitude in degrees
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Latitude in degrees
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Depth below the surface in meters
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// The requested coordinates as a grid point, used when the service does
    /// not report its own nearest grid point.
    pub fn as_grid_point(&self) -> GridPoint {
        GridPoint {
            lat: self.latitude,
            lon: self.longitude,
        }
    }
}

/// The model grid cell the service actually used for a request.
///
/// The ocean model has a fixed resolution, so this usually differs slightly
/// from the requested coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A single value at a specific instant.
///
/// `value` is `None` when the service sent something that is not a number
/// (null or a non-numeric string). The point is kept so the series still shows
/// the gap.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Point {
    #[serde(rename = "timestamp")]
    pub time: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Chronologically ordered points for one variable at one location.
///
/// The service does not promise any ordering, so the points are sorted on
/// construction. Past and forecast points are mixed freely.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use havvarsel_lib::{Point, Series};
///
/// let t = |h| Utc.with_ymd_and_hms(2025, 10, 19, h, 0, 0).unwrap();
/// let series = Series::from_points(vec![
///     Point { time: t(3), value: Some(11.2) },
///     Point { time: t(1), value: Some(11.6) },
///     Point { time: t(2), value: Some(11.4) },
/// ]);
///
/// assert_eq!(series.latest().unwrap().value, Some(11.2));
/// assert_eq!(series.points()[0].time, t(1));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Series {
    points: Vec<Point>,
}

impl Series {
    /// Build a series, sorting the points by timestamp.
    pub fn from_points(mut points: Vec<Point>) -> Self {
        points.sort_by_key(|point| point.time);
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The most recent point that carries a value.
    pub fn latest(&self) -> Option<&Point> {
        self.points.iter().rev().find(|point| point.value.is_some())
    }

    /// The point with a value whose timestamp is closest to `instant`.
    ///
    /// Ties go to the earlier point.
    pub fn nearest_to(&self, instant: DateTime<Utc>) -> Option<&Point> {
        self.points
            .iter()
            .filter(|point| point.value.is_some())
            .min_by_key(|point| (point.time - instant).num_milliseconds().abs())
    }
}

/// Metadata the service publishes for a variable (units, names, ...).
///
/// The service sends metadata as a list of key/value pairs; all pairs are kept
/// and the common ones have accessors.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VariableMetadata {
    entries: BTreeMap<String, String>,
}

impl VariableMetadata {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn units(&self) -> Option<&str> {
        self.get("units")
    }

    pub fn standard_name(&self) -> Option<&str> {
        self.get("standard_name")
    }

    pub fn long_name(&self) -> Option<&str> {
        self.get("long_name")
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlay `other` on top of this metadata; keys in `other` win.
    pub fn merge(&mut self, other: VariableMetadata) {
        self.entries.extend(other.entries);
    }
}

/// Metadata and series for one variable in a projection.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VariableSeries {
    pub metadata: VariableMetadata,
    pub series: Series,
}

/// Everything a single successful fetch produced for one location.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Projection {
    /// One entry per variable present in the response, each with a non-empty series
    pub variables: BTreeMap<String, VariableSeries>,
    /// The location that was requested
    pub requested: Location,
    /// Grid point the model used; the requested coordinates if the service did not say
    pub nearest_grid: GridPoint,
    /// Depth the model actually used, when reported
    pub depth_in_meters: Option<f64>,
}

impl Projection {
    pub fn variable(&self, name: &str) -> Option<&VariableSeries> {
        self.variables.get(name)
    }
}
