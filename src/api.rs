//! # Havvarsel API Client
//!
//! This module handles all network operations against the Havvarsel ocean
//! forecast service and turns its JSON into a [`Projection`].
//!
//! ## Endpoints
//!
//! - `GET {base}/dataprojection/{vars}/{lon}/{lat}?depth={depth}`: time series
//!   for a comma-separated list of variables at the grid point closest to the
//!   requested coordinates
//! - `GET {base}/dataprojectionvariables`: metadata (units, names) for every
//!   variable the projection endpoint offers
//!
//! ## Response Formats
//!
//! The projection endpoint answers with time points, each carrying all
//! variables as key/value pairs (values are usually numeric strings):
//!
//! ```json
//! {
//!   "data": [
//!     { "rawTime": 1760853600000,
//!       "data": [ {"key": "temperature", "value": "11.593"},
//!                 {"key": "salinity", "value": "28.152"} ] }
//!   ],
//!   "closestGridPointWithData": { "lat": 60.40, "lon": 5.30 },
//!   "depthInMeters": 0
//! }
//! ```
//!
//! The older `temperatureprojection` endpoint groups by variable instead
//! (`{"variables": [{"variableName", "metadata", "data": [{"rawTime", "value"}]}]}`).
//! Both shapes are accepted.
//!
//! ## Error Handling
//!
//! - Invalid coordinates never reach this module: [`Location`] is validated
//!   on construction
//! - Timeouts, connection failures and non-2xx statuses become
//!   [`HavvarselError::Network`]
//! - Bodies that are not JSON or miss required fields become
//!   [`HavvarselError::Parse`]
//!
//! The client never retries. Retrying is the coordinator's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::{
    GridPoint, HavvarselError, Location, Point, Projection, Series, VariableMetadata,
    VariableSeries,
};

/// Variable requested when nothing else is asked for
pub const DEFAULT_VARIABLE: &str = "temperature";

/// Trimmed, non-empty variable names in their original order, without
/// duplicates.
pub fn unique_variables(variables: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(variables.len());
    for var in variables {
        let var = var.trim();
        if !var.is_empty() && !unique.iter().any(|v| v == var) {
            unique.push(var.to_string());
        }
    }
    unique
}

/// Anything that can produce a projection for a location.
///
/// The coordinator only depends on this trait, which keeps it independent of
/// the HTTP stack.
#[async_trait]
pub trait ProjectionSource: Send + Sync {
    /// Fetch the current projection of `variables` at `location`.
    async fn fetch_projection(
        &self,
        location: &Location,
        variables: &[String],
    ) -> Result<Projection, HavvarselError>;
}

#[async_trait]
impl<T: ProjectionSource + ?Sized> ProjectionSource for std::sync::Arc<T> {
    async fn fetch_projection(
        &self,
        location: &Location,
        variables: &[String],
    ) -> Result<Projection, HavvarselError> {
        (**self).fetch_projection(location, variables).await
    }
}

/// HTTP client for the Havvarsel v2 API.
///
/// Cheap to clone; clones share the connection pool. Holds no state between
/// calls.
#[derive(Debug, Clone)]
pub struct HavvarselClient {
    client: Client,
    base_url: String,
}

impl HavvarselClient {
    /// Build a client from the API section of the configuration.
    pub fn new(config: &ApiConfig) -> Result<Self, HavvarselError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HavvarselError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the projection for `location`, including variable metadata.
    ///
    /// An empty `variables` list requests temperature only. When the metadata
    /// endpoint fails the projection is still fetched, with empty metadata.
    pub async fn projection(
        &self,
        location: &Location,
        variables: &[String],
    ) -> Result<Projection, HavvarselError> {
        let metadata = match self.variables_metadata().await {
            Ok(metadata) => {
                debug!(variables = metadata.len(), "Fetched variable metadata");
                metadata
            }
            Err(err) => {
                warn!(error = %err, "Variable metadata unavailable, continuing without it");
                BTreeMap::new()
            }
        };

        let vars = if variables.is_empty() {
            DEFAULT_VARIABLE.to_string()
        } else {
            variables.join(",")
        };
        let url = format!(
            "{}/dataprojection/{}/{}/{}",
            self.base_url,
            vars,
            location.longitude(),
            location.latitude()
        );
        info!(%url, depth = location.depth(), "Fetching projection");

        let response = self
            .client
            .get(&url)
            .query(&[("depth", location.depth().to_string())])
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;

        let projection = parse_projection(&body, &metadata, *location)?;
        info!(
            variables = projection.variables.len(),
            "Parsed projection"
        );
        Ok(projection)
    }

    /// Metadata for every variable the projection endpoint offers, keyed by
    /// variable name. The `time` dimension is left out.
    pub async fn variables_metadata(
        &self,
    ) -> Result<BTreeMap<String, VariableMetadata>, HavvarselError> {
        let url = format!("{}/dataprojectionvariables", self.base_url);
        let response: MetadataResponse = self.get_json(&url).await?;
        Ok(collect_metadata(response))
    }

    /// Variable names mapped to a human-readable description (the long name,
    /// or the name itself when the service gives none).
    pub async fn available_variables(&self) -> Result<BTreeMap<String, String>, HavvarselError> {
        let metadata = self.variables_metadata().await?;
        Ok(metadata
            .into_iter()
            .map(|(name, meta)| {
                let description = meta.long_name().unwrap_or(&name).to_string();
                (name, description)
            })
            .collect())
    }

    /// Unit of measurement for `variable`, with the temperature fallback
    /// when the service does not say.
    pub async fn units(&self, variable: &str) -> Result<Option<String>, HavvarselError> {
        let metadata = self.variables_metadata().await?;
        Ok(metadata
            .get(variable)
            .and_then(|meta| meta.units().map(str::to_string))
            .or_else(|| fallback_units(variable).map(str::to_string)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HavvarselError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProjectionSource for HavvarselClient {
    async fn fetch_projection(
        &self,
        location: &Location,
        variables: &[String],
    ) -> Result<Projection, HavvarselError> {
        self.projection(location, variables).await
    }
}

/// Unit assumed for a variable the metadata endpoint has no units for.
pub fn fallback_units(variable: &str) -> Option<&'static str> {
    match variable {
        DEFAULT_VARIABLE => Some("°C"),
        _ => None,
    }
}

// -- Wire formats --

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    row: Vec<MetadataRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataRow {
    variable_name: Option<String>,
    #[serde(default)]
    metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    key: String,
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGridPoint {
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimePointsBody {
    data: Vec<RawTimePoint>,
    closest_grid_point_with_data: Option<RawGridPoint>,
    depth_in_meters: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTimePoint {
    raw_time: f64,
    data: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    key: Option<String>,
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariablesBody {
    variables: Vec<RawVariable>,
    closest_grid_point_with_data: Option<RawGridPoint>,
    depth_in_meters: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVariable {
    variable_name: Option<String>,
    variable: Option<String>,
    #[serde(default)]
    metadata: Vec<MetadataEntry>,
    data: Vec<RawSample>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSample {
    raw_time: f64,
    value: Option<Value>,
}

// -- Parsing --

/// Parse a projection body into a [`Projection`].
///
/// `metadata` is the result of the metadata endpoint; variables it does not
/// describe get empty metadata. Every variable in the result has at least one
/// point, sorted by time.
pub fn parse_projection(
    body: &[u8],
    metadata: &BTreeMap<String, VariableMetadata>,
    requested: Location,
) -> Result<Projection, HavvarselError> {
    let value: Value = serde_json::from_slice(body)?;

    let mut points: BTreeMap<String, Vec<Point>> = BTreeMap::new();
    let mut inline_metadata: BTreeMap<String, VariableMetadata> = BTreeMap::new();

    let (grid, depth_in_meters) = if value.get("variables").is_some_and(Value::is_array) {
        debug!("Parsing variables-array projection format");
        let body: VariablesBody = from_value(value)?;

        for var in body.variables {
            let Some(name) = var.variable_name.or(var.variable) else {
                warn!("Skipping variable without a name in projection response");
                continue;
            };
            let series = points.entry(name.clone()).or_default();
            for sample in var.data {
                series.push(Point {
                    time: millis_to_utc(sample.raw_time)?,
                    value: numeric(sample.value.as_ref()),
                });
            }
            if !var.metadata.is_empty() {
                inline_metadata.insert(name, metadata_from_entries(var.metadata));
            }
        }

        (body.closest_grid_point_with_data, body.depth_in_meters)
    } else if value.get("data").is_some() {
        let body: TimePointsBody = from_value(value)?;
        debug!(time_points = body.data.len(), "Parsing time-point projection format");

        for time_point in body.data {
            let time = millis_to_utc(time_point.raw_time)?;
            for entry in time_point.data {
                let Some(key) = entry.key.filter(|k| !k.is_empty()) else {
                    continue;
                };
                points.entry(key).or_default().push(Point {
                    time,
                    value: numeric(entry.value.as_ref()),
                });
            }
        }

        (body.closest_grid_point_with_data, body.depth_in_meters)
    } else {
        return Err(HavvarselError::Parse(
            "response has neither a 'variables' nor a 'data' array".to_string(),
        ));
    };

    let variables = points
        .into_iter()
        .filter(|(_, pts)| !pts.is_empty())
        .map(|(name, pts)| {
            let mut meta = metadata.get(&name).cloned().unwrap_or_default();
            if let Some(inline) = inline_metadata.remove(&name) {
                meta.merge(inline);
            }
            let entry = VariableSeries {
                metadata: meta,
                series: Series::from_points(pts),
            };
            (name, entry)
        })
        .collect();

    let fallback = requested.as_grid_point();
    let nearest_grid = match grid {
        Some(raw) => GridPoint {
            lat: raw.lat.unwrap_or(fallback.lat),
            lon: raw.lon.unwrap_or(fallback.lon),
        },
        None => fallback,
    };

    Ok(Projection {
        variables,
        requested,
        nearest_grid,
        depth_in_meters,
    })
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, HavvarselError> {
    Ok(serde_json::from_value(value)?)
}

fn collect_metadata(response: MetadataResponse) -> BTreeMap<String, VariableMetadata> {
    response
        .row
        .into_iter()
        .filter_map(|row| {
            let name = row.variable_name.filter(|n| !n.is_empty() && n != "time")?;
            Some((name, metadata_from_entries(row.metadata)))
        })
        .collect()
}

fn metadata_from_entries(entries: Vec<MetadataEntry>) -> VariableMetadata {
    VariableMetadata::from_pairs(entries.into_iter().map(|entry| {
        let value = match entry.value {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        (entry.key, value)
    }))
}

fn millis_to_utc(raw_time: f64) -> Result<DateTime<Utc>, HavvarselError> {
    if !raw_time.is_finite() {
        return Err(HavvarselError::Parse(format!("rawTime {raw_time} is not a timestamp")));
    }
    DateTime::<Utc>::from_timestamp_millis(raw_time as i64)
        .ok_or_else(|| HavvarselError::Parse(format!("rawTime {raw_time} is out of range")))
}

/// Numbers come either as JSON numbers or as numeric strings.
fn numeric(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
