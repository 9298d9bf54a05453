//! # Station Setup
//!
//! Wires one configured location into a running coordinator and its sensors.
//! Validation happens first: a station with bad coordinates or depth fails
//! with [`HavvarselError::Configuration`] before anything touches the network.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::api::{unique_variables, ProjectionSource, DEFAULT_VARIABLE};
use crate::config::StationConfig;
use crate::coordinator::{CachedResult, Coordinator, CoordinatorHandle};
use crate::sensor::Sensor;
use crate::{HavvarselError, Location};

/// Lowercase ASCII slug for deterministic ids,
/// e.g. "Nordnes Sea Temperature" -> "nordnes_sea_temperature".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("havvarsel");
    }
    slug
}

/// Variables to create sensors for: configured order, no duplicates,
/// temperature when none are configured.
pub fn sensor_variables(config: &StationConfig) -> Vec<String> {
    let mut variables = unique_variables(&config.variables);
    if variables.is_empty() {
        variables.push(DEFAULT_VARIABLE.to_string());
    }
    variables
}

/// One sensor per configured variable, all reading from `state`.
pub fn build_sensors(
    config: &StationConfig,
    location: Location,
    state: &watch::Receiver<Arc<CachedResult>>,
) -> Vec<Sensor> {
    let slug = slugify(&config.name);
    sensor_variables(config)
        .into_iter()
        .map(|variable| {
            Sensor::new(
                format!("{slug}_{variable}"),
                config.name.clone(),
                variable,
                location,
                state.clone(),
            )
        })
        .collect()
}

/// A configured location with its running coordinator and sensors.
#[derive(Debug)]
pub struct Station {
    name: String,
    location: Location,
    handle: CoordinatorHandle,
    sensors: Vec<Sensor>,
}

impl Station {
    /// Validate `config`, register its sensors and start polling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn setup<S>(config: &StationConfig, source: S) -> Result<Self, HavvarselError>
    where
        S: ProjectionSource + 'static,
    {
        let location = config.location()?;
        let variables = sensor_variables(config);
        let coordinator = Coordinator::new(config.name.clone(), source, location, &variables);
        let sensors = build_sensors(config, location, &coordinator.subscribe());

        info!(
            station = %config.name,
            lon = location.longitude(),
            lat = location.latitude(),
            depth = location.depth(),
            sensors = sensors.len(),
            "Station set up"
        );

        Ok(Self {
            name: config.name.clone(),
            location,
            handle: coordinator.spawn(),
            sensors,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<CachedResult>> {
        self.handle.subscribe()
    }

    pub fn snapshot(&self) -> Arc<CachedResult> {
        self.handle.snapshot()
    }

    pub fn request_refresh(&self) -> bool {
        self.handle.request_refresh()
    }

    /// Stop polling and drop the cached data.
    pub async fn unload(self) {
        info!(station = %self.name, "Unloading station");
        self.handle.shutdown().await;
    }
}
