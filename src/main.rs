//! # Havvarsel Sensor Entry Point
//!
//! Runs one coordinator per configured station and logs every sensor after
//! each tick until Ctrl-C.
//!
//! - `--stdout`: fetch once per station, print ASCII charts, exit
//! - `--list-variables`: print the variables the service offers, exit

// Test modules
#[cfg(test)]
mod tests;

use anyhow::Context;
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use havvarsel_lib::api::HavvarselClient;
use havvarsel_lib::config::{Config, CONFIG_FILE};
use havvarsel_lib::HavvarselError;
use havvarsel_lib::coordinator::{Coordinator, UPDATE_INTERVAL};
use havvarsel_lib::renderer::{draw_ascii, format_state};
use havvarsel_lib::setup::{build_sensors, sensor_variables, Station};

/// RUST_LOG wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Print every variable the projection endpoint offers.
async fn list_variables(client: &HavvarselClient) -> anyhow::Result<()> {
    let variables = client
        .available_variables()
        .await
        .context("fetching available variables")?;

    for (name, description) in variables {
        println!("{:<24} {}", name, description);
    }
    Ok(())
}

/// Development mode: one refresh per station, rendered to stdout.
async fn print_once(config: &Config, client: &HavvarselClient) -> anyhow::Result<()> {
    for station in &config.stations {
        let location = station.location()?;
        let mut coordinator = Coordinator::new(
            station.name.clone(),
            client.clone(),
            location,
            &sensor_variables(station),
        );
        let sensors = build_sensors(station, location, &coordinator.subscribe());

        coordinator.refresh().await;
        for sensor in &sensors {
            draw_ascii(sensor);
        }
    }
    Ok(())
}

/// Service mode: poll all stations until Ctrl-C.
async fn run(config: &Config, client: HavvarselClient) -> anyhow::Result<()> {
    let mut stations = Vec::with_capacity(config.stations.len());
    for station_config in &config.stations {
        let station = Station::setup(station_config, client.clone())
            .with_context(|| format!("setting up station '{}'", station_config.name))?;
        stations.push(station);
    }

    let mut reporters = Vec::with_capacity(stations.len());
    for station in &stations {
        let mut updates = station.subscribe();
        let sensors = station.sensors().to_vec();
        reporters.push(tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                for sensor in &sensors {
                    info!(sensor = sensor.unique_id(), "{}", format_state(sensor));
                }
            }
        }));
    }

    info!(
        stations = stations.len(),
        interval_mins = UPDATE_INTERVAL.as_secs() / 60,
        "Polling, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    info!("Shutting down");
    for station in stations {
        station.unload().await;
    }
    for reporter in reporters {
        if let Err(err) = reporter.await {
            error!(error = %err, "Sensor reporter ended abnormally");
        }
    }
    Ok(())
}

fn report_config(loaded: &Result<Option<Config>, HavvarselError>, config: &Config) {
    match loaded {
        Ok(Some(_)) => info!(file = CONFIG_FILE, "Loaded configuration"),
        Ok(None) => info!(file = CONFIG_FILE, "No config file found, using defaults (Nordnes, Bergen)"),
        Err(err) => warn!(error = %err, "Invalid config file, using defaults (Nordnes, Bergen)"),
    }
    info!(stations = config.stations.len(), base_url = %config.api.base_url, "Configuration ready");
}

async fn start(config: &Config, development_mode: bool, list_mode: bool) -> anyhow::Result<()> {
    let client = HavvarselClient::new(&config.api)?;

    if list_mode {
        return list_variables(&client).await;
    }
    if development_mode {
        return print_once(config, &client).await;
    }
    run(config, client).await
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let development_mode = env::args().any(|arg| arg == "--stdout");
    let list_mode = env::args().any(|arg| arg == "--list-variables");

    // File problems are logged after the subscriber is installed
    let loaded = Config::read();
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => Config::default(),
    };
    init_logging(&config.logging.level);
    report_config(&loaded, &config);

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(start(&config, development_mode, list_mode))
}
