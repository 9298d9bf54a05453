//! # Behavioural Test Suite
//!
//! Exercises the library the way the binary uses it: stations wired to
//! canned or local-HTTP data sources, with tokio's paused clock driving the
//! 10-minute timer.

mod client_tests;

use async_trait::async_trait;
use havvarsel_lib::api::{parse_projection, ProjectionSource};
use havvarsel_lib::{HavvarselError, Location, Projection, VariableMetadata};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Metadata endpoint body
pub const METADATA_BODY: &str = r#"{"row": [
    {"variableName": "time", "metadata": [{"key": "units", "value": "milliseconds since 1970-01-01"}]},
    {"variableName": "temperature", "metadata": [
        {"key": "units", "value": "Celsius"},
        {"key": "long_name", "value": "Sea water potential temperature"},
        {"key": "standard_name", "value": "sea_water_potential_temperature"}]},
    {"variableName": "salinity", "metadata": [
        {"key": "units", "value": "1e-3"},
        {"key": "long_name", "value": "Sea water salinity"}]}
]}"#;

/// Projection with points at T1 < T2 < T3 sent out of order (T2, T3, T1).
pub const PROJECTION_BODY: &str = r#"{
    "data": [
        {"rawTime": 1760857200000, "data": [{"key": "temperature", "value": "11.480"},
                                            {"key": "salinity", "value": "28.200"}]},
        {"rawTime": 1760860800000, "data": [{"key": "temperature", "value": "11.402"},
                                            {"key": "salinity", "value": "28.310"}]},
        {"rawTime": 1760853600000, "data": [{"key": "temperature", "value": "11.593"},
                                            {"key": "salinity", "value": "28.152"}]}
    ],
    "closestGridPointWithData": {"lat": 60.3987, "lon": 5.3102},
    "depthInMeters": 0
}"#;

/// Time points without their value arrays.
pub const MALFORMED_BODY: &str = r#"{"data": [{"rawTime": 1760853600000}]}"#;

pub fn metadata() -> BTreeMap<String, VariableMetadata> {
    let mut map = BTreeMap::new();
    map.insert(
        "temperature".to_string(),
        VariableMetadata::from_pairs([
            ("units", "Celsius"),
            ("long_name", "Sea water potential temperature"),
        ]),
    );
    map
}

/// Serves a fixed body through the real parser and counts calls.
pub struct CannedSource {
    body: Mutex<String>,
    calls: AtomicUsize,
}

impl CannedSource {
    pub fn new(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(body.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_body(&self, body: &str) {
        *self.body.lock().unwrap() = body.to_string();
    }
}

#[async_trait]
impl ProjectionSource for CannedSource {
    async fn fetch_projection(
        &self,
        location: &Location,
        _variables: &[String],
    ) -> Result<Projection, HavvarselError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.body.lock().unwrap().clone();
        parse_projection(body.as_bytes(), &metadata(), *location)
    }
}

/// Local HTTP responder answering one connection per scripted response.
pub struct MockServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub fn request_lines(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub async fn serve(responses: Vec<(u16, &'static str)>) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            if let Some(line) = String::from_utf8_lossy(&request).lines().next() {
                log.lock().unwrap().push(line.to_string());
            }

            let reason = if status < 300 { "OK" } else { "Error" };
            let reply = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    MockServer {
        base_url: format!("http://{addr}/v2"),
        requests,
    }
}
