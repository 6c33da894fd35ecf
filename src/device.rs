// Device Module - WLED JSON state API (power, brightness, presets)
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("device answered with HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid state document: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Best-effort access to the device state
///
/// Implementations log their own failures. A read that fails yields `None`,
/// a write that fails is dropped.
pub trait DeviceState: Send + Sync {
    fn get_state<'a>(&'a self, field: &'a str) -> BoxFuture<'a, Option<Value>>;
    fn set_state<'a>(&'a self, field: &'a str, value: Value) -> BoxFuture<'a, ()>;
}

/// Power state of the device, unknown counts as off
pub async fn device_is_on(device: &dyn DeviceState) -> bool {
    device
        .get_state("on")
        .await
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// JSON state endpoint of the device behind a realtime `host:port` address
pub fn state_url(wled_addr: &str) -> String {
    let host = wled_addr.split(':').next().unwrap_or(wled_addr);
    format!("http://{}:80/json/state", host)
}

/// Body of a state update; `v: false` asks WLED not to echo the full state back
pub fn state_update(field: &str, value: Value) -> Value {
    let mut body = Map::new();
    body.insert("v".to_string(), Value::Bool(false));
    body.insert("tt".to_string(), json!(1));
    body.insert(field.to_string(), value);
    Value::Object(body)
}

pub struct WledClient {
    client: reqwest::Client,
    url: String,
}

impl WledClient {
    pub fn new(wled_addr: &str, timeout: Duration) -> Result<Self, DeviceError> {
        Self::with_url(state_url(wled_addr), timeout)
    }

    pub fn with_url(url: String, timeout: Duration) -> Result<Self, DeviceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(WledClient { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch_state(&self) -> Result<Map<String, Value>, DeviceError> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(DeviceError::Status(resp.status()));
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn post_state(&self, field: &str, value: Value) -> Result<(), DeviceError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&state_update(field, value))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(DeviceError::Status(resp.status()));
        }
        // Drain the body so the connection can be reused
        resp.bytes().await?;
        Ok(())
    }
}

impl DeviceState for WledClient {
    fn get_state<'a>(&'a self, field: &'a str) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async move {
            match self.fetch_state().await {
                Ok(mut state) => state.remove(field),
                Err(e) => {
                    warn!("can't get device state: {}", e);
                    None
                }
            }
        })
    }

    fn set_state<'a>(&'a self, field: &'a str, value: Value) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            debug!("device state {} = {}", field, value);
            if let Err(e) = self.post_state(field, value).await {
                warn!("can't send device state: {}", e);
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{routing::get, Json, Router};

    /// In-memory device: a JSON state map plus a log of every write
    #[derive(Clone, Default)]
    pub(crate) struct FakeDevice {
        pub state: Arc<Mutex<Map<String, Value>>>,
        pub writes: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl FakeDevice {
        pub fn powered(on: bool) -> Self {
            let device = FakeDevice::default();
            device.state.lock().unwrap().insert("on".to_string(), Value::Bool(on));
            device
        }

        pub fn writes(&self) -> Vec<(String, Value)> {
            self.writes.lock().unwrap().clone()
        }

        pub fn writes_to(&self, field: &str) -> Vec<Value> {
            self.writes()
                .into_iter()
                .filter(|(f, _)| f == field)
                .map(|(_, v)| v)
                .collect()
        }
    }

    impl DeviceState for FakeDevice {
        fn get_state<'a>(&'a self, field: &'a str) -> BoxFuture<'a, Option<Value>> {
            Box::pin(async move { self.state.lock().unwrap().get(field).cloned() })
        }

        fn set_state<'a>(&'a self, field: &'a str, value: Value) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                self.state.lock().unwrap().insert(field.to_string(), value.clone());
                self.writes.lock().unwrap().push((field.to_string(), value));
            })
        }
    }

    #[test]
    fn test_state_url_uses_http_port() {
        assert_eq!(state_url("192.168.1.3:21324"), "http://192.168.1.3:80/json/state");
        assert_eq!(state_url("wled.local"), "http://wled.local:80/json/state");
    }

    #[test]
    fn test_state_update_body() {
        let body = state_update("bri", json!(42));
        assert_eq!(body, json!({"v": false, "tt": 1, "bri": 42}));
        let body = state_update("on", json!(true));
        assert_eq!(body["on"], json!(true));
    }

    #[tokio::test]
    async fn test_unknown_power_counts_as_off() {
        assert!(!device_is_on(&FakeDevice::default()).await);
        assert!(!device_is_on(&FakeDevice::powered(false)).await);
        assert!(device_is_on(&FakeDevice::powered(true)).await);

        let odd = FakeDevice::default();
        odd.state.lock().unwrap().insert("on".to_string(), json!("yes"));
        assert!(!device_is_on(&odd).await);
    }

    #[tokio::test]
    async fn test_client_reads_and_writes_state() {
        let posted: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = posted.clone();
        let app = Router::new().route(
            "/json/state",
            get(|| async { Json(json!({"on": true, "bri": 77})) }).post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(body);
                    Json(json!({"success": true}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = WledClient::with_url(format!("http://{}/json/state", addr), Duration::from_secs(2)).unwrap();
        assert!(device_is_on(&client).await);
        assert_eq!(client.get_state("bri").await, Some(json!(77)));
        assert_eq!(client.get_state("ps").await, None);

        client.set_state("ps", json!(3)).await;
        assert_eq!(posted.lock().unwrap().as_slice(), &[json!({"v": false, "tt": 1, "ps": 3})]);
    }

    #[tokio::test]
    async fn test_unreachable_device_is_best_effort() {
        // Nothing listens on the discard port
        let client = WledClient::with_url("http://127.0.0.1:9/json/state".to_string(), Duration::from_millis(200)).unwrap();
        assert_eq!(client.get_state("on").await, None);
        client.set_state("bri", json!(10)).await;
        assert!(!device_is_on(&client).await);
    }
}
