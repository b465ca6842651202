//! Remote log shipping.
//!
//! A tracing layer turns events into JSON records and queues them on a
//! bounded channel; one background task batches the records and POSTs them
//! to the collector as a JSON array.
//!
//! # Design Decisions
//! - Never blocks the logging call site: a full queue drops the record
//! - Events from this module and the HTTP client stack are not shipped,
//!   otherwise a failing collector would feed itself

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::config::LogShippingConfig;

const QUEUE_CAPACITY: usize = 8192;

const SILENCED_TARGETS: &[&str] = &[
    module_path!(),
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
];

#[derive(Debug, Error)]
pub enum ShipperError {
    #[error("invalid collector endpoint '{0}'")]
    Endpoint(String),
    #[error("collector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("timed out flushing logs")]
    Timeout,
    #[error("shipping task failed: {0}")]
    Task(String),
}

/// Tracing layer feeding the shipper.
pub struct ShippingLayer {
    tx: mpsc::Sender<Value>,
    open: Arc<AtomicBool>,
}

impl<S: Subscriber> Layer<S> for ShippingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.open.load(Ordering::Relaxed) {
            return;
        }
        let meta = event.metadata();
        if SILENCED_TARGETS.iter().any(|t| meta.target().starts_with(t)) {
            return;
        }

        let mut fields = JsonFields::default();
        event.record(&mut fields);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        let record = serde_json::json!({
            "timestamp": timestamp,
            "level": meta.level().as_str(),
            "target": meta.target(),
            "fields": Value::Object(fields.0),
        });
        // Full queue: drop rather than block the caller.
        let _ = self.tx.try_send(record);
    }
}

#[derive(Default)]
struct JsonFields(Map<String, Value>);

impl Visit for JsonFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), value.into());
    }
}

/// Handle to the shipping task.
pub struct LogShipper {
    open: Arc<AtomicBool>,
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<Result<(), ShipperError>>,
    close_timeout: Duration,
}

impl LogShipper {
    /// Start the shipping task. Returns `None` when shipping is disabled.
    pub fn start(
        config: &LogShippingConfig,
    ) -> Result<Option<(LogShipper, ShippingLayer)>, ShipperError> {
        if !config.enabled {
            return Ok(None);
        }

        let endpoint = reqwest::Url::parse(&config.endpoint)
            .map_err(|_| ShipperError::Endpoint(config.endpoint.clone()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();
        let open = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            client,
            endpoint,
            batch_size: config.batch_size.max(1),
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
        };
        let task = tokio::spawn(worker.run(rx, close_rx));

        let shipper = LogShipper {
            open: open.clone(),
            close_tx,
            task,
            close_timeout: Duration::from_millis(config.close_timeout_ms),
        };
        Ok(Some((shipper, ShippingLayer { tx, open })))
    }

    /// Stop accepting records, flush what is queued and wait for the task.
    pub async fn close(self) -> Result<(), ShipperError> {
        self.open.store(false, Ordering::Relaxed);
        let _ = self.close_tx.send(());

        let mut task = self.task;
        match tokio::time::timeout(self.close_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ShipperError::Task(join.to_string())),
            Err(_) => {
                task.abort();
                Err(ShipperError::Timeout)
            }
        }
    }
}

struct Worker {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    batch_size: usize,
    flush_interval: Duration,
}

impl Worker {
    async fn run(
        self,
        mut rx: mpsc::Receiver<Value>,
        mut close_rx: oneshot::Receiver<()>,
    ) -> Result<(), ShipperError> {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(record) = rx.recv() => {
                    batch.push(record);
                    if batch.len() >= self.batch_size {
                        self.ship_logged(&mut batch).await;
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.ship_logged(&mut batch).await;
                    }
                }
                _ = &mut close_rx => break,
            }
        }

        while let Ok(record) = rx.try_recv() {
            batch.push(record);
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.ship(&mut batch).await
    }

    async fn ship_logged(&self, batch: &mut Vec<Value>) {
        let size = batch.len();
        if let Err(e) = self.ship(batch).await {
            tracing::warn!(error = %e, dropped = size, "Failed to ship log batch");
        }
    }

    /// Send and clear the batch. The batch is cleared even on failure.
    async fn ship(&self, batch: &mut Vec<Value>) -> Result<(), ShipperError> {
        let body = std::mem::take(batch);
        self.client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    type Received = Arc<Mutex<Vec<Value>>>;

    async fn collector() -> (String, Received) {
        async fn ingest(State(store): State<Received>, Json(batch): Json<Vec<Value>>) {
            store.lock().unwrap().extend(batch);
        }

        let store = Received::default();
        let app = Router::new()
            .route("/logs", post(ingest))
            .with_state(store.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/logs"), store)
    }

    fn config(endpoint: String) -> LogShippingConfig {
        LogShippingConfig {
            enabled: true,
            endpoint,
            batch_size: 100,
            flush_interval_ms: 60_000,
            close_timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn close_flushes_pending_records() {
        let (endpoint, store) = collector().await;
        let (shipper, layer) = LogShipper::start(&config(endpoint)).unwrap().unwrap();

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", user = "ada", attempts = 3u64, "signed in");
        });

        shipper.close().await.unwrap();

        let records = store.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "INFO");
        assert_eq!(records[0]["target"], "app");
        assert_eq!(records[0]["fields"]["message"], "signed in");
        assert_eq!(records[0]["fields"]["user"], "ada");
        assert_eq!(records[0]["fields"]["attempts"], 3);
    }

    #[tokio::test]
    async fn unreachable_collector_reports_close_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (shipper, layer) = LogShipper::start(&config(format!("http://{addr}/logs")))
            .unwrap()
            .unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || tracing::warn!(target: "app", "lost"));

        assert!(shipper.close().await.is_err());
    }

    #[test]
    fn disabled_shipping_starts_nothing() {
        assert!(LogShipper::start(&LogShippingConfig::default()).unwrap().is_none());
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        let config = LogShippingConfig {
            enabled: true,
            endpoint: "not a url".into(),
            ..LogShippingConfig::default()
        };
        assert!(matches!(LogShipper::start(&config), Err(ShipperError::Endpoint(_))));
    }
}
