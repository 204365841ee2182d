//! Collection cycle orchestration.
//!
//! A cycle runs fetch → extract → normalize → serialize → publish in order.
//! Whatever goes wrong inside a cycle, including a panic in one of the
//! stages, is logged and reported as `false`; the next tick starts fresh.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::api::WeatherSource;
use crate::error::{CollectorError, SerializationError};
use crate::extract::extract;
use crate::normalize::{check_schema, normalize, serialize, Location, DEFAULT_SOURCE};
use crate::publisher::{Connector, QueuePublisher};

/// Periodic weather collector.
pub struct WeatherCollector<S: WeatherSource, C: Connector> {
    source: S,
    publisher: QueuePublisher<C>,
    location: Location,
    interval: Duration,
}

impl<S: WeatherSource, C: Connector> WeatherCollector<S, C> {
    pub fn new(
        source: S,
        publisher: QueuePublisher<C>,
        location: Location,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            publisher,
            location,
            interval,
        }
    }

    pub fn publisher(&self) -> &QueuePublisher<C> {
        &self.publisher
    }

    /// Run one cycle. Never panics and never returns an error.
    pub async fn collect_and_publish(&mut self) -> bool {
        log::info!("Starting weather data collection...");

        match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(Ok(())) => {
                log::info!("Weather data collected and published successfully");
                true
            }
            Ok(Err(e)) => {
                log_cycle_error(&e);
                false
            }
            Err(panic) => {
                log::error!(
                    "Unexpected error during collection: {}",
                    panic_message(panic.as_ref())
                );
                false
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<(), CollectorError> {
        let Location {
            city,
            latitude,
            longitude,
        } = &self.location;

        let raw = self.source.fetch(*latitude, *longitude).await?;

        let reading = extract(&raw)?;
        log::debug!("Extracted weather data: {:?}", reading);

        let message = normalize(&reading, city, *latitude, *longitude, DEFAULT_SOURCE)?;
        let body = serialize(&message)?;
        let wire: Value = serde_json::from_str(&body).map_err(SerializationError::from)?;
        check_schema(&wire)?;
        log::debug!("Normalized message: {}", body);

        if !self.publisher.is_connected() {
            log::info!("Publisher not connected, reconnecting before publish");
            self.publisher.connect().await?;
        }
        self.publisher.publish(&body).await?;
        Ok(())
    }

    /// Connect, run a single cycle, disconnect.
    pub async fn run_once(&mut self) -> bool {
        if let Err(e) = self.publisher.connect().await {
            log::warn!("Initial broker connection failed: {}", e);
        }
        let ok = self.collect_and_publish().await;
        self.publisher.disconnect().await;
        ok
    }

    /// Run a cycle now and then once per interval until `shutdown` fires.
    ///
    /// A cycle in progress when the signal arrives is allowed to finish.
    /// The broker connection is released before returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<()>) {
        log::info!(
            "Starting Weather Collector service (interval: {}s)",
            self.interval.as_secs()
        );

        if let Err(e) = self.publisher.connect().await {
            log::warn!("Failed to connect to RabbitMQ at startup: {}", e);
            log::info!("Will retry connection on first collection");
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    log::info!("Shutdown signal received, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    self.collect_and_publish().await;
                }
            }
        }

        self.stop().await;
    }

    async fn stop(&mut self) {
        log::info!("Stopping Weather Collector service...");
        self.publisher.disconnect().await;
        log::info!("Weather Collector service stopped");
    }
}

fn log_cycle_error(err: &CollectorError) {
    match err {
        CollectorError::Fetch(e) if !e.is_retryable() => {
            log::error!("{} (not expected to recover without intervention)", err);
            log::info!("Will retry on next scheduled interval");
        }
        CollectorError::Fetch(_) | CollectorError::Publish(_) => {
            log::error!("{}", err);
            log::info!("Will retry on next scheduled interval");
        }
        CollectorError::Extraction(_)
        | CollectorError::Validation(_)
        | CollectorError::Serialization(_) => {
            log::error!("{}", err);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::publisher::mock::MockConnector;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays scripted responses, then repeats the last one.
    #[derive(Default)]
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Value, FetchError>>>,
        calls: Arc<AtomicUsize>,
        panic_on_call: Option<usize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Value, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl WeatherSource for ScriptedSource {
        async fn fetch(&self, _latitude: f64, _longitude: f64) -> Result<Value, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic_on_call == Some(call) {
                panic!("provider client bug");
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                match script.front().unwrap() {
                    Ok(v) => Ok(v.clone()),
                    Err(_) => Err(FetchError::Connect("still down".into())),
                }
            }
        }
    }

    fn rainy_response() -> Value {
        json!({
            "current": {
                "temperature_2m": 22.0,
                "relative_humidity_2m": 70,
                "wind_speed_10m": 8.5,
                "weather_code": 61
            },
            "hourly": {"precipitation_probability": [80, 75, 70]}
        })
    }

    fn test_city() -> Location {
        Location {
            city: "Test City".into(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    fn collector(
        source: ScriptedSource,
    ) -> (WeatherCollector<ScriptedSource, MockConnector>, MockConnector) {
        let connector = MockConnector::default();
        let publisher = QueuePublisher::new(connector.clone(), "amqp://localhost", "weather-data");
        (
            WeatherCollector::new(source, publisher, test_city(), Duration::from_millis(20)),
            connector,
        )
    }

    #[tokio::test]
    async fn test_end_to_end_cycle_publishes_normalized_message() {
        let (mut collector, connector) = collector(ScriptedSource::new(vec![Ok(rainy_response())]));

        assert!(collector.collect_and_publish().await);

        let bodies = connector.state.sent_bodies();
        assert_eq!(bodies.len(), 1);
        let msg: Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(msg["location"]["city"], "Test City");
        assert_eq!(msg["location"]["latitude"], 0.0);
        assert_eq!(msg["weather"]["temperature"], 22.0);
        assert_eq!(msg["weather"]["humidity"], 70);
        assert_eq!(msg["weather"]["windSpeed"], 8.5);
        assert_eq!(msg["weather"]["condition"], "rain");
        assert_eq!(msg["weather"]["rainProbability"], 80);
        assert_eq!(msg["source"], "open-meteo");
        assert!(crate::normalize::validate_schema(&msg));
    }

    #[tokio::test]
    async fn test_fetch_error_fails_cycle_without_publishing() {
        let (mut collector, connector) = collector(ScriptedSource::new(vec![Err(
            FetchError::Status {
                status: 503,
                message: "API unavailable".into(),
            },
        )]));

        assert!(!collector.collect_and_publish().await);
        assert!(connector.state.sent_bodies().is_empty());
    }

    #[tokio::test]
    async fn test_extraction_error_fails_cycle() {
        let mut raw = rainy_response();
        raw["current"].as_object_mut().unwrap().remove("temperature_2m");
        let (mut collector, connector) = collector(ScriptedSource::new(vec![Ok(raw)]));

        assert!(!collector.collect_and_publish().await);
        assert!(connector.state.sent_bodies().is_empty());
    }

    #[tokio::test]
    async fn test_validation_error_fails_cycle() {
        let mut raw = rainy_response();
        raw["current"]["relative_humidity_2m"] = json!(150);
        let (mut collector, connector) = collector(ScriptedSource::new(vec![Ok(raw)]));

        assert!(!collector.collect_and_publish().await);
        assert!(connector.state.sent_bodies().is_empty());
    }

    #[tokio::test]
    async fn test_publish_error_fails_cycle() {
        let (mut collector, connector) = collector(ScriptedSource::new(vec![Ok(rainy_response())]));
        connector.state.reject_publish.store(true, Ordering::SeqCst);

        assert!(!collector.collect_and_publish().await);
    }

    #[tokio::test]
    async fn test_recovers_after_fetch_error() {
        let (mut collector, connector) = collector(ScriptedSource::new(vec![
            Err(FetchError::Timeout("30s elapsed".into())),
            Ok(rainy_response()),
        ]));

        assert!(!collector.collect_and_publish().await);
        assert!(collector.collect_and_publish().await);
        assert_eq!(connector.state.sent_bodies().len(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_publish_error() {
        let (mut collector, connector) = collector(ScriptedSource::new(vec![Ok(rainy_response())]));
        connector.state.reject_publish.store(true, Ordering::SeqCst);
        assert!(!collector.collect_and_publish().await);

        connector.state.reject_publish.store(false, Ordering::SeqCst);
        assert!(collector.collect_and_publish().await);
        assert_eq!(connector.state.sent_bodies().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnects_before_publish() {
        let (mut collector, connector) = collector(ScriptedSource::new(vec![Ok(rainy_response())]));
        assert!(!collector.publisher().is_connected());

        assert!(collector.collect_and_publish().await);
        assert!(collector.publisher().is_connected());
        assert_eq!(connector.state.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconnect_failure_fails_cycle() {
        let (mut collector, connector) = collector(ScriptedSource::new(vec![Ok(rainy_response())]));
        connector.state.refuse_connect.store(true, Ordering::SeqCst);

        assert!(!collector.collect_and_publish().await);
        assert!(connector.state.sent_bodies().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_stage_is_contained() {
        let source = ScriptedSource {
            panic_on_call: Some(1),
            ..ScriptedSource::new(vec![Ok(rainy_response())])
        };
        let (mut collector, connector) = collector(source);

        assert!(!collector.collect_and_publish().await);
        assert!(collector.collect_and_publish().await);
        assert_eq!(connector.state.sent_bodies().len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_releases_connection() {
        let (mut collector, connector) = collector(ScriptedSource::new(vec![Ok(rainy_response())]));

        assert!(collector.run_once().await);
        assert!(!collector.publisher().is_connected());
        assert_eq!(connector.state.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_survives_startup_connect_failure_and_stops_on_signal() {
        let source = ScriptedSource::new(vec![Ok(rainy_response())]);
        let calls = source.calls.clone();
        let (mut collector, connector) = collector(source);
        connector.state.refuse_connect.store(true, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(async move {
            collector.run(shutdown_rx).await;
            collector
        });

        // First ticks fail at the publish stage while the broker is down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(connector.state.sent_bodies().is_empty());

        connector.state.refuse_connect.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        let collector = handle.await.unwrap();
        assert!(!collector.publisher().is_connected());
        assert!(!connector.state.sent_bodies().is_empty());
        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(connector.state.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_exits_when_shutdown_sender_dropped() {
        let (mut collector, _connector) = collector(ScriptedSource::new(vec![Ok(rainy_response())]));
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(1), collector.run(shutdown_rx))
            .await
            .expect("collector should stop once the signal source is gone");
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
