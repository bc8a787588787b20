//! TelemetryPollerActor - polls the sensor device for readings
//!
//! The poller owns the acquisition state: current configuration, bounded
//! reading history, latest reading and connection status. It runs an
//! unattended loop against the device endpoint and never tears itself down
//! on a failed fetch; only an explicit shutdown stops ticking.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → fetch /sensors → publish ReadingEvent → [AlertEngine, ...]
//!     ↑
//!     └─── Commands (PollNow, UpdateConfig, GetHistory, GetConfig, Shutdown)
//! ```
//!
//! A configuration update that touches the interval or URL drops the current
//! ticker and installs a fresh one, so exactly one timer governs future ticks
//! at all times.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, interval_at};
use tracing::{debug, error, instrument, trace, warn};

use crate::config::{AcquisitionConfig, ConfigPatch};
use crate::history::HistoryBuffer;
use crate::{SensorPayload, SensorReading};

use super::messages::{PollerCommand, ReadingEvent};

/// Actor that polls the sensor endpoint at the configured interval
///
/// There is one poller per process. It publishes every tick outcome to a
/// broadcast channel and mirrors the latest reading, connection status and
/// configuration into watch channels for late subscribers.
pub struct TelemetryPollerActor {
    /// Current acquisition configuration (single writer: this actor)
    config: AcquisitionConfig,

    /// HTTP client (reused across requests for efficiency)
    client: reqwest::Client,

    /// Bounded FIFO window of successful readings
    history: HistoryBuffer,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<PollerCommand>,

    /// Broadcast sender for per-tick events
    event_tx: broadcast::Sender<ReadingEvent>,

    /// Latest reading; `None` until the first success or after a failure
    reading_tx: watch::Sender<Option<SensorReading>>,

    /// True iff the most recent poll attempt succeeded
    status_tx: watch::Sender<bool>,

    /// Currently active configuration
    config_tx: watch::Sender<AcquisitionConfig>,
}

impl TelemetryPollerActor {
    pub fn new(
        config: AcquisitionConfig,
        command_rx: mpsc::Receiver<PollerCommand>,
        event_tx: broadcast::Sender<ReadingEvent>,
        reading_tx: watch::Sender<Option<SensorReading>>,
        status_tx: watch::Sender<bool>,
        config_tx: watch::Sender<AcquisitionConfig>,
    ) -> Self {
        let client = Self::build_client(config.request_timeout_ms);
        Self {
            config,
            client,
            history: HistoryBuffer::default(),
            command_rx,
            event_tx,
            reading_tx,
            status_tx,
            config_tx,
        }
    }

    /// Build the HTTP client carrying the bounded request timeout, so a
    /// single fetch can never stall the loop.
    fn build_client(timeout_ms: u64) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("Failed to build HTTP client")
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or the command channel is
    /// closed. Fetch failures never break the loop.
    #[instrument(skip(self), fields(url = %self.config.endpoint_url))]
    pub async fn run(mut self) {
        debug!(
            "starting telemetry poller with interval {}ms",
            self.config.poll_interval_ms
        );

        let mut ticker = Self::ticker(self.config.poll_interval_ms);

        loop {
            tokio::select! {
                // Timer tick - one fetch attempt
                _ = ticker.tick() => {
                    self.poll_tick().await;
                }

                // Handle commands
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PollerCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            let connected = self.poll_tick().await;
                            let _ = respond_to.send(connected);
                        }

                        Some(PollerCommand::UpdateConfig { patch, respond_to }) => {
                            self.apply_patch(patch, &mut ticker);
                            let _ = respond_to.send(());
                        }

                        Some(PollerCommand::GetHistory { respond_to }) => {
                            let _ = respond_to.send(self.history.snapshot());
                        }

                        Some(PollerCommand::GetConfig { respond_to }) => {
                            let _ = respond_to.send(self.config.clone());
                        }

                        Some(PollerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        // all handles gone, nobody can reach us anymore
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("telemetry poller stopped");
    }

    /// Build a fresh ticker for the given interval.
    ///
    /// The first tick fires one full period from now, so a ticker installed
    /// by a config update does not fire immediately and cannot overlap with
    /// the tick it replaced.
    fn ticker(interval_ms: u64) -> Interval {
        let period = Duration::from_millis(interval_ms);
        interval_at(Instant::now() + period, period)
    }

    /// Merge a config patch and reschedule the loop if interval or URL changed.
    fn apply_patch(&mut self, patch: ConfigPatch, ticker: &mut Interval) {
        let previous_interval = self.config.poll_interval_ms;
        let previous_url = self.config.endpoint_url.clone();
        let previous_timeout = self.config.request_timeout_ms;

        patch.apply(&mut self.config);
        self.config_tx.send_replace(self.config.clone());

        // the timeout lives on the client, so a changed value needs a rebuild
        if self.config.request_timeout_ms != previous_timeout {
            self.client = Self::build_client(self.config.request_timeout_ms);
        }

        let interval_changed = self.config.poll_interval_ms != previous_interval;
        let url_changed = self.config.endpoint_url != previous_url;

        if interval_changed || url_changed {
            debug!(
                "rescheduling poll loop: interval {}ms, url {}",
                self.config.poll_interval_ms, self.config.endpoint_url
            );
            // replacing the ticker cancels the pending tick
            *ticker = Self::ticker(self.config.poll_interval_ms);
        } else {
            trace!("config patch without interval/url change, loop untouched");
        }
    }

    /// Execute one tick: fetch, update state, publish.
    ///
    /// Returns the resulting connection status. A failed fetch degrades the
    /// status and leaves the history untouched; nothing propagates out.
    async fn poll_tick(&mut self) -> bool {
        match self.fetch_once().await {
            Ok(reading) => {
                trace!("reading received: {reading:?}");

                self.history.push(reading.clone());
                self.reading_tx.send_replace(Some(reading.clone()));
                self.status_tx.send_replace(true);
                self.publish(Some(reading), true);
                true
            }
            Err(e) => {
                error!("{}: poll failed: {e:#}", self.config.endpoint_url);

                self.reading_tx.send_replace(None);
                self.status_tx.send_replace(false);
                self.publish(None, false);
                false
            }
        }
    }

    /// Publish one tick outcome to the broadcast channel.
    fn publish(&self, reading: Option<SensorReading>, connected: bool) {
        let event = ReadingEvent {
            reading,
            connected,
            thresholds: self.config.thresholds,
            polled_at: Utc::now(),
        };

        // No subscribers is fine; slow subscribers may lag and drop events,
        // which is acceptable for a continuously refreshing stream.
        match self.event_tx.send(event) {
            Ok(num_receivers) => {
                trace!("published reading event to {num_receivers} receivers");
            }
            Err(_) => {
                trace!("no receivers for reading event (this is OK)");
            }
        }
    }

    /// Issue exactly one request against the URL current at call time.
    ///
    /// The URL is read here, not at schedule time, so a config update that
    /// rebinds the endpoint takes effect for the very next fetch.
    async fn fetch_once(&self) -> Result<SensorReading> {
        let url = format!("{}/sensors", self.config.endpoint_url);

        trace!("requesting sensors from {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        let payload: SensorPayload =
            serde_json::from_str(&body).context("failed to parse sensor payload")?;

        Ok(payload.into_reading(Utc::now()))
    }
}

/// Handle for controlling a TelemetryPollerActor
///
/// Cloneable; one handle per process is constructed at startup and the actor
/// is torn down via [`PollerHandle::shutdown`].
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,
    event_tx: broadcast::Sender<ReadingEvent>,
    reading_rx: watch::Receiver<Option<SensorReading>>,
    status_rx: watch::Receiver<bool>,
    config_rx: watch::Receiver<AcquisitionConfig>,
}

impl PollerHandle {
    /// Spawn a new poller actor and start polling.
    pub fn spawn(config: AcquisitionConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(64);
        let (reading_tx, reading_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(false);
        let (config_tx, config_rx) = watch::channel(config.clone());

        let actor = TelemetryPollerActor::new(
            config,
            cmd_rx,
            event_tx.clone(),
            reading_tx,
            status_tx,
            config_tx,
        );

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            event_tx,
            reading_rx,
            status_rx,
            config_rx,
        }
    }

    /// Subscribe to per-tick reading events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReadingEvent> {
        self.event_tx.subscribe()
    }

    /// Latest reading, last value replayed to new subscribers.
    pub fn reading(&self) -> watch::Receiver<Option<SensorReading>> {
        self.reading_rx.clone()
    }

    /// Connection status, true iff the most recent poll succeeded.
    pub fn connection_status(&self) -> watch::Receiver<bool> {
        self.status_rx.clone()
    }

    /// Currently active configuration as a watch stream.
    pub fn config_watch(&self) -> watch::Receiver<AcquisitionConfig> {
        self.config_rx.clone()
    }

    /// Trigger an immediate poll, returning the resulting connection status.
    pub async fn poll_now(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")
    }

    /// Merge a partial configuration update into the running poller.
    ///
    /// The patch must already be validated; the poller trusts its input.
    pub async fn update_config(&self, patch: ConfigPatch) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::UpdateConfig {
                patch,
                respond_to: tx,
            })
            .await
            .context("failed to send UpdateConfig command")?;

        rx.await.context("failed to receive response")
    }

    /// Owned snapshot of the bounded reading history.
    pub async fn history(&self) -> Result<Vec<SensorReading>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::GetHistory { respond_to: tx })
            .await
            .context("failed to send GetHistory command")?;

        rx.await.context("failed to receive response")
    }

    /// Currently active configuration.
    pub async fn config(&self) -> Result<AcquisitionConfig> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::GetConfig { respond_to: tx })
            .await
            .context("failed to send GetConfig command")?;

        rx.await.context("failed to receive response")
    }

    /// Gracefully shut down the poller.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcquisitionConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(endpoint_url: &str, poll_interval_ms: u64) -> AcquisitionConfig {
        AcquisitionConfig {
            poll_interval_ms,
            endpoint_url: endpoint_url.to_string(),
            ..Default::default()
        }
    }

    fn sensors_body(temperature: f64, humidity: f64, soil: f64) -> serde_json::Value {
        serde_json::json!({
            "temperature": temperature,
            "humidity": humidity,
            "soil": soil,
        })
    }

    async fn mock_sensors_ok(server: &MockServer, temperature: f64) {
        Mock::given(method("GET"))
            .and(path("/sensors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sensors_body(temperature, 55.0, 40.0)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_successful_poll_publishes_reading_and_appends_history() {
        let mock_server = MockServer::start().await;
        mock_sensors_ok(&mock_server, 22.5).await;

        // long interval so only poll_now drives ticks
        let handle = PollerHandle::spawn(create_test_config(&mock_server.uri(), 60_000));
        let mut events = handle.subscribe();

        let connected = handle.poll_now().await.unwrap();
        assert!(connected);

        let event = tokio::time::timeout(Duration::from_millis(500), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.connected);
        let reading = event.reading.unwrap();
        assert_eq!(reading.temperature, 22.5);
        assert_eq!(reading.humidity, 55.0);
        assert_eq!(reading.soil_moisture, 40.0);

        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 1);

        assert!(*handle.connection_status().borrow());
        assert!(handle.reading().borrow().is_some());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_http_error_reports_disconnected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sensors"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let handle = PollerHandle::spawn(create_test_config(&mock_server.uri(), 60_000));
        let mut events = handle.subscribe();

        let connected = handle.poll_now().await.unwrap();
        assert!(!connected);

        let event = tokio::time::timeout(Duration::from_millis(500), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!event.connected);
        assert!(event.reading.is_none());

        assert!(handle.history().await.unwrap().is_empty());
        assert!(!*handle.connection_status().borrow());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_json_reports_disconnected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sensors"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not valid json"))
            .mount(&mock_server)
            .await;

        let handle = PollerHandle::spawn(create_test_config(&mock_server.uri(), 60_000));

        let connected = handle.poll_now().await.unwrap();
        assert!(!connected);
        assert!(handle.history().await.unwrap().is_empty());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_disconnected() {
        // nothing listens on port 1
        let handle = PollerHandle::spawn(create_test_config("http://127.0.0.1:1", 60_000));

        let connected = handle.poll_now().await.unwrap();
        assert!(!connected);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_leaves_previous_history_untouched() {
        let mock_server = MockServer::start().await;

        // one good response, then 500s
        Mock::given(method("GET"))
            .and(path("/sensors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sensors_body(21.0, 50.0, 45.0)))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sensors"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let handle = PollerHandle::spawn(create_test_config(&mock_server.uri(), 60_000));

        assert!(handle.poll_now().await.unwrap());
        assert!(!handle.poll_now().await.unwrap());

        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].temperature, 21.0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_reports_disconnected_history_untouched() {
        let mock_server = MockServer::start().await;

        // one prompt response, then everything arrives after the timeout
        Mock::given(method("GET"))
            .and(path("/sensors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sensors_body(21.0, 50.0, 45.0)))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sensors"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(sensors_body(99.0, 99.0, 99.0))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let mut config = create_test_config(&mock_server.uri(), 60_000);
        config.request_timeout_ms = 100;
        let handle = PollerHandle::spawn(config);

        assert!(handle.poll_now().await.unwrap());
        assert!(!handle.poll_now().await.unwrap());

        // the timed-out response never becomes a history entry
        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].temperature, 21.0);
        assert!(!*handle.connection_status().borrow());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_handles_stop_the_actor() {
        let handle = PollerHandle::spawn(create_test_config("http://127.0.0.1:1", 60_000));
        let mut events = handle.subscribe();

        drop(handle);

        // the actor notices the closed command channel, exits and drops its
        // broadcast sender
        let stopped = tokio::time::timeout(Duration::from_millis(500), async {
            loop {
                if let Err(broadcast::error::RecvError::Closed) = events.recv().await {
                    break;
                }
            }
        })
        .await;
        assert!(stopped.is_ok(), "actor should stop once all handles are gone");
    }

    #[tokio::test]
    async fn test_update_config_rebinds_endpoint() {
        let mock_server = MockServer::start().await;
        mock_sensors_ok(&mock_server, 19.0).await;

        // start against a dead endpoint, then rebind to the mock
        let handle = PollerHandle::spawn(create_test_config("http://127.0.0.1:1", 60_000));
        assert!(!handle.poll_now().await.unwrap());

        handle
            .update_config(ConfigPatch {
                endpoint_url: Some(mock_server.uri()),
                ..Default::default()
            })
            .await
            .unwrap();

        let config = handle.config().await.unwrap();
        assert_eq!(config.endpoint_url, mock_server.uri());
        assert_eq!(config.poll_interval_ms, 60_000);

        assert!(handle.poll_now().await.unwrap());
        assert_eq!(handle.history().await.unwrap().len(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_config_watch_follows_updates() {
        let handle = PollerHandle::spawn(create_test_config("http://127.0.0.1:1", 60_000));
        let config_rx = handle.config_watch();

        handle
            .update_config(ConfigPatch {
                poll_interval_ms: Some(5000),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(config_rx.borrow().poll_interval_ms, 5000);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ticker_polls_at_interval() {
        let mock_server = MockServer::start().await;
        mock_sensors_ok(&mock_server, 20.0).await;

        // the poller trusts its input, so tests may run far below the
        // boundary-enforced 1s minimum
        let handle = PollerHandle::spawn(create_test_config(&mock_server.uri(), 50));

        tokio::time::sleep(Duration::from_millis(275)).await;

        let history = handle.history().await.unwrap();
        assert!(history.len() >= 3, "expected >= 3 polls, got {}", history.len());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_interval_installs_exactly_one_timer() {
        let mock_server = MockServer::start().await;
        mock_sensors_ok(&mock_server, 20.0).await;

        // no ticks at the initial interval
        let handle = PollerHandle::spawn(create_test_config(&mock_server.uri(), 60_000));

        // two consecutive reschedules; only the last timer may survive
        handle
            .update_config(ConfigPatch {
                poll_interval_ms: Some(40),
                ..Default::default()
            })
            .await
            .unwrap();
        handle
            .update_config(ConfigPatch {
                poll_interval_ms: Some(50),
                ..Default::default()
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(280)).await;

        let polls = handle.history().await.unwrap().len();
        // a duplicate timer chain would roughly double the count
        assert!((3..=7).contains(&polls), "expected 3..=7 polls, got {polls}");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_polling() {
        let handle = PollerHandle::spawn(create_test_config("http://127.0.0.1:1", 60_000));

        handle.shutdown().await.unwrap();

        // actor is gone, commands fail
        let result = handle.poll_now().await;
        assert!(result.is_err(), "poll should fail after shutdown");
    }

    #[tokio::test]
    async fn test_events_carry_current_thresholds() {
        let mock_server = MockServer::start().await;
        mock_sensors_ok(&mock_server, 22.0).await;

        let handle = PollerHandle::spawn(create_test_config(&mock_server.uri(), 60_000));

        let mut thresholds = crate::config::AlertThresholds::default();
        thresholds.soil_moisture_min = 33.0;
        handle
            .update_config(ConfigPatch {
                thresholds: Some(thresholds),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut events = handle.subscribe();
        handle.poll_now().await.unwrap();

        let event = tokio::time::timeout(Duration::from_millis(500), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.thresholds.soil_moisture_min, 33.0);

        handle.shutdown().await.unwrap();
    }
}
