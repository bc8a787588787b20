//! AlertEngineActor - derives threshold alerts from the reading stream
//!
//! The engine subscribes to the poller's broadcast channel and turns each
//! reading, paired with the thresholds it was acquired under, into zero or
//! more alerts in a bounded log.
//!
//! ## Alerting model
//!
//! Evaluation is level-triggered: a sustained violation raises a fresh alert
//! on every tick the condition holds, with no deduplication or hysteresis.
//! The bounded log (oldest evicted first, dismissed or not) is what keeps a
//! flood from growing without bound.

use std::collections::VecDeque;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use crate::config::AlertThresholds;
use crate::{Alert, AlertKind, SensorReading, Severity};

use super::messages::{AlertCommand, ReadingEvent};

/// Maximum alerts retained, active and dismissed alike.
pub const ALERT_LOG_CAPACITY: usize = 50;

/// Evaluate one reading against the given thresholds.
///
/// The three checks are independent; the paired bounds are mutually
/// exclusive per sensor and boundary values are not violations. Falling
/// below a minimum is a warning, exceeding a maximum is an error. Soil
/// moisture has no upper bound.
pub fn evaluate_reading(reading: &SensorReading, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if reading.temperature < thresholds.temperature_min {
        alerts.push(Alert::new(
            AlertKind::Temperature,
            Severity::Warning,
            format!("temperature too low: {}°C", reading.temperature),
        ));
    } else if reading.temperature > thresholds.temperature_max {
        alerts.push(Alert::new(
            AlertKind::Temperature,
            Severity::Error,
            format!("temperature too high: {}°C", reading.temperature),
        ));
    }

    if reading.humidity < thresholds.humidity_min {
        alerts.push(Alert::new(
            AlertKind::Humidity,
            Severity::Warning,
            format!("humidity too low: {}%", reading.humidity),
        ));
    } else if reading.humidity > thresholds.humidity_max {
        alerts.push(Alert::new(
            AlertKind::Humidity,
            Severity::Error,
            format!("humidity too high: {}%", reading.humidity),
        ));
    }

    if reading.soil_moisture < thresholds.soil_moisture_min {
        alerts.push(Alert::new(
            AlertKind::Soil,
            Severity::Warning,
            format!("soil too dry: {}%", reading.soil_moisture),
        ));
    }

    alerts
}

/// Bounded, insertion-ordered alert log.
///
/// Appends evict from the oldest end once over capacity, regardless of the
/// active flag. Dismissal flips `active` in place and never removes entries.
#[derive(Debug)]
pub struct AlertLog {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, alert: Alert) {
        self.alerts.push_back(alert);
        while self.alerts.len() > self.capacity {
            self.alerts.pop_front();
        }
    }

    /// Flip `active` off for a matching alert; silent no-op otherwise.
    pub fn dismiss(&mut self, alert_id: &str) {
        match self.alerts.iter_mut().find(|alert| alert.id == alert_id) {
            Some(alert) => alert.active = false,
            None => trace!("dismiss for unknown alert id {alert_id}"),
        }
    }

    /// Insertion-ordered snapshot, optionally restricted to active alerts.
    pub fn snapshot(&self, active_only: bool) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|alert| !active_only || alert.active)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(ALERT_LOG_CAPACITY)
    }
}

/// Actor that maintains the bounded alert log
pub struct AlertEngineActor {
    /// Bounded alert log (single writer: this actor)
    log: AlertLog,

    /// Command receiver
    command_rx: mpsc::Receiver<AlertCommand>,

    /// Reading event receiver (broadcast subscription)
    event_rx: broadcast::Receiver<ReadingEvent>,
}

impl AlertEngineActor {
    pub fn new(
        command_rx: mpsc::Receiver<AlertCommand>,
        event_rx: broadcast::Receiver<ReadingEvent>,
    ) -> Self {
        Self {
            log: AlertLog::default(),
            command_rx,
            event_rx,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alert engine");

        loop {
            tokio::select! {
                // Receive reading events
                result = self.event_rx.recv() => {
                    match result {
                        Ok(event) => self.handle_event(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("alert engine lagged, skipped {skipped} readings");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("reading channel closed, shutting down");
                            break;
                        }
                    }
                }

                // Handle commands
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(AlertCommand::Dismiss { alert_id }) => {
                            self.log.dismiss(&alert_id);
                        }

                        Some(AlertCommand::GetAlerts { active_only, respond_to }) => {
                            let _ = respond_to.send(self.log.snapshot(active_only));
                        }

                        Some(AlertCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        // all handles gone, nobody can query the log anymore
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("alert engine stopped");
    }

    fn handle_event(&mut self, event: ReadingEvent) {
        let Some(reading) = event.reading else {
            trace!("tick without reading, nothing to evaluate");
            return;
        };

        for alert in evaluate_reading(&reading, &event.thresholds) {
            debug!("raising {:?} alert: {}", alert.kind, alert.message);
            self.log.push(alert);
        }
    }
}

/// Handle for controlling the AlertEngineActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    /// Spawn a new alert engine subscribed to the given reading stream.
    pub fn spawn(event_rx: broadcast::Receiver<ReadingEvent>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = AlertEngineActor::new(cmd_rx, event_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Dismiss an alert by id; unknown ids are a silent no-op.
    pub async fn dismiss(&self, alert_id: impl Into<String>) {
        let _ = self
            .sender
            .send(AlertCommand::Dismiss {
                alert_id: alert_id.into(),
            })
            .await;
    }

    /// Full alert log in insertion order.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.get(false).await
    }

    /// Active alerts only, in insertion order.
    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.get(true).await
    }

    async fn get(&self, active_only: bool) -> Vec<Alert> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(AlertCommand::GetAlerts {
                active_only,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Shutdown the alert engine.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(AlertCommand::Shutdown).await;
    }
}
