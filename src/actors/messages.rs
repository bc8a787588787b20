//! Message types for actor communication
//!
//! Commands are sent to a specific actor via mpsc; events are broadcast to
//! every subscriber. All event types are cloneable for multi-subscriber
//! fan-out.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::config::{AcquisitionConfig, AlertThresholds, ConfigPatch};
use crate::{Alert, SensorReading};

/// Outcome of one poll tick, published to every subscriber.
///
/// `reading` is `None` when the fetch failed; the event still flows so
/// consumers can track the connection status per tick. The thresholds are the
/// ones current at publish time, so the alert engine always evaluates a
/// reading against the configuration it was acquired under.
#[derive(Debug, Clone)]
pub struct ReadingEvent {
    pub reading: Option<SensorReading>,
    pub connected: bool,
    pub thresholds: AlertThresholds,
    pub polled_at: DateTime<Utc>,
}

/// Commands understood by the [`TelemetryPollerActor`](super::poller::TelemetryPollerActor).
#[derive(Debug)]
pub enum PollerCommand {
    /// Trigger an immediate fetch, bypassing the interval timer.
    ///
    /// Responds with the resulting connection status. Fetch failures are not
    /// errors at this boundary; they degrade the status and nothing else.
    PollNow { respond_to: oneshot::Sender<bool> },

    /// Merge a partial configuration update.
    ///
    /// If the interval or endpoint URL changed, the pending tick is cancelled
    /// and a fresh timer starts at the new interval. The patch is trusted;
    /// validation happens at the settings boundary.
    UpdateConfig {
        patch: ConfigPatch,
        respond_to: oneshot::Sender<()>,
    },

    /// Request an owned snapshot of the bounded reading history.
    GetHistory {
        respond_to: oneshot::Sender<Vec<SensorReading>>,
    },

    /// Request the currently active configuration.
    GetConfig {
        respond_to: oneshot::Sender<AcquisitionConfig>,
    },

    /// Gracefully shut down the poller; no further ticks fire.
    Shutdown,
}

/// Commands understood by the [`AlertEngineActor`](super::alert::AlertEngineActor).
#[derive(Debug)]
pub enum AlertCommand {
    /// Mark an alert as dismissed.
    ///
    /// Unknown or already-dismissed ids are a silent no-op.
    Dismiss { alert_id: String },

    /// Request an insertion-ordered snapshot of the alert log.
    GetAlerts {
        active_only: bool,
        respond_to: oneshot::Sender<Vec<Alert>>,
    },

    /// Gracefully shut down the alert engine.
    Shutdown,
}
