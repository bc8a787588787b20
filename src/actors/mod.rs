//! Actor-based telemetry acquisition
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels. There is exactly one poller and one alert engine per process,
//! constructed at startup and shut down explicitly.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → fetch /sensors → publish ReadingEvent → AlertEngineActor
//!     ↑                              │
//!     └── Commands (PollNow,         └── watch channels: latest reading,
//!         UpdateConfig, GetHistory,      connection status, config
//!         Shutdown)                      (last value replayed to new
//!                                        subscribers)
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control messages
//! 2. **Events**: the poller publishes every tick outcome to a broadcast channel
//! 3. **Request/Response**: oneshot channels for synchronous queries
//! 4. **Last value cached**: watch channels carry the latest reading, status
//!    and config so late subscribers start from the current state

pub mod alert;
pub mod messages;
pub mod poller;
