//! IO modules - external interfaces
//!
//! This module contains everything that touches a socket:
//! - `listener` - TCP frame listener and per-connection tasks
//! - `event_channel` - typed channel the domains emit events into
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod event_channel;
pub mod listener;
pub mod prometheus;

// Re-export commonly used types
pub use event_channel::{create_event_channel, EventSender};
pub use listener::start_listener;
