//! floor-twin library
//!
//! Real-time digital twin of a retail floor: a tick-driven simulation of
//! zones, sensors, stock, security motion, virtual customers, and spatial
//! layout, broadcast to connected clients as JSON frames.
//!
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
