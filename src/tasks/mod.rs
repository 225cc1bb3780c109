//! Background tasks module
//!
//! This module contains background tasks that run alongside the HTTP server.

pub mod clock_driver;
pub mod persist_writer;

// Re-export main functions
pub use clock_driver::{clock_driver_task, ClockDriver};
pub use persist_writer::{persist_channel, persist_writer_task, PersistJob};
