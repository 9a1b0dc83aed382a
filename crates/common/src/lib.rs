//! Common utilities for kvmd-otg-hid
//!
//! This crate provides the pieces shared by the HID controller and its
//! device worker processes: error handling, logging setup, the event queue
//! feeding a worker, the worker's stop flag, and the publish/watch pair for
//! worker state.

pub mod error;
pub mod logging;
pub mod queue;
pub mod signal;
pub mod state;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::{build_dispatch, setup_logging};
pub use queue::{EventConsumer, EventQueue, PopError, event_queue};
pub use signal::StopSignal;
pub use state::{StatePublisher, StateSink, StateWatcher, shared_state, state_channel};
