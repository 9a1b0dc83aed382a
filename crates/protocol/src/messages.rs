//! Controller <-> worker message definitions
//!
//! The controller writes a [`StartRequest`] followed by a stream of
//! [`ControlMessage`]s to the worker's stdin. The worker answers with a
//! [`StatusMessage`] on its stdout for every state publication.

use crate::types::{WorkerSpec, WorkerState};
use crate::version::ProtocolVersion;
use serde::{Deserialize, Serialize};

/// First frame on the worker's stdin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    /// Protocol version of the controller
    pub version: ProtocolVersion,
    /// Device instance the worker should drive
    pub spec: WorkerSpec,
}

/// Controller -> worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlMessage<E> {
    /// Queue one input event
    Event(E),
    /// Discard every event still waiting in the worker's queue
    ClearQueue,
    /// Leave the main loop and close the device
    Stop,
}

/// Worker -> controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatusMessage<S> {
    /// Full state snapshot after a publication
    State(WorkerState<S>),
}
