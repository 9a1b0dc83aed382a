//! HID report generation
//!
//! Each emulated device kind turns its input events into the byte reports
//! the gadget function expects. The set of kinds is closed: [`HidDevice`] is
//! sealed and implemented only by [`Keyboard`] and [`Mouse`], and a
//! [`DeviceKind`] is mapped onto one of them by an exhaustive match.

mod keyboard;
mod mouse;

pub use keyboard::Keyboard;
pub use mouse::Mouse;

use protocol::DeviceKind;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// One HID report as written to the gadget device. Never empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Report(Box<[u8]>);

impl Report {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; present for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl<const N: usize> From<[u8; N]> for Report {
    fn from(bytes: [u8; N]) -> Self {
        const { assert!(N > 0, "HID reports are never empty") };
        Self(Box::new(bytes))
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Report({:02X?})", &self.0)
    }
}

/// Reports produced for one event, computed lazily and in write order
pub type Reports<'a> = Box<dyn Iterator<Item = Report> + 'a>;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Keyboard {}
    impl Sealed for super::Mouse {}
}

/// A device kind's report codec and inbound report handling
pub trait HidDevice: sealed::Sealed + Sized + Send + 'static {
    /// Input events accepted by this kind
    type Event: Serialize + DeserializeOwned + fmt::Debug + Send + 'static;
    /// Device-specific fields published next to `online`
    type State: Serialize + DeserializeOwned + Clone + fmt::Debug + PartialEq + Send + Sync + 'static;

    /// Codec for `kind`, or `None` if `kind` belongs to another device
    fn from_kind(kind: &DeviceKind) -> Option<Self>;

    /// State published before the first I/O
    fn initial_state(&self) -> Self::State;

    /// Turn one event into the reports to write, possibly none
    fn process_event(&mut self, event: Self::Event) -> Reports<'_>;

    /// Handle one report read back from the host
    fn process_read_report(&mut self, report: &[u8], state: &mut Self::State) {
        let _ = (report, state);
    }

    /// Final report written after the worker stops ("release everything")
    fn cleanup_report(&self) -> Report;
}
