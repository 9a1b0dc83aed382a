//! Shared type definitions
//!
//! Device kinds, the per-kind input events and device state, and the
//! start-up record a worker process receives from its controller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The closed set of emulated device kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Boot-protocol keyboard with LED feedback
    Keyboard,
    /// Mouse, either absolute (tablet-like) or relative
    Mouse {
        /// Absolute positioning instead of relative deltas
        absolute: bool,
        /// Report carries a horizontal wheel byte
        horizontal_wheel: bool,
    },
}

impl DeviceKind {
    /// Short lowercase name used in logs and process titles
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Keyboard => "keyboard",
            DeviceKind::Mouse { .. } => "mouse",
        }
    }
}

/// Everything a worker process needs to drive one gadget device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Instance name, e.g. "keyboard"
    pub name: String,
    /// Device kind, selects the report codec
    pub kind: DeviceKind,
    /// Path to the gadget character device (e.g. /dev/hidg0)
    pub device_path: PathBuf,
    /// Inbound read size in bytes; 0 disables inbound polling
    pub read_chunk_size: usize,
    /// Upper bound for the write-readiness poll
    pub select_timeout: Duration,
    /// Upper bound for the event wait; also the retry cadence
    pub queue_timeout: Duration,
    /// Maximum write attempts for one report
    pub write_retries: u32,
    /// Bypass real I/O
    pub noop: bool,
    /// UDC name to consult for link state (None = auto-detect)
    pub udc: Option<String>,
    /// Log filter for the worker process
    pub log_level: String,
    /// Pause after an unexpected loop-level error
    pub error_backoff: Duration,
}

impl WorkerSpec {
    /// Whether inbound reports are polled for this device
    pub fn needs_read(&self) -> bool {
        self.read_chunk_size > 0
    }
}

/// Published worker state: liveness plus the device-specific fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerState<S> {
    /// The last I/O attempt on the device succeeded
    pub online: bool,
    /// Device-specific state (keyboard LEDs, mouse mode)
    pub device: S,
}

impl<S> WorkerState<S> {
    pub fn new(device: S) -> Self {
        Self {
            online: true,
            device,
        }
    }
}

/// Keyboard input events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardEvent {
    /// Press or release a key by its HID usage ID (page 0x07)
    Key { code: u8, pressed: bool },
    /// Release every pressed key and modifier
    ReleaseAll,
}

/// Keyboard LED state reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyboardState {
    pub num: bool,
    pub caps: bool,
    pub scroll: bool,
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

impl MouseButton {
    /// Bit in the report's button byte
    pub fn mask(self) -> u8 {
        match self {
            MouseButton::Left => 0x01,
            MouseButton::Right => 0x02,
            MouseButton::Middle => 0x04,
            MouseButton::Back => 0x08,
            MouseButton::Forward => 0x10,
        }
    }
}

/// Mouse input events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseEvent {
    Button { button: MouseButton, pressed: bool },
    /// Absolute position, full signed 16-bit range
    MoveAbsolute { x: i16, y: i16 },
    /// Relative motion
    MoveRelative { dx: i16, dy: i16 },
    /// Wheel motion; dx is horizontal
    Wheel { dx: i16, dy: i16 },
    ReleaseAll,
}

/// Mouse mode as published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MouseState {
    pub absolute: bool,
    pub horizontal_wheel: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_masks_are_distinct() {
        let buttons = [
            MouseButton::Left,
            MouseButton::Right,
            MouseButton::Middle,
            MouseButton::Back,
            MouseButton::Forward,
        ];
        let combined = buttons.iter().fold(0u8, |acc, b| {
            assert_eq!(acc & b.mask(), 0, "{:?} overlaps", b);
            acc | b.mask()
        });
        assert_eq!(combined, 0x1F);
    }

    #[test]
    fn test_worker_state_starts_online() {
        let state = WorkerState::new(KeyboardState::default());
        assert!(state.online);
        assert!(!state.device.caps);
    }

    #[test]
    fn test_needs_read() {
        let mut spec = WorkerSpec {
            name: "keyboard".to_string(),
            kind: DeviceKind::Keyboard,
            device_path: PathBuf::from("/dev/hidg0"),
            read_chunk_size: 8,
            select_timeout: Duration::from_millis(100),
            queue_timeout: Duration::from_millis(100),
            write_retries: 150,
            noop: false,
            udc: None,
            log_level: "info".to_string(),
            error_backoff: Duration::from_secs(1),
        };
        assert!(spec.needs_read());
        spec.read_chunk_size = 0;
        assert!(!spec.needs_read());
    }
}
