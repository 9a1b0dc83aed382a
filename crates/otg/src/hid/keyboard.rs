//! Boot-protocol keyboard
//!
//! Report layout (8 bytes): `[modifiers, reserved, key1..key6]`. Usage IDs
//! 0xE0..=0xE7 are the eight modifiers and live in the first byte; every
//! other usage takes one of six key slots in press order.

use super::{HidDevice, Report, Reports};
use protocol::{DeviceKind, KeyboardEvent, KeyboardState};

const REPORT_LEN: usize = 8;
const MAX_KEYS: usize = 6;

const LED_NUM_LOCK: u8 = 0x01;
const LED_CAPS_LOCK: u8 = 0x02;
const LED_SCROLL_LOCK: u8 = 0x04;

#[derive(Debug, Default)]
pub struct Keyboard {
    modifiers: u8,
    keys: Vec<u8>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn modifier_bit(code: u8) -> Option<u8> {
        (0xE0..=0xE7).contains(&code).then(|| 1 << (code - 0xE0))
    }

    /// Apply a key change; false if nothing changed
    fn apply(&mut self, code: u8, pressed: bool) -> bool {
        if let Some(bit) = Self::modifier_bit(code) {
            let before = self.modifiers;
            if pressed {
                self.modifiers |= bit;
            } else {
                self.modifiers &= !bit;
            }
            return before != self.modifiers;
        }

        let position = self.keys.iter().position(|&k| k == code);
        match (pressed, position) {
            (true, None) if self.keys.len() < MAX_KEYS => {
                self.keys.push(code);
                true
            }
            (false, Some(index)) => {
                self.keys.remove(index);
                true
            }
            _ => false,
        }
    }

    fn release_all(&mut self) {
        self.modifiers = 0;
        self.keys.clear();
    }

    fn report(&self) -> Report {
        let mut bytes = [0u8; REPORT_LEN];
        bytes[0] = self.modifiers;
        for (slot, key) in bytes[2..].iter_mut().zip(&self.keys) {
            *slot = *key;
        }
        Report::from(bytes)
    }
}

impl HidDevice for Keyboard {
    type Event = KeyboardEvent;
    type State = KeyboardState;

    fn from_kind(kind: &DeviceKind) -> Option<Self> {
        match kind {
            DeviceKind::Keyboard => Some(Self::new()),
            DeviceKind::Mouse { .. } => None,
        }
    }

    fn initial_state(&self) -> KeyboardState {
        KeyboardState::default()
    }

    fn process_event(&mut self, event: KeyboardEvent) -> Reports<'_> {
        let changed = match event {
            KeyboardEvent::Key { code, pressed } => self.apply(code, pressed),
            // Always resend: the host may have missed the previous state
            KeyboardEvent::ReleaseAll => {
                self.release_all();
                true
            }
        };
        Box::new(changed.then(|| self.report()).into_iter())
    }

    fn process_read_report(&mut self, report: &[u8], state: &mut KeyboardState) {
        if let Some(&leds) = report.first() {
            state.num = leds & LED_NUM_LOCK != 0;
            state.caps = leds & LED_CAPS_LOCK != 0;
            state.scroll = leds & LED_SCROLL_LOCK != 0;
        }
    }

    fn cleanup_report(&self) -> Report {
        Report::from([0u8; REPORT_LEN])
    }
}
