//! Absolute and relative mouse
//!
//! Absolute report: `[buttons, x_lo, x_hi, y_lo, y_hi, wheel_v(, wheel_h)]`
//! with coordinates in 0..=32767. Relative report:
//! `[buttons, dx, dy, wheel_v(, wheel_h)]` with signed 8-bit deltas; larger
//! motions are split into several reports.

use super::{HidDevice, Report, Reports};
use protocol::{DeviceKind, MouseEvent, MouseState};
use std::iter;

const STEP: i16 = 127;

#[derive(Debug)]
pub struct Mouse {
    absolute: bool,
    horizontal_wheel: bool,
    buttons: u8,
    x: u16,
    y: u16,
}

/// Map the full signed 16-bit event range onto the descriptor's 0..=32767
fn to_absolute(value: i16) -> u16 {
    ((i32::from(value) + 32768) / 2) as u16
}

/// Split a pair of deltas into at most ±127 steps, lazily
fn split_deltas(mut a: i16, mut b: i16) -> impl Iterator<Item = (i8, i8)> {
    iter::from_fn(move || {
        if a == 0 && b == 0 {
            return None;
        }
        let step_a = a.clamp(-STEP, STEP);
        let step_b = b.clamp(-STEP, STEP);
        a -= step_a;
        b -= step_b;
        Some((step_a as i8, step_b as i8))
    })
}

impl Mouse {
    pub fn new(absolute: bool, horizontal_wheel: bool) -> Self {
        Self {
            absolute,
            horizontal_wheel,
            buttons: 0,
            x: to_absolute(0),
            y: to_absolute(0),
        }
    }

    fn report_len(&self) -> usize {
        let base = if self.absolute { 6 } else { 4 };
        base + usize::from(self.horizontal_wheel)
    }

    fn build(&self, dx: i8, dy: i8, wheel_v: i8, wheel_h: i8) -> Report {
        let mut bytes = Vec::with_capacity(self.report_len());
        bytes.push(self.buttons);
        if self.absolute {
            bytes.extend_from_slice(&self.x.to_le_bytes());
            bytes.extend_from_slice(&self.y.to_le_bytes());
        } else {
            bytes.push(dx as u8);
            bytes.push(dy as u8);
        }
        bytes.push(wheel_v as u8);
        if self.horizontal_wheel {
            bytes.push(wheel_h as u8);
        }
        // Never empty: the button byte is always there
        Report(bytes.into_boxed_slice())
    }

    fn still(&self) -> Report {
        self.build(0, 0, 0, 0)
    }
}

impl HidDevice for Mouse {
    type Event = MouseEvent;
    type State = MouseState;

    fn from_kind(kind: &DeviceKind) -> Option<Self> {
        match *kind {
            DeviceKind::Mouse {
                absolute,
                horizontal_wheel,
            } => Some(Self::new(absolute, horizontal_wheel)),
            DeviceKind::Keyboard => None,
        }
    }

    fn initial_state(&self) -> MouseState {
        MouseState {
            absolute: self.absolute,
            horizontal_wheel: self.horizontal_wheel,
        }
    }

    fn process_event(&mut self, event: MouseEvent) -> Reports<'_> {
        match event {
            MouseEvent::Button { button, pressed } => {
                let before = self.buttons;
                if pressed {
                    self.buttons |= button.mask();
                } else {
                    self.buttons &= !button.mask();
                }
                if before == self.buttons {
                    Box::new(iter::empty())
                } else {
                    Box::new(iter::once(self.still()))
                }
            }
            MouseEvent::MoveAbsolute { x, y } if self.absolute => {
                self.x = to_absolute(x);
                self.y = to_absolute(y);
                Box::new(iter::once(self.still()))
            }
            MouseEvent::MoveRelative { dx, dy } if !self.absolute => {
                let this = &*self;
                Box::new(split_deltas(dx, dy).map(move |(dx, dy)| this.build(dx, dy, 0, 0)))
            }
            MouseEvent::MoveAbsolute { .. } | MouseEvent::MoveRelative { .. } => {
                Box::new(iter::empty())
            }
            MouseEvent::Wheel { dx, dy } => {
                let dx = if self.horizontal_wheel { dx } else { 0 };
                let this = &*self;
                Box::new(split_deltas(dy, dx).map(move |(v, h)| this.build(0, 0, v, h)))
            }
            MouseEvent::ReleaseAll => {
                self.buttons = 0;
                Box::new(iter::once(self.still()))
            }
        }
    }

    fn cleanup_report(&self) -> Report {
        Report(vec![0u8; self.report_len()].into_boxed_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::MouseButton;

    fn run(mouse: &mut Mouse, event: MouseEvent) -> Vec<Vec<u8>> {
        mouse
            .process_event(event)
            .map(|r| r.as_bytes().to_vec())
            .collect()
    }

    #[test]
    fn test_absolute_move() {
        let mut mouse = Mouse::new(true, false);
        let reports = run(&mut mouse, MouseEvent::MoveAbsolute { x: 0, y: i16::MAX });
        // 16384 = 0x4000, 32767 = 0x7FFF
        assert_eq!(reports, vec![vec![0, 0x00, 0x40, 0xFF, 0x7F, 0]]);

        let reports = run(&mut mouse, MouseEvent::MoveAbsolute { x: i16::MIN, y: 0 });
        assert_eq!(reports, vec![vec![0, 0, 0, 0x00, 0x40, 0]]);
    }

    #[test]
    fn test_button_keeps_absolute_position() {
        let mut mouse = Mouse::new(true, true);
        run(&mut mouse, MouseEvent::MoveAbsolute { x: 0, y: 0 });
        let reports = run(
            &mut mouse,
            MouseEvent::Button {
                button: MouseButton::Right,
                pressed: true,
            },
        );
        assert_eq!(reports, vec![vec![0x02, 0x00, 0x40, 0x00, 0x40, 0, 0]]);

        // Pressing again changes nothing
        let reports = run(
            &mut mouse,
            MouseEvent::Button {
                button: MouseButton::Right,
                pressed: true,
            },
        );
        assert!(reports.is_empty());
    }

    #[test]
    fn test_relative_move_is_split() {
        let mut mouse = Mouse::new(false, false);
        let reports = run(&mut mouse, MouseEvent::MoveRelative { dx: 300, dy: -5 });
        assert_eq!(
            reports,
            vec![
                vec![0, 127, (-5i8) as u8, 0],
                vec![0, 127, 0, 0],
                vec![0, 46, 0, 0],
            ]
        );
    }

    #[test]
    fn test_relative_split_is_lazy() {
        let mut mouse = Mouse::new(false, false);
        let mut reports = mouse.process_event(MouseEvent::MoveRelative {
            dx: i16::MIN,
            dy: 0,
        });
        assert_eq!(reports.next().unwrap().as_bytes()[1], (-127i8) as u8);
        // Dropping the rest of the sequence is fine
        drop(reports);
    }

    #[test]
    fn test_i16_min_terminates() {
        let mut mouse = Mouse::new(false, true);
        let count = mouse
            .process_event(MouseEvent::MoveRelative {
                dx: i16::MIN,
                dy: i16::MIN,
            })
            .count();
        // 32768 / 127 rounded up
        assert_eq!(count, 259);
    }

    #[test]
    fn test_mode_mismatch_yields_nothing() {
        let mut absolute = Mouse::new(true, false);
        assert!(run(&mut absolute, MouseEvent::MoveRelative { dx: 1, dy: 1 }).is_empty());

        let mut relative = Mouse::new(false, false);
        assert!(run(&mut relative, MouseEvent::MoveAbsolute { x: 1, y: 1 }).is_empty());
    }

    #[test]
    fn test_wheel() {
        let mut mouse = Mouse::new(false, true);
        let reports = run(&mut mouse, MouseEvent::Wheel { dx: -1, dy: 2 });
        assert_eq!(reports, vec![vec![0, 0, 0, 2, 0xFF]]);

        // Without a horizontal wheel the dx part is dropped entirely
        let mut mouse = Mouse::new(false, false);
        assert!(run(&mut mouse, MouseEvent::Wheel { dx: 5, dy: 0 }).is_empty());
    }

    #[test]
    fn test_release_all_and_cleanup() {
        let mut mouse = Mouse::new(true, false);
        run(
            &mut mouse,
            MouseEvent::Button {
                button: MouseButton::Left,
                pressed: true,
            },
        );
        let reports = run(&mut mouse, MouseEvent::ReleaseAll);
        assert_eq!(reports[0][0], 0);

        assert_eq!(mouse.cleanup_report().as_bytes(), &[0u8; 6]);
        assert_eq!(Mouse::new(false, true).cleanup_report().len(), 5);
    }

    #[test]
    fn test_state_reflects_mode() {
        let mouse = Mouse::new(true, true);
        assert_eq!(
            mouse.initial_state(),
            MouseState {
                absolute: true,
                horizontal_wheel: true
            }
        );
    }
}
