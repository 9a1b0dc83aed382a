//! USB OTG HID gadget daemon
//!
//! Emulates a keyboard and a mouse by writing HID reports to USB gadget
//! character devices. Each device is driven by its own worker process so a
//! wedged or crashing device cannot take the daemon down with it.

pub mod config;
pub mod controller;
pub mod device;
pub mod devices;
pub mod hid;
pub mod link;
pub mod process;
pub mod service;
pub mod worker;

pub use controller::{StoppedWorker, WorkerHandle};
pub use device::{DeviceError, DeviceHandle, DeviceIo};
pub use devices::{Devices, InputCommand};
pub use hid::{HidDevice, Keyboard, Mouse, Report};
pub use link::{AlwaysOperable, GadgetLink, Udc};
pub use worker::{DeviceWorker, WorkerSettings, cleanup_write};
