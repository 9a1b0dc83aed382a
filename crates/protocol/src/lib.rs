//! Protocol library for kvmd-otg-hid
//!
//! This crate defines the messages exchanged between the HID controller and
//! its isolated device worker processes. It provides the device kinds and
//! their input events, the published worker state, serialization using
//! postcard, and protocol versioning.
//!
//! # Framed Messages
//!
//! Every message travels over a pipe with a length prefix:
//!
//! ```
//! use protocol::{ControlMessage, KeyboardEvent, encode_framed, decode_framed};
//!
//! let msg = ControlMessage::Event(KeyboardEvent::Key { code: 0x04, pressed: true });
//!
//! let framed = encode_framed(&msg).unwrap();
//! let decoded: ControlMessage<KeyboardEvent> = decode_framed(&framed).unwrap();
//! assert_eq!(decoded, msg);
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod types;
pub mod version;

pub use codec::{
    MAX_FRAME_SIZE, decode_framed, decode_message, encode_framed, encode_message, read_framed,
    write_framed,
};
pub use error::{ProtocolError, Result};
pub use messages::{ControlMessage, StartRequest, StatusMessage};
pub use types::{
    DeviceKind, KeyboardEvent, KeyboardState, MouseButton, MouseEvent, MouseState, WorkerSpec,
    WorkerState,
};
pub use version::{CURRENT_VERSION, ProtocolVersion, validate_version};
