//! Message serialization and deserialization using postcard
//!
//! Messages are serialized using postcard (compact binary format) and framed
//! with a length prefix for use over the worker's stdin/stdout pipes.
//!
//! # Frame Format
//!
//! ```text
//! [Length: u32 (big-endian)][Message bytes (postcard serialized)]
//! ```
//!
//! Maximum frame size is 1 MiB; no legitimate message comes close.

use crate::error::{ProtocolError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};

/// Maximum allowed frame size (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Encode a message to bytes using postcard
///
/// # Example
/// ```
/// use protocol::{ControlMessage, KeyboardEvent, encode_message};
///
/// let msg: ControlMessage<KeyboardEvent> = ControlMessage::Stop;
/// let bytes = encode_message(&msg).unwrap();
/// assert!(!bytes.is_empty());
/// ```
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(message).map_err(ProtocolError::from)
}

/// Decode a message from bytes using postcard
pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(ProtocolError::from)
}

/// Encode a message with length prefix for framing
///
/// Frame format: [4-byte length (big-endian)][postcard message bytes]
pub fn encode_framed<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let message_bytes = encode_message(message)?;
    let message_len = message_bytes.len();

    if message_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: message_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(4 + message_len);
    frame.extend_from_slice(&(message_len as u32).to_be_bytes());
    frame.extend_from_slice(&message_bytes);

    Ok(frame)
}

/// Decode a framed message held entirely in memory
pub fn decode_framed<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    if frame.len() < 4 {
        return Err(ProtocolError::IncompleteFrame {
            expected: 4,
            actual: frame.len(),
        });
    }

    let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    if frame.len() < 4 + length {
        return Err(ProtocolError::IncompleteFrame {
            expected: 4 + length,
            actual: frame.len(),
        });
    }

    decode_message(&frame[4..4 + length])
}

/// Write a framed message and flush the writer
///
/// Flushing matters for pipes: the peer blocks on the frame until it lands.
pub fn write_framed<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let framed = encode_framed(message)?;
    writer.write_all(&framed)?;
    writer.flush()?;
    Ok(())
}

/// Read one framed message from a reader
///
/// A clean end of stream surfaces as [`ProtocolError::Io`] with
/// `UnexpectedEof`; see [`ProtocolError::is_eof`].
///
/// # Example
/// ```
/// use protocol::{ControlMessage, KeyboardEvent, read_framed, write_framed};
/// use std::io::Cursor;
///
/// let mut buffer = Vec::new();
/// write_framed(&mut buffer, &ControlMessage::<KeyboardEvent>::ClearQueue).unwrap();
///
/// let mut cursor = Cursor::new(buffer);
/// let decoded: ControlMessage<KeyboardEvent> = read_framed(&mut cursor).unwrap();
/// assert_eq!(decoded, ControlMessage::ClearQueue);
/// ```
pub fn read_framed<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let length = u32::from_be_bytes(len_bytes) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes)?;

    decode_message(&message_bytes)
}
