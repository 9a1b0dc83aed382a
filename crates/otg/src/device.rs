//! Gadget character device I/O
//!
//! [`DeviceHandle`] owns at most one non-blocking descriptor to a HID gadget
//! node (e.g. `/dev/hidg0`). It opens lazily, polls with explicit timeouts,
//! and reports failures as [`DeviceError`]. The caller decides how loudly to
//! log them: [`DeviceError::is_transient`] separates "busy/unplugged, try
//! again later" from everything else.
//!
//! EAGAIN and ESHUTDOWN are the errors a gadget returns while the host is
//! not reading or the cable is out.
//! See: https://github.com/raspberrypi/linux/commit/61b7f805dc2fd364e0df682de89227e94ce88e25

use crate::hid::Report;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("can't open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("device is not open")]
    NotOpen,

    #[error("device is busy or unplugged (not writable)")]
    NotReady,

    #[error("device is busy or unplugged: {0}")]
    Busy(Errno),

    #[error("written ({written}) != report length ({expected})")]
    ShortWrite { written: usize, expected: usize },

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("poll() failed: {0}")]
    Poll(Errno),
}

impl DeviceError {
    /// Classify an OS error from read()/write()
    pub fn from_io(err: io::Error) -> Self {
        match err.raw_os_error().map(Errno::from_raw) {
            Some(errno @ (Errno::EAGAIN | Errno::ESHUTDOWN)) => DeviceError::Busy(errno),
            _ => DeviceError::Io(err),
        }
    }

    /// Busy/unplugged: log quietly and retry later
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Busy(_) | DeviceError::NotReady)
    }

    /// The descriptor is not worth keeping after this error
    pub fn is_fatal_for_descriptor(&self) -> bool {
        matches!(self, DeviceError::Io(_))
    }
}

/// Operations the device worker needs from a gadget node
pub trait DeviceIo: Send {
    /// Open the node if it is not open yet
    fn ensure_open(&mut self, need_read: bool) -> Result<(), DeviceError>;

    /// Wait at most `timeout` for the node to accept a write
    fn ready_to_write(&mut self, timeout: Duration) -> Result<(), DeviceError>;

    /// Read pending inbound reports without waiting, `chunk_size` bytes at a time
    ///
    /// Returns how many reports were handed to `on_report`. An error ends the
    /// drain; reports read before it have already been delivered.
    fn drain_readable(
        &mut self,
        chunk_size: usize,
        on_report: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, DeviceError>;

    /// Write one full report
    fn write(&mut self, report: &Report) -> Result<(), DeviceError>;

    /// Drop the descriptor; the next `ensure_open` reopens
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Descriptor to one gadget node
#[derive(Debug)]
pub struct DeviceHandle {
    path: PathBuf,
    noop: bool,
    file: Option<File>,
}

fn poll_timeout(timeout: Duration) -> PollTimeout {
    PollTimeout::from(u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX))
}

impl DeviceHandle {
    /// With `noop` set, no open/read/write ever reaches the OS and every
    /// operation succeeds.
    pub fn new(path: impl Into<PathBuf>, noop: bool) -> Self {
        Self {
            path: path.into(),
            noop,
            file: None,
        }
    }

    fn file(&mut self) -> Result<&mut File, DeviceError> {
        self.file.as_mut().ok_or(DeviceError::NotOpen)
    }

    /// Poll the descriptor for `flags`; Ok(false) on timeout
    fn poll_for(file: &File, flags: PollFlags, timeout: PollTimeout) -> Result<bool, DeviceError> {
        let mut fds = [PollFd::new(file.as_fd(), flags)];
        match poll(&mut fds, timeout) {
            Ok(0) => Ok(false),
            Ok(_) => Ok(fds[0].revents().is_some_and(|r| r.intersects(flags))),
            Err(Errno::EINTR) => Ok(false),
            Err(errno) => Err(DeviceError::Poll(errno)),
        }
    }
}

impl DeviceIo for DeviceHandle {
    fn ensure_open(&mut self, need_read: bool) -> Result<(), DeviceError> {
        if self.noop || self.file.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(need_read)
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&self.path)
            .map_err(|source| DeviceError::Open {
                path: self.path.clone(),
                source,
            })?;
        self.file = Some(file);
        Ok(())
    }

    fn ready_to_write(&mut self, timeout: Duration) -> Result<(), DeviceError> {
        if self.noop {
            return Ok(());
        }
        let file = self.file()?;
        if Self::poll_for(file, PollFlags::POLLOUT, poll_timeout(timeout))? {
            Ok(())
        } else {
            Err(DeviceError::NotReady)
        }
    }

    fn drain_readable(
        &mut self,
        chunk_size: usize,
        on_report: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, DeviceError> {
        if self.noop || chunk_size == 0 {
            return Ok(0);
        }
        let file = self.file()?;
        let mut buf = vec![0u8; chunk_size];
        let mut count = 0;

        while Self::poll_for(file, PollFlags::POLLIN, PollTimeout::ZERO)? {
            match file.read(&mut buf) {
                // Readable with nothing to read: hung up, stop here
                Ok(0) => break,
                Ok(n) => {
                    on_report(&buf[..n]);
                    count += 1;
                }
                Err(e) => return Err(DeviceError::from_io(e)),
            }
        }
        Ok(count)
    }

    fn write(&mut self, report: &Report) -> Result<(), DeviceError> {
        if self.noop {
            return Ok(());
        }
        let file = self.file()?;
        match file.write(report.as_bytes()) {
            Ok(written) if written == report.len() => Ok(()),
            Ok(written) => Err(DeviceError::ShortWrite {
                written,
                expected: report.len(),
            }),
            Err(e) => Err(DeviceError::from_io(e)),
        }
    }

    fn close(&mut self) {
        // File's Drop closes and ignores errors
        self.file = None;
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}
