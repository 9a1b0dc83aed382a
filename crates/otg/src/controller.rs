//! Controller side of a device worker process
//!
//! [`WorkerHandle`] spawns the worker, queues events for it without ever
//! blocking, and mirrors the worker's published state into a watch channel.
//! [`WorkerHandle::stop`] turns it into a [`StoppedWorker`], the only place
//! a shutdown flush can be issued from.

use crate::device::DeviceHandle;
use crate::hid::HidDevice;
use crate::worker::cleanup_write;
use common::{Error, Result, StateWatcher, state_channel};
use protocol::{
    CURRENT_VERSION, ControlMessage, StartRequest, StatusMessage, WorkerSpec, WorkerState,
    read_framed, write_framed,
};
use std::ffi::OsStr;
use std::io::BufReader;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Kills the worker if the handle is dropped without `stop()`
struct KillOnDrop(Option<Child>);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        if let Some(child) = &mut self.0
            && let Ok(None) = child.try_wait()
        {
            warn!("Killing HID worker process {}", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// A running device worker process
pub struct WorkerHandle<D: HidDevice> {
    spec: WorkerSpec,
    child: KillOnDrop,
    control: async_channel::Sender<ControlMessage<D::Event>>,
    watcher: StateWatcher<D::State>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl<D: HidDevice> WorkerHandle<D> {
    /// Start `program worker` for `spec`
    ///
    /// `program` is normally the daemon's own executable.
    pub fn spawn(program: impl AsRef<OsStr>, spec: WorkerSpec) -> Result<Self> {
        let codec = D::from_kind(&spec.kind).ok_or_else(|| {
            Error::Worker(format!(
                "{} worker can't drive a {} device",
                spec.name,
                spec.kind.as_str()
            ))
        })?;
        let initial = WorkerState::new(codec.initial_state());

        let mut child = Command::new(program)
            .arg("worker")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        info!("Spawned HID-{} worker (pid {})", spec.name, child.id());
        let pipes = (child.stdin.take(), child.stdout.take());
        let child_guard = KillOnDrop(Some(child));
        let (Some(mut stdin), Some(stdout)) = pipes else {
            return Err(Error::Worker("worker pipes are missing".into()));
        };

        write_framed(
            &mut stdin,
            &StartRequest {
                version: CURRENT_VERSION,
                spec: spec.clone(),
            },
        )?;

        let (control, commands) = async_channel::unbounded();
        let writer = thread::Builder::new()
            .name(format!("hid-{}-writer", spec.name))
            .spawn(move || forward_control(stdin, commands))?;

        let (state_tx, watcher) = state_channel(initial);
        let reader = thread::Builder::new()
            .name(format!("hid-{}-reader", spec.name))
            .spawn(move || mirror_state(stdout, state_tx))?;

        Ok(Self {
            spec,
            child: child_guard,
            control,
            watcher,
            writer: Some(writer),
            reader: Some(reader),
        })
    }

    /// Queue one event; never blocks
    pub fn push(&self, event: D::Event) {
        if self.control.try_send(ControlMessage::Event(event)).is_err() {
            debug!("HID-{} worker is gone, event dropped", self.spec.name);
        }
    }

    /// Drop events the worker has not taken yet
    pub fn clear_queue(&self) {
        if self.control.try_send(ControlMessage::ClearQueue).is_err() {
            debug!("HID-{} worker is gone, nothing to clear", self.spec.name);
        }
    }

    /// Latest state published by the worker
    pub fn state(&self) -> WorkerState<D::State> {
        self.watcher.snapshot()
    }

    pub fn watcher(&self) -> StateWatcher<D::State> {
        self.watcher.clone()
    }

    pub fn is_running(&mut self) -> bool {
        match &mut self.child.0 {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Ask the worker to stop and wait for it to exit
    ///
    /// Blocks until the worker has left its loop, which takes at most one
    /// queue and one select timeout.
    pub fn stop(mut self) -> Result<StoppedWorker<D>> {
        info!("Stopping HID-{} worker ...", self.spec.name);
        // A dead worker closes the channel; nothing to tell it then
        let _ = self.control.try_send(ControlMessage::Stop);
        self.control.close();

        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        let mut child = self
            .child
            .0
            .take()
            .ok_or_else(|| Error::Worker("worker already reaped".into()))?;
        let exit = child.wait()?;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        info!("HID-{} worker exited: {}", self.spec.name, exit);

        let codec = D::from_kind(&self.spec.kind)
            .ok_or_else(|| Error::Worker("device kind changed under a worker".into()))?;
        Ok(StoppedWorker {
            spec: self.spec.clone(),
            codec,
            exit,
            last_state: self.watcher.snapshot(),
        })
    }
}

/// A worker whose loop is no longer running
pub struct StoppedWorker<D: HidDevice> {
    spec: WorkerSpec,
    codec: D,
    exit: ExitStatus,
    last_state: WorkerState<D::State>,
}

impl<D: HidDevice> StoppedWorker<D> {
    pub fn exit_status(&self) -> ExitStatus {
        self.exit
    }

    pub fn last_state(&self) -> &WorkerState<D::State> {
        &self.last_state
    }

    /// Write the kind's "release everything" report once: open, write, close
    pub fn flush(self) -> bool {
        let report = self.codec.cleanup_report();
        let mut io = DeviceHandle::new(&self.spec.device_path, self.spec.noop);
        let written = cleanup_write(
            &mut io,
            self.spec.needs_read(),
            self.spec.select_timeout,
            &report,
        );
        if written {
            debug!("HID-{} cleanup report written", self.spec.name);
        }
        written
    }
}

fn forward_control<E: serde::Serialize>(
    mut stdin: ChildStdin,
    commands: async_channel::Receiver<ControlMessage<E>>,
) {
    while let Ok(message) = commands.recv_blocking() {
        let stop = matches!(message, ControlMessage::Stop);
        if let Err(e) = write_framed(&mut stdin, &message) {
            warn!("Can't write to HID worker: {}", e);
            break;
        }
        if stop {
            break;
        }
    }
    // Closing stdin stops the worker too
    commands.close();
}

fn mirror_state<S>(stdout: ChildStdout, state: watch::Sender<WorkerState<S>>)
where
    S: serde::de::DeserializeOwned + Clone,
{
    let mut stdout = BufReader::new(stdout);
    loop {
        match read_framed::<_, StatusMessage<S>>(&mut stdout) {
            Ok(StatusMessage::State(next)) => {
                state.send_replace(next);
            }
            Err(e) => {
                if !e.is_eof() {
                    warn!("Bad status frame from HID worker: {}", e);
                }
                break;
            }
        }
    }
    // No worker, no device
    state.send_modify(|current| current.online = false);
}
