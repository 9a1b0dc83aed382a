//! Worker process entry point
//!
//! The controller re-executes the daemon binary with the hidden `worker`
//! subcommand. Over stdin the worker receives a [`StartRequest`] and then
//! [`ControlMessage`]s; over stdout it sends one [`StatusMessage`] per state
//! publication. Logs go to stderr.

use crate::device::DeviceHandle;
use crate::hid::{HidDevice, Keyboard, Mouse};
use crate::link::{AlwaysOperable, GadgetLink, Udc};
use crate::worker::{DeviceWorker, WorkerSettings};
use anyhow::{Context, Result, anyhow};
use common::{EventQueue, StatePublisher, StateSink, StopSignal, event_queue};
use nix::sys::signal::{SigHandler, Signal, signal};
use protocol::{
    ControlMessage, DeviceKind, StartRequest, StatusMessage, WorkerSpec, WorkerState, read_framed,
    validate_version, write_framed,
};
use serde::de::DeserializeOwned;
use std::io::{self, BufReader, Read, Write};
use std::thread;
use tracing::{Dispatch, debug, error, info};

/// Run one device worker on this process's stdin/stdout
pub fn run_worker_process() -> Result<()> {
    settle()?;

    let mut stdin = BufReader::new(io::stdin());
    let request: StartRequest =
        read_framed(&mut stdin).context("Failed to read worker start request")?;
    validate_version(&request.version).context("Controller speaks another protocol")?;

    let spec = request.spec;
    let log_sink = common::build_dispatch(&spec.log_level)?;

    match spec.kind {
        DeviceKind::Keyboard => serve::<Keyboard, _>(spec, stdin, log_sink),
        DeviceKind::Mouse { .. } => serve::<Mouse, _>(spec, stdin, log_sink),
    }
}

/// Exit with the controller and leave Ctrl+C to it
fn settle() -> Result<()> {
    #[cfg(target_os = "linux")]
    nix::sys::prctl::set_pdeathsig(Signal::SIGTERM).context("prctl(PR_SET_PDEATHSIG) failed")?;

    // SAFETY: SIG_IGN installs no handler code
    unsafe { signal(Signal::SIGINT, SigHandler::SigIgn) }.context("Can't ignore SIGINT")?;
    Ok(())
}

fn serve<D, R>(spec: WorkerSpec, control: R, log_sink: Dispatch) -> Result<()>
where
    D: HidDevice,
    R: Read + Send + 'static,
{
    let codec = D::from_kind(&spec.kind)
        .ok_or_else(|| anyhow!("Device kind {} has no codec", spec.kind.as_str()))?;

    let (queue, events) = event_queue();
    let stop = StopSignal::new();

    let sink = FramedStateSink::new(io::stdout(), stop.clone());
    let state = StatePublisher::new(WorkerState::new(codec.initial_state()), Box::new(sink));

    let pump_sink = log_sink.clone();
    let pump_stop = stop.clone();
    thread::Builder::new()
        .name(format!("hid-{}-control", spec.name))
        .spawn(move || {
            tracing::dispatcher::with_default(&pump_sink, || {
                pump_control::<D::Event, _>(control, queue, pump_stop)
            })
        })
        .context("Failed to spawn control thread")?;

    let link: Box<dyn GadgetLink> = if spec.noop {
        Box::new(AlwaysOperable)
    } else {
        Box::new(Udc::new(spec.udc.as_deref()))
    };

    let io = DeviceHandle::new(&spec.device_path, spec.noop);
    DeviceWorker::new(WorkerSettings::from(&spec), codec, io, events, state)
        .with_link(link)
        .with_stop_signal(stop)
        .with_log_sink(log_sink)
        .run();

    // The control thread may still sit in a blocking read; exiting ends it
    Ok(())
}

/// Feed control frames into the event queue until `Stop` or end of input
///
/// Raises `stop` on the way out.
pub fn pump_control<E, R>(mut input: R, queue: EventQueue<E>, stop: StopSignal)
where
    E: DeserializeOwned,
    R: Read,
{
    loop {
        match read_framed::<_, ControlMessage<E>>(&mut input) {
            Ok(ControlMessage::Event(event)) => queue.push(event),
            Ok(ControlMessage::ClearQueue) => {
                let dropped = queue.drain();
                debug!("Cleared {} queued events", dropped);
            }
            Ok(ControlMessage::Stop) => {
                info!("Stop requested by controller");
                break;
            }
            Err(e) if e.is_eof() => {
                info!("Control pipe closed");
                break;
            }
            Err(e) => {
                error!("Bad control frame: {}", e);
                break;
            }
        }
    }
    stop.stop();
}

/// Publishes state as framed [`StatusMessage`]s
///
/// A broken pipe means the controller is gone: stop the worker.
pub struct FramedStateSink<W> {
    out: W,
    stop: StopSignal,
    broken: bool,
}

impl<W: Write> FramedStateSink<W> {
    pub fn new(out: W, stop: StopSignal) -> Self {
        Self {
            out,
            stop,
            broken: false,
        }
    }
}

impl<S, W> StateSink<S> for FramedStateSink<W>
where
    S: serde::Serialize + Clone,
    W: Write + Send,
{
    fn publish(&mut self, state: &WorkerState<S>) {
        if self.broken {
            return;
        }
        if let Err(e) = write_framed(&mut self.out, &StatusMessage::State(state.clone())) {
            error!("Can't publish state: {}", e);
            self.broken = true;
            self.stop.stop();
        }
    }
}
