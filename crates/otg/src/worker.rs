//! HID device worker loop
//!
//! One [`DeviceWorker`] owns one gadget node. Each iteration has two phases:
//!
//! 1. sync: make sure the device is open and writable, then drain inbound
//!    reports into the codec's state hook;
//! 2. dispatch: wait for the next event up to `queue_timeout`. A new event is
//!    encoded and written right away and replaces any pending retry. A
//!    timeout either marks the device offline (link down) or retries the
//!    pending report. Only writes that reach the device use up its budget.
//!
//! Retries only happen on queue timeouts, so their cadence is the queue
//! timeout. Failures never leave the loop: they are logged and surface only
//! as `online = false`. A panic inside an iteration is logged, followed by
//! a fixed backoff, and the loop continues.

use crate::device::{DeviceError, DeviceHandle, DeviceIo};
use crate::hid::{HidDevice, Report};
use crate::link::{AlwaysOperable, GadgetLink};
use common::{EventConsumer, PopError, StatePublisher, StopSignal};
use protocol::WorkerSpec;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{Dispatch, debug, error, info, info_span};

/// Timing and retry knobs of one worker
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub name: String,
    /// 0 disables inbound reports
    pub read_chunk_size: usize,
    pub select_timeout: Duration,
    pub queue_timeout: Duration,
    /// Total write attempts for one report
    pub write_retries: u32,
    pub error_backoff: Duration,
}

impl WorkerSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_chunk_size: 0,
            select_timeout: Duration::from_millis(100),
            queue_timeout: Duration::from_millis(100),
            write_retries: 150,
            error_backoff: Duration::from_secs(1),
        }
    }

    pub fn needs_read(&self) -> bool {
        self.read_chunk_size > 0
    }
}

impl From<&WorkerSpec> for WorkerSettings {
    fn from(spec: &WorkerSpec) -> Self {
        Self {
            name: spec.name.clone(),
            read_chunk_size: spec.read_chunk_size,
            select_timeout: spec.select_timeout,
            queue_timeout: spec.queue_timeout,
            write_retries: spec.write_retries,
            error_backoff: spec.error_backoff,
        }
    }
}

/// Last failed report and how many more writes of it may be tried
///
/// Only writes that reached the device count. While the device can't be
/// opened the report stays pending.
#[derive(Debug)]
struct RetryBudget {
    report: Report,
    remaining: u32,
}

impl RetryBudget {
    fn new(report: Report, write_retries: u32) -> Self {
        Self {
            report,
            remaining: write_retries.max(1),
        }
    }

    /// Count one failed write; false once the budget is used up
    fn spend(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }
}

/// Device I/O plus the state it drives
struct DevicePort<S, IO> {
    io: IO,
    state: StatePublisher<S>,
    need_read: bool,
    select_timeout: Duration,
}

impl<S, IO: DeviceIo> DevicePort<S, IO> {
    /// Open if needed and wait for write readiness; offline on failure
    fn ensure_device(&mut self) -> bool {
        let result = self
            .io
            .ensure_open(self.need_read)
            .and_then(|()| self.io.ready_to_write(self.select_timeout));

        match result {
            Ok(()) => true,
            Err(err) => {
                self.note_failure("open", &err);
                self.state.set_online(false);
                false
            }
        }
    }

    fn write_report(&mut self, report: &Report) -> bool {
        match self.io.write(report) {
            Ok(()) => {
                self.state.set_online(true);
                true
            }
            Err(err) => {
                self.note_failure("write", &err);
                self.state.set_online(false);
                false
            }
        }
    }

    /// Try the budget's report once; `None` when delivered or given up
    fn attempt(&mut self, mut budget: RetryBudget) -> Option<RetryBudget> {
        if !self.ensure_device() {
            return Some(budget);
        }
        if self.write_report(&budget.report) {
            return None;
        }
        if budget.spend() {
            Some(budget)
        } else {
            debug!("Giving up on {:?}", budget.report);
            None
        }
    }

    /// Log an open, poll or write failure; drop the descriptor if it's dead
    fn note_failure(&mut self, op: &str, err: &DeviceError) {
        log_failure(op, err);
        if err.is_fatal_for_descriptor() {
            self.io.close();
        }
    }
}

fn log_failure(op: &str, err: &DeviceError) {
    if err.is_transient() {
        debug!("Busy or unplugged ({}): {}", op, err);
    } else {
        error!("Device {} failed: {}", op, err);
    }
}

/// Control loop of one HID gadget device
pub struct DeviceWorker<D: HidDevice, IO: DeviceIo = DeviceHandle> {
    settings: WorkerSettings,
    codec: D,
    port: DevicePort<D::State, IO>,
    events: EventConsumer<D::Event>,
    link: Box<dyn GadgetLink>,
    stop: StopSignal,
    retry: Option<RetryBudget>,
    log_sink: Dispatch,
}

impl<D: HidDevice, IO: DeviceIo> DeviceWorker<D, IO> {
    /// The worker becomes the only writer of `state`
    pub fn new(
        settings: WorkerSettings,
        codec: D,
        io: IO,
        events: EventConsumer<D::Event>,
        state: StatePublisher<D::State>,
    ) -> Self {
        let port = DevicePort {
            io,
            state,
            need_read: settings.needs_read(),
            select_timeout: settings.select_timeout,
        };
        Self {
            settings,
            codec,
            port,
            events,
            link: Box::new(AlwaysOperable),
            stop: StopSignal::new(),
            retry: None,
            log_sink: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    pub fn with_link(mut self, link: impl GadgetLink + 'static) -> Self {
        self.link = Box::new(link);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Log sink the loop runs under
    pub fn with_log_sink(mut self, dispatch: Dispatch) -> Self {
        self.log_sink = dispatch;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run until stopped, then close the device
    ///
    /// Returns the closed device so a final report can be flushed through it.
    pub fn run(mut self) -> IO {
        let log_sink = self.log_sink.clone();
        tracing::dispatcher::with_default(&log_sink, || {
            let span = info_span!("hid", device = %self.settings.name);
            let _enter = span.enter();
            info!("HID worker started");

            while !self.stop.is_stopped() {
                let result = panic::catch_unwind(AssertUnwindSafe(|| self.iteration()));
                if let Err(payload) = result {
                    error!("Unexpected HID error: {}", panic_message(payload.as_ref()));
                    std::thread::sleep(self.settings.error_backoff);
                }
            }

            self.port.io.close();
            info!("HID worker stopped");
        });
        self.port.io
    }

    fn iteration(&mut self) {
        self.sync();
        if self.stop.is_stopped() {
            return;
        }
        match self.events.pop(self.settings.queue_timeout) {
            Ok(event) => self.process_event(event),
            Err(PopError::Timeout) => self.idle(),
            Err(PopError::Disconnected) => {
                info!("Event queue closed");
                self.stop.stop();
            }
        }
    }

    fn sync(&mut self) {
        if !self.port.ensure_device() || !self.settings.needs_read() {
            return;
        }

        let DevicePort { io, state, .. } = &mut self.port;
        let codec = &mut self.codec;
        let result = io.drain_readable(self.settings.read_chunk_size, &mut |bytes| {
            state.update(|device| codec.process_read_report(bytes, device));
        });
        // The drain just stops; the next write decides liveness
        if let Err(err) = result {
            log_failure("read", &err);
        }
    }

    /// Fresh input beats resending stale state
    fn process_event(&mut self, event: D::Event) {
        self.retry = None;
        for report in self.codec.process_event(event) {
            if self.stop.is_stopped() {
                break;
            }
            let budget = RetryBudget::new(report, self.settings.write_retries);
            self.retry = self.port.attempt(budget);
        }
    }

    fn idle(&mut self) {
        if !self.link.can_operate() {
            self.port.state.set_online(false);
            return;
        }

        if let Some(budget) = self.retry.take() {
            self.retry = self.port.attempt(budget);
        }
    }
}

/// Write one final report with the loop not running: open, write, close
pub fn cleanup_write<IO: DeviceIo>(
    io: &mut IO,
    need_read: bool,
    select_timeout: Duration,
    report: &Report,
) -> bool {
    let result = io
        .ensure_open(need_read)
        .and_then(|()| io.ready_to_write(select_timeout))
        .and_then(|()| io.write(report));
    io.close();

    match result {
        Ok(()) => true,
        Err(err) if err.is_transient() => {
            debug!("Cleanup write skipped, busy or unplugged: {}", err);
            false
        }
        Err(err) => {
            error!("Cleanup write failed: {}", err);
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
