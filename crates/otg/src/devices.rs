//! The daemon's set of HID workers and the input commands routed to them

use crate::config::HidConfig;
use crate::controller::WorkerHandle;
use crate::hid::{Keyboard, Mouse};
use crate::service;
use common::{Result, StateWatcher};
use protocol::{KeyboardEvent, MouseEvent};
use serde::Deserialize;
use std::ffi::OsStr;
use std::fmt::Debug;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One line of input, as JSON
///
/// `{"keyboard":{"key":{"code":4,"pressed":true}}}`,
/// `{"mouse":{"move_relative":{"dx":10,"dy":0}}}`, `"release_all"`,
/// `"clear_queue"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputCommand {
    Keyboard(KeyboardEvent),
    Mouse(MouseEvent),
    /// Release everything on every device
    ReleaseAll,
    /// Drop events not yet taken by the workers
    ClearQueue,
}

impl InputCommand {
    /// `Ok(None)` for blank lines
    pub fn parse(line: &str) -> serde_json::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }
}

/// Worker processes for the enabled devices
pub struct Devices {
    keyboard: Option<WorkerHandle<Keyboard>>,
    mouse: Option<WorkerHandle<Mouse>>,
}

impl Devices {
    /// Spawn one worker per enabled device from `program worker`
    pub fn spawn(program: &OsStr, config: &HidConfig, log_level: &str) -> Result<Self> {
        let keyboard = config
            .keyboard_spec(log_level)
            .map(|spec| WorkerHandle::spawn(program, spec))
            .transpose()?;
        let mouse = config
            .mouse_spec(log_level)
            .map(|spec| WorkerHandle::spawn(program, spec))
            .transpose()?;

        if keyboard.is_none() && mouse.is_none() {
            warn!("No HID devices enabled");
        }
        Ok(Self { keyboard, mouse })
    }

    pub fn count(&self) -> usize {
        usize::from(self.keyboard.is_some()) + usize::from(self.mouse.is_some())
    }

    pub fn keyboard(&self) -> Option<&WorkerHandle<Keyboard>> {
        self.keyboard.as_ref()
    }

    pub fn mouse(&self) -> Option<&WorkerHandle<Mouse>> {
        self.mouse.as_ref()
    }

    pub fn apply(&self, command: InputCommand) {
        match command {
            InputCommand::Keyboard(event) => match &self.keyboard {
                Some(keyboard) => keyboard.push(event),
                None => debug!("Keyboard disabled, dropping {:?}", event),
            },
            InputCommand::Mouse(event) => match &self.mouse {
                Some(mouse) => mouse.push(event),
                None => debug!("Mouse disabled, dropping {:?}", event),
            },
            InputCommand::ReleaseAll => {
                if let Some(keyboard) = &self.keyboard {
                    keyboard.push(KeyboardEvent::ReleaseAll);
                }
                if let Some(mouse) = &self.mouse {
                    mouse.push(MouseEvent::ReleaseAll);
                }
            }
            InputCommand::ClearQueue => {
                if let Some(keyboard) = &self.keyboard {
                    keyboard.clear_queue();
                }
                if let Some(mouse) = &self.mouse {
                    mouse.clear_queue();
                }
            }
        }
    }

    /// Log every state change until the workers go away
    pub fn spawn_observers(&self) -> Vec<JoinHandle<()>> {
        let mut observers = Vec::new();
        if let Some(keyboard) = &self.keyboard {
            observers.push(tokio::spawn(observe("keyboard", keyboard.watcher())));
        }
        if let Some(mouse) = &self.mouse {
            observers.push(tokio::spawn(observe("mouse", mouse.watcher())));
        }
        observers
    }

    /// Stop every worker, then write each device's cleanup report
    ///
    /// Blocking.
    pub fn shutdown(self) {
        if let Some(keyboard) = self.keyboard {
            match keyboard.stop() {
                Ok(stopped) => {
                    stopped.flush();
                }
                Err(e) => error!("Can't stop keyboard worker: {}", e),
            }
        }
        if let Some(mouse) = self.mouse {
            match mouse.stop() {
                Ok(stopped) => {
                    stopped.flush();
                }
                Err(e) => error!("Can't stop mouse worker: {}", e),
            }
        }
    }
}

async fn observe<S>(name: &'static str, mut watcher: StateWatcher<S>)
where
    S: Clone + Debug,
{
    let mut online = watcher.snapshot().online;
    while let Some(state) = watcher.changed().await {
        if state.online != online {
            online = state.online;
            info!(
                "HID-{} is {}",
                name,
                if online { "online" } else { "offline" }
            );
            let status = format!("{} {}", name, if online { "online" } else { "offline" });
            if let Err(e) = service::notify_status(&status) {
                debug!("{:#}", e);
            }
        }
        debug!("HID-{} state: {:?}", name, state.device);
    }
}
