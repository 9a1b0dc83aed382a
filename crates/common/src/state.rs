//! Published worker state
//!
//! A [`StatePublisher`] is the one writer of a [`WorkerState`]; it owns the
//! current snapshot and pushes the whole snapshot through a [`StateSink`] on
//! every mutation, redundant ones included. Observers hold a
//! [`StateWatcher`] and either read the latest snapshot or wait for the next
//! publication. Spurious wake-ups are expected.

use protocol::WorkerState;
use tokio::sync::watch;

/// Where published snapshots go
///
/// In-process this is a watch channel; inside a worker process it is the
/// framed stdout pipe back to the controller.
pub trait StateSink<S>: Send {
    fn publish(&mut self, state: &WorkerState<S>);
}

impl<S: Clone + Send + Sync> StateSink<S> for watch::Sender<WorkerState<S>> {
    fn publish(&mut self, state: &WorkerState<S>) {
        // send_replace notifies even when nobody is subscribed yet
        self.send_replace(state.clone());
    }
}

/// Sole writer of one worker's state. Not `Clone`.
pub struct StatePublisher<S> {
    current: WorkerState<S>,
    sink: Box<dyn StateSink<S>>,
}

impl<S> StatePublisher<S> {
    pub fn new(initial: WorkerState<S>, sink: Box<dyn StateSink<S>>) -> Self {
        Self {
            current: initial,
            sink,
        }
    }

    /// Set the liveness flag and publish
    pub fn set_online(&mut self, online: bool) {
        self.current.online = online;
        self.sink.publish(&self.current);
    }

    /// Mutate the device-specific fields and publish
    ///
    /// The closure cannot touch `online`.
    pub fn update<F>(&mut self, f: F)
    where
        F: FnOnce(&mut S),
    {
        f(&mut self.current.device);
        self.sink.publish(&self.current);
    }

    pub fn snapshot(&self) -> &WorkerState<S> {
        &self.current
    }
}

/// Read side of a worker's state; cheap to clone
#[derive(Debug, Clone)]
pub struct StateWatcher<S> {
    rx: watch::Receiver<WorkerState<S>>,
}

impl<S: Clone> StateWatcher<S> {
    pub fn new(rx: watch::Receiver<WorkerState<S>>) -> Self {
        Self { rx }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> WorkerState<S> {
        self.rx.borrow().clone()
    }

    /// Wait for the next publication and return it
    ///
    /// Returns `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<WorkerState<S>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<WorkerState<S>>
    where
        F: FnMut(&WorkerState<S>) -> bool,
    {
        self.rx
            .wait_for(|state| predicate(state))
            .await
            .ok()
            .map(|state| (*state).clone())
    }
}

/// Channel a publisher writes into and observers watch
pub fn state_channel<S: Clone>(
    initial: WorkerState<S>,
) -> (watch::Sender<WorkerState<S>>, StateWatcher<S>) {
    let (tx, rx) = watch::channel(initial);
    (tx, StateWatcher::new(rx))
}

/// In-process publisher/watcher pair
pub fn shared_state<S>(initial: WorkerState<S>) -> (StatePublisher<S>, StateWatcher<S>)
where
    S: Clone + Send + Sync + 'static,
{
    let (tx, watcher) = state_channel(initial.clone());
    (StatePublisher::new(initial, Box::new(tx)), watcher)
}
