use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};

use crate::{
    bridge::DEFAULT_POLL_INTERVAL, controller::Controller, mailbox::Mailbox,
    types::ControllerEvent,
};

/// Drives [`Controller::tick`] on a fixed cadence from a tokio task.
///
/// The controller sits behind a mutex so a tick is applied atomically with
/// respect to the operations callers invoke between ticks.
pub struct Monitor<M> {
    controller: Arc<Mutex<Controller<M>>>,
    poll_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Mailbox + 'static> Monitor<M> {
    pub fn new(controller: Controller<M>) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poller: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run `f` against the controller under its lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Controller<M>) -> R) -> R {
        f(&mut self.controller.lock())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.controller.lock().subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Reset the mailbox and begin polling. Must be called inside a tokio
    /// runtime. Calling it while already polling restarts the controller but
    /// keeps the existing poller.
    pub fn start(&self) {
        self.controller.lock().start();

        let mut poller = self.poller.lock();
        if poller.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let controller = self.controller.clone();
        let interval = self.poll_interval;
        *poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                controller.lock().tick();
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
        self.controller.lock().stop();
    }
}

impl<M> Drop for Monitor<M> {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
    }
}
