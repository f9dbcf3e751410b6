//! Controller side of the handshake.
//!
//! The controller watches the status record for waiting edges, owns the
//! message queue, and is the only writer of the input payload. Every
//! operation here is non-blocking; the periodic `tick` is driven by
//! [`crate::monitor::Monitor`] or directly by tests.

use tokio::sync::broadcast;

use crate::{
    bridge::preview,
    delivery::DeliveryLatch,
    mailbox::Mailbox,
    queue::MessageQueue,
    types::{ControllerEvent, ControllerStatus, StatusRecord, Submission},
};

const EVENT_CAPACITY: usize = 256;

pub struct Controller<M> {
    mailbox: M,
    status: ControllerStatus,
    queue: MessageQueue,
    latch: DeliveryLatch,
    events: broadcast::Sender<ControllerEvent>,
}

impl<M: Mailbox> Controller<M> {
    pub fn new(mailbox: M) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            mailbox,
            status: ControllerStatus::default(),
            queue: MessageQueue::new(),
            latch: DeliveryLatch::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn mailbox(&self) -> &M {
        &self.mailbox
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.clone()
    }

    pub fn is_sending(&self) -> bool {
        self.latch.is_sending()
    }

    /// Discards whatever a previous session left in the mailbox and starts
    /// observing. Queued messages are kept.
    pub fn start(&mut self) {
        if let Err(error) = self.mailbox.reset() {
            tracing::warn!(target = "turn_mcp::controller", error = %error, "failed to reset mailbox");
        }
        self.latch.reset();
        self.update_status(ControllerStatus {
            running: true,
            ..ControllerStatus::default()
        });
        self.log("monitoring started".to_string());
    }

    pub fn stop(&mut self) {
        self.update_status(ControllerStatus::default());
        self.log("monitoring stopped".to_string());
    }

    /// Apply one observation of the status record.
    pub fn tick(&mut self) {
        // Missing or malformed records carry no information.
        let Some(record) = self.mailbox.read_status() else {
            return;
        };

        let was_waiting = self.status.waiting;
        match (was_waiting, record.waiting) {
            (false, true) => self.enter_waiting(&record),
            (true, false) => self.leave_waiting(),
            (true, true) if self.is_new_wait(&record) => {
                // The bridge ended one wait and started the next between two ticks.
                self.leave_waiting();
                self.enter_waiting(&record);
            }
            _ => {}
        }
    }

    fn is_new_wait(&self, record: &StatusRecord) -> bool {
        record.context_str() != self.status.context || record.question != self.status.question
    }

    fn enter_waiting(&mut self, record: &StatusRecord) {
        let context = record.context_str().to_string();
        self.update_status(ControllerStatus {
            running: true,
            waiting: true,
            context: context.clone(),
            question: record.question.clone(),
        });
        let _ = self.events.send(ControllerEvent::Waiting {
            context: context.clone(),
            question: record.question.clone(),
        });
        self.log(format!("agent is waiting: {}", preview(&context, 50)));

        if !self.queue.is_empty() && !self.latch.is_sending() {
            self.log(format!(
                "{} queued message(s), sending the first",
                self.queue.len()
            ));
            self.send_next_from_queue();
        }
    }

    fn leave_waiting(&mut self) {
        self.latch.wait_ended();
        self.update_status(ControllerStatus {
            running: true,
            ..ControllerStatus::default()
        });
        self.log("wait ended".to_string());
    }

    /// Deliver `text` straight into the mailbox if the agent is waiting and
    /// nothing has been sent this cycle; otherwise queue it.
    pub fn submit_input(&mut self, text: &str) -> Submission {
        if text.trim().is_empty() {
            return Submission::Ignored;
        }
        if !self.status.waiting || !self.latch.try_begin() {
            self.add_to_queue(text);
            return Submission::Queued;
        }

        match self.mailbox.write_input(text) {
            Ok(()) => {
                self.log(format!("input submitted: {}", preview(text, 50)));
                self.notify_status();
                Submission::Delivered
            }
            Err(error) => {
                self.latch.write_failed();
                self.queue.requeue(text.to_string());
                self.log(format!("failed to submit input, queued instead: {error}"));
                self.notify_status();
                Submission::Queued
            }
        }
    }

    /// Append to the queue, draining immediately if the agent is waiting.
    pub fn add_to_queue(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.queue.push(text.to_string());
        self.log(format!(
            "queued: {} (queue length {})",
            preview(text, 50),
            self.queue.len()
        ));
        self.notify_status();

        if self.status.waiting {
            self.send_next_from_queue();
        }
        true
    }

    /// Move the head of the queue into the input payload. No-op if the queue
    /// is empty or a payload has already been written this cycle.
    pub fn send_next_from_queue(&mut self) -> bool {
        if self.queue.is_empty() || !self.latch.try_begin() {
            return false;
        }
        let Some(next) = self.queue.pop() else {
            self.latch.write_failed();
            return false;
        };

        match self.mailbox.write_input(&next) {
            Ok(()) => {
                self.log(format!(
                    "sent from queue: {} ({} remaining)",
                    preview(&next, 50),
                    self.queue.len()
                ));
                self.notify_status();
                true
            }
            Err(error) => {
                tracing::warn!(target = "turn_mcp::controller", error = %error, "queue drain failed");
                self.queue.requeue(next);
                self.latch.write_failed();
                self.log(format!("failed to send queued message: {error}"));
                false
            }
        }
    }

    pub fn queue(&self) -> Vec<String> {
        self.queue.snapshot()
    }

    pub fn remove_from_queue(&mut self, index: usize) {
        if self.queue.remove(index).is_some() {
            self.log(format!(
                "removed queue item {index} ({} remaining)",
                self.queue.len()
            ));
            self.notify_status();
        }
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.log("queue cleared".to_string());
        self.notify_status();
    }

    pub fn reorder_queue(&mut self, from: usize, to: usize) {
        if self.queue.reorder(from, to) {
            self.log(format!("queue reordered: {} -> {}", from + 1, to + 1));
            self.notify_status();
        }
    }

    /// Abort an outstanding wait. The bridge observes the canceled flag on
    /// its next tick and returns the cancel sentinel.
    pub fn clear_waiting(&mut self) -> bool {
        if let Err(error) = self.mailbox.write_status(&StatusRecord::canceled()) {
            self.log(format!("failed to cancel wait: {error}"));
            return false;
        }
        self.latch.canceled();
        self.update_status(ControllerStatus {
            running: true,
            ..ControllerStatus::default()
        });
        self.log("wait canceled, agent notified".to_string());
        true
    }

    fn update_status(&mut self, status: ControllerStatus) {
        self.status = status;
        self.notify_status();
    }

    fn notify_status(&self) {
        let _ = self.events.send(ControllerEvent::StatusChanged {
            status: self.status.clone(),
            queue_len: self.queue.len(),
        });
    }

    fn log(&self, message: String) {
        tracing::info!(target = "turn_mcp::controller", "{message}");
        let _ = self.events.send(ControllerEvent::Log { message });
    }
}
