/// Outstanding-request table
///
/// Maps a request id to the completion handle of the caller awaiting its
/// terminal message. The harness registers one entry per call; the stdout
/// reader completes it. Closing the table drops every sender, which wakes the
/// awaiting side with a closed-channel error (process exited).
use super::envelope::WorkerMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, oneshot::Sender<WorkerMessage>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request_id: &str) -> oneshot::Receiver<WorkerMessage> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(request_id.to_string(), tx);
        rx
    }

    /// Deliver a terminal message to its waiter
    ///
    /// Returns false when the message is not terminal or no request with its
    /// id is outstanding.
    pub fn complete(&self, message: WorkerMessage) -> bool {
        if !message.is_terminal() {
            return false;
        }
        let sender = match message.request_id() {
            Some(id) => self.entries.lock().remove(id),
            None => None,
        };
        match sender {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    pub fn cancel(&self, request_id: &str) {
        self.entries.lock().remove(request_id);
    }

    /// Drop every outstanding sender
    pub fn close(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
