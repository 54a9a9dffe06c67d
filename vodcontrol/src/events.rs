use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::model::SessionEvent;

/// Fan-out of session events to any number of subscribers.
///
/// Disconnected subscribers are pruned on the next broadcast.
#[derive(Clone, Default)]
pub struct SessionEventBus {
    subscribers: Arc<Mutex<Vec<Sender<SessionEvent>>>>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded::<SessionEvent>();
        {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.push(tx);
        }
        rx
    }

    pub fn broadcast(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}
