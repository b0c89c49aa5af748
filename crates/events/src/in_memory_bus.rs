//! In-process event bus.

use std::sync::{Mutex, MutexGuard, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug, thiserror::Error)]
pub enum InMemoryBusError {
    #[error("event bus subscriber list is poisoned")]
    Poisoned,
}

/// Synchronous fan-out over `mpsc` channels.
///
/// `publish` hands every live subscription its own clone before returning, so
/// a caller that drains its subscription right after publishing sees the
/// message.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    senders: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self) -> Result<MutexGuard<'_, Vec<mpsc::Sender<M>>>, InMemoryBusError> {
        self.senders.lock().map_err(|_| InMemoryBusError::Poisoned)
    }

    /// Live subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.senders().map_or(0, |s| s.len())
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut senders = self.senders()?;
        let Some((last, rest)) = senders.split_last() else {
            return Ok(());
        };
        let mut alive: Vec<bool> = rest.iter().map(|tx| tx.send(message.clone()).is_ok()).collect();
        alive.push(last.send(message).is_ok());

        // Receivers that were dropped stop being fed.
        let mut alive = alive.into_iter();
        senders.retain(|_| alive.next().unwrap_or(false));
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        match self.senders() {
            Ok(mut senders) => senders.push(tx),
            // The subscription stays silent; `publish` reports the poisoning.
            Err(InMemoryBusError::Poisoned) => {}
        }
        Subscription::new(rx)
    }
}
