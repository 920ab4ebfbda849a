//! Event fan-out.
//!
//! Every subscriber owns a bounded queue. Broadcasting never waits: a
//! subscriber whose queue is full simply misses that line. Subscribers
//! are tracked by id so cancellation removes exactly one entry, and
//! removing the entry drops the only sender, which closes the queue.

use log::{debug, trace};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use uuid::Uuid;

/// Queue size used when a caller asks for a zero-sized buffer.
pub const DEFAULT_BUFFER: usize = 100;

#[derive(Default)]
struct Inner {
    subscribers: RwLock<HashMap<Uuid, mpsc::Sender<String>>>,
}

impl Inner {
    fn remove(&self, id: &Uuid) -> bool {
        match self.subscribers.write() {
            Ok(mut subs) => subs.remove(id).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(id).is_some(),
        }
    }
}

/// Broadcasts free-text event lines to every live subscriber.
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    inner: Arc<Inner>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with a queue of `buffer` lines
    /// (`0` selects [`DEFAULT_BUFFER`]).
    pub fn subscribe(&self, buffer: usize) -> Subscription {
        let size = if buffer == 0 { DEFAULT_BUFFER } else { buffer };
        let (tx, rx) = mpsc::channel(size);
        let id = Uuid::new_v4();

        match self.inner.subscribers.write() {
            Ok(mut subs) => {
                subs.insert(id, tx);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, tx);
            }
        }
        debug!("event subscriber {} registered (buffer={})", id, size);

        Subscription {
            id,
            rx,
            canceller: Canceller {
                id,
                inner: Arc::downgrade(&self.inner),
            },
        }
    }

    /// Offer `line` to every subscriber without blocking. Returns how many
    /// subscribers accepted it.
    pub fn broadcast(&self, line: impl Into<String>) -> usize {
        let line = line.into();
        let subs = match self.inner.subscribers.read() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut delivered = 0;
        for (id, tx) in subs.iter() {
            match tx.try_send(line.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => trace!("subscriber {} full, line dropped", id),
                Err(TrySendError::Closed(_)) => trace!("subscriber {} gone", id),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        match self.inner.subscribers.read() {
            Ok(s) => s.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Cancels one subscription. Cloneable; only the first call has an effect.
#[derive(Clone)]
pub struct Canceller {
    id: Uuid,
    inner: Weak<Inner>,
}

impl Canceller {
    /// Remove the subscriber and close its queue. Returns `false` if it
    /// was already cancelled.
    pub fn cancel(&self) -> bool {
        let removed = self
            .inner
            .upgrade()
            .map(|inner| inner.remove(&self.id))
            .unwrap_or(false);
        if removed {
            debug!("event subscriber {} cancelled", self.id);
        }
        removed
    }
}

/// Receiving end of a subscription. Dropping it cancels the subscription.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<String>,
    canceller: Canceller,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next line; `None` once cancelled and drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}
