//! Response dispatch between associations and waiting exchanges
//!
//! Every exchange registers one [`Subscription`] under its [`ExchangeKey`]
//! before the request leaves. Associations publish each decoded response
//! under the key derived from the association that received it, so two
//! exchanges of the same operation kind never see each other's responses.
//! Dropping the subscription deregisters it; a response published after
//! that point is discarded.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::types::{DimseCommand, DimseResponse};
use crate::{DimseError, Result};

/// Identity of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    /// Association carrying the exchange
    pub association_id: Uuid,
    /// Message ID of the request
    pub message_id: u16,
    /// Operation kind of the expected responses
    pub command: DimseCommand,
}

impl ExchangeKey {
    pub fn new(association_id: Uuid, message_id: u16, command: DimseCommand) -> Self {
        Self {
            association_id,
            message_id,
            command,
        }
    }

    /// Key a response received on `association_id` belongs to
    pub fn for_response(association_id: Uuid, response: &DimseResponse) -> Self {
        Self::new(
            association_id,
            response.message_id_being_responded_to,
            response.command,
        )
    }
}

impl fmt::Display for ExchangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}@{}",
            self.command, self.message_id, self.association_id
        )
    }
}

/// Registry of live exchanges
pub struct DispatchBus {
    subscribers: Mutex<HashMap<ExchangeKey, mpsc::Sender<DimseResponse>>>,
    buffer: usize,
    subscribed: AtomicU64,
    unsubscribed: AtomicU64,
}

impl DispatchBus {
    /// Create a bus whose subscriptions buffer up to `buffer` responses
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
            subscribed: AtomicU64::new(0),
            unsubscribed: AtomicU64::new(0),
        }
    }

    /// Register an exchange
    pub fn subscribe(self: &Arc<Self>, key: ExchangeKey) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(self.buffer);
        {
            let mut subscribers = self.lock();
            if subscribers.contains_key(&key) {
                return Err(DimseError::dispatch(format!(
                    "exchange {} already has a subscriber",
                    key
                )));
            }
            subscribers.insert(key, tx);
        }
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        trace!("Subscribed {}", key);

        Ok(Subscription {
            key,
            bus: Arc::clone(self),
            rx,
        })
    }

    /// Remove an exchange; returns whether it was registered
    pub fn unsubscribe(&self, key: &ExchangeKey) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            self.unsubscribed.fetch_add(1, Ordering::SeqCst);
            trace!("Unsubscribed {}", key);
        }
        removed
    }

    /// Deliver a response received on `association_id`
    ///
    /// Waits while the subscriber's buffer is full. Returns `false` if no
    /// exchange is waiting for it.
    pub async fn publish(&self, association_id: Uuid, response: DimseResponse) -> bool {
        let key = ExchangeKey::for_response(association_id, &response);
        let sender = self.lock().get(&key).cloned();

        match sender {
            Some(sender) => {
                if sender.send(response).await.is_ok() {
                    true
                } else {
                    debug!("Exchange {} concluded, dropping late response", key);
                    false
                }
            }
            None => {
                debug!("No exchange waiting for {}, dropping response", key);
                false
            }
        }
    }

    /// Number of registered exchanges
    pub fn active(&self) -> usize {
        self.lock().len()
    }

    pub fn subscribed_total(&self) -> u64 {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn unsubscribed_total(&self) -> u64 {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ExchangeKey, mpsc::Sender<DimseResponse>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DispatchBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Receiving end of one exchange's responses
///
/// Deregisters itself when dropped.
pub struct Subscription {
    key: ExchangeKey,
    bus: Arc<DispatchBus>,
    rx: mpsc::Receiver<DimseResponse>,
}

impl Subscription {
    pub fn key(&self) -> &ExchangeKey {
        &self.key
    }

    /// Wait for the next response
    pub async fn recv(&mut self) -> Option<DimseResponse> {
        self.rx.recv().await
    }

    /// Take a response that is already buffered
    pub fn try_recv(&mut self) -> Option<DimseResponse> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();
        self.bus.unsubscribe(&self.key);
    }
}
