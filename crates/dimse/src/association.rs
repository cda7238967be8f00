//! Client side of one live association
//!
//! An [`Association`] owns a connected stream and the identity of the peer
//! on the other end. It writes requests and, while listening, decodes every
//! inbound message and publishes it on the [`DispatchBus`]. It never looks
//! at what the messages mean.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::ScuCodec;
use crate::dispatch::DispatchBus;
use crate::types::DimseRequest;
use crate::{DimseError, Result};

/// Tracks the time of the last inbound message
#[derive(Debug, Clone, Copy)]
pub struct IdleClock {
    last_contact: Instant,
}

impl IdleClock {
    pub fn new() -> Self {
        Self {
            last_contact: Instant::now(),
        }
    }

    pub fn restart(&mut self) {
        self.last_contact = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.last_contact.elapsed()
    }

    /// When the association counts as idle, given the idle timeout
    ///
    /// `None` if the timeout reaches past what the clock can represent.
    pub fn deadline(&self, idle_timeout: Duration) -> Option<Instant> {
        self.last_contact.checked_add(idle_timeout)
    }
}

impl Default for IdleClock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Association {
    id: Uuid,
    ae_title: String,
    framed: Framed<TcpStream, ScuCodec>,
    idle_clock: IdleClock,
    bus: Arc<DispatchBus>,
}

impl Association {
    /// Wrap a connected stream to the peer titled `ae_title`
    pub fn new(
        id: Uuid,
        stream: TcpStream,
        ae_title: impl Into<String>,
        bus: Arc<DispatchBus>,
    ) -> Self {
        Self {
            id,
            ae_title: ae_title.into(),
            framed: Framed::new(stream, ScuCodec::new()),
            idle_clock: IdleClock::new(),
            bus,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// AE title of the peer
    pub fn ae_title(&self) -> &str {
        &self.ae_title
    }

    pub fn set_ae_title(&mut self, ae_title: impl Into<String>) {
        self.ae_title = ae_title.into();
    }

    pub fn idle_clock(&self) -> &IdleClock {
        &self.idle_clock
    }

    pub fn reset_liveness(&mut self) {
        self.idle_clock.restart();
    }

    /// Write one request to the peer
    pub async fn send(&mut self, request: &DimseRequest) -> Result<()> {
        debug!(
            "Sending {} (message id {}) to {}",
            request.command, request.message_id, self.ae_title
        );
        self.framed
            .send(request.clone())
            .await
            .map_err(|e| DimseError::Send(format!("{} to {}: {}", request.command, self.ae_title, e)))?;
        self.reset_liveness();
        Ok(())
    }

    /// Publish inbound messages until the association goes quiet or closes
    ///
    /// With `Some(idle)`, returns once no message has arrived for `idle`.
    /// With `None`, returns only when the peer closes the connection. The
    /// connection is closed when this returns.
    pub async fn listen(mut self, idle_timeout: Option<Duration>) -> Result<()> {
        loop {
            let deadline = idle_timeout.and_then(|idle| self.idle_clock.deadline(idle));
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.framed.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            debug!(
                                "Association {} with {} idle for {:?}",
                                self.id,
                                self.ae_title,
                                self.idle_clock.elapsed()
                            );
                            return Ok(());
                        }
                    }
                }
                None => self.framed.next().await,
            };

            match next {
                Some(Ok(response)) => {
                    self.reset_liveness();
                    debug!(
                        "Received {} {} for message id {} from {}",
                        response.command,
                        response.status,
                        response.message_id_being_responded_to,
                        self.ae_title
                    );
                    self.bus.publish(self.id, response).await;
                }
                Some(Err(e)) => {
                    warn!("Association with {} failed: {}", self.ae_title, e);
                    return Err(DimseError::ConnectionLost(format!("{}: {}", self.ae_title, e)));
                }
                None => {
                    debug!("{} closed association {}", self.ae_title, self.id);
                    return Ok(());
                }
            }
        }
    }
}
