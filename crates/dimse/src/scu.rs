//! Service Class User (SCU) implementation for outbound DIMSE operations

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::association::Association;
use crate::config::{DimseConfig, RemoteNode};
use crate::connector;
use crate::dispatch::{DispatchBus, ExchangeKey};
use crate::exchange::{Exchange, WaitPolicy};
use crate::operations::{CFinder, CMover, CStorer};
use crate::types::{DimseRequest, DimseResponse, FindQuery, Priority, QueryLevel, QueryRoot};
use crate::{DimseError, Result};

/// Message IDs reserved per exchange
///
/// The second slot leaves room for sub-operations the peer may start on
/// behalf of the exchange.
pub const MESSAGE_ID_STRIDE: u16 = 2;

/// DIMSE Service Class User
pub struct DimseScu {
    config: DimseConfig,
    bus: Arc<DispatchBus>,
}

impl DimseScu {
    /// Create a new SCU with the given configuration
    pub fn new(config: DimseConfig) -> Self {
        let bus = Arc::new(DispatchBus::new(config.dispatch_buffer));
        Self { config, bus }
    }

    /// Create an SCU that shares `bus` with other SCUs
    pub fn with_bus(config: DimseConfig, bus: Arc<DispatchBus>) -> Self {
        Self { config, bus }
    }

    pub fn config(&self) -> &DimseConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<DispatchBus> {
        &self.bus
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.config.set_connect_timeout(timeout);
    }

    pub fn set_idle_timeout(&mut self, timeout: Duration) {
        self.config.set_idle_timeout(timeout);
    }

    /// Open a connection to `node`, honouring `force_local_port`
    pub async fn connect(&self, node: &RemoteNode) -> Result<TcpStream> {
        self.connect_with(node, self.config.force_local_port).await
    }

    async fn connect_with(&self, node: &RemoteNode, force_local_port: bool) -> Result<TcpStream> {
        node.validate()?;
        let timeout = self.get_connection_timeout(node);
        if force_local_port {
            connector::connect_from(node, self.config.local_endpoint(), timeout).await
        } else {
            connector::connect(node, timeout).await
        }
    }

    /// Connect, wrap the connection in an association and send `request`
    async fn deliver(
        &self,
        request: &DimseRequest,
        node: &RemoteNode,
        association_id: Uuid,
        force_local_port: bool,
    ) -> Result<Association> {
        let stream = self.connect_with(node, force_local_port).await?;
        let mut association =
            Association::new(association_id, stream, node.ae_title.clone(), Arc::clone(&self.bus));
        association.send(request).await?;
        Ok(association)
    }

    /// Send a request and listen for the idle timeout
    ///
    /// Returns `false` if the request could not be delivered.
    pub async fn send_message(&self, request: &DimseRequest, node: &RemoteNode) -> bool {
        self.send_and_listen(
            request,
            node,
            self.config.force_local_port,
            Some(self.config.idle_timeout()),
        )
        .await
    }

    /// Send a request from the configured local endpoint and listen until the peer closes
    ///
    /// Fails fast, without contacting the peer, if the local endpoint cannot be bound.
    pub async fn send_message_force_port(&self, request: &DimseRequest, node: &RemoteNode) -> bool {
        self.send_and_listen(request, node, true, None).await
    }

    async fn send_and_listen(
        &self,
        request: &DimseRequest,
        node: &RemoteNode,
        force_local_port: bool,
        idle_timeout: Option<Duration>,
    ) -> bool {
        match self
            .deliver(request, node, Uuid::new_v4(), force_local_port)
            .await
        {
            Ok(association) => {
                if let Err(e) = association.listen(idle_timeout).await {
                    warn!("Listening to {} ended with error: {}", node, e);
                }
                true
            }
            Err(e) => {
                error!("Could not connect to {}: {}", node, e);
                false
            }
        }
    }

    /// Send `request` to `node` and collect its responses
    ///
    /// Pending responses keep the exchange open; the first final response
    /// ends it. Returns an empty list if nothing arrived in time. Fails with
    /// `Delivery` if the request never reached the peer. `message_id` is
    /// advanced by [`MESSAGE_ID_STRIDE`] whatever the outcome.
    pub async fn correlate(
        &self,
        request: DimseRequest,
        node: &RemoteNode,
        wait: WaitPolicy,
        message_id: &mut u16,
    ) -> Result<Vec<DimseResponse>> {
        let outcome = self.run_exchange(&request, node, wait).await;
        *message_id = message_id.wrapping_add(MESSAGE_ID_STRIDE);
        outcome
    }

    async fn run_exchange(
        &self,
        request: &DimseRequest,
        node: &RemoteNode,
        wait: WaitPolicy,
    ) -> Result<Vec<DimseResponse>> {
        let association_id = Uuid::new_v4();
        let mut subscription = self.bus.subscribe(ExchangeKey::new(
            association_id,
            request.message_id,
            request.command,
        ))?;

        let association = match self
            .deliver(request, node, association_id, self.config.force_local_port)
            .await
        {
            Ok(association) => association,
            Err(e) => {
                error!("Could not connect to {}: {}", node, e);
                return Err(DimseError::delivery(node, e));
            }
        };

        info!(
            "Sent {} (message id {}) to {}, awaiting responses",
            request.command, request.message_id, node
        );

        let mut listener = Listener(tokio::spawn(association.listen(wait.listen_timeout())));
        let mut exchange = Exchange::new(wait);

        while exchange.is_waiting() {
            tokio::select! {
                biased;

                Some(response) = subscription.recv() => exchange.on_response(response),

                joined = &mut listener.0 => {
                    while let Some(response) = subscription.try_recv() {
                        exchange.on_response(response);
                    }
                    let result = joined.unwrap_or_else(|e| {
                        Err(DimseError::ConnectionLost(format!("listener task failed: {}", e)))
                    });
                    exchange.on_listener_closed(result);
                }

                _ = wait_until(exchange.deadline()) => exchange.on_deadline(Instant::now()),
            }
        }

        debug!(
            "{} with {} ended in state {:?}",
            request.command,
            node,
            exchange.state()
        );
        drop(listener);
        drop(subscription);

        exchange.into_result()
    }

    /// Collect all responses, waiting at most the idle timeout between them
    pub async fn get_responses(
        &self,
        request: DimseRequest,
        node: &RemoteNode,
        message_id: &mut u16,
    ) -> Result<Vec<DimseResponse>> {
        let wait = WaitPolicy::Idle(self.config.idle_timeout());
        self.correlate(request, node, wait, message_id).await
    }

    /// First response of the exchange, if any
    pub async fn get_response(
        &self,
        request: DimseRequest,
        node: &RemoteNode,
        message_id: &mut u16,
    ) -> Result<Option<DimseResponse>> {
        let responses = self.get_responses(request, node, message_id).await?;
        Ok(responses.into_iter().next())
    }

    /// Send a C-ECHO request to a remote node
    ///
    /// `timeout` defaults to the idle timeout. Any failure reads as `false`.
    pub async fn echo(&self, node: &RemoteNode, timeout: Option<Duration>) -> bool {
        match self.try_echo(node, timeout).await {
            Ok(answered) => answered,
            Err(e) => {
                error!("C-ECHO to {} failed: {}", node, e);
                false
            }
        }
    }

    async fn try_echo(&self, node: &RemoteNode, timeout: Option<Duration>) -> Result<bool> {
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or_else(|| self.config.idle_timeout());
        info!("Sending C-ECHO to {} (timeout {:?})", node, timeout);

        let mut message_id = 1;
        let request = DimseRequest::echo(message_id);
        let responses = self
            .correlate(request, node, WaitPolicy::Idle(timeout), &mut message_id)
            .await?;

        match responses.first() {
            Some(response) => {
                if response.status.is_success() {
                    info!("C-ECHO to {} completed successfully", node);
                } else {
                    warn!("C-ECHO to {} answered with {}", node, response.status);
                }
                Ok(true)
            }
            None => {
                warn!("No C-ECHO response from {} within {:?}", node, timeout);
                Ok(false)
            }
        }
    }

    /// Test connectivity to a remote node with retry logic
    pub async fn test_connection(&self, node: &RemoteNode, max_retries: u32) -> bool {
        let mut retries = 0;

        loop {
            if retries > 0 {
                info!("Connection test retry {} of {}", retries, max_retries);
                tokio::time::sleep(Duration::from_secs(1 << retries.min(6))).await; // Exponential backoff
            }

            match self.try_echo(node, None).await {
                Ok(true) => {
                    info!("Connection test successful");
                    return true;
                }
                Ok(false) if retries < max_retries => {
                    warn!("Connection test unanswered (attempt {})", retries + 1);
                }
                Err(e) if e.is_recoverable() && retries < max_retries => {
                    warn!("Connection test failed (attempt {}): {}", retries + 1, e);
                }
                Ok(false) => {
                    error!("Connection test to {} unanswered after all retries", node);
                    return false;
                }
                Err(e) => {
                    error!("Connection test failed permanently: {}", e);
                    return false;
                }
            }
            retries += 1;
        }
    }

    /// Retrieve a single instance with C-GET at IMAGE level
    ///
    /// Waits without a timeout for the final response, or until the peer
    /// closes the association. Returns the last response received.
    pub async fn get_image(
        &self,
        node: &RemoteNode,
        mut query: FindQuery,
        message_id: &mut u16,
    ) -> Result<Option<DimseResponse>> {
        query.query_level = QueryLevel::Image;
        let request = DimseRequest::get(*message_id, query, QueryRoot::Study, Priority::Medium);

        let mut responses = self
            .correlate(request, node, WaitPolicy::Unbounded, message_id)
            .await?;
        Ok(responses.pop())
    }

    /// C-FIND operations against `node`
    pub fn finder(&self, node: RemoteNode) -> CFinder<'_> {
        CFinder::new(self, node)
    }

    /// C-MOVE operations against `node`
    pub fn mover(&self, node: RemoteNode) -> CMover<'_> {
        CMover::new(self, node)
    }

    /// C-STORE operations against `node`
    pub fn storer(&self, node: RemoteNode) -> CStorer<'_> {
        CStorer::new(self, node)
    }

    /// Get connection timeout for a node (uses node-specific or global setting)
    fn get_connection_timeout(&self, node: &RemoteNode) -> Duration {
        node.connect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.connect_timeout())
    }
}

/// Listen task, aborted when the exchange lets go of it
struct Listener(JoinHandle<Result<()>>);

impl Drop for Listener {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}

/// Builder for creating SCU instances with custom configurations
pub struct ScuBuilder {
    config: DimseConfig,
    bus: Option<Arc<DispatchBus>>,
}

impl ScuBuilder {
    /// Start building a new SCU
    pub fn new() -> Self {
        Self {
            config: DimseConfig::default(),
            bus: None,
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: DimseConfig) -> Self {
        Self { config, bus: None }
    }

    /// Set the local AE title
    pub fn local_aet(mut self, aet: impl Into<String>) -> Self {
        self.config.local_aet = aet.into();
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.set_connect_timeout(timeout);
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.set_idle_timeout(timeout);
        self
    }

    /// Always connect from `addr`
    pub fn force_local_port(mut self, addr: std::net::SocketAddr) -> Self {
        self.config.bind_addr = addr.ip();
        self.config.port = addr.port();
        self.config.force_local_port = true;
        self
    }

    /// Share a dispatch bus with other SCUs
    pub fn bus(mut self, bus: Arc<DispatchBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Build the SCU
    pub fn build(self) -> Result<DimseScu> {
        self.config.validate()?;
        Ok(match self.bus {
            Some(bus) => DimseScu::with_bus(self.config, bus),
            None => DimseScu::new(self.config),
        })
    }
}

impl Default for ScuBuilder {
    fn default() -> Self {
        Self::new()
    }
}
