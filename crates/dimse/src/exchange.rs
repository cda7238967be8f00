//! Per-exchange completion state
//!
//! An exchange starts `Waiting` with a deadline one idle period away. Each
//! pending response re-arms the deadline and keeps it `Waiting`; the first
//! non-pending response moves it to `Completed`. Everything after that is
//! ignored.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::DimseResponse;
use crate::{DimseError, Result};

/// How long an exchange waits for its next response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Give up once no response arrived for this long
    Idle(Duration),
    /// Wait until the final response or until the peer closes the connection
    Unbounded,
}

impl WaitPolicy {
    /// Idle timeout handed to the association's listen loop
    pub fn listen_timeout(&self) -> Option<Duration> {
        match self {
            WaitPolicy::Idle(idle) => Some(*idle),
            WaitPolicy::Unbounded => None,
        }
    }

    /// `None` when unbounded, or when the idle period overflows the clock
    fn deadline_from(&self, now: Instant) -> Option<Instant> {
        self.listen_timeout().and_then(|idle| now.checked_add(idle))
    }
}

#[derive(Debug)]
pub enum ExchangeState {
    Waiting { deadline: Option<Instant> },
    /// A final response arrived
    Completed,
    /// No response within the idle period
    TimedOut,
    /// The peer closed the association before a final response
    Closed,
    Failed(DimseError),
}

#[derive(Debug)]
pub struct Exchange {
    policy: WaitPolicy,
    state: ExchangeState,
    responses: Vec<DimseResponse>,
}

impl Exchange {
    pub fn new(policy: WaitPolicy) -> Self {
        Self {
            policy,
            state: ExchangeState::Waiting {
                deadline: policy.deadline_from(Instant::now()),
            },
            responses: Vec::new(),
        }
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, ExchangeState::Waiting { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ExchangeState::Waiting { deadline } => deadline,
            _ => None,
        }
    }

    /// Responses collected so far, in arrival order
    pub fn responses(&self) -> &[DimseResponse] {
        &self.responses
    }

    pub fn on_response(&mut self, response: DimseResponse) {
        if !self.is_waiting() {
            debug!(
                "Ignoring {} {} after exchange concluded",
                response.command, response.status
            );
            return;
        }

        let pending = response.is_pending();
        self.responses.push(response);
        self.state = if pending {
            ExchangeState::Waiting {
                deadline: self.policy.deadline_from(Instant::now()),
            }
        } else {
            ExchangeState::Completed
        };
    }

    pub fn on_deadline(&mut self, now: Instant) {
        if let ExchangeState::Waiting {
            deadline: Some(deadline),
        } = self.state
        {
            if now >= deadline {
                warn!(
                    "No final response after {} response(s), giving up",
                    self.responses.len()
                );
                self.state = ExchangeState::TimedOut;
            }
        }
    }

    /// The association stopped listening
    pub fn on_listener_closed(&mut self, result: Result<()>) {
        if !self.is_waiting() {
            return;
        }
        self.state = match result {
            Ok(()) => ExchangeState::Closed,
            Err(e) => ExchangeState::Failed(e),
        };
    }

    /// Collected responses, or the fault that ended the exchange early
    pub fn into_result(self) -> Result<Vec<DimseResponse>> {
        match self.state {
            ExchangeState::Failed(e) => Err(e),
            _ => Ok(self.responses),
        }
    }
}
