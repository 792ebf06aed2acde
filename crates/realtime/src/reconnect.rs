use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff bounds for the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_ms: 1_000, cap_ms: 30_000, max_attempts: 10 }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^attempt, cap)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.cap_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Backoff { attempt: u32, delay: Duration },
    Failed { attempts: u32 },
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Backoff { .. } => "reconnecting",
            ConnectionState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting { attempt } if *attempt > 0 => write!(f, "connecting (retry {attempt})"),
            ConnectionState::Backoff { attempt, delay } => {
                write!(f, "reconnecting in {}ms (retry {attempt})", delay.as_millis())
            }
            ConnectionState::Failed { attempts } => write!(f, "failed after {attempts} retries"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry(Duration),
    GiveUp { attempts: u32 },
}

/// Owns the attempt counter and the observable state. Timers live with the
/// caller; this type only decides.
#[derive(Debug, Clone)]
pub struct ReconnectController {
    policy: ReconnectPolicy,
    attempt: u32,
    state: ConnectionState,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0, state: ConnectionState::Disconnected }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn begin_connect(&mut self) -> ConnectionState {
        self.state = ConnectionState::Connecting { attempt: self.attempt };
        self.state
    }

    /// Transport accepted the request and the response status was OK.
    pub fn opened(&mut self) -> ConnectionState {
        self.state = ConnectionState::Connected;
        self.state
    }

    /// First frame seen on the current connection. Returns true when this
    /// reset a non-zero attempt counter.
    pub fn confirm(&mut self) -> bool {
        self.state = ConnectionState::Connected;
        std::mem::replace(&mut self.attempt, 0) > 0
    }

    pub fn fail(&mut self) -> Decision {
        if self.attempt >= self.policy.max_attempts {
            self.state = ConnectionState::Failed { attempts: self.attempt };
            return Decision::GiveUp { attempts: self.attempt };
        }
        let delay = self.policy.delay_for(self.attempt);
        self.attempt += 1;
        self.state = ConnectionState::Backoff { attempt: self.attempt, delay };
        Decision::Retry(delay)
    }

    pub fn closed(&mut self) -> ConnectionState {
        self.state = ConnectionState::Disconnected;
        self.state
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_cap() {
        let p = ReconnectPolicy::default();
        let ms: Vec<u128> = (0..7).map(|n| p.delay_for(n).as_millis()).collect();
        assert_eq!(ms, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
        assert_eq!(p.delay_for(200), Duration::from_millis(30_000));
    }

    #[test]
    fn three_failures_schedule_one_two_four_seconds() {
        let mut c = ReconnectController::new(ReconnectPolicy::default());
        let mut delays = Vec::new();
        for _ in 0..3 {
            c.begin_connect();
            match c.fail() {
                Decision::Retry(d) => delays.push(d.as_millis()),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(delays, vec![1000, 2000, 4000]);
        assert_eq!(c.state(), ConnectionState::Backoff { attempt: 3, delay: Duration::from_millis(4000) });
    }

    #[test]
    fn confirm_resets_to_base_delay() {
        let mut c = ReconnectController::new(ReconnectPolicy::default());
        c.fail();
        c.fail();
        c.begin_connect();
        c.opened();
        assert!(c.confirm());
        assert!(c.state().is_connected());
        assert_eq!(c.fail(), Decision::Retry(Duration::from_millis(1000)));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = ReconnectPolicy { base_ms: 10, cap_ms: 40, max_attempts: 3 };
        let mut c = ReconnectController::new(policy);
        for _ in 0..3 {
            assert!(matches!(c.fail(), Decision::Retry(_)));
        }
        assert_eq!(c.fail(), Decision::GiveUp { attempts: 3 });
        assert!(c.state().is_terminal());
        assert_eq!(c.state().label(), "failed");
    }

    #[test]
    fn reset_clears_terminal_state() {
        let mut c = ReconnectController::new(ReconnectPolicy { max_attempts: 1, ..Default::default() });
        c.fail();
        c.fail();
        assert!(c.state().is_terminal());
        c.reset();
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(c.attempt(), 0);
    }
}
