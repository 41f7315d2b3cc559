//! Push-channel connection state machine.
//!
//! The machine only decides; the orchestrator performs the I/O and reports
//! what happened. A drop is unexpected while the cached job state sits in a
//! push-phase step, and expected once the job has moved past it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How many consecutive reconnects a push session may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Bounded(u32),
    Unbounded,
}

impl RetryBudget {
    /// Whether reconnect number `attempt` (1-based) is allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        match self {
            RetryBudget::Bounded(max) => attempt <= *max,
            RetryBudget::Unbounded => true,
        }
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        RetryBudget::Bounded(5)
    }
}

impl fmt::Display for RetryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryBudget::Bounded(max) => write!(f, "{}", max),
            RetryBudget::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl FromStr for RetryBudget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unbounded") {
            return Ok(RetryBudget::Unbounded);
        }
        s.parse()
            .map(RetryBudget::Bounded)
            .map_err(|_| format!("invalid retry budget '{}': use a number or 'unbounded'", s))
    }
}

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// The next backoff delay, clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The job left the push phase; polling takes over.
    Expected,
    /// Reconnects used up the budget while the job still needed push.
    RetriesExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Connecting,
    Open,
    Retrying { attempt: u32 },
    Closed(CloseReason),
}

#[derive(Debug)]
pub struct PushMachine {
    state: PushState,
    budget: RetryBudget,
    config: ReconnectConfig,
    /// Consecutive reconnects without a delivered event
    attempt: u32,
    delay: Duration,
    reconnects: u32,
}

impl PushMachine {
    pub fn new(budget: RetryBudget, config: ReconnectConfig) -> Self {
        let delay = config.initial_delay;
        Self {
            state: PushState::Connecting,
            budget,
            config,
            attempt: 0,
            delay,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> PushState {
        self.state
    }

    /// Total reconnects scheduled over the session.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            PushState::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    /// The connection was established.
    pub fn opened(&mut self) {
        if self.close_reason().is_none() {
            self.state = PushState::Open;
        }
    }

    /// An event arrived: the channel works again, so the budget resets.
    pub fn received(&mut self) {
        self.attempt = 0;
        self.delay = self.config.initial_delay;
    }

    /// The connection failed or ended. Returns the delay before the next
    /// attempt, or `None` once the machine is closed.
    pub fn disconnected(&mut self, cached_in_push_phase: bool) -> Option<Duration> {
        if self.close_reason().is_some() {
            return None;
        }
        if !cached_in_push_phase {
            self.state = PushState::Closed(CloseReason::Expected);
            return None;
        }

        self.attempt += 1;
        if !self.budget.allows(self.attempt) {
            self.state = PushState::Closed(CloseReason::RetriesExhausted);
            return None;
        }

        let delay = self.delay;
        self.delay = next_delay(self.delay, &self.config);
        self.reconnects += 1;
        self.state = PushState::Retrying {
            attempt: self.attempt,
        };
        Some(delay)
    }

    /// The backoff elapsed and a new connection attempt starts.
    pub fn reconnecting(&mut self) {
        if matches!(self.state, PushState::Retrying { .. }) {
            self.state = PushState::Connecting;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(budget: RetryBudget) -> PushMachine {
        PushMachine::new(budget, ReconnectConfig::default())
    }

    #[test]
    fn test_drop_in_push_phase_retries() {
        let mut m = machine(RetryBudget::Bounded(3));
        m.opened();
        assert_eq!(m.state(), PushState::Open);

        let delay = m.disconnected(true);
        assert_eq!(delay, Some(Duration::from_millis(500)));
        assert_eq!(m.state(), PushState::Retrying { attempt: 1 });

        m.reconnecting();
        assert_eq!(m.state(), PushState::Connecting);
        assert_eq!(m.reconnects(), 1);
    }

    #[test]
    fn test_drop_after_push_phase_closes_expected() {
        let mut m = machine(RetryBudget::Bounded(3));
        m.opened();
        assert_eq!(m.disconnected(false), None);
        assert_eq!(m.state(), PushState::Closed(CloseReason::Expected));
        assert_eq!(m.reconnects(), 0);
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut m = machine(RetryBudget::Bounded(2));
        assert!(m.disconnected(true).is_some());
        m.reconnecting();
        assert!(m.disconnected(true).is_some());
        m.reconnecting();
        assert_eq!(m.disconnected(true), None);
        assert_eq!(m.close_reason(), Some(CloseReason::RetriesExhausted));
        assert_eq!(m.reconnects(), 2);

        // Closed is final.
        m.opened();
        assert_eq!(m.close_reason(), Some(CloseReason::RetriesExhausted));
    }

    #[test]
    fn test_backoff_grows_and_resets_on_event() {
        let mut m = machine(RetryBudget::Unbounded);
        let delays: Vec<u128> = (0..6)
            .map(|_| {
                let d = m.disconnected(true).unwrap();
                m.reconnecting();
                d.as_millis()
            })
            .collect();
        assert_eq!(delays, [500, 1000, 2000, 4000, 8000, 10000]);

        m.opened();
        m.received();
        assert_eq!(m.disconnected(true), Some(Duration::from_millis(500)));
        assert_eq!(m.state(), PushState::Retrying { attempt: 1 });
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let mut m = machine(RetryBudget::Bounded(0));
        assert_eq!(m.disconnected(true), None);
        assert_eq!(m.close_reason(), Some(CloseReason::RetriesExhausted));
    }

    #[test]
    fn test_parse_budget() {
        assert_eq!("unbounded".parse::<RetryBudget>().unwrap(), RetryBudget::Unbounded);
        assert_eq!("4".parse::<RetryBudget>().unwrap(), RetryBudget::Bounded(4));
        assert!("-1".parse::<RetryBudget>().is_err());
    }
}
