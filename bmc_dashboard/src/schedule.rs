use bmc_protocol::ClientCommand;
use std::time::Duration;
use tokio::time::Instant;

pub const SLOW_PERIOD: Duration = Duration::from_millis(1000);
pub const FAST_PERIOD: Duration = Duration::from_millis(250);
pub const STARTUP_DELAY: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTiming {
    /// Period of the `getBmcStats` trigger.
    pub slow: Duration,
    /// Period of the `getSystemState` trigger.
    pub fast: Duration,
    pub startup_delay: Duration,
}

impl Default for RefreshTiming {
    fn default() -> Self {
        Self {
            slow: SLOW_PERIOD,
            fast: FAST_PERIOD,
            startup_delay: STARTUP_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting { at: Instant },
    Running { next_slow: Instant, next_fast: Instant },
}

/// Auto-refresh triggers as plain deadlines.
///
/// The owner asks for [`RefreshSchedule::next_deadline`], sleeps until then and calls
/// [`RefreshSchedule::poll`]. There is exactly one slow and one fast deadline while
/// running, so stopping is a single assignment and nothing can leak.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    timing: RefreshTiming,
    phase: Phase,
}

impl RefreshSchedule {
    pub fn new(timing: RefreshTiming) -> Self {
        Self {
            timing,
            phase: Phase::Idle,
        }
    }

    /// Arms the startup delay. A schedule that is already starting or running is left alone.
    pub fn start(&mut self, now: Instant) {
        if self.phase == Phase::Idle {
            self.phase = Phase::Starting {
                at: now + self.timing.startup_delay,
            };
        }
    }

    pub fn stop(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Starting or running.
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Past the startup round, with both periodic triggers armed.
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    pub fn next_slow(&self) -> Option<Instant> {
        match self.phase {
            Phase::Running { next_slow, .. } => Some(next_slow),
            _ => None,
        }
    }

    pub fn next_fast(&self) -> Option<Instant> {
        match self.phase {
            Phase::Running { next_fast, .. } => Some(next_fast),
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            Phase::Starting { at } => Some(at),
            Phase::Running {
                next_slow,
                next_fast,
            } => Some(next_slow.min(next_fast)),
        }
    }

    /// Requests due at `now`. Deadlines that were missed by more than one period
    /// are moved past `now` rather than replayed.
    pub fn poll(&mut self, now: Instant) -> Vec<ClientCommand> {
        match self.phase {
            Phase::Idle => Vec::new(),
            Phase::Starting { at } => {
                if now < at {
                    return Vec::new();
                }
                self.phase = Phase::Running {
                    next_slow: advance(at, self.timing.slow, now),
                    next_fast: advance(at, self.timing.fast, now),
                };
                vec![
                    ClientCommand::GetBmcInfo,
                    ClientCommand::GetBmcStats,
                    ClientCommand::GetSystemState,
                ]
            }
            Phase::Running {
                mut next_slow,
                mut next_fast,
            } => {
                let mut due = Vec::new();
                if now >= next_slow {
                    due.push(ClientCommand::GetBmcStats);
                    next_slow = advance(next_slow, self.timing.slow, now);
                }
                if now >= next_fast {
                    due.push(ClientCommand::GetSystemState);
                    next_fast = advance(next_fast, self.timing.fast, now);
                }
                self.phase = Phase::Running {
                    next_slow,
                    next_fast,
                };
                due
            }
        }
    }
}

// First deadline of the period grid anchored at `deadline` that lies after `now`.
fn advance(deadline: Instant, period: Duration, now: Instant) -> Instant {
    let late = now.saturating_duration_since(deadline);
    let missed = late.as_nanos() / period.as_nanos().max(1);
    u32::try_from(missed + 1)
        .ok()
        .and_then(|n| period.checked_mul(n))
        .and_then(|step| deadline.checked_add(step))
        .unwrap_or(now + period)
}
