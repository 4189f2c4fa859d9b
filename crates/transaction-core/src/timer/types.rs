use std::fmt;
use std::time::Duration;

/// The RFC 3261 timers a transaction can arm.
///
/// Each transaction holds at most one retransmission timer (A, E or G)
/// and at most one guard timer (everything else) at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// INVITE client request retransmission (unreliable transports)
    A,
    /// INVITE client transaction timeout
    B,
    /// INVITE client wait in Completed for response retransmissions
    D,
    /// Non-INVITE client request retransmission (unreliable transports)
    E,
    /// Non-INVITE client transaction timeout
    F,
    /// INVITE server final-response retransmission (unreliable transports)
    G,
    /// INVITE server wait for ACK after a non-2xx final
    H,
    /// INVITE server wait in Confirmed to absorb ACK retransmissions
    I,
    /// Non-INVITE server wait in Completed to absorb request retransmissions
    J,
    /// Non-INVITE client wait in Completed to absorb response retransmissions
    K,
    /// Linger after a 2xx INVITE outcome so retransmissions and the ACK
    /// still find the transaction
    Stale,
}

impl TimerKind {
    /// True for the timers that retransmit and re-arm themselves.
    pub fn is_retransmit(&self) -> bool {
        matches!(self, TimerKind::A | TimerKind::E | TimerKind::G)
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::A => write!(f, "Timer A"),
            TimerKind::B => write!(f, "Timer B"),
            TimerKind::D => write!(f, "Timer D"),
            TimerKind::E => write!(f, "Timer E"),
            TimerKind::F => write!(f, "Timer F"),
            TimerKind::G => write!(f, "Timer G"),
            TimerKind::H => write!(f, "Timer H"),
            TimerKind::I => write!(f, "Timer I"),
            TimerKind::J => write!(f, "Timer J"),
            TimerKind::K => write!(f, "Timer K"),
            TimerKind::Stale => write!(f, "Timer Stale"),
        }
    }
}

/// Timer durations from RFC 3261 section 17, adjustable per engine.
///
/// All fields are plain durations so tests can shrink them with struct
/// update syntax. Reliable transports zero out the wait timers at the
/// point of use, not here.
#[derive(Debug, Clone)]
pub struct TimerSettings {
    /// T1, the round-trip time estimate (default 500 ms). Initial
    /// retransmission interval for Timers A, E and G.
    pub t1: Duration,

    /// T2, the retransmission interval cap for Timer E and Timer G
    /// (default 4 s). Timer A doubles without a cap.
    pub t2: Duration,

    /// Timeout for client transactions, Timers B and F, and the INVITE
    /// server ACK wait, Timer H (default 64 * T1 = 32 s).
    pub transaction_timeout: Duration,

    /// Timer D, the INVITE client wait in Completed (default 32 s,
    /// the RFC minimum for unreliable transports).
    pub wait_time_d: Duration,

    /// Timer I, the INVITE server wait in Confirmed (default T4 = 5 s).
    pub wait_time_i: Duration,

    /// Timer J, the non-INVITE server wait in Completed
    /// (default 64 * T1 = 32 s).
    pub wait_time_j: Duration,

    /// Timer K, the non-INVITE client wait in Completed
    /// (default T4 = 5 s).
    pub wait_time_k: Duration,

    /// How long a 2xx-completed INVITE transaction lingers so request
    /// retransmissions and the TU's ACK still match it (default 32 s).
    pub stale_linger: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        TimerSettings {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            transaction_timeout: Duration::from_secs(32),
            wait_time_d: Duration::from_secs(32),
            wait_time_i: Duration::from_secs(5),
            wait_time_j: Duration::from_secs(32),
            wait_time_k: Duration::from_secs(5),
            stale_linger: Duration::from_secs(32),
        }
    }
}
