//! Millisecond clock abstraction and the portal deadline

/// Monotonic millisecond time source.
///
/// The firmware backs this with `embassy_time::Instant`, the simulator with
/// `std::time::Instant`, and tests with a manually advanced counter.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Bounded wait for portal configuration.
///
/// The countdown starts when the portal actually opens, not when the
/// connection attempt begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalDeadline {
    timeout_ms: u64,
    opened_at_ms: Option<u64>,
}

impl PortalDeadline {
    pub const fn from_secs(timeout_secs: u32) -> Self {
        Self {
            timeout_ms: timeout_secs as u64 * 1000,
            opened_at_ms: None,
        }
    }

    /// Start the countdown. Re-arming an armed deadline is a no-op.
    pub fn arm(&mut self, now_ms: u64) {
        if self.opened_at_ms.is_none() {
            self.opened_at_ms = Some(now_ms);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.opened_at_ms.is_some()
    }

    pub fn expired(&self, now_ms: u64) -> bool {
        self.remaining_ms(now_ms) == Some(0)
    }

    /// Time left before expiry, `None` while unarmed.
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        let opened = self.opened_at_ms?;
        let elapsed = now_ms.saturating_sub(opened);
        Some(self.timeout_ms.saturating_sub(elapsed))
    }
}
