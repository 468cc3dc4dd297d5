//! Latched provisioning signals
//!
//! The network subsystem raises these from wherever its own callbacks run;
//! the provisioning coordinator drains them at the top of each control cycle.
//! A latch stays raised until it is taken, so an edge that happens between
//! two polls is never lost.

use core::sync::atomic::{AtomicBool, Ordering};

/// One-shot boolean flag.
#[derive(Debug, Default)]
pub struct Latch(AtomicBool);

impl Latch {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Raise the latch. Returns `true` if it was not already raised.
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// Observe and clear the latch.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The signals a [`NetworkManager`](crate::network::NetworkManager) raises
/// while provisioning.
#[derive(Debug, Default)]
pub struct ProvisioningSignals {
    /// The configuration portal is up and accepting clients.
    pub portal_started: Latch,
    /// The portal closed without a successful connection.
    pub portal_timed_out: Latch,
    /// The user submitted new values through the portal.
    pub config_submitted: Latch,
}

impl ProvisioningSignals {
    pub const fn new() -> Self {
        Self {
            portal_started: Latch::new(),
            portal_timed_out: Latch::new(),
            config_submitted: Latch::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_is_edge_triggered() {
        let latch = Latch::new();
        assert!(!latch.take());

        assert!(latch.raise());
        assert!(!latch.raise(), "second raise is not a new edge");
        assert!(latch.is_raised());

        assert!(latch.take());
        assert!(!latch.take(), "a latch is observed once");
    }

    #[test]
    fn test_raise_between_polls_is_kept() {
        let signals = ProvisioningSignals::new();
        signals.config_submitted.raise();
        signals.portal_started.raise();

        // Observed later, in any order.
        assert!(signals.portal_started.take());
        assert!(signals.config_submitted.take());
        assert!(!signals.portal_timed_out.take());
    }
}
