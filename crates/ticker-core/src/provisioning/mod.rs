//! Network provisioning
//!
//! The [`ProvisioningCoordinator`] decides, one control cycle at a time,
//! whether the device is still trying its saved network, serving the
//! configuration portal, or done. It is the only place where network
//! progress, portal signals, persistence and the status display meet.

pub mod coordinator;
pub mod failure;
pub mod messages;

pub use coordinator::ProvisioningCoordinator;
pub use failure::FailureLoop;

use crate::display::DEFAULT_SCROLL_SPEED_MS;

/// Phase of a single provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisioningState {
    #[default]
    Idle,
    AttemptingSavedCredentials,
    /// The configuration portal is open and the instructions are on screen.
    PortalActive,
    /// The portal closed unconfigured; the timeout message is being shown.
    PortalTimedOut,
    ConnectSucceeded,
    ConnectFailed,
}

impl ProvisioningState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ConnectSucceeded | Self::ConnectFailed)
    }
}

/// Result of [`ProvisioningCoordinator::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Connected,
    Failed,
}

/// Tunables for the provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisioningSettings {
    /// Name of the configuration access point
    pub portal_ssid: &'static str,
    /// Address shown to the user for opening the portal
    pub portal_address: &'static str,
    /// How long the open portal waits for a configuration
    pub portal_timeout_secs: u32,
    pub scroll_speed_ms: u32,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            portal_ssid: "StockTicker",
            portal_address: "192.168.4.1",
            portal_timeout_secs: 120,
            scroll_speed_ms: DEFAULT_SCROLL_SPEED_MS,
        }
    }
}
