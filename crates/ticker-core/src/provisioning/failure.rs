//! Terminal failure display
//!
//! After a portal timeout the device only loops a message until it is reset.
//! The one thing the user can still do is wipe the saved network and ticker
//! settings so the next boot goes straight to the portal.

use embassy_futures::yield_now;
use log::info;

use super::{ProvisioningSettings, messages};
use crate::display::{ScrollDisplay, StatusDisplay, StatusMessage};
use crate::network::NetworkManager;
use crate::storage::{ConfigStore, KeyValueStore};

pub struct FailureLoop<N, S, R> {
    network: N,
    store: ConfigStore<S>,
    display: StatusDisplay<R>,
    message: StatusMessage,
    cleared: StatusMessage,
    wiped: bool,
}

impl<N, S, R> FailureLoop<N, S, R>
where
    N: NetworkManager,
    S: KeyValueStore,
    R: ScrollDisplay,
{
    pub fn new(
        network: N,
        store: ConfigStore<S>,
        display: StatusDisplay<R>,
        settings: &ProvisioningSettings,
    ) -> Self {
        Self {
            network,
            store,
            display,
            message: messages::timed_out(settings),
            cleared: messages::settings_cleared(settings),
            wiped: false,
        }
    }

    /// One control cycle. A wipe request is honoured once.
    pub fn step(&mut self, wipe_requested: bool) {
        if wipe_requested && !self.wiped {
            info!("Wiping saved WiFi credentials and ticker settings");
            self.network.erase_credentials();
            self.store.clear();
            self.wiped = true;
            self.display.clear();
        }

        let message = if self.wiped {
            &self.cleared
        } else {
            &self.message
        };
        self.display.cycle(message);
    }

    /// Loop forever, polling `wipe_requested` once per cycle.
    pub async fn run(&mut self, mut wipe_requested: impl FnMut() -> bool) -> ! {
        loop {
            self.step(wipe_requested());
            yield_now().await;
        }
    }

    pub fn wiped(&self) -> bool {
        self.wiped
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    pub fn display(&self) -> &StatusDisplay<R> {
        &self.display
    }
}
