//! Provisioning state machine
//!
//! Each control cycle the coordinator polls the network once, drains the
//! portal signals, and advances the status display by one frame. It never
//! waits on the network; the only wait is for the final animation cycle
//! before the timeout message.

use embassy_futures::yield_now;
use log::{debug, info, warn};

use super::{Outcome, ProvisioningSettings, ProvisioningState, messages};
use crate::config::{ConfigParameters, FieldId};
use crate::display::{ScrollDisplay, StatusDisplay, StatusMessage};
use crate::network::{ConnectOptions, NetworkManager, PollStatus, PortalField};
use crate::signals::ProvisioningSignals;
use crate::storage::{ConfigStore, KeyValueStore};

pub struct ProvisioningCoordinator<N, S, R> {
    network: N,
    store: ConfigStore<S>,
    display: StatusDisplay<R>,
    signals: ProvisioningSignals,
    settings: ProvisioningSettings,
    config: ConfigParameters,
    state: ProvisioningState,
    fields_registered: bool,
}

impl<N, S, R> ProvisioningCoordinator<N, S, R>
where
    N: NetworkManager,
    S: KeyValueStore,
    R: ScrollDisplay,
{
    pub fn new(
        network: N,
        store: ConfigStore<S>,
        display: StatusDisplay<R>,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            network,
            store,
            display,
            signals: ProvisioningSignals::new(),
            settings,
            config: ConfigParameters::default(),
            state: ProvisioningState::Idle,
            fields_registered: false,
        }
    }

    /// Bring the network up, falling back to the configuration portal.
    ///
    /// Returns once the device is connected or the portal has timed out.
    pub async fn run(&mut self) -> Outcome {
        self.state = ProvisioningState::Idle;
        self.drain_signals();
        self.config = self.store.load();

        // The network manager keeps its fields across runs.
        if !self.fields_registered {
            for id in FieldId::ALL {
                self.network.add_field(PortalField::seeded(id, &self.config));
            }
            self.fields_registered = true;
        }

        let options = ConnectOptions {
            portal_ssid: self.settings.portal_ssid,
            portal_address: self.settings.portal_address,
            portal_timeout_secs: self.settings.portal_timeout_secs,
        };
        let connecting = messages::connecting(&self.settings);
        let instructions = messages::portal_instructions(&self.settings);

        info!("Connecting with saved credentials");
        self.state = ProvisioningState::AttemptingSavedCredentials;
        let mut status = self.network.begin(&options, &self.signals);
        let mut portal_opened = false;

        while status != PollStatus::Connected {
            if self.signals.portal_started.take() && !portal_opened {
                portal_opened = true;
                self.state = ProvisioningState::PortalActive;
                info!(
                    "Configuration portal open: join \"{}\" and browse to {}",
                    self.settings.portal_ssid, self.settings.portal_address
                );
                self.display.clear();
            }

            if self.signals.portal_timed_out.take() {
                return self.time_out().await;
            }

            let message = match self.state {
                ProvisioningState::PortalActive => &instructions,
                _ => &connecting,
            };
            self.display.cycle(message);

            yield_now().await;
            status = self.network.poll(&self.signals);
        }

        // The portal may have opened in the same poll that connected.
        portal_opened |= self.signals.portal_started.take();
        self.finish_connected(portal_opened);
        self.drain_signals();
        Outcome::Connected
    }

    async fn time_out(&mut self) -> Outcome {
        self.state = ProvisioningState::PortalTimedOut;
        warn!(
            "Configuration portal timed out after {}s",
            self.settings.portal_timeout_secs
        );
        self.display
            .show_once(&messages::timed_out(&self.settings))
            .await;
        self.state = ProvisioningState::ConnectFailed;
        self.drain_signals();
        Outcome::Failed
    }

    /// Drop latches left over from an earlier run or raised after the outcome was decided.
    fn drain_signals(&self) {
        let stale = [
            self.signals.portal_started.take(),
            self.signals.portal_timed_out.take(),
            self.signals.config_submitted.take(),
        ];
        if stale.contains(&true) {
            debug!(
                "Dropped stale signals: started={} timed_out={} submitted={}",
                stale[0], stale[1], stale[2]
            );
        }
    }

    fn finish_connected(&mut self, portal_opened: bool) {
        self.state = ProvisioningState::ConnectSucceeded;
        match self.network.network_info() {
            Some(network) => info!("Connected: {}", network),
            None => info!("Connected"),
        }

        if portal_opened {
            for id in FieldId::ALL {
                let Some(value) = self.network.field_value(id) else {
                    continue;
                };
                if self.config.set_field(id, value) {
                    warn!("Portal value for {} truncated to {} bytes", id.key(), id.capacity());
                }
            }

            if self.signals.config_submitted.take() {
                self.store.save(&self.config);
            } else {
                debug!("Portal closed without a submission; nothing to persist");
            }
        }

        info!(
            "Using credential_key={} symbols=\"{}\"",
            self.config.masked_key(),
            self.config.symbol_list()
        );
    }

    /// Working configuration
    pub fn config(&self) -> &ConfigParameters {
        &self.config
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    pub fn signals(&self) -> &ProvisioningSignals {
        &self.signals
    }

    pub fn settings(&self) -> &ProvisioningSettings {
        &self.settings
    }

    /// Status text for the connected steady state
    pub fn connected_message(&self) -> StatusMessage {
        messages::connected(
            &self.settings,
            self.network.network_info().as_ref(),
            &self.config,
        )
    }

    /// Hand the collaborators over to whatever runs after provisioning.
    pub fn into_parts(self) -> (N, ConfigStore<S>, StatusDisplay<R>, ConfigParameters) {
        (self.network, self.store, self.display, self.config)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::copy_bounded;
    use crate::display::coordinator::tests::RecordingDisplay;
    use crate::network::NetworkInfo;
    use crate::storage::{CONFIG_NAMESPACE, MemoryKvStore};
    use alloc::string::{String, ToString};
    use alloc::vec;
    use alloc::vec::Vec;
    use embassy_futures::block_on;

    /// What the fake network does on one `poll`.
    #[derive(Debug, Clone)]
    pub(crate) enum Event {
        Nothing,
        OpenPortal,
        Submit(&'static str, &'static str),
        TimeOut,
        Connect,
        /// Connect and time out in the same poll.
        ConnectAndTimeOut,
        /// Open the portal and connect in the same poll.
        OpenPortalAndConnect,
    }

    pub(crate) struct FakeNetwork {
        pub joins_saved_network: bool,
        pub script: Vec<Event>,
        pub polls: usize,
        pub fields: Vec<PortalField>,
        pub connected: bool,
        pub erased: bool,
        pub timeout_secs: Option<u32>,
    }

    impl FakeNetwork {
        pub fn new(script: Vec<Event>) -> Self {
            Self {
                joins_saved_network: false,
                script,
                polls: 0,
                fields: Vec::new(),
                connected: false,
                erased: false,
                timeout_secs: None,
            }
        }

        pub fn saved_network() -> Self {
            Self {
                joins_saved_network: true,
                ..Self::new(Vec::new())
            }
        }

        fn set_field(&mut self, id: FieldId, value: &str) {
            if let Some(field) = self.fields.iter_mut().find(|field| field.id == id) {
                copy_bounded(&mut field.value, value);
            }
        }
    }

    impl NetworkManager for FakeNetwork {
        fn add_field(&mut self, field: PortalField) {
            self.fields.push(field);
        }

        fn begin(&mut self, options: &ConnectOptions<'_>, _signals: &ProvisioningSignals) -> PollStatus {
            self.timeout_secs = Some(options.portal_timeout_secs);
            if self.joins_saved_network {
                self.connected = true;
                PollStatus::Connected
            } else {
                PollStatus::Pending
            }
        }

        fn poll(&mut self, signals: &ProvisioningSignals) -> PollStatus {
            let event = self.script.get(self.polls).cloned().unwrap_or(Event::Nothing);
            self.polls += 1;

            match event {
                Event::Nothing => {}
                Event::OpenPortal => {
                    signals.portal_started.raise();
                }
                Event::Submit(key, symbols) => {
                    self.set_field(FieldId::CredentialKey, key);
                    self.set_field(FieldId::SymbolList, symbols);
                    signals.config_submitted.raise();
                }
                Event::TimeOut => {
                    signals.portal_timed_out.raise();
                }
                Event::Connect => self.connected = true,
                Event::ConnectAndTimeOut => {
                    signals.portal_timed_out.raise();
                    self.connected = true;
                }
                Event::OpenPortalAndConnect => {
                    signals.portal_started.raise();
                    self.connected = true;
                }
            }

            if self.connected {
                PollStatus::Connected
            } else {
                PollStatus::Pending
            }
        }

        fn field_value(&self, id: FieldId) -> Option<&str> {
            self.fields
                .iter()
                .find(|field| field.id == id)
                .map(|field| field.value.as_str())
        }

        fn network_info(&self) -> Option<NetworkInfo> {
            self.connected
                .then(|| NetworkInfo::new("home").with_rssi(-55).with_address([192, 168, 1, 40]))
        }

        fn erase_credentials(&mut self) {
            self.erased = true;
        }
    }

    pub(crate) type TestCoordinator =
        ProvisioningCoordinator<FakeNetwork, MemoryKvStore, RecordingDisplay>;

    pub(crate) fn coordinator(network: FakeNetwork, store: MemoryKvStore) -> TestCoordinator {
        ProvisioningCoordinator::new(
            network,
            ConfigStore::new(store),
            StatusDisplay::new(RecordingDisplay::new(2)),
            ProvisioningSettings::default(),
        )
    }

    pub(crate) fn saved_store(key: &str, symbols: &str) -> MemoryKvStore {
        let mut store = MemoryKvStore::new();
        store.write(CONFIG_NAMESPACE, "credential_key", key).unwrap();
        store.write(CONFIG_NAMESPACE, "symbols", symbols).unwrap();
        store.commit().unwrap();
        store
    }

    fn instructions() -> String {
        messages::portal_instructions(&ProvisioningSettings::default())
            .text()
            .to_string()
    }

    fn timed_out() -> String {
        messages::timed_out(&ProvisioningSettings::default())
            .text()
            .to_string()
    }

    fn repeat(event: Event, times: usize) -> Vec<Event> {
        vec![event; times]
    }

    #[test]
    fn test_saved_credentials_connect_without_portal() {
        let mut coordinator = coordinator(FakeNetwork::saved_network(), saved_store("abc123", "AAPL"));

        assert_eq!(block_on(coordinator.run()), Outcome::Connected);
        assert_eq!(coordinator.state(), ProvisioningState::ConnectSucceeded);
        assert!(!coordinator.signals().portal_started.is_raised());
        assert_eq!(coordinator.config(), &ConfigParameters::new("abc123", "AAPL"));

        let (network, store, display, _) = coordinator.into_parts();
        assert_eq!(network.polls, 0, "connected synchronously");
        assert_eq!(network.timeout_secs, Some(120));
        assert_eq!(store.store().commit_count(), 1, "only the seeding commit");
        assert_eq!(display.renderer().count(&instructions()), 0);
    }

    #[test]
    fn test_slow_saved_connection_never_opens_portal() {
        let mut script = repeat(Event::Nothing, 5);
        script.push(Event::Connect);
        let mut coordinator = coordinator(FakeNetwork::new(script), saved_store("abc123", "AAPL"));

        assert_eq!(block_on(coordinator.run()), Outcome::Connected);
        let (network, store, display, config) = coordinator.into_parts();

        assert_eq!(network.polls, 6);
        assert_eq!(store.store().commit_count(), 1);
        assert_eq!(config.credential_key(), "abc123");
        assert_eq!(display.renderer().clears, 0);
        assert!(display.renderer().count("Connecting to WiFi...") > 0);
        assert_eq!(display.renderer().count(&instructions()), 0);
    }

    #[test]
    fn test_portal_submission_is_captured_and_persisted() {
        let mut script = vec![Event::OpenPortal];
        script.extend(repeat(Event::Nothing, 8));
        script.push(Event::Submit("newkey", "MSFT,NVDA"));
        script.push(Event::Connect);
        let mut coordinator = coordinator(FakeNetwork::new(script), MemoryKvStore::new());

        assert_eq!(block_on(coordinator.run()), Outcome::Connected);
        assert_eq!(coordinator.config(), &ConfigParameters::new("newkey", "MSFT,NVDA"));

        let (_, mut store, display, _) = coordinator.into_parts();
        assert_eq!(store.load(), ConfigParameters::new("newkey", "MSFT,NVDA"));

        let renderer = display.renderer();
        assert_eq!(renderer.clears, 1, "portal start handled once");
        let first_instruction = renderer
            .shown
            .iter()
            .position(|text| *text == instructions())
            .unwrap();
        assert!(
            renderer.shown[first_instruction..]
                .iter()
                .all(|text| *text == instructions()),
            "instructions shown on every cycle while the portal is open"
        );
        assert!(renderer.count(&instructions()) >= 3);
    }

    #[test]
    fn test_portal_fields_are_seeded_from_store() {
        let mut coordinator = coordinator(FakeNetwork::saved_network(), saved_store("abc123", "AAPL,AMZN"));
        block_on(coordinator.run());

        let (network, _, _, _) = coordinator.into_parts();
        assert_eq!(network.fields.len(), 2);
        assert_eq!(network.fields[0].value.as_str(), "abc123");
        assert_eq!(network.fields[0].capacity, 40);
        assert_eq!(network.fields[1].value.as_str(), "AAPL,AMZN");
        assert_eq!(network.fields[1].capacity, 54);
    }

    #[test]
    fn test_portal_without_submission_does_not_persist() {
        let script = vec![Event::OpenPortal, Event::Nothing, Event::Connect];
        let mut coordinator = coordinator(FakeNetwork::new(script), saved_store("abc123", "AAPL"));

        assert_eq!(block_on(coordinator.run()), Outcome::Connected);
        let (_, store, _, config) = coordinator.into_parts();
        assert_eq!(store.store().commit_count(), 1);
        assert_eq!(config, ConfigParameters::new("abc123", "AAPL"));
    }

    #[test]
    fn test_portal_signal_in_connecting_poll_is_drained() {
        let script = vec![Event::OpenPortalAndConnect];
        let mut coordinator = coordinator(FakeNetwork::new(script), MemoryKvStore::new());

        assert_eq!(block_on(coordinator.run()), Outcome::Connected);
        assert!(!coordinator.signals().portal_started.is_raised());
    }

    #[test]
    fn test_timeout_shows_message_once_then_fails() {
        let mut script = vec![Event::OpenPortal];
        script.extend(repeat(Event::Nothing, 4));
        script.push(Event::TimeOut);
        let mut coordinator = coordinator(FakeNetwork::new(script), MemoryKvStore::new());

        assert_eq!(block_on(coordinator.run()), Outcome::Failed);
        assert_eq!(coordinator.state(), ProvisioningState::ConnectFailed);

        let (_, store, display, _) = coordinator.into_parts();
        let renderer = display.renderer();
        assert_eq!(renderer.count(&timed_out()), 1);
        assert_eq!(renderer.shown.last(), Some(&timed_out()));
        assert_eq!(renderer.remaining, 0, "timeout message played to completion");
        assert_eq!(store.store().commit_count(), 0);
    }

    #[test]
    fn test_oversize_symbol_list_is_truncated() {
        let long = "ABCDE,FGHIJ,KLMNO,PQRST,UVWXY,ZABCD,EFGHI,JKLMN,OPQRS,TUVWX,YZABC";
        let script = vec![Event::OpenPortal, Event::Submit("key", long), Event::Connect];
        let mut coordinator = coordinator(FakeNetwork::new(script), MemoryKvStore::new());

        assert_eq!(block_on(coordinator.run()), Outcome::Connected);
        let symbols = coordinator.config().symbol_list();
        assert!(symbols.len() <= 54);
        assert!(long.starts_with(symbols));
        assert!(coordinator.config().symbols().all(|symbol| symbol.len() == 5));
    }

    #[test]
    fn test_success_wins_over_timeout_in_same_cycle() {
        let script = vec![Event::OpenPortal, Event::Nothing, Event::ConnectAndTimeOut];
        let mut coordinator = coordinator(FakeNetwork::new(script), MemoryKvStore::new());

        assert_eq!(block_on(coordinator.run()), Outcome::Connected);
        assert_eq!(coordinator.state(), ProvisioningState::ConnectSucceeded);

        let (_, _, display, _) = coordinator.into_parts();
        assert_eq!(display.renderer().count(&timed_out()), 0);
    }

    #[test]
    fn test_timeout_raised_with_connect_is_not_left_latched() {
        let script = vec![Event::OpenPortal, Event::ConnectAndTimeOut];
        let mut coordinator = coordinator(FakeNetwork::new(script), MemoryKvStore::new());

        assert_eq!(block_on(coordinator.run()), Outcome::Connected);
        let signals = coordinator.signals();
        assert!(!signals.portal_timed_out.is_raised());
        assert!(!signals.portal_started.is_raised());
        assert!(!signals.config_submitted.is_raised());
    }

    #[test]
    fn test_second_run_ignores_stale_latches_and_keeps_fields() {
        let script = vec![Event::Connect];
        let mut coordinator = coordinator(FakeNetwork::new(script), saved_store("abc123", "AAPL"));
        assert_eq!(block_on(coordinator.run()), Outcome::Connected);

        coordinator.signals().portal_timed_out.raise();
        coordinator.signals().config_submitted.raise();
        assert_eq!(block_on(coordinator.run()), Outcome::Connected);

        let (network, store, display, _) = coordinator.into_parts();
        assert_eq!(network.fields.len(), 2, "fields registered once");
        assert_eq!(store.store().commit_count(), 1, "stale submission not persisted");
        assert_eq!(display.renderer().count(&timed_out()), 0);
    }

    #[test]
    fn test_unavailable_store_still_connects() {
        let mut store = MemoryKvStore::new();
        store.set_available(false);
        let script = vec![Event::OpenPortal, Event::Submit("key", "AAPL"), Event::Connect];
        let mut coordinator = coordinator(FakeNetwork::new(script), store);

        assert_eq!(block_on(coordinator.run()), Outcome::Connected);
        assert_eq!(coordinator.config(), &ConfigParameters::new("key", "AAPL"));
    }

    #[test]
    fn test_connected_message_uses_network_and_symbols() {
        let mut coordinator = coordinator(FakeNetwork::saved_network(), saved_store("abc123", "AAPL"));
        block_on(coordinator.run());
        assert_eq!(
            coordinator.connected_message().text(),
            "Connected to home - tracking AAPL"
        );
    }
}
