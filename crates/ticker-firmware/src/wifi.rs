//! Radio-backed network manager
//!
//! Tries the saved station credentials for a fixed window, then opens the
//! configuration portal as an access point alongside the station interface.
//! A portal submission retries the station join with the new credentials,
//! which are persisted only once that join succeeds.

use embassy_executor::Spawner;
use embassy_net::{Ipv4Cidr, Runner, Stack, StackResources, StaticConfigV4};
use esp_hal::rng::Rng;
use esp_radio::wifi::{AccessPointConfig, ClientConfig, ModeConfig, WifiController, WifiDevice};
use heapless::{String, Vec};
use log::{debug, error, info, warn};
use static_cell::StaticCell;
use thiserror_no_std::Error;
use ticker_core::config::{FieldId, copy_bounded};
use ticker_core::network::{
    ConnectOptions, NetworkInfo, NetworkManager, PASSWORD_CAPACITY, PollStatus, PortalField,
    SSID_CAPACITY, parse_ipv4,
};
use ticker_core::portal::PortalSubmission;
use ticker_core::signals::ProvisioningSignals;
use ticker_core::storage::KeyValueStore;
use ticker_core::time::{Clock, PortalDeadline};

use crate::captive::{dhcp_server_task, dns_server_task};
use crate::clock::EmbassyClock;
use crate::portal_server::{PORTAL_FORM, PortalForm, SUBMISSIONS, portal_http_task};

/// Namespace holding the station credentials
pub const WIFI_NAMESPACE: &str = "wifi";

const SSID_KEY: &str = "ssid";
const PASSWORD_KEY: &str = "password";

/// How long one station join may take before it counts as failed
const STATION_ATTEMPT_MS: u64 = 15_000;

#[derive(Error, Debug)]
pub enum WifiSetupError {
    #[error("radio init failed")]
    Radio,
    #[error("WiFi controller init failed")]
    Controller,
    #[error("failed to spawn network task")]
    Spawn,
}

#[derive(Debug, Clone, Default)]
struct Credentials {
    ssid: String<SSID_CAPACITY>,
    password: String<PASSWORD_CAPACITY>,
}

impl Credentials {
    fn new(ssid: &str, password: &str) -> Self {
        let mut credentials = Self::default();
        copy_bounded(&mut credentials.ssid, ssid);
        copy_bounded(&mut credentials.password, password);
        credentials
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_ssid(self.ssid.as_str().into())
            .with_password(self.password.as_str().into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Joining with stored credentials
    Station { since_ms: u64 },
    /// Access point up, waiting for a submission
    Portal,
    /// Joining with credentials from the portal
    Retrying { since_ms: u64 },
    Connected,
    /// Portal timed out; nothing more will happen
    Closed,
}

pub struct EspNetworkManager<S> {
    controller: WifiController<'static>,
    sta_stack: Stack<'static>,
    store: S,
    clock: EmbassyClock,
    fields: Vec<PortalField, 2>,
    portal_ssid: &'static str,
    portal_ip: [u8; 4],
    deadline: PortalDeadline,
    saved: Option<Credentials>,
    pending: Option<Credentials>,
    phase: Phase,
}

/// Bring up the radio, both network stacks and the portal services.
///
/// The access point interface is configured as `portal_ip`/24 and hands out
/// the rest of that subnet over DHCP.
pub fn setup<S>(
    spawner: Spawner,
    wifi: esp_hal::peripherals::WIFI<'static>,
    store: S,
    portal_ip: [u8; 4],
) -> Result<EspNetworkManager<S>, WifiSetupError>
where
    S: KeyValueStore,
{
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    static STA_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    static AP_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

    let radio = RADIO.init(esp_radio::init().map_err(|e| {
        error!("esp_radio::init failed: {:?}", e);
        WifiSetupError::Radio
    })?);
    let (controller, interfaces) =
        esp_radio::wifi::new(radio, wifi, Default::default()).map_err(|e| {
            error!("WiFi controller init failed: {:?}", e);
            WifiSetupError::Controller
        })?;

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (sta_stack, sta_runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        STA_RESOURCES.init(StackResources::new()),
        seed,
    );

    let [a, b, c, d] = portal_ip;
    let ap_config = embassy_net::Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(embassy_net::Ipv4Address::new(a, b, c, d), 24),
        gateway: None,
        dns_servers: Default::default(),
    });
    let (ap_stack, ap_runner) = embassy_net::new(
        interfaces.ap,
        ap_config,
        AP_RESOURCES.init(StackResources::new()),
        seed.rotate_left(17),
    );

    spawner.spawn(net_task(sta_runner)).map_err(|_| WifiSetupError::Spawn)?;
    spawner.spawn(net_task(ap_runner)).map_err(|_| WifiSetupError::Spawn)?;
    spawner
        .spawn(portal_http_task(ap_stack, portal_ip))
        .map_err(|_| WifiSetupError::Spawn)?;
    spawner
        .spawn(dhcp_server_task(ap_stack, portal_ip))
        .map_err(|_| WifiSetupError::Spawn)?;
    spawner
        .spawn(dns_server_task(ap_stack, portal_ip))
        .map_err(|_| WifiSetupError::Spawn)?;

    Ok(EspNetworkManager {
        controller,
        sta_stack,
        store,
        clock: EmbassyClock,
        fields: Vec::new(),
        portal_ssid: "",
        portal_ip,
        deadline: PortalDeadline::from_secs(0),
        saved: None,
        pending: None,
        phase: Phase::Idle,
    })
}

#[embassy_executor::task(pool_size = 2)]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

impl<S> EspNetworkManager<S>
where
    S: KeyValueStore,
{
    fn load_credentials(&mut self) -> Option<Credentials> {
        let ssid = match self.store.read(WIFI_NAMESPACE, SSID_KEY) {
            Ok(Some(ssid)) if !ssid.is_empty() => ssid,
            Ok(_) => return None,
            Err(e) => {
                warn!("Failed to read saved WiFi credentials: {}", e);
                return None;
            }
        };
        let password = self
            .store
            .read(WIFI_NAMESPACE, PASSWORD_KEY)
            .ok()
            .flatten()
            .unwrap_or_default();
        Some(Credentials::new(&ssid, &password))
    }

    fn save_credentials(&mut self, credentials: &Credentials) {
        let result = self
            .store
            .write(WIFI_NAMESPACE, SSID_KEY, &credentials.ssid)
            .and_then(|()| {
                self.store
                    .write(WIFI_NAMESPACE, PASSWORD_KEY, &credentials.password)
            })
            .and_then(|()| self.store.commit());

        match result {
            Ok(()) => info!("Saved WiFi credentials for \"{}\"", credentials.ssid),
            Err(e) => {
                self.store.discard();
                warn!("Failed to save WiFi credentials: {}", e);
            }
        }
    }

    fn join(&mut self, credentials: &Credentials, with_portal: bool) -> bool {
        let mode = if with_portal {
            ModeConfig::ApSta(
                credentials.client_config(),
                AccessPointConfig::default().with_ssid(self.portal_ssid.into()),
            )
        } else {
            ModeConfig::Client(credentials.client_config())
        };

        if let Err(e) = self.controller.set_config(&mode) {
            warn!("WiFi config rejected: {:?}", e);
            return false;
        }
        if !matches!(self.controller.is_started(), Ok(true))
            && let Err(e) = self.controller.start()
        {
            warn!("WiFi start failed: {:?}", e);
            return false;
        }
        info!("Joining \"{}\"", credentials.ssid);
        if let Err(e) = self.controller.connect() {
            warn!("WiFi connect failed: {:?}", e);
            return false;
        }
        true
    }

    fn open_portal(&mut self, signals: &ProvisioningSignals) {
        let mode = ModeConfig::ApSta(
            self.saved
                .as_ref()
                .map(Credentials::client_config)
                .unwrap_or_default(),
            AccessPointConfig::default().with_ssid(self.portal_ssid.into()),
        );
        if let Err(e) = self.controller.set_config(&mode) {
            error!("Portal access point config rejected: {:?}", e);
        }
        if !matches!(self.controller.is_started(), Ok(true))
            && let Err(e) = self.controller.start()
        {
            error!("Portal access point start failed: {:?}", e);
        }

        PORTAL_FORM.lock(|form| {
            form.replace(Some(PortalForm {
                ssid: self.portal_ssid,
                fields: self.fields.clone(),
            }));
        });
        self.deadline.arm(self.clock.now_ms());
        self.phase = Phase::Portal;
        signals.portal_started.raise();
    }

    fn close_portal(&mut self) {
        PORTAL_FORM.lock(|form| form.replace(None));
    }

    fn is_online(&self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.sta_stack.is_config_up()
    }

    fn accept_submission(&mut self, submission: PortalSubmission, signals: &ProvisioningSignals) {
        for field in self.fields.iter_mut() {
            if let Some(value) = submission.field(field.id) {
                copy_bounded(&mut field.value, value);
            }
        }
        signals.config_submitted.raise();

        let credentials = Credentials::new(&submission.ssid, &submission.password);
        if self.join(&credentials, true) {
            self.phase = Phase::Retrying {
                since_ms: self.clock.now_ms(),
            };
            self.pending = Some(credentials);
        }
    }
}

impl<S> NetworkManager for EspNetworkManager<S>
where
    S: KeyValueStore,
{
    fn add_field(&mut self, field: PortalField) {
        if self.fields.push(field).is_err() {
            warn!("Portal field list full; field ignored");
        }
    }

    fn begin(&mut self, options: &ConnectOptions<'_>, signals: &ProvisioningSignals) -> PollStatus {
        self.portal_ssid = options.portal_ssid;
        if parse_ipv4(options.portal_address) != Some(self.portal_ip) {
            let [a, b, c, d] = self.portal_ip;
            warn!(
                "Portal address \"{}\" differs from access point address {}.{}.{}.{}",
                options.portal_address, a, b, c, d
            );
        }
        self.deadline = PortalDeadline::from_secs(options.portal_timeout_secs);
        self.saved = self.load_credentials();

        match self.saved.clone() {
            Some(credentials) if self.join(&credentials, false) => {
                self.phase = Phase::Station {
                    since_ms: self.clock.now_ms(),
                };
            }
            Some(_) => self.open_portal(signals),
            None => {
                info!("No saved WiFi credentials");
                self.open_portal(signals);
            }
        }
        PollStatus::Pending
    }

    fn poll(&mut self, signals: &ProvisioningSignals) -> PollStatus {
        let now = self.clock.now_ms();

        match self.phase {
            Phase::Idle | Phase::Closed => {}
            Phase::Connected => return PollStatus::Connected,
            Phase::Station { since_ms } => {
                if self.is_online() {
                    self.phase = Phase::Connected;
                } else if now.saturating_sub(since_ms) >= STATION_ATTEMPT_MS {
                    warn!("Saved network not reachable; opening configuration portal");
                    if let Err(e) = self.controller.disconnect() {
                        debug!("WiFi disconnect failed: {:?}", e);
                    }
                    self.open_portal(signals);
                }
            }
            Phase::Portal => {
                if let Ok(submission) = SUBMISSIONS.try_receive() {
                    info!("Portal submission for \"{}\"", submission.ssid);
                    self.accept_submission(submission, signals);
                } else if self.deadline.expired(now) {
                    self.phase = Phase::Closed;
                    self.close_portal();
                    if let Err(e) = self.controller.stop() {
                        warn!("Portal access point stop failed: {:?}", e);
                    }
                    signals.portal_timed_out.raise();
                }
            }
            Phase::Retrying { since_ms } => {
                if self.is_online() {
                    if let Some(credentials) = self.pending.clone() {
                        self.save_credentials(&credentials);
                    }
                    self.phase = Phase::Connected;
                } else if now.saturating_sub(since_ms) >= STATION_ATTEMPT_MS {
                    warn!("Submitted network not reachable; portal stays open");
                    self.pending = None;
                    self.phase = Phase::Portal;
                }
            }
        }

        if self.phase == Phase::Connected {
            self.close_portal();
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
        if self.phase != Phase::Connected {
            return None;
        }
        let ssid = self
            .pending
            .as_ref()
            .or(self.saved.as_ref())
            .map(|credentials| credentials.ssid.as_str())
            .unwrap_or("");
        let mut info = NetworkInfo::new(ssid);
        if let Ok(rssi) = self.controller.rssi() {
            info = info.with_rssi(rssi.clamp(i8::MIN as i32, i8::MAX as i32) as i8);
        }
        if let Some(config) = self.sta_stack.config_v4() {
            info = info.with_address(config.address.address().octets());
        }
        Some(info)
    }

    fn erase_credentials(&mut self) {
        let result = self
            .store
            .remove(WIFI_NAMESPACE, SSID_KEY)
            .and_then(|()| self.store.remove(WIFI_NAMESPACE, PASSWORD_KEY))
            .and_then(|()| self.store.commit());
        match result {
            Ok(()) => info!("Erased saved WiFi credentials"),
            Err(e) => {
                self.store.discard();
                warn!("Failed to erase WiFi credentials: {}", e);
            }
        }
        self.saved = None;
        if let Err(e) = self.controller.disconnect() {
            debug!("WiFi disconnect failed: {:?}", e);
        }
    }
}
