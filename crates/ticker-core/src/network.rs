//! Network subsystem interface
//!
//! A [`NetworkManager`] owns the radio: it tries the saved network, falls back
//! to a configuration portal, and reports portal activity by raising
//! [`ProvisioningSignals`]. Every method is non-blocking; progress only happens
//! inside [`NetworkManager::poll`].

use core::fmt;
use heapless::String;

use crate::config::{ConfigParameters, FieldId, copy_bounded};
use crate::signals::ProvisioningSignals;

/// Capacity of a portal field value before it is fitted to its target field
pub const PORTAL_VALUE_CAPACITY: usize = 64;

/// Maximum SSID length defined by 802.11
pub const SSID_CAPACITY: usize = 32;

/// Maximum WPA2 passphrase length
pub const PASSWORD_CAPACITY: usize = 64;

/// Result of a single non-blocking poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Still working; call `poll` again next cycle.
    Pending,
    /// Joined a network and obtained an address.
    Connected,
}

/// A user-editable field exposed through the configuration portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalField {
    pub id: FieldId,
    pub label: &'static str,
    pub value: String<PORTAL_VALUE_CAPACITY>,
    pub capacity: usize,
}

impl PortalField {
    /// Field seeded with the current value from `config`.
    pub fn seeded(id: FieldId, config: &ConfigParameters) -> Self {
        let mut value = String::new();
        copy_bounded(&mut value, config.field(id));
        Self {
            id,
            label: id.label(),
            value,
            capacity: id.capacity(),
        }
    }
}

/// How the connection attempt and the portal fallback should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions<'a> {
    /// Name of the access point the portal is served from
    pub portal_ssid: &'a str,
    /// Address users open to reach the portal
    pub portal_address: &'a str,
    /// How long the portal waits for configuration once it is open
    pub portal_timeout_secs: u32,
}

/// Identity of the joined network, for logging and status text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ssid: String<SSID_CAPACITY>,
    pub rssi: Option<i8>,
    pub address: Option<[u8; 4]>,
}

impl NetworkInfo {
    pub fn new(ssid: &str) -> Self {
        let mut bounded = String::new();
        copy_bounded(&mut bounded, ssid);
        Self {
            ssid: bounded,
            rssi: None,
            address: None,
        }
    }

    pub fn with_rssi(mut self, rssi: i8) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn with_address(mut self, address: [u8; 4]) -> Self {
        self.address = Some(address);
        self
    }
}

impl fmt::Display for NetworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ssid=\"{}\"", self.ssid)?;
        if let Some(rssi) = self.rssi {
            write!(f, " rssi={}dBm", rssi)?;
        }
        if let Some([a, b, c, d]) = self.address {
            write!(f, " ip={}.{}.{}.{}", a, b, c, d)?;
        }
        Ok(())
    }
}

/// Parse a dotted-quad IPv4 address such as `192.168.4.1`.
pub fn parse_ipv4(text: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = text.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    parts.next().is_none().then_some(octets)
}

/// The network subsystem as seen by the provisioning coordinator.
pub trait NetworkManager {
    /// Register a field to show in the configuration portal.
    fn add_field(&mut self, field: PortalField);

    /// Start a non-blocking attempt with the saved credentials.
    ///
    /// Returns [`PollStatus::Connected`] only if the saved network was joined
    /// synchronously.
    fn begin(&mut self, options: &ConnectOptions<'_>, signals: &ProvisioningSignals)
    -> PollStatus;

    /// Advance the connection state machine by one step.
    fn poll(&mut self, signals: &ProvisioningSignals) -> PollStatus;

    /// Current value of a registered field, as last edited in the portal.
    fn field_value(&self, id: FieldId) -> Option<&str>;

    /// Identity of the joined network, once connected.
    fn network_info(&self) -> Option<NetworkInfo>;

    /// Forget the saved network credentials.
    fn erase_credentials(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_seeded_field_carries_current_value_and_capacity() {
        let config = ConfigParameters::new("abc123", "AAPL,AMZN");
        let field = PortalField::seeded(FieldId::SymbolList, &config);

        assert_eq!(field.value.as_str(), "AAPL,AMZN");
        assert_eq!(field.capacity, 54);
        assert_eq!(field.label, FieldId::SymbolList.label());
    }

    #[test]
    fn test_network_info_display() {
        let info = NetworkInfo::new("home")
            .with_rssi(-61)
            .with_address([192, 168, 1, 40]);
        assert_eq!(
            format!("{}", info),
            "ssid=\"home\" rssi=-61dBm ip=192.168.1.40"
        );
        assert_eq!(format!("{}", NetworkInfo::new("x")), "ssid=\"x\"");
    }

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4("192.168.4.1"), Some([192, 168, 4, 1]));
        assert_eq!(parse_ipv4("10.0.0.254"), Some([10, 0, 0, 254]));

        assert_eq!(parse_ipv4("192.168.4"), None);
        assert_eq!(parse_ipv4("192.168.4.1.7"), None);
        assert_eq!(parse_ipv4("192.168.4.256"), None);
        assert_eq!(parse_ipv4("192.168..1"), None);
        assert_eq!(parse_ipv4("192.168.4.+1"), None);
        assert_eq!(parse_ipv4("portal.local"), None);
    }
}
