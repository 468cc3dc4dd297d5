//! Build-time settings
//!
//! Values come from `TICKER_*` variables forwarded by `build.rs`; anything
//! missing or unparsable falls back to the core defaults.

use log::warn;
use ticker_core::display::MatrixSettings;
use ticker_core::network::parse_ipv4;
use ticker_core::provisioning::ProvisioningSettings;

/// Flash sector reserved for the settings record, counted from the end of flash
pub const STORE_SECTOR_SIZE: u32 = 4096;

pub fn provisioning() -> ProvisioningSettings {
    let mut settings = ProvisioningSettings::default();

    if let Some(ssid) = option_env!("TICKER_PORTAL_SSID") {
        settings.portal_ssid = ssid;
    }
    if let Some(address) = option_env!("TICKER_PORTAL_ADDRESS") {
        if parse_ipv4(address).is_some() {
            settings.portal_address = address;
        } else {
            warn!("TICKER_PORTAL_ADDRESS \"{}\" is not an IPv4 address; ignored", address);
        }
    }
    if let Some(secs) = option_env!("TICKER_PORTAL_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.portal_timeout_secs = secs;
    }
    if let Some(speed) = option_env!("TICKER_SCROLL_SPEED_MS").and_then(|v| v.parse().ok()) {
        settings.scroll_speed_ms = speed;
    }

    settings
}

/// Address the access point interface is configured with
pub fn portal_ip(settings: &ProvisioningSettings) -> [u8; 4] {
    parse_ipv4(settings.portal_address)
        .or_else(|| parse_ipv4(ProvisioningSettings::default().portal_address))
        .unwrap_or([192, 168, 4, 1])
}

pub fn matrix() -> MatrixSettings {
    MatrixSettings {
        speed_ms: provisioning().scroll_speed_ms,
        ..MatrixSettings::default()
    }
}
