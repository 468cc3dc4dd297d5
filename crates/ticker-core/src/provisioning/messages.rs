//! Status texts shown while provisioning.

use super::ProvisioningSettings;
use crate::config::ConfigParameters;
use crate::display::StatusMessage;
use crate::network::NetworkInfo;

pub fn connecting(settings: &ProvisioningSettings) -> StatusMessage {
    StatusMessage::new("Connecting to WiFi...").with_speed(settings.scroll_speed_ms)
}

pub fn portal_instructions(settings: &ProvisioningSettings) -> StatusMessage {
    StatusMessage::format(format_args!(
        "Join WiFi \"{}\" and open http://{} to configure",
        settings.portal_ssid, settings.portal_address
    ))
    .with_speed(settings.scroll_speed_ms)
}

pub fn timed_out(settings: &ProvisioningSettings) -> StatusMessage {
    StatusMessage::new("Configuration timed out - reset to retry")
        .with_speed(settings.scroll_speed_ms)
}

pub fn settings_cleared(settings: &ProvisioningSettings) -> StatusMessage {
    StatusMessage::new("Settings cleared - reset to reconfigure")
        .with_speed(settings.scroll_speed_ms)
}

pub fn connected(
    settings: &ProvisioningSettings,
    info: Option<&NetworkInfo>,
    config: &ConfigParameters,
) -> StatusMessage {
    let ssid = info.map(|info| info.ssid.as_str()).unwrap_or("WiFi");
    let message = if config.symbol_list().is_empty() {
        StatusMessage::format(format_args!("Connected to {} - no symbols set", ssid))
    } else {
        StatusMessage::format(format_args!(
            "Connected to {} - tracking {}",
            ssid,
            config.symbol_list()
        ))
    };
    message.with_speed(settings.scroll_speed_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructions_name_network_and_address() {
        let message = portal_instructions(&ProvisioningSettings::default());
        assert_eq!(
            message.text(),
            "Join WiFi \"StockTicker\" and open http://192.168.4.1 to configure"
        );
        assert!(message.text().is_ascii());
    }

    #[test]
    fn test_connected_mentions_symbols() {
        let settings = ProvisioningSettings::default();
        let config = ConfigParameters::new("abc123", "AAPL,AMZN");
        let info = NetworkInfo::new("home");

        let message = connected(&settings, Some(&info), &config);
        assert_eq!(message.text(), "Connected to home - tracking AAPL,AMZN");

        let empty = connected(&settings, None, &ConfigParameters::default());
        assert_eq!(empty.text(), "Connected to WiFi - no symbols set");
    }
}
