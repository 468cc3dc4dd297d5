//! DHCP and captive DNS for the portal access point
//!
//! Thin UDP loops around the packet handlers in `ticker_core::captive`.

use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Ipv4Address, Stack};
use log::{debug, info, warn};
use ticker_core::captive::dhcp::{self, DhcpServer};
use ticker_core::captive::dns::{self, answer_query};

const DHCP_BUF: usize = 600;
const DNS_BUF: usize = 512;

#[embassy_executor::task]
pub async fn dhcp_server_task(stack: Stack<'static>, server_ip: [u8; 4]) {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; DHCP_BUF * 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; DHCP_BUF * 2];
    let mut request = [0u8; DHCP_BUF];
    let mut reply = [0u8; dhcp::REPLY_LEN];

    stack.wait_config_up().await;

    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    if let Err(e) = socket.bind(dhcp::SERVER_PORT) {
        warn!("DHCP server bind failed: {:?}", e);
        return;
    }
    info!("Portal DHCP server listening on port {}", dhcp::SERVER_PORT);

    let mut server = DhcpServer::new(server_ip);
    let broadcast = IpEndpoint::new(IpAddress::Ipv4(Ipv4Address::BROADCAST), dhcp::CLIENT_PORT);

    loop {
        let n = match socket.recv_from(&mut request).await {
            Ok((n, _)) => n,
            Err(e) => {
                debug!("DHCP receive failed: {:?}", e);
                continue;
            }
        };

        match server.handle(&request[..n], &mut reply) {
            Ok(Some(len)) => {
                if let Err(e) = socket.send_to(&reply[..len], broadcast).await {
                    warn!("DHCP reply failed: {:?}", e);
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Ignored DHCP packet: {}", e),
        }
    }
}

/// Answers every name with the portal address.
#[embassy_executor::task]
pub async fn dns_server_task(stack: Stack<'static>, portal_ip: [u8; 4]) {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; DNS_BUF * 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; DNS_BUF * 2];
    let mut query = [0u8; DNS_BUF];
    let mut reply = [0u8; DNS_BUF];

    stack.wait_config_up().await;

    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    if let Err(e) = socket.bind(dns::DNS_PORT) {
        warn!("DNS server bind failed: {:?}", e);
        return;
    }
    info!("Portal DNS server listening on port {}", dns::DNS_PORT);

    loop {
        let (n, meta) = match socket.recv_from(&mut query).await {
            Ok(received) => received,
            Err(e) => {
                debug!("DNS receive failed: {:?}", e);
                continue;
            }
        };

        match answer_query(&query[..n], portal_ip, &mut reply) {
            Ok(Some(len)) => {
                if let Err(e) = socket.send_to(&reply[..len], meta).await {
                    debug!("DNS reply failed: {:?}", e);
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Ignored DNS packet: {}", e),
        }
    }
}
