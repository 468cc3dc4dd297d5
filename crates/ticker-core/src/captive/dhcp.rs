//! Minimal DHCP server for the portal's /24 network.
//!
//! Hands out addresses to a handful of clients, naming the portal itself as
//! router and DNS server. Leases are never timed out; when the table is full
//! the oldest one is reused.

use heapless::Vec;
use log::{debug, info};

use super::PacketError;

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

/// BOOTP replies are padded to this length
pub const REPLY_LEN: usize = 300;

/// Clients remembered at once
pub const MAX_LEASES: usize = 8;

const LEASE_SECS: u32 = 3600;
const NETMASK: [u8; 4] = [255, 255, 255, 0];
const FIRST_HOST: u8 = 2;
const LAST_HOST: u8 = 254;

const BOOTREQUEST: u8 = 1;
const BOOTREPLY: u8 = 2;
const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const OPTIONS_OFFSET: usize = 240;

mod opt {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const DNS_SERVER: u8 = 6;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const RENEWAL_TIME: u8 = 58;
    pub const REBINDING_TIME: u8 = 59;
    pub const END: u8 = 255;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
}

impl MessageType {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            _ => return None,
        })
    }

    fn code(self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Decline => 4,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Inform => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lease {
    mac: [u8; 6],
    host: u8,
}

/// Fields of a client request the server cares about
struct Request<'a> {
    packet: &'a [u8],
    kind: MessageType,
    mac: [u8; 6],
    requested_ip: Option<[u8; 4]>,
    server_id: Option<[u8; 4]>,
}

impl<'a> Request<'a> {
    fn parse(packet: &'a [u8]) -> Result<Self, PacketError> {
        if packet.len() < OPTIONS_OFFSET {
            return Err(PacketError::Truncated);
        }
        if packet[0] != BOOTREQUEST || packet[2] != 6 || packet[236..240] != MAGIC_COOKIE {
            return Err(PacketError::Malformed);
        }

        let mut kind = None;
        let mut requested_ip = None;
        let mut server_id = None;
        for (code, data) in Options::new(&packet[OPTIONS_OFFSET..]) {
            match (code, data.len()) {
                (opt::MESSAGE_TYPE, 1) => kind = MessageType::from_u8(data[0]),
                (opt::REQUESTED_IP, 4) => requested_ip = Some(ipv4(data)),
                (opt::SERVER_ID, 4) => server_id = Some(ipv4(data)),
                _ => {}
            }
        }

        let mut mac = [0; 6];
        mac.copy_from_slice(&packet[28..34]);
        Ok(Self {
            packet,
            kind: kind.ok_or(PacketError::Malformed)?,
            mac,
            requested_ip,
            server_id,
        })
    }

    fn client_ip(&self) -> Option<[u8; 4]> {
        let ciaddr = ipv4(&self.packet[12..16]);
        self.requested_ip.or((ciaddr != [0; 4]).then_some(ciaddr))
    }
}

/// Walks the TLV option area, stopping at `END` or at a truncated option.
struct Options<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Options<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for Options<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let code = *self.data.get(self.pos)?;
            match code {
                opt::PAD => self.pos += 1,
                opt::END => return None,
                _ => {
                    let len = *self.data.get(self.pos + 1)? as usize;
                    let start = self.pos + 2;
                    let value = self.data.get(start..start + len)?;
                    self.pos = start + len;
                    return Some((code, value));
                }
            }
        }
    }
}

fn ipv4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

pub struct DhcpServer {
    server_ip: [u8; 4],
    leases: Vec<Lease, MAX_LEASES>,
    next_host: u8,
}

impl DhcpServer {
    pub fn new(server_ip: [u8; 4]) -> Self {
        Self {
            server_ip,
            leases: Vec::new(),
            next_host: FIRST_HOST,
        }
    }

    /// Address currently leased to `mac`
    pub fn lease_for(&self, mac: [u8; 6]) -> Option<[u8; 4]> {
        self.leases
            .iter()
            .find(|lease| lease.mac == mac)
            .map(|lease| self.address(lease.host))
    }

    /// Process one request, writing any reply into `reply`.
    ///
    /// Returns the reply length, or `None` when the request needs no answer.
    /// Replies go to the broadcast address on [`CLIENT_PORT`].
    pub fn handle(&mut self, packet: &[u8], reply: &mut [u8]) -> Result<Option<usize>, PacketError> {
        let request = Request::parse(packet)?;
        if reply.len() < REPLY_LEN {
            return Err(PacketError::ReplyTooSmall);
        }

        match request.kind {
            MessageType::Discover => {
                let Some(host) = self.allocate(request.mac) else {
                    return Ok(None);
                };
                debug!("DHCP offer {:?} to {:02x?}", self.address(host), request.mac);
                Ok(Some(self.write_reply(&request, MessageType::Offer, Some(host), reply)))
            }
            MessageType::Request => {
                if request.server_id.is_some_and(|id| id != self.server_ip) {
                    // The client picked another server.
                    self.release(request.mac);
                    return Ok(None);
                }
                let host = self.allocate(request.mac);
                match host {
                    Some(host) if request.client_ip() == Some(self.address(host)) => {
                        info!("DHCP lease {:?} to {:02x?}", self.address(host), request.mac);
                        Ok(Some(self.write_reply(&request, MessageType::Ack, Some(host), reply)))
                    }
                    _ => {
                        debug!("DHCP nak for {:02x?}", request.mac);
                        Ok(Some(self.write_reply(&request, MessageType::Nak, None, reply)))
                    }
                }
            }
            MessageType::Release | MessageType::Decline => {
                self.release(request.mac);
                Ok(None)
            }
            MessageType::Offer | MessageType::Ack | MessageType::Nak | MessageType::Inform => {
                Ok(None)
            }
        }
    }

    fn address(&self, host: u8) -> [u8; 4] {
        let [a, b, c, _] = self.server_ip;
        [a, b, c, host]
    }

    fn allocate(&mut self, mac: [u8; 6]) -> Option<u8> {
        if let Some(lease) = self.leases.iter().find(|lease| lease.mac == mac) {
            return Some(lease.host);
        }
        if self.leases.is_full() {
            let oldest = self.leases.remove(0);
            debug!("DHCP table full; reusing lease of {:02x?}", oldest.mac);
        }

        for _ in FIRST_HOST..=LAST_HOST {
            let host = self.next_host;
            self.next_host = if host >= LAST_HOST { FIRST_HOST } else { host + 1 };
            let taken = host == self.server_ip[3] || self.leases.iter().any(|lease| lease.host == host);
            if !taken {
                self.leases.push(Lease { mac, host }).ok()?;
                return Some(host);
            }
        }
        None
    }

    fn release(&mut self, mac: [u8; 6]) {
        self.leases.retain(|lease| lease.mac != mac);
    }

    fn write_reply(
        &self,
        request: &Request<'_>,
        kind: MessageType,
        host: Option<u8>,
        reply: &mut [u8],
    ) -> usize {
        let packet = request.packet;
        let reply = &mut reply[..REPLY_LEN];
        reply.fill(0);

        reply[0] = BOOTREPLY;
        reply[1] = packet[1];
        reply[2] = packet[2];
        reply[4..8].copy_from_slice(&packet[4..8]);
        reply[10..12].copy_from_slice(&packet[10..12]);
        if let Some(host) = host {
            reply[16..20].copy_from_slice(&self.address(host));
        }
        reply[20..24].copy_from_slice(&self.server_ip);
        reply[24..28].copy_from_slice(&packet[24..28]);
        reply[28..44].copy_from_slice(&packet[28..44]);
        reply[236..240].copy_from_slice(&MAGIC_COOKIE);

        let mut pos = OPTIONS_OFFSET;
        let mut put = |code: u8, value: &[u8]| {
            reply[pos] = code;
            reply[pos + 1] = value.len() as u8;
            reply[pos + 2..pos + 2 + value.len()].copy_from_slice(value);
            pos += 2 + value.len();
        };
        put(opt::MESSAGE_TYPE, &[kind.code()]);
        put(opt::SERVER_ID, &self.server_ip);
        if kind != MessageType::Nak {
            put(opt::LEASE_TIME, &LEASE_SECS.to_be_bytes());
            put(opt::RENEWAL_TIME, &(LEASE_SECS / 2).to_be_bytes());
            put(opt::REBINDING_TIME, &(LEASE_SECS * 7 / 8).to_be_bytes());
            put(opt::SUBNET_MASK, &NETMASK);
            put(opt::ROUTER, &self.server_ip);
            put(opt::DNS_SERVER, &self.server_ip);
        }
        reply[pos] = opt::END;

        REPLY_LEN
    }
}
