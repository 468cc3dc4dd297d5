//! Network services for clients of the portal access point
//!
//! A phone that joins the portal network needs an address before it can load
//! the form, and most operating systems only pop up the sign-in page when
//! every DNS name resolves to the portal. [`DhcpServer`] and [`answer_query`]
//! provide both as pure packet-in, packet-out functions; the firmware wraps
//! them in UDP tasks.

pub mod dhcp;
pub mod dns;

pub use dhcp::DhcpServer;
pub use dns::answer_query;

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet shorter than its headers")]
    Truncated,
    #[error("malformed packet")]
    Malformed,
    #[error("reply buffer too small")]
    ReplyTooSmall,
}
