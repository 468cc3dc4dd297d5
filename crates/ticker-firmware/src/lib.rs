//! ESP32-S3 firmware-specific modules for ticker-rs
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: the radio-backed network manager, the configuration portal's
//! HTTP, DHCP and DNS tasks, the embassy clock and the build-time settings.

#![no_std]

extern crate alloc;

pub mod captive;
pub mod clock;
pub mod portal_server;
pub mod settings;
pub mod wifi;
