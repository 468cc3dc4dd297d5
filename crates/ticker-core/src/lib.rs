//! Hardware-independent core library for ticker-rs
//!
//! This crate contains all platform-agnostic logic for the LED matrix stock
//! ticker: the configuration model and its persistence, the network
//! provisioning state machine, the configuration portal form handling, and
//! the status display stack down to the MAX7219 driver.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod captive;
pub mod config;
pub mod display;
pub mod network;
pub mod portal;
pub mod provisioning;
pub mod signals;
pub mod storage;
pub mod time;
