//! Status display
//!
//! The display side of provisioning is split in three: a [`ScrollDisplay`]
//! renderer that animates one text at a time, the [`StatusDisplay`]
//! coordinator that re-submits the current [`StatusMessage`] whenever the
//! renderer finishes a cycle, and the MAX7219 panel driver underneath.

pub mod coordinator;
pub mod max7219;
pub mod scroller;

pub use coordinator::StatusDisplay;
pub use max7219::{Max7219Chain, MatrixError};
pub use scroller::{MatrixPanel, MatrixScroller};

use core::fmt::{self, Write};
use heapless::String;

use crate::portal::TruncatingWriter;

/// Longest status text the display will carry
pub const STATUS_TEXT_CAPACITY: usize = 160;

/// Default delay between scroll frames
pub const DEFAULT_SCROLL_SPEED_MS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// How text enters or leaves the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollEffect {
    /// Appear or vanish in a single frame.
    None,
    /// Move one column left per frame.
    #[default]
    ScrollLeft,
    ScrollRight,
}

/// Text currently selected for the status display, plus how to animate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    text: String<STATUS_TEXT_CAPACITY>,
    pub align: TextAlign,
    pub speed_ms: u32,
    /// Dwell between the entry and exit effects
    pub pause_ms: u32,
    pub effect_in: ScrollEffect,
    pub effect_out: ScrollEffect,
}

impl StatusMessage {
    /// Left-aligned text scrolling left at the default speed.
    pub fn new(text: &str) -> Self {
        let mut message = Self::empty();
        crate::config::copy_bounded(&mut message.text, text);
        message
    }

    /// Build the message from format arguments, truncating at capacity.
    pub fn format(args: fmt::Arguments<'_>) -> Self {
        let mut message = Self::empty();
        // TruncatingWriter never reports an error.
        let _ = TruncatingWriter(&mut message.text).write_fmt(args);
        message
    }

    pub fn with_speed(mut self, speed_ms: u32) -> Self {
        self.speed_ms = speed_ms;
        self
    }

    pub fn with_pause(mut self, pause_ms: u32) -> Self {
        self.pause_ms = pause_ms;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn empty() -> Self {
        Self {
            text: String::new(),
            align: TextAlign::Left,
            speed_ms: DEFAULT_SCROLL_SPEED_MS,
            pause_ms: 0,
            effect_in: ScrollEffect::ScrollLeft,
            effect_out: ScrollEffect::ScrollLeft,
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A non-blocking text animation engine.
pub trait ScrollDisplay {
    /// Advance the current animation by at most one frame.
    ///
    /// Returns `true` when no animation is in flight, either because the last
    /// one finished or because nothing was ever started.
    fn animate(&mut self) -> bool;

    /// Start animating `text`, replacing whatever was in flight.
    fn display_text(
        &mut self,
        text: &str,
        align: TextAlign,
        speed_ms: u32,
        pause_ms: u32,
        effect_in: ScrollEffect,
        effect_out: ScrollEffect,
    );

    /// Blank the panel and drop any animation in flight.
    fn clear(&mut self);

    /// Frame delay of the current animation
    fn speed(&self) -> u32;
}

/// Physical layout of the LED matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixSettings {
    /// Number of chained 8x8 modules
    pub modules: usize,
    /// Brightness, 0 (dimmest) to 15
    pub intensity: u8,
    pub speed_ms: u32,
}

impl Default for MatrixSettings {
    fn default() -> Self {
        Self {
            modules: 16,
            intensity: 1,
            speed_ms: DEFAULT_SCROLL_SPEED_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_defaults_match_status_contract() {
        let message = StatusMessage::new("Connecting");
        assert_eq!(message.align, TextAlign::Left);
        assert_eq!(message.effect_in, ScrollEffect::ScrollLeft);
        assert_eq!(message.effect_out, ScrollEffect::ScrollLeft);
        assert_eq!(message.speed_ms, 20);
    }

    #[test]
    fn test_formatted_message_is_truncated() {
        let long = "x".repeat(400);
        let message = StatusMessage::format(format_args!("head {}", long));
        assert_eq!(message.text().len(), STATUS_TEXT_CAPACITY);
        assert!(message.text().starts_with("head x"));
    }
}
