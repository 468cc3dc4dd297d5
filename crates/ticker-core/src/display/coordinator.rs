//! Status display coordinator
//!
//! Keeps a [`ScrollDisplay`] busy with whatever message the caller supplies.
//! Every call is a single non-blocking step except [`StatusDisplay::show_once`]
//! and [`StatusDisplay::finish_cycle`], which wait for the renderer but yield
//! to the executor on every frame while doing so.

use embassy_futures::yield_now;
use log::debug;

use super::{ScrollDisplay, StatusMessage};

pub struct StatusDisplay<R> {
    renderer: R,
    in_flight: bool,
}

impl<R> StatusDisplay<R>
where
    R: ScrollDisplay,
{
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            in_flight: false,
        }
    }

    /// Advance the renderer one frame; restart `message` if the last cycle finished.
    ///
    /// Returns `true` when a new animation cycle was started.
    pub fn cycle(&mut self, message: &StatusMessage) -> bool {
        if !self.renderer.animate() {
            return false;
        }
        self.submit(message);
        true
    }

    /// Blank the panel and forget the animation in flight.
    pub fn clear(&mut self) {
        self.renderer.clear();
        self.in_flight = false;
    }

    /// Wait for the animation in flight to finish.
    pub async fn finish_cycle(&mut self) {
        while !self.renderer.animate() {
            yield_now().await;
        }
        self.in_flight = false;
    }

    /// Finish the current cycle, then play `message` through exactly once.
    pub async fn show_once(&mut self, message: &StatusMessage) {
        self.finish_cycle().await;
        debug!(" Showing once: {}", message);
        self.submit(message);
        self.finish_cycle().await;
    }

    /// Loop `message` forever.
    pub async fn hold(&mut self, message: &StatusMessage) -> ! {
        loop {
            self.cycle(message);
            yield_now().await;
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn into_inner(self) -> R {
        self.renderer
    }

    fn submit(&mut self, message: &StatusMessage) {
        self.renderer.display_text(
            message.text(),
            message.align,
            message.speed_ms,
            message.pause_ms,
            message.effect_in,
            message.effect_out,
        );
        self.in_flight = true;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::display::{ScrollEffect, TextAlign};
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;
    use embassy_futures::block_on;

    /// Renderer fake whose animations last a fixed number of frames.
    pub(crate) struct RecordingDisplay {
        pub frames_per_cycle: u32,
        pub remaining: u32,
        pub shown: Vec<String>,
        pub clears: usize,
        speed: u32,
    }

    impl RecordingDisplay {
        pub fn new(frames_per_cycle: u32) -> Self {
            Self {
                frames_per_cycle,
                remaining: 0,
                shown: Vec::new(),
                clears: 0,
                speed: 0,
            }
        }

        pub fn count(&self, text: &str) -> usize {
            self.shown.iter().filter(|shown| shown.as_str() == text).count()
        }
    }

    impl ScrollDisplay for RecordingDisplay {
        fn animate(&mut self) -> bool {
            if self.remaining == 0 {
                return true;
            }
            self.remaining -= 1;
            false
        }

        fn display_text(
            &mut self,
            text: &str,
            _align: TextAlign,
            speed_ms: u32,
            _pause_ms: u32,
            _effect_in: ScrollEffect,
            _effect_out: ScrollEffect,
        ) {
            self.shown.push(text.to_string());
            self.speed = speed_ms;
            self.remaining = self.frames_per_cycle;
        }

        fn clear(&mut self) {
            self.clears += 1;
            self.remaining = 0;
        }

        fn speed(&self) -> u32 {
            self.speed
        }
    }

    #[test]
    fn test_cycle_restarts_only_when_idle() {
        let mut display = StatusDisplay::new(RecordingDisplay::new(2));
        let message = StatusMessage::new("hello");

        assert!(display.cycle(&message), "idle renderer starts immediately");
        assert!(display.in_flight());
        assert!(!display.cycle(&message));
        assert!(!display.cycle(&message));
        assert!(display.cycle(&message));

        assert_eq!(display.renderer().count("hello"), 2);
        assert_eq!(display.renderer().speed(), 20);
    }

    #[test]
    fn test_show_once_waits_for_in_flight_cycle() {
        let mut display = StatusDisplay::new(RecordingDisplay::new(3));
        display.cycle(&StatusMessage::new("before"));

        block_on(display.show_once(&StatusMessage::new("final")));

        let renderer = display.renderer();
        assert_eq!(renderer.shown, ["before", "final"]);
        assert_eq!(renderer.remaining, 0, "final message played to completion");
        assert!(!display.in_flight());
    }

    #[test]
    fn test_clear_resets_in_flight() {
        let mut display = StatusDisplay::new(RecordingDisplay::new(5));
        display.cycle(&StatusMessage::new("x"));
        display.clear();

        assert!(!display.in_flight());
        assert_eq!(display.renderer().clears, 1);
        assert!(display.cycle(&StatusMessage::new("y")));
    }
}
