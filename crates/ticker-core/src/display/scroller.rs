//! Scrolling text engine for single-row LED matrices.
//!
//! [`MatrixScroller`] animates one text at a time across a [`MatrixPanel`]:
//! an entry effect brings the text to its rest position, it dwells for the
//! pause time, and an exit effect takes it off the panel. Each call to
//! [`ScrollDisplay::animate`] renders at most one frame, and only once the
//! frame delay has elapsed on the supplied [`Clock`].

use core::fmt::Debug;
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle, ascii::FONT_5X8};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use heapless::String;
use log::error;

use super::{STATUS_TEXT_CAPACITY, ScrollDisplay, ScrollEffect, TextAlign};
use crate::config::copy_bounded;
use crate::time::Clock;

const FONT: MonoFont<'static> = FONT_5X8;

/// A monochrome pixel matrix whose drawing is buffered until `flush`.
pub trait MatrixPanel: DrawTarget<Color = BinaryColor> {
    /// Push the buffered frame to the hardware.
    fn flush(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Moving toward the rest position
    Entering,
    /// At rest; holds until the given time
    Paused { until_ms: u64 },
    Leaving,
}

pub struct MatrixScroller<P, C> {
    panel: P,
    clock: C,
    text: String<STATUS_TEXT_CAPACITY>,
    phase: Phase,
    /// Left edge of the text, in panel columns
    x: i32,
    rest_x: i32,
    text_width: i32,
    speed_ms: u32,
    pause_ms: u32,
    effect_in: ScrollEffect,
    effect_out: ScrollEffect,
    last_frame_ms: Option<u64>,
    render_failed: bool,
}

impl<P, C> MatrixScroller<P, C>
where
    P: MatrixPanel,
    P::Error: Debug,
    C: Clock,
{
    pub fn new(panel: P, clock: C) -> Self {
        Self {
            panel,
            clock,
            text: String::new(),
            phase: Phase::Idle,
            x: 0,
            rest_x: 0,
            text_width: 0,
            speed_ms: super::DEFAULT_SCROLL_SPEED_MS,
            pause_ms: 0,
            effect_in: ScrollEffect::ScrollLeft,
            effect_out: ScrollEffect::ScrollLeft,
            last_frame_ms: None,
            render_failed: false,
        }
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }

    pub fn into_inner(self) -> P {
        self.panel
    }

    fn panel_width(&self) -> i32 {
        self.panel.bounding_box().size.width as i32
    }

    /// Move one frame forward. Returns `true` once the animation is over.
    fn step(&mut self, now_ms: u64) -> bool {
        match self.phase {
            Phase::Idle => return true,
            Phase::Entering => {
                self.x = match self.effect_in {
                    ScrollEffect::None => self.rest_x,
                    ScrollEffect::ScrollLeft => (self.x - 1).max(self.rest_x),
                    ScrollEffect::ScrollRight => (self.x + 1).min(self.rest_x),
                };
                if self.x == self.rest_x {
                    self.phase = Phase::Paused {
                        until_ms: now_ms + u64::from(self.pause_ms),
                    };
                }
            }
            Phase::Paused { until_ms } => {
                if now_ms >= until_ms {
                    self.phase = Phase::Leaving;
                }
                return false;
            }
            Phase::Leaving => {
                let width = self.panel_width();
                let gone = match self.effect_out {
                    ScrollEffect::None => true,
                    ScrollEffect::ScrollLeft => {
                        self.x -= 1;
                        self.x + self.text_width <= 0
                    }
                    ScrollEffect::ScrollRight => {
                        self.x += 1;
                        self.x >= width
                    }
                };
                if gone {
                    self.phase = Phase::Idle;
                    self.render(false);
                    return true;
                }
            }
        }

        self.render(true);
        false
    }

    fn render(&mut self, with_text: bool) {
        let result = self.draw_frame(with_text);
        match result {
            Ok(()) => self.render_failed = false,
            Err(e) => {
                if !self.render_failed {
                    error!(" Matrix render error: {:?}", e);
                }
                self.render_failed = true;
            }
        }
    }

    fn draw_frame(&mut self, with_text: bool) -> Result<(), P::Error> {
        self.panel.clear(BinaryColor::Off)?;
        if with_text {
            let style = MonoTextStyle::new(&FONT, BinaryColor::On);
            Text::with_baseline(&self.text, Point::new(self.x, 0), style, Baseline::Top)
                .draw(&mut self.panel)?;
        }
        self.panel.flush()
    }
}

impl<P, C> ScrollDisplay for MatrixScroller<P, C>
where
    P: MatrixPanel,
    P::Error: Debug,
    C: Clock,
{
    fn animate(&mut self) -> bool {
        if self.phase == Phase::Idle {
            return true;
        }

        let now = self.clock.now_ms();
        if let Some(last) = self.last_frame_ms
            && now.saturating_sub(last) < u64::from(self.speed_ms)
        {
            return false;
        }
        self.last_frame_ms = Some(now);
        self.step(now)
    }

    fn display_text(
        &mut self,
        text: &str,
        align: TextAlign,
        speed_ms: u32,
        pause_ms: u32,
        effect_in: ScrollEffect,
        effect_out: ScrollEffect,
    ) {
        copy_bounded(&mut self.text, text);

        let char_width = (FONT.character_size.width + FONT.character_spacing) as i32;
        self.text_width = self.text.chars().count() as i32 * char_width;

        let width = self.panel_width();
        let slack = (width - self.text_width).max(0);
        self.rest_x = match align {
            TextAlign::Left => 0,
            TextAlign::Center => slack / 2,
            TextAlign::Right => slack,
        };
        self.x = match effect_in {
            ScrollEffect::None => self.rest_x,
            ScrollEffect::ScrollLeft => width,
            ScrollEffect::ScrollRight => -self.text_width,
        };

        self.speed_ms = speed_ms;
        self.pause_ms = pause_ms;
        self.effect_in = effect_in;
        self.effect_out = effect_out;
        self.phase = Phase::Entering;
        self.last_frame_ms = None;
    }

    fn clear(&mut self) {
        self.phase = Phase::Idle;
        self.text.clear();
        self.render(false);
    }

    fn speed(&self) -> u32 {
        self.speed_ms
    }
}
