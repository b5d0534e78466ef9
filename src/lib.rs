//! Binary Code Modulation refresh engine for HUB75 LED matrix panels.
//!
//! ## HUB75 in brief
//!
//! A HUB75 panel is a chain of shift registers, not a memory. Each clock
//! edge shifts six colour bits in, three for a pixel of the upper half and
//! three for the pixel directly below it in the lower half. Only one row pair
//! is driven at a time.
//!
//! ### Signals
//! - **R1 G1 B1 / R2 G2 B2**: colour data for the upper and lower row of a pair
//! - **CLK**: shift clock
//! - **LAT**: copies the shift registers to the row drivers
//! - **OE**: output enable, active low
//! - **A B C D (E)**: row-pair address
//!
//! ### Colour depth
//! An LED is either on or off. Intensity comes from *Binary Code
//! Modulation*: every row pair is shown once per bit-plane, and plane `b` is
//! lit for `2^b` time units. With `BITS` planes a channel has `2^BITS` levels.
//! See [Batsocks – LED dimming using Binary Code Modulation](https://www.batsocks.co.uk/readme/art_bcm_1.htm).
//!
//! ## This crate
//!
//! [`Hub75`] owns a pixel buffer and two pre-encoded bit-plane sets. Drawing
//! goes through `embedded-graphics` (or [`Hub75::set_pixel`]) and becomes
//! visible on [`Hub75::display`], which encodes the changed rows into the back
//! set. The refresh engine swaps sets only when it wraps to row 0, bit 0, so
//! a refresh cycle always shows one frame.
//!
//! The engine is interrupt driven:
//!
//! 1. a burst shifts the plane for the current `(row, bit)` into the panel,
//! 2. on [transfer complete](Hub75::on_transfer_complete) it latches, selects
//!    the row and lights it for `brightness × oe_scale × 2^bit` timer ticks,
//! 3. on [timer expiry](Hub75::on_timer_expired) it blanks and moves on.
//!
//! All hardware access goes through the [`Transport`] trait, so any MCU with a
//! serial shifter (SPI, SERCOM, PIO, I²S) and a one-shot timer can drive it.
//!
//! ## Example
//! ```rust
//! # use hub75_bcm::transport::Transport;
//! # struct Board;
//! # impl Transport for Board {
//! #     const MAX_COUNTDOWN: u32 = 0xffff;
//! #     fn begin_burst(&mut self, _: &[u8]) {}
//! #     fn arm_one_shot(&mut self, _: u32) {}
//! #     fn set_row_address(&mut self, _: u8) {}
//! #     fn set_latch(&mut self, _: bool) {}
//! #     fn set_output_enable(&mut self, _: bool) {}
//! # }
//! use embedded_graphics::prelude::*;
//! use hub75_bcm::{compute_cols, Color, Config, Hub75};
//!
//! type Display = Hub75<Board, { compute_cols(1) }, 16, 8>;
//!
//! let mut display = Display::new(Config::new(Board).with_oe_scale(3)).unwrap();
//! display.set_pixel(Point::new(5, 5), Color::RED);
//! display.display();
//!
//! let (mut painter, mut refresher) = display.split();
//! refresher.start();
//! // from the interrupt handlers:
//! refresher.on_transfer_complete();
//! refresher.on_timer_expired();
//! // from the main loop:
//! painter.clear(Color::BLACK).unwrap();
//! painter.display();
//! ```
//!
//! ## Available Feature Flags
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the public types and routes the crate's
//! log messages to `defmt`.
//!
//! ### `log` Feature
//! Routes the crate's log messages to the `log` facade. Ignored when `defmt`
//! is enabled.
//!
//! ### `sim` Feature
//! Builds [`sim::SimTransport`], a recording transport for host-side tests,
//! benchmarks and examples.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

#[macro_use]
mod fmt;

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::Point;

pub mod bitplane;
mod device;
pub mod error;
pub mod framebuffer;
pub mod refresh;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod transport;

pub use device::{Config, Hub75};
pub use error::Error;
pub use framebuffer::Painter;
pub use refresh::{Cursor, Refresher, State};
pub use transport::Transport;

/// Color type used in the framebuffer
pub type Color = Rgb888;

/// Width of one panel in pixels.
pub const PANEL_COLS: usize = 32;

/// Height of one panel in pixels.
pub const PANEL_ROWS: usize = 32;

/// Largest number of row addresses a [`Hub75`] supports.
pub const MAX_ROW_ADDRESSES: usize = 32;

/// Largest number of bit-planes.
pub const MAX_BIT_DEPTH: u8 = 8;

/// Computes the COLS value for a chain of `panels` panels
#[must_use]
pub const fn compute_cols(panels: usize) -> usize {
    panels * PANEL_COLS
}

/// Computes the NROWS value from the display height `rows`
///
/// # Arguments
///
/// * `rows` - Total number of rows in the display
///
/// # Returns
///
/// Number of row addresses, each driving an upper and a lower row
#[must_use]
pub const fn compute_rows(rows: usize) -> usize {
    rows / 2
}

/// Trait for all operations a user may want to call on a framebuffer.
pub trait FrameBufferOperations: DrawTarget<Color = Color, Error = core::convert::Infallible> {
    /// Set every pixel to black. Takes effect on the next
    /// [`display`](FrameBufferOperations::display).
    fn erase(&mut self);

    /// Set a pixel in the framebuffer.
    fn set_pixel(&mut self, p: Point, color: Color);

    /// Publish the pixels drawn so far.
    fn display(&mut self);
}
