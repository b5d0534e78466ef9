//! Pixel buffer, double-buffered bit-planes and the swap handshake.
//!
//! Two [`BitPlaneSet`]s exist. The refresh engine only ever reads the *front*
//! set; the foreground only ever writes the *back* set. Publishing a frame
//! means encoding the changed rows into the back set and raising
//! `swap_requested`. The engine flips the front index the next time its
//! cursor wraps to `(0, 0)` and then lowers the flag, so the flag is only set
//! by the foreground and only cleared by the engine.
//!
//! Each set keeps its own dirty mask. An edit marks its row address dirty in
//! both, so a set that was on screen while rows changed is brought up to date
//! the next time it becomes the back set.

use core::cell::UnsafeCell;
use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::{OriginDimensions, Point, Size};
use embedded_graphics::Pixel;

use crate::bitplane::BitPlaneSet;
use crate::{Color, FrameBufferOperations};

/// State shared between the foreground and the refresh engine.
pub(crate) struct Planes<const COLS: usize, const NROWS: usize, const BITS: usize> {
    sets: [UnsafeCell<BitPlaneSet<COLS, NROWS, BITS>>; 2],
    front: AtomicU8,
    swap_requested: AtomicBool,
    running: AtomicBool,
    full_refreshes: AtomicU32,
    brightness: AtomicU8,
}

// SAFETY: the front set is only read by the engine and the back set only
// written by the foreground. Ownership of a set changes hands through the
// `swap_requested` handshake with release/acquire ordering.
unsafe impl<const COLS: usize, const NROWS: usize, const BITS: usize> Sync
    for Planes<COLS, NROWS, BITS>
{
}

impl<const COLS: usize, const NROWS: usize, const BITS: usize> Planes<COLS, NROWS, BITS> {
    pub(crate) const fn new(brightness: u8) -> Self {
        Self {
            sets: [
                UnsafeCell::new(BitPlaneSet::new()),
                UnsafeCell::new(BitPlaneSet::new()),
            ],
            front: AtomicU8::new(0),
            swap_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
            full_refreshes: AtomicU32::new(0),
            brightness: AtomicU8::new(brightness),
        }
    }

    fn front_index(&self) -> usize {
        usize::from(self.front.load(Ordering::Acquire))
    }

    /// The set currently on screen. Engine side only.
    pub(crate) fn front(&self) -> &BitPlaneSet<COLS, NROWS, BITS> {
        // SAFETY: the foreground never writes the front set.
        unsafe { &*self.sets[self.front_index()].get() }
    }

    /// Flip front and back if the foreground asked for it. Engine side only,
    /// and only at the `(0, 0)` cycle boundary.
    pub(crate) fn swap_if_requested(&self) -> bool {
        if !self.swap_requested.load(Ordering::Acquire) {
            return false;
        }
        let front = self.front.load(Ordering::Relaxed);
        self.front.store(front ^ 1, Ordering::Release);
        self.swap_requested.store(false, Ordering::Release);
        true
    }

    pub(crate) fn swap_pending(&self) -> bool {
        self.swap_requested.load(Ordering::Acquire)
    }

    fn request_swap(&self) {
        self.swap_requested.store(true, Ordering::Release);
    }

    pub(crate) fn set_running(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn full_refreshes(&self) -> u32 {
        self.full_refreshes.load(Ordering::Relaxed)
    }

    /// Engine side only; a plain load/store pair keeps this usable on cores
    /// without atomic read-modify-write.
    pub(crate) fn count_full_refresh(&self) -> u32 {
        let count = self.full_refreshes.load(Ordering::Relaxed).wrapping_add(1);
        self.full_refreshes.store(count, Ordering::Relaxed);
        count
    }

    pub(crate) fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::Relaxed)
    }

    pub(crate) fn set_brightness(&self, brightness: u8) {
        self.brightness.store(brightness, Ordering::Relaxed);
    }

    /// Encode `canvas` into the back set and request the swap.
    ///
    /// # Safety
    /// The caller must be the only writer of the back set and the engine must
    /// not perform a swap while this runs: either no swap is pending, or the
    /// engine cannot run concurrently.
    unsafe fn publish(&self, canvas: &mut Canvas<COLS, NROWS>) {
        let back = self.front_index() ^ 1;
        let set = &mut *self.sets[back].get();
        canvas.encode_dirty(back, set);
        self.request_swap();
    }

    /// Publish with exclusive access to the device.
    pub(crate) fn publish_exclusive(&mut self, canvas: &mut Canvas<COLS, NROWS>) {
        // SAFETY: `&mut self` rules out a concurrent engine.
        unsafe { self.publish(canvas) }
    }

    /// Publish from the foreground while the engine may be running.
    pub(crate) fn publish_shared(&self, canvas: &mut Canvas<COLS, NROWS>) {
        // The back set of a pending swap becomes the front at any moment
        // while the engine runs; wait until it has.
        while self.swap_pending() && self.is_running() {
            core::hint::spin_loop();
        }
        // SAFETY: no swap is pending, or the engine is not running and the
        // pending swap is left for `start`.
        unsafe { self.publish(canvas) }
    }

    #[cfg(test)]
    pub(crate) fn set(&self, index: usize) -> &BitPlaneSet<COLS, NROWS, BITS> {
        // SAFETY: tests only inspect sets while nothing writes them.
        unsafe { &*self.sets[index].get() }
    }

    #[cfg(test)]
    pub(crate) fn back(&self) -> &BitPlaneSet<COLS, NROWS, BITS> {
        self.set(self.front_index() ^ 1)
    }
}

/// The pixels being edited, split into the upper and lower halves that share
/// a row address.
pub(crate) struct Canvas<const COLS: usize, const NROWS: usize> {
    upper: [[Color; COLS]; NROWS],
    lower: [[Color; COLS]; NROWS],
    dirty: [u32; 2],
}

impl<const COLS: usize, const NROWS: usize> Canvas<COLS, NROWS> {
    pub(crate) const fn new() -> Self {
        Self {
            upper: [[Color::BLACK; COLS]; NROWS],
            lower: [[Color::BLACK; COLS]; NROWS],
            dirty: [0; 2],
        }
    }

    const fn all_rows() -> u32 {
        if NROWS >= 32 {
            u32::MAX
        } else {
            (1u32 << NROWS) - 1
        }
    }

    /// Out of range points are ignored.
    pub(crate) fn set_pixel(&mut self, p: Point, color: Color) {
        if p.x < 0 || p.y < 0 {
            return;
        }
        let (x, y) = (p.x as usize, p.y as usize);
        if x >= COLS || y >= 2 * NROWS {
            return;
        }
        let row = if y < NROWS {
            &mut self.upper[y]
        } else {
            &mut self.lower[y - NROWS]
        };
        if row[x] == color {
            return;
        }
        row[x] = color;
        let mask = 1u32 << (y % NROWS);
        self.dirty[0] |= mask;
        self.dirty[1] |= mask;
    }

    pub(crate) fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x >= COLS {
            return None;
        }
        if y < NROWS {
            Some(self.upper[y][x])
        } else {
            self.lower.get(y - NROWS).map(|row| row[x])
        }
    }

    pub(crate) fn fill(&mut self, color: Color) {
        for row in self.upper.iter_mut().chain(self.lower.iter_mut()) {
            row.fill(color);
        }
        self.dirty = [Self::all_rows(); 2];
    }

    fn encode_dirty<const BITS: usize>(
        &mut self,
        index: usize,
        set: &mut BitPlaneSet<COLS, NROWS, BITS>,
    ) {
        let mut mask = self.dirty[index];
        while mask != 0 {
            let row = mask.trailing_zeros() as usize;
            set.encode_row(row, &self.upper[row], &self.lower[row]);
            mask &= mask - 1;
        }
        self.dirty[index] = 0;
    }

    #[cfg(test)]
    pub(crate) fn dirty(&self, index: usize) -> u32 {
        self.dirty[index]
    }
}

/// Foreground half of a split [`Hub75`](crate::Hub75).
///
/// Edits pixels and publishes frames while the [`Refresher`](crate::Refresher)
/// keeps the panel lit from interrupt context. Draw on it with
/// `embedded-graphics`, then call [`Painter::display`].
pub struct Painter<'a, const COLS: usize, const NROWS: usize, const BITS: usize> {
    canvas: &'a mut Canvas<COLS, NROWS>,
    planes: &'a Planes<COLS, NROWS, BITS>,
}

impl<'a, const COLS: usize, const NROWS: usize, const BITS: usize> Painter<'a, COLS, NROWS, BITS> {
    pub(crate) fn new(
        canvas: &'a mut Canvas<COLS, NROWS>,
        planes: &'a Planes<COLS, NROWS, BITS>,
    ) -> Self {
        Self { canvas, planes }
    }

    /// Set one pixel. Points outside the display are ignored.
    pub fn set_pixel(&mut self, p: Point, color: Color) {
        self.canvas.set_pixel(p, color);
    }

    /// The colour last written at `(x, y)`, if it is on the display.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        self.canvas.pixel(x, y)
    }

    /// Encode the edits since the last call and schedule them for display.
    ///
    /// The new frame replaces the old one as a whole at the start of the next
    /// refresh cycle. If the previous frame has not been picked up yet this
    /// spins until the engine swaps it in.
    pub fn display(&mut self) {
        self.planes.publish_shared(self.canvas);
    }

    /// `true` while a published frame waits for the next cycle boundary.
    #[must_use]
    pub fn is_swap_pending(&self) -> bool {
        self.planes.swap_pending()
    }

    /// Set the global brightness, applied from the next output-enable pulse.
    pub fn set_brightness(&mut self, brightness: u8) {
        self.planes.set_brightness(brightness);
    }

    /// Current global brightness.
    #[must_use]
    pub fn brightness(&self) -> u8 {
        self.planes.brightness()
    }

    /// Complete refresh cycles so far, for frame rate measurement.
    #[must_use]
    pub fn full_refresh_count(&self) -> u32 {
        self.planes.full_refreshes()
    }
}

impl<const COLS: usize, const NROWS: usize, const BITS: usize> OriginDimensions
    for Painter<'_, COLS, NROWS, BITS>
{
    fn size(&self) -> Size {
        Size::new(COLS as u32, (2 * NROWS) as u32)
    }
}

impl<const COLS: usize, const NROWS: usize, const BITS: usize> DrawTarget
    for Painter<'_, COLS, NROWS, BITS>
{
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, color) in pixels {
            self.canvas.set_pixel(p, color);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.canvas.fill(color);
        Ok(())
    }
}

impl<const COLS: usize, const NROWS: usize, const BITS: usize> FrameBufferOperations
    for Painter<'_, COLS, NROWS, BITS>
{
    fn erase(&mut self) {
        self.canvas.fill(Color::BLACK);
    }

    fn set_pixel(&mut self, p: Point, color: Color) {
        self.canvas.set_pixel(p, color);
    }

    fn display(&mut self) {
        Painter::display(self);
    }
}
