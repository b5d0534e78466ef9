//! Bit-plane encoding of pixel data for Binary Code Modulation.
//!
//! A HUB75 panel selects one row address at a time and lights two physical
//! rows through it: row `r` in the upper half and row `r + NROWS` in the lower
//! half. For every column the controller shifts in one [`Entry`] carrying the
//! six colour bits R1 G1 B1 (upper) and R2 G2 B2 (lower).
//!
//! With BCM the intensity of each channel is split into its bits. A
//! [`BitPlane`] holds one significance for one row address, and is what a
//! single transport burst shifts out. A [`BitPlaneSet`] holds the
//! `NROWS × BITS` planes of a complete frame.
//!
//! When fewer than eight bits are displayed the low bits of each channel are
//! dropped: plane `b` of a `BITS`-deep set carries channel bit `8 - BITS + b`,
//! so the most significant plane is always the channel MSB.
//!
//! # Memory Layout
//! Entries are one byte each and a plane is `COLS` contiguous bytes, shifted
//! out column 0 first. The byte slice returned by [`BitPlane::as_bytes`] is
//! what the transport receives, and [`BitPlane`] also implements
//! `embedded_dma::ReadBuffer` for transports that hand it to a DMA engine
//! directly.

use bitfield::bitfield;
use embedded_dma::ReadBuffer;
use embedded_graphics::pixelcolor::RgbColor;

use crate::Color;

bitfield! {
    /// 8-bit shift-register word for one column lane.
    ///
    /// The bit layout is as follows:
    /// - Bits 7-6: unused, always zero
    /// - Bit 5: Blue channel for the lower row
    /// - Bit 4: Green channel for the lower row
    /// - Bit 3: Red channel for the lower row
    /// - Bit 2: Blue channel for the upper row
    /// - Bit 1: Green channel for the upper row
    /// - Bit 0: Red channel for the upper row
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct Entry(u8);
    impl Debug;
    /// Blue, lower row.
    pub blu2, set_blu2: 5;
    /// Green, lower row.
    pub grn2, set_grn2: 4;
    /// Red, lower row.
    pub red2, set_red2: 3;
    /// Blue, upper row.
    pub blu1, set_blu1: 2;
    /// Green, upper row.
    pub grn1, set_grn1: 1;
    /// Red, upper row.
    pub red1, set_red1: 0;
}

impl Entry {
    /// An entry with every LED off.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Wrap a raw word, e.g. one captured from a burst.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw word as it is shifted out.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build the word for channel bit `shift` of an upper and a lower pixel.
    #[must_use]
    pub fn from_pixels(upper: Color, lower: Color, shift: usize) -> Self {
        let bit = |value: u8| (value >> shift) & 1 == 1;
        let mut entry = Self::new();
        entry.set_upper(bit(upper.r()), bit(upper.g()), bit(upper.b()));
        entry.set_lower(bit(lower.r()), bit(lower.g()), bit(lower.b()));
        entry
    }

    fn set_upper(&mut self, r: bool, g: bool, b: bool) {
        self.set_red1(r);
        self.set_grn1(g);
        self.set_blu1(b);
    }

    fn set_lower(&mut self, r: bool, g: bool, b: bool) {
        self.set_red2(r);
        self.set_grn2(g);
        self.set_blu2(b);
    }

    /// `(r, g, b)` lane bits of the upper row.
    #[must_use]
    pub fn upper(&self) -> (bool, bool, bool) {
        (self.red1(), self.grn1(), self.blu1())
    }

    /// `(r, g, b)` lane bits of the lower row.
    #[must_use]
    pub fn lower(&self) -> (bool, bool, bool) {
        (self.red2(), self.grn2(), self.blu2())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Entry {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Entry({=u8:#x})", self.0);
    }
}

/// Channel bit carried by plane `plane` of a `bits`-deep encoding.
#[must_use]
pub const fn channel_shift(plane: usize, bits: usize) -> usize {
    8 - bits + plane
}

/// Drop the channel bits a `bits`-deep encoding cannot show.
///
/// The result holds the intensities in `0..2^bits`, which is what
/// [`BitPlaneSet::decode`] returns.
#[must_use]
pub fn truncate(color: Color, bits: usize) -> Color {
    let shift = 8 - bits;
    Color::new(color.r() >> shift, color.g() >> shift, color.b() >> shift)
}

/// The words shifted out for one `(row, bit)` pair.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct BitPlane<const COLS: usize> {
    entries: [Entry; COLS],
}

impl<const COLS: usize> BitPlane<COLS> {
    /// A blank plane.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [Entry::new(); COLS],
        }
    }

    /// # Panics
    /// If `col >= COLS`.
    #[must_use]
    pub fn entry(&self, col: usize) -> Entry {
        self.entries[col]
    }

    /// All entries in shift order.
    #[must_use]
    pub fn entries(&self) -> &[Entry; COLS] {
        &self.entries
    }

    /// The plane as the byte sequence handed to the transport.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `Entry` is `repr(transparent)` over `u8` and the array is
        // contiguous, so the plane is exactly `COLS` initialised bytes.
        unsafe { core::slice::from_raw_parts(self.entries.as_ptr().cast::<u8>(), COLS) }
    }

    fn encode(&mut self, upper: &[Color; COLS], lower: &[Color; COLS], shift: usize) {
        for ((entry, &u), &l) in self.entries.iter_mut().zip(upper).zip(lower) {
            *entry = Entry::from_pixels(u, l, shift);
        }
    }
}

impl<const COLS: usize> Default for BitPlane<COLS> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<const COLS: usize> ReadBuffer for BitPlane<COLS> {
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        let bytes = self.as_bytes();
        (bytes.as_ptr(), bytes.len())
    }
}

/// Every bit-plane of one frame, indexed `[row][bit]`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(C)]
pub struct BitPlaneSet<const COLS: usize, const NROWS: usize, const BITS: usize> {
    planes: [[BitPlane<COLS>; BITS]; NROWS],
}

impl<const COLS: usize, const NROWS: usize, const BITS: usize> BitPlaneSet<COLS, NROWS, BITS> {
    /// A set that displays black.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            planes: [[BitPlane::new(); BITS]; NROWS],
        }
    }

    /// The plane shifted out for `row` at significance `bit`.
    ///
    /// # Panics
    /// If `row >= NROWS` or `bit >= BITS`.
    #[must_use]
    pub fn plane(&self, row: usize, bit: usize) -> &BitPlane<COLS> {
        &self.planes[row][bit]
    }

    /// Encode row address `row` from its upper and lower pixel rows into all
    /// `BITS` planes.
    ///
    /// # Panics
    /// If `row >= NROWS`.
    pub fn encode_row(&mut self, row: usize, upper: &[Color; COLS], lower: &[Color; COLS]) {
        for (bit, plane) in self.planes[row].iter_mut().enumerate() {
            plane.encode(upper, lower, channel_shift(bit, BITS));
        }
    }

    /// Encode a complete frame given as upper and lower halves.
    pub fn encode_all(&mut self, upper: &[[Color; COLS]; NROWS], lower: &[[Color; COLS]; NROWS]) {
        for (row, (u, l)) in upper.iter().zip(lower).enumerate() {
            self.encode_row(row, u, l);
        }
    }

    /// Reassemble pixel `(x, y)` from the planes.
    ///
    /// The result carries the `BITS`-deep intensities (see [`truncate`]), not
    /// the original eight bit values.
    ///
    /// # Panics
    /// If `x >= COLS` or `y >= 2 * NROWS`.
    #[must_use]
    pub fn decode(&self, x: usize, y: usize) -> Color {
        let (row, lower) = if y < NROWS { (y, false) } else { (y - NROWS, true) };
        let (mut r, mut g, mut b) = (0u8, 0u8, 0u8);
        for (bit, plane) in self.planes[row].iter().enumerate() {
            let entry = plane.entry(x);
            let (lr, lg, lb) = if lower { entry.lower() } else { entry.upper() };
            r |= u8::from(lr) << bit;
            g |= u8::from(lg) << bit;
            b |= u8::from(lb) << bit;
        }
        Color::new(r, g, b)
    }
}

impl<const COLS: usize, const NROWS: usize, const BITS: usize> Default
    for BitPlaneSet<COLS, NROWS, BITS>
{
    fn default() -> Self {
        Self::new()
    }
}
