//! The hardware the refresh engine drives.
//!
//! A [`Transport`] bundles the three things a HUB75 refresh needs: a burst
//! writer that clocks a bit-plane into the panel's shift registers, a one-shot
//! countdown timer that gates the output-enable window, and the plain digital
//! outputs (row address, latch, output enable).
//!
//! Completion of a burst and expiry of the timer are reported back by calling
//! [`Refresher::on_transfer_complete`](crate::Refresher::on_transfer_complete)
//! and [`Refresher::on_timer_expired`](crate::Refresher::on_timer_expired) from
//! the corresponding interrupt handlers, after acknowledging the interrupt.
//! Binding the vectors to those calls is left to the application.

use embedded_hal::digital::{OutputPin, PinState};

/// Hardware capabilities consumed by the refresh engine.
///
/// Every method is called from interrupt context and must not block.
pub trait Transport {
    /// Largest value [`Transport::arm_one_shot`] accepts. Longer output-enable
    /// windows are clamped to this.
    const MAX_COUNTDOWN: u32;

    /// Start shifting `words` into the panel, first byte first.
    ///
    /// Completion must be signalled only after the last bit has left the
    /// shifter, not when the last byte was queued: the latch pulse follows
    /// immediately. The slice belongs to the front bit-plane set and stays
    /// valid and unmodified until completion is signalled, so a DMA backend
    /// may keep its address.
    fn begin_burst(&mut self, words: &[u8]);

    /// Start a non-repeating countdown of `ticks`; its expiry must be
    /// signalled once.
    fn arm_one_shot(&mut self, ticks: u32);

    /// Drive the row-address lines.
    fn set_row_address(&mut self, row: u8);

    /// Drive the latch line.
    fn set_latch(&mut self, high: bool);

    /// Light (`true`) or blank (`false`) the latched row. The panel's OE
    /// input is active low; inverting is up to the implementation.
    fn set_output_enable(&mut self, enabled: bool);
}

/// Row-address lines A, B, C, ... as `N` output pins, least significant first.
///
/// # Example
/// ```rust
/// use core::convert::Infallible;
/// use embedded_hal::digital::{ErrorType, OutputPin};
/// use hub75_bcm::transport::RowAddress;
///
/// #[derive(Default)]
/// struct Pin(bool);
/// impl ErrorType for Pin {
///     type Error = Infallible;
/// }
/// impl OutputPin for Pin {
///     fn set_low(&mut self) -> Result<(), Infallible> {
///         self.0 = false;
///         Ok(())
///     }
///     fn set_high(&mut self) -> Result<(), Infallible> {
///         self.0 = true;
///         Ok(())
///     }
/// }
///
/// let mut address = RowAddress::new([Pin::default(), Pin::default(), Pin::default(), Pin::default()]);
/// address.set(0b1010).unwrap();
/// let [a, b, c, d] = address.release();
/// assert_eq!((a.0, b.0, c.0, d.0), (false, true, false, true));
/// ```
pub struct RowAddress<P, const N: usize> {
    pins: [P; N],
}

impl<P: OutputPin, const N: usize> RowAddress<P, N> {
    /// Take ownership of the address pins, `pins[0]` being line A.
    pub fn new(pins: [P; N]) -> Self {
        Self { pins }
    }

    /// Select `row`. Bits above `N` are ignored.
    ///
    /// # Errors
    /// The first pin error, leaving later lines unchanged.
    pub fn set(&mut self, row: u8) -> Result<(), P::Error> {
        for (line, pin) in self.pins.iter_mut().enumerate() {
            let high = line < 8 && (row >> line) & 1 == 1;
            pin.set_state(PinState::from(high))?;
        }
        Ok(())
    }

    /// Give the pins back.
    pub fn release(self) -> [P; N] {
        self.pins
    }
}
