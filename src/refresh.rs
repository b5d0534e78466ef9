//! The BCM refresh state machine.
//!
//! The engine walks a [`Cursor`] over every `(row, bit)` pair of the front
//! bit-plane set, bit fastest. Each step is strictly sequential:
//!
//! 1. **Transferring**: the plane for the cursor is being shifted in.
//! 2. On transfer complete: pulse the latch, select the row, arm the one-shot
//!    timer with the plane's weight and light the row. → **Gated**.
//! 3. On timer expiry: blank, advance the cursor, and start the next burst.
//!    → **Transferring**.
//!
//! Shift and display never overlap, so the latched data is always the row
//! being lit. The lit time of plane `b` is `brightness × scale × 2^b` timer
//! ticks, saturating at [`Transport::MAX_COUNTDOWN`].
//!
//! When the cursor wraps back to `(0, 0)` the full refresh counter is bumped
//! and a frame published by the foreground is swapped in, which is the only
//! point where the front set changes.
//!
//! Signals that arrive in the wrong state are dropped after blanking the
//! output, and counted.

use crate::framebuffer::Planes;
use crate::transport::Transport;

/// Engine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// [`Refresher::start`] has not been called.
    Idle,
    /// A burst is in flight for the current cursor.
    Transferring,
    /// The current row is lit and the output-enable timer is running.
    Gated,
}

/// Position of the refresh engine: row address and bit-plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cursor {
    row: u8,
    bit: u8,
}

impl Cursor {
    /// Row 0, bit 0: the start of a refresh cycle.
    pub const ORIGIN: Self = Self { row: 0, bit: 0 };

    /// Row address.
    #[must_use]
    pub const fn row(self) -> usize {
        self.row as usize
    }

    /// Bit-plane index, 0 being the least significant.
    #[must_use]
    pub const fn bit(self) -> usize {
        self.bit as usize
    }

    /// Step to the next pair. Returns `true` when this wrapped back to
    /// [`Cursor::ORIGIN`].
    fn advance(&mut self, rows: usize, bits: usize) -> bool {
        self.bit += 1;
        if usize::from(self.bit) < bits {
            return false;
        }
        self.bit = 0;
        self.row += 1;
        if usize::from(self.row) < rows {
            return false;
        }
        self.row = 0;
        true
    }
}

/// Output-enable window for bit-plane `bit`, in timer ticks.
///
/// `brightness × scale × 2^bit`, clamped to `max` instead of wrapping.
#[must_use]
pub const fn output_enable_ticks(brightness: u8, scale: u32, bit: usize, max: u32) -> u32 {
    let weight = brightness as u64 * scale as u64;
    if weight == 0 {
        return 0;
    }
    if bit >= 32 {
        return max;
    }
    // weight << bit > max exactly when weight > max >> bit
    if weight > (max >> bit) as u64 {
        max
    } else {
        (weight << bit) as u32
    }
}

/// Interrupt-owned state: transport, cursor and the state machine.
pub(crate) struct Engine<T> {
    transport: T,
    cursor: Cursor,
    state: State,
    scale: u32,
    spurious: u32,
}

impl<T: Transport> Engine<T> {
    pub(crate) const fn new(transport: T, scale: u32) -> Self {
        Self {
            transport,
            cursor: Cursor::ORIGIN,
            state: State::Idle,
            scale,
            spurious: 0,
        }
    }

    pub(crate) fn start<const COLS: usize, const NROWS: usize, const BITS: usize>(
        &mut self,
        planes: &Planes<COLS, NROWS, BITS>,
    ) {
        if self.state != State::Idle {
            warn!("refresh already running");
            return;
        }
        planes.swap_if_requested();
        planes.set_running();
        self.cursor = Cursor::ORIGIN;
        self.transport.set_output_enable(false);
        info!("starting refresh: {} rows x {} bits, {} columns", NROWS, BITS, COLS);
        self.begin_burst(planes);
    }

    pub(crate) fn on_transfer_complete<const COLS: usize, const NROWS: usize, const BITS: usize>(
        &mut self,
        planes: &Planes<COLS, NROWS, BITS>,
    ) {
        if self.state != State::Transferring {
            self.spurious_signal();
            return;
        }
        self.transport.set_latch(true);
        self.transport.set_latch(false);
        self.transport.set_row_address(self.cursor.row);
        let ticks = output_enable_ticks(
            planes.brightness(),
            self.scale,
            self.cursor.bit(),
            T::MAX_COUNTDOWN,
        );
        self.transport.arm_one_shot(ticks);
        self.transport.set_output_enable(true);
        self.state = State::Gated;
    }

    pub(crate) fn on_timer_expired<const COLS: usize, const NROWS: usize, const BITS: usize>(
        &mut self,
        planes: &Planes<COLS, NROWS, BITS>,
    ) {
        // Blanking first makes a duplicate expiry harmless.
        self.transport.set_output_enable(false);
        if self.state != State::Gated {
            self.spurious_signal();
            return;
        }
        if self.cursor.advance(NROWS, BITS) {
            let count = planes.count_full_refresh();
            if planes.swap_if_requested() {
                trace!("frame swapped in at refresh {}", count);
            }
        }
        self.begin_burst(planes);
    }

    fn begin_burst<const COLS: usize, const NROWS: usize, const BITS: usize>(
        &mut self,
        planes: &Planes<COLS, NROWS, BITS>,
    ) {
        let plane = planes.front().plane(self.cursor.row(), self.cursor.bit());
        self.transport.begin_burst(plane.as_bytes());
        self.state = State::Transferring;
    }

    fn spurious_signal(&mut self) {
        self.spurious = self.spurious.wrapping_add(1);
        warn!("spurious refresh signal ignored ({} so far)", self.spurious);
    }

    pub(crate) fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn spurious_signals(&self) -> u32 {
        self.spurious
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Interrupt half of a split [`Hub75`](crate::Hub75).
///
/// Call [`Refresher::start`] once the transport is wired up, then forward the
/// two interrupts to [`Refresher::on_transfer_complete`] and
/// [`Refresher::on_timer_expired`]. Both handlers must run at the same
/// priority so neither preempts the other.
pub struct Refresher<'a, T, const COLS: usize, const NROWS: usize, const BITS: usize> {
    engine: &'a mut Engine<T>,
    planes: &'a Planes<COLS, NROWS, BITS>,
}

impl<'a, T: Transport, const COLS: usize, const NROWS: usize, const BITS: usize>
    Refresher<'a, T, COLS, NROWS, BITS>
{
    pub(crate) fn new(engine: &'a mut Engine<T>, planes: &'a Planes<COLS, NROWS, BITS>) -> Self {
        Self { engine, planes }
    }

    /// Begin refreshing from row 0, bit 0. A frame already published with
    /// `display` is swapped in first. Calling it again has no effect.
    ///
    /// Must not run concurrently with `display`.
    pub fn start(&mut self) {
        self.engine.start(self.planes);
    }

    /// Handle the transfer-complete interrupt.
    pub fn on_transfer_complete(&mut self) {
        self.engine.on_transfer_complete(self.planes);
    }

    /// Handle the output-enable timer interrupt.
    pub fn on_timer_expired(&mut self) {
        self.engine.on_timer_expired(self.planes);
    }

    /// Where the engine is in the refresh cycle.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.engine.cursor()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.engine.state()
    }

    /// Complete refresh cycles so far.
    #[must_use]
    pub fn full_refresh_count(&self) -> u32 {
        self.planes.full_refreshes()
    }

    /// Signals dropped because they arrived in the wrong state.
    #[must_use]
    pub fn spurious_signals(&self) -> u32 {
        self.engine.spurious_signals()
    }

    /// The transport, e.g. to acknowledge interrupt flags.
    #[must_use]
    pub fn transport(&self) -> &T {
        self.engine.transport()
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.transport_mut()
    }
}
