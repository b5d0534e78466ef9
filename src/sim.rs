//! A software [`Transport`] that records what the refresh engine does.
//!
//! Nothing is shifted or timed; instead [`SimTransport`] remembers the last
//! burst, the level of every control line and a short log of calls, and keeps
//! the one signal the real hardware would raise next. Delivering that signal
//! back to the engine ([`Refresher::deliver_next_signal`]) runs the state
//! machine exactly as the interrupts would.
//!
//! Enabled by the `sim` feature.

use heapless::Vec;

use crate::refresh::Refresher;
use crate::transport::Transport;
use crate::Hub75;

/// Calls kept in the event log before the oldest is dropped.
pub const EVENT_LOG_LEN: usize = 16;

/// One recorded transport call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// `begin_burst` with this many bytes.
    Burst {
        /// Burst length in bytes.
        len: usize,
    },
    /// `arm_one_shot` with this many ticks.
    Timer(u32),
    /// `set_row_address`.
    RowAddress(u8),
    /// `set_latch`.
    Latch(bool),
    /// `set_output_enable`.
    OutputEnable(bool),
}

/// The interrupt the simulated hardware would raise next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Signal {
    /// The burst has been shifted out.
    TransferComplete,
    /// The one-shot timer ran out.
    TimerExpired,
}

/// Recording transport. `MAX_BURST` bytes of each burst are kept; the timer
/// behaves like a countdown of at most `COUNTDOWN` ticks.
#[derive(Debug)]
pub struct SimTransport<const MAX_BURST: usize, const COUNTDOWN: u32 = 0xffff> {
    burst: Vec<u8, MAX_BURST>,
    events: Vec<Event, EVENT_LOG_LEN>,
    pending: Option<Signal>,
    armed: Option<u32>,
    bursts: u32,
    latch_pulses: u32,
    row_address: u8,
    latch: bool,
    output_enable: bool,
}

impl<const MAX_BURST: usize, const COUNTDOWN: u32> SimTransport<MAX_BURST, COUNTDOWN> {
    /// A transport with all lines low and nothing pending.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            burst: Vec::new(),
            events: Vec::new(),
            pending: None,
            armed: None,
            bursts: 0,
            latch_pulses: 0,
            row_address: 0,
            latch: false,
            output_enable: false,
        }
    }

    fn record(&mut self, event: Event) {
        if self.events.is_full() {
            self.events.remove(0);
        }
        let _ = self.events.push(event);
    }

    /// Take the pending signal, as the interrupt controller would.
    pub fn take_signal(&mut self) -> Option<Signal> {
        self.pending.take()
    }

    /// The signal that would fire next, without taking it.
    #[must_use]
    pub fn pending(&self) -> Option<Signal> {
        self.pending
    }

    /// Bytes of the most recent burst.
    #[must_use]
    pub fn last_burst(&self) -> &[u8] {
        &self.burst
    }

    /// Most recent calls, oldest first.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Forget the event log.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Ticks of the most recently armed countdown.
    #[must_use]
    pub fn armed(&self) -> Option<u32> {
        self.armed
    }

    /// Total bursts started.
    #[must_use]
    pub fn bursts(&self) -> u32 {
        self.bursts
    }

    /// Total rising edges on the latch line.
    #[must_use]
    pub fn latch_pulses(&self) -> u32 {
        self.latch_pulses
    }

    /// Level of the row-address lines.
    #[must_use]
    pub fn row_address(&self) -> u8 {
        self.row_address
    }

    /// `true` while the latched row is lit.
    #[must_use]
    pub fn output_enabled(&self) -> bool {
        self.output_enable
    }
}

impl<const MAX_BURST: usize, const COUNTDOWN: u32> Default for SimTransport<MAX_BURST, COUNTDOWN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const MAX_BURST: usize, const COUNTDOWN: u32> Transport for SimTransport<MAX_BURST, COUNTDOWN> {
    const MAX_COUNTDOWN: u32 = COUNTDOWN;

    fn begin_burst(&mut self, words: &[u8]) {
        self.burst.clear();
        let kept = words.len().min(MAX_BURST);
        let _ = self.burst.extend_from_slice(&words[..kept]);
        self.bursts += 1;
        self.pending = Some(Signal::TransferComplete);
        self.record(Event::Burst { len: words.len() });
    }

    fn arm_one_shot(&mut self, ticks: u32) {
        self.armed = Some(ticks);
        self.pending = Some(Signal::TimerExpired);
        self.record(Event::Timer(ticks));
    }

    fn set_row_address(&mut self, row: u8) {
        self.row_address = row;
        self.record(Event::RowAddress(row));
    }

    fn set_latch(&mut self, high: bool) {
        if high && !self.latch {
            self.latch_pulses += 1;
        }
        self.latch = high;
        self.record(Event::Latch(high));
    }

    fn set_output_enable(&mut self, enabled: bool) {
        self.output_enable = enabled;
        self.record(Event::OutputEnable(enabled));
    }
}

impl<const MAX_BURST: usize, const COUNTDOWN: u32, const COLS: usize, const NROWS: usize, const BITS: usize>
    Refresher<'_, SimTransport<MAX_BURST, COUNTDOWN>, COLS, NROWS, BITS>
{
    /// Hand the pending signal to the matching handler. `None` means the
    /// engine is idle or stalled.
    pub fn deliver_next_signal(&mut self) -> Option<Signal> {
        let signal = self.transport_mut().take_signal()?;
        match signal {
            Signal::TransferComplete => self.on_transfer_complete(),
            Signal::TimerExpired => self.on_timer_expired(),
        }
        Some(signal)
    }

    /// Deliver signals until `steps` cursor steps (timer expiries) have
    /// completed. Returns the number actually completed, which is less than
    /// `steps` only if the engine stalled.
    pub fn run_steps(&mut self, steps: usize) -> usize {
        let mut done = 0;
        while done < steps {
            match self.deliver_next_signal() {
                Some(Signal::TimerExpired) => done += 1,
                Some(Signal::TransferComplete) => {}
                None => break,
            }
        }
        done
    }
}

impl<const MAX_BURST: usize, const COUNTDOWN: u32, const COLS: usize, const NROWS: usize, const BITS: usize>
    Hub75<SimTransport<MAX_BURST, COUNTDOWN>, COLS, NROWS, BITS>
{
    /// See [`Refresher::deliver_next_signal`].
    pub fn deliver_next_signal(&mut self) -> Option<Signal> {
        self.split().1.deliver_next_signal()
    }

    /// See [`Refresher::run_steps`].
    pub fn run_steps(&mut self, steps: usize) -> usize {
        self.split().1.run_steps(steps)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn test_burst_is_recorded_and_signals_completion() {
        let mut sim = SimTransport::<4>::new();
        sim.begin_burst(&[1, 2, 3]);
        assert_eq!(sim.last_burst(), &[1, 2, 3]);
        assert_eq!(sim.bursts(), 1);
        assert_eq!(sim.pending(), Some(Signal::TransferComplete));
        assert_eq!(sim.take_signal(), Some(Signal::TransferComplete));
        assert_eq!(sim.take_signal(), None);
    }

    #[test]
    fn test_long_burst_is_truncated_but_length_logged() {
        let mut sim = SimTransport::<2>::new();
        sim.begin_burst(&[9, 8, 7, 6]);
        assert_eq!(sim.last_burst(), &[9, 8]);
        assert_eq!(sim.events(), [Event::Burst { len: 4 }]);
    }

    #[test]
    fn test_timer_signals_expiry() {
        let mut sim = SimTransport::<1, 1000>::new();
        assert_eq!(<SimTransport<1, 1000> as Transport>::MAX_COUNTDOWN, 1000);
        sim.arm_one_shot(42);
        assert_eq!(sim.armed(), Some(42));
        assert_eq!(sim.take_signal(), Some(Signal::TimerExpired));
        // the last armed value stays visible
        assert_eq!(sim.armed(), Some(42));
    }

    #[test]
    fn test_default_countdown_is_16_bit() {
        assert_eq!(<SimTransport<1> as Transport>::MAX_COUNTDOWN, 0xffff);
    }

    #[test]
    fn test_control_lines() {
        let mut sim = SimTransport::<1>::default();
        sim.set_row_address(7);
        sim.set_latch(true);
        sim.set_latch(true);
        sim.set_latch(false);
        sim.set_latch(true);
        sim.set_output_enable(true);
        assert_eq!(sim.row_address(), 7);
        assert_eq!(sim.latch_pulses(), 2);
        assert!(sim.output_enabled());
        assert_eq!(sim.pending(), None);
    }

    #[test]
    fn test_event_log_drops_oldest() {
        let mut sim = SimTransport::<1>::new();
        for row in 0..(EVENT_LOG_LEN as u8 + 3) {
            sim.set_row_address(row);
        }
        assert_eq!(sim.events().len(), EVENT_LOG_LEN);
        assert_eq!(sim.events()[0], Event::RowAddress(3));
        sim.clear_events();
        assert!(sim.events().is_empty());
    }
}
