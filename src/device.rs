//! The display device: configuration, construction and the split into a
//! foreground and an interrupt half.

use core::convert::Infallible;

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::{OriginDimensions, Point, Size};
use embedded_graphics::Pixel;

use crate::framebuffer::{Canvas, Painter, Planes};
use crate::refresh::{Cursor, Engine, Refresher, State};
use crate::transport::Transport;
use crate::{compute_cols, Color, Error, FrameBufferOperations, MAX_BIT_DEPTH, MAX_ROW_ADDRESSES};

/// Construction options for [`Hub75`].
///
/// # Example
/// ```rust
/// # use hub75_bcm::transport::Transport;
/// # struct Board;
/// # impl Transport for Board {
/// #     const MAX_COUNTDOWN: u32 = 0xffff;
/// #     fn begin_burst(&mut self, _: &[u8]) {}
/// #     fn arm_one_shot(&mut self, _: u32) {}
/// #     fn set_row_address(&mut self, _: u8) {}
/// #     fn set_latch(&mut self, _: bool) {}
/// #     fn set_output_enable(&mut self, _: bool) {}
/// # }
/// use hub75_bcm::Config;
///
/// let config = Config::new(Board)
///     .with_panel_count(4)
///     .with_brightness(0x9f)
///     .with_oe_scale(3);
/// assert_eq!(config.rows_per_panel, 16);
/// ```
#[derive(Debug, Clone)]
pub struct Config<T> {
    /// Number of chained 32×32 panels; the display is `32 × panel_count` wide.
    pub panel_count: usize,
    /// Row addresses per panel, i.e. half the panel height.
    pub rows_per_panel: usize,
    /// Number of BCM bit-planes, `1..=8`.
    pub bit_depth: u8,
    /// Global brightness applied to every output-enable window.
    pub brightness: u8,
    /// Timer ticks per brightness unit for the least significant plane.
    pub oe_scale: u32,
    /// The hardware backend.
    pub transport: T,
}

impl<T> Config<T> {
    /// One 32×32 panel, 16 row addresses, 8 bits, full brightness.
    pub fn new(transport: T) -> Self {
        Self {
            panel_count: 1,
            rows_per_panel: 16,
            bit_depth: 8,
            brightness: 255,
            oe_scale: 1,
            transport,
        }
    }

    /// Set [`Config::panel_count`].
    #[must_use]
    pub fn with_panel_count(mut self, panel_count: usize) -> Self {
        self.panel_count = panel_count;
        self
    }

    /// Set [`Config::rows_per_panel`].
    #[must_use]
    pub fn with_rows_per_panel(mut self, rows_per_panel: usize) -> Self {
        self.rows_per_panel = rows_per_panel;
        self
    }

    /// Set [`Config::bit_depth`].
    #[must_use]
    pub fn with_bit_depth(mut self, bit_depth: u8) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    /// Set [`Config::brightness`].
    #[must_use]
    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = brightness;
        self
    }

    /// Set [`Config::oe_scale`].
    #[must_use]
    pub fn with_oe_scale(mut self, oe_scale: u32) -> Self {
        self.oe_scale = oe_scale;
        self
    }

    fn validate<const COLS: usize, const NROWS: usize, const BITS: usize>(&self) -> Result<(), Error> {
        if self.panel_count == 0 {
            return Err(Error::NoPanels);
        }
        if self.rows_per_panel == 0 {
            return Err(Error::NoRows);
        }
        if self.rows_per_panel > MAX_ROW_ADDRESSES {
            return Err(Error::TooManyRows(self.rows_per_panel));
        }
        if self.bit_depth == 0 || self.bit_depth > MAX_BIT_DEPTH {
            return Err(Error::InvalidBitDepth(self.bit_depth));
        }
        if compute_cols(self.panel_count) != COLS
            || self.rows_per_panel != NROWS
            || usize::from(self.bit_depth) != BITS
        {
            return Err(Error::GeometryMismatch {
                panels: self.panel_count,
                rows: self.rows_per_panel,
                bits: self.bit_depth,
            });
        }
        Ok(())
    }
}

/// A chain of HUB75 panels refreshed with binary code modulation.
///
/// The type parameters fix the buffer sizes:
/// - `T`: the [`Transport`]
/// - `COLS`: display width, [`compute_cols`]`(panel_count)`
/// - `NROWS`: row addresses, half the display height
/// - `BITS`: bit-planes per channel
///
/// Pixels drawn with [`Hub75::set_pixel`] or `embedded-graphics` appear after
/// [`Hub75::display`]. Once [`Hub75::start`] has been called the transport's
/// two interrupts must be routed to [`Hub75::on_transfer_complete`] and
/// [`Hub75::on_timer_expired`].
///
/// To draw from the main loop while interrupts refresh the panel, keep the
/// device in a `static` and [`split`](Hub75::split) it into a [`Painter`] and a
/// [`Refresher`].
///
/// # Example
/// ```rust
/// # use hub75_bcm::transport::Transport;
/// # struct Board;
/// # impl Transport for Board {
/// #     const MAX_COUNTDOWN: u32 = 0xffff;
/// #     fn begin_burst(&mut self, _: &[u8]) {}
/// #     fn arm_one_shot(&mut self, _: u32) {}
/// #     fn set_row_address(&mut self, _: u8) {}
/// #     fn set_latch(&mut self, _: bool) {}
/// #     fn set_output_enable(&mut self, _: bool) {}
/// # }
/// use embedded_graphics::pixelcolor::RgbColor;
/// use embedded_graphics::prelude::*;
/// use embedded_graphics::primitives::{Circle, PrimitiveStyle};
/// use hub75_bcm::{compute_cols, Color, Config, Hub75};
///
/// const COLS: usize = compute_cols(2);
/// type Display = Hub75<Board, COLS, 16, 8>;
///
/// let mut display = Display::new(Config::new(Board).with_panel_count(2)).unwrap();
/// Circle::new(Point::new(20, 8), 16)
///     .into_styled(PrimitiveStyle::with_fill(Color::BLUE))
///     .draw(&mut display)
///     .unwrap();
/// display.display();
/// display.start();
/// ```
pub struct Hub75<T, const COLS: usize, const NROWS: usize, const BITS: usize> {
    canvas: Canvas<COLS, NROWS>,
    planes: Planes<COLS, NROWS, BITS>,
    engine: Engine<T>,
}

impl<T: Transport, const COLS: usize, const NROWS: usize, const BITS: usize> Hub75<T, COLS, NROWS, BITS> {
    /// Validate `config` against the type and build the device. The display
    /// starts black and idle.
    ///
    /// # Errors
    /// [`Error`] when the geometry is empty, too large, or disagrees with the
    /// type parameters.
    pub fn new(config: Config<T>) -> Result<Self, Error> {
        if let Err(err) = config.validate::<COLS, NROWS, BITS>() {
            warn!(
                "rejected config: {} panel(s), {} rows, {} bits",
                config.panel_count,
                config.rows_per_panel,
                config.bit_depth
            );
            return Err(err);
        }
        info!(
            "hub75: {}x{} pixels, {} bit-planes, brightness {}",
            COLS,
            2 * NROWS,
            BITS,
            config.brightness
        );
        Ok(Self {
            canvas: Canvas::new(),
            planes: Planes::new(config.brightness),
            engine: Engine::new(config.transport, config.oe_scale),
        })
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

    /// Encode the edits since the last call and schedule them for display at
    /// the start of the next refresh cycle.
    pub fn display(&mut self) {
        self.planes.publish_exclusive(&mut self.canvas);
    }

    /// Set every pixel to black. Takes effect on the next [`Hub75::display`].
    pub fn erase(&mut self) {
        self.canvas.fill(Color::BLACK);
    }

    /// `true` while a published frame waits for the next cycle boundary.
    #[must_use]
    pub fn is_swap_pending(&self) -> bool {
        self.planes.swap_pending()
    }

    /// Complete refresh cycles so far, for frame rate measurement.
    #[must_use]
    pub fn full_refresh_count(&self) -> u32 {
        self.planes.full_refreshes()
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

    /// Begin the refresh cycle. The transport must be fully set up.
    pub fn start(&mut self) {
        self.engine.start(&self.planes);
    }

    /// Transfer-complete interrupt handler.
    pub fn on_transfer_complete(&mut self) {
        self.engine.on_transfer_complete(&self.planes);
    }

    /// Output-enable timer interrupt handler.
    pub fn on_timer_expired(&mut self) {
        self.engine.on_timer_expired(&self.planes);
    }

    /// Where the engine is in the refresh cycle.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.engine.cursor()
    }

    /// Current refresh state.
    #[must_use]
    pub fn state(&self) -> State {
        self.engine.state()
    }

    /// Signals dropped because they arrived in the wrong state.
    #[must_use]
    pub fn spurious_signals(&self) -> u32 {
        self.engine.spurious_signals()
    }

    /// The transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        self.engine.transport()
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.transport_mut()
    }

    /// Split into the foreground [`Painter`] and the interrupt [`Refresher`].
    pub fn split(&mut self) -> (Painter<'_, COLS, NROWS, BITS>, Refresher<'_, T, COLS, NROWS, BITS>) {
        (
            Painter::new(&mut self.canvas, &self.planes),
            Refresher::new(&mut self.engine, &self.planes),
        )
    }
}

impl<T, const COLS: usize, const NROWS: usize, const BITS: usize> OriginDimensions
    for Hub75<T, COLS, NROWS, BITS>
{
    fn size(&self) -> Size {
        Size::new(COLS as u32, (2 * NROWS) as u32)
    }
}

impl<T, const COLS: usize, const NROWS: usize, const BITS: usize> DrawTarget
    for Hub75<T, COLS, NROWS, BITS>
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

impl<T: Transport, const COLS: usize, const NROWS: usize, const BITS: usize> FrameBufferOperations
    for Hub75<T, COLS, NROWS, BITS>
{
    fn erase(&mut self) {
        Hub75::erase(self);
    }

    fn set_pixel(&mut self, p: Point, color: Color) {
        self.canvas.set_pixel(p, color);
    }

    fn display(&mut self) {
        Hub75::display(self);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use embedded_graphics::prelude::*;
    use embedded_graphics::primitives::{Line, PrimitiveStyle};

    use super::*;
    use crate::bitplane::{truncate, Entry};
    use crate::sim::{Signal, SimTransport};

    const PANELS: usize = 2;
    const COLS: usize = compute_cols(PANELS);
    const NROWS: usize = 16;
    const BITS: usize = 8;
    const STEPS_PER_CYCLE: usize = NROWS * BITS;

    type Sim = SimTransport<COLS>;
    type TestDisplay = Hub75<Sim, COLS, NROWS, BITS>;

    fn config() -> Config<Sim> {
        Config::new(Sim::new()).with_panel_count(PANELS)
    }

    fn display() -> TestDisplay {
        TestDisplay::new(config()).unwrap()
    }

    /// Run one full cycle and reassemble what was actually shifted out,
    /// indexed `[row][bit]`.
    fn capture_cycle(display: &mut TestDisplay) -> std::vec::Vec<std::vec::Vec<std::vec::Vec<u8>>> {
        let mut frame = std::vec![std::vec![std::vec::Vec::new(); BITS]; NROWS];
        for _ in 0..STEPS_PER_CYCLE {
            let cursor = display.cursor();
            frame[cursor.row()][cursor.bit()] = display.transport().last_burst().to_vec();
            assert_eq!(display.deliver_next_signal(), Some(Signal::TransferComplete));
            assert_eq!(display.deliver_next_signal(), Some(Signal::TimerExpired));
        }
        frame
    }

    fn decode(frame: &[std::vec::Vec<std::vec::Vec<u8>>], x: usize, y: usize) -> Color {
        let (row, lower) = (y % NROWS, y >= NROWS);
        let (mut r, mut g, mut b) = (0u8, 0u8, 0u8);
        for bit in 0..BITS {
            let word = frame[row][bit][x];
            let shift = if lower { 3 } else { 0 };
            r |= ((word >> shift) & 1) << bit;
            g |= ((word >> (shift + 1)) & 1) << bit;
            b |= ((word >> (shift + 2)) & 1) << bit;
        }
        Color::new(r, g, b)
    }

    #[test]
    fn test_new_accepts_matching_config() {
        let display = display();
        assert_eq!(display.size(), Size::new(64, 32));
        assert_eq!(display.state(), State::Idle);
        assert_eq!(display.brightness(), 255);
        assert_eq!(display.full_refresh_count(), 0);
    }

    #[test]
    fn test_new_rejects_invalid_geometry() {
        let err = |config: Config<Sim>| TestDisplay::new(config).err();
        assert_eq!(err(config().with_panel_count(0)), Some(Error::NoPanels));
        assert_eq!(err(config().with_rows_per_panel(0)), Some(Error::NoRows));
        assert_eq!(err(config().with_rows_per_panel(33)), Some(Error::TooManyRows(33)));
        assert_eq!(err(config().with_bit_depth(0)), Some(Error::InvalidBitDepth(0)));
        assert_eq!(err(config().with_bit_depth(9)), Some(Error::InvalidBitDepth(9)));
        assert_eq!(
            err(config().with_panel_count(3)),
            Some(Error::GeometryMismatch {
                panels: 3,
                rows: 16,
                bits: 8
            })
        );
        assert_eq!(
            err(config().with_bit_depth(4)),
            Some(Error::GeometryMismatch {
                panels: 2,
                rows: 16,
                bits: 4
            })
        );
    }

    #[test]
    fn test_red_pixel_scenario() {
        let mut display = display();
        display.set_pixel(Point::new(5, 5), Color::new(255, 0, 0));
        display.display();
        display.start();

        let mut checked = false;
        for _ in 0..STEPS_PER_CYCLE {
            let cursor = display.cursor();
            if cursor.row() == 5 && cursor.bit() == 7 {
                let entry = Entry::from_bits(display.transport().last_burst()[5]);
                assert_eq!(entry.upper(), (true, false, false));
                checked = true;
            }
            display.run_steps(1);
        }
        assert!(checked);
        assert_eq!(display.full_refresh_count(), 1);
        assert_eq!(display.cursor(), Cursor::ORIGIN);
    }

    #[test]
    fn test_set_pixel_display_cycle_reproduces_colors() {
        let mut display = display();
        let colors = [
            (Point::new(0, 0), Color::new(1, 2, 3)),
            (Point::new(63, 31), Color::new(0xff, 0x80, 0x7f)),
            (Point::new(31, 16), Color::new(0x55, 0xaa, 0x01)),
            (Point::new(32, 15), Color::new(0x10, 0x20, 0x40)),
        ];
        for (p, c) in colors {
            display.set_pixel(p, c);
        }
        display.display();
        display.start();

        let frame = capture_cycle(&mut display);
        for (p, c) in colors {
            assert_eq!(decode(&frame, p.x as usize, p.y as usize), c, "{p:?}");
        }
        assert_eq!(decode(&frame, 1, 0), Color::BLACK);
    }

    #[test]
    fn test_out_of_range_pixels_are_ignored() {
        let mut display = display();
        display.set_pixel(Point::new(64, 0), Color::WHITE);
        display.set_pixel(Point::new(0, 32), Color::WHITE);
        display.set_pixel(Point::new(-1, -1), Color::WHITE);
        display.display();
        display.start();

        let frame = capture_cycle(&mut display);
        assert!(frame.iter().flatten().flatten().all(|w| *w == 0));
    }

    #[test]
    fn test_full_refresh_count_per_cycle() {
        let mut display = display();
        display.start();
        for cycle in 1..=4 {
            assert_eq!(display.run_steps(STEPS_PER_CYCLE - 1), STEPS_PER_CYCLE - 1);
            assert_eq!(display.full_refresh_count(), cycle - 1);
            assert_eq!(display.run_steps(1), 1);
            assert_eq!(display.full_refresh_count(), cycle);
        }
    }

    #[test]
    fn test_mid_cycle_display_never_mixes_generations() {
        let mut display = display();
        display.clear(Color::RED).unwrap();
        display.display();
        display.start();

        display.run_steps(40);
        display.clear(Color::BLUE).unwrap();
        display.display();

        // rest of this cycle is still entirely red
        let mut rest = std::vec::Vec::new();
        loop {
            rest.push(display.transport().last_burst().to_vec());
            display.run_steps(1);
            if display.cursor() == Cursor::ORIGIN {
                break;
            }
        }
        assert_eq!(rest.len(), STEPS_PER_CYCLE - 40);
        let red = Entry::from_pixels(Color::RED, Color::RED, 0).bits();
        assert!(rest.iter().flatten().all(|w| *w == red));

        // the next cycle is entirely blue
        let frame = capture_cycle(&mut display);
        for y in 0..32 {
            for x in 0..64 {
                assert_eq!(decode(&frame, x, y), Color::BLUE);
            }
        }
    }

    #[test]
    fn test_display_before_start_shows_on_first_cycle() {
        let mut display = display();
        display.set_pixel(Point::new(10, 20), Color::GREEN);
        display.display();
        display.start();
        let frame = capture_cycle(&mut display);
        assert_eq!(decode(&frame, 10, 20), Color::GREEN);
    }

    #[test]
    fn test_embedded_graphics_drawing() {
        let mut display = display();
        Line::new(Point::new(0, 31), Point::new(63, 31))
            .into_styled(PrimitiveStyle::with_stroke(Color::WHITE, 1))
            .draw(&mut display)
            .unwrap();
        assert_eq!(display.pixel(40, 31), Some(Color::WHITE));
        display.display();
        display.start();
        let frame = capture_cycle(&mut display);
        for x in 0..64 {
            assert_eq!(decode(&frame, x, 31), Color::WHITE);
            assert_eq!(decode(&frame, x, 15), Color::BLACK);
        }
    }

    #[test]
    fn test_erase_then_display_blanks() {
        let mut display = display();
        display.set_pixel(Point::new(3, 3), Color::WHITE);
        display.display();
        display.start();
        display.run_steps(STEPS_PER_CYCLE);
        assert!(!display.is_swap_pending());

        FrameBufferOperations::erase(&mut display);
        assert!(!display.is_swap_pending());
        FrameBufferOperations::display(&mut display);
        assert!(display.is_swap_pending());
        display.run_steps(STEPS_PER_CYCLE);
        assert_eq!(display.spurious_signals(), 0);
        let frame = capture_cycle(&mut display);
        assert_eq!(decode(&frame, 3, 3), Color::BLACK);
    }

    #[test]
    fn test_brightness_scales_gate_and_clamps() {
        let config = config().with_oe_scale(3);
        let mut display = TestDisplay::new(config).unwrap();
        display.start();
        let mut armed = std::vec::Vec::new();
        for _ in 0..BITS {
            display.deliver_next_signal();
            armed.push(display.transport().armed().unwrap());
            display.deliver_next_signal();
        }
        // 255 * 3 << bit, the top plane clamped to the 16-bit countdown
        assert_eq!(armed, [765, 1530, 3060, 6120, 12240, 24480, 48960, 0xffff]);

        display.set_brightness(10);
        display.deliver_next_signal();
        assert_eq!(display.transport().armed(), Some(30));
    }

    #[test]
    fn test_truncated_depth_device() {
        let config = Config::new(SimTransport::<32>::new()).with_bit_depth(4);
        let mut display = Hub75::<_, 32, 16, 4>::new(config).unwrap();
        let color = Color::new(0xf3, 0x18, 0x09);
        display.set_pixel(Point::new(7, 7), color);
        display.display();
        display.start();

        let expected = truncate(color, 4);
        let mut lanes = [(false, false, false); 4];
        for _ in 0..16 * 4 {
            let cursor = display.cursor();
            if cursor.row() == 7 {
                lanes[cursor.bit()] = Entry::from_bits(display.transport().last_burst()[7]).upper();
            }
            display.run_steps(1);
        }
        for (bit, (r, g, b)) in lanes.into_iter().enumerate() {
            assert_eq!(r, (expected.r() >> bit) & 1 == 1);
            assert_eq!(g, (expected.g() >> bit) & 1 == 1);
            assert_eq!(b, (expected.b() >> bit) & 1 == 1);
        }
    }

    #[test]
    fn test_split_painter_and_refresher() {
        let mut display = display();
        {
            let (mut painter, mut refresher) = display.split();
            painter.set_pixel(Point::new(1, 1), Color::CYAN);
            painter.display();
            refresher.start();
            assert!(!painter.is_swap_pending());

            refresher.run_steps(10);
            painter.set_pixel(Point::new(2, 2), Color::YELLOW);
            // no swap pending, so this returns without waiting
            painter.display();
            assert!(painter.is_swap_pending());
            refresher.run_steps(STEPS_PER_CYCLE - 10);
            assert!(!painter.is_swap_pending());
            assert_eq!(painter.full_refresh_count(), 1);
            assert_eq!(refresher.full_refresh_count(), 1);
            assert_eq!(refresher.spurious_signals(), 0);
            assert_eq!(refresher.state(), State::Transferring);
        }
        let frame = capture_cycle(&mut display);
        assert_eq!(decode(&frame, 1, 1), Color::CYAN);
        assert_eq!(decode(&frame, 2, 2), Color::YELLOW);
    }

    #[test]
    fn test_painter_publishes_against_running_refresher() {
        use core::sync::atomic::{AtomicBool, Ordering};

        const SMALL_NROWS: usize = 4;
        const SMALL_BITS: usize = 2;
        const DISPLAYS: usize = 300;

        let config = Config::new(SimTransport::<32>::new())
            .with_rows_per_panel(SMALL_NROWS)
            .with_bit_depth(SMALL_BITS as u8);
        let mut display = Hub75::<_, 32, SMALL_NROWS, SMALL_BITS>::new(config).unwrap();
        let red = Entry::from_pixels(Color::RED, Color::RED, 7).bits();
        let blue = Entry::from_pixels(Color::BLUE, Color::BLUE, 7).bits();

        let (mut painter, mut refresher) = display.split();
        refresher.start();
        let done = AtomicBool::new(false);

        let (cycles, mixed, seen_red, seen_blue) = std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..DISPLAYS {
                    let color = if i % 2 == 0 { Color::RED } else { Color::BLUE };
                    painter.clear(color).unwrap();
                    painter.display();
                }
                done.store(true, Ordering::Release);
            });

            let (mut cycles, mut mixed) = (0u32, 0u32);
            let (mut seen_red, mut seen_blue) = (false, false);
            while !done.load(Ordering::Acquire) {
                assert_eq!(refresher.cursor(), Cursor::ORIGIN);
                let first = refresher.transport().last_burst()[0];
                let mut uniform = true;
                for _ in 0..SMALL_NROWS * SMALL_BITS {
                    uniform &= refresher.transport().last_burst().iter().all(|w| *w == first);
                    assert_eq!(refresher.run_steps(1), 1);
                }
                if !uniform {
                    mixed += 1;
                }
                seen_red |= first == red;
                seen_blue |= first == blue;
                cycles += 1;
            }
            (cycles, mixed, seen_red, seen_blue)
        });

        assert_eq!(mixed, 0, "{mixed} of {cycles} cycles mixed two frames");
        assert!(seen_red && seen_blue);
        assert_eq!(refresher.spurious_signals(), 0);
    }
}
