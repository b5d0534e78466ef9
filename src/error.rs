//! Construction errors.

/// Reasons [`Hub75::new`](crate::Hub75::new) can reject a [`Config`](crate::Config).
///
/// All of these are fatal: the display cannot be driven with the requested
/// geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// `panel_count` was zero.
    #[error("at least one panel is required")]
    NoPanels,
    /// `rows_per_panel` was zero.
    #[error("at least one row address is required")]
    NoRows,
    /// More row addresses than the five HUB75E address lines can select.
    #[error("{0} row addresses requested, at most {max} are supported", max = crate::MAX_ROW_ADDRESSES)]
    TooManyRows(usize),
    /// `bit_depth` outside `1..=8`.
    #[error("bit depth {0} is outside 1..=8")]
    InvalidBitDepth(u8),
    /// The runtime configuration does not match the buffer sizes fixed by the
    /// type parameters.
    #[error(
        "config asks for {panels} panel(s), {rows} rows and {bits} bits, \
         which does not match the device type"
    )]
    GeometryMismatch {
        /// Requested panel count.
        panels: usize,
        /// Requested row addresses.
        rows: usize,
        /// Requested bit depth.
        bits: u8,
    },
}
