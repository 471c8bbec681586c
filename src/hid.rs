//! Wire report for the wireless link

use postcard::experimental::max_size::MaxSize;
use serde::{Deserialize, Serialize};

/// Left button bit in [`MouseReport::buttons`]
pub const BUTTON_LEFT: u8 = 1 << 0;
/// Right button bit
pub const BUTTON_RIGHT: u8 = 1 << 1;
/// Middle button bit
pub const BUTTON_MIDDLE: u8 = 1 << 2;

/// One mouse report as it goes over the air: 4 bytes,
/// `[buttons, dx, dy, wheel]`, deltas as signed 8-bit.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, MaxSize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MouseReport {
    pub buttons: u8,
    pub x: i8,
    pub y: i8,
    pub wheel: i8,
}

impl MouseReport {
    /// Serialize to the on-air byte layout
    pub fn as_bytes(&self) -> [u8; 4] {
        [self.buttons, self.x as u8, self.y as u8, self.wheel as u8]
    }
}

/// Errors when sending a report over the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidError {
    /// No central is connected
    Disconnected,
    /// The link stack rejected or failed the transfer
    TransportError,
}

/// The seam between the dispatcher and the actual wireless transport.
///
/// The board crate implements this on its link stack handle; tests implement
/// it on a buffer.
pub trait ReportSink {
    async fn send_report(&mut self, report: &MouseReport) -> Result<(), HidError>;
}
