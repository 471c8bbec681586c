#![cfg_attr(not(test), no_std)]

// Logging macros dispatch to defmt or log depending on the enabled feature.
// When neither is enabled the arguments are still type-checked but nothing is emitted.
#[cfg(feature = "defmt")]
macro_rules! debug {
    ($($arg:tt)*) => (::defmt::debug!($($arg)*));
}
#[cfg(all(not(feature = "defmt"), feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => (::log::debug!($($arg)*));
}
#[cfg(all(not(feature = "defmt"), not(feature = "log")))]
macro_rules! debug {
    ($($arg:tt)*) => {{
        let _ = ::core::format_args!($($arg)*);
    }};
}

#[cfg(feature = "defmt")]
macro_rules! info {
    ($($arg:tt)*) => (::defmt::info!($($arg)*));
}
#[cfg(all(not(feature = "defmt"), feature = "log"))]
macro_rules! info {
    ($($arg:tt)*) => (::log::info!($($arg)*));
}
#[cfg(all(not(feature = "defmt"), not(feature = "log")))]
macro_rules! info {
    ($($arg:tt)*) => {{
        let _ = ::core::format_args!($($arg)*);
    }};
}

#[cfg(feature = "defmt")]
macro_rules! warn {
    ($($arg:tt)*) => (::defmt::warn!($($arg)*));
}
#[cfg(all(not(feature = "defmt"), feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => (::log::warn!($($arg)*));
}
#[cfg(all(not(feature = "defmt"), not(feature = "log")))]
macro_rules! warn {
    ($($arg:tt)*) => {{
        let _ = ::core::format_args!($($arg)*);
    }};
}

#[cfg(feature = "defmt")]
macro_rules! error {
    ($($arg:tt)*) => (::defmt::error!($($arg)*));
}
#[cfg(all(not(feature = "defmt"), feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => (::log::error!($($arg)*));
}
#[cfg(all(not(feature = "defmt"), not(feature = "log")))]
macro_rules! error {
    ($($arg:tt)*) => {{
        let _ = ::core::format_args!($($arg)*);
    }};
}

pub mod aggregator;
pub mod ble;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod hid;
pub mod input_device;
#[cfg(feature = "storage")]
pub mod storage;

// Re-exported for the `run_devices!` macro
pub use futures;
use static_cell::StaticCell;

use crate::channel::MouseChannels;

/// Raw mutex type used by all channels and signals in the firmware
pub type RawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Capacity of the raw input event queue. Producers drop events when it's full.
pub const EVENT_CHANNEL_SIZE: usize = 16;
/// Capacity of the link message queue
pub const LINK_CHANNEL_SIZE: usize = 8;
/// Capacity of the flash operation queue
#[cfg(feature = "storage")]
pub const FLASH_CHANNEL_SIZE: usize = 4;

static CHANNELS: StaticCell<MouseChannels> = StaticCell::new();

/// Allocate the shared channel set for the firmware.
///
/// Call this exactly once at startup and hand the reference to every worker.
/// Panics when called a second time.
pub fn init_channels() -> &'static MouseChannels {
    CHANNELS.init(MouseChannels::new())
}
