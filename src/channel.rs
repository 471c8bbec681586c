//! Shared channels which connect the device workers, the aggregator, the
//! dispatcher and the link manager

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
pub use embassy_sync::{blocking_mutex, channel, signal};

use crate::aggregator::AccumulatedDelta;
use crate::ble::LinkMessage;
use crate::event::Event;
#[cfg(feature = "storage")]
use crate::storage::FlashOperationMessage;
#[cfg(feature = "storage")]
use crate::FLASH_CHANNEL_SIZE;
use crate::{EVENT_CHANNEL_SIZE, LINK_CHANNEL_SIZE, RawMutex};

/// All channels, signals and shared state of the firmware in one place.
///
/// One instance is allocated at startup (see [`crate::init_channels`]) and
/// every worker gets a reference. Nothing in here is a global.
pub struct MouseChannels {
    /// Raw input events from the device workers to the aggregator
    pub event_channel: Channel<RawMutex, Event, EVENT_CHANNEL_SIZE>,
    /// Connection events and commands for the link manager
    pub link_channel: Channel<RawMutex, LinkMessage, LINK_CHANNEL_SIZE>,
    /// Flash operations for the storage worker
    #[cfg(feature = "storage")]
    pub flash_channel: Channel<RawMutex, FlashOperationMessage, FLASH_CHANNEL_SIZE>,
    /// Wakes the dispatcher after new input has been folded in
    pub report_signal: Signal<RawMutex, ()>,
    /// Motion and button state accumulated between two report cycles.
    /// The button mask lives under the same lock as the axes so a report
    /// never pairs a stale mask with fresh motion.
    delta: Mutex<RawMutex, RefCell<AccumulatedDelta>>,
    /// True while the link manager allows reports to flow
    reporting: AtomicBool,
}

impl MouseChannels {
    pub const fn new() -> Self {
        Self {
            event_channel: Channel::new(),
            link_channel: Channel::new(),
            #[cfg(feature = "storage")]
            flash_channel: Channel::new(),
            report_signal: Signal::new(),
            delta: Mutex::new(RefCell::new(AccumulatedDelta::new())),
            reporting: AtomicBool::new(false),
        }
    }

    /// Enqueue a raw input event without blocking. Events are dropped when
    /// the queue is full; input capture must never stall behind a slow
    /// consumer.
    pub fn publish_event(&self, event: Event) {
        if self.event_channel.try_send(event).is_err() {
            debug!("Event queue full, dropping {:?}", event);
        }
    }

    /// Enqueue a flash operation without blocking. A full queue drops the
    /// operation; persistence is best effort and never stalls a worker.
    #[cfg(feature = "storage")]
    pub fn request_flash_operation(&self, operation: FlashOperationMessage) {
        if self.flash_channel.try_send(operation).is_err() {
            warn!("Flash queue full, dropping {:?}", operation);
        }
    }

    /// Fold one event into the accumulated delta
    pub fn accumulate(&self, event: Event) {
        self.delta.lock(|delta| delta.borrow_mut().merge(event));
    }

    /// Take the accumulated delta, leaving an empty one behind.
    /// The button mask is carried over: it is state, not a delta.
    pub fn take_delta(&self) -> AccumulatedDelta {
        self.delta.lock(|delta| {
            let mut delta = delta.borrow_mut();
            let snapshot = *delta;
            *delta = AccumulatedDelta::with_buttons(snapshot.buttons);
            snapshot
        })
    }

    pub fn set_reporting(&self, enabled: bool) {
        self.reporting.store(enabled, Ordering::Release);
    }

    pub fn is_reporting(&self) -> bool {
        self.reporting.load(Ordering::Acquire)
    }
}

impl Default for MouseChannels {
    fn default() -> Self {
        Self::new()
    }
}
