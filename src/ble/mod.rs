//! Wireless link management

pub mod link;

pub use link::{LinkManager, ReconnectSchedule};

/// State of the wireless connection as seen by the link manager
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    Advertising,
    Connected,
}

/// Control messages consumed by the link manager.
///
/// The radio stack pushes `Connected`/`Disconnected`/`Reset` from its event
/// handler; `HostSync` comes from the host side asking the device to become
/// connectable. The activity messages are internal and gate report dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkMessage {
    /// Begin advertising now, regardless of any pending retry
    StartAdvertising,
    /// The host signalled it is ready for a connection
    HostSync,
    /// The radio stack established a connection
    Connected,
    /// The connection dropped, with the stack's reason code
    Disconnected(u8),
    /// The radio stack reset itself, with the stack's reason code
    Reset(u8),
    /// The post-connect settling delay elapsed
    StartActivity,
    /// Stop report dispatch immediately
    StopActivity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// The radio stack rejected the advertising request
    AdvertiseFailed,
}

/// The radio-stack operations the link manager needs.
///
/// Connection and disconnection are reported asynchronously through
/// [`LinkMessage`], so the only direct operation is starting advertising.
pub trait LinkDriver {
    async fn start_advertising(&mut self) -> Result<(), LinkError>;
}
