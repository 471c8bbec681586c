//! Input devices of the mouse
//!
//! This module defines the `InputDevice` trait and the `run_devices!` macro,
//! enabling the simultaneous execution of multiple input devices.

use crate::event::Event;

pub mod button;
pub mod paw3395;
pub mod pointing;
pub mod rotary_encoder;

/// The trait for input devices.
///
/// An input device turns hardware activity into [`Event`]s. Device workers
/// are driven concurrently by the `run_devices!` macro, which publishes
/// every event to the shared event channel.
pub trait InputDevice {
    /// Wait for and return the next input event
    async fn read_event(&mut self) -> Event;
}

/// Macro to bind input devices to the shared channels and run all of them.
///
/// Events are published with `try_send` semantics: when the event queue is
/// full the event is dropped, the device loop never blocks on the consumer.
///
/// # Arguments
///
/// * `dev`: A list of input devices.
/// * `channels`: The [`MouseChannels`](crate::channel::MouseChannels) the devices publish to.
///
/// # Example
/// ```rust
/// let channels = omouse::init_channels();
/// let mut sensor = /* PointingDevice */;
/// let mut buttons = /* ButtonBank */;
/// let mut wheel = /* WheelEncoder */;
/// let device_future = run_devices! {
///     (sensor, buttons, wheel) => channels,
/// };
/// ```
#[macro_export]
macro_rules! run_devices {
    ( $( ( $( $dev:ident ),* ) => $channels:expr ),+ $(,)? ) => {{
        use $crate::futures::{self, future::FutureExt, select_biased};
        $crate::join_all!(
            $(
                async {
                    loop {
                        let e = select_biased! {
                            $(
                                e = $dev.read_event().fuse() => e,
                            )*
                        };
                        $channels.publish_event(e);
                    }
                }
            ),+
        )
    }};
}

/// Helper macro for joining all futures
#[macro_export]
macro_rules! join_all {
    ($first:expr, $second:expr, $($rest:expr),*) => {
        $crate::futures::future::join(
            $first,
            $crate::join_all!($second, $($rest),*)
        )
    };
    ($a:expr, $b:expr) => {
        $crate::futures::future::join($a, $b)
    };
    ($single:expr) => { $single };
}
