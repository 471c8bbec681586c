//! Raw input events shared between device workers and the aggregator

use postcard::experimental::max_size::MaxSize;
use serde::{Deserialize, Serialize};

use crate::input_device::pointing::MotionData;

/// Raw input event produced by the device workers.
///
/// Events are folded into the accumulated delta by the aggregator; none of
/// them is a wire report on its own.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, MaxSize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// One relative motion sample from the optical sensor
    Motion(MotionData),
    /// Debounced state of all buttons, one bit per button, bit 0 = left
    Button(u8),
    /// One debounced wheel detent, +1 towards the user, -1 away
    Wheel(i8),
}
