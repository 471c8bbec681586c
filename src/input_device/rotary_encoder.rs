//! Quadrature scroll wheel encoder
//!
//! The decoding lookup table is adapted from:
//! <https://github.com/leshow/rotary-encoder-hal/blob/master/src/lib.rs>

use embassy_futures::select::select;
use embassy_time::{Duration, Instant};
use embedded_hal::digital::InputPin;
use embedded_hal_async::digital::Wait;

use crate::config::DebounceConfig;
use crate::event::Event;
use crate::input_device::InputDevice;

/// One detent step per valid quadrature transition, indexed by
/// `(previous << 2) | current`. Invalid transitions (skipped codes) and
/// no-ops decode to 0.
const TRANSITION_LUT: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

/// Decode one phase transition into a step of -1, 0 or +1.
///
/// An unchanged phase code returns 0 without a table lookup, so re-running
/// the decoder on the same pin state is harmless.
pub fn decode_transition(previous: u8, current: u8) -> i8 {
    let previous = previous & 0b11;
    let current = current & 0b11;
    if previous == current {
        return 0;
    }
    TRANSITION_LUT[((previous << 2) | current) as usize]
}

/// Scroll wheel on a two-phase quadrature encoder.
///
/// Emits `Event::Wheel(±1)` per accepted detent; detents closer together
/// than the debounce window are treated as contact chatter and dropped.
pub struct WheelEncoder<A, B> {
    pin_a: A,
    pin_b: B,
    state: u8,
    // None until the first accepted detent
    last_detent: Option<Instant>,
    window: Duration,
}

impl<A, B> WheelEncoder<A, B>
where
    A: InputPin,
    B: InputPin,
{
    pub fn new(pin_a: A, pin_b: B, config: &DebounceConfig) -> Self {
        Self {
            pin_a,
            pin_b,
            state: 0,
            last_detent: None,
            window: config.wheel_window,
        }
    }

    fn read_phase(&mut self) -> u8 {
        let mut current = 0u8;
        if self.pin_a.is_high().unwrap_or(false) {
            current |= 0b01;
        }
        if self.pin_b.is_high().unwrap_or(false) {
            current |= 0b10;
        }
        current
    }

    /// Sample the pins and evaluate the next encoder state.
    /// Returns one detent step, or 0 when nothing (valid) happened.
    pub fn update(&mut self, now: Instant) -> i8 {
        let current = self.read_phase();
        self.apply(current, now)
    }

    fn apply(&mut self, current: u8, now: Instant) -> i8 {
        if current == self.state {
            return 0;
        }

        let step = decode_transition(self.state, current);
        self.state = current;
        if step == 0 {
            return 0;
        }

        if let Some(last) = self.last_detent {
            if now < last + self.window {
                return 0;
            }
        }
        self.last_detent = Some(now);
        step
    }
}

impl<A, B> InputDevice for WheelEncoder<A, B>
where
    A: InputPin + Wait,
    B: InputPin + Wait,
{
    async fn read_event(&mut self) -> Event {
        loop {
            select(self.pin_a.wait_for_any_edge(), self.pin_b.wait_for_any_edge()).await;

            let step = self.update(Instant::now());
            if step != 0 {
                debug!("Wheel detent: {}", step);
                return Event::Wheel(step);
            }
        }
    }
}
