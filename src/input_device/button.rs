//! Debounced mouse buttons

use embassy_futures::select::select_array;
use embassy_time::{Duration, Instant};
use embedded_hal::digital::InputPin;
use embedded_hal_async::digital::Wait;

use crate::config::DebounceConfig;
use crate::event::Event;
use crate::input_device::InputDevice;

/// Window debouncer over a committed button mask.
///
/// A transition is accepted when it differs from the committed state and the
/// debounce window since the last accepted transition of that button has
/// passed; everything else is chatter and ignored.
pub struct ButtonDebouncer<const N: usize> {
    committed: u8,
    // None until the button's first accepted transition, so the window
    // never swallows a press right after boot
    last_change: [Option<Instant>; N],
    window: Duration,
}

impl<const N: usize> ButtonDebouncer<N> {
    pub fn new(window: Duration) -> Self {
        Self {
            committed: 0,
            last_change: [None; N],
            window,
        }
    }

    /// Feed one sampled pin level. Returns the new committed mask when the
    /// state of the button changed.
    pub fn update(&mut self, index: usize, pressed: bool, now: Instant) -> Option<u8> {
        let bit = 1u8 << index;
        let committed = self.committed & bit != 0;
        if pressed == committed {
            return None;
        }
        if let Some(last) = self.last_change[index] {
            if now < last + self.window {
                return None;
            }
        }

        self.last_change[index] = Some(now);
        if pressed {
            self.committed |= bit;
        } else {
            self.committed &= !bit;
        }
        Some(self.committed)
    }

    /// The committed state of all buttons
    pub fn mask(&self) -> u8 {
        self.committed
    }
}

/// A bank of up to 8 buttons on wait-capable pins, active low.
///
/// Emits the full committed mask on every accepted transition; the order of
/// the pin array is the bit order of the mask (index 0 = left button).
pub struct ButtonBank<P, const N: usize> {
    pins: [P; N],
    debouncer: ButtonDebouncer<N>,
}

impl<P, const N: usize> ButtonBank<P, N>
where
    P: InputPin + Wait,
{
    pub fn new(pins: [P; N], config: &DebounceConfig) -> Self {
        const { assert!(N <= 8, "The button mask has room for 8 buttons") };
        Self {
            pins,
            debouncer: ButtonDebouncer::new(config.button_window),
        }
    }
}

impl<P, const N: usize> InputDevice for ButtonBank<P, N>
where
    P: InputPin + Wait,
{
    async fn read_event(&mut self) -> Event {
        loop {
            let edges = self.pins.each_mut().map(|pin| pin.wait_for_any_edge());
            let (result, index) = select_array(edges).await;
            if result.is_err() {
                continue;
            }

            let now = Instant::now();
            let pressed = self.pins[index].is_low().unwrap_or(false);
            if let Some(mask) = self.debouncer.update(index, pressed, now) {
                debug!("Button state changed: {:#010b}", mask);
                return Event::Button(mask);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Init logger for tests
    #[ctor::ctor]
    fn init_log() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }

    const WINDOW: Duration = Duration::from_millis(20);

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn press_and_release_commit() {
        let mut debouncer = ButtonDebouncer::<3>::new(WINDOW);
        assert_eq!(debouncer.update(0, true, at(100)), Some(0b001));
        assert_eq!(debouncer.update(0, false, at(150)), Some(0b000));
    }

    #[test]
    fn first_transition_right_after_boot_is_accepted() {
        let mut debouncer = ButtonDebouncer::<3>::new(WINDOW);
        // A press landing inside the first window after boot still commits
        assert_eq!(debouncer.update(0, true, at(5)), Some(0b001));
        // But the window applies from then on
        assert_eq!(debouncer.update(0, false, at(10)), None);
    }

    #[test]
    fn chatter_within_window_is_ignored() {
        let mut debouncer = ButtonDebouncer::<3>::new(WINDOW);
        assert_eq!(debouncer.update(0, true, at(100)), Some(0b001));
        // Bounces right after the accepted press change nothing
        assert_eq!(debouncer.update(0, false, at(105)), None);
        assert_eq!(debouncer.update(0, false, at(119)), None);
        assert_eq!(debouncer.mask(), 0b001);
        // Once the window has passed the release goes through
        assert_eq!(debouncer.update(0, false, at(120)), Some(0b000));
    }

    #[test]
    fn repeated_level_is_not_an_event() {
        let mut debouncer = ButtonDebouncer::<3>::new(WINDOW);
        assert_eq!(debouncer.update(1, true, at(100)), Some(0b010));
        assert_eq!(debouncer.update(1, true, at(200)), None);
    }

    #[test]
    fn buttons_debounce_independently() {
        let mut debouncer = ButtonDebouncer::<3>::new(WINDOW);
        assert_eq!(debouncer.update(0, true, at(100)), Some(0b001));
        // A different button is not blocked by button 0's window
        assert_eq!(debouncer.update(2, true, at(101)), Some(0b101));
        assert_eq!(debouncer.update(1, true, at(102)), Some(0b111));
        assert_eq!(debouncer.mask(), 0b111);
    }
}
