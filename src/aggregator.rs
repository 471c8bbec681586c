//! Motion aggregation between input capture and report dispatch

use crate::channel::MouseChannels;
use crate::event::Event;
use crate::hid::MouseReport;

/// Input state accumulated between two report cycles.
///
/// Motion and wheel detents are deltas and saturate instead of wrapping;
/// the button mask is the latest committed state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccumulatedDelta {
    pub x: i16,
    pub y: i16,
    pub wheel: i8,
    pub buttons: u8,
}

impl AccumulatedDelta {
    pub const fn new() -> Self {
        Self {
            x: 0,
            y: 0,
            wheel: 0,
            buttons: 0,
        }
    }

    pub const fn with_buttons(buttons: u8) -> Self {
        Self {
            x: 0,
            y: 0,
            wheel: 0,
            buttons,
        }
    }

    /// Fold one raw event in
    pub fn merge(&mut self, event: Event) {
        match event {
            Event::Motion(motion) => {
                self.x = self.x.saturating_add(motion.dx);
                self.y = self.y.saturating_add(motion.dy);
            }
            Event::Wheel(step) => {
                self.wheel = self.wheel.saturating_add(step);
            }
            Event::Button(mask) => {
                self.buttons = mask;
            }
        }
    }

    /// True while there is motion left to report
    pub fn has_motion(&self) -> bool {
        self.x != 0 || self.y != 0 || self.wheel != 0
    }

    /// Produce the next wire report, consuming up to one report's worth of
    /// motion. Axis deltas are clamped to the i8 range and the remainder
    /// stays behind for the next report; the wheel value goes out entirely
    /// with the first report of a burst.
    pub fn next_report(&mut self) -> MouseReport {
        let x = self.x.clamp(i8::MIN as i16, i8::MAX as i16) as i8;
        let y = self.y.clamp(i8::MIN as i16, i8::MAX as i16) as i8;
        self.x -= x as i16;
        self.y -= y as i16;

        let wheel = self.wheel;
        self.wheel = 0;

        MouseReport {
            buttons: self.buttons,
            x,
            y,
            wheel,
        }
    }
}

/// Worker folding raw input events into the shared accumulated delta and
/// waking the dispatcher after every event.
pub struct Aggregator<'a> {
    channels: &'a MouseChannels,
}

impl<'a> Aggregator<'a> {
    pub fn new(channels: &'a MouseChannels) -> Self {
        Self { channels }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let event = self.channels.event_channel.receive().await;
            self.channels.accumulate(event);
            self.channels.report_signal.signal(());
        }
    }
}

#[cfg(test)]
mod test {
    use embassy_futures::block_on;
    use embassy_futures::select::select;
    use embassy_futures::yield_now;

    use super::*;
    use crate::input_device::pointing::MotionData;

    // Init logger for tests
    #[ctor::ctor]
    fn init_log() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }

    #[test]
    fn merge_accumulates_and_saturates() {
        let mut delta = AccumulatedDelta::new();
        delta.merge(Event::Motion(MotionData { dx: 100, dy: -40 }));
        delta.merge(Event::Motion(MotionData { dx: 27, dy: -2 }));
        delta.merge(Event::Wheel(1));
        delta.merge(Event::Wheel(1));
        delta.merge(Event::Button(0b101));
        assert_eq!(
            delta,
            AccumulatedDelta {
                x: 127,
                y: -42,
                wheel: 2,
                buttons: 0b101
            }
        );

        delta.merge(Event::Motion(MotionData { dx: i16::MAX, dy: i16::MIN }));
        assert_eq!(delta.x, i16::MAX);
        assert_eq!(delta.y, i16::MIN);
    }

    #[test]
    fn drain_splits_large_motion_into_reports() {
        let mut delta = AccumulatedDelta {
            x: 300,
            y: -10,
            wheel: 5,
            buttons: 0b001,
        };

        let first = delta.next_report();
        assert_eq!((first.buttons, first.x, first.y, first.wheel), (0b001, 127, -10, 5));
        let second = delta.next_report();
        assert_eq!((second.buttons, second.x, second.y, second.wheel), (0b001, 127, 0, 0));
        let third = delta.next_report();
        assert_eq!((third.buttons, third.x, third.y, third.wheel), (0b001, 46, 0, 0));

        assert!(!delta.has_motion());
        // Another cycle still reports the held button, with no motion
        let held = delta.next_report();
        assert_eq!((held.buttons, held.x, held.y, held.wheel), (0b001, 0, 0, 0));
    }

    #[test]
    fn button_only_snapshot_produces_one_report() {
        let mut delta = AccumulatedDelta::with_buttons(0b010);
        assert!(!delta.has_motion());
        let report = delta.next_report();
        assert_eq!(report.buttons, 0b010);
        assert_eq!((report.x, report.y, report.wheel), (0, 0, 0));
    }

    #[test]
    fn aggregator_folds_events_and_wakes_dispatcher() {
        block_on(async {
            let channels = MouseChannels::new();
            channels.publish_event(Event::Motion(MotionData { dx: 5, dy: 3 }));
            channels.publish_event(Event::Button(0b001));
            channels.publish_event(Event::Wheel(-1));

            let mut aggregator = Aggregator::new(&channels);
            select(aggregator.run(), async {
                while !channels.event_channel.is_empty() {
                    yield_now().await;
                }
                // One more turn so the last received event is merged
                yield_now().await;
            })
            .await;

            assert!(channels.report_signal.signaled());
            let snapshot = channels.take_delta();
            assert_eq!(
                snapshot,
                AccumulatedDelta {
                    x: 5,
                    y: 3,
                    wheel: -1,
                    buttons: 0b001
                }
            );

            // The taken delta keeps the button state but no motion
            let residual = channels.take_delta();
            assert_eq!(residual, AccumulatedDelta::with_buttons(0b001));
        });
    }

    #[test]
    fn events_are_dropped_when_queue_is_full() {
        let channels = MouseChannels::new();
        for _ in 0..(crate::EVENT_CHANNEL_SIZE + 4) {
            channels.publish_event(Event::Wheel(1));
        }
        assert_eq!(channels.event_channel.len(), crate::EVENT_CHANNEL_SIZE);
    }
}
