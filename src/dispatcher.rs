//! Rate-limited report dispatch towards the wireless link

use embassy_time::Timer;

use crate::channel::MouseChannels;
use crate::config::ReportConfig;
use crate::hid::ReportSink;

/// Worker draining the accumulated delta into paced wire reports.
///
/// Each cycle snapshots the delta and clamps-and-drains it: one report per
/// `report_interval` until no motion is left, so a large accumulated move
/// goes out as a burst of full-scale reports plus a remainder. While
/// reporting is disabled the snapshot is dropped, not queued.
pub struct ReportDispatcher<'a, S: ReportSink> {
    channels: &'a MouseChannels,
    sink: S,
    config: ReportConfig,
}

impl<'a, S: ReportSink> ReportDispatcher<'a, S> {
    pub fn new(channels: &'a MouseChannels, sink: S, config: ReportConfig) -> Self {
        Self {
            channels,
            sink,
            config,
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            self.channels.report_signal.wait().await;

            if !self.channels.is_reporting() {
                let _ = self.channels.take_delta();
                Timer::after(self.config.idle_interval).await;
                continue;
            }

            let mut pending = self.channels.take_delta();
            loop {
                if !self.channels.is_reporting() {
                    // Link went down mid-burst, the rest is dropped
                    debug!("Reporting disabled, dropping pending motion");
                    break;
                }

                let report = self.sink_one(&mut pending).await;
                Timer::after(self.config.report_interval).await;
                if !report || !pending.has_motion() {
                    break;
                }
            }
        }
    }

    /// Send the next report from `pending`. Returns false when the sink
    /// rejected it; the burst is abandoned then.
    async fn sink_one(&mut self, pending: &mut crate::aggregator::AccumulatedDelta) -> bool {
        let report = pending.next_report();
        match self.sink.send_report(&report).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send mouse report: {:?}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::vec::Vec;

    use embassy_futures::block_on;
    use embassy_futures::select::select;
    use embassy_time::Duration;

    use super::*;
    use crate::event::Event;
    use crate::hid::{HidError, MouseReport};
    use crate::input_device::pointing::MotionData;

    // Init logger for tests
    #[ctor::ctor]
    fn init_log() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }

    struct RecordingSink {
        sent: Vec<MouseReport>,
        fail_after: Option<usize>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                fail_after: None,
            }
        }
    }

    impl ReportSink for &mut RecordingSink {
        async fn send_report(&mut self, report: &MouseReport) -> Result<(), HidError> {
            if let Some(limit) = self.fail_after {
                if self.sent.len() >= limit {
                    return Err(HidError::Disconnected);
                }
            }
            self.sent.push(*report);
            Ok(())
        }
    }

    fn fill(channels: &MouseChannels, events: &[Event]) {
        for &event in events {
            channels.accumulate(event);
        }
        channels.report_signal.signal(());
    }

    /// Run the never-ending dispatcher loop for a bounded wall-clock slice,
    /// long enough for the paced burst under test to complete
    async fn run_for<S: ReportSink>(dispatcher: &mut ReportDispatcher<'_, S>, ms: u64) {
        select(dispatcher.run(), Timer::after(Duration::from_millis(ms))).await;
    }

    #[test]
    fn drains_large_motion_into_paced_burst() {
        block_on(async {
            let channels = MouseChannels::new();
            channels.set_reporting(true);
            fill(
                &channels,
                &[
                    Event::Motion(MotionData { dx: 300, dy: -10 }),
                    Event::Wheel(5),
                    Event::Button(0b001),
                ],
            );

            let mut sink = RecordingSink::new();
            let mut dispatcher = ReportDispatcher::new(&channels, &mut sink, ReportConfig::default());
            run_for(&mut dispatcher, 150).await;

            assert_eq!(
                sink.sent,
                [
                    MouseReport {
                        buttons: 0b001,
                        x: 127,
                        y: -10,
                        wheel: 5
                    },
                    MouseReport {
                        buttons: 0b001,
                        x: 127,
                        y: 0,
                        wheel: 0
                    },
                    MouseReport {
                        buttons: 0b001,
                        x: 46,
                        y: 0,
                        wheel: 0
                    },
                ]
            );
        });
    }

    #[test]
    fn reports_are_dropped_while_disconnected() {
        block_on(async {
            let channels = MouseChannels::new();
            channels.set_reporting(false);
            fill(&channels, &[Event::Motion(MotionData { dx: 10, dy: 10 })]);

            let mut sink = RecordingSink::new();
            let mut dispatcher = ReportDispatcher::new(&channels, &mut sink, ReportConfig::default());
            run_for(&mut dispatcher, 50).await;

            assert!(sink.sent.is_empty());
            // The motion was discarded, not queued for later
            assert!(!channels.take_delta().has_motion());
        });
    }

    #[test]
    fn burst_is_abandoned_when_the_sink_fails() {
        block_on(async {
            let channels = MouseChannels::new();
            channels.set_reporting(true);
            fill(&channels, &[Event::Motion(MotionData { dx: 400, dy: 0 })]);

            let mut sink = RecordingSink::new();
            sink.fail_after = Some(1);
            let mut dispatcher = ReportDispatcher::new(&channels, &mut sink, ReportConfig::default());
            run_for(&mut dispatcher, 100).await;

            assert_eq!(sink.sent.len(), 1);
        });
    }
}
