//! Link manager: advertising, reconnect backoff and activity gating
//!
//! A single worker owns the whole connection lifecycle, so there is never
//! more than one advertising attempt or pending retry at a time. Timed work
//! (retry deadlines, the post-connect settling delay) is kept as `Option`
//! deadlines inside the worker instead of spawned timers, which makes
//! cancellation a plain assignment.

use core::future::pending;

use embassy_futures::select::{Either3, select3};
use embassy_time::{Duration, Instant, Timer};

use crate::channel::MouseChannels;
use crate::config::ReconnectConfig;

use super::{ConnectionState, LinkDriver, LinkMessage};

/// Exponential backoff state for reconnect attempts.
///
/// The delay doubles per failed attempt, starting at the configured initial
/// delay and saturating at the maximum. The attempt counter stops at
/// `max_attempts`, so retries continue forever at the capped delay.
pub struct ReconnectSchedule {
    attempts: u8,
}

impl ReconnectSchedule {
    pub const fn new() -> Self {
        Self { attempts: 0 }
    }

    /// Delay to wait before the next attempt, advancing the schedule
    pub fn next_delay(&mut self, config: &ReconnectConfig) -> Duration {
        if self.attempts < config.max_attempts {
            self.attempts += 1;
        }
        let shift = u32::from(self.attempts.max(1) - 1).min(31);
        let millis = config
            .initial_delay
            .as_millis()
            .saturating_mul(1u64 << shift);
        Duration::from_millis(millis.min(config.max_delay.as_millis()))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }
}

impl Default for ReconnectSchedule {
    fn default() -> Self {
        Self::new()
    }
}

/// Await a deadline, or forever when none is armed
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => Timer::at(at).await,
        None => pending::<()>().await,
    }
}

/// The connection lifecycle worker.
///
/// Consumes [`LinkMessage`]s and drives the radio through [`LinkDriver`].
/// On connect, report dispatch is enabled only after the configured activity
/// delay, so the link settles before traffic starts. On disconnect the
/// manager re-advertises immediately; only a failed advertising attempt
/// arms the backoff schedule.
pub struct LinkManager<'a, D: LinkDriver> {
    channels: &'a MouseChannels,
    driver: D,
    config: ReconnectConfig,
    state: ConnectionState,
    schedule: ReconnectSchedule,
    reconnect_at: Option<Instant>,
    activity_at: Option<Instant>,
    activity_running: bool,
}

impl<'a, D: LinkDriver> LinkManager<'a, D> {
    pub fn new(channels: &'a MouseChannels, driver: D, config: ReconnectConfig) -> Self {
        Self {
            channels,
            driver,
            config,
            state: ConnectionState::Disconnected,
            schedule: ReconnectSchedule::new(),
            reconnect_at: None,
            activity_at: None,
            activity_running: false,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let message = match select3(
                self.channels.link_channel.receive(),
                deadline(self.reconnect_at),
                deadline(self.activity_at),
            )
            .await
            {
                Either3::First(message) => message,
                Either3::Second(()) => {
                    self.reconnect_at = None;
                    LinkMessage::StartAdvertising
                }
                Either3::Third(()) => {
                    self.activity_at = None;
                    LinkMessage::StartActivity
                }
            };
            self.handle(message).await;
        }
    }

    async fn handle(&mut self, message: LinkMessage) {
        match message {
            LinkMessage::StartAdvertising | LinkMessage::HostSync => {
                self.try_advertise().await;
            }
            LinkMessage::Connected => {
                info!("Link connected");
                self.state = ConnectionState::Connected;
                self.schedule.reset();
                self.reconnect_at = None;
                self.activity_at = Some(Instant::now() + self.config.activity_delay);
            }
            LinkMessage::Disconnected(reason) => {
                warn!("Link disconnected, reason {}", reason);
                self.stop_activity();
                self.state = ConnectionState::Disconnected;
                self.activity_at = None;
                // A lost connection is retried right away; backoff only
                // kicks in once advertising itself fails
                self.try_advertise().await;
            }
            LinkMessage::Reset(reason) => {
                warn!("Radio stack reset, reason {}", reason);
                self.stop_activity();
                self.state = ConnectionState::Disconnected;
                self.reconnect_at = None;
                self.activity_at = None;
                self.schedule.reset();
            }
            LinkMessage::StartActivity => {
                if self.state == ConnectionState::Connected && !self.activity_running {
                    info!("Report dispatch enabled");
                    self.activity_running = true;
                    self.channels.set_reporting(true);
                }
            }
            LinkMessage::StopActivity => {
                self.stop_activity();
            }
        }
    }

    async fn try_advertise(&mut self) {
        if self.state == ConnectionState::Connected {
            debug!("Already connected, ignoring advertising request");
            return;
        }

        match self.driver.start_advertising().await {
            Ok(()) => {
                info!("Advertising started");
                self.state = ConnectionState::Advertising;
                self.schedule.reset();
                self.reconnect_at = None;
            }
            Err(e) => {
                let delay = self.schedule.next_delay(&self.config);
                warn!(
                    "Advertising failed ({:?}), retrying in {} ms",
                    e,
                    delay.as_millis()
                );
                self.state = ConnectionState::Disconnected;
                self.reconnect_at = Some(Instant::now() + delay);
            }
        }
    }

    fn stop_activity(&mut self) {
        if self.activity_running {
            info!("Report dispatch disabled");
            self.activity_running = false;
        }
        self.channels.set_reporting(false);
    }
}

#[cfg(test)]
mod test {
    use embassy_futures::block_on;

    use super::*;
    use crate::ble::LinkError;

    // Init logger for tests
    #[ctor::ctor]
    fn init_log() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }

    struct FakeLink {
        fail: bool,
        calls: usize,
    }

    impl FakeLink {
        fn new() -> Self {
            Self {
                fail: false,
                calls: 0,
            }
        }
    }

    impl LinkDriver for FakeLink {
        async fn start_advertising(&mut self) -> Result<(), LinkError> {
            self.calls += 1;
            if self.fail {
                Err(LinkError::AdvertiseFailed)
            } else {
                Ok(())
            }
        }
    }

    fn manager(channels: &MouseChannels) -> LinkManager<'_, FakeLink> {
        LinkManager::new(channels, FakeLink::new(), ReconnectConfig::default())
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let config = ReconnectConfig::default();
        let mut schedule = ReconnectSchedule::new();

        let delays: [u64; 8] = core::array::from_fn(|_| schedule.next_delay(&config).as_millis());
        assert_eq!(delays, [1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]);

        // The attempt counter stops at the configured maximum
        for _ in 0..20 {
            schedule.next_delay(&config);
        }
        assert_eq!(schedule.attempts(), config.max_attempts);

        schedule.reset();
        assert_eq!(schedule.attempts(), 0);
        assert_eq!(schedule.next_delay(&config).as_millis(), 1000);
    }

    #[test]
    fn failed_advertising_arms_a_retry() {
        block_on(async {
            let channels = MouseChannels::new();
            let mut manager = manager(&channels);
            manager.driver.fail = true;

            manager.handle(LinkMessage::HostSync).await;
            assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
            assert_eq!(manager.driver.calls, 1);
            assert!(manager.reconnect_at.is_some());
            assert_eq!(manager.schedule.attempts(), 1);

            // A later success clears the schedule again
            manager.driver.fail = false;
            manager.handle(LinkMessage::StartAdvertising).await;
            assert_eq!(manager.connection_state(), ConnectionState::Advertising);
            assert!(manager.reconnect_at.is_none());
            assert_eq!(manager.schedule.attempts(), 0);
        });
    }

    #[test]
    fn connect_arms_activity_and_clears_retry() {
        block_on(async {
            let channels = MouseChannels::new();
            let mut manager = manager(&channels);
            manager.driver.fail = true;
            manager.handle(LinkMessage::HostSync).await;
            assert!(manager.reconnect_at.is_some());

            manager.handle(LinkMessage::Connected).await;
            assert_eq!(manager.connection_state(), ConnectionState::Connected);
            assert!(manager.reconnect_at.is_none());
            assert!(manager.activity_at.is_some());
            // Reporting stays off until the activity delay elapses
            assert!(!channels.is_reporting());

            manager.activity_at = None;
            manager.handle(LinkMessage::StartActivity).await;
            assert!(channels.is_reporting());
        });
    }

    #[test]
    fn activity_is_ignored_unless_connected() {
        block_on(async {
            let channels = MouseChannels::new();
            let mut manager = manager(&channels);
            manager.handle(LinkMessage::StartActivity).await;
            assert!(!channels.is_reporting());
        });
    }

    #[test]
    fn disconnect_readvertises_and_stops_reporting() {
        block_on(async {
            let channels = MouseChannels::new();
            let mut manager = manager(&channels);
            manager.handle(LinkMessage::Connected).await;
            manager.handle(LinkMessage::StartActivity).await;
            assert!(channels.is_reporting());

            manager.handle(LinkMessage::Disconnected(0x13)).await;
            assert!(!channels.is_reporting());
            // Re-advertising happened without waiting for a retry deadline
            assert_eq!(manager.driver.calls, 1);
            assert_eq!(manager.connection_state(), ConnectionState::Advertising);
            assert!(manager.activity_at.is_none());
        });
    }

    #[test]
    fn reset_clears_all_pending_work() {
        block_on(async {
            let channels = MouseChannels::new();
            let mut manager = manager(&channels);
            manager.driver.fail = true;
            manager.handle(LinkMessage::HostSync).await;
            manager.handle(LinkMessage::HostSync).await;
            assert_eq!(manager.schedule.attempts(), 2);

            manager.handle(LinkMessage::Reset(0x01)).await;
            assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
            assert!(manager.reconnect_at.is_none());
            assert!(manager.activity_at.is_none());
            assert_eq!(manager.schedule.attempts(), 0);
            assert!(!channels.is_reporting());
        });
    }

    #[test]
    fn disconnect_then_reset_leaves_a_clean_slate() {
        block_on(async {
            let channels = MouseChannels::new();
            let mut manager = manager(&channels);
            manager.handle(LinkMessage::Connected).await;
            manager.handle(LinkMessage::StartActivity).await;
            assert!(channels.is_reporting());

            // The re-advertise after the disconnect fails, arming a retry
            manager.driver.fail = true;
            manager.handle(LinkMessage::Disconnected(0x08)).await;
            assert!(manager.reconnect_at.is_some());
            assert_eq!(manager.schedule.attempts(), 1);

            manager.handle(LinkMessage::Reset(0x01)).await;
            assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
            assert_eq!(manager.schedule.attempts(), 0);
            assert!(manager.reconnect_at.is_none());
            assert!(manager.activity_at.is_none());
            assert!(!channels.is_reporting());
        });
    }

    #[test]
    fn stop_activity_is_idempotent() {
        block_on(async {
            let channels = MouseChannels::new();
            let mut manager = manager(&channels);
            manager.handle(LinkMessage::Connected).await;
            manager.handle(LinkMessage::StartActivity).await;
            manager.handle(LinkMessage::StopActivity).await;
            manager.handle(LinkMessage::StopActivity).await;
            assert!(!channels.is_reporting());

            // Activity can be re-armed while still connected
            manager.handle(LinkMessage::StartActivity).await;
            assert!(channels.is_reporting());
        });
    }
}
