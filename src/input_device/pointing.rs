//! Common functionality across pointing sensors

use embassy_time::{Duration, Timer};
use embedded_hal::digital::InputPin;
use embedded_hal_async::digital::Wait;
use futures::future::pending;
use postcard::experimental::max_size::MaxSize;
use serde::{Deserialize, Serialize};

use crate::channel::MouseChannels;
use crate::event::Event;
use crate::input_device::InputDevice;
#[cfg(feature = "storage")]
use crate::storage::FlashOperationMessage;

/// Motion data from the sensor
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, MaxSize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionData {
    pub dx: i16,
    pub dy: i16,
}

/// Errors of pointing sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PointingDriverError {
    /// SPI communication error
    Spi,
    /// Invalid product ID detected
    InvalidProductId(u8),
    /// Initialization failed
    InitFailed,
}

/// The hardware side of a pointing sensor.
///
/// `motion_gpio` returns the motion IRQ line when the board wired one up;
/// without it the worker falls back to interval polling.
pub trait PointingDriver {
    type MOTION: InputPin + Wait;

    async fn init(&mut self) -> Result<(), PointingDriverError>;
    async fn read_motion(&mut self) -> Result<MotionData, PointingDriverError>;
    /// Program the sensor resolution, returning the value actually applied
    /// after the driver clamped it to the hardware's range
    async fn set_cpi(&mut self, cpi: u16) -> Result<u16, PointingDriverError>;
    fn motion_pending(&mut self) -> bool;
    fn motion_gpio(&mut self) -> Option<&mut Self::MOTION>;
}

/// Initialization state for the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitState {
    Pending,
    Initializing(u8),
    Ready,
    Failed,
}

/// The worker wrapping a [`PointingDriver`] into an [`InputDevice`].
///
/// Emits one `Event::Motion` per non-zero sensor sample; accumulation across
/// samples happens downstream in the aggregator. A sensor that exhausts its
/// init retries parks the worker, the rest of the mouse keeps working.
pub struct PointingDevice<S: PointingDriver> {
    pub sensor: S,
    pub init_state: InitState,
    pub poll_interval: Duration,
}

impl<S> PointingDevice<S>
where
    S: PointingDriver,
{
    pub(crate) const MAX_INIT_RETRIES: u8 = 3;

    pub fn new(sensor: S, poll_interval: Duration) -> Self {
        Self {
            sensor,
            init_state: InitState::Pending,
            poll_interval,
        }
    }

    pub(crate) async fn try_init(&mut self) -> bool {
        match self.init_state {
            InitState::Ready => return true,
            InitState::Failed => return false,
            InitState::Pending => {
                self.init_state = InitState::Initializing(0);
            }
            InitState::Initializing(_) => {}
        }

        if let InitState::Initializing(retry_count) = self.init_state {
            info!("Initializing sensor (attempt {})", retry_count + 1);

            match self.sensor.init().await {
                Ok(()) => {
                    info!("Sensor initialized successfully");
                    self.init_state = InitState::Ready;
                    return true;
                }
                Err(e) => {
                    error!("Sensor init failed: {:?}", e);
                    if retry_count + 1 >= Self::MAX_INIT_RETRIES {
                        error!("Max retries reached, running without the sensor");
                        self.init_state = InitState::Failed;
                        return false;
                    }
                    self.init_state = InitState::Initializing(retry_count + 1);
                    Timer::after(Duration::from_millis(100)).await;
                    return false;
                }
            }
        }

        false
    }

    /// Change the sensor resolution at runtime and persist it through the
    /// flash channel, so the setting survives a power cycle.
    pub async fn update_cpi(
        &mut self,
        cpi: u16,
        channels: &MouseChannels,
    ) -> Result<u16, PointingDriverError> {
        let applied = self.sensor.set_cpi(cpi).await?;
        info!("Sensor resolution changed to {} CPI", applied);
        #[cfg(feature = "storage")]
        channels.request_flash_operation(FlashOperationMessage::SensorCpi(applied));
        #[cfg(not(feature = "storage"))]
        let _ = channels;
        Ok(applied)
    }
}

impl<S> InputDevice for PointingDevice<S>
where
    S: PointingDriver,
{
    async fn read_event(&mut self) -> Event {
        loop {
            match self.init_state {
                InitState::Ready => {}
                InitState::Failed => {
                    // Degraded mode: park this worker, buttons and wheel stay alive
                    pending::<()>().await;
                    continue;
                }
                _ => {
                    if !self.try_init().await {
                        continue;
                    }
                }
            }

            if let Some(gpio) = self.sensor.motion_gpio() {
                // Motion IRQ line is active low
                let _ = gpio.wait_for_low().await;
            } else {
                Timer::after(self.poll_interval).await;
            }

            if !self.sensor.motion_pending() {
                continue;
            }

            match self.sensor.read_motion().await {
                Ok(motion) if motion.dx != 0 || motion.dy != 0 => {
                    return Event::Motion(motion);
                }
                Ok(_) => {}
                Err(_e) => {
                    warn!("Motion read error");
                }
            }
        }
    }
}
