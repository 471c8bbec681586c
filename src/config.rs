//! Tunable configuration for the mouse firmware

use embassy_time::Duration;

/// The config struct for the whole mouse.
///
/// Sensor-specific settings live with the sensor driver
/// ([`Paw3395Config`](crate::input_device::paw3395::Paw3395Config)); this
/// struct collects everything else a board passes in at startup.
#[derive(Clone, Debug, Default)]
pub struct MouseConfig {
    pub debounce: DebounceConfig,
    pub reconnect: ReconnectConfig,
    pub report: ReportConfig,
    #[cfg(feature = "storage")]
    pub storage: StorageConfig,
}

/// Debounce windows for the mechanical inputs
#[derive(Clone, Copy, Debug)]
pub struct DebounceConfig {
    /// Window after an accepted button transition during which further
    /// transitions of the same button are ignored
    pub button_window: Duration,
    /// Minimum spacing between two accepted wheel detents
    pub wheel_window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            button_window: Duration::from_millis(20),
            wheel_window: Duration::from_millis(5),
        }
    }
}

/// Reconnect backoff and post-connect tuning for the link manager
#[derive(Clone, Copy, Debug)]
pub struct ReconnectConfig {
    /// Delay before the first advertising retry
    pub initial_delay: Duration,
    /// Upper bound for the doubled retry delay
    pub max_delay: Duration,
    /// The retry counter stops increasing here; retries continue at `max_delay`
    pub max_attempts: u8,
    /// Delay between a successful connect and enabling report flow
    pub activity_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
            max_attempts: 10,
            activity_delay: Duration::from_millis(2000),
        }
    }
}

/// Report pacing for the dispatcher
#[derive(Clone, Copy, Debug)]
pub struct ReportConfig {
    /// Minimum spacing between two wire reports while connected (~144 Hz)
    pub report_interval: Duration,
    /// Backoff applied when input arrives while the link is down
    pub idle_interval: Duration,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_millis(7),
            idle_interval: Duration::from_millis(100),
        }
    }
}

/// Config for storage
#[cfg(feature = "storage")]
#[derive(Clone, Copy, Debug)]
pub struct StorageConfig {
    /// Start address of the local storage, MUST BE a multiple of the sector size.
    /// If it's 0, the storage will use the last `num_sectors` sectors of the flash.
    pub start_addr: usize,
    /// Number of sectors used for storage, >= 2
    pub num_sectors: u8,
    /// Clear the storage at boot
    pub clear_storage: bool,
}

#[cfg(feature = "storage")]
impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            start_addr: 0,
            num_sectors: 2,
            clear_storage: false,
        }
    }
}
