//! Persistent settings in a wear-levelled flash key-value store

pub mod dummy_flash;

use core::ops::Range;

use byteorder::{BigEndian, ByteOrder};
use embassy_embedded_hal::adapter::BlockingAsync;
use embedded_storage::nor_flash::NorFlash;
use embedded_storage_async::nor_flash::NorFlash as AsyncNorFlash;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{SerializationError, Value, fetch_item, store_item};

use crate::channel::MouseChannels;
use crate::config::StorageConfig;

/// Operations sent to the flash worker from other tasks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashOperationMessage {
    /// Persist the sensor resolution
    SensorCpi(u16),
    /// Clear the storage
    Reset,
}

/// Keys of the stored items
#[repr(u32)]
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum StorageKeys {
    StorageConfig = 0,
    SensorCpi = 1,
}

impl StorageKeys {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(StorageKeys::StorageConfig),
            1 => Some(StorageKeys::SensorCpi),
            _ => None,
        }
    }
}

/// Marker item distinguishing initialized storage from a blank sector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct LocalStorageConfig {
    pub(crate) enable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum StorageData {
    StorageConfig(LocalStorageConfig),
    SensorCpi(u16),
}

impl Value<'_> for StorageData {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        if buffer.len() < 3 {
            return Err(SerializationError::BufferTooSmall);
        }
        match self {
            StorageData::StorageConfig(c) => {
                buffer[0] = StorageKeys::StorageConfig as u8;
                // If enabled, write 0 to flash
                buffer[1] = if c.enable { 0 } else { 1 };
                Ok(2)
            }
            StorageData::SensorCpi(cpi) => {
                buffer[0] = StorageKeys::SensorCpi as u8;
                BigEndian::write_u16(&mut buffer[1..3], *cpi);
                Ok(3)
            }
        }
    }

    fn deserialize_from(buffer: &[u8]) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        if buffer.is_empty() {
            return Err(SerializationError::InvalidFormat);
        }
        match StorageKeys::from_u8(buffer[0]) {
            Some(StorageKeys::StorageConfig) => {
                if buffer.len() < 2 {
                    return Err(SerializationError::BufferTooSmall);
                }
                Ok(StorageData::StorageConfig(LocalStorageConfig {
                    enable: buffer[1] == 0,
                }))
            }
            Some(StorageKeys::SensorCpi) => {
                if buffer.len() < 3 {
                    return Err(SerializationError::BufferTooSmall);
                }
                Ok(StorageData::SensorCpi(BigEndian::read_u16(&buffer[1..3])))
            }
            None => Err(SerializationError::Custom(0)),
        }
    }
}

const STORAGE_BUFFER_SIZE: usize = 32;

/// Wrap a blocking flash into an async one
pub fn async_flash_wrapper<F: NorFlash>(flash: F) -> BlockingAsync<F> {
    embassy_embedded_hal::adapter::BlockingAsync::new(flash)
}

/// Flash-backed settings storage and its worker.
///
/// Settings are stored as a key-value map in the configured sector range.
/// Writes go through the flash channel so all flash access stays on one
/// task; reads happen once at startup before the workers are spawned.
pub struct Storage<F: AsyncNorFlash> {
    flash: F,
    storage_range: Range<u32>,
    buffer: [u8; STORAGE_BUFFER_SIZE],
}

impl<F: AsyncNorFlash> Storage<F> {
    pub async fn new(flash: F, config: &StorageConfig) -> Self {
        assert!(
            config.num_sectors >= 2,
            "Number of used sectors for storage must be larger than 1"
        );

        info!(
            "Flash capacity {} KB, using {} KB ({} sectors) starting from {:#X} as storage",
            flash.capacity() / 1024,
            (F::ERASE_SIZE * config.num_sectors as usize) / 1024,
            config.num_sectors,
            config.start_addr,
        );

        // start_addr == 0 means the last `num_sectors` sectors of the flash
        let storage_range = if config.start_addr == 0 {
            (flash.capacity() - config.num_sectors as usize * F::ERASE_SIZE) as u32..flash.capacity() as u32
        } else {
            assert!(
                config.start_addr % F::ERASE_SIZE == 0,
                "Storage's start addr MUST BE a multiple of the sector size"
            );
            config.start_addr as u32
                ..(config.start_addr + config.num_sectors as usize * F::ERASE_SIZE) as u32
        };

        let mut storage = Self {
            flash,
            storage_range,
            buffer: [0; STORAGE_BUFFER_SIZE],
        };

        if !storage.check_enable().await || config.clear_storage {
            debug!("Clearing storage!");
            let _ = sequential_storage::erase_all(&mut storage.flash, storage.storage_range.clone()).await;

            store_item(
                &mut storage.flash,
                storage.storage_range.clone(),
                &mut NoCache::new(),
                &mut storage.buffer,
                &(StorageKeys::StorageConfig as u32),
                &StorageData::StorageConfig(LocalStorageConfig { enable: true }),
            )
            .await
            .ok();
        }

        storage
    }

    /// The persisted sensor resolution, if one was ever saved
    pub async fn read_cpi(&mut self) -> Option<u16> {
        match fetch_item::<u32, StorageData, _>(
            &mut self.flash,
            self.storage_range.clone(),
            &mut NoCache::new(),
            &mut self.buffer,
            &(StorageKeys::SensorCpi as u32),
        )
        .await
        {
            Ok(Some(StorageData::SensorCpi(cpi))) => Some(cpi),
            _ => None,
        }
    }

    pub async fn run(&mut self, channels: &MouseChannels) -> ! {
        let mut storage_cache = NoCache::new();
        loop {
            let operation = channels.flash_channel.receive().await;
            debug!("Flash operation: {:?}", operation);
            let result = match operation {
                FlashOperationMessage::SensorCpi(cpi) => {
                    store_item(
                        &mut self.flash,
                        self.storage_range.clone(),
                        &mut storage_cache,
                        &mut self.buffer,
                        &(StorageKeys::SensorCpi as u32),
                        &StorageData::SensorCpi(cpi),
                    )
                    .await
                }
                FlashOperationMessage::Reset => {
                    sequential_storage::erase_all(&mut self.flash, self.storage_range.clone()).await
                }
            };
            if result.is_err() {
                error!("Flash operation {:?} failed", operation);
            }
        }
    }

    async fn check_enable(&mut self) -> bool {
        if let Ok(Some(StorageData::StorageConfig(config))) = fetch_item::<u32, StorageData, _>(
            &mut self.flash,
            self.storage_range.clone(),
            &mut NoCache::new(),
            &mut self.buffer,
            &(StorageKeys::StorageConfig as u32),
        )
        .await
        {
            return config.enable;
        }
        false
    }
}
