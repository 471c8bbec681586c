//! PAW3395 optical mouse sensor driver
//!
//! The power-up register sequence and timings follow the vendor datasheet.
//! Registers above 0x40 are banked, `0x7F` selects the bank.

use embassy_time::{Duration, Timer};
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::digital::Wait;
use embedded_hal_async::spi::SpiBus;

use crate::input_device::pointing::{MotionData, PointingDriver, PointingDriverError};

const REG_PRODUCT_ID: u8 = 0x00;
const REG_MOTION: u8 = 0x02;
const REG_DELTA_Y_H: u8 = 0x06;
const REG_MOTION_BURST: u8 = 0x16;
const REG_POWER_UP_RESET: u8 = 0x3A;
const REG_SET_RESOLUTION: u8 = 0x47;
const REG_RESOLUTION_X_LOW: u8 = 0x48;
const REG_RESOLUTION_X_HIGH: u8 = 0x49;
const REG_MOTION_CTRL: u8 = 0x5C;
const REG_BANK_SELECT: u8 = 0x7F;
// Undocumented readiness flag polled at the end of the power-up sequence
const REG_READY_STATUS: u8 = 0x6C;

const SPI_WRITE: u8 = 0x80; // BIT(7)
const PRODUCT_ID: u8 = 0x51;
const POWER_UP_RESET_VAL: u8 = 0x5A;
const READY_STATUS_VAL: u8 = 0x80;
const READY_POLL_ATTEMPTS: usize = 60;

// Burst register offsets
const BURST_DELTA_X_L: usize = 2;
const BURST_DELTA_X_H: usize = 3;
const BURST_DELTA_Y_L: usize = 4;
const BURST_DELTA_Y_H: usize = 5;
const BURST_DATA_LEN: usize = 12;

/// Resolution limits, in counts per inch
pub const CPI_MIN: u16 = 50;
pub const CPI_MAX: u16 = 26000;
pub const CPI_STEP: u16 = 50;

// Timing constants. The datasheet asks for 120/500 ns between CS edges and
// the clock; 1 us is the shortest delay the timer resolves.
const T_CS_SETTLE_US: u64 = 1;
const T_SWR_US: u64 = 5;
const T_SRAD_US: u64 = 2;
const T_SRX_US: u64 = 2;
const T_BEXIT_US: u64 = 1;
const RESET_DELAY_MS: u64 = 50;
const POWER_UP_RESET_DELAY_MS: u64 = 5;

/// Power-up initialization register settings, written in order after the
/// power-up reset. Bank switches via 0x7F are part of the sequence.
const POWER_UP_SEQUENCE: [(u8, u8); 137] = [
    (0x7F, 0x07),
    (0x40, 0x41),
    (0x7F, 0x00),
    (0x40, 0x80),
    (0x7F, 0x0E),
    (0x55, 0x0D),
    (0x56, 0x1B),
    (0x57, 0xE8),
    (0x58, 0xD5),
    (0x7F, 0x14),
    (0x42, 0xBC),
    (0x43, 0x74),
    (0x4B, 0x20),
    (0x4D, 0x00),
    (0x53, 0x0E),
    (0x7F, 0x05),
    (0x44, 0x04),
    (0x4D, 0x06),
    (0x51, 0x40),
    (0x53, 0x40),
    (0x55, 0xCA),
    (0x5A, 0xE8),
    (0x5B, 0xEA),
    (0x61, 0x31),
    (0x62, 0x64),
    (0x6D, 0xB8),
    (0x6E, 0x0F),
    (0x70, 0x02),
    (0x4A, 0x2A),
    (0x60, 0x26),
    (0x7F, 0x06),
    (0x6D, 0x70),
    (0x6E, 0x60),
    (0x6F, 0x04),
    (0x53, 0x02),
    (0x55, 0x11),
    (0x7A, 0x01),
    (0x7D, 0x51),
    (0x7F, 0x07),
    (0x41, 0x10),
    (0x42, 0x32),
    (0x43, 0x00),
    (0x7F, 0x08),
    (0x71, 0x4F),
    (0x7F, 0x09),
    (0x62, 0x1F),
    (0x63, 0x1F),
    (0x65, 0x03),
    (0x66, 0x03),
    (0x67, 0x1F),
    (0x68, 0x1F),
    (0x69, 0x03),
    (0x6A, 0x03),
    (0x6C, 0x1F),
    (0x6D, 0x1F),
    (0x51, 0x04),
    (0x53, 0x20),
    (0x54, 0x20),
    (0x71, 0x0C),
    (0x72, 0x07),
    (0x73, 0x07),
    (0x7F, 0x0A),
    (0x4A, 0x14),
    (0x4C, 0x14),
    (0x55, 0x19),
    (0x7F, 0x14),
    (0x4B, 0x30),
    (0x4C, 0x03),
    (0x61, 0x0B),
    (0x62, 0x0A),
    (0x63, 0x02),
    (0x7F, 0x15),
    (0x4C, 0x02),
    (0x56, 0x02),
    (0x41, 0x91),
    (0x4D, 0x0A),
    (0x7F, 0x0C),
    (0x4A, 0x10),
    (0x4B, 0x0C),
    (0x4C, 0x40),
    (0x41, 0x25),
    (0x55, 0x18),
    (0x56, 0x14),
    (0x49, 0x0A),
    (0x42, 0x00),
    (0x43, 0x2D),
    (0x44, 0x0C),
    (0x54, 0x1A),
    (0x5A, 0x0D),
    (0x5F, 0x1E),
    (0x5B, 0x05),
    (0x5E, 0x0F),
    (0x7F, 0x0D),
    (0x48, 0xDD),
    (0x4F, 0x03),
    (0x52, 0x49),
    (0x51, 0x00),
    (0x54, 0x5B),
    (0x53, 0x00),
    (0x56, 0x64),
    (0x55, 0x00),
    (0x58, 0xA5),
    (0x57, 0x02),
    (0x5A, 0x29),
    (0x5B, 0x47),
    (0x5C, 0x81),
    (0x5D, 0x40),
    (0x71, 0xDC),
    (0x70, 0x07),
    (0x73, 0x00),
    (0x72, 0x08),
    (0x75, 0xDC),
    (0x74, 0x07),
    (0x77, 0x00),
    (0x76, 0x08),
    (0x7F, 0x10),
    (0x4C, 0xD0),
    (0x7F, 0x00),
    (0x4F, 0x63),
    (0x4E, 0x00),
    (0x52, 0x63),
    (0x51, 0x00),
    (0x54, 0x54),
    (0x5A, 0x10),
    (0x77, 0x4F),
    (0x47, 0x01),
    (0x5B, 0x40),
    (0x64, 0x60),
    (0x65, 0x06),
    (0x66, 0x13),
    (0x67, 0x0F),
    (0x78, 0x01),
    (0x79, 0x9C),
    (0x40, 0x00),
    (0x55, 0x02),
    (0x23, 0x70),
    (0x22, 0x01),
];

// Applied when the readiness poll never sees 0x80
const READY_FALLBACK: [(u8, u8); 3] = [(0x7F, 0x14), (0x6C, 0x00), (0x7F, 0x00)];

// Final writes after the readiness poll, ending back on bank 0
const POWER_UP_CLOSING: [(u8, u8); 5] = [
    (0x22, 0x00),
    (0x55, 0x00),
    (0x7F, 0x07),
    (0x40, 0x40),
    (0x7F, 0x00),
];

/// PAW3395 configuration
#[derive(Clone)]
pub struct Paw3395Config {
    /// CPI resolution (50-26000, step 50)
    pub cpi: u16,
    /// Invert X axis (sensor mounted reversed)
    pub invert_x: bool,
    /// Invert Y axis
    pub invert_y: bool,
    /// Swap X and Y axes
    pub swap_xy: bool,
}

impl Default for Paw3395Config {
    fn default() -> Self {
        Self {
            cpi: 1600,
            invert_x: false,
            invert_y: false,
            swap_xy: false,
        }
    }
}

/// PAW3395 error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Paw3395Error {
    /// SPI communication error
    Spi,
    /// Invalid product ID detected
    InvalidProductId(u8),
}

impl From<Paw3395Error> for PointingDriverError {
    fn from(e: Paw3395Error) -> Self {
        match e {
            Paw3395Error::Spi => PointingDriverError::Spi,
            Paw3395Error::InvalidProductId(id) => PointingDriverError::InvalidProductId(id),
        }
    }
}

/// Register value programmed into `RESOLUTION_X_LOW`/`HIGH` for a CPI setting
pub(crate) fn cpi_register_value(cpi: u16) -> u16 {
    (cpi.clamp(CPI_MIN, CPI_MAX) / CPI_STEP) - 1
}

/// Extract the X/Y deltas from a motion burst buffer
pub(crate) fn parse_motion(burst: &[u8; BURST_DATA_LEN]) -> MotionData {
    MotionData {
        dx: i16::from_le_bytes([burst[BURST_DELTA_X_L], burst[BURST_DELTA_X_H]]),
        dy: i16::from_le_bytes([burst[BURST_DELTA_Y_L], burst[BURST_DELTA_Y_H]]),
    }
}

/// PAW3395 driver using embedded-hal SPI traits
pub struct Paw3395<SPI, CS, MOTION>
where
    SPI: SpiBus,
    CS: OutputPin,
    MOTION: InputPin + Wait,
{
    spi: SPI,
    cs: CS,
    motion_gpio: Option<MOTION>,
    config: Paw3395Config,
}

impl<SPI, CS, MOTION> Paw3395<SPI, CS, MOTION>
where
    SPI: SpiBus,
    CS: OutputPin,
    MOTION: InputPin + Wait,
{
    /// Create a new PAW3395 driver instance
    pub fn new(spi: SPI, cs: CS, motion_gpio: Option<MOTION>, config: Paw3395Config) -> Self {
        Self {
            spi,
            cs,
            motion_gpio,
            config,
        }
    }

    /// The active sensor resolution
    pub fn cpi(&self) -> u16 {
        self.config.cpi
    }

    async fn write_reg(&mut self, register: u8, value: u8) -> Result<(), Paw3395Error> {
        let _ = self.cs.set_low();
        Timer::after(Duration::from_micros(T_CS_SETTLE_US)).await;

        // Send address with write bit (bit 7 = 1)
        self.spi
            .write(&[register | SPI_WRITE, value])
            .await
            .map_err(|_| Paw3395Error::Spi)?;

        Timer::after(Duration::from_micros(T_CS_SETTLE_US)).await;
        let _ = self.cs.set_high();

        Timer::after(Duration::from_micros(T_SWR_US)).await;

        Ok(())
    }

    async fn read_reg(&mut self, register: u8) -> Result<u8, Paw3395Error> {
        let _ = self.cs.set_low();
        Timer::after(Duration::from_micros(T_CS_SETTLE_US)).await;

        // Send address with read bit (bit 7 = 0)
        self.spi
            .write(&[register & 0x7F])
            .await
            .map_err(|_| Paw3395Error::Spi)?;

        Timer::after(Duration::from_micros(T_SRAD_US)).await;

        let mut value = [0u8];
        self.spi.read(&mut value).await.map_err(|_| Paw3395Error::Spi)?;

        Timer::after(Duration::from_micros(T_CS_SETTLE_US)).await;
        let _ = self.cs.set_high();

        Timer::after(Duration::from_micros(T_SRX_US)).await;

        Ok(value[0])
    }

    async fn read_burst(&mut self, data: &mut [u8; BURST_DATA_LEN]) -> Result<(), Paw3395Error> {
        let _ = self.cs.set_low();
        Timer::after(Duration::from_micros(T_CS_SETTLE_US)).await;

        self.spi
            .write(&[REG_MOTION_BURST & 0x7F])
            .await
            .map_err(|_| Paw3395Error::Spi)?;

        Timer::after(Duration::from_micros(T_SRAD_US)).await;

        self.spi.read(data).await.map_err(|_| Paw3395Error::Spi)?;

        Timer::after(Duration::from_micros(T_CS_SETTLE_US)).await;
        let _ = self.cs.set_high();

        Timer::after(Duration::from_micros(T_BEXIT_US)).await;

        Ok(())
    }

    async fn load_power_up_settings(&mut self) -> Result<(), Paw3395Error> {
        for (register, value) in POWER_UP_SEQUENCE {
            self.write_reg(register, value).await?;
        }

        Timer::after(Duration::from_millis(1)).await;

        // Poll the readiness flag at 1 ms intervals, up to 60 reads
        let mut ready = false;
        for _ in 0..READY_POLL_ATTEMPTS {
            if self.read_reg(REG_READY_STATUS).await? == READY_STATUS_VAL {
                ready = true;
                break;
            }
            Timer::after(Duration::from_millis(1)).await;
        }

        if !ready {
            warn!("Sensor readiness flag never set, applying fallback writes");
            for (register, value) in READY_FALLBACK {
                self.write_reg(register, value).await?;
            }
        }

        for (register, value) in POWER_UP_CLOSING {
            self.write_reg(register, value).await?;
        }

        Ok(())
    }

    async fn power_up(&mut self) -> Result<(), Paw3395Error> {
        Timer::after(Duration::from_millis(RESET_DELAY_MS)).await;

        // Reset the SPI port
        let _ = self.cs.set_high();
        let _ = self.cs.set_low();

        self.write_reg(REG_POWER_UP_RESET, POWER_UP_RESET_VAL).await?;
        Timer::after(Duration::from_millis(POWER_UP_RESET_DELAY_MS)).await;

        self.load_power_up_settings().await?;

        // Read the motion registers once regardless of the motion bit state
        for register in REG_MOTION..=REG_DELTA_Y_H {
            self.read_reg(register).await?;
        }

        let product_id = self.read_reg(REG_PRODUCT_ID).await?;
        if product_id != PRODUCT_ID {
            error!("PAW3395: invalid product id: {:#04x}", product_id);
            return Err(Paw3395Error::InvalidProductId(product_id));
        }
        info!("PAW3395 detected, product ID: {:#04x}", product_id);

        self.set_cpi(self.config.cpi).await?;

        Ok(())
    }

    /// Program the sensor resolution. Out-of-range values are clamped to the
    /// 50-26000 CPI range; X and Y share one setting.
    pub async fn set_cpi(&mut self, cpi: u16) -> Result<(), Paw3395Error> {
        let cpi = cpi.clamp(CPI_MIN, CPI_MAX);
        let reg_value = cpi_register_value(cpi);

        self.write_reg(REG_MOTION_CTRL, 0x00).await?;
        self.write_reg(REG_RESOLUTION_X_LOW, (reg_value & 0xFF) as u8).await?;
        self.write_reg(REG_RESOLUTION_X_HIGH, ((reg_value >> 8) & 0x0F) as u8)
            .await?;
        self.write_reg(REG_SET_RESOLUTION, 0x01).await?;

        self.config.cpi = cpi;
        debug!("Sensor resolution set to {} CPI", cpi);

        Ok(())
    }
}

impl<SPI, CS, MOTION> PointingDriver for Paw3395<SPI, CS, MOTION>
where
    SPI: SpiBus,
    CS: OutputPin,
    MOTION: InputPin + Wait,
{
    type MOTION = MOTION;

    async fn init(&mut self) -> Result<(), PointingDriverError> {
        let _ = self.cs.set_high();
        Timer::after(Duration::from_millis(1)).await;

        self.power_up().await?;
        Ok(())
    }

    async fn read_motion(&mut self) -> Result<MotionData, PointingDriverError> {
        let mut burst = [0u8; BURST_DATA_LEN];
        self.read_burst(&mut burst).await?;

        let mut motion = parse_motion(&burst);

        if self.config.invert_x {
            motion.dx = -motion.dx;
        }
        if self.config.invert_y {
            motion.dy = -motion.dy;
        }
        if self.config.swap_xy {
            (motion.dx, motion.dy) = (motion.dy, motion.dx);
        }

        Ok(motion)
    }

    async fn set_cpi(&mut self, cpi: u16) -> Result<u16, PointingDriverError> {
        Paw3395::set_cpi(self, cpi).await?;
        Ok(self.config.cpi)
    }

    /// Check if motion is pending (motion GPIO is active low)
    fn motion_pending(&mut self) -> bool {
        match &mut self.motion_gpio {
            Some(gpio) => gpio.is_low().unwrap_or(true),
            None => true,
        }
    }

    fn motion_gpio(&mut self) -> Option<&mut Self::MOTION> {
        self.motion_gpio.as_mut()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cpi_register_value() {
        assert_eq!(cpi_register_value(50), 0);
        assert_eq!(cpi_register_value(1600), 31);
        assert_eq!(cpi_register_value(26000), 519);
        // Out-of-range values clamp to the limits
        assert_eq!(cpi_register_value(10), 0);
        assert_eq!(cpi_register_value(30000), 519);
    }

    #[test]
    fn test_cpi_register_bytes() {
        let reg = cpi_register_value(26000);
        assert_eq!((reg & 0xFF) as u8, 0x07);
        assert_eq!(((reg >> 8) & 0x0F) as u8, 0x02);
    }

    #[test]
    fn test_parse_motion() {
        let mut burst = [0u8; BURST_DATA_LEN];
        burst[BURST_DELTA_X_L] = 0xFE;
        burst[BURST_DELTA_X_H] = 0xFF;
        burst[BURST_DELTA_Y_L] = 0x34;
        burst[BURST_DELTA_Y_H] = 0x12;
        let motion = parse_motion(&burst);
        assert_eq!(motion.dx, -2);
        assert_eq!(motion.dy, 0x1234);
    }

    #[test]
    fn test_power_up_sequence_shape() {
        // The sequence starts on bank 7 and the final write arms the
        // readiness handshake
        assert_eq!(POWER_UP_SEQUENCE[0], (REG_BANK_SELECT, 0x07));
        assert_eq!(POWER_UP_SEQUENCE[POWER_UP_SEQUENCE.len() - 1], (0x22, 0x01));
        // The closing writes leave the sensor back on bank 0
        assert_eq!(POWER_UP_CLOSING[POWER_UP_CLOSING.len() - 1], (REG_BANK_SELECT, 0x00));
    }
}
