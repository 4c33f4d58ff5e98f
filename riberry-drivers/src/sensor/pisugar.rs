//! PiSugar battery hat
//!
//! The hat's fuel gauge exposes the state of charge and the charger status
//! as single-byte registers readable with a plain register read.

use riberry_core::traits::{BatterySensor, SensorError};
use riberry_hal::I2cBus;

/// Default 7-bit address of the fuel gauge
pub const PISUGAR_ADDRESS: u8 = 0x57;

/// Power status register; bit 7 is set while external power charges the cell
const REG_POWER_STATUS: u8 = 0x02;

/// State of charge register, 0-100
const REG_PERCENTAGE: u8 = 0x2A;

/// PiSugar fuel gauge on an I2C bus
pub struct PiSugarSensor<B> {
    bus: B,
    address: u8,
}

impl<B: I2cBus> PiSugarSensor<B> {
    /// Create a driver for a gauge at `address`
    pub fn new(bus: B, address: u8) -> Self {
        Self { bus, address }
    }

    fn read(&mut self, register: u8) -> Result<u8, SensorError> {
        self.bus
            .read_register(self.address, register)
            .map_err(|_| SensorError::Bus)
    }
}

impl<B: I2cBus> BatterySensor for PiSugarSensor<B> {
    fn read_percentage(&mut self) -> Result<u8, SensorError> {
        self.read(REG_PERCENTAGE)
    }

    fn read_charging(&mut self) -> Result<bool, SensorError> {
        self.read(REG_POWER_STATUS).map(|status| status >> 7 == 1)
    }
}
