//! Battery sensor trait

use crate::telemetry::BatterySample;

/// Errors that can occur while reading a battery sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The bus transaction failed
    Bus,
}

/// Trait for battery fuel gauges
///
/// Takes `&mut self` because every read is a bus transaction.
pub trait BatterySensor {
    /// Read the raw state of charge, 0-100
    fn read_percentage(&mut self) -> Result<u8, SensorError>;

    /// Read the raw charging flag
    fn read_charging(&mut self) -> Result<bool, SensorError>;

    /// Read both values; fails if either read fails
    fn read_sample(&mut self) -> Result<BatterySample, SensorError> {
        let percentage = self.read_percentage()?;
        let charging = self.read_charging()?;
        Ok(BatterySample {
            percentage,
            charging,
        })
    }
}
