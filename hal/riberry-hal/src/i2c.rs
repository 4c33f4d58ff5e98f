//! I2C bus abstractions
//!
//! Provides traits for I2C master operations that can be implemented
//! by platform-specific HALs.

/// Coarse classification of a failed bus transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusErrorKind {
    /// No device acknowledged the address or a data byte
    Nack,
    /// The transaction did not complete in time
    Timeout,
    /// Bus-level fault (misplaced START/STOP, stuck line)
    Bus,
    /// Another master won arbitration
    ArbitrationLost,
    /// Data was lost because it was not consumed in time
    Overrun,
    /// Any other failure (device node missing, permission denied, ...)
    Other,
}

impl BusErrorKind {
    /// Whether the slave may simply not have been ready yet
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            BusErrorKind::Nack | BusErrorKind::Timeout | BusErrorKind::ArbitrationLost
        )
    }
}

/// Error returned by an [`I2cBus`] implementation
pub trait I2cError: core::fmt::Debug {
    /// Classify the error
    fn kind(&self) -> BusErrorKind;
}

impl I2cError for BusErrorKind {
    fn kind(&self) -> BusErrorKind {
        *self
    }
}

/// I2C bus master
///
/// Provides basic I2C read/write operations for communicating with
/// peripheral devices.
pub trait I2cBus {
    /// Error type for I2C operations
    type Error: I2cError;

    /// Write data to a device at the given address
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `data` - Bytes to write
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error>;

    /// Read data from a device at the given address
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `buf` - Buffer to read into
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write then read in a single transaction (repeated start)
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `write_data` - Bytes to write (typically register address)
    /// * `read_buf` - Buffer to read into
    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), Self::Error>;

    /// Read a single 8-bit register
    fn read_register(&mut self, address: u8, register: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.write_read(address, &[register], &mut buf)?;
        Ok(buf[0])
    }
}

impl<B: I2cBus + ?Sized> I2cBus for &mut B {
    type Error = B::Error;

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write(address, data)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read(address, buf)
    }

    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        (**self).write_read(address, write_data, read_buf)
    }
}
