//! I2C bus variants
//!
//! Raspberry Pi and Radxa adapters are driven through `linux-embedded-hal`,
//! which issues combined transfers via `I2C_RDWR`. The Khadas adapter only
//! works with plain `read(2)`/`write(2)` on the character device after
//! `I2C_SLAVE`, so it gets its own variant.

use std::io;
use std::path::{Path, PathBuf};

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use linux_embedded_hal::{I2CError, I2cdev};
use riberry_hal::{BusErrorKind, I2cBus, I2cError};
use thiserror::Error;
use tracing::debug;

use crate::probe::DeviceModel;

/// Errors from the Linux bus variants
#[derive(Debug, Error)]
pub enum LinuxBusError {
    /// The device node could not be opened
    #[error("cannot open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: LinuxI2CError,
    },
    /// A transfer failed
    #[error("i2c transfer to {address:#04x} failed ({kind:?}): {detail}")]
    Transfer {
        address: u8,
        kind: BusErrorKind,
        detail: String,
    },
}

impl LinuxBusError {
    fn from_hal(address: u8, err: I2CError) -> Self {
        let kind = if is_timeout(err.inner()) {
            BusErrorKind::Timeout
        } else {
            classify_kind(err.kind())
        };
        LinuxBusError::Transfer {
            address,
            kind,
            detail: err.to_string(),
        }
    }

    fn from_device(address: u8, err: LinuxI2CError) -> Self {
        let kind = if is_timeout(&err) {
            BusErrorKind::Timeout
        } else {
            BusErrorKind::Other
        };
        LinuxBusError::Transfer {
            address,
            kind,
            detail: err.to_string(),
        }
    }
}

impl I2cError for LinuxBusError {
    fn kind(&self) -> BusErrorKind {
        match self {
            LinuxBusError::Open { .. } => BusErrorKind::Other,
            LinuxBusError::Transfer { kind, .. } => *kind,
        }
    }
}

fn classify_kind(kind: ErrorKind) -> BusErrorKind {
    match kind {
        ErrorKind::NoAcknowledge(_) => BusErrorKind::Nack,
        ErrorKind::ArbitrationLoss => BusErrorKind::ArbitrationLost,
        ErrorKind::Bus => BusErrorKind::Bus,
        ErrorKind::Overrun => BusErrorKind::Overrun,
        _ => BusErrorKind::Other,
    }
}

fn is_timeout(err: &LinuxI2CError) -> bool {
    match err {
        LinuxI2CError::Errno(code) => {
            io::Error::from_raw_os_error(*code).kind() == io::ErrorKind::TimedOut
        }
        LinuxI2CError::Io(err) => err.kind() == io::ErrorKind::TimedOut,
    }
}

/// I2C adapter exposed only as a character device
///
/// The slave address is bound to the open file, so the device is reopened
/// lazily and re-addressed whenever a different address is used.
pub struct CharDeviceBus {
    path: PathBuf,
    device: Option<(u8, LinuxI2CDevice)>,
}

impl CharDeviceBus {
    /// Create a bus for `path`; nothing is opened until the first transfer
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            device: None,
        }
    }

    /// Device node path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn device(&mut self, address: u8) -> Result<&mut LinuxI2CDevice, LinuxBusError> {
        let slot = match self.device.take() {
            Some(slot) => slot,
            None => {
                let device = LinuxI2CDevice::new(&self.path, u16::from(address)).map_err(
                    |source| LinuxBusError::Open {
                        path: self.path.clone(),
                        source,
                    },
                )?;
                debug!(path = %self.path.display(), address, "opened i2c character device");
                (address, device)
            }
        };
        let (current, device) = self.device.insert(slot);
        if *current != address {
            device
                .set_slave_address(u16::from(address))
                .map_err(|err| LinuxBusError::from_device(address, err))?;
            *current = address;
        }
        Ok(device)
    }
}

impl I2cBus for CharDeviceBus {
    type Error = LinuxBusError;

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        self.device(address)?
            .write(data)
            .map_err(|err| LinuxBusError::from_device(address, err))
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.device(address)?
            .read(buf)
            .map_err(|err| LinuxBusError::from_device(address, err))
    }

    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        // No repeated start on a plain character device
        self.write(address, write_data)?;
        self.read(address, read_buf)
    }
}

/// The bus variant selected for the running board
pub enum PeripheralBus {
    /// Raspberry Pi adapter via i2c-dev ioctls
    RaspberryPi(I2cdev),
    /// Radxa adapter via i2c-dev ioctls
    Radxa(I2cdev),
    /// Adapter driven with plain reads and writes
    GenericCharacterDevice(CharDeviceBus),
}

impl PeripheralBus {
    /// Open the bus the display is attached to
    pub fn open_display(model: DeviceModel) -> Result<Self, LinuxBusError> {
        Self::open(model, model.display_bus())
    }

    /// Open the battery sensor's bus, if the board has one
    pub fn open_battery(model: DeviceModel) -> Result<Option<Self>, LinuxBusError> {
        model
            .battery_bus()
            .map(|path| Self::open(model, path))
            .transpose()
    }

    /// Open the variant matching `model` on an explicit device node
    pub fn open(model: DeviceModel, path: &str) -> Result<Self, LinuxBusError> {
        let open_dev = || {
            I2cdev::new(path).map_err(|source| LinuxBusError::Open {
                path: PathBuf::from(path),
                source,
            })
        };
        let bus = match model {
            DeviceModel::RaspberryPi => PeripheralBus::RaspberryPi(open_dev()?),
            DeviceModel::RadxaZero => PeripheralBus::Radxa(open_dev()?),
            DeviceModel::KhadasVim4 => {
                PeripheralBus::GenericCharacterDevice(CharDeviceBus::new(path))
            }
        };
        debug!(board = %model, path, "i2c bus ready");
        Ok(bus)
    }
}

impl I2cBus for PeripheralBus {
    type Error = LinuxBusError;

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        match self {
            PeripheralBus::RaspberryPi(dev) | PeripheralBus::Radxa(dev) => dev
                .write(address, data)
                .map_err(|err| LinuxBusError::from_hal(address, err)),
            PeripheralBus::GenericCharacterDevice(bus) => bus.write(address, data),
        }
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        match self {
            PeripheralBus::RaspberryPi(dev) | PeripheralBus::Radxa(dev) => dev
                .read(address, buf)
                .map_err(|err| LinuxBusError::from_hal(address, err)),
            PeripheralBus::GenericCharacterDevice(bus) => bus.read(address, buf),
        }
    }

    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        match self {
            PeripheralBus::RaspberryPi(dev) | PeripheralBus::Radxa(dev) => dev
                .write_read(address, write_data, read_buf)
                .map_err(|err| LinuxBusError::from_hal(address, err)),
            PeripheralBus::GenericCharacterDevice(bus) => {
                bus.write_read(address, write_data, read_buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_timeout_is_classified() {
        // ETIMEDOUT on Linux
        assert!(is_timeout(&LinuxI2CError::Errno(110)));
        assert!(!is_timeout(&LinuxI2CError::Errno(6)));
    }

    #[test]
    fn test_hal_kinds_map() {
        assert_eq!(
            classify_kind(ErrorKind::NoAcknowledge(
                embedded_hal::i2c::NoAcknowledgeSource::Address
            )),
            BusErrorKind::Nack
        );
        assert_eq!(classify_kind(ErrorKind::ArbitrationLoss), BusErrorKind::ArbitrationLost);
        assert_eq!(classify_kind(ErrorKind::Other), BusErrorKind::Other);
    }

    #[test]
    fn test_missing_character_device_fails_on_first_transfer() {
        let mut bus = CharDeviceBus::new("/nonexistent/i2c-99");
        let err = bus.write(0x42, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, LinuxBusError::Open { .. }));
        assert_eq!(err.kind(), BusErrorKind::Other);
    }

    #[test]
    fn test_missing_adapter_fails_to_open() {
        let result = PeripheralBus::open(DeviceModel::RaspberryPi, "/nonexistent/i2c-98");
        assert!(matches!(result, Err(LinuxBusError::Open { .. })));
    }
}
