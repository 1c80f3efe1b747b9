pub mod config;
pub mod delay;
pub mod gpiod;
pub mod lcd;
pub mod mock;
pub mod raw;

pub use config::{GpioConfig, PinNumbering};

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A GPIO backend that hands out claimed pins.
///
/// Pin numbers passed to [GpioDriver::get_pin] and [GpioDriver::get_pin_bus] are interpreted
/// according to the backend's [GpioConfig], so a driver created with [PinNumbering::Board] takes
/// physical header positions instead of BCM line numbers.
///
/// A pin stays claimed until its handle is dropped. Claiming a pin twice fails with
/// [GpioError::AlreadyInUse].
pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> GpioResult<usize>;

    /// Gets the configuration the driver was created with.
    fn config(&self) -> &GpioConfig;

    /// Claims the GPIO pin at the given index.
    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>>;

    /// Claims the GPIO pin bus at the specific indices.
    ///
    /// The order of `indices` is the order of the values written with [GpioBusOutput::write].
    fn get_pin_bus<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioBus<N> + '_>>;
}

pub trait GpioPin: Debug {
    /// Gets the BCM line number of the claimed pin.
    fn index(&self) -> usize;

    /// Sets the GPIO pin function to output, allowing writing its state.
    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>>;
}

pub trait GpioOutput: Debug {
    /// Writes the state of the GPIO pin.
    fn write(&self, value: bool) -> GpioResult<()>;
}

pub trait GpioBus<const N: usize>: Debug {
    /// Gets the BCM line numbers of the claimed pins, in bus order.
    fn indices(&self) -> [usize; N];

    /// Sets the function of every pin in the bus to output.
    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>>;
}

pub trait GpioBusOutput<const N: usize>: Debug {
    /// Writes all the values to the bus at once, in bus order.
    fn write(&self, values: &[bool; N]) -> GpioResult<()>;
}

impl dyn GpioBusOutput<8> + '_ {
    /// Writes the value to the GPIO pins in the bus.
    /// The value is written as a byte, MSb first: bit 7 goes to the first pin of the bus and bit 0
    /// to the last one.
    pub fn write_byte(&self, value: u8) -> GpioResult<()> {
        self.write(&byte_to_levels(value))
    }
}

/// Splits a byte into pin levels, MSb first.
pub fn byte_to_levels(value: u8) -> [bool; 8] {
    let mut values = [false; 8];
    for (i, level) in values.iter_mut().enumerate() {
        *level = value & (0b1000_0000 >> i) != 0;
    }
    values
}

/// Joins pin levels back into a byte, MSb first. Inverse of [byte_to_levels].
pub fn levels_to_byte(values: &[bool; 8]) -> u8 {
    values
        .iter()
        .fold(0u8, |byte, &level| (byte << 1) | level as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_levels_are_msb_first() {
        assert_eq!(
            byte_to_levels(0b1000_0001),
            [true, false, false, false, false, false, false, true]
        );
        assert_eq!(
            byte_to_levels(0x41),
            [false, true, false, false, false, false, false, true]
        );
        assert_eq!(byte_to_levels(0x00), [false; 8]);
        assert_eq!(byte_to_levels(0xFF), [true; 8]);
    }

    #[test]
    fn levels_join_back_into_the_same_byte() {
        assert_eq!(levels_to_byte(&byte_to_levels(0x5A)), 0x5A);
        assert_eq!(levels_to_byte(&[true, true, false, false, false, false, false, false]), 0xC0);
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let err: GpioError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert_eq!(err, GpioError::Io(std::io::ErrorKind::PermissionDenied));
    }
}
