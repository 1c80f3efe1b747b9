use crate::{GpioBus, GpioBusOutput, GpioDriver, GpioOutput, GpioPin, GpioResult};
use log::debug;
use std::fmt::Debug;

/// Pin numbers of an 8-bit write-only HD44780 wiring, in the numbering of the GPIO driver used.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LcdPinout {
    /// Register select.
    pub rs: usize,
    /// Enable.
    pub e: usize,
    /// Data lines, DB7 first, DB0 last.
    pub data: [usize; 8],
}

/// The pins of an [LcdPinout], claimed from a [GpioDriver].
///
/// Keeps the pins claimed as long as it lives. Dropping it releases them, so it should outlive the
/// driver using its [LcdOutputs].
#[derive(Debug)]
pub struct LcdPinBinding<'g> {
    pinout: LcdPinout,
    pin_rs: Box<dyn GpioPin + 'g>,
    pin_e: Box<dyn GpioPin + 'g>,
    data_bus: Box<dyn GpioBus<8> + 'g>,
}

impl<'g> LcdPinBinding<'g> {
    /// Claims all ten pins of the pinout.
    ///
    /// # Errors
    /// Whatever the GPIO driver returns, most likely `GpioError::InvalidArgument` for a pin that
    /// doesn't exist and `GpioError::AlreadyInUse` for one that's already claimed. Pins claimed
    /// before the failure are released again.
    pub fn claim<G: GpioDriver>(gpio: &'g G, pinout: LcdPinout) -> GpioResult<Self> {
        debug!(
            "Claiming LCD pins from {:?} ({:?} numbering): RS: {}, E: {}, Data: {:?}",
            gpio,
            gpio.config().numbering,
            pinout.rs,
            pinout.e,
            pinout.data
        );

        let pin_rs = gpio.get_pin(pinout.rs)?;
        let pin_e = gpio.get_pin(pinout.e)?;
        let data_bus = gpio.get_pin_bus(pinout.data)?;

        Ok(LcdPinBinding {
            pinout,
            pin_rs,
            pin_e,
            data_bus,
        })
    }

    /// Gets the pinout as it was given to [LcdPinBinding::claim].
    pub fn pinout(&self) -> LcdPinout {
        self.pinout
    }

    /// Gets the pinout in BCM line numbers, whatever numbering the GPIO driver uses.
    pub fn bcm_pinout(&self) -> LcdPinout {
        LcdPinout {
            rs: self.pin_rs.index(),
            e: self.pin_e.index(),
            data: self.data_bus.indices(),
        }
    }

    /// Configures all the pins as outputs.
    pub fn outputs(&mut self) -> GpioResult<LcdOutputs<'_>> {
        Ok(LcdOutputs {
            rs: self.pin_rs.as_output()?,
            e: self.pin_e.as_output()?,
            data: self.data_bus.as_output()?,
        })
    }
}

/// Output handles for the signals of an HD44780 in 8-bit write-only mode.
#[derive(Debug)]
pub struct LcdOutputs<'a> {
    pub rs: Box<dyn GpioOutput + 'a>,
    pub e: Box<dyn GpioOutput + 'a>,
    /// DB7 first, DB0 last.
    pub data: Box<dyn GpioBusOutput<8> + 'a>,
}
