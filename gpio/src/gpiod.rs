//! GpiodDriver implementation for managing GPIO pins using the gpiod library.
//!
//! Goes through the Linux GPIO character device (`/dev/gpiochipN`), so it works on any board the
//! kernel knows, at the cost of a syscall per write. Claimed lines show up in `gpioinfo` under this
//! crate's name.
use crate::{
    GpioBus, GpioBusOutput, GpioConfig, GpioDriver, GpioError, GpioOutput, GpioPin, GpioResult,
};
use bitvec::vec::BitVec;
use log::debug;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::AtomicU8;

/// GpiodDriver is a GPIO driver that uses the gpiod library to manage GPIO pins.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    config: GpioConfig,
    used_pins: BitVec<AtomicU8>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip, config: GpioConfig) -> Self {
        let n = chip.num_lines() as usize;
        let bits = BitVec::repeat(false, n);
        Self {
            chip,
            config,
            used_pins: bits,
        }
    }

    /// Opens the GPIO chip at the given path, e.g. `/dev/gpiochip0`.
    pub fn open(path: impl AsRef<Path>, config: GpioConfig) -> GpioResult<Self> {
        let chip = gpiod::Chip::new(path.as_ref())?;
        debug!("Opened GPIO chip {} with {} lines", chip.name(), chip.num_lines());
        Ok(Self::new(chip, config))
    }

    fn claim(&self, indices: &[usize]) -> GpioResult<()> {
        let n = self.count()?;

        if indices.iter().any(|&index| index >= n) {
            return Err(GpioError::InvalidArgument);
        }

        for (i, &index) in indices.iter().enumerate() {
            if self.used_pins[index] || indices[..i].contains(&index) {
                return Err(GpioError::AlreadyInUse);
            }
        }

        for &index in indices {
            self.used_pins.set_aliased(index, true);
        }

        Ok(())
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.chip.num_lines() as usize)
    }

    fn config(&self) -> &GpioConfig {
        &self.config
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        let index = self.config.resolve(index)?;
        self.claim(&[index])?;

        Ok(Box::new(GpiodPin {
            driver: self,
            pin_index: index,
        }))
    }

    fn get_pin_bus<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioBus<N> + '_>> {
        let indices = self.config.resolve_all(indices)?;
        self.claim(&indices)?;

        Ok(Box::new(GpiodBus {
            driver: self,
            pin_indices: indices,
        }))
    }
}

struct GpiodPin<'a> {
    driver: &'a GpiodDriver,
    pin_index: usize,
}

impl Debug for GpiodPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for GpiodPin<'_> {
    fn index(&self) -> usize {
        self.pin_index
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        // The kernel refuses lines requested by another consumer, so there is nothing to warn about
        let line = self.driver.chip.request_lines(
            gpiod::Options::output([self.pin_index as u32]).consumer(env!("CARGO_PKG_NAME")),
        )?;
        let output = GpiodOutput { pin: self, line };
        Ok(Box::new(output))
    }
}

impl Drop for GpiodPin<'_> {
    fn drop(&mut self) {
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}

struct GpiodOutput<'a> {
    pin: &'a GpiodPin<'a>,
    line: gpiod::Lines<gpiod::Output>,
}

impl Debug for GpiodOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for GpiodOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.line.set_values([value])?;
        Ok(())
    }
}

struct GpiodBus<'a, const N: usize> {
    driver: &'a GpiodDriver,
    pin_indices: [usize; N],
}

impl<const N: usize> Debug for GpiodBus<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.pin_indices)
    }
}

impl<const N: usize> GpioBus<N> for GpiodBus<'_, N> {
    fn indices(&self) -> [usize; N] {
        self.pin_indices
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        // One request for the whole bus, so a write sets all the lines in a single ioctl
        let line = self.driver.chip.request_lines(
            gpiod::Options::output(
                self.pin_indices
                    .iter()
                    .map(|&index| index as u32)
                    .collect::<Vec<_>>(),
            )
            .consumer(env!("CARGO_PKG_NAME")),
        )?;
        let output = GpiodBusOutput { bus: self, line };
        Ok(Box::new(output))
    }
}

impl<const N: usize> Drop for GpiodBus<'_, N> {
    fn drop(&mut self) {
        for &index in &self.pin_indices {
            self.driver.used_pins.set_aliased(index, false);
        }
    }
}

struct GpiodBusOutput<'a, const N: usize> {
    bus: &'a GpiodBus<'a, N>,
    line: gpiod::Lines<gpiod::Output>,
}

impl<const N: usize> Debug for GpiodBusOutput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.bus)
    }
}

impl<const N: usize> GpioBusOutput<N> for GpiodBusOutput<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        self.line.set_values(*values)?;
        Ok(())
    }
}
