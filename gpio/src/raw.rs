//! GPIO backend poking the BCM283x GPIO registers directly through a memory map.
//!
//! Needs either `/dev/gpiomem` (the GPIO block only, usually accessible to the `gpio` group) or
//! `/dev/mem` (the whole physical address space, root only).

use crate::{
    GpioBus, GpioBusOutput, GpioConfig, GpioDriver, GpioError, GpioOutput, GpioPin, GpioResult,
};
use bitvec::vec::BitVec;
use log::{debug, warn};
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::sync::atomic::AtomicU8;

pub struct RawGpioDriver {
    mmap: MmapRaw,
    config: GpioConfig,
    used_pins: BitVec<AtomicU8>,
}

impl RawGpioDriver {
    // 0x7e200000 on the bus, 0x3F200000 physical on BCM2836/7
    const GPIO_BASE: u64 = 0x3F200000;

    const PIN_COUNT: usize = 58;

    const FUNCTION_INPUT: u32 = 0b000;
    const FUNCTION_OUTPUT: u32 = 0b001;

    const GPSET0: usize = 0x1c / 4;
    const GPCLR0: usize = 0x28 / 4;

    fn create(path: &str, offset: u64, config: GpioConfig) -> GpioResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let mmap = MmapOptions::new().offset(offset).len(4096).map_raw(&file)?;

        debug!("Mapped GPIO registers from {} at offset {:#x}", path, offset);

        Ok(RawGpioDriver {
            mmap,
            config,
            used_pins: BitVec::repeat(false, Self::PIN_COUNT),
        })
    }

    /// Maps the GPIO block through `/dev/gpiomem`, which exposes it at offset 0.
    pub fn new_gpiomem(config: GpioConfig) -> GpioResult<Self> {
        Self::create("/dev/gpiomem", 0, config)
    }

    /// Maps the GPIO block through `/dev/mem`, at its physical address.
    pub fn new_mem(config: GpioConfig) -> GpioResult<Self> {
        Self::create("/dev/mem", Self::GPIO_BASE, config)
    }

    pub fn raw_get_pin_function(&self, pin_index: usize) -> GpioResult<u32> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_ptr() as *const u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let register_value = unsafe { register_ptr.read_volatile() };
        Ok((register_value >> shift) & 0b111)
    }

    pub fn raw_set_pin_function(&self, pin_index: usize, function: u32) -> GpioResult<()> {
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }

        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift); // Clear the bits for this pin
        register_value |= function << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    /// Drives several pins at once. Pins in the same bank change with a single GPSETn and a single
    /// GPCLRn write.
    pub(crate) fn raw_set_pin_outputs(
        &self,
        pin_indices: &[usize],
        levels: &[bool],
    ) -> GpioResult<()> {
        if pin_indices.len() != levels.len() {
            return Err(GpioError::InvalidArgument);
        }

        let mut set = [0u32; 2];
        let mut clear = [0u32; 2];

        for (&pin_index, &high) in pin_indices.iter().zip(levels.iter()) {
            if pin_index >= Self::PIN_COUNT {
                return Err(GpioError::InvalidArgument);
            }
            let bank = pin_index / 32;
            let bit = 1u32 << (pin_index % 32);
            if high {
                set[bank] |= bit;
            } else {
                clear[bank] |= bit;
            }
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        for bank in 0..2 {
            // GPSETn/GPCLRn registers, writing 0 bits has no effect
            if set[bank] != 0 {
                unsafe { mmap.add(Self::GPSET0 + bank).write_volatile(set[bank]) };
            }
            if clear[bank] != 0 {
                unsafe { mmap.add(Self::GPCLR0 + bank).write_volatile(clear[bank]) };
            }
        }

        Ok(())
    }

    pub(crate) fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        self.raw_set_pin_outputs(&[pin_index], &[high])
    }

    fn claim(&self, indices: &[usize]) -> GpioResult<()> {
        if indices.iter().any(|&index| index >= Self::PIN_COUNT) {
            return Err(GpioError::InvalidArgument);
        }

        for (i, &index) in indices.iter().enumerate() {
            if self.used_pins[index] || indices[..i].contains(&index) {
                return Err(GpioError::AlreadyInUse);
            }
        }

        if self.config.warnings {
            for &index in indices {
                if self.raw_get_pin_function(index)? == Self::FUNCTION_OUTPUT {
                    warn!("GPIO{} is already configured as an output, claiming it anyway", index);
                }
            }
        }

        for &index in indices {
            self.used_pins.set_aliased(index, true);
        }

        Ok(())
    }

    /// Puts the pin back into input mode and frees it.
    fn release(&self, pin_index: usize) {
        _ = self.raw_set_pin_function(pin_index, Self::FUNCTION_INPUT);
        self.used_pins.set_aliased(pin_index, false);
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn config(&self) -> &GpioConfig {
        &self.config
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        let index = self.config.resolve(index)?;
        self.claim(&[index])?;

        Ok(Box::new(RawGpioPin {
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

        Ok(Box::new(RawGpioBus {
            driver: self,
            pin_indices: indices,
        }))
    }
}

struct RawGpioPin<'a> {
    driver: &'a RawGpioDriver,
    pin_index: usize,
}

impl Debug for RawGpioPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for RawGpioPin<'_> {
    fn index(&self) -> usize {
        self.pin_index
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        self.driver.raw_set_pin_function(self.pin_index, RawGpioDriver::FUNCTION_OUTPUT)?;
        Ok(Box::new(RawGpioOutput { pin: self }))
    }
}

impl Drop for RawGpioPin<'_> {
    fn drop(&mut self) {
        self.driver.release(self.pin_index);
    }
}

struct RawGpioOutput<'a> {
    pin: &'a RawGpioPin<'a>,
}

impl Debug for RawGpioOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for RawGpioOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.pin.driver.raw_set_pin_output(self.pin.pin_index, value)
    }
}

struct RawGpioBus<'a, const N: usize> {
    driver: &'a RawGpioDriver,
    pin_indices: [usize; N],
}

impl<const N: usize> Debug for RawGpioBus<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.pin_indices)
    }
}

impl<const N: usize> GpioBus<N> for RawGpioBus<'_, N> {
    fn indices(&self) -> [usize; N] {
        self.pin_indices
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        for &pin_index in &self.pin_indices {
            self.driver.raw_set_pin_function(pin_index, RawGpioDriver::FUNCTION_OUTPUT)?;
        }
        Ok(Box::new(RawGpioBusOutput { bus: self }))
    }
}

impl<const N: usize> Drop for RawGpioBus<'_, N> {
    fn drop(&mut self) {
        for &pin_index in &self.pin_indices {
            self.driver.release(pin_index);
        }
    }
}

struct RawGpioBusOutput<'a, const N: usize> {
    bus: &'a RawGpioBus<'a, N>,
}

impl<const N: usize> Debug for RawGpioBusOutput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.bus)
    }
}

impl<const N: usize> GpioBusOutput<N> for RawGpioBusOutput<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        self.bus.driver.raw_set_pin_outputs(&self.bus.pin_indices, values)
    }
}
