//! An in-memory GPIO backend that records everything done to its pins.
//!
//! Useful for tests and for dry runs on machines without GPIO. Delays can be recorded into the
//! same log with [MockGpioDriver::delay], so the exact interleaving of pin writes and waits can be
//! checked.

use crate::delay::Delay;
use crate::{
    levels_to_byte, GpioBus, GpioBusOutput, GpioConfig, GpioDriver, GpioError, GpioOutput,
    GpioPin, GpioResult,
};
use bitvec::vec::BitVec;
use log::trace;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::io::ErrorKind;
use std::sync::atomic::AtomicU8;
use std::time::Duration;

/// Something that happened to the mock. Pin numbers are BCM line numbers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MockEvent {
    /// The pin was claimed.
    Claim(usize),
    /// The pin was released.
    Release(usize),
    /// The pin was configured as an output.
    Output(usize),
    /// A single pin was written.
    Write { pin: usize, level: bool },
    /// A bus was written, all pins at once.
    BusWrite { pins: Vec<usize>, levels: Vec<bool> },
    /// A [MockDelay] was asked to wait.
    Delay(Duration),
}

/// A byte latched by a parallel-bus controller on a falling edge of its enable line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MockTransaction {
    /// Level of the register-select line at the falling edge.
    pub rs: bool,
    /// Levels of the data lines at the falling edge, MSb first.
    pub byte: u8,
}

pub struct MockGpioDriver {
    config: GpioConfig,
    pin_count: usize,
    used_pins: BitVec<AtomicU8>,
    events: RefCell<Vec<MockEvent>>,
    writes_left: Cell<Option<usize>>,
}

impl MockGpioDriver {
    /// Same amount of lines as the BCM2835 family.
    pub const DEFAULT_PIN_COUNT: usize = 58;

    pub fn new(config: GpioConfig) -> Self {
        Self::with_pin_count(config, Self::DEFAULT_PIN_COUNT)
    }

    pub fn with_pin_count(config: GpioConfig, pin_count: usize) -> Self {
        MockGpioDriver {
            config,
            pin_count,
            used_pins: BitVec::repeat(false, pin_count),
            events: RefCell::new(Vec::new()),
            writes_left: Cell::new(None),
        }
    }

    fn record(&self, event: MockEvent) {
        trace!("{:?}", event);
        self.events.borrow_mut().push(event);
    }

    /// Counts down the writes allowed by [MockGpioDriver::fail_writes_after].
    fn check_write(&self) -> GpioResult<()> {
        match self.writes_left.get() {
            Some(0) => Err(GpioError::Io(ErrorKind::BrokenPipe)),
            Some(left) => {
                self.writes_left.set(Some(left - 1));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn claim(&self, indices: &[usize]) -> GpioResult<()> {
        if indices.iter().any(|&index| index >= self.pin_count) {
            return Err(GpioError::InvalidArgument);
        }

        for (i, &index) in indices.iter().enumerate() {
            if self.used_pins[index] || indices[..i].contains(&index) {
                return Err(GpioError::AlreadyInUse);
            }
        }

        for &index in indices {
            self.used_pins.set_aliased(index, true);
            self.record(MockEvent::Claim(index));
        }
        Ok(())
    }

    fn release(&self, index: usize) {
        self.used_pins.set_aliased(index, false);
        self.record(MockEvent::Release(index));
    }

    /// Lets the next `writes` pin or bus writes through, then fails every later one with
    /// `GpioError::Io(ErrorKind::BrokenPipe)`. Failed writes are not recorded.
    pub fn fail_writes_after(&self, writes: usize) {
        self.writes_left.set(Some(writes));
    }

    /// Gets a copy of everything recorded so far.
    pub fn events(&self) -> Vec<MockEvent> {
        self.events.borrow().clone()
    }

    /// Forgets everything recorded so far. Claims are kept.
    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    /// Gets a [Delay] that records into this mock's event log instead of sleeping.
    pub fn delay(&self) -> MockDelay<'_> {
        MockDelay { driver: self }
    }

    /// Gets all the recorded delays, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                MockEvent::Delay(duration) => Some(*duration),
                _ => None,
            })
            .collect()
    }

    /// Checks whether the BCM line is currently claimed.
    pub fn is_claimed(&self, index: usize) -> bool {
        index < self.pin_count && self.used_pins[index]
    }

    /// Replays the log and gets the last level written to the BCM line, if any.
    pub fn level(&self, pin: usize) -> Option<bool> {
        let mut current = None;
        for event in self.events.borrow().iter() {
            match event {
                MockEvent::Write { pin: p, level } if *p == pin => current = Some(*level),
                MockEvent::BusWrite { pins, levels } => {
                    if let Some(i) = pins.iter().position(|&p| p == pin) {
                        current = levels.get(i).copied();
                    }
                }
                MockEvent::Release(p) if *p == pin => current = None,
                _ => {}
            }
        }
        current
    }

    /// Counts the high-to-low transitions written to the BCM line.
    pub fn falling_edges(&self, pin: usize) -> usize {
        let mut high = false;
        let mut edges = 0;
        for event in self.events.borrow().iter() {
            if let MockEvent::Write { pin: p, level } = event {
                if *p == pin {
                    if high && !*level {
                        edges += 1;
                    }
                    high = *level;
                }
            }
        }
        edges
    }

    /// Replays the log the way a parallel-bus controller would see it, latching register-select and
    /// the data lines on every falling edge of the enable line.
    ///
    /// `data` lists the data lines MSb first. Lines never written count as low.
    pub fn latched(&self, rs: usize, e: usize, data: [usize; 8]) -> Vec<MockTransaction> {
        let mut levels: HashMap<usize, bool> = HashMap::new();
        let mut latched = Vec::new();

        for event in self.events.borrow().iter() {
            match event {
                MockEvent::Write { pin, level } => {
                    let previous = levels.insert(*pin, *level).unwrap_or(false);
                    if *pin == e && previous && !*level {
                        let level_of = |pin: usize| levels.get(&pin).copied().unwrap_or(false);
                        latched.push(MockTransaction {
                            rs: level_of(rs),
                            byte: levels_to_byte(&data.map(level_of)),
                        });
                    }
                }
                MockEvent::BusWrite { pins, levels: values } => {
                    for (&pin, &level) in pins.iter().zip(values.iter()) {
                        levels.insert(pin, level);
                    }
                }
                MockEvent::Release(pin) => {
                    levels.remove(pin);
                }
                _ => {}
            }
        }

        latched
    }
}

impl Debug for MockGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioDriver({})", self.pin_count)
    }
}

impl GpioDriver for MockGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.pin_count)
    }

    fn config(&self) -> &GpioConfig {
        &self.config
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        let index = self.config.resolve(index)?;
        self.claim(&[index])?;

        Ok(Box::new(MockPin {
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

        Ok(Box::new(MockBus {
            driver: self,
            pin_indices: indices,
        }))
    }
}

struct MockPin<'a> {
    driver: &'a MockGpioDriver,
    pin_index: usize,
}

impl Debug for MockPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for MockPin<'_> {
    fn index(&self) -> usize {
        self.pin_index
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        self.driver.record(MockEvent::Output(self.pin_index));
        Ok(Box::new(MockOutput { pin: self }))
    }
}

impl Drop for MockPin<'_> {
    fn drop(&mut self) {
        self.driver.release(self.pin_index);
    }
}

struct MockOutput<'a> {
    pin: &'a MockPin<'a>,
}

impl Debug for MockOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for MockOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.pin.driver.check_write()?;
        self.pin.driver.record(MockEvent::Write {
            pin: self.pin.pin_index,
            level: value,
        });
        Ok(())
    }
}

struct MockBus<'a, const N: usize> {
    driver: &'a MockGpioDriver,
    pin_indices: [usize; N],
}

impl<const N: usize> Debug for MockBus<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.pin_indices)
    }
}

impl<const N: usize> GpioBus<N> for MockBus<'_, N> {
    fn indices(&self) -> [usize; N] {
        self.pin_indices
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        for &pin_index in &self.pin_indices {
            self.driver.record(MockEvent::Output(pin_index));
        }
        Ok(Box::new(MockBusOutput { bus: self }))
    }
}

impl<const N: usize> Drop for MockBus<'_, N> {
    fn drop(&mut self) {
        for &pin_index in &self.pin_indices {
            self.driver.release(pin_index);
        }
    }
}

struct MockBusOutput<'a, const N: usize> {
    bus: &'a MockBus<'a, N>,
}

impl<const N: usize> Debug for MockBusOutput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.bus)
    }
}

impl<const N: usize> GpioBusOutput<N> for MockBusOutput<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        self.bus.driver.check_write()?;
        self.bus.driver.record(MockEvent::BusWrite {
            pins: self.bus.pin_indices.to_vec(),
            levels: values.to_vec(),
        });
        Ok(())
    }
}

/// A [Delay] that returns immediately and records the duration in a [MockGpioDriver]'s log.
#[derive(Debug)]
pub struct MockDelay<'a> {
    driver: &'a MockGpioDriver,
}

impl Delay for MockDelay<'_> {
    fn delay(&mut self, duration: Duration) {
        self.driver.record(MockEvent::Delay(duration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PinNumbering;

    #[test]
    fn claims_are_exclusive_until_dropped() {
        let gpio = MockGpioDriver::new(GpioConfig::default());

        let pin = gpio.get_pin(7).unwrap();
        assert!(gpio.is_claimed(7));
        assert_eq!(gpio.get_pin(7).unwrap_err(), GpioError::AlreadyInUse);
        assert_eq!(gpio.get_pin_bus([6, 7]).unwrap_err(), GpioError::AlreadyInUse);
        // The failed bus claim must not leave 6 claimed
        assert!(!gpio.is_claimed(6));

        drop(pin);
        assert!(!gpio.is_claimed(7));
        assert!(gpio.get_pin(7).is_ok());
    }

    #[test]
    fn bus_with_the_same_pin_twice_is_rejected() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        assert_eq!(gpio.get_pin_bus([3, 4, 3]).unwrap_err(), GpioError::AlreadyInUse);
        assert!(!gpio.is_claimed(3));
        assert!(!gpio.is_claimed(4));
    }

    #[test]
    fn out_of_range_pins_are_rejected() {
        let gpio = MockGpioDriver::with_pin_count(GpioConfig::default(), 8);
        assert_eq!(gpio.get_pin(8).unwrap_err(), GpioError::InvalidArgument);
        assert_eq!(gpio.get_pin_bus([0, 9]).unwrap_err(), GpioError::InvalidArgument);
    }

    #[test]
    fn board_numbering_records_bcm_lines() {
        let gpio = MockGpioDriver::new(GpioConfig::new(PinNumbering::Board));
        let mut pin = gpio.get_pin(26).unwrap();
        assert_eq!(pin.index(), 7);
        pin.as_output().unwrap().write(true).unwrap();
        assert_eq!(gpio.level(7), Some(true));
        assert_eq!(gpio.get_pin(1).unwrap_err(), GpioError::InvalidArgument);
    }

    #[test]
    fn bus_writes_byte_msb_first() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut bus = gpio.get_pin_bus([18, 23, 24, 25, 6, 13, 19, 26]).unwrap();
        let output = bus.as_output().unwrap();
        gpio.clear_events();

        output.write_byte(0b1000_0010).unwrap();

        assert_eq!(
            gpio.events(),
            vec![MockEvent::BusWrite {
                pins: vec![18, 23, 24, 25, 6, 13, 19, 26],
                levels: vec![true, false, false, false, false, false, true, false],
            }]
        );
        assert_eq!(gpio.level(18), Some(true));
        assert_eq!(gpio.level(19), Some(true));
        assert_eq!(gpio.level(26), Some(false));
    }

    #[test]
    fn writes_fail_once_the_allowance_is_used() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut pin = gpio.get_pin(7).unwrap();
        let output = pin.as_output().unwrap();
        gpio.clear_events();

        gpio.fail_writes_after(1);
        output.write(true).unwrap();
        assert_eq!(output.write(false), Err(GpioError::Io(ErrorKind::BrokenPipe)));
        assert_eq!(gpio.events(), vec![MockEvent::Write { pin: 7, level: true }]);
    }

    #[test]
    fn latches_on_falling_edge_only() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut rs = gpio.get_pin(0).unwrap();
        let mut e = gpio.get_pin(1).unwrap();
        let mut bus = gpio.get_pin_bus([2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        let rs = rs.as_output().unwrap();
        let e = e.as_output().unwrap();
        let bus = bus.as_output().unwrap();

        rs.write(true).unwrap();
        bus.write_byte(0x41).unwrap();
        e.write(true).unwrap();
        // Changing the bus while E is high only matters at the falling edge
        bus.write_byte(0x42).unwrap();
        e.write(false).unwrap();
        // Writing low again is not an edge
        e.write(false).unwrap();

        rs.write(false).unwrap();
        bus.write_byte(0x01).unwrap();
        e.write(true).unwrap();
        e.write(false).unwrap();

        assert_eq!(
            gpio.latched(0, 1, [2, 3, 4, 5, 6, 7, 8, 9]),
            vec![
                MockTransaction { rs: true, byte: 0x42 },
                MockTransaction { rs: false, byte: 0x01 },
            ]
        );
        assert_eq!(gpio.falling_edges(1), 2);
    }

    #[test]
    fn delays_are_recorded_in_order_with_writes() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut pin = gpio.get_pin(5).unwrap();
        let out = pin.as_output().unwrap();
        let mut delay = gpio.delay();
        gpio.clear_events();

        out.write(true).unwrap();
        delay.delay(Duration::from_micros(500));
        out.write(false).unwrap();

        assert_eq!(
            gpio.events(),
            vec![
                MockEvent::Write { pin: 5, level: true },
                MockEvent::Delay(Duration::from_micros(500)),
                MockEvent::Write { pin: 5, level: false },
            ]
        );
        assert_eq!(gpio.delays(), vec![Duration::from_micros(500)]);
    }
}
