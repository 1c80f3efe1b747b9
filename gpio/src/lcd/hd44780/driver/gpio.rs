use crate::delay::{Delay, ThreadSleep};
use crate::lcd::hd44780::driver::{line_address, HD44780Driver, LcdOutputs, LcdTiming};
use crate::{GpioBusOutput, GpioOutput, GpioResult};
use log::{debug, trace, warn};

/// Driver for an HD44780 (LCD1602) wired to GPIO pins in 8-bit mode, write only.
///
/// Every byte is latched with a single enable pulse framed by [LcdTiming::e_delay] on both sides,
/// and the controller is never polled, so all the timing comes from the fixed delays.
///
/// The controller is initialized by instruction when the driver is created, so every instance is
/// ready to use.
#[derive(Debug)]
pub struct GpioLcd1602<'a, D: Delay = ThreadSleep> {
    pin_rs: Box<dyn GpioOutput + 'a>,
    pin_e: Box<dyn GpioOutput + 'a>,
    data_bus: Box<dyn GpioBusOutput<8> + 'a>,
    timing: LcdTiming,
    delay: D,
}

impl<'a> GpioLcd1602<'a, ThreadSleep> {
    /// Creates and initializes a driver with the default timing, sleeping the current thread.
    pub fn with_defaults(outputs: LcdOutputs<'a>) -> GpioResult<Self> {
        Self::new(outputs, LcdTiming::default(), ThreadSleep)
    }
}

impl<'a, D: Delay> GpioLcd1602<'a, D> {
    /// Creates a driver and runs the initialization sequence.
    ///
    /// # Parameters
    ///
    /// - `outputs`: The RS, E and data bus outputs, usually from
    ///   [LcdPinBinding::outputs](crate::lcd::hd44780::driver::LcdPinBinding::outputs).
    /// - `timing`: Enable pulse and initialization timing.
    /// - `delay`: Used for every wait, [ThreadSleep] on real hardware.
    ///
    /// # Errors
    /// Any error from writing the pins, unchanged.
    pub fn new(outputs: LcdOutputs<'a>, timing: LcdTiming, delay: D) -> GpioResult<Self> {
        let mut lcd = GpioLcd1602 {
            pin_rs: outputs.rs,
            pin_e: outputs.e,
            data_bus: outputs.data,
            timing,
            delay,
        };
        lcd.init()?;
        Ok(lcd)
    }

    pub fn timing(&self) -> &LcdTiming {
        &self.timing
    }

    /// Initializes the controller by instruction (HD44780U datasheet, figure 23).
    ///
    /// The internal reset circuit can't be relied on, and its completion can't be observed without
    /// the busy flag, so the controller is forced into 8-bit mode first.
    fn init(&mut self) -> GpioResult<()> {
        debug!("Initializing LCD with {:?}", self.timing);

        // Function set: 0011**** (8-bit)
        self.command(0b00110000)?;
        // Wait for the first function set to complete
        self.delay.delay(self.timing.reset_delay);

        // Function set: 001110** (8-bit, 2 lines, font ignored with 2 lines)
        self.command(0b00111000)?;
        // Display off: 00001000
        self.command(0b00001000)?;
        self.clear()?;
        // Entry mode set: 00000110 (increment, no shift)
        self.command(0b00000110)?;

        // The standard sequence ends here, turn the display on so the content is visible.
        // Display on: 00001100 (cursor off, blinking off)
        self.command(0b00001100)?;

        debug!("LCD initialized.");
        Ok(())
    }

    fn pulse_e(&mut self) -> GpioResult<()> {
        self.delay.delay(self.timing.e_delay);
        self.pin_e.write(true)?;
        self.delay.delay(self.timing.e_pulse);
        self.pin_e.write(false)?;
        self.delay.delay(self.timing.e_delay);
        Ok(())
    }

    /// Latches one byte into the controller.
    ///
    /// The byte is latched when this returns, but the controller might still be executing it.
    fn transact(&mut self, rs: bool, byte: u8) -> GpioResult<()> {
        trace!("Sending byte: {:08b}, RS: {}", byte, rs);

        self.pin_rs.write(rs)?;
        self.data_bus.write_byte(byte)?;
        self.pulse_e()
    }

    /// Sends an instruction (RS low).
    pub fn command(&mut self, command: u8) -> GpioResult<()> {
        self.transact(false, command)
    }

    /// Writes a byte to the data register (RS high): a character code, or a glyph row after
    /// [GpioLcd1602::set_cgram_char].
    pub fn write_char(&mut self, char_code: u8) -> GpioResult<()> {
        self.transact(true, char_code)
    }

    /// Clears the display and moves the cursor home.
    ///
    /// Outside of the initialization, give the controller ~1.5 ms before the next write.
    pub fn clear(&mut self) -> GpioResult<()> {
        self.command(0b00000001)
    }

    /// Moves the cursor to the start of a line. `1` is the second line, anything else (including
    /// out-of-range values) the first one.
    pub fn goto_line(&mut self, line: u8) -> GpioResult<()> {
        self.command(0b10000000 | line_address(line))
    }

    /// Moves to the start of `line` and writes `text` there, one byte per character.
    ///
    /// Characters are sent as their code point truncated to 8 bits, so only ASCII (and the upper
    /// half of the controller's ROM through Latin-1 code points) maps as expected. Text longer
    /// than the line is not cut; it continues into the following DDRAM addresses.
    pub fn write_line(&mut self, text: &str, line: u8) -> GpioResult<()> {
        self.goto_line(line)?;

        for c in text.chars() {
            let code = c as u32;
            if code > 0xFF {
                warn!("Character {:?} doesn't fit in a byte, sending {:#04x}", c, code as u8);
            }
            self.write_char(code as u8)?;
        }

        Ok(())
    }

    /// Programs one of the eight 5x8 custom glyphs, one byte per pixel row, top to bottom. Only the
    /// 5 low bits of each row are used by the controller.
    ///
    /// Data writes keep going to CGRAM afterwards, so move the cursor (e.g.
    /// [GpioLcd1602::goto_line]) before writing text again. The glyph is then printed with
    /// [GpioLcd1602::write_char]`(index)`.
    pub fn set_cgram_char(&mut self, index: u8, rows: &[u8; 8]) -> GpioResult<()> {
        self.command(0b01000000 | index.wrapping_mul(8))?;
        for &row in rows {
            self.write_char(row)?;
        }
        Ok(())
    }
}

impl<D: Delay> HD44780Driver for GpioLcd1602<'_, D> {
    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.command(command)
    }

    fn send_data(&mut self, data: u8) -> GpioResult<()> {
        self.write_char(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::driver::{CursorDirection, LcdPinBinding, LcdPinout};
    use crate::mock::{MockDelay, MockEvent, MockGpioDriver};
    use crate::{GpioConfig, GpioError};
    use std::io::ErrorKind;
    use std::time::Duration;

    const PINOUT: LcdPinout = LcdPinout {
        rs: 7,
        e: 8,
        data: [18, 23, 24, 25, 6, 13, 19, 26],
    };

    const TIMING: LcdTiming = LcdTiming {
        e_pulse: Duration::from_micros(2),
        e_delay: Duration::from_micros(1),
        reset_delay: Duration::from_micros(4_200),
    };

    fn lcd<'a>(
        binding: &'a mut LcdPinBinding<'_>,
        gpio: &'a MockGpioDriver,
    ) -> GpioLcd1602<'a, MockDelay<'a>> {
        GpioLcd1602::new(binding.outputs().unwrap(), TIMING, gpio.delay()).unwrap()
    }

    fn latched(gpio: &MockGpioDriver) -> Vec<(bool, u8)> {
        gpio.latched(PINOUT.rs, PINOUT.e, PINOUT.data)
            .into_iter()
            .map(|t| (t.rs, t.byte))
            .collect()
    }

    fn commands(bytes: &[u8]) -> Vec<(bool, u8)> {
        bytes.iter().map(|&b| (false, b)).collect()
    }

    #[test]
    fn init_sends_the_forced_sequence() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let _lcd = lcd(&mut binding, &gpio);

        assert_eq!(latched(&gpio), commands(&[0x30, 0x38, 0x08, 0x01, 0x06, 0x0C]));
        assert_eq!(gpio.falling_edges(PINOUT.e), 6);
    }

    #[test]
    fn init_waits_for_the_first_function_set_only() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let _lcd = lcd(&mut binding, &gpio);

        let envelope = [TIMING.e_delay, TIMING.e_pulse, TIMING.e_delay];
        let mut expected = envelope.to_vec();
        expected.push(TIMING.reset_delay);
        for _ in 0..5 {
            expected.extend(envelope);
        }
        assert_eq!(gpio.delays(), expected);

        // The settle delay sits between the first falling edge and the second RS write
        let events = gpio.events();
        let settle = events
            .iter()
            .position(|event| *event == MockEvent::Delay(TIMING.reset_delay))
            .unwrap();
        let first_fall = events
            .iter()
            .position(|event| *event == MockEvent::Write { pin: PINOUT.e, level: false })
            .unwrap();
        assert!(first_fall < settle);
        let is_e_rise = |event: &&MockEvent| {
            matches!(event, MockEvent::Write { pin, level: true } if *pin == PINOUT.e)
        };
        assert!(events[settle + 1..]
            .iter()
            .take_while(|event| !is_e_rise(event))
            .any(|event| matches!(event, MockEvent::Write { pin, .. } if *pin == PINOUT.rs)));
    }

    #[test]
    fn every_byte_is_latched_msb_first_with_the_right_register() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);

        for byte in 0..=u8::MAX {
            gpio.clear_events();
            lcd.command(byte).unwrap();
            assert_eq!(latched(&gpio), [(false, byte)]);
            assert_eq!(gpio.falling_edges(PINOUT.e), 1);

            gpio.clear_events();
            lcd.write_char(byte).unwrap();
            assert_eq!(latched(&gpio), [(true, byte)]);
            assert_eq!(gpio.falling_edges(PINOUT.e), 1);
        }
    }

    #[test]
    fn transaction_order_is_rs_bus_then_pulse() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);
        gpio.clear_events();

        lcd.write_char(0x80).unwrap();

        assert_eq!(
            gpio.events(),
            vec![
                MockEvent::Write { pin: PINOUT.rs, level: true },
                MockEvent::BusWrite {
                    pins: PINOUT.data.to_vec(),
                    levels: vec![true, false, false, false, false, false, false, false],
                },
                MockEvent::Delay(TIMING.e_delay),
                MockEvent::Write { pin: PINOUT.e, level: true },
                MockEvent::Delay(TIMING.e_pulse),
                MockEvent::Write { pin: PINOUT.e, level: false },
                MockEvent::Delay(TIMING.e_delay),
            ]
        );
    }

    #[test]
    fn goto_line_normalizes_unknown_lines_to_the_first() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);
        gpio.clear_events();

        for line in [0, 1, 2, 3, 255] {
            lcd.goto_line(line).unwrap();
        }

        assert_eq!(latched(&gpio), commands(&[0x80, 0xC0, 0x80, 0x80, 0x80]));
    }

    #[test]
    fn write_line_goes_to_the_line_then_writes_each_char() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);
        gpio.clear_events();

        lcd.write_line("AB", 0).unwrap();
        assert_eq!(latched(&gpio), [(false, 0x80), (true, 0x41), (true, 0x42)]);

        gpio.clear_events();
        lcd.write_line("1", 1).unwrap();
        assert_eq!(latched(&gpio), [(false, 0xC0), (true, b'1')]);
    }

    #[test]
    fn write_line_does_not_truncate_long_text() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);
        gpio.clear_events();

        let text = "abcdefghijklmnopqrst";
        lcd.write_line(text, 0).unwrap();

        let sent = latched(&gpio);
        assert_eq!(sent.len(), 1 + text.len());
        assert_eq!(sent.last(), Some(&(true, b't')));
    }

    #[test]
    fn write_line_truncates_char_codes_to_a_byte() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);
        gpio.clear_events();

        lcd.write_line("é€", 0).unwrap();

        assert_eq!(latched(&gpio), [(false, 0x80), (true, 0xE9), (true, 0xAC)]);
    }

    #[test]
    fn clear_then_line_stays_within_the_transaction_budget() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);

        for text in ["", "x", "Hello, world!", "1234567890123456"] {
            gpio.clear_events();
            lcd.clear().unwrap();
            lcd.write_line(text, 0).unwrap();
            let sent = latched(&gpio);
            assert_eq!(sent.len(), 1 + 1 + text.len());
            assert_eq!(sent[..2], [(false, 0x01), (false, 0x80)]);

            gpio.clear_events();
            lcd.clear().unwrap();
            lcd.goto_line(0).unwrap();
            lcd.write_line(text, 0).unwrap();
            assert_eq!(latched(&gpio).len(), 1 + 1 + 1 + text.len());
        }
    }

    #[test]
    fn cgram_char_sets_the_address_then_sends_rows() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);
        gpio.clear_events();

        let rows = [
            0b00000, 0b00101, 0b00110, 0b00000, 0b11111, 0b10001, 0b01010, 0b00100,
        ];
        lcd.set_cgram_char(3, &rows).unwrap();

        let sent = latched(&gpio);
        assert_eq!(sent[0], (false, 0b01000000 | (3 * 8)));
        assert_eq!(sent.len(), 9);
        for (&(rs, byte), &row) in sent[1..].iter().zip(rows.iter()) {
            assert!(rs);
            assert_eq!(byte & 0b11111, row);
        }
    }

    #[test]
    fn cgram_rows_are_sent_unmasked() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);
        gpio.clear_events();

        lcd.set_cgram_char(0, &[0xFF; 8]).unwrap();

        let sent = latched(&gpio);
        assert_eq!(sent[0], (false, 0x40));
        assert!(sent[1..].iter().all(|&entry| entry == (true, 0xFF)));
    }

    #[test]
    fn trait_instructions_go_through_the_bus() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);
        gpio.clear_events();

        lcd.set_cursor(1, 5).unwrap();
        lcd.set_display_control(true, true, false).unwrap();
        lcd.set_entry_mode(CursorDirection::Right, false).unwrap();
        lcd.send_data(b'x').unwrap();
        assert_eq!(
            latched(&gpio),
            [(false, 0xC5), (false, 0x0E), (false, 0x06), (true, b'x')]
        );

        gpio.clear_events();
        assert_eq!(lcd.set_ddram_address(0x80), Err(GpioError::InvalidArgument));
        assert!(latched(&gpio).is_empty());
    }

    #[test]
    fn driver_works_with_a_borrowed_delay() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut delay = gpio.delay();
        let outputs = binding.outputs().unwrap();
        let mut lcd = GpioLcd1602::new(outputs, LcdTiming::default(), &mut delay).unwrap();

        lcd.clear().unwrap();
        assert_eq!(lcd.timing(), &LcdTiming::default());
        assert_eq!(gpio.delays().len(), 3 * 7 + 1);
    }

    #[test]
    fn init_write_errors_reach_the_caller() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let outputs = binding.outputs().unwrap();

        // RS, bus, E high and E low of the first function set, then the RS write of the second
        gpio.fail_writes_after(5);
        let err = GpioLcd1602::new(outputs, TIMING, gpio.delay()).unwrap_err();

        assert_eq!(err, GpioError::Io(ErrorKind::BrokenPipe));
        assert_eq!(latched(&gpio), commands(&[0x30]));
    }

    #[test]
    fn write_errors_stop_the_transaction_before_latching() {
        let gpio = MockGpioDriver::new(GpioConfig::default());
        let mut binding = LcdPinBinding::claim(&gpio, PINOUT).unwrap();
        let mut lcd = lcd(&mut binding, &gpio);
        gpio.clear_events();

        gpio.fail_writes_after(2);
        assert_eq!(lcd.write_line("abc", 1), Err(GpioError::Io(ErrorKind::BrokenPipe)));
        assert!(latched(&gpio).is_empty());
        assert_eq!(gpio.level(PINOUT.e), None);
    }
}
