mod binding;
mod gpio;

use crate::{GpioError, GpioResult};
pub use binding::*;
pub use gpio::*;
use std::fmt::Debug;
use std::time::Duration;

/// Write-only HD44780 instruction set.
///
/// Only [HD44780Driver::send_command] and [HD44780Driver::send_data] have to be implemented, every
/// instruction is built on top of them.
pub trait HD44780Driver: Debug {
    /// Clears the display and sets the cursor to the home position.
    ///
    /// Command: `00000001`. This is the slowest instruction (1.52 ms).
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(0b00000001)
    }

    /// Sets the cursor to the home position and undoes any display shift.
    ///
    /// Command: `0000001?`.
    fn return_home(&mut self) -> GpioResult<()> {
        self.send_command(0b00000010)
    }

    /// Sets the display to the specified entry mode.
    ///
    /// Command: `000001IS`.
    /// `I` is `1` to move the cursor right after each write, `0` to move it left.
    /// `S` is `1` to shift the whole display instead.
    fn set_entry_mode(&mut self, cursor_direction: CursorDirection, shift: bool) -> GpioResult<()> {
        let mut command = 0b00000100;
        if cursor_direction == CursorDirection::Right {
            command |= 0b00000010;
        }
        if shift {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    ///
    /// Command: `00001DCB`.
    fn set_display_control(
        &mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> GpioResult<()> {
        let mut command = 0b00001000;
        if display_on {
            command |= 0b00000100;
        }
        if cursor_on {
            command |= 0b00000010;
        }
        if blink_on {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Moves the cursor or shifts the display by one position.
    ///
    /// Command: `0001SR??`.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> GpioResult<()> {
        let mut command = 0b00010000;
        if display_shift {
            command |= 0b00001000;
        }
        if direction == CursorDirection::Right {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the interface data length, number of lines and font.
    ///
    /// Command: `001DNF??`.
    /// The font bit is ignored by the controller in 2-line mode.
    fn function_set(
        &mut self,
        data_length_8bit: bool,
        two_lines: bool,
        alt_font: bool,
    ) -> GpioResult<()> {
        let mut command = 0b00100000;
        if data_length_8bit {
            command |= 0b00010000;
        }
        if two_lines {
            command |= 0b00001000;
        }
        if alt_font {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the CGRAM address. Following data writes go to the custom glyph memory.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the address doesn't fit in 6 bits.
    fn set_cgram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0b00111111 {
            return Err(GpioError::InvalidArgument);
        }
        let command = 0b01000000 | address;
        self.send_command(command)
    }

    /// Sets the DDRAM address. Following data writes go to the display memory.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the address doesn't fit in 7 bits.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0b01111111 {
            return Err(GpioError::InvalidArgument);
        }
        let command = 0b10000000 | address;
        self.send_command(command)
    }

    /// Moves the cursor to the given column of a 2-line display.
    ///
    /// `line` is normalized like [GpioLcd1602::goto_line]: `1` is the second line, anything else
    /// is the first one.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the column is past the 40 characters of a line.
    fn set_cursor(&mut self, line: u8, column: u8) -> GpioResult<()> {
        if column >= LINE_LENGTH {
            return Err(GpioError::InvalidArgument);
        }
        self.set_ddram_address(line_address(line) + column)
    }

    // Low-level commands
    // These are used by the high-level functions above and implemented by the driver.

    /// Sends a command to the HD44780 controller.
    /// Sets the RS pin to 0 (command).
    fn send_command(&mut self, command: u8) -> GpioResult<()>;

    /// Sends data to the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn send_data(&mut self, data: u8) -> GpioResult<()>;
}

/// DDRAM characters per line in 2-line mode.
pub const LINE_LENGTH: u8 = 40;

/// Gets the DDRAM address of the start of a line. `1` is the second line, anything else falls back
/// to the first one.
pub fn line_address(line: u8) -> u8 {
    match line {
        1 => 0x40,
        _ => 0x00,
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing data.
    Left,
    /// Moves the cursor to the right after writing data.
    Right,
}

/// Timing of the enable pulse and of the initialization.
///
/// The busy flag can't be read back, so the defaults are well above the execution times listed in
/// the HD44780U datasheet (table 6): every byte takes at least `2 * e_delay + e_pulse`, which
/// covers everything except clear display and return home.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LcdTiming {
    /// How long E is held high.
    pub e_pulse: Duration,
    /// Wait before raising E and after lowering it.
    pub e_delay: Duration,
    /// Wait after the first function set of the initialization, at least 4.1 ms.
    pub reset_delay: Duration,
}

impl Default for LcdTiming {
    fn default() -> Self {
        LcdTiming {
            e_pulse: Duration::from_micros(500),
            e_delay: Duration::from_micros(500),
            reset_delay: Duration::from_micros(4_100 + 100),
        }
    }
}
