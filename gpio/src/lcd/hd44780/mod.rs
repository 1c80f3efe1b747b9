//! HD44780 LCD module.
//!
//! The [driver::HD44780Driver] trait describes the write-only part of the HD44780 instruction set,
//! and [driver::GpioLcd1602] implements it on top of plain GPIO pins in 8-bit mode, as found on the
//! common 16x2 "LCD1602" modules. Pins are claimed and bound with [driver::LcdPinBinding].
//!
//! The busy flag is never read, so the R/W pin of the display must be tied to GND. Every
//! instruction is given a fixed, generous amount of time instead; see [driver::LcdTiming].

pub mod driver;
