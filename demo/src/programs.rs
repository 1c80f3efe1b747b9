//! The demo programs shown on the display.

use crate::config::Config;
use eyre::eyre;
use lcd1602gpio::delay::Delay;
use lcd1602gpio::lcd::hd44780::driver::GpioLcd1602;
use log::{debug, info};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Glyphs of a rotating asterisk, one per CGRAM slot, in animation order.
const ASTERISK_FRAMES: [[u8; 8]; 8] = [
    // '-' (half left)
    [0b00000, 0b00000, 0b00000, 0b11000, 0b01000, 0b10000, 0b00000, 0b00000],
    // '\' (top left)
    [0b00000, 0b10000, 0b01000, 0b11000, 0b00000, 0b00000, 0b00000, 0b00000],
    // '|' (half top)
    [0b00000, 0b10100, 0b01100, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000],
    // '/' (top right)
    [0b00000, 0b00101, 0b00110, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000],
    // '-' (half right)
    [0b00000, 0b00001, 0b00010, 0b00011, 0b00000, 0b00000, 0b00000, 0b00000],
    // '\' (bottom right)
    [0b00000, 0b00000, 0b00000, 0b00011, 0b00010, 0b00001, 0b00000, 0b00000],
    // '|' (half bottom)
    [0b00000, 0b00000, 0b00000, 0b00000, 0b00110, 0b00101, 0b00000, 0b00000],
    // '/' (bottom left)
    [0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b10100, 0b00000, 0b00000],
];

const ASTERISK_FRAME_TIME: Duration = Duration::from_millis(300);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Program {
    /// Fills both lines once.
    Lines,
    /// Animates a custom glyph in the top-left corner.
    Asterisk,
    /// A work/break timer.
    Pomodoro,
}

impl FromStr for Program {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lines" => Ok(Program::Lines),
            "asterisk" => Ok(Program::Asterisk),
            "pomodoro" => Ok(Program::Pomodoro),
            other => Err(eyre!("Unknown demo {:?}, expected lines, asterisk or pomodoro", other)),
        }
    }
}

impl Program {
    /// Runs the program. `cycles` bounds the looping programs, `0` runs them until `stop` is set.
    /// The looping programs also end early when `stop` is set, and say goodbye either way.
    pub fn run<D: Delay>(
        self,
        lcd: &mut GpioLcd1602<'_, D>,
        config: &Config,
        cycles: u32,
        stop: &AtomicBool,
    ) -> eyre::Result<()> {
        info!("Running {:?} demo", self);
        match self {
            Program::Lines => lines(lcd)?,
            Program::Asterisk => {
                asterisk(lcd, cycles, stop)?;
                goodbye(lcd)?;
            }
            Program::Pomodoro => {
                pomodoro(lcd, config, cycles, stop)?;
                goodbye(lcd)?;
            }
        }
        Ok(())
    }
}

fn stopped(stop: &AtomicBool) -> bool {
    stop.load(Ordering::Relaxed)
}

fn cycle_range(cycles: u32, stop: &AtomicBool) -> Box<dyn Iterator<Item = u32> + '_> {
    let range: Box<dyn Iterator<Item = u32>> = if cycles == 0 {
        Box::new(0..)
    } else {
        Box::new(0..cycles)
    };
    Box::new(range.take_while(move |_| !stopped(stop)))
}

fn lines<D: Delay>(lcd: &mut GpioLcd1602<'_, D>) -> eyre::Result<()> {
    lcd.write_line("abcdefghijklmnop", 0)?;
    lcd.write_line("1234567890123456", 1)?;
    Ok(())
}

fn asterisk<D: Delay>(
    lcd: &mut GpioLcd1602<'_, D>,
    cycles: u32,
    stop: &AtomicBool,
) -> eyre::Result<()> {
    for (index, rows) in (0u8..).zip(ASTERISK_FRAMES.iter()) {
        lcd.set_cgram_char(index, rows)?;
    }

    for cycle in cycle_range(cycles, stop) {
        debug!("Asterisk cycle {}", cycle);
        for index in 0..ASTERISK_FRAMES.len() as u8 {
            if stopped(stop) {
                break;
            }
            lcd.goto_line(0)?;
            lcd.write_char(index)?;
            sleep(ASTERISK_FRAME_TIME);
        }
    }

    Ok(())
}

/// Formats elapsed seconds as `MM:SS`, or `MM SS` for the blinking half of the colon.
fn format_elapsed(elapsed: time::Duration, colon: bool) -> String {
    let minutes = elapsed.whole_minutes();
    let seconds = elapsed.whole_seconds() % 60;
    let separator = if colon { ':' } else { ' ' };
    format!("{:02}{}{:02}", minutes, separator, seconds)
}

fn pomodoro<D: Delay>(
    lcd: &mut GpioLcd1602<'_, D>,
    config: &Config,
    cycles: u32,
    stop: &AtomicBool,
) -> eyre::Result<()> {
    lcd.write_line("a Pomodoro timer", 0)?;
    lcd.write_line(&"=".repeat(16), 1)?;
    sleep(Duration::from_secs(3));

    let periods = [
        ("now working...", config.pomodoro.work_minutes),
        ("==take a break==", config.pomodoro.break_minutes),
    ];

    for _ in cycle_range(cycles, stop) {
        for (title, minutes) in periods {
            if stopped(stop) {
                return Ok(());
            }

            let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
            info!(
                "{} ({} mins) at {:02}:{:02}",
                title.trim_matches('='),
                minutes,
                now.hour(),
                now.minute()
            );

            lcd.clear()?;
            lcd.write_line(title, 0)?;
            lcd.write_line(&format!("       ({} mins)", minutes), 1)?;

            let start = Instant::now();
            let length = Duration::from_secs(u64::from(minutes) * 60);
            loop {
                let tick = Instant::now();
                let elapsed = tick.duration_since(start);
                if elapsed >= length {
                    break;
                }
                if stopped(stop) {
                    return Ok(());
                }

                let elapsed = time::Duration::seconds(elapsed.as_secs() as i64);
                lcd.write_line(&format_elapsed(elapsed, true), 1)?;
                sleep(Duration::from_millis(500));
                lcd.write_line(&format_elapsed(elapsed, false), 1)?;

                // A second from the tick, minus the time spent on the LCD
                sleep((tick + Duration::from_secs(1)).saturating_duration_since(Instant::now()));
            }
        }
    }

    Ok(())
}

fn goodbye<D: Delay>(lcd: &mut GpioLcd1602<'_, D>) -> eyre::Result<()> {
    lcd.clear()?;
    lcd.write_line("Byebye!", 0)?;
    Ok(())
}
