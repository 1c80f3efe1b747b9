use dotenv::var;
use eyre::WrapErr;
use lcd1602gpio::lcd::hd44780::driver::{LcdPinout, LcdTiming};
use lcd1602gpio::{GpioConfig, PinNumbering};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "lcd1602.json";

/// Which GPIO driver to use.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Memory-mapped registers through `/dev/gpiomem`.
    Gpiomem,
    /// Memory-mapped registers through `/dev/mem`.
    Mem,
    /// The GPIO character device, see `gpiod_chip`.
    Gpiod,
    /// Nothing is driven, transactions are logged instead.
    Mock,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Numbering {
    Bcm,
    Board,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pins {
    pub rs: usize,
    pub e: usize,
    /// DB7 first.
    pub data: [usize; 8],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimingMicros {
    pub e_pulse: u64,
    pub e_delay: u64,
    pub reset_delay: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pomodoro {
    pub work_minutes: u32,
    pub break_minutes: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub gpiod_chip: String,
    pub numbering: Numbering,
    pub warnings: bool,
    pub pins: Pins,
    pub timing: TimingMicros,
    pub pomodoro: Pomodoro,
}

impl Config {
    pub fn path() -> PathBuf {
        var("LCD1602_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
            .into()
    }

    /// Loads the config file. `None` only when there is no file; a file that can't be read or
    /// parsed is an error, so it never gets replaced by the defaults.
    pub fn try_load() -> eyre::Result<Option<Self>> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> eyre::Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("Can't open {}", path.display()));
            }
        };

        let config = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("Invalid config in {}", path.display()))?;
        Ok(Some(config))
    }

    pub fn save(&self) -> eyre::Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> eyre::Result<()> {
        let file = File::create(path).wrap_err_with(|| format!("Can't create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn gpio_config(&self) -> GpioConfig {
        let numbering = match self.numbering {
            Numbering::Bcm => PinNumbering::Bcm,
            Numbering::Board => PinNumbering::Board,
        };
        GpioConfig::new(numbering).with_warnings(self.warnings)
    }

    pub fn pinout(&self) -> LcdPinout {
        LcdPinout {
            rs: self.pins.rs,
            e: self.pins.e,
            data: self.pins.data,
        }
    }

    pub fn timing(&self) -> LcdTiming {
        LcdTiming {
            e_pulse: Duration::from_micros(self.timing.e_pulse),
            e_delay: Duration::from_micros(self.timing.e_delay),
            reset_delay: Duration::from_micros(self.timing.reset_delay),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let timing = LcdTiming::default();
        Config {
            backend: Backend::Gpiomem,
            gpiod_chip: "/dev/gpiochip0".to_string(),
            numbering: Numbering::Bcm,
            warnings: false,
            pins: Pins {
                rs: 7,
                e: 8,
                data: [18, 23, 24, 25, 6, 13, 19, 26],
            },
            timing: TimingMicros {
                e_pulse: timing.e_pulse.as_micros() as u64,
                e_delay: timing.e_delay.as_micros() as u64,
                reset_delay: timing.reset_delay.as_micros() as u64,
            },
            pomodoro: Pomodoro {
                work_minutes: 25,
                break_minutes: 5,
            },
        }
    }
}
