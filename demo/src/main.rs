mod config;
mod programs;

use crate::config::{Backend, Config};
use crate::programs::Program;
use dotenv::dotenv;
use lcd1602gpio::GpioDriver;
use lcd1602gpio::delay::{Delay, ThreadSleep};
use lcd1602gpio::gpiod::GpiodDriver;
use lcd1602gpio::lcd::hd44780::driver::{GpioLcd1602, LcdPinBinding};
use lcd1602gpio::mock::MockGpioDriver;
use lcd1602gpio::raw::RawGpioDriver;
use log::{debug, info, warn};
use std::env::{args, var};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use sysinfo::System;

/// Claims the pins, initializes the display and runs the program. Everything is released in reverse
/// order when this returns, the pins last.
fn run<G: GpioDriver, D: Delay>(
    gpio: &G,
    delay: D,
    config: &Config,
    program: Program,
    cycles: u32,
    stop: &AtomicBool,
) -> eyre::Result<()> {
    debug!("{:?} initialized.", gpio);

    debug!("Initializing LCD driver...");
    let mut binding = LcdPinBinding::claim(gpio, config.pinout())?;
    let mut lcd = GpioLcd1602::new(binding.outputs()?, config.timing(), delay)?;
    debug!("{:?} initialized.", lcd);

    program.run(&mut lcd, config, cycles, stop)?;
    drop(lcd);

    info!("Releasing LCD pins {:?}", binding.bcm_pinout());
    Ok(())
}

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "Hello, {}!",
        System::name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!("Architecture {}", System::cpu_arch());

    let program: Program = match args().nth(1).or_else(|| var("LCD1602_DEMO").ok()) {
        Some(name) => name.parse()?,
        None => Program::Lines,
    };
    let mut cycles: u32 = match var("LCD1602_DEMO_CYCLES") {
        Ok(cycles) => cycles.parse()?,
        Err(_) => 0,
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            warn!("Interrupted, stopping...");
            stop.store(true, Ordering::Relaxed);
        })?;
    }

    debug!("Trying to load config from {}...", Config::path().display());
    let config = match Config::try_load()? {
        Some(config) => {
            info!("Config loaded.");
            config
        }
        None => {
            info!("Config not found. Using default");
            let config = Config::default();
            config.save()?;
            info!("Default config saved.");
            config
        }
    };

    info!(
        "LCD @ RS: {}, E: {}, Data: {:?} ({:?} numbering, {:?} backend)",
        config.pins.rs, config.pins.e, config.pins.data, config.numbering, config.backend
    );

    let gpio_config = config.gpio_config();
    match config.backend {
        Backend::Gpiomem => {
            let gpio = RawGpioDriver::new_gpiomem(gpio_config)?;
            run(&gpio, ThreadSleep, &config, program, cycles, &stop)?;
        }
        Backend::Mem => {
            let gpio = RawGpioDriver::new_mem(gpio_config)?;
            run(&gpio, ThreadSleep, &config, program, cycles, &stop)?;
        }
        Backend::Gpiod => {
            let gpio = GpiodDriver::open(&config.gpiod_chip, gpio_config)?;
            run(&gpio, ThreadSleep, &config, program, cycles, &stop)?;
        }
        Backend::Mock => {
            // The mock keeps every event until the run ends
            if cycles == 0 {
                info!("Mock backend, running a single cycle");
                cycles = 1;
            }

            let gpio = MockGpioDriver::new(gpio_config);
            run(&gpio, gpio.delay(), &config, program, cycles, &stop)?;

            // The mock records BCM lines, whatever the configured numbering
            let bcm = gpio_config.resolve_all([config.pins.rs, config.pins.e])?;
            let data = gpio_config.resolve_all(config.pins.data)?;
            for transaction in gpio.latched(bcm[0], bcm[1], data) {
                debug!(
                    "{} {:#04x} {:?}",
                    if transaction.rs { "DATA" } else { "CMD " },
                    transaction.byte,
                    transaction.byte as char,
                );
            }
        }
    }

    info!("Done.");
    Ok(())
}
