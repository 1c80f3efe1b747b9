//! Process-wide GPIO settings, passed explicitly to a backend when it's created.

use crate::{GpioError, GpioResult};

/// How pin numbers given to a [GpioDriver](crate::GpioDriver) are interpreted.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PinNumbering {
    /// Broadcom GPIO line numbers (`GPIO17` is `17`).
    #[default]
    Bcm,
    /// Physical positions on the 40-pin header (`GPIO17` is pin `11`).
    Board,
}

/// Settings shared by every pin a backend hands out.
///
/// Each backend owns its own copy, so several drivers (or mocks) with different settings can exist
/// side by side.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GpioConfig {
    pub numbering: PinNumbering,
    /// Whether to log a warning when claiming a pin that is already driven as an output.
    pub warnings: bool,
}

impl Default for GpioConfig {
    fn default() -> Self {
        GpioConfig {
            numbering: PinNumbering::Bcm,
            warnings: true,
        }
    }
}

impl GpioConfig {
    pub fn new(numbering: PinNumbering) -> Self {
        GpioConfig {
            numbering,
            ..Default::default()
        }
    }

    pub fn with_warnings(mut self, warnings: bool) -> Self {
        self.warnings = warnings;
        self
    }

    /// Resolves a pin number in the configured numbering scheme to a BCM line number.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the header position is not a GPIO line (power, ground)
    ///   or is outside the header.
    pub fn resolve(&self, pin: usize) -> GpioResult<usize> {
        match self.numbering {
            PinNumbering::Bcm => Ok(pin),
            PinNumbering::Board => BOARD_TO_BCM
                .get(pin)
                .copied()
                .flatten()
                .map(usize::from)
                .ok_or(GpioError::InvalidArgument),
        }
    }

    /// Resolves every pin of a bus, keeping the order. See [GpioConfig::resolve].
    pub fn resolve_all<const N: usize>(&self, pins: [usize; N]) -> GpioResult<[usize; N]> {
        let mut resolved = [0usize; N];
        for (slot, &pin) in resolved.iter_mut().zip(pins.iter()) {
            *slot = self.resolve(pin)?;
        }
        Ok(resolved)
    }
}

/// 40-pin header position to BCM line, indexed by position. Index 0 is unused.
const BOARD_TO_BCM: [Option<u8>; 41] = [
    None,
    None, None,         // 1: 3V3       2: 5V
    Some(2), None,      // 3: GPIO2     4: 5V
    Some(3), None,      // 5: GPIO3     6: GND
    Some(4), Some(14),  // 7: GPIO4     8: GPIO14
    None, Some(15),     // 9: GND      10: GPIO15
    Some(17), Some(18), // 11: GPIO17  12: GPIO18
    Some(27), None,     // 13: GPIO27  14: GND
    Some(22), Some(23), // 15: GPIO22  16: GPIO23
    None, Some(24),     // 17: 3V3     18: GPIO24
    Some(10), None,     // 19: GPIO10  20: GND
    Some(9), Some(25),  // 21: GPIO9   22: GPIO25
    Some(11), Some(8),  // 23: GPIO11  24: GPIO8
    None, Some(7),      // 25: GND     26: GPIO7
    Some(0), Some(1),   // 27: ID_SD   28: ID_SC
    Some(5), None,      // 29: GPIO5   30: GND
    Some(6), Some(12),  // 31: GPIO6   32: GPIO12
    Some(13), None,     // 33: GPIO13  34: GND
    Some(19), Some(16), // 35: GPIO19  36: GPIO16
    Some(26), Some(20), // 37: GPIO26  38: GPIO20
    None, Some(21),     // 39: GND     40: GPIO21
];
