//! Blocking delays, injected into drivers that need controller timing.

use std::fmt::Debug;
use std::time::Duration;

/// A blocking sleep.
///
/// Drivers take this as a parameter instead of calling [std::thread::sleep] directly, so the timing
/// can be checked in tests without actually waiting.
pub trait Delay: Debug {
    /// Blocks for (at least) the given duration.
    fn delay(&mut self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Copy, Clone, Debug, Default)]
pub struct ThreadSleep;

impl Delay for ThreadSleep {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Delay + ?Sized> Delay for &mut T {
    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration);
    }
}
