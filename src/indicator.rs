//! Visible status signal.
//!
//! The indicator blinks once when a report attempt completes and is held on
//! while the endpoint is unreachable. On a board with a status LED this drives
//! `/sys/class/leds/<name>/brightness`; elsewhere it only logs.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// How long a completion blink lasts.
pub const BLINK_DURATION: Duration = Duration::from_millis(50);

/// A visible signal the operator can watch.
pub trait Indicator {
    /// Momentary blink after a report attempt.
    fn pulse(&mut self);

    /// Hold the alarm state on or off.
    fn set_alarm(&mut self, on: bool);
}

impl<I: Indicator + ?Sized> Indicator for Box<I> {
    fn pulse(&mut self) {
        (**self).pulse()
    }

    fn set_alarm(&mut self, on: bool) {
        (**self).set_alarm(on)
    }
}

/// Indicator that only emits trace events.
#[derive(Debug, Default)]
pub struct LogIndicator {
    alarm: bool,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alarm(&self) -> bool {
        self.alarm
    }
}

impl Indicator for LogIndicator {
    fn pulse(&mut self) {
        tracing::trace!("indicator: blink");
    }

    fn set_alarm(&mut self, on: bool) {
        if on != self.alarm {
            tracing::debug!(alarm = on, "indicator: alarm state changed");
        }
        self.alarm = on;
    }
}

/// Status LED exposed through the Linux LED class.
#[derive(Debug)]
pub struct SysfsLed {
    brightness_path: PathBuf,
    alarm: bool,
}

impl SysfsLed {
    /// LED by name under `/sys/class/leds`.
    pub fn new(name: &str) -> Self {
        Self::with_path(PathBuf::from("/sys/class/leds").join(name).join("brightness"))
    }

    pub fn with_path(brightness_path: PathBuf) -> Self {
        Self {
            brightness_path,
            alarm: false,
        }
    }

    fn write(&self, on: bool) {
        let value = if on { "1" } else { "0" };
        if let Err(e) = std::fs::write(&self.brightness_path, value) {
            tracing::debug!("Could not drive LED {:?}: {e}", self.brightness_path);
        }
    }
}

impl Indicator for SysfsLed {
    fn pulse(&mut self) {
        // A blink while alarmed is inverted so it stays visible.
        self.write(!self.alarm);
        thread::sleep(BLINK_DURATION);
        self.write(self.alarm);
    }

    fn set_alarm(&mut self, on: bool) {
        self.alarm = on;
        self.write(on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysfs_led_holds_alarm_after_pulse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brightness");
        let mut led = SysfsLed::with_path(path.clone());

        led.set_alarm(true);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");

        led.pulse();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");

        led.set_alarm(false);
        led.pulse();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
    }

    #[test]
    fn test_log_indicator_tracks_alarm() {
        let mut indicator = LogIndicator::new();
        indicator.set_alarm(true);
        assert!(indicator.alarm());
        indicator.pulse();
        indicator.set_alarm(false);
        assert!(!indicator.alarm());
    }
}
