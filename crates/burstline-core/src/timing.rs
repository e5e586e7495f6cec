//! # Timing Model
//!
//! Two clock domains meet when a chain is put on air:
//!
//! - **Sample Clock**: monotonic sample counter used to work out how long a
//!   file takes to play at a given sample rate
//! - **Device Time**: the radio's own time base, split into whole and
//!   fractional seconds the way USRP time specs are, used to tag transfers
//!
//! ```text
//!   chain offset (f64 s) ──┐
//!                          ├──► TimeSpec (full_secs, frac_secs) ──► tx metadata
//!   reference TimeSpec ────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;
use std::time::Duration;

/// Frequency reference the device disciplines its oscillator to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSource {
    /// Internal oscillator
    #[default]
    Internal,
    /// External 10 MHz reference input
    External,
    /// GPS disciplined oscillator
    Gpsdo,
    /// MIMO cable (for multi-device sync)
    Mimo,
}

impl ClockSource {
    /// Name as understood by UHD device arguments.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClockSource::Internal => "internal",
            ClockSource::External => "external",
            ClockSource::Gpsdo => "gpsdo",
            ClockSource::Mimo => "mimo",
        }
    }
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClockSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "internal" => Ok(ClockSource::Internal),
            "external" | "10mhz" => Ok(ClockSource::External),
            "gpsdo" | "gps" => Ok(ClockSource::Gpsdo),
            "mimo" => Ok(ClockSource::Mimo),
            _ => Err(format!(
                "Unknown clock source '{}'. Valid sources: internal, external, gpsdo, mimo",
                s
            )),
        }
    }
}

/// Time reference the device aligns its time base to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSource {
    /// Free-running device time
    #[default]
    Internal,
    /// External PPS input
    External,
    /// GPS disciplined oscillator
    Gpsdo,
    /// MIMO cable from another device
    Mimo,
}

impl TimeSource {
    /// Name as understood by UHD device arguments.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TimeSource::Internal => "internal",
            TimeSource::External => "external",
            TimeSource::Gpsdo => "gpsdo",
            TimeSource::Mimo => "mimo",
        }
    }
}

impl fmt::Display for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "internal" | "none" | "freerun" => Ok(TimeSource::Internal),
            "external" | "pps" => Ok(TimeSource::External),
            "gpsdo" | "gps" => Ok(TimeSource::Gpsdo),
            "mimo" => Ok(TimeSource::Mimo),
            _ => Err(format!(
                "Unknown time source '{}'. Valid sources: internal, external, gpsdo, mimo",
                s
            )),
        }
    }
}

/// Sample-based clock.
///
/// Counts samples monotonically and converts to seconds at a given rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleClock {
    /// Number of samples since epoch (start of stream)
    samples: u64,
    /// Sample rate in Hz
    sample_rate: f64,
}

impl SampleClock {
    /// Create a sample clock at a specific sample count.
    pub fn at_sample(samples: u64, sample_rate: f64) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Convert to seconds since epoch.
    #[inline]
    pub fn to_seconds(&self) -> f64 {
        self.samples as f64 / self.sample_rate
    }
}

/// Device time as whole seconds plus a fractional part in `[0, 1)`.
///
/// Keeping the two parts apart preserves sub-nanosecond resolution for
/// device clocks that have been running for a long time.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct TimeSpec {
    full_secs: i64,
    frac_secs: f64,
}

impl TimeSpec {
    /// Build from parts; the fractional part is normalized into `[0, 1)`.
    pub fn new(full_secs: i64, frac_secs: f64) -> Self {
        let carry = frac_secs.floor();
        Self {
            full_secs: full_secs + carry as i64,
            frac_secs: frac_secs - carry,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    #[inline]
    pub fn full_secs(&self) -> i64 {
        self.full_secs
    }

    #[inline]
    pub fn frac_secs(&self) -> f64 {
        self.frac_secs
    }

    #[inline]
    pub fn as_secs_f64(&self) -> f64 {
        self.full_secs as f64 + self.frac_secs
    }
}

impl Add<f64> for TimeSpec {
    type Output = TimeSpec;

    fn add(self, secs: f64) -> TimeSpec {
        let whole = secs.trunc();
        TimeSpec::new(self.full_secs + whole as i64, self.frac_secs + (secs - whole))
    }
}

impl Add<Duration> for TimeSpec {
    type Output = TimeSpec;

    fn add(self, d: Duration) -> TimeSpec {
        TimeSpec::new(
            self.full_secs + d.as_secs() as i64,
            self.frac_secs + d.subsec_nanos() as f64 * 1e-9,
        )
    }
}

impl Sub for TimeSpec {
    type Output = f64;

    /// Difference in seconds.
    fn sub(self, other: TimeSpec) -> f64 {
        (self.full_secs - other.full_secs) as f64 + (self.frac_secs - other.frac_secs)
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}s", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_clock_seconds() {
        let clock = SampleClock::at_sample(2000, 1000.0);
        assert_eq!(clock.to_seconds(), 2.0);
    }

    #[test]
    fn test_timespec_normalizes_fraction() {
        let t = TimeSpec::new(1, 1.25);
        assert_eq!(t.full_secs(), 2);
        assert!((t.frac_secs() - 0.25).abs() < 1e-12);

        let t = TimeSpec::new(3, -0.5);
        assert_eq!(t.full_secs(), 2);
        assert!((t.frac_secs() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_timespec_add_seconds() {
        let t = TimeSpec::new(100, 0.75) + 2.5;
        assert_eq!(t.full_secs(), 103);
        assert!((t.frac_secs() - 0.25).abs() < 1e-12);
        assert!(((t - TimeSpec::new(100, 0.75)) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_timespec_add_duration() {
        let t = TimeSpec::zero() + Duration::from_millis(1500);
        assert_eq!(t.full_secs(), 1);
        assert!((t.frac_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_time_source_parse() {
        assert_eq!("gps".parse::<TimeSource>(), Ok(TimeSource::Gpsdo));
        assert_eq!("PPS".parse::<TimeSource>(), Ok(TimeSource::External));
        assert_eq!("internal".parse::<TimeSource>(), Ok(TimeSource::Internal));
        assert!("sundial".parse::<TimeSource>().is_err());
        assert_eq!(TimeSource::Mimo.to_string(), "mimo");
    }

    #[test]
    fn test_clock_source_parse() {
        assert_eq!("10MHz".parse::<ClockSource>(), Ok(ClockSource::External));
        assert_eq!("gpsdo".parse::<ClockSource>(), Ok(ClockSource::Gpsdo));
        assert_eq!(ClockSource::default(), ClockSource::Internal);
        assert!("rubidium".parse::<ClockSource>().is_err());
    }
}
