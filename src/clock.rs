//! Explicit CPU-frequency configuration.
//!
//! Cycle→microsecond conversion and settle-margin computation both need
//! the frequency of the clock the trace was captured with. The value is
//! constructed once by the caller (from cpuinfo text or a fixed test
//! value) and passed down explicitly; nothing in the library caches it
//! process-wide.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// CPU frequency of the capture clock, in MHz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub cpu_mhz: f64,
}

impl ClockConfig {
    pub fn new(cpu_mhz: f64) -> Result<Self, AnalysisError> {
        if !cpu_mhz.is_finite() || cpu_mhz <= 0.0 {
            return Err(AnalysisError::BadCpuInfo(format!(
                "cpu frequency must be a positive number of MHz, got {}",
                cpu_mhz
            )));
        }
        Ok(Self { cpu_mhz })
    }

    /// Read the first `cpu MHz : <float>` line of cpuinfo-format text.
    pub fn from_cpuinfo_text(text: &str) -> Result<Self, AnalysisError> {
        for line in text.lines() {
            if line.starts_with("cpu MHz") {
                let value = line
                    .split(':')
                    .nth(1)
                    .map(str::trim)
                    .unwrap_or_default();
                let mhz = value.parse::<f64>().map_err(|_| {
                    AnalysisError::BadCpuInfo(format!("unparseable cpu MHz value {:?}", value))
                })?;
                return Self::new(mhz);
            }
        }
        Err(AnalysisError::BadCpuInfo(
            "no `cpu MHz` line found".to_string(),
        ))
    }

    pub fn from_cpuinfo_file(path: &Path) -> Result<Self, AnalysisError> {
        let text = fs::read_to_string(path)?;
        Self::from_cpuinfo_text(&text)
    }

    /// Convert a duration in seconds to cycles of the capture clock.
    pub fn cycles(&self, secs: f64) -> i64 {
        (secs * self.cpu_mhz * 1e6) as i64
    }

    /// Convert a cycle count to microseconds.
    pub fn cycles_to_usecs(&self, cycles: i64) -> f64 {
        cycles as f64 / self.cpu_mhz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) CPU E5-2630 v3 @ 2.40GHz
cpu MHz\t\t: 2399.926
cache size\t: 20480 KB
cpu MHz\t\t: 1200.000
";

    #[test]
    fn reads_first_cpu_mhz_line() {
        let clock = ClockConfig::from_cpuinfo_text(CPUINFO).unwrap();
        assert_eq!(clock.cpu_mhz, 2399.926);
    }

    #[test]
    fn missing_line_is_an_error() {
        let err = ClockConfig::from_cpuinfo_text("processor: 0\n").unwrap_err();
        assert!(matches!(err, AnalysisError::BadCpuInfo(_)));
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let err = ClockConfig::from_cpuinfo_text("cpu MHz : fast\n").unwrap_err();
        assert!(matches!(err, AnalysisError::BadCpuInfo(_)));
    }

    #[test]
    fn rejects_non_positive_frequency() {
        assert!(ClockConfig::new(0.0).is_err());
        assert!(ClockConfig::new(-1.0).is_err());
        assert!(ClockConfig::new(f64::NAN).is_err());
    }

    #[test]
    fn seconds_to_cycles() {
        let clock = ClockConfig::new(2400.0).unwrap();
        assert_eq!(clock.cycles(1.0), 2_400_000_000);
        assert_eq!(clock.cycles(0.5), 1_200_000_000);
    }

    #[test]
    fn cycles_to_usecs_divides_by_mhz() {
        let clock = ClockConfig::new(2400.0).unwrap();
        assert_eq!(clock.cycles_to_usecs(2400), 1.0);
        assert_eq!(clock.cycles_to_usecs(0), 0.0);
    }
}
