//! Station configuration.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic to use on desktop with `std`.
//!
//! # Example
//!
//! ```rust
//! use dcc_station::config::{SchedulerConfig, StationConfig, TimingConfig};
//!
//! // Use defaults
//! let config = StationConfig::default();
//! assert_eq!(config.timing.pgm_read_timeout_ms, 3000);
//!
//! // Or customize
//! let config = StationConfig::default()
//!     .with_name("layout-north")
//!     .with_timing(TimingConfig::default().with_pom_read_timeout_ms(500))
//!     .with_scheduler(SchedulerConfig::default().with_addon_divider(2));
//! ```

use heapless::String as HString;

use crate::logging::Verbosity;

/// Maximum length for short config strings (names, filter directives)
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Create a ShortString from a &str, truncating at a char boundary if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= MAX_SHORT_STRING)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete station configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StationConfig {
    /// Name used in log output
    pub name: ShortString,
    /// Deadlines and poll intervals
    pub timing: TimingConfig,
    /// Packet scheduling policy
    pub scheduler: SchedulerConfig,
    /// Log verbosity
    pub log: LogConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: short_string("dcc-station"),
            timing: TimingConfig::default(),
            scheduler: SchedulerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl StationConfig {
    /// Set the station name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = short_string(name);
        self
    }

    /// Set timing configuration
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Set scheduler configuration
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set log configuration
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}

// ============================================================================
// Timing Config
// ============================================================================

/// Deadlines for the two blocking waits and the detector poll
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingConfig {
    /// Polls for CONTINUE before a stopped channel is forced open
    pub flow_control_polls: u32,
    /// Sleep between flow-control polls
    pub flow_control_poll_ms: u32,
    /// Deadline for a programming-track CV read
    pub pgm_read_timeout_ms: u64,
    /// Deadline for a main-track CV read
    pub pom_read_timeout_ms: u64,
    /// Re-arm interval while waiting for a free detector
    pub detector_retry_ms: u64,
    /// Sleep between polls while waiting for a CV result
    pub cv_poll_interval_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            flow_control_polls: 100,
            flow_control_poll_ms: 1,
            pgm_read_timeout_ms: 3000,
            pom_read_timeout_ms: 300,
            detector_retry_ms: 100,
            cv_poll_interval_ms: 1,
        }
    }
}

impl TimingConfig {
    /// Set the flow-control wait as `polls` × `interval_ms`
    pub fn with_flow_control(mut self, polls: u32, interval_ms: u32) -> Self {
        self.flow_control_polls = polls;
        self.flow_control_poll_ms = interval_ms;
        self
    }

    /// Set the programming-track read deadline
    pub fn with_pgm_read_timeout_ms(mut self, ms: u64) -> Self {
        self.pgm_read_timeout_ms = ms;
        self
    }

    /// Set the main-track read deadline
    pub fn with_pom_read_timeout_ms(mut self, ms: u64) -> Self {
        self.pom_read_timeout_ms = ms;
        self
    }

    /// Set the detector re-arm interval
    pub fn with_detector_retry_ms(mut self, ms: u64) -> Self {
        self.detector_retry_ms = ms;
        self
    }

    /// Set the CV poll interval
    pub fn with_cv_poll_interval_ms(mut self, ms: u32) -> Self {
        self.cv_poll_interval_ms = ms;
        self
    }

    /// Upper bound on a single flow-control wait
    pub fn flow_control_budget_ms(&self) -> u64 {
        u64::from(self.flow_control_polls) * u64::from(self.flow_control_poll_ms)
    }
}

// ============================================================================
// Scheduler Config
// ============================================================================

/// Packet scheduling policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerConfig {
    /// Add-ons are scheduled on one round in this many
    pub addon_divider: u32,
    /// How long a pulse function stays on, in tenths
    pub pulse_tenths: u16,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            addon_divider: 4,
            pulse_tenths: 1,
        }
    }
}

impl SchedulerConfig {
    /// Set the add-on divider (clamped to at least 1)
    pub fn with_addon_divider(mut self, divider: u32) -> Self {
        self.addon_divider = divider.max(1);
        self
    }

    /// Set the pulse duration (clamped to at least 1 tenth)
    pub fn with_pulse_tenths(mut self, tenths: u16) -> Self {
        self.pulse_tenths = tenths.max(1);
        self
    }
}

// ============================================================================
// Log Config
// ============================================================================

/// Logging configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogConfig {
    /// Base level when `RUST_LOG` is unset
    pub verbosity: Verbosity,
    /// Extra filter directives, e.g. `dcc_station::transport=trace`
    pub directives: ShortString,
}

impl LogConfig {
    /// Set verbosity
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set extra filter directives
    pub fn with_directives(mut self, directives: &str) -> Self {
        self.directives = short_string(directives);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StationConfig::default();
        assert_eq!(config.name.as_str(), "dcc-station");
        assert_eq!(config.timing.flow_control_polls, 100);
        assert_eq!(config.timing.flow_control_poll_ms, 1);
        assert_eq!(config.timing.pgm_read_timeout_ms, 3000);
        assert_eq!(config.timing.pom_read_timeout_ms, 300);
        assert_eq!(config.timing.detector_retry_ms, 100);
        assert_eq!(config.scheduler.addon_divider, 4);
        assert_eq!(config.log.verbosity, Verbosity::Normal);
    }

    #[test]
    fn flow_control_budget() {
        let timing = TimingConfig::default().with_flow_control(50, 2);
        assert_eq!(timing.flow_control_budget_ms(), 100);
    }

    #[test]
    fn divider_never_zero() {
        let scheduler = SchedulerConfig::default().with_addon_divider(0);
        assert_eq!(scheduler.addon_divider, 1);
    }

    #[test]
    fn short_string_truncation() {
        let long_input = "a".repeat(100);
        let s = short_string(&long_input);
        assert_eq!(s.len(), MAX_SHORT_STRING);
    }

    #[test]
    fn short_string_respects_char_boundary() {
        let input = "é".repeat(40);
        let s = short_string(&input);
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c == 'é'));
    }

    #[test]
    fn builder_pattern() {
        let config = StationConfig::default()
            .with_name("yard")
            .with_timing(TimingConfig::default().with_pgm_read_timeout_ms(1000))
            .with_log(LogConfig::default().with_verbosity(Verbosity::Verbose));

        assert_eq!(config.name.as_str(), "yard");
        assert_eq!(config.timing.pgm_read_timeout_ms, 1000);
        assert_eq!(config.log.verbosity, Verbosity::Verbose);
    }
}
