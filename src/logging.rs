//! Log verbosity and subscriber setup.
//!
//! The library only emits `tracing` events. Which of them are shown is up to
//! the subscriber; [`Verbosity`] is the coarse knob callers expose to users.
//!
//! With the `subscriber` feature, [`init`] installs a `tracing-subscriber`
//! fmt layer. `RUST_LOG` wins when set; otherwise the filter is built from
//! the configured verbosity plus any extra directives.

use tracing::level_filters::LevelFilter;

/// Coarse log level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Verbosity {
    /// Nothing.
    Silent,
    /// Warnings and notable events.
    #[default]
    Normal,
    /// Every command sent.
    Verbose,
}

impl Verbosity {
    /// The `tracing` level this verbosity enables.
    pub const fn level_filter(&self) -> LevelFilter {
        match self {
            Verbosity::Silent => LevelFilter::OFF,
            Verbosity::Normal => LevelFilter::INFO,
            Verbosity::Verbose => LevelFilter::DEBUG,
        }
    }

    /// Parse "silent", "normal" or "verbose" (also 0, 1, 2).
    pub fn from_text(s: &str) -> Option<Self> {
        match s.trim() {
            t if t.eq_ignore_ascii_case("silent") || t == "0" => Some(Verbosity::Silent),
            t if t.eq_ignore_ascii_case("normal") || t == "1" => Some(Verbosity::Normal),
            t if t.eq_ignore_ascii_case("verbose") || t == "2" => Some(Verbosity::Verbose),
            _ => None,
        }
    }
}

/// Install a global fmt subscriber.
///
/// Returns an error if a global subscriber is already set.
#[cfg(feature = "subscriber")]
pub fn init(
    config: &crate::config::LogConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let base = EnvFilter::default().add_directive(config.verbosity.level_filter().into());
        config
            .directives
            .split(',')
            .filter_map(|d| d.trim().parse().ok())
            .fold(base, |filter, directive| filter.add_directive(directive))
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init()
}
