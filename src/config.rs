//! Inspection configuration
//!
//! Caps that bound a single pass over an image, and the pacing of the refresh loop.

use std::time::Duration;

/// Configuration for [`crate::Inspector`] and [`crate::run`].
///
/// The caps turn a corrupt, non-terminating table into [`crate::Error::IterationLimit`] instead
/// of an unbounded walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectConfig {
    /// Maximum number of import descriptors walked per pass
    pub max_modules: usize,

    /// Maximum number of thunks decoded per module
    pub max_thunks: usize,

    /// Maximum length of a module or symbol name, excluding the terminator
    pub max_name_len: usize,

    /// Pause between two passes of the refresh loop
    pub refresh_interval: Duration,

    /// Number of passes after which the refresh loop ends on its own
    pub max_passes: Option<usize>,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            max_modules: 4096,
            max_thunks: 65536,
            max_name_len: 4096,
            refresh_interval: Duration::from_secs(1),
            max_passes: None,
        }
    }
}

impl InspectConfig {
    /// Tight caps for images from untrusted sources.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_modules: 256,
            max_thunks: 4096,
            max_name_len: 256,
            ..Self::default()
        }
    }

    /// Sets [`InspectConfig::max_modules`].
    #[must_use]
    pub fn with_max_modules(mut self, max_modules: usize) -> Self {
        self.max_modules = max_modules;
        self
    }

    /// Sets [`InspectConfig::max_thunks`].
    #[must_use]
    pub fn with_max_thunks(mut self, max_thunks: usize) -> Self {
        self.max_thunks = max_thunks;
        self
    }

    /// Sets [`InspectConfig::max_name_len`].
    #[must_use]
    pub fn with_max_name_len(mut self, max_name_len: usize) -> Self {
        self.max_name_len = max_name_len;
        self
    }

    /// Sets [`InspectConfig::refresh_interval`].
    #[must_use]
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Ends the refresh loop after `max_passes` passes.
    #[must_use]
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = Some(max_passes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InspectConfig::default();
        assert_eq!(config.max_modules, 4096);
        assert_eq!(config.max_thunks, 65536);
        assert_eq!(config.max_name_len, 4096);
        assert_eq!(config.refresh_interval, Duration::from_secs(1));
        assert_eq!(config.max_passes, None);
    }

    #[test]
    fn test_strict_preset() {
        let strict = InspectConfig::strict();
        assert_eq!(strict.max_modules, 256);
        assert_eq!(strict.max_thunks, 4096);
        assert_eq!(strict.max_name_len, 256);
        assert_eq!(strict.refresh_interval, InspectConfig::default().refresh_interval);
    }

    #[test]
    fn test_builders() {
        let config = InspectConfig::strict()
            .with_max_modules(8)
            .with_max_thunks(16)
            .with_max_name_len(32)
            .with_refresh_interval(Duration::from_millis(5))
            .with_max_passes(3);

        assert_eq!(config.max_modules, 8);
        assert_eq!(config.max_thunks, 16);
        assert_eq!(config.max_name_len, 32);
        assert_eq!(config.refresh_interval, Duration::from_millis(5));
        assert_eq!(config.max_passes, Some(3));
    }
}
