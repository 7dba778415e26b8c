//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default interval between reads of tracked files.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default interval between full glob re-scans.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(3);

/// Default silence period before a "no files changed" notice.
pub const DEFAULT_DISP_INTERVAL: Duration = Duration::from_secs(60);

/// Settings read from a TOML configuration file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Patterns tailed in addition to those given on the command line.
    pub patterns: Vec<String>,
    /// Interval to poll files for new content.
    #[serde(with = "humantime_serde::option")]
    pub poll_interval: Option<Duration>,
    /// Interval to scan for new files matching the patterns.
    #[serde(with = "humantime_serde::option")]
    pub scan_interval: Option<Duration>,
    /// Silence period before a notice; `0s` disables it.
    #[serde(with = "humantime_serde::option")]
    pub disp_interval: Option<Duration>,
}

/// Values given on the command line, overriding the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub patterns: Vec<String>,
    pub poll_interval: Option<Duration>,
    pub scan_interval: Option<Duration>,
    pub disp_interval: Option<Duration>,
}

/// Immutable runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailConfig {
    /// Glob patterns, in the order given. Never empty.
    pub patterns: Vec<String>,
    /// Interval to poll files for new content.
    pub poll_interval: Duration,
    /// Interval to scan for new files matching the patterns.
    pub scan_interval: Duration,
    /// Silence period before a notice; zero disables it.
    pub disp_interval: Duration,
}

impl TailConfig {
    /// Create a configuration with default intervals.
    ///
    /// # Errors
    ///
    /// Returns an error if `patterns` is empty.
    pub fn new(patterns: Vec<String>) -> Result<Self, ConfigError> {
        Self::from_sources(
            FileConfig::default(),
            CliOverrides {
                patterns,
                ..CliOverrides::default()
            },
        )
    }

    /// Merge file settings with command-line overrides.
    ///
    /// File patterns come first, followed by command-line patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if no pattern is configured or the poll or scan
    /// interval is zero.
    pub fn from_sources(file: FileConfig, cli: CliOverrides) -> Result<Self, ConfigError> {
        let mut patterns = file.patterns;
        patterns.extend(cli.patterns);
        if patterns.is_empty() {
            return Err(ConfigError::NoPatterns);
        }

        let config = Self {
            patterns,
            poll_interval: cli
                .poll_interval
                .or(file.poll_interval)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            scan_interval: cli
                .scan_interval
                .or(file.scan_interval)
                .unwrap_or(DEFAULT_SCAN_INTERVAL),
            disp_interval: cli
                .disp_interval
                .or(file.disp_interval)
                .unwrap_or(DEFAULT_DISP_INTERVAL),
        };

        if config.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("poll-interval"));
        }
        if config.scan_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("scan-interval"));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TailConfig::new(vec!["/var/log/*.log".to_string()]).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.scan_interval, Duration::from_secs(3));
        assert_eq!(config.disp_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_no_patterns_rejected() {
        assert!(matches!(
            TailConfig::new(Vec::new()),
            Err(ConfigError::NoPatterns)
        ));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = TailConfig::from_sources(
            FileConfig::default(),
            CliOverrides {
                patterns: vec!["*.log".to_string()],
                poll_interval: Some(Duration::ZERO),
                ..CliOverrides::default()
            },
        );
        assert!(matches!(
            result,
            Err(ConfigError::ZeroInterval("poll-interval"))
        ));
    }

    #[test]
    fn test_zero_disp_interval_allowed() {
        let config = TailConfig::from_sources(
            FileConfig::default(),
            CliOverrides {
                patterns: vec!["*.log".to_string()],
                disp_interval: Some(Duration::ZERO),
                ..CliOverrides::default()
            },
        )
        .unwrap();
        assert!(config.disp_interval.is_zero());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig {
            patterns: vec!["/var/log/*.log".to_string()],
            poll_interval: Some(Duration::from_secs(1)),
            scan_interval: Some(Duration::from_secs(10)),
            disp_interval: None,
        };
        let cli = CliOverrides {
            patterns: vec!["/srv/**/*.log".to_string()],
            poll_interval: Some(Duration::from_millis(250)),
            ..CliOverrides::default()
        };

        let config = TailConfig::from_sources(file, cli).unwrap();
        assert_eq!(
            config.patterns,
            vec!["/var/log/*.log".to_string(), "/srv/**/*.log".to_string()]
        );
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.scan_interval, Duration::from_secs(10));
        assert_eq!(config.disp_interval, DEFAULT_DISP_INTERVAL);
    }

    #[test]
    fn test_file_config_deserialize() {
        let toml = r#"
            patterns = ["/var/log/nginx/*.log"]
            poll_interval = "250ms"
            scan_interval = "5s"
            disp_interval = "0s"
        "#;
        let config: FileConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.patterns, vec!["/var/log/nginx/*.log".to_string()]);
        assert_eq!(config.poll_interval, Some(Duration::from_millis(250)));
        assert_eq!(config.scan_interval, Some(Duration::from_secs(5)));
        assert_eq!(config.disp_interval, Some(Duration::ZERO));
    }

    #[test]
    fn test_file_config_partial() {
        let config: FileConfig = toml::from_str(r#"scan_interval = "1m""#).unwrap();
        assert!(config.patterns.is_empty());
        assert_eq!(config.scan_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.poll_interval, None);
    }

    #[test]
    fn test_file_config_rejects_unknown_keys() {
        assert!(toml::from_str::<FileConfig>("poll = \"1s\"").is_err());
    }
}
