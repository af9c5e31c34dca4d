//! TOML configuration file.

use klipperdeck_core::{ConnectionParams, DEFAULT_PORT, PrinterProfile, ProfileError};
use klipperdeck_session::{Fallback, RetryPolicy, SessionOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid [printer] section in {path}: {source}")]
    Profile {
        path: PathBuf,
        source: ProfileError,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSection,
    pub printer: PrinterProfile,
    pub session: SessionSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub host: String,
    pub port: u16,
    pub auto_connect: bool,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            auto_connect: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub fallback_delay_secs: u64,
    pub fallback: Fallback,
    pub seed: Option<u64>,
}

impl Default for SessionSection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            retry_delay_secs: policy.retry_delay.as_secs(),
            fallback_delay_secs: policy.fallback_delay.as_secs(),
            fallback: policy.fallback,
            seed: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config
            .printer
            .validate()
            .map_err(|source| ConfigError::Profile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn override_with(&mut self, host: Option<String>, port: Option<u16>) {
        if let Some(host) = host {
            self.connection.host = host;
        }
        if let Some(port) = port {
            self.connection.port = port;
        }
    }

    pub fn params(&self) -> ConnectionParams {
        ConnectionParams::new(&self.connection.host, self.connection.port)
            .with_auto_connect(self.connection.auto_connect)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            profile: self.printer.clone(),
            policy: RetryPolicy {
                max_attempts: self.session.max_attempts.max(1),
                retry_delay: Duration::from_secs(self.session.retry_delay_secs),
                fallback_delay: Duration::from_secs(self.session.fallback_delay_secs),
                fallback: self.session.fallback,
            },
            seed: self.session.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 7125);
        assert!(config.connection.auto_connect);
        assert_eq!(config.session_options().policy, RetryPolicy::default());
        assert_eq!(config.printer, PrinterProfile::default());
    }

    #[test]
    fn full_file() {
        let config: Config = toml::from_str(
            r#"
            [connection]
            host = "192.168.1.8"
            port = 7125
            auto_connect = true

            [printer.hotend]
            min = 0.0
            max = 260.0
            min_extrude_temp = 170.0

            [session]
            max_attempts = 4
            retry_delay_secs = 1
            fallback = "stay"
            "#,
        )
        .unwrap();

        let params = config.params();
        assert_eq!(params.host, "192.168.1.8");
        assert!(params.auto_connect);
        assert_eq!(config.printer.hotend.max, 260.0);
        assert_eq!(config.printer.bed, PrinterProfile::default().bed);

        let options = config.session_options();
        assert_eq!(options.policy.max_attempts, 4);
        assert_eq!(options.policy.retry_delay, Duration::from_secs(1));
        assert_eq!(options.policy.fallback_delay, Duration::from_secs(2));
        assert_eq!(options.policy.fallback, Fallback::Stay);
    }

    #[test]
    fn flags_override_file() {
        let mut config = Config::default();
        config.override_with(Some("printer.local".into()), Some(22));
        let params = config.params();
        assert_eq!(params.host, "printer.local");
        assert_eq!(params.effective_port(), 7125);
    }

    #[test]
    fn inverted_travel_is_rejected_at_load() {
        let path = Path::new("klipperdeck.toml");
        let text = r#"
            [printer.axes]
            x = { min = 235.0, max = -14.0 }
            y = { min = -3.0, max = 240.0 }
            z = { min = -4.0, max = 250.0 }
        "#;
        match Config::parse(text, path) {
            Err(ConfigError::Profile { source, .. }) => {
                assert!(source.to_string().contains("axes.x"), "{source}");
            }
            other => panic!("expected a profile error, got {other:?}"),
        }
        assert!(Config::parse("[connection]\nhost = \"p\"\n", path).is_ok());
    }

    #[test]
    fn bad_fallback_is_rejected() {
        let err = toml::from_str::<Config>("[session]\nfallback = \"panic\"").unwrap_err();
        assert!(err.to_string().contains("panic"));
    }
}
