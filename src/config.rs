use crate::error::{AmpError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TCP port of the amplifier's control interface
pub const DEFAULT_PORT: u16 = 50005;

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Connection settings for one amplifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmpConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Fixed wait between reconnect attempts; there is no backoff growth
    #[serde(
        rename = "reconnect_delay_secs",
        default = "default_reconnect_delay",
        with = "duration_secs"
    )]
    pub reconnect_delay: Duration,

    /// Upper bound on a single connect attempt, unbounded when `None`
    #[serde(
        rename = "connect_timeout_secs",
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_secs"
    )]
    pub connect_timeout: Option<Duration>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_reconnect_delay() -> Duration {
    DEFAULT_RECONNECT_DELAY
}

impl AmpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: None,
        }
    }

    /// Set the delay between reconnect attempts
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Bound each connect attempt
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Parse a configuration from JSON
    ///
    /// ```
    /// use proaudio_amp::AmpConfig;
    ///
    /// let config = AmpConfig::from_json(r#"{ "host": "10.0.50.166" }"#).unwrap();
    /// assert_eq!(config.port, 50005);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AmpError::Config("host must not be empty".to_string()));
        }
        Ok(())
    }

    /// `host:port` form used to open the socket
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}
