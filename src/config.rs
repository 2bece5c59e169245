use std::{env, path::PathBuf, time::Duration};

/// Environment variable naming the session credentials directory.
pub const ENV_SESSION_DIR: &str = "SESSION_DIR";
/// Environment variable naming the snapshot file path.
pub const ENV_STORE_FILE: &str = "STORE_FILE";
/// Environment variable carrying the phone number for non-interactive pairing.
pub const ENV_PHONE_NUMBER: &str = "PHONE_NUMBER";
/// Environment variable naming the pairing relay port.
pub const ENV_PORT: &str = "PORT";

/// Delay inserted between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Close events stop scheduling retries once this many attempts are in flight.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;
/// How often the snapshot cache is flushed to disk.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Base configuration used by the bot runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Directory holding credential material managed by the auth-state provider.
    pub session_dir: PathBuf,
    /// Path to the JSON snapshot of messages, contacts and chats.
    pub store_file: PathBuf,
    /// Phone number (digits only, country code included) for non-interactive pairing.
    pub phone_number: Option<String>,
    /// Fixed backoff delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on consecutive reconnect attempts before the process halts.
    pub max_reconnect_attempts: u32,
    /// Interval of the background snapshot flush timer.
    pub flush_interval: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            session_dir: "./session".into(),
            store_file: "./store.json".into(),
            phone_number: None,
            reconnect_delay: RECONNECT_DELAY,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            flush_interval: FLUSH_INTERVAL,
        }
    }
}

impl BotConfig {
    /// Build a configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var(ENV_SESSION_DIR) {
            config.session_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var(ENV_STORE_FILE) {
            config.store_file = PathBuf::from(file);
        }
        config.phone_number = env::var(ENV_PHONE_NUMBER).ok().filter(|s| !s.is_empty());
        config
    }

    /// Override the session credentials directory.
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = dir.into();
        self
    }

    /// Override the snapshot file path.
    pub fn with_store_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.store_file = file.into();
        self
    }

    /// Override the pairing phone number.
    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    /// Override the reconnect backoff delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Override the reconnect attempt bound.
    pub fn with_max_reconnect_attempts(mut self, max: u32) -> Self {
        self.max_reconnect_attempts = max;
        self
    }
}

/// Configuration for the pairing relay HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl RelayConfig {
    /// Build a relay configuration from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env::var(ENV_PORT).ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_match_legacy_layout() {
        let config = BotConfig::default();
        assert_eq!(config.session_dir, PathBuf::from("./session"));
        assert_eq!(config.store_file, PathBuf::from("./store.json"));
        assert!(config.phone_number.is_none());
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn builder_overrides() {
        let config = BotConfig::default()
            .with_session_dir("/data/session")
            .with_store_file("/data/store.json")
            .with_phone_number("923232391033")
            .with_max_reconnect_attempts(5);
        assert_eq!(config.session_dir, PathBuf::from("/data/session"));
        assert_eq!(config.store_file, PathBuf::from("/data/store.json"));
        assert_eq!(config.phone_number.as_deref(), Some("923232391033"));
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn relay_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "0.0.0.0");
    }
}
