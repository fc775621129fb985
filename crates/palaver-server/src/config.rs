//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use palaver_store::MessageLimit;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the line server listens on.
    /// Env: `LISTEN_ADDR`
    /// Default: `127.0.0.1:8001`
    pub listen_addr: SocketAddr,

    /// Admission limit on concurrently active store cursors.
    /// Env: `MAX_CONNECTIONS`
    /// Default: `1`
    pub max_connections: usize,

    /// How many messages a chat history response carries by default.
    /// Env: `MSG_COUNT`
    /// Default: `20`
    pub msg_count: usize,

    /// Whether the per-window message limit on the default chat is enforced.
    /// Env: `MSG_LIMIT_ENABLED` (true/false)
    /// Default: `true`
    pub msg_limit_enabled: bool,

    /// Maximum messages per author per window on the default chat.
    /// Env: `MSG_LIMIT`
    /// Default: `20`
    pub msg_limit: u32,

    /// Length of the rate-limit window, in hours.
    /// Env: `MSG_LIMIT_PERIOD_HOURS`
    /// Default: `1`
    pub msg_limit_period_hours: i64,

    /// How long a ban lasts, in hours.
    /// Env: `BAN_PERIOD_HOURS`
    /// Default: `4`
    pub ban_period_hours: i64,

    /// Number of counted complaints at which a user is banned.
    /// Env: `MAX_COMPLAINT_COUNT`
    /// Default: `3`
    pub max_complaint_count: u32,

    /// Seconds between moderation cycles.
    /// Env: `MODERATION_CYCLE_SECS`
    /// Default: `5`
    pub moderation_cycle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([127, 0, 0, 1], 8001).into(),
            max_connections: 1,
            msg_count: 20,
            msg_limit_enabled: true,
            msg_limit: 20,
            msg_limit_period_hours: 1,
            ban_period_hours: 4,
            max_complaint_count: 3,
            moderation_cycle_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults on missing or unparseable values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.listen_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid LISTEN_ADDR, using default");
            }
        }

        read_env_parsed("MAX_CONNECTIONS", &mut config.max_connections);
        read_env_parsed("MSG_COUNT", &mut config.msg_count);
        read_env_parsed("MSG_LIMIT", &mut config.msg_limit);
        read_env_parsed("MSG_LIMIT_PERIOD_HOURS", &mut config.msg_limit_period_hours);
        read_env_parsed("BAN_PERIOD_HOURS", &mut config.ban_period_hours);
        read_env_parsed("MAX_COMPLAINT_COUNT", &mut config.max_complaint_count);
        read_env_parsed("MODERATION_CYCLE_SECS", &mut config.moderation_cycle_secs);

        if let Ok(val) = std::env::var("MSG_LIMIT_ENABLED") {
            config.msg_limit_enabled = val != "false" && val != "0";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// The rate-limit policy to apply to the default chat, `None` when
    /// limiting is disabled.
    pub fn message_limit(&self) -> Option<MessageLimit> {
        self.msg_limit_enabled.then(|| MessageLimit {
            max_messages: self.msg_limit,
            window: chrono::Duration::hours(self.msg_limit_period_hours),
        })
    }

    /// Ban duration as a chrono duration.
    pub fn ban_period(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ban_period_hours)
    }

    /// Moderation cycle interval as a std duration.
    pub fn moderation_cycle(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.moderation_cycle_secs)
    }
}

fn read_env_parsed<T: std::str::FromStr>(name: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(name) {
        if let Ok(parsed) = val.parse::<T>() {
            *slot = parsed;
        } else {
            tracing::warn!(env = name, value = %val, "Unparseable value, using default");
        }
    }
}
