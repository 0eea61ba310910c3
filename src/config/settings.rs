use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Groups the listener, the hub, per-connection liveness timings and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub hub: HubSettings,
    pub connection: ConnectionSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the WebSocket listener.
///
/// `path` is the only request path accepted for the upgrade.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// Configuration settings for the hub.
///
/// `queue_capacity` bounds every member's outbound queue; a member whose
/// queue is full when a message is published gets evicted.
/// `intake_capacity` bounds the register and publish intakes.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    pub queue_capacity: usize,
    pub intake_capacity: usize,
}

/// Liveness and write timings applied to every connection.
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionSettings {
    pub ping_interval_secs: u64,
    pub pong_wait_secs: u64,
    pub write_wait_secs: u64,
}

impl ConnectionSettings {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub hub: Option<PartialHubSettings>,
    pub connection: Option<PartialConnectionSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialHubSettings {
    pub queue_capacity: Option<usize>,
    pub intake_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialConnectionSettings {
    pub ping_interval_secs: Option<u64>,
    pub pong_wait_secs: Option<u64>,
    pub write_wait_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                path: "/ws".to_string(),
            },
            hub: HubSettings::default(),
            connection: ConnectionSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            intake_capacity: 1024,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            pong_wait_secs: 60,
            write_wait_secs: 10,
        }
    }
}

impl PartialSettings {
    /// Overlays every value present in `self` onto `base`.
    pub fn merge_onto(self, base: Settings) -> Settings {
        let server = self.server;
        let hub = self.hub;
        let connection = self.connection;
        let logging = self.logging;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(base.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(base.server.port),
                path: server
                    .as_ref()
                    .and_then(|s| s.path.clone())
                    .unwrap_or(base.server.path),
            },
            hub: HubSettings {
                queue_capacity: hub
                    .as_ref()
                    .and_then(|h| h.queue_capacity)
                    .unwrap_or(base.hub.queue_capacity),
                intake_capacity: hub
                    .as_ref()
                    .and_then(|h| h.intake_capacity)
                    .unwrap_or(base.hub.intake_capacity),
            },
            connection: ConnectionSettings {
                ping_interval_secs: connection
                    .as_ref()
                    .and_then(|c| c.ping_interval_secs)
                    .unwrap_or(base.connection.ping_interval_secs),
                pong_wait_secs: connection
                    .as_ref()
                    .and_then(|c| c.pong_wait_secs)
                    .unwrap_or(base.connection.pong_wait_secs),
                write_wait_secs: connection
                    .as_ref()
                    .and_then(|c| c.write_wait_secs)
                    .unwrap_or(base.connection.write_wait_secs),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(base.logging.level),
            },
        }
    }
}

impl Settings {
    /// Checks the invariants the hub and the connections rely on.
    pub fn validate(&self) -> Result<(), String> {
        if self.hub.queue_capacity == 0 {
            return Err("hub.queue_capacity must be greater than zero".to_string());
        }
        if self.hub.intake_capacity == 0 {
            return Err("hub.intake_capacity must be greater than zero".to_string());
        }
        if self.connection.write_wait_secs == 0 {
            return Err("connection.write_wait_secs must be greater than zero".to_string());
        }
        if self.connection.ping_interval_secs == 0
            || self.connection.ping_interval_secs >= self.connection.pong_wait_secs
        {
            return Err(format!(
                "connection.ping_interval_secs ({}) must be non-zero and shorter than connection.pong_wait_secs ({})",
                self.connection.ping_interval_secs, self.connection.pong_wait_secs
            ));
        }
        if !self.server.path.starts_with('/') {
            return Err(format!(
                "server.path must start with '/', got {:?}",
                self.server.path
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
