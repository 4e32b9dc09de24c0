//! Server configuration.

use crate::error::ConfigError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const HOST_VAR: &str = "LANTERN_SERVER_HOST";
pub const PORT_VAR: &str = "LANTERN_SERVER_PORT";
pub const POLL_VAR: &str = "LANTERN_POLL_INTERVAL_MS";

pub const DEFAULT_PORT: u16 = 5010;

/// Observer settings.
#[derive(Debug, Clone)]
pub struct ObserveConfig {
    /// How often the owner thread ticks the observers.
    pub poll_interval: Duration,
    /// Whether observation is on before any `observer.start` call.
    pub enabled_on_start: bool,
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            enabled_on_start: true,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub addr: SocketAddr,
    pub observe: ObserveConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            observe: ObserveConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `LANTERN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(HOST_VAR) {
            let ip = host.parse::<IpAddr>().map_err(|e| ConfigError::InvalidVar {
                var: HOST_VAR,
                value: host.clone(),
                reason: e.to_string(),
            })?;
            config.addr.set_ip(ip);
        }
        if let Some(port) = lookup(PORT_VAR) {
            let port = port.parse::<u16>().map_err(|e| ConfigError::InvalidVar {
                var: PORT_VAR,
                value: port.clone(),
                reason: e.to_string(),
            })?;
            config.addr.set_port(port);
        }
        if let Some(ms) = lookup(POLL_VAR) {
            let parsed = ms.parse::<u64>().map_err(|e| ConfigError::InvalidVar {
                var: POLL_VAR,
                value: ms.clone(),
                reason: e.to_string(),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidVar {
                    var: POLL_VAR,
                    value: ms,
                    reason: "must be positive".to_string(),
                });
            }
            config.observe.poll_interval = Duration::from_millis(parsed);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.addr, "0.0.0.0:5010".parse().unwrap());
        assert_eq!(config.observe.poll_interval, Duration::from_millis(100));
        assert!(config.observe.enabled_on_start);
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (HOST_VAR, "127.0.0.1"),
            (PORT_VAR, "6000"),
            (POLL_VAR, "25"),
        ]))
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.observe.poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServerConfig::from_lookup(lookup(&[(PORT_VAR, "99999")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[(HOST_VAR, "not-an-ip")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[(POLL_VAR, "0")])).is_err());
    }
}
