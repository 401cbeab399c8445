use std::{env, error::Error};

use monitor_bridge_lib::discovery::DEFAULT_DISCOVERY_PORT;
use monitor_bridge_lib::session::DEFAULT_PORT;

pub const DEFAULT_FEED_PORT: u16 = 3031;
pub const DEFAULT_PUBLISH_CAPACITY: usize = 1024;

/// Process settings read from the environment (after `.env` is loaded).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Dial this monitor directly; `None` means listen for a broadcast.
    pub monitor_ip: Option<String>,
    pub monitor_port: u16,
    pub discovery_port: u16,
    pub feed_port: u16,
    pub publish_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn Error>> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str, default| -> Result<u16, Box<dyn Error>> {
            match lookup(key) {
                Some(raw) if !raw.trim().is_empty() => raw
                    .trim()
                    .parse()
                    .map_err(|e| format!("Environment variable {} is not a valid port: {}", key, e).into()),
                _ => Ok(default),
            }
        };

        let publish_capacity = match lookup("PUBLISH_CAPACITY") {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse()
                .map_err(|e| format!("Environment variable PUBLISH_CAPACITY is invalid: {}", e))?,
            _ => DEFAULT_PUBLISH_CAPACITY,
        };

        Ok(Self {
            monitor_ip: lookup("MONITOR_IP").map(|ip| ip.trim().to_owned()).filter(|ip| !ip.is_empty()),
            monitor_port: number("MONITOR_PORT", DEFAULT_PORT)?,
            discovery_port: number("DISCOVERY_PORT", DEFAULT_DISCOVERY_PORT)?,
            feed_port: number("FEED_PORT", DEFAULT_FEED_PORT)?,
            publish_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, Box<dyn Error>> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).expect("config");
        assert_eq!(
            cfg,
            Config {
                monitor_ip: None,
                monitor_port: 4601,
                discovery_port: 4600,
                feed_port: 3031,
                publish_capacity: 1024,
            }
        );
    }

    #[test]
    fn configured_monitor() {
        let cfg = config(&[("MONITOR_IP", " 10.1.2.3 "), ("MONITOR_PORT", "5000")]).expect("config");
        assert_eq!(cfg.monitor_ip.as_deref(), Some("10.1.2.3"));
        assert_eq!(cfg.monitor_port, 5000);
    }

    #[test]
    fn blank_ip_means_discovery() {
        let cfg = config(&[("MONITOR_IP", "")]).expect("config");
        assert!(cfg.monitor_ip.is_none());
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert!(config(&[("FEED_PORT", "http")]).is_err());
        assert!(config(&[("PUBLISH_CAPACITY", "-1")]).is_err());
    }
}
