use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub proxy: Proxy,

    #[serde(default = "Config::default_mqtt")]
    pub mqtt: Mqtt,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Optional path to append decoded records to, one JSON object per line
    pub datalog_file: Option<String>,
}

// Proxy {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Proxy {
    /// where dataloggers connect to us
    #[serde_as(as = "DisplayFromStr")]
    pub listen: SocketAddr,
    /// the real cloud endpoint, host:port
    pub upstream: String,

    pub read_timeout: Option<u64>,
    pub use_tcp_nodelay: Option<bool>,
}
impl Proxy {
    pub fn listen(&self) -> SocketAddr {
        self.listen
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn read_timeout(&self) -> u64 {
        self.read_timeout.unwrap_or(900) // 15 minutes
    }

    pub fn use_tcp_nodelay(&self) -> bool {
        self.use_tcp_nodelay.unwrap_or(true)
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    pub publish_records: Option<bool>,
}
impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn publish_records(&self) -> bool {
        self.publish_records != Some(false)
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Config> {
        // nothing panics while holding the lock, but don't take the process down if it did
        self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn proxy(&self) -> Proxy {
        self.lock().proxy.clone()
    }

    pub fn mqtt(&self) -> Mqtt {
        self.lock().mqtt.clone()
    }

    pub fn loglevel(&self) -> String {
        self.lock().loglevel.clone()
    }

    pub fn datalog_file(&self) -> Option<String> {
        self.lock().datalog_file.clone()
    }

    pub fn log_summary(&self) {
        self.lock().log_summary()
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    pub fn log_summary(&self) {
        info!("  Proxy:");
        info!("    Listen: {}", self.proxy.listen);
        info!("    Upstream: {}", self.proxy.upstream);
        info!("    Read Timeout: {}s", self.proxy.read_timeout());
        info!("    TCP NoDelay: {}", self.proxy.use_tcp_nodelay());

        info!("  MQTT: {}", if self.mqtt.enabled { "enabled" } else { "disabled" });
        if self.mqtt.enabled {
            info!("    Host: {}", self.mqtt.host);
            info!("    Port: {}", self.mqtt.port);
            info!("    Namespace: {}", self.mqtt.namespace);
            info!("    Publish Records: {}", self.mqtt.publish_records());
        }

        info!(
            "  Datalog File: {}",
            self.datalog_file.as_deref().unwrap_or("none")
        );
        info!("  Log Level: {}", self.loglevel);
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.proxy.upstream.is_empty() {
            bail!("proxy.upstream cannot be empty");
        }
        if !self.proxy.upstream.contains(':') {
            bail!("proxy.upstream must be host:port, got {}", self.proxy.upstream);
        }

        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                bail!("mqtt.host cannot be empty");
            }
        }

        Ok(())
    }

    fn default_mqtt() -> Mqtt {
        Mqtt {
            enabled: false,
            host: String::new(),
            port: Self::default_mqtt_port(),
            username: None,
            password: None,
            namespace: Self::default_mqtt_namespace(),
            publish_records: None,
        }
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_namespace() -> String {
        "growatt".to_string()
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal() {
        let config = Config::from_yaml(
            "proxy:\n  listen: 0.0.0.0:5279\n  upstream: server.growatt.com:5279\n",
        )
        .unwrap();

        assert_eq!(config.proxy.listen().port(), 5279);
        assert_eq!(config.proxy.upstream(), "server.growatt.com:5279");
        assert_eq!(config.proxy.read_timeout(), 900);
        assert!(config.proxy.use_tcp_nodelay());
        assert!(!config.mqtt.enabled());
        assert_eq!(config.loglevel, "info");
        assert_eq!(config.datalog_file, None);
    }

    #[test]
    fn full() {
        let config = Config::from_yaml(
            r#"
loglevel: debug
proxy:
  listen: 127.0.0.1:6000
  upstream: 10.0.0.1:5279
  read_timeout: 30
  use_tcp_nodelay: false
mqtt:
  host: broker
  username: u
  password: p
  publish_records: false
datalog_file: /tmp/records.jsonl
"#,
        )
        .unwrap();

        assert_eq!(config.proxy.read_timeout(), 30);
        assert!(!config.proxy.use_tcp_nodelay());
        assert!(config.mqtt.enabled());
        assert_eq!(config.mqtt.port(), 1883);
        assert_eq!(config.mqtt.namespace(), "growatt");
        assert!(!config.mqtt.publish_records());
        assert_eq!(config.datalog_file.as_deref(), Some("/tmp/records.jsonl"));
    }

    #[test]
    fn rejects_bad_listen_address() {
        assert!(Config::from_yaml("proxy:\n  listen: nope\n  upstream: a:1\n").is_err());
    }

    #[test]
    fn rejects_upstream_without_port() {
        assert!(Config::from_yaml("proxy:\n  listen: 0.0.0.0:1\n  upstream: host\n").is_err());
    }

    #[test]
    fn rejects_enabled_mqtt_without_host() {
        assert!(Config::from_yaml(
            "proxy:\n  listen: 0.0.0.0:1\n  upstream: a:1\nmqtt:\n  host: ''\n"
        )
        .is_err());
    }
}
