use crate::prelude::*;

use serde::Deserialize;
use std::sync::{Arc, Mutex};

use crate::growatt::packet::ConfigId;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen: Listen,

    /// The payload obfuscation secret shared with the dongles.
    pub key: String,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    #[serde(default)]
    pub enforce: Enforcements,

    pub mqtt: Option<Mqtt>,
    pub pvoutput: Option<Pvoutput>,

    /// Optional path to record decoded register data in JSON format
    pub datalog_file: Option<String>,
}

// Listen {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Listen {
    #[serde(default = "Config::default_listen_host")]
    pub host: String,

    #[serde(default = "Config::default_listen_port")]
    pub port: u16,
}

impl Default for Listen {
    fn default() -> Self {
        Self {
            host: Config::default_listen_host(),
            port: Config::default_listen_port(),
        }
    }
} // }}}

// Enforcements {{{
/// Expected values the bridge actively corrects on the device when a
/// config report disagrees.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Enforcements {
    pub update_interval: Option<String>,
    pub server_ip: Option<String>,
}

impl Enforcements {
    pub fn expected(&self, config_id: u16) -> Option<String> {
        match ConfigId::try_from(config_id) {
            Ok(ConfigId::UpdateInterval) => self.update_interval.clone(),
            Ok(ConfigId::ServerIp) => self.server_ip.clone(),
            _ => None,
        }
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
} // }}}

// Pvoutput {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Pvoutput {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub api_key: String,
    pub system_id: String,

    /// Minutes between status uploads
    #[serde(default = "Config::default_pvoutput_interval")]
    pub status_interval: u64,
}

impl Pvoutput {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn status_interval(&self) -> u64 {
        self.status_interval
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            bail!("key must not be empty");
        }
        Ok(())
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_listen_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_listen_port() -> u16 {
        5279
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_namespace() -> String {
        "growatt".to_string()
    }

    fn default_pvoutput_interval() -> u64 {
        5
    }
}

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
        Ok(Self::from_config(Config::new(file)?))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    pub fn listen_host(&self) -> String {
        self.config.lock().unwrap().listen.host.clone()
    }

    pub fn listen_port(&self) -> u16 {
        self.config.lock().unwrap().listen.port
    }

    pub fn key(&self) -> String {
        self.config.lock().unwrap().key.clone()
    }

    pub fn loglevel(&self) -> String {
        self.config.lock().unwrap().loglevel.clone()
    }

    pub fn enforcements(&self) -> Enforcements {
        self.config.lock().unwrap().enforce.clone()
    }

    pub fn mqtt(&self) -> Option<Mqtt> {
        self.config.lock().unwrap().mqtt.clone()
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt().map(|m| m.enabled()).unwrap_or(false)
    }

    pub fn pvoutput(&self) -> Option<Pvoutput> {
        self.config.lock().unwrap().pvoutput.clone()
    }

    pub fn datalog_file(&self) -> Option<String> {
        self.config.lock().unwrap().datalog_file.clone()
    }
}
