use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub listen_address: String,
    pub listen_port: u16,
    /// Durée sans données avant passage offline
    pub expiration_window_seconds: u64,
    /// Fréquence du balayage (très inférieure à la fenêtre)
    pub sweep_interval_seconds: u64,
    /// None = bridge MQTT désactivé, ingestion HTTP uniquement
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: u64,
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
}

fn default_client_id() -> String {
    "sonde-kernel".to_string()
}

fn default_keepalive() -> u64 {
    60
}

fn default_topics() -> Vec<String> {
    vec!["stm32/1".to_string(), "testtopic/#".to_string()]
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            // 5003 pour éviter le conflit AirPlay sur 5000 (macOS)
            listen_port: 5003,
            expiration_window_seconds: 30,
            sweep_interval_seconds: 5,
            mqtt: Some(MqttConf {
                host: "localhost".to_string(),
                port: 1883,
                username: None,
                password: None,
                client_id: default_client_id(),
                keepalive_seconds: default_keepalive(),
                topics: default_topics(),
            }),
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("SONDE_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return KernelConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[kernel] config invalide: {e}");
            KernelConfig::default()
        })
    } else {
        eprintln!("[kernel] pas de kernel.yaml, usage config par défaut");
        KernelConfig::default()
    }
}
