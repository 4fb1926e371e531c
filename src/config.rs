use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    #[serde(default)]
    pub http: HttpConf,
    pub controller: Option<ControllerConf>,
    #[serde(default)]
    pub monitor: MonitorConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    pub port: u16,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

/// Accès au contrôleur d'inventaire. Credentials injectés par config/env,
/// jamais en dur dans le code. `auth_token` court-circuite l'échange ticket.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControllerConf {
    pub base_url: String, // ex: "http://localhost:58000/api/v1"
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_token: Option<String>,
    #[serde(default = "default_controller_timeout")]
    pub timeout_secs: u64,
}

fn default_controller_timeout() -> u64 {
    5
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConf {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
    #[serde(default = "default_devices_file")]
    pub devices_file: String,
}

fn default_poll_interval() -> u64 {
    10
}
fn default_probe_timeout() -> u64 {
    5
}
fn default_probe_concurrency() -> usize {
    8
}
fn default_devices_file() -> String {
    "./data/devices.json".into()
}

impl Default for MonitorConf {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            probe_timeout_secs: default_probe_timeout(),
            probe_concurrency: default_probe_concurrency(),
            devices_file: default_devices_file(),
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            http: HttpConf::default(),
            controller: None,
            monitor: MonitorConf::default(),
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("NETPULSE_CONFIG").unwrap_or_else(|_| "netpulse.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            KernelConfig::default()
        } else {
            serde_yaml::from_str(&txt).unwrap_or_else(|e| {
                eprintln!("[kernel] config invalide: {e}");
                KernelConfig::default()
            })
        }
    } else {
        eprintln!("[kernel] pas de netpulse.yaml, usage config par défaut");
        KernelConfig::default()
    };
    apply_env_overrides(&mut cfg);
    cfg
}

/// Les secrets contrôleur peuvent venir de l'environnement (.env) et
/// priment alors sur le fichier YAML.
fn apply_env_overrides(cfg: &mut KernelConfig) {
    let token = std::env::var("NETPULSE_CONTROLLER_TOKEN").ok();
    let username = std::env::var("NETPULSE_CONTROLLER_USERNAME").ok();
    let password = std::env::var("NETPULSE_CONTROLLER_PASSWORD").ok();
    if token.is_none() && username.is_none() && password.is_none() {
        return;
    }
    let controller = cfg.controller.get_or_insert_with(|| ControllerConf {
        base_url: std::env::var("NETPULSE_CONTROLLER_URL")
            .unwrap_or_else(|_| "http://localhost:58000/api/v1".into()),
        username: None,
        password: None,
        auth_token: None,
        timeout_secs: default_controller_timeout(),
    });
    if token.is_some() {
        controller.auth_token = token;
    }
    if username.is_some() {
        controller.username = username;
    }
    if password.is_some() {
        controller.password = password;
    }
}
