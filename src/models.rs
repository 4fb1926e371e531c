use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Statut de reachability d'un device, sérialisé en minuscules pour l'API
/// ("unknown" tant qu'aucun cycle n'a observé le device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Unknown,
    Up,
    Down,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus::Unknown
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Unknown => write!(f, "unknown"),
            DeviceStatus::Up => write!(f, "up"),
            DeviceStatus::Down => write!(f, "down"),
        }
    }
}

/// Enregistrement d'un device dans le registre. Le `name` est la clé unique ;
/// l'`ip` n'est volontairement pas dédupliquée (lacune documentée).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: String,
    pub ip: String,
    pub mac_address: String,
    pub interface: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_ping: Option<OffsetDateTime>,
    #[serde(default)]
    pub status: DeviceStatus,
}

/// Hôte tel que renvoyé par le contrôleur (GET /host), champs camelCase
/// côté wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryHost {
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_mac: String,
    #[serde(default)]
    pub connected_interface_name: String,
}

/// Alerte horodatée, append-only. Seules les 5 plus récentes sont exposées.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Entrée d'interface dérivée de l'inventaire (clé = nom d'interface).
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceEntry {
    pub host_name: String,
    pub ip_address: String,
    pub mac_address: String,
    pub status: DeviceStatus,
}

/// Vue agrégée produite par un cycle de polling. Valeur reconstruite à chaque
/// cycle ; seuls trends et alertes survivent d'un cycle à l'autre (bornés).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub ping_status: HashMap<String, DeviceStatus>,
    pub interface_data: HashMap<String, InterfaceEntry>,
    pub bandwidth_trends: HashMap<String, Vec<f64>>,
    pub alerts: Vec<Alert>,
}

/// Compteurs agrégés pour GET /api/dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub total_devices: usize,
    pub active_devices: usize,
    pub total_bandwidth: f64,
    pub recent_alerts: Vec<Alert>,
}
