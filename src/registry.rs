/**
 * DEVICE REGISTRY - Registre persistant des devices surveillés
 *
 * RÔLE : CRUD des devices (name → record) avec persistance JSON.
 * Le fichier devices.json est la seule source de durabilité du kernel.
 *
 * ARCHITECTURE : Vec ordonné par insertion sous RwLock tokio, écriture
 * atomique tmp+rename, relecture du store avant chaque mutation.
 * UTILITÉ : État partagé entre l'API REST et la boucle de monitoring.
 */
use crate::models::{DeviceRecord, DeviceStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// MAC placeholder attribuée à l'enregistrement, remplacée quand
/// l'inventaire fournit la vraie valeur (pas de génération aléatoire).
pub const PLACEHOLDER_MAC: &str = "00:00:00:00:00:00";
pub const PLACEHOLDER_INTERFACE: &str = "unassigned";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("device '{0}' not found")]
    DeviceNotFound(String),
    #[error("device '{0}' already exists")]
    DuplicateDevice(String),
    #[error("persistence error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed device store: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Layout du fichier persisté : {"devices": [...]} — l'ordre du tableau
/// est l'ordre d'insertion du registre.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DeviceStore {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

#[derive(Serialize)]
struct DeviceStoreOut<'a> {
    devices: &'a [DeviceRecord],
}

pub struct DeviceRegistry {
    devices: RwLock<Vec<DeviceRecord>>,
    data_file: PathBuf,
}

pub type SharedRegistry = Arc<DeviceRegistry>;

impl DeviceRegistry {
    pub fn new<P: Into<PathBuf>>(data_file: P) -> Self {
        Self {
            devices: RwLock::new(Vec::new()),
            data_file: data_file.into(),
        }
    }

    /// Charge le registre depuis le fichier JSON. Fichier absent = registre
    /// vide (démarrage à neuf) ; fichier corrompu = erreur que l'appelant
    /// loggue avant de continuer à vide.
    pub async fn load(&self) -> Result<usize, RegistryError> {
        let mut devices = self.devices.write().await;
        *devices = self.read_store().await?;
        Ok(devices.len())
    }

    async fn read_store(&self) -> Result<Vec<DeviceRecord>, RegistryError> {
        if !self.data_file.exists() {
            println!("[registry] no existing devices file, starting fresh");
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.data_file).await?;
        let store: DeviceStore = serde_json::from_str(&content)?;
        Ok(store.devices)
    }

    /// Réconcilie l'état mémoire avec le disque avant une mutation (un autre
    /// process a pu réécrire le fichier). Store illisible : on garde la vue
    /// mémoire plutôt que d'écraser avec du vide.
    async fn refresh_from_disk(&self, devices: &mut Vec<DeviceRecord>) {
        match self.read_store().await {
            Ok(list) => *devices = list,
            Err(e) => {
                eprintln!("[registry] unreadable device store, keeping in-memory view: {e}")
            }
        }
    }

    /// Écrit le registre complet. tmp + rename : le fichier est soit
    /// l'ancienne version soit la nouvelle, jamais une écriture partielle.
    async fn save_locked(&self, devices: &[DeviceRecord]) -> Result<(), RegistryError> {
        let content = serde_json::to_string_pretty(&DeviceStoreOut { devices })?;
        let tmp = self.data_file.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.data_file).await?;
        Ok(())
    }

    /// Enregistre un nouveau device. MAC/interface reçoivent des
    /// placeholders documentés, statut "unknown" jusqu'au premier cycle.
    pub async fn register(&self, name: &str, ip: &str) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self.devices.write().await;
        self.refresh_from_disk(&mut devices).await;
        if devices.iter().any(|d| d.name == name) {
            return Err(RegistryError::DuplicateDevice(name.to_string()));
        }
        let record = DeviceRecord {
            name: name.to_string(),
            ip: ip.to_string(),
            mac_address: PLACEHOLDER_MAC.to_string(),
            interface: PLACEHOLDER_INTERFACE.to_string(),
            last_ping: None,
            status: DeviceStatus::Unknown,
        };
        devices.push(record.clone());
        self.save_locked(&devices).await?;
        println!("[registry] registered device {} ({})", name, ip);
        Ok(record)
    }

    /// Supprime un device par nom.
    pub async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let mut devices = self.devices.write().await;
        self.refresh_from_disk(&mut devices).await;
        let Some(idx) = devices.iter().position(|d| d.name == name) else {
            return Err(RegistryError::DeviceNotFound(name.to_string()));
        };
        devices.remove(idx);
        self.save_locked(&devices).await?;
        println!("[registry] deleted device {}", name);
        Ok(())
    }

    /// Renomme/réadresse un device. MAC, interface, last_ping et statut
    /// sont préservés tels quels.
    pub async fn edit(
        &self,
        old_name: &str,
        new_name: &str,
        new_ip: &str,
    ) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self.devices.write().await;
        self.refresh_from_disk(&mut devices).await;
        let Some(idx) = devices.iter().position(|d| d.name == old_name) else {
            return Err(RegistryError::DeviceNotFound(old_name.to_string()));
        };
        if new_name != old_name && devices.iter().any(|d| d.name == new_name) {
            return Err(RegistryError::DuplicateDevice(new_name.to_string()));
        }
        devices[idx].name = new_name.to_string();
        devices[idx].ip = new_ip.to_string();
        let record = devices[idx].clone();
        self.save_locked(&devices).await?;
        println!("[registry] edited device {} -> {} ({})", old_name, new_name, new_ip);
        Ok(record)
    }

    /// Liste tous les devices (ordre d'insertion).
    pub async fn list(&self) -> Vec<DeviceRecord> {
        self.devices.read().await.clone()
    }

    /// Récupère un device par nom.
    pub async fn get(&self, name: &str) -> Option<DeviceRecord> {
        self.devices.read().await.iter().find(|d| d.name == name).cloned()
    }

    /// Persiste le résultat d'un probe ponctuel (endpoint /ping).
    pub async fn update_probe_result(
        &self,
        name: &str,
        status: DeviceStatus,
        probed_at: OffsetDateTime,
    ) -> Result<(), RegistryError> {
        let mut devices = self.devices.write().await;
        self.refresh_from_disk(&mut devices).await;
        let Some(record) = devices.iter_mut().find(|d| d.name == name) else {
            return Err(RegistryError::DeviceNotFound(name.to_string()));
        };
        record.status = status;
        record.last_ping = Some(probed_at);
        self.save_locked(&devices).await
    }

    /// Persiste en bloc les statuts observés par un cycle de polling : au
    /// plus une écriture du store par cycle, et aucune si rien n'a changé
    /// de statut (un parc stable ne réécrit pas le fichier à chaque cycle).
    pub async fn record_statuses(
        &self,
        statuses: &HashMap<String, DeviceStatus>,
        probed_at: OffsetDateTime,
    ) -> Result<(), RegistryError> {
        let mut devices = self.devices.write().await;
        self.refresh_from_disk(&mut devices).await;
        let mut changed = false;
        for record in devices.iter_mut() {
            if let Some(&status) = statuses.get(&record.name) {
                if record.status != status {
                    record.status = status;
                    record.last_ping = Some(probed_at);
                    changed = true;
                }
            }
        }
        if changed {
            self.save_locked(&devices).await?;
        }
        Ok(())
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }
}
