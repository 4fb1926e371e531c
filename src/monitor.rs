/**
 * NETWORK MONITOR - Boucle de polling et agrégation d'état réseau
 *
 * RÔLE : Orchestration prober + inventaire + registre à chaque cycle :
 * statuts, trends de bande passante simulée, alertes de transition.
 *
 * FONCTIONNEMENT :
 * - inventaire disponible : Up ssi l'IP du device figure dans /host
 * - inventaire indisponible : fallback probes directs concurrents (pool
 *   borné par sémaphore), loggé
 * - transition vers Down ou bande passante < 1.0 Mbps : alerte
 * - statuts persistés au registre en fin de cycle, snapshot reconstruit
 *
 * UTILITÉ : Instance unique longue durée partagée avec l'API REST — pas de
 * reconstruction du modèle à chaque requête.
 */
use crate::inventory::InventorySource;
use crate::models::{
    Alert, DashboardView, DeviceRecord, DeviceStatus, InterfaceEntry, InventoryHost, Snapshot,
};
use crate::probe::Prober;
use crate::registry::{RegistryError, SharedRegistry};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Fenêtre de trend par device (échantillons les plus récents).
const TREND_WINDOW: usize = 10;
/// Nombre d'alertes exposées à l'extérieur (le log interne n'est pas purgé).
const ALERT_WINDOW: usize = 5;
/// Seuil d'alerte bande passante basse, en Mbps.
const LOW_BANDWIDTH_MBPS: f64 = 1.0;

#[derive(Default)]
struct MonitorData {
    ping_status: HashMap<String, DeviceStatus>,
    interface_data: HashMap<String, InterfaceEntry>,
    bandwidth_trends: HashMap<String, Vec<f64>>,
    alerts: Vec<Alert>,
}

pub struct NetworkMonitor {
    registry: SharedRegistry,
    inventory: Arc<InventorySource>,
    prober: Prober,
    probe_concurrency: usize,
    data: Mutex<MonitorData>,
}

pub type SharedMonitor = Arc<NetworkMonitor>;

impl NetworkMonitor {
    pub fn new(
        registry: SharedRegistry,
        inventory: Arc<InventorySource>,
        conf: &crate::config::MonitorConf,
    ) -> Self {
        Self {
            registry,
            inventory,
            prober: Prober::new(conf.probe_timeout_secs),
            probe_concurrency: conf.probe_concurrency.max(1),
            data: Mutex::new(MonitorData::default()),
        }
    }

    /// Un cycle complet de polling. Appelé par la boucle périodique, jamais
    /// en parallèle (le tick suivant attend la fin du cycle courant).
    pub async fn run_cycle(&self) {
        let devices = self.registry.list().await;

        let (statuses, interfaces) = match self.inventory.fetch_hosts().await {
            Ok(hosts) => {
                let (statuses, interfaces) = classify_from_inventory(&devices, &hosts);
                (statuses, Some(interfaces))
            }
            Err(e) => {
                eprintln!("[monitor] inventory unavailable, falling back to direct probes: {e}");
                (self.probe_all(&devices).await, None)
            }
        };

        self.apply_observations(&devices, &statuses, interfaces);

        if let Err(e) = self
            .registry
            .record_statuses(&statuses, OffsetDateTime::now_utc())
            .await
        {
            eprintln!("[monitor] failed to persist cycle statuses: {e}");
        }
    }

    /// Probes concurrents sous pool borné, joints avant de rendre la main.
    async fn probe_all(&self, devices: &[DeviceRecord]) -> HashMap<String, DeviceStatus> {
        let semaphore = Arc::new(Semaphore::new(self.probe_concurrency));
        let mut tasks = JoinSet::new();
        for device in devices {
            let name = device.name.clone();
            let ip = device.ip.clone();
            let prober = self.prober.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (name, prober.probe(&ip).await)
            });
        }
        let mut statuses = HashMap::new();
        while let Some(result) = tasks.join_next().await {
            if let Ok((name, status)) = result {
                statuses.insert(name, status);
            }
        }
        statuses
    }

    /// Applique les observations d'un cycle : transitions, alertes, trends.
    /// Synchrone sous le lock data, aucun await à l'intérieur.
    fn apply_observations(
        &self,
        devices: &[DeviceRecord],
        statuses: &HashMap<String, DeviceStatus>,
        interfaces: Option<HashMap<String, InterfaceEntry>>,
    ) {
        let now = local_now();
        let mut new_alerts: Vec<Alert> = Vec::new();
        let mut data = self.data.lock();

        for device in devices {
            let Some(&status) = statuses.get(&device.name) else { continue };
            let previous = data.ping_status.get(&device.name).copied();
            // première observation Down ou transition vers Down : alerte.
            // Pas de déduplication : Down répété sur plusieurs cycles = une
            // alerte par transition seulement, mais Up→Down→Up→Down réalerte.
            if status == DeviceStatus::Down && previous != Some(DeviceStatus::Down) {
                new_alerts.push(Alert {
                    message: format!("{} is DOWN at {}", device.name, wall_clock(now)),
                    timestamp: now,
                });
            }
            data.ping_status.insert(device.name.clone(), status);
        }

        // purge des devices supprimés du registre
        data.ping_status
            .retain(|name, _| devices.iter().any(|d| &d.name == name));
        data.bandwidth_trends
            .retain(|name, _| devices.iter().any(|d| &d.name == name));

        if let Some(map) = interfaces {
            data.interface_data = map;
        }

        // bande passante simulée pour les devices joignables (non-goal :
        // pas de mesure réelle)
        let mut rng = rand::thread_rng();
        for device in devices {
            if data.ping_status.get(&device.name) != Some(&DeviceStatus::Up) {
                continue;
            }
            let sample: f64 = rng.gen_range(0.5..=20.0);
            let trend = data.bandwidth_trends.entry(device.name.clone()).or_default();
            if push_bandwidth_sample(trend, sample) {
                new_alerts.push(Alert {
                    message: format!("{} bandwidth low: {:.2} Mbps", device.name, sample),
                    timestamp: now,
                });
            }
        }

        for alert in &new_alerts {
            println!("[monitor] ALERT: {}", alert.message);
        }
        data.alerts.append(&mut new_alerts);
    }

    /// Probe ponctuel d'un device (GET /api/devices/{name}/ping), persiste
    /// statut et last_ping.
    pub async fn probe_device(&self, name: &str) -> Result<DeviceStatus, RegistryError> {
        let Some(record) = self.registry.get(name).await else {
            return Err(RegistryError::DeviceNotFound(name.to_string()));
        };
        let status = self.prober.probe(&record.ip).await;
        if let Err(e) = self
            .registry
            .update_probe_result(name, status, OffsetDateTime::now_utc())
            .await
        {
            eprintln!("[monitor] failed to persist probe of {name}: {e}");
        }
        self.observe_transition(name, status);
        Ok(status)
    }

    /// Enregistre une observation hors cycle avec le même contrat de
    /// transition que le cycle : Down nouvellement observé = alerte. Sans
    /// cela, un probe ponctuel masquerait la transition Up→Down au cycle
    /// suivant (previous déjà Down, pas d'alerte).
    fn observe_transition(&self, name: &str, status: DeviceStatus) {
        let now = local_now();
        let mut data = self.data.lock();
        let previous = data.ping_status.get(name).copied();
        if status == DeviceStatus::Down && previous != Some(DeviceStatus::Down) {
            let alert = Alert {
                message: format!("{} is DOWN at {}", name, wall_clock(now)),
                timestamp: now,
            };
            println!("[monitor] ALERT: {}", alert.message);
            data.alerts.push(alert);
        }
        data.ping_status.insert(name.to_string(), status);
    }

    /// Snapshot de l'état agrégé courant (alertes : les 5 dernières).
    pub fn snapshot(&self) -> Snapshot {
        let data = self.data.lock();
        Snapshot {
            ping_status: data.ping_status.clone(),
            interface_data: data.interface_data.clone(),
            bandwidth_trends: data.bandwidth_trends.clone(),
            alerts: visible_tail(&data.alerts),
        }
    }

    pub fn interface_data(&self) -> HashMap<String, InterfaceEntry> {
        self.data.lock().interface_data.clone()
    }

    /// Les 5 alertes les plus récentes, de la plus ancienne à la plus
    /// récente parmi elles.
    pub fn recent_alerts(&self) -> Vec<Alert> {
        visible_tail(&self.data.lock().alerts)
    }

    pub fn dashboard(&self, total_devices: usize) -> DashboardView {
        let data = self.data.lock();
        let active_devices = data
            .ping_status
            .values()
            .filter(|&&s| s == DeviceStatus::Up)
            .count();
        let total_bandwidth: f64 = data
            .bandwidth_trends
            .values()
            .filter_map(|trend| trend.last())
            .sum();
        DashboardView {
            total_devices,
            active_devices,
            total_bandwidth: (total_bandwidth * 100.0).round() / 100.0,
            recent_alerts: visible_tail(&data.alerts),
        }
    }
}

/// Contrat inventaire autoritaire : un device est Up ssi son IP figure dans
/// la liste d'hôtes ; interface_data est clé par interface connectée.
fn classify_from_inventory(
    devices: &[DeviceRecord],
    hosts: &[InventoryHost],
) -> (HashMap<String, DeviceStatus>, HashMap<String, InterfaceEntry>) {
    let statuses = devices
        .iter()
        .map(|d| {
            let present = hosts.iter().any(|h| h.host_ip == d.ip);
            let status = if present { DeviceStatus::Up } else { DeviceStatus::Down };
            (d.name.clone(), status)
        })
        .collect();
    let interfaces = hosts
        .iter()
        .map(|h| {
            (
                h.connected_interface_name.clone(),
                InterfaceEntry {
                    host_name: h.host_name.clone(),
                    ip_address: h.host_ip.clone(),
                    mac_address: h.host_mac.clone(),
                    // l'inventaire a répondu pour cet hôte
                    status: DeviceStatus::Up,
                },
            )
        })
        .collect();
    (statuses, interfaces)
}

fn push_bandwidth_sample(trend: &mut Vec<f64>, sample: f64) -> bool {
    trend.push(sample);
    if trend.len() > TREND_WINDOW {
        trend.remove(0);
    }
    sample < LOW_BANDWIDTH_MBPS
}

fn visible_tail(alerts: &[Alert]) -> Vec<Alert> {
    alerts[alerts.len().saturating_sub(ALERT_WINDOW)..].to_vec()
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn wall_clock(now: OffsetDateTime) -> String {
    let fmt = format_description!("[hour]:[minute]:[second]");
    now.format(&fmt).unwrap_or_default()
}

/// Boucle périodique : un cycle toutes les `interval_secs` secondes, le tick
/// suivant attend la fin du cycle courant (pas de chevauchement).
pub fn spawn_poller(monitor: SharedMonitor, interval_secs: u64) {
    println!("[monitor] starting polling loop (every {}s)", interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            monitor.run_cycle().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConf;
    use crate::registry::DeviceRegistry;
    use tempfile::TempDir;

    fn test_monitor(dir: &TempDir) -> (SharedRegistry, SharedMonitor) {
        let registry: SharedRegistry =
            Arc::new(DeviceRegistry::new(dir.path().join("devices.json")));
        let conf = MonitorConf {
            poll_interval_secs: 10,
            probe_timeout_secs: 1,
            probe_concurrency: 4,
            devices_file: String::new(),
        };
        let monitor = Arc::new(NetworkMonitor::new(
            registry.clone(),
            Arc::new(InventorySource::ProbeOnly),
            &conf,
        ));
        (registry, monitor)
    }

    fn statuses_of(name: &str, status: DeviceStatus) -> HashMap<String, DeviceStatus> {
        HashMap::from([(name.to_string(), status)])
    }

    fn record(name: &str, ip: &str) -> DeviceRecord {
        DeviceRecord {
            name: name.into(),
            ip: ip.into(),
            mac_address: crate::registry::PLACEHOLDER_MAC.into(),
            interface: crate::registry::PLACEHOLDER_INTERFACE.into(),
            last_ping: None,
            status: DeviceStatus::Unknown,
        }
    }

    fn host(name: &str, ip: &str, mac: &str, iface: &str) -> InventoryHost {
        InventoryHost {
            host_name: name.into(),
            host_ip: ip.into(),
            host_mac: mac.into(),
            connected_interface_name: iface.into(),
        }
    }

    #[test]
    fn test_inventory_membership_decides_status() {
        let devices = [record("Printer", "10.0.0.5"), record("Camera", "10.0.0.9")];
        let hosts = [host("printer-host", "10.0.0.5", "aa:bb:cc:dd:ee:01", "GigabitEthernet1")];

        let (statuses, interfaces) = classify_from_inventory(&devices, &hosts);
        // Up ssi l'IP figure dans la liste d'hôtes
        assert_eq!(statuses["Printer"], DeviceStatus::Up);
        assert_eq!(statuses["Camera"], DeviceStatus::Down);

        let entry = &interfaces["GigabitEthernet1"];
        assert_eq!(entry.host_name, "printer-host");
        assert_eq!(entry.ip_address, "10.0.0.5");
        assert_eq!(entry.mac_address, "aa:bb:cc:dd:ee:01");
        assert_eq!(entry.status, DeviceStatus::Up);
    }

    #[test]
    fn test_inventory_empty_host_list_marks_all_down() {
        let devices = [record("Printer", "10.0.0.5")];
        let (statuses, interfaces) = classify_from_inventory(&devices, &[]);
        assert_eq!(statuses["Printer"], DeviceStatus::Down);
        assert!(interfaces.is_empty());
    }

    #[tokio::test]
    async fn test_on_demand_probe_down_raises_transition_alert() {
        let dir = TempDir::new().unwrap();
        let (registry, monitor) = test_monitor(&dir);
        let device = registry.register("Printer", "203.0.113.1").await.unwrap();
        let down_count = |m: &NetworkMonitor| {
            m.data
                .lock()
                .alerts
                .iter()
                .filter(|a| a.message.starts_with("Printer is DOWN at "))
                .count()
        };

        // dernier cycle : Printer observé Up
        monitor.apply_observations(
            std::slice::from_ref(&device),
            &statuses_of("Printer", DeviceStatus::Up),
            None,
        );

        // probe ponctuel : l'IP TEST-NET ne répond pas → Down, et la
        // transition Up→Down doit alerter comme dans le cycle
        let status = monitor.probe_device("Printer").await.unwrap();
        assert_eq!(status, DeviceStatus::Down);
        assert_eq!(down_count(&monitor), 1);

        // le cycle suivant voit Down sans transition : pas de doublon
        monitor.apply_observations(
            std::slice::from_ref(&device),
            &statuses_of("Printer", DeviceStatus::Down),
            None,
        );
        assert_eq!(down_count(&monitor), 1);
    }

    #[tokio::test]
    async fn test_down_transition_appends_alert() {
        let dir = TempDir::new().unwrap();
        let (registry, monitor) = test_monitor(&dir);
        let record = registry.register("Printer", "203.0.113.1").await.unwrap();

        monitor.apply_observations(
            std::slice::from_ref(&record),
            &statuses_of("Printer", DeviceStatus::Down),
            None,
        );

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.ping_status["Printer"], DeviceStatus::Down);
        assert_eq!(snapshot.alerts.len(), 1);
        assert!(snapshot.alerts[0].message.starts_with("Printer is DOWN at "));
    }

    #[tokio::test]
    async fn test_repeated_down_alerts_only_on_transition() {
        let dir = TempDir::new().unwrap();
        let (registry, monitor) = test_monitor(&dir);
        let record = registry.register("Printer", "203.0.113.1").await.unwrap();
        let devices = [record];

        // les cycles Up tirent aussi un échantillon de bande passante qui
        // peut alerter : on ne compte que les alertes DOWN
        let down_alerts = |monitor: &NetworkMonitor| {
            monitor
                .data
                .lock()
                .alerts
                .iter()
                .filter(|a| a.message.contains("is DOWN"))
                .count()
        };

        monitor.apply_observations(&devices, &statuses_of("Printer", DeviceStatus::Down), None);
        monitor.apply_observations(&devices, &statuses_of("Printer", DeviceStatus::Down), None);
        assert_eq!(down_alerts(&monitor), 1);

        // Up puis de nouveau Down : nouvelle transition, nouvelle alerte
        monitor.apply_observations(&devices, &statuses_of("Printer", DeviceStatus::Up), None);
        monitor.apply_observations(&devices, &statuses_of("Printer", DeviceStatus::Down), None);
        assert_eq!(down_alerts(&monitor), 2);
    }

    #[tokio::test]
    async fn test_trend_never_exceeds_window() {
        let dir = TempDir::new().unwrap();
        let (registry, monitor) = test_monitor(&dir);
        let record = registry.register("Server", "10.0.0.7").await.unwrap();
        let devices = [record];

        for _ in 0..25 {
            monitor.apply_observations(&devices, &statuses_of("Server", DeviceStatus::Up), None);
        }

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.bandwidth_trends["Server"].len(), TREND_WINDOW);
    }

    #[test]
    fn test_low_sample_flags_alert_and_trims_oldest() {
        let mut trend: Vec<f64> = (0..TREND_WINDOW).map(|i| i as f64 + 2.0).collect();
        assert!(push_bandwidth_sample(&mut trend, 0.8));
        assert_eq!(trend.len(), TREND_WINDOW);
        assert_eq!(trend[0], 3.0); // le plus ancien est parti
        assert_eq!(*trend.last().unwrap(), 0.8);
        assert!(!push_bandwidth_sample(&mut trend, 5.0));
    }

    #[tokio::test]
    async fn test_visible_alerts_capped_at_five_oldest_first() {
        let dir = TempDir::new().unwrap();
        let (registry, monitor) = test_monitor(&dir);
        let record = registry.register("Printer", "203.0.113.1").await.unwrap();
        let devices = [record];

        // 8 transitions Up→Down = 8 alertes internes
        for _ in 0..8 {
            monitor.apply_observations(&devices, &statuses_of("Printer", DeviceStatus::Up), None);
            monitor.apply_observations(&devices, &statuses_of("Printer", DeviceStatus::Down), None);
        }

        let visible = monitor.recent_alerts();
        assert_eq!(visible.len(), ALERT_WINDOW);
        for pair in visible.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        // le log interne garde tout (8 transitions DOWN, plus d'éventuelles
        // alertes bande passante tirées pendant les cycles Up)
        let internal = monitor.data.lock();
        assert_eq!(
            internal.alerts.iter().filter(|a| a.message.contains("is DOWN")).count(),
            8
        );
        assert!(internal.alerts.len() >= 8);
    }

    #[tokio::test]
    async fn test_cycle_falls_back_to_probing_when_inventory_unavailable() {
        let dir = TempDir::new().unwrap();
        let (registry, monitor) = test_monitor(&dir);
        registry.register("Printer", "203.0.113.1").await.unwrap();

        // InventorySource::ProbeOnly simule un contrôleur injoignable :
        // le cycle doit aboutir via probes directs, sans erreur
        monitor.run_cycle().await;

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.ping_status["Printer"], DeviceStatus::Down);
        assert!(snapshot
            .alerts
            .iter()
            .any(|a| a.message.starts_with("Printer is DOWN at ")));
        // et le registre a été persisté avec le statut observé
        let record = registry.get("Printer").await.unwrap();
        assert_eq!(record.status, DeviceStatus::Down);
        assert!(record.last_ping.is_some());
    }

    #[tokio::test]
    async fn test_deleted_device_leaves_snapshot() {
        let dir = TempDir::new().unwrap();
        let (registry, monitor) = test_monitor(&dir);
        let record = registry.register("Printer", "203.0.113.1").await.unwrap();

        monitor.apply_observations(
            std::slice::from_ref(&record),
            &statuses_of("Printer", DeviceStatus::Up),
            None,
        );
        assert!(monitor.snapshot().ping_status.contains_key("Printer"));

        registry.delete("Printer").await.unwrap();
        monitor.apply_observations(&[], &HashMap::new(), None);
        let snapshot = monitor.snapshot();
        assert!(snapshot.ping_status.is_empty());
        assert!(snapshot.bandwidth_trends.is_empty());
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let dir = TempDir::new().unwrap();
        let (registry, monitor) = test_monitor(&dir);
        let a = registry.register("A", "10.0.0.1").await.unwrap();
        let b = registry.register("B", "10.0.0.2").await.unwrap();
        let devices = [a, b];
        let statuses = HashMap::from([
            ("A".to_string(), DeviceStatus::Up),
            ("B".to_string(), DeviceStatus::Down),
        ]);
        monitor.apply_observations(&devices, &statuses, None);

        let view = monitor.dashboard(2);
        assert_eq!(view.total_devices, 2);
        assert_eq!(view.active_devices, 1);
        assert!(view.total_bandwidth >= 0.5);
    }
}
