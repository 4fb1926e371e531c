/**
 * NETPULSE KERNEL - Point d'entrée du moniteur réseau
 *
 * RÔLE : Bootstrap complet : config, registre persistant, source
 * d'inventaire, boucle de polling, API REST.
 *
 * ARCHITECTURE : Une instance de service longue durée (registre + monitor)
 * partagée par la boucle périodique et les handlers Axum.
 * UTILITÉ : Point d'administration unique du parc surveillé.
 */
mod config;
mod http;
mod inventory;
mod models;
mod monitor;
mod probe;
mod registry;

use crate::http::AppState;
use crate::inventory::InventorySource;
use crate::monitor::{NetworkMonitor, SharedMonitor};
use crate::registry::{DeviceRegistry, SharedRegistry};

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    // variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg = config::load_config().await;

    if let Some(parent) = Path::new(&cfg.monitor.devices_file).parent() {
        std::fs::create_dir_all(parent).unwrap_or_else(|e| {
            eprintln!("[kernel] warning: failed to create data dir: {}", e);
        });
    }

    // registre persistant : fichier absent/corrompu = démarrage à vide
    let registry: SharedRegistry = Arc::new(DeviceRegistry::new(&cfg.monitor.devices_file));
    match registry.load().await {
        Ok(count) => println!(
            "[kernel] loaded {} devices from {}",
            count, cfg.monitor.devices_file
        ),
        Err(e) => eprintln!("[kernel] failed to load device store, starting empty: {e}"),
    }

    let inventory = Arc::new(InventorySource::from_config(cfg.controller.as_ref()));
    match inventory.as_ref() {
        InventorySource::Controller(_) => println!("[kernel] controller inventory enabled"),
        InventorySource::ProbeOnly => {
            println!("[kernel] probe-only mode (no controller configured)")
        }
    }

    let monitor: SharedMonitor = Arc::new(NetworkMonitor::new(
        registry.clone(),
        inventory.clone(),
        &cfg.monitor,
    ));

    // boucle de polling périodique, cycles non chevauchants
    monitor::spawn_poller(monitor.clone(), cfg.monitor.poll_interval_secs);

    let app_state = AppState {
        registry,
        monitor,
        inventory,
    };
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http.port));
    println!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
