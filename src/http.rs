/**
 * API REST NETPULSE - Surface HTTP du kernel
 *
 * RÔLE :
 * Adaptateur mince entre requêtes HTTP et services (registre, monitor,
 * inventaire). Aucune logique métier ici : validation des corps de requête,
 * appel du service, mapping d'erreurs.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, routes sous /api + /health
 * - DeviceNotFound → 404, DuplicateDevice/ValidationError → 400,
 *   contrôleur injoignable (pass-through /api/hosts) → 502, reste → 500
 * - Les erreurs de probe/persistance sont absorbées en amont, jamais
 *   surfacées ici
 */
use crate::inventory::InventorySource;
use crate::models::{InterfaceEntry, Snapshot};
use crate::monitor::SharedMonitor;
use crate::registry::{RegistryError, SharedRegistry};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub monitor: SharedMonitor,
    pub inventory: Arc<InventorySource>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/devices", get(get_devices).post(add_device))
        .route(
            "/api/devices/{name}",
            axum::routing::put(edit_device).delete(delete_device),
        )
        .route("/api/devices/{name}/ping", get(ping_device))
        .route("/api/network-status", get(get_network_status))
        .route("/api/network/bandwidth", get(get_bandwidth))
        .route("/api/network/alerts", get(get_alerts))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/hosts", get(get_hosts))
        .with_state(app_state)
}

#[derive(Debug, Deserialize)]
struct DevicePayload {
    name: Option<String>,
    ip: Option<String>,
}

impl DevicePayload {
    /// ValidationError : champ manquant ou vide.
    fn validate(self) -> Result<(String, String), &'static str> {
        match (self.name, self.ip) {
            (Some(name), Some(ip)) if !name.trim().is_empty() && !ip.trim().is_empty() => {
                Ok((name.trim().to_string(), ip.trim().to_string()))
            }
            _ => Err("name and ip are required"),
        }
    }
}

fn registry_error_response(err: RegistryError) -> (StatusCode, Json<serde_json::Value>) {
    let code = match &err {
        RegistryError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::DuplicateDevice(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(json!({ "error": err.to_string() })))
}

// GET /api/devices (registre complet)
async fn get_devices(State(app): State<AppState>) -> Json<serde_json::Value> {
    let devices = app.registry.list().await;
    Json(json!({ "devices": devices }))
}

// POST /api/devices {name, ip}
async fn add_device(
    State(app): State<AppState>,
    Json(payload): Json<DevicePayload>,
) -> (StatusCode, Json<serde_json::Value>) {
    let (name, ip) = match payload.validate() {
        Ok(fields) => fields,
        Err(msg) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))),
    };
    match app.registry.register(&name, &ip).await {
        Ok(_) => (
            StatusCode::CREATED,
            Json(json!({ "message": "device added successfully" })),
        ),
        Err(e) => registry_error_response(e),
    }
}

// PUT /api/devices/{name} {name, ip} (renommage/réadressage)
async fn edit_device(
    State(app): State<AppState>,
    Path(old_name): Path<String>,
    Json(payload): Json<DevicePayload>,
) -> (StatusCode, Json<serde_json::Value>) {
    let (new_name, new_ip) = match payload.validate() {
        Ok(fields) => fields,
        Err(msg) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))),
    };
    match app.registry.edit(&old_name, &new_name, &new_ip).await {
        Ok(record) => (StatusCode::OK, Json(json!({ "message": "device updated successfully", "device": record }))),
        Err(e) => registry_error_response(e),
    }
}

// DELETE /api/devices/{name}
async fn delete_device(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match app.registry.delete(&name).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "message": "device deleted successfully" })),
        ),
        Err(e) => registry_error_response(e),
    }
}

// GET /api/devices/{name}/ping (probe à la demande)
async fn ping_device(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match app.monitor.probe_device(&name).await {
        Ok(status) => Ok(Json(json!({ "status": status }))),
        Err(e) => Err(registry_error_response(e)),
    }
}

// GET /api/network-status (snapshot complet du dernier cycle)
async fn get_network_status(State(app): State<AppState>) -> Json<Snapshot> {
    Json(app.monitor.snapshot())
}

// GET /api/network/bandwidth (interfaceData seul)
async fn get_bandwidth(State(app): State<AppState>) -> Json<HashMap<String, InterfaceEntry>> {
    Json(app.monitor.interface_data())
}

// GET /api/network/alerts (les 5 dernières)
async fn get_alerts(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "alerts": app.monitor.recent_alerts() }))
}

// GET /api/dashboard (compteurs agrégés)
async fn get_dashboard(State(app): State<AppState>) -> Json<crate::models::DashboardView> {
    let total = app.registry.list().await.len();
    Json(app.monitor.dashboard(total))
}

// GET /api/hosts (pass-through inventaire brut, best-effort)
async fn get_hosts(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match app.inventory.fetch_hosts().await {
        Ok(hosts) => Ok(Json(json!({ "hosts": hosts }))),
        Err(e) => Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_validation() {
        let ok = DevicePayload {
            name: Some(" Printer ".into()),
            ip: Some("10.0.0.5".into()),
        };
        assert_eq!(
            ok.validate().unwrap(),
            ("Printer".to_string(), "10.0.0.5".to_string())
        );

        let missing_ip = DevicePayload { name: Some("Printer".into()), ip: None };
        assert!(missing_ip.validate().is_err());

        let empty_name = DevicePayload { name: Some("  ".into()), ip: Some("10.0.0.5".into()) };
        assert!(empty_name.validate().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        use crate::models::DeviceStatus;
        assert_eq!(json!({ "status": DeviceStatus::Up }).to_string(), r#"{"status":"up"}"#);
        assert_eq!(json!({ "status": DeviceStatus::Down }).to_string(), r#"{"status":"down"}"#);
    }
}
