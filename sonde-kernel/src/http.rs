/**
 * API REST SONDE - Serveur HTTP du kernel
 *
 * RÔLE :
 * Ce module expose le registre de devices aux frontends et scripts :
 * CRUD devices, ingestion de trames brutes, health check.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, routes sous /api
 * - Sérialisation JSON automatique des réponses
 * - Erreurs métier du registre traduites en codes HTTP (404, 400)
 *
 * UTILITÉ DANS SONDE :
 * 🎯 Dashboard web : liste/détail des devices avec leur snapshot courant
 * 🎯 Administration : enregistrement, édition et suppression de devices
 * 🎯 Ingestion de secours : POST du texte brut d'une trame sans passer
 *    par le broker MQTT (même chemin registre que le bridge)
 */

use crate::models::{
    CreateDeviceRequest, Device, DeviceLocation, DeviceStatus, SensorSnapshot,
    UpdateDeviceRequest,
};
use crate::registry::{RegistryError, SharedRegistry};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::HashMap;
use time::format_description::well_known::Rfc3339;

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
}

/// Vue API d'un device : fiche + snapshot courant, timestamps en RFC3339
#[derive(serde::Serialize)]
struct DeviceView {
    id: String,
    name: String,
    protocol: String,
    location: DeviceLocation,
    properties: HashMap<String, serde_json::Value>,
    status: DeviceStatus,
    last_active_time: Option<String>,
    created_time: String,
    current_data: SnapshotView,
}

#[derive(serde::Serialize)]
struct SnapshotView {
    temperature1: f64,
    humidity1: f64,
    temperature2: f64,
    humidity2: f64,
    relay_status: i64,
    pb8_level: i64,
    timestamp: Option<String>,
}

fn to_view(device: &Device, snapshot: &SensorSnapshot) -> DeviceView {
    DeviceView {
        id: device.id.clone(),
        name: device.name.clone(),
        protocol: device.protocol.clone(),
        location: device.location.clone(),
        properties: device.properties.clone(),
        status: device.status,
        last_active_time: device
            .last_active_time
            .and_then(|t| t.format(&Rfc3339).ok()),
        created_time: device.created_time.format(&Rfc3339).unwrap_or_default(),
        current_data: SnapshotView {
            temperature1: snapshot.temperature1,
            humidity1: snapshot.humidity1,
            temperature2: snapshot.temperature2,
            humidity2: snapshot.humidity2,
            relay_status: snapshot.relay_status,
            pb8_level: snapshot.pb8_level,
            timestamp: snapshot.timestamp.and_then(|t| t.format(&Rfc3339).ok()),
        },
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/devices", get(list_devices).post(create_device))
        .route(
            "/api/devices/{id}",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route("/api/update-sensor-data", post(ingest_sensor_data))
        .with_state(app_state)
}

// GET /api/health (aucune interaction registre)
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

// GET /api/devices (liste, ordre d'insertion)
async fn list_devices(State(app): State<AppState>) -> Json<Vec<DeviceView>> {
    let list: Vec<DeviceView> = app
        .registry
        .list()
        .iter()
        .map(|(device, snapshot)| to_view(device, snapshot))
        .collect();
    Json(list)
}

// GET /api/devices/{id} (détail)
async fn get_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceView>, StatusCode> {
    match app.registry.get(&id) {
        Ok((device, snapshot)) => Ok(Json(to_view(&device, &snapshot))),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

// POST /api/devices (enregistrement explicite)
async fn create_device(
    State(app): State<AppState>,
    Json(req): Json<CreateDeviceRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match app.registry.create(req) {
        Ok(device_id) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "message": "Device created successfully",
                "device_id": device_id,
            })),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "status": "error", "message": e.to_string() })),
        ),
    }
}

// PUT /api/devices/{id} (mise à jour partielle)
async fn update_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match app.registry.update(&id, req) {
        Ok(()) => Ok(Json(serde_json::json!({
            "status": "success",
            "message": "Device updated successfully",
        }))),
        Err(RegistryError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::BAD_REQUEST),
    }
}

// DELETE /api/devices/{id}
async fn delete_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match app.registry.delete(&id) {
        Ok(()) => Ok(Json(serde_json::json!({
            "status": "success",
            "message": "Device deleted successfully",
        }))),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

// POST /api/update-sensor-data (corps = texte brut de la trame)
// Toujours succès si l'appel aboutit, même sans champ reconnu.
async fn ingest_sensor_data(State(app): State<AppState>, body: String) -> Json<serde_json::Value> {
    app.registry.ingest_frame(&body);
    Json(serde_json::json!({
        "status": "success",
        "message": "Sensor data updated successfully",
    }))
}
