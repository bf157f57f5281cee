use crate::parser::FieldUpdate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Statut de liveness d'un device : seul le sweeper fait passer online → offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// Localisation structurée d'un device (placeholders "unknown ..." par défaut)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceLocation {
    pub building: String,
    pub floor: String,
    pub room: String,
    pub position: String,
}

impl Default for DeviceLocation {
    fn default() -> Self {
        Self {
            building: "unknown building".to_string(),
            floor: "unknown floor".to_string(),
            room: "unknown room".to_string(),
            position: "unknown position".to_string(),
        }
    }
}

impl DeviceLocation {
    /// Placeholder utilisé à l'auto-enregistrement : le building porte l'id
    pub fn placeholder_for(device_id: &str) -> Self {
        Self {
            building: format!("unknown building ({device_id})"),
            ..Self::default()
        }
    }
}

/// Fiche device : id immuable, reste modifiable selon les règles du registre
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub protocol: String,
    pub location: DeviceLocation,
    pub properties: HashMap<String, serde_json::Value>,
    pub created_time: OffsetDateTime,
    /// Dernière arrivée de données réelles ; jamais modifié par l'expiration
    pub last_active_time: Option<OffsetDateTime>,
    pub status: DeviceStatus,
}

/// Dernières valeurs connues des champs capteur d'un device
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    pub temperature1: f64,
    pub humidity1: f64,
    pub temperature2: f64,
    pub humidity2: f64,
    pub relay_status: i64,
    pub pb8_level: i64,
    pub timestamp: Option<OffsetDateTime>,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            temperature1: 0.0,
            humidity1: 0.0,
            temperature2: 0.0,
            humidity2: 0.0,
            relay_status: 0,
            pb8_level: 0,
            timestamp: None,
        }
    }
}

impl SensorSnapshot {
    /// Applique une mise à jour parsée ; les champs absents restent intacts
    pub fn apply(&mut self, update: &FieldUpdate) {
        match *update {
            FieldUpdate::Temperature1(v) => self.temperature1 = v,
            FieldUpdate::Humidity1(v) => self.humidity1 = v,
            FieldUpdate::Temperature2(v) => self.temperature2 = v,
            FieldUpdate::Humidity2(v) => self.humidity2 = v,
            FieldUpdate::RelayStatus(v) => self.relay_status = v,
            FieldUpdate::Pb8Level(v) => self.pb8_level = v,
        }
    }

    /// Remise à zéro à l'expiration : valeurs nulles, timestamp du balayage
    pub fn reset(&mut self, at: OffsetDateTime) {
        *self = Self {
            timestamp: Some(at),
            ..Self::default()
        };
    }
}

/// Corps de POST /api/devices : tous les champs optionnels
#[derive(Debug, Default, Deserialize)]
pub struct CreateDeviceRequest {
    pub id: Option<String>,
    pub name: Option<String>,
    pub protocol: Option<String>,
    pub location: Option<DeviceLocation>,
    pub properties: Option<HashMap<String, serde_json::Value>>,
}

/// Corps de PUT /api/devices/{id} : seuls name/location/properties sont modifiables
#[derive(Debug, Default, Deserialize)]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub location: Option<DeviceLocation>,
    pub properties: Option<HashMap<String, serde_json::Value>>,
}
