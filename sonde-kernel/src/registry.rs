/**
 * REGISTRE DE DEVICES - État central du kernel Sonde
 *
 * RÔLE :
 * Ce module maintient la fiche de chaque device, son snapshot capteur et
 * son timestamp de liveness. C'est l'unique ressource mutable partagée.
 *
 * FONCTIONNEMENT :
 * - Un seul Mutex couvre les trois maps + l'index d'ordre d'insertion :
 *   aucun lecteur ne peut voir un device présent dans une map et absent
 *   d'une autre
 * - create/delete ajoutent ou retirent des trois maps atomiquement
 * - ingest_frame : auto-enregistrement au premier contact, fusion des
 *   champs parsés, passage online + avance de la liveness (uniquement si
 *   au moins un champ a été reconnu)
 * - sweep_expired : balayage level-triggered appelé par le sweeper,
 *   seul chemin online → offline
 *
 * UTILITÉ DANS SONDE :
 * Toutes les opérations de l'API REST et du bridge MQTT passent par ici ;
 * les erreurs métier (AlreadyExists, NotFound) sont des résultats typés,
 * jamais fatales au process.
 */

use crate::models::{
    CreateDeviceRequest, Device, DeviceLocation, DeviceStatus, SensorSnapshot,
    UpdateDeviceRequest,
};
use crate::parser;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Erreurs métier du registre, décidées en code HTTP par l'appelant
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Device already exists: {0}")]
    AlreadyExists(String),
    #[error("Device not found: {0}")]
    NotFound(String),
}

#[derive(Default)]
struct RegistryInner {
    devices: HashMap<String, Device>,
    snapshots: HashMap<String, SensorSnapshot>,
    /// Timestamp de la dernière trame ayant produit au moins un champ ;
    /// absent tant que le device n'a jamais émis (jamais balayé dans ce cas)
    last_frame: HashMap<String, OffsetDateTime>,
    /// Ordre d'insertion pour list()
    order: Vec<String>,
}

impl RegistryInner {
    /// Insertion atomique fiche + snapshot zéro + index d'ordre
    fn insert_device(&mut self, device: Device) {
        let id = device.id.clone();
        self.devices.insert(id.clone(), device);
        self.snapshots.insert(id.clone(), SensorSnapshot::default());
        self.order.push(id);
    }
}

pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
}

pub type SharedRegistry = Arc<DeviceRegistry>;

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Crée un device ; id généré (uuid v4) si absent, échec si déjà présent
    pub fn create(&self, req: CreateDeviceRequest) -> Result<String, RegistryError> {
        let id = req.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut inner = self.inner.lock();
        if inner.devices.contains_key(&id) {
            return Err(RegistryError::AlreadyExists(id));
        }

        let device = Device {
            id: id.clone(),
            name: req.name.unwrap_or_else(|| format!("device-{id}")),
            protocol: req.protocol.unwrap_or_else(|| "mqtt".to_string()),
            location: req.location.unwrap_or_default(),
            properties: req.properties.unwrap_or_default(),
            created_time: OffsetDateTime::now_utc(),
            last_active_time: None,
            status: DeviceStatus::Offline,
        };
        inner.insert_device(device);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<(Device, SensorSnapshot), RegistryError> {
        let inner = self.inner.lock();
        let device = inner
            .devices
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let snapshot = inner.snapshots.get(id).cloned().unwrap_or_default();
        Ok((device.clone(), snapshot))
    }

    /// Liste fiche + snapshot dans l'ordre d'insertion
    pub fn list(&self) -> Vec<(Device, SensorSnapshot)> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| {
                let device = inner.devices.get(id)?;
                let snapshot = inner.snapshots.get(id).cloned().unwrap_or_default();
                Some((device.clone(), snapshot))
            })
            .collect()
    }

    /// Mise à jour partielle ; id, protocole, timestamps et statut ne sont
    /// pas modifiables par ce chemin
    pub fn update(&self, id: &str, req: UpdateDeviceRequest) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let device = inner
            .devices
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if let Some(name) = req.name {
            device.name = name;
        }
        if let Some(location) = req.location {
            device.location = location;
        }
        if let Some(properties) = req.properties {
            device.properties = properties;
        }
        Ok(())
    }

    /// Suppression atomique : fiche, snapshot, liveness et index d'ordre
    pub fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.devices.remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        inner.snapshots.remove(id);
        inner.last_frame.remove(id);
        inner.order.retain(|d| d != id);
        Ok(())
    }

    /// Ingestion d'une trame brute. Ne renvoie jamais d'erreur : une trame
    /// sans aucun champ reconnu est simplement ignorée (pas d'auto-création,
    /// pas d'avance de liveness, pas de changement de statut).
    pub fn ingest_frame(&self, raw: &str) {
        let frame = parser::parse_frame(raw);
        if !frame.parsed_any() {
            println!("[registry] frame without recognizable fields ignored ({})", frame.device_id);
            return;
        }

        let now = OffsetDateTime::now_utc();
        let mut inner = self.inner.lock();

        if !inner.devices.contains_key(&frame.device_id) {
            let device = Device {
                id: frame.device_id.clone(),
                name: format!("device-{}", frame.device_id),
                protocol: "mqtt".to_string(),
                location: DeviceLocation::placeholder_for(&frame.device_id),
                properties: HashMap::new(),
                created_time: now,
                last_active_time: None,
                status: DeviceStatus::Offline,
            };
            inner.insert_device(device);
            println!("[registry] auto-registered device {}", frame.device_id);
        }

        if let Some(snapshot) = inner.snapshots.get_mut(&frame.device_id) {
            // fusion : les champs absents de la trame gardent leur valeur
            for update in &frame.updates {
                snapshot.apply(update);
            }
            snapshot.timestamp = Some(now);
        }
        if let Some(device) = inner.devices.get_mut(&frame.device_id) {
            device.status = DeviceStatus::Online;
            device.last_active_time = Some(now);
        }
        inner.last_frame.insert(frame.device_id, now);
    }

    /// Balayage d'expiration : chaque device online dont la dernière trame
    /// est plus vieille que la fenêtre passe offline, snapshot remis à zéro
    /// avec le timestamp du balayage. last_active_time n'est pas touché.
    /// Renvoie les ids expirés (pour le logging du sweeper).
    pub fn sweep_expired(&self, window: Duration) -> Vec<String> {
        let now = OffsetDateTime::now_utc();
        let mut inner = self.inner.lock();

        let mut expired = Vec::new();
        for (id, device) in inner.devices.iter() {
            if device.status != DeviceStatus::Online {
                continue;
            }
            if let Some(seen) = inner.last_frame.get(id) {
                if now - *seen > window {
                    expired.push(id.clone());
                }
            }
        }

        for id in &expired {
            if let Some(snapshot) = inner.snapshots.get_mut(id) {
                snapshot.reset(now);
            }
            if let Some(device) = inner.devices.get_mut(id) {
                device.status = DeviceStatus::Offline;
            }
        }
        expired
    }

    /// Vieillit artificiellement la dernière trame d'un device (tests)
    #[cfg(test)]
    pub(crate) fn backdate_last_frame(&self, id: &str, seconds: i64) {
        let mut inner = self.inner.lock();
        if let Some(seen) = inner.last_frame.get_mut(id) {
            *seen -= Duration::seconds(seconds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_FRAME: &str = "stm32/1 Temperature1: 22.10 C, Humidity1: 16.10 %\nTemperature2: 21.80 C, Humidity2: 23.40 %\nRelay Status: 1\nPB8 Level: 1";

    fn create_req(id: &str) -> CreateDeviceRequest {
        CreateDeviceRequest {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_then_get_roundtrip() {
        let reg = DeviceRegistry::new();
        let id = reg.create(create_req("d1")).unwrap();
        assert_eq!(id, "d1");

        let (device, snapshot) = reg.get("d1").unwrap();
        assert_eq!(device.id, "d1");
        assert_eq!(device.name, "device-d1");
        assert_eq!(device.protocol, "mqtt");
        assert_eq!(device.location, DeviceLocation::default());
        assert!(device.properties.is_empty());
        assert_eq!(device.status, DeviceStatus::Offline);
        assert!(device.last_active_time.is_none());
        assert_eq!(snapshot, SensorSnapshot::default());
        assert!(snapshot.timestamp.is_none());
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let reg = DeviceRegistry::new();
        reg.create(create_req("d1")).unwrap();
        let err = reg.create(create_req("d1")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(id) if id == "d1"));
    }

    #[test]
    fn test_create_generates_unique_id() {
        let reg = DeviceRegistry::new();
        let a = reg.create(CreateDeviceRequest::default()).unwrap();
        let b = reg.create(CreateDeviceRequest::default()).unwrap();
        assert!(!a.is_empty());
        assert_ne!(a, b);
        assert!(reg.get(&a).is_ok());
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let reg = DeviceRegistry::new();
        for id in ["d3", "d1", "d2"] {
            reg.create(create_req(id)).unwrap();
        }
        let ids: Vec<String> = reg.list().into_iter().map(|(d, _)| d.id).collect();
        assert_eq!(ids, vec!["d3", "d1", "d2"]);
    }

    #[test]
    fn test_update_only_mutable_fields() {
        let reg = DeviceRegistry::new();
        reg.create(create_req("d1")).unwrap();

        let location = DeviceLocation {
            building: "B1".into(),
            floor: "2".into(),
            room: "201".into(),
            position: "window".into(),
        };
        reg.update(
            "d1",
            UpdateDeviceRequest {
                name: Some("lab sensor".into()),
                location: Some(location.clone()),
                properties: None,
            },
        )
        .unwrap();

        let (device, _) = reg.get("d1").unwrap();
        assert_eq!(device.name, "lab sensor");
        assert_eq!(device.location, location);
        // les champs non fournis restent intacts
        assert_eq!(device.protocol, "mqtt");
        assert_eq!(device.status, DeviceStatus::Offline);

        let err = reg.update("nope", UpdateDeviceRequest::default()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn test_delete_removes_everything() {
        let reg = DeviceRegistry::new();
        reg.ingest_frame(FULL_FRAME);
        assert!(reg.get("stm32_1").is_ok());

        reg.delete("stm32_1").unwrap();
        assert!(matches!(reg.get("stm32_1"), Err(RegistryError::NotFound(_))));
        assert!(reg.list().is_empty());
        // l'id redevient disponible : la liveness a bien été purgée
        reg.create(create_req("stm32_1")).unwrap();
        assert!(reg.sweep_expired(Duration::seconds(0)).is_empty());

        assert!(matches!(reg.delete("nope"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_ingest_auto_creates_online_device() {
        let reg = DeviceRegistry::new();
        reg.ingest_frame(FULL_FRAME);

        let (device, snapshot) = reg.get("stm32_1").unwrap();
        assert_eq!(device.name, "device-stm32_1");
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.location.building, "unknown building (stm32_1)");
        assert!(device.last_active_time.is_some());

        assert_eq!(snapshot.temperature1, 22.10);
        assert_eq!(snapshot.humidity1, 16.10);
        assert_eq!(snapshot.temperature2, 21.80);
        assert_eq!(snapshot.humidity2, 23.40);
        assert_eq!(snapshot.relay_status, 1);
        assert_eq!(snapshot.pb8_level, 1);
        assert!(snapshot.timestamp.is_some());

        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn test_ingest_merges_without_resetting() {
        let reg = DeviceRegistry::new();
        reg.ingest_frame("stm32/1 Temperature1: 22.10 C");
        reg.ingest_frame("stm32/1 Humidity1: 16.10 %");

        let (_, snapshot) = reg.get("stm32_1").unwrap();
        assert_eq!(snapshot.temperature1, 22.10);
        assert_eq!(snapshot.humidity1, 16.10);
    }

    #[test]
    fn test_ingest_duplicate_label_last_wins() {
        let reg = DeviceRegistry::new();
        reg.ingest_frame("stm32/1 Relay Status: 0\nRelay Status: 1");
        let (_, snapshot) = reg.get("stm32_1").unwrap();
        assert_eq!(snapshot.relay_status, 1);
    }

    #[test]
    fn test_ingest_idempotent_values() {
        let reg = DeviceRegistry::new();
        reg.ingest_frame(FULL_FRAME);
        let (_, first) = reg.get("stm32_1").unwrap();
        reg.ingest_frame(FULL_FRAME);
        let (_, second) = reg.get("stm32_1").unwrap();

        // seules les valeurs comptent, le timestamp peut différer
        assert_eq!(first.temperature1, second.temperature1);
        assert_eq!(first.humidity1, second.humidity1);
        assert_eq!(first.temperature2, second.temperature2);
        assert_eq!(first.humidity2, second.humidity2);
        assert_eq!(first.relay_status, second.relay_status);
        assert_eq!(first.pb8_level, second.pb8_level);
    }

    #[test]
    fn test_ingest_without_fields_changes_nothing() {
        let reg = DeviceRegistry::new();
        // device inconnu + trame illisible : pas d'auto-création
        reg.ingest_frame("stm32/1 nothing useful here");
        assert!(reg.get("stm32_1").is_err());

        // device offline : une trame vide ne le repasse pas online
        reg.ingest_frame(FULL_FRAME);
        reg.backdate_last_frame("stm32_1", 31);
        reg.sweep_expired(Duration::seconds(30));
        reg.ingest_frame("stm32/1 nothing useful here");

        let (device, snapshot) = reg.get("stm32_1").unwrap();
        assert_eq!(device.status, DeviceStatus::Offline);
        assert_eq!(snapshot.temperature1, 0.0);
    }

    #[test]
    fn test_sweep_expires_stale_online_device() {
        let reg = DeviceRegistry::new();
        reg.ingest_frame(FULL_FRAME);
        let (before, _) = reg.get("stm32_1").unwrap();

        reg.backdate_last_frame("stm32_1", 31);
        let expired = reg.sweep_expired(Duration::seconds(30));
        assert_eq!(expired, vec!["stm32_1".to_string()]);

        let (device, snapshot) = reg.get("stm32_1").unwrap();
        assert_eq!(device.status, DeviceStatus::Offline);
        assert_eq!(snapshot.temperature1, 0.0);
        assert_eq!(snapshot.humidity1, 0.0);
        assert_eq!(snapshot.relay_status, 0);
        assert_eq!(snapshot.pb8_level, 0);
        assert!(snapshot.timestamp.is_some());
        // last_active_time reste la dernière arrivée de données réelles
        assert_eq!(device.last_active_time, before.last_active_time);
    }

    #[test]
    fn test_sweep_keeps_recent_device_online() {
        let reg = DeviceRegistry::new();
        reg.ingest_frame(FULL_FRAME);
        reg.backdate_last_frame("stm32_1", 10);

        assert!(reg.sweep_expired(Duration::seconds(30)).is_empty());
        let (device, snapshot) = reg.get("stm32_1").unwrap();
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(snapshot.temperature1, 22.10);
    }

    #[test]
    fn test_sweep_ignores_device_without_frames() {
        let reg = DeviceRegistry::new();
        reg.create(create_req("d1")).unwrap();
        // jamais émis : pas de liveness, jamais balayé
        assert!(reg.sweep_expired(Duration::seconds(0)).is_empty());
        let (device, _) = reg.get("d1").unwrap();
        assert_eq!(device.status, DeviceStatus::Offline);
    }

    #[test]
    fn test_sweep_runs_once_per_expiry() {
        let reg = DeviceRegistry::new();
        reg.ingest_frame(FULL_FRAME);
        reg.backdate_last_frame("stm32_1", 31);

        assert_eq!(reg.sweep_expired(Duration::seconds(30)).len(), 1);
        // déjà offline : le balayage suivant ne le re-traite pas
        assert!(reg.sweep_expired(Duration::seconds(30)).is_empty());
    }

    #[test]
    fn test_offline_device_returns_online_on_fresh_ingest() {
        let reg = DeviceRegistry::new();
        reg.ingest_frame(FULL_FRAME);
        reg.backdate_last_frame("stm32_1", 31);
        reg.sweep_expired(Duration::seconds(30));

        reg.ingest_frame("stm32/1 Temperature1: 19.50 C");
        let (device, snapshot) = reg.get("stm32_1").unwrap();
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(snapshot.temperature1, 19.50);
        // les autres champs ont été remis à zéro par l'expiration, pas par l'ingest
        assert_eq!(snapshot.humidity1, 0.0);
    }
}
