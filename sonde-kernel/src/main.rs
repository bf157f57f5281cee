/**
 * SONDE KERNEL - Point d'entrée principal du serveur de télémétrie
 *
 * RÔLE : Orchestration de tous les modules : config, registre, MQTT, sweeper, HTTP.
 * Bootstrap du système complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : Trames capteurs via MQTT (ou POST brut) → parser → registre
 * partagé → API REST, avec balayage d'expiration en tâche de fond.
 * UTILITÉ : Vue "dernier état connu" de chaque capteur du réseau, sans
 * persistance (tout est reconstruit au redémarrage).
 */

mod config;
mod http;
mod models;
mod mqtt;
mod parser;
mod registry;
mod sweeper;

use crate::config::load_config;
use crate::http::AppState;
use crate::registry::{DeviceRegistry, SharedRegistry};

use anyhow::Context;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg = load_config().await;

    // registre partagé : l'unique ressource mutable du kernel
    let registry: SharedRegistry = Arc::new(DeviceRegistry::new());

    // MQTT alimente le registre en trames brutes
    match cfg.mqtt.clone() {
        Some(conf) => mqtt::spawn_mqtt_listener(registry.clone(), conf),
        None => println!("[kernel] mqtt disabled, HTTP ingest only"),
    }

    // balayage périodique d'expiration (la poignée vit jusqu'à l'arrêt du process)
    let _sweeper = sweeper::spawn_sweeper(
        registry.clone(),
        time::Duration::seconds(cfg.expiration_window_seconds as i64),
        std::time::Duration::from_secs(cfg.sweep_interval_seconds),
    );

    // HTTP
    let app = http::build_router(AppState { registry });

    let ip: IpAddr = cfg
        .listen_address
        .parse()
        .with_context(|| format!("listen_address invalide: {}", cfg.listen_address))?;
    let addr = SocketAddr::new(ip, cfg.listen_port);
    println!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr} failed"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
