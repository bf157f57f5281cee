/**
 * SWEEPER D'EXPIRATION - Surveillance de la liveness des devices
 *
 * RÔLE :
 * Tâche de fond qui fait passer offline les devices silencieux depuis plus
 * longtemps que la fenêtre d'expiration, et remet leur snapshot à zéro.
 *
 * FONCTIONNEMENT :
 * - Boucle tokio sur intervalle fixe (intervalle ≪ fenêtre), découplée du
 *   traitement des requêtes
 * - Check level-triggered : pas de timer par device, tolère les
 *   arrivées/départs sans re-armement
 * - Canal watch d'arrêt consulté à chaque tour : chemin de stop propre et
 *   testable, pas de thread daemon non maîtrisé
 */

use crate::registry::SharedRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Poignée de la tâche de balayage ; stop() attend l'arrêt effectif
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Démarre le balayage périodique d'expiration
pub fn spawn_sweeper(
    registry: SharedRegistry,
    window: time::Duration,
    interval: std::time::Duration,
) -> SweeperHandle {
    println!(
        "[sweeper] started (window: {}s, interval: {}s)",
        window.whole_seconds(),
        interval.as_secs()
    );

    let (shutdown, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for id in registry.sweep_expired(window) {
                        println!("[sweeper] device {} expired, marked offline", id);
                    }
                }
                _ = stop_rx.changed() => {
                    println!("[sweeper] stop requested");
                    break;
                }
            }
        }
    });

    SweeperHandle { shutdown, task }
}
