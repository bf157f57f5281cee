use anyhow::Result;
use log::{error, info, warn};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::time::{sleep, Duration};

// ===== Configuration =====
const MQTT_BROKER: &str = "127.0.0.1";
const MQTT_PORT: u16 = 1883;
const CLIENT_ID: &str = "test-telemetry-client";
const TOPIC: &str = "stm32/1";

// Trames au format réellement émis par les capteurs (l'id device est le
// premier token de la première ligne)
const SAMPLE_FRAMES: &[&str] = &[
    "stm32/1 Temperature1: 22.10 C, Humidity1: 16.10 %\r\nTemperature2: 21.80 C, Humidity2: 23.40 %\r\nRelay Status: 1\r\nPB8 Level: 1\r\n",
    "stm32/1 Temperature1: 22.40 C, Humidity1: 16.50 %\r\nTemperature2: 22.00 C, Humidity2: 23.10 %\r\nRelay Status: 1\r\nPB8 Level: 0\r\n",
    "stm32/1 Temperature1: 21.90 C, Humidity1: 17.00 %\r\nTemperature2: 21.60 C, Humidity2: 24.00 %\r\nRelay Status: 0\r\nPB8 Level: 0\r\n",
];

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("🚀 Starting test-telemetry publisher");

    let mut mqttoptions = MqttOptions::new(CLIENT_ID, MQTT_BROKER, MQTT_PORT);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    // Tâche de publication : simule un capteur qui émet toutes les 2 secondes
    let publisher = client.clone();
    tokio::spawn(async move {
        for (i, frame) in SAMPLE_FRAMES.iter().cycle().enumerate() {
            match publisher.publish(TOPIC, QoS::AtLeastOnce, false, *frame).await {
                Ok(()) => info!("📤 Published frame {} to {}", i + 1, TOPIC),
                Err(e) => error!("❌ Publish failed: {}", e),
            }
            sleep(Duration::from_secs(2)).await;
        }
    });

    // Boucle principale : fait vivre la connexion MQTT
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("✅ Connected to {}:{}", MQTT_BROKER, MQTT_PORT);
            }
            Ok(_) => {
                // Autres événements MQTT (acks, pings, etc.)
            }
            Err(e) => {
                warn!("⚠️ MQTT connection error: {}. Reconnecting...", e);
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
