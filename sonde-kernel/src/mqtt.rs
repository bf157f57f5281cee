use crate::config::MqttConf;
use crate::registry::SharedRegistry;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::task;

/// Bridge MQTT → registre : chaque publish reçu est traité comme une trame
/// brute et poussé dans ingest_frame. Le kernel ne publie rien.
pub fn spawn_mqtt_listener(registry: SharedRegistry, conf: MqttConf) {
    task::spawn(async move {
        let mut opts = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
        opts.set_keep_alive(std::time::Duration::from_secs(conf.keepalive_seconds));
        if let (Some(user), Some(pass)) = (&conf.username, &conf.password) {
            opts.set_credentials(user.clone(), pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(opts, 10);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    // (re)connexion : il faut se réabonner à chaque fois
                    println!("[mqtt] connected to {}:{}", conf.host, conf.port);
                    subscribe_topics(&client, &conf.topics).await;
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    match String::from_utf8(p.payload.to_vec()) {
                        Ok(frame) => {
                            println!("[mqtt] frame from {} ({} bytes)", p.topic, frame.len());
                            registry.ingest_frame(&frame);
                        }
                        Err(_) => eprintln!("[mqtt] payload non UTF-8 sur {}", p.topic),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("[mqtt] erreur: {:?}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn subscribe_topics(client: &AsyncClient, topics: &[String]) {
    for topic in topics {
        match client.subscribe(topic, QoS::AtLeastOnce).await {
            Ok(()) => println!("[mqtt] subscribed to {}", topic),
            Err(e) => eprintln!("[mqtt] subscribe {} failed: {e:?}", topic),
        }
    }
}
