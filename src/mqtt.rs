use crate::prelude::*;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::coordinator::PacketStats;
use crate::growatt::packet::{AnnounceRequest, EnergyRequest, StatusString};

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    pub fn for_energy(reading: &EnergyRequest, buffered: bool) -> Result<Vec<Message>> {
        let serial = reading.wifi_serial;
        let kind = if buffered { "buffered" } else { "energy" };

        let mut r = vec![Message {
            topic: format!("{}/{}/all", serial, kind),
            retain: false,
            payload: serde_json::to_string(reading)?,
        }];

        r.push(Message {
            topic: format!("{}/{}/status", serial, kind),
            retain: false,
            payload: StatusString::from_value(reading.inverter_status).to_owned(),
        });

        for (field, value) in reading.scaled_values() {
            r.push(Message {
                topic: format!("{}/{}/{}", serial, kind, field),
                retain: false,
                payload: value.to_string(),
            });
        }

        Ok(r)
    }

    pub fn for_announce(announce: &AnnounceRequest) -> Result<Vec<Message>> {
        Ok(vec![Message {
            topic: format!("{}/announce", announce.wifi_serial),
            retain: true,
            payload: serde_json::to_string(announce)?,
        }])
    }
} // }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Message(Message),
    Shutdown,
}

pub type Sender = broadcast::Sender<ChannelData>;

#[derive(Clone)]
pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
    shutdown: Arc<AtomicBool>,
    shared_stats: Arc<Mutex<PacketStats>>,
}

impl Mqtt {
    pub fn new(
        config: ConfigWrapper,
        channels: Channels,
        shared_stats: Arc<Mutex<PacketStats>>,
    ) -> Self {
        Self {
            config,
            channels,
            shutdown: Arc::new(AtomicBool::new(false)),
            shared_stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mqtt_config = match self.config.mqtt() {
            Some(c) if c.enabled() => c,
            _ => {
                info!("mqtt disabled, skipping");
                return Ok(());
            }
        };

        let mut options =
            MqttOptions::new("growatt-bridge", mqtt_config.host(), mqtt_config.port());

        let will = LastWill {
            topic: self.lwt_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(std::time::Duration::from_secs(60));
        if let (Some(u), Some(p)) = (mqtt_config.username(), mqtt_config.password()) {
            options.set_credentials(u.clone(), p.clone());
        }

        info!(
            "initializing mqtt at {}:{}",
            mqtt_config.host(),
            mqtt_config.port()
        );

        let (client, eventloop) = AsyncClient::new(options, 10);

        futures::try_join!(
            self.announce_online(client.clone()),
            self.receiver(eventloop),
            self.sender(client)
        )?;

        Ok(())
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
    }

    async fn announce_online(&self, client: AsyncClient) -> Result<()> {
        client
            .publish(self.lwt_topic(), QoS::AtLeastOnce, true, "online")
            .await?;

        Ok(())
    }

    // keeps the eventloop alive; nothing is subscribed, so inbound
    // traffic is keepalives and acks only
    async fn receiver(&self, mut eventloop: EventLoop) -> Result<()> {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("mqtt receiver shutting down");
                break;
            }

            if let Ok(event) =
                tokio::time::timeout(std::time::Duration::from_secs(1), eventloop.poll()).await
            {
                match event {
                    Ok(Event::Incoming(incoming)) => {
                        trace!("mqtt incoming: {:?}", incoming);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if !self.shutdown.load(Ordering::Relaxed) {
                            error!("{}", e);
                            info!("reconnecting in 5s");
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    // coordinator -> mqtt
    async fn sender(&self, client: AsyncClient) -> Result<()> {
        use ChannelData::*;

        let mqtt_config = self
            .config
            .mqtt()
            .ok_or_else(|| anyhow!("mqtt sender started without mqtt config"))?;
        let mut receiver = self.channels.to_mqtt.subscribe();

        loop {
            match receiver.recv().await? {
                Shutdown => {
                    info!("mqtt sender received shutdown signal");
                    let _ = client.disconnect().await;
                    break;
                }
                Message(message) => {
                    let topic = format!("{}/{}", mqtt_config.namespace(), message.topic);
                    debug!("publishing: {} = {}", topic, message.payload);

                    match client
                        .publish(
                            &topic,
                            QoS::AtLeastOnce,
                            message.retain,
                            message.payload.as_bytes(),
                        )
                        .await
                    {
                        Ok(_) => {
                            if let Ok(mut stats) = self.shared_stats.lock() {
                                stats.mqtt_messages_sent += 1;
                            }
                        }
                        Err(e) => {
                            error!("publishing {} failed: {:?}", topic, e);
                            if let Ok(mut stats) = self.shared_stats.lock() {
                                stats.mqtt_errors += 1;
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn lwt_topic(&self) -> String {
        let namespace = self
            .config
            .mqtt()
            .map(|m| m.namespace().to_string())
            .unwrap_or_default();
        format!("{}/LWT", namespace)
    }
}
