use crate::prelude::*;
use crate::coordinator::PacketStats;
use crate::metrics::Gauge;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, QoS};
use std::sync::{Arc, Mutex};

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    pub fn for_gauges(gauges: &[Gauge]) -> Vec<Message> {
        gauges
            .iter()
            .map(|gauge| Message {
                topic: gauge.topic(),
                retain: true,
                payload: gauge.value.to_string(),
            })
            .collect()
    }

    pub fn for_record(record: &TelemetryRecord) -> Result<Message> {
        Ok(Message {
            topic: format!("{}/record", record.serial.trimmed()),
            retain: false,
            payload: serde_json::to_string(record)?,
        })
    }
} // }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Message(Message),
    Shutdown,
}

#[derive(Clone)]
pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
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
            shared_stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let c = self.config.mqtt();

        if !c.enabled() {
            info!("mqtt disabled, skipping");
            return Ok(());
        }

        // subscribe before anything awaits so records sent while connecting are kept
        let receiver = self.channels.to_mqtt.subscribe();

        let mut options = MqttOptions::new("growatt-bridge", c.host(), c.port());

        let will = LastWill {
            topic: self.lwt_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(std::time::Duration::from_secs(60));
        if let (Some(u), Some(p)) = (c.username(), c.password()) {
            options.set_credentials(u, p);
        }

        info!("initializing mqtt at {}:{}", c.host(), c.port());

        let (client, eventloop) = AsyncClient::new(options, 10);

        client
            .publish(self.lwt_topic(), QoS::AtLeastOnce, true, "online")
            .await?;

        tokio::select! {
            r = self.sender(client, receiver) => r?,
            _ = self.poller(eventloop) => {}
        }

        info!("mqtt exiting");
        Ok(())
    }

    pub fn stop(&self) {
        info!("Stopping MQTT client...");
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
    }

    // drives the connection; we never subscribe so incoming publishes are not expected
    async fn poller(&self, mut eventloop: EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(incoming)) => trace!("mqtt incoming: {:?}", incoming),
                Ok(_) => {}
                Err(e) => {
                    error!("{}", e);
                    info!("reconnecting in 5s");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    // coordinator -> mqtt
    async fn sender(
        &self,
        client: AsyncClient,
        mut receiver: broadcast::Receiver<ChannelData>,
    ) -> Result<()> {
        use ChannelData::*;

        let namespace = self.config.mqtt().namespace().to_owned();

        loop {
            match receiver.recv().await {
                Ok(Shutdown) | Err(broadcast::error::RecvError::Closed) => {
                    info!("MQTT sender received shutdown signal");
                    let _ = client.disconnect().await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("MQTT sender lagging, {} messages dropped", n);
                }
                Ok(Message(message)) => {
                    let topic = format!("{}/{}", namespace, message.topic);
                    debug!("publishing: {} = {}", topic, message.payload);

                    let result = client
                        .publish(&topic, QoS::AtLeastOnce, message.retain, message.payload.into_bytes())
                        .await;

                    if let Ok(mut stats) = self.shared_stats.lock() {
                        match result {
                            Ok(_) => stats.mqtt_messages_sent += 1,
                            Err(_) => stats.mqtt_errors += 1,
                        }
                    }
                    if let Err(err) = result {
                        error!("MQTT publish to {} failed: {:?}", topic, err);
                    }
                }
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }

    fn lwt_topic(&self) -> String {
        format!("{}/LWT", self.config.mqtt().namespace())
    }
}
