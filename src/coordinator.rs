use crate::prelude::*;
use crate::datalog_writer::DatalogWriter;
use crate::proxy::{self, Direction, Intercepted};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default, Debug)]
pub struct PacketStats {
    pub requests_received: u64,
    pub responses_received: u64,
    pub frames_by_kind: HashMap<MessageKind, u64>,
    pub decode_errors: HashMap<&'static str, u64>,
    pub records_decoded: u64,
    pub mqtt_messages_sent: u64,
    pub mqtt_errors: u64,
    pub datalog_writes: u64,
    pub datalog_errors: u64,
    // last record timestamp per datalogger
    pub last_seen: HashMap<String, String>,
}

impl PacketStats {
    pub fn print_summary(&self) {
        info!("Packet Statistics:");
        info!("  Requests received: {}", self.requests_received);
        info!("  Responses received: {}", self.responses_received);
        info!("  Frames by kind:");
        for (kind, count) in &self.frames_by_kind {
            info!("    {:?}: {}", kind, count);
        }
        info!("  Decode errors:");
        for (class, count) in &self.decode_errors {
            info!("    {}: {}", class, count);
        }
        info!("  Records decoded: {}", self.records_decoded);
        info!("  MQTT:");
        info!("    Messages sent: {}", self.mqtt_messages_sent);
        info!("    Errors: {}", self.mqtt_errors);
        info!("  Datalog file:");
        info!("    Writes: {}", self.datalog_writes);
        info!("    Errors: {}", self.datalog_errors);
        info!("  Last seen:");
        for (serial, at) in &self.last_seen {
            info!("    {}: {}", serial, at);
        }
    }
}

/// Decodes intercepted frames and hands the results on.
#[derive(Clone)]
pub struct Coordinator {
    config: ConfigWrapper,
    channels: Channels,
    datalog_writer: Option<DatalogWriter>,
    pub shared_stats: Arc<Mutex<PacketStats>>,
}

impl Coordinator {
    pub fn new(
        config: ConfigWrapper,
        channels: Channels,
        datalog_writer: Option<DatalogWriter>,
    ) -> Self {
        Self {
            config,
            channels,
            datalog_writer,
            shared_stats: Arc::new(Mutex::new(PacketStats::default())),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut receiver = self.channels.from_proxy.subscribe();

        loop {
            match receiver.recv().await {
                Ok(proxy::ChannelData::Frame(intercepted)) => {
                    self.process(&intercepted);
                }
                Ok(proxy::ChannelData::Shutdown) => {
                    info!("coordinator received shutdown signal");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("coordinator lagging, {} frames skipped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("coordinator loop exiting");
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.from_proxy.send(proxy::ChannelData::Shutdown);
    }

    /// Decode one intercepted frame and publish what came out of it.
    /// Failures are logged and counted, never propagated.
    pub fn process(&self, intercepted: &Intercepted) -> Option<TelemetryRecord> {
        let Intercepted {
            direction, peer, ..
        } = intercepted;

        let frame = match Frame::decode(&intercepted.bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{}: error decoding {} frame: {}", peer, direction, e);
                self.count_error(&e);
                return None;
            }
        };

        info!(
            "{}: {} id={} kind={:?} length={}",
            peer, direction, frame.id, frame.kind, frame.declared_length
        );
        self.count_frame(*direction, frame.kind);

        if *direction != Direction::Request {
            return None;
        }

        let record = match frame.record() {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!("{}: error decoding {:?} payload: {}", peer, frame.kind, e);
                self.count_error(&e);
                return None;
            }
        };

        info!(
            "{}: data serial={} inverter={} soc={} to_user={}",
            peer,
            record.serial.trimmed(),
            record.inverter_id.trimmed(),
            record.state_of_charge,
            record.ac_power_to_load
        );
        if log::log_enabled!(log::Level::Debug) {
            for (field, bytes) in record.reserved.iter() {
                debug!("{}={}", field.name, hex(bytes));
            }
            debug!("extra={}", hex(&record.extra));
        }

        self.publish(&record);
        Some(record)
    }

    fn publish(&self, record: &TelemetryRecord) {
        if let Ok(mut stats) = self.shared_stats.lock() {
            stats.records_decoded += 1;
            stats
                .last_seen
                .insert(record.serial.trimmed(), record.timestamp.to_rfc3339());
        }

        if self.config.mqtt().enabled() {
            let mut messages = mqtt::Message::for_gauges(&metrics::gauges(record));
            if self.config.mqtt().publish_records() {
                match mqtt::Message::for_record(record) {
                    Ok(m) => messages.push(m),
                    Err(e) => warn!("failed to serialize record: {}", e),
                }
            }
            let count = messages.len();
            for message in messages {
                if self
                    .channels
                    .to_mqtt
                    .send(mqtt::ChannelData::Message(message))
                    .is_err()
                {
                    // mqtt client not running yet (or already stopped)
                    debug!("no mqtt sender listening, dropped {} messages", count);
                    break;
                }
            }
        }

        if let Some(writer) = &self.datalog_writer {
            let result = writer.write_record(record);
            if let Ok(mut stats) = self.shared_stats.lock() {
                match &result {
                    Ok(()) => stats.datalog_writes += 1,
                    Err(_) => stats.datalog_errors += 1,
                }
            }
            if let Err(e) = result {
                error!("failed to write record to {}: {}", writer.path(), e);
            }
        }
    }

    fn count_frame(&self, direction: Direction, kind: MessageKind) {
        if let Ok(mut stats) = self.shared_stats.lock() {
            match direction {
                Direction::Request => stats.requests_received += 1,
                Direction::Response => stats.responses_received += 1,
            }
            *stats.frames_by_kind.entry(kind).or_default() += 1;
        }
    }

    fn count_error(&self, e: &DecodeError) {
        if let Ok(mut stats) = self.shared_stats.lock() {
            *stats.decode_errors.entry(e.class()).or_default() += 1;
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
