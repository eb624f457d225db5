use crate::prelude::*;

pub mod commands;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;

use crate::datalog_writer::DatalogWriter;
use crate::growatt::packet::{
    AnnounceAck, BufferedEnergyAck, ConfigDescription, ConfigId, ConfigResponse, EnergyAck,
    EnergyRequest, PingResponse, QueryResponse, Request, RequestCommon, Response,
};
use commands::{config_sync::ConfigSync, timesync::TimeSync};

/// Full configuration range requested from a device whose Date has never
/// been seen.
pub const QUERY_RANGE_FIRST: u16 = 0x01;
pub const QUERY_RANGE_LAST: u16 = 0x1f;

// PacketStats {{{
#[derive(Default)]
pub struct PacketStats {
    packets_received: u64,
    packets_sent: u64,
    // Received message counters
    announce_received: u64,
    energy_received: u64,
    ping_received: u64,
    config_received: u64,
    query_received: u64,
    buffered_energy_received: u64,
    // Drop counters
    decode_errors: u64,
    passthrough_frames: u64,
    // Publisher stats
    pub mqtt_messages_sent: u64,
    pub mqtt_errors: u64,
    // Connection stats
    disconnections: HashMap<String, u64>,
    // Last message kind per dongle
    last_messages: HashMap<Serial, String>,
}

impl PacketStats {
    pub fn print_summary(&self) {
        info!("Packet Statistics:");
        info!("  Total messages received: {}", self.packets_received);
        info!("  Total replies sent: {}", self.packets_sent);
        info!("  Received Message Types:");
        info!("    Announce: {}", self.announce_received);
        info!("    Energy: {}", self.energy_received);
        info!("    Ping: {}", self.ping_received);
        info!("    Config: {}", self.config_received);
        info!("    Query: {}", self.query_received);
        info!("    BufferedEnergy: {}", self.buffered_energy_received);
        info!("  Dropped:");
        info!("    Decode errors: {}", self.decode_errors);
        info!("    Unknown function codes: {}", self.passthrough_frames);
        info!("  MQTT:");
        info!("    Messages sent: {}", self.mqtt_messages_sent);
        info!("    Errors: {}", self.mqtt_errors);
        info!("  Disconnections by peer:");
        for (peer, count) in &self.disconnections {
            info!("    {}: {}", peer, count);
        }
        for (serial, last) in &self.last_messages {
            info!("  Last message from {}: {}", serial, last);
        }
    }
}
// }}}

#[derive(Clone)]
pub struct Coordinator {
    config: ConfigWrapper,
    channels: Channels,
    register_cache: RegisterCache,
    datalog_writer: Option<DatalogWriter>,
    pub stats: Arc<Mutex<PacketStats>>,
}

impl Coordinator {
    pub fn new(
        config: ConfigWrapper,
        channels: Channels,
        register_cache: RegisterCache,
        datalog_writer: Option<DatalogWriter>,
    ) -> Self {
        Self {
            config,
            channels,
            register_cache,
            datalog_writer,
            stats: Arc::new(Mutex::new(PacketStats::default())),
        }
    }

    /// One inbound message, fully handled: register writes, publisher
    /// fan-out, then the negotiation decision for the connection loop to
    /// send back.
    pub fn handle_request(&self, request: &Request) -> Option<Response> {
        self.record_received(request);
        self.store(request);
        self.publish(request);

        let registers = self.register_cache.snapshot();
        let now = chrono::Local::now().naive_local();
        let response = Self::decide(request, &registers, &self.config.enforcements(), now);

        if response.is_some() {
            if let Ok(mut stats) = self.stats.lock() {
                stats.packets_sent += 1;
            }
        }

        response
    }

    /// The negotiation decision itself. Pure: state comes in as a
    /// snapshot and the reference clock is a parameter.
    pub fn decide(
        request: &Request,
        registers: &Registers,
        enforce: &config::Enforcements,
        now: NaiveDateTime,
    ) -> Option<Response> {
        match request {
            Request::Announce(announce) => {
                Some(match TimeSync::correction(announce.wifi_serial, &announce.timestamp, now) {
                    Some(fix) => Response::Config(fix),
                    None => Response::AnnounceAck(AnnounceAck),
                })
            }
            Request::Ping(ping) => Some(if registers.config_is_set(ConfigId::Date.into()) {
                Response::Ping(PingResponse {
                    wifi_serial: ping.wifi_serial,
                    padding: ping.padding.clone(),
                })
            } else {
                // never seen a Date from this store; learn the full
                // configuration instead of acking
                Response::Query(QueryResponse {
                    wifi_serial: ping.wifi_serial,
                    first_config: QUERY_RANGE_FIRST,
                    last_config: QUERY_RANGE_LAST,
                })
            }),
            Request::Query(report) => Some(match ConfigSync::correction(report, enforce) {
                Some(fix) => Response::Config(fix),
                None => Response::Query(QueryResponse {
                    wifi_serial: report.wifi_serial,
                    first_config: report.config_id,
                    last_config: report.config_id,
                }),
            }),
            Request::Config(config) => Some(Response::Config(ConfigResponse {
                wifi_serial: config.wifi_serial,
                config_id: config.config_id,
                config_value: Vec::new(),
            })),
            Request::Energy(_) => Some(Response::EnergyAck(EnergyAck)),
            Request::BufferedEnergy(_) => Some(Response::BufferedEnergyAck(BufferedEnergyAck)),
        }
    }

    fn store(&self, request: &Request) {
        match request {
            Request::Energy(reading) => self.store_energy(Namespace::Input, reading),
            Request::BufferedEnergy(buffered) => {
                self.store_energy(Namespace::BufferedInput, &buffered.0)
            }
            // an empty value is the device acking our own push; storing it
            // would clear the Date sentinel and re-trigger the full query
            Request::Config(config) => {
                if !config.config_value.is_empty() {
                    self.register_cache
                        .set_config(config.config_id, &config.config_value);
                }
            }
            Request::Query(report) => {
                if !report.config_value.is_empty() {
                    self.register_cache
                        .set_config(report.config_id, &report.config_value);
                }
            }
            Request::Announce(_) | Request::Ping(_) => {}
        }
    }

    fn store_energy(&self, namespace: Namespace, reading: &EnergyRequest) {
        self.register_cache.update(|registers| {
            for (register, value) in reading.register_pairs() {
                registers.set(namespace, register, &[value]);
            }
        });
    }

    fn publish(&self, request: &Request) {
        match request {
            Request::Energy(reading) => self.publish_energy(reading, false),
            Request::BufferedEnergy(buffered) => self.publish_energy(&buffered.0, true),
            Request::Announce(announce) => {
                info!(
                    "announce from {} (device {}, type '{}', p_max {:.1}W)",
                    announce.wifi_serial,
                    announce.device_serial,
                    announce.device_type.trim(),
                    announce.p_max as f64 / 10.0
                );
                if self.config.mqtt_enabled() {
                    match mqtt::Message::for_announce(announce) {
                        Ok(messages) => self.send_to_mqtt(messages),
                        Err(e) => warn!("building announce message failed: {}", e),
                    }
                }
            }
            Request::Config(config) => {
                info!(
                    "{}: config {:#04x} ({}) = {:?}",
                    config.wifi_serial,
                    config.config_id,
                    ConfigDescription::from_id(config.config_id),
                    String::from_utf8_lossy(&config.config_value)
                );
            }
            Request::Query(report) => {
                info!(
                    "{}: reported {:#04x} ({}) = {:?}",
                    report.wifi_serial,
                    report.config_id,
                    ConfigDescription::from_id(report.config_id),
                    String::from_utf8_lossy(&report.config_value)
                );
            }
            Request::Ping(ping) => {
                debug!("ping from {}", ping.wifi_serial);
            }
        }
    }

    fn publish_energy(&self, reading: &EnergyRequest, buffered: bool) {
        if let Some(writer) = &self.datalog_writer {
            if let Err(e) = writer.write_energy(reading, buffered) {
                warn!("datalog write failed: {}", e);
            }
        }

        if self.config.mqtt_enabled() {
            match mqtt::Message::for_energy(reading, buffered) {
                Ok(messages) => self.send_to_mqtt(messages),
                Err(e) => warn!("building energy messages failed: {}", e),
            }
        }
    }

    fn send_to_mqtt(&self, messages: Vec<mqtt::Message>) {
        for message in messages {
            if self
                .channels
                .to_mqtt
                .send(mqtt::ChannelData::Message(message))
                .is_err()
            {
                warn!("send(to_mqtt) failed - channel closed?");
                break;
            }
        }
    }

    fn record_received(&self, request: &Request) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.packets_received += 1;

            let kind = match request {
                Request::Announce(_) => {
                    stats.announce_received += 1;
                    "Announce"
                }
                Request::Energy(_) => {
                    stats.energy_received += 1;
                    "Energy"
                }
                Request::Ping(_) => {
                    stats.ping_received += 1;
                    "Ping"
                }
                Request::Config(_) => {
                    stats.config_received += 1;
                    "Config"
                }
                Request::Query(_) => {
                    stats.query_received += 1;
                    "Query"
                }
                Request::BufferedEnergy(_) => {
                    stats.buffered_energy_received += 1;
                    "BufferedEnergy"
                }
            };

            stats.last_messages.insert(request.wifi_serial(), kind.to_string());
        }
    }

    pub fn record_decode_error(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.decode_errors += 1;
        }
    }

    pub fn record_passthrough(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.passthrough_frames += 1;
        }
    }

    pub fn record_disconnect(&self, addr: SocketAddr) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats.disconnections.entry(addr.to_string()).or_insert(0) += 1;
        }
    }
}
