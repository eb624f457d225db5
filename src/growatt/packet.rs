use crate::prelude::*;

use chrono::{NaiveDate, NaiveDateTime};
use enum_dispatch::*;
use nom_derive::{Nom, Parse};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

use crate::growatt::cipher::Cipher;
use crate::growatt::frame::{Frame, FrameFactory};

/// The ack marker byte. Variant 5/6 devices see it as 0x47 on the wire
/// once the payload transform has run.
pub const ACK: u8 = 0x00;

// {{{ FunctionCode
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    Announce = 0x03,
    Energy = 0x04,
    Ping = 0x16,
    Config = 0x18,
    Query = 0x19,
    BufferedEnergy = 0x50,
}
// }}}

// {{{ ProtocolVariant
// variant 2 dongles send everything in clear; 5 and 6 obfuscate the
// payload of every message kind
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtocolVariant {
    V2,
    V5,
    V6,
}

impl ProtocolVariant {
    pub fn from_protocol_id(protocol_id: u16) -> Self {
        match protocol_id {
            2 => Self::V2,
            5 => Self::V5,
            _ => Self::V6,
        }
    }

    pub fn ciphered(&self, _function: FunctionCode) -> bool {
        !matches!(self, Self::V2)
    }
}
// }}}

// {{{ ConfigId
// the settings the negotiation logic actively touches; everything else is
// labeled via ConfigDescription only
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum ConfigId {
    UpdateInterval = 0x04,
    ServerIp = 0x11,
    Date = 0x1f,
}

pub struct ConfigDescription;

impl ConfigDescription {
    pub fn from_id(id: u16) -> &'static str {
        match id {
            0x04 => "Update Interval",
            0x05 => "Modbus Range Low",
            0x06 => "Modbus Range High",
            0x08 => "Device Serial Number",
            0x09 => "Hardware Version",
            0x0b => "FTP Credentials",
            0x0c => "DNS",
            0x0e => "Local IP",
            0x0f => "Local Port",
            0x10 => "MAC Address",
            0x11 => "Server IP",
            0x12 => "Server Port",
            0x13 => "Server Hostname",
            0x14 => "Device Type",
            0x15 => "Software Version",
            0x16 => "Hardware Version",
            0x1e => "Timezone",
            0x1f => "Date",
            0x38 => "WiFi SSID",
            0x39 => "WiFi Password",

            _ => "Unknown",
        }
    }
}
// }}}

// {{{ InputRegister
// name -> offset table for the live telemetry namespace; 32-bit values
// occupy two consecutive registers, high word first
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum InputRegister {
    InverterStatus = 0,
    Ppv = 1,
    Vpv1 = 3,
    Ipv1 = 4,
    Ppv1 = 5,
    Vpv2 = 7,
    Ipv2 = 8,
    Ppv2 = 9,
    Pac = 11,
    Fac = 13,
    Vac1 = 14,
    Iac1 = 15,
    Pac1 = 16,
    VacRs = 18,
    EacToday = 26,
    EacTotal = 28,
    EpvTotal = 30,
    Epv1Today = 48,
    Epv1Total = 50,
    Epv2Today = 52,
    Epv2Total = 54,
}
// }}}

pub struct StatusString;

impl StatusString {
    pub fn from_value(status: u16) -> &'static str {
        match status {
            0 => "Waiting",
            1 => "Normal",
            3 => "Fault",

            _ => "Unknown",
        }
    }
}

// {{{ DeviceTime
// the six big-endian u16 clock words an Announce carries
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Nom)]
#[nom(BigEndian)]
pub struct DeviceTime {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

impl DeviceTime {
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )
        .and_then(|date| {
            date.and_hms_opt(
                u32::from(self.hour),
                u32::from(self.minute),
                u32::from(self.second),
            )
        })
    }
}
// }}}

#[enum_dispatch]
pub trait RequestCommon {
    fn function(&self) -> FunctionCode;
    fn wifi_serial(&self) -> Serial;
}

#[enum_dispatch]
pub trait ResponseCommon {
    fn function(&self) -> FunctionCode;

    /// Plaintext payload; the codec applies the per-variant transform.
    fn bytes(&self) -> Vec<u8>;
}

/////////////
//
// ANNOUNCE
//
/////////////

// {{{ AnnounceRequest
const ANNOUNCE_MIN_LEN: usize = 173;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AnnounceRequest {
    pub wifi_serial: Serial,
    pub device_serial: Serial,
    pub device_type: String, // 16 chars, space padded
    pub active_rate: u16,    // percent
    pub p_max: u32,          // 0.1 W
    pub timestamp: DeviceTime,
}

impl AnnounceRequest {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < ANNOUNCE_MIN_LEN {
            bail!("announce payload too short ({} bytes)", payload.len());
        }

        let timestamp = match DeviceTime::parse(&payload[161..173]) {
            Ok((_, t)) => t,
            Err(_) => bail!("announce timestamp unparseable"),
        };

        Ok(Self {
            wifi_serial: Serial::new(&payload[0..10])?,
            device_serial: Serial::new(&payload[30..40])?,
            device_type: String::from_utf8_lossy(&payload[139..155]).into_owned(),
            active_rate: Utils::be_u16(payload, 155),
            p_max: Utils::be_u32(payload, 157),
            timestamp,
        })
    }
}

impl RequestCommon for AnnounceRequest {
    fn function(&self) -> FunctionCode {
        FunctionCode::Announce
    }
    fn wifi_serial(&self) -> Serial {
        self.wifi_serial
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnnounceAck;

impl ResponseCommon for AnnounceAck {
    fn function(&self) -> FunctionCode {
        FunctionCode::Announce
    }
    fn bytes(&self) -> Vec<u8> {
        vec![ACK]
    }
}
// }}}

/////////////
//
// ENERGY
//
/////////////

// {{{ EnergyRequest
const ENERGY_MIN_LEN: usize = 197;

/// Live measurement report. Electrical values are fixed-point with one
/// implied decimal place; `fac` carries two.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Nom)]
#[nom(BigEndian)]
pub struct EnergyRequest {
    #[nom(Ignore)]
    pub wifi_serial: Serial,
    #[nom(Ignore)]
    pub inverter_serial: Serial,

    #[nom(SkipBefore(60))]
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,

    #[nom(SkipBefore(5))]
    pub inverter_status: u16,
    pub ppv: u32,
    pub vpv1: u16,
    pub ipv1: u16,
    pub ppv1: u32,
    pub vpv2: u16,
    pub ipv2: u16,
    pub ppv2: u32,

    #[nom(SkipBefore(24))]
    pub pac: u32,
    pub fac: u16,
    pub vac1: u16,
    pub iac1: u16,
    pub pac1: u32,

    #[nom(SkipBefore(16))]
    pub vac_rs: u16,

    #[nom(SkipBefore(20))]
    pub eac_today: u32,
    pub eac_total: u32,
    pub epv_total: u32,
    pub epv1_today: u32,
    pub epv1_total: u32,
    pub epv2_today: u32,
    pub epv2_total: u32,
}

impl EnergyRequest {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < ENERGY_MIN_LEN {
            bail!("energy payload too short ({} bytes)", payload.len());
        }

        match Self::parse(payload) {
            Ok((_, mut r)) => {
                r.wifi_serial = Serial::new(&payload[0..10])?;
                r.inverter_serial = Serial::new(&payload[30..40])?;
                Ok(r)
            }
            Err(_) => Err(anyhow!("energy payload unparseable")),
        }
    }

    /// Register words in input-register layout, ready for the store or
    /// the datalog.
    pub fn register_pairs(&self) -> Vec<(u16, u16)> {
        let mut r = Vec::new();

        let mut push16 = |register: InputRegister, value: u16| {
            r.push((u16::from(register), value));
        };
        push16(InputRegister::InverterStatus, self.inverter_status);
        push16(InputRegister::Vpv1, self.vpv1);
        push16(InputRegister::Ipv1, self.ipv1);
        push16(InputRegister::Vpv2, self.vpv2);
        push16(InputRegister::Ipv2, self.ipv2);
        push16(InputRegister::Fac, self.fac);
        push16(InputRegister::Vac1, self.vac1);
        push16(InputRegister::Iac1, self.iac1);
        push16(InputRegister::VacRs, self.vac_rs);

        let mut push32 = |register: InputRegister, value: u32| {
            let words = Utils::u32_words(value);
            let register = u16::from(register);
            r.push((register, words[0]));
            r.push((register + 1, words[1]));
        };
        push32(InputRegister::Ppv, self.ppv);
        push32(InputRegister::Ppv1, self.ppv1);
        push32(InputRegister::Ppv2, self.ppv2);
        push32(InputRegister::Pac, self.pac);
        push32(InputRegister::Pac1, self.pac1);
        push32(InputRegister::EacToday, self.eac_today);
        push32(InputRegister::EacTotal, self.eac_total);
        push32(InputRegister::EpvTotal, self.epv_total);
        push32(InputRegister::Epv1Today, self.epv1_today);
        push32(InputRegister::Epv1Total, self.epv1_total);
        push32(InputRegister::Epv2Today, self.epv2_today);
        push32(InputRegister::Epv2Total, self.epv2_total);

        r
    }

    /// Values in physical units for the publishers.
    pub fn scaled_values(&self) -> Vec<(&'static str, f64)> {
        let div10 = |v: u32| Utils::round(v as f64 / 10.0, 1);

        vec![
            ("ppv", div10(self.ppv)),
            ("vpv1", div10(u32::from(self.vpv1))),
            ("ipv1", div10(u32::from(self.ipv1))),
            ("ppv1", div10(self.ppv1)),
            ("vpv2", div10(u32::from(self.vpv2))),
            ("ipv2", div10(u32::from(self.ipv2))),
            ("ppv2", div10(self.ppv2)),
            ("pac", div10(self.pac)),
            ("fac", Utils::round(f64::from(self.fac) / 100.0, 2)),
            ("vac1", div10(u32::from(self.vac1))),
            ("iac1", div10(u32::from(self.iac1))),
            ("pac1", div10(self.pac1)),
            ("vac_rs", div10(u32::from(self.vac_rs))),
            ("eac_today", div10(self.eac_today)),
            ("eac_total", div10(self.eac_total)),
            ("epv_total", div10(self.epv_total)),
            ("epv1_today", div10(self.epv1_today)),
            ("epv1_total", div10(self.epv1_total)),
            ("epv2_today", div10(self.epv2_today)),
            ("epv2_total", div10(self.epv2_total)),
        ]
    }
}

impl RequestCommon for EnergyRequest {
    fn function(&self) -> FunctionCode {
        FunctionCode::Energy
    }
    fn wifi_serial(&self) -> Serial {
        self.wifi_serial
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnergyAck;

impl ResponseCommon for EnergyAck {
    fn function(&self) -> FunctionCode {
        FunctionCode::Energy
    }
    fn bytes(&self) -> Vec<u8> {
        vec![ACK]
    }
}
// }}}

/////////////
//
// PING
//
/////////////

// {{{ Ping
pub const PING_PADDING: usize = 20;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PingRequest {
    pub wifi_serial: Serial,
    pub padding: Vec<u8>,
}

impl PingRequest {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 10 {
            bail!("ping payload too short ({} bytes)", payload.len());
        }

        Ok(Self {
            wifi_serial: Serial::new(&payload[0..10])?,
            padding: payload[10..].to_vec(),
        })
    }
}

impl RequestCommon for PingRequest {
    fn function(&self) -> FunctionCode {
        FunctionCode::Ping
    }
    fn wifi_serial(&self) -> Serial {
        self.wifi_serial
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PingResponse {
    pub wifi_serial: Serial,
    pub padding: Vec<u8>,
}

impl ResponseCommon for PingResponse {
    fn function(&self) -> FunctionCode {
        FunctionCode::Ping
    }

    fn bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(10 + self.padding.len());
        data.extend_from_slice(&self.wifi_serial.data());
        data.extend_from_slice(&self.padding);
        data
    }
}
// }}}

/////////////
//
// CONFIG
//
/////////////

// {{{ Config
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigRequest {
    pub wifi_serial: Serial,
    pub config_id: u16,
    pub config_value: Vec<u8>,
}

impl ConfigRequest {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 32 {
            bail!("config payload too short ({} bytes)", payload.len());
        }

        let wifi_serial = Serial::new(&payload[0..10])?;
        let config_id = Utils::be_u16(payload, 30);

        // devices ack a push with just the config id; the value block is
        // only present when they are reporting one
        let config_value = if payload.len() >= 34 {
            let declared = Utils::be_u16(payload, 32) as usize;
            if payload.len() < 34 + declared {
                bail!(
                    "config value truncated: declared {} bytes, {} available",
                    declared,
                    payload.len() - 34
                );
            }
            payload[34..34 + declared].to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            wifi_serial,
            config_id,
            config_value,
        })
    }
}

impl RequestCommon for ConfigRequest {
    fn function(&self) -> FunctionCode {
        FunctionCode::Config
    }
    fn wifi_serial(&self) -> Serial {
        self.wifi_serial
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigResponse {
    pub wifi_serial: Serial,
    pub config_id: u16,
    pub config_value: Vec<u8>,
}

impl ResponseCommon for ConfigResponse {
    fn function(&self) -> FunctionCode {
        FunctionCode::Config
    }

    fn bytes(&self) -> Vec<u8> {
        let mut data = vec![0; 30];
        data[0..10].copy_from_slice(&self.wifi_serial.data());
        data.extend_from_slice(&self.config_id.to_be_bytes());
        data.extend_from_slice(&(self.config_value.len() as u16).to_be_bytes());
        data.extend_from_slice(&self.config_value);
        data
    }
}
// }}}

/////////////
//
// QUERY
//
/////////////

// {{{ Query
/// Device-side 0x19: one reported configuration value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryRequest {
    pub wifi_serial: Serial,
    pub config_id: u16,
    pub config_value: Vec<u8>,
}

impl QueryRequest {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 34 {
            bail!("query payload too short ({} bytes)", payload.len());
        }

        let declared = Utils::be_u16(payload, 32) as usize;
        if payload.len() < 34 + declared {
            bail!(
                "query value truncated: declared {} bytes, {} available",
                declared,
                payload.len() - 34
            );
        }

        Ok(Self {
            wifi_serial: Serial::new(&payload[0..10])?,
            config_id: Utils::be_u16(payload, 30),
            config_value: payload[34..34 + declared].to_vec(),
        })
    }
}

impl RequestCommon for QueryRequest {
    fn function(&self) -> FunctionCode {
        FunctionCode::Query
    }
    fn wifi_serial(&self) -> Serial {
        self.wifi_serial
    }
}

/// Server-side 0x19: ask the device to report config ids first..=last.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryResponse {
    pub wifi_serial: Serial,
    pub first_config: u16,
    pub last_config: u16,
}

impl ResponseCommon for QueryResponse {
    fn function(&self) -> FunctionCode {
        FunctionCode::Query
    }

    fn bytes(&self) -> Vec<u8> {
        let mut data = vec![0; 30];
        data[0..10].copy_from_slice(&self.wifi_serial.data());
        data.extend_from_slice(&self.first_config.to_be_bytes());
        data.extend_from_slice(&self.last_config.to_be_bytes());
        data
    }
}
// }}}

/////////////
//
// BUFFERED ENERGY
//
/////////////

// {{{ BufferedEnergy
/// Same layout as Energy; only the function code (and the target
/// namespace) differ.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BufferedEnergyRequest(pub EnergyRequest);

impl RequestCommon for BufferedEnergyRequest {
    fn function(&self) -> FunctionCode {
        FunctionCode::BufferedEnergy
    }
    fn wifi_serial(&self) -> Serial {
        self.0.wifi_serial
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BufferedEnergyAck;

impl ResponseCommon for BufferedEnergyAck {
    fn function(&self) -> FunctionCode {
        FunctionCode::BufferedEnergy
    }
    fn bytes(&self) -> Vec<u8> {
        vec![ACK]
    }
}
// }}}

#[enum_dispatch(RequestCommon)]
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Announce(AnnounceRequest),
    Energy(EnergyRequest),
    Ping(PingRequest),
    Config(ConfigRequest),
    Query(QueryRequest),
    BufferedEnergy(BufferedEnergyRequest),
}

#[enum_dispatch(ResponseCommon)]
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    AnnounceAck(AnnounceAck),
    EnergyAck(EnergyAck),
    Ping(PingResponse),
    Config(ConfigResponse),
    Query(QueryResponse),
    BufferedEnergyAck(BufferedEnergyAck),
}

/// Outcome of decoding one frame; unknown function codes pass through
/// rather than erroring.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Message(Request),
    Passthrough(Frame),
}

pub struct Codec {
    cipher: Cipher,
}

impl Codec {
    pub fn new(cipher: Cipher) -> Self {
        Self { cipher }
    }

    pub fn decode(&self, frame: &Frame) -> Result<Decoded> {
        let function = match FunctionCode::try_from(frame.function) {
            Ok(function) => function,
            Err(_) => return Ok(Decoded::Passthrough(frame.clone())),
        };

        let variant = ProtocolVariant::from_protocol_id(frame.protocol_id);
        let payload = if variant.ciphered(function) {
            self.cipher.apply(&frame.payload)
        } else {
            frame.payload.clone()
        };

        let message = match function {
            FunctionCode::Announce => Request::Announce(AnnounceRequest::decode(&payload)?),
            FunctionCode::Energy => Request::Energy(EnergyRequest::decode(&payload)?),
            FunctionCode::Ping => Request::Ping(PingRequest::decode(&payload)?),
            FunctionCode::Config => Request::Config(ConfigRequest::decode(&payload)?),
            FunctionCode::Query => Request::Query(QueryRequest::decode(&payload)?),
            FunctionCode::BufferedEnergy => {
                Request::BufferedEnergy(BufferedEnergyRequest(EnergyRequest::decode(&payload)?))
            }
        };

        Ok(Decoded::Message(message))
    }

    /// Encoding is total; the reply reuses the inbound frame's envelope
    /// (transaction id, protocol id, unit id).
    pub fn encode(&self, response: &Response, reply_to: &Frame) -> Vec<u8> {
        let payload = response.bytes();

        let variant = ProtocolVariant::from_protocol_id(reply_to.protocol_id);
        let payload = if variant.ciphered(response.function()) {
            self.cipher.apply(&payload)
        } else {
            payload
        };

        FrameFactory::build(
            reply_to.transaction_id,
            reply_to.protocol_id,
            reply_to.unit_id,
            response.function().into(),
            &payload,
        )
    }
}
