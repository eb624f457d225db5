use growatt_bridge::growatt::cipher::Cipher;
use growatt_bridge::growatt::frame::{Frame, FrameAssembler};
use growatt_bridge::growatt::packet::{
    Codec, ConfigResponse, Decoded, PingResponse, QueryResponse, Request, ResponseCommon,
};

// Captured BufferedEnergy payload (still obfuscated), from a real dongle
const BUFFERED_ENERGY_PAYLOAD: &str = "06302c4625464773472a7761747447726f7761747447726f776174744772382f384d2e7f45594255747447726f7761747447726f7761747447726f7775787846716c756acc7873726e77614e2b40be6f6d617461047ecd777d7474626e6f7761747447726f7761747447726f7761747447726f776174747e4a7cfb68ef747c726f4e5b747447726f7761747447726f776174744ee96f7761747447726f776174744772564f61ddb565726f774a747437e66f77101a7447727e77615cc647726f6b61743cfb726f7761747447726f7761747447726f7761747447726f7761747447726f7761747447726f7761747447726f776174744a4d6f2761747447720f7761751f47726f77617475db7cdd77613a54476f6f7761747447726f7761747447726f7761747447726f7761747447726f7761747447726f7761747447726f77617478727ede7761747447726f7761747447726f7761747447726f";

// Captured 0x19 reports (obfuscated payloads)
const QUERY_REPORT_UPDATE_INTERVAL: &str =
    "06302c4625464773472a7761747447726f7761747447726f7761747447726f73617545";
const QUERY_REPORT_DATE: &str =
    "06302c4625464773472a7761747447726f7761747447726f7761747447726f686167467743585a51435977434f45524e417e485a4e";
const QUERY_REPORT_EMPTY: &str =
    "06302c4625464773472a7761747447726f7761747447726f7761747447726f646174";

// Captured 0x18 date report and short push-ack
const CONFIG_REPORT_DATE: &str =
    "06302c4625464773472a7761747447726f7761747447726f7761747447726f6861674677405f5a50465976404f47504e4474485f44";
const CONFIG_PUSH_ACK: &str =
    "06302c4625464773472a7761747447726f7761747447726f7761747447726f6861";

// Documented server-side encodes
const CONFIG_RESPONSE_DATE: &str =
    "06302c4625464773472a7761747447726f7761747447726f7761747447726f6861674677405f5a50465975424f47514e4774485a40";
const QUERY_RESPONSE_04_15: &str =
    "06302c4625464773472a7761747447726f7761747447726f7761747447726f736161";
const QUERY_RESPONSE_1F_1F: &str =
    "06302c4625464773472a7761747447726f7761747447726f7761747447726f68616b";
const PING_RESPONSE: &str =
    "06302c4625464773472a7761747447726f7761747447726f776174744772";

// Captured ping request frame, complete with header and checksum
const PING_FRAME: &str =
    "000200060020011606302c4625464773472a7761747447726f7761747447726f77617474477268a5";

fn unhex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn cipher() -> Cipher {
    Cipher::new("Growatt").unwrap()
}

fn codec() -> Codec {
    Codec::new(cipher())
}

fn frame(function: u8, payload: Vec<u8>) -> Frame {
    Frame {
        transaction_id: 1,
        protocol_id: 6,
        unit_id: 1,
        function,
        payload,
    }
}

#[test]
fn buffered_energy_capture_decodes() {
    let decoded = codec()
        .decode(&frame(0x50, unhex(BUFFERED_ENERGY_PAYLOAD)))
        .unwrap();

    let reading = match decoded {
        Decoded::Message(Request::BufferedEnergy(b)) => b.0,
        other => panic!("unexpected decode: {:?}", other),
    };

    assert_eq!(reading.wifi_serial.to_string(), "ABC1D2345E");
    assert_eq!(reading.inverter_serial.to_string(), "WXY9Z87654");

    assert_eq!(
        (reading.year, reading.month, reading.day),
        (20, 12, 12)
    );
    assert_eq!(
        (reading.hour, reading.minute, reading.second),
        (1, 3, 3)
    );

    assert_eq!(reading.inverter_status, 1);
    assert_eq!(reading.ppv, 14943);

    assert_eq!((reading.vpv1, reading.ipv1, reading.ppv1), (1996, 26, 5443));
    assert_eq!((reading.vpv2, reading.ipv2, reading.ppv2), (3234, 28, 9500));

    assert_eq!((reading.pac, reading.fac), (14648, 5004));
    assert_eq!((reading.vac1, reading.iac1, reading.pac1), (2459, 59, 14650));
    assert_eq!(reading.vac_rs, 2459);

    assert_eq!(reading.eac_today, 43);
    assert_eq!(reading.eac_total, 28820);
    assert_eq!(reading.epv_total, 29038);
    // the lifetime PV total is the sum of the per-string totals
    assert_eq!(reading.epv_total, reading.epv1_total + reading.epv2_total);

    assert_eq!((reading.epv1_today, reading.epv1_total), (17, 10418));
    assert_eq!((reading.epv2_today, reading.epv2_total), (28, 18620));
}

#[test]
fn energy_and_buffered_share_a_layout() {
    let payload = unhex(BUFFERED_ENERGY_PAYLOAD);

    let energy = match codec().decode(&frame(0x04, payload.clone())).unwrap() {
        Decoded::Message(Request::Energy(e)) => e,
        other => panic!("unexpected decode: {:?}", other),
    };
    let buffered = match codec().decode(&frame(0x50, payload)).unwrap() {
        Decoded::Message(Request::BufferedEnergy(b)) => b.0,
        other => panic!("unexpected decode: {:?}", other),
    };

    assert_eq!(energy, buffered);
}

#[test]
fn query_report_captures_decode() {
    let cases = [
        (QUERY_REPORT_UPDATE_INTERVAL, 4u16, b"1".to_vec()),
        (QUERY_REPORT_DATE, 31, b"2017-07-01 23:59:59".to_vec()),
        (QUERY_REPORT_EMPTY, 19, Vec::new()),
    ];

    for (hex, config_id, value) in cases {
        let report = match codec().decode(&frame(0x19, unhex(hex))).unwrap() {
            Decoded::Message(Request::Query(q)) => q,
            other => panic!("unexpected decode: {:?}", other),
        };
        assert_eq!(report.wifi_serial.to_string(), "ABC1D2345E");
        assert_eq!(report.config_id, config_id);
        assert_eq!(report.config_value, value);
    }
}

#[test]
fn config_report_capture_decodes() {
    let report = match codec().decode(&frame(0x18, unhex(CONFIG_REPORT_DATE))).unwrap() {
        Decoded::Message(Request::Config(c)) => c,
        other => panic!("unexpected decode: {:?}", other),
    };
    assert_eq!(report.wifi_serial.to_string(), "ABC1D2345E");
    assert_eq!(report.config_id, 0x1f);
    assert_eq!(report.config_value, b"2020-12-12 01:03:03".to_vec());

    // a device acking our push carries no value block
    let ack = match codec().decode(&frame(0x18, unhex(CONFIG_PUSH_ACK))).unwrap() {
        Decoded::Message(Request::Config(c)) => c,
        other => panic!("unexpected decode: {:?}", other),
    };
    assert_eq!(ack.config_id, 0x1f);
    assert!(ack.config_value.is_empty());
}

#[test]
fn config_response_reproduces_documented_capture() {
    let response = ConfigResponse {
        wifi_serial: "ABC1D2345E".parse().unwrap(),
        config_id: 31,
        config_value: b"2020-12-20 00:33:57".to_vec(),
    };

    let plain = response.bytes();
    assert_eq!(plain.len(), 53);
    assert_eq!(cipher().apply(&plain), unhex(CONFIG_RESPONSE_DATE));
}

#[test]
fn query_response_reproduces_documented_captures() {
    let wifi_serial = "ABC1D2345E".parse().unwrap();

    let response = QueryResponse {
        wifi_serial,
        first_config: 0x04,
        last_config: 0x15,
    };
    assert_eq!(cipher().apply(&response.bytes()), unhex(QUERY_RESPONSE_04_15));

    let response = QueryResponse {
        wifi_serial,
        first_config: 0x1f,
        last_config: 0x1f,
    };
    assert_eq!(cipher().apply(&response.bytes()), unhex(QUERY_RESPONSE_1F_1F));
}

#[test]
fn ping_response_reproduces_documented_capture() {
    let response = PingResponse {
        wifi_serial: "ABC1D2345E".parse().unwrap(),
        padding: vec![0; 20],
    };
    assert_eq!(cipher().apply(&response.bytes()), unhex(PING_RESPONSE));
}

#[test]
fn announce_fixture_decodes() {
    let mut payload = vec![0u8; 180];
    payload[0..10].copy_from_slice(b"ABC1D2345E");
    payload[30..40].copy_from_slice(b"WXY9Z87654");
    payload[139..155].copy_from_slice(b"   PV Inverter  ");
    payload[155..157].copy_from_slice(&100u16.to_be_bytes());
    payload[157..161].copy_from_slice(&50000u32.to_be_bytes());
    for (i, v) in [2021u16, 1, 9, 5, 10, 33].iter().enumerate() {
        payload[161 + i * 2..163 + i * 2].copy_from_slice(&v.to_be_bytes());
    }

    let announce = match codec().decode(&frame(0x03, cipher().apply(&payload))).unwrap() {
        Decoded::Message(Request::Announce(a)) => a,
        other => panic!("unexpected decode: {:?}", other),
    };

    assert_eq!(announce.wifi_serial.to_string(), "ABC1D2345E");
    assert_eq!(announce.device_serial.to_string(), "WXY9Z87654");
    assert_eq!(announce.device_type, "   PV Inverter  ");
    assert_eq!(announce.active_rate, 100);
    assert_eq!(announce.p_max, 50000);
    assert_eq!(announce.timestamp.year, 2021);
    assert_eq!(announce.timestamp.month, 1);
    assert_eq!(announce.timestamp.day, 9);
    assert_eq!(announce.timestamp.hour, 5);
    assert_eq!(announce.timestamp.minute, 10);
    assert_eq!(announce.timestamp.second, 33);
}

#[test]
fn captured_ping_frame_decodes_end_to_end() {
    let mut assembler = FrameAssembler::new();
    assembler.extend(&unhex(PING_FRAME));
    let frame = assembler.next_frame().expect("complete frame");

    let ping = match codec().decode(&frame).unwrap() {
        Decoded::Message(Request::Ping(p)) => p,
        other => panic!("unexpected decode: {:?}", other),
    };
    assert_eq!(ping.wifi_serial.to_string(), "ABC1D2345E");
    assert_eq!(ping.padding, vec![0; 20]);

    // replying through the codec keeps the envelope and obfuscates the echo
    let response = growatt_bridge::growatt::packet::Response::Ping(PingResponse {
        wifi_serial: ping.wifi_serial,
        padding: ping.padding.clone(),
    });
    let bytes = codec().encode(&response, &frame);

    let mut assembler = FrameAssembler::new();
    assembler.extend(&bytes);
    let reply = assembler.next_frame().expect("reply frame");
    assert_eq!(reply.transaction_id, frame.transaction_id);
    assert_eq!(reply.protocol_id, frame.protocol_id);
    assert_eq!(reply.unit_id, frame.unit_id);
    assert_eq!(reply.payload, unhex(PING_RESPONSE));
}

#[test]
fn acks_hit_the_wire_as_0x47() {
    use growatt_bridge::growatt::packet::{BufferedEnergyAck, EnergyAck, Response};

    let inbound = frame(0x50, unhex(BUFFERED_ENERGY_PAYLOAD));
    let bytes = codec().encode(&Response::BufferedEnergyAck(BufferedEnergyAck), &inbound);

    // header(7) + function(1) + one ack byte + checksum(2)
    assert_eq!(bytes.len(), 11);
    assert_eq!(bytes[7], 0x50);
    assert_eq!(bytes[8], 0x47);

    let bytes = codec().encode(&Response::EnergyAck(EnergyAck), &frame(0x04, vec![]));
    assert_eq!(bytes[7], 0x04);
    assert_eq!(bytes[8], 0x47);
}

#[test]
fn variant_two_frames_skip_the_cipher() {
    let mut payload = vec![0u8; 34];
    payload[0..10].copy_from_slice(b"ABC1D2345E");
    payload[30..32].copy_from_slice(&4u16.to_be_bytes());
    payload[32..34].copy_from_slice(&0u16.to_be_bytes());

    let clear_frame = Frame {
        transaction_id: 1,
        protocol_id: 2,
        unit_id: 1,
        function: 0x19,
        payload,
    };

    let report = match codec().decode(&clear_frame).unwrap() {
        Decoded::Message(Request::Query(q)) => q,
        other => panic!("unexpected decode: {:?}", other),
    };
    assert_eq!(report.wifi_serial.to_string(), "ABC1D2345E");
    assert_eq!(report.config_id, 4);
}
