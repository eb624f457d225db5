use crate::prelude::*;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

pub const HEADER_SIZE: usize = 7;
pub const CHECKSUM_SIZE: usize = 2;

/// One length-delimited, checksum-verified unit off the wire. The length
/// and checksum fields only exist on the wire; `payload` is still
/// obfuscated at this layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub unit_id: u8,
    pub function: u8,
    pub payload: Vec<u8>,
}

/// CRC-16/MODBUS over everything before the trailing two bytes. The wire
/// carries the reference CRC byte-swapped, so the swap here lets both
/// encode and verify use plain little-endian byte order.
pub fn checksum(data: &[u8]) -> u16 {
    crc16::State::<crc16::MODBUS>::calculate(data).swap_bytes()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    WaitingForHeader,
    WaitingForBody { length: u16 },
}

/// Per-connection reassembly state machine. Bytes go in via `extend`,
/// verified frames come out of `next_frame`; checksum failures and
/// degenerate length fields are consumed as noise, never surfaced as
/// errors.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    state: State,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            state: State::WaitingForHeader,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return None;
                    }
                    let length = Utils::be_u16(&self.buffer, 4);
                    self.state = State::WaitingForBody { length };
                }
                State::WaitingForBody { length } => {
                    // length double-counts the unit_id byte relative to the
                    // header, and the trailing checksum sits beyond it:
                    // total = 7 + (length - 1) + 2
                    let total = HEADER_SIZE + length as usize + 1;
                    if self.buffer.len() < total {
                        return None;
                    }
                    self.state = State::WaitingForHeader;

                    if length < 2 {
                        debug!("skipping degenerate frame (length={})", length);
                        self.buffer.advance(total);
                        continue;
                    }

                    let expected = u16::from_le_bytes([
                        self.buffer[total - 2],
                        self.buffer[total - 1],
                    ]);
                    if checksum(&self.buffer[..total - CHECKSUM_SIZE]) != expected {
                        warn!("checksum mismatch, discarding {} byte frame candidate", total);
                        self.buffer.advance(total);
                        continue;
                    }

                    let frame = Frame {
                        transaction_id: Utils::be_u16(&self.buffer, 0),
                        protocol_id: Utils::be_u16(&self.buffer, 2),
                        unit_id: self.buffer[6],
                        function: self.buffer[7],
                        payload: self.buffer[HEADER_SIZE + 1..total - CHECKSUM_SIZE].to_vec(),
                    };
                    self.buffer.advance(total);
                    return Some(frame);
                }
            }
        }
    }
}

/// tokio codec adapter so the connection loop can use FramedRead.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    assembler: FrameAssembler,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if !src.is_empty() {
            let data = src.split_to(src.len());
            self.assembler.extend(&data);
        }
        Ok(self.assembler.next_frame())
    }
}

pub struct FrameFactory;

impl FrameFactory {
    /// Wrap an already-transformed payload in header + checksum. The
    /// on-wire length field is payload + 2.
    pub fn build(
        transaction_id: u16,
        protocol_id: u16,
        unit_id: u8,
        function: u8,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut r = Vec::with_capacity(HEADER_SIZE + 1 + payload.len() + CHECKSUM_SIZE);

        r.extend_from_slice(&transaction_id.to_be_bytes());
        r.extend_from_slice(&protocol_id.to_be_bytes());
        r.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        r.push(unit_id);
        r.push(function);
        r.extend_from_slice(payload);

        let crc = checksum(&r);
        r.extend_from_slice(&crc.to_le_bytes());

        r
    }
}
