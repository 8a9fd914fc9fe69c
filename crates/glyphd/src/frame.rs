//! Glyph link frame parser and serializer
//!
//! Every frame is `[op: u8][len: u16 big-endian][body: len bytes]`.
//! Keys inside bodies are big-endian `u16`.

use bytes::{Buf, BytesMut};
use std::io::Cursor;

/// Largest body a frame can carry
pub const MAX_BODY: usize = u16::MAX as usize;

/// Header size: op byte plus body length
const HEADER_LEN: usize = 3;

const OP_REQUEST: u8 = 0x01;
const OP_DOWNLOAD: u8 = 0x02;
const OP_LOOKUP: u8 = 0x03;
const OP_STATS: u8 = 0x04;
const OP_RESET: u8 = 0x05;
const OP_STORED: u8 = 0x80;
const OP_GLYPH: u8 = 0x83;
const OP_MISSING: u8 = 0x84;
const OP_STATS_REPORT: u8 = 0x85;
const OP_OK: u8 = 0x86;
const OP_ERROR: u8 = 0xFF;

/// Frames exchanged with the peer
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Ask the peer to send a glyph (outbound)
    Request(u16),
    /// Glyph delivered by the peer
    Download { key: u16, payload: Vec<u8> },
    /// Peer asks for a cached glyph
    Lookup(u16),
    /// Peer asks for cache statistics
    Stats,
    /// Peer asks for the cache to be wiped
    Reset,
    /// Download stored, with the resulting entry count
    Stored(u16),
    /// Cached glyph returned for a lookup
    Glyph { key: u16, payload: Vec<u8> },
    /// Lookup missed; a request has been issued
    Missing(u16),
    /// JSON statistics
    StatsReport(String),
    /// Command completed
    Ok,
    /// Command failed
    Error(String),
}

impl Frame {
    /// Serialize to wire format
    pub fn serialize(&self) -> Result<Vec<u8>, String> {
        let (op, body) = match self {
            Frame::Request(key) => (OP_REQUEST, key.to_be_bytes().to_vec()),
            Frame::Download { key, payload } => (OP_DOWNLOAD, keyed(*key, payload)),
            Frame::Lookup(key) => (OP_LOOKUP, key.to_be_bytes().to_vec()),
            Frame::Stats => (OP_STATS, Vec::new()),
            Frame::Reset => (OP_RESET, Vec::new()),
            Frame::Stored(size) => (OP_STORED, size.to_be_bytes().to_vec()),
            Frame::Glyph { key, payload } => (OP_GLYPH, keyed(*key, payload)),
            Frame::Missing(key) => (OP_MISSING, key.to_be_bytes().to_vec()),
            Frame::StatsReport(json) => (OP_STATS_REPORT, json.as_bytes().to_vec()),
            Frame::Ok => (OP_OK, Vec::new()),
            Frame::Error(msg) => (OP_ERROR, msg.as_bytes().to_vec()),
        };

        let len = u16::try_from(body.len())
            .map_err(|_| format!("frame body too large: {} bytes (max: {} bytes)", body.len(), MAX_BODY))?;

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.push(op);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse one frame from the buffer, `Ok(None)` if more data is needed
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Frame>, String> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&buf[..]);
        let op = cursor.get_u8();
        let len = cursor.get_u16() as usize;
        if cursor.remaining() < len {
            return Ok(None); // Need more data
        }

        let body = buf[HEADER_LEN..HEADER_LEN + len].to_vec();
        buf.advance(HEADER_LEN + len);
        parse_body(op, body).map(Some)
    }
}

fn keyed(key: u16, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + payload.len());
    body.extend_from_slice(&key.to_be_bytes());
    body.extend_from_slice(payload);
    body
}

fn parse_body(op: u8, body: Vec<u8>) -> Result<Frame, String> {
    match op {
        OP_REQUEST => exact_key(&body).map(Frame::Request),
        OP_DOWNLOAD => split_key(body).map(|(key, payload)| Frame::Download { key, payload }),
        OP_LOOKUP => exact_key(&body).map(Frame::Lookup),
        OP_STATS => empty(&body).map(|()| Frame::Stats),
        OP_RESET => empty(&body).map(|()| Frame::Reset),
        OP_STORED => exact_key(&body).map(Frame::Stored),
        OP_GLYPH => split_key(body).map(|(key, payload)| Frame::Glyph { key, payload }),
        OP_MISSING => exact_key(&body).map(Frame::Missing),
        OP_STATS_REPORT => text(body).map(Frame::StatsReport),
        OP_OK => empty(&body).map(|()| Frame::Ok),
        OP_ERROR => text(body).map(Frame::Error),
        _ => Err(format!("Unknown frame op: {:#04x}", op)),
    }
}

fn exact_key(body: &[u8]) -> Result<u16, String> {
    match body {
        [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(format!("Expected 2-byte body, got {} bytes", body.len())),
    }
}

fn split_key(mut body: Vec<u8>) -> Result<(u16, Vec<u8>), String> {
    if body.len() < 2 {
        return Err("Body too short for a key".to_string());
    }
    let payload = body.split_off(2);
    Ok((u16::from_be_bytes([body[0], body[1]]), payload))
}

fn empty(body: &[u8]) -> Result<(), String> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(format!("Expected empty body, got {} bytes", body.len()))
    }
}

fn text(body: Vec<u8>) -> Result<String, String> {
    String::from_utf8(body).map_err(|e| e.to_string())
}
