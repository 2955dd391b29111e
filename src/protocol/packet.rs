//! Packet definitions for the jamrelay wire format
//!
//! Packet format (16-byte header, optionally followed by a 16-byte session id):
//! - sequence: 8 bytes (big-endian)
//! - timestamp: 8 bytes (big-endian, milliseconds since epoch on the sender clock)
//! - session id: 16 bytes (session-bound framing only)
//! - payload: remainder (raw audio)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::control::DisconnectNotice;

/// Header size in bytes for the plain framing
pub const HEADER_SIZE: usize = 16;

/// Size of the session id carried by the session-bound framing
pub const SESSION_ID_SIZE: usize = 16;

/// Framing variant in use on the relay socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Sequence + timestamp header only
    #[default]
    Plain,
    /// Header followed by a 16-byte session id
    Session,
}

impl Framing {
    /// Number of bytes preceding the payload
    pub fn header_len(self) -> usize {
        match self {
            Framing::Plain => HEADER_SIZE,
            Framing::Session => HEADER_SIZE + SESSION_ID_SIZE,
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Plain => f.write_str("plain"),
            Framing::Session => f.write_str("session"),
        }
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Framing::Plain),
            "session" => Ok(Framing::Session),
            other => Err(format!(
                "Unknown framing '{}': expected 'plain' or 'session'",
                other
            )),
        }
    }
}

/// Opaque session identifier issued by the identity service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_SIZE]);

impl SessionId {
    pub fn from_bytes(bytes: [u8; SESSION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.0
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id.into_bytes())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Ids are uuids in practice; any 16 bytes render in the same hyphenated form
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

/// Reasons a datagram is rejected by the codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedPacket {
    #[error("Datagram too short: {len} bytes, header needs {required}")]
    TooShort { len: usize, required: usize },
}

/// A relayed audio packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u64,
    pub timestamp: u64,
    pub session_id: Option<SessionId>,
    pub payload: Vec<u8>,
}

/// A decoded inbound datagram
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    /// Binary-framed audio
    Data(Packet),
    /// Text-framed disconnect control message
    Disconnect(DisconnectNotice),
}

impl Packet {
    /// Create a new audio packet
    pub fn audio(sequence: u64, timestamp: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            timestamp,
            session_id: None,
            payload,
        }
    }

    /// Attach a session id (only encoded by the session-bound framing)
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Serialize the packet to bytes
    ///
    /// With `Framing::Session` a missing session id is written as 16 zero bytes.
    pub fn to_bytes(&self, framing: Framing) -> Vec<u8> {
        let mut buf = Vec::with_capacity(framing.header_len() + self.payload.len());

        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        if framing == Framing::Session {
            let id = self.session_id.map(|s| s.0).unwrap_or([0u8; SESSION_ID_SIZE]);
            buf.extend_from_slice(&id);
        }
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Deserialize a binary-framed packet
    pub fn from_bytes(data: &[u8], framing: Framing) -> Result<Self, MalformedPacket> {
        let required = framing.header_len();
        if data.len() < required {
            return Err(MalformedPacket::TooShort {
                len: data.len(),
                required,
            });
        }

        let sequence = read_u64(&data[0..8]);
        let timestamp = read_u64(&data[8..16]);
        let session_id = match framing {
            Framing::Plain => None,
            Framing::Session => {
                let mut id = [0u8; SESSION_ID_SIZE];
                id.copy_from_slice(&data[HEADER_SIZE..HEADER_SIZE + SESSION_ID_SIZE]);
                Some(SessionId(id))
            }
        };
        let payload = data[required..].to_vec();

        Ok(Self {
            sequence,
            timestamp,
            session_id,
            payload,
        })
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_be_bytes(raw)
}

/// Decode an inbound datagram
///
/// Disconnect messages are recognized before any length check, so a short
/// `DISCONNECT` text never surfaces as a malformed packet.
pub fn decode(data: &[u8], framing: Framing) -> Result<Datagram, MalformedPacket> {
    if let Some(notice) = DisconnectNotice::parse(data) {
        return Ok(Datagram::Disconnect(notice));
    }

    Packet::from_bytes(data, framing).map(Datagram::Data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_roundtrip() {
        let original = Packet::audio(42, 1_700_000_000_123, vec![1, 2, 3, 4, 5]);
        let bytes = original.to_bytes(Framing::Plain);
        let decoded = Packet::from_bytes(&bytes, Framing::Plain).expect("Failed to decode packet");

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut data = vec![0u8; HEADER_SIZE];
        data[7] = 0x05;
        data[14] = 0x01;
        data[15] = 0x02;
        data.extend_from_slice(b"pcm");

        let packet = Packet::from_bytes(&data, Framing::Plain).unwrap();
        assert_eq!(packet.sequence, 5);
        assert_eq!(packet.timestamp, 0x0102);
        assert_eq!(packet.payload, b"pcm".to_vec());
        assert!(packet.session_id.is_none());
    }

    #[test]
    fn test_session_framing() {
        let id = SessionId::from(Uuid::new_v4());
        let original = Packet::audio(7, 99, vec![9, 9]).with_session(id);
        let bytes = original.to_bytes(Framing::Session);
        assert_eq!(bytes.len(), HEADER_SIZE + SESSION_ID_SIZE + 2);

        let decoded = Packet::from_bytes(&bytes, Framing::Session).unwrap();
        assert_eq!(decoded.session_id, Some(id));
        assert_eq!(decoded.payload, vec![9, 9]);
    }

    #[test]
    fn test_header_only_has_empty_payload() {
        let packet = Packet::audio(0, 0, vec![]);
        let bytes = packet.to_bytes(Framing::Plain);
        assert_eq!(bytes.len(), HEADER_SIZE);

        let decoded = Packet::from_bytes(&bytes, Framing::Plain).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_invalid_packet_too_short() {
        let data = vec![0u8; 10];
        assert_eq!(
            decode(&data, Framing::Plain),
            Err(MalformedPacket::TooShort {
                len: 10,
                required: HEADER_SIZE
            })
        );
    }

    #[test]
    fn test_session_framing_requires_32_bytes() {
        let data = vec![0u8; 20];
        assert!(Packet::from_bytes(&data, Framing::Plain).is_ok());
        assert_eq!(
            Packet::from_bytes(&data, Framing::Session),
            Err(MalformedPacket::TooShort {
                len: 20,
                required: 32
            })
        );
    }

    #[test]
    fn test_disconnect_checked_before_length() {
        let datagram = decode(b"DISCONNECT", Framing::Session).unwrap();
        assert!(matches!(datagram, Datagram::Disconnect(_)));
    }

    #[test]
    fn test_session_id_display() {
        let uuid = Uuid::new_v4();
        assert_eq!(SessionId::from(uuid).to_string(), uuid.to_string());
    }

    #[test]
    fn test_framing_from_str() {
        assert_eq!("plain".parse::<Framing>(), Ok(Framing::Plain));
        assert_eq!("Session".parse::<Framing>(), Ok(Framing::Session));
        assert!("rtp".parse::<Framing>().is_err());
    }

    #[test]
    fn test_framing_header_len() {
        assert_eq!(Framing::Plain.header_len(), 16);
        assert_eq!(Framing::Session.header_len(), 32);
    }
}
