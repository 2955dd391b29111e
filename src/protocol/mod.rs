//! Network protocol definitions
//!
//! Defines the binary audio framing and the text disconnect message.

mod control;
mod packet;

pub use control::{DisconnectNotice, UNKNOWN_NETWORK};
pub use packet::{
    decode, Datagram, Framing, MalformedPacket, Packet, SessionId, HEADER_SIZE, SESSION_ID_SIZE,
};
