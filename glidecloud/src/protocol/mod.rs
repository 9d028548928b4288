//! SkyLines live tracking wire protocol.
//!
//! A one-way, connectionless datagram protocol designed for poor mobile
//! coverage: clients submit fixes without a handshake and the server answers
//! requests with small, self-contained packets.
//!
//! # Architecture
//!
//! ```text
//! &[u8] ──decode()──► Datagram { key, Packet } ──► server dispatch
//!                                                      │
//! DatagramSink ◄── ResponseAssembler ◄── records ◄─────┘
//! ```
//!
//! - [`packet`]: typed packets in physical units
//! - [`codec`]: header validation, CRC, fixed-point conversions
//! - [`assembler`]: splitting responses into bounded datagrams

mod assembler;
mod codec;
mod crc;
mod packet;

pub use assembler::{send_logged, DatagramSink, ResponseAssembler};
pub use codec::{
    decode, encode, encode_response, from_micro_degrees, to_fixed_i16, to_fixed_u16,
    to_micro_degrees, DecodeError, ResponseRecord, LIFT_SCALE, MAX_RECORD_COUNT, SPEED_SCALE,
    TURN_RATE_SCALE, VARIO_SCALE,
};
pub use crc::crc16_ccitt;
pub use packet::{
    fix_flags, Datagram, Fix, Packet, PacketType, ThermalRecord, TrafficRecord,
    UserNameResponse, WaveRecord, ACK_FLAG_BAD_KEY, TRAFFIC_FLAG_CLUB, TRAFFIC_FLAG_FOLLOWEES,
    TRAFFIC_FLAG_NEAR, USER_NAME_FLAG_NOT_FOUND,
};

/// Magic number at the start of every datagram.
pub const MAGIC: u32 = 0x5df4_b67b;

/// Size of the common datagram header.
pub const HEADER_SIZE: usize = 16;

/// Largest datagram the server sends.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Key placed in server-originated datagrams. Client keys are secret and
/// never echoed.
pub const SERVER_KEY: u64 = 0;
