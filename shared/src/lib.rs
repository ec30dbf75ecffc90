//! Wire vocabulary for game server queries.
//!
//! Everything in this crate is pure: byte cursors, the request encoders and
//! response decoders for the four query kinds, and the single/split datagram
//! framing. The client and the test responder both build on it.

pub mod challenge;
pub mod cursor;
pub mod framing;
pub mod info;
pub mod players;
pub mod request;
pub mod rules;

pub use challenge::ChallengeKey;
pub use cursor::{ByteReader, ByteWriter, CursorError};
pub use framing::{single_packet, split_packet, FramingError};
pub use info::{ExtraData, ServerInfo, SpectatorInfo, SteamId, TheShipInfo};
pub use players::PlayerEntry;
pub use request::Request;
pub use rules::Rules;

/// Header of a datagram that carries one complete logical message.
pub const SINGLE_PACKET_HEADER: i32 = -1;
/// Header of a datagram that carries one fragment of a split message.
pub const SPLIT_PACKET_HEADER: i32 = -2;
/// Bit 31 of a split response ID marks a compressed payload.
pub const COMPRESSED_FLAG: u32 = 0x8000_0000;

/// Header bytes stripped from fragment 0 after its index byte.
pub const FIRST_FRAGMENT_HEADER_LEN: usize = 6;
/// Header bytes stripped from every later fragment after its index byte.
pub const FRAGMENT_HEADER_LEN: usize = 2;

/// Placeholder challenge sent when asking for a fresh one.
pub const NO_CHALLENGE: i32 = -1;
/// Fixed payload of every info request.
pub const INFO_QUERY_PAYLOAD: &str = "Source Engine Query";
/// App ID of "The Ship", whose info response carries three extra fields.
pub const THE_SHIP_APP_ID: u16 = 2400;

/// One-byte message type markers.
pub mod marker {
    pub const INFO_REQUEST: u8 = b'T';
    pub const INFO_RESPONSE: u8 = b'I';
    pub const CHALLENGE_REQUEST: u8 = b'W';
    pub const CHALLENGE_RESPONSE: u8 = b'A';
    pub const PLAYER_REQUEST: u8 = b'U';
    pub const PLAYER_RESPONSE: u8 = b'D';
    pub const RULES_REQUEST: u8 = b'V';
    pub const RULES_RESPONSE: u8 = b'E';
}

/// The four query kinds, each a request marker paired with the marker of
/// the response that answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Challenge,
    Info,
    Players,
    Rules,
}

impl QueryKind {
    /// Marker byte a request of this kind starts with.
    pub fn request_marker(self) -> u8 {
        match self {
            QueryKind::Challenge => marker::CHALLENGE_REQUEST,
            QueryKind::Info => marker::INFO_REQUEST,
            QueryKind::Players => marker::PLAYER_REQUEST,
            QueryKind::Rules => marker::RULES_REQUEST,
        }
    }

    /// Marker byte of the matching response.
    pub fn response_marker(self) -> u8 {
        match self {
            QueryKind::Challenge => marker::CHALLENGE_RESPONSE,
            QueryKind::Info => marker::INFO_RESPONSE,
            QueryKind::Players => marker::PLAYER_RESPONSE,
            QueryKind::Rules => marker::RULES_RESPONSE,
        }
    }

    /// Kind for a request marker, if known.
    pub fn from_request_marker(value: u8) -> Option<Self> {
        Some(match value {
            marker::CHALLENGE_REQUEST => QueryKind::Challenge,
            marker::INFO_REQUEST => QueryKind::Info,
            marker::PLAYER_REQUEST => QueryKind::Players,
            marker::RULES_REQUEST => QueryKind::Rules,
            _ => return None,
        })
    }
}

/// Starts a request: the single-packet preamble followed by the request marker.
pub(crate) fn request_writer(kind: QueryKind) -> ByteWriter {
    let mut writer = ByteWriter::with_capacity(32);
    writer
        .write_i32_le(SINGLE_PACKET_HEADER)
        .write_u8(kind.request_marker());
    writer
}

/// Starts a logical response message with its marker.
pub(crate) fn response_writer(kind: QueryKind) -> ByteWriter {
    let mut writer = ByteWriter::with_capacity(64);
    writer.write_u8(kind.response_marker());
    writer
}
