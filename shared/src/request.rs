//! Server-side view of inbound requests.

use thiserror::Error;

use crate::{
    ByteReader, ChallengeKey, CursorError, QueryKind, NO_CHALLENGE, SINGLE_PACKET_HEADER,
};

/// A decoded request datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Info,
    /// Legacy `W` challenge request.
    Challenge,
    Players(ChallengeKey),
    Rules(ChallengeKey),
}

/// Why a datagram is not a valid request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("unexpected packet header {0}")]
    Header(i32),
    #[error("unknown request marker {0:#04x}")]
    Marker(u8),
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl Request {
    /// Decodes a whole request datagram, header included.
    pub fn decode(datagram: &[u8]) -> Result<Self, RequestError> {
        let mut reader = ByteReader::new(datagram);

        let header = reader.read_i32_le()?;
        if header != SINGLE_PACKET_HEADER {
            return Err(RequestError::Header(header));
        }

        let marker = reader.read_u8()?;
        let kind = QueryKind::from_request_marker(marker).ok_or(RequestError::Marker(marker))?;

        Ok(match kind {
            // Trailing payload (and any appended challenge) is not checked
            QueryKind::Info => Request::Info,
            QueryKind::Challenge => Request::Challenge,
            QueryKind::Players => Request::Players(ChallengeKey(reader.read_i32_le()?)),
            QueryKind::Rules => Request::Rules(ChallengeKey(reader.read_i32_le()?)),
        })
    }

    /// Query kind of this request.
    pub fn kind(&self) -> QueryKind {
        match self {
            Request::Info => QueryKind::Info,
            Request::Challenge => QueryKind::Challenge,
            Request::Players(_) => QueryKind::Players,
            Request::Rules(_) => QueryKind::Rules,
        }
    }

    /// True when the request asks for a fresh challenge instead of data.
    pub fn wants_challenge(&self) -> bool {
        match self {
            Request::Info => false,
            Request::Challenge => true,
            Request::Players(key) | Request::Rules(key) => key.0 == NO_CHALLENGE,
        }
    }
}
