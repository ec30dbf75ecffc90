//! Challenge handshake.
//!
//! Player and rules queries must echo a server-issued token. The token is
//! requested with the marker of the query it is for (`U` or `V`), or with the
//! legacy `W` marker, and always arrives under the `A` response marker.

use serde::{Deserialize, Serialize};

use crate::{request_writer, response_writer, ByteReader, CursorError, QueryKind, NO_CHALLENGE};

/// Challenge number a server hands out for player and rules requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeKey(pub i32);

impl ChallengeKey {
    /// Encodes a request for a fresh challenge on behalf of `selector`.
    pub fn encode_request(selector: QueryKind) -> Vec<u8> {
        let mut writer = request_writer(selector);
        writer.write_i32_le(NO_CHALLENGE);
        writer.into_inner()
    }

    /// Decodes the body of an `A` response (marker already stripped).
    pub fn decode(body: &[u8]) -> Result<Self, CursorError> {
        let mut reader = ByteReader::new(body);
        Ok(Self(reader.read_i32_le()?))
    }

    /// Challenge response message: marker then the key.
    pub fn encode_response(&self) -> Vec<u8> {
        let mut writer = response_writer(QueryKind::Challenge);
        writer.write_i32_le(self.0);
        writer.into_inner()
    }
}
