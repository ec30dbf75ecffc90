//! Player list query (`U` request, `D` response).

use serde::{Deserialize, Serialize};

use crate::{request_writer, response_writer, ByteReader, ChallengeKey, CursorError, QueryKind};

/// One row of a player list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub index: u8,
    pub name: String,
    pub score: i32,
    /// Seconds connected.
    pub duration: f32,
}

impl PlayerEntry {
    /// Player request datagram carrying `challenge`.
    pub fn encode_request(challenge: ChallengeKey) -> Vec<u8> {
        let mut writer = request_writer(QueryKind::Players);
        writer.write_i32_le(challenge.0);
        writer.into_inner()
    }

    /// Decodes the body of a `D` response (marker already stripped).
    pub fn decode_list(body: &[u8]) -> Result<Vec<PlayerEntry>, CursorError> {
        let mut reader = ByteReader::new(body);
        let count = reader.read_u8()?;

        let mut players = Vec::with_capacity(count as usize);
        for _ in 0..count {
            players.push(PlayerEntry {
                index: reader.read_u8()?,
                name: reader.read_cstring()?,
                score: reader.read_i32_le()?,
                duration: reader.read_f32_le()?,
            });
        }

        Ok(players)
    }

    /// Encodes a `D` response. Lists longer than 255 entries are cut to fit
    /// the one-byte count.
    pub fn encode_list_response(players: &[PlayerEntry]) -> Vec<u8> {
        let players = &players[..players.len().min(u8::MAX as usize)];

        let mut writer = response_writer(QueryKind::Players);
        writer.write_u8(players.len() as u8);
        for player in players {
            writer
                .write_u8(player.index)
                .write_cstring(&player.name)
                .write_i32_le(player.score)
                .write_f32_le(player.duration);
        }
        writer.into_inner()
    }
}
