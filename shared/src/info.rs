//! Server info query (`T` request, `I` response).

use serde::{Deserialize, Serialize};

use crate::{
    request_writer, response_writer, ByteReader, CursorError, QueryKind, INFO_QUERY_PAYLOAD,
    THE_SHIP_APP_ID,
};

/// Bits of the "extra data flags" byte that trails an info response.
pub mod edf {
    /// Game ID (u64) follows.
    pub const GAME_ID: u8 = 0x01;
    /// Server SteamID follows.
    pub const STEAM_ID: u8 = 0x10;
    /// Keyword string follows.
    pub const KEYWORDS: u8 = 0x20;
    /// SourceTV port and name follow.
    pub const SPECTATOR: u8 = 0x40;
    /// Game port follows.
    pub const PORT: u8 = 0x80;
}

/// Decoded `I` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub protocol: i8,
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub app_id: u16,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    /// `d` dedicated, `l` listen, `p` proxy.
    pub server_type: char,
    /// `l` linux, `w` windows, `m`/`o` mac.
    pub environment: char,
    pub password: bool,
    pub vac_secured: bool,
    /// Only present when `app_id` is [`THE_SHIP_APP_ID`].
    pub the_ship: Option<TheShipInfo>,
    pub version: String,
    pub extra: ExtraData,
}

/// Extra info block sent only by The Ship servers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheShipInfo {
    pub mode: i8,
    pub witnesses: i8,
    pub duration: i8,
}

/// Optional trailer fields, each gated by its bit in the flags byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraData {
    pub port: Option<u16>,
    pub steam_id: Option<SteamId>,
    pub spectator: Option<SpectatorInfo>,
    pub keywords: Option<String>,
    pub game_id: Option<i32>,
}

/// 64-bit server ID carried as two 32-bit halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteamId {
    pub lower: i32,
    pub upper: i32,
}

impl SteamId {
    /// Raw 64-bit value.
    pub fn as_u64(&self) -> u64 {
        ((self.upper as u32 as u64) << 32) | self.lower as u32 as u64
    }
}

/// SourceTV port and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectatorInfo {
    pub port: u16,
    pub name: String,
}

impl ExtraData {
    /// Extra data flag byte for the present fields.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.port.is_some() {
            flags |= edf::PORT;
        }
        if self.steam_id.is_some() {
            flags |= edf::STEAM_ID;
        }
        if self.spectator.is_some() {
            flags |= edf::SPECTATOR;
        }
        if self.keywords.is_some() {
            flags |= edf::KEYWORDS;
        }
        if self.game_id.is_some() {
            flags |= edf::GAME_ID;
        }
        flags
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CursorError> {
        let flags = reader.read_u8()?;
        let mut extra = ExtraData::default();

        if flags & edf::PORT != 0 {
            extra.port = Some(reader.read_u16_le()?);
        }
        if flags & edf::STEAM_ID != 0 {
            extra.steam_id = Some(SteamId {
                lower: reader.read_i32_le()?,
                upper: reader.read_i32_le()?,
            });
        }
        if flags & edf::SPECTATOR != 0 {
            extra.spectator = Some(SpectatorInfo {
                port: reader.read_u16_le()?,
                name: reader.read_cstring()?,
            });
        }
        if flags & edf::KEYWORDS != 0 {
            extra.keywords = Some(reader.read_cstring()?);
        }
        if flags & edf::GAME_ID != 0 {
            extra.game_id = Some(reader.read_i32_le()?);
        }

        Ok(extra)
    }
}

impl ServerInfo {
    /// Info request datagram.
    pub fn encode_request() -> Vec<u8> {
        let mut writer = request_writer(QueryKind::Info);
        writer.write_cstring(INFO_QUERY_PAYLOAD);
        writer.into_inner()
    }

    /// Decodes the body of an `I` response (marker already stripped).
    pub fn decode(body: &[u8]) -> Result<Self, CursorError> {
        let mut reader = ByteReader::new(body);

        let protocol = reader.read_i8()?;
        let name = reader.read_cstring()?;
        let map = reader.read_cstring()?;
        let folder = reader.read_cstring()?;
        let game = reader.read_cstring()?;
        let app_id = reader.read_u16_le()?;
        let players = reader.read_u8()?;
        let max_players = reader.read_u8()?;
        let bots = reader.read_u8()?;
        let server_type = char::from(reader.read_u8()?);
        let environment = char::from(reader.read_u8()?);
        let password = reader.read_u8()? != 0;
        let vac_secured = reader.read_u8()? != 0;

        let the_ship = if app_id == THE_SHIP_APP_ID {
            Some(TheShipInfo {
                mode: reader.read_i8()?,
                witnesses: reader.read_i8()?,
                duration: reader.read_i8()?,
            })
        } else {
            None
        };

        let version = reader.read_cstring()?;

        // A lone trailing byte is padding, not a flags byte
        let extra = if reader.remaining() > 1 {
            ExtraData::decode(&mut reader)?
        } else {
            ExtraData::default()
        };

        Ok(Self {
            protocol,
            name,
            map,
            folder,
            game,
            app_id,
            players,
            max_players,
            bots,
            server_type,
            environment,
            password,
            vac_secured,
            the_ship,
            version,
            extra,
        })
    }

    /// Info response message, marker included.
    pub fn encode_response(&self) -> Vec<u8> {
        let mut writer = response_writer(QueryKind::Info);
        writer
            .write_i8(self.protocol)
            .write_cstring(&self.name)
            .write_cstring(&self.map)
            .write_cstring(&self.folder)
            .write_cstring(&self.game)
            .write_u16_le(self.app_id)
            .write_u8(self.players)
            .write_u8(self.max_players)
            .write_u8(self.bots)
            .write_u8(self.server_type as u8)
            .write_u8(self.environment as u8)
            .write_u8(self.password as u8)
            .write_u8(self.vac_secured as u8);

        if self.app_id == THE_SHIP_APP_ID {
            let ship = self.the_ship.unwrap_or_default();
            writer
                .write_i8(ship.mode)
                .write_i8(ship.witnesses)
                .write_i8(ship.duration);
        }

        writer.write_cstring(&self.version);

        let flags = self.extra.flags();
        if flags != 0 {
            writer.write_u8(flags);
            if let Some(port) = self.extra.port {
                writer.write_u16_le(port);
            }
            if let Some(steam_id) = self.extra.steam_id {
                writer.write_i32_le(steam_id.lower).write_i32_le(steam_id.upper);
            }
            if let Some(spectator) = &self.extra.spectator {
                writer
                    .write_u16_le(spectator.port)
                    .write_cstring(&spectator.name);
            }
            if let Some(keywords) = &self.extra.keywords {
                writer.write_cstring(keywords);
            }
            if let Some(game_id) = self.extra.game_id {
                writer.write_i32_le(game_id);
            }
        }

        writer.into_inner()
    }
}
