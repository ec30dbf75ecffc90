//! Responder configuration and the server profile it answers with.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use shared::{ExtraData, PlayerEntry, ServerInfo, SpectatorInfo, SteamId};

/// How the fragments of a split response are put on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delivery {
    #[default]
    InOrder,
    /// Random order.
    Shuffled,
    Reversed,
    /// Sends one extra fragment with an out-of-range index before the real ones.
    WithInvalidFragment,
    /// Never answers anything.
    Silent,
    /// Leaves out the last fragment, so the response never completes.
    DropLastFragment,
}

/// What the responder reports about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub info: ServerInfo,
    pub players: Vec<PlayerEntry>,
    /// Sent in this order; a repeated name is sent twice.
    pub rules: Vec<(String, String)>,
}

impl Default for ServerProfile {
    fn default() -> Self {
        let players = vec![
            PlayerEntry {
                index: 0,
                name: "Gordon".to_string(),
                score: 12,
                duration: 1832.5,
            },
            PlayerEntry {
                index: 1,
                name: "Alyx".to_string(),
                score: 9,
                duration: 944.0,
            },
        ];

        let rules = [
            ("mp_friendlyfire", "0"),
            ("mp_timelimit", "30"),
            ("sv_cheats", "0"),
            ("sv_gravity", "800"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        let info = ServerInfo {
            protocol: 17,
            name: "Local Test Server".to_string(),
            map: "de_dust2".to_string(),
            folder: "cstrike".to_string(),
            game: "Counter-Strike: Source".to_string(),
            app_id: 240,
            players: players.len() as u8,
            max_players: 24,
            bots: 0,
            server_type: 'd',
            environment: 'l',
            password: false,
            vac_secured: true,
            the_ship: None,
            version: "1.0.0.70".to_string(),
            extra: ExtraData {
                port: Some(27015),
                steam_id: Some(SteamId {
                    lower: 0x0001_0203,
                    upper: 0x0110_0001,
                }),
                spectator: Some(SpectatorInfo {
                    port: 27020,
                    name: "SourceTV".to_string(),
                }),
                keywords: Some("alltalk,increased_maxplayers".to_string()),
                game_id: Some(240),
            },
        };

        Self {
            info,
            players,
            rules,
        }
    }
}

/// Everything a [`crate::Responder`] needs to start.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub bind_addr: String,
    pub profile: ServerProfile,
    /// Largest chunk of a message carried by one datagram. Longer messages
    /// are split.
    pub max_payload: usize,
    pub delivery: Delivery,
    /// Sets the compression bit on split response IDs. Payloads are not
    /// actually compressed.
    pub compressed: bool,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            profile: ServerProfile::default(),
            max_payload: 1248,
            delivery: Delivery::InOrder,
            compressed: false,
        }
    }
}
