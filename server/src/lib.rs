//! # Query Responder Library
//!
//! A small UDP server that speaks the answering side of the game server query
//! protocol. It stands in for a real game server in tests and during manual
//! work on the client.
//!
//! ## Behaviour
//!
//! ### Requests
//! Info requests are answered straight away. Player and rules requests are
//! answered with data only when they carry the responder's current challenge;
//! anything else, including the `-1` placeholder and the legacy challenge
//! request, gets the challenge back instead.
//!
//! ### Split Responses
//! An answer longer than the configured maximum payload is cut into numbered
//! fragments under a fresh response ID. The compression bit can be set on
//! those IDs to exercise the client's compressed path.
//!
//! ### Delivery Modes
//! Fragments can be sent in order, shuffled, reversed, preceded by a fragment
//! with an out-of-range index, or with the last fragment missing. The responder
//! can also be told to ignore every request.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! - Server profile (info, players, rules)
//! - Bind address, payload size and delivery mode
//!
//! ### Responder Module (`responder`)
//! - Socket ownership and the receive loop
//! - Challenge checks and answer encoding
//! - Framing and fragment arrangement

pub mod config;
pub mod responder;

pub use config::{Delivery, ResponderConfig, ServerProfile};
pub use responder::Responder;
