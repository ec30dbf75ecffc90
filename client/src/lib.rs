//! # Server Query Client Library
//!
//! This library is the client side of the game server query protocol. It sends
//! requests over UDP, puts split responses back together, matches responses to
//! the requests waiting for them and decodes the results.
//!
//! ## Architecture Overview
//!
//! Every remote server gets its own [`Dispatcher`]: one local UDP socket and
//! one driver task that owns it. Queries against different servers share
//! nothing and run fully in parallel.
//!
//! ### Reassembly
//! Responses arrive either as a single datagram or as numbered fragments
//! that may be reordered, interleaved with other responses or partly lost.
//! The [`Reassembler`] turns that stream into complete logical messages and
//! forgets incomplete ones after a bounded interval.
//!
//! ### Correlation
//! A logical message is handed to the first waiting request whose expected
//! marker matches its first byte. Each request has its own timeout, so a
//! request that never gets an answer fails without disturbing the others.
//!
//! ### Session Lifetime
//! The dispatcher counts requests in flight. Closing an idle dispatcher
//! releases the socket at once; closing a busy one moves it to draining and
//! the socket is released when the last request finishes.
//!
//! ## Module Organization
//!
//! ### Reassembler Module (`reassembler`)
//! - Single and split datagram classification
//! - Per response ID fragment tables with expiry
//! - Compressed response detection
//!
//! ### Dispatcher Module (`dispatcher`)
//! - Socket ownership and the driver event loop
//! - Marker correlation and per-request timeouts
//! - Open, draining and closed session states
//!
//! ### Query Module (`query`)
//! - Challenge, info, player and rules queries
//! - Challenge handshake ahead of player and rules requests
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::{QueryConfig, ServerQuery};
//!
//! # async fn run() -> Result<(), client::QueryError> {
//! let query = ServerQuery::open("127.0.0.1", 27015, QueryConfig::default()).await?;
//!
//! let info = query.info().await?;
//! println!("{} on {} ({}/{})", info.name, info.map, info.players, info.max_players);
//!
//! for player in query.players().await? {
//!     println!("{} {} {:.0}s", player.name, player.score, player.duration);
//! }
//!
//! query.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Model
//!
//! Send failures and timeouts are ordinary query results and nothing is
//! retried. Garbage datagrams and fragments with an out-of-range index are
//! dropped without a trace beyond a debug log, which means a response that
//! lost such a fragment only ever shows up as a timeout.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod query;
pub mod reassembler;

pub use config::QueryConfig;
pub use dispatcher::{Dispatcher, Response, Session, SessionHold, SessionState};
pub use error::QueryError;
pub use query::ServerQuery;
pub use reassembler::{Message, Reassembler};
