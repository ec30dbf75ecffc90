//! Errors surfaced by queries.
//!
//! Transport send failures and timeouts are ordinary outcomes of a query, not
//! faults. Garbage datagrams and fragments with an out-of-range index are
//! dropped silently by the reassembler, so a response that lost a fragment to
//! that path shows up here only as a [`QueryError::Timeout`].

use shared::CursorError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the query client.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no address found for {0}")]
    NoAddress(String),

    #[error("failed to bind local socket: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to send request: {0}")]
    Send(#[source] io::Error),

    #[error("no response with marker {marker:#04x} within {after:?}")]
    Timeout { marker: u8, after: Duration },

    #[error("query session is closed")]
    Closed,

    #[error("a close is already pending on this session")]
    ClosePending,

    #[error("malformed response: {0}")]
    Decode(#[from] CursorError),
}

impl QueryError {
    /// True for [`QueryError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueryError::Timeout { .. })
    }
}
